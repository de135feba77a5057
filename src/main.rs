//! Nimbus: weather history, next-day prediction and accuracy tracking.

mod display;

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use nimbus_core::{App, AppError, Config};
use nimbus_weather::{
    CurrentConditions, HistoryCache, HistoryStore, Predictor, SearchSession, SessionState,
    TemperatureUnit, WeatherProvider, WeatherService,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Weather history and tomorrow's temperature
#[derive(Parser)]
#[command(name = "nimbus", version, about)]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Display unit for this run
    #[arg(long, global = true, value_enum)]
    unit: Option<UnitArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum UnitArg {
    #[value(alias = "celsius")]
    C,
    #[value(alias = "fahrenheit")]
    F,
}

impl From<UnitArg> for TemperatureUnit {
    fn from(arg: UnitArg) -> Self {
        match arg {
            UnitArg::C => TemperatureUnit::Celsius,
            UnitArg::F => TemperatureUnit::Fahrenheit,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Current conditions
    Current { city: String },
    /// Recent daily history
    History { city: String },
    /// Averages, extremes and trend over the stored history
    Summary { city: String },
    /// Predict tomorrow from stored history
    Predict { city: String },
    /// How past predictions turned out
    Accuracy { city: String },
    /// Current conditions, history, prediction and accuracy in one go
    Search { city: String },
    /// Cities with stored data
    Cities,
    /// Summary of the stored history
    Stats,
    /// Delete stored history and snapshots (predictions are kept)
    Clear {
        /// Required to actually delete
        #[arg(long)]
        yes: bool,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Read city names from stdin; each new one replaces the running search
    Interactive,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Check the configuration for errors and warnings
    Validate,
    /// Print the configuration file location
    Path,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    if let Err(e) = nimbus_core::init(level) {
        eprintln!("{}", e);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!("Command failed: {:?}", e);
            eprintln!("{}", display::error_line(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, AppError> {
    if let Command::Config { action } = &cli.command {
        return config_command(action);
    }

    let app = App::new()?;
    if let Some(unit) = cli.unit {
        app.set_unit(unit.into());
    }
    let service = build_service(&app)?;
    let unit = app.display_unit();

    match cli.command {
        Command::Current { city } => {
            let current = service.current(&city).await?;
            let icon = app.icon_for(current.data.condition);
            print!("{}", display::current(&current, unit, &icon));
        }
        Command::History { city } => {
            let history = service.history(&city).await?;
            print!("{}", display::history(&history.data, history.source, unit));
        }
        Command::Summary { city } => match service.summary(&city).await? {
            Some(summary) => print!("{}", display::summary(&summary, unit)),
            None => println!("No history stored for {}.", display::title_case(&city)),
        },
        Command::Predict { city } => {
            let prediction = service.predict(&city).await?;
            print!("{}", display::prediction(&prediction, unit));
        }
        Command::Accuracy { city } => {
            let summary = service.accuracy(&city).await?;
            print!("{}", display::accuracy(&summary, unit));
        }
        Command::Search { city } => {
            let report = service.search(&city).await?;
            print!(
                "{}",
                display::report(&report, unit, |c| app.icon_for(c.condition))
            );
        }
        Command::Cities => {
            print!("{}", display::cities(&service.cities().await?));
        }
        Command::Stats => {
            print!("{}", display::stats(&service.stats().await?, unit));
        }
        Command::Clear { yes } => {
            if !yes {
                eprintln!("This deletes all stored history. Re-run with --yes to confirm.");
                eprintln!("Past predictions and their accuracy are kept.");
                return Ok(ExitCode::FAILURE);
            }
            service.clear().await?;
            println!("Weather history cleared.");
        }
        Command::Interactive => interactive(&app, &service).await?,
        Command::Config { .. } => {}
    }
    Ok(ExitCode::SUCCESS)
}

fn build_service(app: &App) -> Result<WeatherService, AppError> {
    let config = app.config();
    let network = &config.network;

    let provider = WeatherProvider::new(
        network.endpoints(),
        network.retry(),
        network.timeout(),
        &network.user_agent,
    )?;
    let store = HistoryStore::open(app.database_path())?;
    let cache = HistoryCache::new(config.weather.cache_ttl(), config.weather.cache_max_entries);

    Ok(WeatherService::new(
        provider,
        store,
        cache,
        Predictor::new(config.predictor.clone()),
        config.weather.history_days,
    ))
}

fn config_command(action: &ConfigAction) -> Result<ExitCode, AppError> {
    match action {
        ConfigAction::Path => {
            println!("{}", Config::config_path()?.display());
        }
        ConfigAction::Show => {
            let config = Config::load()?;
            let text = serde_json::to_string_pretty(&config).map_err(anyhow::Error::from)?;
            println!("{}", text);
        }
        ConfigAction::Validate => {
            let config = Config::load()?;
            let result = config.validate();
            for warning in &result.warnings {
                println!("warning: {}", warning);
            }
            for error in &result.errors {
                println!("error: {}", error);
            }
            if !result.is_valid() {
                return Ok(ExitCode::FAILURE);
            }
            println!("Configuration is valid.");
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn interactive(app: &App, service: &WeatherService) -> Result<(), AppError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = SearchSession::new(tx);
    let runtime = tokio::runtime::Handle::current();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut unit = app.display_unit();

    println!("Enter a city name. 'unit' switches °C/°F, an empty line or 'quit' exits.");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "" | "quit" | "exit" => break,
                    "unit" => {
                        unit = app.toggle_unit();
                        println!("Showing temperatures in {}", unit.symbol());
                    }
                    city => {
                        let previous = active_search(session.state());
                        let ticket = session.request_search(&runtime, service, city);
                        match previous {
                            Some((active, name)) if active == ticket => {
                                println!("Already searching {}...", name);
                            }
                            Some((_, name)) => {
                                println!("(dropping search for {})", name);
                                println!("Searching {}...", city);
                            }
                            None => println!("Searching {}...", city),
                        }
                    }
                }
            }
            Some(message) = rx.recv() => {
                if let Some((city, result)) = session.accept(message) {
                    match result {
                        Ok(report) => {
                            let icon_for = |c: &CurrentConditions| app.icon_for(c.condition);
                            print!("{}", display::report(&report, unit, icon_for));
                        }
                        Err(e) => {
                            eprintln!("{}: {}", city, display::error_line(&AppError::from(e)));
                        }
                    }
                }
            }
        }
    }

    session.cancel();
    Ok(())
}

fn active_search(state: &SessionState) -> Option<(u64, String)> {
    match state {
        SessionState::Searching { ticket, city } => Some((*ticket, city.clone())),
        SessionState::Idle => None,
    }
}
