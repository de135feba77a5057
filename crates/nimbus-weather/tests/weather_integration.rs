//! Integration tests for the weather pipeline using wiremock.
//!
//! Every endpoint (geocoding, forecast, archive) is served by one mock server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use chrono::NaiveDate;
use nimbus_weather::{
    DataSource, HistoryCache, HistoryStore, PredictionRecord, Predictor, ProviderEndpoints,
    RetryConfig, SearchSession, WeatherError, WeatherProvider, WeatherService,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> WeatherProvider {
    WeatherProvider::new(
        ProviderEndpoints::single(&server.uri()),
        RetryConfig::new(3, 1, 5),
        Duration::from_secs(5),
        "nimbus-tests",
    )
    .unwrap()
}

fn service(server: &MockServer, store: HistoryStore) -> WeatherService {
    WeatherService::new(
        provider(server),
        store,
        HistoryCache::default(),
        Predictor::default(),
        7,
    )
}

async fn wait_until_idle(service: &WeatherService) {
    for _ in 0..100 {
        if service.in_flight() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} request(s) still in flight", service.in_flight());
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn forecast() -> serde_json::Value {
    serde_json::json!({
        "current": {
            "temperature_2m": 21.5,
            "apparent_temperature": 20.0,
            "relative_humidity_2m": 40,
            "wind_speed_10m": 10.0,
            "weather_code": 1
        }
    })
}

/// Archive payload with max/min 5 °C either side of each mean.
fn archive(days: &[(&str, f64)]) -> serde_json::Value {
    serde_json::json!({
        "daily": {
            "time": days.iter().map(|(d, _)| *d).collect::<Vec<_>>(),
            "temperature_2m_max": days.iter().map(|(_, t)| t + 5.0).collect::<Vec<_>>(),
            "temperature_2m_min": days.iter().map(|(_, t)| t - 5.0).collect::<Vec<_>>(),
            "temperature_2m_mean": days.iter().map(|(_, t)| *t).collect::<Vec<_>>(),
            "weather_code": days.iter().map(|_| 0).collect::<Vec<_>>()
        }
    })
}

fn phoenix_week() -> serde_json::Value {
    archive(&[
        ("2025-06-01", 30.0),
        ("2025-06-02", 31.5),
        ("2025-06-03", 33.0),
        ("2025-06-04", 32.0),
        ("2025-06-05", 34.0),
        ("2025-06-06", 35.0),
        ("2025-06-07", 33.5),
    ])
}

async fn mount_geocoder(server: &MockServer, name: &str, latitude: f64, longitude: f64) {
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [{ "name": name, "latitude": latitude, "longitude": longitude }]
        })))
        .mount(server)
        .await;
}

async fn mount_ok(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_current_after_two_transient_failures() {
    let server = MockServer::start().await;
    mount_geocoder(&server, "Denver", 39.74, -104.98).await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;
    mount_ok(&server, "/v1/forecast", forecast()).await;

    let current = provider(&server).fetch_current("Denver").await.unwrap();
    assert_eq!(current.city, "denver");
    assert_eq!(current.temperature, 21.5);
    assert_eq!(current.humidity, 40);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    mount_geocoder(&server, "Denver", 39.74, -104.98).await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let result = provider(&server).fetch_current("Denver").await;
    assert!(matches!(result, Err(WeatherError::Provider { status: 400, .. })));
}

#[tokio::test]
async fn test_unknown_city_is_not_found() {
    let server = MockServer::start().await;
    mount_ok(&server, "/v1/search", serde_json::json!({})).await;
    mount_ok(&server, "/search", serde_json::json!([])).await;

    let result = provider(&server).fetch_current("Atlantis").await;
    assert_eq!(result, Err(WeatherError::NotFound("Atlantis".into())));
}

#[tokio::test]
async fn test_phoenix_search_predicts_with_confidence() {
    let server = MockServer::start().await;
    mount_geocoder(&server, "Phoenix", 33.45, -112.07).await;
    mount_ok(&server, "/v1/forecast", forecast()).await;
    mount_ok(&server, "/v1/archive", phoenix_week()).await;

    let service = service(&server, HistoryStore::in_memory().unwrap());
    let report = service.search("Phoenix").await.unwrap();

    assert_eq!(report.city, "phoenix");
    assert_eq!(report.history.source, DataSource::Live);
    assert_eq!(report.history.data.len(), 7);
    assert!(!report.is_stale());

    let prediction = report.prediction.expect("prediction");
    assert!((30.0..=35.0).contains(&prediction.temperature));
    assert!(prediction.confidence >= 70.0, "confidence {}", prediction.confidence);
    assert_eq!(prediction.target_date, date("2025-06-08"));
    assert_eq!(report.accuracy.pending, 1);
}

#[tokio::test]
async fn test_new_city_without_history_is_insufficient() {
    let server = MockServer::start().await;
    let service = service(&server, HistoryStore::in_memory().unwrap());

    let result = service.predict("NewCity").await;
    assert!(matches!(result, Err(WeatherError::InsufficientData(_))));
}

#[tokio::test]
async fn test_fetched_day_resolves_open_prediction() {
    let server = MockServer::start().await;
    mount_geocoder(&server, "Denver", 39.74, -104.98).await;
    mount_ok(
        &server,
        "/v1/archive",
        archive(&[("2025-06-09", 17.5), ("2025-06-10", 18.2)]),
    )
    .await;

    let mut store = HistoryStore::in_memory().unwrap();
    store
        .append_prediction(&PredictionRecord {
            city: "denver".into(),
            target_date: date("2025-06-10"),
            predicted_temperature: 19.0,
            confidence: 55.0,
            actual_temperature: None,
        })
        .unwrap();

    let service = service(&server, store);
    service.history("Denver").await.unwrap();

    let summary = service.accuracy("Denver").await.unwrap();
    assert_eq!(summary.resolved, 1);
    assert_eq!(summary.pending, 0);
    assert_eq!(summary.mean_absolute_error, Some(0.8));
    assert_eq!(summary.within_tolerance_pct, Some(100.0));

    // Clearing history leaves the prediction record and its accuracy intact
    service.clear().await.unwrap();
    assert!(service.cities().await.unwrap().is_empty());
    assert_eq!(service.accuracy("Denver").await.unwrap(), summary);
}

#[tokio::test]
async fn test_history_survives_restart_and_writes_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("history.db");

    let server = MockServer::start().await;
    mount_geocoder(&server, "Phoenix", 33.45, -112.07).await;
    mount_ok(&server, "/v1/archive", phoenix_week()).await;

    service(&server, HistoryStore::open(&db).unwrap())
        .history("Phoenix")
        .await
        .unwrap();
    // Fresh service, empty cache: the same week is fetched and stored again
    service(&server, HistoryStore::open(&db).unwrap())
        .history("Phoenix")
        .await
        .unwrap();

    let store = HistoryStore::open(&db).unwrap();
    let records = store.read_recent("Phoenix", 30).unwrap();
    assert_eq!(records.len(), 7);
    assert_eq!(records[0].date, date("2025-06-01"));
    assert_eq!(records[6].temperature_avg, 33.5);
}

#[tokio::test]
async fn test_unreachable_provider_falls_back_to_stored_data() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("history.db");

    let server = MockServer::start().await;
    mount_geocoder(&server, "Phoenix", 33.45, -112.07).await;
    mount_ok(&server, "/v1/forecast", forecast()).await;
    mount_ok(&server, "/v1/archive", phoenix_week()).await;
    service(&server, HistoryStore::open(&db).unwrap())
        .search("Phoenix")
        .await
        .unwrap();

    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let report = service(&server, HistoryStore::open(&db).unwrap())
        .search("Phoenix")
        .await
        .unwrap();
    assert!(report.is_stale());
    assert_eq!(report.history.source, DataSource::Stale);
    assert_eq!(report.history.data.len(), 7);
    let current = report.current.expect("snapshot");
    assert_eq!(current.source, DataSource::Stale);
    assert_eq!(current.data.temperature, 21.5);
}

#[tokio::test]
async fn test_unreachable_provider_without_data_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let service = service(&server, HistoryStore::in_memory().unwrap());
    let result = service.history("Denver").await;
    assert!(matches!(result, Err(WeatherError::Transient(_))));
}

#[tokio::test]
async fn test_concurrent_history_requests_share_one_fetch() {
    let server = MockServer::start().await;
    mount_geocoder(&server, "Denver", 39.74, -104.98).await;
    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(archive(&[("2025-06-09", 17.5)]))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let service = service(&server, HistoryStore::in_memory().unwrap());
    let (a, b) = tokio::join!(service.history("Denver"), service.history(" denver "));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.data, b.data);
    assert_eq!(a.source, DataSource::Live);

    let again = service.history("Denver").await.unwrap();
    assert_eq!(again.source, DataSource::Cache);
    assert_eq!(service.cache().stats().hits, 1);
}

#[tokio::test]
async fn test_session_drops_superseded_search() {
    let server = MockServer::start().await;
    mount_geocoder(&server, "Phoenix", 33.45, -112.07).await;
    mount_ok(&server, "/v1/forecast", forecast()).await;
    mount_ok(&server, "/v1/archive", phoenix_week()).await;

    let service = service(&server, HistoryStore::in_memory().unwrap());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut session = SearchSession::new(tx);
    let runtime = tokio::runtime::Handle::current();

    session.request_search(&runtime, &service, "Denver");
    let second = session.request_search(&runtime, &service, "Phoenix");

    let message = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("search finished")
        .expect("channel open");
    let nimbus_weather::SearchMessage::Done { ticket, .. } = &message;
    assert_eq!(*ticket, second);

    let (city, result) = session.accept(message).expect("active ticket");
    assert_eq!(city, "Phoenix");
    assert!(result.unwrap().prediction.is_some());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_concurrent_searches_share_one_request_per_city() {
    let server = MockServer::start().await;
    mount_geocoder(&server, "Denver", 39.74, -104.98).await;
    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(forecast())
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .respond_with(ResponseTemplate::new(200).set_body_json(archive(&[("2025-06-09", 17.5)])))
        .expect(1)
        .mount(&server)
        .await;

    let service = service(&server, HistoryStore::in_memory().unwrap());
    let (a, b) = tokio::join!(service.search("Denver"), service.search("denver"));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a, b);
    assert!(a.current.is_some());
    assert_eq!(service.in_flight(), 0);
}

#[tokio::test]
async fn test_session_repeat_city_joins_running_search() {
    let server = MockServer::start().await;
    mount_geocoder(&server, "Denver", 39.74, -104.98).await;
    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(forecast())
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .respond_with(ResponseTemplate::new(200).set_body_json(archive(&[("2025-06-09", 17.5)])))
        .expect(1)
        .mount(&server)
        .await;

    let service = service(&server, HistoryStore::in_memory().unwrap());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut session = SearchSession::new(tx);
    let runtime = tokio::runtime::Handle::current();

    let first = session.request_search(&runtime, &service, "Denver");
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = session.request_search(&runtime, &service, " denver");
    assert_eq!(first, second);

    let message = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("search finished")
        .expect("channel open");
    let (city, result) = session.accept(message).expect("active ticket");
    assert_eq!(city, "Denver");
    assert!(result.is_ok());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_superseded_search_still_finishes_its_fetch() {
    let server = MockServer::start().await;
    mount_geocoder(&server, "Denver", 39.74, -104.98).await;
    mount_ok(&server, "/v1/forecast", forecast()).await;
    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(archive(&[("2025-06-09", 17.5)]))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let service = service(&server, HistoryStore::in_memory().unwrap());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut session = SearchSession::new(tx);
    let runtime = tokio::runtime::Handle::current();

    session.request_search(&runtime, &service, "Denver");
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = session.request_search(&runtime, &service, "Phoenix");

    let message = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("search finished")
        .expect("channel open");
    let nimbus_weather::SearchMessage::Done { ticket, .. } = &message;
    assert_eq!(*ticket, second);
    let (city, _) = session.accept(message).expect("active ticket");
    assert_eq!(city, "Phoenix");
    assert!(!session.is_searching());

    // The abandoned Denver fetch ran to completion and cleaned up after itself
    wait_until_idle(&service).await;
    let denver = service.history("Denver").await.unwrap();
    assert_eq!(denver.source, DataSource::Cache);
}
