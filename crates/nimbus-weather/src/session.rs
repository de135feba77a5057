//! Single active search session.
//!
//! Each search gets a ticket. Starting a search for another city cancels the
//! previous one; asking again for the city already being searched keeps the
//! running search. A result that still arrives for an older ticket is dropped
//! by [`SearchSession::accept`].

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::service::{SearchReport, WeatherService};
use crate::types::{normalize_city, WeatherError};

/// Messages sent from search tasks back to the owner of the session
#[derive(Debug)]
pub enum SearchMessage {
    Done {
        ticket: u64,
        city: String,
        result: Result<SearchReport, WeatherError>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Searching { ticket: u64, city: String },
}

#[derive(Debug)]
pub struct SearchSession {
    tx: UnboundedSender<SearchMessage>,
    state: SessionState,
    token: Option<CancellationToken>,
    next_ticket: u64,
}

impl SearchSession {
    pub fn new(tx: UnboundedSender<SearchMessage>) -> Self {
        Self {
            tx,
            state: SessionState::Idle,
            token: None,
            next_ticket: 1,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_searching(&self) -> bool {
        matches!(self.state, SessionState::Searching { .. })
    }

    /// Ticket of the running search if it is for the same city.
    fn active_ticket_for(&self, city: &str) -> Option<u64> {
        match &self.state {
            SessionState::Searching { ticket, city: active }
                if normalize_city(active) == normalize_city(city) =>
            {
                Some(*ticket)
            }
            _ => None,
        }
    }

    /// Hand out the next ticket, superseding whatever was running.
    fn begin(&mut self, city: &str) -> (u64, CancellationToken) {
        self.cancel();
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        self.state = SessionState::Searching {
            ticket,
            city: city.to_string(),
        };
        (ticket, token)
    }

    /// Start a background search for `city` and return its ticket.
    ///
    /// Sends `SearchMessage::Done` when the search finishes. A superseded
    /// search stops at its next await point and sends nothing. Requesting the
    /// city that is already being searched returns the running ticket.
    pub fn request_search(
        &mut self,
        runtime: &Handle,
        service: &WeatherService,
        city: &str,
    ) -> u64 {
        if let Some(ticket) = self.active_ticket_for(city) {
            tracing::debug!("Search #{} already running for {}", ticket, city.trim());
            return ticket;
        }
        let (ticket, token) = self.begin(city);
        let tx = self.tx.clone();
        let service = service.clone();
        let city = city.trim().to_string();
        tracing::info!("Search #{} started for {}", ticket, city);

        runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("Search #{} for {} superseded", ticket, city);
                }
                result = service.search(&city) => {
                    let _ = tx.send(SearchMessage::Done { ticket, city, result });
                }
            }
        });
        ticket
    }

    /// Cancel the active search, if any.
    pub fn cancel(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        self.state = SessionState::Idle;
    }

    /// Take a finished search if it belongs to the active ticket.
    pub fn accept(
        &mut self,
        message: SearchMessage,
    ) -> Option<(String, Result<SearchReport, WeatherError>)> {
        let SearchMessage::Done {
            ticket,
            city,
            result,
        } = message;

        match &self.state {
            SessionState::Searching { ticket: active, .. } if *active == ticket => {
                self.state = SessionState::Idle;
                self.token = None;
                Some((city, result))
            }
            _ => {
                tracing::debug!("Dropping stale result #{} for {}", ticket, city);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use tokio::sync::mpsc;

    fn done(ticket: u64, city: &str) -> SearchMessage {
        SearchMessage::Done {
            ticket,
            city: city.to_string(),
            result: Err(WeatherError::NotFound(city.to_string())),
        }
    }

    #[test]
    fn test_new_session_is_idle() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = SearchSession::new(tx);
        assert_eq!(session.state(), &SessionState::Idle);
        assert!(!session.is_searching());
    }

    #[test]
    fn test_begin_supersedes_previous_ticket() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = SearchSession::new(tx);

        let (first, first_token) = session.begin("Denver");
        let (second, second_token) = session.begin("Phoenix");

        assert!(second > first);
        assert!(first_token.is_cancelled());
        assert!(!second_token.is_cancelled());
        assert_eq!(
            session.state(),
            &SessionState::Searching {
                ticket: second,
                city: "Phoenix".into()
            }
        );
    }

    #[test]
    fn test_stale_result_is_dropped() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = SearchSession::new(tx);
        let (first, _) = session.begin("Denver");
        let (second, _) = session.begin("Phoenix");

        assert!(session.accept(done(first, "Denver")).is_none());
        assert!(session.is_searching());

        let (city, result) = session.accept(done(second, "Phoenix")).expect("current ticket");
        assert_eq!(city, "Phoenix");
        assert!(result.is_err());
        assert!(!session.is_searching());
    }

    #[test]
    fn test_same_city_keeps_active_ticket() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = SearchSession::new(tx);
        assert_eq!(session.active_ticket_for("Denver"), None);

        let (ticket, _) = session.begin("Denver");
        assert_eq!(session.active_ticket_for("  denver "), Some(ticket));
        assert_eq!(session.active_ticket_for("Phoenix"), None);

        session.cancel();
        assert_eq!(session.active_ticket_for("Denver"), None);
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = SearchSession::new(tx);
        let (ticket, token) = session.begin("Oslo");
        session.cancel();

        assert!(token.is_cancelled());
        assert!(session.accept(done(ticket, "Oslo")).is_none());
    }
}
