//! Streamed answer sessions.
//!
//! A [`Manager`] owns at most one [`StreamSession`]. Starting a session closes
//! the previous connection and replaces the session, and every worker event
//! carries the [`SessionId`] it was launched with, so events from a replaced
//! session never reach the current buffer even when they were already queued
//! before the close.

use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::error::Error;
use crate::mode::Mode;
use crate::podcast::{AskRequest, EpisodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Idle,
    Streaming,
    Completed,
    Errored,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Streaming => "streaming",
            Status::Completed => "complete",
            Status::Errored => "failed",
        }
    }
}

/// Handle to an open push connection. Closing it raises the cancellation
/// flag the streaming worker polls between events.
#[derive(Debug, Clone, Default)]
pub struct Connection {
    cancel_flag: Arc<AtomicBool>,
}

impl Connection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    pub fn close(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }
}

/// Events a streaming worker reports for its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Fragment(String),
    End,
    Failed(String),
}

/// Everything a worker needs to stream one answer.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub session: SessionId,
    pub request: AskRequest,
    pub cancel_flag: Arc<AtomicBool>,
}

impl Ticket {
    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }
}

/// Opens the push connection for a ticket, off the controller thread.
pub trait Launcher {
    fn launch(&self, ticket: Ticket);
}

#[derive(Debug)]
pub struct StreamSession {
    id: SessionId,
    request: AskRequest,
    status: Status,
    raw: String,
    connection: Option<Connection>,
    error: Option<String>,
}

impl StreamSession {
    fn new(id: SessionId, request: AskRequest) -> Self {
        Self {
            id,
            request,
            status: Status::Idle,
            raw: String::new(),
            connection: None,
            error: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn question(&self) -> &str {
        &self.request.question
    }

    pub fn episode_id(&self) -> &EpisodeId {
        &self.request.episode_id
    }

    pub fn mode(&self) -> &Mode {
        &self.request.mode
    }

    pub fn request(&self) -> &AskRequest {
        &self.request
    }

    pub fn buffer(&self) -> &str {
        &self.raw
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    fn open(&mut self) -> Connection {
        self.raw.clear();
        self.error = None;
        let connection = Connection::new();
        self.connection = Some(connection.clone());
        self.status = Status::Streaming;
        connection
    }

    fn on_fragment(&mut self, text: &str) -> bool {
        if self.status != Status::Streaming {
            return false;
        }
        self.raw.push_str(text);
        true
    }

    fn on_end(&mut self) -> bool {
        if self.status != Status::Streaming {
            return false;
        }
        self.status = Status::Completed;
        self.connection = None;
        true
    }

    fn on_transport_error(&mut self, message: String) -> bool {
        if self.status != Status::Streaming {
            return false;
        }
        self.status = Status::Errored;
        self.error = Some(message);
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        true
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
    }
}

/// Outcome of routing a worker event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Stale or out-of-state event; nothing changed.
    Ignored,
    /// A fragment was appended; the buffer needs a redraw.
    Updated,
    /// The session reached a terminal status.
    Finished(Status),
}

#[derive(Debug, Default)]
pub struct Manager {
    current: Option<StreamSession>,
    next_id: u64,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&StreamSession> {
        self.current.as_ref()
    }

    pub fn current_id(&self) -> Option<SessionId> {
        self.current.as_ref().map(StreamSession::id)
    }

    pub fn is_streaming(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|session| session.status == Status::Streaming)
    }

    /// Supersedes the active session (closing its connection) and launches a
    /// new one for `request`.
    pub fn start(&mut self, request: AskRequest, launcher: &dyn Launcher) -> Result<SessionId, Error> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(Error::EmptyInput);
        }
        let request = AskRequest {
            question: question.to_string(),
            ..request
        };

        self.cancel();

        self.next_id += 1;
        let id = SessionId(self.next_id);
        let mut session = StreamSession::new(id, request);
        let connection = session.open();
        tracing::info!(
            session = %id,
            episode = %session.request.episode_id,
            mode = %session.request.mode,
            "starting answer stream"
        );

        let ticket = Ticket {
            session: id,
            request: session.request.clone(),
            cancel_flag: connection.token(),
        };
        self.current = Some(session);
        launcher.launch(ticket);
        Ok(id)
    }

    /// Routes a worker event to the current session. Events for any other
    /// session id are dropped.
    pub fn apply(&mut self, id: SessionId, event: StreamEvent) -> Applied {
        let Some(session) = self.current.as_mut().filter(|session| session.id == id) else {
            tracing::debug!(session = %id, "dropping event from superseded session");
            return Applied::Ignored;
        };

        let changed = match event {
            StreamEvent::Fragment(text) => {
                return if session.on_fragment(&text) {
                    Applied::Updated
                } else {
                    Applied::Ignored
                };
            }
            StreamEvent::End => session.on_end(),
            StreamEvent::Failed(message) => {
                tracing::warn!(session = %id, error = %message, "answer stream failed");
                session.on_transport_error(message)
            }
        };

        if changed {
            tracing::info!(session = %id, status = session.status.label(), bytes = session.raw.len(), "answer stream finished");
            Applied::Finished(session.status)
        } else {
            Applied::Ignored
        }
    }

    /// Closes and forgets the current session whatever its status.
    pub fn cancel(&mut self) -> Option<SessionId> {
        let mut session = self.current.take()?;
        if session.status == Status::Streaming {
            tracing::info!(session = %session.id, "superseding answer stream");
        }
        session.close();
        Some(session.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        tickets: RefCell<Vec<Ticket>>,
    }

    impl Launcher for Recorder {
        fn launch(&self, ticket: Ticket) {
            self.tickets.borrow_mut().push(ticket);
        }
    }

    fn request(question: &str, episode: i64, mode: &str) -> AskRequest {
        AskRequest {
            question: question.to_string(),
            episode_id: EpisodeId::from(episode),
            mode: Mode::new(mode),
        }
    }

    #[test]
    fn start_launches_with_frozen_request() {
        let launcher = Recorder::default();
        let mut manager = Manager::new();
        let id = manager
            .start(request("  What is X?  ", 1, "rag"), &launcher)
            .unwrap();

        let tickets = launcher.tickets.borrow();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].session, id);
        assert_eq!(tickets[0].request, request("What is X?", 1, "rag"));
        assert!(!tickets[0].is_cancelled());
        assert!(manager.is_streaming());
        assert_eq!(manager.current().unwrap().buffer(), "");
    }

    #[test]
    fn blank_question_is_rejected_before_start() {
        let launcher = Recorder::default();
        let mut manager = Manager::new();
        let err = manager.start(request(" \t ", 1, "rag"), &launcher).unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
        assert!(launcher.tickets.borrow().is_empty());
        assert!(manager.current().is_none());
    }

    #[test]
    fn fragments_accumulate_in_arrival_order() {
        let launcher = Recorder::default();
        let mut manager = Manager::new();
        let id = manager.start(request("q", 1, "rag"), &launcher).unwrap();

        let fragments = ["The ", "", "answer", "."];
        for fragment in fragments {
            assert_eq!(
                manager.apply(id, StreamEvent::Fragment(fragment.into())),
                Applied::Updated
            );
        }
        assert_eq!(manager.current().unwrap().buffer(), fragments.concat());
        assert_eq!(
            manager.apply(id, StreamEvent::End),
            Applied::Finished(Status::Completed)
        );
        assert!(manager.current().unwrap().connection().is_none());
    }

    #[test]
    fn completed_session_rejects_late_fragments() {
        let launcher = Recorder::default();
        let mut manager = Manager::new();
        let id = manager.start(request("q", 1, "rag"), &launcher).unwrap();
        manager.apply(id, StreamEvent::Fragment("done".into()));
        manager.apply(id, StreamEvent::End);

        assert_eq!(
            manager.apply(id, StreamEvent::Fragment("late".into())),
            Applied::Ignored
        );
        assert_eq!(manager.apply(id, StreamEvent::End), Applied::Ignored);
        assert_eq!(manager.current().unwrap().buffer(), "done");
    }

    #[test]
    fn starting_again_closes_previous_connection_and_resets_buffer() {
        let launcher = Recorder::default();
        let mut manager = Manager::new();
        let first = manager.start(request("Q1", 1, "rag"), &launcher).unwrap();
        manager.apply(first, StreamEvent::Fragment("partial Q1".into()));

        let second = manager.start(request("Q2", 1, "rag"), &launcher).unwrap();
        assert_ne!(first, second);

        let tickets = launcher.tickets.borrow();
        assert!(tickets[0].is_cancelled());
        assert!(!tickets[1].is_cancelled());
        assert_eq!(manager.current().unwrap().buffer(), "");
        assert_eq!(manager.current().unwrap().question(), "Q2");
    }

    #[test]
    fn stale_events_never_touch_current_buffer() {
        let launcher = Recorder::default();
        let mut manager = Manager::new();
        let first = manager.start(request("Q1", 1, "rag"), &launcher).unwrap();
        let second = manager.start(request("Q2", 1, "rag"), &launcher).unwrap();

        manager.apply(second, StreamEvent::Fragment("fresh".into()));
        assert_eq!(
            manager.apply(first, StreamEvent::Fragment("stale".into())),
            Applied::Ignored
        );
        assert_eq!(manager.apply(first, StreamEvent::End), Applied::Ignored);
        assert_eq!(
            manager.apply(first, StreamEvent::Failed("boom".into())),
            Applied::Ignored
        );

        let current = manager.current().unwrap();
        assert_eq!(current.buffer(), "fresh");
        assert_eq!(current.status(), Status::Streaming);
    }

    #[test]
    fn at_most_one_session_streams() {
        let launcher = Recorder::default();
        let mut manager = Manager::new();
        for idx in 0..5 {
            manager
                .start(request(&format!("Q{idx}"), 1, "rag"), &launcher)
                .unwrap();
            let open = launcher
                .tickets
                .borrow()
                .iter()
                .filter(|ticket| !ticket.is_cancelled())
                .count();
            assert_eq!(open, 1);
        }
    }

    #[test]
    fn transport_error_closes_connection() {
        let launcher = Recorder::default();
        let mut manager = Manager::new();
        let id = manager.start(request("q", 1, "rag"), &launcher).unwrap();
        assert_eq!(
            manager.apply(id, StreamEvent::Failed("connection refused".into())),
            Applied::Finished(Status::Errored)
        );

        let session = manager.current().unwrap();
        assert_eq!(session.error(), Some("connection refused"));
        assert!(session.connection().is_none());
        assert!(launcher.tickets.borrow()[0].is_cancelled());
        assert!(!manager.is_streaming());
    }

    #[test]
    fn cancel_drops_session_and_later_events() {
        let launcher = Recorder::default();
        let mut manager = Manager::new();
        let id = manager.start(request("q", 1, "rag"), &launcher).unwrap();

        assert_eq!(manager.cancel(), Some(id));
        assert!(launcher.tickets.borrow()[0].is_cancelled());
        assert!(manager.current().is_none());
        assert_eq!(
            manager.apply(id, StreamEvent::Fragment("late".into())),
            Applied::Ignored
        );
        assert_eq!(manager.cancel(), None);
    }
}
