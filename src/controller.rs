//! UI state store and the operations that sequence catalog, detail and
//! answer work.
//!
//! All state lives in [`UiState`] and is only mutated on the thread that owns
//! the [`Controller`]. Network work runs on background threads that report
//! back through a channel; every report carries the request or session id it
//! was issued for, and anything that no longer matches the current id is
//! discarded when the channel is drained.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use ratatui::text::Text;

use crate::data::{AnswerService, CatalogService, DetailService};
use crate::error::{self, Error};
use crate::markdown;
use crate::mode::ModeSelector;
use crate::podcast::{AskRequest, Episode, EpisodeDetail, EpisodeId};
use crate::session::{self, Applied, SessionId, Status, StreamEvent, Ticket};
use crate::sse::Message;
use crate::suggestions::SuggestionList;

/// Content of a region that is filled by a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Load<T> {
    Empty,
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> Load<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Load::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Load::Loading)
    }
}

pub struct UiState {
    pub podcast_id: String,
    pub episodes: Load<Vec<Episode>>,
    pub selected_episode: Option<usize>,
    pub current_episode_id: Option<EpisodeId>,
    pub summary: Load<String>,
    pub suggestions: SuggestionList,
    pub mode: ModeSelector,
    pub sessions: session::Manager,
    /// Rendered answer of the current session.
    pub answer: Text<'static>,
    pub status_message: String,
}

impl UiState {
    pub fn new(podcast_id: impl Into<String>, mode: ModeSelector) -> Self {
        Self {
            podcast_id: podcast_id.into(),
            episodes: Load::Empty,
            selected_episode: None,
            current_episode_id: None,
            summary: Load::Empty,
            suggestions: SuggestionList::new(),
            mode,
            sessions: session::Manager::new(),
            answer: Text::default(),
            status_message: String::new(),
        }
    }

    pub fn episode_list(&self) -> &[Episode] {
        self.episodes.ready().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn current_episode(&self) -> Option<&Episode> {
        self.selected_episode
            .and_then(|idx| self.episode_list().get(idx))
    }

    pub fn answer_status(&self) -> Status {
        self.sessions
            .current()
            .map(|session| session.status())
            .unwrap_or_default()
    }

    pub fn is_loading(&self) -> bool {
        self.episodes.is_loading() || self.summary.is_loading() || self.sessions.is_streaming()
    }
}

enum AsyncResponse {
    Episodes {
        request_id: u64,
        result: Result<Vec<Episode>>,
    },
    Detail {
        request_id: u64,
        episode_id: EpisodeId,
        result: Result<EpisodeDetail>,
    },
    Answer {
        session: SessionId,
        event: StreamEvent,
    },
}

struct PendingEpisodes {
    request_id: u64,
}

struct PendingDetail {
    request_id: u64,
    episode_id: EpisodeId,
    cancel_flag: Arc<AtomicBool>,
}

/// Starts answer workers on their own threads.
struct ThreadLauncher {
    answers: Arc<dyn AnswerService>,
    tx: Sender<AsyncResponse>,
}

impl session::Launcher for ThreadLauncher {
    fn launch(&self, ticket: Ticket) {
        let answers = self.answers.clone();
        let tx = self.tx.clone();
        thread::spawn(move || stream_answer(answers.as_ref(), ticket, &tx));
    }
}

fn stream_answer(answers: &dyn AnswerService, ticket: Ticket, tx: &Sender<AsyncResponse>) {
    let session = ticket.session;
    let send = |event: StreamEvent| {
        let _ = tx.send(AsyncResponse::Answer { session, event });
    };

    let fragments = match answers.ask(&ticket.request) {
        Ok(fragments) => fragments,
        Err(err) => {
            if !ticket.is_cancelled() {
                send(StreamEvent::Failed(format!("{err:#}")));
            }
            return;
        }
    };

    // Returning drops `fragments`, which closes the connection. Idle ticks
    // keep this check running while the server is quiet.
    for item in fragments {
        if ticket.is_cancelled() {
            tracing::debug!(session = %session, "answer worker cancelled, connection dropped");
            return;
        }
        match item {
            Ok(Message::Data(text)) => send(StreamEvent::Fragment(text)),
            Ok(Message::Idle) => {}
            Err(err) => {
                // An abrupt close ends the answer the same way a clean one does.
                tracing::warn!(session = %session, error = %format!("{err:#}"), "answer stream closed abruptly");
                break;
            }
        }
    }

    if !ticket.is_cancelled() {
        send(StreamEvent::End);
    }
}

pub struct Services {
    pub catalog: Arc<dyn CatalogService>,
    pub details: Arc<dyn DetailService>,
    pub answers: Arc<dyn AnswerService>,
}

pub struct Controller {
    state: UiState,
    catalog: Arc<dyn CatalogService>,
    details: Arc<dyn DetailService>,
    launcher: ThreadLauncher,
    renderer: markdown::Renderer,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    next_request_id: u64,
    pending_episodes: Option<PendingEpisodes>,
    pending_detail: Option<PendingDetail>,
}

impl Controller {
    pub fn new(state: UiState, services: Services) -> Self {
        let (response_tx, response_rx) = unbounded();
        let launcher = ThreadLauncher {
            answers: services.answers,
            tx: response_tx.clone(),
        };
        Self {
            state,
            catalog: services.catalog,
            details: services.details,
            launcher,
            renderer: markdown::Renderer::new(),
            response_tx,
            response_rx,
            next_request_id: 1,
            pending_episodes: None,
            pending_detail: None,
        }
    }

    pub fn state(&self) -> &UiState {
        &self.state
    }

    fn next_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    pub fn load_catalog(&mut self) {
        let request_id = self.next_request_id();
        self.pending_episodes = Some(PendingEpisodes { request_id });
        self.state.episodes = Load::Loading;
        self.state.status_message = "Loading episodes…".to_string();

        let catalog = self.catalog.clone();
        let podcast_id = self.state.podcast_id.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = catalog.list_episodes(&podcast_id);
            let _ = tx.send(AsyncResponse::Episodes { request_id, result });
        });
    }

    pub fn select_episode(&mut self, index: usize) {
        let Some(episode) = self.state.episode_list().get(index).cloned() else {
            return;
        };
        if let Some(pending) = self.pending_detail.take() {
            pending.cancel_flag.store(true, Ordering::SeqCst);
        }

        self.state.selected_episode = Some(index);
        self.state.current_episode_id = Some(episode.id.clone());
        self.state.suggestions.clear();
        self.state.summary = Load::Loading;
        self.clear_answer();
        self.state.status_message = format!("Loading {}…", episode.label());

        let request_id = self.next_request_id();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_detail = Some(PendingDetail {
            request_id,
            episode_id: episode.id.clone(),
            cancel_flag: cancel_flag.clone(),
        });

        let details = self.details.clone();
        let podcast_id = self.state.podcast_id.clone();
        let tx = self.response_tx.clone();
        let episode_id = episode.id;
        thread::spawn(move || {
            let result = details.episode_detail(&podcast_id, &episode_id);
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::Detail {
                request_id,
                episode_id,
                result,
            });
        });
    }

    /// Starts a session for a typed question against the current episode
    /// and mode.
    pub fn submit_question(&mut self, text: &str) -> Result<SessionId, Error> {
        let result = self.ask(text);
        if let Err(err) = &result {
            self.state.status_message = match err {
                Error::EmptyInput => "Type a question first.".to_string(),
                Error::NoEpisode => "Select an episode before asking.".to_string(),
                other => format!("Cannot ask: {other}"),
            };
        }
        result
    }

    /// Starts a session for the suggestion at `index`, reading episode and
    /// mode at the moment of activation.
    pub fn activate_suggestion(&mut self, index: usize) -> Result<SessionId, Error> {
        let Some(question) = self.state.suggestions.get(index).map(str::to_string) else {
            return Err(Error::EmptyInput);
        };
        self.submit_question(&question)
    }

    pub fn activate_selected_suggestion(&mut self) -> Result<SessionId, Error> {
        self.activate_suggestion(self.state.suggestions.selected())
    }

    fn ask(&mut self, text: &str) -> Result<SessionId, Error> {
        if text.trim().is_empty() {
            return Err(Error::EmptyInput);
        }
        let episode_id = self
            .state
            .current_episode_id
            .clone()
            .ok_or(Error::NoEpisode)?;
        let request = AskRequest {
            question: text.to_string(),
            episode_id,
            mode: self.state.mode.current(),
        };

        self.state.answer = Text::default();
        let id = self.state.sessions.start(request, &self.launcher)?;
        self.state.status_message = "Answering…".to_string();
        Ok(id)
    }

    pub fn select_mode(&mut self, value: &str) {
        self.state.mode.select(value);
        self.state.status_message = format!("Mode: {}", self.state.mode.current());
    }

    pub fn cycle_mode(&mut self) {
        let mode = self.state.mode.cycle();
        self.state.status_message = format!("Mode: {mode}");
    }

    pub fn move_suggestion(&mut self, delta: isize) {
        self.state.suggestions.move_selection(delta);
    }

    /// Terminates the active session and clears the answer region.
    pub fn clear_answer(&mut self) {
        self.state.sessions.cancel();
        self.state.answer = Text::default();
    }

    pub fn cancel_answer(&mut self) {
        if self.state.sessions.is_streaming() {
            self.clear_answer();
            self.state.status_message = "Answer cancelled.".to_string();
        }
    }

    /// Applies every queued worker report. Returns whether anything arrived.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        changed
    }

    /// Blocks until one report arrives (or `timeout` passes) and applies it
    /// along with anything queued behind it.
    pub fn poll_timeout(&mut self, timeout: Duration) -> bool {
        match self.response_rx.recv_timeout(timeout) {
            Ok(message) => {
                self.handle_async_response(message);
                self.poll();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Polls until `done` holds or `timeout` elapses.
    pub fn poll_until(&mut self, timeout: Duration, done: impl Fn(&UiState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while !done(&self.state) {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            self.poll_timeout(remaining);
        }
        true
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Episodes { request_id, result } => {
                let Some(pending) = &self.pending_episodes else {
                    return;
                };
                if pending.request_id != request_id {
                    return;
                }
                self.pending_episodes = None;
                self.reset_episode_regions();

                match result {
                    Ok(episodes) => {
                        let count = episodes.len();
                        tracing::info!(count, podcast = %self.state.podcast_id, "episodes loaded");
                        self.state.episodes = Load::Ready(episodes);
                        if count == 0 {
                            self.state.status_message = "This podcast has no episodes yet.".to_string();
                        } else {
                            self.state.status_message = format!("{count} episodes.");
                            self.select_episode(0);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %format!("{err:#}"), "episode list failed");
                        self.state.episodes = Load::Failed(format!("{err:#}"));
                        self.state.status_message = format!("Failed to load episodes: {err:#}");
                    }
                }
            }
            AsyncResponse::Detail {
                request_id,
                episode_id,
                result,
            } => {
                let Some(pending) = &self.pending_detail else {
                    return;
                };
                if pending.cancel_flag.load(Ordering::SeqCst)
                    || pending.request_id != request_id
                    || pending.episode_id != episode_id
                {
                    return;
                }
                if self.state.current_episode_id.as_ref() != Some(&episode_id) {
                    return;
                }
                self.pending_detail = None;

                match result {
                    Ok(detail) => {
                        self.state.summary = Load::Ready(detail.summary);
                        self.state.suggestions.render(detail.suggested_questions);
                        self.clear_answer();
                        self.state.status_message = format!(
                            "Episode {episode_id}: {} suggested questions.",
                            self.state.suggestions.questions().len()
                        );
                    }
                    Err(err) => {
                        tracing::warn!(episode = %episode_id, error = %format!("{err:#}"), "episode detail failed");
                        self.state.summary = Load::Failed(format!("{err:#}"));
                        self.state.suggestions.clear();
                        self.state.status_message = match error::kind_of(&err) {
                            Some(Error::Parse(_)) => format!("Episode {episode_id} sent malformed data."),
                            _ => format!("Failed to load episode: {err:#}"),
                        };
                    }
                }
            }
            AsyncResponse::Answer { session, event } => {
                match self.state.sessions.apply(session, event) {
                    Applied::Ignored => {}
                    Applied::Updated => self.render_answer(),
                    Applied::Finished(Status::Completed) => {
                        self.render_answer();
                        self.state.status_message = "Answer complete.".to_string();
                    }
                    Applied::Finished(_) => {
                        let message = self
                            .state
                            .sessions
                            .current()
                            .and_then(|current| current.error())
                            .unwrap_or("unknown error")
                            .to_string();
                        self.state.status_message = format!("Answer failed: {message}");
                    }
                }
            }
        }
    }

    /// Returns everything downstream of the episode list to its initial
    /// state: no selection, no pending detail, no summary or suggestions and
    /// no active answer.
    fn reset_episode_regions(&mut self) {
        if let Some(pending) = self.pending_detail.take() {
            pending.cancel_flag.store(true, Ordering::SeqCst);
        }
        self.state.selected_episode = None;
        self.state.current_episode_id = None;
        self.state.summary = Load::Empty;
        self.state.suggestions.clear();
        self.clear_answer();
    }

    fn render_answer(&mut self) {
        if let Some(session) = self.state.sessions.current() {
            self.state.answer = self.renderer.render(session.buffer());
        }
    }
}
