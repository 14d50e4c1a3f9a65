use anyhow::{Context, Result};
use std::sync::Arc;

use crate::podcast::{self, AskRequest, Episode, EpisodeDetail, EpisodeId};
use crate::sse::Message;

/// Answer fragments in arrival order, with an idle tick whenever a read times
/// out. Dropping the iterator closes the underlying connection.
pub type Fragments = Box<dyn Iterator<Item = Result<Message>> + Send>;

pub trait CatalogService: Send + Sync {
    fn list_episodes(&self, podcast_id: &str) -> Result<Vec<Episode>>;
}

pub trait DetailService: Send + Sync {
    fn episode_detail(&self, podcast_id: &str, episode_id: &EpisodeId) -> Result<EpisodeDetail>;
}

pub trait AnswerService: Send + Sync {
    fn ask(&self, request: &AskRequest) -> Result<Fragments>;
}

pub struct PodcastCatalogService {
    client: Arc<podcast::Client>,
}

impl PodcastCatalogService {
    pub fn new(client: Arc<podcast::Client>) -> Self {
        Self { client }
    }
}

impl CatalogService for PodcastCatalogService {
    fn list_episodes(&self, podcast_id: &str) -> Result<Vec<Episode>> {
        self.client
            .episodes(podcast_id)
            .context("fetch episode list")
    }
}

pub struct PodcastDetailService {
    client: Arc<podcast::Client>,
}

impl PodcastDetailService {
    pub fn new(client: Arc<podcast::Client>) -> Self {
        Self { client }
    }
}

impl DetailService for PodcastDetailService {
    fn episode_detail(&self, podcast_id: &str, episode_id: &EpisodeId) -> Result<EpisodeDetail> {
        self.client
            .episode_detail(podcast_id, episode_id)
            .with_context(|| format!("fetch episode {episode_id}"))
    }
}

pub struct PodcastAnswerService {
    client: Arc<podcast::Client>,
}

impl PodcastAnswerService {
    pub fn new(client: Arc<podcast::Client>) -> Self {
        Self { client }
    }
}

impl AnswerService for PodcastAnswerService {
    fn ask(&self, request: &AskRequest) -> Result<Fragments> {
        let stream = self.client.ask(request).context("open answer stream")?;
        Ok(Box::new(
            stream
                .messages()
                .map(|item| item.map_err(anyhow::Error::from)),
        ))
    }
}

#[cfg(test)]
pub mod mock {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use anyhow::Result;

    use super::*;
    use crate::error::Error;

    #[derive(Default)]
    pub struct MockCatalogService {
        pub episodes: Vec<Episode>,
        pub fail: bool,
    }

    impl CatalogService for MockCatalogService {
        fn list_episodes(&self, _podcast_id: &str) -> Result<Vec<Episode>> {
            if self.fail {
                return Err(Error::Transport("connection refused".into()).into());
            }
            Ok(self.episodes.clone())
        }
    }

    /// Details keyed by episode id; the value is the raw response body so the
    /// two-stage parse runs exactly as it does against the service.
    #[derive(Default)]
    pub struct MockDetailService {
        pub bodies: HashMap<String, String>,
    }

    impl DetailService for MockDetailService {
        fn episode_detail(&self, _podcast_id: &str, episode_id: &EpisodeId) -> Result<EpisodeDetail> {
            let body = self
                .bodies
                .get(episode_id.as_str())
                .ok_or_else(|| Error::Transport(format!("episode {episode_id} returned 404")))?;
            Ok(podcast::parse_detail(body)?)
        }
    }

    /// Replies with scripted fragments per question and records every request.
    #[derive(Default)]
    pub struct MockAnswerService {
        pub answers: HashMap<String, Vec<String>>,
        pub requests: Mutex<Vec<AskRequest>>,
    }

    impl MockAnswerService {
        pub fn with_answer(mut self, question: &str, fragments: &[&str]) -> Self {
            self.answers.insert(
                question.to_string(),
                fragments.iter().map(|fragment| fragment.to_string()).collect(),
            );
            self
        }

        pub fn recorded(&self) -> Vec<AskRequest> {
            self.requests.lock().map(|list| list.clone()).unwrap_or_default()
        }
    }

    impl AnswerService for MockAnswerService {
        fn ask(&self, request: &AskRequest) -> Result<Fragments> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }
            let fragments = self
                .answers
                .get(&request.question)
                .cloned()
                .ok_or_else(|| Error::Transport("ask returned 503".into()))?;
            Ok(Box::new(fragments.into_iter().map(|text| Ok(Message::Data(text)))))
        }
    }
}
