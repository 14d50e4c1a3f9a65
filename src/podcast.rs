use std::fmt;
use std::io::BufReader;
use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::error::Error;
use crate::mode::Mode;
use crate::sse::EventStream;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub http_client: Option<HttpClient>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: format!("podqa/{}", crate::VERSION),
            timeout: Duration::from_secs(20),
            http_client: None,
        }
    }
}

/// Opaque episode identifier. The service sends numbers, older payloads sent
/// strings; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EpisodeId(String);

impl EpisodeId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for EpisodeId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for EpisodeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(value) => EpisodeId::from(value),
            Raw::Text(value) => EpisodeId(value),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Episode {
    pub id: EpisodeId,
    pub title: String,
}

impl Episode {
    pub fn label(&self) -> String {
        format!("#{}: {}", self.id, self.title)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeDetail {
    pub summary: String,
    pub suggested_questions: Vec<String>,
}

#[derive(Deserialize)]
struct RawDetail {
    #[serde(default)]
    summary: String,
    sample_questions: String,
}

#[derive(Deserialize)]
struct SampleQuestions {
    #[serde(default)]
    questions: Vec<String>,
}

/// Parses an episode detail body. `sample_questions` is itself JSON encoded
/// inside a string, so it takes a second pass.
pub fn parse_detail(body: &str) -> Result<EpisodeDetail, Error> {
    let raw: RawDetail = serde_json::from_str(body)?;
    let suggested_questions = parse_sample_questions(&raw.sample_questions)?;
    Ok(EpisodeDetail {
        summary: raw.summary,
        suggested_questions,
    })
}

pub fn parse_sample_questions(encoded: &str) -> Result<Vec<String>, Error> {
    let decoded: SampleQuestions = serde_json::from_str(encoded)
        .map_err(|err| Error::Parse(format!("sample_questions: {err}")))?;
    Ok(decoded.questions)
}

/// Parameters of one ask request, frozen when a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskRequest {
    pub question: String,
    pub episode_id: EpisodeId,
    pub mode: Mode,
}

pub struct Client {
    http: HttpClient,
    stream_http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        if config.user_agent.trim().is_empty() {
            anyhow::bail!("podcast client user agent required");
        }
        let base_url = Url::parse(config.base_url.trim())
            .map_err(|err| anyhow::anyhow!("invalid base url {:?}: {err}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("base url {} cannot carry a path", base_url);
        }

        let http = match config.http_client.clone() {
            Some(client) => client,
            None => HttpClient::builder().timeout(config.timeout).build()?,
        };
        // Blocking reqwest applies `timeout` to every body read. On the answer
        // stream a timed-out read is an idle tick, not a failure, which lets a
        // cancelled worker let go of a quiet connection.
        let stream_http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .connect_timeout(config.timeout)
                .timeout(config.timeout)
                .build()?,
        };

        Ok(Client {
            http,
            stream_http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn episodes(&self, podcast_id: &str) -> Result<Vec<Episode>, Error> {
        let url = self.endpoint(&["podcasts", podcast_id, "episodes"])?;
        let response = self.get(&self.http, url)?;
        let body = response.text()?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn episode_detail(
        &self,
        podcast_id: &str,
        episode_id: &EpisodeId,
    ) -> Result<EpisodeDetail, Error> {
        let url = self.endpoint(&["podcasts", podcast_id, "episodes", episode_id.as_str()])?;
        let response = self.get(&self.http, url)?;
        let body = response.text()?;
        parse_detail(&body)
    }

    /// Opens the answer stream. The returned decoder owns the connection;
    /// dropping it closes the socket.
    pub fn ask(&self, request: &AskRequest) -> Result<EventStream<BufReader<Response>>, Error> {
        let mut url = self.endpoint(&["ask"])?;
        url.query_pairs_mut()
            .append_pair("q", &request.question)
            .append_pair("eid", request.episode_id.as_str())
            .append_pair("type", request.mode.as_str());

        let response = self
            .stream_http
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "text/event-stream")
            .send()?;
        let response = check_status(&url, response)?;
        Ok(EventStream::new(BufReader::new(response)))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Transport(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, http: &HttpClient, url: Url) -> Result<Response, Error> {
        let response = http
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .send()?;
        check_status(&url, response)
    }
}

fn check_status(url: &Url, response: Response) -> Result<Response, Error> {
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Transport(format!("{url} returned {status}")));
    }
    Ok(response)
}
