use thiserror::Error;

/// Failures a fetch, stream or submission can end in. None of them is fatal;
/// each one is scoped to the operation that produced it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Parse(String),
    #[error("question is empty")]
    EmptyInput,
    #[error("no episode selected")]
    NoEpisode,
}

impl Error {
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::Parse(err.to_string())
        } else {
            Error::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Transport(format!("invalid url: {err}"))
    }
}

/// Recovers the typed error behind an `anyhow` chain, if there is one.
pub fn kind_of(err: &anyhow::Error) -> Option<&Error> {
    err.downcast_ref::<Error>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn kind_survives_context() {
        let result: anyhow::Result<()> =
            Err(Error::Parse("bad json".into())).context("fetch episode detail");
        let err = result.unwrap_err();
        assert!(kind_of(&err).is_some_and(Error::is_parse));
        assert!(format!("{err:#}").contains("fetch episode detail"));
    }

    #[test]
    fn json_errors_are_parse_errors() {
        let err = serde_json::from_str::<Vec<String>>("{").unwrap_err();
        assert!(Error::from(err).is_parse());
    }
}
