use thiserror::Error;

pub type HubResult<T> = std::result::Result<T, HubError>;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("hubstorage request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("hubstorage returned {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
    #[error("failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unexpected response for {context}: {reason}")]
    Unexpected { context: String, reason: String },
    #[error("failed to read hubstorage response: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid job key `{0}`: expected <project>/<spider>/<job>")]
    InvalidJobKey(String),
}

impl HubError {
    pub fn decode(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            context: context.into(),
            source,
        }
    }

    pub fn unexpected(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unexpected {
            context: context.into(),
            reason: reason.into(),
        }
    }
}
