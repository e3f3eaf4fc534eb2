use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),
    #[error("HTTP status {0} on watched fetch")]
    HttpStatus(u16),
    #[error("Empty response body, probably bot protection")]
    EmptyBody,
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("Message send error: {0}")]
    Send(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Errors worth retrying when fetching a watched URL: transport
    /// failures, non-4xx error statuses, and empty bodies.
    pub fn is_fetch_retryable(&self) -> bool {
        matches!(
            self,
            Error::HttpRequest(_) | Error::HttpStatus(_) | Error::EmptyBody
        )
    }

    /// Errors worth retrying when delivering through the messaging channel.
    pub fn is_send_retryable(&self) -> bool {
        matches!(self, Error::HttpRequest(_) | Error::Send(_))
    }

    /// Errors worth retrying when talking to the persistent store.
    pub fn is_store_retryable(&self) -> bool {
        matches!(self, Error::Store(_))
    }
}
