use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The authentication host could not be reached at all.
    #[error("No access to the Ayla cloud: {0}")]
    NoAccess(#[source] reqwest::Error),

    /// The authentication host answered, but not with a token.
    #[error("Login failed with status {status}: {body}")]
    LoginFailed { status: u16, body: String },

    /// A token answer that cannot be turned into a usable token.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Property not found: {0}")]
    NotFound(String),

    #[error("Property {name} has an unexpected value: {value:?}")]
    InvalidValue { name: String, value: String },

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Maps a failed request against the auth host. Connection failures become
    /// `NoAccess`, everything else stays a plain transport error.
    pub(crate) fn from_auth_transport(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Error::NoAccess(err)
        } else {
            Error::Http(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
