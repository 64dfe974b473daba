use crate::core::transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IamError {
    /// No credential source resolved; the client must follow `location` to log in.
    #[error("Login required: redirect to {location}")]
    LoginRequired { location: String },

    /// A bootstrap call came back without its payload. The session cookie has
    /// already been queued for expiry.
    #[error("Session rejected by {endpoint}: redirect to {location}")]
    SessionRejected { endpoint: String, location: String },

    /// The IAM service answered with an explicit failure status.
    #[error("Upstream call to {url} failed: {body}")]
    UpstreamFailure {
        url: String,
        body: serde_json::Value,
    },

    #[error("Response from {endpoint} is missing field '{field}'")]
    MissingField { endpoint: String, field: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Cipher error: {0}")]
    Cipher(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid policy pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid SSO callback: {0}")]
    InvalidCallback(String),

    #[error("No gateway link registered for application '{0}'")]
    UnknownApplication(String),
}

impl IamError {
    /// Redirect target for the halting variants, if any.
    pub fn redirect_location(&self) -> Option<&str> {
        match self {
            IamError::LoginRequired { location } | IamError::SessionRejected { location, .. } => {
                Some(location)
            }
            _ => None,
        }
    }

    /// Whether the calling edge must stop processing the request.
    ///
    /// Redirects and upstream business failures are deliberate halts; the edge
    /// answers with a redirect or the verbatim failure body.
    pub fn is_halt(&self) -> bool {
        matches!(
            self,
            IamError::LoginRequired { .. }
                | IamError::SessionRejected { .. }
                | IamError::UpstreamFailure { .. }
        )
    }
}

impl From<toml::de::Error> for IamError {
    fn from(err: toml::de::Error) -> Self {
        IamError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IamError>;
