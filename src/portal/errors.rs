//! Error types for the portal client.

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    /// The page came back without the expected `<select>`. The portal
    /// occasionally serves a transient error page in place of the form.
    #[error("dropdown `{id}` missing from {url}")]
    MissingDropdown { id: &'static str, url: String },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("portal responded {status} for {url}")]
    Status { status: StatusCode, url: String },
    #[error("invalid portal URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

impl PortalError {
    /// Whether repeating the same idempotent request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::MissingDropdown { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => status.is_server_error(),
            Self::Request(e) => e.is_connect() || e.is_timeout(),
            Self::InvalidUrl(_) => false,
        }
    }

    /// Classify a transport error, pulling timeouts out into their own variant.
    pub(crate) fn from_send(err: reqwest::Error, url: &url::Url) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Request(err)
        }
    }
}
