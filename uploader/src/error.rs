//! Error taxonomy for credential handling, platform calls, and form submission.
//!
//! The lower layers ([`AuthError`], [`ApiError`]) are typed so that [`FormError`] can classify
//! them into the handful of outcomes a user actually sees.

use std::fmt;
use std::path::PathBuf;

/// Failures while loading, refreshing, or persisting the stored OAuth credential.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no stored credential found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("could not read stored credential at {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stored credential at {} is not valid JSON", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("stored access token has expired and there is no refresh token")]
    Expired,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("could not write refreshed credential to {}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AuthError {
    /// Whether this error means there is no usable credential on disk at all.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            AuthError::NotFound { .. } | AuthError::Read { .. } | AuthError::Parse { .. }
        )
    }
}

/// Failures from a call to the platform API.
///
/// The `Display` output of [`ApiError::Status`] carries the response body unmodified, so the
/// platform's own explanation reaches the user.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("YouTube API {method} request failed with status {status}: {body}")]
    Status {
        method: http::Method,
        status: http::StatusCode,
        body: String,
    },

    #[error("send {method} request to YouTube API: {url}")]
    Transport {
        method: http::Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("parse YouTube API response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("could not read video file {}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("upload was cancelled")]
    Cancelled,
}

/// The user-supplied form fields that must be present before a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Video,
    Title,
    Description,
    Tags,
    Category,
    Channel,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Video => "video file",
            Field::Title => "title",
            Field::Description => "description",
            Field::Tags => "tags",
            Field::Category => "category",
            Field::Channel => "channel",
        };
        f.write_str(name)
    }
}

/// Every way a form submission can fail, as presented to the user.
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("could not authenticate with the API, check the stored credential: {0}")]
    MissingCredential(#[source] AuthError),

    #[error("could not refresh the stored credential: {0}")]
    RefreshFailed(#[source] AuthError),

    #[error("YouTube API error: {0}")]
    Api(#[source] ApiError),

    #[error("invalid form input ({field}: {reason}), please fill in all required fields")]
    Validation { field: Field, reason: String },

    #[error("wrong password")]
    WrongPassword,

    #[error("the form is locked, enter the password first")]
    Locked,
}

impl FormError {
    pub(crate) fn validation(field: Field, reason: impl Into<String>) -> Self {
        FormError::Validation {
            field,
            reason: reason.into(),
        }
    }
}

impl From<AuthError> for FormError {
    fn from(e: AuthError) -> Self {
        if e.is_missing() {
            FormError::MissingCredential(e)
        } else {
            FormError::RefreshFailed(e)
        }
    }
}

impl From<ApiError> for FormError {
    fn from(e: ApiError) -> Self {
        match e {
            // a lazy refresh inside the client is still a credential problem
            ApiError::Auth(auth) => FormError::from(auth),
            other => FormError::Api(other),
        }
    }
}
