//! Upload a local video to YouTube from a small form: metadata in, video ID out.
//!
//! The pieces, leaves first:
//!
//! - [`oauth::CredentialStore`] loads the stored OAuth credential and refreshes it when expired.
//! - [`youtube_api::channels::list_owned_channels`] lists the caller's channels.
//! - [`youtube_api::YouTubeClient::insert_video`] and [`upload::UploadTask`] perform the upload.
//! - [`form::FormController`] validates input and drives a submission through the above.

pub mod config;
pub mod error;
pub mod form;
pub mod gate;
pub mod oauth;
pub mod upload;
pub mod youtube_api;

pub use error::{ApiError, AuthError, Field, FormError};
pub use form::{Backend, FormController, FormInput, FormState, YouTubeBackend};
pub use gate::{PasswordVerifier, SecretPassword, Session};
pub use oauth::{Credential, CredentialStore};
pub use upload::{PrivacyStatus, Progress, UploadRequest, UploadTask};
