//! YouTube Data API v3 client library.
//!
//! Only the two calls the uploader needs are covered: listing the caller's own channels
//! (`channels.list`) and creating a video from a local file (`videos.insert`).
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use yt_form_upload::config::ApiConfig;
//! use yt_form_upload::oauth::CredentialStore;
//! use yt_form_upload::upload::{UploadRequest, UploadTask};
//! use yt_form_upload::youtube_api::{YouTubeClient, channels::list_owned_channels};
//!
//! # async fn example(request: UploadRequest) -> Result<(), Box<dyn std::error::Error>> {
//! let store = CredentialStore::new("token.json", true);
//! let credential = store.load().await?;
//! let yt = YouTubeClient::new(credential, Arc::new(store), ApiConfig::default(), reqwest::Client::new());
//!
//! for (name, id) in list_owned_channels(&yt).await? {
//!     println!("{name} - {id}");
//! }
//!
//! let task = UploadTask::spawn(yt, request);
//! println!("uploaded {}", task.join().await?);
//! # Ok(())
//! # }
//! ```

pub mod channels;
pub mod client;
pub mod types;
pub mod videos;

pub use client::YouTubeClient;
pub use types::{PageInfo, PagedStream};

pub use channels::{Channel, ChannelSnippet};
pub use videos::{PrivacyStatus, Video, VideoInsert, VideoSnippet, VideoStatus};
