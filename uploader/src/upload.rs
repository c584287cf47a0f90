//! Upload requests, the `multipart/related` body they are sent as, and the task handle that
//! runs an upload in the background.

use crate::error::ApiError;
use crate::youtube_api::YouTubeClient;
use crate::youtube_api::videos::{VideoInsert, VideoSnippet, VideoStatus};
use bytes::Bytes;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::path::PathBuf;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_stream::{Stream, StreamExt};
use tokio_util::io::ReaderStream;

pub use crate::youtube_api::videos::PrivacyStatus;

/// Category code for "People & Blogs", the only category the form offers.
pub const PEOPLE_AND_BLOGS: &str = "22";

/// Categories a user may pick from, as (code, label).
pub const CATEGORIES: &[(&str, &str)] = &[(PEOPLE_AND_BLOGS, "People & Blogs")];

/// A channel the user picked as the upload's destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub display_name: String,
    pub channel_id: String,
}

/// One video submission: the local file plus everything that goes into its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub video: PathBuf,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: PrivacyStatus,
    /// Uploads are always attributed to the credential's own channel; this is what the user
    /// picked and is only used for reporting.
    pub channel: Option<ChannelRef>,
}

impl UploadRequest {
    /// The `snippet` and `status` parts sent alongside the media.
    pub fn metadata(&self) -> VideoInsert {
        VideoInsert {
            snippet: VideoSnippet {
                title: self.title.clone(),
                description: self.description.clone(),
                tags: self.tags.clone(),
                category_id: self.category_id.clone(),
            },
            status: VideoStatus {
                privacy_status: self.privacy_status,
            },
        }
    }
}

/// Splits comma-separated tag input.
///
/// Whitespace around each tag is kept as typed: `"a, b"` yields `["a", " b"]`.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',').map(str::to_string).collect()
}

/// Bytes of the request body handed to the HTTP stack so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub sent: u64,
    pub total: u64,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.sent >= self.total
    }
}

/// Framing for a two-part `multipart/related` body: JSON metadata, then the media.
///
/// See: <https://developers.google.com/youtube/v3/guides/using_resumable_upload_protocol>
/// (the multipart variant uses the same parts, in one request).
#[derive(Debug)]
pub(crate) struct MultipartRelated {
    boundary: String,
    head: Bytes,
    tail: Bytes,
}

impl MultipartRelated {
    pub(crate) fn new(metadata_json: &[u8], media_type: &str) -> Self {
        let boundary: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        Self::with_boundary(boundary, metadata_json, media_type)
    }

    fn with_boundary(boundary: String, metadata_json: &[u8], media_type: &str) -> Self {
        let mut head = Vec::with_capacity(metadata_json.len() + 2 * boundary.len() + 128);
        head.extend_from_slice(
            format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n")
                .as_bytes(),
        );
        head.extend_from_slice(metadata_json);
        head.extend_from_slice(
            format!("\r\n--{boundary}\r\nContent-Type: {media_type}\r\n\r\n").as_bytes(),
        );
        let tail = format!("\r\n--{boundary}--\r\n");
        Self {
            boundary,
            head: Bytes::from(head),
            tail: Bytes::from(tail),
        }
    }

    pub(crate) fn content_type(&self) -> String {
        format!("multipart/related; boundary={}", self.boundary)
    }

    pub(crate) fn content_length(&self, media_len: u64) -> u64 {
        self.head.len() as u64 + media_len + self.tail.len() as u64
    }

    /// The full body, reading the media from `media` as it is sent.
    pub(crate) fn into_stream<R>(
        self,
        media: R,
        progress: watch::Sender<Progress>,
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static
    where
        R: tokio::io::AsyncRead + Send + Sync + 'static,
    {
        async_stream::try_stream! {
            let Self { head, tail, .. } = self;
            progress.send_modify(|p| p.sent += head.len() as u64);
            yield head;

            let chunks = ReaderStream::new(media);
            let mut chunks = std::pin::pin!(chunks);
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                progress.send_modify(|p| p.sent += chunk.len() as u64);
                yield chunk;
            }

            progress.send_modify(|p| p.sent += tail.len() as u64);
            yield tail;
        }
    }
}

/// An upload running in the background.
///
/// Progress can be observed while it runs, and the upload can be cancelled from anywhere that
/// holds a [`CancelHandle`].
#[derive(Debug)]
pub struct UploadTask {
    progress: watch::Receiver<Progress>,
    handle: JoinHandle<Result<String, ApiError>>,
}

/// Cancels the [`UploadTask`] it was taken from.
#[derive(Debug, Clone)]
pub struct CancelHandle(AbortHandle);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.abort();
    }
}

impl UploadTask {
    /// Starts uploading `request` on the current runtime.
    pub fn spawn(yt: YouTubeClient, request: UploadRequest) -> Self {
        let (tx, rx) = watch::channel(Progress::default());
        let handle = tokio::spawn(async move {
            let video = yt.insert_video(&request, Some(tx)).await?;
            Ok::<_, ApiError>(video.id)
        });
        Self {
            progress: rx,
            handle,
        }
    }

    /// A receiver that is notified whenever more of the body has been sent.
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.clone()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.handle.abort_handle())
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the upload to finish and returns the new video's ID.
    pub async fn join(self) -> Result<String, ApiError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => {
                tracing::info!("upload cancelled");
                Err(ApiError::Cancelled)
            }
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}
