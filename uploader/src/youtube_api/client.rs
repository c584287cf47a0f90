//! Core YouTube API client functionality and authentication management.

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::oauth::{Credential, CredentialStore};
use crate::upload::{MultipartRelated, Progress, UploadRequest};
use crate::youtube_api::{
    channels::{Channel, ChannelListResponse},
    types::PagedStream,
    videos::Video,
};
use http::Method;
use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio_stream::Stream;
use tracing::instrument;

/// Client for interacting with the YouTube Data API v3.
///
/// The client owns the credential it was built from and refreshes it through the
/// [`CredentialStore`] before any call once it has expired, so a platform call is never made
/// with a stale access token.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    /// The current credential, shared between clones so a refresh is seen by all of them.
    credential: Arc<Mutex<Credential>>,
    /// Store used for refreshing (and persisting) the credential.
    store: Arc<CredentialStore>,
    /// HTTP client for API requests
    client: reqwest::Client,
    api: Arc<ApiConfig>,
}

impl YouTubeClient {
    /// Creates a new YouTube API client.
    ///
    /// # Arguments
    ///
    /// * `credential` - The credential to authorize calls with, usually from [`CredentialStore::load`]
    /// * `store` - Store to refresh the credential through once it expires
    /// * `api` - Base URLs of the data and upload endpoints
    /// * `client` - Shared HTTP client for making API requests
    pub fn new(
        credential: Credential,
        store: Arc<CredentialStore>,
        api: ApiConfig,
        client: reqwest::Client,
    ) -> Self {
        Self {
            credential: Arc::new(Mutex::new(credential)),
            store,
            client,
            api: Arc::new(api),
        }
    }

    /// Returns a clone of the current credential.
    pub async fn credential(&self) -> Credential {
        self.credential.lock().await.clone()
    }

    /// Gets a guaranteed-fresh access token, refreshing if necessary.
    #[instrument(skip(self), level = tracing::Level::TRACE)]
    pub(crate) async fn fresh_access_token(&self) -> Result<String, ApiError> {
        let mut credential = self.credential.lock().await;
        if self.store.ensure_fresh(&mut credential).await? {
            tracing::debug!("access token successfully refreshed");
        }
        Ok(credential.access_token.clone())
    }

    /// Starts a request with a fresh bearer token attached.
    async fn authorized(&self, method: Method, url: &str) -> Result<reqwest::RequestBuilder, ApiError> {
        let access_token = self.fresh_access_token().await?;
        Ok(self
            .client
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", access_token)))
    }

    /// Sends a prepared request and turns any non-success status into [`ApiError::Status`].
    ///
    /// The response body of a failed call is kept verbatim in the error.
    async fn send_checked(
        &self,
        method: Method,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        let response = request.send().await.map_err(|source| ApiError::Transport {
            method: method.clone(),
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            tracing::warn!(%status, %method, url, "YouTube API request failed");
            return Err(ApiError::Status {
                method,
                status,
                body,
            });
        }

        Ok(response)
    }

    /// Makes an authenticated HTTP request to the YouTube API with common error handling.
    ///
    /// # Arguments
    ///
    /// * `method` - The HTTP method to use (GET, POST, etc.)
    /// * `url` - The API endpoint URL
    /// * `query_params` - Optional query parameters
    /// * `json_body` - Optional JSON body
    #[instrument(skip(self, json_body), level = tracing::Level::TRACE)]
    pub(crate) async fn make_authenticated_request(
        &self,
        method: Method,
        url: &str,
        query_params: Option<&[(&str, &str)]>,
        json_body: Option<&impl Serialize>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self.authorized(method.clone(), url).await?;

        if let Some(params) = query_params {
            request = request.query(params);
        }

        if let Some(body) = json_body {
            request = request.json(body);
        }

        self.send_checked(method, url, request).await
    }

    /// Returns a paginated stream of all channels owned by the authenticated user.
    ///
    /// Uses the `channels.list` API with `mine=true`.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/channels/list>
    #[instrument(skip(self))]
    pub fn list_my_channels(&self) -> impl Stream<Item = Result<Channel, ApiError>> + use<'_> {
        PagedStream::new(move |page_token| async move {
            let response = self.list_channels_internal(50, page_token).await?;
            Ok((response.items, response.next_page_token))
        })
    }

    /// Uploads a video and its metadata in a single `multipart/related` request.
    ///
    /// The file is streamed from disk. Every chunk handed to the HTTP stack is counted into
    /// `progress`, if given.
    ///
    /// No resumable-upload session is used, and nothing is retried: the call either creates the
    /// video or fails.
    ///
    /// # Returns
    ///
    /// The created [`Video`] resource, whose `id` is the platform-assigned video identifier.
    ///
    /// # Required Scopes
    ///
    /// * `https://www.googleapis.com/auth/youtube.upload`
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/videos/insert>
    #[instrument(skip(self, progress), fields(video = %request.video.display()))]
    pub async fn insert_video(
        &self,
        request: &UploadRequest,
        progress: Option<watch::Sender<Progress>>,
    ) -> Result<Video, ApiError> {
        let url = format!(
            "{}/upload/youtube/v3/videos",
            self.api.upload_base_url.trim_end_matches('/')
        );
        let file_err = |source| ApiError::File {
            path: request.video.clone(),
            source,
        };

        let file = tokio::fs::File::open(&request.video)
            .await
            .map_err(file_err)?;
        let media_len = file.metadata().await.map_err(file_err)?.len();

        let metadata = serde_json::to_vec(&request.metadata())
            .expect("video metadata is plain strings and always serializes");
        let media_type = mime_guess::from_path(&request.video).first_or_octet_stream();
        let multipart = MultipartRelated::new(&metadata, media_type.essence_str());
        let content_type = multipart.content_type();
        let content_length = multipart.content_length(media_len);

        let progress = progress.unwrap_or_else(|| watch::channel(Progress::default()).0);
        progress.send_modify(|p| {
            p.sent = 0;
            p.total = content_length;
        });
        let body = reqwest::Body::wrap_stream(multipart.into_stream(file, progress));

        let query_params = [("uploadType", "multipart"), ("part", "snippet,status")];
        let request = self
            .authorized(Method::POST, &url)
            .await?
            .query(&query_params)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, content_length)
            .body(body);

        let response = self.send_checked(Method::POST, &url, request).await?;
        let video: Video = response.json().await.map_err(ApiError::Decode)?;

        tracing::info!(video_id = %video.id, "successfully uploaded video");
        Ok(video)
    }

    /// Internal method to call the `channels.list` API with configurable parameters.
    ///
    /// # Arguments
    ///
    /// * `max_results` - Maximum number of channels to return (1-50)
    /// * `page_token` - Optional page token for pagination
    async fn list_channels_internal(
        &self,
        max_results: u32,
        page_token: Option<String>,
    ) -> Result<ChannelListResponse, ApiError> {
        let url = format!(
            "{}/youtube/v3/channels",
            self.api.base_url.trim_end_matches('/')
        );
        let max_results_string = max_results.to_string();
        let mut query_params = vec![
            ("part", "id,snippet"),
            ("mine", "true"),
            ("maxResults", max_results_string.as_str()),
        ];

        if let Some(ref token) = page_token {
            query_params.push(("pageToken", token.as_str()));
        }

        let response = self
            .make_authenticated_request(Method::GET, &url, Some(&query_params), None::<&()>)
            .await?;

        let channels: ChannelListResponse = response.json().await.map_err(ApiError::Decode)?;

        tracing::debug!(
            total_results = channels.page_info.total_results,
            returned_items = channels.items.len(),
            "fetched channels"
        );

        Ok(channels)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::oauth::tests::{an_hour_ago, credential, in_an_hour, write_credential};
    use crate::upload::split_tags;
    use crate::youtube_api::channels::list_owned_channels;
    use crate::youtube_api::videos::PrivacyStatus;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    pub(crate) fn client_for(server_url: &str, dir: &Path, credential: Credential) -> YouTubeClient {
        let path = write_credential(dir, &credential);
        let api = ApiConfig {
            base_url: server_url.to_string(),
            upload_base_url: server_url.to_string(),
        };
        YouTubeClient::new(
            credential,
            Arc::new(CredentialStore::new(path, true)),
            api,
            reqwest::Client::new(),
        )
    }

    pub(crate) fn video_file(dir: &Path, content: &[u8]) -> std::path::PathBuf {
        let path = dir.join("clip.mp4");
        std::fs::write(&path, content).unwrap();
        path
    }

    pub(crate) fn request_for(video: std::path::PathBuf) -> UploadRequest {
        UploadRequest {
            video,
            title: "My title".to_string(),
            description: "My description".to_string(),
            tags: split_tags("a,b,c"),
            category_id: "22".to_string(),
            privacy_status: PrivacyStatus::Public,
            channel: None,
        }
    }

    #[tokio::test]
    async fn lists_channels_across_pages() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/youtube/v3/channels")
            .match_header("authorization", "Bearer old-access")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("mine".into(), "true".into()),
                Matcher::UrlEncoded("part".into(), "id,snippet".into()),
            ]))
            .expect(1)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"kind":"youtube#channelListResponse",
                    "pageInfo":{"totalResults":2,"resultsPerPage":1},
                    "nextPageToken":"next",
                    "items":[{"id":"UC1","snippet":{"title":"Main","publishedAt":"2020-01-01T00:00:00Z"}}]}"#,
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/youtube/v3/channels")
            .match_query(Matcher::UrlEncoded("pageToken".into(), "next".into()))
            .expect(1)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"kind":"youtube#channelListResponse",
                    "pageInfo":{"totalResults":2,"resultsPerPage":1},
                    "items":[{"id":"UC2","snippet":{"title":"Brand"}}]}"#,
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let yt = client_for(
            &server.url(),
            dir.path(),
            credential("http://unused.invalid/token", Some(in_an_hour())),
        );
        let channels = list_owned_channels(&yt).await.unwrap();
        first.assert_async().await;
        second.assert_async().await;

        let channels: Vec<_> = channels.into_iter().collect();
        assert_eq!(
            channels,
            vec![
                ("Main".to_string(), "UC1".to_string()),
                ("Brand".to_string(), "UC2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn channel_list_error_keeps_platform_message() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/youtube/v3/channels")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"error":{"message":"quotaExceeded"}}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let yt = client_for(
            &server.url(),
            dir.path(),
            credential("http://unused.invalid/token", Some(in_an_hour())),
        );
        let err = list_owned_channels(&yt).await.unwrap_err();
        assert!(matches!(err, ApiError::Status { .. }), "{err:?}");
        assert!(err.to_string().contains(r#"{"error":{"message":"quotaExceeded"}}"#));
    }

    #[tokio::test]
    async fn uploads_metadata_and_media_in_one_request() {
        let mut server = mockito::Server::new_async().await;
        let insert = server
            .mock("POST", "/upload/youtube/v3/videos")
            .match_header("authorization", "Bearer old-access")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/related; boundary=".into()),
            )
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("uploadType".into(), "multipart".into()),
                Matcher::UrlEncoded("part".into(), "snippet,status".into()),
            ]))
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""tags":\["a","b","c"\]"#.into()),
                Matcher::Regex(r#""categoryId":"22""#.into()),
                Matcher::Regex(r#""privacyStatus":"public""#.into()),
                Matcher::Regex("Content-Type: video/mp4".into()),
                Matcher::Regex("not really a video".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"kind":"youtube#video","id":"XYZ123"}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let yt = client_for(
            &server.url(),
            dir.path(),
            credential("http://unused.invalid/token", Some(in_an_hour())),
        );
        let request = request_for(video_file(dir.path(), b"not really a video"));
        let (tx, rx) = watch::channel(Progress::default());
        let video = yt.insert_video(&request, Some(tx)).await.unwrap();
        insert.assert_async().await;

        assert_eq!(video.id, "XYZ123");
        let progress = *rx.borrow();
        assert!(progress.total > 18);
        assert_eq!(progress.sent, progress.total);
    }

    #[tokio::test]
    async fn missing_video_file_fails_before_any_call() {
        let mut server = mockito::Server::new_async().await;
        let insert = server
            .mock("POST", "/upload/youtube/v3/videos")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let yt = client_for(
            &server.url(),
            dir.path(),
            credential("http://unused.invalid/token", Some(in_an_hour())),
        );
        let err = yt
            .insert_video(&request_for(dir.path().join("gone.mp4")), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::File { .. }), "{err:?}");
        insert.assert_async().await;
    }

    #[tokio::test]
    async fn expired_credential_is_refreshed_before_upload() {
        let mut server = mockito::Server::new_async().await;
        let token = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"new-access","token_type":"Bearer","expires_in":3599}"#)
            .expect(1)
            .create_async()
            .await;
        let insert = server
            .mock("POST", "/upload/youtube/v3/videos")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer new-access")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"XYZ123"}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let yt = client_for(
            &server.url(),
            dir.path(),
            credential(&format!("{}/token", server.url()), Some(an_hour_ago())),
        );
        let request = request_for(video_file(dir.path(), b"bytes"));
        let video = yt.insert_video(&request, None).await.unwrap();
        assert_eq!(video.id, "XYZ123");
        token.assert_async().await;
        insert.assert_async().await;

        let credential = yt.credential().await;
        assert!(credential.expiry.unwrap() > jiff::Timestamp::now());
    }
}
