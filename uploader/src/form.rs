//! The upload form: input validation and the submission state machine.
//!
//! ```text
//! Idle ──open──▶ Authenticating ──password──▶ Ready ──submit──▶ Submitting ──▶ Success
//!   └───────────────(no gate)──────────────────▶ ▲                        └──▶ Failed
//!                                                └────────── acknowledge ◀──────┘
//! ```

use crate::config::ApiConfig;
use crate::error::{Field, FormError};
use crate::gate::{PasswordVerifier, Session};
use crate::oauth::CredentialStore;
use crate::upload::{CATEGORIES, ChannelRef, PrivacyStatus, UploadRequest, UploadTask, split_tags};
use crate::youtube_api::{YouTubeClient, channels::list_owned_channels};
use indexmap::IndexMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

/// The only container format the form accepts.
pub const VIDEO_EXTENSION: &str = "mp4";

/// Raw form fields, exactly as the user entered them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormInput {
    pub video: Option<PathBuf>,
    pub title: String,
    pub description: String,
    /// Comma-separated.
    pub tags: String,
    pub category_id: String,
    pub privacy_status: PrivacyStatus,
    /// Display name (or ID) of the destination channel.
    pub channel: Option<String>,
}

impl Default for FormInput {
    fn default() -> Self {
        Self {
            video: None,
            title: String::new(),
            description: String::new(),
            tags: "tag1, tag2, tag3".to_string(),
            category_id: CATEGORIES[0].0.to_string(),
            privacy_status: PrivacyStatus::default(),
            channel: None,
        }
    }
}

impl FormInput {
    /// Checks the required fields and builds the request to submit.
    ///
    /// Fields only need to be non-empty; whitespace is not trimmed. The channel is resolved
    /// later, against the channels the credential actually owns.
    pub fn validate(&self) -> Result<UploadRequest, FormError> {
        let video = match &self.video {
            Some(video) if !video.as_os_str().is_empty() => video,
            _ => return Err(FormError::validation(Field::Video, "no video file chosen")),
        };
        let is_mp4 = video
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(VIDEO_EXTENSION));
        if !is_mp4 {
            return Err(FormError::validation(
                Field::Video,
                format!("only .{VIDEO_EXTENSION} files are accepted"),
            ));
        }
        if self.title.is_empty() {
            return Err(FormError::validation(Field::Title, "empty"));
        }
        if self.description.is_empty() {
            return Err(FormError::validation(Field::Description, "empty"));
        }
        if self.tags.is_empty() {
            return Err(FormError::validation(Field::Tags, "empty"));
        }
        if !CATEGORIES.iter().any(|(code, _)| *code == self.category_id) {
            return Err(FormError::validation(
                Field::Category,
                format!("unknown category {:?}", self.category_id),
            ));
        }

        Ok(UploadRequest {
            video: video.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            tags: split_tags(&self.tags),
            category_id: self.category_id.clone(),
            privacy_status: self.privacy_status,
            channel: None,
        })
    }

    fn selected_channel(&self) -> Option<&str> {
        self.channel.as_deref().filter(|c| !c.is_empty())
    }
}

/// Everything a submission needs from the platform.
pub trait Backend {
    /// Makes sure a usable credential is available.
    fn authenticate(&mut self) -> impl Future<Output = Result<(), FormError>> + Send;

    /// Channels owned by the authenticated user, display name to channel ID.
    fn owned_channels(
        &mut self,
    ) -> impl Future<Output = Result<IndexMap<String, String>, FormError>> + Send;

    /// Uploads the video and returns its platform-assigned ID.
    fn upload(
        &mut self,
        request: UploadRequest,
    ) -> impl Future<Output = Result<String, FormError>> + Send;
}

type TaskObserver = Box<dyn Fn(&UploadTask) + Send + Sync>;

/// [`Backend`] talking to the real YouTube Data API.
pub struct YouTubeBackend {
    store: Arc<CredentialStore>,
    api: ApiConfig,
    http: reqwest::Client,
    yt: Option<YouTubeClient>,
    observer: Option<TaskObserver>,
}

impl fmt::Debug for YouTubeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YouTubeBackend")
            .field("store", &self.store)
            .field("api", &self.api)
            .field("authenticated", &self.yt.is_some())
            .finish_non_exhaustive()
    }
}

impl YouTubeBackend {
    pub fn new(store: CredentialStore, api: ApiConfig, http: reqwest::Client) -> Self {
        Self {
            store: Arc::new(store),
            api,
            http,
            yt: None,
            observer: None,
        }
    }

    /// Calls `observer` with every upload task as soon as it has been started, so the caller can
    /// follow its progress or cancel it.
    pub fn on_upload_started(mut self, observer: impl Fn(&UploadTask) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    async fn client(&mut self) -> Result<YouTubeClient, FormError> {
        if let Some(yt) = &self.yt {
            return Ok(yt.clone());
        }
        let credential = self.store.load().await?;
        let yt = YouTubeClient::new(
            credential,
            Arc::clone(&self.store),
            self.api.clone(),
            self.http.clone(),
        );
        self.yt = Some(yt.clone());
        Ok(yt)
    }
}

impl Backend for YouTubeBackend {
    async fn authenticate(&mut self) -> Result<(), FormError> {
        self.client().await.map(drop)
    }

    async fn owned_channels(&mut self) -> Result<IndexMap<String, String>, FormError> {
        let yt = self.client().await?;
        Ok(list_owned_channels(&yt).await?)
    }

    async fn upload(&mut self, request: UploadRequest) -> Result<String, FormError> {
        let yt = self.client().await?;
        let task = UploadTask::spawn(yt, request);
        if let Some(observer) = &self.observer {
            observer(&task);
        }
        Ok(task.join().await?)
    }
}

/// Where the form currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormState {
    Idle,
    /// Waiting for the gate password; the upload form is hidden.
    Authenticating,
    Ready,
    Submitting,
    Success {
        video_id: String,
        channel: Option<String>,
    },
    Failed {
        message: String,
    },
}

/// Drives one form through its states.
pub struct FormController {
    state: FormState,
    session: Session,
    gate: Option<Box<dyn PasswordVerifier>>,
    require_channel: bool,
}

impl fmt::Debug for FormController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormController")
            .field("state", &self.state)
            .field("session", &self.session)
            .field("gated", &self.gate.is_some())
            .field("require_channel", &self.require_channel)
            .finish()
    }
}

impl FormController {
    pub fn new(session: Session) -> Self {
        Self {
            state: FormState::Idle,
            session,
            gate: None,
            require_channel: false,
        }
    }

    /// Puts the form behind a password.
    pub fn with_gate(mut self, gate: impl PasswordVerifier + 'static) -> Self {
        self.gate = Some(Box::new(gate));
        self
    }

    /// Adds the channel-selection step: every submission must name one of the owned channels,
    /// unless the credential owns exactly one.
    pub fn with_channel_selection(mut self, enabled: bool) -> Self {
        self.require_channel = enabled;
        self
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Whether the upload form itself may be shown.
    pub fn is_form_visible(&self) -> bool {
        !matches!(self.state, FormState::Idle | FormState::Authenticating)
    }

    /// Leaves `Idle`, stopping at the password gate if there is one.
    pub fn open(&mut self) {
        if self.state != FormState::Idle {
            return;
        }
        self.state = if self.gate.is_some() && !self.session.is_authenticated() {
            FormState::Authenticating
        } else {
            FormState::Ready
        };
        tracing::debug!(state = ?self.state, "form opened");
    }

    /// Checks a password against the gate.
    ///
    /// On a wrong password the form stays locked.
    pub fn enter_password(&mut self, candidate: &str) -> Result<(), FormError> {
        self.open();
        if self.state != FormState::Authenticating {
            return Ok(());
        }
        let accepted = self.gate.as_ref().is_none_or(|gate| gate.verify(candidate));
        if !accepted {
            tracing::warn!("wrong password entered");
            return Err(FormError::WrongPassword);
        }
        self.session.mark_authenticated();
        self.state = FormState::Ready;
        Ok(())
    }

    /// Returns a finished submission's form to `Ready`.
    pub fn acknowledge(&mut self) {
        if matches!(self.state, FormState::Success { .. } | FormState::Failed { .. }) {
            self.state = FormState::Ready;
        }
    }

    /// Validates `input` and, if it is complete, uploads it through `backend`.
    ///
    /// Incomplete input never reaches the backend and leaves the form `Ready`. Once submission
    /// starts, any error ends in `Failed` with the error's text, and success ends in `Success`.
    #[tracing::instrument(skip_all)]
    pub async fn submit<B: Backend>(
        &mut self,
        backend: &mut B,
        input: &FormInput,
    ) -> Result<String, FormError> {
        self.open();
        self.acknowledge();
        if self.state != FormState::Ready {
            return Err(FormError::Locked);
        }

        let request = input.validate()?;

        self.state = FormState::Submitting;
        match self.run(backend, input, request).await {
            Ok((video_id, channel)) => {
                tracing::info!(%video_id, "submission succeeded");
                self.state = FormState::Success {
                    video_id: video_id.clone(),
                    channel,
                };
                Ok(video_id)
            }
            Err(e) => {
                tracing::warn!(error = %e, "submission failed");
                self.state = FormState::Failed {
                    message: e.to_string(),
                };
                Err(e)
            }
        }
    }

    async fn run<B: Backend>(
        &self,
        backend: &mut B,
        input: &FormInput,
        mut request: UploadRequest,
    ) -> Result<(String, Option<String>), FormError> {
        backend.authenticate().await?;

        if self.require_channel || input.selected_channel().is_some() {
            let channels = backend.owned_channels().await?;
            request.channel = Some(pick_channel(&channels, input.selected_channel())?);
        }
        let channel = request.channel.as_ref().map(|c| c.display_name.clone());

        let video_id = backend.upload(request).await?;
        Ok((video_id, channel))
    }

    /// The user-facing outcome of the last submission, if there is one.
    pub fn message(&self) -> Option<String> {
        match &self.state {
            FormState::Success {
                video_id,
                channel: Some(channel),
            } => Some(format!("Video uploaded to {channel}! ID: {video_id}")),
            FormState::Success { video_id, .. } => Some(format!("Video uploaded! ID: {video_id}")),
            FormState::Failed { message } => Some(format!("Error: {message}")),
            _ => None,
        }
    }
}

/// Resolves the user's channel choice (by display name, then by ID) among the owned channels.
fn pick_channel(
    channels: &IndexMap<String, String>,
    selected: Option<&str>,
) -> Result<ChannelRef, FormError> {
    let found = match selected {
        Some(wanted) => channels
            .get_key_value(wanted)
            .or_else(|| channels.iter().find(|(_, id)| id.as_str() == wanted)),
        None if channels.len() == 1 => channels.first(),
        None => None,
    };
    match found {
        Some((display_name, channel_id)) => Ok(ChannelRef {
            display_name: display_name.clone(),
            channel_id: channel_id.clone(),
        }),
        None => {
            let names = channels.keys().map(String::as_str).collect::<Vec<_>>();
            let reason = match selected {
                Some(wanted) => format!("{wanted:?} is not one of your channels {names:?}"),
                None if names.is_empty() => "this account owns no channels".to_string(),
                None => format!("choose one of {names:?}"),
            };
            Err(FormError::validation(Field::Channel, reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, AuthError};
    use crate::gate::SecretPassword;
    use crate::oauth::tests::{credential, in_an_hour, write_credential};
    use crate::youtube_api::client::tests::video_file;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeBackend {
        missing_credential: bool,
        channels: IndexMap<String, String>,
        upload_result: Option<Result<String, String>>,
        authenticated: usize,
        listed: usize,
        uploaded: Vec<UploadRequest>,
    }

    impl FakeBackend {
        fn returning(video_id: &str) -> Self {
            Self {
                upload_result: Some(Ok(video_id.to_string())),
                ..Default::default()
            }
        }
    }

    impl Backend for FakeBackend {
        async fn authenticate(&mut self) -> Result<(), FormError> {
            self.authenticated += 1;
            if self.missing_credential {
                return Err(AuthError::NotFound {
                    path: PathBuf::from("token.json"),
                }
                .into());
            }
            Ok(())
        }

        async fn owned_channels(&mut self) -> Result<IndexMap<String, String>, FormError> {
            self.listed += 1;
            Ok(self.channels.clone())
        }

        async fn upload(&mut self, request: UploadRequest) -> Result<String, FormError> {
            self.uploaded.push(request);
            match self.upload_result.clone().expect("upload was not expected") {
                Ok(id) => Ok(id),
                Err(body) => Err(ApiError::Status {
                    method: http::Method::POST,
                    status: http::StatusCode::FORBIDDEN,
                    body,
                }
                .into()),
            }
        }
    }

    fn complete_input() -> FormInput {
        FormInput {
            video: Some(PathBuf::from("clip.mp4")),
            title: "Title".to_string(),
            description: "Description".to_string(),
            tags: "a,b,c".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn success_message_contains_video_id() {
        let mut backend = FakeBackend::returning("XYZ123");
        let mut form = FormController::new(Session::new());

        let id = form.submit(&mut backend, &complete_input()).await.unwrap();
        assert_eq!(id, "XYZ123");
        assert_eq!(
            form.state(),
            &FormState::Success {
                video_id: "XYZ123".to_string(),
                channel: None
            }
        );
        assert!(form.message().unwrap().contains("XYZ123"));
        assert_eq!(backend.uploaded[0].tags, vec!["a", "b", "c"]);
        assert_eq!(backend.listed, 0);
    }

    #[tokio::test]
    async fn incomplete_input_never_reaches_backend() {
        let cases: [(&str, fn(&mut FormInput), Field); 5] = [
            ("no file", |i| i.video = None, Field::Video),
            ("empty file", |i| i.video = Some(PathBuf::new()), Field::Video),
            ("title", |i| i.title.clear(), Field::Title),
            ("description", |i| i.description.clear(), Field::Description),
            ("tags", |i| i.tags.clear(), Field::Tags),
        ];
        for (name, blank, expected) in cases {
            let mut input = complete_input();
            blank(&mut input);

            let mut backend = FakeBackend::returning("XYZ123");
            let mut form = FormController::new(Session::new());
            let err = form.submit(&mut backend, &input).await.unwrap_err();

            let FormError::Validation { field, .. } = err else {
                panic!("{name}: expected a validation error, got {err:?}");
            };
            assert_eq!(field, expected, "{name}");
            assert_eq!(backend.authenticated, 0, "{name}");
            assert!(backend.uploaded.is_empty(), "{name}");
            assert_eq!(form.state(), &FormState::Ready, "{name}");
        }
    }

    #[test]
    fn only_mp4_is_accepted() {
        let mut input = complete_input();
        input.video = Some(PathBuf::from("clip.mov"));
        assert!(matches!(
            input.validate(),
            Err(FormError::Validation {
                field: Field::Video,
                ..
            })
        ));
        input.video = Some(PathBuf::from("CLIP.MP4"));
        assert!(input.validate().is_ok());
    }

    #[test]
    fn whitespace_is_not_trimmed() {
        let mut input = complete_input();
        input.title = " ".to_string();
        input.tags = "tag1, tag2, tag3".to_string();
        let request = input.validate().unwrap();
        assert_eq!(request.title, " ");
        assert_eq!(request.tags, vec!["tag1", " tag2", " tag3"]);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let mut input = complete_input();
        input.category_id = "10".to_string();
        assert!(matches!(
            input.validate(),
            Err(FormError::Validation {
                field: Field::Category,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn missing_credential_stops_before_upload() {
        let mut backend = FakeBackend {
            missing_credential: true,
            ..FakeBackend::returning("XYZ123")
        };
        let mut form = FormController::new(Session::new());

        let err = form.submit(&mut backend, &complete_input()).await.unwrap_err();
        assert!(matches!(err, FormError::MissingCredential(_)), "{err:?}");
        assert!(backend.uploaded.is_empty());
        assert!(matches!(form.state(), FormState::Failed { .. }));
    }

    #[tokio::test]
    async fn api_error_text_is_passed_through() {
        let mut backend = FakeBackend {
            upload_result: Some(Err("quotaExceeded: daily limit".to_string())),
            ..Default::default()
        };
        let mut form = FormController::new(Session::new());

        form.submit(&mut backend, &complete_input()).await.unwrap_err();
        let message = form.message().unwrap();
        assert!(message.contains("quotaExceeded: daily limit"), "{message}");

        // the user may fix things and resubmit
        backend.upload_result = Some(Ok("SECOND".to_string()));
        assert_eq!(
            form.submit(&mut backend, &complete_input()).await.unwrap(),
            "SECOND"
        );
    }

    #[tokio::test]
    async fn wrong_password_keeps_form_hidden() {
        let mut backend = FakeBackend::returning("XYZ123");
        let mut form = FormController::new(Session::new()).with_gate(SecretPassword::new("hunter2"));
        form.open();
        assert_eq!(form.state(), &FormState::Authenticating);
        assert!(!form.is_form_visible());

        assert!(matches!(
            form.enter_password("hunter3"),
            Err(FormError::WrongPassword)
        ));
        assert_eq!(form.state(), &FormState::Authenticating);
        assert!(!form.is_form_visible());
        assert!(!form.session().is_authenticated());

        let err = form.submit(&mut backend, &complete_input()).await.unwrap_err();
        assert!(matches!(err, FormError::Locked));
        assert!(backend.uploaded.is_empty());

        form.enter_password("hunter2").unwrap();
        assert!(form.is_form_visible());
        assert!(form.session().is_authenticated());
        form.submit(&mut backend, &complete_input()).await.unwrap();
    }

    #[test]
    fn authenticated_session_skips_gate() {
        let mut session = Session::new();
        session.mark_authenticated();
        let mut form = FormController::new(session).with_gate(SecretPassword::new("hunter2"));
        form.open();
        assert_eq!(form.state(), &FormState::Ready);
    }

    #[tokio::test]
    async fn selected_channel_is_resolved() {
        let mut backend = FakeBackend {
            channels: IndexMap::from([
                ("Main".to_string(), "UC1".to_string()),
                ("Brand".to_string(), "UC2".to_string()),
            ]),
            ..FakeBackend::returning("XYZ123")
        };
        let mut form = FormController::new(Session::new()).with_channel_selection(true);
        let input = FormInput {
            channel: Some("UC2".to_string()),
            ..complete_input()
        };

        form.submit(&mut backend, &input).await.unwrap();
        assert_eq!(
            backend.uploaded[0].channel,
            Some(ChannelRef {
                display_name: "Brand".to_string(),
                channel_id: "UC2".to_string(),
            })
        );
        assert_eq!(
            form.message().unwrap(),
            "Video uploaded to Brand! ID: XYZ123"
        );
    }

    #[tokio::test]
    async fn ambiguous_channel_fails_without_upload() {
        let mut backend = FakeBackend {
            channels: IndexMap::from([
                ("Main".to_string(), "UC1".to_string()),
                ("Brand".to_string(), "UC2".to_string()),
            ]),
            ..FakeBackend::returning("XYZ123")
        };
        let mut form = FormController::new(Session::new()).with_channel_selection(true);

        let err = form.submit(&mut backend, &complete_input()).await.unwrap_err();
        assert!(matches!(
            err,
            FormError::Validation {
                field: Field::Channel,
                ..
            }
        ));
        assert!(backend.uploaded.is_empty());
        assert!(matches!(form.state(), FormState::Failed { .. }));
    }

    #[test]
    fn single_channel_is_picked_implicitly() {
        let channels = IndexMap::from([("Main".to_string(), "UC1".to_string())]);
        assert_eq!(
            pick_channel(&channels, None).unwrap().channel_id,
            "UC1".to_string()
        );
        assert!(pick_channel(&channels, Some("Other")).is_err());
        assert!(pick_channel(&IndexMap::new(), None).is_err());
    }

    fn youtube_backend(server_url: &str, token_path: PathBuf) -> YouTubeBackend {
        let api = ApiConfig {
            base_url: server_url.to_string(),
            upload_base_url: server_url.to_string(),
        };
        YouTubeBackend::new(
            CredentialStore::new(token_path, true),
            api,
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn youtube_backend_without_credential_makes_no_calls() {
        let mut server = mockito::Server::new_async().await;
        let channels = server
            .mock("GET", "/youtube/v3/channels")
            .match_query(mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let insert = server
            .mock("POST", "/upload/youtube/v3/videos")
            .match_query(mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut backend = youtube_backend(&server.url(), dir.path().join("token.json"));
        let mut form = FormController::new(Session::new());
        let input = FormInput {
            video: Some(video_file(dir.path(), b"bytes")),
            channel: Some("Main".to_string()),
            ..complete_input()
        };

        let err = form.submit(&mut backend, &input).await.unwrap_err();
        assert!(matches!(err, FormError::MissingCredential(_)), "{err:?}");
        assert!(matches!(form.state(), FormState::Failed { .. }));
        channels.assert_async().await;
        insert.assert_async().await;
    }

    #[tokio::test]
    async fn youtube_backend_reports_started_upload() {
        let mut server = mockito::Server::new_async().await;
        let insert = server
            .mock("POST", "/upload/youtube/v3/videos")
            .match_query(mockito::Matcher::Any)
            .match_header("authorization", "Bearer old-access")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"kind":"youtube#video","id":"XYZ123"}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let token_path = write_credential(
            dir.path(),
            &credential("http://unused.invalid/token", Some(in_an_hour())),
        );
        let started = Arc::new(AtomicUsize::new(0));
        let mut backend = youtube_backend(&server.url(), token_path).on_upload_started({
            let started = Arc::clone(&started);
            move |_: &UploadTask| {
                started.fetch_add(1, Ordering::SeqCst);
            }
        });
        let mut form = FormController::new(Session::new());
        let input = FormInput {
            video: Some(video_file(dir.path(), b"not really a video")),
            ..complete_input()
        };

        let id = form.submit(&mut backend, &input).await.unwrap();
        insert.assert_async().await;
        assert_eq!(id, "XYZ123");
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(form.message().unwrap().contains("XYZ123"));
    }
}
