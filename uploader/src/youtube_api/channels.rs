//! YouTube Channels API types and the owned-channel directory.

use crate::error::ApiError;
use crate::youtube_api::client::YouTubeClient;
use crate::youtube_api::types::PageInfo;
use indexmap::IndexMap;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio_stream::StreamExt;

/// Response structure for the `channels.list` API call.
///
/// See: <https://developers.google.com/youtube/v3/docs/channels/list>
#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelListResponse {
    /// The value will be `youtube#channelListResponse`.
    #[serde(default)]
    pub kind: String,
    /// A list of channels that match the request criteria.
    #[serde(default)]
    pub items: VecDeque<Channel>,
    #[serde(rename = "pageInfo", default)]
    pub page_info: PageInfo,
    /// Token for the next page in the result set.
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

/// A `channel` resource: a user-owned destination that uploads are attributed to.
///
/// See: <https://developers.google.com/youtube/v3/docs/channels#resource>
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// The ID that YouTube uses to uniquely identify the channel.
    pub id: String,
    pub snippet: ChannelSnippet,
}

/// The subset of the channel snippet this crate needs.
///
/// See: <https://developers.google.com/youtube/v3/docs/channels#snippet>
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSnippet {
    /// The channel's title, used as its display name.
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "publishedAt", skip_serializing_if = "Option::is_none")]
    pub published_at: Option<Timestamp>,
}

/// Lists every channel owned by the authenticated user, as display name to channel ID.
///
/// Channels keep the order the API returned them in. Two channels with the same display name
/// collapse into the later one.
#[tracing::instrument(skip(yt))]
pub async fn list_owned_channels(yt: &YouTubeClient) -> Result<IndexMap<String, String>, ApiError> {
    let mut channels = IndexMap::new();
    let stream = yt.list_my_channels();
    let mut stream = std::pin::pin!(stream);
    while let Some(channel) = stream.next().await {
        let channel = channel?;
        channels.insert(channel.snippet.title, channel.id);
    }
    tracing::debug!(count = channels.len(), "listed owned channels");
    Ok(channels)
}
