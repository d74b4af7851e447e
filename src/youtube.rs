use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{Client, Proxy, Url};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::ProxyCredentials;

const PLAYER_URL: &str = "https://www.youtube.com/youtubei/v1/player";

// The Android innertube client receives caption URLs that are fetchable
// without signature handling.
const CLIENT_NAME: &str = "ANDROID";
const CLIENT_VERSION: &str = "20.10.38";

/// Which upstream path a single attempt takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connection {
    Proxied,
    Direct,
}

/// One caption stream offered by the provider for a video.
#[derive(Clone, Debug)]
pub struct CaptionTrack {
    pub language_code: String,
    pub is_auto_generated: bool,
    pub(crate) base_url: String,
}

/// One timed caption entry. Times are in seconds.
#[derive(Clone, Debug)]
pub struct CaptionCue {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("captions are disabled for this video")]
    Disabled,
    #[error("video is not playable: {0}")]
    VideoUnavailable(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait CaptionSource: Send + Sync {
    async fn list_tracks(
        &self,
        video_id: &str,
        mode: Connection,
    ) -> Result<Vec<CaptionTrack>, CaptionError>;

    async fn fetch_cues(
        &self,
        track: &CaptionTrack,
        mode: Connection,
    ) -> Result<Vec<CaptionCue>, CaptionError>;
}

/// Caption source backed by YouTube's innertube `player` endpoint, holding
/// one direct client and, when credentials are configured, one proxied
/// client. Both apply the same fixed request timeout.
pub struct InnertubeSource {
    direct: Client,
    proxied: Option<Client>,
}

impl InnertubeSource {
    pub fn new(
        timeout: Duration,
        proxy_url: &str,
        credentials: Option<&ProxyCredentials>,
    ) -> anyhow::Result<Self> {
        let direct = Client::builder().timeout(timeout).build()?;
        let proxied = credentials
            .map(|creds| -> anyhow::Result<Client> {
                let url = Url::parse(proxy_url)
                    .with_context(|| format!("Invalid proxy URL {proxy_url}"))?;
                let proxy = Proxy::all(url)?.basic_auth(&creds.username, &creds.password);
                Ok(Client::builder().timeout(timeout).proxy(proxy).build()?)
            })
            .transpose()?;
        Ok(InnertubeSource { direct, proxied })
    }

    fn client(&self, mode: Connection) -> Result<&Client, CaptionError> {
        match mode {
            Connection::Direct => Ok(&self.direct),
            Connection::Proxied => self
                .proxied
                .as_ref()
                .ok_or_else(|| CaptionError::Other(anyhow!("No proxy client configured"))),
        }
    }
}

#[async_trait]
impl CaptionSource for InnertubeSource {
    async fn list_tracks(
        &self,
        video_id: &str,
        mode: Connection,
    ) -> Result<Vec<CaptionTrack>, CaptionError> {
        let body = json!({
            "context": {
                "client": {
                    "clientName": CLIENT_NAME,
                    "clientVersion": CLIENT_VERSION,
                }
            },
            "videoId": video_id,
        });
        let response = self
            .client(mode)?
            .post(PLAYER_URL)
            .json(&body)
            .send()
            .await
            .context("Player request failed")?
            .error_for_status()
            .context("Player request rejected")?;
        let player: PlayerResponse = response
            .json()
            .await
            .context("Malformed player response")?;
        tracks_from_player_response(player)
    }

    async fn fetch_cues(
        &self,
        track: &CaptionTrack,
        mode: Connection,
    ) -> Result<Vec<CaptionCue>, CaptionError> {
        let url = timedtext_url(&track.base_url)?;
        let response = self
            .client(mode)?
            .get(url)
            .send()
            .await
            .context("Timedtext request failed")?
            .error_for_status()
            .context("Timedtext request rejected")?;
        let timedtext: TimedText = response
            .json()
            .await
            .context("Malformed timedtext response")?;
        Ok(cues_from_timedtext(timedtext))
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    captions: Option<Captions>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PlayabilityStatus {
    status: Option<String>,
    reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Captions {
    player_captions_tracklist_renderer: Option<TracklistRenderer>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TracklistRenderer {
    #[serde(default)]
    caption_tracks: Vec<RawCaptionTrack>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawCaptionTrack {
    base_url: String,
    language_code: String,
    // "asr" marks speech-recognition tracks
    kind: Option<String>,
}

/// A playable video without a captions renderer has captions turned off;
/// a non-OK playability status is a provider-side refusal, not "disabled".
fn tracks_from_player_response(
    player: PlayerResponse,
) -> Result<Vec<CaptionTrack>, CaptionError> {
    if let Some(playability) = &player.playability_status {
        match playability.status.as_deref() {
            Some("OK") | None => {}
            Some(status) => {
                let reason = playability
                    .reason
                    .clone()
                    .unwrap_or_else(|| status.to_string());
                return Err(CaptionError::VideoUnavailable(reason));
            }
        }
    }

    let renderer = player
        .captions
        .and_then(|captions| captions.player_captions_tracklist_renderer)
        .ok_or(CaptionError::Disabled)?;

    Ok(renderer
        .caption_tracks
        .into_iter()
        .map(|raw| CaptionTrack {
            language_code: raw.language_code,
            is_auto_generated: raw.kind.as_deref() == Some("asr"),
            base_url: raw.base_url,
        })
        .collect())
}

fn timedtext_url(base_url: &str) -> Result<Url, CaptionError> {
    let mut url = Url::parse(base_url)
        .map_err(|err| anyhow!("Invalid caption track URL: {err}"))?;
    url.query_pairs_mut().append_pair("fmt", "json3");
    Ok(url)
}

#[derive(Deserialize, Debug)]
struct TimedText {
    #[serde(default)]
    events: Vec<TimedTextEvent>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TimedTextEvent {
    t_start_ms: Option<u64>,
    d_duration_ms: Option<u64>,
    segs: Option<Vec<TimedTextSegment>>,
}

#[derive(Deserialize, Debug)]
struct TimedTextSegment {
    #[serde(default)]
    utf8: String,
}

/// Events without segments only define caption windows and carry no text.
/// Newlines inside an event separate rendered lines, not cues.
fn cues_from_timedtext(timedtext: TimedText) -> Vec<CaptionCue> {
    timedtext
        .events
        .into_iter()
        .filter_map(|event| {
            let segments = event.segs?;
            let text = segments
                .into_iter()
                .map(|segment| segment.utf8)
                .collect::<String>()
                .replace('\n', " ")
                .trim()
                .to_string();
            if text.is_empty() {
                return None;
            }
            Some(CaptionCue {
                text,
                start: event.t_start_ms.unwrap_or(0) as f64 / 1000.0,
                duration: event.d_duration_ms.unwrap_or(0) as f64 / 1000.0,
            })
        })
        .collect()
}
