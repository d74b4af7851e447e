use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::youtube::{CaptionCue, CaptionError, CaptionSource, CaptionTrack, Connection};

/// Viewer-preference order for caption languages. First match wins.
const PREFERRED_LANGUAGES: [&str; 3] = ["en", "en-US", "en-GB"];

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("transcripts are disabled for this video")]
    TranscriptsDisabled,
    #[error("no caption track exists for this video")]
    NoTranscriptAvailable,
    #[error("the caption track contains no text")]
    EmptyTranscript,
    #[error("upstream request failed: {0}")]
    Upstream(String),
}

/// Resolves a video id to plain transcript text: list the available caption
/// tracks (proxied first when credentials are configured, with a single
/// direct fallback), pick a track by language preference, fetch its cues and
/// join them.
pub struct TranscriptResolver {
    source: Arc<dyn CaptionSource>,
    proxy_configured: bool,
}

impl TranscriptResolver {
    pub fn new(source: Arc<dyn CaptionSource>, proxy_configured: bool) -> Self {
        TranscriptResolver {
            source,
            proxy_configured,
        }
    }

    pub async fn resolve(&self, video_id: &str) -> Result<String, ResolveError> {
        let (tracks, mode) = self.list_tracks(video_id).await?;
        let track = select_track(&tracks).ok_or(ResolveError::NoTranscriptAvailable)?;
        info!(
            language = %track.language_code,
            auto_generated = track.is_auto_generated,
            "selected caption track"
        );

        let cues = self
            .source
            .fetch_cues(track, mode)
            .await
            .map_err(classify)?;
        let covered_secs = cues
            .last()
            .map(|cue| cue.start + cue.duration)
            .unwrap_or_default();
        debug!(cues = cues.len(), covered_secs, "fetched cue sequence");

        let transcript = join_cues(&cues);
        if transcript.is_empty() {
            return Err(ResolveError::EmptyTranscript);
        }
        Ok(transcript)
    }

    /// Lists tracks over the proxy when one is configured, falling back to a
    /// direct connection exactly once. The direct attempt's outcome is final.
    /// Returns the connection mode that succeeded so the cue fetch reuses it.
    async fn list_tracks(
        &self,
        video_id: &str,
    ) -> Result<(Vec<CaptionTrack>, Connection), ResolveError> {
        if self.proxy_configured {
            match self.source.list_tracks(video_id, Connection::Proxied).await {
                Ok(tracks) => {
                    info!(%video_id, "listed caption tracks through proxy");
                    return Ok((tracks, Connection::Proxied));
                }
                Err(err) => {
                    warn!(%video_id, error = %err, "proxied listing failed, retrying direct");
                }
            }
        }

        let tracks = self
            .source
            .list_tracks(video_id, Connection::Direct)
            .await
            .map_err(classify)?;
        Ok((tracks, Connection::Direct))
    }
}

fn classify(err: CaptionError) -> ResolveError {
    match err {
        CaptionError::Disabled => ResolveError::TranscriptsDisabled,
        CaptionError::VideoUnavailable(reason) => ResolveError::Upstream(reason),
        CaptionError::Other(err) => ResolveError::Upstream(err.to_string()),
    }
}

fn select_track(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    PREFERRED_LANGUAGES
        .iter()
        .find_map(|language| {
            tracks
                .iter()
                .find(|track| track.language_code == *language)
        })
        .or_else(|| tracks.first())
}

fn join_cues(cues: &[CaptionCue]) -> String {
    cues.iter()
        .map(|cue| cue.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}
