use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, Method, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use clap_serde_derive::ClapSerde;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::RelayResult;
use crate::resolver::TranscriptResolver;
use crate::youtube::InnertubeSource;

mod config;
mod error;
mod resolver;
mod youtube;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env, default_value = "TranscriptRelay.toml")]
    config_file: String,

    /// Configuration options
    #[command(flatten)]
    pub opt_config: <Config as ClapSerde>::Opt,
}

#[derive(Clone)]
struct AppState {
    resolver: Arc<TranscriptResolver>,
}

#[derive(Deserialize, Debug)]
struct TranscriptRequest {
    video_id: Option<String>,
}

#[derive(Deserialize, Debug)]
struct TranscriptQuery {
    video_id: Option<String>,
}

#[derive(Serialize, Debug)]
struct TranscriptResponse {
    transcript: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("INFO")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = match Config::from_toml(&args.config_file) {
        Ok(conf) => conf.merge(args.opt_config),
        Err(err) => {
            if args.config_file == "TranscriptRelay.toml" {
                Config::default().merge(args.opt_config)
            } else {
                exit_err!(
                    1,
                    "Failed to read configuration file {} with error: {}",
                    args.config_file,
                    err
                );
            }
        }
    };

    let credentials = config.proxy_credentials();
    if credentials.is_none() {
        warn!("WebShare proxy credentials not set, requests may be blocked by the caption provider");
    }
    let source = InnertubeSource::new(
        config.request_timeout(),
        &config.proxy_url,
        credentials.as_ref(),
    )?;
    let state = AppState {
        resolver: Arc::new(TranscriptResolver::new(
            Arc::new(source),
            credentials.is_some(),
        )),
    };

    let listener = TcpListener::bind(format!("{}:{}", config.address, config.port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route(
            "/api/get-transcript",
            get(handle_transcript_query).post(handle_transcript_body),
        )
        .route("/healthz", get(|| async { StatusCode::OK }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down..."),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}

#[axum_macros::debug_handler]
async fn handle_transcript_query(
    State(state): State<AppState>,
    Query(query): Query<TranscriptQuery>,
) -> RelayResult<(StatusCode, Json<TranscriptResponse>)> {
    let Some(video_id) = query.video_id.filter(|id| !id.is_empty()) else {
        bail_relay!(StatusCode::BAD_REQUEST, "Missing video_id parameter");
    };
    resolve_transcript(&state, &video_id).await
}

#[axum_macros::debug_handler]
async fn handle_transcript_body(
    State(state): State<AppState>,
    payload: Result<Json<TranscriptRequest>, JsonRejection>,
) -> RelayResult<(StatusCode, Json<TranscriptResponse>)> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => bail_relay!(
            StatusCode::BAD_REQUEST,
            "Invalid JSON in request body: {}",
            rejection.body_text()
        ),
    };
    let Some(video_id) = request.video_id.filter(|id| !id.is_empty()) else {
        bail_relay!(StatusCode::BAD_REQUEST, "Missing video_id in request body");
    };
    resolve_transcript(&state, &video_id).await
}

async fn resolve_transcript(
    state: &AppState,
    video_id: &str,
) -> RelayResult<(StatusCode, Json<TranscriptResponse>)> {
    info!(%video_id, "fetching transcript");
    match state.resolver.resolve(video_id).await {
        Ok(transcript) => Ok((StatusCode::OK, Json(TranscriptResponse { transcript }))),
        Err(err) => Err(crate::error::RelayError::from_resolve(video_id, err)),
    }
}

#[macro_export]
macro_rules! exit_err {
    ($code:expr, $fmt:expr $(, $arg:expr)*) => {
        {
            error!($fmt $(, $arg)*);
            std::process::exit($code);
        }
    };
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::youtube::{CaptionCue, CaptionError, CaptionSource, CaptionTrack, Connection};

    use super::*;

    struct FixedSource {
        tracks: Vec<CaptionTrack>,
        cues: Vec<CaptionCue>,
    }

    #[async_trait]
    impl CaptionSource for FixedSource {
        async fn list_tracks(
            &self,
            _video_id: &str,
            _mode: Connection,
        ) -> Result<Vec<CaptionTrack>, CaptionError> {
            Ok(self.tracks.clone())
        }

        async fn fetch_cues(
            &self,
            _track: &CaptionTrack,
            _mode: Connection,
        ) -> Result<Vec<CaptionCue>, CaptionError> {
            Ok(self.cues.clone())
        }
    }

    fn app(tracks: Vec<CaptionTrack>, cues: Vec<CaptionCue>) -> Router {
        let source = Arc::new(FixedSource { tracks, cues });
        router(AppState {
            resolver: Arc::new(TranscriptResolver::new(source, false)),
        })
    }

    fn english_app() -> Router {
        app(
            vec![CaptionTrack {
                language_code: "en".to_string(),
                is_auto_generated: false,
                base_url: "https://captions.invalid/en".to_string(),
            }],
            vec![
                CaptionCue {
                    text: "never gonna give you up".to_string(),
                    start: 0.0,
                    duration: 2.4,
                },
                CaptionCue {
                    text: "never gonna let you down".to_string(),
                    start: 2.4,
                    duration: 2.1,
                },
            ],
        )
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn post_returns_the_joined_transcript() {
        let response = english_app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/get-transcript")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::from(r#"{"video_id":"8vXoI7lUroQ"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
        let body = body_json(response).await;
        assert_eq!(
            body["transcript"],
            "never gonna give you up never gonna let you down"
        );
    }

    #[tokio::test]
    async fn get_accepts_the_query_parameter_form() {
        let response = english_app()
            .oneshot(
                Request::builder()
                    .uri("/api/get-transcript?video_id=8vXoI7lUroQ")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(!body["transcript"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_video_id_is_a_400_with_json_body() {
        let response = english_app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/get-transcript")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Missing video_id"));
    }

    #[tokio::test]
    async fn unparseable_body_is_a_400_with_json_body() {
        let response = english_app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/get-transcript")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid JSON"));
    }

    #[tokio::test]
    async fn video_without_tracks_is_a_404() {
        let response = app(vec![], vec![])
            .oneshot(
                Request::builder()
                    .uri("/api/get-transcript?video_id=8vXoI7lUroQ")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["details"], "Video ID: 8vXoI7lUroQ");
    }

    #[tokio::test]
    async fn preflight_gets_cors_headers_and_no_body() {
        let response = english_app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/get-transcript")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_success());
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn healthz_answers_ok() {
        let response = english_app()
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
