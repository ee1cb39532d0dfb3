// src/google/redirect.rs
//! Loopback HTTP server that receives the installed-app OAuth redirect
//!
//! One route on `127.0.0.1:<ephemeral>`: `GET /?code=..&state=..`. The first
//! redirect carrying a code or an error ends the flow; anything else
//! (favicon, preconnects, bare `/`) is answered with 404 and ignored.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::SyncError;

/// Query parameters Google appends to the redirect URI
#[derive(Debug, Default, Deserialize)]
pub struct RedirectParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// What the browser sent back to the loopback server
#[derive(Debug, PartialEq, Eq)]
pub enum Redirect {
    Code { code: String, state: String },
    Denied(String),
    Unrelated,
}

impl From<RedirectParams> for Redirect {
    fn from(params: RedirectParams) -> Self {
        match (params.error, params.code) {
            (Some(error), _) => Redirect::Denied(error),
            (None, Some(code)) => Redirect::Code {
                code,
                state: params.state.unwrap_or_default(),
            },
            (None, None) => Redirect::Unrelated,
        }
    }
}

type Outcome = Result<String, SyncError>;

#[derive(Clone)]
struct RedirectState {
    expected_state: Arc<str>,
    outcome: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

fn router(expected_state: &str, outcome: oneshot::Sender<Outcome>) -> Router {
    let state = RedirectState {
        expected_state: Arc::from(expected_state),
        outcome: Arc::new(Mutex::new(Some(outcome))),
    };
    Router::new()
        .route("/", get(handle_redirect))
        .with_state(state)
}

async fn handle_redirect(
    State(state): State<RedirectState>,
    Query(params): Query<RedirectParams>,
) -> (StatusCode, &'static str) {
    let (status, body, outcome) = match Redirect::from(params) {
        Redirect::Unrelated => return (StatusCode::NOT_FOUND, ""),
        Redirect::Denied(error) => (
            StatusCode::OK,
            "Authorization was denied. You may close this window.",
            Err(SyncError::OAuth(format!("consent denied: {}", error))),
        ),
        Redirect::Code { state: got, .. } if got != state.expected_state.as_ref() => (
            StatusCode::BAD_REQUEST,
            "State mismatch. You may close this window.",
            Err(SyncError::OAuth("state mismatch in redirect".into())),
        ),
        Redirect::Code { code, .. } => (
            StatusCode::OK,
            "The authentication flow has completed. You may close this window.",
            Ok(code),
        ),
    };

    let sender = state.outcome.lock().ok().and_then(|mut slot| slot.take());
    match sender {
        Some(tx) => {
            if tx.send(outcome).is_err() {
                debug!("redirect arrived after the flow gave up");
            }
        }
        None => debug!("ignoring repeated redirect"),
    }
    (status, body)
}

/// Bound loopback listener, ready to receive one redirect
pub struct LoopbackServer {
    listener: TcpListener,
    port: u16,
}

impl LoopbackServer {
    pub async fn bind() -> Result<Self, SyncError> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| SyncError::OAuth(format!("could not open loopback port: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| SyncError::OAuth(e.to_string()))?
            .port();
        Ok(Self { listener, port })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/", self.port)
    }

    /// Serve until a redirect with a code or an error arrives, or `timeout` passes
    pub async fn wait_for_code(
        self,
        expected_state: &str,
        timeout: Duration,
    ) -> Result<String, SyncError> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let app = router(expected_state, outcome_tx);

        debug!("loopback server listening on port {}", self.port);
        let server = tokio::spawn(async move {
            axum::serve(self.listener, app)
                .with_graceful_shutdown(async {
                    stop_rx.await.ok();
                })
                .await
        });

        let outcome = tokio::time::timeout(timeout, outcome_rx).await;
        stop_tx.send(()).ok();
        // Idle keep-alive connections may hold the server open a while longer.
        drop(server);

        match outcome {
            Ok(Ok(result)) => {
                info!("Received OAuth redirect, loopback server stopped");
                result
            }
            Ok(Err(_)) => Err(SyncError::OAuth("loopback server stopped".into())),
            Err(_) => Err(SyncError::OAuth(
                "timed out waiting for browser consent".into(),
            )),
        }
    }
}
