use std::{convert::Infallible, time::Duration};

use async_stream::stream;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, interval_at};

use crate::{
    adapters::http::{app_state::AppState, extract::CurrentAccount},
    app_error::AppResult,
    application::use_cases::subscription::{
        CheckoutInput, StatusSnapshot, StatusWatcher, WebhookOutcome,
    },
};

const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stripe/webhook", post(stripe_webhook))
        .route("/current", get(current))
        .route("/entitlements", get(entitlements))
        .route("/trial", post(start_trial))
        .route("/checkout", post(create_checkout))
        .route("/referral/create", post(create_referral_code))
        .route("/stream", get(stream_status))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
struct CheckoutPayload {
    plan: String,
    success_url: String,
    cancel_url: String,
    #[serde(default)]
    promotion_code: Option<String>,
}

#[derive(Serialize)]
struct CheckoutResponse {
    url: String,
}

#[derive(Serialize)]
struct ReferralResponse {
    code: String,
}

#[derive(Serialize)]
struct WebhookAck {
    ok: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/subscriptions/stripe/webhook
/// Needs the raw body: the signature covers the exact bytes sent.
async fn stripe_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = app_state
        .subscription_use_cases
        .receive_webhook(&body, signature)
        .await?;

    match &outcome {
        WebhookOutcome::NoAccount => tracing::info!("Webhook matched no account"),
        outcome => tracing::debug!(?outcome, "Webhook processed"),
    }

    Ok(Json(WebhookAck { ok: true }))
}

/// GET /api/v1/subscriptions/current
async fn current(CurrentAccount(account): CurrentAccount) -> Json<StatusSnapshot> {
    Json(StatusSnapshot::of(&account))
}

/// GET /api/v1/subscriptions/entitlements
async fn entitlements(
    State(app_state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> impl IntoResponse {
    Json(app_state.subscription_use_cases.entitlements(&account))
}

/// POST /api/v1/subscriptions/trial
async fn start_trial(
    State(app_state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> AppResult<Json<StatusSnapshot>> {
    let account = app_state
        .subscription_use_cases
        .start_trial(&account, app_state.config.trial_days)
        .await?;

    Ok(Json(StatusSnapshot::of(&account)))
}

/// POST /api/v1/subscriptions/checkout
async fn create_checkout(
    State(app_state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Json(payload): Json<CheckoutPayload>,
) -> AppResult<Json<CheckoutResponse>> {
    let url = app_state
        .subscription_use_cases
        .create_checkout(
            &account,
            CheckoutInput {
                plan: &payload.plan,
                success_url: &payload.success_url,
                cancel_url: &payload.cancel_url,
                promotion_code: payload.promotion_code.as_deref(),
            },
        )
        .await?;

    Ok(Json(CheckoutResponse { url }))
}

/// POST /api/v1/subscriptions/referral/create
async fn create_referral_code(
    State(app_state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> AppResult<Json<ReferralResponse>> {
    let code = app_state
        .subscription_use_cases
        .create_referral_code(&account)
        .await?;

    Ok(Json(ReferralResponse { code }))
}

/// GET /api/v1/subscriptions/stream
/// Emits `update` whenever status or expiry changes, `ping` while idle.
async fn stream_status(
    State(app_state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let poll = Duration::from_secs(app_state.config.status_stream_poll_secs);
    let keepalive = Duration::from_secs(app_state.config.status_stream_keepalive_secs);
    let mut watcher = StatusWatcher::new(app_state.subscription_use_cases.clone(), &account);
    let account_id = account.id;

    let s = stream! {
        let mut intv = interval_at(Instant::now() + poll, poll);
        loop {
            intv.tick().await;
            match watcher.poll().await {
                Ok(Some(snapshot)) => {
                    match Event::default().event("update").json_data(&snapshot) {
                        Ok(ev) => {
                            yield Ok::<Event, Infallible>(ev);
                        }
                        Err(e) => tracing::error!(error = %e, "Failed to encode status update"),
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(account_id = %account_id, error = %e, "Status poll failed");
                }
            }
        }
    };

    Sse::new(s).keep_alive(
        KeepAlive::new()
            .interval(keepalive)
            .event(Event::default().event("ping").data("keepalive")),
    )
}
