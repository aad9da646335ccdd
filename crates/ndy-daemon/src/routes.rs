//! Axum router and all HTTP handlers for ndy-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Every admission route resolves the bearer token to an
//! actor before it reads the body.

use std::{convert::Infallible, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use ndy_admission::{
    create_override, evaluate_readiness, resolve_booking, BookingError, OverrideError,
    OverrideRequest, ReadinessError, ReadinessRequest,
};
use ndy_eligibility::{ClassSessionId, GateOperation, Subject, TenantId, UserId};

use crate::{
    api_types::{
        BookingBody, ErrorResponse, HealthResponse, OkResponse, OverrideBody, OverrideResponse,
        ReadinessBody,
    },
    state::{AppState, BusMsg, DecisionEvent},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/checkin/readiness", post(checkin_readiness))
        .route("/v1/checkin/override", post(checkin_override))
        .route("/v1/booking/paths", post(booking_paths))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fail(status: StatusCode, body: ErrorResponse) -> Response {
    (status, Json(body)).into_response()
}

fn server_error(err: &dyn std::error::Error) -> Response {
    warn!(error = %err, "request failed");
    fail(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorResponse::new("server_error").details(err.to_string()),
    )
}

/// Token from `Authorization: Bearer <token>`; `None` when absent or blank.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = raw.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Resolve the calling user, or the 401/500 response to return instead.
async fn authenticate(st: &AppState, headers: &HeaderMap) -> Result<UserId, Response> {
    let Some(token) = bearer_token(headers) else {
        return Err(fail(
            StatusCode::UNAUTHORIZED,
            ErrorResponse::new("missing_bearer_token"),
        ));
    };
    match st.ctx.facts.actor_for_token(&token).await {
        Ok(Some(actor)) => Ok(actor),
        Ok(None) => Err(fail(StatusCode::UNAUTHORIZED, ErrorResponse::new("invalid_token"))),
        Err(e) => Err(server_error(&e)),
    }
}

/// Lenient body parse: anything unreadable is treated as `{}`.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> T {
    serde_json::from_slice(body).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(st.snapshot().await))
}

// ---------------------------------------------------------------------------
// POST /v1/checkin/readiness
// ---------------------------------------------------------------------------

/// Desk check: staff ask whether a member may check in right now.
pub(crate) async fn checkin_readiness(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let actor = match authenticate(&st, &headers).await {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let b: ReadinessBody = parse_body(&body);
    let (Some(tenant_id), Some(user_id)) = (b.tenant_id, b.user_id) else {
        return fail(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("missing_required_fields").required(&["tenant_id", "user_id"]),
        );
    };

    let req = ReadinessRequest {
        subject: Subject {
            tenant_id: TenantId(tenant_id),
            user_id: UserId(user_id),
        },
        operation: GateOperation::Checkin,
        required_tokens: b.required_tokens,
    };

    match evaluate_readiness(&st.ctx, req, Some(actor), st.now()).await {
        Ok(r) => {
            st.publish(DecisionEvent {
                kind: "readiness".to_string(),
                tenant_id,
                user_id,
                cleared: r.result.cleared,
                reason: r.result.reason.as_str().to_string(),
                audit_event_id: Some(r.audit_event_id),
            })
            .await;
            (StatusCode::OK, Json(OkResponse::new(r))).into_response()
        }
        Err(e @ ReadinessError::Forbidden) => {
            fail(StatusCode::FORBIDDEN, ErrorResponse::new(e.code()).details(e.to_string()))
        }
        Err(e) => server_error(&e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/checkin/override
// ---------------------------------------------------------------------------

pub(crate) async fn checkin_override(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let actor = match authenticate(&st, &headers).await {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let b: OverrideBody = parse_body(&body);
    let (Some(tenant_id), Some(user_id)) = (b.tenant_id, b.user_id) else {
        return fail(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("missing_required_fields").required(&["tenant_id", "user_id", "reason"]),
        );
    };

    let req = OverrideRequest {
        tenant_id: TenantId(tenant_id),
        user_id: UserId(user_id),
        reason: b.reason.unwrap_or_default(),
        required_tokens: b.required_tokens,
    };

    match create_override(&st.ctx, req, actor, st.now()).await {
        Ok(out) => {
            st.publish(DecisionEvent {
                kind: "override".to_string(),
                tenant_id,
                user_id,
                cleared: out.result.cleared,
                reason: out.result.reason.as_str().to_string(),
                audit_event_id: None,
            })
            .await;
            let _ = st.bus.send(BusMsg::LogLine {
                level: "INFO".to_string(),
                msg: format!("check-in override {} created", out.record.override_id),
            });
            (
                StatusCode::OK,
                Json(OkResponse::new(OverrideResponse {
                    override_id: out.record.override_id,
                    tenant_id,
                    user_id,
                    created_at: out.record.created_at,
                    expires_at: out.record.expires_at,
                    result: out.result,
                    unknown_facts: out.unknown_facts,
                })),
            )
                .into_response()
        }
        Err(e) => override_error(e),
    }
}

fn override_error(e: OverrideError) -> Response {
    let status = match &e {
        OverrideError::MissingFields => StatusCode::BAD_REQUEST,
        OverrideError::Forbidden => StatusCode::FORBIDDEN,
        OverrideError::TenantNotFound => StatusCode::NOT_FOUND,
        OverrideError::TenantNotAuthoritative { .. } | OverrideError::CheckinDisabled => {
            StatusCode::CONFLICT
        }
        OverrideError::InsertFailed(_) => {
            warn!(error = %e, "override insert failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        OverrideError::Backend(_) | OverrideError::Audit(_) => return server_error(&e),
    };
    let mut body = ErrorResponse::new(e.code()).details(e.to_string());
    if matches!(e, OverrideError::MissingFields) {
        body = body.required(&["tenant_id", "user_id", "reason"]);
    }
    fail(status, body)
}

// ---------------------------------------------------------------------------
// POST /v1/booking/paths
// ---------------------------------------------------------------------------

/// Booking fork for the calling member.
pub(crate) async fn booking_paths(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let actor = match authenticate(&st, &headers).await {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let b: BookingBody = parse_body(&body);
    let Some(class_session_id) = b.class_session_id else {
        return fail(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("missing_required_fields").required(&["class_session_id"]),
        );
    };

    match resolve_booking(&st.ctx, ClassSessionId(class_session_id), actor, st.now()).await {
        Ok(d) => {
            info!(class_session_id = %class_session_id, user_id = %actor, "booking/paths");
            st.publish(DecisionEvent {
                kind: "booking".to_string(),
                tenant_id: d.session.tenant_id.0,
                user_id: actor.0,
                cleared: d.paths.membership_path || d.paths.token_path,
                reason: d.result.reason.as_str().to_string(),
                audit_event_id: Some(d.audit_event_id),
            })
            .await;
            (StatusCode::OK, Json(OkResponse::new(d))).into_response()
        }
        Err(e @ BookingError::SessionNotFound) => {
            fail(StatusCode::NOT_FOUND, ErrorResponse::new(e.code()))
        }
        Err(e) => server_error(&e),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Decision(_) => "decision",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
