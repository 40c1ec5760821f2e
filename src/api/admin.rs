//! Operator actions: capture, cancel and status refresh. Each request
//! carries a per-action token that is compared in constant time before
//! anything else runs.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::AppState;
use crate::error::{GatewayError, GatewayResult};
use crate::order::types::{round2, HostStatus};
use crate::signature::secure_eq;

#[derive(Debug, Deserialize)]
pub struct AdminActionRequest {
    pub token: String,
    /// Capture amount as typed by the operator, locale separators
    /// included. Absent means "the full remaining amount".
    pub amount: Option<String>,
}

#[derive(Debug, Serialize)]
struct AdminResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    rounded: Option<bool>,
}

/// POST /admin/order/:id/capture
pub async fn capture_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<u64>,
    Json(request): Json<AdminActionRequest>,
) -> Response {
    if let Err(denied) = check_token(&state, &request.token) {
        return denied;
    }

    let (amount, rounded) = match &request.amount {
        Some(raw) => match parse_amount(raw) {
            Ok((amount, rounded)) => (Some(round2(amount)), rounded),
            Err(e) => {
                warn!(order_id, raw = %raw, "capture rejected, unparseable amount");
                return error_response(e, None);
            }
        },
        None => (None, false),
    };

    match state.engine.capture(order_id, amount).await {
        Ok(outcome) if outcome.success => {
            info!(order_id, "capture action succeeded");
            respond(StatusCode::OK, true, "OK", rounded.then_some(true))
        }
        Ok(outcome) => {
            warn!(order_id, message = %outcome.message, "capture action failed");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                &outcome.message,
                None,
            )
        }
        Err(e) => {
            error!(order_id, error = %e, "capture action rejected");
            error_response(e, None)
        }
    }
}

/// POST /admin/order/:id/refund
pub async fn refund_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<u64>,
    Json(request): Json<AdminActionRequest>,
) -> Response {
    if let Err(denied) = check_token(&state, &request.token) {
        return denied;
    }

    let Some(raw) = &request.amount else {
        warn!(order_id, "refund rejected, missing amount");
        return error_response(
            GatewayError::validation("Amount is required.", Some("amount")),
            None,
        );
    };
    let (amount, rounded) = match parse_amount(raw) {
        Ok((amount, rounded)) => (round2(amount), rounded),
        Err(e) => {
            warn!(order_id, raw = %raw, "refund rejected, unparseable amount");
            return error_response(e, None);
        }
    };

    match state.engine.refund(order_id, amount).await {
        Ok(outcome) if outcome.success => {
            info!(order_id, %amount, "refund action succeeded");
            respond(StatusCode::OK, true, "OK", rounded.then_some(true))
        }
        Ok(outcome) => {
            warn!(order_id, message = %outcome.message, "refund action failed");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                &outcome.message,
                None,
            )
        }
        Err(e) => {
            error!(order_id, error = %e, "refund action rejected");
            error_response(e, None)
        }
    }
}

/// POST /admin/order/:id/cancel
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<u64>,
    Json(request): Json<AdminActionRequest>,
) -> Response {
    if let Err(denied) = check_token(&state, &request.token) {
        return denied;
    }

    match state
        .engine
        .change_host_status(order_id, HostStatus::Cancelled)
        .await
    {
        Ok(()) => {
            info!(order_id, "cancel action processed");
            respond(StatusCode::OK, true, "OK", None)
        }
        Err(e) => {
            error!(order_id, error = %e, "cancel action rejected");
            error_response(e, None)
        }
    }
}

/// POST /admin/order/:id/refresh
pub async fn refresh_order_status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<u64>,
    Json(request): Json<AdminActionRequest>,
) -> Response {
    if let Err(denied) = check_token(&state, &request.token) {
        return denied;
    }

    match state.engine.sync_remote_status(order_id).await {
        Ok(Some(status)) => {
            info!(order_id, status = %status, "status refresh processed");
            respond(StatusCode::OK, true, status.as_str(), None)
        }
        Ok(None) => {
            warn!(order_id, "status refresh returned no remote state");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                "Status request failed.",
                None,
            )
        }
        Err(e) => {
            error!(order_id, error = %e, "status refresh rejected");
            error_response(e, None)
        }
    }
}

fn check_token(state: &AppState, token: &str) -> Result<(), Response> {
    if secure_eq(token.as_bytes(), state.flow.admin_token.as_bytes()) {
        return Ok(());
    }
    warn!("admin action rejected, invalid security token");
    Err(respond(
        StatusCode::FORBIDDEN,
        false,
        "Invalid security token.",
        None,
    ))
}

/// Normalize an operator-typed amount to a canonical decimal. The
/// rightmost of `,`/`.` is taken as the decimal separator; the other one
/// and spaces are grouping and get stripped. The flag reports whether
/// more than two fractional digits were supplied, since the wire amount
/// is rounded to 2dp.
pub fn parse_amount(raw: &str) -> GatewayResult<(Decimal, bool)> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(GatewayError::validation("Amount is required.", Some("amount")));
    }

    let comma = cleaned.rfind(',');
    let dot = cleaned.rfind('.');
    let normalized = match (comma, dot) {
        (Some(c), Some(d)) => {
            let (decimal_sep, group_sep) = if c > d { (',', '.') } else { ('.', ',') };
            cleaned
                .replace(group_sep, "")
                .replace(decimal_sep, ".")
        }
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    let amount = Decimal::from_str(&normalized).map_err(|_| {
        GatewayError::validation(
            format!("\"{}\" is not a valid amount.", raw.trim()),
            Some("amount"),
        )
    })?;

    Ok((amount, amount.scale() > 2))
}

fn error_response(e: GatewayError, rounded: Option<bool>) -> Response {
    let status =
        StatusCode::from_u16(e.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    respond(status, false, &e.user_message(), rounded)
}

fn respond(status: StatusCode, success: bool, message: &str, rounded: Option<bool>) -> Response {
    (
        status,
        Json(AdminResponse {
            success,
            message: message.to_string(),
            rounded,
        }),
    )
        .into_response()
}
