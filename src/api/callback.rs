//! Inbound status callback endpoint. The provider pushes
//! `{orderNumber, status, signature, time}` either as a JSON body, a
//! form-encoded body or plain query parameters; the handler normalizes
//! all three, runs the rejection chain and hands verified callbacks to
//! the reconciliation engine.

use axum::{
    extract::{RawQuery, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::AppState;
use crate::error::{GatewayError, GatewayResult};
use crate::order::types::{HostStatus, OrderSnapshot, OrderUpdate};
use crate::signature::verify_callback;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackPayload {
    #[serde(rename = "orderNumber")]
    pub order_number: Option<String>,
    pub status: Option<String>,
    pub signature: Option<String>,
    pub time: Option<String>,
}

impl CallbackPayload {
    fn is_complete(&self) -> bool {
        self.order_number.is_some()
            && self.status.is_some()
            && self.signature.is_some()
            && self.time.is_some()
    }
}

/// Fields of a complete callback, extracted once validation passed.
struct Callback {
    order_number: String,
    status: String,
    signature: String,
    time: String,
}

#[derive(Debug, Serialize)]
struct CallbackResponse {
    is_success: bool,
    message: String,
}

/// POST /wc-api/:gateway
pub async fn handle_callback(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    body: String,
) -> Response {
    let Some(payload) = extract_payload(&body, query.as_deref()) else {
        warn!("callback rejected, missing required parameters");
        return respond(
            StatusCode::BAD_REQUEST,
            false,
            "Missing callback parameters.",
        );
    };

    // is_complete() held, so the defaults never apply.
    let callback = Callback {
        order_number: payload.order_number.unwrap_or_default(),
        status: payload.status.unwrap_or_default(),
        signature: payload.signature.unwrap_or_default(),
        time: payload.time.unwrap_or_default(),
    };

    match process_callback(&state, &callback).await {
        Ok(()) => {
            info!(
                order_number = %callback.order_number,
                status = %callback.status,
                "callback processed"
            );
            respond(StatusCode::OK, true, "OK")
        }
        Err(e) => {
            error!(
                order_number = %callback.order_number,
                status = %callback.status,
                error = %e,
                "callback rejected"
            );
            let status = StatusCode::from_u16(e.http_status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            respond(status, false, &e.user_message())
        }
    }
}

async fn process_callback(state: &AppState, callback: &Callback) -> GatewayResult<()> {
    let order = resolve_order(state, &callback.order_number)
        .await?
        .ok_or_else(|| GatewayError::OrderNotFound(callback.order_number.clone()))?;

    if !order.is_viabill() {
        return Err(GatewayError::WrongPaymentMethod);
    }

    if !verify_callback(
        &order,
        &callback.status,
        &callback.time,
        &callback.signature,
        &state.merchant.secret,
    ) {
        state
            .store
            .apply(order.id, OrderUpdate::note("Callback signature mismatch."))
            .await?;
        return Err(GatewayError::SignatureMismatch);
    }

    // Duplicate-delivery guard: only orders still pending are processed.
    if order.host_status != HostStatus::Pending {
        return Err(GatewayError::AlreadyProcessed);
    }

    state
        .engine
        .apply_callback_status(&order, &callback.status)
        .await
}

/// Resolve the callback's order-number field: the deprecated scheme sends
/// the order key, the current one the numeric order id.
async fn resolve_order(
    state: &AppState,
    order_number: &str,
) -> GatewayResult<Option<OrderSnapshot>> {
    if let Some(order) = state.store.find_by_key(order_number).await? {
        return Ok(Some(order));
    }

    match order_number.parse::<u64>() {
        Ok(id) => state.store.find(id).await,
        Err(_) => Ok(None),
    }
}

/// JSON body first, form-encoded body second, query string last. A source
/// only wins when it carries all four required fields.
fn extract_payload(body: &str, query: Option<&str>) -> Option<CallbackPayload> {
    if let Ok(payload) = serde_json::from_str::<CallbackPayload>(body) {
        if payload.is_complete() {
            return Some(payload);
        }
    }

    if let Ok(payload) = serde_urlencoded::from_str::<CallbackPayload>(body) {
        if payload.is_complete() {
            return Some(payload);
        }
    }

    if let Some(query) = query {
        if let Ok(payload) = serde_urlencoded::from_str::<CallbackPayload>(query) {
            if payload.is_complete() {
                return Some(payload);
            }
        }
    }

    None
}

/// The provider requires a JSON body on every reply; if encoding ever
/// fails the sentinel `-1` is still valid JSON.
fn respond(status: StatusCode, is_success: bool, message: &str) -> Response {
    let body = serde_json::to_string(&CallbackResponse {
        is_success,
        message: message.to_string(),
    })
    .unwrap_or_else(|_| "-1".to_string());

    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_body_is_preferred() {
        let body = r#"{"orderNumber":"1042","status":"approved","signature":"abc","time":"1714"}"#;
        let payload = extract_payload(body, None).unwrap();
        assert_eq!(payload.order_number.as_deref(), Some("1042"));
        assert_eq!(payload.status.as_deref(), Some("approved"));
    }

    #[test]
    fn form_body_is_the_first_fallback() {
        let body = "orderNumber=1042&status=approved&signature=abc&time=1714";
        let payload = extract_payload(body, Some("status=ignored")).unwrap();
        assert_eq!(payload.order_number.as_deref(), Some("1042"));
    }

    #[test]
    fn query_parameters_are_the_last_fallback() {
        let query = "orderNumber=1042&status=approved&signature=abc&time=1714";
        let payload = extract_payload("", Some(query)).unwrap();
        assert_eq!(payload.time.as_deref(), Some("1714"));
    }

    #[test]
    fn incomplete_sources_are_rejected() {
        // JSON body missing the signature does not win even though it
        // parses; neither does an incomplete query.
        let body = r#"{"orderNumber":"1042","status":"approved","time":"1714"}"#;
        assert!(extract_payload(body, Some("status=approved")).is_none());
        assert!(extract_payload("", None).is_none());
    }
}
