//! Checkout endpoints: the receipt-page form for browser submission and
//! the server-side authorize proxy that trades the same form for a
//! redirect URL.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::AppState;
use crate::checkout::{CheckoutForm, CheckoutUrls};
use crate::error::GatewayError;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub success_url: String,
    pub cancel_url: String,
    pub callback_url: String,
    #[serde(default = "empty_object")]
    pub custom_params: JsonValue,
    #[serde(default = "empty_array")]
    pub cart_params: JsonValue,
}

fn empty_object() -> JsonValue {
    JsonValue::Object(Default::default())
}

fn empty_array() -> JsonValue {
    JsonValue::Array(Vec::new())
}

#[derive(Debug, Serialize)]
struct CheckoutFormResponse {
    action: String,
    form: CheckoutForm,
}

#[derive(Debug, Serialize)]
struct AuthorizeResponse {
    success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    redirect_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    message: String,
}

/// POST /checkout/:order_id/form
///
/// Returns the signed form plus the provider URL it must be POSTed to;
/// the receipt page renders it for the shopper's browser.
pub async fn checkout_form(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<u64>,
    Json(request): Json<CheckoutRequest>,
) -> Response {
    let urls = CheckoutUrls {
        success: request.success_url,
        cancel: request.cancel_url,
        callback: request.callback_url,
    };

    match state
        .checkout
        .prepare(order_id, &urls, &request.custom_params, &request.cart_params)
        .await
    {
        Ok(form) => {
            info!(order_id, "checkout form prepared");
            (
                StatusCode::OK,
                Json(CheckoutFormResponse {
                    action: state.connector.checkout_url(),
                    form,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(order_id, error = %e, "checkout form rejected");
            error_response(e)
        }
    }
}

/// POST /checkout/:order_id/authorize
///
/// Server-side variant of the redirect: forwards the signed form to the
/// provider and hands back the `Location` it answers with.
pub async fn checkout_authorize(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<u64>,
    Json(request): Json<CheckoutRequest>,
) -> Response {
    let urls = CheckoutUrls {
        success: request.success_url,
        cancel: request.cancel_url,
        callback: request.callback_url,
    };

    let form = match state
        .checkout
        .prepare(order_id, &urls, &request.custom_params, &request.cart_params)
        .await
    {
        Ok(form) => form,
        Err(e) => {
            error!(order_id, error = %e, "checkout authorize rejected");
            return error_response(e);
        }
    };

    let body = match serde_json::to_value(&form) {
        Ok(body) => body,
        Err(e) => {
            error!(order_id, error = %e, "failed to encode checkout form");
            return error_response(GatewayError::validation(
                "Could not encode checkout form.",
                None,
            ));
        }
    };

    match state.connector.checkout_authorize(&body).await {
        Ok(outcome) if !outcome.redirect_url.is_empty() => {
            if let Err(e) = state.checkout.mark_authorize_issued(order_id).await {
                warn!(order_id, error = %e, "failed to record the authorize redirect");
            }
            info!(order_id, "checkout authorize redirect issued");
            (
                StatusCode::OK,
                Json(AuthorizeResponse {
                    success: true,
                    redirect_url: outcome.redirect_url,
                    message: String::new(),
                }),
            )
                .into_response()
        }
        Ok(outcome) => {
            warn!(order_id, error = %outcome.error, "checkout authorize refused by provider");
            (
                StatusCode::BAD_GATEWAY,
                Json(AuthorizeResponse {
                    success: false,
                    redirect_url: String::new(),
                    message: outcome.error,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(order_id, error = %e, "checkout authorize transport failure");
            error_response(e)
        }
    }
}

fn error_response(e: GatewayError) -> Response {
    let status =
        StatusCode::from_u16(e.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(AuthorizeResponse {
            success: false,
            redirect_url: String::new(),
            message: e.user_message(),
        }),
    )
        .into_response()
}
