//! Merchant account endpoints: registration, login and the informational
//! lookups backing the operator configuration screens.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{error, info};

use crate::api::AppState;
use crate::error::GatewayError;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub country: String,
    pub tax_id: Option<String>,
    pub shop_url: String,
    #[serde(default = "empty_object")]
    pub additional_info: JsonValue,
}

fn empty_object() -> JsonValue {
    JsonValue::Object(Default::default())
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
struct MyViabillResponse {
    url: String,
}

#[derive(Debug, Serialize)]
struct NotificationsResponse {
    messages: Vec<String>,
}

/// POST /merchant/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Response {
    match state
        .merchant_account
        .register(
            &request.email,
            &request.name,
            &request.country,
            request.tax_id.as_deref(),
            &request.shop_url,
            request.additional_info,
        )
        .await
    {
        Ok(credentials) => {
            info!(email = %request.email, "merchant registered");
            (StatusCode::OK, Json(credentials)).into_response()
        }
        Err(e) => {
            error!(email = %request.email, error = %e, "merchant registration failed");
            error_response(e)
        }
    }
}

/// POST /merchant/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    match state
        .merchant_account
        .login(&request.email, &request.password)
        .await
    {
        Ok(credentials) => {
            info!(email = %request.email, "merchant logged in");
            (StatusCode::OK, Json(credentials)).into_response()
        }
        Err(e) => {
            error!(email = %request.email, error = %e, "merchant login failed");
            error_response(e)
        }
    }
}

/// GET /merchant/myviabill
pub async fn my_viabill(State(state): State<Arc<AppState>>) -> Response {
    match state.merchant_account.my_viabill_url().await {
        Ok(url) => (StatusCode::OK, Json(MyViabillResponse { url })).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /merchant/notifications
pub async fn notifications(State(state): State<Arc<AppState>>) -> Response {
    match state.merchant_account.notifications().await {
        Ok(messages) => (StatusCode::OK, Json(NotificationsResponse { messages })).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /merchant/countries
pub async fn supported_countries(State(state): State<Arc<AppState>>) -> Response {
    match state.merchant_account.supported_countries().await {
        Ok(countries) => (StatusCode::OK, Json(countries)).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(e: GatewayError) -> Response {
    let status =
        StatusCode::from_u16(e.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(serde_json::json!({
            "success": false,
            "message": e.user_message(),
        })),
    )
        .into_response()
}
