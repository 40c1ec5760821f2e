use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::MerchantConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::remote::transport::{HttpReply, HttpTransport};
use crate::remote::types::{
    extract_error_message, Country, MerchantCredentials, MyViabillReply, NotificationsReply,
};
use crate::signature::key_signature;

/// Base API path for this gateway's add-on endpoints.
const API_PATH: &str = "/api/addon/woocommerce/";

/// Platform identification sent with the notifications call.
const PLATFORM: &str = "woocommerce";
const MODULE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Client for the merchant account endpoints: registration, login and the
/// informational GET calls. Separate from [`super::client::RemoteConnector`]
/// because none of these are bound to an order or a transaction id.
pub struct MerchantAccountClient {
    transport: Arc<dyn HttpTransport>,
    merchant: MerchantConfig,
    /// Host platform version reported to the provider, when known.
    pub platform_version: Option<String>,
}

impl MerchantAccountClient {
    pub fn new(transport: Arc<dyn HttpTransport>, merchant: MerchantConfig) -> Self {
        Self {
            transport,
            merchant,
            platform_version: None,
        }
    }

    fn root_url(&self) -> String {
        format!("{}{}", self.merchant.base_url, API_PATH)
    }

    fn key_signature_params(&self) -> String {
        format!(
            "key={}&signature={}",
            self.merchant.api_key,
            key_signature(&self.merchant.api_key, &self.merchant.secret)
        )
    }

    fn platform_params(&self) -> String {
        match &self.platform_version {
            Some(version) => format!(
                "&platform={}&platform_ver={}&module_ver={}",
                PLATFORM, version, MODULE_VERSION
            ),
            None => String::new(),
        }
    }

    /// Register a new merchant account; returns the API credentials.
    pub async fn register(
        &self,
        email: &str,
        name: &str,
        country: &str,
        tax_id: Option<&str>,
        shop_url: &str,
        additional_info: JsonValue,
    ) -> GatewayResult<MerchantCredentials> {
        let mut body = serde_json::json!({
            "email": email,
            "name": name,
            "country": country,
            "url": shop_url,
            "additionalInfo": additional_info,
            "affiliate": "WOOCOMMERCE",
        });
        if let Some(tax_id) = tax_id {
            body["taxId"] = JsonValue::String(tax_id.to_string());
        }

        let url = format!("{}register", self.root_url());
        let reply = self.transport.post_json(&url, &body).await?;
        info!(email = %email, country = %country, "merchant registration request sent");
        parse_reply(reply)
    }

    /// Log in an existing merchant; returns the same credential shape as
    /// registration.
    pub async fn login(&self, email: &str, password: &str) -> GatewayResult<MerchantCredentials> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
        });

        let url = format!("{}login", self.root_url());
        let reply = self.transport.post_json(&url, &body).await?;
        parse_reply(reply)
    }

    /// Tokenized URL to the merchant's 'My ViaBill' dashboard, or an empty
    /// string when the call fails.
    pub async fn my_viabill_url(&self) -> GatewayResult<String> {
        let url = format!("{}myviabill?{}", self.root_url(), self.key_signature_params());
        match self.transport.get(&url).await {
            Ok(reply) if reply.is_success() => {
                let parsed: MyViabillReply = parse_reply(reply)?;
                Ok(parsed.url)
            }
            Ok(reply) => {
                warn!(status = reply.status, "failed to fetch My ViaBill URL");
                Ok(String::new())
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch My ViaBill URL");
                Ok(String::new())
            }
        }
    }

    /// Provider notifications addressed to this merchant; empty on failure.
    pub async fn notifications(&self) -> GatewayResult<Vec<String>> {
        let url = format!(
            "{}notifications?{}{}",
            self.root_url(),
            self.key_signature_params(),
            self.platform_params()
        );
        match self.transport.get(&url).await {
            Ok(reply) if reply.is_success() => {
                let parsed: NotificationsReply =
                    serde_json::from_str(&reply.body).unwrap_or_default();
                Ok(parsed.messages)
            }
            Ok(reply) => {
                warn!(status = reply.status, "failed to fetch notifications");
                Ok(Vec::new())
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch notifications");
                Ok(Vec::new())
            }
        }
    }

    /// Countries the provider supports for registration; empty on failure.
    pub async fn supported_countries(&self) -> GatewayResult<Vec<Country>> {
        let url = format!("{}countries/supported", self.root_url());
        match self.transport.get(&url).await {
            Ok(reply) if reply.is_success() => {
                Ok(serde_json::from_str(&reply.body).unwrap_or_default())
            }
            Ok(reply) => {
                warn!(status = reply.status, "failed to fetch supported countries");
                Ok(Vec::new())
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch supported countries");
                Ok(Vec::new())
            }
        }
    }
}

/// Classify and decode a provider reply: non-2xx or an error envelope
/// surfaces the remote error text, anything else must parse as `T`.
fn parse_reply<T: DeserializeOwned>(reply: HttpReply) -> GatewayResult<T> {
    if !reply.is_success() {
        let message = extract_error_message(&reply.body)
            .unwrap_or_else(|| "Something went wrong, please try again.".to_string());
        return Err(GatewayError::Provider { message });
    }

    if let Some(message) = extract_error_message(&reply.body) {
        return Err(GatewayError::Provider { message });
    }

    serde_json::from_str(&reply.body).map_err(|e| GatewayError::Provider {
        message: format!("invalid provider response: {}", e),
    })
}
