use serde::{Deserialize, Serialize};

/// Provider error envelope: `{"errors":[{"error":"..."}]}`.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorEntry {
    pub error: String,
}

/// First error message from a provider error body, if the body carries
/// the error envelope.
pub fn extract_error_message(body: &str) -> Option<String> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    envelope.errors.into_iter().next().map(|entry| entry.error)
}

/// Credentials returned by `/register` and `/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantCredentials {
    pub key: String,
    pub secret: String,
    #[serde(rename = "pricetagScript", default)]
    pub pricetag_script: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MyViabillReply {
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationsReply {
    #[serde(default)]
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Country {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct TransactionStatusReply {
    pub state: String,
}

/// Outcome of a merchant-initiated provider call: success flag plus the
/// remote message (empty on success, remote error text otherwise).
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub success: bool,
    pub message: String,
}

impl CallOutcome {
    pub fn ok() -> Self {
        CallOutcome {
            success: true,
            message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        CallOutcome {
            success: false,
            message: message.into(),
        }
    }
}

/// Result of the checkout-authorize proxy call.
#[derive(Debug, Clone)]
pub struct AuthorizeOutcome {
    pub redirect_url: String,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_extraction() {
        let body = r#"{"errors":[{"error":"Transaction not found"},{"error":"second"}]}"#;
        assert_eq!(
            extract_error_message(body),
            Some("Transaction not found".to_string())
        );
        assert_eq!(extract_error_message("{}"), None);
        assert_eq!(extract_error_message("not json"), None);
    }

    #[test]
    fn credentials_deserialize_with_optional_pricetag() {
        let body = r#"{"key":"k","secret":"s","pricetagScript":"<script/>"}"#;
        let creds: MerchantCredentials = serde_json::from_str(body).unwrap();
        assert_eq!(creds.key, "k");
        assert_eq!(creds.pricetag_script.as_deref(), Some("<script/>"));

        let body = r#"{"key":"k","secret":"s"}"#;
        let creds: MerchantCredentials = serde_json::from_str(body).unwrap();
        assert!(creds.pricetag_script.is_none());
    }
}
