use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failure taxonomy for the gateway. Input problems map to 400-class
/// responses, business-rule rejections to 500-class, and the refund
/// revert path is the only variant that aborts the enclosing operation.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Order {0} not found")]
    OrderNotFound(String),

    #[error("Payment method is not ViaBill")]
    WrongPaymentMethod,

    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Order status already set")]
    AlreadyProcessed,

    #[error("Capture amount exceeds the remaining amount available to capture")]
    OverCapture,

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Provider error: {message}")]
    Provider { message: String },

    #[error("Refund failed, order status reverted back to: \"{reverted_to}\"")]
    RefundFailed {
        message: String,
        reverted_to: String,
    },

    #[error("Order storage error: {message}")]
    Store { message: String },
}

impl GatewayError {
    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        GatewayError::Validation {
            message: message.into(),
            field: field.map(|f| f.to_string()),
        }
    }

    /// Status code for the JSON envelope returned to the remote party or
    /// the operator. The provider expects 400 for malformed input and 500
    /// for business-rule rejections.
    pub fn http_status_code(&self) -> u16 {
        match self {
            GatewayError::Validation { .. } => 400,
            GatewayError::OrderNotFound(_) => 500,
            GatewayError::WrongPaymentMethod => 500,
            GatewayError::SignatureMismatch => 500,
            GatewayError::AlreadyProcessed => 500,
            GatewayError::OverCapture => 500,
            GatewayError::Network { .. } => 502,
            GatewayError::Provider { .. } => 502,
            GatewayError::RefundFailed { .. } => 500,
            GatewayError::Store { .. } => 500,
        }
    }

    /// Only the refund-during-status-change failure must abort the
    /// enclosing operation; everything else degrades to a structured
    /// result the caller renders.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::RefundFailed { .. })
    }

    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Validation { message, .. } => message.clone(),
            GatewayError::OrderNotFound(_) => "Couldn't find corresponding order.".to_string(),
            GatewayError::WrongPaymentMethod => "Payment method is not ViaBill".to_string(),
            GatewayError::SignatureMismatch => "Signature mismatch.".to_string(),
            GatewayError::AlreadyProcessed => "Order status already set.".to_string(),
            GatewayError::OverCapture => {
                "Tried to capture order where available amount is greater than the remaining amount available to capture.".to_string()
            }
            GatewayError::Network { .. } => {
                "Payment provider is temporarily unavailable".to_string()
            }
            GatewayError::Provider { message } => message.clone(),
            GatewayError::RefundFailed { .. } => self.to_string(),
            GatewayError::Store { .. } => "Order storage failure, please try again.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping_is_correct() {
        assert_eq!(
            GatewayError::validation("missing field", Some("status")).http_status_code(),
            400
        );
        assert_eq!(GatewayError::SignatureMismatch.http_status_code(), 500);
        assert_eq!(GatewayError::AlreadyProcessed.http_status_code(), 500);
        assert_eq!(
            GatewayError::Network {
                message: "timeout".to_string()
            }
            .http_status_code(),
            502
        );
    }

    #[test]
    fn only_refund_failure_is_fatal() {
        assert!(GatewayError::RefundFailed {
            message: "provider said no".to_string(),
            reverted_to: "processing".to_string()
        }
        .is_fatal());
        assert!(!GatewayError::AlreadyProcessed.is_fatal());
        assert!(!GatewayError::OverCapture.is_fatal());
    }
}
