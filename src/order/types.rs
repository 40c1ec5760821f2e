use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::GatewayError;

/// The two ViaBill payment methods an order can be placed with. Orders
/// carrying any other payment method are outside this gateway's scope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Monthly,
    TryBeforeYouBuy,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Monthly => "viabill_official",
            PaymentMethod::TryBeforeYouBuy => "viabill_try",
        }
    }

    pub fn is_recognized(value: &str) -> bool {
        PaymentMethod::from_str(value).is_ok()
    }

    /// The `tbyb` flag sent with the checkout-initiation request.
    pub fn tbyb_flag(&self) -> u8 {
        match self {
            PaymentMethod::Monthly => 0,
            PaymentMethod::TryBeforeYouBuy => 1,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = GatewayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "viabill_official" => Ok(PaymentMethod::Monthly),
            "viabill_try" => Ok(PaymentMethod::TryBeforeYouBuy),
            _ => Err(GatewayError::WrongPaymentMethod),
        }
    }
}

/// Where the order sits in ViaBill's transaction lifecycle. This is the
/// authoritative provider-side record and a separate axis from the host
/// order status. Unmatched remote values are kept verbatim in `Other`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViabillStatus {
    Waiting,
    Pending,
    PendingApproval,
    Approved,
    Captured,
    CapturedPartially,
    Refunded,
    RefundedPartially,
    Cancelled,
    Rejected,
    #[serde(untagged)]
    Other(String),
}

impl ViabillStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ViabillStatus::Waiting => "waiting",
            ViabillStatus::Pending => "pending",
            ViabillStatus::PendingApproval => "pending_approval",
            ViabillStatus::Approved => "approved",
            ViabillStatus::Captured => "captured",
            ViabillStatus::CapturedPartially => "captured_partially",
            ViabillStatus::Refunded => "refunded",
            ViabillStatus::RefundedPartially => "refunded_partially",
            ViabillStatus::Cancelled => "cancelled",
            ViabillStatus::Rejected => "rejected",
            ViabillStatus::Other(value) => value,
        }
    }

    /// Parse a remote status string, lowercased; never fails since
    /// unmatched values are stored verbatim.
    pub fn from_remote(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "waiting" => ViabillStatus::Waiting,
            "pending" => ViabillStatus::Pending,
            "pending_approval" => ViabillStatus::PendingApproval,
            "approved" => ViabillStatus::Approved,
            "captured" => ViabillStatus::Captured,
            "captured_partially" => ViabillStatus::CapturedPartially,
            "refunded" => ViabillStatus::Refunded,
            "refunded_partially" => ViabillStatus::RefundedPartially,
            "cancelled" => ViabillStatus::Cancelled,
            "rejected" => ViabillStatus::Rejected,
            other => ViabillStatus::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ViabillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The host shop's own order lifecycle status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum HostStatus {
    Pending,
    OnHold,
    Processing,
    Completed,
    Cancelled,
    Failed,
    Refunded,
    #[serde(untagged)]
    Other(String),
}

impl HostStatus {
    pub fn as_str(&self) -> &str {
        match self {
            HostStatus::Pending => "pending",
            HostStatus::OnHold => "on-hold",
            HostStatus::Processing => "processing",
            HostStatus::Completed => "completed",
            HostStatus::Cancelled => "cancelled",
            HostStatus::Failed => "failed",
            HostStatus::Refunded => "refunded",
            HostStatus::Other(value) => value,
        }
    }
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HostStatus {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim() {
            "pending" => HostStatus::Pending,
            "on-hold" => HostStatus::OnHold,
            "processing" => HostStatus::Processing,
            "completed" => HostStatus::Completed,
            "cancelled" => HostStatus::Cancelled,
            "failed" => HostStatus::Failed,
            "refunded" => HostStatus::Refunded,
            other => HostStatus::Other(other.to_string()),
        })
    }
}

/// Immutable view of an order as read from the host order storage.
/// Reconciliation reads one snapshot, computes the new state, and issues a
/// single [`OrderUpdate`] write; it never mutates the order in place.
#[derive(Debug, Clone)]
pub struct OrderSnapshot {
    pub id: u64,
    /// Customer-facing order number; feeds the current transaction id.
    pub order_number: String,
    /// Opaque key assigned by the host shop; feeds the deprecated
    /// transaction id.
    pub order_key: String,
    pub total: Decimal,
    pub currency: String,
    pub payment_method: Option<PaymentMethod>,
    pub host_status: HostStatus,
    pub viabill_status: Option<ViabillStatus>,
    pub captured_amount: Decimal,
    pub in_test_mode: bool,
}

impl OrderSnapshot {
    pub fn is_viabill(&self) -> bool {
        self.payment_method.is_some()
    }

    /// Amount still available to capture.
    pub fn available_to_capture(&self) -> Decimal {
        self.total - self.captured_amount
    }
}

/// One write against the host order storage. Unset fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub viabill_status: Option<ViabillStatus>,
    pub host_status: Option<HostStatus>,
    pub captured_amount: Option<Decimal>,
    pub in_test_mode: Option<bool>,
    /// Audit note appended to the order history.
    pub note: Option<String>,
}

impl OrderUpdate {
    pub fn note(note: impl Into<String>) -> Self {
        OrderUpdate {
            note: Some(note.into()),
            ..Default::default()
        }
    }

    pub fn with_viabill_status(mut self, status: ViabillStatus) -> Self {
        self.viabill_status = Some(status);
        self
    }

    pub fn with_host_status(mut self, status: HostStatus) -> Self {
        self.host_status = Some(status);
        self
    }

    pub fn with_captured_amount(mut self, amount: Decimal) -> Self {
        self.captured_amount = Some(amount);
        self
    }
}

/// Round to two decimal places, half away from zero, matching the
/// provider's own rounding of wire amounts.
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Format an amount with exactly two decimal places, `.` separator and no
/// grouping, regardless of locale. Signatures are compared byte-for-byte
/// against the remote party's computation of the same string.
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", round2(amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn payment_method_roundtrip() {
        assert_eq!(
            PaymentMethod::from_str("viabill_official").unwrap(),
            PaymentMethod::Monthly
        );
        assert_eq!(
            PaymentMethod::from_str("viabill_try").unwrap(),
            PaymentMethod::TryBeforeYouBuy
        );
        assert!(PaymentMethod::from_str("stripe").is_err());
        assert!(PaymentMethod::is_recognized("viabill_official"));
        assert!(!PaymentMethod::is_recognized("paypal"));
    }

    #[test]
    fn tbyb_flag_values() {
        assert_eq!(PaymentMethod::Monthly.tbyb_flag(), 0);
        assert_eq!(PaymentMethod::TryBeforeYouBuy.tbyb_flag(), 1);
    }

    #[test]
    fn viabill_status_keeps_unknown_values_verbatim() {
        assert_eq!(
            ViabillStatus::from_remote("APPROVED"),
            ViabillStatus::Approved
        );
        assert_eq!(
            ViabillStatus::from_remote("under_review"),
            ViabillStatus::Other("under_review".to_string())
        );
        assert_eq!(
            ViabillStatus::Other("under_review".to_string()).as_str(),
            "under_review"
        );
    }

    #[test]
    fn host_status_parses_custom_names() {
        assert_eq!("on-hold".parse::<HostStatus>().unwrap(), HostStatus::OnHold);
        assert_eq!(
            "wc-special".parse::<HostStatus>().unwrap(),
            HostStatus::Other("wc-special".to_string())
        );
    }

    #[test]
    fn amount_formatting_is_locale_independent() {
        assert_eq!(format_amount(dec!(49.99)), "49.99");
        assert_eq!(format_amount(dec!(1000)), "1000.00");
        assert_eq!(format_amount(dec!(10.005)), "10.01");
        assert_eq!(format_amount(dec!(-49.99)), "-49.99");
    }

    #[test]
    fn round2_is_half_away_from_zero() {
        assert_eq!(round2(dec!(1.005)), dec!(1.01));
        assert_eq!(round2(dec!(-1.005)), dec!(-1.01));
        assert_eq!(round2(dec!(1.004)), dec!(1.00));
    }
}
