use crate::order::types::OrderSnapshot;

/// Transaction-id derivation scheme. Orders created before the current
/// scheme existed were registered at ViaBill under the host order key, so
/// every remote call and callback verification is attempted once per
/// scheme, in this order, and never more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdScheme {
    Current,
    Deprecated,
}

impl IdScheme {
    /// Ordered retry list: current first, deprecated as the single retry.
    pub const ALL: [IdScheme; 2] = [IdScheme::Current, IdScheme::Deprecated];
}

/// Transaction id correlating the local order with the remote record.
/// Derived deterministically, never stored.
pub fn transaction_id(order: &OrderSnapshot, scheme: IdScheme) -> String {
    match scheme {
        IdScheme::Current => format!("OrdNum_{}", order.order_number.replace('#', "").trim()),
        IdScheme::Deprecated => order.order_key.clone(),
    }
}

/// The order-number field bound into callback signatures. The current
/// scheme uses the numeric order id, the deprecated one the order key.
pub fn signed_order_number(order: &OrderSnapshot, scheme: IdScheme) -> String {
    match scheme {
        IdScheme::Current => order.id.to_string(),
        IdScheme::Deprecated => order.order_key.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::types::{HostStatus, PaymentMethod};
    use rust_decimal_macros::dec;

    fn order() -> OrderSnapshot {
        OrderSnapshot {
            id: 1042,
            order_number: "#1042 ".to_string(),
            order_key: "wc_order_x9YzQ".to_string(),
            total: dec!(49.99),
            currency: "EUR".to_string(),
            payment_method: Some(PaymentMethod::Monthly),
            host_status: HostStatus::Pending,
            viabill_status: None,
            captured_amount: dec!(0),
            in_test_mode: false,
        }
    }

    #[test]
    fn current_id_strips_hash_and_whitespace() {
        assert_eq!(transaction_id(&order(), IdScheme::Current), "OrdNum_1042");
    }

    #[test]
    fn deprecated_id_is_the_order_key() {
        assert_eq!(
            transaction_id(&order(), IdScheme::Deprecated),
            "wc_order_x9YzQ"
        );
    }

    #[test]
    fn signed_order_number_per_scheme() {
        assert_eq!(signed_order_number(&order(), IdScheme::Current), "1042");
        assert_eq!(
            signed_order_number(&order(), IdScheme::Deprecated),
            "wc_order_x9YzQ"
        );
    }

    #[test]
    fn scheme_list_retries_exactly_once() {
        assert_eq!(
            IdScheme::ALL,
            [IdScheme::Current, IdScheme::Deprecated]
        );
    }
}
