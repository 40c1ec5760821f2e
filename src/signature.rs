//! MD5 signature codec binding transaction identity, amount, currency and
//! the shared merchant secret. The digest scheme is mandated by the
//! provider; every signature is the lowercase hex MD5 of its parts joined
//! with `#`, with the secret as the final part.

use md5::{Digest, Md5};
use tracing::{error, warn};

use crate::order::transaction_id::{signed_order_number, transaction_id, IdScheme};
use crate::order::types::{format_amount, OrderSnapshot};

/// Hex MD5 over `parts` joined by `#`.
pub fn sign(parts: &[&str]) -> String {
    let mut hasher = Md5::new();
    hasher.update(parts.join("#").as_bytes());
    hex::encode(hasher.finalize())
}

/// Checkout-initiation signature:
/// `md5(key#amount#currency#transaction#orderId#successUrl#cancelUrl#secret)`.
pub fn checkout_signature(
    api_key: &str,
    amount: &str,
    currency: &str,
    transaction: &str,
    order_id: &str,
    success_url: &str,
    cancel_url: &str,
    secret: &str,
) -> String {
    sign(&[
        api_key,
        amount,
        currency,
        transaction,
        order_id,
        success_url,
        cancel_url,
        secret,
    ])
}

/// Capture/refund request signature: `md5(id#apikey#amount#currency#secret)`.
pub fn transaction_signature(
    id: &str,
    api_key: &str,
    amount: &str,
    currency: &str,
    secret: &str,
) -> String {
    sign(&[id, api_key, amount, currency, secret])
}

/// Cancel/status request signature: `md5(id#apikey#secret)`.
pub fn transaction_id_signature(id: &str, api_key: &str, secret: &str) -> String {
    sign(&[id, api_key, secret])
}

/// Signature for the merchant GET endpoints: `md5(key#secret)`.
pub fn key_signature(api_key: &str, secret: &str) -> String {
    sign(&[api_key, secret])
}

/// Callback signature:
/// `md5(transactionId#orderNumber#amount#currency#status#time#secret)`.
pub fn callback_signature(
    transaction: &str,
    order_number: &str,
    amount: &str,
    currency: &str,
    status: &str,
    time: &str,
    secret: &str,
) -> String {
    sign(&[
        transaction,
        order_number,
        amount,
        currency,
        status,
        time,
        secret,
    ])
}

/// Verify an inbound callback signature against the local order data,
/// trying the current transaction-id scheme first and the deprecated one
/// as the single retry. A first-scheme mismatch is logged at warn level;
/// both failing escalates to error.
pub fn verify_callback(
    order: &OrderSnapshot,
    status: &str,
    time: &str,
    remote_signature: &str,
    secret: &str,
) -> bool {
    let amount = format_amount(order.total);

    for scheme in IdScheme::ALL {
        let local = callback_signature(
            &transaction_id(order, scheme),
            &signed_order_number(order, scheme),
            &amount,
            &order.currency,
            status,
            time,
            secret,
        );

        if secure_eq(local.as_bytes(), remote_signature.trim().as_bytes()) {
            return true;
        }

        if scheme == IdScheme::Current {
            warn!(
                order_id = order.id,
                "callback signature mismatch under current transaction id, retrying with deprecated id"
            );
        }
    }

    error!(
        order_id = order.id,
        "callback signature mismatch under both transaction id schemes"
    );
    false
}

/// Constant-time byte comparison.
pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::types::{HostStatus, PaymentMethod};
    use rust_decimal_macros::dec;

    fn order() -> OrderSnapshot {
        OrderSnapshot {
            id: 1042,
            order_number: "1042".to_string(),
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
    fn sign_is_deterministic_and_delimited() {
        assert_eq!(sign(&["a", "b"]), sign(&["a", "b"]));
        // The delimiter binds the part boundaries.
        assert_ne!(sign(&["ab", ""]), sign(&["a", "b"]));
    }

    #[test]
    fn callback_roundtrip_verifies() {
        let order = order();
        let signature = callback_signature(
            "OrdNum_1042",
            "1042",
            "49.99",
            "EUR",
            "approved",
            "1714000000",
            "secret",
        );
        assert!(verify_callback(
            &order,
            "approved",
            "1714000000",
            &signature,
            "secret"
        ));
    }

    #[test]
    fn altering_any_field_breaks_verification() {
        let order = order();
        let signature = callback_signature(
            "OrdNum_1042",
            "1042",
            "49.99",
            "EUR",
            "approved",
            "1714000000",
            "secret",
        );

        assert!(!verify_callback(
            &order,
            "cancelled",
            "1714000000",
            &signature,
            "secret"
        ));
        assert!(!verify_callback(
            &order,
            "approved",
            "1714000001",
            &signature,
            "secret"
        ));
        assert!(!verify_callback(
            &order,
            "approved",
            "1714000000",
            &signature,
            "other-secret"
        ));

        let mut wrong_amount = order.clone();
        wrong_amount.total = dec!(50.00);
        assert!(!verify_callback(
            &wrong_amount,
            "approved",
            "1714000000",
            &signature,
            "secret"
        ));
    }

    #[test]
    fn deprecated_scheme_signature_still_verifies() {
        let order = order();
        let signature = callback_signature(
            "wc_order_x9YzQ",
            "wc_order_x9YzQ",
            "49.99",
            "EUR",
            "approved",
            "1714000000",
            "secret",
        );
        assert!(verify_callback(
            &order,
            "approved",
            "1714000000",
            &signature,
            "secret"
        ));
    }

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }
}
