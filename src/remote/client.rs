use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::MerchantConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::order::transaction_id::{transaction_id, IdScheme};
use crate::order::types::{format_amount, round2, OrderSnapshot};
use crate::remote::transport::{HttpReply, HttpTransport};
use crate::remote::types::{
    extract_error_message, AuthorizeOutcome, CallOutcome, TransactionStatusReply,
};
use crate::signature::{transaction_id_signature, transaction_signature};

/// Outcome of a capture attempt, carrying the amount that was actually
/// requested so the reconciliation engine can book it on success.
#[derive(Debug, Clone)]
pub struct CaptureAttempt {
    pub amount: Decimal,
    pub outcome: CallOutcome,
}

/// Thin client for the provider's transaction API. Each operation issues
/// at most two HTTP calls: one per transaction-id scheme, stopping at the
/// first success. State transitions belong to the reconciliation engine;
/// this client only talks to the wire.
pub struct RemoteConnector {
    transport: Arc<dyn HttpTransport>,
    merchant: MerchantConfig,
}

impl RemoteConnector {
    pub fn new(transport: Arc<dyn HttpTransport>, merchant: MerchantConfig) -> Self {
        Self {
            transport,
            merchant,
        }
    }

    pub fn checkout_url(&self) -> String {
        format!(
            "{}/api/checkout-authorize/addon/woocommerce",
            self.merchant.base_url
        )
    }

    fn guard_payment_method(&self, order: &OrderSnapshot) -> GatewayResult<()> {
        if !order.is_viabill() {
            warn!(order_id = order.id, "rejected provider call, wrong payment method");
            return Err(GatewayError::WrongPaymentMethod);
        }
        Ok(())
    }

    /// Capture `amount_to_capture` (or the full remaining amount when
    /// `None`) for the order. Validates against the remaining amount
    /// before any network call; the wire amount is negative-signed per
    /// the provider's convention.
    pub async fn capture(
        &self,
        order: &OrderSnapshot,
        amount_to_capture: Option<Decimal>,
    ) -> GatewayResult<CaptureAttempt> {
        self.guard_payment_method(order)?;

        let available = order.available_to_capture();
        let amount = match amount_to_capture {
            Some(requested) => {
                if round2(requested) > round2(available) {
                    warn!(
                        order_id = order.id,
                        "capture request exceeds the remaining amount available to capture"
                    );
                    return Err(GatewayError::OverCapture);
                }
                requested
            }
            None => available,
        };

        if amount <= Decimal::ZERO {
            warn!(
                order_id = order.id,
                "capture request where available amount is less or equal to 0"
            );
            return Err(GatewayError::validation(
                "Tried to capture order where available amount is less or equal to 0.",
                Some("amount"),
            ));
        }

        let wire_amount = format_amount(-amount);
        let url = format!("{}/api/transaction/capture", self.merchant.base_url);
        let outcome = self
            .transaction_call(order, &url, |id| {
                serde_json::json!({
                    "id": id,
                    "apikey": self.merchant.api_key,
                    "amount": wire_amount,
                    "currency": order.currency,
                    "signature": transaction_signature(
                        id,
                        &self.merchant.api_key,
                        &wire_amount,
                        &order.currency,
                        &self.merchant.secret,
                    ),
                })
            })
            .await;

        info!(
            order_id = order.id,
            amount = %amount,
            currency = %order.currency,
            success = outcome.success,
            "capture request sent via ViaBill payment gateway"
        );

        Ok(CaptureAttempt { amount, outcome })
    }

    /// Refund `amount` for the order; same retry discipline as capture,
    /// without the amount sign flip.
    pub async fn refund(
        &self,
        order: &OrderSnapshot,
        amount: Decimal,
        currency: &str,
    ) -> GatewayResult<CallOutcome> {
        self.guard_payment_method(order)?;

        let wire_amount = format_amount(amount);
        let url = format!("{}/api/transaction/refund", self.merchant.base_url);
        let outcome = self
            .transaction_call(order, &url, |id| {
                serde_json::json!({
                    "id": id,
                    "apikey": self.merchant.api_key,
                    "amount": wire_amount,
                    "currency": currency,
                    "signature": transaction_signature(
                        id,
                        &self.merchant.api_key,
                        &wire_amount,
                        currency,
                        &self.merchant.secret,
                    ),
                })
            })
            .await;

        info!(
            order_id = order.id,
            amount = %amount,
            currency = %currency,
            success = outcome.success,
            "refund request sent via ViaBill payment gateway"
        );

        Ok(outcome)
    }

    /// Cancel the order's transaction; the request body carries no amount.
    pub async fn cancel(&self, order: &OrderSnapshot) -> GatewayResult<CallOutcome> {
        self.guard_payment_method(order)?;

        let url = format!("{}/api/transaction/cancel", self.merchant.base_url);
        let outcome = self
            .transaction_call(order, &url, |id| {
                serde_json::json!({
                    "id": id,
                    "apikey": self.merchant.api_key,
                    "signature": transaction_id_signature(
                        id,
                        &self.merchant.api_key,
                        &self.merchant.secret,
                    ),
                })
            })
            .await;

        info!(
            order_id = order.id,
            success = outcome.success,
            "cancel request sent via ViaBill payment gateway"
        );

        Ok(outcome)
    }

    /// Fetch the remote transaction state. Returns `None` when the state
    /// is unknown (transport failure or no scheme matched); callers treat
    /// that as "do not change local state".
    pub async fn get_status(&self, order: &OrderSnapshot) -> GatewayResult<Option<String>> {
        self.guard_payment_method(order)?;

        for scheme in IdScheme::ALL {
            let id = transaction_id(order, scheme);
            let signature =
                transaction_id_signature(&id, &self.merchant.api_key, &self.merchant.secret);
            let url = format!(
                "{}/api/transaction/status?id={}&apikey={}&signature={}",
                self.merchant.base_url, id, self.merchant.api_key, signature
            );

            let reply = match self.transport.get(&url).await {
                Ok(reply) => reply,
                Err(e) => {
                    error!(order_id = order.id, error = %e, "failed to fetch transaction status");
                    return Ok(None);
                }
            };

            if !reply.is_success() {
                continue;
            }

            match serde_json::from_str::<TransactionStatusReply>(&reply.body) {
                Ok(status) => return Ok(Some(status.state)),
                Err(e) => {
                    warn!(order_id = order.id, error = %e, "invalid transaction status body");
                    return Ok(None);
                }
            }
        }

        Ok(None)
    }

    /// Forward the signed checkout form to the provider's hosted checkout
    /// and hand back the redirect target from the `Location` header, or
    /// the provider's error text on a 400 reply.
    pub async fn checkout_authorize(&self, form: &JsonValue) -> GatewayResult<AuthorizeOutcome> {
        let reply = self.transport.post_json(&self.checkout_url(), form).await?;

        if reply.status == 400 {
            let error = extract_error_message(&reply.body)
                .unwrap_or_else(|| "Could not perform this checkout operation.".to_string());
            warn!(status = reply.status, error = %error, "checkout authorize rejected");
            return Ok(AuthorizeOutcome {
                redirect_url: String::new(),
                error,
            });
        }

        Ok(AuthorizeOutcome {
            redirect_url: reply.location.unwrap_or_default(),
            error: String::new(),
        })
    }

    /// POST the same body shape once per id scheme, stopping at the first
    /// 2xx reply. The provider error text of the final reply is surfaced
    /// to the caller; transport-level failures only produce the generic
    /// failure message.
    async fn transaction_call<F>(&self, order: &OrderSnapshot, url: &str, body_for: F) -> CallOutcome
    where
        F: Fn(&str) -> JsonValue,
    {
        let mut last_reply: Option<HttpReply> = None;

        for scheme in IdScheme::ALL {
            let id = transaction_id(order, scheme);
            match self.transport.post_json(url, &body_for(&id)).await {
                Ok(reply) if reply.is_success() => return CallOutcome::ok(),
                Ok(reply) => {
                    last_reply = Some(reply);
                }
                Err(e) => {
                    error!(order_id = order.id, url = %url, error = %e, "provider request failed");
                    last_reply = None;
                }
            }
        }

        let message = last_reply
            .as_ref()
            .and_then(|reply| extract_error_message(&reply.body));

        if let Some(remote_error) = &message {
            error!(order_id = order.id, url = %url, error = %remote_error, "provider rejected request");
        }

        CallOutcome::failed(message.unwrap_or_else(|| "Failed to process request.".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::types::{HostStatus, PaymentMethod};
    use crate::remote::transport::HttpReply;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    fn merchant() -> MerchantConfig {
        MerchantConfig {
            api_key: "key".to_string(),
            secret: "secret".to_string(),
            base_url: "https://secure.viabill.com".to_string(),
            timeout_secs: 60,
            test_mode: false,
        }
    }

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

    /// Scripted transport: pops one canned reply per call and records the
    /// request bodies.
    struct ScriptedTransport {
        replies: Mutex<Vec<GatewayResult<HttpReply>>>,
        calls: AtomicUsize,
        bodies: Mutex<Vec<JsonValue>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<GatewayResult<HttpReply>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
                bodies: Mutex::new(Vec::new()),
            }
        }

        fn reply(status: u16, body: &str) -> GatewayResult<HttpReply> {
            Ok(HttpReply {
                status,
                body: body.to_string(),
                location: None,
            })
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn post_json(&self, _url: &str, body: &JsonValue) -> GatewayResult<HttpReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.bodies.lock().await.push(body.clone());
            self.replies.lock().await.remove(0)
        }

        async fn get(&self, _url: &str) -> GatewayResult<HttpReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies.lock().await.remove(0)
        }
    }

    #[tokio::test]
    async fn capture_succeeds_on_first_scheme_with_one_call() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::reply(
            200, "",
        )]));
        let connector = RemoteConnector::new(transport.clone(), merchant());

        let attempt = connector.capture(&order(), None).await.unwrap();
        assert!(attempt.outcome.success);
        assert_eq!(attempt.amount, dec!(49.99));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        let bodies = transport.bodies.lock().await;
        assert_eq!(bodies[0]["id"], "OrdNum_1042");
        assert_eq!(bodies[0]["amount"], "-49.99");
    }

    #[tokio::test]
    async fn capture_falls_back_to_deprecated_id_exactly_once() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedTransport::reply(500, ""),
            ScriptedTransport::reply(200, ""),
        ]));
        let connector = RemoteConnector::new(transport.clone(), merchant());

        let attempt = connector.capture(&order(), Some(dec!(10.00))).await.unwrap();
        assert!(attempt.outcome.success);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);

        let bodies = transport.bodies.lock().await;
        assert_eq!(bodies[0]["id"], "OrdNum_1042");
        assert_eq!(bodies[1]["id"], "wc_order_x9YzQ");
    }

    #[tokio::test]
    async fn capture_failure_surfaces_remote_error_after_both_schemes() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedTransport::reply(500, ""),
            ScriptedTransport::reply(500, r#"{"errors":[{"error":"Transaction not found"}]}"#),
        ]));
        let connector = RemoteConnector::new(transport.clone(), merchant());

        let attempt = connector.capture(&order(), None).await.unwrap();
        assert!(!attempt.outcome.success);
        assert_eq!(attempt.outcome.message, "Transaction not found");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn over_capture_is_rejected_without_a_network_call() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let connector = RemoteConnector::new(transport.clone(), merchant());

        let mut order = order();
        order.captured_amount = dec!(40.00);

        let err = connector
            .capture(&order, Some(dec!(10.00)))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::OverCapture));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_remaining_amount_is_rejected_without_a_network_call() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let connector = RemoteConnector::new(transport.clone(), merchant());

        let mut order = order();
        order.captured_amount = order.total;

        let err = connector.capture(&order, None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation { .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wrong_payment_method_is_rejected_without_a_network_call() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let connector = RemoteConnector::new(transport.clone(), merchant());

        let mut order = order();
        order.payment_method = None;

        assert!(matches!(
            connector.capture(&order, None).await.unwrap_err(),
            GatewayError::WrongPaymentMethod
        ));
        assert!(matches!(
            connector.cancel(&order).await.unwrap_err(),
            GatewayError::WrongPaymentMethod
        ));
        assert!(matches!(
            connector.get_status(&order).await.unwrap_err(),
            GatewayError::WrongPaymentMethod
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refund_body_has_no_sign_flip() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::reply(
            200, "",
        )]));
        let connector = RemoteConnector::new(transport.clone(), merchant());

        let outcome = connector
            .refund(&order(), dec!(20.00), "EUR")
            .await
            .unwrap();
        assert!(outcome.success);

        let bodies = transport.bodies.lock().await;
        assert_eq!(bodies[0]["amount"], "20.00");
    }

    #[tokio::test]
    async fn cancel_body_carries_no_amount() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::reply(
            200, "",
        )]));
        let connector = RemoteConnector::new(transport.clone(), merchant());

        connector.cancel(&order()).await.unwrap();
        let bodies = transport.bodies.lock().await;
        assert!(bodies[0].get("amount").is_none());
        assert!(bodies[0].get("signature").is_some());
    }

    #[tokio::test]
    async fn status_transport_error_yields_unknown_state() {
        let transport = Arc::new(ScriptedTransport::new(vec![Err(GatewayError::Network {
            message: "timeout".to_string(),
        })]));
        let connector = RemoteConnector::new(transport.clone(), merchant());

        let state = connector.get_status(&order()).await.unwrap();
        assert!(state.is_none());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_retries_deprecated_id_on_non_2xx() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedTransport::reply(404, ""),
            ScriptedTransport::reply(200, r#"{"state":"APPROVED"}"#),
        ]));
        let connector = RemoteConnector::new(transport.clone(), merchant());

        let state = connector.get_status(&order()).await.unwrap();
        assert_eq!(state.as_deref(), Some("APPROVED"));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }
}
