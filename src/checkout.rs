//! Hosted-checkout initiation: builds the signed protocol-3.0 form that
//! the shopper's browser submits to the provider, and tracks the pending
//! order states around the redirect.

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

use crate::config::MerchantConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::order::store::OrderStore;
use crate::order::transaction_id::{signed_order_number, transaction_id, IdScheme};
use crate::order::types::{format_amount, OrderSnapshot, OrderUpdate, ViabillStatus};
use crate::signature::checkout_signature;

/// Return and notification URLs for one checkout session. The host shop
/// owns these pages; the gateway only signs and forwards them.
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub success: String,
    pub cancel: String,
    pub callback: String,
}

/// The protocol-3.0 checkout form, field names as the provider expects
/// them on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutForm {
    pub protocol: &'static str,
    pub apikey: String,
    pub transaction: String,
    pub order_number: String,
    pub amount: String,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub callback_url: String,
    pub test: &'static str,
    #[serde(rename = "customParams")]
    pub custom_params: String,
    #[serde(rename = "cartParams")]
    pub cart_params: String,
    pub md5check: String,
    pub tbyb: String,
}

pub struct CheckoutService {
    store: Arc<dyn OrderStore>,
    merchant: MerchantConfig,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn OrderStore>, merchant: MerchantConfig) -> Self {
        Self { store, merchant }
    }

    /// Build the signed checkout form for the receipt page and move the
    /// order into the pending state. The pending mark and the test-mode
    /// flag are sticky: re-rendering the receipt never rewinds an order
    /// that has progressed past pending.
    pub async fn prepare(
        &self,
        order_id: u64,
        urls: &CheckoutUrls,
        custom_params: &JsonValue,
        cart_params: &JsonValue,
    ) -> GatewayResult<CheckoutForm> {
        let order = self.load(order_id).await?;
        let method = order
            .payment_method
            .clone()
            .ok_or(GatewayError::WrongPaymentMethod)?;

        if order.viabill_status.is_none() {
            let mut update = OrderUpdate::default().with_viabill_status(ViabillStatus::Pending);
            if self.merchant.test_mode {
                update.in_test_mode = Some(true);
            }
            self.store.apply(order.id, update).await?;
            info!(order_id = order.id, "order marked pending for checkout");
        }

        Ok(self.build_form(&order, urls, custom_params, cart_params, method.tbyb_flag()))
    }

    /// Record that the authorize redirect was issued for the order:
    /// `pending` advances to `pending_approval`, anything else is left
    /// alone.
    pub async fn mark_authorize_issued(&self, order_id: u64) -> GatewayResult<()> {
        let order = self.load(order_id).await?;
        if matches!(
            order.viabill_status,
            None | Some(ViabillStatus::Pending)
        ) {
            self.store
                .apply(
                    order.id,
                    OrderUpdate::default().with_viabill_status(ViabillStatus::PendingApproval),
                )
                .await?;
            info!(order_id = order.id, "order advanced to pending approval");
        }
        Ok(())
    }

    fn build_form(
        &self,
        order: &OrderSnapshot,
        urls: &CheckoutUrls,
        custom_params: &JsonValue,
        cart_params: &JsonValue,
        tbyb: u8,
    ) -> CheckoutForm {
        let transaction = transaction_id(order, IdScheme::Current);
        let order_number = signed_order_number(order, IdScheme::Current);
        let amount = format_amount(order.total);

        let md5check = checkout_signature(
            &self.merchant.api_key,
            &amount,
            &order.currency,
            &transaction,
            &order_number,
            &urls.success,
            &urls.cancel,
            &self.merchant.secret,
        );

        CheckoutForm {
            protocol: "3.0",
            apikey: self.merchant.api_key.clone(),
            transaction,
            order_number,
            amount,
            currency: order.currency.clone(),
            success_url: urls.success.clone(),
            cancel_url: urls.cancel.clone(),
            callback_url: urls.callback.clone(),
            test: if self.merchant.test_mode {
                "true"
            } else {
                "false"
            },
            custom_params: custom_params.to_string(),
            cart_params: cart_params.to_string(),
            md5check,
            tbyb: tbyb.to_string(),
        }
    }

    async fn load(&self, order_id: u64) -> GatewayResult<OrderSnapshot> {
        self.store
            .find(order_id)
            .await?
            .ok_or_else(|| GatewayError::OrderNotFound(order_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::store::InMemoryOrderStore;
    use crate::order::types::{HostStatus, PaymentMethod};
    use rust_decimal_macros::dec;

    fn merchant(test_mode: bool) -> MerchantConfig {
        MerchantConfig {
            api_key: "key".to_string(),
            secret: "secret".to_string(),
            base_url: "https://secure.viabill.com".to_string(),
            timeout_secs: 60,
            test_mode,
        }
    }

    fn urls() -> CheckoutUrls {
        CheckoutUrls {
            success: "https://shop.example.com/success".to_string(),
            cancel: "https://shop.example.com/cancel".to_string(),
            callback: "https://shop.example.com/wc-api/viabill".to_string(),
        }
    }

    fn order(method: PaymentMethod) -> OrderSnapshot {
        OrderSnapshot {
            id: 1042,
            order_number: "#1042 ".to_string(),
            order_key: "wc_order_x9YzQ".to_string(),
            total: dec!(49.99),
            currency: "EUR".to_string(),
            payment_method: Some(method),
            host_status: HostStatus::Pending,
            viabill_status: None,
            captured_amount: dec!(0),
            in_test_mode: false,
        }
    }

    async fn service(test_mode: bool, seed: OrderSnapshot) -> (CheckoutService, Arc<InMemoryOrderStore>) {
        let store = Arc::new(InMemoryOrderStore::new());
        store.insert(seed).await;
        (
            CheckoutService::new(store.clone(), merchant(test_mode)),
            store,
        )
    }

    #[tokio::test]
    async fn prepare_builds_a_signed_protocol_3_form() {
        let (service, _) = service(false, order(PaymentMethod::Monthly)).await;
        let urls = urls();
        let form = service
            .prepare(1042, &urls, &serde_json::json!({}), &serde_json::json!([]))
            .await
            .unwrap();

        assert_eq!(form.protocol, "3.0");
        assert_eq!(form.transaction, "OrdNum_1042");
        assert_eq!(form.order_number, "1042");
        assert_eq!(form.amount, "49.99");
        assert_eq!(form.currency, "EUR");
        assert_eq!(form.test, "false");
        assert_eq!(form.tbyb, "0");
        assert_eq!(
            form.md5check,
            checkout_signature(
                "key",
                "49.99",
                "EUR",
                "OrdNum_1042",
                "1042",
                &urls.success,
                &urls.cancel,
                "secret",
            )
        );
    }

    #[tokio::test]
    async fn prepare_marks_the_order_pending_once() {
        let (service, store) = service(true, order(PaymentMethod::Monthly)).await;
        service
            .prepare(1042, &urls(), &serde_json::json!({}), &serde_json::json!([]))
            .await
            .unwrap();

        let after = store.find(1042).await.unwrap().unwrap();
        assert_eq!(after.viabill_status, Some(ViabillStatus::Pending));
        assert!(after.in_test_mode);
    }

    #[tokio::test]
    async fn prepare_does_not_rewind_a_progressed_order() {
        let mut seed = order(PaymentMethod::Monthly);
        seed.viabill_status = Some(ViabillStatus::Approved);
        let (service, store) = service(false, seed).await;

        service
            .prepare(1042, &urls(), &serde_json::json!({}), &serde_json::json!([]))
            .await
            .unwrap();

        let after = store.find(1042).await.unwrap().unwrap();
        assert_eq!(after.viabill_status, Some(ViabillStatus::Approved));
    }

    #[tokio::test]
    async fn try_before_you_buy_sets_the_tbyb_flag() {
        let (service, _) = service(false, order(PaymentMethod::TryBeforeYouBuy)).await;
        let form = service
            .prepare(1042, &urls(), &serde_json::json!({}), &serde_json::json!([]))
            .await
            .unwrap();
        assert_eq!(form.tbyb, "1");
    }

    #[tokio::test]
    async fn authorize_advances_pending_to_pending_approval() {
        let mut seed = order(PaymentMethod::Monthly);
        seed.viabill_status = Some(ViabillStatus::Pending);
        let (service, store) = service(false, seed).await;

        service.mark_authorize_issued(1042).await.unwrap();
        let after = store.find(1042).await.unwrap().unwrap();
        assert_eq!(after.viabill_status, Some(ViabillStatus::PendingApproval));
    }

    #[tokio::test]
    async fn authorize_leaves_later_states_alone() {
        let mut seed = order(PaymentMethod::Monthly);
        seed.viabill_status = Some(ViabillStatus::Approved);
        let (service, store) = service(false, seed).await;

        service.mark_authorize_issued(1042).await.unwrap();
        let after = store.find(1042).await.unwrap().unwrap();
        assert_eq!(after.viabill_status, Some(ViabillStatus::Approved));
    }

    #[tokio::test]
    async fn prepare_rejects_non_viabill_orders() {
        let mut seed = order(PaymentMethod::Monthly);
        seed.payment_method = None;
        let (service, _) = service(false, seed).await;

        let err = service
            .prepare(1042, &urls(), &serde_json::json!({}), &serde_json::json!([]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::WrongPaymentMethod));
    }
}
