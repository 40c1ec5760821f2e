//! Order-status reconciliation: maps provider-reported transaction states
//! and merchant actions onto local order transitions. All `viabill_status`
//! mutations in the system go through this engine, via the callback
//! endpoint, the operator actions, or the host status-changed hooks.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::FlowConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::order::store::OrderStore;
use crate::order::types::{round2, HostStatus, OrderSnapshot, OrderUpdate, ViabillStatus};
use crate::remote::client::RemoteConnector;
use crate::remote::types::CallOutcome;

pub struct ReconciliationEngine {
    store: Arc<dyn OrderStore>,
    connector: Arc<RemoteConnector>,
    flow: FlowConfig,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        connector: Arc<RemoteConnector>,
        flow: FlowConfig,
    ) -> Self {
        Self {
            store,
            connector,
            flow,
        }
    }

    async fn load(&self, order_id: u64) -> GatewayResult<OrderSnapshot> {
        self.store
            .find(order_id)
            .await?
            .ok_or_else(|| GatewayError::OrderNotFound(order_id.to_string()))
    }

    /// Apply a remote-pushed status from a verified callback. The handler
    /// has already checked signature, payment method and the pending
    /// precondition; this is the transition table itself.
    pub async fn apply_callback_status(
        &self,
        order: &OrderSnapshot,
        status_raw: &str,
    ) -> GatewayResult<()> {
        let status = ViabillStatus::from_remote(status_raw);
        info!(order_id = order.id, status = %status, "applying callback status");

        match status {
            ViabillStatus::Approved => {
                self.store
                    .apply(
                        order.id,
                        OrderUpdate::note("Order approved by ViaBill.")
                            .with_viabill_status(ViabillStatus::Approved)
                            .with_host_status(self.flow.approved_status.clone()),
                    )
                    .await?;

                if self.flow.auto_capture {
                    info!(order_id = order.id, "executing automatic capture");
                    // Fresh snapshot: the approval write above must be
                    // visible to the capture bookkeeping.
                    if let Err(e) = self.capture(order.id, None).await {
                        warn!(order_id = order.id, error = %e, "automatic capture failed");
                    }
                }
            }
            ViabillStatus::Cancelled => {
                self.store
                    .apply(
                        order.id,
                        OrderUpdate::note("ViaBill's new order status: Cancelled")
                            .with_viabill_status(ViabillStatus::Cancelled)
                            .with_host_status(HostStatus::Cancelled),
                    )
                    .await?;
            }
            ViabillStatus::Rejected => {
                self.store
                    .apply(
                        order.id,
                        OrderUpdate::note("ViaBill's new order status: Rejected")
                            .with_viabill_status(ViabillStatus::Rejected)
                            .with_host_status(HostStatus::Failed),
                    )
                    .await?;
            }
            other => {
                // Unknown values are recorded verbatim; the host status is
                // left alone.
                self.store
                    .apply(
                        order.id,
                        OrderUpdate::note(format!("ViaBill's new order status: {}", other))
                            .with_viabill_status(other.clone()),
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// Capture `amount` (full remaining amount when `None`) and book the
    /// result. `captured_amount` is monotonically non-decreasing and never
    /// exceeds the order total; violations are rejected before any
    /// network call.
    pub async fn capture(
        &self,
        order_id: u64,
        amount: Option<Decimal>,
    ) -> GatewayResult<CallOutcome> {
        let order = self.load(order_id).await?;
        let attempt = self.connector.capture(&order, amount).await?;

        if !attempt.outcome.success {
            self.store
                .apply(
                    order.id,
                    OrderUpdate::note(format!(
                        "Something went wrong while trying to capture {} {}",
                        attempt.amount, order.currency
                    )),
                )
                .await?;
            return Ok(attempt.outcome);
        }

        let captured = order.captured_amount + attempt.amount;
        let note = format!(
            "Captured {} {} via ViaBill payment gateway",
            attempt.amount, order.currency
        );

        let mut update = OrderUpdate::note(note).with_captured_amount(captured);
        if round2(captured) == round2(order.total) {
            update = update.with_viabill_status(ViabillStatus::Captured);
            if order.host_status != self.flow.captured_status {
                update = update.with_host_status(self.flow.captured_status.clone());
            }
        } else {
            update = update.with_viabill_status(ViabillStatus::CapturedPartially);
        }
        self.store.apply(order.id, update).await?;

        info!(
            order_id = order.id,
            amount = %attempt.amount,
            captured_total = %captured,
            "successfully captured via ViaBill payment gateway"
        );

        Ok(attempt.outcome)
    }

    /// Refund `amount` at the provider and book the result: on success a
    /// host refund record is created so `total_refunded` stays accurate,
    /// and `viabill_status` settles to refunded or partially refunded.
    /// Failure reverts nothing by itself; the status-change hook decides.
    pub async fn refund(&self, order_id: u64, amount: Decimal) -> GatewayResult<CallOutcome> {
        let order = self.load(order_id).await?;
        let outcome = self
            .connector
            .refund(&order, amount, &order.currency)
            .await?;

        if !outcome.success {
            self.store
                .apply(
                    order.id,
                    OrderUpdate::note(format!(
                        "Failed to refund {} {} via ViaBill payment gateway",
                        amount, order.currency
                    )),
                )
                .await?;
            return Ok(outcome);
        }

        self.store.create_refund(order.id, amount).await?;
        let refunded = self.store.total_refunded(order.id).await?;
        let status = if round2(order.total - refunded) > Decimal::ZERO {
            ViabillStatus::RefundedPartially
        } else {
            ViabillStatus::Refunded
        };
        self.store
            .apply(
                order.id,
                OrderUpdate::note(format!(
                    "Successfully refunded {} {} via ViaBill payment gateway",
                    amount, order.currency
                ))
                .with_viabill_status(status),
            )
            .await?;

        Ok(outcome)
    }

    /// Operator-initiated status refresh: fetch the remote transaction
    /// state and fold it into local order state. Returns the remote state
    /// when one was available.
    pub async fn sync_remote_status(&self, order_id: u64) -> GatewayResult<Option<ViabillStatus>> {
        let order = self.load(order_id).await?;
        let Some(remote_state) = self.connector.get_status(&order).await? else {
            warn!(order_id = order.id, "no status returned by ViaBill");
            return Ok(None);
        };

        let status = ViabillStatus::from_remote(&remote_state);
        info!(order_id = order.id, status = %status, "refresh returned remote status");

        let stored = order.viabill_status.clone();
        let mut update = OrderUpdate::default();

        match &status {
            ViabillStatus::Waiting => {
                let skip_statuses = [
                    Some(ViabillStatus::Pending),
                    Some(ViabillStatus::Waiting),
                    Some(ViabillStatus::Cancelled),
                    Some(ViabillStatus::PendingApproval),
                ];
                if !skip_statuses.contains(&stored) {
                    update = update.with_viabill_status(ViabillStatus::Waiting);
                }
                // Remote still waiting: a stale local cancellation is
                // rolled back to pending.
                if order.host_status == HostStatus::Cancelled {
                    update = update.with_host_status(HostStatus::Pending);
                }
            }
            ViabillStatus::Approved => {
                update = update
                    .with_viabill_status(ViabillStatus::Approved)
                    .with_host_status(self.flow.approved_status.clone());
                update.note = Some("Order approved by ViaBill.".to_string());
            }
            ViabillStatus::Captured => {
                if !matches!(
                    stored,
                    Some(ViabillStatus::Captured) | Some(ViabillStatus::CapturedPartially)
                ) {
                    update = update.with_viabill_status(ViabillStatus::Captured);
                }
                if round2(order.captured_amount) == round2(order.total) {
                    update = update.with_host_status(self.flow.captured_status.clone());
                    update.note = Some("Order captured by ViaBill.".to_string());
                }
            }
            ViabillStatus::Refunded => {
                if !matches!(
                    stored,
                    Some(ViabillStatus::Refunded) | Some(ViabillStatus::RefundedPartially)
                ) {
                    update = update.with_viabill_status(ViabillStatus::Refunded);
                }
                let refunded = self.store.total_refunded(order.id).await?;
                if round2(order.total - refunded) <= Decimal::ZERO {
                    update = update.with_host_status(HostStatus::Refunded);
                    update.note = Some("Order refunded by ViaBill.".to_string());
                }
            }
            ViabillStatus::Rejected => {
                update = update
                    .with_viabill_status(ViabillStatus::Rejected)
                    .with_host_status(HostStatus::Failed);
                update.note = Some("Order payment rejected by ViaBill.".to_string());
            }
            ViabillStatus::Cancelled => {
                update = update
                    .with_viabill_status(ViabillStatus::Cancelled)
                    .with_host_status(HostStatus::Cancelled);
                update.note = Some("Order cancelled by ViaBill.".to_string());
            }
            other => {
                update = update.with_viabill_status(other.clone());
            }
        }

        self.store.apply(order.id, update).await?;
        Ok(Some(status))
    }

    /// Apply an operator's host-status edit and run the status-changed
    /// hooks. The refund hook is the single path allowed to undo the edit:
    /// on a failed remote refund the host status is rolled back and the
    /// error is fatal to the caller.
    pub async fn change_host_status(&self, order_id: u64, to: HostStatus) -> GatewayResult<()> {
        let order = self.load(order_id).await?;
        let from = order.host_status.clone();
        if from == to {
            return Ok(());
        }

        self.store
            .apply(order_id, OrderUpdate::default().with_host_status(to.clone()))
            .await?;

        // Non-ViaBill orders get the plain edit and nothing else.
        if !order.is_viabill() {
            return Ok(());
        }

        if to == HostStatus::Cancelled {
            self.maybe_cancel(&order).await?;
        }

        if self.flow.capture_on_status_switch
            && from == self.flow.approved_status
            && to == self.flow.captured_status
            && order.viabill_status != Some(ViabillStatus::Captured)
        {
            info!(order_id, "executing capture on status change");
            if let Err(e) = self.capture(order_id, None).await {
                warn!(order_id, error = %e, "capture on status change failed");
            }
        }

        if to == HostStatus::Refunded {
            self.maybe_refund(&order, &from).await?;
        }

        Ok(())
    }

    /// Cancel at ViaBill after an operator cancelled the order locally.
    /// Failure leaves local state alone apart from an audit note.
    async fn maybe_cancel(&self, order: &OrderSnapshot) -> GatewayResult<()> {
        if matches!(
            order.viabill_status,
            Some(ViabillStatus::Pending) | Some(ViabillStatus::Waiting)
        ) {
            return Ok(());
        }

        let outcome = self.connector.cancel(order).await?;
        let update = if outcome.success {
            info!(order_id = order.id, "successfully cancelled order via ViaBill payment gateway");
            OrderUpdate::note("Order successfully canceled at ViaBill.")
                .with_viabill_status(ViabillStatus::Cancelled)
        } else {
            warn!(
                order_id = order.id,
                message = %outcome.message,
                "failed to cancel order via ViaBill payment gateway"
            );
            let mut note = "Something went wrong while trying to cancel the order.".to_string();
            if !outcome.message.is_empty() {
                note.push_str(&format!(" ViaBill's response: \"{}\"", outcome.message));
            }
            OrderUpdate::note(note)
        };

        self.store.apply(order.id, update).await
    }

    /// Automatic refund when an operator moves the order to refunded.
    async fn maybe_refund(&self, order: &OrderSnapshot, from: &HostStatus) -> GatewayResult<()> {
        if !self.flow.automatic_refund {
            return Ok(());
        }

        if order.viabill_status == Some(ViabillStatus::Refunded) {
            return Ok(());
        }

        if order.captured_amount == Decimal::ZERO {
            // Nothing was ever collected, so there is nothing to refund
            // remotely; short-circuit to the terminal state.
            return self
                .store
                .apply(
                    order.id,
                    OrderUpdate::note(
                        "Order has not been captured, nothing to refund through ViaBill payment gateway.",
                    )
                    .with_viabill_status(ViabillStatus::Refunded),
                )
                .await;
        }

        let refunded = self.store.total_refunded(order.id).await?;
        let max_refund = round2(order.captured_amount - refunded);
        if max_refund <= Decimal::ZERO {
            warn!(order_id = order.id, "total amount already refunded");
            return Ok(());
        }

        let outcome = self.refund(order.id, max_refund).await?;

        if !outcome.success {
            // The one transition that gets undone: roll the host status
            // back and make the failure fatal to the caller.
            self.store
                .apply(
                    order.id,
                    OrderUpdate::default().with_host_status(from.clone()),
                )
                .await?;
            return Err(GatewayError::RefundFailed {
                message: outcome.message,
                reverted_to: from.to_string(),
            });
        }

        Ok(())
    }
}
