use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::config::Config;
use crate::domain_store::{
    CaptureInput, CaptureOutcome, DomainStore, DomainStoreError, OrderStatus, PaymentOrderRecord,
    PaymentRecord, PaymentTarget,
};
use crate::observability::{AuditEvent, Observability};
use crate::payments::{
    GatewayError, GatewayOrderState, GatewayPayment, PaymentGateway, WebhookEvent,
    WebhookSignature, WebhookVerifier, parse_webhook, verify_checkout_signature,
};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("payment order {order_id} is unknown")]
    UnknownOrder { order_id: String },
    #[error("{message}")]
    AmountMismatch { message: String },
    #[error("payment is {status}, not captured")]
    NotCaptured { status: String },
    #[error("invalid payment signature")]
    InvalidSignature,
    #[error("order does not belong to this payment target")]
    TargetMismatch,
    #[error("{message}")]
    NotConfigured { message: String },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] DomainStoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied { order: PaymentOrderRecord },
    AlreadyApplied { order: PaymentOrderRecord },
    /// Captured, but nothing was left to mark paid.
    Orphaned { order: PaymentOrderRecord },
}

impl ReconcileOutcome {
    pub fn order(&self) -> &PaymentOrderRecord {
        match self {
            Self::Applied { order }
            | Self::AlreadyApplied { order }
            | Self::Orphaned { order } => order,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::AlreadyApplied { .. } => "already_applied",
            Self::Orphaned { .. } => "orphaned",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutVerification {
    pub payment: PaymentRecord,
    /// Present once the payment was captured and applied.
    pub outcome: Option<ReconcileOutcome>,
}

#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub amount_minor: u64,
    pub currency: String,
    pub status: GatewayOrderState,
    pub outcome: Option<ReconcileOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    pub event_type: String,
    pub result: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub checked: usize,
    pub applied: usize,
    pub already_applied: usize,
    pub still_pending: usize,
    pub mismatched: usize,
    pub orphaned: usize,
    pub failed: usize,
}

/// Single path from a gateway capture to a paid registration or event team.
#[derive(Clone)]
pub struct PaymentReconciler {
    store: DomainStore,
    gateway: Arc<dyn PaymentGateway>,
    observability: Observability,
    checkout_secret: Option<String>,
    webhook: WebhookVerifier,
}

impl PaymentReconciler {
    pub fn new(
        config: &Config,
        store: DomainStore,
        gateway: Arc<dyn PaymentGateway>,
        observability: Observability,
    ) -> Self {
        Self {
            store,
            gateway,
            observability,
            checkout_secret: config.razorpay_key_secret.clone(),
            webhook: WebhookVerifier::from_config(config),
        }
    }

    pub fn gateway(&self) -> &Arc<dyn PaymentGateway> {
        &self.gateway
    }

    pub async fn apply_capture(
        &self,
        order_id: &str,
        payment: &GatewayPayment,
        request_id: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if !payment.is_captured() {
            return Err(ReconcileError::NotCaptured {
                status: payment.status.clone(),
            });
        }

        let capture = CaptureInput {
            order_id: order_id.to_string(),
            payment_id: payment.payment_id.clone(),
            gateway_order_id: payment.order_id.clone(),
            amount_minor: payment.amount_minor,
        };
        let outcome = match self.store.apply_payment_capture(capture).await {
            Ok(outcome) => outcome,
            Err(DomainStoreError::NotFound { .. }) => {
                return Err(ReconcileError::UnknownOrder {
                    order_id: order_id.to_string(),
                });
            }
            Err(error) => return Err(error.into()),
        };

        match outcome {
            CaptureOutcome::Applied { order } => {
                self.audit_capture(&order, &payment.payment_id, "applied", request_id);
                self.observability
                    .increment_counter("payment.applied", request_id);
                Ok(ReconcileOutcome::Applied { order })
            }
            CaptureOutcome::Orphaned { order } => {
                tracing::warn!(
                    target: "eventhub.payments",
                    order_id = %order.order_id,
                    payment_id = %payment.payment_id,
                    target = order.target.id(),
                    "captured order has no remaining target",
                );
                self.audit_capture(&order, &payment.payment_id, "orphaned", request_id);
                self.observability
                    .increment_counter("payment.orphaned", request_id);
                Ok(ReconcileOutcome::Orphaned { order })
            }
            CaptureOutcome::AlreadyApplied { order } => {
                Ok(ReconcileOutcome::AlreadyApplied { order })
            }
            CaptureOutcome::Duplicate { order } => {
                self.audit_capture(&order, &payment.payment_id, "duplicate", request_id);
                self.observability
                    .increment_counter("payment.duplicate", request_id);
                Ok(ReconcileOutcome::AlreadyApplied { order })
            }
            CaptureOutcome::Rejected { order, reason } => {
                self.audit_capture(&order, &payment.payment_id, "mismatch", request_id);
                self.observability
                    .increment_counter("payment.mismatch", request_id);
                Err(ReconcileError::AmountMismatch { message: reason })
            }
        }
    }

    /// Checks a Razorpay checkout callback, records the payment, and applies it
    /// when captured.
    pub async fn verify_checkout(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
        expected_target: Option<&PaymentTarget>,
        request_id: &str,
    ) -> Result<CheckoutVerification, ReconcileError> {
        let Some(secret) = self.checkout_secret.as_deref() else {
            return Err(ReconcileError::NotConfigured {
                message: "Checkout signature secret is not configured.".to_string(),
            });
        };
        if !verify_checkout_signature(secret, order_id, payment_id, signature) {
            self.observability
                .increment_counter("payment.signature_rejected", request_id);
            return Err(ReconcileError::InvalidSignature);
        }

        let order = self.store.get_payment_order(order_id).await.ok_or_else(|| {
            ReconcileError::UnknownOrder {
                order_id: order_id.to_string(),
            }
        })?;
        if let Some(expected) = expected_target {
            if *expected != order.target {
                return Err(ReconcileError::TargetMismatch);
            }
        }

        let payment = self.gateway.fetch_payment(payment_id).await?;
        let record = self.record_payment(&payment).await?;
        if !payment.is_captured() {
            return Ok(CheckoutVerification {
                payment: record,
                outcome: None,
            });
        }

        let outcome = self.apply_capture(order_id, &payment, request_id).await?;
        Ok(CheckoutVerification {
            payment: record,
            outcome: Some(outcome),
        })
    }

    /// Asks the gateway for the order's state and applies a capture it reports.
    pub async fn confirm_order(
        &self,
        order_id: &str,
        request_id: &str,
    ) -> Result<OrderConfirmation, ReconcileError> {
        if self.store.get_payment_order(order_id).await.is_none() {
            return Err(ReconcileError::UnknownOrder {
                order_id: order_id.to_string(),
            });
        }

        let status = self.gateway.fetch_order(order_id).await?;
        let outcome = match status.captured_payment.as_ref() {
            Some(payment) if status.status == GatewayOrderState::Paid => {
                self.record_payment(payment).await?;
                Some(self.apply_capture(order_id, payment, request_id).await?)
            }
            _ => None,
        };

        Ok(OrderConfirmation {
            order_id: status.order_id,
            amount_minor: status.amount_minor,
            currency: status.currency,
            status: status.status,
            outcome,
        })
    }

    pub async fn handle_webhook(
        &self,
        signature: &WebhookSignature,
        body: &[u8],
        request_id: &str,
    ) -> Result<WebhookOutcome, ReconcileError> {
        if !self.webhook.verify(signature, body) {
            self.observability
                .increment_counter("payment.webhook_rejected", request_id);
            return Err(ReconcileError::InvalidSignature);
        }

        let (event_type, payment) = match parse_webhook(self.webhook.scheme(), body)? {
            WebhookEvent::Ignored { event_type } => {
                return Ok(WebhookOutcome {
                    event_type,
                    result: "ignored",
                });
            }
            WebhookEvent::Captured {
                event_type,
                payment,
            } => (event_type, payment),
        };

        self.record_payment(&payment).await?;
        let result = match self
            .apply_capture(&payment.order_id, &payment, request_id)
            .await
        {
            Ok(outcome) => outcome.label(),
            Err(ReconcileError::UnknownOrder { order_id }) => {
                tracing::warn!(
                    target: "eventhub.payments",
                    order_id = %order_id,
                    payment_id = %payment.payment_id,
                    "webhook references an order this service did not create",
                );
                "unknown_order"
            }
            Err(ReconcileError::AmountMismatch { .. }) => "mismatch",
            Err(error) => return Err(error),
        };

        Ok(WebhookOutcome { event_type, result })
    }

    /// Queries the gateway for every created order older than `grace`.
    pub async fn reconcile_pending(
        &self,
        grace: Duration,
        request_id: &str,
    ) -> ReconcileSummary {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::zero());
        let orders = self
            .store
            .list_payment_orders(Some(OrderStatus::Created))
            .await;

        let mut summary = ReconcileSummary::default();
        for order in orders.into_iter().filter(|order| order.created_at <= cutoff) {
            summary.checked += 1;
            match self.confirm_order(&order.order_id, request_id).await {
                Ok(OrderConfirmation {
                    outcome: Some(ReconcileOutcome::Applied { .. }),
                    ..
                }) => summary.applied += 1,
                Ok(OrderConfirmation {
                    outcome: Some(ReconcileOutcome::AlreadyApplied { .. }),
                    ..
                }) => summary.already_applied += 1,
                Ok(OrderConfirmation {
                    outcome: Some(ReconcileOutcome::Orphaned { .. }),
                    ..
                }) => summary.orphaned += 1,
                Ok(OrderConfirmation { outcome: None, .. }) => summary.still_pending += 1,
                Err(ReconcileError::AmountMismatch { .. }) => summary.mismatched += 1,
                Err(error) => {
                    summary.failed += 1;
                    tracing::warn!(
                        target: "eventhub.payments",
                        order_id = %order.order_id,
                        error = %error,
                        "failed to reconcile pending order",
                    );
                }
            }
        }

        tracing::info!(
            target: "eventhub.payments",
            checked = summary.checked,
            applied = summary.applied,
            still_pending = summary.still_pending,
            orphaned = summary.orphaned,
            failed = summary.failed,
            "pending order reconciliation finished",
        );
        summary
    }

    async fn record_payment(&self, payment: &GatewayPayment) -> Result<PaymentRecord, ReconcileError> {
        let status = if payment.is_captured() {
            "paid".to_string()
        } else {
            payment.status.clone()
        };
        let record = self
            .store
            .upsert_payment(PaymentRecord {
                payment_id: payment.payment_id.clone(),
                order_id: payment.order_id.clone(),
                gateway: self.gateway.name().to_string(),
                status,
                amount_minor: payment.amount_minor,
                currency: payment.currency.clone(),
                method: payment.method.clone(),
                email: payment.email.clone(),
                contact: payment.contact.clone(),
                created_at: Utc::now(),
            })
            .await?;
        Ok(record)
    }

    fn audit_capture(
        &self,
        order: &PaymentOrderRecord,
        payment_id: &str,
        outcome: &str,
        request_id: &str,
    ) {
        self.observability.audit(
            AuditEvent::new("payment.capture", request_id)
                .with_user_id(order.payer_email.clone())
                .with_outcome(outcome)
                .with_attribute("order_id", order.order_id.clone())
                .with_attribute("payment_id", payment_id)
                .with_attribute("target", order.target.kind())
                .with_attribute("target_id", order.target.id())
                .with_attribute("amount_minor", order.amount_minor.to_string()),
        );
    }
}
