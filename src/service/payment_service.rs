use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::PaymentPolicy,
    domain::*,
    error::{AppError, Result},
    notifications::{Notification, NotificationKind, Notifier},
    payments::{CallbackAck, CallbackReport, ChargeRequest, GatewayOutcome, PaymentGateway},
    repository::{BookingRepository, PaymentRepository, UserRepository},
    service::booking_service::resolve_recipient,
};

/// Tally of one stale-payment sweep.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StaleSweep {
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
    pub expired: usize,
    pub still_pending: usize,
}

pub struct PaymentService {
    bookings: Arc<dyn BookingRepository>,
    payments: Arc<dyn PaymentRepository>,
    users: Arc<dyn UserRepository>,
    gateways: Vec<Arc<dyn PaymentGateway>>,
    notifier: Arc<dyn Notifier>,
    policy: PaymentPolicy,
}

impl PaymentService {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        payments: Arc<dyn PaymentRepository>,
        users: Arc<dyn UserRepository>,
        gateways: Vec<Arc<dyn PaymentGateway>>,
        notifier: Arc<dyn Notifier>,
        policy: PaymentPolicy,
    ) -> Self {
        Self {
            bookings,
            payments,
            users,
            gateways,
            notifier,
            policy,
        }
    }

    pub async fn initiate(
        &self,
        actor: &User,
        booking_id: Uuid,
        request: InitiatePaymentRequest,
    ) -> Result<InitiatedPayment> {
        let booking = self.load_booking(booking_id).await?;
        if booking.party_of(actor.id) != Some(Party::Student) {
            return Err(AppError::Authorization(
                "Only the booking's student can pay for it".to_string(),
            ));
        }
        if booking.status != BookingStatus::Pending {
            return Err(AppError::Validation(format!(
                "Cannot pay for a {} booking",
                booking.status.as_str().to_lowercase()
            )));
        }
        if booking.payment_status == BookingPaymentStatus::Paid {
            return Err(AppError::Validation("Booking is already paid".to_string()));
        }

        let gateway = self
            .gateways
            .iter()
            .find(|g| g.supports(request.method))
            .cloned()
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Payment method {} is not supported",
                    request.method.as_str()
                ))
            })?;

        let now = Utc::now();
        if let Some(pending) = self.payments.find_pending_charge(booking_id).await? {
            if now - pending.created_at < self.policy.pending_expiry {
                return Err(AppError::Validation(
                    "A payment for this booking is already in progress".to_string(),
                ));
            }
            // The student may have paid after all; ask before giving up on it.
            match self.poll(&pending).await? {
                GatewayOutcome::Pending => {
                    self.expire(&pending, now).await?;
                }
                resolved => {
                    let settled = self.apply_outcome(pending, resolved).await?;
                    if settled.status == PaymentStatus::Completed {
                        return Err(AppError::Validation("Booking is already paid".to_string()));
                    }
                }
            }
        }

        let reference = account_reference(booking.id);
        let description = format!("Tutoring session: {}", booking.subject);
        let accepted = gateway
            .initiate(&ChargeRequest {
                amount_cents: booking.total_amount_cents,
                payer: request.phone.clone(),
                reference: reference.clone(),
                description: description.clone(),
            })
            .await?;

        let payment = Payment {
            id: Uuid::new_v4(),
            booking_id,
            parent_payment_id: None,
            kind: PaymentKind::Charge,
            amount_cents: booking.total_amount_cents,
            currency: booking.currency.clone(),
            method: request.method,
            gateway: gateway.name().to_string(),
            status: PaymentStatus::Pending,
            payer: Some(request.phone),
            reference,
            checkout_request_id: Some(accepted.checkout_request_id.clone()),
            merchant_request_id: accepted.merchant_request_id.clone(),
            receipt_number: None,
            transaction_date: None,
            failure_reason: None,
            description,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };

        let payment = self.payments.create(payment).await.map_err(|e| {
            tracing::warn!(
                "Gateway accepted checkout {} but the payment was not recorded: {}",
                accepted.checkout_request_id,
                e
            );
            e
        })?;

        tracing::info!(
            "Payment {} initiated for booking {} via {}",
            payment.id,
            booking_id,
            payment.gateway
        );

        Ok(InitiatedPayment {
            payment_id: payment.id,
            checkout_request_id: accepted.checkout_request_id,
            customer_message: accepted.customer_message,
        })
    }

    /// Apply a gateway callback. Always produces an acknowledgement; errors are logged here.
    pub async fn handle_callback(&self, report: CallbackReport) -> CallbackAck {
        let payment = match self.payments.find_by_checkout_id(&report.checkout_request_id).await {
            Ok(Some(payment)) => payment,
            Ok(None) => {
                tracing::warn!(
                    "Callback for unknown checkout {}",
                    report.checkout_request_id
                );
                return CallbackAck::rejected("Payment not found");
            }
            Err(e) => {
                tracing::error!(
                    "Failed to look up checkout {}: {}",
                    report.checkout_request_id,
                    e
                );
                return CallbackAck::rejected("Temporary failure, please retry");
            }
        };

        match self.apply_outcome(payment, report.outcome.into()).await {
            Ok(_) => CallbackAck::accepted(),
            Err(e) => {
                tracing::error!(
                    "Failed to reconcile checkout {}: {}",
                    report.checkout_request_id,
                    e
                );
                CallbackAck::rejected("Temporary failure, please retry")
            }
        }
    }

    pub async fn get_for(&self, actor: &User, id: Uuid) -> Result<Payment> {
        let payment = self.load_payment(id).await?;
        self.authorize_viewer(actor, &payment).await?;
        Ok(payment)
    }

    /// Ask the gateway about a charge we never heard back on.
    pub async fn check_status(&self, actor: &User, id: Uuid) -> Result<Payment> {
        let payment = self.load_payment(id).await?;
        self.authorize_viewer(actor, &payment).await?;

        if payment.status != PaymentStatus::Pending && !payment.is_expired() {
            return Ok(payment);
        }
        let outcome = self.poll(&payment).await?;
        self.apply_outcome(payment, outcome).await
    }

    pub async fn refund(&self, actor: &User, id: Uuid, request: RefundRequest) -> Result<Payment> {
        if actor.role != UserRole::Admin {
            return Err(AppError::Authorization(
                "Only administrators can issue refunds".to_string(),
            ));
        }

        let original = self.load_payment(id).await?;
        if original.kind != PaymentKind::Charge || original.status != PaymentStatus::Completed {
            return Err(AppError::Policy(
                "Only completed charges can be refunded".to_string(),
            ));
        }
        if request.amount_cents <= 0 {
            return Err(AppError::Validation("Refund amount must be positive".to_string()));
        }
        if request.amount_cents > original.amount_cents {
            return Err(AppError::Validation(format!(
                "Refund of {} exceeds the original payment of {}",
                format_amount(request.amount_cents),
                format_amount(original.amount_cents)
            )));
        }

        let now = Utc::now();
        let reason = request.reason.trim();
        let refund = Payment {
            id: Uuid::new_v4(),
            booking_id: original.booking_id,
            parent_payment_id: Some(original.id),
            kind: PaymentKind::Refund,
            amount_cents: -request.amount_cents,
            currency: original.currency.clone(),
            method: original.method,
            gateway: original.gateway.clone(),
            status: PaymentStatus::Completed,
            payer: original.payer.clone(),
            reference: format!("RF-{}", original.reference),
            checkout_request_id: None,
            merchant_request_id: None,
            receipt_number: None,
            transaction_date: None,
            failure_reason: None,
            description: if reason.is_empty() {
                "Refund".to_string()
            } else {
                reason.to_string()
            },
            completed_at: Some(now),
            created_at: now,
            updated_at: now,
        };

        let refund = self
            .payments
            .record_refund(original.id, refund)
            .await?
            .ok_or_else(|| AppError::Policy("Payment was already refunded".to_string()))?;

        tracing::info!(
            "Refund {} of {} issued against payment {} by {}",
            refund.id,
            format_amount(-refund.amount_cents),
            original.id,
            actor.id
        );

        if let Some(booking) = self.bookings.find_by_id(refund.booking_id).await? {
            self.notify(NotificationKind::RefundProcessed, &booking, booking.student_id, &refund)
                .await;
        }

        Ok(refund)
    }

    /// Poll charges stuck in `Pending` and expire those the gateway still reports
    /// as processing past the expiry window. A charge whose poll fails stays pending.
    pub async fn reconcile_stale(&self, now: DateTime<Utc>) -> Result<StaleSweep> {
        let stale = self
            .payments
            .list_pending_charges_before(now - self.policy.status_check_after)
            .await?;
        let mut sweep = StaleSweep::default();

        for payment in stale {
            sweep.checked += 1;
            let outcome = match self.poll(&payment).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!("Status check for payment {} failed: {}", payment.id, e);
                    sweep.still_pending += 1;
                    continue;
                }
            };

            match outcome {
                GatewayOutcome::Pending if now - payment.created_at >= self.policy.pending_expiry => {
                    if self.expire(&payment, now).await? {
                        sweep.expired += 1;
                    }
                }
                GatewayOutcome::Pending => sweep.still_pending += 1,
                resolved => {
                    let settled = self.apply_outcome(payment, resolved).await?;
                    match settled.status {
                        PaymentStatus::Completed => sweep.completed += 1,
                        PaymentStatus::Failed => sweep.failed += 1,
                        _ => {}
                    }
                }
            }
        }

        if sweep.checked > 0 {
            tracing::info!(
                "Stale payment sweep: {} checked, {} completed, {} failed, {} expired, {} pending",
                sweep.checked,
                sweep.completed,
                sweep.failed,
                sweep.expired,
                sweep.still_pending
            );
        }

        Ok(sweep)
    }

    /// Settle `payment` with a gateway result. A payment that was already settled is left as is,
    /// except that a success still lands on a charge we had expired.
    async fn apply_outcome(&self, payment: Payment, outcome: GatewayOutcome) -> Result<Payment> {
        let now = Utc::now();
        let settled = match outcome {
            GatewayOutcome::Pending => return Ok(payment),
            GatewayOutcome::Succeeded(receipt) => {
                self.payments.settle_success(payment.id, receipt, now).await?
            }
            GatewayOutcome::Failed { reason } => {
                self.payments.settle_failure(payment.id, &reason, now).await?
            }
        };

        let Some(settled) = settled else {
            tracing::debug!(
                "Payment {} already settled, ignoring repeated result",
                payment.id
            );
            return self.load_payment(payment.id).await;
        };

        match settled.status {
            PaymentStatus::Completed => {
                if payment.is_expired() {
                    tracing::warn!(
                        "Payment {} for booking {} completed after it had expired, receipt {:?}",
                        settled.id,
                        settled.booking_id,
                        settled.receipt_number
                    );
                } else {
                    tracing::info!(
                        "Payment {} completed, receipt {:?}",
                        settled.id,
                        settled.receipt_number
                    );
                }
                if let Some(booking) = self.bookings.find_by_id(settled.booking_id).await? {
                    self.notify(NotificationKind::PaymentSucceeded, &booking, booking.student_id, &settled)
                        .await;
                    self.notify(NotificationKind::PaymentSucceeded, &booking, booking.tutor_user_id, &settled)
                        .await;
                }
            }
            PaymentStatus::Failed => {
                tracing::info!(
                    "Payment {} failed: {}",
                    settled.id,
                    settled.failure_reason.as_deref().unwrap_or("unknown")
                );
                if let Some(booking) = self.bookings.find_by_id(settled.booking_id).await? {
                    self.notify(NotificationKind::PaymentFailed, &booking, booking.student_id, &settled)
                        .await;
                }
            }
            _ => {}
        }

        Ok(settled)
    }

    async fn expire(&self, payment: &Payment, now: DateTime<Utc>) -> Result<bool> {
        match self.payments.settle_failure(payment.id, EXPIRY_REASON, now).await? {
            Some(expired) => {
                tracing::warn!(
                    "Payment {} for booking {} expired without gateway confirmation",
                    expired.id,
                    expired.booking_id
                );
                if let Some(booking) = self.bookings.find_by_id(expired.booking_id).await? {
                    self.notify(NotificationKind::PaymentFailed, &booking, booking.student_id, &expired)
                        .await;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn poll(&self, payment: &Payment) -> Result<GatewayOutcome> {
        let Some(checkout_id) = payment.checkout_request_id.as_deref() else {
            return Ok(GatewayOutcome::Pending);
        };
        let gateway = self
            .gateways
            .iter()
            .find(|g| g.name() == payment.gateway)
            .ok_or_else(|| {
                AppError::GatewayUnavailable(format!("Gateway {} is not configured", payment.gateway))
            })?;

        gateway.query_status(checkout_id).await
    }

    async fn authorize_viewer(&self, actor: &User, payment: &Payment) -> Result<()> {
        if actor.role == UserRole::Admin {
            return Ok(());
        }
        let booking = self.load_booking(payment.booking_id).await?;
        if booking.party_of(actor.id).is_none() {
            return Err(AppError::Authorization(
                "You are not a participant in this booking".to_string(),
            ));
        }
        Ok(())
    }

    async fn load_booking(&self, id: Uuid) -> Result<Booking> {
        self.bookings
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))
    }

    async fn load_payment(&self, id: Uuid) -> Result<Payment> {
        self.payments
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))
    }

    async fn notify(&self, kind: NotificationKind, booking: &Booking, user_id: Uuid, payment: &Payment) {
        let recipient = resolve_recipient(self.users.as_ref(), user_id).await;
        self.notifier
            .notify(Notification::for_booking(kind, booking, recipient).with_payment(payment))
            .await;
    }
}

/// Short reference shown on the payer's handset; M-Pesa caps it at 12 characters.
fn account_reference(booking_id: Uuid) -> String {
    let short: String = booking_id.simple().to_string().chars().take(10).collect();
    format!("TB{}", short.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_reference_fits_mpesa_limit() {
        let reference = account_reference(Uuid::new_v4());
        assert_eq!(reference.len(), 12);
        assert!(reference.starts_with("TB"));
    }
}
