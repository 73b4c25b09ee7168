use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Failure reason recorded when a charge times out locally. The gateway may still settle it.
pub const EXPIRY_REASON: &str = "expired: no confirmation from gateway";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    /// Set on refund records; points at the charge being refunded.
    pub parent_payment_id: Option<Uuid>,
    pub kind: PaymentKind,
    /// Negative for refunds.
    pub amount_cents: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub gateway: String,
    pub status: PaymentStatus,
    pub payer: Option<String>,
    pub reference: String,
    pub checkout_request_id: Option<String>,
    pub merchant_request_id: Option<String>,
    pub receipt_number: Option<String>,
    pub transaction_date: Option<NaiveDateTime>,
    pub failure_reason: Option<String>,
    pub description: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Failed only because we stopped waiting, not because the gateway said so.
    pub fn is_expired(&self) -> bool {
        self.status == PaymentStatus::Failed
            && self.failure_reason.as_deref() == Some(EXPIRY_REASON)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(PaymentStatus::Pending),
            "Completed" => Some(PaymentStatus::Completed),
            "Failed" => Some(PaymentStatus::Failed),
            "Refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    /// Transitions only move forward. `Failed -> Completed` is reserved for a charge we
    /// expired locally that the gateway later confirms (see [`Payment::is_expired`]).
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Completed)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Failed, PaymentStatus::Completed)
                | (PaymentStatus::Completed, PaymentStatus::Refunded)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Charge,
    Refund,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Charge => "Charge",
            PaymentKind::Refund => "Refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Charge" => Some(PaymentKind::Charge),
            "Refund" => Some(PaymentKind::Refund),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    MobileMoney,
    Card,
    BankTransfer,
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::MobileMoney
    }
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::MobileMoney => "MobileMoney",
            PaymentMethod::Card => "Card",
            PaymentMethod::BankTransfer => "BankTransfer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MobileMoney" => Some(PaymentMethod::MobileMoney),
            "Card" => Some(PaymentMethod::Card),
            "BankTransfer" => Some(PaymentMethod::BankTransfer),
            _ => None,
        }
    }
}

/// Proof of a successful charge as reported by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Receipt {
    pub receipt_number: Option<String>,
    pub transaction_date: Option<NaiveDateTime>,
    pub payer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatePaymentRequest {
    pub phone: String,
    #[serde(default)]
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatedPayment {
    pub payment_id: Uuid,
    pub checkout_request_id: String,
    pub customer_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub amount_cents: i64,
    #[serde(default)]
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_transitions_only_move_forward() {
        use PaymentStatus::*;
        let all = [Pending, Completed, Failed, Refunded];
        let allowed = [
            (Pending, Completed),
            (Pending, Failed),
            (Failed, Completed),
            (Completed, Refunded),
        ];
        for from in all {
            for to in all {
                assert_eq!(from.can_transition_to(to), allowed.contains(&(from, to)));
            }
        }
    }

    #[test]
    fn test_method_defaults_to_mobile_money() {
        let request: InitiatePaymentRequest =
            serde_json::from_str(r#"{"phone": "0712345678"}"#).unwrap();
        assert_eq!(request.method, PaymentMethod::MobileMoney);

        let request: InitiatePaymentRequest =
            serde_json::from_str(r#"{"phone": "0712345678", "method": "bank_transfer"}"#).unwrap();
        assert_eq!(request.method, PaymentMethod::BankTransfer);
    }
}
