use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{PaymentMethod, Receipt};
use crate::error::Result;

pub mod mpesa;

pub use mpesa::MpesaGateway;

/// What the platform asks a gateway to collect.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount_cents: i64,
    pub payer: String,
    /// Account reference shown to the payer; the booking id.
    pub reference: String,
    pub description: String,
}

/// Gateway handle for a charge it agreed to start.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeAccepted {
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub customer_message: Option<String>,
}

/// Result of asking a gateway where a charge stands.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayOutcome {
    Pending,
    Succeeded(Receipt),
    Failed { reason: String },
}

/// A settled result pushed to us by a gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Succeeded(Receipt),
    Failed { reason: String },
}

impl From<CallbackOutcome> for GatewayOutcome {
    fn from(outcome: CallbackOutcome) -> Self {
        match outcome {
            CallbackOutcome::Succeeded(receipt) => GatewayOutcome::Succeeded(receipt),
            CallbackOutcome::Failed { reason } => GatewayOutcome::Failed { reason },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallbackReport {
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub outcome: CallbackOutcome,
}

/// Acknowledgement body returned to the gateway for every callback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    pub fn accepted() -> Self {
        Self {
            result_code: 0,
            result_desc: "Accepted".to_string(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            result_code: 1,
            result_desc: reason.into(),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Stored on each payment so status checks go back to the same gateway.
    fn name(&self) -> &str;
    fn supports(&self, method: PaymentMethod) -> bool;
    async fn initiate(&self, request: &ChargeRequest) -> Result<ChargeAccepted>;
    async fn query_status(&self, checkout_request_id: &str) -> Result<GatewayOutcome>;
}
