use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::{
    config::MpesaConfig,
    domain::{PaymentMethod, Receipt},
    error::{AppError, Result},
    payments::{
        CallbackOutcome, CallbackReport, ChargeAccepted, ChargeRequest, GatewayOutcome,
        PaymentGateway,
    },
};

/// Daraja's answer to a status query for a push the payer has not acted on yet.
const STILL_PROCESSING: &str = "500.001.1001";

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Safaricom Daraja STK push client.
pub struct MpesaGateway {
    client: Client,
    config: MpesaConfig,
    base_url: String,
    token: RwLock<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: Option<String>,
    #[serde(rename = "ResponseCode")]
    response_code: Option<String>,
    #[serde(rename = "ResponseDescription")]
    response_description: Option<String>,
    #[serde(rename = "CustomerMessage")]
    customer_message: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct StkQueryResponse {
    #[serde(rename = "ResultCode")]
    result_code: Option<Value>,
    #[serde(rename = "ResultDesc")]
    result_desc: Option<String>,
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct CallbackEnvelope {
    #[serde(rename = "Body")]
    body: CallbackBody,
}

#[derive(Deserialize)]
struct CallbackBody {
    #[serde(rename = "stkCallback")]
    stk_callback: StkCallback,
}

#[derive(Deserialize)]
struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    result_code: Value,
    #[serde(rename = "ResultDesc")]
    result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata")]
    callback_metadata: Option<CallbackMetadata>,
}

#[derive(Deserialize)]
struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    items: Vec<MetadataItem>,
}

#[derive(Deserialize)]
struct MetadataItem {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Value", default)]
    value: Option<Value>,
}

impl MpesaGateway {
    pub fn new(config: MpesaConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            config,
            token: RwLock::new(None),
        })
    }

    /// Point the client at a different Daraja host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn unavailable(err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            AppError::GatewayUnavailable("M-Pesa request timed out".to_string())
        } else {
            AppError::GatewayUnavailable(format!("M-Pesa request failed: {}", err))
        }
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .get(format!("{}/oauth/v1/generate", self.base_url))
            .query(&[("grant_type", "client_credentials")])
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await
            .map_err(Self::unavailable)?;

        if !response.status().is_success() {
            return Err(AppError::GatewayUnavailable(format!(
                "M-Pesa token request returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response.json().await.map_err(Self::unavailable)?;
        let lifetime = token
            .expires_in
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(3599);

        // Refresh a minute early so a token never expires mid-request.
        let expires_at = Instant::now() + Duration::from_secs(lifetime.saturating_sub(60));
        *self.token.write().await = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at,
        });

        Ok(token.access_token)
    }

    fn password(&self, timestamp: &str) -> String {
        password(&self.config.shortcode, &self.config.passkey, timestamp)
    }
}

/// base64(shortcode ‖ passkey ‖ timestamp), as Daraja expects.
pub fn password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

/// Normalize a Kenyan mobile number to the `2547XXXXXXXX` form.
pub fn normalize_msisdn(phone: &str) -> Result<String> {
    let digits: String = phone
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    let normalized = if let Some(rest) = digits.strip_prefix('0') {
        format!("254{}", rest)
    } else if digits.len() == 9 {
        format!("254{}", digits)
    } else {
        digits
    };

    if normalized.len() == 12
        && normalized.starts_with("254")
        && normalized.chars().all(|c| c.is_ascii_digit())
    {
        Ok(normalized)
    } else {
        Err(AppError::Validation(format!("Invalid phone number: {}", phone)))
    }
}

/// M-Pesa only moves whole shillings; never undercharge a fractional amount.
pub fn whole_units(amount_cents: i64) -> i64 {
    (amount_cents + 99).div_euclid(100)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn result_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse an STK callback body into a gateway-agnostic report.
pub fn parse_callback(body: &[u8]) -> Result<CallbackReport> {
    let envelope: CallbackEnvelope = serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Malformed M-Pesa callback: {}", e)))?;
    let callback = envelope.body.stk_callback;

    let outcome = match result_code(&callback.result_code) {
        Some(0) => {
            let mut receipt = Receipt::default();
            let items = callback.callback_metadata.map(|m| m.items).unwrap_or_default();
            for item in items {
                let Some(value) = item.value.as_ref() else { continue };
                match item.name.as_str() {
                    "MpesaReceiptNumber" => receipt.receipt_number = Some(value_text(value)),
                    "TransactionDate" => {
                        receipt.transaction_date =
                            NaiveDateTime::parse_from_str(&value_text(value), "%Y%m%d%H%M%S").ok()
                    }
                    "PhoneNumber" => receipt.payer = Some(value_text(value)),
                    _ => {}
                }
            }
            CallbackOutcome::Succeeded(receipt)
        }
        _ => CallbackOutcome::Failed {
            reason: callback
                .result_desc
                .unwrap_or_else(|| format!("M-Pesa result code {}", value_text(&callback.result_code))),
        },
    };

    Ok(CallbackReport {
        checkout_request_id: callback.checkout_request_id,
        merchant_request_id: callback.merchant_request_id,
        outcome,
    })
}

#[async_trait]
impl PaymentGateway for MpesaGateway {
    fn name(&self) -> &str {
        "mpesa"
    }

    fn supports(&self, method: PaymentMethod) -> bool {
        method == PaymentMethod::MobileMoney
    }

    async fn initiate(&self, request: &ChargeRequest) -> Result<ChargeAccepted> {
        let phone = normalize_msisdn(&request.payer)?;
        let token = self.access_token().await?;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();

        let payload = json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": self.password(&timestamp),
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": whole_units(request.amount_cents),
            "PartyA": phone,
            "PartyB": self.config.shortcode,
            "PhoneNumber": phone,
            "CallBackURL": self.config.callback_url,
            "AccountReference": request.reference,
            "TransactionDesc": request.description,
        });

        let response = self
            .client
            .post(format!("{}/mpesa/stkpush/v1/processrequest", self.base_url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(Self::unavailable)?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::UNAUTHORIZED {
            return Err(AppError::GatewayUnavailable(format!(
                "M-Pesa STK push returned {}",
                status
            )));
        }

        let body: StkPushResponse = response.json().await.map_err(Self::unavailable)?;
        match (body.response_code.as_deref(), body.checkout_request_id) {
            (Some("0"), Some(checkout_request_id)) => {
                tracing::info!("M-Pesa STK push accepted: {}", checkout_request_id);
                Ok(ChargeAccepted {
                    checkout_request_id,
                    merchant_request_id: body.merchant_request_id,
                    customer_message: body.customer_message,
                })
            }
            _ => {
                let reason = body
                    .error_message
                    .or(body.response_description)
                    .unwrap_or_else(|| "STK push rejected".to_string());
                Err(AppError::Validation(format!("M-Pesa rejected the request: {}", reason)))
            }
        }
    }

    async fn query_status(&self, checkout_request_id: &str) -> Result<GatewayOutcome> {
        let token = self.access_token().await?;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();

        let payload = json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": self.password(&timestamp),
            "Timestamp": timestamp,
            "CheckoutRequestID": checkout_request_id,
        });

        let response = self
            .client
            .post(format!("{}/mpesa/stkpushquery/v1/query", self.base_url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(Self::unavailable)?;

        let status = response.status();
        let text = response.text().await.map_err(Self::unavailable)?;
        let body: StkQueryResponse = serde_json::from_str(&text).map_err(|_| {
            AppError::GatewayUnavailable(format!("M-Pesa status query returned {}", status))
        })?;

        if body.error_code.as_deref() == Some(STILL_PROCESSING) {
            return Ok(GatewayOutcome::Pending);
        }
        if !status.is_success() {
            return Err(AppError::GatewayUnavailable(
                body.error_message
                    .unwrap_or_else(|| format!("M-Pesa status query returned {}", status)),
            ));
        }

        Ok(match body.result_code.as_ref().and_then(result_code) {
            Some(0) => GatewayOutcome::Succeeded(Receipt::default()),
            Some(code) => GatewayOutcome::Failed {
                reason: body
                    .result_desc
                    .unwrap_or_else(|| format!("M-Pesa result code {}", code)),
            },
            None => GatewayOutcome::Pending,
        })
    }
}
