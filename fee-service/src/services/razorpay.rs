//! Razorpay gateway client for fee checkout.
//!
//! Opens an Orders API order for a fee amount and checks the signature the
//! browser checkout posts back.

use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::RazorpayConfig;
use crate::models::Student;
use crate::services::error::FeeError;

type HmacSha256 = Hmac<Sha256>;

const FEE_TYPE: &str = "Course Fee";

#[derive(Clone)]
pub struct RazorpayClient {
    http: Client,
    config: RazorpayConfig,
}

/// Body of `POST /orders`, tagged with the student the fee belongs to.
#[derive(Debug, Serialize)]
struct FeeOrderBody<'a> {
    amount: u64,
    currency: &'a str,
    receipt: &'a str,
    notes: FeeOrderNotes<'a>,
}

#[derive(Debug, Serialize)]
struct FeeOrderNotes<'a> {
    student_id: Uuid,
    student_name: &'a str,
    fee_type: &'a str,
}

/// Order opened at the gateway. `amount_minor` is in paise.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    #[serde(rename = "amount")]
    pub amount_minor: u64,
    pub currency: String,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayRejection {
    #[serde(default)]
    error: GatewayRejectionDetail,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayRejectionDetail {
    code: Option<String>,
    description: Option<String>,
}

/// What the checkout posts back after the student pays.
#[derive(Debug, Clone)]
pub struct CheckoutCallback {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

/// Fee amount in paise. Fractions of a paisa are refused rather than
/// rounded.
pub fn to_paise(amount: Decimal) -> Result<u64, FeeError> {
    let paise = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .filter(|p| p.fract().is_zero())
        .and_then(|p| p.to_u64())
        .ok_or_else(|| {
            FeeError::InvalidAmount(format!("{} cannot be charged in paise", amount))
        })?;
    Ok(paise)
}

/// Hex HMAC-SHA256 of `order_id|payment_id` under the key secret.
pub fn checkout_signature(
    order_id: &str,
    payment_id: &str,
    key_secret: &str,
) -> Result<String, FeeError> {
    let mut mac = HmacSha256::new_from_slice(key_secret.as_bytes())
        .map_err(|e| FeeError::Internal(anyhow::anyhow!("Invalid signing key: {}", e)))?;
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig) -> Result<Self, FeeError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| FeeError::Internal(e.into()))?;
        Ok(Self { http, config })
    }

    /// Both key id and secret are present.
    pub fn is_configured(&self) -> bool {
        !self.config.key_id.is_empty() && !self.config.key_secret.expose_secret().is_empty()
    }

    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    /// Open an order for `amount` of `student`'s fee. The gateway must echo
    /// back the paise it was asked for.
    pub async fn create_order(
        &self,
        amount: Decimal,
        receipt_reference: &str,
        student: &Student,
    ) -> Result<GatewayOrder, FeeError> {
        if !self.is_configured() {
            return Err(FeeError::ExternalService(
                "Payment gateway is not configured".to_string(),
            ));
        }
        let amount_minor = to_paise(amount)?;
        let body = FeeOrderBody {
            amount: amount_minor,
            currency: &self.config.currency,
            receipt: receipt_reference,
            notes: FeeOrderNotes {
                student_id: student.student_id,
                student_name: student.display_name(),
                fee_type: FEE_TYPE,
            },
        };

        let url = format!("{}/orders", self.config.api_base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.key_id, Some(self.config.key_secret.expose_secret()))
            .json(&body)
            .send()
            .await
            .map_err(|e| FeeError::ExternalService(format!("Payment gateway unreachable: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| FeeError::ExternalService(format!("Payment gateway response unreadable: {}", e)))?;
        tracing::debug!(status = %status, body = %text, "Gateway order response");

        if !status.is_success() {
            let rejection: GatewayRejection = serde_json::from_str(&text).unwrap_or_default();
            let code = rejection.error.code.unwrap_or_else(|| status.as_u16().to_string());
            let description = rejection.error.description.unwrap_or(text);
            tracing::error!(code = %code, description = %description, "Gateway refused fee order");
            return Err(FeeError::ExternalService(format!(
                "Payment gateway refused the order: {} - {}",
                code, description
            )));
        }

        let order: GatewayOrder = serde_json::from_str(&text)
            .map_err(|e| FeeError::ExternalService(format!("Unexpected gateway order: {}", e)))?;
        if order.amount_minor != amount_minor {
            return Err(FeeError::ExternalService(format!(
                "Gateway opened order {} for {} paise, expected {}",
                order.id, order.amount_minor, amount_minor
            )));
        }
        Ok(order)
    }

    /// Whether the callback was signed with our key for this order and
    /// payment.
    pub fn verify_checkout(&self, callback: &CheckoutCallback) -> Result<bool, FeeError> {
        let expected = checkout_signature(
            &callback.order_id,
            &callback.payment_id,
            self.config.key_secret.expose_secret(),
        )?;
        let valid: bool = expected
            .as_bytes()
            .ct_eq(callback.signature.trim().as_bytes())
            .into();

        if !valid {
            tracing::warn!(
                order_id = %callback.order_id,
                payment_id = %callback.payment_id,
                "Checkout signature mismatch"
            );
        }
        Ok(valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MAX_AMOUNT;
    use chrono::NaiveDate;
    use secrecy::Secret;

    fn config(key_id: &str, secret: &str) -> RazorpayConfig {
        RazorpayConfig {
            key_id: key_id.to_string(),
            key_secret: Secret::new(secret.to_string()),
            api_base_url: "http://127.0.0.1:9".to_string(),
            currency: "INR".to_string(),
            request_timeout_secs: 1,
        }
    }

    fn student() -> Student {
        Student {
            student_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            username: "asha".to_string(),
            full_name: Some("Asha Rao".to_string()),
            enrollment_id: "ENR-001".to_string(),
            course_id: None,
            admission_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            created_utc: chrono::Utc::now(),
        }
    }

    fn callback(signature: &str) -> CheckoutCallback {
        CheckoutCallback {
            order_id: "order_FEE001".to_string(),
            payment_id: "pay_FEE001".to_string(),
            signature: signature.to_string(),
        }
    }

    #[test]
    fn fee_amounts_convert_to_whole_paise() {
        assert_eq!(to_paise("2500.50".parse().unwrap()).unwrap(), 250050);
        assert_eq!(to_paise(Decimal::ONE).unwrap(), 100);
        assert_eq!(to_paise(MAX_AMOUNT).unwrap(), 999_999_999_999);

        for amount in ["10.005", "-1", "40000000000000000000000000000"] {
            let err = to_paise(amount.parse().unwrap()).unwrap_err();
            assert!(matches!(err, FeeError::InvalidAmount(_)), "amount {}", amount);
        }
    }

    #[test]
    fn checkout_signature_is_hex_hmac_of_order_and_payment() {
        assert_eq!(
            checkout_signature("order_FEE001", "pay_FEE001", "fee_secret").unwrap(),
            "c6adb45e016f825d6950699ee834af3e44f5d25e74eec8183bf38af3486deca2"
        );
    }

    #[test]
    fn callback_signed_for_the_order_is_accepted() {
        let client = RazorpayClient::new(config("rzp_test_fee", "fee_secret")).unwrap();
        let signature = checkout_signature("order_FEE001", "pay_FEE001", "fee_secret").unwrap();

        assert!(client.verify_checkout(&callback(&signature)).unwrap());
        assert!(client.verify_checkout(&callback(&format!(" {} ", signature))).unwrap());
    }

    #[test]
    fn callback_signed_for_another_payment_or_key_is_refused() {
        let client = RazorpayClient::new(config("rzp_test_fee", "fee_secret")).unwrap();
        let other_payment = checkout_signature("order_FEE001", "pay_OTHER", "fee_secret").unwrap();
        let other_key = checkout_signature("order_FEE001", "pay_FEE001", "not_ours").unwrap();

        for signature in [other_payment.as_str(), other_key.as_str(), "", "garbage"] {
            assert!(!client.verify_checkout(&callback(signature)).unwrap());
        }
    }

    #[tokio::test]
    async fn fee_orders_need_both_credentials() {
        for (key_id, secret) in [("", "fee_secret"), ("rzp_test_fee", "")] {
            let client = RazorpayClient::new(config(key_id, secret)).unwrap();
            assert!(!client.is_configured());
            let err = client
                .create_order(Decimal::ONE_HUNDRED, "receipt_1", &student())
                .await
                .unwrap_err();
            assert!(matches!(err, FeeError::ExternalService(_)));
        }
    }

    #[tokio::test]
    async fn unreachable_gateway_is_an_external_failure() {
        let client = RazorpayClient::new(config("rzp_test_fee", "fee_secret")).unwrap();
        let err = client
            .create_order(Decimal::ONE_HUNDRED, "receipt_1", &student())
            .await
            .unwrap_err();
        assert!(matches!(err, FeeError::ExternalService(_)));
    }
}
