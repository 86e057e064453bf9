use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::services::ledger::{LedgerPolicy, OverpaymentPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub razorpay: RazorpayConfig,
    pub receipts: ReceiptConfig,
    pub ledger: LedgerPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: Option<Secret<String>>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub api_base_url: String,
    pub currency: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptConfig {
    pub institute_name: String,
    pub contact_line: Option<String>,
    /// HTML-to-PDF command (headless Chrome or compatible). PDF downloads
    /// fall back to JSON when unset.
    pub pdf_converter: Option<String>,
    pub render_timeout_secs: u64,
    /// Where per-render scratch directories are created. System temp dir
    /// when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            institute_name: "ERP INSTITUTE".to_string(),
            contact_line: None,
            pdf_converter: None,
            render_timeout_secs: 20,
            scratch_dir: None,
        }
    }
}

impl FeeConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common = core_config::Config::load()?;
        let is_prod = common.is_production();

        let backend: StoreBackend = parse(get_env("FEE_STORE_BACKEND", Some("postgres"), false)?)?;
        let url = match backend {
            StoreBackend::Postgres => Some(Secret::new(get_env("FEE_DATABASE_URL", None, is_prod)?)),
            StoreBackend::Memory => env::var("FEE_DATABASE_URL").ok().map(Secret::new),
        };

        Ok(FeeConfig {
            service_name: "fee-service".to_string(),
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            database: DatabaseConfig {
                backend,
                url,
                max_connections: parse(get_env("FEE_DATABASE_MAX_CONNECTIONS", Some("10"), false)?)?,
                min_connections: parse(get_env("FEE_DATABASE_MIN_CONNECTIONS", Some("1"), false)?)?,
            },
            razorpay: RazorpayConfig {
                key_id: get_env("RAZORPAY_KEY_ID", Some(""), is_prod)?,
                key_secret: Secret::new(get_env("RAZORPAY_KEY_SECRET", Some(""), is_prod)?),
                api_base_url: get_env(
                    "RAZORPAY_API_BASE_URL",
                    Some("https://api.razorpay.com/v1"),
                    false,
                )?,
                currency: get_env("RAZORPAY_CURRENCY", Some("INR"), false)?,
                request_timeout_secs: parse(get_env("RAZORPAY_TIMEOUT_SECS", Some("10"), false)?)?,
            },
            receipts: ReceiptConfig {
                institute_name: get_env("RECEIPT_INSTITUTE_NAME", Some("ERP INSTITUTE"), false)?,
                contact_line: env::var("RECEIPT_CONTACT_LINE").ok(),
                pdf_converter: env::var("RECEIPT_PDF_CONVERTER")
                    .ok()
                    .filter(|v| !v.is_empty()),
                render_timeout_secs: parse(get_env("RECEIPT_TIMEOUT_SECS", Some("20"), false)?)?,
                scratch_dir: env::var("RECEIPT_SCRATCH_DIR")
                    .ok()
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from),
            },
            ledger: LedgerPolicy {
                apply_discounts_to_total: parse(get_env(
                    "LEDGER_APPLY_DISCOUNTS_TO_TOTAL",
                    Some("false"),
                    false,
                )?)?,
                apply_fines_to_total: parse(get_env(
                    "LEDGER_APPLY_FINES_TO_TOTAL",
                    Some("false"),
                    false,
                )?)?,
                overpayment: parse::<OverpaymentPolicy>(get_env(
                    "LEDGER_OVERPAYMENT",
                    Some("accept"),
                    false,
                )?)?,
                receipt_number_attempts: parse(get_env(
                    "LEDGER_RECEIPT_ATTEMPTS",
                    Some("5"),
                    false,
                )?)?,
            },
            common,
        })
    }
}

fn parse<T>(value: String) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("Invalid value '{}': {}", value, e)))
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backends_parse_case_insensitively() {
        assert_eq!("Memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!("postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert!("mongodb".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn parse_reports_the_offending_value() {
        let err = parse::<u32>("five".to_string()).unwrap_err();
        assert!(err.to_string().contains("five"));

        let policy: OverpaymentPolicy = parse("Reject".to_string()).unwrap();
        assert_eq!(policy, OverpaymentPolicy::Reject);
    }
}
