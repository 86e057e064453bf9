//! Fee receipt documents.
//!
//! A receipt is rendered as a fixed-layout HTML page and, when a converter
//! is configured, printed to PDF by running it headless (Chrome or a
//! compatible binary).

use askama::Template;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::ReceiptConfig;
use crate::models::{FeePayment, Student};
use crate::services::error::FeeError;
use crate::services::ledger::FeeLedger;

/// Everything printed on a receipt. Also the JSON fallback body.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptDocument {
    pub receipt_number: String,
    pub paid_utc: DateTime<Utc>,
    pub student_name: String,
    pub enrollment_id: String,
    pub course: Option<String>,
    pub amount: Decimal,
    pub payment_mode: String,
    pub transaction_id: Option<String>,
    pub status: String,
    #[serde(skip)]
    pub owner_user_id: String,
}

impl ReceiptDocument {
    pub fn new(payment: &FeePayment, student: &Student, course: Option<String>) -> Self {
        Self {
            receipt_number: payment.receipt_number.clone(),
            paid_utc: payment.paid_utc,
            student_name: student.display_name().to_string(),
            enrollment_id: student.enrollment_id.clone(),
            course,
            amount: payment.amount,
            payment_mode: payment.payment_mode.label().to_string(),
            transaction_id: payment.transaction_id.clone(),
            status: payment.status.as_str().to_uppercase(),
            owner_user_id: student.user_id.clone(),
        }
    }

    /// Look up the payment behind `receipt_number` and gather what the
    /// receipt prints.
    pub async fn load(ledger: &FeeLedger, receipt_number: &str) -> Result<Self, FeeError> {
        let payment = ledger.payment_by_receipt(receipt_number).await?;
        let (_, student) = ledger.load_fee(payment.student_fee_id).await?;
        let course = match student.course_id {
            Some(course_id) => ledger
                .store()
                .get_course(course_id)
                .await?
                .map(|c| c.title),
            None => None,
        };
        Ok(Self::new(&payment, &student, course))
    }

    /// Label/value rows of the receipt table, in print order.
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Receipt Number", self.receipt_number.clone()),
            (
                "Date & Time",
                self.paid_utc.format("%d/%m/%Y at %H:%M").to_string(),
            ),
            ("Student Name", self.student_name.clone()),
            ("Enrollment ID", self.enrollment_id.clone()),
            ("Course", self.course.clone().unwrap_or_else(|| "N/A".to_string())),
            ("Amount Paid", format!("Rs. {}", self.amount)),
            ("Payment Mode", self.payment_mode.clone()),
            (
                "Transaction ID",
                self.transaction_id.clone().unwrap_or_else(|| "N/A".to_string()),
            ),
            ("Status", self.status.clone()),
        ]
    }
}

/// Receipt page, laid out in `templates/receipt.html`.
#[derive(Template)]
#[template(path = "receipt.html")]
struct ReceiptTemplate<'a> {
    receipt_number: &'a str,
    institute: &'a str,
    contact: Option<&'a str>,
    rows: Vec<(&'static str, String)>,
}

#[derive(Debug, Clone)]
pub struct ReceiptRenderer {
    institute_name: String,
    contact_line: Option<String>,
    converter: Option<String>,
    timeout: Duration,
    scratch_dir: PathBuf,
}

impl ReceiptRenderer {
    pub fn new(config: &ReceiptConfig) -> Self {
        Self {
            institute_name: config.institute_name.clone(),
            contact_line: config.contact_line.clone(),
            converter: config.pdf_converter.clone(),
            timeout: Duration::from_secs(config.render_timeout_secs.max(1)),
            scratch_dir: config.scratch_dir.clone().unwrap_or_else(std::env::temp_dir),
        }
    }

    pub fn pdf_available(&self) -> bool {
        self.converter.is_some()
    }

    pub fn render_html(&self, receipt: &ReceiptDocument) -> Result<String, FeeError> {
        ReceiptTemplate {
            receipt_number: &receipt.receipt_number,
            institute: &self.institute_name,
            contact: self.contact_line.as_deref(),
            rows: receipt.rows(),
        }
        .render()
        .map_err(|e| FeeError::Internal(anyhow::anyhow!("Failed to render receipt: {}", e)))
    }

    /// Print the HTML receipt to PDF with the configured converter. Both
    /// files live in a scratch directory that is removed on return.
    pub async fn render_pdf(&self, receipt: &ReceiptDocument) -> Result<Vec<u8>, FeeError> {
        let converter = self.converter.as_deref().ok_or_else(|| {
            FeeError::ExternalService("No PDF converter configured".to_string())
        })?;

        let html = self.render_html(receipt)?;
        let scratch = tempfile::Builder::new()
            .prefix("fee_receipt_")
            .tempdir_in(&self.scratch_dir)
            .map_err(|e| FeeError::Internal(e.into()))?;
        let html_path = scratch.path().join("receipt.html");
        let pdf_path = scratch.path().join("receipt.pdf");

        tokio::fs::write(&html_path, html)
            .await
            .map_err(|e| FeeError::Internal(e.into()))?;
        self.convert(converter, &html_path, &pdf_path).await?;
        tokio::fs::read(&pdf_path)
            .await
            .map_err(|e| FeeError::ExternalService(format!("PDF output missing: {}", e)))
    }

    async fn convert(
        &self,
        converter: &str,
        html_path: &Path,
        pdf_path: &Path,
    ) -> Result<(), FeeError> {
        let mut command = Command::new(converter);
        command
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-pdf-header-footer")
            .arg(format!("--print-to-pdf={}", pdf_path.display()))
            .arg(format!("file://{}", html_path.display()))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let status = tokio::time::timeout(self.timeout, command.status())
            .await
            .map_err(|_| {
                FeeError::ExternalService(format!(
                    "PDF converter timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| FeeError::ExternalService(format!("Failed to run PDF converter: {}", e)))?;

        if !status.success() {
            return Err(FeeError::ExternalService(format!(
                "PDF converter exited with {}",
                status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaymentMode, PaymentStatus};
    use chrono::{NaiveDate, TimeZone};
    use uuid::Uuid;

    fn receipt() -> ReceiptDocument {
        let student = Student {
            student_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            username: "asha".to_string(),
            full_name: Some("Asha <Rao>".to_string()),
            enrollment_id: "ENR-001".to_string(),
            course_id: None,
            admission_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            created_utc: Utc::now(),
        };
        let payment = FeePayment {
            payment_id: Uuid::new_v4(),
            student_fee_id: Uuid::new_v4(),
            amount: "1500.00".parse().unwrap(),
            payment_mode: PaymentMode::BankTransfer,
            transaction_id: None,
            receipt_number: "REC-1A2B3C4D".to_string(),
            status: PaymentStatus::Success,
            remarks: None,
            recorded_by: None,
            paid_utc: Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap(),
        };
        ReceiptDocument::new(&payment, &student, Some("Full Stack Development".to_string()))
    }

    fn renderer(converter: Option<&str>) -> ReceiptRenderer {
        ReceiptRenderer::new(&ReceiptConfig {
            pdf_converter: converter.map(str::to_string),
            render_timeout_secs: 5,
            ..ReceiptConfig::default()
        })
    }

    fn renderer_in(converter: &str, scratch: &Path) -> ReceiptRenderer {
        ReceiptRenderer::new(&ReceiptConfig {
            pdf_converter: Some(converter.to_string()),
            render_timeout_secs: 5,
            scratch_dir: Some(scratch.to_path_buf()),
            ..ReceiptConfig::default()
        })
    }

    fn leftovers(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn rows_follow_the_printed_layout() {
        let rows = receipt().rows();
        let labels: Vec<&str> = rows.iter().map(|(label, _)| *label).collect();
        assert_eq!(
            labels,
            [
                "Receipt Number",
                "Date & Time",
                "Student Name",
                "Enrollment ID",
                "Course",
                "Amount Paid",
                "Payment Mode",
                "Transaction ID",
                "Status"
            ]
        );
        assert_eq!(rows[1].1, "05/03/2024 at 14:30");
        assert_eq!(rows[5].1, "Rs. 1500.00");
        assert_eq!(rows[6].1, "Bank Transfer");
        assert_eq!(rows[7].1, "N/A");
        assert_eq!(rows[8].1, "SUCCESS");
    }

    #[test]
    fn html_carries_header_footer_and_escapes_values() {
        let html = renderer(None).render_html(&receipt()).unwrap();
        assert!(html.contains("<title>Receipt REC-1A2B3C4D</title>"));
        assert!(html.contains("<h1>ERP INSTITUTE</h1>"));
        assert!(html.contains("Fee Payment Receipt"));
        assert!(html.contains("This is a computer generated receipt."));
        assert!(html.contains("Asha &lt;Rao&gt;"));
        assert!(html.contains("Date &amp; Time"));
        assert!(!html.contains("class=\"contact\""));
    }

    #[test]
    fn contact_line_is_printed_under_the_title() {
        let renderer = ReceiptRenderer::new(&ReceiptConfig {
            contact_line: Some("Fees Office & Accounts".to_string()),
            ..ReceiptConfig::default()
        });
        let html = renderer.render_html(&receipt()).unwrap();
        assert!(html.contains("<p class=\"contact\">Fees Office &amp; Accounts</p>"));
    }

    #[tokio::test]
    async fn pdf_without_converter_is_an_external_failure() {
        let err = renderer(None).render_pdf(&receipt()).await.unwrap_err();
        assert!(matches!(err, FeeError::ExternalService(_)));
    }

    #[tokio::test]
    async fn missing_converter_binary_is_an_external_failure() {
        let err = renderer(Some("/nonexistent/fee-receipt-converter"))
            .render_pdf(&receipt())
            .await
            .unwrap_err();
        assert!(matches!(err, FeeError::ExternalService(_)));
    }

    #[tokio::test]
    async fn failed_conversion_leaves_no_scratch_files() {
        let scratch = tempfile::tempdir().unwrap();
        let err = renderer_in("/nonexistent/fee-receipt-converter", scratch.path())
            .render_pdf(&receipt())
            .await
            .unwrap_err();
        assert!(matches!(err, FeeError::ExternalService(_)));
        assert_eq!(leftovers(scratch.path()), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn converter_output_is_returned_and_scratch_removed() {
        use std::os::unix::fs::PermissionsExt;

        let tools = tempfile::tempdir().unwrap();
        let converter = tools.path().join("print-receipt");
        std::fs::write(
            &converter,
            r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in
    --print-to-pdf=*) printf '%%PDF-1.4 receipt' > "${arg#--print-to-pdf=}" ;;
  esac
done
"#,
        )
        .unwrap();
        std::fs::set_permissions(&converter, std::fs::Permissions::from_mode(0o755)).unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let pdf = renderer_in(converter.to_str().unwrap(), scratch.path())
            .render_pdf(&receipt())
            .await
            .unwrap();
        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert_eq!(leftovers(scratch.path()), 0);
    }
}
