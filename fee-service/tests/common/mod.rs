//! Common test utilities for fee-service integration tests.

#![allow(dead_code)]

use fee_service::config::{DatabaseConfig, FeeConfig, RazorpayConfig, ReceiptConfig, StoreBackend};
use fee_service::services::LedgerPolicy;
use fee_service::startup::Application;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use std::sync::Once;
use uuid::Uuid;

pub const ADMIN_ID: &str = "admin-1";
pub const FACULTY_ID: &str = "faculty-1";
pub const RAZORPAY_KEY_ID: &str = "rzp_test_key";
pub const RAZORPAY_SECRET: &str = "rzp_test_secret";

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,fee_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn test_config() -> FeeConfig {
    FeeConfig {
        common: CoreConfig {
            port: 0,
            environment: "test".to_string(),
        },
        service_name: "fee-service-test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            backend: StoreBackend::Memory,
            url: None,
            max_connections: 2,
            min_connections: 1,
        },
        razorpay: RazorpayConfig {
            key_id: String::new(),
            key_secret: Secret::new(String::new()),
            api_base_url: "http://127.0.0.1:9".to_string(),
            currency: "INR".to_string(),
            request_timeout_secs: 5,
        },
        receipts: ReceiptConfig::default(),
        ledger: LedgerPolicy::default(),
    }
}

/// Config with Razorpay credentials pointed at `api_base_url`.
pub fn gateway_config(api_base_url: &str) -> FeeConfig {
    let mut config = test_config();
    config.razorpay.key_id = RAZORPAY_KEY_ID.to_string();
    config.razorpay.key_secret = Secret::new(RAZORPAY_SECRET.to_string());
    config.razorpay.api_base_url = api_base_url.to_string();
    config
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: FeeConfig) -> Self {
        init_tracing();

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    fn with_identity(builder: RequestBuilder, user_id: &str, role: &str) -> RequestBuilder {
        builder
            .header("X-User-ID", user_id)
            .header("X-User-Role", role)
    }

    pub fn get_as(&self, path: &str, user_id: &str, role: &str) -> RequestBuilder {
        Self::with_identity(self.client.get(self.url(path)), user_id, role)
    }

    pub fn post_as(&self, path: &str, user_id: &str, role: &str) -> RequestBuilder {
        Self::with_identity(self.client.post(self.url(path)), user_id, role)
    }

    pub fn put_as(&self, path: &str, user_id: &str, role: &str) -> RequestBuilder {
        Self::with_identity(self.client.put(self.url(path)), user_id, role)
    }

    pub async fn admin_put(&self, path: &str, body: Value) -> Response {
        self.put_as(path, ADMIN_ID, "admin")
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn admin_get(&self, path: &str) -> Response {
        self.get_as(path, ADMIN_ID, "admin")
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn admin_post(&self, path: &str, body: Value) -> Response {
        self.post_as(path, ADMIN_ID, "admin")
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn create_course(&self, title: &str) -> Uuid {
        let response = self.admin_post("/courses", json!({ "title": title })).await;
        assert_eq!(response.status(), 201);
        let body: Value = response.json().await.expect("Failed to parse JSON");
        id(&body, "course_id")
    }

    /// Fee structure with two installments: `first` due today, the rest due
    /// in thirty days.
    pub async fn create_fee_structure(&self, course_id: Uuid, total: &str, first: &str) -> Value {
        let total_amount: rust_decimal::Decimal = total.parse().expect("total");
        let first_amount: rust_decimal::Decimal = first.parse().expect("first");
        let today = chrono::Utc::now().date_naive();
        let later = today + chrono::Duration::days(30);

        let response = self
            .admin_post(
                "/fee-structures",
                json!({
                    "course_id": course_id,
                    "name": "Standard",
                    "registration_fee": "0",
                    "tuition_fee": total,
                    "total_amount": total,
                    "installments": [
                        { "sequence": 1, "amount": first, "due_date": today },
                        { "sequence": 2, "amount": (total_amount - first_amount).to_string(), "due_date": later }
                    ]
                }),
            )
            .await;
        assert_eq!(response.status(), 201);
        response.json().await.expect("Failed to parse JSON")
    }

    pub async fn create_student(&self, user_id: &str, course_id: Option<Uuid>) -> Value {
        let response = self
            .admin_post(
                "/students",
                json!({
                    "user_id": user_id,
                    "username": user_id,
                    "full_name": format!("Student {}", user_id),
                    "enrollment_id": format!("ENR-{}", Uuid::new_v4().simple()),
                    "course_id": course_id,
                    "admission_date": "2024-01-01"
                }),
            )
            .await;
        assert_eq!(response.status(), 201);
        response.json().await.expect("Failed to parse JSON")
    }

    pub async fn assign_fee(&self, student_id: Uuid) -> Value {
        let response = self
            .admin_post("/student-fees", json!({ "student_id": student_id }))
            .await;
        assert!(response.status().is_success());
        response.json().await.expect("Failed to parse JSON")
    }

    /// Course, structure of `total`, student and assigned fee. Returns
    /// (student_user_id, student_fee_id).
    pub async fn seed_fee(&self, total: &str) -> (String, Uuid) {
        let course_id = self.create_course("Full Stack Development").await;
        self.create_fee_structure(course_id, total, "1000.00").await;
        let user_id = format!("student-{}", Uuid::new_v4().simple());
        let student = self.create_student(&user_id, Some(course_id)).await;
        let fee = self.assign_fee(id(&student, "student_id")).await;
        (user_id, id(&fee, "student_fee_id"))
    }

    pub async fn pay(&self, student_fee_id: Uuid, amount: &str) -> Response {
        self.admin_post(
            &format!("/student-fees/{}/payments", student_fee_id),
            json!({ "amount": amount, "payment_mode": "cash" }),
        )
        .await
    }
}

pub fn id(body: &Value, field: &str) -> Uuid {
    body[field]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| panic!("missing {} in {}", field, body))
}

pub fn decimal(body: &Value, field: &str) -> rust_decimal::Decimal {
    body[field]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| body[field].to_string())
        .parse()
        .unwrap_or_else(|_| panic!("bad decimal {} in {}", field, body))
}
