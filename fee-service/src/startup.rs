//! Application startup and lifecycle management.

use crate::config::{FeeConfig, StoreBackend};
use crate::handlers;
use crate::services::{
    AttendanceTracker, Checkout, FeeLedger, FeeStore, MemoryFeeStore, PgFeeStore, RazorpayClient,
    ReceiptRenderer,
};
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: FeeConfig,
    pub ledger: FeeLedger,
    pub checkout: Checkout,
    pub attendance: AttendanceTracker,
    pub receipts: ReceiptRenderer,
}

impl AppState {
    pub fn new(config: FeeConfig, store: Arc<dyn FeeStore>) -> Result<Self, AppError> {
        let ledger = FeeLedger::new(store.clone(), config.ledger.clone());

        let razorpay = RazorpayClient::new(config.razorpay.clone()).map_err(|e| {
            tracing::error!("Failed to build Razorpay client: {}", e);
            AppError::ConfigError(e.into())
        })?;
        if razorpay.is_configured() {
            tracing::info!("Razorpay client initialized");
        } else {
            tracing::warn!("Razorpay credentials not configured - online checkout disabled");
        }

        let receipts = ReceiptRenderer::new(&config.receipts);
        if !receipts.pdf_available() {
            tracing::warn!("No PDF converter configured - receipts fall back to JSON");
        }

        Ok(Self {
            checkout: Checkout::new(ledger.clone(), razorpay),
            attendance: AttendanceTracker::new(store),
            receipts,
            ledger,
            config,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        // Catalog
        .route(
            "/courses",
            post(handlers::catalog::create_course).get(handlers::catalog::list_courses),
        )
        .route("/students", post(handlers::catalog::create_student))
        .route("/students/:id", get(handlers::catalog::get_student))
        .route(
            "/students/:id/attendance/summary",
            get(handlers::attendance::attendance_summary),
        )
        // Fee structures
        .route(
            "/fee-structures",
            post(handlers::fee_structures::create_fee_structure)
                .get(handlers::fee_structures::list_fee_structures),
        )
        .route(
            "/fee-structures/:id",
            get(handlers::fee_structures::get_fee_structure)
                .put(handlers::fee_structures::update_fee_structure)
                .delete(handlers::fee_structures::delete_fee_structure),
        )
        // Student fees
        .route(
            "/student-fees",
            post(handlers::student_fees::assign_fee).get(handlers::student_fees::list_student_fees),
        )
        .route("/student-fees/:id", get(handlers::student_fees::get_student_fee))
        .route("/me/fees", get(handlers::student_fees::my_fees))
        .route(
            "/student-fees/:id/payments",
            post(handlers::payments::record_payment).get(handlers::payments::list_payments),
        )
        .route(
            "/student-fees/:id/discounts",
            post(handlers::student_fees::add_discount),
        )
        .route("/student-fees/:id/fines", post(handlers::student_fees::add_fine))
        // Checkout
        .route("/student-fees/:id/orders", post(handlers::checkout::create_order))
        .route("/orders/verify", post(handlers::checkout::verify_payment))
        // Receipts, reports, notifications
        .route(
            "/receipts/:receipt_number",
            get(handlers::receipts::download_receipt),
        )
        .route("/reports/fees", get(handlers::notifications::fee_report))
        .route(
            "/notifications",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/notifications/read-all",
            post(handlers::notifications::mark_all_read),
        )
        .route(
            "/notifications/:id/read",
            post(handlers::notifications::mark_read),
        )
        // Attendance
        .route(
            "/holidays",
            post(handlers::attendance::create_holiday).get(handlers::attendance::list_holidays),
        )
        .route("/attendance", post(handlers::attendance::mark_attendance))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Connect the configured store and bind the listener (port 0 picks a
    /// free port).
    pub async fn build(config: FeeConfig) -> Result<Self, AppError> {
        let store: Arc<dyn FeeStore> = match config.database.backend {
            StoreBackend::Postgres => {
                let url = config.database.url.as_ref().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("FEE_DATABASE_URL is required"))
                })?;
                let store = PgFeeStore::connect(
                    url.expose_secret(),
                    config.database.max_connections,
                    config.database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to PostgreSQL: {}", e);
                    AppError::from(e)
                })?;
                store.run_migrations().await.map_err(|e| {
                    tracing::error!("Failed to run migrations: {}", e);
                    AppError::from(e)
                })?;
                Arc::new(store)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory fee store - data is lost on restart");
                Arc::new(MemoryFeeStore::new())
            }
        };

        Self::build_with_store(config, store).await
    }

    pub async fn build_with_store(
        config: FeeConfig,
        store: Arc<dyn FeeStore>,
    ) -> Result<Self, AppError> {
        let state = AppState::new(config.clone(), store)?;

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Fee service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, router(self.state)).await
    }

    pub async fn run_with_shutdown<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(signal)
            .await
    }
}
