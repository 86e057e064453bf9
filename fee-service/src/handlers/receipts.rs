//! Receipt downloads.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use service_core::error::AppError;

use crate::dtos::payments::{ReceiptFormat, ReceiptQuery};
use crate::middleware::Identity;
use crate::services::metrics::RECEIPTS_RENDERED_TOTAL;
use crate::services::policy::{Action, Resource};
use crate::services::ReceiptDocument;
use crate::AppState;

/// Download a receipt as PDF (default), HTML or JSON. A PDF that cannot be
/// produced is answered with the JSON document instead.
///
/// GET /receipts/:receipt_number
pub async fn download_receipt(
    State(state): State<AppState>,
    identity: Identity,
    Path(receipt_number): Path<String>,
    Query(query): Query<ReceiptQuery>,
) -> Result<Response, AppError> {
    let receipt = ReceiptDocument::load(&state.ledger, &receipt_number).await?;
    identity.authorize(Action::Read, Resource::Receipt { owner: &receipt.owner_user_id })?;

    let requested = query.format;
    let served = match requested {
        ReceiptFormat::Pdf => match state.receipts.render_pdf(&receipt).await {
            Ok(pdf) => {
                let disposition = format!(
                    "attachment; filename=\"receipt_{}.pdf\"",
                    receipt.receipt_number
                );
                record_render(requested, ReceiptFormat::Pdf);
                return Ok((
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, "application/pdf".to_string()),
                        (header::CONTENT_DISPOSITION, disposition),
                    ],
                    pdf,
                )
                    .into_response());
            }
            Err(e) => {
                tracing::warn!(
                    receipt_number = %receipt.receipt_number,
                    error = %e,
                    "PDF rendering unavailable, serving JSON receipt"
                );
                ReceiptFormat::Json
            }
        },
        other => other,
    };

    record_render(requested, served);
    let response = match served {
        ReceiptFormat::Html => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            state.receipts.render_html(&receipt)?,
        )
            .into_response(),
        _ => (StatusCode::OK, Json(receipt)).into_response(),
    };
    Ok(response)
}

fn record_render(requested: ReceiptFormat, served: ReceiptFormat) {
    RECEIPTS_RENDERED_TOTAL
        .with_label_values(&[requested.as_str(), served.as_str()])
        .inc();
}
