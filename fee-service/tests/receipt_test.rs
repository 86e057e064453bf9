mod common;

use common::TestApp;
use serde_json::Value;

async fn paid_receipt(app: &TestApp) -> (String, String) {
    let (owner, fee_id) = app.seed_fee("3000.00").await;
    let body: Value = app.pay(fee_id, "1500").await.json().await.unwrap();
    let receipt = body["payment"]["receipt_number"].as_str().unwrap().to_string();
    (owner, receipt)
}

#[tokio::test]
async fn json_receipt_carries_payment_details() {
    let app = TestApp::spawn().await;
    let (_, receipt) = paid_receipt(&app).await;

    let response = app
        .admin_get(&format!("/receipts/{}?format=json", receipt))
        .await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["receipt_number"], receipt.as_str());
    assert_eq!(body["course"], "Full Stack Development");
    assert_eq!(body["payment_mode"], "Cash");
    assert_eq!(body["status"], "SUCCESS");
    assert!(body.get("owner_user_id").is_none());
}

#[tokio::test]
async fn html_receipt_is_printable() {
    let app = TestApp::spawn().await;
    let (owner, receipt) = paid_receipt(&app).await;

    let response = app
        .get_as(&format!("/receipts/{}?format=html", receipt), &owner, "student")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .starts_with("text/html"));

    let html = response.text().await.unwrap();
    assert!(html.contains("ERP INSTITUTE"));
    assert!(html.contains(&receipt));
    assert!(html.contains("Rs. 1500.00"));
}

#[tokio::test]
async fn pdf_falls_back_to_json_without_converter() {
    let app = TestApp::spawn().await;
    let (_, receipt) = paid_receipt(&app).await;

    let response = app.admin_get(&format!("/receipts/{}", receipt)).await;
    assert_eq!(response.status(), 200);
    assert!(response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .starts_with("application/json"));
}

#[tokio::test]
async fn other_students_cannot_download() {
    let app = TestApp::spawn().await;
    let (_, receipt) = paid_receipt(&app).await;

    let response = app
        .get_as(&format!("/receipts/{}?format=json", receipt), "intruder", "student")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn unknown_receipt_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app.admin_get("/receipts/REC-00000000?format=json").await;
    assert_eq!(response.status(), 404);
}
