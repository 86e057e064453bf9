mod common;

use common::{decimal, id, test_config, TestApp, ADMIN_ID};
use fee_service::services::ledger::OverpaymentPolicy;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashSet;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

#[tokio::test]
async fn assigning_twice_returns_the_same_fee() {
    let app = TestApp::spawn().await;
    let course_id = app.create_course("Full Stack Development").await;
    app.create_fee_structure(course_id, "5000.00", "2000.00").await;
    let student = app.create_student("student-assign", Some(course_id)).await;
    let student_id = id(&student, "student_id");

    let first = app
        .admin_post("/student-fees", json!({ "student_id": student_id }))
        .await;
    assert_eq!(first.status(), 201);
    let first: Value = first.json().await.unwrap();
    assert_eq!(first["status"], "unpaid");
    assert_eq!(decimal(&first, "total_amount"), dec("5000"));

    let second = app
        .admin_post("/student-fees", json!({ "student_id": student_id }))
        .await;
    assert_eq!(second.status(), 200);
    let second: Value = second.json().await.unwrap();
    assert_eq!(first["student_fee_id"], second["student_fee_id"]);
}

#[tokio::test]
async fn student_without_course_gets_not_found() {
    let app = TestApp::spawn().await;
    let student = app.create_student("student-no-course", None).await;

    let response = app
        .admin_post("/student-fees", json!({ "student_id": id(&student, "student_id") }))
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn payments_move_the_balance_to_paid() {
    let app = TestApp::spawn().await;
    let (_, fee_id) = app.seed_fee("3000.00").await;

    let response = app.pay(fee_id, "1000").await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["student_fee"]["status"], "partially_paid");
    assert_eq!(decimal(&body["student_fee"], "amount_paid"), dec("1000"));
    let receipt = body["payment"]["receipt_number"].as_str().unwrap();
    assert!(receipt.starts_with("REC-"));
    assert_eq!(receipt.len(), 12);

    let response = app.pay(fee_id, "2000").await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["student_fee"]["status"], "paid");

    let details: Value = app
        .admin_get(&format!("/student-fees/{}", fee_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(decimal(&details, "due_amount"), Decimal::ZERO);
    assert!(details["next_due_date"].is_null());
    assert_eq!(details["payments"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn concurrent_payments_are_both_counted() {
    let app = TestApp::spawn().await;
    let (_, fee_id) = app.seed_fee("5000.00").await;

    let (a, b) = tokio::join!(app.pay(fee_id, "1200"), app.pay(fee_id, "800"));
    assert_eq!(a.status(), 201);
    assert_eq!(b.status(), 201);

    let details: Value = app
        .admin_get(&format!("/student-fees/{}", fee_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(decimal(&details, "amount_paid"), dec("2000"));
    assert_eq!(decimal(&details, "due_amount"), dec("3000"));
}

#[tokio::test]
async fn receipt_numbers_are_unique() {
    let app = TestApp::spawn().await;
    let (_, fee_id) = app.seed_fee("10000.00").await;

    let mut receipts = HashSet::new();
    for _ in 0..10 {
        let body: Value = app.pay(fee_id, "100").await.json().await.unwrap();
        receipts.insert(body["payment"]["receipt_number"].as_str().unwrap().to_string());
    }
    assert_eq!(receipts.len(), 10);
}

#[tokio::test]
async fn pending_payment_does_not_change_amount_paid() {
    let app = TestApp::spawn().await;
    let (_, fee_id) = app.seed_fee("3000.00").await;

    let response = app
        .admin_post(
            &format!("/student-fees/{}/payments", fee_id),
            json!({
                "amount": "500",
                "payment_mode": "check",
                "transaction_id": "CHQ-001",
                "status": "pending"
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["payment"]["status"], "pending");
    assert_eq!(decimal(&body["student_fee"], "amount_paid"), Decimal::ZERO);
    assert_eq!(body["student_fee"]["status"], "unpaid");

    let history: Value = app
        .admin_get(&format!("/student-fees/{}/payments", fee_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_amounts_are_rejected() {
    let app = TestApp::spawn().await;
    let (_, fee_id) = app.seed_fee("3000.00").await;

    for amount in ["0", "-5", "1.001", "10000000000", "40000000000000000000000000000"] {
        let response = app.pay(fee_id, amount).await;
        assert_eq!(response.status(), 400, "amount {}", amount);
    }
}

#[tokio::test]
async fn amount_paid_cannot_grow_past_the_largest_amount() {
    let app = TestApp::spawn().await;
    let (_, fee_id) = app.seed_fee("3000.00").await;

    assert_eq!(app.pay(fee_id, "9999999999.99").await.status(), 201);
    assert_eq!(app.pay(fee_id, "0.01").await.status(), 400);

    let details: Value = app
        .admin_get(&format!("/student-fees/{}", fee_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(decimal(&details, "amount_paid"), dec("9999999999.99"));
}

#[tokio::test]
async fn overpayment_is_kept_as_credit_by_default() {
    let app = TestApp::spawn().await;
    let (_, fee_id) = app.seed_fee("3000.00").await;

    let body: Value = app.pay(fee_id, "3500").await.json().await.unwrap();
    assert_eq!(body["student_fee"]["status"], "paid");

    let details: Value = app
        .admin_get(&format!("/student-fees/{}", fee_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(decimal(&details, "credit_amount"), dec("500"));
    assert_eq!(decimal(&details, "due_amount"), Decimal::ZERO);
}

#[tokio::test]
async fn overpayment_is_rejected_when_configured() {
    let mut config = test_config();
    config.ledger.overpayment = OverpaymentPolicy::Reject;
    let app = TestApp::spawn_with(config).await;
    let (_, fee_id) = app.seed_fee("3000.00").await;

    assert_eq!(app.pay(fee_id, "3000.01").await.status(), 400);
    assert_eq!(app.pay(fee_id, "3000").await.status(), 201);
}

#[tokio::test]
async fn students_see_only_their_own_fee() {
    let app = TestApp::spawn().await;
    let (owner, fee_id) = app.seed_fee("3000.00").await;
    let path = format!("/student-fees/{}", fee_id);

    let own = app
        .get_as(&path, &owner, "student")
        .send()
        .await
        .unwrap();
    assert_eq!(own.status(), 200);

    let other = app
        .get_as(&path, "someone-else", "student")
        .send()
        .await
        .unwrap();
    assert_eq!(other.status(), 403);

    let listing = app
        .get_as("/student-fees", &owner, "student")
        .send()
        .await
        .unwrap();
    assert_eq!(listing.status(), 403);
}

#[tokio::test]
async fn my_fees_assigns_on_first_visit() {
    let app = TestApp::spawn().await;
    let course_id = app.create_course("Mobile").await;
    app.create_fee_structure(course_id, "4000.00", "1000.00").await;
    app.create_student("student-me", Some(course_id)).await;

    let response = app
        .get_as("/me/fees", "student-me", "student")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(decimal(&body, "due_amount"), dec("4000"));
    assert_eq!(body["next_due_date"], json!(chrono::Utc::now().date_naive()));
    assert_eq!(body["student"]["user_id"], "student-me");

    let unknown = app
        .get_as("/me/fees", "nobody", "student")
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);
}

#[tokio::test]
async fn settled_payment_notifies_admins() {
    let app = TestApp::spawn().await;
    let (_, fee_id) = app.seed_fee("3000.00").await;
    app.pay(fee_id, "1000").await;

    let notifications: Value = app.admin_get("/notifications?unread=true").await.json().await.unwrap();
    let list = notifications.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert!(list[0]["title"]
        .as_str()
        .unwrap()
        .starts_with("Payment Received - "));

    let notification_id = id(&list[0], "notification_id");
    let response = app
        .admin_post(&format!("/notifications/{}/read", notification_id), json!({}))
        .await;
    assert_eq!(response.status(), 200);

    let unread: Value = app.admin_get("/notifications?unread=true").await.json().await.unwrap();
    assert!(unread.as_array().unwrap().is_empty());

    let response = app
        .get_as("/notifications", "faculty-1", "faculty")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn fee_report_totals_successful_payments() {
    let app = TestApp::spawn().await;
    let (_, first) = app.seed_fee("3000.00").await;
    app.pay(first, "1000").await;
    app.admin_post(
        &format!("/student-fees/{}/payments", first),
        json!({ "amount": "700", "payment_mode": "online", "status": "failed" }),
    )
    .await;

    let report: Value = app.admin_get("/reports/fees").await.json().await.unwrap();
    assert_eq!(report["total_students"], 1);
    assert_eq!(decimal(&report, "total_fees_collected"), dec("1000"));
    assert_eq!(decimal(&report, "pending_fees"), dec("2000"));
    assert_eq!(report["recent_payments"].as_array().unwrap().len(), 1);

    let response = app
        .get_as("/reports/fees", ADMIN_ID, "student")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn discounts_and_fines_are_recorded() {
    let app = TestApp::spawn().await;
    let (_, fee_id) = app.seed_fee("4000.00").await;

    let response = app
        .admin_post(
            &format!("/student-fees/{}/discounts", fee_id),
            json!({ "discount_type": "percentage", "value": "10", "reason": "Merit" }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(decimal(&body["discount"], "amount"), dec("400"));
    assert_eq!(body["discount"]["applied"], false);
    assert_eq!(decimal(&body["student_fee"], "total_amount"), dec("4000"));

    let response = app
        .admin_post(
            &format!("/student-fees/{}/discounts", fee_id),
            json!({ "discount_type": "percentage", "value": "150", "reason": "Typo" }),
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = app
        .admin_post(
            &format!("/student-fees/{}/fines", fee_id),
            json!({ "amount": "250", "reason": "Late payment", "due_date": "2024-06-30" }),
        )
        .await;
    assert_eq!(response.status(), 201);

    let details: Value = app
        .admin_get(&format!("/student-fees/{}", fee_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(details["discounts"].as_array().unwrap().len(), 1);
    assert_eq!(details["fines"].as_array().unwrap().len(), 1);
}
