//! Store tests against a real database. Skipped unless `TEST_DATABASE_URL`
//! is set.

mod common;

use chrono::{NaiveDate, Utc};
use fee_service::models::{
    FeeStatus, NewFeeStructure, NewInstallment, NewPayment, NewStudent, PaymentMode,
    PaymentStatus,
};
use fee_service::services::{FeeError, FeeLedger, FeeStore, LedgerPolicy, PgFeeStore};
use rust_decimal::Decimal;
use serial_test::serial;
use std::sync::Arc;
use uuid::Uuid;

async fn store() -> Option<Arc<PgFeeStore>> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    common::init_tracing();
    let store = PgFeeStore::connect(&url, 4, 1)
        .await
        .expect("Failed to connect to test database");
    store.run_migrations().await.expect("Failed to run migrations");
    Some(Arc::new(store))
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Course, structure and student with an assigned fee of `total`.
async fn seed(store: &Arc<PgFeeStore>, total: &str) -> (FeeLedger, Uuid) {
    let ledger = FeeLedger::new(store.clone(), LedgerPolicy::default());
    let course = store
        .create_course(&format!("Course {}", Uuid::new_v4()))
        .await
        .unwrap();
    store
        .create_fee_structure(&NewFeeStructure {
            course_id: course.course_id,
            name: "Standard".to_string(),
            registration_fee: Decimal::ZERO,
            tuition_fee: dec(total),
            total_amount: dec(total),
            installment_count: 1,
            installments: vec![NewInstallment {
                sequence: 1,
                amount: dec(total),
                due_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            }],
        })
        .await
        .unwrap();
    let tag = Uuid::new_v4().simple().to_string();
    let student = store
        .create_student(&NewStudent {
            user_id: format!("user-{}", tag),
            username: format!("user-{}", tag),
            full_name: None,
            enrollment_id: format!("ENR-{}", &tag[..12]),
            course_id: Some(course.course_id),
            admission_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        })
        .await
        .unwrap();
    let (fee, created) = ledger.assign_fee(student.student_id).await.unwrap();
    assert!(created);
    (ledger, fee.student_fee_id)
}

fn cash(student_fee_id: Uuid, amount: &str) -> NewPayment {
    NewPayment {
        student_fee_id,
        amount: dec(amount),
        payment_mode: PaymentMode::Cash,
        transaction_id: None,
        status: PaymentStatus::Success,
        remarks: None,
        recorded_by: Some("admin".to_string()),
        paid_utc: Utc::now(),
    }
}

#[tokio::test]
#[serial]
async fn concurrent_payments_are_serialized() {
    let Some(store) = store().await else { return };
    let (ledger, fee_id) = seed(&store, "5000.00").await;

    let (a, b) = tokio::join!(
        ledger.record_payment(cash(fee_id, "1200")),
        ledger.record_payment(cash(fee_id, "800"))
    );
    a.unwrap();
    b.unwrap();

    let fee = store.get_student_fee(fee_id).await.unwrap().unwrap();
    assert_eq!(fee.amount_paid, dec("2000"));
    assert_eq!(fee.status, FeeStatus::PartiallyPaid);
}

#[tokio::test]
#[serial]
async fn duplicate_receipt_number_is_reported() {
    let Some(store) = store().await else { return };
    let (_, fee_id) = seed(&store, "5000.00").await;

    let receipt = format!("REC-{}", &Uuid::new_v4().simple().to_string()[..8].to_uppercase());
    let first = cash(fee_id, "100").into_payment(receipt.clone());
    store.record_payment(&first, true, None).await.unwrap();

    let second = cash(fee_id, "100").into_payment(receipt);
    let err = store.record_payment(&second, true, None).await.unwrap_err();
    assert!(matches!(err, FeeError::DuplicateReceipt(_)));

    let fee = store.get_student_fee(fee_id).await.unwrap().unwrap();
    assert_eq!(fee.amount_paid, dec("100"));
}

#[tokio::test]
#[serial]
async fn amount_paid_past_the_column_limit_is_invalid() {
    let Some(store) = store().await else { return };
    let (_, fee_id) = seed(&store, "5000.00").await;

    let first = cash(fee_id, "9999999999.00").into_payment(format!("REC-{}", &Uuid::new_v4().simple().to_string()[..8]));
    store.record_payment(&first, true, None).await.unwrap();

    let second = cash(fee_id, "1.00").into_payment(format!("REC-{}", &Uuid::new_v4().simple().to_string()[..8]));
    let err = store.record_payment(&second, true, None).await.unwrap_err();
    assert!(matches!(err, FeeError::InvalidAmount(_)));

    let fee = store.get_student_fee(fee_id).await.unwrap().unwrap();
    assert_eq!(fee.amount_paid, dec("9999999999.00"));
    assert_eq!(store.list_payments(fee_id).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn assigned_structure_cannot_be_deleted() {
    let Some(store) = store().await else { return };
    let (_, fee_id) = seed(&store, "1000.00").await;
    let fee = store.get_student_fee(fee_id).await.unwrap().unwrap();

    let err = store
        .delete_fee_structure(fee.fee_structure_id)
        .await
        .unwrap_err();
    assert!(matches!(err, FeeError::Conflict(_)));
}
