//! Persistence seam for the fee ledger.
//!
//! Every balance mutation goes through one method call so that an
//! implementation can make it atomic: `record_payment` and `complete_order`
//! append the payment, raise `amount_paid` and write the admin notification
//! as a single unit.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{
    AdminNotification, Attendance, Course, FeeDiscount, FeeFine, FeePayment, FeeSchedule,
    FeeStatus, FeeStructure, FeeTotals, Holiday, NewFeeStructure, NewStudent, PaymentOrder,
    Student, StudentFee, StudentFeeOverview,
};
use crate::services::error::FeeError;

#[async_trait]
pub trait FeeStore: Send + Sync {
    async fn health_check(&self) -> Result<(), FeeError>;

    // Catalog
    async fn create_course(&self, title: &str) -> Result<Course, FeeError>;
    async fn get_course(&self, course_id: Uuid) -> Result<Option<Course>, FeeError>;
    async fn list_courses(&self) -> Result<Vec<Course>, FeeError>;
    async fn create_student(&self, input: &NewStudent) -> Result<Student, FeeError>;
    async fn get_student(&self, student_id: Uuid) -> Result<Option<Student>, FeeError>;
    async fn find_student_by_user(&self, user_id: &str) -> Result<Option<Student>, FeeError>;

    // Fee structures
    async fn create_fee_structure(&self, input: &NewFeeStructure)
        -> Result<FeeSchedule, FeeError>;
    async fn get_fee_structure(
        &self,
        fee_structure_id: Uuid,
    ) -> Result<Option<FeeSchedule>, FeeError>;
    async fn find_fee_structure_by_course(
        &self,
        course_id: Uuid,
    ) -> Result<Option<FeeSchedule>, FeeError>;
    async fn list_fee_structures(&self) -> Result<Vec<FeeSchedule>, FeeError>;
    /// Replace fields and the whole installment schedule.
    async fn update_fee_structure(
        &self,
        fee_structure_id: Uuid,
        input: &NewFeeStructure,
    ) -> Result<FeeSchedule, FeeError>;
    /// Fails with `Conflict` while any student fee references the structure.
    async fn delete_fee_structure(&self, fee_structure_id: Uuid) -> Result<(), FeeError>;

    // Student fees
    /// Insert an unpaid fee for the student unless one exists. The flag is
    /// `true` when a row was created.
    async fn assign_fee(
        &self,
        student_id: Uuid,
        structure: &FeeStructure,
    ) -> Result<(StudentFee, bool), FeeError>;
    async fn get_student_fee(&self, student_fee_id: Uuid) -> Result<Option<StudentFee>, FeeError>;
    async fn find_student_fee_by_student(
        &self,
        student_id: Uuid,
    ) -> Result<Option<StudentFee>, FeeError>;
    async fn list_student_fees(
        &self,
        status: Option<FeeStatus>,
    ) -> Result<Vec<StudentFeeOverview>, FeeError>;

    // Payments
    /// Append a payment. A settled payment raises `amount_paid` by exactly
    /// its amount and stores `notification` in the same unit of work. Unless
    /// `allow_overpayment`, a settled payment that would push `amount_paid`
    /// past the total fails with `Overpayment`. A receipt number already in
    /// use fails with `DuplicateReceipt` and changes nothing.
    async fn record_payment(
        &self,
        payment: &FeePayment,
        allow_overpayment: bool,
        notification: Option<&AdminNotification>,
    ) -> Result<StudentFee, FeeError>;
    /// Newest first.
    async fn list_payments(&self, student_fee_id: Uuid) -> Result<Vec<FeePayment>, FeeError>;
    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<FeePayment>, FeeError>;
    async fn find_payment_by_receipt(
        &self,
        receipt_number: &str,
    ) -> Result<Option<FeePayment>, FeeError>;
    /// Latest settled payments across all students.
    async fn recent_payments(&self, limit: i64) -> Result<Vec<FeePayment>, FeeError>;
    async fn fee_totals(&self) -> Result<FeeTotals, FeeError>;

    // Adjustments
    /// Store a discount; when `discount.applied` the total drops by its amount.
    async fn add_discount(&self, discount: &FeeDiscount) -> Result<StudentFee, FeeError>;
    /// Store a fine; when `fine.applied` the total rises by its amount.
    async fn add_fine(&self, fine: &FeeFine) -> Result<StudentFee, FeeError>;
    async fn list_discounts(&self, student_fee_id: Uuid) -> Result<Vec<FeeDiscount>, FeeError>;
    async fn list_fines(&self, student_fee_id: Uuid) -> Result<Vec<FeeFine>, FeeError>;

    // Gateway orders
    async fn create_order(&self, order: &PaymentOrder) -> Result<(), FeeError>;
    async fn get_order(&self, order_id: &str) -> Result<Option<PaymentOrder>, FeeError>;
    /// `record_payment` plus flipping a `created` order to `paid`, atomically.
    /// An order that is no longer `created` fails with `Conflict`.
    async fn complete_order(
        &self,
        order_id: &str,
        payment: &FeePayment,
        allow_overpayment: bool,
        notification: Option<&AdminNotification>,
    ) -> Result<StudentFee, FeeError>;
    async fn fail_order(&self, order_id: &str) -> Result<(), FeeError>;

    // Notifications
    /// Newest first.
    async fn list_notifications(&self, unread_only: bool)
        -> Result<Vec<AdminNotification>, FeeError>;
    async fn mark_notification_read(&self, notification_id: Uuid) -> Result<bool, FeeError>;
    async fn mark_all_notifications_read(&self) -> Result<u64, FeeError>;

    // Attendance
    async fn create_holiday(&self, holiday: &Holiday) -> Result<Holiday, FeeError>;
    async fn list_holidays(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Holiday>, FeeError>;
    /// One row per (student, date); marking again overwrites presence.
    async fn upsert_attendance(&self, record: &Attendance) -> Result<Attendance, FeeError>;
    /// Dates in `[from, to]` the student was marked present.
    async fn present_dates(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, FeeError>;
}
