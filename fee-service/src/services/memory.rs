//! In-process fee store.
//!
//! All state sits behind one `RwLock`; each mutating call holds the write
//! guard for its whole unit of work, which gives the same atomicity the
//! Postgres store gets from a transaction.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    AdminNotification, Attendance, Course, FeeDiscount, FeeFine, FeeInstallment, FeePayment,
    FeeSchedule, FeeStatus, FeeStructure, FeeTotals, Holiday, NewFeeStructure, NewStudent,
    OrderStatus, PaymentOrder, PaymentStatus, Student, StudentFee, StudentFeeOverview,
};
use crate::services::error::FeeError;
use crate::services::store::FeeStore;

#[derive(Default)]
struct MemoryState {
    courses: HashMap<Uuid, Course>,
    students: HashMap<Uuid, Student>,
    structures: HashMap<Uuid, FeeStructure>,
    installments: HashMap<Uuid, Vec<FeeInstallment>>,
    student_fees: HashMap<Uuid, StudentFee>,
    payments: Vec<FeePayment>,
    discounts: Vec<FeeDiscount>,
    fines: Vec<FeeFine>,
    orders: HashMap<String, PaymentOrder>,
    notifications: Vec<AdminNotification>,
    holidays: HashMap<NaiveDate, Holiday>,
    attendance: HashMap<(Uuid, NaiveDate), Attendance>,
}

impl MemoryState {
    fn schedule(&self, structure: &FeeStructure) -> FeeSchedule {
        FeeSchedule::new(
            structure.clone(),
            self.installments
                .get(&structure.fee_structure_id)
                .cloned()
                .unwrap_or_default(),
        )
    }

    fn build_installments(fee_structure_id: Uuid, input: &NewFeeStructure) -> Result<Vec<FeeInstallment>, FeeError> {
        let mut seen = std::collections::HashSet::new();
        input
            .installments
            .iter()
            .map(|i| {
                if !seen.insert(i.sequence) {
                    return Err(FeeError::InvalidInput(format!(
                        "Duplicate installment sequence {}",
                        i.sequence
                    )));
                }
                Ok(FeeInstallment {
                    installment_id: Uuid::new_v4(),
                    fee_structure_id,
                    sequence: i.sequence,
                    amount: i.amount,
                    due_date: i.due_date,
                })
            })
            .collect()
    }

    fn course_taken(&self, course_id: Uuid, except: Option<Uuid>) -> bool {
        self.structures
            .values()
            .any(|s| s.course_id == course_id && Some(s.fee_structure_id) != except)
    }

    /// Mirror of the Postgres payment unit of work.
    fn apply_payment(
        &mut self,
        payment: &FeePayment,
        allow_overpayment: bool,
        notification: Option<&AdminNotification>,
    ) -> Result<StudentFee, FeeError> {
        if self
            .payments
            .iter()
            .any(|p| p.receipt_number == payment.receipt_number)
        {
            return Err(FeeError::DuplicateReceipt(payment.receipt_number.clone()));
        }

        let fee = self
            .student_fees
            .get_mut(&payment.student_fee_id)
            .ok_or_else(|| FeeError::NotFound("Student fee".to_string()))?;

        if payment.status.is_settled() {
            if !allow_overpayment && payment.amount > fee.due_amount() {
                return Err(FeeError::Overpayment {
                    amount: payment.amount,
                    outstanding: fee.due_amount(),
                });
            }
            fee.credit(payment.amount, payment.paid_utc)?;
        }
        let fee = fee.clone();

        self.payments.push(payment.clone());
        if let Some(notification) = notification {
            self.notifications.push(notification.clone());
        }
        Ok(fee)
    }
}

/// Fee store kept entirely in memory.
#[derive(Default)]
pub struct MemoryFeeStore {
    state: RwLock<MemoryState>,
}

impl MemoryFeeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeeStore for MemoryFeeStore {
    async fn health_check(&self) -> Result<(), FeeError> {
        Ok(())
    }

    async fn create_course(&self, title: &str) -> Result<Course, FeeError> {
        let course = Course {
            course_id: Uuid::new_v4(),
            title: title.to_string(),
            created_utc: Utc::now(),
        };
        self.state
            .write()
            .await
            .courses
            .insert(course.course_id, course.clone());
        Ok(course)
    }

    async fn get_course(&self, course_id: Uuid) -> Result<Option<Course>, FeeError> {
        Ok(self.state.read().await.courses.get(&course_id).cloned())
    }

    async fn list_courses(&self) -> Result<Vec<Course>, FeeError> {
        let mut courses: Vec<Course> = self.state.read().await.courses.values().cloned().collect();
        courses.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(courses)
    }

    async fn create_student(&self, input: &NewStudent) -> Result<Student, FeeError> {
        let mut state = self.state.write().await;

        if state
            .students
            .values()
            .any(|s| s.user_id == input.user_id || s.enrollment_id == input.enrollment_id)
        {
            return Err(FeeError::Conflict(format!(
                "Student with user '{}' or enrollment '{}' already exists",
                input.user_id, input.enrollment_id
            )));
        }
        if let Some(course_id) = input.course_id {
            if !state.courses.contains_key(&course_id) {
                return Err(FeeError::NotFound("Course".to_string()));
            }
        }

        let student = Student {
            student_id: Uuid::new_v4(),
            user_id: input.user_id.clone(),
            username: input.username.clone(),
            full_name: input.full_name.clone(),
            enrollment_id: input.enrollment_id.clone(),
            course_id: input.course_id,
            admission_date: input.admission_date,
            created_utc: Utc::now(),
        };
        state.students.insert(student.student_id, student.clone());
        Ok(student)
    }

    async fn get_student(&self, student_id: Uuid) -> Result<Option<Student>, FeeError> {
        Ok(self.state.read().await.students.get(&student_id).cloned())
    }

    async fn find_student_by_user(&self, user_id: &str) -> Result<Option<Student>, FeeError> {
        Ok(self
            .state
            .read()
            .await
            .students
            .values()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn create_fee_structure(
        &self,
        input: &NewFeeStructure,
    ) -> Result<FeeSchedule, FeeError> {
        let mut state = self.state.write().await;

        if !state.courses.contains_key(&input.course_id) {
            return Err(FeeError::NotFound("Course".to_string()));
        }
        if state.course_taken(input.course_id, None) {
            return Err(FeeError::Conflict(
                "A fee structure already exists for this course".to_string(),
            ));
        }

        let now = Utc::now();
        let structure = FeeStructure {
            fee_structure_id: Uuid::new_v4(),
            course_id: input.course_id,
            name: input.name.clone(),
            registration_fee: input.registration_fee,
            tuition_fee: input.tuition_fee,
            total_amount: input.total_amount,
            installment_count: input.installment_count,
            created_utc: now,
            updated_utc: now,
        };
        let installments = MemoryState::build_installments(structure.fee_structure_id, input)?;

        state
            .installments
            .insert(structure.fee_structure_id, installments.clone());
        state
            .structures
            .insert(structure.fee_structure_id, structure.clone());

        Ok(FeeSchedule::new(structure, installments))
    }

    async fn get_fee_structure(
        &self,
        fee_structure_id: Uuid,
    ) -> Result<Option<FeeSchedule>, FeeError> {
        let state = self.state.read().await;
        Ok(state
            .structures
            .get(&fee_structure_id)
            .map(|s| state.schedule(s)))
    }

    async fn find_fee_structure_by_course(
        &self,
        course_id: Uuid,
    ) -> Result<Option<FeeSchedule>, FeeError> {
        let state = self.state.read().await;
        Ok(state
            .structures
            .values()
            .find(|s| s.course_id == course_id)
            .map(|s| state.schedule(s)))
    }

    async fn list_fee_structures(&self) -> Result<Vec<FeeSchedule>, FeeError> {
        let state = self.state.read().await;
        let mut schedules: Vec<FeeSchedule> =
            state.structures.values().map(|s| state.schedule(s)).collect();
        schedules.sort_by(|a, b| a.structure.name.cmp(&b.structure.name));
        Ok(schedules)
    }

    async fn update_fee_structure(
        &self,
        fee_structure_id: Uuid,
        input: &NewFeeStructure,
    ) -> Result<FeeSchedule, FeeError> {
        let mut state = self.state.write().await;

        if !state.structures.contains_key(&fee_structure_id) {
            return Err(FeeError::NotFound("Fee structure".to_string()));
        }
        if !state.courses.contains_key(&input.course_id) {
            return Err(FeeError::NotFound("Course".to_string()));
        }
        if state.course_taken(input.course_id, Some(fee_structure_id)) {
            return Err(FeeError::Conflict(
                "A fee structure already exists for this course".to_string(),
            ));
        }

        let installments = MemoryState::build_installments(fee_structure_id, input)?;
        let structure = state
            .structures
            .get_mut(&fee_structure_id)
            .ok_or_else(|| FeeError::NotFound("Fee structure".to_string()))?;
        structure.course_id = input.course_id;
        structure.name = input.name.clone();
        structure.registration_fee = input.registration_fee;
        structure.tuition_fee = input.tuition_fee;
        structure.total_amount = input.total_amount;
        structure.installment_count = input.installment_count;
        structure.updated_utc = Utc::now();
        let structure = structure.clone();

        state
            .installments
            .insert(fee_structure_id, installments.clone());
        Ok(FeeSchedule::new(structure, installments))
    }

    async fn delete_fee_structure(&self, fee_structure_id: Uuid) -> Result<(), FeeError> {
        let mut state = self.state.write().await;

        if !state.structures.contains_key(&fee_structure_id) {
            return Err(FeeError::NotFound("Fee structure".to_string()));
        }
        if state
            .student_fees
            .values()
            .any(|f| f.fee_structure_id == fee_structure_id)
        {
            return Err(FeeError::Conflict(
                "Fee structure is assigned to students and cannot be deleted".to_string(),
            ));
        }

        state.structures.remove(&fee_structure_id);
        state.installments.remove(&fee_structure_id);
        Ok(())
    }

    async fn assign_fee(
        &self,
        student_id: Uuid,
        structure: &FeeStructure,
    ) -> Result<(StudentFee, bool), FeeError> {
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .student_fees
            .values()
            .find(|f| f.student_id == student_id)
        {
            return Ok((existing.clone(), false));
        }
        if !state.students.contains_key(&student_id) {
            return Err(FeeError::NotFound("Student".to_string()));
        }

        let now = Utc::now();
        let fee = StudentFee {
            student_fee_id: Uuid::new_v4(),
            student_id,
            fee_structure_id: structure.fee_structure_id,
            total_amount: structure.total_amount,
            amount_paid: Decimal::new(0, 2),
            status: FeeStatus::derive(Decimal::ZERO, structure.total_amount),
            assigned_utc: now,
            updated_utc: now,
        };
        state.student_fees.insert(fee.student_fee_id, fee.clone());
        Ok((fee, true))
    }

    async fn get_student_fee(&self, student_fee_id: Uuid) -> Result<Option<StudentFee>, FeeError> {
        Ok(self
            .state
            .read()
            .await
            .student_fees
            .get(&student_fee_id)
            .cloned())
    }

    async fn find_student_fee_by_student(
        &self,
        student_id: Uuid,
    ) -> Result<Option<StudentFee>, FeeError> {
        Ok(self
            .state
            .read()
            .await
            .student_fees
            .values()
            .find(|f| f.student_id == student_id)
            .cloned())
    }

    async fn list_student_fees(
        &self,
        status: Option<FeeStatus>,
    ) -> Result<Vec<StudentFeeOverview>, FeeError> {
        let state = self.state.read().await;
        let mut rows: Vec<StudentFeeOverview> = state
            .student_fees
            .values()
            .filter(|f| status.map_or(true, |s| f.status == s))
            .filter_map(|f| {
                let student = state.students.get(&f.student_id)?;
                let structure = state.structures.get(&f.fee_structure_id)?;
                Some(StudentFeeOverview {
                    student_fee_id: f.student_fee_id,
                    student_id: f.student_id,
                    username: student.username.clone(),
                    full_name: student.full_name.clone(),
                    enrollment_id: student.enrollment_id.clone(),
                    fee_structure_name: structure.name.clone(),
                    total_amount: f.total_amount,
                    amount_paid: f.amount_paid,
                    status: f.status,
                })
            })
            .collect();
        rows.sort_by(|a, b| a.enrollment_id.cmp(&b.enrollment_id));
        Ok(rows)
    }

    async fn record_payment(
        &self,
        payment: &FeePayment,
        allow_overpayment: bool,
        notification: Option<&AdminNotification>,
    ) -> Result<StudentFee, FeeError> {
        self.state
            .write()
            .await
            .apply_payment(payment, allow_overpayment, notification)
    }

    async fn list_payments(&self, student_fee_id: Uuid) -> Result<Vec<FeePayment>, FeeError> {
        let state = self.state.read().await;
        // Reverse insertion order first so equal timestamps stay newest-first.
        let mut payments: Vec<FeePayment> = state
            .payments
            .iter()
            .rev()
            .filter(|p| p.student_fee_id == student_fee_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.paid_utc.cmp(&a.paid_utc));
        Ok(payments)
    }

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<FeePayment>, FeeError> {
        Ok(self
            .state
            .read()
            .await
            .payments
            .iter()
            .find(|p| p.payment_id == payment_id)
            .cloned())
    }

    async fn find_payment_by_receipt(
        &self,
        receipt_number: &str,
    ) -> Result<Option<FeePayment>, FeeError> {
        Ok(self
            .state
            .read()
            .await
            .payments
            .iter()
            .find(|p| p.receipt_number == receipt_number)
            .cloned())
    }

    async fn recent_payments(&self, limit: i64) -> Result<Vec<FeePayment>, FeeError> {
        let state = self.state.read().await;
        let mut payments: Vec<FeePayment> = state
            .payments
            .iter()
            .rev()
            .filter(|p| p.status == PaymentStatus::Success)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.paid_utc.cmp(&a.paid_utc));
        payments.truncate(limit.max(0) as usize);
        Ok(payments)
    }

    async fn fee_totals(&self) -> Result<FeeTotals, FeeError> {
        let state = self.state.read().await;
        let total_fees_collected = state
            .payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Success)
            .map(|p| p.amount)
            .sum::<Decimal>();
        let pending_fees = state
            .student_fees
            .values()
            .filter(|f| f.status != FeeStatus::Paid)
            .map(|f| f.total_amount - f.amount_paid)
            .sum::<Decimal>();

        Ok(FeeTotals {
            total_students: state.students.len() as i64,
            total_fees_collected,
            pending_fees,
        })
    }

    async fn add_discount(&self, discount: &FeeDiscount) -> Result<StudentFee, FeeError> {
        let mut state = self.state.write().await;
        let fee = state
            .student_fees
            .get_mut(&discount.student_fee_id)
            .ok_or_else(|| FeeError::NotFound("Student fee".to_string()))?;
        if discount.applied {
            fee.adjust_total(-discount.amount, discount.created_utc)?;
        }
        let fee = fee.clone();
        state.discounts.push(discount.clone());
        Ok(fee)
    }

    async fn add_fine(&self, fine: &FeeFine) -> Result<StudentFee, FeeError> {
        let mut state = self.state.write().await;
        let fee = state
            .student_fees
            .get_mut(&fine.student_fee_id)
            .ok_or_else(|| FeeError::NotFound("Student fee".to_string()))?;
        if fine.applied {
            fee.adjust_total(fine.amount, fine.created_utc)?;
        }
        let fee = fee.clone();
        state.fines.push(fine.clone());
        Ok(fee)
    }

    async fn list_discounts(&self, student_fee_id: Uuid) -> Result<Vec<FeeDiscount>, FeeError> {
        Ok(self
            .state
            .read()
            .await
            .discounts
            .iter()
            .filter(|d| d.student_fee_id == student_fee_id)
            .cloned()
            .collect())
    }

    async fn list_fines(&self, student_fee_id: Uuid) -> Result<Vec<FeeFine>, FeeError> {
        Ok(self
            .state
            .read()
            .await
            .fines
            .iter()
            .filter(|f| f.student_fee_id == student_fee_id)
            .cloned()
            .collect())
    }

    async fn create_order(&self, order: &PaymentOrder) -> Result<(), FeeError> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.order_id) {
            return Err(FeeError::Conflict(format!(
                "Order {} already recorded",
                order.order_id
            )));
        }
        if !state.student_fees.contains_key(&order.student_fee_id) {
            return Err(FeeError::NotFound("Student fee".to_string()));
        }
        state.orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<PaymentOrder>, FeeError> {
        Ok(self.state.read().await.orders.get(order_id).cloned())
    }

    async fn complete_order(
        &self,
        order_id: &str,
        payment: &FeePayment,
        allow_overpayment: bool,
        notification: Option<&AdminNotification>,
    ) -> Result<StudentFee, FeeError> {
        let mut state = self.state.write().await;

        match state.orders.get(order_id) {
            Some(order) if order.status == OrderStatus::Created => {}
            Some(_) => {
                return Err(FeeError::Conflict(format!(
                    "Order {} has already been processed",
                    order_id
                )))
            }
            None => return Err(FeeError::NotFound("Order".to_string())),
        }

        let fee = state.apply_payment(payment, allow_overpayment, notification)?;

        if let Some(order) = state.orders.get_mut(order_id) {
            order.status = OrderStatus::Paid;
            order.payment_id = Some(payment.payment_id);
            order.updated_utc = payment.paid_utc;
        }
        Ok(fee)
    }

    async fn fail_order(&self, order_id: &str) -> Result<(), FeeError> {
        let mut state = self.state.write().await;
        if let Some(order) = state.orders.get_mut(order_id) {
            if order.status == OrderStatus::Created {
                order.status = OrderStatus::Failed;
                order.updated_utc = Utc::now();
            }
        }
        Ok(())
    }

    async fn list_notifications(
        &self,
        unread_only: bool,
    ) -> Result<Vec<AdminNotification>, FeeError> {
        let state = self.state.read().await;
        let mut notifications: Vec<AdminNotification> = state
            .notifications
            .iter()
            .rev()
            .filter(|n| !unread_only || !n.is_read)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(notifications)
    }

    async fn mark_notification_read(&self, notification_id: Uuid) -> Result<bool, FeeError> {
        let mut state = self.state.write().await;
        match state
            .notifications
            .iter_mut()
            .find(|n| n.notification_id == notification_id)
        {
            Some(notification) => {
                notification.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_notifications_read(&self) -> Result<u64, FeeError> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for notification in state.notifications.iter_mut().filter(|n| !n.is_read) {
            notification.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn create_holiday(&self, holiday: &Holiday) -> Result<Holiday, FeeError> {
        let mut state = self.state.write().await;
        if state.holidays.contains_key(&holiday.holiday_date) {
            return Err(FeeError::Conflict(format!(
                "A holiday already exists on {}",
                holiday.holiday_date
            )));
        }
        state
            .holidays
            .insert(holiday.holiday_date, holiday.clone());
        Ok(holiday.clone())
    }

    async fn list_holidays(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Holiday>, FeeError> {
        let state = self.state.read().await;
        let mut holidays: Vec<Holiday> = state
            .holidays
            .values()
            .filter(|h| from.map_or(true, |f| h.holiday_date >= f))
            .filter(|h| to.map_or(true, |t| h.holiday_date <= t))
            .cloned()
            .collect();
        holidays.sort_by_key(|h| h.holiday_date);
        Ok(holidays)
    }

    async fn upsert_attendance(&self, record: &Attendance) -> Result<Attendance, FeeError> {
        let mut state = self.state.write().await;
        if !state.students.contains_key(&record.student_id) {
            return Err(FeeError::NotFound("Student".to_string()));
        }

        let saved = state
            .attendance
            .entry((record.student_id, record.attendance_date))
            .and_modify(|existing| {
                existing.is_present = record.is_present;
                existing.remarks = record.remarks.clone();
                existing.marked_by = record.marked_by.clone();
            })
            .or_insert_with(|| record.clone())
            .clone();
        Ok(saved)
    }

    async fn present_dates(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, FeeError> {
        let state = self.state.read().await;
        let mut dates: Vec<NaiveDate> = state
            .attendance
            .values()
            .filter(|a| {
                a.student_id == student_id
                    && a.is_present
                    && a.attendance_date >= from
                    && a.attendance_date <= to
            })
            .map(|a| a.attendance_date)
            .collect();
        dates.sort();
        Ok(dates)
    }
}
