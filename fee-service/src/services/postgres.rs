//! PostgreSQL-backed fee store.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    AdminNotification, Attendance, Course, FeeDiscount, FeeFine, FeeInstallment, FeePayment,
    FeeSchedule, FeeStatus, FeeStructure, FeeTotals, Holiday, NewFeeStructure, NewStudent,
    PaymentOrder, Student, StudentFee, StudentFeeOverview, MAX_AMOUNT,
};
use crate::services::error::FeeError;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::FeeStore;

const STUDENT_FEE_COLUMNS: &str =
    "student_fee_id, student_id, fee_structure_id, total_amount, amount_paid, status, assigned_utc, updated_utc";
const PAYMENT_COLUMNS: &str = "payment_id, student_fee_id, amount, payment_mode, transaction_id, receipt_number, status, remarks, recorded_by, paid_utc";
const STRUCTURE_COLUMNS: &str = "fee_structure_id, course_id, name, registration_fee, tuition_fee, total_amount, installment_count, created_utc, updated_utc";
const STUDENT_COLUMNS: &str =
    "student_id, user_id, username, full_name, enrollment_id, course_id, admission_date, created_utc";

fn unique_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Some(db_err.constraint().unwrap_or(""))
        }
        _ => None,
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

/// SQLSTATE 22003: a value no longer fits `NUMERIC(12,2)`.
fn numeric_overflow(err: sqlx::Error, what: &str) -> FeeError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("22003") => {
            FeeError::InvalidAmount(format!("{} would exceed {}", what, MAX_AMOUNT))
        }
        _ => FeeError::Database(err),
    }
}

/// Fee store over a Postgres connection pool.
#[derive(Clone)]
pub struct PgFeeStore {
    pool: PgPool,
}

impl PgFeeStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "fee-service"))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, FeeError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), FeeError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| FeeError::Internal(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn installments_for(&self, fee_structure_id: Uuid) -> Result<Vec<FeeInstallment>, FeeError> {
        let installments = sqlx::query_as::<_, FeeInstallment>(
            r#"
            SELECT installment_id, fee_structure_id, sequence, amount, due_date
            FROM fee_installments
            WHERE fee_structure_id = $1
            ORDER BY sequence
            "#,
        )
        .bind(fee_structure_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(installments)
    }

    async fn insert_installments(
        tx: &mut Transaction<'_, Postgres>,
        fee_structure_id: Uuid,
        input: &NewFeeStructure,
    ) -> Result<Vec<FeeInstallment>, FeeError> {
        let mut installments = Vec::with_capacity(input.installments.len());
        for installment in &input.installments {
            let row = sqlx::query_as::<_, FeeInstallment>(
                r#"
                INSERT INTO fee_installments (installment_id, fee_structure_id, sequence, amount, due_date)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING installment_id, fee_structure_id, sequence, amount, due_date
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(fee_structure_id)
            .bind(installment.sequence)
            .bind(installment.amount)
            .bind(installment.due_date)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| match unique_constraint(&e) {
                Some(_) => FeeError::InvalidInput(format!(
                    "Duplicate installment sequence {}",
                    installment.sequence
                )),
                None => FeeError::Database(e),
            })?;
            installments.push(row);
        }
        Ok(installments)
    }

    async fn fetch_student_fee(
        tx: &mut Transaction<'_, Postgres>,
        student_fee_id: Uuid,
    ) -> Result<Option<StudentFee>, FeeError> {
        let fee = sqlx::query_as::<_, StudentFee>(&format!(
            "SELECT {} FROM student_fees WHERE student_fee_id = $1",
            STUDENT_FEE_COLUMNS
        ))
        .bind(student_fee_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(fee)
    }

    /// Shift the total by `delta` (clamped at zero) and re-derive status.
    async fn adjust_total(
        tx: &mut Transaction<'_, Postgres>,
        student_fee_id: Uuid,
        delta: Decimal,
    ) -> Result<StudentFee, FeeError> {
        sqlx::query_as::<_, StudentFee>(&format!(
            r#"
            UPDATE student_fees
            SET total_amount = GREATEST(total_amount + $2, 0),
                status = CASE
                    WHEN amount_paid >= GREATEST(total_amount + $2, 0) THEN 'paid'
                    WHEN amount_paid > 0 THEN 'partially_paid'
                    ELSE 'unpaid'
                END,
                updated_utc = $3
            WHERE student_fee_id = $1
            RETURNING {}
            "#,
            STUDENT_FEE_COLUMNS
        ))
        .bind(student_fee_id)
        .bind(delta)
        .bind(Utc::now())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| numeric_overflow(e, "total amount"))?
        .ok_or_else(|| FeeError::NotFound("Student fee".to_string()))
    }

    /// Append the payment and, when settled, raise `amount_paid` with a
    /// single conditional UPDATE so concurrent payments never lose an
    /// increment.
    async fn apply_payment(
        tx: &mut Transaction<'_, Postgres>,
        payment: &FeePayment,
        allow_overpayment: bool,
        notification: Option<&AdminNotification>,
    ) -> Result<StudentFee, FeeError> {
        sqlx::query(
            r#"
            INSERT INTO fee_payments (payment_id, student_fee_id, amount, payment_mode, transaction_id, receipt_number, status, remarks, recorded_by, paid_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.student_fee_id)
        .bind(payment.amount)
        .bind(payment.payment_mode.as_str())
        .bind(&payment.transaction_id)
        .bind(&payment.receipt_number)
        .bind(payment.status.as_str())
        .bind(&payment.remarks)
        .bind(&payment.recorded_by)
        .bind(payment.paid_utc)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if unique_constraint(&e) == Some("fee_payments_receipt_number_key") {
                FeeError::DuplicateReceipt(payment.receipt_number.clone())
            } else if is_foreign_key_violation(&e) {
                FeeError::NotFound("Student fee".to_string())
            } else {
                FeeError::Database(e)
            }
        })?;

        let fee = if payment.status.is_settled() {
            let updated = sqlx::query_as::<_, StudentFee>(&format!(
                r#"
                UPDATE student_fees
                SET amount_paid = amount_paid + $2,
                    status = CASE
                        WHEN amount_paid + $2 >= total_amount THEN 'paid'
                        WHEN amount_paid + $2 > 0 THEN 'partially_paid'
                        ELSE 'unpaid'
                    END,
                    updated_utc = $4
                WHERE student_fee_id = $1
                  AND ($3 OR amount_paid + $2 <= total_amount)
                RETURNING {}
                "#,
                STUDENT_FEE_COLUMNS
            ))
            .bind(payment.student_fee_id)
            .bind(payment.amount)
            .bind(allow_overpayment)
            .bind(payment.paid_utc)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| numeric_overflow(e, "amount paid"))?;

            match updated {
                Some(fee) => fee,
                None => {
                    return Err(match Self::fetch_student_fee(tx, payment.student_fee_id).await? {
                        Some(current) => FeeError::Overpayment {
                            amount: payment.amount,
                            outstanding: current.due_amount(),
                        },
                        None => FeeError::NotFound("Student fee".to_string()),
                    });
                }
            }
        } else {
            Self::fetch_student_fee(tx, payment.student_fee_id)
                .await?
                .ok_or_else(|| FeeError::NotFound("Student fee".to_string()))?
        };

        if let Some(notification) = notification {
            sqlx::query(
                r#"
                INSERT INTO admin_notifications (notification_id, title, message, notification_type, student_id, amount, is_read, created_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(notification.notification_id)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.notification_type)
            .bind(notification.student_id)
            .bind(notification.amount)
            .bind(notification.is_read)
            .bind(notification.created_utc)
            .execute(&mut **tx)
            .await?;
        }

        Ok(fee)
    }
}

#[async_trait]
impl FeeStore for PgFeeStore {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), FeeError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Catalog
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    async fn create_course(&self, title: &str) -> Result<Course, FeeError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["create_course"])
            .start_timer();

        let course = sqlx::query_as::<_, Course>(
            r#"
            INSERT INTO courses (course_id, title)
            VALUES ($1, $2)
            RETURNING course_id, title, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .fetch_one(&self.pool)
        .await?;

        Ok(course)
    }

    #[instrument(skip(self))]
    async fn get_course(&self, course_id: Uuid) -> Result<Option<Course>, FeeError> {
        let course = sqlx::query_as::<_, Course>(
            "SELECT course_id, title, created_utc FROM courses WHERE course_id = $1",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(course)
    }

    #[instrument(skip(self))]
    async fn list_courses(&self) -> Result<Vec<Course>, FeeError> {
        let courses = sqlx::query_as::<_, Course>(
            "SELECT course_id, title, created_utc FROM courses ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(courses)
    }

    #[instrument(skip(self, input), fields(enrollment_id = %input.enrollment_id))]
    async fn create_student(&self, input: &NewStudent) -> Result<Student, FeeError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["create_student"])
            .start_timer();

        let student = sqlx::query_as::<_, Student>(&format!(
            r#"
            INSERT INTO students (student_id, user_id, username, full_name, enrollment_id, course_id, admission_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            STUDENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&input.user_id)
        .bind(&input.username)
        .bind(&input.full_name)
        .bind(&input.enrollment_id)
        .bind(input.course_id)
        .bind(input.admission_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if unique_constraint(&e).is_some() {
                FeeError::Conflict(format!(
                    "Student with user '{}' or enrollment '{}' already exists",
                    input.user_id, input.enrollment_id
                ))
            } else if is_foreign_key_violation(&e) {
                FeeError::NotFound("Course".to_string())
            } else {
                FeeError::Database(e)
            }
        })?;

        info!(student_id = %student.student_id, "Student created");
        Ok(student)
    }

    #[instrument(skip(self))]
    async fn get_student(&self, student_id: Uuid) -> Result<Option<Student>, FeeError> {
        let student = sqlx::query_as::<_, Student>(&format!(
            "SELECT {} FROM students WHERE student_id = $1",
            STUDENT_COLUMNS
        ))
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(student)
    }

    #[instrument(skip(self))]
    async fn find_student_by_user(&self, user_id: &str) -> Result<Option<Student>, FeeError> {
        let student = sqlx::query_as::<_, Student>(&format!(
            "SELECT {} FROM students WHERE user_id = $1",
            STUDENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(student)
    }

    // -------------------------------------------------------------------------
    // Fee structures
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(course_id = %input.course_id))]
    async fn create_fee_structure(
        &self,
        input: &NewFeeStructure,
    ) -> Result<FeeSchedule, FeeError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_fee_structure"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let structure = sqlx::query_as::<_, FeeStructure>(&format!(
            r#"
            INSERT INTO fee_structures (fee_structure_id, course_id, name, registration_fee, tuition_fee, total_amount, installment_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            STRUCTURE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.course_id)
        .bind(&input.name)
        .bind(input.registration_fee)
        .bind(input.tuition_fee)
        .bind(input.total_amount)
        .bind(input.installment_count)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if unique_constraint(&e).is_some() {
                FeeError::Conflict("A fee structure already exists for this course".to_string())
            } else if is_foreign_key_violation(&e) {
                FeeError::NotFound("Course".to_string())
            } else {
                FeeError::Database(e)
            }
        })?;

        let installments =
            Self::insert_installments(&mut tx, structure.fee_structure_id, input).await?;

        tx.commit().await?;
        timer.observe_duration();

        info!(
            fee_structure_id = %structure.fee_structure_id,
            total_amount = %structure.total_amount,
            "Fee structure created"
        );

        Ok(FeeSchedule::new(structure, installments))
    }

    #[instrument(skip(self))]
    async fn get_fee_structure(
        &self,
        fee_structure_id: Uuid,
    ) -> Result<Option<FeeSchedule>, FeeError> {
        let structure = sqlx::query_as::<_, FeeStructure>(&format!(
            "SELECT {} FROM fee_structures WHERE fee_structure_id = $1",
            STRUCTURE_COLUMNS
        ))
        .bind(fee_structure_id)
        .fetch_optional(&self.pool)
        .await?;

        match structure {
            Some(structure) => {
                let installments = self.installments_for(structure.fee_structure_id).await?;
                Ok(Some(FeeSchedule::new(structure, installments)))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn find_fee_structure_by_course(
        &self,
        course_id: Uuid,
    ) -> Result<Option<FeeSchedule>, FeeError> {
        let structure = sqlx::query_as::<_, FeeStructure>(&format!(
            "SELECT {} FROM fee_structures WHERE course_id = $1",
            STRUCTURE_COLUMNS
        ))
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        match structure {
            Some(structure) => {
                let installments = self.installments_for(structure.fee_structure_id).await?;
                Ok(Some(FeeSchedule::new(structure, installments)))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn list_fee_structures(&self) -> Result<Vec<FeeSchedule>, FeeError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["list_fee_structures"])
            .start_timer();

        let structures = sqlx::query_as::<_, FeeStructure>(&format!(
            "SELECT {} FROM fee_structures ORDER BY name",
            STRUCTURE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let installments = sqlx::query_as::<_, FeeInstallment>(
            r#"
            SELECT installment_id, fee_structure_id, sequence, amount, due_date
            FROM fee_installments
            ORDER BY fee_structure_id, sequence
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_structure: HashMap<Uuid, Vec<FeeInstallment>> = HashMap::new();
        for installment in installments {
            by_structure
                .entry(installment.fee_structure_id)
                .or_default()
                .push(installment);
        }

        Ok(structures
            .into_iter()
            .map(|s| {
                let installments = by_structure.remove(&s.fee_structure_id).unwrap_or_default();
                FeeSchedule::new(s, installments)
            })
            .collect())
    }

    #[instrument(skip(self, input))]
    async fn update_fee_structure(
        &self,
        fee_structure_id: Uuid,
        input: &NewFeeStructure,
    ) -> Result<FeeSchedule, FeeError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_fee_structure"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let structure = sqlx::query_as::<_, FeeStructure>(&format!(
            r#"
            UPDATE fee_structures
            SET course_id = $2, name = $3, registration_fee = $4, tuition_fee = $5,
                total_amount = $6, installment_count = $7, updated_utc = NOW()
            WHERE fee_structure_id = $1
            RETURNING {}
            "#,
            STRUCTURE_COLUMNS
        ))
        .bind(fee_structure_id)
        .bind(input.course_id)
        .bind(&input.name)
        .bind(input.registration_fee)
        .bind(input.tuition_fee)
        .bind(input.total_amount)
        .bind(input.installment_count)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if unique_constraint(&e).is_some() {
                FeeError::Conflict("A fee structure already exists for this course".to_string())
            } else if is_foreign_key_violation(&e) {
                FeeError::NotFound("Course".to_string())
            } else {
                FeeError::Database(e)
            }
        })?
        .ok_or_else(|| FeeError::NotFound("Fee structure".to_string()))?;

        sqlx::query("DELETE FROM fee_installments WHERE fee_structure_id = $1")
            .bind(fee_structure_id)
            .execute(&mut *tx)
            .await?;

        let installments = Self::insert_installments(&mut tx, fee_structure_id, input).await?;

        tx.commit().await?;
        timer.observe_duration();

        info!(fee_structure_id = %fee_structure_id, "Fee structure updated");
        Ok(FeeSchedule::new(structure, installments))
    }

    #[instrument(skip(self))]
    async fn delete_fee_structure(&self, fee_structure_id: Uuid) -> Result<(), FeeError> {
        let result = sqlx::query("DELETE FROM fee_structures WHERE fee_structure_id = $1")
            .bind(fee_structure_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    FeeError::Conflict(
                        "Fee structure is assigned to students and cannot be deleted".to_string(),
                    )
                } else {
                    FeeError::Database(e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(FeeError::NotFound("Fee structure".to_string()));
        }

        info!(fee_structure_id = %fee_structure_id, "Fee structure deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Student fees
    // -------------------------------------------------------------------------

    #[instrument(skip(self, structure), fields(fee_structure_id = %structure.fee_structure_id))]
    async fn assign_fee(
        &self,
        student_id: Uuid,
        structure: &FeeStructure,
    ) -> Result<(StudentFee, bool), FeeError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["assign_fee"])
            .start_timer();

        let now = Utc::now();
        let inserted = sqlx::query_as::<_, StudentFee>(&format!(
            r#"
            INSERT INTO student_fees (student_fee_id, student_id, fee_structure_id, total_amount, amount_paid, status, assigned_utc, updated_utc)
            VALUES ($1, $2, $3, $4, 0, $5, $6, $6)
            ON CONFLICT (student_id) DO NOTHING
            RETURNING {}
            "#,
            STUDENT_FEE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(structure.fee_structure_id)
        .bind(structure.total_amount)
        .bind(FeeStatus::derive(Decimal::ZERO, structure.total_amount).as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                FeeError::NotFound("Student".to_string())
            } else {
                FeeError::Database(e)
            }
        })?;

        if let Some(fee) = inserted {
            info!(student_fee_id = %fee.student_fee_id, "Fee assigned");
            return Ok((fee, true));
        }

        let existing = self
            .find_student_fee_by_student(student_id)
            .await?
            .ok_or_else(|| FeeError::NotFound("Student fee".to_string()))?;
        Ok((existing, false))
    }

    #[instrument(skip(self))]
    async fn get_student_fee(&self, student_fee_id: Uuid) -> Result<Option<StudentFee>, FeeError> {
        let fee = sqlx::query_as::<_, StudentFee>(&format!(
            "SELECT {} FROM student_fees WHERE student_fee_id = $1",
            STUDENT_FEE_COLUMNS
        ))
        .bind(student_fee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(fee)
    }

    #[instrument(skip(self))]
    async fn find_student_fee_by_student(
        &self,
        student_id: Uuid,
    ) -> Result<Option<StudentFee>, FeeError> {
        let fee = sqlx::query_as::<_, StudentFee>(&format!(
            "SELECT {} FROM student_fees WHERE student_id = $1",
            STUDENT_FEE_COLUMNS
        ))
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(fee)
    }

    #[instrument(skip(self))]
    async fn list_student_fees(
        &self,
        status: Option<FeeStatus>,
    ) -> Result<Vec<StudentFeeOverview>, FeeError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["list_student_fees"])
            .start_timer();

        let rows = sqlx::query_as::<_, StudentFeeOverview>(
            r#"
            SELECT sf.student_fee_id, sf.student_id, s.username, s.full_name, s.enrollment_id,
                   fs.name AS fee_structure_name, sf.total_amount, sf.amount_paid, sf.status
            FROM student_fees sf
            JOIN students s ON s.student_id = sf.student_id
            JOIN fee_structures fs ON fs.fee_structure_id = sf.fee_structure_id
            WHERE ($1::varchar IS NULL OR sf.status = $1)
            ORDER BY s.enrollment_id
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -------------------------------------------------------------------------
    // Payments
    // -------------------------------------------------------------------------

    #[instrument(skip(self, payment, notification), fields(student_fee_id = %payment.student_fee_id, receipt_number = %payment.receipt_number))]
    async fn record_payment(
        &self,
        payment: &FeePayment,
        allow_overpayment: bool,
        notification: Option<&AdminNotification>,
    ) -> Result<StudentFee, FeeError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_payment"])
            .start_timer();

        let mut tx = self.pool.begin().await?;
        let fee = Self::apply_payment(&mut tx, payment, allow_overpayment, notification).await?;
        tx.commit().await?;

        timer.observe_duration();
        Ok(fee)
    }

    #[instrument(skip(self))]
    async fn list_payments(&self, student_fee_id: Uuid) -> Result<Vec<FeePayment>, FeeError> {
        let payments = sqlx::query_as::<_, FeePayment>(&format!(
            "SELECT {} FROM fee_payments WHERE student_fee_id = $1 ORDER BY paid_utc DESC, receipt_number DESC",
            PAYMENT_COLUMNS
        ))
        .bind(student_fee_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    #[instrument(skip(self))]
    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<FeePayment>, FeeError> {
        let payment = sqlx::query_as::<_, FeePayment>(&format!(
            "SELECT {} FROM fee_payments WHERE payment_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }

    #[instrument(skip(self))]
    async fn find_payment_by_receipt(
        &self,
        receipt_number: &str,
    ) -> Result<Option<FeePayment>, FeeError> {
        let payment = sqlx::query_as::<_, FeePayment>(&format!(
            "SELECT {} FROM fee_payments WHERE receipt_number = $1",
            PAYMENT_COLUMNS
        ))
        .bind(receipt_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }

    #[instrument(skip(self))]
    async fn recent_payments(&self, limit: i64) -> Result<Vec<FeePayment>, FeeError> {
        let payments = sqlx::query_as::<_, FeePayment>(&format!(
            "SELECT {} FROM fee_payments WHERE status = 'success' ORDER BY paid_utc DESC LIMIT $1",
            PAYMENT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    #[instrument(skip(self))]
    async fn fee_totals(&self) -> Result<FeeTotals, FeeError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["fee_totals"])
            .start_timer();

        let (total_students, total_fees_collected, pending_fees) =
            sqlx::query_as::<_, (i64, Decimal, Decimal)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM students),
                    (SELECT COALESCE(SUM(amount), 0) FROM fee_payments WHERE status = 'success'),
                    (SELECT COALESCE(SUM(total_amount - amount_paid), 0) FROM student_fees WHERE status <> 'paid')
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(FeeTotals {
            total_students,
            total_fees_collected,
            pending_fees,
        })
    }

    // -------------------------------------------------------------------------
    // Adjustments
    // -------------------------------------------------------------------------

    #[instrument(skip(self, discount), fields(student_fee_id = %discount.student_fee_id))]
    async fn add_discount(&self, discount: &FeeDiscount) -> Result<StudentFee, FeeError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO fee_discounts (discount_id, student_fee_id, discount_type, value, amount, reason, applied, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(discount.discount_id)
        .bind(discount.student_fee_id)
        .bind(discount.discount_type)
        .bind(discount.value)
        .bind(discount.amount)
        .bind(&discount.reason)
        .bind(discount.applied)
        .bind(discount.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                FeeError::NotFound("Student fee".to_string())
            } else {
                FeeError::Database(e)
            }
        })?;

        let fee = if discount.applied {
            Self::adjust_total(&mut tx, discount.student_fee_id, -discount.amount).await?
        } else {
            Self::fetch_student_fee(&mut tx, discount.student_fee_id)
                .await?
                .ok_or_else(|| FeeError::NotFound("Student fee".to_string()))?
        };

        tx.commit().await?;
        Ok(fee)
    }

    #[instrument(skip(self, fine), fields(student_fee_id = %fine.student_fee_id))]
    async fn add_fine(&self, fine: &FeeFine) -> Result<StudentFee, FeeError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO fee_fines (fine_id, student_fee_id, amount, reason, due_date, is_paid, applied, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(fine.fine_id)
        .bind(fine.student_fee_id)
        .bind(fine.amount)
        .bind(&fine.reason)
        .bind(fine.due_date)
        .bind(fine.is_paid)
        .bind(fine.applied)
        .bind(fine.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                FeeError::NotFound("Student fee".to_string())
            } else {
                FeeError::Database(e)
            }
        })?;

        let fee = if fine.applied {
            Self::adjust_total(&mut tx, fine.student_fee_id, fine.amount).await?
        } else {
            Self::fetch_student_fee(&mut tx, fine.student_fee_id)
                .await?
                .ok_or_else(|| FeeError::NotFound("Student fee".to_string()))?
        };

        tx.commit().await?;
        Ok(fee)
    }

    #[instrument(skip(self))]
    async fn list_discounts(&self, student_fee_id: Uuid) -> Result<Vec<FeeDiscount>, FeeError> {
        let discounts = sqlx::query_as::<_, FeeDiscount>(
            r#"
            SELECT discount_id, student_fee_id, discount_type, value, amount, reason, applied, created_utc
            FROM fee_discounts
            WHERE student_fee_id = $1
            ORDER BY created_utc
            "#,
        )
        .bind(student_fee_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(discounts)
    }

    #[instrument(skip(self))]
    async fn list_fines(&self, student_fee_id: Uuid) -> Result<Vec<FeeFine>, FeeError> {
        let fines = sqlx::query_as::<_, FeeFine>(
            r#"
            SELECT fine_id, student_fee_id, amount, reason, due_date, is_paid, applied, created_utc
            FROM fee_fines
            WHERE student_fee_id = $1
            ORDER BY created_utc
            "#,
        )
        .bind(student_fee_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(fines)
    }

    // -------------------------------------------------------------------------
    // Gateway orders
    // -------------------------------------------------------------------------

    #[instrument(skip(self, order), fields(order_id = %order.order_id))]
    async fn create_order(&self, order: &PaymentOrder) -> Result<(), FeeError> {
        sqlx::query(
            r#"
            INSERT INTO payment_orders (order_id, student_fee_id, amount, amount_minor, currency, receipt_reference, status, payment_id, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&order.order_id)
        .bind(order.student_fee_id)
        .bind(order.amount)
        .bind(order.amount_minor)
        .bind(&order.currency)
        .bind(&order.receipt_reference)
        .bind(order.status)
        .bind(order.payment_id)
        .bind(order.created_utc)
        .bind(order.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if unique_constraint(&e).is_some() {
                FeeError::Conflict(format!("Order {} already recorded", order.order_id))
            } else if is_foreign_key_violation(&e) {
                FeeError::NotFound("Student fee".to_string())
            } else {
                FeeError::Database(e)
            }
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_order(&self, order_id: &str) -> Result<Option<PaymentOrder>, FeeError> {
        let order = sqlx::query_as::<_, PaymentOrder>(
            r#"
            SELECT order_id, student_fee_id, amount, amount_minor, currency, receipt_reference, status, payment_id, created_utc, updated_utc
            FROM payment_orders
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    #[instrument(skip(self, payment, notification))]
    async fn complete_order(
        &self,
        order_id: &str,
        payment: &FeePayment,
        allow_overpayment: bool,
        notification: Option<&AdminNotification>,
    ) -> Result<StudentFee, FeeError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["complete_order"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        // Claim the order first; a concurrent verifier blocks here and then
        // sees it as no longer `created`.
        let claimed = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE payment_orders
            SET status = 'paid', updated_utc = $2
            WHERE order_id = $1 AND status = 'created'
            RETURNING order_id
            "#,
        )
        .bind(order_id)
        .bind(payment.paid_utc)
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            return Err(FeeError::Conflict(format!(
                "Order {} has already been processed",
                order_id
            )));
        }

        let fee = Self::apply_payment(&mut tx, payment, allow_overpayment, notification).await?;

        sqlx::query("UPDATE payment_orders SET payment_id = $2 WHERE order_id = $1")
            .bind(order_id)
            .bind(payment.payment_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        timer.observe_duration();

        info!(order_id = %order_id, payment_id = %payment.payment_id, "Order completed");
        Ok(fee)
    }

    #[instrument(skip(self))]
    async fn fail_order(&self, order_id: &str) -> Result<(), FeeError> {
        sqlx::query(
            "UPDATE payment_orders SET status = 'failed', updated_utc = NOW() WHERE order_id = $1 AND status = 'created'",
        )
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Notifications
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    async fn list_notifications(
        &self,
        unread_only: bool,
    ) -> Result<Vec<AdminNotification>, FeeError> {
        let notifications = sqlx::query_as::<_, AdminNotification>(
            r#"
            SELECT notification_id, title, message, notification_type, student_id, amount, is_read, created_utc
            FROM admin_notifications
            WHERE (NOT $1 OR is_read = FALSE)
            ORDER BY created_utc DESC
            "#,
        )
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }

    #[instrument(skip(self))]
    async fn mark_notification_read(&self, notification_id: Uuid) -> Result<bool, FeeError> {
        let result =
            sqlx::query("UPDATE admin_notifications SET is_read = TRUE WHERE notification_id = $1")
                .bind(notification_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn mark_all_notifications_read(&self) -> Result<u64, FeeError> {
        let result = sqlx::query("UPDATE admin_notifications SET is_read = TRUE WHERE is_read = FALSE")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // -------------------------------------------------------------------------
    // Attendance
    // -------------------------------------------------------------------------

    #[instrument(skip(self, holiday), fields(holiday_date = %holiday.holiday_date))]
    async fn create_holiday(&self, holiday: &Holiday) -> Result<Holiday, FeeError> {
        let created = sqlx::query_as::<_, Holiday>(
            r#"
            INSERT INTO holidays (holiday_id, holiday_date, name, is_government)
            VALUES ($1, $2, $3, $4)
            RETURNING holiday_id, holiday_date, name, is_government
            "#,
        )
        .bind(holiday.holiday_id)
        .bind(holiday.holiday_date)
        .bind(&holiday.name)
        .bind(holiday.is_government)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match unique_constraint(&e) {
            Some(_) => FeeError::Conflict(format!(
                "A holiday already exists on {}",
                holiday.holiday_date
            )),
            None => FeeError::Database(e),
        })?;
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn list_holidays(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Holiday>, FeeError> {
        let holidays = sqlx::query_as::<_, Holiday>(
            r#"
            SELECT holiday_id, holiday_date, name, is_government
            FROM holidays
            WHERE ($1::date IS NULL OR holiday_date >= $1)
              AND ($2::date IS NULL OR holiday_date <= $2)
            ORDER BY holiday_date
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(holidays)
    }

    #[instrument(skip(self, record), fields(student_id = %record.student_id, date = %record.attendance_date))]
    async fn upsert_attendance(&self, record: &Attendance) -> Result<Attendance, FeeError> {
        let saved = sqlx::query_as::<_, Attendance>(
            r#"
            INSERT INTO attendance (attendance_id, student_id, attendance_date, is_present, remarks, marked_by, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (student_id, attendance_date) DO UPDATE
            SET is_present = EXCLUDED.is_present,
                remarks = EXCLUDED.remarks,
                marked_by = EXCLUDED.marked_by
            RETURNING attendance_id, student_id, attendance_date, is_present, remarks, marked_by, created_utc
            "#,
        )
        .bind(record.attendance_id)
        .bind(record.student_id)
        .bind(record.attendance_date)
        .bind(record.is_present)
        .bind(&record.remarks)
        .bind(&record.marked_by)
        .bind(record.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                FeeError::NotFound("Student".to_string())
            } else {
                FeeError::Database(e)
            }
        })?;
        Ok(saved)
    }

    #[instrument(skip(self))]
    async fn present_dates(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, FeeError> {
        let dates = sqlx::query_scalar::<_, NaiveDate>(
            r#"
            SELECT attendance_date
            FROM attendance
            WHERE student_id = $1 AND is_present AND attendance_date BETWEEN $2 AND $3
            ORDER BY attendance_date
            "#,
        )
        .bind(student_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(dates)
    }
}
