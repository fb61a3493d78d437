use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{BranchId, BusinessRoleId, SagaId, UserId};
use domain::{
    BusinessRoleAssignment, CustomerProfile, EmploymentType, ManagerProfile, Money, PayType,
    ProficiencyLevel, ProfileAggregate, StaffProfile,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::processed::{ProcessedEventStore, ProcessedStoreError};
use crate::store::{ProfileStore, ProfileStoreError};

/// PostgreSQL-backed dedup ledger.
///
/// The `(saga_id, topic)` primary key is the uniqueness constraint that
/// resolves concurrent deliveries: `record` races are settled by
/// `ON CONFLICT DO NOTHING`, and the loser observes zero affected rows.
#[derive(Clone)]
pub struct PostgresProcessedEventStore {
    pool: PgPool,
}

impl PostgresProcessedEventStore {
    /// Creates a new PostgreSQL dedup ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessedEventStore for PostgresProcessedEventStore {
    async fn record(&self, saga_id: SagaId, topic: &str) -> Result<bool, ProcessedStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (saga_id, topic, processed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT ON CONSTRAINT unique_saga_topic DO NOTHING
            "#,
        )
        .bind(saga_id.as_uuid())
        .bind(topic)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn contains(&self, saga_id: SagaId, topic: &str) -> Result<bool, ProcessedStoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM processed_events WHERE saga_id = $1 AND topic = $2)",
        )
        .bind(saga_id.as_uuid())
        .bind(topic)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, ProcessedStoreError> {
        let result = sqlx::query("DELETE FROM processed_events WHERE processed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// PostgreSQL-backed profile store.
#[derive(Clone)]
pub struct PostgresProfileStore {
    pool: PgPool,
}

impl PostgresProfileStore {
    /// Creates a new PostgreSQL profile store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn decode_error(message: String) -> ProfileStoreError {
        ProfileStoreError::Rejected(message)
    }

    fn row_to_profile(
        row: &PgRow,
        assignments: Vec<BusinessRoleAssignment>,
    ) -> Result<ProfileAggregate, ProfileStoreError> {
        let user_id = UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?);
        let role: String = row.try_get("role")?;

        match role.as_str() {
            "MANAGER" => Ok(ProfileAggregate::Manager(ManagerProfile {
                user_id,
                branch_id: BranchId::new(
                    row.try_get::<Option<i64>, _>("branch_id")?
                        .ok_or_else(|| Self::decode_error("manager row without branch".into()))?,
                ),
                hire_date: row
                    .try_get::<Option<NaiveDate>, _>("hire_date")?
                    .ok_or_else(|| Self::decode_error("manager row without hire date".into()))?,
                identity_card: row
                    .try_get::<Option<String>, _>("identity_card")?
                    .ok_or_else(|| Self::decode_error("manager row without identity card".into()))?,
            })),
            "STAFF" => {
                let employment: String = row
                    .try_get::<Option<String>, _>("employment_type")?
                    .ok_or_else(|| Self::decode_error("staff row without employment type".into()))?;
                let employment_type = match employment.as_str() {
                    "FULL_TIME" => EmploymentType::FullTime,
                    "PART_TIME" => EmploymentType::PartTime,
                    other => {
                        return Err(Self::decode_error(format!(
                            "unknown employment type: {other}"
                        )));
                    }
                };

                let pay: String = row
                    .try_get::<Option<String>, _>("pay_type")?
                    .ok_or_else(|| Self::decode_error("staff row without pay type".into()))?;
                let pay_type = match pay.as_str() {
                    "SALARIED" => PayType::Salaried,
                    "HOURLY" => PayType::Hourly,
                    other => return Err(Self::decode_error(format!("unknown pay type: {other}"))),
                };

                Ok(ProfileAggregate::Staff(StaffProfile {
                    user_id,
                    branch_id: BranchId::new(
                        row.try_get::<Option<i64>, _>("branch_id")?
                            .ok_or_else(|| Self::decode_error("staff row without branch".into()))?,
                    ),
                    identity_card: row
                        .try_get::<Option<String>, _>("identity_card")?
                        .ok_or_else(|| {
                            Self::decode_error("staff row without identity card".into())
                        })?,
                    hire_date: row
                        .try_get::<Option<NaiveDate>, _>("hire_date")?
                        .ok_or_else(|| Self::decode_error("staff row without hire date".into()))?,
                    employment_type,
                    pay_type,
                    base_salary: row
                        .try_get::<Option<i64>, _>("base_salary_cents")?
                        .map(Money::from_cents),
                    insurance_salary: row
                        .try_get::<Option<i64>, _>("insurance_salary_cents")?
                        .map(Money::from_cents),
                    number_of_dependents: row
                        .try_get::<Option<i32>, _>("number_of_dependents")?
                        .map(|n| n as u32),
                    hourly_rate: row
                        .try_get::<Option<i64>, _>("hourly_rate_cents")?
                        .map(Money::from_cents),
                    overtime_rate: row
                        .try_get::<Option<i64>, _>("overtime_rate_cents")?
                        .map(Money::from_cents),
                    role_assignments: assignments,
                }))
            }
            "CUSTOMER" => Ok(ProfileAggregate::Customer(CustomerProfile {
                user_id,
                dob: row
                    .try_get::<Option<NaiveDate>, _>("dob")?
                    .ok_or_else(|| Self::decode_error("customer row without dob".into()))?,
                avatar_url: row.try_get("avatar_url")?,
                bio: row.try_get("bio")?,
            })),
            other => Err(Self::decode_error(format!("unknown profile role: {other}"))),
        }
    }
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    async fn insert_profile(&self, profile: ProfileAggregate) -> Result<(), ProfileStoreError> {
        let user_id = profile.user_id();
        let mut tx = self.pool.begin().await?;

        let base = sqlx::query(
            r#"
            INSERT INTO profiles (user_id, role, branch_id, hire_date, identity_card,
                                  employment_type, pay_type, base_salary_cents,
                                  insurance_salary_cents, number_of_dependents,
                                  hourly_rate_cents, overtime_rate_cents, dob, avatar_url, bio)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        );

        let query = match &profile {
            ProfileAggregate::Manager(p) => base
                .bind(user_id.as_uuid())
                .bind("MANAGER")
                .bind(Some(p.branch_id.as_i64()))
                .bind(Some(p.hire_date))
                .bind(Some(p.identity_card.clone()))
                .bind(None::<String>)
                .bind(None::<String>)
                .bind(None::<i64>)
                .bind(None::<i64>)
                .bind(None::<i32>)
                .bind(None::<i64>)
                .bind(None::<i64>)
                .bind(None::<NaiveDate>)
                .bind(None::<String>)
                .bind(None::<String>),
            ProfileAggregate::Staff(p) => {
                let employment = match p.employment_type {
                    EmploymentType::FullTime => "FULL_TIME",
                    EmploymentType::PartTime => "PART_TIME",
                };
                let pay = match p.pay_type {
                    PayType::Salaried => "SALARIED",
                    PayType::Hourly => "HOURLY",
                };
                base.bind(user_id.as_uuid())
                    .bind("STAFF")
                    .bind(Some(p.branch_id.as_i64()))
                    .bind(Some(p.hire_date))
                    .bind(Some(p.identity_card.clone()))
                    .bind(Some(employment.to_string()))
                    .bind(Some(pay.to_string()))
                    .bind(p.base_salary.map(|m| m.cents()))
                    .bind(p.insurance_salary.map(|m| m.cents()))
                    .bind(p.number_of_dependents.map(|n| n as i32))
                    .bind(p.hourly_rate.map(|m| m.cents()))
                    .bind(p.overtime_rate.map(|m| m.cents()))
                    .bind(None::<NaiveDate>)
                    .bind(None::<String>)
                    .bind(None::<String>)
            }
            ProfileAggregate::Customer(p) => base
                .bind(user_id.as_uuid())
                .bind("CUSTOMER")
                .bind(None::<i64>)
                .bind(None::<NaiveDate>)
                .bind(None::<String>)
                .bind(None::<String>)
                .bind(None::<String>)
                .bind(None::<i64>)
                .bind(None::<i64>)
                .bind(None::<i32>)
                .bind(None::<i64>)
                .bind(None::<i64>)
                .bind(Some(p.dob))
                .bind(p.avatar_url.clone())
                .bind(p.bio.clone()),
        };

        query.execute(&mut *tx).await.map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("profiles_pkey")
            {
                return ProfileStoreError::AlreadyExists(user_id);
            }
            ProfileStoreError::Database(e)
        })?;

        if let ProfileAggregate::Staff(p) = &profile {
            for assignment in &p.role_assignments {
                sqlx::query(
                    r#"
                    INSERT INTO staff_role_assignments (user_id, business_role_id, proficiency)
                    VALUES ($1, $2, $3)
                    "#,
                )
                .bind(user_id.as_uuid())
                .bind(assignment.business_role_id.as_i64())
                .bind(assignment.proficiency.as_str())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_profile(&self, user_id: UserId) -> Result<bool, ProfileStoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM staff_role_assignments WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM profiles WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_role_assignments(&self, user_id: UserId) -> Result<u64, ProfileStoreError> {
        let result = sqlx::query("DELETE FROM staff_role_assignments WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get(&self, user_id: UserId) -> Result<Option<ProfileAggregate>, ProfileStoreError> {
        let Some(row) = sqlx::query("SELECT * FROM profiles WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let assignment_rows = sqlx::query(
            r#"
            SELECT business_role_id, proficiency
            FROM staff_role_assignments
            WHERE user_id = $1
            ORDER BY business_role_id
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let assignments = assignment_rows
            .into_iter()
            .map(|r| {
                let proficiency_str: String = r.try_get("proficiency")?;
                let proficiency = match proficiency_str.as_str() {
                    "BEGINNER" => ProficiencyLevel::Beginner,
                    "INTERMEDIATE" => ProficiencyLevel::Intermediate,
                    "ADVANCED" => ProficiencyLevel::Advanced,
                    "EXPERT" => ProficiencyLevel::Expert,
                    other => {
                        return Err(Self::decode_error(format!(
                            "unknown proficiency level: {other}"
                        )));
                    }
                };
                Ok(BusinessRoleAssignment {
                    business_role_id: BusinessRoleId::new(r.try_get("business_role_id")?),
                    proficiency,
                })
            })
            .collect::<Result<Vec<_>, ProfileStoreError>>()?;

        Some(Self::row_to_profile(&row, assignments)).transpose()
    }
}
