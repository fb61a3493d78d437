//! PostgreSQL integration tests for the dedup ledger and profile store.
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p profile --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::NaiveDate;
use common::{BranchId, BusinessRoleId, SagaId, UserId};
use domain::{
    BusinessRoleAssignment, CustomerProfile, EmploymentType, ManagerProfile, Money, PayType,
    ProficiencyLevel, ProfileAggregate, StaffProfile, topics,
};
use profile::{
    PostgresProcessedEventStore, PostgresProfileStore, ProcessedEventStore, ProfileStore,
    ProfileStoreError,
};
use sqlx::PgPool;
use serial_test::serial;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/002_create_profile_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE processed_events, profiles, staff_role_assignments")
        .execute(&pool)
        .await
        .unwrap();

    pool
}

fn staff_profile(user_id: UserId) -> ProfileAggregate {
    ProfileAggregate::Staff(StaffProfile {
        user_id,
        branch_id: BranchId::new(1),
        identity_card: "ID-42".to_string(),
        hire_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        employment_type: EmploymentType::FullTime,
        pay_type: PayType::Salaried,
        base_salary: Some(Money::from_cents(500_000)),
        insurance_salary: Some(Money::from_cents(420_000)),
        number_of_dependents: Some(2),
        hourly_rate: None,
        overtime_rate: None,
        role_assignments: vec![
            BusinessRoleAssignment {
                business_role_id: BusinessRoleId::new(3),
                proficiency: ProficiencyLevel::Advanced,
            },
            BusinessRoleAssignment {
                business_role_id: BusinessRoleId::new(8),
                proficiency: ProficiencyLevel::Advanced,
            },
        ],
    })
}

#[tokio::test]
#[serial]
async fn record_races_are_settled_by_the_constraint() {
    let ledger = PostgresProcessedEventStore::new(get_test_pool().await);
    let saga_id = SagaId::new();

    assert!(ledger.record(saga_id, topics::USER_CREATED).await.unwrap());
    // The loser of a concurrent delivery race observes false, not an
    // error.
    assert!(!ledger.record(saga_id, topics::USER_CREATED).await.unwrap());
    assert!(ledger.contains(saga_id, topics::USER_CREATED).await.unwrap());
}

#[tokio::test]
#[serial]
async fn record_is_keyed_by_saga_and_topic() {
    let ledger = PostgresProcessedEventStore::new(get_test_pool().await);
    let saga_id = SagaId::new();

    assert!(ledger.record(saga_id, topics::USER_CREATED).await.unwrap());
    assert!(
        ledger
            .record(saga_id, topics::USER_DELETE_REQUESTED)
            .await
            .unwrap()
    );
    assert!(
        !ledger
            .contains(SagaId::new(), topics::USER_CREATED)
            .await
            .unwrap()
    );
}

#[tokio::test]
#[serial]
async fn concurrent_records_admit_exactly_one_winner() {
    let pool = get_test_pool().await;
    let saga_id = SagaId::new();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let ledger = PostgresProcessedEventStore::new(pool.clone());
        tasks.push(tokio::spawn(async move {
            ledger.record(saga_id, topics::USER_CREATED).await.unwrap()
        }));
    }

    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
#[serial]
async fn purge_respects_cutoff() {
    let ledger = PostgresProcessedEventStore::new(get_test_pool().await);
    ledger.record(SagaId::new(), topics::USER_CREATED).await.unwrap();

    let removed = ledger
        .purge_older_than(chrono::Utc::now() - chrono::Duration::days(1))
        .await
        .unwrap();
    assert_eq!(removed, 0);

    let removed = ledger
        .purge_older_than(chrono::Utc::now() + chrono::Duration::days(1))
        .await
        .unwrap();
    assert_eq!(removed, 1);
}

#[tokio::test]
#[serial]
async fn staff_profile_roundtrips_with_assignments() {
    let store = PostgresProfileStore::new(get_test_pool().await);
    let user_id = UserId::new();
    let profile = staff_profile(user_id);

    store.insert_profile(profile.clone()).await.unwrap();

    let loaded = store.get(user_id).await.unwrap().unwrap();
    assert_eq!(loaded, profile);
}

#[tokio::test]
#[serial]
async fn manager_and_customer_profiles_roundtrip() {
    let store = PostgresProfileStore::new(get_test_pool().await);

    let manager_id = UserId::new();
    let manager = ProfileAggregate::Manager(ManagerProfile {
        user_id: manager_id,
        branch_id: BranchId::new(7),
        hire_date: NaiveDate::from_ymd_opt(2023, 11, 15).unwrap(),
        identity_card: "ID-7".to_string(),
    });
    store.insert_profile(manager.clone()).await.unwrap();
    assert_eq!(store.get(manager_id).await.unwrap(), Some(manager));

    let customer_id = UserId::new();
    let customer = ProfileAggregate::Customer(CustomerProfile {
        user_id: customer_id,
        dob: NaiveDate::from_ymd_opt(1988, 3, 9).unwrap(),
        avatar_url: None,
        bio: Some("reader".to_string()),
    });
    store.insert_profile(customer.clone()).await.unwrap();
    assert_eq!(store.get(customer_id).await.unwrap(), Some(customer));
}

#[tokio::test]
#[serial]
async fn duplicate_insert_maps_to_already_exists() {
    let store = PostgresProfileStore::new(get_test_pool().await);
    let user_id = UserId::new();

    store.insert_profile(staff_profile(user_id)).await.unwrap();
    let result = store.insert_profile(staff_profile(user_id)).await;
    assert!(matches!(result, Err(ProfileStoreError::AlreadyExists(id)) if id == user_id));
}

#[tokio::test]
#[serial]
async fn delete_profile_removes_assignments_too() {
    let store = PostgresProfileStore::new(get_test_pool().await);
    let user_id = UserId::new();
    store.insert_profile(staff_profile(user_id)).await.unwrap();

    assert!(store.delete_profile(user_id).await.unwrap());
    assert!(store.get(user_id).await.unwrap().is_none());

    let orphans: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM staff_role_assignments WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(orphans, 0);

    // Idempotent second delete.
    assert!(!store.delete_profile(user_id).await.unwrap());
}

#[tokio::test]
#[serial]
async fn remove_role_assignments_reports_count() {
    let store = PostgresProfileStore::new(get_test_pool().await);
    let user_id = UserId::new();
    store.insert_profile(staff_profile(user_id)).await.unwrap();

    assert_eq!(store.remove_role_assignments(user_id).await.unwrap(), 2);
    assert_eq!(store.remove_role_assignments(user_id).await.unwrap(), 0);
}
