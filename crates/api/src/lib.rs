//! HTTP API server and wiring for the user-provisioning saga.
//!
//! Provides the collaborator-facing REST endpoints for creating and
//! deleting rich users, with structured logging (tracing) and Prometheus
//! metrics. `create_default_state` wires the whole in-memory stack: the
//! outbox publisher and cleanup loops, the profile provisioning consumer,
//! and the identity-side terminal-event listener.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use domain::topics;
use identity::{
    IdentityStore, InMemoryIdentityStore, ProvisioningService, SagaCoordinator,
    TerminalEventListener, TerminalEventStreams,
};
use messaging::{InMemoryBroker, MessageBroker};
use metrics_exporter_prometheus::PrometheusHandle;
use outbox::{InMemoryOutboxStore, OutboxCleanup, OutboxPublisher};
use profile::{
    ConsumerStreams, InMemoryBranchDirectory, InMemoryProcessedEventStore, InMemoryProfileStore,
    ProvisioningConsumer,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
use routes::users::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<I: IdentityStore + 'static>(
    state: Arc<AppState<I>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/users/managers", post(routes::users::create_manager::<I>))
        .route("/users/staff", post(routes::users::create_staff::<I>))
        .route("/users/customers", post(routes::users::create_customer::<I>))
        .route(
            "/users/managers/{id}",
            delete(routes::users::delete_manager::<I>),
        )
        .route("/users/staff/{id}", delete(routes::users::delete_staff::<I>))
        .route("/users/{id}", get(routes::users::get_user::<I>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// The in-memory stack behind the default state, exposed so tests and
/// tooling can observe and perturb each component.
pub struct InMemoryStack {
    pub outbox: InMemoryOutboxStore,
    pub identity: InMemoryIdentityStore,
    pub broker: InMemoryBroker,
    pub profiles: InMemoryProfileStore,
    pub processed: InMemoryProcessedEventStore,
    pub branches: InMemoryBranchDirectory,
    pub coordinator: Arc<SagaCoordinator>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl InMemoryStack {
    /// Aborts the background loops (publisher, cleanup, consumer,
    /// listener).
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Creates the default application state over in-memory stores and spawns
/// the background loops.
pub async fn create_default_state(
    config: &Config,
) -> (Arc<AppState<InMemoryIdentityStore>>, InMemoryStack) {
    let outbox = InMemoryOutboxStore::new();
    let identity = InMemoryIdentityStore::new(outbox.clone());
    let broker = InMemoryBroker::new();
    let profiles = InMemoryProfileStore::new();
    let processed = InMemoryProcessedEventStore::new();
    let branches = InMemoryBranchDirectory::with_branches(config.seed_branches.iter().copied());
    let coordinator = Arc::new(SagaCoordinator::new());

    // Subscriptions are taken before the loops start so no event can slip
    // past an unsubscribed consumer.
    let consumer_streams = ConsumerStreams {
        created: broker.subscribe(topics::USER_CREATED).await,
        delete_requested: broker.subscribe(topics::USER_DELETE_REQUESTED).await,
    };
    let listener_streams = TerminalEventStreams {
        profile_completed: broker.subscribe(topics::PROFILE_COMPLETED).await,
        profile_failed: broker.subscribe(topics::PROFILE_FAILED).await,
        delete_completed: broker.subscribe(topics::DELETE_PROFILE_COMPLETED).await,
        delete_failed: broker.subscribe(topics::USER_DELETE_FAILED).await,
    };

    let publisher = OutboxPublisher::new(outbox.clone(), broker.clone(), config.publisher_config());
    let cleanup = OutboxCleanup::new(outbox.clone(), config.cleanup_config());
    let consumer = ProvisioningConsumer::new(
        processed.clone(),
        profiles.clone(),
        branches.clone(),
        broker.clone(),
        config.branch_check_policy,
    );
    let listener = TerminalEventListener::new(identity.clone(), Arc::clone(&coordinator));

    let tasks = vec![
        tokio::spawn(async move { publisher.run().await }),
        tokio::spawn(async move { cleanup.run().await }),
        tokio::spawn(async move { consumer.run(consumer_streams).await }),
        tokio::spawn(async move { listener.run(listener_streams).await }),
    ];

    let state = Arc::new(AppState {
        service: ProvisioningService::new(identity.clone(), Arc::clone(&coordinator)),
        wait_ceiling: config.wait_ceiling,
    });

    let stack = InMemoryStack {
        outbox,
        identity,
        broker,
        profiles,
        processed,
        branches,
        coordinator,
        tasks,
    };

    (state, stack)
}
