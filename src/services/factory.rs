use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        batch_state::BatchStateService, intake::IntakeService, production::ProductionService,
        recalls::RecallService, reconciliation::ReconciliationService,
        traceability::TraceabilityService,
    },
};

/// Factory for creating service instances with shared dependencies
pub struct ServiceFactory {
    db_pool: Arc<DbPool>,
    event_sender: Option<EventSender>,
    config: AppConfig,
}

impl ServiceFactory {
    /// Creates a new service factory with the given dependencies
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<EventSender>, config: AppConfig) -> Self {
        Self {
            db_pool,
            event_sender,
            config,
        }
    }

    fn retry_attempts(&self) -> u32 {
        self.config.inventory.optimistic_retry_attempts
    }

    pub fn batch_state_service(&self) -> BatchStateService {
        BatchStateService::new(
            self.db_pool.clone(),
            self.event_sender.clone(),
            self.retry_attempts(),
        )
    }

    pub fn traceability_service(&self) -> TraceabilityService {
        TraceabilityService::new(self.db_pool.clone(), self.config.trace.max_depth)
    }

    /// Each call gets its own lock map; share one instance per process.
    pub fn recall_service(&self) -> RecallService {
        RecallService::new(
            self.db_pool.clone(),
            self.event_sender.clone(),
            self.traceability_service(),
            self.config.recall.clone(),
            self.retry_attempts(),
        )
    }

    pub fn reconciliation_service(&self) -> ReconciliationService {
        ReconciliationService::new(self.db_pool.clone(), self.config.recall.clone())
    }

    pub fn intake_service(&self) -> IntakeService {
        IntakeService::new(self.db_pool.clone(), self.event_sender.clone())
    }

    pub fn production_service(&self) -> ProductionService {
        ProductionService::new(
            self.db_pool.clone(),
            self.event_sender.clone(),
            self.retry_attempts(),
        )
    }

    /// Gets a reference to the database pool
    pub fn db_pool(&self) -> &Arc<DbPool> {
        &self.db_pool
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Service container holding all service instances
#[derive(Clone)]
pub struct ServiceContainer {
    pub batches: Arc<BatchStateService>,
    pub traceability: Arc<TraceabilityService>,
    pub recalls: Arc<RecallService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub intake: Arc<IntakeService>,
    pub production: Arc<ProductionService>,
}

impl ServiceContainer {
    /// Creates a new service container with all services initialized
    pub fn new(factory: &ServiceFactory) -> Self {
        Self {
            batches: Arc::new(factory.batch_state_service()),
            traceability: Arc::new(factory.traceability_service()),
            recalls: Arc::new(factory.recall_service()),
            reconciliation: Arc::new(factory.reconciliation_service()),
            intake: Arc::new(factory.intake_service()),
            production: Arc::new(factory.production_service()),
        }
    }
}
