// Stock and lineage
pub mod batch_state;
pub mod lineage_resolver;
pub mod traceability;
pub mod unit_conversion;

// Goods-in and production
pub mod intake;
pub mod production;

// Recall workflow and reporting
pub mod recalls;
pub mod reconciliation;

// Service factory for dependency injection
pub mod factory;
