#![allow(dead_code)]

use std::sync::Arc;

use batchtrace::{
    config::AppConfig,
    db::{self, DbConfig},
    entities::{customer, production_batch, stock_batch, stock_item, supplier},
    events::{self, EventSender},
    services::{
        factory::{ServiceContainer, ServiceFactory},
        intake::{DeliveryLineInput, DispatchInput, ReceiveDeliveryInput},
        production::{AddInputRequest, RecordOutputRequest},
        unit_conversion::Unit,
    },
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::DatabaseConnection;
use uuid::Uuid;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Migrated in-memory SQLite database with every service wired up.
pub struct TestDb {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub services: ServiceContainer,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestDb {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::new(
            "sqlite::memory:".to_string(),
            "test".to_string(),
        ))
        .await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .expect("failed to open in-memory database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");
        let db = Arc::new(pool);

        let (sender, rx) = EventSender::channel(config.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(rx, None));

        let factory = ServiceFactory::new(db.clone(), Some(sender), config.clone());
        let services = ServiceContainer::new(&factory);

        Self {
            db,
            config,
            services,
            _event_task: event_task,
        }
    }

    pub async fn supplier(&self, name: &str) -> supplier::Model {
        self.services
            .intake
            .create_supplier(name, supplier::ApprovalStatus::Approved)
            .await
            .expect("create supplier")
    }

    pub async fn customer(&self, name: &str) -> customer::Model {
        self.services
            .intake
            .create_customer(name, Some(format!("orders@{}.test", name.len())), None)
            .await
            .expect("create customer")
    }

    pub async fn item(&self, name: &str, unit: Unit) -> stock_item::Model {
        self.services
            .intake
            .create_stock_item(name, unit)
            .await
            .expect("create stock item")
    }

    /// Receives a single-line delivery and returns the new batch
    pub async fn receive(
        &self,
        supplier_id: Uuid,
        batch_code: &str,
        quantity: Decimal,
        unit: Unit,
        allergens: &[&str],
    ) -> stock_batch::Model {
        let item = self.item(&format!("{} item", batch_code), unit).await;
        let received = self
            .services
            .intake
            .receive_delivery(ReceiveDeliveryInput {
                supplier_id,
                delivery_date: date(2024, 3, 1),
                reference: Some(format!("DN-{}", batch_code)),
                lines: vec![DeliveryLineInput {
                    batch_code: batch_code.to_string(),
                    stock_item_id: item.id,
                    quantity,
                    unit,
                    use_by_date: None,
                    best_before_date: None,
                    allergens: allergens.iter().map(|a| a.to_string()).collect(),
                }],
            })
            .await
            .expect("receive delivery");
        received
            .batches
            .into_iter()
            .next()
            .expect("one batch per line")
    }

    pub async fn start_run(&self, code: &str) -> production_batch::Model {
        let run = self
            .services
            .production
            .create_production_batch(code, Uuid::new_v4(), date(2024, 3, 2))
            .await
            .expect("create production batch");
        self.services
            .production
            .start(run.id)
            .await
            .expect("start production batch")
    }

    pub async fn feed(&self, run_id: Uuid, batch_id: Uuid, quantity: Decimal, unit: Unit) {
        self.services
            .production
            .add_input(
                run_id,
                AddInputRequest {
                    stock_batch_id: batch_id,
                    planned_quantity: quantity,
                    unit,
                    is_rework: false,
                    rework_source_batch_id: None,
                },
            )
            .await
            .expect("add production input");
    }

    pub async fn output(
        &self,
        run_id: Uuid,
        batch_code: &str,
        quantity: Decimal,
        unit: Unit,
    ) -> stock_batch::Model {
        let item = self.item(&format!("{} item", batch_code), unit).await;
        self.services
            .production
            .record_output(
                run_id,
                RecordOutputRequest {
                    batch_code: batch_code.to_string(),
                    stock_item_id: item.id,
                    quantity,
                    unit,
                    use_by_date: Some(date(2024, 3, 10)),
                    best_before_date: None,
                    allergens: Vec::new(),
                },
            )
            .await
            .expect("record production output")
    }

    pub async fn dispatch(
        &self,
        batch_id: Uuid,
        customer_id: Uuid,
        quantity: Decimal,
        unit: Unit,
    ) {
        self.services
            .intake
            .record_dispatch(DispatchInput {
                stock_batch_id: batch_id,
                customer_id,
                quantity,
                unit,
                dispatch_date: date(2024, 3, 3),
            })
            .await
            .expect("record dispatch");
    }
}

/// FarmCo flour → PB-01 → FP-001 → CaféX
pub struct BakeryChain {
    pub supplier: supplier::Model,
    pub customer: customer::Model,
    pub raw: stock_batch::Model,
    pub run: production_batch::Model,
    pub finished: stock_batch::Model,
}

pub async fn seed_bakery(t: &TestDb) -> BakeryChain {
    let supplier = t.supplier("FarmCo").await;
    let customer = t.customer("CaféX").await;
    let raw = t
        .receive(supplier.id, "RM-001", dec!(50), Unit::Kilogram, &["gluten"])
        .await;
    let run = t.start_run("PB-01").await;
    t.feed(run.id, raw.id, dec!(48), Unit::Kilogram).await;
    let finished = t.output(run.id, "FP-001", dec!(45), Unit::Kilogram).await;
    t.dispatch(finished.id, customer.id, dec!(10), Unit::Kilogram)
        .await;

    BakeryChain {
        supplier,
        customer,
        raw,
        run,
        finished,
    }
}
