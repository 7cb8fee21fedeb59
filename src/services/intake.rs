use chrono::{NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        customer, delivery, delivery_line, dispatch_record,
        stock_batch::{self, allergens_to_json, BatchStatus},
        stock_item,
        supplier::{self, ApprovalStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::unit_conversion::{convert, Unit},
    validation::normalize_code,
};

/// One received lot on a delivery note
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DeliveryLineInput {
    #[validate(length(min = 1, max = 64))]
    pub batch_code: String,
    pub stock_item_id: Uuid,
    pub quantity: Decimal,
    pub unit: Unit,
    pub use_by_date: Option<NaiveDate>,
    pub best_before_date: Option<NaiveDate>,
    #[serde(default)]
    pub allergens: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReceiveDeliveryInput {
    pub supplier_id: Uuid,
    pub delivery_date: NaiveDate,
    pub reference: Option<String>,
    #[validate]
    #[validate(length(min = 1))]
    pub lines: Vec<DeliveryLineInput>,
}

#[derive(Debug, Clone)]
pub struct ReceivedDelivery {
    pub delivery: delivery::Model,
    pub batches: Vec<stock_batch::Model>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchInput {
    pub stock_batch_id: Uuid,
    pub customer_id: Uuid,
    pub quantity: Decimal,
    pub unit: Unit,
    pub dispatch_date: NaiveDate,
}

fn normalize_allergens(allergens: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    allergens
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty() && seen.insert(a.clone()))
        .collect()
}

/// Goods-in, customer dispatch and the master data they hang off
#[derive(Clone)]
pub struct IntakeService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl IntakeService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }

    #[instrument(skip(self))]
    pub async fn create_supplier(
        &self,
        name: &str,
        approval: ApprovalStatus,
    ) -> Result<supplier::Model, ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Supplier name cannot be empty".to_string(),
            ));
        }
        supplier::ActiveModel {
            name: Set(name.trim().to_string()),
            approval_status: Set(approval.as_str().to_string()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn set_supplier_approval(
        &self,
        supplier_id: Uuid,
        approval: ApprovalStatus,
    ) -> Result<supplier::Model, ServiceError> {
        let supplier = supplier::Entity::find_by_id(supplier_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Supplier {} not found", supplier_id)))?;
        let mut active = supplier.into_active_model();
        active.approval_status = Set(approval.as_str().to_string());
        active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn create_customer(
        &self,
        name: &str,
        contact_email: Option<String>,
        contact_phone: Option<String>,
    ) -> Result<customer::Model, ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Customer name cannot be empty".to_string(),
            ));
        }
        customer::ActiveModel {
            name: Set(name.trim().to_string()),
            contact_email: Set(contact_email),
            contact_phone: Set(contact_phone),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn create_stock_item(
        &self,
        name: &str,
        default_unit: Unit,
    ) -> Result<stock_item::Model, ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Stock item name cannot be empty".to_string(),
            ));
        }
        stock_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.trim().to_string()),
            default_unit: Set(default_unit.symbol().to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(self.db.as_ref())
        .await
        .map_err(ServiceError::db_error)
    }

    /// Books a delivery in. Each line becomes an active, delivered stock batch.
    #[instrument(skip(self, input), fields(supplier_id = %input.supplier_id, lines = input.lines.len()))]
    pub async fn receive_delivery(
        &self,
        input: ReceiveDeliveryInput,
    ) -> Result<ReceivedDelivery, ServiceError> {
        input.validate()?;

        let supplier = supplier::Entity::find_by_id(input.supplier_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Supplier {} not found", input.supplier_id))
            })?;
        if supplier.approval() == Some(ApprovalStatus::Suspended) {
            return Err(ServiceError::ValidationError(format!(
                "Supplier '{}' is suspended",
                supplier.name
            )));
        }

        let mut codes = HashSet::new();
        let mut lines = Vec::with_capacity(input.lines.len());
        for line in input.lines {
            if line.quantity <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Delivered quantity must be positive, got: {}",
                    line.quantity
                )));
            }
            let code = normalize_code(&line.batch_code)?;
            if !codes.insert(code.clone()) {
                return Err(ServiceError::ValidationError(format!(
                    "Batch code '{}' appears twice on the delivery",
                    code
                )));
            }
            lines.push((code, line));
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let now = Utc::now();
        let delivery = delivery::ActiveModel {
            id: Set(Uuid::new_v4()),
            supplier_id: Set(supplier.id),
            delivery_date: Set(input.delivery_date),
            reference: Set(input.reference),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        let mut batches = Vec::with_capacity(lines.len());
        for (code, line) in lines {
            let existing = stock_batch::Entity::find()
                .filter(stock_batch::Column::BatchCode.eq(code.as_str()))
                .count(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            if existing > 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Batch code '{}' already exists",
                    code
                )));
            }

            let line_id = Uuid::new_v4();
            let batch_id = Uuid::new_v4();

            let batch = stock_batch::ActiveModel {
                id: Set(batch_id),
                batch_code: Set(code),
                stock_item_id: Set(line.stock_item_id),
                quantity_received: Set(line.quantity),
                quantity_remaining: Set(line.quantity),
                unit: Set(line.unit.symbol().to_string()),
                status: Set(BatchStatus::Active.as_str().to_string()),
                use_by_date: Set(line.use_by_date),
                best_before_date: Set(line.best_before_date),
                allergens: Set(allergens_to_json(normalize_allergens(&line.allergens))),
                delivery_line_id: Set(Some(line_id)),
                production_batch_id: Set(None),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::db_error)?;

            delivery_line::ActiveModel {
                id: Set(line_id),
                delivery_id: Set(delivery.id),
                stock_batch_id: Set(batch_id),
                created_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::db_error)?;

            batches.push(batch);
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("batchtrace.deliveries.received", 1);
        counter!("batchtrace.batches.received", batches.len() as u64);
        info!(
            delivery_id = %delivery.id,
            supplier = %supplier.name,
            batches = batches.len(),
            "Delivery received"
        );

        for batch in &batches {
            self.emit(Event::BatchReceived {
                stock_batch_id: batch.id,
                batch_code: batch.batch_code.clone(),
                supplier_id: supplier.id,
                quantity: batch.quantity_received,
                unit: batch.unit.clone(),
            })
            .await;
        }

        Ok(ReceivedDelivery { delivery, batches })
    }

    /// Records stock leaving to a customer. Stock levels are not touched.
    #[instrument(skip(self))]
    pub async fn record_dispatch(
        &self,
        input: DispatchInput,
    ) -> Result<dispatch_record::Model, ServiceError> {
        if input.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Dispatched quantity must be positive, got: {}",
                input.quantity
            )));
        }

        let batch = stock_batch::Entity::find_by_id(input.stock_batch_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Stock batch {} not found", input.stock_batch_id))
            })?;
        let status = batch.batch_status()?;
        if !matches!(status, BatchStatus::Active | BatchStatus::Depleted) {
            return Err(ServiceError::invalid_transition(
                "stock_batch",
                status.as_str(),
                "dispatch",
            ));
        }
        convert(input.quantity, input.unit, Unit::parse(&batch.unit)?)?;

        let customer = customer::Entity::find_by_id(input.customer_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", input.customer_id))
            })?;

        let record = dispatch_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            stock_batch_id: Set(batch.id),
            customer_id: Set(customer.id),
            customer_name: Set(customer.name.clone()),
            quantity: Set(input.quantity),
            unit: Set(input.unit.symbol().to_string()),
            dispatch_date: Set(input.dispatch_date),
            created_at: Set(Utc::now()),
        }
        .insert(self.db.as_ref())
        .await
        .map_err(ServiceError::db_error)?;

        counter!("batchtrace.dispatches.recorded", 1);
        info!(
            dispatch_id = %record.id,
            batch_code = %batch.batch_code,
            customer = %customer.name,
            "Dispatch recorded"
        );
        self.emit(Event::DispatchRecorded {
            dispatch_id: record.id,
            stock_batch_id: batch.id,
            customer_id: customer.id,
        })
        .await;

        Ok(record)
    }
}
