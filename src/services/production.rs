use chrono::{NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        production_batch::{self, ProductionStatus},
        production_batch_input,
        stock_batch::{self, allergens_to_json, BatchStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        batch_state::{self, consumption_events, load_batch, MovementReference},
        unit_conversion::Unit,
    },
    validation::normalize_code,
};

#[derive(Debug, Clone, Deserialize)]
pub struct AddInputRequest {
    pub stock_batch_id: Uuid,
    pub planned_quantity: Decimal,
    pub unit: Unit,
    #[serde(default)]
    pub is_rework: bool,
    pub rework_source_batch_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordOutputRequest {
    pub batch_code: String,
    pub stock_item_id: Uuid,
    pub quantity: Decimal,
    pub unit: Unit,
    pub use_by_date: Option<NaiveDate>,
    pub best_before_date: Option<NaiveDate>,
    #[serde(default)]
    pub allergens: Vec<String>,
}

/// Declared allergens plus everything carried in by the inputs, sorted.
pub fn inherited_allergens<'a, I>(declared: &[String], inputs: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a stock_batch::Model>,
{
    let mut all: BTreeSet<String> = declared
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect();
    for batch in inputs {
        all.extend(batch.allergen_list().into_iter().map(|a| a.to_lowercase()));
    }
    all.into_iter().collect()
}

async fn load_run<C>(conn: &C, id: Uuid) -> Result<production_batch::Model, ServiceError>
where
    C: ConnectionTrait,
{
    production_batch::Entity::find_by_id(id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Production batch {} not found", id)))
}

async fn load_input<C>(conn: &C, id: Uuid) -> Result<production_batch_input::Model, ServiceError>
where
    C: ConnectionTrait,
{
    production_batch_input::Entity::find_by_id(id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Production input {} not found", id)))
}

fn require_open_for_inputs(run: &production_batch::Model) -> Result<(), ServiceError> {
    let status = run.production_status()?;
    if status.accepts_input_changes() {
        Ok(())
    } else {
        Err(ServiceError::invalid_transition(
            "production_batch",
            status.as_str(),
            "input change",
        ))
    }
}

/// Production runs, the stock they draw and the batches they yield
#[derive(Clone)]
pub struct ProductionService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
    retry_attempts: u32,
}

impl ProductionService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Option<EventSender>,
        retry_attempts: u32,
    ) -> Self {
        Self {
            db,
            event_sender,
            retry_attempts,
        }
    }

    async fn emit(&self, events: Vec<Event>) {
        if let Some(sender) = &self.event_sender {
            for event in events {
                sender.send_or_log(event).await;
            }
        }
    }

    pub async fn get_production_batch(
        &self,
        id: Uuid,
    ) -> Result<production_batch::Model, ServiceError> {
        load_run(self.db.as_ref(), id).await
    }

    pub async fn inputs(
        &self,
        production_batch_id: Uuid,
    ) -> Result<Vec<production_batch_input::Model>, ServiceError> {
        production_batch_input::Entity::find()
            .filter(production_batch_input::Column::ProductionBatchId.eq(production_batch_id))
            .order_by_asc(production_batch_input::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn create_production_batch(
        &self,
        batch_code: &str,
        recipe_id: Uuid,
        production_date: NaiveDate,
    ) -> Result<production_batch::Model, ServiceError> {
        let code = normalize_code(batch_code)?;
        let existing = production_batch::Entity::find()
            .filter(production_batch::Column::BatchCode.eq(code.as_str()))
            .count(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        if existing > 0 {
            return Err(ServiceError::ValidationError(format!(
                "Production batch code '{}' already exists",
                code
            )));
        }

        let run = production_batch::ActiveModel {
            batch_code: Set(code),
            recipe_id: Set(recipe_id),
            production_date: Set(production_date),
            status: Set(ProductionStatus::Planned.as_str().to_string()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(ServiceError::db_error)?;

        counter!("batchtrace.production.created", 1);
        info!(production_batch_id = %run.id, batch_code = %run.batch_code, "Production batch planned");
        Ok(run)
    }

    async fn transition(
        &self,
        id: Uuid,
        to: ProductionStatus,
    ) -> Result<production_batch::Model, ServiceError> {
        let run = load_run(self.db.as_ref(), id).await?;
        let from = run.production_status()?;
        if !from.can_transition_to(to) {
            return Err(ServiceError::invalid_transition(
                "production_batch",
                from.as_str(),
                to.as_str(),
            ));
        }
        let mut active = run.into_active_model();
        active.status = Set(to.as_str().to_string());
        let updated = active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        info!(production_batch_id = %id, %from, %to, "Production batch status changed");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn start(&self, id: Uuid) -> Result<production_batch::Model, ServiceError> {
        self.transition(id, ProductionStatus::InProgress).await
    }

    #[instrument(skip(self))]
    pub async fn complete(&self, id: Uuid) -> Result<production_batch::Model, ServiceError> {
        self.transition(id, ProductionStatus::Completed).await
    }

    /// Stock already drawn stays drawn; remove inputs first to give it back.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: Uuid) -> Result<production_batch::Model, ServiceError> {
        self.transition(id, ProductionStatus::Cancelled).await
    }

    /// Attaches an input and draws its planned quantity from the source batch
    #[instrument(skip(self))]
    pub async fn add_input(
        &self,
        production_batch_id: Uuid,
        request: AddInputRequest,
    ) -> Result<production_batch_input::Model, ServiceError> {
        if request.planned_quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Input quantity must be positive, got: {}",
                request.planned_quantity
            )));
        }
        if request.is_rework && request.rework_source_batch_id.is_none() {
            return Err(ServiceError::ValidationError(
                "Rework input requires a rework source batch".to_string(),
            ));
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let run = load_run(&txn, production_batch_id).await?;
        require_open_for_inputs(&run)?;

        let source = load_batch(&txn, request.stock_batch_id).await?;
        if source.production_batch_id == Some(run.id) {
            return Err(ServiceError::ValidationError(format!(
                "Batch {} is an output of production batch {} and cannot feed it",
                source.batch_code, run.batch_code
            )));
        }
        if let Some(rework_source) = request.rework_source_batch_id.filter(|_| request.is_rework) {
            load_batch(&txn, rework_source).await?;
        }

        let outcome = batch_state::consume(
            &txn,
            source.id,
            request.planned_quantity,
            request.unit,
            &MovementReference::production_batch(run.id),
            self.retry_attempts,
        )
        .await?;

        let input = production_batch_input::ActiveModel {
            id: Set(Uuid::new_v4()),
            production_batch_id: Set(run.id),
            stock_batch_id: Set(source.id),
            stock_item_id: Set(source.stock_item_id),
            planned_quantity: Set(request.planned_quantity),
            actual_quantity: Set(None),
            unit: Set(request.unit.symbol().to_string()),
            is_rework: Set(request.is_rework),
            rework_source_batch_id: Set(request.rework_source_batch_id.filter(|_| request.is_rework)),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("batchtrace.batches.consumed", 1);
        info!(
            production_batch_id = %run.id,
            batch_code = %source.batch_code,
            quantity = %request.planned_quantity,
            unit = %request.unit,
            "Production input added"
        );
        self.emit(consumption_events(&outcome, Some(run.id))).await;
        Ok(input)
    }

    /// Sets the measured quantity and settles the difference against stock
    #[instrument(skip(self))]
    pub async fn finalize_input(
        &self,
        input_id: Uuid,
        actual_quantity: Decimal,
    ) -> Result<production_batch_input::Model, ServiceError> {
        if actual_quantity < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Actual quantity cannot be negative, got: {}",
                actual_quantity
            )));
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let input = load_input(&txn, input_id).await?;
        let run = load_run(&txn, input.production_batch_id).await?;
        require_open_for_inputs(&run)?;

        let unit = Unit::parse(&input.unit)?;
        let reference = MovementReference::production_batch(run.id);
        let delta = actual_quantity - input.effective_quantity();
        let mut events = Vec::new();
        if delta > Decimal::ZERO {
            let outcome = batch_state::consume(
                &txn,
                input.stock_batch_id,
                delta,
                unit,
                &reference,
                self.retry_attempts,
            )
            .await?;
            events = consumption_events(&outcome, Some(run.id));
        } else if delta < Decimal::ZERO {
            batch_state::restore_consumption(
                &txn,
                input.stock_batch_id,
                -delta,
                unit,
                &reference,
                self.retry_attempts,
            )
            .await?;
        }

        let mut active = input.into_active_model();
        active.actual_quantity = Set(Some(actual_quantity));
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(input_id = %input_id, %delta, "Production input finalized");
        self.emit(events).await;
        Ok(updated)
    }

    /// Detaches an input and gives its stock back
    #[instrument(skip(self))]
    pub async fn remove_input(&self, input_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let input = load_input(&txn, input_id).await?;
        let run = load_run(&txn, input.production_batch_id).await?;
        require_open_for_inputs(&run)?;

        let quantity = input.effective_quantity();
        if quantity > Decimal::ZERO {
            batch_state::restore_consumption(
                &txn,
                input.stock_batch_id,
                quantity,
                Unit::parse(&input.unit)?,
                &MovementReference::production_batch(run.id),
                self.retry_attempts,
            )
            .await?;
        }
        input.delete(&txn).await.map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(input_id = %input_id, production_batch_id = %run.id, "Production input removed");
        Ok(())
    }

    /// Books the finished batch a run produced
    #[instrument(skip(self, request), fields(batch_code = %request.batch_code))]
    pub async fn record_output(
        &self,
        production_batch_id: Uuid,
        request: RecordOutputRequest,
    ) -> Result<stock_batch::Model, ServiceError> {
        if request.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Output quantity must be positive, got: {}",
                request.quantity
            )));
        }
        let code = normalize_code(&request.batch_code)?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let run = load_run(&txn, production_batch_id).await?;
        let status = run.production_status()?;
        if status != ProductionStatus::InProgress {
            return Err(ServiceError::invalid_transition(
                "production_batch",
                status.as_str(),
                "output",
            ));
        }

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

        let inputs = run
            .find_related(production_batch_input::Entity)
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let mut source_ids: Vec<Uuid> = inputs
            .iter()
            .flat_map(|i| std::iter::once(i.stock_batch_id).chain(i.rework_source()))
            .collect();
        source_ids.sort();
        source_ids.dedup();
        let sources = if source_ids.is_empty() {
            Vec::new()
        } else {
            stock_batch::Entity::find()
                .filter(stock_batch::Column::Id.is_in(source_ids))
                .all(&txn)
                .await
                .map_err(ServiceError::db_error)?
        };
        let allergens = inherited_allergens(&request.allergens, &sources);

        let output = stock_batch::ActiveModel {
            id: Set(Uuid::new_v4()),
            batch_code: Set(code),
            stock_item_id: Set(request.stock_item_id),
            quantity_received: Set(request.quantity),
            quantity_remaining: Set(request.quantity),
            unit: Set(request.unit.symbol().to_string()),
            status: Set(BatchStatus::Active.as_str().to_string()),
            use_by_date: Set(request.use_by_date),
            best_before_date: Set(request.best_before_date),
            allergens: Set(allergens_to_json(allergens)),
            delivery_line_id: Set(None),
            production_batch_id: Set(Some(run.id)),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("batchtrace.production.outputs", 1);
        info!(
            production_batch_id = %run.id,
            stock_batch_id = %output.id,
            batch_code = %output.batch_code,
            "Production output recorded"
        );
        self.emit(vec![Event::ProductionOutputRecorded {
            production_batch_id: run.id,
            stock_batch_id: output.id,
            quantity: output.quantity_received,
            unit: output.unit.clone(),
        }])
        .await;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch_with(allergens: &[&str]) -> stock_batch::Model {
        let now = Utc::now();
        stock_batch::Model {
            id: Uuid::new_v4(),
            batch_code: "RM-001".into(),
            stock_item_id: Uuid::new_v4(),
            quantity_received: Decimal::ONE,
            quantity_remaining: Decimal::ONE,
            unit: "kg".into(),
            status: "active".into(),
            use_by_date: None,
            best_before_date: None,
            allergens: allergens_to_json(allergens.iter().copied()),
            delivery_line_id: Some(Uuid::new_v4()),
            production_batch_id: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn outputs_inherit_input_allergens() {
        let flour = batch_with(&["gluten"]);
        let butter = batch_with(&["milk", "Gluten"]);
        let declared = vec!["Sesame".to_string()];
        assert_eq!(
            inherited_allergens(&declared, [&flour, &butter]),
            vec!["gluten", "milk", "sesame"]
        );
    }

    #[test]
    fn no_inputs_keeps_declared_only() {
        assert!(inherited_allergens(&[], std::iter::empty()).is_empty());
    }
}
