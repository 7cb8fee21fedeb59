use chrono::{NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        stock_batch::{self, BatchStatus, Entity as StockBatchEntity},
        stock_movement::{self, MovementType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::unit_conversion::{convert, Unit},
};

const ENTITY: &str = "stock_batch";

/// What a stock movement was caused by
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementReference {
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
}

impl MovementReference {
    pub fn new(reference_type: impl Into<String>, reference_id: Uuid) -> Self {
        Self {
            reference_type: Some(reference_type.into()),
            reference_id: Some(reference_id),
        }
    }

    pub fn production_batch(id: Uuid) -> Self {
        Self::new("production_batch", id)
    }

    pub fn recall(id: Uuid) -> Self {
        Self::new("recall", id)
    }
}

/// Result of a committed consumption
#[derive(Debug, Clone)]
pub struct ConsumeOutcome {
    pub batch: stock_batch::Model,
    /// Amount taken, expressed in the batch's own unit
    pub consumed: Decimal,
    pub depleted: bool,
}

/// Result of a quarantine request. Only `Quarantined` changed anything.
#[derive(Debug, Clone)]
pub enum QuarantineOutcome {
    Quarantined(stock_batch::Model),
    AlreadyQuarantined(stock_batch::Model),
    NotQuarantinable {
        batch: stock_batch::Model,
        status: BatchStatus,
    },
}

impl QuarantineOutcome {
    pub fn batch(&self) -> &stock_batch::Model {
        match self {
            QuarantineOutcome::Quarantined(b) | QuarantineOutcome::AlreadyQuarantined(b) => b,
            QuarantineOutcome::NotQuarantinable { batch, .. } => batch,
        }
    }

    /// True when the batch is held after the call, whether or not this call moved it
    pub fn is_held(&self) -> bool {
        !matches!(self, QuarantineOutcome::NotQuarantinable { .. })
    }
}

/// Applies a consumption to a batch's state without touching storage.
///
/// Returns the new remaining quantity and status.
pub fn apply_consumption(
    status: BatchStatus,
    remaining: Decimal,
    quantity: Decimal,
) -> Result<(Decimal, BatchStatus), ServiceError> {
    match status {
        BatchStatus::Active => {}
        BatchStatus::Depleted => {
            return Err(ServiceError::InsufficientStock(
                "Batch is depleted".to_string(),
            ))
        }
        other => {
            return Err(ServiceError::invalid_transition(
                ENTITY,
                other.as_str(),
                "consumption",
            ))
        }
    }

    if quantity <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "Consumption quantity must be positive, got: {}",
            quantity
        )));
    }

    if quantity > remaining {
        return Err(ServiceError::InsufficientStock(format!(
            "Requested {} but only {} remaining",
            quantity, remaining
        )));
    }

    let new_remaining = remaining - quantity;
    let new_status = if new_remaining.is_zero() {
        BatchStatus::Depleted
    } else {
        BatchStatus::Active
    };
    Ok((new_remaining, new_status))
}

/// Applies a restoration of previously consumed stock.
pub fn apply_restoration(
    status: BatchStatus,
    remaining: Decimal,
    received: Decimal,
    quantity: Decimal,
) -> Result<(Decimal, BatchStatus), ServiceError> {
    if quantity <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "Restored quantity must be positive, got: {}",
            quantity
        )));
    }
    if status.is_terminal() {
        return Err(ServiceError::invalid_transition(
            ENTITY,
            status.as_str(),
            "restoration",
        ));
    }

    let new_remaining = remaining + quantity;
    if new_remaining > received {
        return Err(ServiceError::ValidationError(format!(
            "Restoring {} would exceed the {} received",
            quantity, received
        )));
    }

    let new_status = match status {
        BatchStatus::Depleted => BatchStatus::Active,
        other => other,
    };
    Ok((new_remaining, new_status))
}

pub(crate) async fn load_batch<C>(conn: &C, id: Uuid) -> Result<stock_batch::Model, ServiceError>
where
    C: ConnectionTrait,
{
    StockBatchEntity::find_by_id(id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Stock batch {} not found", id)))
}

struct Applied {
    before: stock_batch::Model,
    after: stock_batch::Model,
    changed: bool,
}

/// Reads the batch, asks `plan` for the next state, and writes it only if the
/// version is unchanged. A lost race re-reads and re-plans.
async fn apply_versioned<C, F>(
    conn: &C,
    batch_id: Uuid,
    attempts: u32,
    mut plan: F,
) -> Result<Applied, ServiceError>
where
    C: ConnectionTrait,
    F: FnMut(&stock_batch::Model) -> Result<Option<(Decimal, BatchStatus)>, ServiceError>,
{
    for attempt in 1..=attempts.max(1) {
        let current = load_batch(conn, batch_id).await?;
        let Some((remaining, status)) = plan(&current)? else {
            return Ok(Applied {
                after: current.clone(),
                before: current,
                changed: false,
            });
        };

        let now = Utc::now();
        let result = StockBatchEntity::update_many()
            .col_expr(stock_batch::Column::QuantityRemaining, Expr::value(remaining))
            .col_expr(stock_batch::Column::Status, Expr::value(status.as_str()))
            .col_expr(stock_batch::Column::Version, Expr::value(current.version + 1))
            .col_expr(stock_batch::Column::UpdatedAt, Expr::value(now))
            .filter(stock_batch::Column::Id.eq(batch_id))
            .filter(stock_batch::Column::Version.eq(current.version))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 1 {
            let mut after = current.clone();
            after.quantity_remaining = remaining;
            after.status = status.as_str().to_string();
            after.version = current.version + 1;
            after.updated_at = now;
            return Ok(Applied {
                before: current,
                after,
                changed: true,
            });
        }

        counter!("batchtrace.batches.version_conflicts", 1);
        debug!(batch_id = %batch_id, attempt, "Version conflict on stock batch, retrying");
    }

    warn!(batch_id = %batch_id, attempts, "Gave up on stock batch update after repeated conflicts");
    Err(ServiceError::ConcurrentModification(batch_id))
}

async fn record_movement<C>(
    conn: &C,
    batch: &stock_batch::Model,
    movement_type: MovementType,
    quantity: Decimal,
    reason: &str,
    reference: &MovementReference,
) -> Result<stock_movement::Model, ServiceError>
where
    C: ConnectionTrait,
{
    stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        stock_batch_id: Set(batch.id),
        movement_type: Set(movement_type.as_str().to_string()),
        quantity: Set(quantity),
        unit: Set(batch.unit.clone()),
        reason: Set(reason.to_string()),
        reference_type: Set(reference.reference_type.clone()),
        reference_id: Set(reference.reference_id),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)
}

/// Draws `quantity` (in `unit`) from a batch.
pub async fn consume<C>(
    conn: &C,
    batch_id: Uuid,
    quantity: Decimal,
    unit: Unit,
    reference: &MovementReference,
    attempts: u32,
) -> Result<ConsumeOutcome, ServiceError>
where
    C: ConnectionTrait,
{
    let mut consumed = Decimal::ZERO;
    let applied = apply_versioned(conn, batch_id, attempts, |batch| {
        let batch_unit = Unit::parse(&batch.unit)?;
        consumed = convert(quantity, unit, batch_unit)?.value;
        apply_consumption(batch.batch_status()?, batch.quantity_remaining, consumed).map(Some)
    })
    .await?;

    record_movement(
        conn,
        &applied.after,
        MovementType::Consumption,
        consumed,
        "production consumption",
        reference,
    )
    .await?;

    let depleted = applied.after.quantity_remaining.is_zero();
    Ok(ConsumeOutcome {
        batch: applied.after,
        consumed,
        depleted,
    })
}

/// Re-adds previously consumed stock.
pub async fn restore_consumption<C>(
    conn: &C,
    batch_id: Uuid,
    quantity: Decimal,
    unit: Unit,
    reference: &MovementReference,
    attempts: u32,
) -> Result<stock_batch::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let mut restored = Decimal::ZERO;
    let applied = apply_versioned(conn, batch_id, attempts, |batch| {
        let batch_unit = Unit::parse(&batch.unit)?;
        restored = convert(quantity, unit, batch_unit)?.value;
        apply_restoration(
            batch.batch_status()?,
            batch.quantity_remaining,
            batch.quantity_received,
            restored,
        )
        .map(Some)
    })
    .await?;

    record_movement(
        conn,
        &applied.after,
        MovementType::Restoration,
        restored,
        "consumption restored",
        reference,
    )
    .await?;

    Ok(applied.after)
}

/// Holds an active batch. Any other state is left untouched and reported.
pub async fn quarantine<C>(
    conn: &C,
    batch_id: Uuid,
    reason: &str,
    reference: &MovementReference,
    attempts: u32,
) -> Result<QuarantineOutcome, ServiceError>
where
    C: ConnectionTrait,
{
    let applied = apply_versioned(conn, batch_id, attempts, |batch| {
        Ok(match batch.batch_status()? {
            BatchStatus::Active => Some((batch.quantity_remaining, BatchStatus::Quarantined)),
            _ => None,
        })
    })
    .await?;

    if applied.changed {
        record_movement(
            conn,
            &applied.after,
            MovementType::Quarantine,
            applied.after.quantity_remaining,
            reason,
            reference,
        )
        .await?;
        return Ok(QuarantineOutcome::Quarantined(applied.after));
    }

    let status = applied.after.batch_status()?;
    if status == BatchStatus::Quarantined {
        Ok(QuarantineOutcome::AlreadyQuarantined(applied.after))
    } else {
        Ok(QuarantineOutcome::NotQuarantinable {
            batch: applied.after,
            status,
        })
    }
}

fn require_quarantined(batch: &stock_batch::Model, to: &str) -> Result<(), ServiceError> {
    let status = batch.batch_status()?;
    if status == BatchStatus::Quarantined {
        Ok(())
    } else {
        Err(ServiceError::invalid_transition(ENTITY, status.as_str(), to))
    }
}

/// Lifts a quarantine. A batch with nothing left goes to depleted.
pub async fn release<C>(
    conn: &C,
    batch_id: Uuid,
    reference: &MovementReference,
    attempts: u32,
) -> Result<stock_batch::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let applied = apply_versioned(conn, batch_id, attempts, |batch| {
        require_quarantined(batch, "active")?;
        let next = if batch.quantity_remaining.is_zero() {
            BatchStatus::Depleted
        } else {
            BatchStatus::Active
        };
        Ok(Some((batch.quantity_remaining, next)))
    })
    .await?;

    record_movement(
        conn,
        &applied.after,
        MovementType::Release,
        applied.after.quantity_remaining,
        "quarantine released",
        reference,
    )
    .await?;

    Ok(applied.after)
}

/// Writes off a quarantined batch.
pub async fn destroy<C>(
    conn: &C,
    batch_id: Uuid,
    reference: &MovementReference,
    attempts: u32,
) -> Result<stock_batch::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let applied = apply_versioned(conn, batch_id, attempts, |batch| {
        require_quarantined(batch, "destroyed")?;
        Ok(Some((Decimal::ZERO, BatchStatus::Destroyed)))
    })
    .await?;

    record_movement(
        conn,
        &applied.after,
        MovementType::Destruction,
        applied.before.quantity_remaining,
        "destroyed under recall",
        reference,
    )
    .await?;

    Ok(applied.after)
}

/// Quarantined stock physically returned to the supplier leaves the site.
pub async fn mark_returned<C>(
    conn: &C,
    batch_id: Uuid,
    reference: &MovementReference,
    attempts: u32,
) -> Result<stock_batch::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let applied = apply_versioned(conn, batch_id, attempts, |batch| {
        require_quarantined(batch, "returned")?;
        Ok(Some((Decimal::ZERO, BatchStatus::Returned)))
    })
    .await?;

    record_movement(
        conn,
        &applied.after,
        MovementType::Return,
        applied.before.quantity_remaining,
        "returned under recall",
        reference,
    )
    .await?;

    Ok(applied.after)
}

/// Moves every active batch whose use-by date is before `today` to expired.
pub async fn expire_due<C>(
    conn: &C,
    today: NaiveDate,
    attempts: u32,
) -> Result<Vec<stock_batch::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    let candidates = StockBatchEntity::find()
        .filter(stock_batch::Column::Status.eq(BatchStatus::Active.as_str()))
        .filter(stock_batch::Column::UseByDate.lt(today))
        .order_by_asc(stock_batch::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let mut expired = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let applied = apply_versioned(conn, candidate.id, attempts, |batch| {
            let due = batch.use_by_date.map(|d| d < today).unwrap_or(false);
            Ok((batch.batch_status()? == BatchStatus::Active && due)
                .then_some((batch.quantity_remaining, BatchStatus::Expired)))
        })
        .await?;

        if applied.changed {
            record_movement(
                conn,
                &applied.after,
                MovementType::Expiry,
                applied.after.quantity_remaining,
                "use-by date passed",
                &MovementReference::default(),
            )
            .await?;
            expired.push(applied.after);
        }
    }

    Ok(expired)
}

/// Transactional front for the batch state machine
#[derive(Clone)]
pub struct BatchStateService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
    retry_attempts: u32,
}

impl BatchStateService {
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

    pub async fn get_batch(&self, batch_id: Uuid) -> Result<stock_batch::Model, ServiceError> {
        load_batch(self.db.as_ref(), batch_id).await
    }

    #[instrument(skip(self))]
    pub async fn consume(
        &self,
        batch_id: Uuid,
        quantity: Decimal,
        unit: Unit,
        reference: MovementReference,
    ) -> Result<ConsumeOutcome, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let outcome = consume(&txn, batch_id, quantity, unit, &reference, self.retry_attempts).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("batchtrace.batches.consumed", 1);
        info!(
            batch_id = %batch_id,
            consumed = %outcome.consumed,
            remaining = %outcome.batch.quantity_remaining,
            "Stock batch consumed"
        );

        self.emit(consumption_events(&outcome, reference.reference_id))
            .await;
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn restore_consumption(
        &self,
        batch_id: Uuid,
        quantity: Decimal,
        unit: Unit,
        reference: MovementReference,
    ) -> Result<stock_batch::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let batch =
            restore_consumption(&txn, batch_id, quantity, unit, &reference, self.retry_attempts)
                .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(batch_id = %batch_id, remaining = %batch.quantity_remaining, "Consumption restored");
        Ok(batch)
    }

    #[instrument(skip(self))]
    pub async fn quarantine(
        &self,
        batch_id: Uuid,
        reason: &str,
        reference: MovementReference,
    ) -> Result<QuarantineOutcome, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let outcome = quarantine(&txn, batch_id, reason, &reference, self.retry_attempts).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        if let QuarantineOutcome::Quarantined(_) = &outcome {
            counter!("batchtrace.batches.quarantined", 1);
            self.emit(vec![Event::BatchQuarantined {
                stock_batch_id: batch_id,
                recall_id: reference.reference_id,
            }])
            .await;
        }
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn release(&self, batch_id: Uuid) -> Result<stock_batch::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let batch = release(&txn, batch_id, &MovementReference::default(), self.retry_attempts)
            .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;
        self.emit(vec![Event::BatchReleased(batch_id)]).await;
        Ok(batch)
    }

    #[instrument(skip(self))]
    pub async fn destroy(&self, batch_id: Uuid) -> Result<stock_batch::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let batch = destroy(&txn, batch_id, &MovementReference::default(), self.retry_attempts)
            .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;
        self.emit(vec![Event::BatchDestroyed(batch_id)]).await;
        Ok(batch)
    }

    #[instrument(skip(self))]
    pub async fn mark_returned(&self, batch_id: Uuid) -> Result<stock_batch::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let batch =
            mark_returned(&txn, batch_id, &MovementReference::default(), self.retry_attempts)
                .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;
        self.emit(vec![Event::BatchReturned(batch_id)]).await;
        Ok(batch)
    }

    #[instrument(skip(self))]
    pub async fn expire_due(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<stock_batch::Model>, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let expired = expire_due(&txn, today, self.retry_attempts).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("batchtrace.batches.expired", expired.len() as u64);
        info!(count = expired.len(), %today, "Expired stock batches past use-by");

        let events = expired
            .iter()
            .filter_map(|b| {
                b.use_by_date.map(|use_by_date| Event::BatchExpired {
                    stock_batch_id: b.id,
                    use_by_date,
                })
            })
            .collect();
        self.emit(events).await;
        Ok(expired)
    }
}

pub(crate) fn consumption_events(outcome: &ConsumeOutcome, reference_id: Option<Uuid>) -> Vec<Event> {
    let mut events = vec![Event::BatchConsumed {
        stock_batch_id: outcome.batch.id,
        quantity: outcome.consumed,
        unit: outcome.batch.unit.clone(),
        remaining: outcome.batch.quantity_remaining,
        reference_id,
    }];
    if outcome.depleted {
        events.push(Event::BatchDepleted(outcome.batch.id));
    }
    events
}
