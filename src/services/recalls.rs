use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::RecallConfig,
    entities::{
        recall::{self, RecallStatus, RecallType, Severity},
        recall_affected_batch::{self, ActionTaken, BatchType},
        recall_notification::{self, NotificationMethod},
        stock_batch::{self, BatchStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        batch_state::{self, MovementReference, QuarantineOutcome},
        lineage_resolver::{Direction, EdgeLabel, NodeType, TraceEdge},
        traceability::TraceabilityService,
    },
    validation::normalize_code,
};

const QUARANTINE_REASON: &str = "recall quarantine";

/// Input for opening a recall
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRecallInput {
    pub recall_code: String,
    pub recall_type: RecallType,
    pub severity: Severity,
    pub reason: String,
}

/// Editable narrative fields. Severity is fixed at creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecallDetailsUpdate {
    pub reason: Option<String>,
    pub root_cause: Option<String>,
    pub corrective_actions: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewNotification {
    pub customer_name: String,
    pub method: NotificationMethod,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
}

/// Authority a recall can be reported to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regulator {
    FoodStandardsAgency,
    LocalAuthority,
}

impl Regulator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regulator::FoodStandardsAgency => "food_standards_agency",
            Regulator::LocalAuthority => "local_authority",
        }
    }
}

/// An affected batch that could not be placed on hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarantineDiscrepancy {
    pub stock_batch_id: Uuid,
    pub batch_code: String,
    pub batch_status: BatchStatus,
}

#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub affected: recall_affected_batch::Model,
    pub batch: stock_batch::Model,
    /// True when this call moved the batch into quarantine
    pub newly_quarantined: bool,
    pub discrepancy: Option<QuarantineDiscrepancy>,
}

/// True when the regulator has not been told within the SLA.
pub fn is_notification_overdue(recall: &recall::Model, now: DateTime<Utc>, sla: Duration) -> bool {
    let status = RecallStatus::from_str(&recall.status);
    status != Some(RecallStatus::Draft) && !recall.fsa_notified && now - recall.initiated_at > sla
}

/// Recall lifecycle, affected batches and customer notifications
#[derive(Clone)]
pub struct RecallService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
    traceability: TraceabilityService,
    config: RecallConfig,
    retry_attempts: u32,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl RecallService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Option<EventSender>,
        traceability: TraceabilityService,
        config: RecallConfig,
        retry_attempts: u32,
    ) -> Self {
        Self {
            db,
            event_sender,
            traceability,
            config,
            retry_attempts,
            locks: Arc::new(DashMap::new()),
        }
    }

    fn lock_for(&self, recall_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(recall_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of recalls with a live lock entry. Closing a recall drops its entry.
    pub fn tracked_locks(&self) -> usize {
        self.locks.len()
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }

    pub async fn get_recall(&self, recall_id: Uuid) -> Result<recall::Model, ServiceError> {
        recall::Entity::find_by_id(recall_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Recall {} not found", recall_id)))
    }

    pub async fn find_by_code(&self, recall_code: &str) -> Result<recall::Model, ServiceError> {
        let code = normalize_code(recall_code)?;
        recall::Entity::find()
            .filter(recall::Column::RecallCode.eq(code.as_str()))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Recall '{}' not found", code)))
    }

    pub async fn affected_batches(
        &self,
        recall_id: Uuid,
    ) -> Result<Vec<recall_affected_batch::Model>, ServiceError> {
        recall_affected_batch::Entity::find()
            .filter(recall_affected_batch::Column::RecallId.eq(recall_id))
            .order_by_asc(recall_affected_batch::Column::CreatedAt)
            .order_by_asc(recall_affected_batch::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn notifications(
        &self,
        recall_id: Uuid,
    ) -> Result<Vec<recall_notification::Model>, ServiceError> {
        recall_notification::Entity::find()
            .filter(recall_notification::Column::RecallId.eq(recall_id))
            .order_by_asc(recall_notification::Column::CreatedAt)
            .order_by_asc(recall_notification::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Opens a recall in `draft`
    #[instrument(skip(self))]
    pub async fn create_recall(
        &self,
        input: CreateRecallInput,
    ) -> Result<recall::Model, ServiceError> {
        let code = normalize_code(&input.recall_code)?;
        if input.reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Recall reason cannot be empty".to_string(),
            ));
        }

        let existing = recall::Entity::find()
            .filter(recall::Column::RecallCode.eq(code.as_str()))
            .count(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        if existing > 0 {
            return Err(ServiceError::ValidationError(format!(
                "Recall code '{}' already exists",
                code
            )));
        }

        let now = Utc::now();
        let model = recall::ActiveModel {
            id: Set(Uuid::new_v4()),
            recall_code: Set(code.clone()),
            recall_type: Set(input.recall_type.as_str().to_string()),
            severity: Set(input.severity.as_str().to_string()),
            status: Set(RecallStatus::Draft.as_str().to_string()),
            reason: Set(input.reason.trim().to_string()),
            root_cause: Set(None),
            corrective_actions: Set(None),
            initiated_at: Set(now),
            resolved_at: Set(None),
            closed_at: Set(None),
            fsa_notified: Set(false),
            fsa_notified_at: Set(None),
            fsa_reference: Set(None),
            local_authority_notified: Set(false),
            local_authority_notified_at: Set(None),
            local_authority_reference: Set(None),
            ..Default::default()
        };

        let created = model.insert(self.db.as_ref()).await.map_err(|e| {
            let err = ServiceError::db_error(e);
            if err.is_unique_violation() {
                ServiceError::ValidationError(format!("Recall code '{}' already exists", code))
            } else {
                err
            }
        })?;

        counter!("batchtrace.recalls.created", 1);
        info!(recall_id = %created.id, recall_code = %created.recall_code, "Recall created");
        self.emit(Event::RecallCreated {
            recall_id: created.id,
            recall_code: created.recall_code.clone(),
            severity: created.severity.clone(),
        })
        .await;

        Ok(created)
    }

    /// Updates narrative fields on any recall that is not closed
    #[instrument(skip(self))]
    pub async fn update_details(
        &self,
        recall_id: Uuid,
        update: RecallDetailsUpdate,
    ) -> Result<recall::Model, ServiceError> {
        let lock = self.lock_for(recall_id);
        let _guard = lock.lock().await;

        let current = self.get_recall(recall_id).await?;
        let status = current.recall_status()?;
        if status == RecallStatus::Closed {
            return Err(ServiceError::invalid_transition(
                "recall",
                status.as_str(),
                "details update",
            ));
        }

        let mut active = current.into_active_model();
        if let Some(reason) = update.reason {
            if reason.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "Recall reason cannot be empty".to_string(),
                ));
            }
            active.reason = Set(reason.trim().to_string());
        }
        if let Some(root_cause) = update.root_cause {
            active.root_cause = Set(Some(root_cause));
        }
        if let Some(actions) = update.corrective_actions {
            active.corrective_actions = Set(Some(actions));
        }

        active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Moves a recall along its lifecycle
    #[instrument(skip(self))]
    pub async fn transition(
        &self,
        recall_id: Uuid,
        to: RecallStatus,
    ) -> Result<recall::Model, ServiceError> {
        let lock = self.lock_for(recall_id);
        let _guard = lock.lock().await;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let current = recall::Entity::find_by_id(recall_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Recall {} not found", recall_id)))?;
        let from = current.recall_status()?;

        if !from.can_transition_to(to) {
            return Err(ServiceError::invalid_transition(
                "recall",
                from.as_str(),
                to.as_str(),
            ));
        }

        if to == RecallStatus::Resolved && self.config.require_responses_before_resolve {
            let outstanding = current
                .find_related(recall_notification::Entity)
                .filter(recall_notification::Column::ResponseReceived.eq(false))
                .count(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            if outstanding > 0 {
                return Err(ServiceError::ValidationError(format!(
                    "{} customer notification(s) still awaiting a response",
                    outstanding
                )));
            }
        }

        let now = Utc::now();
        let mut active = current.into_active_model();
        active.status = Set(to.as_str().to_string());
        match to {
            RecallStatus::Resolved => active.resolved_at = Set(Some(now)),
            RecallStatus::Closed => active.closed_at = Set(Some(now)),
            _ => {}
        }
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;
        if to == RecallStatus::Closed {
            // Closed recalls refuse every mutation
            self.locks.remove(&recall_id);
        }

        counter!("batchtrace.recalls.transitions", 1);
        info!(recall_id = %recall_id, from = %from, to = %to, "Recall status changed");
        self.emit(Event::RecallStatusChanged {
            recall_id,
            old_status: from.as_str().to_string(),
            new_status: to.as_str().to_string(),
        })
        .await;

        Ok(updated)
    }

    /// Registers a batch against a recall and quarantines it in the same transaction.
    ///
    /// A batch that cannot be held (depleted, expired, destroyed) is still
    /// registered as `pending` and the outcome carries the discrepancy.
    #[instrument(skip(self))]
    pub async fn register_affected_batch(
        &self,
        recall_id: Uuid,
        stock_batch_id: Uuid,
        batch_type: BatchType,
        quantity_affected: Decimal,
    ) -> Result<RegistrationOutcome, ServiceError> {
        if quantity_affected < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Affected quantity cannot be negative, got: {}",
                quantity_affected
            )));
        }

        let lock = self.lock_for(recall_id);
        let _guard = lock.lock().await;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let recall = recall::Entity::find_by_id(recall_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Recall {} not found", recall_id)))?;
        let status = recall.recall_status()?;
        if !status.accepts_new_batches() {
            return Err(ServiceError::invalid_transition(
                "recall",
                status.as_str(),
                "affected batch registration",
            ));
        }

        let batch = batch_state::load_batch(&txn, stock_batch_id).await?;

        let duplicate = recall_affected_batch::Entity::find()
            .filter(recall_affected_batch::Column::RecallId.eq(recall_id))
            .filter(recall_affected_batch::Column::StockBatchId.eq(stock_batch_id))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if duplicate > 0 {
            return Err(ServiceError::DuplicateBatch {
                recall_id,
                stock_batch_id,
            });
        }

        let record = recall_affected_batch::ActiveModel {
            id: Set(Uuid::new_v4()),
            recall_id: Set(recall_id),
            stock_batch_id: Set(stock_batch_id),
            batch_type: Set(batch_type.as_str().to_string()),
            quantity_affected: Set(quantity_affected),
            quantity_recovered: Set(Decimal::ZERO),
            action_taken: Set(ActionTaken::Pending.as_str().to_string()),
            notes: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            let err = ServiceError::db_error(e);
            if err.is_unique_violation() {
                ServiceError::DuplicateBatch {
                    recall_id,
                    stock_batch_id,
                }
            } else {
                err
            }
        })?;

        let outcome = batch_state::quarantine(
            &txn,
            batch.id,
            QUARANTINE_REASON,
            &MovementReference::recall(recall_id),
            self.retry_attempts,
        )
        .await?;

        let newly_quarantined = matches!(outcome, QuarantineOutcome::Quarantined(_));
        let (affected, discrepancy) = if outcome.is_held() {
            let mut active = record.into_active_model();
            active.action_taken = Set(ActionTaken::Quarantined.as_str().to_string());
            (
                active.update(&txn).await.map_err(ServiceError::db_error)?,
                None,
            )
        } else {
            let held = outcome.batch();
            (
                record,
                Some(QuarantineDiscrepancy {
                    stock_batch_id: held.id,
                    batch_code: held.batch_code.clone(),
                    batch_status: held.batch_status()?,
                }),
            )
        };
        let batch = outcome.batch().clone();

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("batchtrace.recalls.batches_registered", 1);
        if newly_quarantined {
            counter!("batchtrace.batches.quarantined", 1);
        }
        info!(
            recall_id = %recall_id,
            stock_batch_id = %stock_batch_id,
            quarantined = discrepancy.is_none(),
            "Affected batch registered"
        );

        self.emit(Event::AffectedBatchRegistered {
            recall_id,
            stock_batch_id,
            quarantined: discrepancy.is_none(),
        })
        .await;
        if newly_quarantined {
            self.emit(Event::BatchQuarantined {
                stock_batch_id,
                recall_id: Some(recall_id),
            })
            .await;
        }
        if let Some(d) = &discrepancy {
            warn!(
                recall_id = %recall_id,
                batch_code = %d.batch_code,
                batch_status = %d.batch_status,
                "Affected batch could not be quarantined"
            );
            self.emit(Event::QuarantineDiscrepancy {
                recall_id,
                stock_batch_id,
                batch_status: d.batch_status.as_str().to_string(),
            })
            .await;
        }

        Ok(RegistrationOutcome {
            affected,
            batch,
            newly_quarantined,
            discrepancy,
        })
    }

    /// Registers every stock batch reachable forward from `source_batch_id`
    /// that the recall does not already cover.
    #[instrument(skip(self))]
    pub async fn register_downstream_batches(
        &self,
        recall_id: Uuid,
        source_batch_id: Uuid,
    ) -> Result<Vec<RegistrationOutcome>, ServiceError> {
        let trace = self
            .traceability
            .trace(source_batch_id, Direction::Forward)
            .await?;

        let mut covered: HashSet<Uuid> = self
            .affected_batches(recall_id)
            .await?
            .into_iter()
            .map(|a| a.stock_batch_id)
            .collect();

        let reworked = reworked_nodes(&trace.edges);

        let mut registered = Vec::new();
        for node in &trace.nodes {
            let batch_type = match node.node_type {
                NodeType::RawMaterialBatch | NodeType::FinishedProductBatch
                    if reworked.contains(node.id.as_str()) =>
                {
                    BatchType::Rework
                }
                NodeType::RawMaterialBatch => BatchType::RawMaterial,
                NodeType::FinishedProductBatch => BatchType::FinishedProduct,
                _ => continue,
            };
            if !covered.insert(node.entity_id) {
                continue;
            }

            let quantity = node.quantity.unwrap_or(Decimal::ZERO);
            match self
                .register_affected_batch(recall_id, node.entity_id, batch_type, quantity)
                .await
            {
                Ok(outcome) => registered.push(outcome),
                Err(ServiceError::DuplicateBatch { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        info!(
            recall_id = %recall_id,
            source_batch_id = %source_batch_id,
            registered = registered.len(),
            "Downstream batches registered"
        );
        Ok(registered)
    }

    /// Deletes an affected-batch record while the recall is still being scoped.
    ///
    /// The batch stays quarantined; lifting a hold is an explicit disposition.
    #[instrument(skip(self))]
    pub async fn remove_affected_batch(
        &self,
        recall_id: Uuid,
        affected_id: Uuid,
    ) -> Result<(), ServiceError> {
        let lock = self.lock_for(recall_id);
        let _guard = lock.lock().await;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let recall = recall::Entity::find_by_id(recall_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Recall {} not found", recall_id)))?;
        let status = recall.recall_status()?;
        if !status.allows_batch_removal() {
            return Err(ServiceError::invalid_transition(
                "recall",
                status.as_str(),
                "affected batch removal",
            ));
        }

        let affected = recall_affected_batch::Entity::find_by_id(affected_id)
            .filter(recall_affected_batch::Column::RecallId.eq(recall_id))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Affected batch {} not found on recall {}",
                    affected_id, recall_id
                ))
            })?;
        let stock_batch_id = affected.stock_batch_id;
        affected
            .delete(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(recall_id = %recall_id, stock_batch_id = %stock_batch_id, "Affected batch removed");
        self.emit(Event::AffectedBatchRemoved {
            recall_id,
            stock_batch_id,
        })
        .await;
        Ok(())
    }

    /// Records the final fate of an affected batch and drives the batch state machine.
    #[instrument(skip(self))]
    pub async fn record_disposition(
        &self,
        affected_id: Uuid,
        action: ActionTaken,
        quantity_recovered: Option<Decimal>,
    ) -> Result<recall_affected_batch::Model, ServiceError> {
        if !action.is_final() {
            return Err(ServiceError::ValidationError(format!(
                "'{}' is not a disposition",
                action.as_str()
            )));
        }

        let recall_id = recall_affected_batch::Entity::find_by_id(affected_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Affected batch {} not found", affected_id)))?
            .recall_id;

        let lock = self.lock_for(recall_id);
        let _guard = lock.lock().await;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let recall = recall::Entity::find_by_id(recall_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Recall {} not found", recall_id)))?;
        let recall_status = recall.recall_status()?;
        if recall_status == RecallStatus::Closed {
            return Err(ServiceError::invalid_transition(
                "recall",
                recall_status.as_str(),
                "disposition",
            ));
        }

        let affected = recall_affected_batch::Entity::find_by_id(affected_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Affected batch {} not found", affected_id)))?;
        let current = affected.action().ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Affected batch {} has unknown action '{}'",
                affected.id, affected.action_taken
            ))
        })?;
        if current.is_final() {
            return Err(ServiceError::invalid_transition(
                "recall_affected_batch",
                current.as_str(),
                action.as_str(),
            ));
        }

        let recovered = quantity_recovered.unwrap_or(affected.quantity_recovered);
        if recovered < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Recovered quantity cannot be negative, got: {}",
                recovered
            )));
        }
        if recovered > affected.quantity_affected {
            return Err(ServiceError::NegativeBalance {
                affected: affected.quantity_affected,
                recovered,
            });
        }

        let batch = batch_state::load_batch(&txn, affected.stock_batch_id).await?;
        let reference = MovementReference::recall(recall_id);
        let batch_event = if batch.batch_status()? == BatchStatus::Quarantined {
            let attempts = self.retry_attempts;
            Some(match action {
                ActionTaken::Destroyed => {
                    batch_state::destroy(&txn, batch.id, &reference, attempts).await?;
                    Event::BatchDestroyed(batch.id)
                }
                ActionTaken::Returned => {
                    batch_state::mark_returned(&txn, batch.id, &reference, attempts).await?;
                    Event::BatchReturned(batch.id)
                }
                _ => {
                    batch_state::release(&txn, batch.id, &reference, attempts).await?;
                    Event::BatchReleased(batch.id)
                }
            })
        } else {
            warn!(
                affected_id = %affected_id,
                batch_status = %batch.status,
                "Disposition recorded for a batch that is not held; stock left unchanged"
            );
            None
        };

        let mut active = affected.into_active_model();
        active.action_taken = Set(action.as_str().to_string());
        active.quantity_recovered = Set(recovered);
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("batchtrace.recalls.dispositions", 1);
        info!(affected_id = %affected_id, action = action.as_str(), "Disposition recorded");
        if let Some(event) = batch_event {
            self.emit(event).await;
        }
        Ok(updated)
    }

    /// Appends a customer notification, stamped now and awaiting response
    #[instrument(skip(self))]
    pub async fn record_notification(
        &self,
        recall_id: Uuid,
        notification: NewNotification,
    ) -> Result<recall_notification::Model, ServiceError> {
        if notification.customer_name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Customer name cannot be empty".to_string(),
            ));
        }

        let recall = self.get_recall(recall_id).await?;
        let status = recall.recall_status()?;
        if status == RecallStatus::Closed {
            return Err(ServiceError::invalid_transition(
                "recall",
                status.as_str(),
                "notification",
            ));
        }

        let now = Utc::now();
        let created = recall_notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            recall_id: Set(recall_id),
            customer_name: Set(notification.customer_name.trim().to_string()),
            contact_email: Set(notification.contact_email),
            contact_phone: Set(notification.contact_phone),
            notification_method: Set(notification.method.as_str().to_string()),
            notified_at: Set(Some(now)),
            response_received: Set(false),
            response_notes: Set(None),
            created_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await
        .map_err(ServiceError::db_error)?;

        counter!("batchtrace.recalls.notifications", 1);
        self.emit(Event::RecallNotificationRecorded {
            recall_id,
            notification_id: created.id,
            customer_name: created.customer_name.clone(),
        })
        .await;
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn record_response(
        &self,
        notification_id: Uuid,
        notes: Option<String>,
    ) -> Result<recall_notification::Model, ServiceError> {
        let notification = recall_notification::Entity::find_by_id(notification_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Notification {} not found", notification_id))
            })?;

        let mut active = notification.into_active_model();
        active.response_received = Set(true);
        if notes.is_some() {
            active.response_notes = Set(notes);
        }
        active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Flags that a regulator has been informed. The first notification time is kept.
    #[instrument(skip(self))]
    pub async fn mark_regulator_notified(
        &self,
        recall_id: Uuid,
        regulator: Regulator,
        reference: Option<String>,
    ) -> Result<recall::Model, ServiceError> {
        let lock = self.lock_for(recall_id);
        let _guard = lock.lock().await;

        let current = self.get_recall(recall_id).await?;
        let now = Utc::now();
        let notified_at = match regulator {
            Regulator::FoodStandardsAgency => current.fsa_notified_at,
            Regulator::LocalAuthority => current.local_authority_notified_at,
        }
        .unwrap_or(now);

        let mut active = current.into_active_model();
        match regulator {
            Regulator::FoodStandardsAgency => {
                active.fsa_notified = Set(true);
                active.fsa_notified_at = Set(Some(notified_at));
                if reference.is_some() {
                    active.fsa_reference = Set(reference.clone());
                }
            }
            Regulator::LocalAuthority => {
                active.local_authority_notified = Set(true);
                active.local_authority_notified_at = Set(Some(notified_at));
                if reference.is_some() {
                    active.local_authority_reference = Set(reference.clone());
                }
            }
        }
        let updated = active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        info!(recall_id = %recall_id, regulator = regulator.as_str(), "Regulator notified");
        self.emit(Event::RegulatorNotified {
            recall_id,
            regulator: regulator.as_str().to_string(),
            reference,
            notified_at,
        })
        .await;
        Ok(updated)
    }

    /// Overdue check against the configured SLA
    pub fn notification_overdue(&self, recall: &recall::Model, now: DateTime<Utc>) -> bool {
        is_notification_overdue(recall, now, self.config.notification_sla())
    }
}

/// Ids of batches that came out of a run fed with rework
fn reworked_nodes(edges: &[TraceEdge]) -> HashSet<&str> {
    let rework_runs: HashSet<&str> = edges
        .iter()
        .filter(|e| e.label == EdgeLabel::ReworkInput)
        .map(|e| e.to.as_str())
        .collect();
    edges
        .iter()
        .filter(|e| match e.label {
            EdgeLabel::ReworkOutput => true,
            EdgeLabel::Output => rework_runs.contains(e.from.as_str()),
            _ => false,
        })
        .map(|e| e.to.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(from: &str, to: &str, label: EdgeLabel) -> TraceEdge {
        TraceEdge {
            from: from.into(),
            to: to.into(),
            label,
            quantity: None,
            unit: None,
        }
    }

    #[test]
    fn outputs_of_rework_runs_are_reworked() {
        let edges = vec![
            edge("rm", "pb-1", EdgeLabel::Input),
            edge("pb-1", "fp-1", EdgeLabel::Output),
            edge("fp-1", "pb-2", EdgeLabel::ReworkInput),
            edge("pb-2", "fp-2", EdgeLabel::Output),
            edge("pb-0", "fp-0", EdgeLabel::ReworkOutput),
        ];
        let reworked = reworked_nodes(&edges);
        assert_eq!(reworked, HashSet::from(["fp-2", "fp-0"]));
    }

    fn recall_at(status: RecallStatus, initiated_at: DateTime<Utc>, fsa: bool) -> recall::Model {
        recall::Model {
            id: Uuid::new_v4(),
            recall_code: "REC-001".into(),
            recall_type: RecallType::Recall.as_str().into(),
            severity: Severity::Class2.as_str().into(),
            status: status.as_str().into(),
            reason: "Undeclared milk".into(),
            root_cause: None,
            corrective_actions: None,
            initiated_at,
            resolved_at: None,
            closed_at: None,
            fsa_notified: fsa,
            fsa_notified_at: None,
            fsa_reference: None,
            local_authority_notified: false,
            local_authority_notified_at: None,
            local_authority_reference: None,
            created_at: initiated_at,
            updated_at: initiated_at,
        }
    }

    #[test]
    fn overdue_after_sla_without_fsa_notice() {
        let now = Utc::now();
        let sla = Duration::days(3);
        let old = now - Duration::days(4);

        assert!(is_notification_overdue(
            &recall_at(RecallStatus::Active, old, false),
            now,
            sla
        ));
        assert!(!is_notification_overdue(
            &recall_at(RecallStatus::Active, old, true),
            now,
            sla
        ));
        assert!(!is_notification_overdue(
            &recall_at(RecallStatus::Draft, old, false),
            now,
            sla
        ));
        assert!(!is_notification_overdue(
            &recall_at(RecallStatus::Active, now - Duration::days(2), false),
            now,
            sla
        ));
    }
}
