use chrono::{DateTime, Utc};
use metrics::gauge;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    config::RecallConfig,
    entities::{
        recall::{self, RecallStatus},
        recall_affected_batch::{self, ActionTaken},
        recall_notification, stock_batch, supplier,
    },
    errors::ServiceError,
    services::recalls::is_notification_overdue,
};

/// Input versus output across the production boundaries of a trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MassBalance {
    pub total_input: Decimal,
    pub total_output: Decimal,
    pub variance: Decimal,
    pub variance_percent: Decimal,
    pub unit: String,
}

impl MassBalance {
    /// `None` when no input was seen, since a percentage is meaningless then.
    pub fn from_totals(total_input: Decimal, total_output: Decimal, unit: &str) -> Option<Self> {
        if total_input.is_zero() {
            return None;
        }
        let variance = total_input - total_output;
        let variance_percent = (variance / total_input * Decimal::ONE_HUNDRED).round_dp(2);
        Some(Self {
            total_input: total_input.normalize(),
            total_output: total_output.normalize(),
            variance: variance.normalize(),
            variance_percent: variance_percent.normalize(),
            unit: unit.to_string(),
        })
    }
}

/// How much of the affected stock has been brought back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecallBalance {
    pub total_affected: Decimal,
    pub total_recovered: Decimal,
    pub unaccounted: Decimal,
    /// Recovered exceeds affected; reported, never raised
    pub negative_balance: bool,
}

impl RecallBalance {
    pub fn from_records(records: &[recall_affected_batch::Model]) -> Self {
        let total_affected: Decimal = records.iter().map(|r| r.quantity_affected).sum();
        let total_recovered: Decimal = records.iter().map(|r| r.quantity_recovered).sum();
        let diff = total_affected - total_recovered;
        Self {
            total_affected,
            total_recovered,
            unaccounted: diff.max(Decimal::ZERO),
            negative_balance: diff < Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecallHeader {
    pub id: Uuid,
    pub recall_code: String,
    pub recall_type: String,
    pub severity: String,
    pub status: String,
    pub reason: String,
    pub root_cause: Option<String>,
    pub corrective_actions: Option<String>,
    pub fsa_notified: bool,
    pub fsa_reference: Option<String>,
    pub local_authority_notified: bool,
    pub local_authority_reference: Option<String>,
}

impl From<&recall::Model> for RecallHeader {
    fn from(r: &recall::Model) -> Self {
        Self {
            id: r.id,
            recall_code: r.recall_code.clone(),
            recall_type: r.recall_type.clone(),
            severity: r.severity.clone(),
            status: r.status.clone(),
            reason: r.reason.clone(),
            root_cause: r.root_cause.clone(),
            corrective_actions: r.corrective_actions.clone(),
            fsa_notified: r.fsa_notified,
            fsa_reference: r.fsa_reference.clone(),
            local_authority_notified: r.local_authority_notified,
            local_authority_reference: r.local_authority_reference.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AffectedBatchLine {
    pub id: Uuid,
    pub stock_batch_id: Uuid,
    pub batch_code: Option<String>,
    pub batch_type: String,
    pub batch_status: Option<String>,
    pub unit: Option<String>,
    pub quantity_affected: Decimal,
    pub quantity_recovered: Decimal,
    pub action_taken: String,
    pub allergens: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationLine {
    pub id: Uuid,
    pub customer_name: String,
    pub method: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub notified_at: Option<DateTime<Utc>>,
    pub response_received: bool,
    pub response_notes: Option<String>,
}

impl From<&recall_notification::Model> for NotificationLine {
    fn from(n: &recall_notification::Model) -> Self {
        Self {
            id: n.id,
            customer_name: n.customer_name.clone(),
            method: n.notification_method.clone(),
            contact_email: n.contact_email.clone(),
            contact_phone: n.contact_phone.clone(),
            notified_at: n.notified_at,
            response_received: n.response_received,
            response_notes: n.response_notes.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecallTimeline {
    pub initiated_at: DateTime<Utc>,
    pub fsa_notified_at: Option<DateTime<Utc>>,
    pub local_authority_notified_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Everything a printed recall document needs
#[derive(Debug, Clone, Serialize)]
pub struct RecallReport {
    pub recall: RecallHeader,
    pub affected_batches: Vec<AffectedBatchLine>,
    pub notifications: Vec<NotificationLine>,
    pub allergens: Vec<String>,
    pub balance: RecallBalance,
    pub timeline: RecallTimeline,
    pub notification_overdue: bool,
    pub generated_at: DateTime<Utc>,
}

/// Site-wide recall readiness figures
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReadinessSummary {
    pub recalls_by_status: BTreeMap<String, u64>,
    pub batches_by_status: BTreeMap<String, u64>,
    pub suppliers_by_approval: BTreeMap<String, u64>,
    pub open_recalls: u64,
    pub overdue_recalls: Vec<String>,
    pub pending_affected_batches: u64,
}

/// Read-only recall figures and reports
#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DatabaseConnection>,
    config: RecallConfig,
}

impl ReconciliationService {
    pub fn new(db: Arc<DatabaseConnection>, config: RecallConfig) -> Self {
        Self { db, config }
    }

    async fn load_recall(&self, recall_id: Uuid) -> Result<recall::Model, ServiceError> {
        recall::Entity::find_by_id(recall_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Recall {} not found", recall_id)))
    }

    async fn affected_records(
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

    #[instrument(skip(self))]
    pub async fn recall_balance(&self, recall_id: Uuid) -> Result<RecallBalance, ServiceError> {
        self.load_recall(recall_id).await?;
        let records = self.affected_records(recall_id).await?;
        let balance = RecallBalance::from_records(&records);
        if balance.negative_balance {
            warn!(
                recall_id = %recall_id,
                affected = %balance.total_affected,
                recovered = %balance.total_recovered,
                "Recovered quantity exceeds affected quantity"
            );
        }
        Ok(balance)
    }

    /// Assembles the recall document payload
    #[instrument(skip(self))]
    pub async fn recall_report(&self, recall_id: Uuid) -> Result<RecallReport, ServiceError> {
        let recall = self.load_recall(recall_id).await?;
        let records = self.affected_records(recall_id).await?;

        let batch_ids: Vec<Uuid> = records.iter().map(|r| r.stock_batch_id).collect();
        let batches: HashMap<Uuid, stock_batch::Model> = if batch_ids.is_empty() {
            HashMap::new()
        } else {
            stock_batch::Entity::find()
                .filter(stock_batch::Column::Id.is_in(batch_ids))
                .all(self.db.as_ref())
                .await
                .map_err(ServiceError::db_error)?
                .into_iter()
                .map(|b| (b.id, b))
                .collect()
        };

        let mut allergens = BTreeSet::new();
        let affected_batches = records
            .iter()
            .map(|r| {
                let batch = batches.get(&r.stock_batch_id);
                let batch_allergens = batch.map(|b| b.allergen_list()).unwrap_or_default();
                allergens.extend(batch_allergens.iter().cloned());
                AffectedBatchLine {
                    id: r.id,
                    stock_batch_id: r.stock_batch_id,
                    batch_code: batch.map(|b| b.batch_code.clone()),
                    batch_type: r.batch_type.clone(),
                    batch_status: batch.map(|b| b.status.clone()),
                    unit: batch.map(|b| b.unit.clone()),
                    quantity_affected: r.quantity_affected,
                    quantity_recovered: r.quantity_recovered,
                    action_taken: r.action_taken.clone(),
                    allergens: batch_allergens,
                }
            })
            .collect();

        let notifications = recall_notification::Entity::find()
            .filter(recall_notification::Column::RecallId.eq(recall_id))
            .order_by_asc(recall_notification::Column::CreatedAt)
            .order_by_asc(recall_notification::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        let now = Utc::now();
        Ok(RecallReport {
            recall: RecallHeader::from(&recall),
            affected_batches,
            notifications: notifications.iter().map(NotificationLine::from).collect(),
            allergens: allergens.into_iter().collect(),
            balance: RecallBalance::from_records(&records),
            timeline: RecallTimeline {
                initiated_at: recall.initiated_at,
                fsa_notified_at: recall.fsa_notified_at,
                local_authority_notified_at: recall.local_authority_notified_at,
                resolved_at: recall.resolved_at,
                closed_at: recall.closed_at,
            },
            notification_overdue: is_notification_overdue(
                &recall,
                now,
                self.config.notification_sla(),
            ),
            generated_at: now,
        })
    }

    async fn count_by<E, C>(&self, column: C) -> Result<BTreeMap<String, u64>, ServiceError>
    where
        E: EntityTrait,
        C: ColumnTrait + Copy,
    {
        let rows: Vec<(String, i64)> = E::find()
            .select_only()
            .column(column)
            .column_as(column.count(), "count")
            .group_by(column)
            .into_tuple()
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        Ok(rows
            .into_iter()
            .map(|(key, count)| (key, count.max(0) as u64))
            .collect())
    }

    /// Grouped counts across recalls, batches and suppliers
    #[instrument(skip(self))]
    pub async fn readiness_summary(&self) -> Result<ReadinessSummary, ServiceError> {
        let recalls_by_status = self
            .count_by::<recall::Entity, _>(recall::Column::Status)
            .await?;
        let batches_by_status = self
            .count_by::<stock_batch::Entity, _>(stock_batch::Column::Status)
            .await?;
        let suppliers_by_approval = self
            .count_by::<supplier::Entity, _>(supplier::Column::ApprovalStatus)
            .await?;

        let open_recalls: u64 = RecallStatus::ALL
            .iter()
            .filter(|s| s.is_open())
            .filter_map(|s| recalls_by_status.get(s.as_str()))
            .sum();

        let candidates = recall::Entity::find()
            .filter(recall::Column::FsaNotified.eq(false))
            .filter(recall::Column::Status.ne(RecallStatus::Draft.as_str()))
            .order_by_asc(recall::Column::InitiatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        let now = Utc::now();
        let sla = self.config.notification_sla();
        let overdue_recalls: Vec<String> = candidates
            .iter()
            .filter(|r| is_notification_overdue(r, now, sla))
            .map(|r| r.recall_code.clone())
            .collect();

        let pending_affected_batches = recall_affected_batch::Entity::find()
            .filter(recall_affected_batch::Column::ActionTaken.eq(ActionTaken::Pending.as_str()))
            .count(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        gauge!("batchtrace.recalls.open", open_recalls as f64);
        gauge!("batchtrace.recalls.overdue", overdue_recalls.len() as f64);

        Ok(ReadinessSummary {
            recalls_by_status,
            batches_by_status,
            suppliers_by_approval,
            open_recalls,
            overdue_recalls,
            pending_affected_batches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(affected: Decimal, recovered: Decimal) -> recall_affected_batch::Model {
        let now = Utc::now();
        recall_affected_batch::Model {
            id: Uuid::new_v4(),
            recall_id: Uuid::nil(),
            stock_batch_id: Uuid::new_v4(),
            batch_type: "finished_product".into(),
            quantity_affected: affected,
            quantity_recovered: recovered,
            action_taken: "quarantined".into(),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn mass_balance_reports_loss() {
        let mb = MassBalance::from_totals(dec!(100), dec!(95), "g").unwrap();
        assert_eq!(mb.variance, dec!(5));
        assert_eq!(mb.variance_percent, dec!(5));
        assert_eq!(mb.unit, "g");
    }

    #[test]
    fn mass_balance_omitted_without_input() {
        assert!(MassBalance::from_totals(Decimal::ZERO, dec!(10), "kg").is_none());
    }

    #[test]
    fn mass_balance_rounds_percent() {
        let mb = MassBalance::from_totals(dec!(3), dec!(2), "kg").unwrap();
        assert_eq!(mb.variance_percent, dec!(33.33));
    }

    #[test]
    fn recall_balance_clamps_unaccounted() {
        let balance =
            RecallBalance::from_records(&[record(dec!(10), dec!(4)), record(dec!(5), dec!(5))]);
        assert_eq!(balance.total_affected, dec!(15));
        assert_eq!(balance.total_recovered, dec!(9));
        assert_eq!(balance.unaccounted, dec!(6));
        assert!(!balance.negative_balance);

        let over = RecallBalance::from_records(&[record(dec!(2), dec!(3))]);
        assert_eq!(over.unaccounted, Decimal::ZERO);
        assert!(over.negative_balance);
    }

    #[test]
    fn empty_recall_balances_to_zero() {
        let balance = RecallBalance::from_records(&[]);
        assert_eq!(balance.total_affected, Decimal::ZERO);
        assert!(!balance.negative_balance);
    }
}
