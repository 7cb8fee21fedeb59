use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// Lifecycle state of a stock batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Active,
    Depleted,
    Quarantined,
    Expired,
    Destroyed,
    Returned,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Active => "active",
            BatchStatus::Depleted => "depleted",
            BatchStatus::Quarantined => "quarantined",
            BatchStatus::Expired => "expired",
            BatchStatus::Destroyed => "destroyed",
            BatchStatus::Returned => "returned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BatchStatus::Active),
            "depleted" => Some(BatchStatus::Depleted),
            "quarantined" => Some(BatchStatus::Quarantined),
            "expired" => Some(BatchStatus::Expired),
            "destroyed" => Some(BatchStatus::Destroyed),
            "returned" => Some(BatchStatus::Returned),
            _ => None,
        }
    }

    /// Legal moves of the batch state machine.
    ///
    /// `Depleted -> Active` only happens through a consumption restore.
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, next),
            (Active, Depleted)
                | (Active, Quarantined)
                | (Active, Expired)
                | (Quarantined, Destroyed)
                | (Quarantined, Depleted)
                | (Quarantined, Returned)
                | (Quarantined, Active)
                | (Depleted, Active)
        )
    }

    /// Stock that has left the site for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Destroyed | BatchStatus::Returned)
    }

    /// Stock in these states may be drawn down by production
    pub fn is_consumable(&self) -> bool {
        matches!(self, BatchStatus::Active)
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a batch came from. Exactly one source per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Provenance {
    /// Received from a supplier on a delivery line
    Delivered(Uuid),
    /// Output of a production run
    Produced(Uuid),
}

impl Provenance {
    pub fn from_columns(
        delivery_line_id: Option<Uuid>,
        production_batch_id: Option<Uuid>,
    ) -> Result<Self, ServiceError> {
        match (delivery_line_id, production_batch_id) {
            (Some(line), None) => Ok(Provenance::Delivered(line)),
            (None, Some(pb)) => Ok(Provenance::Produced(pb)),
            (Some(_), Some(_)) => Err(ServiceError::ValidationError(
                "Stock batch cannot be both delivered and produced".to_string(),
            )),
            (None, None) => Err(ServiceError::ValidationError(
                "Stock batch must have a delivery line or a production batch".to_string(),
            )),
        }
    }

    /// Splits back into `(delivery_line_id, production_batch_id)`
    pub fn into_columns(self) -> (Option<Uuid>, Option<Uuid>) {
        match self {
            Provenance::Delivered(line) => (Some(line), None),
            Provenance::Produced(pb) => (None, Some(pb)),
        }
    }

    pub fn is_produced(&self) -> bool {
        matches!(self, Provenance::Produced(_))
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub batch_code: String,
    pub stock_item_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub quantity_received: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub quantity_remaining: Decimal,
    pub unit: String,
    pub status: String,
    pub use_by_date: Option<NaiveDate>,
    pub best_before_date: Option<NaiveDate>,
    #[sea_orm(column_type = "Json")]
    pub allergens: Json,
    pub delivery_line_id: Option<Uuid>,
    pub production_batch_id: Option<Uuid>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            active_model.created_at = Set(now);
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.version {
                active_model.version = Set(1);
            }
        }

        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}

impl Model {
    pub fn batch_status(&self) -> Result<BatchStatus, ServiceError> {
        BatchStatus::from_str(&self.status).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Stock batch {} has unknown status '{}'",
                self.batch_code, self.status
            ))
        })
    }

    pub fn provenance(&self) -> Result<Provenance, ServiceError> {
        Provenance::from_columns(self.delivery_line_id, self.production_batch_id)
    }

    /// Allergen declarations, tolerating malformed JSON as "none declared"
    pub fn allergen_list(&self) -> Vec<String> {
        allergens_from_json(&self.allergens)
    }
}

pub fn allergens_from_json(value: &Json) -> Vec<String> {
    match value {
        Json::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

pub fn allergens_to_json<I, S>(allergens: I) -> Json
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Json::Array(
        allergens
            .into_iter()
            .map(|a| Json::String(a.into()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provenance_requires_exactly_one_source() {
        let id = Uuid::new_v4();
        assert_eq!(
            Provenance::from_columns(Some(id), None).unwrap(),
            Provenance::Delivered(id)
        );
        assert_eq!(
            Provenance::from_columns(None, Some(id)).unwrap(),
            Provenance::Produced(id)
        );
        assert!(Provenance::from_columns(Some(id), Some(id)).is_err());
        assert!(Provenance::from_columns(None, None).is_err());
    }

    #[test]
    fn quarantine_only_from_active() {
        assert!(BatchStatus::Active.can_transition_to(BatchStatus::Quarantined));
        assert!(!BatchStatus::Depleted.can_transition_to(BatchStatus::Quarantined));
        assert!(!BatchStatus::Destroyed.can_transition_to(BatchStatus::Active));
        assert!(!BatchStatus::Expired.can_transition_to(BatchStatus::Active));
        assert!(!BatchStatus::Returned.can_transition_to(BatchStatus::Active));
    }

    #[test]
    fn allergens_round_trip_through_json() {
        let json = allergens_to_json(["milk", "gluten"]);
        assert_eq!(allergens_from_json(&json), vec!["milk", "gluten"]);
        assert!(allergens_from_json(&Json::Null).is_empty());
    }
}
