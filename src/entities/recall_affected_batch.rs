use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchType {
    RawMaterial,
    FinishedProduct,
    Rework,
}

impl BatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchType::RawMaterial => "raw_material",
            BatchType::FinishedProduct => "finished_product",
            BatchType::Rework => "rework",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "raw_material" => Some(BatchType::RawMaterial),
            "finished_product" => Some(BatchType::FinishedProduct),
            "rework" => Some(BatchType::Rework),
            _ => None,
        }
    }
}

/// What has been done with an affected batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    Pending,
    Quarantined,
    Destroyed,
    Returned,
    Released,
}

impl ActionTaken {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionTaken::Pending => "pending",
            ActionTaken::Quarantined => "quarantined",
            ActionTaken::Destroyed => "destroyed",
            ActionTaken::Returned => "returned",
            ActionTaken::Released => "released",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ActionTaken::Pending),
            "quarantined" => Some(ActionTaken::Quarantined),
            "destroyed" => Some(ActionTaken::Destroyed),
            "returned" => Some(ActionTaken::Returned),
            "released" => Some(ActionTaken::Released),
            _ => None,
        }
    }

    /// Destroyed, returned and released are final dispositions
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            ActionTaken::Destroyed | ActionTaken::Returned | ActionTaken::Released
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "recall_affected_batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub recall_id: Uuid,
    pub stock_batch_id: Uuid,
    pub batch_type: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub quantity_affected: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub quantity_recovered: Decimal,
    pub action_taken: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::recall::Entity",
        from = "Column::RecallId",
        to = "super::recall::Column::Id"
    )]
    Recall,
}

impl Related<super::recall::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Recall.def()
    }
}

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
        }

        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}

impl Model {
    pub fn action(&self) -> Option<ActionTaken> {
        ActionTaken::from_str(&self.action_taken)
    }
}
