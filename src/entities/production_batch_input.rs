use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A stock batch drawn into a production run
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "production_batch_inputs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub production_batch_id: Uuid,
    pub stock_batch_id: Uuid,
    pub stock_item_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub planned_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub actual_quantity: Option<Decimal>,
    pub unit: String,
    pub is_rework: bool,
    pub rework_source_batch_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::production_batch::Entity",
        from = "Column::ProductionBatchId",
        to = "super::production_batch::Column::Id"
    )]
    ProductionBatch,
}

impl Related<super::production_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductionBatch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Quantity that actually went in, falling back to the plan
    pub fn effective_quantity(&self) -> Decimal {
        self.actual_quantity.unwrap_or(self.planned_quantity)
    }

    /// Earlier batch a rework input was made from, when it is not the
    /// consumed batch itself
    pub fn rework_source(&self) -> Option<Uuid> {
        self.rework_source_batch_id
            .filter(|source| self.is_rework && *source != self.stock_batch_id)
    }
}
