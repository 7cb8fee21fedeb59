use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of change recorded against a stock batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Consumption,
    Restoration,
    Quarantine,
    Release,
    Destruction,
    Return,
    Expiry,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Consumption => "consumption",
            MovementType::Restoration => "restoration",
            MovementType::Quarantine => "quarantine",
            MovementType::Release => "release",
            MovementType::Destruction => "destruction",
            MovementType::Return => "return",
            MovementType::Expiry => "expiry",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "consumption" => Some(MovementType::Consumption),
            "restoration" => Some(MovementType::Restoration),
            "quarantine" => Some(MovementType::Quarantine),
            "release" => Some(MovementType::Release),
            "destruction" => Some(MovementType::Destruction),
            "return" => Some(MovementType::Return),
            "expiry" => Some(MovementType::Expiry),
            _ => None,
        }
    }
}

/// Audit row written alongside every batch state change
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub stock_batch_id: Uuid,
    pub movement_type: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub quantity: Decimal,
    pub unit: String,
    pub reason: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
