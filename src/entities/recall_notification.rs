use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationMethod {
    Email,
    Phone,
    Letter,
    InPerson,
    Other,
}

impl NotificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationMethod::Email => "email",
            NotificationMethod::Phone => "phone",
            NotificationMethod::Letter => "letter",
            NotificationMethod::InPerson => "in_person",
            NotificationMethod::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "email" => Some(NotificationMethod::Email),
            "phone" => Some(NotificationMethod::Phone),
            "letter" => Some(NotificationMethod::Letter),
            "in_person" => Some(NotificationMethod::InPerson),
            "other" => Some(NotificationMethod::Other),
            _ => None,
        }
    }
}

/// Customer contact made for a recall. Append-only.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "recall_notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub recall_id: Uuid,
    pub customer_name: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub notification_method: String,
    pub notified_at: Option<DateTime<Utc>>,
    pub response_received: bool,
    pub response_notes: Option<String>,
    pub created_at: DateTime<Utc>,
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

impl ActiveModelBehavior for ActiveModel {}
