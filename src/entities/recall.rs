use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallType {
    Recall,
    Withdrawal,
}

impl RecallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecallType::Recall => "recall",
            RecallType::Withdrawal => "withdrawal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "recall" => Some(RecallType::Recall),
            "withdrawal" => Some(RecallType::Withdrawal),
            _ => None,
        }
    }
}

/// Health-risk class. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "class_1")]
    Class1,
    #[serde(rename = "class_2")]
    Class2,
    #[serde(rename = "class_3")]
    Class3,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Class1 => "class_1",
            Severity::Class2 => "class_2",
            Severity::Class3 => "class_3",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "class_1" => Some(Severity::Class1),
            "class_2" => Some(Severity::Class2),
            "class_3" => Some(Severity::Class3),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallStatus {
    Draft,
    Active,
    Investigating,
    Notified,
    Resolved,
    Closed,
}

impl RecallStatus {
    pub const ALL: [RecallStatus; 6] = [
        RecallStatus::Draft,
        RecallStatus::Active,
        RecallStatus::Investigating,
        RecallStatus::Notified,
        RecallStatus::Resolved,
        RecallStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecallStatus::Draft => "draft",
            RecallStatus::Active => "active",
            RecallStatus::Investigating => "investigating",
            RecallStatus::Notified => "notified",
            RecallStatus::Resolved => "resolved",
            RecallStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(RecallStatus::Draft),
            "active" => Some(RecallStatus::Active),
            "investigating" => Some(RecallStatus::Investigating),
            "notified" => Some(RecallStatus::Notified),
            "resolved" => Some(RecallStatus::Resolved),
            "closed" => Some(RecallStatus::Closed),
            _ => None,
        }
    }

    pub fn allowed_transitions(&self) -> &'static [RecallStatus] {
        match self {
            RecallStatus::Draft => &[RecallStatus::Active],
            RecallStatus::Active => &[RecallStatus::Investigating, RecallStatus::Closed],
            RecallStatus::Investigating => &[RecallStatus::Notified, RecallStatus::Closed],
            RecallStatus::Notified => &[RecallStatus::Resolved],
            RecallStatus::Resolved => &[RecallStatus::Closed],
            RecallStatus::Closed => &[],
        }
    }

    pub fn can_transition_to(&self, next: RecallStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Affected batches may still be registered
    pub fn accepts_new_batches(&self) -> bool {
        !matches!(self, RecallStatus::Resolved | RecallStatus::Closed)
    }

    /// Child records become permanent once customers have been told
    pub fn allows_batch_removal(&self) -> bool {
        matches!(
            self,
            RecallStatus::Draft | RecallStatus::Active | RecallStatus::Investigating
        )
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, RecallStatus::Resolved | RecallStatus::Closed)
    }
}

impl std::fmt::Display for RecallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "recalls")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub recall_code: String,
    pub recall_type: String,
    pub severity: String,
    pub status: String,
    pub reason: String,
    pub root_cause: Option<String>,
    pub corrective_actions: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub fsa_notified: bool,
    pub fsa_notified_at: Option<DateTime<Utc>>,
    pub fsa_reference: Option<String>,
    pub local_authority_notified: bool,
    pub local_authority_notified_at: Option<DateTime<Utc>>,
    pub local_authority_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::recall_affected_batch::Entity")]
    AffectedBatches,
    #[sea_orm(has_many = "super::recall_notification::Entity")]
    Notifications,
}

impl Related<super::recall_affected_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AffectedBatches.def()
    }
}

impl Related<super::recall_notification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Notifications.def()
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
    pub fn recall_status(&self) -> Result<RecallStatus, ServiceError> {
        RecallStatus::from_str(&self.status).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Recall {} has unknown status '{}'",
                self.recall_code, self.status
            ))
        })
    }
}
