mod common;

use assert_matches::assert_matches;
use batchtrace::{
    entities::{
        recall::{self, RecallStatus, RecallType, Severity},
        recall_affected_batch::{ActionTaken, BatchType},
    },
    errors::ServiceError,
    services::{
        batch_state::MovementReference,
        lineage_resolver::Direction,
        recalls::{CreateRecallInput, Regulator},
        unit_conversion::Unit,
    },
};
use chrono::{Duration, Utc};
use common::{seed_bakery, TestDb};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};
use uuid::Uuid;

async fn recall_in(t: &TestDb, code: &str, status: Option<RecallStatus>) -> recall::Model {
    let created = t
        .services
        .recalls
        .create_recall(CreateRecallInput {
            recall_code: code.to_string(),
            recall_type: RecallType::Recall,
            severity: Severity::Class2,
            reason: "Metal fragments".to_string(),
        })
        .await
        .expect("create recall");
    match status {
        Some(s) => t
            .services
            .recalls
            .transition(created.id, s)
            .await
            .expect("transition"),
        None => created,
    }
}

#[tokio::test]
async fn balance_tracks_unaccounted_quantity() {
    let t = TestDb::new().await;
    let chain = seed_bakery(&t).await;
    let recall = recall_in(&t, "REC-100", Some(RecallStatus::Active)).await;
    let recalls = &t.services.recalls;

    let finished = recalls
        .register_affected_batch(recall.id, chain.finished.id, BatchType::FinishedProduct, dec!(10))
        .await
        .unwrap();
    let raw = recalls
        .register_affected_batch(recall.id, chain.raw.id, BatchType::RawMaterial, dec!(5))
        .await
        .unwrap();

    let before = t
        .services
        .reconciliation
        .recall_balance(recall.id)
        .await
        .unwrap();
    assert_eq!(before.total_affected, dec!(15));
    assert_eq!(before.total_recovered, Decimal::ZERO);
    assert_eq!(before.unaccounted, dec!(15));

    recalls
        .record_disposition(finished.affected.id, ActionTaken::Destroyed, Some(dec!(4)))
        .await
        .unwrap();
    recalls
        .record_disposition(raw.affected.id, ActionTaken::Returned, Some(dec!(5)))
        .await
        .unwrap();

    let after = t
        .services
        .reconciliation
        .recall_balance(recall.id)
        .await
        .unwrap();
    assert_eq!(after.total_affected, dec!(15));
    assert_eq!(after.total_recovered, dec!(9));
    assert_eq!(after.unaccounted, dec!(6));
    assert!(!after.negative_balance);
}

#[tokio::test]
async fn balance_of_unknown_recall_is_not_found() {
    let t = TestDb::new().await;
    assert_matches!(
        t.services
            .reconciliation
            .recall_balance(Uuid::new_v4())
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn report_collects_batches_allergens_and_timeline() {
    let t = TestDb::new().await;
    let chain = seed_bakery(&t).await;
    let seeds = t
        .receive(chain.supplier.id, "RM-002", dec!(5), Unit::Kilogram, &["Sesame"])
        .await;
    let recall = recall_in(&t, "REC-101", Some(RecallStatus::Active)).await;
    let recalls = &t.services.recalls;

    recalls
        .register_affected_batch(recall.id, chain.finished.id, BatchType::FinishedProduct, dec!(45))
        .await
        .unwrap();
    recalls
        .register_affected_batch(recall.id, seeds.id, BatchType::RawMaterial, dec!(5))
        .await
        .unwrap();
    recalls
        .mark_regulator_notified(recall.id, Regulator::LocalAuthority, Some("LA-77".into()))
        .await
        .unwrap();

    let report = t
        .services
        .reconciliation
        .recall_report(recall.id)
        .await
        .unwrap();

    assert_eq!(report.recall.recall_code, "REC-101");
    assert_eq!(report.recall.status, "active");
    assert_eq!(report.allergens, vec!["gluten".to_string(), "sesame".to_string()]);

    let codes: Vec<_> = report
        .affected_batches
        .iter()
        .filter_map(|l| l.batch_code.clone())
        .collect();
    assert_eq!(codes.len(), 2);
    assert!(codes.contains(&"FP-001".to_string()));
    assert!(codes.contains(&"RM-002".to_string()));
    assert!(report
        .affected_batches
        .iter()
        .all(|l| l.batch_status.as_deref() == Some("quarantined")));

    assert_eq!(report.balance.total_affected, dec!(50));
    assert!(report.timeline.local_authority_notified_at.is_some());
    assert!(report.timeline.fsa_notified_at.is_none());
    assert!(report.recall.local_authority_notified);
    assert!(!report.notification_overdue);
}

#[tokio::test]
async fn readiness_counts_and_flags_overdue_recalls() {
    let t = TestDb::new().await;
    let chain = seed_bakery(&t).await;

    recall_in(&t, "REC-200", None).await;
    let stale = recall_in(&t, "REC-201", Some(RecallStatus::Active)).await;
    let mut backdated = stale.clone().into_active_model();
    backdated.initiated_at = Set(Utc::now() - Duration::days(10));
    backdated.update(t.db.as_ref()).await.unwrap();

    // Depleted batches stay pending after registration
    t.services
        .batches
        .consume(chain.raw.id, dec!(2), Unit::Kilogram, MovementReference::default())
        .await
        .unwrap();
    t.services
        .recalls
        .register_affected_batch(stale.id, chain.raw.id, BatchType::RawMaterial, dec!(50))
        .await
        .unwrap();

    let summary = t
        .services
        .reconciliation
        .readiness_summary()
        .await
        .unwrap();

    assert_eq!(summary.recalls_by_status.get("draft"), Some(&1));
    assert_eq!(summary.recalls_by_status.get("active"), Some(&1));
    assert_eq!(summary.open_recalls, 2);
    assert_eq!(summary.overdue_recalls, vec!["REC-201".to_string()]);
    assert_eq!(summary.pending_affected_batches, 1);
    assert_eq!(summary.batches_by_status.get("depleted"), Some(&1));
    assert_eq!(summary.batches_by_status.get("active"), Some(&1));
    assert_eq!(summary.suppliers_by_approval.get("approved"), Some(&1));

    // Telling the regulator clears the overdue flag
    t.services
        .recalls
        .mark_regulator_notified(stale.id, Regulator::FoodStandardsAgency, None)
        .await
        .unwrap();
    let summary = t
        .services
        .reconciliation
        .readiness_summary()
        .await
        .unwrap();
    assert!(summary.overdue_recalls.is_empty());
}

#[tokio::test]
async fn mass_balance_follows_start_batch_unit() {
    let t = TestDb::new().await;
    let supplier = t.supplier("SugarCo").await;
    let sugar = t
        .receive(supplier.id, "RM-300", dec!(1), Unit::Kilogram, &[])
        .await;
    let run = t.start_run("PB-300").await;
    t.feed(run.id, sugar.id, dec!(100), Unit::Gram).await;
    let syrup = t.output(run.id, "FP-300", dec!(95), Unit::Gram).await;

    let trace = t
        .services
        .traceability
        .trace(syrup.id, Direction::Backward)
        .await
        .unwrap();
    let balance = trace.mass_balance.expect("mass balance");
    assert_eq!(balance.unit, "g");
    assert_eq!(balance.total_input, dec!(100));
    assert_eq!(balance.total_output, dec!(95));
    assert_eq!(balance.variance, dec!(5));
    assert_eq!(balance.variance_percent, dec!(5));
}
