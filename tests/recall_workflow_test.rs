mod common;

use assert_matches::assert_matches;
use batchtrace::{
    entities::{
        recall::{self, RecallStatus, RecallType, Severity},
        recall_affected_batch::{ActionTaken, BatchType},
        recall_notification::NotificationMethod,
        stock_batch::BatchStatus,
    },
    errors::ServiceError,
    services::{
        batch_state::MovementReference,
        production::{AddInputRequest, RecordOutputRequest},
        recalls::{CreateRecallInput, NewNotification, RecallDetailsUpdate, Regulator},
        unit_conversion::Unit,
    },
};
use common::{seed_bakery, TestDb};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn open_recall(t: &TestDb, code: &str) -> recall::Model {
    let recall = t
        .services
        .recalls
        .create_recall(CreateRecallInput {
            recall_code: code.to_string(),
            recall_type: RecallType::Recall,
            severity: Severity::Class1,
            reason: "Undeclared sesame".to_string(),
        })
        .await
        .expect("create recall");
    t.services
        .recalls
        .transition(recall.id, RecallStatus::Active)
        .await
        .expect("activate recall")
}

fn notice(name: &str) -> NewNotification {
    NewNotification {
        customer_name: name.to_string(),
        method: NotificationMethod::Email,
        contact_email: Some("buyer@cafex.test".to_string()),
        contact_phone: None,
    }
}

#[tokio::test]
async fn registering_a_batch_quarantines_it() {
    let t = TestDb::new().await;
    let chain = seed_bakery(&t).await;
    let recall = open_recall(&t, "rec-001").await;
    assert_eq!(recall.recall_code, "REC-001");

    let outcome = t
        .services
        .recalls
        .register_affected_batch(recall.id, chain.finished.id, BatchType::FinishedProduct, dec!(45))
        .await
        .expect("register");

    assert!(outcome.discrepancy.is_none());
    assert!(outcome.newly_quarantined);
    assert_eq!(outcome.affected.action(), Some(ActionTaken::Quarantined));
    assert_eq!(outcome.batch.batch_status().unwrap(), BatchStatus::Quarantined);

    let batch = t.services.batches.get_batch(chain.finished.id).await.unwrap();
    assert_eq!(batch.batch_status().unwrap(), BatchStatus::Quarantined);

    assert_matches!(
        t.services
            .recalls
            .register_affected_batch(recall.id, chain.finished.id, BatchType::FinishedProduct, dec!(45))
            .await,
        Err(ServiceError::DuplicateBatch { .. })
    );
}

#[tokio::test]
async fn depleted_batch_is_registered_with_discrepancy() {
    let t = TestDb::new().await;
    let chain = seed_bakery(&t).await;
    t.services
        .batches
        .consume(chain.raw.id, dec!(2), Unit::Kilogram, MovementReference::default())
        .await
        .expect("use up remaining flour");

    let recall = open_recall(&t, "REC-002").await;
    let outcome = t
        .services
        .recalls
        .register_affected_batch(recall.id, chain.raw.id, BatchType::RawMaterial, dec!(50))
        .await
        .expect("register");

    let discrepancy = outcome.discrepancy.expect("discrepancy");
    assert_eq!(discrepancy.batch_code, "RM-001");
    assert_eq!(discrepancy.batch_status, BatchStatus::Depleted);
    assert_eq!(outcome.affected.action(), Some(ActionTaken::Pending));
}

#[tokio::test]
async fn concurrent_registration_admits_one() {
    let t = TestDb::new().await;
    let chain = seed_bakery(&t).await;
    let recall = open_recall(&t, "REC-003").await;

    let mut tasks = vec![];
    for _ in 0..5 {
        let svc = t.services.recalls.clone();
        let (recall_id, batch_id) = (recall.id, chain.finished.id);
        tasks.push(tokio::spawn(async move {
            svc.register_affected_batch(recall_id, batch_id, BatchType::FinishedProduct, dec!(45))
                .await
        }));
    }

    let mut admitted = 0;
    for task in tasks {
        match task.await.expect("task panicked") {
            Ok(_) => admitted += 1,
            Err(e) => assert_matches!(e, ServiceError::DuplicateBatch { .. }),
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(
        t.services.recalls.affected_batches(recall.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn downstream_registration_covers_forward_trace() {
    let t = TestDb::new().await;
    let chain = seed_bakery(&t).await;
    let recall = open_recall(&t, "REC-004").await;

    let registered = t
        .services
        .recalls
        .register_downstream_batches(recall.id, chain.raw.id)
        .await
        .expect("register downstream");
    assert_eq!(registered.len(), 2);

    let affected = t.services.recalls.affected_batches(recall.id).await.unwrap();
    let finished = affected
        .iter()
        .find(|a| a.stock_batch_id == chain.finished.id)
        .expect("finished product registered");
    assert_eq!(finished.batch_type, BatchType::FinishedProduct.as_str());
    assert_eq!(finished.quantity_affected, dec!(45));

    // A second sweep finds nothing new
    let again = t
        .services
        .recalls
        .register_downstream_batches(recall.id, chain.raw.id)
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn registering_a_product_leaves_its_ingredients_alone() {
    let t = TestDb::new().await;
    let chain = seed_bakery(&t).await;
    t.dispatch(chain.finished.id, chain.customer.id, dec!(35), Unit::Kilogram)
        .await;
    let recall = open_recall(&t, "REC-001").await;

    t.services
        .recalls
        .register_affected_batch(recall.id, chain.finished.id, BatchType::FinishedProduct, dec!(45))
        .await
        .expect("register");

    let raw = t.services.batches.get_batch(chain.raw.id).await.unwrap();
    assert_eq!(raw.batch_status().unwrap(), BatchStatus::Active);
    assert_eq!(raw.quantity_remaining, dec!(2));
    let finished = t.services.batches.get_batch(chain.finished.id).await.unwrap();
    assert_eq!(finished.batch_status().unwrap(), BatchStatus::Quarantined);
    assert_eq!(
        t.services.recalls.affected_batches(recall.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn downstream_registration_marks_reworked_batches() {
    let t = TestDb::new().await;
    let chain = seed_bakery(&t).await;
    let rework_run = t.start_run("PB-02").await;
    t.services
        .production
        .add_input(
            rework_run.id,
            AddInputRequest {
                stock_batch_id: chain.finished.id,
                planned_quantity: dec!(5),
                unit: Unit::Kilogram,
                is_rework: true,
                rework_source_batch_id: Some(chain.finished.id),
            },
        )
        .await
        .expect("rework input");
    let item = t.item("Bread pudding", Unit::Kilogram).await;
    let pudding = t
        .services
        .production
        .record_output(
            rework_run.id,
            RecordOutputRequest {
                batch_code: "FP-002".into(),
                stock_item_id: item.id,
                quantity: dec!(5),
                unit: Unit::Kilogram,
                use_by_date: None,
                best_before_date: None,
                allergens: vec![],
            },
        )
        .await
        .expect("rework output");
    let recall = open_recall(&t, "REC-005").await;

    let registered = t
        .services
        .recalls
        .register_downstream_batches(recall.id, chain.raw.id)
        .await
        .expect("register downstream");
    assert_eq!(registered.len(), 3);

    let affected = t.services.recalls.affected_batches(recall.id).await.unwrap();
    let type_of = |id| {
        affected
            .iter()
            .find(|a| a.stock_batch_id == id)
            .map(|a| a.batch_type.clone())
            .expect("registered")
    };
    assert_eq!(type_of(chain.raw.id), BatchType::RawMaterial.as_str());
    assert_eq!(type_of(chain.finished.id), BatchType::FinishedProduct.as_str());
    assert_eq!(type_of(pudding.id), BatchType::Rework.as_str());
}

#[tokio::test]
async fn closing_a_recall_drops_its_lock() {
    let t = TestDb::new().await;
    let recalls = &t.services.recalls;
    let recall = open_recall(&t, "REC-006").await;
    assert_eq!(recalls.tracked_locks(), 1);

    recalls
        .transition(recall.id, RecallStatus::Closed)
        .await
        .expect("close");
    assert_eq!(recalls.tracked_locks(), 0);
}

#[tokio::test]
async fn lifecycle_enforces_order_and_responses() {
    let t = TestDb::new().await;
    let recall = t
        .services
        .recalls
        .create_recall(CreateRecallInput {
            recall_code: "REC-005".into(),
            recall_type: RecallType::Withdrawal,
            severity: Severity::Class3,
            reason: "Label misprint".into(),
        })
        .await
        .unwrap();
    assert_eq!(recall.recall_status().unwrap(), RecallStatus::Draft);

    assert_matches!(
        t.services.recalls.transition(recall.id, RecallStatus::Closed).await,
        Err(ServiceError::InvalidTransition { .. })
    );

    let svc = &t.services.recalls;
    svc.transition(recall.id, RecallStatus::Active).await.unwrap();
    svc.transition(recall.id, RecallStatus::Investigating).await.unwrap();
    let n = svc.record_notification(recall.id, notice("CaféX")).await.unwrap();
    assert!(n.notified_at.is_some());
    assert!(!n.response_received);
    svc.transition(recall.id, RecallStatus::Notified).await.unwrap();

    assert_matches!(
        svc.transition(recall.id, RecallStatus::Resolved).await,
        Err(ServiceError::ValidationError(_))
    );

    svc.record_response(n.id, Some("Stock pulled".into())).await.unwrap();
    let resolved = svc.transition(recall.id, RecallStatus::Resolved).await.unwrap();
    assert!(resolved.resolved_at.is_some());

    let closed = svc.transition(recall.id, RecallStatus::Closed).await.unwrap();
    assert!(closed.closed_at.is_some());

    assert_matches!(
        svc.update_details(
            recall.id,
            RecallDetailsUpdate {
                root_cause: Some("Wrong label roll".into()),
                ..Default::default()
            }
        )
        .await,
        Err(ServiceError::InvalidTransition { .. })
    );
    assert_matches!(
        svc.record_notification(recall.id, notice("Late Deli")).await,
        Err(ServiceError::InvalidTransition { .. })
    );
}

#[tokio::test]
async fn resolved_recall_refuses_new_batches() {
    let mut config = batchtrace::config::AppConfig::new("sqlite::memory:".into(), "test".into());
    config.recall.require_responses_before_resolve = false;
    let t = TestDb::with_config(config).await;
    let chain = seed_bakery(&t).await;
    let recall = open_recall(&t, "REC-006").await;

    let svc = &t.services.recalls;
    svc.transition(recall.id, RecallStatus::Investigating).await.unwrap();
    svc.record_notification(recall.id, notice("CaféX")).await.unwrap();
    svc.transition(recall.id, RecallStatus::Notified).await.unwrap();
    svc.transition(recall.id, RecallStatus::Resolved).await.unwrap();

    assert_matches!(
        svc.register_affected_batch(recall.id, chain.finished.id, BatchType::FinishedProduct, dec!(1))
            .await,
        Err(ServiceError::InvalidTransition { .. })
    );
}

#[tokio::test]
async fn removal_keeps_quarantine_and_stops_after_notified() {
    let t = TestDb::new().await;
    let chain = seed_bakery(&t).await;
    let recall = open_recall(&t, "REC-007").await;
    let svc = &t.services.recalls;

    let first = svc
        .register_affected_batch(recall.id, chain.finished.id, BatchType::FinishedProduct, dec!(45))
        .await
        .unwrap();
    svc.remove_affected_batch(recall.id, first.affected.id)
        .await
        .unwrap();
    assert!(svc.affected_batches(recall.id).await.unwrap().is_empty());
    let batch = t.services.batches.get_batch(chain.finished.id).await.unwrap();
    assert_eq!(batch.batch_status().unwrap(), BatchStatus::Quarantined);

    let second = svc
        .register_affected_batch(recall.id, chain.raw.id, BatchType::RawMaterial, dec!(2))
        .await
        .unwrap();
    svc.transition(recall.id, RecallStatus::Investigating).await.unwrap();
    svc.transition(recall.id, RecallStatus::Notified).await.unwrap();
    assert_matches!(
        svc.remove_affected_batch(recall.id, second.affected.id).await,
        Err(ServiceError::InvalidTransition { .. })
    );
}

#[tokio::test]
async fn dispositions_drive_batch_state() {
    let t = TestDb::new().await;
    let chain = seed_bakery(&t).await;
    let recall = open_recall(&t, "REC-008").await;
    let svc = &t.services.recalls;

    let registered = svc
        .register_affected_batch(recall.id, chain.finished.id, BatchType::FinishedProduct, dec!(45))
        .await
        .unwrap();

    assert_matches!(
        svc.record_disposition(registered.affected.id, ActionTaken::Destroyed, Some(dec!(46)))
            .await,
        Err(ServiceError::NegativeBalance { .. })
    );
    assert_matches!(
        svc.record_disposition(registered.affected.id, ActionTaken::Quarantined, None)
            .await,
        Err(ServiceError::ValidationError(_))
    );

    let done = svc
        .record_disposition(registered.affected.id, ActionTaken::Destroyed, Some(dec!(40)))
        .await
        .unwrap();
    assert_eq!(done.action(), Some(ActionTaken::Destroyed));
    assert_eq!(done.quantity_recovered, dec!(40));

    let batch = t.services.batches.get_batch(chain.finished.id).await.unwrap();
    assert_eq!(batch.batch_status().unwrap(), BatchStatus::Destroyed);
    assert_eq!(batch.quantity_remaining, Decimal::ZERO);

    assert_matches!(
        svc.record_disposition(registered.affected.id, ActionTaken::Released, None)
            .await,
        Err(ServiceError::InvalidTransition { .. })
    );
}

#[tokio::test]
async fn release_disposition_returns_stock_to_use() {
    let t = TestDb::new().await;
    let chain = seed_bakery(&t).await;
    let recall = open_recall(&t, "REC-009").await;
    let svc = &t.services.recalls;

    let registered = svc
        .register_affected_batch(recall.id, chain.raw.id, BatchType::RawMaterial, dec!(2))
        .await
        .unwrap();
    svc.record_disposition(registered.affected.id, ActionTaken::Released, None)
        .await
        .unwrap();

    let batch = t.services.batches.get_batch(chain.raw.id).await.unwrap();
    assert_eq!(batch.batch_status().unwrap(), BatchStatus::Active);
    assert_eq!(batch.quantity_remaining, dec!(2));
}

#[tokio::test]
async fn duplicate_recall_codes_are_rejected() {
    let t = TestDb::new().await;
    open_recall(&t, "REC-010").await;
    assert_matches!(
        t.services
            .recalls
            .create_recall(CreateRecallInput {
                recall_code: " rec-010 ".into(),
                recall_type: RecallType::Recall,
                severity: Severity::Class2,
                reason: "Again".into(),
            })
            .await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn regulator_notification_keeps_first_timestamp() {
    let t = TestDb::new().await;
    let recall = open_recall(&t, "REC-011").await;
    let svc = &t.services.recalls;

    let first = svc
        .mark_regulator_notified(recall.id, Regulator::FoodStandardsAgency, Some("FSA-1".into()))
        .await
        .unwrap();
    assert!(first.fsa_notified);
    let stamped = first.fsa_notified_at.expect("stamped");

    let second = svc
        .mark_regulator_notified(recall.id, Regulator::FoodStandardsAgency, None)
        .await
        .unwrap();
    assert_eq!(second.fsa_notified_at, Some(stamped));
    assert_eq!(second.fsa_reference.as_deref(), Some("FSA-1"));
    assert!(!second.local_authority_notified);
    assert!(!svc.notification_overdue(&second, chrono::Utc::now()));
}
