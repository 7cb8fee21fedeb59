mod common;

use assert_matches::assert_matches;
use batchtrace::{
    entities::{
        stock_batch::{self, BatchStatus},
        stock_movement,
    },
    errors::ServiceError,
    services::{
        batch_state::{MovementReference, QuarantineOutcome},
        unit_conversion::Unit,
    },
};
use chrono::NaiveDate;
use common::{date, TestDb};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, Set,
};
use uuid::Uuid;

async fn fresh_batch(t: &TestDb, code: &str, quantity: Decimal) -> stock_batch::Model {
    let supplier = t.supplier("FarmCo").await;
    t.receive(supplier.id, code, quantity, Unit::Kilogram, &[])
        .await
}

async fn movements(t: &TestDb, batch_id: Uuid) -> Vec<stock_movement::Model> {
    stock_movement::Entity::find()
        .filter(stock_movement::Column::StockBatchId.eq(batch_id))
        .all(t.db.as_ref())
        .await
        .expect("movements")
}

#[tokio::test]
async fn concurrent_consumption_never_oversells() {
    let t = TestDb::new().await;
    let batch = fresh_batch(&t, "RM-001", dec!(10)).await;

    let mut tasks = vec![];
    for _ in 0..20 {
        let svc = t.services.batches.clone();
        let id = batch.id;
        tasks.push(tokio::spawn(async move {
            svc.consume(id, dec!(1), Unit::Kilogram, MovementReference::default())
                .await
        }));
    }

    let mut success = 0;
    for task in tasks {
        match task.await.expect("task panicked") {
            Ok(_) => success += 1,
            Err(e) => assert_matches!(e, ServiceError::InsufficientStock(_)),
        }
    }
    assert_eq!(success, 10, "exactly 10 consumptions should succeed");

    let after = t.services.batches.get_batch(batch.id).await.unwrap();
    assert_eq!(after.quantity_remaining, Decimal::ZERO);
    assert_eq!(after.batch_status().unwrap(), BatchStatus::Depleted);
    assert_eq!(movements(&t, batch.id).await.len(), 10);
}

#[tokio::test]
async fn consumption_converts_units() {
    let t = TestDb::new().await;
    let batch = fresh_batch(&t, "RM-002", dec!(10)).await;

    let outcome = t
        .services
        .batches
        .consume(batch.id, dec!(500), Unit::Gram, MovementReference::default())
        .await
        .unwrap();
    assert_eq!(outcome.consumed, dec!(0.5));
    assert_eq!(outcome.batch.quantity_remaining, dec!(9.5));
    assert!(!outcome.depleted);

    assert_matches!(
        t.services
            .batches
            .consume(batch.id, dec!(1), Unit::Litre, MovementReference::default())
            .await,
        Err(ServiceError::IncompatibleUnits { .. })
    );
}

#[tokio::test]
async fn quarantine_is_idempotent_and_blocks_consumption() {
    let t = TestDb::new().await;
    let batch = fresh_batch(&t, "RM-003", dec!(10)).await;

    let first = t
        .services
        .batches
        .quarantine(batch.id, "supplier alert", MovementReference::default())
        .await
        .unwrap();
    assert_matches!(first, QuarantineOutcome::Quarantined(_));

    let second = t
        .services
        .batches
        .quarantine(batch.id, "supplier alert", MovementReference::default())
        .await
        .unwrap();
    assert_matches!(second, QuarantineOutcome::AlreadyQuarantined(_));
    assert!(second.is_held());

    let quarantine_moves = movements(&t, batch.id)
        .await
        .into_iter()
        .filter(|m| m.movement_type == "quarantine")
        .count();
    assert_eq!(quarantine_moves, 1);

    assert_matches!(
        t.services
            .batches
            .consume(batch.id, dec!(1), Unit::Kilogram, MovementReference::default())
            .await,
        Err(ServiceError::InvalidTransition { .. })
    );
}

#[tokio::test]
async fn depleted_batches_cannot_be_quarantined() {
    let t = TestDb::new().await;
    let batch = fresh_batch(&t, "RM-004", dec!(2)).await;
    t.services
        .batches
        .consume(batch.id, dec!(2), Unit::Kilogram, MovementReference::default())
        .await
        .unwrap();

    let outcome = t
        .services
        .batches
        .quarantine(batch.id, "recall", MovementReference::default())
        .await
        .unwrap();
    assert!(!outcome.is_held());
    assert_eq!(
        outcome.batch().batch_status().unwrap(),
        BatchStatus::Depleted
    );
}

#[tokio::test]
async fn dispositions_from_quarantine() {
    let t = TestDb::new().await;
    let released = fresh_batch(&t, "RM-005", dec!(10)).await;
    let destroyed = fresh_batch(&t, "RM-006", dec!(10)).await;
    let returned = fresh_batch(&t, "RM-007", dec!(10)).await;
    for id in [released.id, destroyed.id, returned.id] {
        t.services
            .batches
            .quarantine(id, "hold", MovementReference::default())
            .await
            .unwrap();
    }

    let b = t.services.batches.release(released.id).await.unwrap();
    assert_eq!(b.batch_status().unwrap(), BatchStatus::Active);
    assert_eq!(b.quantity_remaining, dec!(10));

    let b = t.services.batches.destroy(destroyed.id).await.unwrap();
    assert_eq!(b.batch_status().unwrap(), BatchStatus::Destroyed);
    assert_eq!(b.quantity_remaining, Decimal::ZERO);

    let b = t.services.batches.mark_returned(returned.id).await.unwrap();
    assert_eq!(b.batch_status().unwrap(), BatchStatus::Returned);
    assert_eq!(b.quantity_remaining, Decimal::ZERO);

    // Only quarantined batches can be disposed of
    assert_matches!(
        t.services.batches.destroy(released.id).await,
        Err(ServiceError::InvalidTransition { .. })
    );
}

#[tokio::test]
async fn restoration_reactivates_depleted_batch() {
    let t = TestDb::new().await;
    let batch = fresh_batch(&t, "RM-008", dec!(4)).await;
    t.services
        .batches
        .consume(batch.id, dec!(4), Unit::Kilogram, MovementReference::default())
        .await
        .unwrap();

    let restored = t
        .services
        .batches
        .restore_consumption(batch.id, dec!(1), Unit::Kilogram, MovementReference::default())
        .await
        .unwrap();
    assert_eq!(restored.quantity_remaining, dec!(1));
    assert_eq!(restored.batch_status().unwrap(), BatchStatus::Active);

    assert_matches!(
        t.services
            .batches
            .restore_consumption(batch.id, dec!(10), Unit::Kilogram, MovementReference::default())
            .await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn expiry_sweeps_only_past_use_by() {
    let t = TestDb::new().await;
    let past = fresh_batch(&t, "RM-009", dec!(5)).await;
    let today_batch = fresh_batch(&t, "RM-010", dec!(5)).await;
    let today: NaiveDate = date(2024, 3, 15);

    for (batch, use_by) in [(&past, date(2024, 3, 14)), (&today_batch, today)] {
        let mut active = batch.clone().into_active_model();
        active.use_by_date = Set(Some(use_by));
        active.update(t.db.as_ref()).await.unwrap();
    }

    let expired = t.services.batches.expire_due(today).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, past.id);
    assert_eq!(expired[0].batch_status().unwrap(), BatchStatus::Expired);

    let untouched = t.services.batches.get_batch(today_batch.id).await.unwrap();
    assert_eq!(untouched.batch_status().unwrap(), BatchStatus::Active);
}
