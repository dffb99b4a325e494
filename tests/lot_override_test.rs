//! Lot override validation tests: tenant isolation, lot-component linkage,
//! balance checks, and the collect-every-violation contract.

use buildstock_api::{
    entities::{component, lot},
    errors::ServiceError,
    services::lots::{LotOverride, LotOverrideAllocation, LotService},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{DatabaseBackend, MockDatabase};
use std::sync::Arc;
use uuid::Uuid;

const COMPANY: Uuid = Uuid::from_u128(1);

fn test_component(id: u128) -> component::Model {
    component::Model {
        id: Uuid::from_u128(id),
        company_id: COMPANY,
        brand_id: None,
        sku_code: format!("CMP-{}", id),
        name: format!("Component {}", id),
        unit_of_measure: "EA".to_string(),
        cost_per_unit: dec!(1.0000),
        reorder_point: None,
        lead_time_days: None,
        notes: None,
        deleted_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn test_lot(id: u128, component: u128, quantity: Decimal) -> lot::Model {
    lot::Model {
        id: Uuid::from_u128(id),
        company_id: COMPANY,
        component_id: Uuid::from_u128(component),
        lot_number: format!("LOT-{}", id),
        quantity,
        original_quantity: quantity,
        quantity_reserved: Decimal::ZERO,
        unit_cost: None,
        expiration_date: None,
        received_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        supplier: None,
        notes: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn override_of(component: u128, allocations: Vec<(u128, Decimal)>) -> LotOverride {
    LotOverride {
        component_id: Uuid::from_u128(component),
        allocations: allocations
            .into_iter()
            .map(|(lot, quantity)| LotOverrideAllocation {
                lot_id: Uuid::from_u128(lot),
                quantity,
            })
            .collect(),
    }
}

fn consistency_errors(err: ServiceError) -> Vec<String> {
    match err {
        ServiceError::ConsistencyError(errors) => errors,
        other => panic!("expected ConsistencyError, got: {:?}", other),
    }
}

#[tokio::test]
async fn valid_overrides_pass() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_component(10)]])
        .append_query_results([vec![test_lot(20, 10, dec!(50))]])
        .into_connection();

    let service = LotService::new(Arc::new(db));
    let result = service
        .validate_lot_overrides(&[override_of(10, vec![(20, dec!(30))])], COMPANY)
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn foreign_tenant_lot_reads_as_not_found_never_quantity_mismatch() {
    // The lot exists under another tenant with quantity 5; the tenant-scoped
    // fetch never sees it, so the report must be "not found"; a quantity
    // error would leak that the lot exists.
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_component(10)]])
        .append_query_results([Vec::<lot::Model>::new()])
        .into_connection();

    let service = LotService::new(Arc::new(db));
    let errors = consistency_errors(
        service
            .validate_lot_overrides(&[override_of(10, vec![(20, dec!(30))])], COMPANY)
            .await
            .unwrap_err(),
    );

    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("not found"));
    assert!(!errors[0].contains("insufficient"));
}

#[tokio::test]
async fn lot_of_wrong_component_is_reported() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_component(10)]])
        .append_query_results([vec![test_lot(20, 11, dec!(50))]])
        .into_connection();

    let service = LotService::new(Arc::new(db));
    let errors = consistency_errors(
        service
            .validate_lot_overrides(&[override_of(10, vec![(20, dec!(30))])], COMPANY)
            .await
            .unwrap_err(),
    );

    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("does not belong to component"));
}

#[tokio::test]
async fn overlapping_overrides_are_summed_per_lot() {
    // Two entries draw 30 + 25 from a 50-unit lot: individually fine,
    // jointly over the balance.
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_component(10)]])
        .append_query_results([vec![test_lot(20, 10, dec!(50))]])
        .into_connection();

    let service = LotService::new(Arc::new(db));
    let errors = consistency_errors(
        service
            .validate_lot_overrides(
                &[override_of(10, vec![(20, dec!(30)), (20, dec!(25))])],
                COMPANY,
            )
            .await
            .unwrap_err(),
    );

    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("insufficient quantity"));
    assert!(errors[0].contains("requested 55"));
}

#[tokio::test]
async fn every_violation_is_collected_in_one_pass() {
    // Component 99 is foreign, lot 21 is missing, and lot 20 is overdrawn:
    // all three must come back together so the caller can fix them at once.
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_component(10)]])
        .append_query_results([vec![test_lot(20, 10, dec!(10))]])
        .into_connection();

    let service = LotService::new(Arc::new(db));
    let errors = consistency_errors(
        service
            .validate_lot_overrides(
                &[
                    override_of(10, vec![(20, dec!(30))]),
                    override_of(99, vec![(21, dec!(5))]),
                ],
                COMPANY,
            )
            .await
            .unwrap_err(),
    );

    assert_eq!(errors.len(), 3);
    assert!(errors.iter().any(|e| e.contains("Component") && e.contains("not found")));
    assert!(errors.iter().any(|e| e.contains("Lot") && e.contains("not found")));
    assert!(errors.iter().any(|e| e.contains("insufficient quantity")));
}

#[tokio::test]
async fn non_positive_override_quantity_is_rejected() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_component(10)]])
        .append_query_results([vec![test_lot(20, 10, dec!(50))]])
        .into_connection();

    let service = LotService::new(Arc::new(db));
    let errors = consistency_errors(
        service
            .validate_lot_overrides(&[override_of(10, vec![(20, Decimal::ZERO)])], COMPANY)
            .await
            .unwrap_err(),
    );

    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("must be positive"));
}
