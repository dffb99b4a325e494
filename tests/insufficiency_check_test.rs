//! Pre-flight insufficiency checker tests against a mocked database.

use buildstock_api::{
    entities::{bom_line, bom_version, component, inventory_balance},
    errors::ServiceError,
    services::InventoryService,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{DatabaseBackend, MockDatabase};
use std::sync::Arc;
use uuid::Uuid;

const COMPANY: Uuid = Uuid::from_u128(1);
const VERSION: Uuid = Uuid::from_u128(10);

fn test_version() -> bom_version::Model {
    bom_version::Model {
        id: VERSION,
        company_id: COMPANY,
        sku_id: Uuid::from_u128(5),
        name: "v1".to_string(),
        effective_start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        effective_end_date: None,
        is_active: true,
        expected_defect_rate: None,
        defect_notes: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn test_line(comp: u128, quantity: Decimal) -> bom_line::Model {
    bom_line::Model {
        id: Uuid::new_v4(),
        company_id: COMPANY,
        bom_version_id: VERSION,
        component_id: Uuid::from_u128(comp),
        quantity_per_unit: quantity,
        sequence: None,
        notes: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn test_component(id: u128, name: &str) -> component::Model {
    component::Model {
        id: Uuid::from_u128(id),
        company_id: COMPANY,
        brand_id: None,
        sku_code: format!("CMP-{}", id),
        name: name.to_string(),
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

fn test_balance(comp: u128, quantity: Decimal) -> inventory_balance::Model {
    inventory_balance::Model {
        id: Uuid::new_v4(),
        company_id: COMPANY,
        component_id: Uuid::from_u128(comp),
        location_id: None,
        quantity_on_hand: quantity,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn shortages_are_reported_per_component() {
    // Building 10 units: bracket needs 20 (only 8 on hand), screw needs 40
    // (plenty on hand).
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_version()]])
        .append_query_results([vec![test_line(100, dec!(2)), test_line(101, dec!(4))]])
        .append_query_results([vec![
            test_component(100, "Bracket"),
            test_component(101, "Screw"),
        ]])
        .append_query_results([vec![
            test_balance(100, dec!(8)),
            test_balance(101, dec!(500)),
        ]])
        .into_connection();

    let service = InventoryService::new(Arc::new(db), None);
    let shortages = service
        .check_insufficient_inventory(VERSION, COMPANY, 10, None)
        .await
        .unwrap();

    assert_eq!(shortages.len(), 1);
    assert_eq!(shortages[0].component_name, "Bracket");
    assert_eq!(shortages[0].required, dec!(20));
    assert_eq!(shortages[0].available, dec!(8));
    assert_eq!(shortages[0].shortage, dec!(12));
}

#[tokio::test]
async fn fully_sufficient_inventory_returns_empty_list() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_version()]])
        .append_query_results([vec![test_line(100, dec!(2))]])
        .append_query_results([vec![test_component(100, "Bracket")]])
        .append_query_results([vec![test_balance(100, dec!(20))]])
        .into_connection();

    let service = InventoryService::new(Arc::new(db), None);
    let shortages = service
        .check_insufficient_inventory(VERSION, COMPANY, 10, None)
        .await
        .unwrap();

    assert!(shortages.is_empty());
}

#[tokio::test]
async fn non_positive_units_are_rejected() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let service = InventoryService::new(Arc::new(db), None);

    let err = service
        .check_insufficient_inventory(VERSION, COMPANY, 0, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn foreign_tenant_version_is_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<bom_version::Model>::new()])
        .into_connection();
    let service = InventoryService::new(Arc::new(db), None);

    let err = service
        .check_insufficient_inventory(VERSION, COMPANY, 10, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn version_without_lines_is_trivially_sufficient() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_version()]])
        .append_query_results([Vec::<bom_line::Model>::new()])
        .into_connection();

    let service = InventoryService::new(Arc::new(db), None);
    let shortages = service
        .check_insufficient_inventory(VERSION, COMPANY, 10, None)
        .await
        .unwrap();

    assert!(shortages.is_empty());
}
