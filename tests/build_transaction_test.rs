//! Build orchestrator tests against a mocked database. These exercise the
//! pre-write stages of the atomic path: input validation, tenant-checked
//! resolution, loud output-location failure, and the authoritative
//! sufficiency abort.

use buildstock_api::{
    entities::{bom_line, bom_version, component, location, sku},
    errors::ServiceError,
    services::{build::CreateBuildInput, BuildService, LotService},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
use std::sync::Arc;
use uuid::Uuid;

const COMPANY: Uuid = Uuid::from_u128(1);
const SKU: Uuid = Uuid::from_u128(5);
const VERSION: Uuid = Uuid::from_u128(10);
const COMPONENT: Uuid = Uuid::from_u128(100);
const LOCATION: Uuid = Uuid::from_u128(200);

fn build_service(db: DatabaseConnection) -> BuildService {
    let db = Arc::new(db);
    BuildService::new(db.clone(), Arc::new(LotService::new(db)), None, None)
}

fn base_input() -> CreateBuildInput {
    CreateBuildInput {
        company_id: COMPANY,
        sku_id: SKU,
        bom_version_id: None,
        units_to_build: 10,
        entry_date: Utc::now(),
        created_by_id: Uuid::from_u128(9),
        location_id: None,
        output_to_finished_goods: true,
        output_location_id: None,
        output_quantity: None,
        lot_overrides: None,
        allow_insufficient: false,
        defect_count: None,
        defect_notes: None,
        affected_units: None,
        notes: None,
    }
}

fn test_sku() -> sku::Model {
    sku::Model {
        id: SKU,
        company_id: COMPANY,
        brand_id: None,
        sku_code: "FG-1".to_string(),
        name: "Finished Widget".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn test_version() -> bom_version::Model {
    bom_version::Model {
        id: VERSION,
        company_id: COMPANY,
        sku_id: SKU,
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

fn test_line(quantity: Decimal) -> bom_line::Model {
    bom_line::Model {
        id: Uuid::new_v4(),
        company_id: COMPANY,
        bom_version_id: VERSION,
        component_id: COMPONENT,
        quantity_per_unit: quantity,
        sequence: None,
        notes: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn test_component() -> component::Model {
    component::Model {
        id: COMPONENT,
        company_id: COMPANY,
        brand_id: None,
        sku_code: "CMP-100".to_string(),
        name: "Widget Bracket".to_string(),
        unit_of_measure: "EA".to_string(),
        cost_per_unit: dec!(0.5000),
        reorder_point: None,
        lead_time_days: None,
        notes: None,
        deleted_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn test_location(active: bool) -> location::Model {
    location::Model {
        id: LOCATION,
        company_id: COMPANY,
        name: "Main Warehouse".to_string(),
        address: None,
        is_default: true,
        is_active: active,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn non_positive_units_fail_validation_before_any_query() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let service = build_service(db);

    let mut input = base_input();
    input.units_to_build = 0;

    let err = service.create_build_transaction(input).await.unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn output_quantity_cannot_exceed_units_to_build() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let service = build_service(db);

    let mut input = base_input();
    input.output_quantity = Some(11);

    let err = service.create_build_transaction(input).await.unwrap_err();
    match err {
        ServiceError::ValidationError(msg) => {
            assert!(msg.contains("output_quantity"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn foreign_tenant_sku_is_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<sku::Model>::new()])
        .into_connection();
    let service = build_service(db);

    let err = service
        .create_build_transaction(base_input())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn sku_without_active_bom_is_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_sku()]])
        .append_query_results([Vec::<bom_version::Model>::new()])
        .into_connection();
    let service = build_service(db);

    let err = service
        .create_build_transaction(base_input())
        .await
        .unwrap_err();
    match err {
        ServiceError::NotFound(msg) => assert!(msg.contains("active BOM")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn missing_output_location_fails_loudly() {
    // Output is requested, no explicit location is given, and the tenant has
    // no default: the build must abort with a configuration error instead of
    // silently skipping finished-goods production.
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_sku()]])
        .append_query_results([vec![test_version()]])
        .append_query_results([vec![test_line(dec!(2))]])
        .append_query_results([vec![test_component()]])
        .append_query_results([Vec::<location::Model>::new()])
        .into_connection();
    let service = build_service(db);

    let err = service
        .create_build_transaction(base_input())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ConfigurationError(_)));
}

#[tokio::test]
async fn inactive_output_location_is_rejected() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_sku()]])
        .append_query_results([vec![test_version()]])
        .append_query_results([vec![test_line(dec!(2))]])
        .append_query_results([vec![test_component()]])
        .append_query_results([vec![test_location(false)]])
        .into_connection();
    let service = build_service(db);

    let mut input = base_input();
    input.output_location_id = Some(LOCATION);

    let err = service.create_build_transaction(input).await.unwrap_err();
    match err {
        ServiceError::InvalidOperation(msg) => assert!(msg.contains("not active")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn insufficient_inventory_aborts_with_structured_shortages() {
    // 10 units at 2 per unit requires 20; nothing is on hand.
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_sku()]])
        .append_query_results([vec![test_version()]])
        .append_query_results([vec![test_line(dec!(2))]])
        .append_query_results([vec![test_component()]])
        .append_query_results([vec![test_location(true)]])
        .append_query_results([Vec::<buildstock_api::entities::inventory_balance::Model>::new()])
        .into_connection();
    let service = build_service(db);

    let mut input = base_input();
    input.output_location_id = Some(LOCATION);

    let err = service.create_build_transaction(input).await.unwrap_err();
    match err {
        ServiceError::InsufficientInventory(shortages) => {
            assert_eq!(shortages.len(), 1);
            assert_eq!(shortages[0].component_id, COMPONENT);
            assert_eq!(shortages[0].component_name, "Widget Bracket");
            assert_eq!(shortages[0].required, dec!(20));
            assert_eq!(shortages[0].available, Decimal::ZERO);
            assert_eq!(shortages[0].shortage, dec!(20));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn explicit_version_of_another_sku_is_rejected() {
    let mut other_sku_version = test_version();
    other_sku_version.sku_id = Uuid::from_u128(77);

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_sku()]])
        .append_query_results([vec![other_sku_version]])
        .into_connection();
    let service = build_service(db);

    let mut input = base_input();
    input.bom_version_id = Some(VERSION);

    let err = service.create_build_transaction(input).await.unwrap_err();
    match err {
        ServiceError::ValidationError(msg) => assert!(msg.contains("does not belong to SKU")),
        other => panic!("unexpected error: {:?}", other),
    }
}
