//! BOM version activation exclusivity tests: promoting a version must
//! deactivate the active sibling (stamping its end date) in the same atomic
//! unit, and an already-active version must short-circuit.

use buildstock_api::{
    entities::{bom_line, bom_version, component, sku},
    services::bom::{BomLineInput, BomService, CreateBomVersionInput},
};
use chrono::{NaiveDate, Utc};
use rust_decimal_macros::dec;
use sea_orm::{DatabaseBackend, MockDatabase};
use std::sync::Arc;
use uuid::Uuid;

const COMPANY: Uuid = Uuid::from_u128(1);
const SKU: Uuid = Uuid::from_u128(5);

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn version(id: u128, name: &str, active: bool, start: NaiveDate) -> bom_version::Model {
    bom_version::Model {
        id: Uuid::from_u128(id),
        company_id: COMPANY,
        sku_id: SKU,
        name: name.to_string(),
        effective_start_date: start,
        effective_end_date: None,
        is_active: active,
        expected_defect_rate: None,
        defect_notes: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
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

#[tokio::test]
async fn activation_deactivates_the_current_sibling() {
    let v2_start = day(2025, 6, 1);
    let v1 = version(10, "v1", true, day(2025, 1, 1));
    let v2 = version(11, "v2", false, v2_start);

    let mut v1_deactivated = v1.clone();
    v1_deactivated.is_active = false;
    v1_deactivated.effective_end_date = Some(v2_start);

    let mut v2_activated = v2.clone();
    v2_activated.is_active = true;

    // Queue shape: target lookup, active-sibling lookup, sibling update,
    // target update.
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![v2]])
        .append_query_results([vec![v1]])
        .append_query_results([vec![v1_deactivated]])
        .append_query_results([vec![v2_activated]])
        .into_connection();

    let service = BomService::new(Arc::new(db), None);
    let activated = service
        .activate_bom_version(Uuid::from_u128(11), COMPANY)
        .await
        .unwrap();

    assert!(activated.is_active);
    assert_eq!(activated.effective_end_date, None);
}

#[tokio::test]
async fn activating_the_active_version_is_a_no_op() {
    // Only the target lookup is budgeted; a sibling scan or update would
    // overrun the queue and fail the test.
    let v1 = version(10, "v1", true, day(2025, 1, 1));

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![v1]])
        .into_connection();

    let service = BomService::new(Arc::new(db), None);
    let result = service
        .activate_bom_version(Uuid::from_u128(10), COMPANY)
        .await
        .unwrap();

    assert!(result.is_active);
}

#[tokio::test]
async fn creating_an_active_version_swaps_the_sibling_atomically() {
    let v1 = version(10, "v1", true, day(2025, 1, 1));
    let mut v1_deactivated = v1.clone();
    v1_deactivated.is_active = false;
    v1_deactivated.effective_end_date = Some(day(2025, 6, 1));

    let created = version(12, "v2", true, day(2025, 6, 1));
    let line = bom_line::Model {
        id: Uuid::new_v4(),
        company_id: COMPANY,
        bom_version_id: created.id,
        component_id: Uuid::from_u128(100),
        quantity_per_unit: dec!(2),
        sequence: Some(0),
        notes: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_sku()]])
        .append_query_results([vec![test_component(100)]])
        .append_query_results([vec![v1]])
        .append_query_results([vec![v1_deactivated]])
        .append_query_results([vec![created]])
        .append_query_results([vec![line]])
        .into_connection();

    let service = BomService::new(Arc::new(db), None);
    let result = service
        .create_bom_version(CreateBomVersionInput {
            company_id: COMPANY,
            sku_id: SKU,
            name: "v2".to_string(),
            effective_start_date: day(2025, 6, 1),
            is_active: true,
            expected_defect_rate: None,
            defect_notes: None,
            lines: vec![BomLineInput {
                component_id: Uuid::from_u128(100),
                quantity_per_unit: dec!(2),
                sequence: None,
                notes: None,
            }],
        })
        .await
        .unwrap();

    assert!(result.is_active);
}
