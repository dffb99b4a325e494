//! In-transaction consumption writer tests. The mock result queues double as
//! call-shape assertions: a query or statement the writer is not supposed to
//! issue would desynchronize the queues and fail the test.

use buildstock_api::{
    entities::{bom_line, component, ledger_line, lot},
    services::lots::{BuildConsumptionContext, LotOverride, LotOverrideAllocation, LotService},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const COMPANY: Uuid = Uuid::from_u128(1);
const ENTRY: Uuid = Uuid::from_u128(1000);
const COMPONENT: Uuid = Uuid::from_u128(100);
const LOT: Uuid = Uuid::from_u128(20);

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

fn test_bom_line(quantity_per_unit: Decimal) -> bom_line::Model {
    bom_line::Model {
        id: Uuid::new_v4(),
        company_id: COMPANY,
        bom_version_id: Uuid::from_u128(10),
        component_id: COMPONENT,
        quantity_per_unit,
        sequence: None,
        notes: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn test_lot(quantity: Decimal) -> lot::Model {
    lot::Model {
        id: LOT,
        company_id: COMPANY,
        component_id: COMPONENT,
        lot_number: "LOT-20".to_string(),
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

fn returned_line(lot_id: Option<Uuid>, quantity_change: Decimal) -> ledger_line::Model {
    ledger_line::Model {
        id: Uuid::new_v4(),
        company_id: COMPANY,
        ledger_entry_id: ENTRY,
        component_id: COMPONENT,
        lot_id,
        location_id: None,
        quantity_change,
        unit_cost: dec!(0.5000),
        created_at: Utc::now(),
    }
}

fn context<'a>(
    bom_lines: &'a [bom_line::Model],
    components: &'a HashMap<Uuid, component::Model>,
    balances: &'a HashMap<Uuid, Decimal>,
    overrides: Option<&'a [LotOverride]>,
) -> BuildConsumptionContext<'a> {
    BuildConsumptionContext {
        company_id: COMPANY,
        ledger_entry_id: ENTRY,
        location_id: None,
        units_to_build: 5,
        bom_lines,
        components,
        balances,
        lot_overrides: overrides,
        allow_insufficient: false,
    }
}

#[tokio::test]
async fn fefo_path_fetches_lots_then_decrements_and_writes() {
    // One SELECT for the lots, one guarded UPDATE, one INSERT.
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_lot(dec!(30))]])
        .append_query_results([vec![returned_line(Some(LOT), dec!(-10))]])
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }])
        .into_connection();

    let bom_lines = vec![test_bom_line(dec!(2))];
    let components = HashMap::from([(COMPONENT, test_component())]);
    let balances = HashMap::new();

    let service = LotService::new(Arc::new(
        MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
    ));
    let consumption = service
        .consume_lots_for_build(&db, &context(&bom_lines, &components, &balances, None))
        .await
        .unwrap();

    assert_eq!(consumption.lines.len(), 1);
    assert_eq!(consumption.consumed[&COMPONENT], dec!(10));
}

#[tokio::test]
async fn override_path_never_scans_lots() {
    // Only the guarded UPDATE and the INSERT are budgeted. If the writer ran
    // the FEFO scan despite the override, it would consume the INSERT's
    // result row as a lot list and fail.
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![returned_line(Some(LOT), dec!(-10))]])
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }])
        .into_connection();

    let bom_lines = vec![test_bom_line(dec!(2))];
    let components = HashMap::from([(COMPONENT, test_component())]);
    let balances = HashMap::new();
    let overrides = vec![LotOverride {
        component_id: COMPONENT,
        allocations: vec![LotOverrideAllocation {
            lot_id: LOT,
            quantity: dec!(10),
        }],
    }];

    let service = LotService::new(Arc::new(
        MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
    ));
    let consumption = service
        .consume_lots_for_build(
            &db,
            &context(&bom_lines, &components, &balances, Some(&overrides)),
        )
        .await
        .unwrap();

    assert_eq!(consumption.lines.len(), 1);
    assert_eq!(consumption.consumed[&COMPONENT], dec!(10));
}

#[tokio::test]
async fn pooled_component_writes_one_line_without_lot_decrement() {
    // No lots exist: the writer must fall back to a single pooled line and
    // must not attempt a lot UPDATE (none is budgeted in the exec queue).
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<lot::Model>::new()])
        .append_query_results([vec![returned_line(None, dec!(-10))]])
        .into_connection();

    let bom_lines = vec![test_bom_line(dec!(2))];
    let components = HashMap::from([(COMPONENT, test_component())]);
    let balances = HashMap::from([(COMPONENT, dec!(100))]);

    let service = LotService::new(Arc::new(
        MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
    ));
    let consumption = service
        .consume_lots_for_build(&db, &context(&bom_lines, &components, &balances, None))
        .await
        .unwrap();

    assert_eq!(consumption.lines.len(), 1);
    assert_eq!(consumption.lines[0].lot_id, None);
    assert_eq!(consumption.consumed[&COMPONENT], dec!(10));
}

#[tokio::test]
async fn zero_quantity_bom_lines_consume_nothing() {
    // No queries or statements at all are budgeted: a zero-quantity recipe
    // line is skipped outright.
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

    let bom_lines = vec![test_bom_line(Decimal::ZERO)];
    let components = HashMap::from([(COMPONENT, test_component())]);
    let balances = HashMap::new();

    let service = LotService::new(Arc::new(
        MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
    ));
    let consumption = service
        .consume_lots_for_build(&db, &context(&bom_lines, &components, &balances, None))
        .await
        .unwrap();

    assert!(consumption.lines.is_empty());
    assert!(consumption.consumed.is_empty());
}
