use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A consumable input. Rows referenced by ledger history are soft-deleted,
/// never physically removed.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "components")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub brand_id: Option<Uuid>,
    pub sku_code: String,
    pub name: String,
    pub unit_of_measure: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub cost_per_unit: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub reorder_point: Option<Decimal>,
    pub lead_time_days: Option<i32>,
    pub notes: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::lot::Entity")]
    Lots,
    #[sea_orm(has_many = "super::bom_line::Entity")]
    BomLines,
    #[sea_orm(has_many = "super::inventory_balance::Entity")]
    InventoryBalances,
    #[sea_orm(has_many = "super::ledger_line::Entity")]
    LedgerLines,
}

impl Related<super::lot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lots.def()
    }
}

impl Related<super::bom_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomLines.def()
    }
}

impl Related<super::inventory_balance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryBalances.def()
    }
}

impl Related<super::ledger_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LedgerLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
