use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of inventory movement recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEntryKind {
    Receipt,
    Build,
    Adjustment,
    Initial,
    Transfer,
    Outbound,
}

impl LedgerEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryKind::Receipt => "receipt",
            LedgerEntryKind::Build => "build",
            LedgerEntryKind::Adjustment => "adjustment",
            LedgerEntryKind::Initial => "initial",
            LedgerEntryKind::Transfer => "transfer",
            LedgerEntryKind::Outbound => "outbound",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "receipt" => Some(LedgerEntryKind::Receipt),
            "build" => Some(LedgerEntryKind::Build),
            "adjustment" => Some(LedgerEntryKind::Adjustment),
            "initial" => Some(LedgerEntryKind::Initial),
            "transfer" => Some(LedgerEntryKind::Transfer),
            "outbound" => Some(LedgerEntryKind::Outbound),
            _ => None,
        }
    }
}

/// Append-only ledger header. Rows are immutable once written; corrections
/// are recorded as compensating entries referencing `reversal_of`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub entry_type: String,
    pub entry_date: DateTime<Utc>,
    pub sku_id: Option<Uuid>,
    pub bom_version_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub to_location_id: Option<Uuid>,
    pub supplier: Option<String>,
    pub units_built: Option<i64>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_bom_cost: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_bom_cost: Option<Decimal>,
    pub defect_count: Option<i32>,
    pub defect_notes: Option<String>,
    pub affected_units: Option<i32>,
    pub reversal_of: Option<Uuid>,
    pub created_by: Uuid,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ledger_line::Entity")]
    LedgerLines,
    #[sea_orm(has_many = "super::finished_goods_line::Entity")]
    FinishedGoodsLines,
}

impl Related<super::ledger_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LedgerLines.def()
    }
}

impl Related<super::finished_goods_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FinishedGoodsLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::LedgerEntryKind;

    #[test]
    fn entry_kind_round_trips_through_str() {
        for kind in [
            LedgerEntryKind::Receipt,
            LedgerEntryKind::Build,
            LedgerEntryKind::Adjustment,
            LedgerEntryKind::Initial,
            LedgerEntryKind::Transfer,
            LedgerEntryKind::Outbound,
        ] {
            assert_eq!(LedgerEntryKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(LedgerEntryKind::from_str("unknown"), None);
    }
}
