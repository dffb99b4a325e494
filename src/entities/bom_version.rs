use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A dated, named snapshot of a SKU's recipe. At most one version per SKU is
/// active at any time; activating one deactivates its sibling and stamps the
/// sibling's effective end date.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bom_versions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub sku_id: Uuid,
    pub name: String,
    pub effective_start_date: NaiveDate,
    pub effective_end_date: Option<NaiveDate>,
    pub is_active: bool,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub expected_defect_rate: Option<Decimal>,
    pub defect_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sku::Entity",
        from = "Column::SkuId",
        to = "super::sku::Column::Id"
    )]
    Sku,
    #[sea_orm(has_many = "super::bom_line::Entity")]
    BomLines,
}

impl Related<super::sku::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sku.def()
    }
}

impl Related<super::bom_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
