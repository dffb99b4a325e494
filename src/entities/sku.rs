use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "skus")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub brand_id: Option<Uuid>,
    pub sku_code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::bom_version::Entity")]
    BomVersions,
    #[sea_orm(has_many = "super::finished_goods_balance::Entity")]
    FinishedGoodsBalances,
    #[sea_orm(has_many = "super::finished_goods_line::Entity")]
    FinishedGoodsLines,
}

impl Related<super::bom_version::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomVersions.def()
    }
}

impl Related<super::finished_goods_balance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FinishedGoodsBalances.def()
    }
}

impl Related<super::finished_goods_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FinishedGoodsLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
