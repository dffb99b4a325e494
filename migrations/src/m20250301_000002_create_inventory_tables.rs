use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Lots::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Lots::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Lots::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(Lots::ComponentId).uuid().not_null())
                    .col(ColumnDef::new(Lots::LotNumber).string().not_null())
                    .col(
                        ColumnDef::new(Lots::Quantity)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Lots::OriginalQuantity)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Lots::QuantityReserved)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Lots::UnitCost).decimal_len(19, 4).null())
                    .col(ColumnDef::new(Lots::ExpirationDate).date().null())
                    .col(ColumnDef::new(Lots::ReceivedDate).date().not_null())
                    .col(ColumnDef::new(Lots::Supplier).string().null())
                    .col(ColumnDef::new(Lots::Notes).text().null())
                    .col(
                        ColumnDef::new(Lots::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Lots::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_lots_component")
                            .from(Lots::Table, Lots::ComponentId)
                            .to(Components::Table, Components::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(InventoryBalances::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InventoryBalances::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryBalances::CompanyId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryBalances::ComponentId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InventoryBalances::LocationId).uuid().null())
                    .col(
                        ColumnDef::new(InventoryBalances::QuantityOnHand)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryBalances::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryBalances::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_inventory_balances_component")
                            .from(InventoryBalances::Table, InventoryBalances::ComponentId)
                            .to(Components::Table, Components::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // One row per (tenant, component, location) key; the NULL-location
        // pool row is kept unique by the partial index below on Postgres and
        // by application discipline elsewhere.
        manager
            .create_index(
                Index::create()
                    .name("idx_inventory_balances_key")
                    .table(InventoryBalances::Table)
                    .col(InventoryBalances::CompanyId)
                    .col(InventoryBalances::ComponentId)
                    .col(InventoryBalances::LocationId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FinishedGoodsBalances::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FinishedGoodsBalances::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FinishedGoodsBalances::CompanyId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FinishedGoodsBalances::SkuId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FinishedGoodsBalances::LocationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FinishedGoodsBalances::QuantityOnHand)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FinishedGoodsBalances::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FinishedGoodsBalances::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_finished_goods_balances_sku")
                            .from(FinishedGoodsBalances::Table, FinishedGoodsBalances::SkuId)
                            .to(Skus::Table, Skus::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_finished_goods_balances_location")
                            .from(
                                FinishedGoodsBalances::Table,
                                FinishedGoodsBalances::LocationId,
                            )
                            .to(Locations::Table, Locations::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_finished_goods_balances_key")
                    .table(FinishedGoodsBalances::Table)
                    .col(FinishedGoodsBalances::CompanyId)
                    .col(FinishedGoodsBalances::SkuId)
                    .col(FinishedGoodsBalances::LocationId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FinishedGoodsBalances::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(InventoryBalances::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Lots::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Lots {
    Table,
    Id,
    CompanyId,
    ComponentId,
    LotNumber,
    Quantity,
    OriginalQuantity,
    QuantityReserved,
    UnitCost,
    ExpirationDate,
    ReceivedDate,
    Supplier,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum InventoryBalances {
    Table,
    Id,
    CompanyId,
    ComponentId,
    LocationId,
    QuantityOnHand,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FinishedGoodsBalances {
    Table,
    Id,
    CompanyId,
    SkuId,
    LocationId,
    QuantityOnHand,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Components {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Skus {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Locations {
    Table,
    Id,
}
