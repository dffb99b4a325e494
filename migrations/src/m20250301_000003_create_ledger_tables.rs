use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LedgerEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LedgerEntries::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LedgerEntries::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(LedgerEntries::EntryType).string().not_null())
                    .col(
                        ColumnDef::new(LedgerEntries::EntryDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LedgerEntries::SkuId).uuid().null())
                    .col(ColumnDef::new(LedgerEntries::BomVersionId).uuid().null())
                    .col(ColumnDef::new(LedgerEntries::LocationId).uuid().null())
                    .col(ColumnDef::new(LedgerEntries::ToLocationId).uuid().null())
                    .col(ColumnDef::new(LedgerEntries::Supplier).string().null())
                    .col(ColumnDef::new(LedgerEntries::UnitsBuilt).big_integer().null())
                    .col(
                        ColumnDef::new(LedgerEntries::UnitBomCost)
                            .decimal_len(19, 4)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(LedgerEntries::TotalBomCost)
                            .decimal_len(19, 4)
                            .null(),
                    )
                    .col(ColumnDef::new(LedgerEntries::DefectCount).integer().null())
                    .col(ColumnDef::new(LedgerEntries::DefectNotes).text().null())
                    .col(ColumnDef::new(LedgerEntries::AffectedUnits).integer().null())
                    .col(ColumnDef::new(LedgerEntries::ReversalOf).uuid().null())
                    .col(ColumnDef::new(LedgerEntries::CreatedBy).uuid().not_null())
                    .col(ColumnDef::new(LedgerEntries::Notes).text().null())
                    .col(
                        ColumnDef::new(LedgerEntries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LedgerLines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LedgerLines::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LedgerLines::CompanyId).uuid().not_null())
                    .col(
                        ColumnDef::new(LedgerLines::LedgerEntryId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LedgerLines::ComponentId).uuid().not_null())
                    .col(ColumnDef::new(LedgerLines::LotId).uuid().null())
                    .col(ColumnDef::new(LedgerLines::LocationId).uuid().null())
                    .col(
                        ColumnDef::new(LedgerLines::QuantityChange)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LedgerLines::UnitCost)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LedgerLines::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ledger_lines_entry")
                            .from(LedgerLines::Table, LedgerLines::LedgerEntryId)
                            .to(LedgerEntries::Table, LedgerEntries::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ledger_lines_component")
                            .from(LedgerLines::Table, LedgerLines::ComponentId)
                            .to(Components::Table, Components::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ledger_lines_lot")
                            .from(LedgerLines::Table, LedgerLines::LotId)
                            .to(Lots::Table, Lots::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FinishedGoodsLines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FinishedGoodsLines::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FinishedGoodsLines::CompanyId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FinishedGoodsLines::LedgerEntryId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FinishedGoodsLines::SkuId).uuid().not_null())
                    .col(
                        ColumnDef::new(FinishedGoodsLines::LocationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FinishedGoodsLines::QuantityChange)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FinishedGoodsLines::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_finished_goods_lines_entry")
                            .from(FinishedGoodsLines::Table, FinishedGoodsLines::LedgerEntryId)
                            .to(LedgerEntries::Table, LedgerEntries::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_finished_goods_lines_sku")
                            .from(FinishedGoodsLines::Table, FinishedGoodsLines::SkuId)
                            .to(Skus::Table, Skus::Id),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FinishedGoodsLines::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LedgerLines::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LedgerEntries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LedgerEntries {
    Table,
    Id,
    CompanyId,
    EntryType,
    EntryDate,
    SkuId,
    BomVersionId,
    LocationId,
    ToLocationId,
    Supplier,
    UnitsBuilt,
    UnitBomCost,
    TotalBomCost,
    DefectCount,
    DefectNotes,
    AffectedUnits,
    ReversalOf,
    CreatedBy,
    Notes,
    CreatedAt,
}

#[derive(DeriveIden)]
enum LedgerLines {
    Table,
    Id,
    CompanyId,
    LedgerEntryId,
    ComponentId,
    LotId,
    LocationId,
    QuantityChange,
    UnitCost,
    CreatedAt,
}

#[derive(DeriveIden)]
enum FinishedGoodsLines {
    Table,
    Id,
    CompanyId,
    LedgerEntryId,
    SkuId,
    LocationId,
    QuantityChange,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Components {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Lots {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Skus {
    Table,
    Id,
}
