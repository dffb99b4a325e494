use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // The hot paths: line scans per entry, per-component history, and
        // FEFO lot fetches per component.
        manager
            .create_index(
                Index::create()
                    .name("idx_ledger_lines_entry")
                    .table(LedgerLines::Table)
                    .col(LedgerLines::LedgerEntryId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ledger_lines_company_component")
                    .table(LedgerLines::Table)
                    .col(LedgerLines::CompanyId)
                    .col(LedgerLines::ComponentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_lots_company_component")
                    .table(Lots::Table)
                    .col(Lots::CompanyId)
                    .col(Lots::ComponentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ledger_entries_company_date")
                    .table(LedgerEntries::Table)
                    .col(LedgerEntries::CompanyId)
                    .col(LedgerEntries::EntryDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_bom_versions_sku_active")
                    .table(BomVersions::Table)
                    .col(BomVersions::SkuId)
                    .col(BomVersions::IsActive)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_bom_versions_sku_active").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_ledger_entries_company_date")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_lots_company_component").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_ledger_lines_company_component")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_ledger_lines_entry").to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LedgerLines {
    Table,
    LedgerEntryId,
    CompanyId,
    ComponentId,
}

#[derive(DeriveIden)]
enum LedgerEntries {
    Table,
    CompanyId,
    EntryDate,
}

#[derive(DeriveIden)]
enum Lots {
    Table,
    CompanyId,
    ComponentId,
}

#[derive(DeriveIden)]
enum BomVersions {
    Table,
    SkuId,
    IsActive,
}
