use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Components::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Components::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Components::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(Components::BrandId).uuid().null())
                    .col(ColumnDef::new(Components::SkuCode).string().not_null())
                    .col(ColumnDef::new(Components::Name).string().not_null())
                    .col(
                        ColumnDef::new(Components::UnitOfMeasure)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Components::CostPerUnit)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Components::ReorderPoint)
                            .decimal_len(19, 4)
                            .null(),
                    )
                    .col(ColumnDef::new(Components::LeadTimeDays).integer().null())
                    .col(ColumnDef::new(Components::Notes).text().null())
                    .col(
                        ColumnDef::new(Components::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Components::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Components::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // SKU codes are unique per tenant, not globally
        manager
            .create_index(
                Index::create()
                    .name("idx_components_company_sku_code")
                    .table(Components::Table)
                    .col(Components::CompanyId)
                    .col(Components::SkuCode)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Skus::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Skus::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Skus::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(Skus::BrandId).uuid().null())
                    .col(ColumnDef::new(Skus::SkuCode).string().not_null())
                    .col(ColumnDef::new(Skus::Name).string().not_null())
                    .col(
                        ColumnDef::new(Skus::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Skus::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Locations::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Locations::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Locations::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(Locations::Name).string().not_null())
                    .col(ColumnDef::new(Locations::Address).text().null())
                    .col(ColumnDef::new(Locations::IsDefault).boolean().not_null())
                    .col(ColumnDef::new(Locations::IsActive).boolean().not_null())
                    .col(
                        ColumnDef::new(Locations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Locations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BomVersions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BomVersions::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BomVersions::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(BomVersions::SkuId).uuid().not_null())
                    .col(ColumnDef::new(BomVersions::Name).string().not_null())
                    .col(
                        ColumnDef::new(BomVersions::EffectiveStartDate)
                            .date()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BomVersions::EffectiveEndDate).date().null())
                    .col(ColumnDef::new(BomVersions::IsActive).boolean().not_null())
                    .col(
                        ColumnDef::new(BomVersions::ExpectedDefectRate)
                            .decimal_len(19, 4)
                            .null(),
                    )
                    .col(ColumnDef::new(BomVersions::DefectNotes).text().null())
                    .col(
                        ColumnDef::new(BomVersions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BomVersions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bom_versions_sku")
                            .from(BomVersions::Table, BomVersions::SkuId)
                            .to(Skus::Table, Skus::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BomLines::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BomLines::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(BomLines::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(BomLines::BomVersionId).uuid().not_null())
                    .col(ColumnDef::new(BomLines::ComponentId).uuid().not_null())
                    .col(
                        ColumnDef::new(BomLines::QuantityPerUnit)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(ColumnDef::new(BomLines::Sequence).integer().null())
                    .col(ColumnDef::new(BomLines::Notes).text().null())
                    .col(
                        ColumnDef::new(BomLines::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BomLines::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bom_lines_bom_version")
                            .from(BomLines::Table, BomLines::BomVersionId)
                            .to(BomVersions::Table, BomVersions::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bom_lines_component")
                            .from(BomLines::Table, BomLines::ComponentId)
                            .to(Components::Table, Components::Id),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BomLines::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BomVersions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Locations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Skus::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Components::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Components {
    Table,
    Id,
    CompanyId,
    BrandId,
    SkuCode,
    Name,
    UnitOfMeasure,
    CostPerUnit,
    ReorderPoint,
    LeadTimeDays,
    Notes,
    DeletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Skus {
    Table,
    Id,
    CompanyId,
    BrandId,
    SkuCode,
    Name,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Locations {
    Table,
    Id,
    CompanyId,
    Name,
    Address,
    IsDefault,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum BomVersions {
    Table,
    Id,
    CompanyId,
    SkuId,
    Name,
    EffectiveStartDate,
    EffectiveEndDate,
    IsActive,
    ExpectedDefectRate,
    DefectNotes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum BomLines {
    Table,
    Id,
    CompanyId,
    BomVersionId,
    ComponentId,
    QuantityPerUnit,
    Sequence,
    Notes,
    CreatedAt,
    UpdatedAt,
}
