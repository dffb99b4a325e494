use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, TransactionTrait,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        finished_goods_line::{self, Entity as FinishedGoodsLineEntity},
        ledger_entry::{self, Entity as LedgerEntryEntity, LedgerEntryKind},
        ledger_line::{self, Entity as LedgerLineEntity},
        sku::{self, Entity as SkuEntity},
    },
    errors::{ComponentShortage, ServiceError},
    events::{Event, EventSender},
    services::{
        bom::{rollup_unit_cost, BomService, COST_PRECISION},
        inventory::{compute_shortages, InventoryService},
        locations::LocationService,
        lots::{BuildConsumptionContext, LotOverride, LotService},
    },
};

fn default_output_to_finished_goods() -> bool {
    true
}

/// Input payload for recording a build
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBuildInput {
    pub company_id: Uuid,
    pub sku_id: Uuid,
    /// Defaults to the SKU's active version when omitted
    pub bom_version_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub units_to_build: i64,
    pub entry_date: DateTime<Utc>,
    pub created_by_id: Uuid,
    /// Consumption scope; None draws from the tenant-wide pool
    pub location_id: Option<Uuid>,
    #[serde(default = "default_output_to_finished_goods")]
    pub output_to_finished_goods: bool,
    pub output_location_id: Option<Uuid>,
    /// Good units actually produced; defaults to units_to_build, may be
    /// lower to reflect defects
    #[validate(range(min = 0))]
    pub output_quantity: Option<i64>,
    pub lot_overrides: Option<Vec<LotOverride>>,
    #[serde(default)]
    pub allow_insufficient: bool,
    #[validate(range(min = 0))]
    pub defect_count: Option<i32>,
    pub defect_notes: Option<String>,
    #[validate(range(min = 0))]
    pub affected_units: Option<i32>,
    pub notes: Option<String>,
}

/// Everything a build commit produced, re-fetched after the commit
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub entry: ledger_entry::Model,
    pub lines: Vec<ledger_line::Model>,
    pub finished_goods_line: Option<finished_goods_line::Model>,
    pub unit_bom_cost: Decimal,
    pub total_bom_cost: Decimal,
}

/// The atomic write path for builds: resolves the recipe, re-checks
/// sufficiency in-scope, allocates lots, and records the header, consumption
/// lines, production line, and every balance update as one unit of work.
#[derive(Clone)]
pub struct BuildService {
    db: Arc<DatabaseConnection>,
    lot_service: Arc<LotService>,
    event_sender: Option<EventSender>,
    defect_alert_threshold: Option<i32>,
}

impl BuildService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        lot_service: Arc<LotService>,
        event_sender: Option<EventSender>,
        defect_alert_threshold: Option<i32>,
    ) -> Self {
        Self {
            db,
            lot_service,
            event_sender,
            defect_alert_threshold,
        }
    }

    async fn find_owned_sku(
        txn: &DatabaseTransaction,
        sku_id: Uuid,
        company_id: Uuid,
    ) -> Result<sku::Model, ServiceError> {
        SkuEntity::find_by_id(sku_id)
            .filter(sku::Column::CompanyId.eq(company_id))
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("SKU {} not found", sku_id)))
    }

    /// Records a build. Every read and write happens inside one database
    /// transaction; any failure rolls the whole unit back, so no header
    /// without lines and no balance change without a line is ever
    /// observable.
    #[instrument(skip(self, input), fields(sku_id = %input.sku_id, units = input.units_to_build))]
    pub async fn create_build_transaction(
        &self,
        input: CreateBuildInput,
    ) -> Result<BuildOutcome, ServiceError> {
        input.validate()?;
        let output_quantity = input.output_quantity.unwrap_or(input.units_to_build);
        if output_quantity > input.units_to_build {
            return Err(ServiceError::ValidationError(format!(
                "output_quantity ({}) cannot exceed units_to_build ({})",
                output_quantity, input.units_to_build
            )));
        }

        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        // Resolve the SKU and recipe from inside the transaction scope, not
        // from any pre-fetched snapshot.
        let sku = Self::find_owned_sku(&txn, input.sku_id, input.company_id).await?;

        let version = match input.bom_version_id {
            Some(version_id) => {
                let version =
                    BomService::find_owned_version(&txn, version_id, input.company_id).await?;
                if version.sku_id != sku.id {
                    return Err(ServiceError::ValidationError(format!(
                        "BOM version {} does not belong to SKU {}",
                        version_id, sku.id
                    )));
                }
                version
            }
            None => BomService::find_active_version(&txn, sku.id, input.company_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("No active BOM version for SKU {}", sku.id))
                })?,
        };

        let bom_lines = BomService::fetch_lines(&txn, version.id).await?;
        if bom_lines.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "BOM version {} has no lines to build from",
                version.id
            )));
        }

        let component_ids: Vec<Uuid> = bom_lines.iter().map(|l| l.component_id).collect();
        let components =
            BomService::fetch_owned_components(&txn, &component_ids, input.company_id).await?;

        // Output location resolves before any write. Requesting output with
        // no resolvable location is fatal; silently skipping production
        // would leave finished-goods balances reading zero.
        let output_location_id = if input.output_to_finished_goods {
            match input.output_location_id {
                Some(location_id) => {
                    Some(LocationService::find_active(&txn, location_id, input.company_id)
                        .await?
                        .id)
                }
                None => Some(
                    LocationService::find_default_id(&txn, input.company_id)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::ConfigurationError(format!(
                                "Finished goods output requested but company {} has no default location",
                                input.company_id
                            ))
                        })?,
                ),
            }
        } else {
            None
        };

        if let Some(overrides) = &input.lot_overrides {
            LotService::validate_lot_overrides_on(&txn, overrides, input.company_id).await?;
        }

        // Authoritative sufficiency check, inside the same atomic scope the
        // consumption happens in, against the exact balance key the guarded
        // decrements will target.
        let balances = InventoryService::fetch_key_balances(
            &txn,
            &component_ids,
            input.company_id,
            input.location_id,
        )
        .await?;
        let shortages =
            compute_shortages(&bom_lines, &components, &balances, input.units_to_build);
        if !shortages.is_empty() && !input.allow_insufficient {
            return Err(ServiceError::InsufficientInventory(shortages));
        }
        if !shortages.is_empty() {
            warn!(
                "Proceeding with insufficient inventory for {} component(s)",
                shortages.len()
            );
        }

        let unit_cost = rollup_unit_cost(bom_lines.iter().map(|line| {
            let cost = components
                .get(&line.component_id)
                .map(|c| c.cost_per_unit)
                .unwrap_or(Decimal::ZERO);
            (line.quantity_per_unit, cost)
        }));
        let total_cost = unit_cost * Decimal::from(input.units_to_build);
        let unit_cost = unit_cost.round_dp(COST_PRECISION);
        let total_cost = total_cost.round_dp(COST_PRECISION);

        let now = Utc::now();
        let entry = ledger_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(input.company_id),
            entry_type: Set(LedgerEntryKind::Build.as_str().to_string()),
            entry_date: Set(input.entry_date),
            sku_id: Set(Some(sku.id)),
            bom_version_id: Set(Some(version.id)),
            location_id: Set(input.location_id),
            to_location_id: Set(None),
            supplier: Set(None),
            units_built: Set(Some(input.units_to_build)),
            unit_bom_cost: Set(Some(unit_cost)),
            total_bom_cost: Set(Some(total_cost)),
            defect_count: Set(input.defect_count),
            defect_notes: Set(input.defect_notes.clone()),
            affected_units: Set(input.affected_units),
            reversal_of: Set(None),
            created_by: Set(input.created_by_id),
            notes: Set(input.notes.clone()),
            created_at: Set(now),
        };
        let entry = entry.insert(&txn).await.map_err(ServiceError::db_error)?;

        // Allocate and consume per recipe line, then mirror every consumed
        // total into the component balance with a guarded decrement.
        let consumption = self
            .lot_service
            .consume_lots_for_build(
                &txn,
                &BuildConsumptionContext {
                    company_id: input.company_id,
                    ledger_entry_id: entry.id,
                    location_id: input.location_id,
                    units_to_build: input.units_to_build,
                    bom_lines: &bom_lines,
                    components: &components,
                    balances: &balances,
                    lot_overrides: input.lot_overrides.as_deref(),
                    allow_insufficient: input.allow_insufficient,
                },
            )
            .await?;

        for (component_id, consumed) in &consumption.consumed {
            let ok = InventoryService::try_decrement_balance(
                &txn,
                input.company_id,
                *component_id,
                input.location_id,
                *consumed,
            )
            .await?;
            if !ok {
                let component_name = components
                    .get(component_id)
                    .map(|c| c.name.clone())
                    .unwrap_or_default();
                let available = balances.get(component_id).copied().unwrap_or(Decimal::ZERO);
                return Err(ServiceError::InsufficientInventory(vec![ComponentShortage {
                    component_id: *component_id,
                    component_name,
                    required: *consumed,
                    available,
                    shortage: *consumed - available,
                }]));
            }
        }

        // Record production and bring the finished-goods balance up.
        let mut fg_line_id = None;
        if let Some(location_id) = output_location_id {
            if output_quantity > 0 {
                let produced = Decimal::from(output_quantity);
                let fg_line = finished_goods_line::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    company_id: Set(input.company_id),
                    ledger_entry_id: Set(entry.id),
                    sku_id: Set(sku.id),
                    location_id: Set(location_id),
                    quantity_change: Set(produced),
                    created_at: Set(now),
                };
                let inserted = fg_line.insert(&txn).await.map_err(ServiceError::db_error)?;
                fg_line_id = Some(inserted.id);

                InventoryService::increment_finished_goods(
                    &txn,
                    input.company_id,
                    sku.id,
                    location_id,
                    produced,
                )
                .await?;
            }
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("buildstock.builds.created", 1);
        histogram!("buildstock.builds.units", input.units_to_build as f64);
        histogram!(
            "buildstock.builds.total_cost",
            total_cost.to_f64().unwrap_or(0.0)
        );

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::BuildCompleted {
                    ledger_entry_id: entry.id,
                    sku_id: sku.id,
                    units_built: input.units_to_build,
                    output_quantity,
                    total_bom_cost: total_cost,
                })
                .await;

            // Fire-and-forget defect alerting; a failure here must never
            // affect the already-committed build.
            if let (Some(threshold), Some(defect_count)) =
                (self.defect_alert_threshold, input.defect_count)
            {
                if defect_count >= threshold {
                    sender
                        .send_or_log(Event::DefectThresholdExceeded {
                            ledger_entry_id: entry.id,
                            sku_id: sku.id,
                            defect_count,
                            affected_units: input.affected_units,
                        })
                        .await;
                }
            }
        }

        info!(
            "Build recorded: entry={}, sku={}, units={}, total_cost={}",
            entry.id, sku.id, input.units_to_build, total_cost
        );

        self.fetch_outcome(entry.id, fg_line_id, unit_cost, total_cost)
            .await
    }

    /// Post-commit re-fetch of the entry with its lines for the return
    /// value.
    async fn fetch_outcome(
        &self,
        entry_id: Uuid,
        fg_line_id: Option<Uuid>,
        unit_bom_cost: Decimal,
        total_bom_cost: Decimal,
    ) -> Result<BuildOutcome, ServiceError> {
        let db = &*self.db;

        let entry = LedgerEntryEntity::find_by_id(entry_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Committed build entry {} could not be re-fetched",
                    entry_id
                ))
            })?;

        let lines = LedgerLineEntity::find()
            .filter(ledger_line::Column::LedgerEntryId.eq(entry_id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let finished_goods_line = match fg_line_id {
            Some(id) => FinishedGoodsLineEntity::find_by_id(id)
                .one(db)
                .await
                .map_err(ServiceError::db_error)?,
            None => None,
        };

        Ok(BuildOutcome {
            entry,
            lines,
            finished_goods_line,
            unit_bom_cost,
            total_bom_cost,
        })
    }
}
