use chrono::{DateTime, NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, Select, TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        bom_line,
        component::{self, Entity as ComponentEntity},
        finished_goods_balance::{self, Entity as FinishedGoodsBalanceEntity},
        finished_goods_line::{self, Entity as FinishedGoodsLineEntity},
        inventory_balance::{self, Entity as InventoryBalanceEntity},
        ledger_entry::{self, Entity as LedgerEntryEntity, LedgerEntryKind},
        ledger_line::{self, Entity as LedgerLineEntity},
        lot::{self, Entity as LotEntity},
        sku::{self, Entity as SkuEntity},
    },
    errors::{ComponentShortage, ServiceError},
    events::{Event, EventSender},
    services::{bom::BomService, locations::LocationService},
};

/// Input payload for receiving components into stock
#[derive(Debug, Clone)]
pub struct ReceiveComponentsInput {
    pub company_id: Uuid,
    pub component_id: Uuid,
    pub location_id: Option<Uuid>,
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub lot_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    pub received_date: Option<NaiveDate>,
    pub supplier: Option<String>,
    pub entry_date: DateTime<Utc>,
    pub created_by: Uuid,
    pub notes: Option<String>,
}

/// Input payload for seeding an opening balance
#[derive(Debug, Clone)]
pub struct InitialBalanceInput {
    pub company_id: Uuid,
    pub component_id: Uuid,
    pub location_id: Option<Uuid>,
    pub quantity: Decimal,
    pub entry_date: DateTime<Utc>,
    pub created_by: Uuid,
    pub notes: Option<String>,
}

/// Input payload for a signed inventory adjustment
#[derive(Debug, Clone)]
pub struct AdjustInventoryInput {
    pub company_id: Uuid,
    pub component_id: Uuid,
    pub location_id: Option<Uuid>,
    pub lot_id: Option<Uuid>,
    pub quantity_change: Decimal,
    pub entry_date: DateTime<Utc>,
    pub created_by: Uuid,
    pub notes: Option<String>,
}

/// Input payload for moving stock between locations
#[derive(Debug, Clone)]
pub struct TransferInventoryInput {
    pub company_id: Uuid,
    pub component_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub quantity: Decimal,
    pub entry_date: DateTime<Utc>,
    pub created_by: Uuid,
    pub notes: Option<String>,
}

/// Input payload for shipping finished goods out
#[derive(Debug, Clone)]
pub struct OutboundShipmentInput {
    pub company_id: Uuid,
    pub sku_id: Uuid,
    pub location_id: Uuid,
    pub quantity: Decimal,
    pub entry_date: DateTime<Utc>,
    pub created_by: Uuid,
    pub notes: Option<String>,
}

/// Per-line shortage computation shared by the advisory pre-flight check and
/// the orchestrator's authoritative in-transaction re-check.
pub fn compute_shortages(
    lines: &[bom_line::Model],
    components: &HashMap<Uuid, component::Model>,
    balances: &HashMap<Uuid, Decimal>,
    units_to_build: i64,
) -> Vec<ComponentShortage> {
    let units = Decimal::from(units_to_build);
    let mut shortages = Vec::new();

    for line in lines {
        if line.quantity_per_unit.is_zero() {
            continue;
        }
        let required = line.quantity_per_unit * units;
        let available = balances
            .get(&line.component_id)
            .copied()
            .unwrap_or(Decimal::ZERO);

        if available < required {
            let component_name = components
                .get(&line.component_id)
                .map(|c| c.name.clone())
                .unwrap_or_default();
            shortages.push(ComponentShortage {
                component_id: line.component_id,
                component_name,
                required,
                available,
                shortage: required - available,
            });
        }
    }

    shortages
}

/// Inventory balances, the sufficiency check, and the non-build ledger
/// writers (receipt, initial, adjustment, transfer, outbound, reversal).
/// Balances are never mutated outside a ledger-entry-producing operation.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    fn balance_key_filter(
        query: Select<InventoryBalanceEntity>,
        company_id: Uuid,
        component_id: Uuid,
        location_id: Option<Uuid>,
    ) -> Select<InventoryBalanceEntity> {
        let query = query
            .filter(inventory_balance::Column::CompanyId.eq(company_id))
            .filter(inventory_balance::Column::ComponentId.eq(component_id));
        match location_id {
            Some(location_id) => {
                query.filter(inventory_balance::Column::LocationId.eq(location_id))
            }
            None => query.filter(inventory_balance::Column::LocationId.is_null()),
        }
    }

    /// On-hand quantity per component at the exact balance key the writers
    /// hit: one location's rows, or the NULL-location pool. The sufficiency
    /// check must read the same key the guarded decrements will target, or
    /// check and act could disagree.
    pub async fn fetch_key_balances<C: ConnectionTrait>(
        conn: &C,
        component_ids: &[Uuid],
        company_id: Uuid,
        location_id: Option<Uuid>,
    ) -> Result<HashMap<Uuid, Decimal>, ServiceError> {
        if component_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = InventoryBalanceEntity::find()
            .filter(inventory_balance::Column::CompanyId.eq(company_id))
            .filter(inventory_balance::Column::ComponentId.is_in(component_ids.to_vec()));
        query = match location_id {
            Some(location_id) => {
                query.filter(inventory_balance::Column::LocationId.eq(location_id))
            }
            None => query.filter(inventory_balance::Column::LocationId.is_null()),
        };

        let rows = query.all(conn).await.map_err(ServiceError::db_error)?;

        let mut balances: HashMap<Uuid, Decimal> = HashMap::new();
        for row in rows {
            *balances.entry(row.component_id).or_insert(Decimal::ZERO) += row.quantity_on_hand;
        }

        Ok(balances)
    }

    /// Adds to a balance row, creating it when absent. Additions need no
    /// guard; the column expression keeps the add atomic.
    pub async fn increment_balance<C: ConnectionTrait>(
        conn: &C,
        company_id: Uuid,
        component_id: Uuid,
        location_id: Option<Uuid>,
        quantity: Decimal,
    ) -> Result<(), ServiceError> {
        if quantity.is_zero() {
            return Ok(());
        }

        let existing = Self::balance_key_filter(
            InventoryBalanceEntity::find(),
            company_id,
            component_id,
            location_id,
        )
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

        match existing {
            Some(row) => {
                InventoryBalanceEntity::update_many()
                    .col_expr(
                        inventory_balance::Column::QuantityOnHand,
                        Expr::col(inventory_balance::Column::QuantityOnHand).add(quantity),
                    )
                    .col_expr(inventory_balance::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(inventory_balance::Column::Id.eq(row.id))
                    .exec(conn)
                    .await
                    .map_err(ServiceError::db_error)?;
            }
            None => {
                let now = Utc::now();
                let model = inventory_balance::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    company_id: Set(company_id),
                    component_id: Set(component_id),
                    location_id: Set(location_id),
                    quantity_on_hand: Set(quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                model.insert(conn).await.map_err(ServiceError::db_error)?;
            }
        }

        Ok(())
    }

    /// Conditional decrement: `UPDATE ... WHERE quantity_on_hand >= q`.
    /// Returns false when the guard failed (insufficient balance), leaving
    /// the row untouched. This, not read-then-write, is what keeps two
    /// concurrent consumers from jointly overdrawing a balance.
    pub async fn try_decrement_balance<C: ConnectionTrait>(
        conn: &C,
        company_id: Uuid,
        component_id: Uuid,
        location_id: Option<Uuid>,
        quantity: Decimal,
    ) -> Result<bool, ServiceError> {
        if quantity.is_zero() {
            return Ok(true);
        }

        let mut update = InventoryBalanceEntity::update_many()
            .col_expr(
                inventory_balance::Column::QuantityOnHand,
                Expr::col(inventory_balance::Column::QuantityOnHand).sub(quantity),
            )
            .col_expr(inventory_balance::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_balance::Column::CompanyId.eq(company_id))
            .filter(inventory_balance::Column::ComponentId.eq(component_id))
            .filter(inventory_balance::Column::QuantityOnHand.gte(quantity));
        update = match location_id {
            Some(location_id) => {
                update.filter(inventory_balance::Column::LocationId.eq(location_id))
            }
            None => update.filter(inventory_balance::Column::LocationId.is_null()),
        };

        let result = update.exec(conn).await.map_err(ServiceError::db_error)?;
        Ok(result.rows_affected > 0)
    }

    pub async fn increment_finished_goods<C: ConnectionTrait>(
        conn: &C,
        company_id: Uuid,
        sku_id: Uuid,
        location_id: Uuid,
        quantity: Decimal,
    ) -> Result<(), ServiceError> {
        if quantity.is_zero() {
            return Ok(());
        }

        let existing = FinishedGoodsBalanceEntity::find()
            .filter(finished_goods_balance::Column::CompanyId.eq(company_id))
            .filter(finished_goods_balance::Column::SkuId.eq(sku_id))
            .filter(finished_goods_balance::Column::LocationId.eq(location_id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        match existing {
            Some(row) => {
                FinishedGoodsBalanceEntity::update_many()
                    .col_expr(
                        finished_goods_balance::Column::QuantityOnHand,
                        Expr::col(finished_goods_balance::Column::QuantityOnHand).add(quantity),
                    )
                    .col_expr(
                        finished_goods_balance::Column::UpdatedAt,
                        Expr::value(Utc::now()),
                    )
                    .filter(finished_goods_balance::Column::Id.eq(row.id))
                    .exec(conn)
                    .await
                    .map_err(ServiceError::db_error)?;
            }
            None => {
                let now = Utc::now();
                let model = finished_goods_balance::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    company_id: Set(company_id),
                    sku_id: Set(sku_id),
                    location_id: Set(location_id),
                    quantity_on_hand: Set(quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                model.insert(conn).await.map_err(ServiceError::db_error)?;
            }
        }

        Ok(())
    }

    pub async fn try_decrement_finished_goods<C: ConnectionTrait>(
        conn: &C,
        company_id: Uuid,
        sku_id: Uuid,
        location_id: Uuid,
        quantity: Decimal,
    ) -> Result<bool, ServiceError> {
        if quantity.is_zero() {
            return Ok(true);
        }

        let result = FinishedGoodsBalanceEntity::update_many()
            .col_expr(
                finished_goods_balance::Column::QuantityOnHand,
                Expr::col(finished_goods_balance::Column::QuantityOnHand).sub(quantity),
            )
            .col_expr(
                finished_goods_balance::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(finished_goods_balance::Column::CompanyId.eq(company_id))
            .filter(finished_goods_balance::Column::SkuId.eq(sku_id))
            .filter(finished_goods_balance::Column::LocationId.eq(location_id))
            .filter(finished_goods_balance::Column::QuantityOnHand.gte(quantity))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(result.rows_affected > 0)
    }

    async fn find_owned_component<C: ConnectionTrait>(
        conn: &C,
        component_id: Uuid,
        company_id: Uuid,
    ) -> Result<component::Model, ServiceError> {
        ComponentEntity::find_by_id(component_id)
            .filter(component::Column::CompanyId.eq(company_id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Component {} not found", component_id))
            })
    }

    async fn find_owned_sku<C: ConnectionTrait>(
        conn: &C,
        sku_id: Uuid,
        company_id: Uuid,
    ) -> Result<sku::Model, ServiceError> {
        SkuEntity::find_by_id(sku_id)
            .filter(sku::Column::CompanyId.eq(company_id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("SKU {} not found", sku_id)))
    }

    /// Current on-hand quantity for a key; zero when no row exists yet.
    #[instrument(skip(self))]
    pub async fn get_inventory_balance(
        &self,
        component_id: Uuid,
        company_id: Uuid,
        location_id: Option<Uuid>,
    ) -> Result<Decimal, ServiceError> {
        let row = Self::balance_key_filter(
            InventoryBalanceEntity::find(),
            company_id,
            component_id,
            location_id,
        )
        .one(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        Ok(row.map(|b| b.quantity_on_hand).unwrap_or(Decimal::ZERO))
    }

    /// Total on-hand across every location (including the pooled row).
    #[instrument(skip(self))]
    pub async fn get_total_inventory(
        &self,
        component_id: Uuid,
        company_id: Uuid,
    ) -> Result<Decimal, ServiceError> {
        let rows = InventoryBalanceEntity::find()
            .filter(inventory_balance::Column::CompanyId.eq(company_id))
            .filter(inventory_balance::Column::ComponentId.eq(component_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(rows.iter().map(|b| b.quantity_on_hand).sum())
    }

    /// Advisory pre-flight sufficiency check for a requested build size.
    /// Returns an empty list when fully sufficient. The orchestrator repeats
    /// this inside its atomic scope; this variant exists for UI validation
    /// ahead of the commit.
    #[instrument(skip(self))]
    pub async fn check_insufficient_inventory(
        &self,
        bom_version_id: Uuid,
        company_id: Uuid,
        units_to_build: i64,
        location_id: Option<Uuid>,
    ) -> Result<Vec<ComponentShortage>, ServiceError> {
        if units_to_build <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "units_to_build must be positive, got: {}",
                units_to_build
            )));
        }

        let db = &*self.db;
        BomService::find_owned_version(db, bom_version_id, company_id).await?;

        let lines = BomService::fetch_lines(db, bom_version_id).await?;
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let component_ids: Vec<Uuid> = lines.iter().map(|l| l.component_id).collect();
        let components = BomService::fetch_owned_components(db, &component_ids, company_id).await?;
        let balances =
            Self::fetch_key_balances(db, &component_ids, company_id, location_id).await?;

        Ok(compute_shortages(&lines, &components, &balances, units_to_build))
    }

    /// Records a receipt: optional lot creation, a positive ledger line, the
    /// balance increment, and (when a unit cost is supplied) a standard-cost
    /// update on the component, all in one atomic unit.
    #[instrument(skip(self, input))]
    pub async fn receive_components(
        &self,
        input: ReceiveComponentsInput,
    ) -> Result<ledger_entry::Model, ServiceError> {
        if input.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Receipt quantity must be positive, got: {}",
                input.quantity
            )));
        }

        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let component = Self::find_owned_component(&txn, input.component_id, input.company_id).await?;
        let unit_cost = input.unit_cost.unwrap_or(component.cost_per_unit);

        let now = Utc::now();
        let lot_id = if let Some(lot_number) = &input.lot_number {
            let lot = lot::ActiveModel {
                id: Set(Uuid::new_v4()),
                company_id: Set(input.company_id),
                component_id: Set(input.component_id),
                lot_number: Set(lot_number.clone()),
                quantity: Set(input.quantity),
                original_quantity: Set(input.quantity),
                quantity_reserved: Set(Decimal::ZERO),
                unit_cost: Set(Some(unit_cost)),
                expiration_date: Set(input.expiration_date),
                received_date: Set(input
                    .received_date
                    .unwrap_or_else(|| input.entry_date.date_naive())),
                supplier: Set(input.supplier.clone()),
                notes: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            };
            Some(lot.insert(&txn).await.map_err(ServiceError::db_error)?.id)
        } else {
            None
        };

        let entry = ledger_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(input.company_id),
            entry_type: Set(LedgerEntryKind::Receipt.as_str().to_string()),
            entry_date: Set(input.entry_date),
            sku_id: Set(None),
            bom_version_id: Set(None),
            location_id: Set(input.location_id),
            to_location_id: Set(None),
            supplier: Set(input.supplier.clone()),
            units_built: Set(None),
            unit_bom_cost: Set(None),
            total_bom_cost: Set(None),
            defect_count: Set(None),
            defect_notes: Set(None),
            affected_units: Set(None),
            reversal_of: Set(None),
            created_by: Set(input.created_by),
            notes: Set(input.notes.clone()),
            created_at: Set(now),
        };
        let entry = entry.insert(&txn).await.map_err(ServiceError::db_error)?;

        let line = ledger_line::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(input.company_id),
            ledger_entry_id: Set(entry.id),
            component_id: Set(input.component_id),
            lot_id: Set(lot_id),
            location_id: Set(input.location_id),
            quantity_change: Set(input.quantity),
            unit_cost: Set(unit_cost),
            created_at: Set(now),
        };
        line.insert(&txn).await.map_err(ServiceError::db_error)?;

        Self::increment_balance(
            &txn,
            input.company_id,
            input.component_id,
            input.location_id,
            input.quantity,
        )
        .await?;

        if input.unit_cost.is_some() && unit_cost != component.cost_per_unit {
            let mut active: component::ActiveModel = component.into();
            active.cost_per_unit = Set(unit_cost);
            active.updated_at = Set(now);
            active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("buildstock.ledger.receipts", 1);

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ComponentsReceived {
                    ledger_entry_id: entry.id,
                    component_id: input.component_id,
                    lot_id,
                    quantity: input.quantity,
                })
                .await;
        }

        info!(
            "Receipt recorded: component={}, quantity={}, lot={:?}",
            input.component_id, input.quantity, lot_id
        );

        Ok(entry)
    }

    /// Seeds an opening balance through the ledger, so even the first
    /// quantity a tenant ever sees is backed by an entry.
    #[instrument(skip(self, input))]
    pub async fn set_initial_balance(
        &self,
        input: InitialBalanceInput,
    ) -> Result<ledger_entry::Model, ServiceError> {
        if input.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Initial quantity must be positive, got: {}",
                input.quantity
            )));
        }

        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let component = Self::find_owned_component(&txn, input.component_id, input.company_id).await?;

        let now = Utc::now();
        let entry = ledger_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(input.company_id),
            entry_type: Set(LedgerEntryKind::Initial.as_str().to_string()),
            entry_date: Set(input.entry_date),
            sku_id: Set(None),
            bom_version_id: Set(None),
            location_id: Set(input.location_id),
            to_location_id: Set(None),
            supplier: Set(None),
            units_built: Set(None),
            unit_bom_cost: Set(None),
            total_bom_cost: Set(None),
            defect_count: Set(None),
            defect_notes: Set(None),
            affected_units: Set(None),
            reversal_of: Set(None),
            created_by: Set(input.created_by),
            notes: Set(input.notes.clone()),
            created_at: Set(now),
        };
        let entry = entry.insert(&txn).await.map_err(ServiceError::db_error)?;

        let line = ledger_line::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(input.company_id),
            ledger_entry_id: Set(entry.id),
            component_id: Set(input.component_id),
            lot_id: Set(None),
            location_id: Set(input.location_id),
            quantity_change: Set(input.quantity),
            unit_cost: Set(component.cost_per_unit),
            created_at: Set(now),
        };
        line.insert(&txn).await.map_err(ServiceError::db_error)?;

        Self::increment_balance(
            &txn,
            input.company_id,
            input.component_id,
            input.location_id,
            input.quantity,
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("buildstock.ledger.initial_balances", 1);

        Ok(entry)
    }

    /// Records a signed adjustment, optionally scoped to a lot. Negative
    /// deltas use conditional decrements on both the lot and the balance.
    #[instrument(skip(self, input))]
    pub async fn adjust_inventory(
        &self,
        input: AdjustInventoryInput,
    ) -> Result<ledger_entry::Model, ServiceError> {
        if input.quantity_change.is_zero() {
            return Err(ServiceError::ValidationError(
                "Adjustment quantity_change cannot be zero".to_string(),
            ));
        }

        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let component = Self::find_owned_component(&txn, input.component_id, input.company_id).await?;

        if let Some(lot_id) = input.lot_id {
            let lot = LotEntity::find_by_id(lot_id)
                .filter(lot::Column::CompanyId.eq(input.company_id))
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| ServiceError::NotFound(format!("Lot {} not found", lot_id)))?;

            if lot.component_id != input.component_id {
                return Err(ServiceError::InvalidOperation(format!(
                    "Lot {} does not belong to component {}",
                    lot_id, input.component_id
                )));
            }

            if input.quantity_change < Decimal::ZERO {
                let needed = -input.quantity_change;
                let result = LotEntity::update_many()
                    .col_expr(
                        lot::Column::Quantity,
                        Expr::col(lot::Column::Quantity).sub(needed),
                    )
                    .col_expr(lot::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(lot::Column::Id.eq(lot_id))
                    .filter(lot::Column::Quantity.gte(needed))
                    .exec(&txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                if result.rows_affected == 0 {
                    return Err(ServiceError::InsufficientLotQuantity {
                        component_id: input.component_id,
                        requested: needed,
                        available: lot.quantity,
                    });
                }
            } else {
                LotEntity::update_many()
                    .col_expr(
                        lot::Column::Quantity,
                        Expr::col(lot::Column::Quantity).add(input.quantity_change),
                    )
                    .col_expr(lot::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(lot::Column::Id.eq(lot_id))
                    .exec(&txn)
                    .await
                    .map_err(ServiceError::db_error)?;
            }
        }

        let now = Utc::now();
        let entry = ledger_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(input.company_id),
            entry_type: Set(LedgerEntryKind::Adjustment.as_str().to_string()),
            entry_date: Set(input.entry_date),
            sku_id: Set(None),
            bom_version_id: Set(None),
            location_id: Set(input.location_id),
            to_location_id: Set(None),
            supplier: Set(None),
            units_built: Set(None),
            unit_bom_cost: Set(None),
            total_bom_cost: Set(None),
            defect_count: Set(None),
            defect_notes: Set(None),
            affected_units: Set(None),
            reversal_of: Set(None),
            created_by: Set(input.created_by),
            notes: Set(input.notes.clone()),
            created_at: Set(now),
        };
        let entry = entry.insert(&txn).await.map_err(ServiceError::db_error)?;

        let line = ledger_line::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(input.company_id),
            ledger_entry_id: Set(entry.id),
            component_id: Set(input.component_id),
            lot_id: Set(input.lot_id),
            location_id: Set(input.location_id),
            quantity_change: Set(input.quantity_change),
            unit_cost: Set(component.cost_per_unit),
            created_at: Set(now),
        };
        line.insert(&txn).await.map_err(ServiceError::db_error)?;

        if input.quantity_change > Decimal::ZERO {
            Self::increment_balance(
                &txn,
                input.company_id,
                input.component_id,
                input.location_id,
                input.quantity_change,
            )
            .await?;
        } else {
            let needed = -input.quantity_change;
            let ok = Self::try_decrement_balance(
                &txn,
                input.company_id,
                input.component_id,
                input.location_id,
                needed,
            )
            .await?;
            if !ok {
                let available = Self::balance_key_filter(
                    InventoryBalanceEntity::find(),
                    input.company_id,
                    input.component_id,
                    input.location_id,
                )
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?
                .map(|b| b.quantity_on_hand)
                .unwrap_or(Decimal::ZERO);

                return Err(ServiceError::InsufficientInventory(vec![ComponentShortage {
                    component_id: input.component_id,
                    component_name: component.name.clone(),
                    required: needed,
                    available,
                    shortage: needed - available,
                }]));
            }
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("buildstock.ledger.adjustments", 1);

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::InventoryAdjusted {
                    ledger_entry_id: entry.id,
                    component_id: input.component_id,
                    quantity_change: input.quantity_change,
                })
                .await;
        }

        Ok(entry)
    }

    /// Moves stock between two active locations: one entry, paired -/+
    /// lines, source conditionally decremented.
    #[instrument(skip(self, input))]
    pub async fn transfer_inventory(
        &self,
        input: TransferInventoryInput,
    ) -> Result<ledger_entry::Model, ServiceError> {
        if input.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Transfer quantity must be positive, got: {}",
                input.quantity
            )));
        }
        if input.from_location_id == input.to_location_id {
            return Err(ServiceError::ValidationError(
                "Transfer source and destination must differ".to_string(),
            ));
        }

        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let component = Self::find_owned_component(&txn, input.component_id, input.company_id).await?;
        LocationService::find_active(&txn, input.from_location_id, input.company_id).await?;
        LocationService::find_active(&txn, input.to_location_id, input.company_id).await?;

        let now = Utc::now();
        let entry = ledger_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(input.company_id),
            entry_type: Set(LedgerEntryKind::Transfer.as_str().to_string()),
            entry_date: Set(input.entry_date),
            sku_id: Set(None),
            bom_version_id: Set(None),
            location_id: Set(Some(input.from_location_id)),
            to_location_id: Set(Some(input.to_location_id)),
            supplier: Set(None),
            units_built: Set(None),
            unit_bom_cost: Set(None),
            total_bom_cost: Set(None),
            defect_count: Set(None),
            defect_notes: Set(None),
            affected_units: Set(None),
            reversal_of: Set(None),
            created_by: Set(input.created_by),
            notes: Set(input.notes.clone()),
            created_at: Set(now),
        };
        let entry = entry.insert(&txn).await.map_err(ServiceError::db_error)?;

        for (location_id, quantity_change) in [
            (input.from_location_id, -input.quantity),
            (input.to_location_id, input.quantity),
        ] {
            let line = ledger_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                company_id: Set(input.company_id),
                ledger_entry_id: Set(entry.id),
                component_id: Set(input.component_id),
                lot_id: Set(None),
                location_id: Set(Some(location_id)),
                quantity_change: Set(quantity_change),
                unit_cost: Set(component.cost_per_unit),
                created_at: Set(now),
            };
            line.insert(&txn).await.map_err(ServiceError::db_error)?;
        }

        let ok = Self::try_decrement_balance(
            &txn,
            input.company_id,
            input.component_id,
            Some(input.from_location_id),
            input.quantity,
        )
        .await?;
        if !ok {
            let available = Self::balance_key_filter(
                InventoryBalanceEntity::find(),
                input.company_id,
                input.component_id,
                Some(input.from_location_id),
            )
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .map(|b| b.quantity_on_hand)
            .unwrap_or(Decimal::ZERO);

            return Err(ServiceError::InsufficientInventory(vec![ComponentShortage {
                component_id: input.component_id,
                component_name: component.name.clone(),
                required: input.quantity,
                available,
                shortage: input.quantity - available,
            }]));
        }

        Self::increment_balance(
            &txn,
            input.company_id,
            input.component_id,
            Some(input.to_location_id),
            input.quantity,
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("buildstock.ledger.transfers", 1);

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::InventoryTransferred {
                    ledger_entry_id: entry.id,
                    component_id: input.component_id,
                    from_location_id: input.from_location_id,
                    to_location_id: input.to_location_id,
                    quantity: input.quantity,
                })
                .await;
        }

        Ok(entry)
    }

    /// Ships finished goods out: an outbound entry with a negative
    /// finished-goods line and a conditional balance decrement.
    #[instrument(skip(self, input))]
    pub async fn record_outbound_shipment(
        &self,
        input: OutboundShipmentInput,
    ) -> Result<ledger_entry::Model, ServiceError> {
        if input.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Outbound quantity must be positive, got: {}",
                input.quantity
            )));
        }

        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        Self::find_owned_sku(&txn, input.sku_id, input.company_id).await?;
        LocationService::find_active(&txn, input.location_id, input.company_id).await?;

        let now = Utc::now();
        let entry = ledger_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(input.company_id),
            entry_type: Set(LedgerEntryKind::Outbound.as_str().to_string()),
            entry_date: Set(input.entry_date),
            sku_id: Set(Some(input.sku_id)),
            bom_version_id: Set(None),
            location_id: Set(Some(input.location_id)),
            to_location_id: Set(None),
            supplier: Set(None),
            units_built: Set(None),
            unit_bom_cost: Set(None),
            total_bom_cost: Set(None),
            defect_count: Set(None),
            defect_notes: Set(None),
            affected_units: Set(None),
            reversal_of: Set(None),
            created_by: Set(input.created_by),
            notes: Set(input.notes.clone()),
            created_at: Set(now),
        };
        let entry = entry.insert(&txn).await.map_err(ServiceError::db_error)?;

        let line = finished_goods_line::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(input.company_id),
            ledger_entry_id: Set(entry.id),
            sku_id: Set(input.sku_id),
            location_id: Set(input.location_id),
            quantity_change: Set(-input.quantity),
            created_at: Set(now),
        };
        line.insert(&txn).await.map_err(ServiceError::db_error)?;

        let ok = Self::try_decrement_finished_goods(
            &txn,
            input.company_id,
            input.sku_id,
            input.location_id,
            input.quantity,
        )
        .await?;
        if !ok {
            let available = FinishedGoodsBalanceEntity::find()
                .filter(finished_goods_balance::Column::CompanyId.eq(input.company_id))
                .filter(finished_goods_balance::Column::SkuId.eq(input.sku_id))
                .filter(finished_goods_balance::Column::LocationId.eq(input.location_id))
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?
                .map(|b| b.quantity_on_hand)
                .unwrap_or(Decimal::ZERO);

            return Err(ServiceError::InsufficientFinishedGoods {
                sku_id: input.sku_id,
                requested: input.quantity,
                available,
            });
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("buildstock.ledger.outbound_shipments", 1);

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::OutboundShipmentRecorded {
                    ledger_entry_id: entry.id,
                    sku_id: input.sku_id,
                    quantity: input.quantity,
                })
                .await;
        }

        Ok(entry)
    }

    /// Creates a compensating entry negating every line of an existing
    /// entry. History is never edited in place; this is the only correction
    /// mechanism. Reversals cannot themselves be reversed, and an entry can
    /// only be reversed once.
    #[instrument(skip(self))]
    pub async fn reverse_ledger_entry(
        &self,
        entry_id: Uuid,
        company_id: Uuid,
        created_by: Uuid,
    ) -> Result<ledger_entry::Model, ServiceError> {
        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let original = LedgerEntryEntity::find_by_id(entry_id)
            .filter(ledger_entry::Column::CompanyId.eq(company_id))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Ledger entry {} not found", entry_id)))?;

        if original.reversal_of.is_some() {
            return Err(ServiceError::InvalidOperation(
                "Cannot reverse a reversal entry".to_string(),
            ));
        }

        let already_reversed = LedgerEntryEntity::find()
            .filter(ledger_entry::Column::CompanyId.eq(company_id))
            .filter(ledger_entry::Column::ReversalOf.eq(entry_id))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if already_reversed.is_some() {
            return Err(ServiceError::InvalidOperation(format!(
                "Ledger entry {} has already been reversed",
                entry_id
            )));
        }

        let lines = LedgerLineEntity::find()
            .filter(ledger_line::Column::LedgerEntryId.eq(entry_id))
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let fg_lines = FinishedGoodsLineEntity::find()
            .filter(finished_goods_line::Column::LedgerEntryId.eq(entry_id))
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let now = Utc::now();
        let reversal = ledger_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(company_id),
            entry_type: Set(original.entry_type.clone()),
            entry_date: Set(now),
            sku_id: Set(original.sku_id),
            bom_version_id: Set(original.bom_version_id),
            location_id: Set(original.location_id),
            to_location_id: Set(original.to_location_id),
            supplier: Set(original.supplier.clone()),
            units_built: Set(None),
            unit_bom_cost: Set(None),
            total_bom_cost: Set(None),
            defect_count: Set(None),
            defect_notes: Set(None),
            affected_units: Set(None),
            reversal_of: Set(Some(original.id)),
            created_by: Set(created_by),
            notes: Set(Some(format!("Reversal of ledger entry {}", original.id))),
            created_at: Set(now),
        };
        let reversal = reversal.insert(&txn).await.map_err(ServiceError::db_error)?;

        for line in &lines {
            let negated = ledger_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                company_id: Set(company_id),
                ledger_entry_id: Set(reversal.id),
                component_id: Set(line.component_id),
                lot_id: Set(line.lot_id),
                location_id: Set(line.location_id),
                quantity_change: Set(-line.quantity_change),
                unit_cost: Set(line.unit_cost),
                created_at: Set(now),
            };
            negated.insert(&txn).await.map_err(ServiceError::db_error)?;

            // Undo the lot movement: consumed quantity goes back into the
            // lot, received quantity comes out (guarded).
            if let Some(lot_id) = line.lot_id {
                if line.quantity_change < Decimal::ZERO {
                    LotEntity::update_many()
                        .col_expr(
                            lot::Column::Quantity,
                            Expr::col(lot::Column::Quantity).add(-line.quantity_change),
                        )
                        .col_expr(lot::Column::UpdatedAt, Expr::value(now))
                        .filter(lot::Column::Id.eq(lot_id))
                        .exec(&txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                } else {
                    let result = LotEntity::update_many()
                        .col_expr(
                            lot::Column::Quantity,
                            Expr::col(lot::Column::Quantity).sub(line.quantity_change),
                        )
                        .col_expr(lot::Column::UpdatedAt, Expr::value(now))
                        .filter(lot::Column::Id.eq(lot_id))
                        .filter(lot::Column::Quantity.gte(line.quantity_change))
                        .exec(&txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if result.rows_affected == 0 {
                        return Err(ServiceError::InsufficientLotQuantity {
                            component_id: line.component_id,
                            requested: line.quantity_change,
                            available: Decimal::ZERO,
                        });
                    }
                }
            }

            let delta = -line.quantity_change;
            if delta > Decimal::ZERO {
                Self::increment_balance(
                    &txn,
                    company_id,
                    line.component_id,
                    line.location_id,
                    delta,
                )
                .await?;
            } else if delta < Decimal::ZERO {
                let needed = -delta;
                let ok = Self::try_decrement_balance(
                    &txn,
                    company_id,
                    line.component_id,
                    line.location_id,
                    needed,
                )
                .await?;
                if !ok {
                    return Err(ServiceError::InsufficientInventory(vec![ComponentShortage {
                        component_id: line.component_id,
                        component_name: String::new(),
                        required: needed,
                        available: Decimal::ZERO,
                        shortage: needed,
                    }]));
                }
            }
        }

        for fg_line in &fg_lines {
            let negated = finished_goods_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                company_id: Set(company_id),
                ledger_entry_id: Set(reversal.id),
                sku_id: Set(fg_line.sku_id),
                location_id: Set(fg_line.location_id),
                quantity_change: Set(-fg_line.quantity_change),
                created_at: Set(now),
            };
            negated.insert(&txn).await.map_err(ServiceError::db_error)?;

            let delta = -fg_line.quantity_change;
            if delta > Decimal::ZERO {
                Self::increment_finished_goods(
                    &txn,
                    company_id,
                    fg_line.sku_id,
                    fg_line.location_id,
                    delta,
                )
                .await?;
            } else if delta < Decimal::ZERO {
                let needed = -delta;
                let ok = Self::try_decrement_finished_goods(
                    &txn,
                    company_id,
                    fg_line.sku_id,
                    fg_line.location_id,
                    needed,
                )
                .await?;
                if !ok {
                    return Err(ServiceError::InsufficientFinishedGoods {
                        sku_id: fg_line.sku_id,
                        requested: needed,
                        available: Decimal::ZERO,
                    });
                }
            }
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("buildstock.ledger.reversals", 1);

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::LedgerEntryReversed {
                    original_entry_id: entry_id,
                    reversal_entry_id: reversal.id,
                })
                .await;
        }

        info!("Ledger entry {} reversed by {}", entry_id, reversal.id);

        Ok(reversal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn component_named(n: u128, name: &str) -> component::Model {
        component::Model {
            id: Uuid::from_u128(n),
            company_id: Uuid::from_u128(1),
            brand_id: None,
            sku_code: format!("CMP-{}", n),
            name: name.to_string(),
            unit_of_measure: "EA".to_string(),
            cost_per_unit: dec!(1.0000),
            reorder_point: None,
            lead_time_days: None,
            notes: None,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn bom_line_for(component: u128, quantity_per_unit: Decimal) -> bom_line::Model {
        bom_line::Model {
            id: Uuid::new_v4(),
            company_id: Uuid::from_u128(1),
            bom_version_id: Uuid::from_u128(50),
            component_id: Uuid::from_u128(component),
            quantity_per_unit,
            sequence: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn shortage_reports_required_available_and_gap() {
        let lines = vec![bom_line_for(10, dec!(3))];
        let components = HashMap::from([(Uuid::from_u128(10), component_named(10, "Bracket"))]);
        let balances = HashMap::from([(Uuid::from_u128(10), dec!(20))]);

        let shortages = compute_shortages(&lines, &components, &balances, 10);

        assert_eq!(shortages.len(), 1);
        let s = &shortages[0];
        assert_eq!(s.component_name, "Bracket");
        assert_eq!(s.required, dec!(30));
        assert_eq!(s.available, dec!(20));
        assert_eq!(s.shortage, dec!(10));
    }

    #[test]
    fn sufficient_inventory_yields_no_shortages() {
        let lines = vec![bom_line_for(10, dec!(2)), bom_line_for(11, dec!(1))];
        let components = HashMap::from([
            (Uuid::from_u128(10), component_named(10, "Bracket")),
            (Uuid::from_u128(11), component_named(11, "Screw")),
        ]);
        let balances = HashMap::from([
            (Uuid::from_u128(10), dec!(40)),
            (Uuid::from_u128(11), dec!(20)),
        ]);

        assert!(compute_shortages(&lines, &components, &balances, 20).is_empty());
    }

    #[test]
    fn missing_balance_counts_as_zero_available() {
        let lines = vec![bom_line_for(10, dec!(1))];
        let components = HashMap::from([(Uuid::from_u128(10), component_named(10, "Bracket"))]);
        let balances = HashMap::new();

        let shortages = compute_shortages(&lines, &components, &balances, 5);
        assert_eq!(shortages[0].available, Decimal::ZERO);
        assert_eq!(shortages[0].shortage, dec!(5));
    }

    #[test]
    fn zero_quantity_lines_never_report_shortage() {
        let lines = vec![bom_line_for(10, Decimal::ZERO)];
        let components = HashMap::from([(Uuid::from_u128(10), component_named(10, "Bracket"))]);
        let balances = HashMap::new();

        assert!(compute_shortages(&lines, &components, &balances, 100).is_empty());
    }
}
