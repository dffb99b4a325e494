use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::{
        bom_line,
        component::{self, Entity as ComponentEntity},
        ledger_line,
        lot::{self, Entity as LotEntity},
    },
    errors::ServiceError,
};

/// One slice of an allocation plan. A `None` lot means the quantity comes
/// from pooled (lot-untracked) inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotAllocation {
    pub lot_id: Option<Uuid>,
    pub quantity: Decimal,
}

/// Operator-directed lot picking for one component; bypasses FEFO entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotOverride {
    pub component_id: Uuid,
    pub allocations: Vec<LotOverrideAllocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotOverrideAllocation {
    pub lot_id: Uuid,
    pub quantity: Decimal,
}

/// FEFO ordering: expiry ascending with undated lots after all dated ones,
/// ties broken by received date, then creation time (oldest first).
pub fn fefo_cmp(a: &lot::Model, b: &lot::Model) -> Ordering {
    let expiry = match (a.expiration_date, b.expiration_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    expiry
        .then(a.received_date.cmp(&b.received_date))
        .then(a.created_at.cmp(&b.created_at))
}

/// Greedy FEFO allocation over `lots` (which must already be in FEFO order):
/// takes min(lot remaining, still required) from each lot in turn. A
/// component with zero lots falls back to a single pooled allocation for the
/// full requirement. When lots run dry, `allow_insufficient` decides between
/// a partial plan (callers must check the sum) and an error naming the
/// shortfall.
pub fn plan_allocations(
    lots: &[lot::Model],
    component_id: Uuid,
    required: Decimal,
    allow_insufficient: bool,
) -> Result<Vec<LotAllocation>, ServiceError> {
    if required < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "Required quantity for component {} must be non-negative",
            component_id
        )));
    }
    if required.is_zero() {
        return Ok(Vec::new());
    }

    if lots.is_empty() {
        return Ok(vec![LotAllocation {
            lot_id: None,
            quantity: required,
        }]);
    }

    let mut remaining = required;
    let mut allocations = Vec::new();

    for lot in lots {
        if remaining.is_zero() {
            break;
        }
        let take = lot.quantity.min(remaining);
        if take > Decimal::ZERO {
            allocations.push(LotAllocation {
                lot_id: Some(lot.id),
                quantity: take,
            });
            remaining -= take;
        }
    }

    if remaining > Decimal::ZERO && !allow_insufficient {
        return Err(ServiceError::InsufficientLotQuantity {
            component_id,
            requested: required,
            available: required - remaining,
        });
    }

    Ok(allocations)
}

/// Everything the in-transaction consumption writer needs from the
/// orchestrator's already-resolved state.
pub struct BuildConsumptionContext<'a> {
    pub company_id: Uuid,
    pub ledger_entry_id: Uuid,
    pub location_id: Option<Uuid>,
    pub units_to_build: i64,
    pub bom_lines: &'a [bom_line::Model],
    pub components: &'a HashMap<Uuid, component::Model>,
    pub balances: &'a HashMap<Uuid, Decimal>,
    pub lot_overrides: Option<&'a [LotOverride]>,
    pub allow_insufficient: bool,
}

/// Result of the consumption writer: the inserted ledger lines plus the
/// total consumed per component (what the balance updates must mirror).
pub struct BuildConsumption {
    pub lines: Vec<ledger_line::Model>,
    pub consumed: HashMap<Uuid, Decimal>,
}

/// FEFO allocation engine and lot-level write path
#[derive(Clone)]
pub struct LotService {
    db: Arc<DatabaseConnection>,
}

impl LotService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
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

    /// Positive-balance lots for a component in FEFO order. The comparator
    /// lives in code (`fefo_cmp`) so the exact tie-break is testable.
    pub async fn fetch_available_lots<C: ConnectionTrait>(
        conn: &C,
        component_id: Uuid,
        company_id: Uuid,
    ) -> Result<Vec<lot::Model>, ServiceError> {
        let mut lots = LotEntity::find()
            .filter(lot::Column::CompanyId.eq(company_id))
            .filter(lot::Column::ComponentId.eq(component_id))
            .filter(lot::Column::Quantity.gt(Decimal::ZERO))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        lots.sort_by(fefo_cmp);
        Ok(lots)
    }

    #[instrument(skip(self))]
    pub async fn get_available_lots_for_component(
        &self,
        component_id: Uuid,
        company_id: Uuid,
    ) -> Result<Vec<lot::Model>, ServiceError> {
        let db = &*self.db;
        Self::find_owned_component(db, component_id, company_id).await?;
        Self::fetch_available_lots(db, component_id, company_id).await
    }

    /// Plans (without writing) a FEFO consumption of `required_quantity`.
    #[instrument(skip(self))]
    pub async fn select_lots_for_consumption(
        &self,
        component_id: Uuid,
        company_id: Uuid,
        required_quantity: Decimal,
        allow_insufficient: bool,
    ) -> Result<Vec<LotAllocation>, ServiceError> {
        let db = &*self.db;
        Self::find_owned_component(db, component_id, company_id).await?;
        let lots = Self::fetch_available_lots(db, component_id, company_id).await?;
        plan_allocations(&lots, component_id, required_quantity, allow_insufficient)
    }

    /// Validates operator lot overrides, collecting every violation rather
    /// than failing on the first so the caller can fix all of them in one
    /// round-trip. Lots that are absent or belong to another tenant are both
    /// reported as not found.
    #[instrument(skip(self, overrides))]
    pub async fn validate_lot_overrides(
        &self,
        overrides: &[LotOverride],
        company_id: Uuid,
    ) -> Result<(), ServiceError> {
        Self::validate_lot_overrides_on(&*self.db, overrides, company_id).await
    }

    /// In-transaction variant of [`Self::validate_lot_overrides`].
    pub async fn validate_lot_overrides_on<C: ConnectionTrait>(
        conn: &C,
        overrides: &[LotOverride],
        company_id: Uuid,
    ) -> Result<(), ServiceError> {
        if overrides.is_empty() {
            return Ok(());
        }

        let mut component_ids: Vec<Uuid> = overrides.iter().map(|o| o.component_id).collect();
        component_ids.sort();
        component_ids.dedup();

        let mut lot_ids: Vec<Uuid> = overrides
            .iter()
            .flat_map(|o| o.allocations.iter().map(|a| a.lot_id))
            .collect();
        lot_ids.sort();
        lot_ids.dedup();

        let components: HashMap<Uuid, component::Model> = ComponentEntity::find()
            .filter(component::Column::CompanyId.eq(company_id))
            .filter(component::Column::Id.is_in(component_ids.clone()))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let lots: HashMap<Uuid, lot::Model> = if lot_ids.is_empty() {
            HashMap::new()
        } else {
            LotEntity::find()
                .filter(lot::Column::CompanyId.eq(company_id))
                .filter(lot::Column::Id.is_in(lot_ids))
                .all(conn)
                .await
                .map_err(ServiceError::db_error)?
                .into_iter()
                .map(|l| (l.id, l))
                .collect()
        };

        let mut errors = Vec::new();

        // Overlapping overrides against one lot must not jointly exceed its
        // balance, so requested quantities are summed per lot first.
        let mut requested_per_lot: HashMap<Uuid, Decimal> = HashMap::new();

        for entry in overrides {
            if !components.contains_key(&entry.component_id) {
                errors.push(format!("Component {} not found", entry.component_id));
            }
            if entry.allocations.is_empty() {
                errors.push(format!(
                    "Override for component {} has no allocations",
                    entry.component_id
                ));
            }

            for allocation in &entry.allocations {
                if allocation.quantity <= Decimal::ZERO {
                    errors.push(format!(
                        "Override quantity for lot {} must be positive",
                        allocation.lot_id
                    ));
                    continue;
                }

                let Some(lot) = lots.get(&allocation.lot_id) else {
                    errors.push(format!("Lot {} not found", allocation.lot_id));
                    continue;
                };

                if lot.component_id != entry.component_id {
                    errors.push(format!(
                        "Lot {} does not belong to component {}",
                        allocation.lot_id, entry.component_id
                    ));
                    continue;
                }

                *requested_per_lot
                    .entry(allocation.lot_id)
                    .or_insert(Decimal::ZERO) += allocation.quantity;
            }
        }

        for (lot_id, requested) in &requested_per_lot {
            if let Some(lot) = lots.get(lot_id) {
                if *requested > lot.quantity {
                    errors.push(format!(
                        "Lot {} has insufficient quantity: requested {}, available {}",
                        lot_id, requested, lot.quantity
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            errors.sort();
            Err(ServiceError::ConsistencyError(errors))
        }
    }

    /// Conditionally decrements a lot's remaining quantity inside the
    /// caller's transaction. The `quantity >= q` guard makes the decrement
    /// safe under concurrent writers; a failed guard reports the lot's
    /// current availability.
    async fn decrement_lot<C: ConnectionTrait>(
        conn: &C,
        lot_id: Uuid,
        company_id: Uuid,
        component_id: Uuid,
        quantity: Decimal,
    ) -> Result<(), ServiceError> {
        let result = LotEntity::update_many()
            .col_expr(
                lot::Column::Quantity,
                Expr::col(lot::Column::Quantity).sub(quantity),
            )
            .col_expr(lot::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(lot::Column::Id.eq(lot_id))
            .filter(lot::Column::CompanyId.eq(company_id))
            .filter(lot::Column::Quantity.gte(quantity))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            let available = LotEntity::find_by_id(lot_id)
                .filter(lot::Column::CompanyId.eq(company_id))
                .one(conn)
                .await
                .map_err(ServiceError::db_error)?
                .map(|l| l.quantity)
                .unwrap_or(Decimal::ZERO);

            return Err(ServiceError::InsufficientLotQuantity {
                component_id,
                requested: quantity,
                available,
            });
        }

        Ok(())
    }

    /// The write-side counterpart of allocation planning, executed inside the
    /// build orchestrator's transaction. Per BOM line it resolves
    /// allocations from the operator override when one names the component
    /// (the FEFO scan is not run in that case), otherwise by FEFO, then
    /// writes one negative ledger line per (component, lot) pair with the
    /// cost snapshot, and conditionally decrements each consumed lot. Pooled
    /// allocations skip the lot decrement; their quantity is tracked only in
    /// the aggregate component balance.
    pub async fn consume_lots_for_build<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &BuildConsumptionContext<'_>,
    ) -> Result<BuildConsumption, ServiceError> {
        let units = Decimal::from(ctx.units_to_build);
        let overrides_by_component: HashMap<Uuid, &LotOverride> = ctx
            .lot_overrides
            .unwrap_or(&[])
            .iter()
            .map(|o| (o.component_id, o))
            .collect();

        let mut lines = Vec::new();
        let mut consumed: HashMap<Uuid, Decimal> = HashMap::new();

        for bom_line in ctx.bom_lines {
            if bom_line.quantity_per_unit.is_zero() {
                continue;
            }
            let required = bom_line.quantity_per_unit * units;

            let component = ctx.components.get(&bom_line.component_id).ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Component {} missing from resolved recipe",
                    bom_line.component_id
                ))
            })?;

            let allocations = match overrides_by_component.get(&bom_line.component_id) {
                Some(entry) => entry
                    .allocations
                    .iter()
                    .map(|a| LotAllocation {
                        lot_id: Some(a.lot_id),
                        quantity: a.quantity,
                    })
                    .collect(),
                None => {
                    let lots =
                        Self::fetch_available_lots(conn, bom_line.component_id, ctx.company_id)
                            .await?;
                    let mut planned = plan_allocations(
                        &lots,
                        bom_line.component_id,
                        required,
                        ctx.allow_insufficient,
                    )?;

                    // A tolerated pooled shortfall is clamped to the current
                    // balance so the ledger-line sum still matches the
                    // balance delta and the balance stays non-negative.
                    if ctx.allow_insufficient {
                        if let [allocation] = planned.as_mut_slice() {
                            if allocation.lot_id.is_none() {
                                let available = ctx
                                    .balances
                                    .get(&bom_line.component_id)
                                    .copied()
                                    .unwrap_or(Decimal::ZERO)
                                    .max(Decimal::ZERO);
                                allocation.quantity = allocation.quantity.min(available);
                            }
                        }
                        planned.retain(|a| a.quantity > Decimal::ZERO);
                    }

                    planned
                }
            };

            for allocation in allocations {
                if let Some(lot_id) = allocation.lot_id {
                    Self::decrement_lot(
                        conn,
                        lot_id,
                        ctx.company_id,
                        bom_line.component_id,
                        allocation.quantity,
                    )
                    .await?;
                }

                let line = ledger_line::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    company_id: Set(ctx.company_id),
                    ledger_entry_id: Set(ctx.ledger_entry_id),
                    component_id: Set(bom_line.component_id),
                    lot_id: Set(allocation.lot_id),
                    location_id: Set(ctx.location_id),
                    quantity_change: Set(-allocation.quantity),
                    unit_cost: Set(component.cost_per_unit),
                    created_at: Set(Utc::now()),
                };
                let inserted = line.insert(conn).await.map_err(ServiceError::db_error)?;
                lines.push(inserted);

                *consumed
                    .entry(bom_line.component_id)
                    .or_insert(Decimal::ZERO) += allocation.quantity;
            }
        }

        Ok(BuildConsumption { lines, consumed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn lot_with(
        n: u32,
        quantity: Decimal,
        expiration: Option<NaiveDate>,
        received: NaiveDate,
    ) -> lot::Model {
        lot::Model {
            id: Uuid::from_u128(n as u128),
            company_id: Uuid::from_u128(1),
            component_id: Uuid::from_u128(100),
            lot_number: format!("LOT-{}", n),
            quantity,
            original_quantity: quantity,
            quantity_reserved: Decimal::ZERO,
            unit_cost: None,
            expiration_date: expiration,
            received_date: received,
            supplier: None,
            notes: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, n).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, n).unwrap(),
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fefo_sorts_dated_before_undated() {
        let mut lots = vec![
            lot_with(1, dec!(10), Some(day(2025, 3, 1)), day(2024, 12, 1)),
            lot_with(2, dec!(10), Some(day(2025, 1, 15)), day(2024, 12, 1)),
            lot_with(3, dec!(10), None, day(2024, 12, 1)),
        ];
        lots.sort_by(fefo_cmp);

        let order: Vec<Option<NaiveDate>> = lots.iter().map(|l| l.expiration_date).collect();
        assert_eq!(
            order,
            vec![Some(day(2025, 1, 15)), Some(day(2025, 3, 1)), None]
        );
    }

    #[test]
    fn fefo_breaks_expiry_ties_by_received_then_created() {
        let same_expiry = Some(day(2025, 6, 1));
        // Lot 2 was received earlier; lots 1 and 3 share a received date but
        // lot 1 was created first.
        let mut lots = vec![
            lot_with(3, dec!(5), same_expiry, day(2025, 1, 10)),
            lot_with(1, dec!(5), same_expiry, day(2025, 1, 10)),
            lot_with(2, dec!(5), same_expiry, day(2025, 1, 5)),
        ];
        lots.sort_by(fefo_cmp);

        let order: Vec<Uuid> = lots.iter().map(|l| l.id).collect();
        assert_eq!(
            order,
            vec![
                Uuid::from_u128(2),
                Uuid::from_u128(1),
                Uuid::from_u128(3)
            ]
        );
    }

    #[test]
    fn greedy_allocation_walks_fefo_order() {
        let lots = vec![
            lot_with(1, dec!(30), Some(day(2025, 2, 1)), day(2025, 1, 1)),
            lot_with(2, dec!(50), Some(day(2025, 4, 1)), day(2025, 1, 2)),
        ];
        let allocations =
            plan_allocations(&lots, Uuid::from_u128(100), dec!(40), false).unwrap();

        assert_eq!(
            allocations,
            vec![
                LotAllocation {
                    lot_id: Some(Uuid::from_u128(1)),
                    quantity: dec!(30),
                },
                LotAllocation {
                    lot_id: Some(Uuid::from_u128(2)),
                    quantity: dec!(10),
                },
            ]
        );
    }

    #[test]
    fn zero_lots_falls_back_to_pooled() {
        let allocations = plan_allocations(&[], Uuid::from_u128(100), dec!(25), false).unwrap();
        assert_eq!(
            allocations,
            vec![LotAllocation {
                lot_id: None,
                quantity: dec!(25),
            }]
        );
    }

    #[test]
    fn exhausted_lots_error_names_the_shortfall() {
        let lots = vec![lot_with(1, dec!(20), None, day(2025, 1, 1))];
        let err =
            plan_allocations(&lots, Uuid::from_u128(100), dec!(50), false).unwrap_err();

        match err {
            ServiceError::InsufficientLotQuantity {
                component_id,
                requested,
                available,
            } => {
                assert_eq!(component_id, Uuid::from_u128(100));
                assert_eq!(requested, dec!(50));
                assert_eq!(available, dec!(20));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn tolerated_shortfall_returns_partial_allocation() {
        let lots = vec![lot_with(1, dec!(20), None, day(2025, 1, 1))];
        let allocations =
            plan_allocations(&lots, Uuid::from_u128(100), dec!(50), true).unwrap();

        assert_eq!(
            allocations,
            vec![LotAllocation {
                lot_id: Some(Uuid::from_u128(1)),
                quantity: dec!(20),
            }]
        );
        let total: Decimal = allocations.iter().map(|a| a.quantity).sum();
        assert!(total < dec!(50));
    }

    #[test]
    fn zero_requirement_allocates_nothing() {
        let lots = vec![lot_with(1, dec!(20), None, day(2025, 1, 1))];
        let allocations =
            plan_allocations(&lots, Uuid::from_u128(100), Decimal::ZERO, false).unwrap();
        assert!(allocations.is_empty());
    }

    #[test]
    fn empty_lots_are_skipped_in_greedy_walk() {
        // A lot drained to zero between fetch and planning must not produce
        // a zero-quantity allocation.
        let lots = vec![
            lot_with(1, Decimal::ZERO, Some(day(2025, 1, 1)), day(2024, 12, 1)),
            lot_with(2, dec!(40), Some(day(2025, 2, 1)), day(2024, 12, 2)),
        ];
        let allocations =
            plan_allocations(&lots, Uuid::from_u128(100), dec!(10), false).unwrap();
        assert_eq!(
            allocations,
            vec![LotAllocation {
                lot_id: Some(Uuid::from_u128(2)),
                quantity: dec!(10),
            }]
        );
    }
}
