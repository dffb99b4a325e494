use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::{
        bom_line::{self, Entity as BomLineEntity},
        bom_version::{self, Entity as BomVersionEntity},
        inventory_balance::{self, Entity as InventoryBalanceEntity},
    },
    errors::ServiceError,
    services::bom::BomService,
};

/// Maximum finished units the given (quantity_per_unit, on_hand) pairs allow:
/// the minimum of floor(on_hand / quantity_per_unit) across lines. `None`
/// means "not applicable" (no constraining line at all), which is distinct
/// from zero buildable. Lines with a zero quantity_per_unit impose no
/// constraint and are excluded rather than dividing by zero.
pub fn max_buildable_from_lines<I>(lines: I) -> Option<i64>
where
    I: IntoIterator<Item = (Decimal, Decimal)>,
{
    let mut min_units: Option<i64> = None;

    for (quantity_per_unit, on_hand) in lines {
        if quantity_per_unit.is_zero() {
            continue;
        }
        let units = (on_hand.max(Decimal::ZERO) / quantity_per_unit)
            .floor()
            .to_i64()
            .unwrap_or(0);
        min_units = Some(min_units.map_or(units, |current| current.min(units)));
    }

    min_units
}

/// Computes how many finished units current balances support for a SKU's
/// active recipe
#[derive(Clone)]
pub struct BuildabilityService {
    db: Arc<DatabaseConnection>,
}

impl BuildabilityService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// On-hand quantity per component, for one location or aggregated across
    /// all of them, fetched in a single query.
    pub async fn fetch_balances<C: ConnectionTrait>(
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

        if let Some(location_id) = location_id {
            query = query.filter(inventory_balance::Column::LocationId.eq(location_id));
        }

        let rows = query.all(conn).await.map_err(ServiceError::db_error)?;

        let mut balances: HashMap<Uuid, Decimal> = HashMap::new();
        for row in rows {
            *balances.entry(row.component_id).or_insert(Decimal::ZERO) += row.quantity_on_hand;
        }

        Ok(balances)
    }

    /// Max buildable units from the SKU's active BOM, or `None` when the SKU
    /// has no active BOM or the BOM has no lines.
    #[instrument(skip(self))]
    pub async fn calculate_max_buildable_units(
        &self,
        sku_id: Uuid,
        company_id: Uuid,
        location_id: Option<Uuid>,
    ) -> Result<Option<i64>, ServiceError> {
        let db = &*self.db;

        let Some(version) = BomService::find_active_version(db, sku_id, company_id).await? else {
            return Ok(None);
        };

        let lines = BomService::fetch_lines(db, version.id).await?;
        if lines.is_empty() {
            return Ok(None);
        }

        let component_ids: Vec<Uuid> = lines.iter().map(|l| l.component_id).collect();
        let balances = Self::fetch_balances(db, &component_ids, company_id, location_id).await?;

        Ok(max_buildable_from_lines(lines.iter().map(|line| {
            let on_hand = balances
                .get(&line.component_id)
                .copied()
                .unwrap_or(Decimal::ZERO);
            (line.quantity_per_unit, on_hand)
        })))
    }

    /// Batched buildability for many SKUs with one shared balance fetch.
    /// SKUs without an active BOM (or with an empty one) map to `None`.
    #[instrument(skip(self, sku_ids))]
    pub async fn calculate_max_buildable_units_for_skus(
        &self,
        sku_ids: &[Uuid],
        company_id: Uuid,
        location_id: Option<Uuid>,
    ) -> Result<HashMap<Uuid, Option<i64>>, ServiceError> {
        let mut results: HashMap<Uuid, Option<i64>> =
            sku_ids.iter().map(|id| (*id, None)).collect();
        if sku_ids.is_empty() {
            return Ok(results);
        }

        let db = &*self.db;

        let versions = BomVersionEntity::find()
            .filter(bom_version::Column::CompanyId.eq(company_id))
            .filter(bom_version::Column::SkuId.is_in(sku_ids.to_vec()))
            .filter(bom_version::Column::IsActive.eq(true))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        if versions.is_empty() {
            return Ok(results);
        }

        let version_ids: Vec<Uuid> = versions.iter().map(|v| v.id).collect();
        let lines = BomLineEntity::find()
            .filter(bom_line::Column::BomVersionId.is_in(version_ids))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut lines_by_version: HashMap<Uuid, Vec<&bom_line::Model>> = HashMap::new();
        for line in &lines {
            lines_by_version
                .entry(line.bom_version_id)
                .or_default()
                .push(line);
        }

        let mut component_ids: Vec<Uuid> = lines.iter().map(|l| l.component_id).collect();
        component_ids.sort();
        component_ids.dedup();
        let balances = Self::fetch_balances(db, &component_ids, company_id, location_id).await?;

        for version in &versions {
            let Some(version_lines) = lines_by_version.get(&version.id) else {
                continue;
            };
            let buildable = max_buildable_from_lines(version_lines.iter().map(|line| {
                let on_hand = balances
                    .get(&line.component_id)
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                (line.quantity_per_unit, on_hand)
            }));
            results.insert(version.sku_id, buildable);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn buildable_units_is_minimum_across_lines() {
        // 100 on hand at 2/unit supports 50; 30 on hand at 5/unit supports 6.
        let result = max_buildable_from_lines(vec![
            (dec!(2), dec!(100)),
            (dec!(5), dec!(30)),
        ]);
        assert_eq!(result, Some(6));
    }

    #[test]
    fn fractional_balances_floor_to_whole_units() {
        let result = max_buildable_from_lines(vec![(dec!(3), dec!(10))]);
        assert_eq!(result, Some(3));
    }

    #[test]
    fn missing_balance_means_zero_buildable() {
        let result = max_buildable_from_lines(vec![
            (dec!(2), dec!(100)),
            (dec!(1), Decimal::ZERO),
        ]);
        assert_eq!(result, Some(0));
    }

    #[test]
    fn zero_quantity_line_imposes_no_constraint() {
        let result = max_buildable_from_lines(vec![
            (Decimal::ZERO, Decimal::ZERO),
            (dec!(2), dec!(10)),
        ]);
        assert_eq!(result, Some(5));
    }

    #[test]
    fn no_constraining_lines_is_not_applicable() {
        // No lines, or only zero-quantity lines: "unknown", not zero.
        assert_eq!(max_buildable_from_lines(Vec::new()), None);
        assert_eq!(
            max_buildable_from_lines(vec![(Decimal::ZERO, dec!(40))]),
            None
        );
    }
}
