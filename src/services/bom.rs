use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        bom_line::{self, Entity as BomLineEntity},
        bom_version::{self, Entity as BomVersionEntity},
        component::{self, Entity as ComponentEntity},
        sku::{self, Entity as SkuEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Money values are quoted to four decimal places; accumulation runs at full
/// precision and rounds only at the return boundary.
pub const COST_PRECISION: u32 = 4;

/// Input payload for one recipe line
#[derive(Debug, Clone)]
pub struct BomLineInput {
    pub component_id: Uuid,
    pub quantity_per_unit: Decimal,
    pub sequence: Option<i32>,
    pub notes: Option<String>,
}

/// Input payload for creating a BOM version
#[derive(Debug, Clone)]
pub struct CreateBomVersionInput {
    pub company_id: Uuid,
    pub sku_id: Uuid,
    pub name: String,
    pub effective_start_date: NaiveDate,
    pub is_active: bool,
    pub expected_defect_rate: Option<Decimal>,
    pub defect_notes: Option<String>,
    pub lines: Vec<BomLineInput>,
}

/// Input payload for updating mutable BOM version fields. A `lines` value
/// replaces the full line list.
#[derive(Debug, Clone, Default)]
pub struct UpdateBomVersionInput {
    pub name: Option<String>,
    pub effective_start_date: Option<NaiveDate>,
    pub expected_defect_rate: Option<Decimal>,
    pub defect_notes: Option<String>,
    pub lines: Option<Vec<BomLineInput>>,
}

/// Unit cost of a recipe: Σ(quantity_per_unit × component cost_per_unit).
/// Accumulates at full precision; callers round at the display boundary.
pub fn rollup_unit_cost<I>(lines: I) -> Decimal
where
    I: IntoIterator<Item = (Decimal, Decimal)>,
{
    lines
        .into_iter()
        .map(|(quantity_per_unit, cost_per_unit)| quantity_per_unit * cost_per_unit)
        .sum()
}

/// Service for versioned bills of materials and their cost rollup
#[derive(Clone)]
pub struct BomService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl BomService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Tenant-checked version lookup.
    pub async fn find_owned_version<C: ConnectionTrait>(
        conn: &C,
        bom_version_id: Uuid,
        company_id: Uuid,
    ) -> Result<bom_version::Model, ServiceError> {
        BomVersionEntity::find_by_id(bom_version_id)
            .filter(bom_version::Column::CompanyId.eq(company_id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("BOM version {} not found", bom_version_id))
            })
    }

    /// The SKU's currently active version, if any.
    pub async fn find_active_version<C: ConnectionTrait>(
        conn: &C,
        sku_id: Uuid,
        company_id: Uuid,
    ) -> Result<Option<bom_version::Model>, ServiceError> {
        BomVersionEntity::find()
            .filter(bom_version::Column::CompanyId.eq(company_id))
            .filter(bom_version::Column::SkuId.eq(sku_id))
            .filter(bom_version::Column::IsActive.eq(true))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Recipe lines in recipe order.
    pub async fn fetch_lines<C: ConnectionTrait>(
        conn: &C,
        bom_version_id: Uuid,
    ) -> Result<Vec<bom_line::Model>, ServiceError> {
        BomLineEntity::find()
            .filter(bom_line::Column::BomVersionId.eq(bom_version_id))
            .order_by_asc(bom_line::Column::Sequence)
            .order_by_asc(bom_line::Column::CreatedAt)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Batched tenant-checked component fetch, keyed by id. Errors when any
    /// requested component is absent or belongs to another tenant.
    pub async fn fetch_owned_components<C: ConnectionTrait>(
        conn: &C,
        component_ids: &[Uuid],
        company_id: Uuid,
    ) -> Result<HashMap<Uuid, component::Model>, ServiceError> {
        if component_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let components = ComponentEntity::find()
            .filter(component::Column::CompanyId.eq(company_id))
            .filter(component::Column::Id.is_in(component_ids.to_vec()))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        let by_id: HashMap<Uuid, component::Model> =
            components.into_iter().map(|c| (c.id, c)).collect();

        for id in component_ids {
            if !by_id.contains_key(id) {
                return Err(ServiceError::NotFound(format!("Component {} not found", id)));
            }
        }

        Ok(by_id)
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

    fn validate_line_inputs(lines: &[BomLineInput]) -> Result<(), ServiceError> {
        for line in lines {
            if line.quantity_per_unit < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "quantity_per_unit for component {} must be non-negative",
                    line.component_id
                )));
            }
        }
        Ok(())
    }

    async fn insert_lines<C: ConnectionTrait>(
        conn: &C,
        company_id: Uuid,
        bom_version_id: Uuid,
        lines: &[BomLineInput],
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        for (idx, line) in lines.iter().enumerate() {
            let model = bom_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                company_id: Set(company_id),
                bom_version_id: Set(bom_version_id),
                component_id: Set(line.component_id),
                quantity_per_unit: Set(line.quantity_per_unit),
                sequence: Set(line.sequence.or(Some(idx as i32))),
                notes: Set(line.notes.clone()),
                created_at: Set(now),
                updated_at: Set(now),
            };
            model.insert(conn).await.map_err(ServiceError::db_error)?;
        }
        Ok(())
    }

    /// Deactivates the SKU's active version (if one exists), stamping its end
    /// date to the incoming version's start date. Returns the deactivated id.
    async fn deactivate_current<C: ConnectionTrait>(
        conn: &C,
        sku_id: Uuid,
        company_id: Uuid,
        end_date: NaiveDate,
        skip_version_id: Option<Uuid>,
    ) -> Result<Option<Uuid>, ServiceError> {
        let current = Self::find_active_version(conn, sku_id, company_id).await?;

        let Some(current) = current else {
            return Ok(None);
        };
        if Some(current.id) == skip_version_id {
            return Ok(None);
        }

        let deactivated_id = current.id;
        let mut active: bom_version::ActiveModel = current.into();
        active.is_active = Set(false);
        active.effective_end_date = Set(Some(end_date));
        active.updated_at = Set(Utc::now());
        active.update(conn).await.map_err(ServiceError::db_error)?;

        Ok(Some(deactivated_id))
    }

    /// Creates a BOM version with its line list. When the new version is
    /// active, the SKU's current active version is deactivated first, within
    /// the same atomic unit.
    #[instrument(skip(self, input))]
    pub async fn create_bom_version(
        &self,
        input: CreateBomVersionInput,
    ) -> Result<bom_version::Model, ServiceError> {
        if input.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "BOM version name cannot be empty".to_string(),
            ));
        }
        Self::validate_line_inputs(&input.lines)?;

        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let sku = Self::find_owned_sku(&txn, input.sku_id, input.company_id).await?;

        let component_ids: Vec<Uuid> = input.lines.iter().map(|l| l.component_id).collect();
        Self::fetch_owned_components(&txn, &component_ids, input.company_id).await?;

        if input.is_active {
            Self::deactivate_current(
                &txn,
                sku.id,
                input.company_id,
                input.effective_start_date,
                None,
            )
            .await?;
        }

        let now = Utc::now();
        let version = bom_version::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(input.company_id),
            sku_id: Set(input.sku_id),
            name: Set(input.name.clone()),
            effective_start_date: Set(input.effective_start_date),
            effective_end_date: Set(None),
            is_active: Set(input.is_active),
            expected_defect_rate: Set(input.expected_defect_rate),
            defect_notes: Set(input.defect_notes.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = version.insert(&txn).await.map_err(ServiceError::db_error)?;

        Self::insert_lines(&txn, input.company_id, created.id, &input.lines).await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::BomVersionCreated {
                    bom_version_id: created.id,
                    sku_id: created.sku_id,
                })
                .await;
        }

        info!(
            "BOM version created: id={}, sku={}, active={}",
            created.id, created.sku_id, created.is_active
        );

        Ok(created)
    }

    /// Promotes an existing version to active; the previously active sibling
    /// is deactivated with its end date stamped to the promoted version's
    /// start date. Exactly one active version remains.
    #[instrument(skip(self))]
    pub async fn activate_bom_version(
        &self,
        bom_version_id: Uuid,
        company_id: Uuid,
    ) -> Result<bom_version::Model, ServiceError> {
        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let version = Self::find_owned_version(&txn, bom_version_id, company_id).await?;
        if version.is_active {
            txn.commit().await.map_err(ServiceError::db_error)?;
            return Ok(version);
        }

        let deactivated = Self::deactivate_current(
            &txn,
            version.sku_id,
            company_id,
            version.effective_start_date,
            Some(version.id),
        )
        .await?;

        let sku_id = version.sku_id;
        let mut active: bom_version::ActiveModel = version.into();
        active.is_active = Set(true);
        active.effective_end_date = Set(None);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::BomVersionActivated {
                    bom_version_id,
                    sku_id,
                    deactivated_version_id: deactivated,
                })
                .await;
        }

        info!(
            "BOM version activated: id={}, deactivated={:?}",
            bom_version_id, deactivated
        );

        Ok(updated)
    }

    /// Copies a version's lines into a new, inactive version. The default
    /// name is the source name with a " (copy)" suffix.
    #[instrument(skip(self))]
    pub async fn clone_bom_version(
        &self,
        bom_version_id: Uuid,
        company_id: Uuid,
        new_name: Option<String>,
    ) -> Result<bom_version::Model, ServiceError> {
        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let source = Self::find_owned_version(&txn, bom_version_id, company_id).await?;
        let lines = Self::fetch_lines(&txn, source.id).await?;

        let now = Utc::now();
        let clone = bom_version::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(company_id),
            sku_id: Set(source.sku_id),
            name: Set(new_name.unwrap_or_else(|| format!("{} (copy)", source.name))),
            effective_start_date: Set(source.effective_start_date),
            effective_end_date: Set(None),
            is_active: Set(false),
            expected_defect_rate: Set(source.expected_defect_rate),
            defect_notes: Set(source.defect_notes.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = clone.insert(&txn).await.map_err(ServiceError::db_error)?;

        for line in &lines {
            let copied = bom_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                company_id: Set(company_id),
                bom_version_id: Set(created.id),
                component_id: Set(line.component_id),
                quantity_per_unit: Set(line.quantity_per_unit),
                sequence: Set(line.sequence),
                notes: Set(line.notes.clone()),
                created_at: Set(now),
                updated_at: Set(now),
            };
            copied.insert(&txn).await.map_err(ServiceError::db_error)?;
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::BomVersionCloned {
                    source_version_id: bom_version_id,
                    new_version_id: created.id,
                })
                .await;
        }

        Ok(created)
    }

    /// Applies updates to mutable version fields; a `lines` value replaces
    /// the whole line list in the same atomic unit.
    #[instrument(skip(self, input))]
    pub async fn update_bom_version(
        &self,
        bom_version_id: Uuid,
        company_id: Uuid,
        input: UpdateBomVersionInput,
    ) -> Result<bom_version::Model, ServiceError> {
        if let Some(lines) = &input.lines {
            Self::validate_line_inputs(lines)?;
        }

        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let mut version = Self::find_owned_version(&txn, bom_version_id, company_id).await?;

        if let Some(name) = input.name {
            version.name = name;
        }
        if let Some(start) = input.effective_start_date {
            version.effective_start_date = start;
        }
        if let Some(rate) = input.expected_defect_rate {
            version.expected_defect_rate = Some(rate);
        }
        if let Some(notes) = input.defect_notes {
            version.defect_notes = Some(notes);
        }
        version.updated_at = Utc::now();

        let active: bom_version::ActiveModel = version.into();
        let updated = active
            .reset_all()
            .update(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if let Some(lines) = input.lines {
            let component_ids: Vec<Uuid> = lines.iter().map(|l| l.component_id).collect();
            Self::fetch_owned_components(&txn, &component_ids, company_id).await?;

            BomLineEntity::delete_many()
                .filter(bom_line::Column::BomVersionId.eq(bom_version_id))
                .exec(&txn)
                .await
                .map_err(ServiceError::db_error)?;

            Self::insert_lines(&txn, company_id, bom_version_id, &lines).await?;
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn get_active_bom_version(
        &self,
        sku_id: Uuid,
        company_id: Uuid,
    ) -> Result<Option<bom_version::Model>, ServiceError> {
        Self::find_active_version(&*self.db, sku_id, company_id).await
    }

    /// Retrieves the line list for a tenant-owned version.
    #[instrument(skip(self))]
    pub async fn get_bom_lines(
        &self,
        bom_version_id: Uuid,
        company_id: Uuid,
    ) -> Result<Vec<bom_line::Model>, ServiceError> {
        Self::find_owned_version(&*self.db, bom_version_id, company_id).await?;
        Self::fetch_lines(&*self.db, bom_version_id).await
    }

    /// Unit cost of one tenant-owned version, rounded to cost precision.
    #[instrument(skip(self))]
    pub async fn calculate_bom_unit_cost(
        &self,
        bom_version_id: Uuid,
        company_id: Uuid,
    ) -> Result<Decimal, ServiceError> {
        Self::unit_cost_on(&*self.db, bom_version_id, company_id).await
    }

    /// In-transaction variant of [`Self::calculate_bom_unit_cost`].
    pub async fn unit_cost_on<C: ConnectionTrait>(
        conn: &C,
        bom_version_id: Uuid,
        company_id: Uuid,
    ) -> Result<Decimal, ServiceError> {
        Self::find_owned_version(conn, bom_version_id, company_id).await?;

        let lines = Self::fetch_lines(conn, bom_version_id).await?;
        if lines.is_empty() {
            return Ok(Decimal::ZERO);
        }

        let component_ids: Vec<Uuid> = lines.iter().map(|l| l.component_id).collect();
        let components = Self::fetch_owned_components(conn, &component_ids, company_id).await?;

        let cost = rollup_unit_cost(lines.iter().map(|line| {
            let cost_per_unit = components
                .get(&line.component_id)
                .map(|c| c.cost_per_unit)
                .unwrap_or(Decimal::ZERO);
            (line.quantity_per_unit, cost_per_unit)
        }));

        Ok(cost.round_dp(COST_PRECISION))
    }

    /// Batched unit costs. Every requested id is seeded with 0 before
    /// summing, so a version with no lines reports 0 rather than going
    /// missing from the map. Any id not owned by the tenant fails the whole
    /// call.
    #[instrument(skip(self, bom_version_ids))]
    pub async fn calculate_bom_unit_costs(
        &self,
        bom_version_ids: &[Uuid],
        company_id: Uuid,
    ) -> Result<HashMap<Uuid, Decimal>, ServiceError> {
        if bom_version_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let db = &*self.db;

        let versions = BomVersionEntity::find()
            .filter(bom_version::Column::CompanyId.eq(company_id))
            .filter(bom_version::Column::Id.is_in(bom_version_ids.to_vec()))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let owned: HashMap<Uuid, ()> = versions.iter().map(|v| (v.id, ())).collect();
        for id in bom_version_ids {
            if !owned.contains_key(id) {
                return Err(ServiceError::NotFound(format!(
                    "BOM version {} not found",
                    id
                )));
            }
        }

        let mut costs: HashMap<Uuid, Decimal> = bom_version_ids
            .iter()
            .map(|id| (*id, Decimal::ZERO))
            .collect();

        let lines = BomLineEntity::find()
            .filter(bom_line::Column::BomVersionId.is_in(bom_version_ids.to_vec()))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        if lines.is_empty() {
            return Ok(costs);
        }

        let mut component_ids: Vec<Uuid> = lines.iter().map(|l| l.component_id).collect();
        component_ids.sort();
        component_ids.dedup();
        let components = Self::fetch_owned_components(db, &component_ids, company_id).await?;

        for line in &lines {
            let cost_per_unit = components
                .get(&line.component_id)
                .map(|c| c.cost_per_unit)
                .unwrap_or(Decimal::ZERO);
            if let Some(total) = costs.get_mut(&line.bom_version_id) {
                *total += line.quantity_per_unit * cost_per_unit;
            }
        }

        for total in costs.values_mut() {
            *total = total.round_dp(COST_PRECISION);
        }

        Ok(costs)
    }
}
