use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use sea_orm::sea_query::Expr;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::location::{self, Entity as LocationEntity},
    errors::ServiceError,
};

/// Input payload for creating a location
#[derive(Debug, Clone)]
pub struct CreateLocationInput {
    pub company_id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub is_default: bool,
}

/// Service for warehouse/storage locations and tenant default resolution
#[derive(Clone)]
pub struct LocationService {
    db: Arc<DatabaseConnection>,
}

impl LocationService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Tenant-checked lookup. Absent and cross-tenant locations are both
    /// reported as not found.
    pub async fn find_owned<C: ConnectionTrait>(
        conn: &C,
        location_id: Uuid,
        company_id: Uuid,
    ) -> Result<location::Model, ServiceError> {
        LocationEntity::find_by_id(location_id)
            .filter(location::Column::CompanyId.eq(company_id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Location {} not found", location_id)))
    }

    /// Like `find_owned`, additionally requiring the location to be active.
    pub async fn find_active<C: ConnectionTrait>(
        conn: &C,
        location_id: Uuid,
        company_id: Uuid,
    ) -> Result<location::Model, ServiceError> {
        let loc = Self::find_owned(conn, location_id, company_id).await?;
        if !loc.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "Location {} is not active",
                location_id
            )));
        }
        Ok(loc)
    }

    /// Resolves the tenant's default (active) location, if one is configured.
    pub async fn find_default_id<C: ConnectionTrait>(
        conn: &C,
        company_id: Uuid,
    ) -> Result<Option<Uuid>, ServiceError> {
        let default = LocationEntity::find()
            .filter(location::Column::CompanyId.eq(company_id))
            .filter(location::Column::IsDefault.eq(true))
            .filter(location::Column::IsActive.eq(true))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(default.map(|loc| loc.id))
    }

    #[instrument(skip(self))]
    pub async fn get_location(
        &self,
        location_id: Uuid,
        company_id: Uuid,
    ) -> Result<location::Model, ServiceError> {
        Self::find_owned(&*self.db, location_id, company_id).await
    }

    #[instrument(skip(self))]
    pub async fn get_default_location_id(
        &self,
        company_id: Uuid,
    ) -> Result<Option<Uuid>, ServiceError> {
        Self::find_default_id(&*self.db, company_id).await
    }

    #[instrument(skip(self))]
    pub async fn list_locations(
        &self,
        company_id: Uuid,
    ) -> Result<Vec<location::Model>, ServiceError> {
        LocationEntity::find()
            .filter(location::Column::CompanyId.eq(company_id))
            .order_by_asc(location::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Creates a location; marking it default clears the previous default in
    /// the same atomic unit.
    #[instrument(skip(self, input))]
    pub async fn create_location(
        &self,
        input: CreateLocationInput,
    ) -> Result<location::Model, ServiceError> {
        if input.name.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "Location name cannot be empty".to_string(),
            ));
        }

        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        if input.is_default {
            LocationEntity::update_many()
                .col_expr(location::Column::IsDefault, Expr::value(false))
                .filter(location::Column::CompanyId.eq(input.company_id))
                .filter(location::Column::IsDefault.eq(true))
                .exec(&txn)
                .await
                .map_err(ServiceError::db_error)?;
        }

        let now = Utc::now();
        let model = location::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(input.company_id),
            name: Set(input.name.clone()),
            address: Set(input.address),
            is_default: Set(input.is_default),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            "Location created: id={}, name={}, default={}",
            created.id, created.name, created.is_default
        );

        Ok(created)
    }
}
