use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One unsatisfied BOM line in a sufficiency check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentShortage {
    pub component_id: Uuid,
    pub component_name: String,
    pub required: Decimal,
    pub available: Decimal,
    pub shortage: Decimal,
}

impl std::fmt::Display for ComponentShortage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: required {}, available {} (short {})",
            self.component_name, self.required, self.available, self.shortage
        )
    }
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    /// Covers both "does not exist" and "belongs to another tenant"; the two
    /// are deliberately indistinguishable so cross-tenant existence never
    /// leaks through error messages.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Insufficient inventory for {} component(s)", .0.len())]
    InsufficientInventory(Vec<ComponentShortage>),

    #[error("Insufficient lot quantity for component {component_id}: requested {requested}, available {available}")]
    InsufficientLotQuantity {
        component_id: Uuid,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Insufficient finished goods for SKU {sku_id}: requested {requested}, available {available}")]
    InsufficientFinishedGoods {
        sku_id: Uuid,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Consistency error: {}", .0.join("; "))]
    ConsistencyError(Vec<String>),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// True when the error is recoverable by the caller adjusting the
    /// request (as opposed to infrastructure failure).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_)
                | Self::InvalidInput(_)
                | Self::InvalidOperation(_)
                | Self::InsufficientInventory(_)
                | Self::InsufficientLotQuantity { .. }
                | Self::InsufficientFinishedGoods { .. }
                | Self::ConsistencyError(_)
        )
    }
}

/// Alias kept for call sites that predate the ServiceError consolidation.
pub type AppError = ServiceError;

// Result extensions for easier error handling
pub trait ResultExt<T> {
    fn map_err_to_service(self) -> Result<T, ServiceError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<ServiceError>,
{
    fn map_err_to_service(self) -> Result<T, ServiceError> {
        self.map_err(|e| e.into())
    }
}
