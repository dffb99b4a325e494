pub mod bom;
pub mod build;
pub mod buildability;
pub mod inventory;
pub mod locations;
pub mod lots;

pub use bom::BomService;
pub use build::BuildService;
pub use buildability::BuildabilityService;
pub use inventory::InventoryService;
pub use locations::LocationService;
pub use lots::LotService;
