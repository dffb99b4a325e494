//! Buildstock API Library
//!
//! Multi-tenant inventory and manufacturing tracking core: components,
//! versioned BOMs, lots, FEFO allocation, and an append-only inventory
//! ledger whose derived balances always equal the signed sum of their
//! history.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// The wired-up service graph. Construct once per process and clone freely.
#[derive(Clone)]
pub struct AppServices {
    pub bom: Arc<services::BomService>,
    pub buildability: Arc<services::BuildabilityService>,
    pub inventory: Arc<services::InventoryService>,
    pub locations: Arc<services::LocationService>,
    pub lots: Arc<services::LotService>,
    pub builds: Arc<services::BuildService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: events::EventSender,
        config: &config::AppConfig,
    ) -> Self {
        let lots = Arc::new(services::LotService::new(db.clone()));

        Self {
            bom: Arc::new(services::BomService::new(
                db.clone(),
                Some(event_sender.clone()),
            )),
            buildability: Arc::new(services::BuildabilityService::new(db.clone())),
            inventory: Arc::new(services::InventoryService::new(
                db.clone(),
                Some(event_sender.clone()),
            )),
            locations: Arc::new(services::LocationService::new(db.clone())),
            builds: Arc::new(services::BuildService::new(
                db,
                lots.clone(),
                Some(event_sender),
                config.defect_alert_threshold,
            )),
            lots,
        }
    }
}

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let services = AppServices::new(db.clone(), event_sender.clone(), &config);
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }

    pub fn bom_service(&self) -> Arc<services::BomService> {
        self.services.bom.clone()
    }

    pub fn buildability_service(&self) -> Arc<services::BuildabilityService> {
        self.services.buildability.clone()
    }

    pub fn inventory_service(&self) -> Arc<services::InventoryService> {
        self.services.inventory.clone()
    }

    pub fn location_service(&self) -> Arc<services::LocationService> {
        self.services.locations.clone()
    }

    pub fn lot_service(&self) -> Arc<services::LotService> {
        self.services.lots.clone()
    }

    pub fn build_service(&self) -> Arc<services::BuildService> {
        self.services.builds.clone()
    }
}
