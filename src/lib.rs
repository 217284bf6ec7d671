//! SIPAT Short-Route Engine
//!
//! Assigns short routes ("rutas cortas") to conductores under the daily,
//! weekly and consecutive-day rules, drives their lifecycle and keeps the
//! per-week balance of every conductor current.

pub mod api;
pub mod assignment;
pub mod balance;
pub mod catalog;
pub mod conflicts;
pub mod constraints;
pub mod db;
pub mod error;
pub mod events;
pub mod fleet;
pub mod ledger;
pub mod metrics;
pub mod planner;
pub mod settings;

#[cfg(test)]
mod test_support;

use tokio::sync::RwLock;

use crate::planner::Planner;
use crate::settings::Settings;

/// Shared application state
pub struct AppState {
    pub settings: Settings,
    pub planner: RwLock<Planner>,
}

impl AppState {
    pub fn new(settings: Settings, planner: Planner) -> Self {
        AppState {
            settings,
            planner: RwLock::new(planner),
        }
    }
}
