pub mod bootstrap;
pub mod collect;
pub mod commons;
pub mod config;
pub mod error;
pub mod geo_core;
pub mod geometric;

pub use bootstrap::{BootstrapLoader, Dashboard};
pub use config::DashboardConfig;
pub use error::{DashResult, DashboardError};
