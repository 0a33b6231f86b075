//! Job-application tracking: typed records in SQLite, scoped by wallet
//! address, behind an in-memory state container with derived statistics.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod session;
pub mod state;
pub mod stats;

pub use db::{Database, RecordStore};
pub use error::{PersistenceError, Result, TrackerError};
pub use models::{
    Application, ApplicationId, ApplicationPatch, ApplicationStatus, LocationType,
    NewApplication, OwnerId, Platform, SalaryCurrency, SalaryPeriod, TimelineEntry,
};
pub use state::{ApplicationsState, LoadPhase};
pub use stats::{ApplicationFilter, ApplicationStats, PlatformStats};
