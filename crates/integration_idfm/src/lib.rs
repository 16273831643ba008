//! Île-de-France realtime stop departures
//!
//! Answers "when is the next departure from this stop?" for the Paris
//! region by combining two Île-de-France Mobilités services:
//!
//! - the public open-data catalog, searched for stop/line pairs
//!   (`arrets-lignes`) and line metadata (`referentiel-des-lignes`)
//! - the PRIM marketplace SIRI stop-monitoring endpoint, which returns the
//!   monitored visits of a stop/line pair (requires an API key)
//!
//! # Architecture
//!
//! [`CatalogClient`] and [`StopMonitoringClient`] define the remote
//! interfaces, implemented by [`OpenDataCatalogClient`] and
//! [`PrimStopMonitoringClient`]. [`StopWatcher`] fans out over the matched
//! pairs, filters and groups visits by direction and caches line metadata
//! in a [`LineCache`].
//!
//! # Example
//!
//! ```rust,ignore
//! use integration_idfm::{Mode, StopWatcher, StopWatcherConfig};
//!
//! let watcher = StopWatcher::new(StopWatcherConfig::new(api_key))?;
//!
//! for schedule in watcher.get_stop_schedules("Chatelet", Some(Mode::Metro), None).await {
//!     println!("{schedule}");
//! }
//! ```

mod cache;
mod catalog;
mod config;
mod error;
mod models;
mod realtime;
mod time;
mod watcher;

pub use cache::{LineCache, LineCacheStats};
pub use catalog::{CatalogClient, OpenDataCatalogClient, StopLineQuery};
pub use config::{PRIM_SIGNUP_URL, StopWatcherConfig};
pub use error::IdfmError;
pub use models::{
    Departure, DirectionSchedule, LineInfo, Mode, NextDeparture, StopLine, StopSchedule,
    UNKNOWN_DIRECTION, extract_id,
};
pub use realtime::{
    MonitoredCall, MonitoredStopVisit, MonitoredVehicleJourney, MonitoringRefs,
    PrimStopMonitoringClient, SiriValue, StopMonitoringClient,
};
pub use time::{Clock, FixedClock, SystemClock, format_relative, is_valid_timestamp, parse_timestamp};
pub use watcher::{
    GroupedDepartures, IssueScope, ScheduleIssue, ScheduleReport, StopWatcher, group_by_direction,
};
