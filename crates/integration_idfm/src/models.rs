//! Stop watcher data models
//!
//! Typed representations of stop/line pairs, line metadata and the
//! per-direction departure schedules returned to callers.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction name used when a visit carries none, and for placeholder schedules
pub const UNKNOWN_DIRECTION: &str = "unknown";

/// Transport mode classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Bus
    Bus,
    /// Métro
    Metro,
    /// Tramway
    Tramway,
    /// RER
    RapidTransit,
    /// Transilien
    LocalTrain,
    /// TER
    RegionalRail,
}

impl Mode {
    /// All modes in catalog order
    pub const ALL: [Self; 6] = [
        Self::Bus,
        Self::Metro,
        Self::Tramway,
        Self::RapidTransit,
        Self::LocalTrain,
        Self::RegionalRail,
    ];

    /// Value sent as the catalog `refine.mode` filter
    #[must_use]
    pub const fn as_catalog_value(&self) -> &'static str {
        match self {
            Self::Bus => "Bus",
            Self::Metro => "Metro",
            Self::Tramway => "Tramway",
            Self::RapidTransit => "RapidTransit",
            Self::LocalTrain => "LocalTrain",
            Self::RegionalRail => "regionalRail",
        }
    }

    /// Map the line referential `transportmode` / `transportsubmode` pair
    ///
    /// Submodes only matter for rail; unknown combinations yield `None`.
    #[must_use]
    pub fn from_transport_mode(mode: &str, submode: Option<&str>) -> Option<Self> {
        match (mode, submode) {
            ("bus", _) => Some(Self::Bus),
            ("metro", _) => Some(Self::Metro),
            ("tram", _) => Some(Self::Tramway),
            ("rail", Some("local")) => Some(Self::RapidTransit),
            ("rail", Some("suburbanRailway")) => Some(Self::LocalTrain),
            ("rail", Some("regionalRail")) => Some(Self::RegionalRail),
            _ => None,
        }
    }

    /// Whether realtime requests address the stop area rather than the stop point
    #[must_use]
    pub const fn uses_stop_area(&self) -> bool {
        matches!(self, Self::RapidTransit | Self::LocalTrain)
    }

    /// Human-readable label
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Bus => "Bus",
            Self::Metro => "Métro",
            Self::Tramway => "Tram",
            Self::RapidTransit => "RER",
            Self::LocalTrain => "Transilien",
            Self::RegionalRail => "TER",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bus" => Ok(Self::Bus),
            "metro" | "métro" => Ok(Self::Metro),
            "tramway" | "tram" => Ok(Self::Tramway),
            "rapidtransit" | "rer" => Ok(Self::RapidTransit),
            "localtrain" | "transilien" => Ok(Self::LocalTrain),
            "regionalrail" | "ter" => Ok(Self::RegionalRail),
            other => Err(format!("unknown transport mode: {other}")),
        }
    }
}

/// A stop served by a line, as resolved from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopLine {
    /// Stop identifier without namespace prefix (e.g. "411265")
    pub stop_id: String,
    /// Line identifier without namespace prefix (e.g. "C01371")
    pub line_id: String,
    /// Stop display name
    pub stop_name: String,
    /// Line long name
    pub line_name: String,
}

impl StopLine {
    /// Create a new stop/line pair
    #[must_use]
    pub fn new(
        stop_id: impl Into<String>,
        line_id: impl Into<String>,
        stop_name: impl Into<String>,
        line_name: impl Into<String>,
    ) -> Self {
        Self {
            stop_id: stop_id.into(),
            line_id: line_id.into(),
            stop_name: stop_name.into(),
            line_name: line_name.into(),
        }
    }
}

/// Strip the namespace from a colon-delimited identifier
///
/// `"STIF:StopPoint:Q:411265:"` yields `"411265"`; a value without any
/// colon is returned unchanged.
#[must_use]
pub fn extract_id(namespaced: &str) -> String {
    namespaced
        .trim_end_matches(':')
        .rsplit(':')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Display metadata of a line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInfo {
    /// Display name (e.g. "1", "RER A", "N14")
    pub name: String,
    /// Background color as hex without '#'
    pub color: String,
    /// Text color as hex without '#'
    pub text_color: String,
    /// Transport mode, when the referential maps onto a known one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
}

impl LineInfo {
    /// Whether this is the zeroed record used when resolution failed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.color.is_empty() && self.text_color.is_empty()
    }
}

/// When the next vehicle leaves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NextDeparture {
    /// Absolute instant
    At(DateTime<Utc>),
    /// Relative phrase ("dans 4 min") or the raw status text
    Text(String),
}

impl fmt::Display for NextDeparture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(at) => write!(f, "{}", at.format("%H:%M")),
            Self::Text(text) => write!(f, "{text}"),
        }
    }
}

/// One upcoming departure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Departure {
    /// Destination shown on the vehicle
    pub destination: String,
    /// Next departure time
    pub next: NextDeparture,
}

/// Upcoming departures for one direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionSchedule {
    /// Direction name
    pub name: String,
    /// Departures in the order the realtime service listed them
    pub upcoming_departures: Vec<Departure>,
}

impl DirectionSchedule {
    /// Create an empty direction
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            upcoming_departures: Vec::new(),
        }
    }

    /// Placeholder emitted when a stop has no live departures
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_DIRECTION)
    }

    /// Whether this is the "no live data" placeholder
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.name == UNKNOWN_DIRECTION && self.upcoming_departures.is_empty()
    }
}

/// Departures of one line at one stop, grouped by direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopSchedule {
    /// Stop display name
    pub stop: String,
    /// Line metadata
    pub line: LineInfo,
    /// Directions in first-seen order
    pub directions: Vec<DirectionSchedule>,
}

impl StopSchedule {
    /// Format as a compact multi-line summary
    #[must_use]
    pub fn format_summary(&self) -> String {
        let mode = self
            .line
            .mode
            .map(|m| format!("{m} "))
            .unwrap_or_default();
        let mut out = format!("{} - {mode}{}", self.stop, self.line.name);

        for direction in &self.directions {
            out.push_str(&format!("\n  → {}", direction.name));
            if direction.upcoming_departures.is_empty() {
                out.push_str(": no live departures");
                continue;
            }
            for departure in &direction.upcoming_departures {
                out.push_str(&format!(
                    "\n      {} ({})",
                    departure.next, departure.destination
                ));
            }
        }

        out
    }
}

impl fmt::Display for StopSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_summary())
    }
}
