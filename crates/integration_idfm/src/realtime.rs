//! Realtime stop monitoring client
//!
//! Fetches monitored stop visits from the SIRI "stop-monitoring" endpoint
//! of the [PRIM](https://prim.iledefrance-mobilites.fr) marketplace.

use std::{fmt, time::Duration};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::StopWatcherConfig;
use crate::error::IdfmError;
use crate::models::{Mode, StopLine, UNKNOWN_DIRECTION};

const STOP_MONITORING_PATH: &str = "/marketplace/stop-monitoring";

/// `MonitoringRef` / `LineRef` pair sent to the realtime service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringRefs {
    /// Namespaced stop reference
    pub monitoring_ref: String,
    /// Namespaced line reference
    pub line_ref: String,
}

impl MonitoringRefs {
    /// Build the references for a stop/line pair
    ///
    /// RER and Transilien stops are addressed by stop area, every other mode
    /// (and no mode at all) by stop point.
    #[must_use]
    pub fn for_pair(stop_line: &StopLine, mode: Option<Mode>) -> Self {
        let monitoring_ref = if mode.is_some_and(|m| m.uses_stop_area()) {
            format!("STIF:StopArea:SP:{}:", stop_line.stop_id)
        } else {
            format!("STIF:StopPoint:Q:{}:", stop_line.stop_id)
        };

        Self {
            monitoring_ref,
            line_ref: format!("STIF:Line::{}:", stop_line.line_id),
        }
    }
}

/// Trait for realtime stop monitoring clients
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StopMonitoringClient: Send + Sync + fmt::Debug {
    /// Fetch the current monitored visits for a stop/line pair
    async fn fetch_visits(
        &self,
        stop_line: &StopLine,
        mode: Option<Mode>,
    ) -> Result<Vec<MonitoredStopVisit>, IdfmError>;

    /// Check if the realtime service is reachable
    async fn is_healthy(&self) -> bool;
}

/// Stop monitoring client for the PRIM marketplace
pub struct PrimStopMonitoringClient {
    client: Client,
    config: StopWatcherConfig,
}

impl fmt::Debug for PrimStopMonitoringClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimStopMonitoringClient")
            .field("base_url", &self.config.monitoring_base_url)
            .field("timeout_secs", &self.config.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl PrimStopMonitoringClient {
    /// Create a new realtime client
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the HTTP client cannot
    /// be initialized.
    pub fn new(config: &StopWatcherConfig) -> Result<Self, IdfmError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("stopwatcher/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IdfmError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn url(&self) -> String {
        format!("{}{STOP_MONITORING_PATH}", self.config.monitoring_base_url)
    }

    /// Extract the visits of the first delivery
    fn parse_visits(body: &str) -> Result<Vec<MonitoredStopVisit>, IdfmError> {
        let raw: RawStopMonitoringResponse =
            serde_json::from_str(body).map_err(|e| IdfmError::ParseError(e.to_string()))?;

        raw.siri
            .service_delivery
            .stop_monitoring_delivery
            .into_iter()
            .next()
            .map(|delivery| delivery.monitored_stop_visit)
            .ok_or(IdfmError::MissingDelivery)
    }
}

#[async_trait]
impl StopMonitoringClient for PrimStopMonitoringClient {
    #[instrument(skip(self), fields(stop_id = %stop_line.stop_id, line_id = %stop_line.line_id))]
    async fn fetch_visits(
        &self,
        stop_line: &StopLine,
        mode: Option<Mode>,
    ) -> Result<Vec<MonitoredStopVisit>, IdfmError> {
        let refs = MonitoringRefs::for_pair(stop_line, mode);
        debug!(monitoring_ref = %refs.monitoring_ref, line_ref = %refs.line_ref, "Fetching stop visits");

        let response = self
            .client
            .get(self.url())
            .header("apiKey", self.config.api_key.expose_secret())
            .query(&[
                ("MonitoringRef", refs.monitoring_ref.as_str()),
                ("LineRef", refs.line_ref.as_str()),
            ])
            .send()
            .await
            .map_err(|e| IdfmError::from_transport(&e, self.config.timeout_secs))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(IdfmError::RateLimitExceeded {
                retry_after_secs: response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok()),
            });
        }

        if !status.is_success() {
            return Err(IdfmError::RequestFailed {
                service: "realtime",
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| IdfmError::ParseError(e.to_string()))?;

        let visits = Self::parse_visits(&body)?;
        debug!(count = visits.len(), "Stop visits fetched");
        Ok(visits)
    }

    async fn is_healthy(&self) -> bool {
        self.client
            .get(self.url())
            .header("apiKey", self.config.api_key.expose_secret())
            .send()
            .await
            .is_ok_and(|r| !r.status().is_server_error())
    }
}

/// A `{ "value": ... }` wrapper as used throughout SIRI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiriValue {
    /// Wrapped text
    #[serde(default)]
    pub value: String,
}

impl SiriValue {
    /// Wrap a string
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// First non-empty value of a SIRI list
fn first_value(values: &[SiriValue]) -> Option<&str> {
    values
        .first()
        .map(|v| v.value.as_str())
        .filter(|v| !v.is_empty())
}

/// One predicted vehicle call at a stop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonitoredStopVisit {
    /// When the prediction was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at_time: Option<String>,
    /// Journey details
    #[serde(default)]
    pub monitored_vehicle_journey: MonitoredVehicleJourney,
}

/// Vehicle journey of a monitored visit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonitoredVehicleJourney {
    /// Direction names, first one is used
    #[serde(default)]
    pub direction_name: Vec<SiriValue>,
    /// Destination names
    #[serde(default)]
    pub destination_name: Vec<SiriValue>,
    /// Call at the monitored stop
    #[serde(default)]
    pub monitored_call: MonitoredCall,
}

/// Predicted call at the monitored stop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonitoredCall {
    /// Stop point names
    #[serde(default)]
    pub stop_point_name: Vec<SiriValue>,
    /// Destination shown on the vehicle
    #[serde(default)]
    pub destination_display: Vec<SiriValue>,
    /// Predicted departure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_departure_time: Option<String>,
    /// Predicted arrival
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_arrival_time: Option<String>,
    /// Scheduled departure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aimed_departure_time: Option<String>,
    /// Scheduled arrival
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aimed_arrival_time: Option<String>,
    /// Departure status ("onTime", "cancelled", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_status: Option<String>,
    /// Whether the vehicle is at the stop
    #[serde(default)]
    pub vehicle_at_stop: bool,
}

impl MonitoredStopVisit {
    /// Best known departure time, falling back to the departure status text
    #[must_use]
    pub fn next_departure_value(&self) -> Option<&str> {
        let call = &self.monitored_vehicle_journey.monitored_call;
        [
            &call.expected_departure_time,
            &call.expected_arrival_time,
            &call.aimed_departure_time,
            &call.aimed_arrival_time,
            &call.departure_status,
        ]
        .into_iter()
        .filter_map(Option::as_deref)
        .find(|v| !v.is_empty())
    }

    /// Direction name, `"unknown"` when absent
    #[must_use]
    pub fn direction_name(&self) -> &str {
        first_value(&self.monitored_vehicle_journey.direction_name).unwrap_or(UNKNOWN_DIRECTION)
    }

    /// Destination display, defaulting to the direction name
    #[must_use]
    pub fn destination(&self) -> &str {
        first_value(&self.monitored_vehicle_journey.monitored_call.destination_display)
            .unwrap_or_else(|| self.direction_name())
    }

    /// Stop point name, `"unknown"` when absent
    #[must_use]
    pub fn stop_point_name(&self) -> &str {
        first_value(&self.monitored_vehicle_journey.monitored_call.stop_point_name)
            .unwrap_or(UNKNOWN_DIRECTION)
    }
}

// --- Raw API response envelope ---

#[derive(Debug, Deserialize)]
struct RawStopMonitoringResponse {
    #[serde(rename = "Siri", default)]
    siri: RawSiri,
}

#[derive(Debug, Default, Deserialize)]
struct RawSiri {
    #[serde(rename = "ServiceDelivery", default)]
    service_delivery: RawServiceDelivery,
}

#[derive(Debug, Default, Deserialize)]
struct RawServiceDelivery {
    #[serde(rename = "StopMonitoringDelivery", default)]
    stop_monitoring_delivery: Vec<RawStopMonitoringDelivery>,
}

#[derive(Debug, Deserialize)]
struct RawStopMonitoringDelivery {
    #[serde(rename = "MonitoredStopVisit", default)]
    monitored_stop_visit: Vec<MonitoredStopVisit>,
}
