//! Open-data catalog client
//!
//! Resolves stop names to stop/line pairs and line identifiers to line
//! metadata using the record search API of
//! [data.iledefrance-mobilites.fr](https://data.iledefrance-mobilites.fr).

use std::{fmt, time::Duration};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, instrument, warn};

use crate::config::StopWatcherConfig;
use crate::error::IdfmError;
use crate::models::{LineInfo, Mode, StopLine, extract_id};

const SEARCH_PATH: &str = "/api/records/1.0/search";
const STOP_LINE_DATASET: &str = "arrets-lignes";
const LINE_DATASET: &str = "referentiel-des-lignes";

/// A stop search as entered by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopLineQuery {
    /// Stop name or free text
    pub query: String,
    /// Restrict to one transport mode
    pub mode: Option<Mode>,
    /// Restrict to one line (catalog `route_long_name`)
    pub line_name: Option<String>,
}

impl StopLineQuery {
    /// Create a query without mode or line filters
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: None,
            line_name: None,
        }
    }

    /// Restrict to a transport mode
    #[must_use]
    pub const fn with_mode(mut self, mode: Option<Mode>) -> Self {
        self.mode = mode;
        self
    }

    /// Restrict to a line name
    #[must_use]
    pub fn with_line_name(mut self, line_name: Option<String>) -> Self {
        self.line_name = line_name;
        self
    }
}

/// Trait for catalog clients
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CatalogClient: Send + Sync + fmt::Debug {
    /// Find the stop/line pairs matching a stop search
    async fn find_stop_lines(&self, query: &StopLineQuery) -> Result<Vec<StopLine>, IdfmError>;

    /// Fetch the display metadata of a line, bypassing any cache
    async fn fetch_line_info(&self, line_id: &str) -> Result<LineInfo, IdfmError>;

    /// Check if the catalog is reachable
    async fn is_healthy(&self) -> bool;
}

/// Catalog client for the Île-de-France Mobilités open-data portal
#[derive(Debug)]
pub struct OpenDataCatalogClient {
    client: Client,
    config: StopWatcherConfig,
}

impl OpenDataCatalogClient {
    /// Create a new catalog client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(config: &StopWatcherConfig) -> Result<Self, IdfmError> {
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

    /// Query parameters for a stop/line search
    fn stop_line_params(&self, query: &StopLineQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("rows", self.config.page_size.to_string()),
            ("dataset", STOP_LINE_DATASET.to_string()),
            ("refine.nom_commune", self.config.municipality_name.clone()),
        ];

        if self.config.exact_match {
            params.push(("refine.stop_name", query.query.clone()));
        } else {
            params.push(("q", query.query.clone()));
        }

        if let Some(mode) = query.mode {
            params.push(("refine.mode", mode.as_catalog_value().to_string()));
        }

        if let Some(line_name) = query.line_name.as_deref().filter(|l| !l.is_empty()) {
            params.push(("refine.route_long_name", line_name.to_string()));
        }

        if let Some(limit) = self.config.omit_mode_limit {
            params.push(("omitModeLimit", limit.to_string()));
        }

        params
    }

    /// Query parameters for a line referential lookup
    fn line_params(&self, line_id: &str) -> Vec<(&'static str, String)> {
        vec![
            ("rows", self.config.page_size.to_string()),
            ("dataset", LINE_DATASET.to_string()),
            ("refine.id_line", line_id.to_string()),
        ]
    }

    /// Run a record search and return the `fields` of every record
    async fn search<F: DeserializeOwned>(
        &self,
        params: &[(&'static str, String)],
    ) -> Result<Vec<F>, IdfmError> {
        let url = format!("{}{SEARCH_PATH}", self.config.catalog_base_url);

        let response = self
            .client
            .get(&url)
            .query(params)
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
                service: "catalog",
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| IdfmError::ParseError(e.to_string()))?;

        Self::parse_records(&body)
    }

    fn parse_records<F: DeserializeOwned>(body: &str) -> Result<Vec<F>, IdfmError> {
        let raw: RawSearchResponse<F> =
            serde_json::from_str(body).map_err(|e| IdfmError::ParseError(e.to_string()))?;

        Ok(raw.records.into_iter().map(|r| r.fields).collect())
    }

    fn convert_stop_line(raw: RawStopLineFields) -> StopLine {
        StopLine {
            stop_id: extract_id(&raw.stop_id),
            line_id: extract_id(&raw.id),
            stop_name: raw.stop_name,
            line_name: raw.route_long_name,
        }
    }

    fn convert_line(raw: RawLineFields) -> LineInfo {
        LineInfo {
            mode: Mode::from_transport_mode(&raw.transportmode, raw.transportsubmode.as_deref()),
            name: raw.name_line,
            color: raw.colourweb_hexa,
            text_color: raw.textcolourweb_hexa,
        }
    }
}

#[async_trait]
impl CatalogClient for OpenDataCatalogClient {
    #[instrument(skip(self), fields(query = %query.query))]
    async fn find_stop_lines(&self, query: &StopLineQuery) -> Result<Vec<StopLine>, IdfmError> {
        let params = self.stop_line_params(query);
        debug!(?params, "Searching stop lines");

        let records: Vec<RawStopLineFields> = self.search(&params).await?;
        let stop_lines: Vec<StopLine> = records.into_iter().map(Self::convert_stop_line).collect();

        if stop_lines.is_empty() {
            warn!("No stop lines found");
        }

        debug!(count = stop_lines.len(), "Stop lines found");
        Ok(stop_lines)
    }

    #[instrument(skip(self))]
    async fn fetch_line_info(&self, line_id: &str) -> Result<LineInfo, IdfmError> {
        let params = self.line_params(line_id);
        debug!("Fetching line referential");

        let records: Vec<RawLineFields> = self.search(&params).await?;
        let raw = records
            .into_iter()
            .next()
            .ok_or_else(|| IdfmError::LineNotFound(line_id.to_string()))?;

        Ok(Self::convert_line(raw))
    }

    async fn is_healthy(&self) -> bool {
        let url = format!("{}{SEARCH_PATH}", self.config.catalog_base_url);
        self.client
            .get(&url)
            .query(&[("dataset", LINE_DATASET), ("rows", "1")])
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }
}

// --- Raw API response types for deserialization ---

#[derive(Debug, Deserialize)]
struct RawSearchResponse<F> {
    #[serde(default = "Vec::new")]
    records: Vec<RawRecord<F>>,
}

#[derive(Debug, Deserialize)]
struct RawRecord<F> {
    fields: F,
}

#[derive(Debug, Deserialize)]
struct RawStopLineFields {
    #[serde(default)]
    id: String,
    #[serde(default)]
    stop_id: String,
    #[serde(default)]
    stop_name: String,
    #[serde(default)]
    route_long_name: String,
}

#[derive(Debug, Deserialize)]
struct RawLineFields {
    #[serde(default)]
    name_line: String,
    #[serde(default)]
    transportmode: String,
    transportsubmode: Option<String>,
    #[serde(default)]
    colourweb_hexa: String,
    #[serde(default)]
    textcolourweb_hexa: String,
}
