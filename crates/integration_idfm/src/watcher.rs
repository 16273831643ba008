//! Stop schedule aggregation
//!
//! [`StopWatcher`] resolves a stop search into stop/line pairs, fetches the
//! realtime visits of every pair concurrently and reshapes them into
//! [`StopSchedule`]s grouped by direction.
//!
//! Remote failures never abort a query: each one degrades the affected pair
//! (no departures, empty line metadata) and is reported as a
//! [`ScheduleIssue`]. Only construction fails, on invalid configuration.

use std::{collections::HashMap, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{info, instrument, warn};

use crate::cache::{LineCache, LineCacheStats};
use crate::catalog::{CatalogClient, OpenDataCatalogClient, StopLineQuery};
use crate::config::StopWatcherConfig;
use crate::error::IdfmError;
use crate::models::{Departure, DirectionSchedule, LineInfo, Mode, NextDeparture, StopLine, StopSchedule};
use crate::realtime::{MonitoredStopVisit, PrimStopMonitoringClient, StopMonitoringClient};
use crate::time::{Clock, SystemClock, parse_timestamp, to_relative_or_raw};

/// What a degraded failure was affecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueScope {
    /// The catalog stop search
    StopSearch {
        /// Query as entered
        query: String,
    },
    /// Realtime visits of one pair
    Visits {
        /// Stop identifier
        stop_id: String,
        /// Line identifier
        line_id: String,
    },
    /// Line metadata lookup
    LineInfo {
        /// Line identifier
        line_id: String,
    },
    /// Rendering a departure time
    Departure {
        /// Stop identifier
        stop_id: String,
        /// Line identifier
        line_id: String,
    },
}

impl fmt::Display for IssueScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopSearch { query } => write!(f, "stop search {query:?}"),
            Self::Visits { stop_id, line_id } => write!(f, "visits of {stop_id}/{line_id}"),
            Self::LineInfo { line_id } => write!(f, "line {line_id}"),
            Self::Departure { stop_id, line_id } => {
                write!(f, "departure time at {stop_id}/{line_id}")
            },
        }
    }
}

/// A remote or formatting failure that was degraded instead of returned
#[derive(Debug)]
pub struct ScheduleIssue {
    /// Where it happened
    pub scope: IssueScope,
    /// What went wrong
    pub error: IdfmError,
}

impl fmt::Display for ScheduleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scope, self.error)
    }
}

/// Schedules together with the failures degraded while building them
#[derive(Debug, Default)]
pub struct ScheduleReport {
    /// One schedule per distinct (line, stop name), in catalog order
    pub schedules: Vec<StopSchedule>,
    /// Degraded failures, empty on a clean run
    pub issues: Vec<ScheduleIssue>,
}

impl ScheduleReport {
    /// Whether any failure was degraded
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// Directions built from one batch of visits
#[derive(Debug, Default)]
pub struct GroupedDepartures {
    /// Directions in first-seen order
    pub directions: Vec<DirectionSchedule>,
    /// Departure times that could not be rendered and were kept raw
    pub formatting_errors: Vec<IdfmError>,
}

/// Group visits by direction name
///
/// Visits whose time is already past (strictly before `now`) and visits
/// whose stop point equals their destination are dropped. With `as_date`
/// the departure is kept as an instant when parseable; otherwise it is
/// rendered relative to `now` in `locale`, or left as raw text (status
/// values such as "cancelled").
#[must_use]
pub fn group_by_direction(
    visits: &[MonitoredStopVisit],
    now: DateTime<Utc>,
    locale: &str,
    as_date: bool,
) -> GroupedDepartures {
    let mut grouped = GroupedDepartures::default();
    let mut index: HashMap<String, usize> = HashMap::new();

    for visit in visits {
        let next = visit.next_departure_value().unwrap_or_default();
        let at = parse_timestamp(next);
        if at.is_some_and(|at| at < now) {
            continue;
        }

        let destination = visit.destination();
        if visit.stop_point_name() == destination {
            continue;
        }

        let next = match at {
            Some(at) if as_date => NextDeparture::At(at),
            _ if as_date => NextDeparture::Text(next.to_string()),
            _ => match to_relative_or_raw(next, now, locale) {
                Ok(text) => NextDeparture::Text(text),
                Err(e) => {
                    grouped.formatting_errors.push(e);
                    NextDeparture::Text(next.to_string())
                },
            },
        };

        let direction_name = visit.direction_name();
        let position = *index.entry(direction_name.to_string()).or_insert_with(|| {
            grouped
                .directions
                .push(DirectionSchedule::new(direction_name));
            grouped.directions.len() - 1
        });

        grouped.directions[position]
            .upcoming_departures
            .push(Departure {
                destination: destination.to_string(),
                next,
            });
    }

    grouped
}

/// Fold `incoming` into `directions`, appending departures to a direction
/// of the same name or adding the direction at the end
fn merge_directions(directions: &mut Vec<DirectionSchedule>, incoming: Vec<DirectionSchedule>) {
    for direction in incoming {
        match directions.iter_mut().find(|d| d.name == direction.name) {
            Some(existing) => existing
                .upcoming_departures
                .extend(direction.upcoming_departures),
            None => directions.push(direction),
        }
    }
}

/// Everything fetched for one stop/line pair
struct PairOutcome {
    visits: Vec<MonitoredStopVisit>,
    line: LineInfo,
    issues: Vec<ScheduleIssue>,
}

/// Next departures per stop, line and direction
#[derive(Debug, Clone)]
pub struct StopWatcher {
    config: StopWatcherConfig,
    catalog: Arc<dyn CatalogClient>,
    monitoring: Arc<dyn StopMonitoringClient>,
    line_cache: LineCache,
    clock: Arc<dyn Clock>,
}

impl StopWatcher {
    /// Create a stop watcher talking to the public catalog and PRIM
    ///
    /// # Errors
    ///
    /// Returns [`IdfmError::Configuration`] if the API key is missing or the
    /// configuration is otherwise invalid.
    pub fn new(config: StopWatcherConfig) -> Result<Self, IdfmError> {
        let catalog = Arc::new(OpenDataCatalogClient::new(&config)?);
        let monitoring = Arc::new(PrimStopMonitoringClient::new(&config)?);
        Self::with_clients(config, catalog, monitoring)
    }

    /// Create a stop watcher over custom clients
    ///
    /// # Errors
    ///
    /// Returns [`IdfmError::Configuration`] if the configuration is invalid.
    pub fn with_clients(
        config: StopWatcherConfig,
        catalog: Arc<dyn CatalogClient>,
        monitoring: Arc<dyn StopMonitoringClient>,
    ) -> Result<Self, IdfmError> {
        config.validate()?;

        Ok(Self {
            config,
            catalog,
            monitoring,
            line_cache: LineCache::new(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Use another time source for the freshness filter and relative times
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share a line cache with other watchers
    #[must_use]
    pub fn with_line_cache(mut self, line_cache: LineCache) -> Self {
        self.line_cache = line_cache;
        self
    }

    /// The active configuration
    #[must_use]
    pub const fn config(&self) -> &StopWatcherConfig {
        &self.config
    }

    /// The line metadata cache
    #[must_use]
    pub const fn line_cache(&self) -> &LineCache {
        &self.line_cache
    }

    /// Line cache statistics
    pub fn line_cache_stats(&self) -> LineCacheStats {
        self.line_cache.stats()
    }

    /// Whether both the catalog and the realtime service are reachable
    pub async fn is_healthy(&self) -> bool {
        let (catalog, monitoring) =
            futures::join!(self.catalog.is_healthy(), self.monitoring.is_healthy());
        if !catalog {
            warn!("Catalog health check failed");
        }
        if !monitoring {
            warn!("Realtime health check failed");
        }
        catalog && monitoring
    }

    /// Resolve a line identifier to its display metadata
    ///
    /// Served from the cache when possible; a successful lookup is cached
    /// for the life of the process, failures are not. Concurrent calls for
    /// one line issue a single catalog request.
    ///
    /// # Errors
    ///
    /// Returns [`IdfmError::LineNotFound`] when the catalog has no record
    /// for the line, or the transport error of the catalog request.
    #[instrument(skip(self))]
    pub async fn resolve_line_info(&self, line_id: &str) -> Result<LineInfo, IdfmError> {
        self.line_cache
            .try_get_with(line_id, self.catalog.fetch_line_info(line_id))
            .await
    }

    /// Next departures for every stop/line matching `query`
    ///
    /// Never fails: remote failures degrade to empty results. Use
    /// [`Self::get_stop_schedules_report`] to inspect them.
    pub async fn get_stop_schedules(
        &self,
        query: &str,
        mode: Option<Mode>,
        line_name: Option<&str>,
    ) -> Vec<StopSchedule> {
        self.get_stop_schedules_report(query, mode, line_name)
            .await
            .schedules
    }

    /// Next departures for every stop/line matching `query`, with the list
    /// of failures that were degraded along the way
    #[instrument(skip(self))]
    pub async fn get_stop_schedules_report(
        &self,
        query: &str,
        mode: Option<Mode>,
        line_name: Option<&str>,
    ) -> ScheduleReport {
        let mut report = ScheduleReport::default();

        let stop_query = StopLineQuery::new(query)
            .with_mode(mode)
            .with_line_name(line_name.map(str::to_string));

        let stop_lines = match self.catalog.find_stop_lines(&stop_query).await {
            Ok(stop_lines) => stop_lines,
            Err(e) => {
                warn!(%query, error = %e, "Stop search failed");
                report.issues.push(ScheduleIssue {
                    scope: IssueScope::StopSearch {
                        query: query.to_string(),
                    },
                    error: e,
                });
                return report;
            },
        };

        let outcomes = join_all(
            stop_lines
                .iter()
                .map(|stop_line| self.fetch_pair(stop_line, mode)),
        )
        .await;

        let now = self.clock.now();
        let mut index: HashMap<(String, String), usize> = HashMap::new();

        for (stop_line, outcome) in stop_lines.iter().zip(outcomes) {
            report.issues.extend(outcome.issues);

            let grouped = group_by_direction(
                &outcome.visits,
                now,
                &self.config.locale,
                self.config.as_date,
            );
            report
                .issues
                .extend(grouped.formatting_errors.into_iter().map(|error| ScheduleIssue {
                    scope: IssueScope::Departure {
                        stop_id: stop_line.stop_id.clone(),
                        line_id: stop_line.line_id.clone(),
                    },
                    error,
                }));

            let key = (stop_line.line_id.clone(), stop_line.stop_name.clone());
            let position = *index.entry(key).or_insert_with(|| {
                report.schedules.push(StopSchedule {
                    stop: stop_line.stop_name.clone(),
                    line: outcome.line,
                    directions: Vec::new(),
                });
                report.schedules.len() - 1
            });
            merge_directions(
                &mut report.schedules[position].directions,
                grouped.directions,
            );
        }

        for schedule in &mut report.schedules {
            if schedule.directions.is_empty() {
                schedule.directions.push(DirectionSchedule::unknown());
            }
        }

        info!(
            pairs = stop_lines.len(),
            schedules = report.schedules.len(),
            issues = report.issues.len(),
            "Stop schedules built"
        );

        report
    }

    /// Fetch visits and line metadata of one pair, degrading failures
    async fn fetch_pair(&self, stop_line: &StopLine, mode: Option<Mode>) -> PairOutcome {
        let (visits, line) = futures::join!(
            self.monitoring.fetch_visits(stop_line, mode),
            self.resolve_line_info(&stop_line.line_id)
        );

        let mut issues = Vec::new();

        let visits = visits.unwrap_or_else(|e| {
            warn!(
                stop_id = %stop_line.stop_id,
                line_id = %stop_line.line_id,
                error = %e,
                "Realtime fetch failed"
            );
            issues.push(ScheduleIssue {
                scope: IssueScope::Visits {
                    stop_id: stop_line.stop_id.clone(),
                    line_id: stop_line.line_id.clone(),
                },
                error: e,
            });
            Vec::new()
        });

        let line = line.unwrap_or_else(|e| {
            warn!(line_id = %stop_line.line_id, error = %e, "Line lookup failed");
            issues.push(ScheduleIssue {
                scope: IssueScope::LineInfo {
                    line_id: stop_line.line_id.clone(),
                },
                error: e,
            });
            LineInfo::default()
        });

        PairOutcome {
            visits,
            line,
            issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::catalog::MockCatalogClient;
    use crate::realtime::{MockStopMonitoringClient, SiriValue};
    use crate::time::FixedClock;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn visit(direction: &str, destination: &str, stop: &str, at: DateTime<Utc>) -> MonitoredStopVisit {
        let mut visit = MonitoredStopVisit::default();
        let journey = &mut visit.monitored_vehicle_journey;
        journey.direction_name = vec![SiriValue::new(direction)];
        journey.monitored_call.destination_display = vec![SiriValue::new(destination)];
        journey.monitored_call.stop_point_name = vec![SiriValue::new(stop)];
        journey.monitored_call.expected_departure_time = Some(at.to_rfc3339());
        visit
    }

    fn metro_one() -> LineInfo {
        LineInfo {
            name: "1".to_string(),
            color: "FFCD00".to_string(),
            text_color: "000000".to_string(),
            mode: Some(Mode::Metro),
        }
    }

    fn chatelet() -> StopLine {
        StopLine::new("111", "222", "Chatelet", "Metro 1")
    }

    fn watcher(
        config: StopWatcherConfig,
        catalog: MockCatalogClient,
        monitoring: MockStopMonitoringClient,
    ) -> StopWatcher {
        StopWatcher::with_clients(config, Arc::new(catalog), Arc::new(monitoring))
            .unwrap()
            .with_clock(Arc::new(FixedClock(now())))
    }

    fn catalog_with(stop_lines: Vec<StopLine>) -> MockCatalogClient {
        let mut catalog = MockCatalogClient::new();
        catalog
            .expect_find_stop_lines()
            .returning(move |_| Ok(stop_lines.clone()));
        catalog
            .expect_fetch_line_info()
            .returning(|_| Ok(metro_one()));
        catalog
    }

    fn monitoring_with(visits: Vec<MonitoredStopVisit>) -> MockStopMonitoringClient {
        let mut monitoring = MockStopMonitoringClient::new();
        monitoring
            .expect_fetch_visits()
            .returning(move |_, _| Ok(visits.clone()));
        monitoring
    }

    #[test]
    fn test_group_drops_past_visits() {
        let visits = vec![
            visit("La Défense", "La Défense", "Chatelet", now() - Duration::minutes(1)),
            visit("La Défense", "La Défense", "Chatelet", now() + Duration::minutes(3)),
        ];
        let grouped = group_by_direction(&visits, now(), "fr", false);

        assert_eq!(grouped.directions.len(), 1);
        assert_eq!(grouped.directions[0].upcoming_departures.len(), 1);
        assert_eq!(
            grouped.directions[0].upcoming_departures[0].next,
            NextDeparture::Text("dans 3 min".to_string())
        );
    }

    #[test]
    fn test_group_keeps_visit_leaving_now() {
        let visits = vec![visit("Nation", "Nation", "Chatelet", now())];
        let grouped = group_by_direction(&visits, now(), "fr", false);
        assert_eq!(grouped.directions[0].upcoming_departures.len(), 1);
    }

    #[test]
    fn test_group_drops_self_loops() {
        let visits = vec![
            visit("Chatelet", "Chatelet", "Chatelet", now() + Duration::minutes(2)),
            visit("Nation", "Nation", "Chatelet", now() + Duration::minutes(2)),
        ];
        let grouped = group_by_direction(&visits, now(), "fr", false);

        assert_eq!(grouped.directions.len(), 1);
        assert_eq!(grouped.directions[0].name, "Nation");
    }

    #[test]
    fn test_group_drops_self_loop_with_status_text() {
        let mut looped = MonitoredStopVisit::default();
        looped.monitored_vehicle_journey.monitored_call.departure_status =
            Some("cancelled".to_string());
        let grouped = group_by_direction(&[looped], now(), "fr", false);
        assert!(grouped.directions.is_empty());
    }

    #[test]
    fn test_group_same_direction_different_destinations() {
        let visits = vec![
            visit("Nord", "Aéroport CDG 2", "Gare du Nord", now() + Duration::minutes(2)),
            visit("Sud", "Massy", "Gare du Nord", now() + Duration::minutes(3)),
            visit("Nord", "Mitry-Claye", "Gare du Nord", now() + Duration::minutes(5)),
        ];
        let grouped = group_by_direction(&visits, now(), "fr", false);

        assert_eq!(grouped.directions.len(), 2);
        assert_eq!(grouped.directions[0].name, "Nord");
        assert_eq!(grouped.directions[1].name, "Sud");

        let destinations: Vec<&str> = grouped.directions[0]
            .upcoming_departures
            .iter()
            .map(|d| d.destination.as_str())
            .collect();
        assert_eq!(destinations, vec!["Aéroport CDG 2", "Mitry-Claye"]);
    }

    #[test]
    fn test_group_as_date() {
        let at = now() + Duration::minutes(5);
        let mut cancelled = visit("Nation", "Nation", "Chatelet", at);
        cancelled
            .monitored_vehicle_journey
            .monitored_call
            .expected_departure_time = None;
        cancelled.monitored_vehicle_journey.monitored_call.departure_status =
            Some("cancelled".to_string());

        let visits = vec![visit("Nation", "Nation", "Chatelet", at), cancelled];
        let grouped = group_by_direction(&visits, now(), "fr", true);

        let departures = &grouped.directions[0].upcoming_departures;
        assert_eq!(departures[0].next, NextDeparture::At(at));
        assert_eq!(departures[1].next, NextDeparture::Text("cancelled".to_string()));
    }

    #[test]
    fn test_group_formatting_error_keeps_raw_value() {
        let at = now() + Duration::minutes(5);
        let visits = vec![visit("Nation", "Nation", "Chatelet", at)];
        let grouped = group_by_direction(&visits, now(), "12", false);

        assert_eq!(grouped.formatting_errors.len(), 1);
        assert_eq!(
            grouped.directions[0].upcoming_departures[0].next,
            NextDeparture::Text(at.to_rfc3339())
        );
    }

    #[test]
    fn test_with_clients_rejects_missing_api_key() {
        let result = StopWatcher::with_clients(
            StopWatcherConfig::new(""),
            Arc::new(MockCatalogClient::new()),
            Arc::new(MockStopMonitoringClient::new()),
        );
        assert!(matches!(result, Err(IdfmError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_chatelet_scenario() {
        let mut catalog = MockCatalogClient::new();
        catalog
            .expect_find_stop_lines()
            .withf(|q| q.query == "Chatelet" && q.mode == Some(Mode::Metro) && q.line_name.is_none())
            .times(1)
            .returning(|_| Ok(vec![chatelet()]));
        catalog
            .expect_fetch_line_info()
            .withf(|line_id| line_id.to_string() == "222")
            .times(1)
            .returning(|_| Ok(metro_one()));

        let mut monitoring = MockStopMonitoringClient::new();
        monitoring
            .expect_fetch_visits()
            .withf(|stop_line, mode| stop_line.stop_id == "111" && *mode == Some(Mode::Metro))
            .times(1)
            .returning(|_, _| {
                Ok(vec![visit(
                    "La Defense",
                    "La Defense",
                    "Chatelet",
                    now() + Duration::minutes(5),
                )])
            });

        let watcher = watcher(StopWatcherConfig::new("key"), catalog, monitoring);
        let report = watcher
            .get_stop_schedules_report("Chatelet", Some(Mode::Metro), None)
            .await;

        assert!(!report.is_degraded());
        assert_eq!(
            report.schedules,
            vec![StopSchedule {
                stop: "Chatelet".to_string(),
                line: metro_one(),
                directions: vec![DirectionSchedule {
                    name: "La Defense".to_string(),
                    upcoming_departures: vec![Departure {
                        destination: "La Defense".to_string(),
                        next: NextDeparture::Text("dans 5 min".to_string()),
                    }],
                }],
            }]
        );
    }

    #[tokio::test]
    async fn test_zero_visits_yield_placeholder() {
        let watcher = watcher(
            StopWatcherConfig::new("key"),
            catalog_with(vec![chatelet()]),
            monitoring_with(vec![]),
        );
        let schedules = watcher.get_stop_schedules("Chatelet", None, None).await;

        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].directions, vec![DirectionSchedule::unknown()]);
    }

    #[tokio::test]
    async fn test_only_past_visits_yield_placeholder() {
        let watcher = watcher(
            StopWatcherConfig::new("key"),
            catalog_with(vec![chatelet()]),
            monitoring_with(vec![visit(
                "Nation",
                "Nation",
                "Chatelet",
                now() - Duration::minutes(2),
            )]),
        );
        let schedules = watcher.get_stop_schedules("Chatelet", None, None).await;

        assert_eq!(schedules[0].directions, vec![DirectionSchedule::unknown()]);
    }

    #[tokio::test]
    async fn test_realtime_failure_degrades_to_placeholder() {
        let mut monitoring = MockStopMonitoringClient::new();
        monitoring
            .expect_fetch_visits()
            .returning(|_, _| Err(IdfmError::MissingDelivery));

        let watcher = watcher(
            StopWatcherConfig::new("key"),
            catalog_with(vec![chatelet()]),
            monitoring,
        );
        let report = watcher.get_stop_schedules_report("Chatelet", None, None).await;

        assert_eq!(report.schedules.len(), 1);
        assert!(report.schedules[0].directions[0].is_placeholder());
        assert_eq!(report.issues.len(), 1);
        assert!(matches!(report.issues[0].scope, IssueScope::Visits { .. }));
        assert!(report.issues[0].error.is_missing_data());
    }

    #[tokio::test]
    async fn test_catalog_failure_yields_empty_result() {
        let mut catalog = MockCatalogClient::new();
        catalog
            .expect_find_stop_lines()
            .returning(|_| Err(IdfmError::ConnectionFailed("refused".to_string())));

        let watcher = watcher(
            StopWatcherConfig::new("key"),
            catalog,
            MockStopMonitoringClient::new(),
        );
        let report = watcher.get_stop_schedules_report("Chatelet", None, None).await;

        assert!(report.schedules.is_empty());
        assert_eq!(report.issues.len(), 1);
        assert_eq!(
            report.issues[0].scope,
            IssueScope::StopSearch {
                query: "Chatelet".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_line_failure_degrades_to_empty_line_info() {
        let mut catalog = MockCatalogClient::new();
        catalog
            .expect_find_stop_lines()
            .returning(|_| Ok(vec![chatelet()]));
        catalog
            .expect_fetch_line_info()
            .times(2)
            .returning(|id| Err(IdfmError::LineNotFound(id.to_string())));

        let watcher = watcher(
            StopWatcherConfig::new("key"),
            catalog,
            monitoring_with(vec![]),
        );
        let report = watcher.get_stop_schedules_report("Chatelet", None, None).await;

        assert!(report.schedules[0].line.is_empty());
        assert!(matches!(report.issues[0].scope, IssueScope::LineInfo { .. }));

        // failures are not cached
        assert!(watcher.resolve_line_info("222").await.is_err());
        assert!(!watcher.line_cache().contains("222"));
    }

    #[tokio::test]
    async fn test_resolve_line_info_is_cached() {
        let mut catalog = MockCatalogClient::new();
        catalog
            .expect_fetch_line_info()
            .times(1)
            .returning(|_| Ok(metro_one()));

        let watcher = watcher(
            StopWatcherConfig::new("key"),
            catalog,
            MockStopMonitoringClient::new(),
        );

        let first = watcher.resolve_line_info("222").await.unwrap();
        let second = watcher.resolve_line_info("222").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(watcher.line_cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_recurring_pair_merges_directions() {
        let stop_lines = vec![
            StopLine::new("111", "222", "Chatelet", "Metro 1"),
            StopLine::new("112", "222", "Chatelet", "Metro 1"),
            StopLine::new("113", "222", "Chatelet", "Metro 1"),
        ];

        let mut monitoring = MockStopMonitoringClient::new();
        monitoring.expect_fetch_visits().returning(|stop_line, _| {
            let direction = match stop_line.stop_id.as_str() {
                "111" => "La Defense",
                "112" => "Chateau de Vincennes",
                _ => return Ok(Vec::new()),
            };
            Ok(vec![visit(
                direction,
                direction,
                "Chatelet",
                now() + Duration::minutes(4),
            )])
        });

        let watcher = watcher(
            StopWatcherConfig::new("key"),
            catalog_with(stop_lines),
            monitoring,
        );
        let schedules = watcher.get_stop_schedules("Chatelet", None, None).await;

        assert_eq!(schedules.len(), 1);
        let names: Vec<&str> = schedules[0]
            .directions
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["La Defense", "Chateau de Vincennes"]);
    }

    #[tokio::test]
    async fn test_recurring_pair_folds_same_direction() {
        let stop_lines = vec![
            StopLine::new("111", "222", "Chatelet", "Metro 1"),
            StopLine::new("112", "222", "Chatelet", "Metro 1"),
        ];

        let mut monitoring = MockStopMonitoringClient::new();
        monitoring.expect_fetch_visits().returning(|stop_line, _| {
            let minutes = if stop_line.stop_id == "111" { 2 } else { 6 };
            Ok(vec![visit(
                "Nation",
                "Nation",
                "Chatelet",
                now() + Duration::minutes(minutes),
            )])
        });

        let watcher = watcher(
            StopWatcherConfig::new("key"),
            catalog_with(stop_lines),
            monitoring,
        );
        let schedules = watcher.get_stop_schedules("Chatelet", None, None).await;

        assert_eq!(schedules[0].directions.len(), 1);
        let nexts: Vec<String> = schedules[0].directions[0]
            .upcoming_departures
            .iter()
            .map(|d| d.next.to_string())
            .collect();
        assert_eq!(nexts, vec!["dans 2 min", "dans 6 min"]);
    }

    #[tokio::test]
    async fn test_recurring_pair_without_visits_keeps_one_placeholder() {
        let stop_lines = vec![
            StopLine::new("111", "222", "Chatelet", "Metro 1"),
            StopLine::new("112", "222", "Chatelet", "Metro 1"),
        ];

        let watcher = watcher(
            StopWatcherConfig::new("key"),
            catalog_with(stop_lines),
            monitoring_with(vec![]),
        );
        let schedules = watcher.get_stop_schedules("Chatelet", None, None).await;

        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].directions, vec![DirectionSchedule::unknown()]);
    }

    /// Catalog answering line lookups after a delay, counting them
    #[derive(Debug, Default)]
    struct SlowCatalog {
        line_fetches: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CatalogClient for SlowCatalog {
        async fn find_stop_lines(&self, _query: &StopLineQuery) -> Result<Vec<StopLine>, IdfmError> {
            Ok(["111", "112", "113", "114", "115"]
                .into_iter()
                .map(|stop_id| StopLine::new(stop_id, "222", "Chatelet", "Metro 1"))
                .collect())
        }

        async fn fetch_line_info(&self, _line_id: &str) -> Result<LineInfo, IdfmError> {
            self.line_fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(metro_one())
        }

        async fn is_healthy(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_concurrent_pairs_fetch_each_line_once() {
        let catalog = Arc::new(SlowCatalog::default());
        let watcher = StopWatcher::with_clients(
            StopWatcherConfig::new("key"),
            Arc::clone(&catalog) as Arc<dyn CatalogClient>,
            Arc::new(monitoring_with(vec![])),
        )
        .unwrap()
        .with_clock(Arc::new(FixedClock(now())));

        let report = watcher.get_stop_schedules_report("Chatelet", None, None).await;

        assert!(!report.is_degraded());
        assert_eq!(report.schedules.len(), 1);
        assert_eq!(report.schedules[0].line, metro_one());
        assert_eq!(catalog.line_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_lines_keep_catalog_order() {
        let stop_lines = vec![
            StopLine::new("111", "222", "Chatelet", "Metro 1"),
            StopLine::new("113", "444", "Chatelet", "Metro 4"),
            StopLine::new("114", "222", "Louvre", "Metro 1"),
        ];

        let watcher = watcher(
            StopWatcherConfig::new("key"),
            catalog_with(stop_lines),
            monitoring_with(vec![]),
        );
        let schedules = watcher.get_stop_schedules("Chatelet", None, None).await;

        let stops: Vec<&str> = schedules.iter().map(|s| s.stop.as_str()).collect();
        assert_eq!(stops, vec!["Chatelet", "Chatelet", "Louvre"]);
    }
}
