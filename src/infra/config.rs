//! Configuration loading from TOML files
//!
//! Config file is selected via the --config command line argument
//! (default: config/dev.toml). Pairing tables are validated at load
//! time - an inconsistent configuration is fatal at boot, never at
//! runtime.

use crate::domain::{PathId, ZoneId};
use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Unique site identifier (e.g., "yard-1")
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "ics-gateway".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Order-intake endpoint (POST)
    pub url: String,
    /// Sentinel code in the response body that signals success
    #[serde(default = "default_success_code")]
    pub success_code: i64,
    /// Prefix for generated order IDs
    #[serde(default = "default_order_prefix")]
    pub order_prefix: String,
    #[serde(default = "default_from_system")]
    pub from_system: String,
    #[serde(default = "default_model_process_code")]
    pub model_process_code: String,
    #[serde(default = "default_api_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Max concurrent dispatch submissions
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,
    /// File backing the persisted order counter
    #[serde(default = "default_counter_file")]
    pub counter_file: String,
}

fn default_success_code() -> i64 {
    1000
}

fn default_order_prefix() -> String {
    "ics".to_string()
}

fn default_from_system() -> String {
    "ICS".to_string()
}

fn default_model_process_code() -> String {
    "checking_camera_work".to_string()
}

fn default_api_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

fn default_max_inflight() -> usize {
    4
}

fn default_counter_file() -> String {
    "order_counter".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorrelationConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_confirm_threshold_secs")]
    pub confirm_threshold_secs: u64,
    #[serde(default = "default_sent_timeout_secs")]
    pub sent_timeout_secs: u64,
    #[serde(default = "default_stuck_timer_secs")]
    pub stuck_timer_secs: u64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            confirm_threshold_secs: default_confirm_threshold_secs(),
            sent_timeout_secs: default_sent_timeout_secs(),
            stuck_timer_secs: default_stuck_timer_secs(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_confirm_threshold_secs() -> u64 {
    10
}

fn default_sent_timeout_secs() -> u64 {
    300
}

fn default_stuck_timer_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_ingest_enabled")]
    pub enabled: bool,
    #[serde(default = "default_ingest_port")]
    pub port: u16,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { enabled: default_ingest_enabled(), port: default_ingest_port() }
    }
}

fn default_ingest_enabled() -> bool {
    true
}

fn default_ingest_port() -> u16 {
    25901
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    10
}

/// One zone's static pairing table
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneSpec {
    pub id: u32,
    pub starts: Vec<String>,
    pub ends: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub zones: Vec<ZoneSpec>,
    /// End path -> zone whose camera physically reads it. Unmapped end
    /// paths are read from the zone that owns the pairing rule.
    #[serde(default)]
    pub end_owners: HashMap<String, u32>,
}

/// A zone's resolved pairing configuration
#[derive(Debug, Clone)]
pub struct ZoneConfig {
    pub id: ZoneId,
    pub starts: Vec<PathId>,
    pub ends: Vec<PathId>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    api_url: String,
    api_success_code: i64,
    order_prefix: String,
    from_system: String,
    model_process_code: String,
    api_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    max_inflight: usize,
    counter_file: String,
    poll_interval: Duration,
    confirm_threshold: Duration,
    sent_timeout: Duration,
    stuck_timer: Duration,
    ingest_enabled: bool,
    ingest_port: u16,
    metrics_interval_secs: u64,
    zones: Vec<ZoneConfig>,
    end_owners: HashMap<PathId, ZoneId>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: "ics-gateway".to_string(),
            api_url: "http://192.168.1.169:7000/ics/taskOrder/addTask".to_string(),
            api_success_code: 1000,
            order_prefix: "ics".to_string(),
            from_system: "ICS".to_string(),
            model_process_code: "checking_camera_work".to_string(),
            api_timeout: Duration::from_millis(10_000),
            max_retries: 3,
            retry_backoff: Duration::from_millis(1_000),
            max_inflight: 4,
            counter_file: "order_counter".to_string(),
            poll_interval: Duration::from_millis(100),
            confirm_threshold: Duration::from_secs(10),
            sent_timeout: Duration::from_secs(300),
            stuck_timer: Duration::from_secs(300),
            ingest_enabled: true,
            ingest_port: 25901,
            metrics_interval_secs: 10,
            zones: vec![
                ZoneConfig {
                    id: ZoneId(4),
                    starts: vec![PathId::from("10000565")],
                    ends: vec![
                        PathId::from("10000557"),
                        PathId::from("10000558"),
                        PathId::from("10000559"),
                        PathId::from("10000560"),
                    ],
                },
                ZoneConfig {
                    id: ZoneId(5),
                    starts: vec![
                        PathId::from("10000452"),
                        PathId::from("10000455"),
                        PathId::from("10000458"),
                        PathId::from("10000461"),
                    ],
                    ends: vec![PathId::from("10000556")],
                },
            ],
            end_owners: HashMap::new(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let zones = toml_config
            .zones
            .into_iter()
            .map(|z| ZoneConfig {
                id: ZoneId(z.id),
                starts: z.starts.into_iter().map(PathId).collect(),
                ends: z.ends.into_iter().map(PathId).collect(),
            })
            .collect();

        let end_owners = toml_config
            .end_owners
            .into_iter()
            .map(|(path, zone)| (PathId(path), ZoneId(zone)))
            .collect();

        let config = Self {
            site_id: toml_config.site.id,
            api_url: toml_config.api.url,
            api_success_code: toml_config.api.success_code,
            order_prefix: toml_config.api.order_prefix,
            from_system: toml_config.api.from_system,
            model_process_code: toml_config.api.model_process_code,
            api_timeout: Duration::from_millis(toml_config.api.timeout_ms),
            max_retries: toml_config.api.max_retries,
            retry_backoff: Duration::from_millis(toml_config.api.retry_backoff_ms),
            max_inflight: toml_config.api.max_inflight,
            counter_file: toml_config.api.counter_file,
            poll_interval: Duration::from_millis(toml_config.correlation.poll_interval_ms.max(1)),
            confirm_threshold: Duration::from_secs(toml_config.correlation.confirm_threshold_secs),
            sent_timeout: Duration::from_secs(toml_config.correlation.sent_timeout_secs),
            stuck_timer: Duration::from_secs(toml_config.correlation.stuck_timer_secs),
            ingest_enabled: toml_config.ingest.enabled,
            ingest_port: toml_config.ingest.port,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            zones,
            end_owners,
            config_file: path.display().to_string(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the pairing tables
    ///
    /// A pair referencing a path absent from the tables, a path claimed by
    /// two zones, or an ownership entry for an unknown end path would break
    /// the mutual-exclusion invariant at runtime, so all of these are
    /// rejected before the loop starts.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.zones.is_empty() {
            bail!("no zones configured");
        }

        let zone_ids: HashSet<ZoneId> = self.zones.iter().map(|z| z.id).collect();
        if zone_ids.len() != self.zones.len() {
            bail!("duplicate zone id in configuration");
        }

        let mut seen: HashSet<&PathId> = HashSet::new();
        let mut end_paths: HashSet<&PathId> = HashSet::new();
        for zone in &self.zones {
            if zone.starts.is_empty() {
                bail!("zone {} has no start paths", zone.id);
            }
            if zone.ends.is_empty() {
                bail!("zone {} has no end paths", zone.id);
            }
            for path in zone.starts.iter().chain(zone.ends.iter()) {
                if !seen.insert(path) {
                    bail!("path {} appears more than once in the pairing tables", path);
                }
            }
            end_paths.extend(zone.ends.iter());
        }

        for (path, owner) in &self.end_owners {
            if !end_paths.contains(path) {
                bail!("end_owners entry {} does not reference a configured end path", path);
            }
            if !zone_ids.contains(owner) {
                bail!("end_owners entry {} references unknown zone {}", path, owner);
            }
        }

        Ok(())
    }

    /// Zone whose sensor reads the given end path's occupancy
    ///
    /// Falls back to the pairing zone when no ownership entry exists.
    pub fn end_owner(&self, end: &PathId, pairing_zone: ZoneId) -> ZoneId {
        self.end_owners.get(end).copied().unwrap_or(pairing_zone)
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn api_success_code(&self) -> i64 {
        self.api_success_code
    }

    pub fn order_prefix(&self) -> &str {
        &self.order_prefix
    }

    pub fn from_system(&self) -> &str {
        &self.from_system
    }

    pub fn model_process_code(&self) -> &str {
        &self.model_process_code
    }

    pub fn api_timeout(&self) -> Duration {
        self.api_timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    pub fn max_inflight(&self) -> usize {
        self.max_inflight
    }

    pub fn counter_file(&self) -> &str {
        &self.counter_file
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn confirm_threshold(&self) -> Duration {
        self.confirm_threshold
    }

    pub fn sent_timeout(&self) -> Duration {
        self.sent_timeout
    }

    pub fn stuck_timer(&self) -> Duration {
        self.stuck_timer
    }

    pub fn ingest_enabled(&self) -> bool {
        self.ingest_enabled
    }

    pub fn ingest_port(&self) -> u16 {
        self.ingest_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn zones(&self) -> &[ZoneConfig] {
        &self.zones
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to replace the zone tables
    #[cfg(test)]
    pub fn with_zones(mut self, zones: Vec<ZoneConfig>) -> Self {
        self.zones = zones;
        self
    }

    /// Builder method for tests to set correlation timing
    #[cfg(test)]
    pub fn with_timing(
        mut self,
        confirm_threshold: Duration,
        sent_timeout: Duration,
        stuck_timer: Duration,
    ) -> Self {
        self.confirm_threshold = confirm_threshold;
        self.sent_timeout = sent_timeout;
        self.stuck_timer = stuck_timer;
        self
    }

    /// Builder method for tests to set the end-path ownership map
    #[cfg(test)]
    pub fn with_end_owners(mut self, end_owners: HashMap<PathId, ZoneId>) -> Self {
        self.end_owners = end_owners;
        self
    }

    /// Builder method for tests to point dispatch at a local endpoint
    #[cfg(test)]
    pub fn with_api_url(mut self, url: String) -> Self {
        self.api_url = url;
        self
    }

    /// Builder method for tests to shorten the dispatch retry backoff
    #[cfg(test)]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Builder method for tests to relocate the order counter file
    #[cfg(test)]
    pub fn with_counter_file(mut self, path: String) -> Self {
        self.counter_file = path;
        self
    }
}
