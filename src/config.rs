//! Configuration management for PeerLens.
//!
//! This module provides a centralized configuration struct that loads settings
//! from environment variables. All configuration is loaded once at startup
//! and can be displayed for logging purposes.

use std::fmt;
use std::time::Duration;

/// Cloudflare, the network whose reachability is being evaluated by default.
pub const DEFAULT_TARGET_ASN: u32 = 13335;

/// Default values for upstream configuration
const DEFAULT_ROUTE_TABLE_URL: &str = "https://bgp.tools/table.jsonl";
const DEFAULT_IXP_URL: &str = "https://www.peeringdb.com/api/netixlan";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 500;

/// Default values for cache configuration
const DEFAULT_ROUTE_TABLE_TTL_SECS: u64 = 30 * 60;
const DEFAULT_IXP_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_IXP_STALE_GRACE_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_REPORT_TTL_SECS: u64 = 24 * 60 * 60;

/// Default values for the scoring heuristic
const DEFAULT_HEALTH_WEIGHT: f64 = 40.0;
const DEFAULT_REGIONAL_WEIGHT: u32 = 40;
const DEFAULT_PEER_WEIGHT: u32 = 10;
const DEFAULT_PEER_CAP: u32 = 20;
const DEFAULT_LOW_VIS_FLOOR: u32 = 1000;
const DEFAULT_LOW_VIS_RATIO: f64 = 0.5;
const DEFAULT_LOW_VIS_LIMIT: usize = 50;

/// Version tag of the scoring formula, reported alongside every score.
pub const SCORING_FORMULA_VERSION: &str = "v2";

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn default_user_agent() -> String {
    format!("peerlens/{}", env!("CARGO_PKG_VERSION"))
}

/// Upstream endpoint settings.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Newline-delimited JSON routing table snapshot.
    /// Environment variable: `PEERLENS_ROUTE_TABLE_URL`
    pub route_table_url: String,

    /// Per-ASN IXP membership endpoint, queried with `?asn=N`.
    /// Environment variable: `PEERLENS_IXP_URL`
    pub ixp_url: String,

    /// User agent sent to every upstream.
    /// Environment variable: `PEERLENS_USER_AGENT`
    pub user_agent: String,

    /// Optional PeeringDB API key, raises the rate-limit tier.
    /// Environment variable: `PEERINGDB_API_KEY`
    pub ixp_api_key: Option<String>,

    /// Per-call timeout in seconds.
    /// Environment variable: `PEERLENS_HTTP_TIMEOUT_SECS`
    pub timeout_secs: u64,

    /// Maximum attempts for a route table fetch that fails at the transport level.
    /// Environment variable: `PEERLENS_MAX_RETRIES`
    pub max_retries: u32,

    /// Initial backoff between route table attempts, doubled on each retry.
    /// Environment variable: `PEERLENS_BACKOFF_MS`
    pub backoff_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            route_table_url: DEFAULT_ROUTE_TABLE_URL.to_string(),
            ixp_url: DEFAULT_IXP_URL.to_string(),
            user_agent: default_user_agent(),
            ixp_api_key: None,
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_ms: DEFAULT_BACKOFF_MS,
        }
    }
}

impl UpstreamConfig {
    /// Load upstream configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            route_table_url: std::env::var("PEERLENS_ROUTE_TABLE_URL")
                .unwrap_or_else(|_| DEFAULT_ROUTE_TABLE_URL.to_string()),
            ixp_url: std::env::var("PEERLENS_IXP_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_IXP_URL.to_string()),
            user_agent: std::env::var("PEERLENS_USER_AGENT")
                .unwrap_or_else(|_| default_user_agent()),
            ixp_api_key: std::env::var("PEERINGDB_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            timeout_secs: env_or("PEERLENS_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
            max_retries: env_or("PEERLENS_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            backoff_ms: env_or("PEERLENS_BACKOFF_MS", DEFAULT_BACKOFF_MS),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Display for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "route_table_url={}, ixp_url={}, api_key={}, timeout_secs={}, max_retries={}, backoff_ms={}",
            self.route_table_url,
            self.ixp_url,
            match self.ixp_api_key {
                Some(_) => "<redacted>",
                None => "none",
            },
            self.timeout_secs,
            self.max_retries,
            self.backoff_ms
        )
    }
}

/// Cache TTL settings, one per key space.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Environment variable: `PEERLENS_ROUTE_TABLE_TTL_SECS`
    pub route_table_ttl_secs: u64,

    /// Environment variable: `PEERLENS_IXP_TTL_SECS`
    pub ixp_ttl_secs: u64,

    /// How long an expired membership entry is retained as last-known-good.
    /// Environment variable: `PEERLENS_IXP_STALE_GRACE_SECS`
    pub ixp_stale_grace_secs: u64,

    /// Environment variable: `PEERLENS_REPORT_TTL_SECS`
    pub report_ttl_secs: u64,

    /// SQLite file backing the key-value store; in-memory store when unset.
    /// Environment variable: `PEERLENS_CACHE_DB`
    pub db_path: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            route_table_ttl_secs: DEFAULT_ROUTE_TABLE_TTL_SECS,
            ixp_ttl_secs: DEFAULT_IXP_TTL_SECS,
            ixp_stale_grace_secs: DEFAULT_IXP_STALE_GRACE_SECS,
            report_ttl_secs: DEFAULT_REPORT_TTL_SECS,
            db_path: None,
        }
    }
}

impl CacheConfig {
    /// Load cache configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            route_table_ttl_secs: env_or(
                "PEERLENS_ROUTE_TABLE_TTL_SECS",
                DEFAULT_ROUTE_TABLE_TTL_SECS,
            ),
            ixp_ttl_secs: env_or("PEERLENS_IXP_TTL_SECS", DEFAULT_IXP_TTL_SECS),
            ixp_stale_grace_secs: env_or(
                "PEERLENS_IXP_STALE_GRACE_SECS",
                DEFAULT_IXP_STALE_GRACE_SECS,
            ),
            report_ttl_secs: env_or("PEERLENS_REPORT_TTL_SECS", DEFAULT_REPORT_TTL_SECS),
            db_path: std::env::var("PEERLENS_CACHE_DB").ok(),
        }
    }

    pub fn route_table_ttl(&self) -> Duration {
        Duration::from_secs(self.route_table_ttl_secs)
    }

    pub fn ixp_ttl(&self) -> Duration {
        Duration::from_secs(self.ixp_ttl_secs)
    }

    pub fn ixp_stale_grace(&self) -> Duration {
        Duration::from_secs(self.ixp_stale_grace_secs)
    }

    pub fn report_ttl(&self) -> Duration {
        Duration::from_secs(self.report_ttl_secs)
    }
}

impl fmt::Display for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "route_table_ttl={}s, ixp_ttl={}s, ixp_stale_grace={}s, report_ttl={}s",
            self.route_table_ttl_secs,
            self.ixp_ttl_secs,
            self.ixp_stale_grace_secs,
            self.report_ttl_secs
        )
    }
}

/// Weights and thresholds of the composite score.
///
/// The defaults reproduce the `v2` formula: up to 40 points for route health,
/// 40 for presence at the regional IXP, and 10 per shared IXP capped at 20.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Environment variable: `PEERLENS_SCORE_HEALTH_WEIGHT`
    pub health_weight: f64,

    /// Environment variable: `PEERLENS_SCORE_REGIONAL_WEIGHT`
    pub regional_weight: u32,

    /// Points per shared IXP.
    /// Environment variable: `PEERLENS_SCORE_PEER_WEIGHT`
    pub peer_weight: u32,

    /// Environment variable: `PEERLENS_SCORE_PEER_CAP`
    pub peer_cap: u32,

    /// Lowest possible low-visibility threshold.
    /// Environment variable: `PEERLENS_LOW_VIS_FLOOR`
    pub low_visibility_floor: u32,

    /// Fraction of the average visibility used as the threshold.
    /// Environment variable: `PEERLENS_LOW_VIS_RATIO`
    pub low_visibility_ratio: f64,

    /// Maximum number of low-visibility prefixes listed in a report.
    /// Environment variable: `PEERLENS_LOW_VIS_LIMIT`
    pub low_visibility_limit: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            health_weight: DEFAULT_HEALTH_WEIGHT,
            regional_weight: DEFAULT_REGIONAL_WEIGHT,
            peer_weight: DEFAULT_PEER_WEIGHT,
            peer_cap: DEFAULT_PEER_CAP,
            low_visibility_floor: DEFAULT_LOW_VIS_FLOOR,
            low_visibility_ratio: DEFAULT_LOW_VIS_RATIO,
            low_visibility_limit: DEFAULT_LOW_VIS_LIMIT,
        }
    }
}

impl ScoringConfig {
    /// Load scoring configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            health_weight: env_or("PEERLENS_SCORE_HEALTH_WEIGHT", DEFAULT_HEALTH_WEIGHT),
            regional_weight: env_or("PEERLENS_SCORE_REGIONAL_WEIGHT", DEFAULT_REGIONAL_WEIGHT),
            peer_weight: env_or("PEERLENS_SCORE_PEER_WEIGHT", DEFAULT_PEER_WEIGHT),
            peer_cap: env_or("PEERLENS_SCORE_PEER_CAP", DEFAULT_PEER_CAP),
            low_visibility_floor: env_or("PEERLENS_LOW_VIS_FLOOR", DEFAULT_LOW_VIS_FLOOR),
            low_visibility_ratio: env_or("PEERLENS_LOW_VIS_RATIO", DEFAULT_LOW_VIS_RATIO),
            low_visibility_limit: env_or("PEERLENS_LOW_VIS_LIMIT", DEFAULT_LOW_VIS_LIMIT),
        }
    }
}

impl fmt::Display for ScoringConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "formula={}, health_weight={}, regional_weight={}, peer_weight={}, peer_cap={}, low_vis_floor={}, low_vis_ratio={}",
            SCORING_FORMULA_VERSION,
            self.health_weight,
            self.regional_weight,
            self.peer_weight,
            self.peer_cap,
            self.low_visibility_floor,
            self.low_visibility_ratio
        )
    }
}

/// Complete PeerLens configuration.
#[derive(Debug, Clone)]
pub struct PeerLensConfig {
    /// Environment variable: `PEERLENS_TARGET_ASN`
    pub target_asn: u32,

    pub upstream: UpstreamConfig,

    pub cache: CacheConfig,

    pub scoring: ScoringConfig,

    /// JSON file overriding the built-in reference lists.
    /// Environment variable: `PEERLENS_REFERENCE_PATH`
    pub reference_path: Option<String>,

    /// Official prefixes of the target network, for the coverage cross-check.
    /// Environment variable: `PEERLENS_OFFICIAL_PREFIXES` (comma separated)
    pub official_prefixes: Vec<String>,
}

impl Default for PeerLensConfig {
    fn default() -> Self {
        Self {
            target_asn: DEFAULT_TARGET_ASN,
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
            scoring: ScoringConfig::default(),
            reference_path: None,
            official_prefixes: vec![],
        }
    }
}

impl PeerLensConfig {
    /// Create a new PeerLensConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load all configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            target_asn: env_or("PEERLENS_TARGET_ASN", DEFAULT_TARGET_ASN),
            upstream: UpstreamConfig::from_env(),
            cache: CacheConfig::from_env(),
            scoring: ScoringConfig::from_env(),
            reference_path: std::env::var("PEERLENS_REFERENCE_PATH").ok(),
            official_prefixes: std::env::var("PEERLENS_OFFICIAL_PREFIXES")
                .map(|s| parse_prefix_list(s.as_str()))
                .unwrap_or_default(),
        }
    }

    /// Display configuration summary for logging.
    ///
    /// Returns a vector of log lines suitable for info-level logging.
    pub fn display_summary(&self) -> Vec<String> {
        let mut lines = Vec::new();

        lines.push("=== PeerLens Configuration ===".to_string());
        lines.push(format!("Target network: AS{}", self.target_asn));
        lines.push(format!("Upstreams: {}", self.upstream));
        lines.push(format!("Caches: {}", self.cache));

        match &self.cache.db_path {
            Some(path) => lines.push(format!("Cache store: SQLite ({})", path)),
            None => lines.push("Cache store: in-memory".to_string()),
        }

        lines.push(format!("Scoring: {}", self.scoring));

        match &self.reference_path {
            Some(path) => lines.push(format!("Reference data: {}", path)),
            None => lines.push("Reference data: built-in".to_string()),
        }

        if self.official_prefixes.is_empty() {
            lines.push("Prefix coverage check: DISABLED".to_string());
        } else {
            lines.push(format!(
                "Prefix coverage check: ENABLED ({} official prefixes)",
                self.official_prefixes.len()
            ));
        }

        lines.push("==============================".to_string());

        lines
    }
}

fn parse_prefix_list(s: &str) -> Vec<String> {
    s.split([',', ' ', '\n'])
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PeerLensConfig::default();
        assert_eq!(config.target_asn, 13335);
        assert_eq!(config.cache.route_table_ttl(), Duration::from_secs(1800));
        assert_eq!(config.cache.ixp_ttl(), Duration::from_secs(86400));
        assert_eq!(config.cache.report_ttl(), Duration::from_secs(86400));
        assert_eq!(config.scoring.health_weight, 40.0);
        assert_eq!(config.scoring.regional_weight, 40);
        assert_eq!(config.scoring.peer_cap, 20);
        assert_eq!(config.scoring.low_visibility_limit, 50);
        assert!(config.upstream.ixp_api_key.is_none());
        assert!(config.official_prefixes.is_empty());
    }

    #[test]
    fn test_upstream_display_redacts_key() {
        let config = UpstreamConfig {
            ixp_api_key: Some("secret-key".to_string()),
            ..Default::default()
        };
        let display = format!("{}", config);
        assert!(display.contains("api_key=<redacted>"));
        assert!(!display.contains("secret-key"));
        assert!(display.contains("timeout_secs=10"));
    }

    #[test]
    fn test_parse_prefix_list() {
        let prefixes = parse_prefix_list("104.16.0.0/13, 2606:4700::/32,,\n172.64.0.0/13");
        assert_eq!(
            prefixes,
            vec!["104.16.0.0/13", "2606:4700::/32", "172.64.0.0/13"]
        );
    }

    #[test]
    fn test_summary_mentions_store() {
        let mut config = PeerLensConfig::default();
        let lines = config.display_summary();
        assert!(lines.iter().any(|l| l.contains("in-memory")));

        config.cache.db_path = Some("/tmp/peerlens.sqlite3".to_string());
        let lines = config.display_summary();
        assert!(lines.iter().any(|l| l.contains("SQLite")));
    }
}
