/*!
# Overview

[peerlens][crate] scores how well an ISP, identified by its ASN, is positioned to reach a
target network (Cloudflare, AS13335, by default).

A report combines two upstream data sources:
- a global BGP routing table snapshot, from which the target network's route visibility is
  summarized (prefix counts, visibility statistics, low-visibility prefixes, histogram);
- per-ASN IXP memberships from a PeeringDB-style registry, from which the IXPs shared by the
  ISP and the target network are derived.

Each layer is cached with its own TTL: the route table in process memory (30 minutes),
IXP memberships (24 hours) and finished reports (24 hours) in a [KvStore].

# Examples

```no_run
use peerlens::{PeerLens, PeerLensConfig};

#[tokio::main]
async fn main() {
    let lens = PeerLens::new(PeerLensConfig::from_env()).unwrap();
    let response = lens.report(3320).await.unwrap();
    println!(
        "AS{} scores {} ({} shared IXPs with AS{})",
        response.report.asn,
        response.report.score.total,
        response.report.shared_ixp_count,
        response.report.target_asn,
    );
}
```

IXP registry problems never fail a report: memberships degrade to the last known set for
the ASN, or to an empty set, and the report records the [MembershipStatus] of both parties.
A route table failure fails the request.
*/

#[cfg(feature = "server")]
pub mod api;
pub mod cache;
mod config;
mod error;
mod ixp;
pub mod prefix;
mod reference;
mod report;
mod routes;
mod scoring;

pub use cache::{Clock, KvStore, ManualClock, MemoryStore, ReportCache, SystemClock, TypedCache};
#[cfg(feature = "sqlite")]
pub use cache::SqliteStore;
pub use config::{
    CacheConfig, PeerLensConfig, ScoringConfig, UpstreamConfig, DEFAULT_TARGET_ASN,
    SCORING_FORMULA_VERSION,
};
pub use error::PeerLensError;
pub use ixp::{parse_memberships, DegradeReason, IxpMembershipSource, IxpMemberships, MembershipStatus};
pub use reference::{IspRecord, ReferenceData, RegionalIxp, DEFAULT_REFERENCE_DATA, UNKNOWN_COUNTRY};
pub use report::{
    build_report, LowVisibilityPrefix, PeeringReport, PrefixCounts, RegionalMatch, ReportInputs,
    VisibilityBucket, VisibilityStats,
};
pub use routes::{fetch_route_table, parse_route_table, RouteEntry, RouteTableSource};
pub use scoring::{compute_score, ScoreBreakdown, ScoreInputs};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A report together with how it was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportResponse {
    pub report: PeeringReport,
    /// served from the report cache
    pub cached: bool,
    pub elapsed_ms: u64,
    /// size of the full routing table the report was computed from
    pub route_table_size: usize,
}

/// Parse a user-supplied ASN.
///
/// Accepts a plain decimal number, optionally prefixed with `AS`.
pub fn parse_asn(input: &str) -> Result<u32, PeerLensError> {
    let trimmed = input.trim();
    let digits = match trimmed.get(..2) {
        Some(prefix) if prefix.eq_ignore_ascii_case("as") => &trimmed[2..],
        _ => trimmed,
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(PeerLensError::InvalidInput(format!(
            "invalid ASN `{}`, expected an integer",
            input
        )));
    }
    digits
        .parse::<u32>()
        .map_err(|_| PeerLensError::InvalidInput(format!("ASN `{}` is out of range", input)))
}

/// Why a report built from these memberships must not be cached, if it must not.
///
/// A report is only cached when both parties were resolved against the registry
/// or a cache, and the queried ASN has at least one membership. Empty sets are
/// never cached at the membership layer either.
fn uncacheable_reason(isp: &IxpMemberships, target: &IxpMemberships) -> Option<&'static str> {
    if !isp.status.is_resolved() {
        return Some("ixp memberships of the queried network could not be resolved");
    }
    if !target.status.is_resolved() {
        return Some("ixp memberships of the target network could not be resolved");
    }
    if isp.is_empty() {
        return Some("queried network has no ixp memberships");
    }
    None
}

/// PeerLens owns the upstream sources and caches and runs the per-request pipeline.
///
/// Cloning is cheap; clones share sources and caches.
#[derive(Clone)]
pub struct PeerLens {
    config: Arc<PeerLensConfig>,
    reference: Arc<ReferenceData>,
    routes: RouteTableSource,
    ixps: IxpMembershipSource,
    reports: ReportCache,
    store: Arc<dyn KvStore>,
}

impl PeerLens {
    /// Construct a new PeerLens with an in-memory key-value store.
    pub fn new(config: PeerLensConfig) -> Result<Self, PeerLensError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        Self::with_store(config, store, clock)
    }

    /// Construct a new PeerLens using the store selected by the configuration:
    /// SQLite when `cache.db_path` is set, in-memory otherwise.
    pub async fn from_config(config: PeerLensConfig) -> Result<Self, PeerLensError> {
        match config.cache.db_path.clone() {
            #[cfg(feature = "sqlite")]
            Some(path) => {
                let clock: Arc<dyn Clock> = Arc::new(SystemClock);
                let store = Arc::new(SqliteStore::with_clock(path.as_str(), clock.clone()).await?);
                Self::with_store(config, store, clock)
            }
            #[cfg(not(feature = "sqlite"))]
            Some(path) => Err(PeerLensError::ConfigError(format!(
                "cache database {} requires the `sqlite` feature",
                path
            ))),
            None => Self::new(config),
        }
    }

    /// Construct a new PeerLens on top of an existing store and clock.
    pub fn with_store(
        config: PeerLensConfig,
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PeerLensError> {
        let reference = ReferenceData::load(config.reference_path.as_deref())?;

        let client = reqwest::Client::builder()
            .user_agent(config.upstream.user_agent.as_str())
            .timeout(config.upstream.timeout())
            .build()?;

        let routes = RouteTableSource::new(
            client.clone(),
            config.upstream.route_table_url.as_str(),
            config.cache.route_table_ttl(),
            clock.clone(),
        )
        .retries(config.upstream.max_retries, config.upstream.backoff_ms);

        let membership_cache = TypedCache::new(
            store.clone(),
            clock.clone(),
            "ixp",
            config.cache.ixp_ttl(),
        )
        .with_stale_grace(config.cache.ixp_stale_grace());
        let ixps = IxpMembershipSource::new(
            client,
            config.upstream.ixp_url.as_str(),
            membership_cache,
        )
        .api_key(config.upstream.ixp_api_key.clone());

        let reports = ReportCache::new(store.clone(), clock, config.cache.report_ttl());

        Ok(Self {
            config: Arc::new(config),
            reference: Arc::new(reference),
            routes,
            ixps,
            reports,
            store,
        })
    }

    /// Replace the reference lists.
    pub fn reference_data(self, reference: ReferenceData) -> Self {
        Self {
            reference: Arc::new(reference),
            ..self
        }
    }

    pub fn config(&self) -> &PeerLensConfig {
        &self.config
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    /// The static list of known ISPs. Makes no network calls.
    pub fn known_isps(&self) -> &[IspRecord] {
        self.reference.isps.as_slice()
    }

    /// Get the peering report for `asn`, from the report cache when possible.
    pub async fn report(&self, asn: u32) -> Result<ReportResponse, PeerLensError> {
        let start = Instant::now();

        if let Some(report) = self.reports.get(asn).await {
            debug!("report cache hit for AS{}", asn);
            return Ok(ReportResponse {
                route_table_size: report.route_table_size,
                report,
                cached: true,
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }

        let target_asn = self.config.target_asn;
        info!("computing report for AS{} against AS{}", asn, target_asn);
        let (routes, target_ixps, isp_ixps) = tokio::join!(
            self.routes.get_route_table(),
            self.ixps.get_memberships(target_asn),
            self.ixps.get_memberships(asn),
        );
        let routes = routes?;

        let report = build_report(
            asn,
            target_asn,
            &ReportInputs {
                routes: routes.as_slice(),
                target_ixps: &target_ixps,
                isp_ixps: &isp_ixps,
                official_prefixes: self.config.official_prefixes.as_slice(),
            },
            &self.reference,
            &self.config.scoring,
        );

        match uncacheable_reason(&isp_ixps, &target_ixps) {
            Some(reason) => warn!("not caching report for AS{}: {}", asn, reason),
            None => self.reports.put(asn, report.clone()).await,
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            "report for AS{} computed in {}ms, score {}",
            asn, elapsed_ms, report.score.total
        );
        Ok(ReportResponse {
            route_table_size: report.route_table_size,
            report,
            cached: false,
            elapsed_ms,
        })
    }

    /// Drop the cached report for `asn`, forcing the next request to recompute it.
    pub async fn invalidate_report(&self, asn: u32) {
        self.reports.invalidate(asn).await
    }

    /// Remove expired entries from the key-value store.
    pub async fn purge_expired(&self) -> Result<u64, PeerLensError> {
        let purged = self.store.purge_expired().await?;
        if purged > 0 {
            info!("purged {} expired cache entries", purged);
        }
        Ok(purged)
    }
}
