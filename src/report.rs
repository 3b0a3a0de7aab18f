//! Per-ASN peering report: route visibility statistics of the target network
//! combined with IXP overlap between the queried ASN and the target.
//!
//! [build_report] is a pure function of its inputs; fetching and caching live in
//! [crate::PeerLens].
use crate::config::ScoringConfig;
use crate::ixp::{IxpMemberships, MembershipStatus};
use crate::prefix::{check_coverage, mask_len, AddressFamily, PrefixCoverage};
use crate::reference::{RegionalIxp, ReferenceData};
use crate::scoring::{compute_score, ScoreBreakdown, ScoreInputs};
use crate::RouteEntry;
use serde::{Deserialize, Serialize};

/// Lower bounds and labels of the visibility histogram.
pub const VISIBILITY_BUCKETS: [(u32, &str); 5] = [
    (0, "0-499"),
    (500, "500-999"),
    (1000, "1000-1999"),
    (2000, "2000-2999"),
    (3000, "3000+"),
];

/// One bin of the visibility histogram.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct VisibilityBucket {
    pub label: String,
    pub lower_bound: u32,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PrefixCounts {
    pub total: usize,
    pub v4: usize,
    pub v6: usize,
}

/// Visibility statistics over the target's routes; all zero without routes.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct VisibilityStats {
    pub avg: u32,
    pub min: u32,
    pub max: u32,
}

/// A target route seen by fewer vantage points than the low-visibility threshold.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(tabled::Tabled))]
pub struct LowVisibilityPrefix {
    pub prefix: String,
    pub visibility: u32,
    pub family: AddressFamily,
    pub mask_len: u8,
}

/// The regional IXP of the queried ASN's country and who is present there.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RegionalMatch {
    pub ixp: RegionalIxp,
    pub target_present: bool,
    pub isp_present: bool,
}

impl RegionalMatch {
    pub fn both_present(&self) -> bool {
        self.target_present && self.isp_present
    }
}

/// Peering and visibility report for one ASN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeeringReport {
    pub asn: u32,
    pub target_asn: u32,
    /// name from the known ISP list
    pub isp_name: Option<String>,
    pub country: String,

    pub prefixes: PrefixCounts,
    pub visibility: VisibilityStats,
    pub low_visibility_threshold: f64,
    /// all routes below the threshold, including those beyond the listed ones
    pub low_visibility_count: usize,
    pub low_visibility: Vec<LowVisibilityPrefix>,
    pub histogram: Vec<VisibilityBucket>,

    pub shared_ixp_count: usize,
    pub shared_ixps: Vec<u32>,
    pub isp_ixp_count: usize,
    pub target_ixp_count: usize,
    pub isp_ixp_status: MembershipStatus,
    pub target_ixp_status: MembershipStatus,

    pub regional: Option<RegionalMatch>,
    pub score: ScoreBreakdown,

    pub route_table_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<PrefixCoverage>,
}

/// Everything a report is built from.
pub struct ReportInputs<'a> {
    pub routes: &'a [RouteEntry],
    pub target_ixps: &'a IxpMemberships,
    pub isp_ixps: &'a IxpMemberships,
    /// empty disables the coverage cross-check
    pub official_prefixes: &'a [String],
}

pub fn visibility_stats(routes: &[&RouteEntry]) -> VisibilityStats {
    if routes.is_empty() {
        return VisibilityStats::default();
    }
    let sum: u64 = routes.iter().map(|r| r.visibility as u64).sum();
    VisibilityStats {
        avg: (sum as f64 / routes.len() as f64).round() as u32,
        min: routes.iter().map(|r| r.visibility).min().unwrap_or(0),
        max: routes.iter().map(|r| r.visibility).max().unwrap_or(0),
    }
}

pub fn low_visibility_threshold(avg: u32, config: &ScoringConfig) -> f64 {
    (config.low_visibility_floor as f64).max(avg as f64 * config.low_visibility_ratio)
}

/// Routes below `threshold`, lowest first (ties by prefix).
pub fn low_visibility_routes<'a>(routes: &[&'a RouteEntry], threshold: f64) -> Vec<&'a RouteEntry> {
    let mut low: Vec<&RouteEntry> = routes
        .iter()
        .copied()
        .filter(|r| (r.visibility as f64) < threshold)
        .collect();
    low.sort_by(|a, b| {
        a.visibility
            .cmp(&b.visibility)
            .then_with(|| a.prefix.cmp(&b.prefix))
    });
    low
}

pub fn visibility_histogram(routes: &[&RouteEntry]) -> Vec<VisibilityBucket> {
    let mut buckets: Vec<VisibilityBucket> = VISIBILITY_BUCKETS
        .iter()
        .map(|(lower_bound, label)| VisibilityBucket {
            label: label.to_string(),
            lower_bound: *lower_bound,
            count: 0,
        })
        .collect();
    for route in routes {
        // bounds are ascending and the first is 0, so a bucket always matches
        if let Some(bucket) = buckets
            .iter_mut()
            .rev()
            .find(|b| route.visibility >= b.lower_bound)
        {
            bucket.count += 1;
        }
    }
    buckets
}

/// Build the report for `asn` against the target network `target_asn`.
pub fn build_report(
    asn: u32,
    target_asn: u32,
    inputs: &ReportInputs,
    reference: &ReferenceData,
    scoring: &ScoringConfig,
) -> PeeringReport {
    let target_routes: Vec<&RouteEntry> = inputs
        .routes
        .iter()
        .filter(|r| r.origin_asn == target_asn)
        .collect();

    let v6 = target_routes
        .iter()
        .filter(|r| AddressFamily::of_prefix_str(r.prefix.as_str()) == AddressFamily::V6)
        .count();
    let prefixes = PrefixCounts {
        total: target_routes.len(),
        v4: target_routes.len() - v6,
        v6,
    };

    let visibility = visibility_stats(&target_routes);
    let threshold = low_visibility_threshold(visibility.avg, scoring);
    let low = low_visibility_routes(&target_routes, threshold);
    let low_visibility_count = low.len();
    let low_visibility = low
        .into_iter()
        .take(scoring.low_visibility_limit)
        .map(|r| LowVisibilityPrefix {
            prefix: r.prefix.clone(),
            visibility: r.visibility,
            family: AddressFamily::of_prefix_str(r.prefix.as_str()),
            mask_len: mask_len(r.prefix.as_str()),
        })
        .collect();

    let shared_ixps: Vec<u32> = inputs
        .isp_ixps
        .shared_with(inputs.target_ixps)
        .into_iter()
        .collect();

    let isp_name = reference.isp(asn).map(|isp| isp.name.clone());
    let country = reference.country_of(asn).to_string();
    let regional = reference
        .regional_ixp_for(country.as_str())
        .map(|ixp| RegionalMatch {
            ixp: ixp.clone(),
            target_present: inputs.target_ixps.ixps.contains(&ixp.id),
            isp_present: inputs.isp_ixps.ixps.contains(&ixp.id),
        });

    let score = compute_score(
        &ScoreInputs {
            total_routes: prefixes.total,
            low_visibility_routes: low_visibility_count,
            shared_ixps: shared_ixps.len(),
            regional_peering: regional.as_ref().is_some_and(|r| r.both_present()),
        },
        scoring,
    );

    let coverage = match inputs.official_prefixes.is_empty() {
        true => None,
        false => Some(check_coverage(inputs.official_prefixes, &target_routes)),
    };

    PeeringReport {
        asn,
        target_asn,
        isp_name,
        country,
        prefixes,
        visibility,
        low_visibility_threshold: threshold,
        low_visibility_count,
        low_visibility,
        histogram: visibility_histogram(&target_routes),
        shared_ixp_count: shared_ixps.len(),
        shared_ixps,
        isp_ixp_count: inputs.isp_ixps.len(),
        target_ixp_count: inputs.target_ixps.len(),
        isp_ixp_status: inputs.isp_ixps.status,
        target_ixp_status: inputs.target_ixps.status,
        regional,
        score,
        route_table_size: inputs.routes.len(),
        coverage,
    }
}
