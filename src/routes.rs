//! Global routing table snapshot: parsing, fetching and the in-process table cache.
use crate::cache::Clock;
use crate::PeerLensError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Longest upstream body excerpt carried in an error.
const BODY_EXCERPT_LEN: usize = 200;

/// One row of the global routing table.
///
/// - [prefix][RouteEntry::prefix]: announced CIDR, e.g. `104.16.0.0/13`
/// - [origin_asn][RouteEntry::origin_asn]: origin AS of the announcement
/// - [visibility][RouteEntry::visibility]: number of vantage points that see this route
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RouteEntry {
    #[serde(rename = "CIDR", alias = "prefix", alias = "cidr")]
    pub prefix: String,
    #[serde(rename = "ASN", alias = "asn", alias = "origin_asn")]
    pub origin_asn: u32,
    #[serde(rename = "Hits", alias = "hits", alias = "visibility")]
    pub visibility: u32,
}

/// Parse a newline-delimited JSON table.
///
/// Lines that do not decode into a [RouteEntry] are skipped.
pub fn parse_route_table(body: &str) -> Vec<RouteEntry> {
    let mut skipped = 0usize;
    let entries: Vec<RouteEntry> = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<RouteEntry>(line) {
            Ok(entry) => Some(entry),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .collect();
    if skipped > 0 {
        debug!("skipped {} malformed route table lines", skipped);
    }
    entries
}

pub(crate) fn body_excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_LEN).collect()
}

/// Delay before retry number `attempt + 1`: the initial backoff doubled per attempt.
pub(crate) fn backoff_delay_ms(initial_backoff_ms: u64, attempt: u32) -> u64 {
    initial_backoff_ms.saturating_mul(2u64.saturating_pow(attempt))
}

/// Fetch and parse the routing table once, retrying only transport-level failures.
pub async fn fetch_route_table(
    client: &reqwest::Client,
    url: &str,
    max_retries: u32,
    initial_backoff_ms: u64,
) -> Result<Vec<RouteEntry>, PeerLensError> {
    let max_retries = max_retries.max(1);
    let mut last_error: Option<PeerLensError> = None;

    for attempt in 0..max_retries {
        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(PeerLensError::UpstreamUnavailable {
                        status: status.as_u16(),
                        body: body_excerpt(body.as_str()),
                    });
                }
                match response.text().await {
                    Ok(body) => return Ok(parse_route_table(body.as_str())),
                    Err(e) => last_error = Some(e.into()),
                }
            }
            Err(e) => last_error = Some(e.into()),
        }

        // If not the last attempt, wait with exponential backoff
        if attempt < max_retries - 1 {
            let backoff_ms = backoff_delay_ms(initial_backoff_ms, attempt);
            warn!(
                "route table fetch failed for {} (attempt {}/{}), retrying in {}ms: {:?}",
                url,
                attempt + 1,
                max_retries,
                backoff_ms,
                last_error
            );
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
    }

    Err(last_error.unwrap_or_else(|| {
        PeerLensError::UpstreamUnavailable {
            status: 0,
            body: format!("no response after {} attempts", max_retries),
        }
    }))
}

struct CachedTable {
    entries: Arc<Vec<RouteEntry>>,
    fetched_at: DateTime<Utc>,
}

/// Routing table source with a process-local, TTL-bound cache.
///
/// The table is too large for typical key-value entry limits, so it is never
/// written to the shared store. Refreshes replace the whole table at once.
#[derive(Clone)]
pub struct RouteTableSource {
    client: reqwest::Client,
    url: String,
    ttl: Duration,
    max_retries: u32,
    backoff_ms: u64,
    clock: Arc<dyn Clock>,
    table: Arc<RwLock<Option<CachedTable>>>,
    refresh_lock: Arc<Mutex<()>>,
}

impl RouteTableSource {
    pub fn new(client: reqwest::Client, url: &str, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            url: url.to_string(),
            ttl,
            max_retries: 1,
            backoff_ms: 0,
            clock,
            table: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn retries(self, max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_ms,
            ..self
        }
    }

    async fn cached(&self) -> Option<Arc<Vec<RouteEntry>>> {
        let table = self.table.read().await;
        let cached = table.as_ref()?;
        let age = self.clock.now().signed_duration_since(cached.fetched_at);
        match age.num_milliseconds() < self.ttl.as_millis() as i64 {
            true => Some(cached.entries.clone()),
            false => None,
        }
    }

    /// Get the current routing table, fetching it when the cached copy is missing or expired.
    pub async fn get_route_table(&self) -> Result<Arc<Vec<RouteEntry>>, PeerLensError> {
        if let Some(entries) = self.cached().await {
            debug!("route table cache hit ({} entries)", entries.len());
            return Ok(entries);
        }

        // one refresh at a time; later callers pick up the table fetched by the first
        let _guard = self.refresh_lock.lock().await;
        if let Some(entries) = self.cached().await {
            return Ok(entries);
        }

        info!("fetching route table from {}", self.url);
        let entries = Arc::new(
            fetch_route_table(&self.client, &self.url, self.max_retries, self.backoff_ms).await?,
        );
        info!("fetched route table with {} entries", entries.len());

        let mut table = self.table.write().await;
        *table = Some(CachedTable {
            entries: entries.clone(),
            fetched_at: self.clock.now(),
        });
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_route_table() {
        let body = r#"{"CIDR":"104.16.0.0/13","ASN":13335,"Hits":2500}
{"CIDR":"2606:4700::/32","ASN":13335,"Hits":1800}

not json at all
{"CIDR":"1.0.0.0/24","ASN":"oops","Hits":12}
{"CIDR":"8.8.8.0/24","ASN":15169,"Hits":3100}
{"prefix":"1.1.1.0/24","origin_asn":13335,"visibility":4000}
{"CIDR":"9.9.9.0/24","ASN":19281}
"#;
        let entries = parse_route_table(body);
        assert_eq!(entries.len(), 4);
        assert_eq!(
            entries[0],
            RouteEntry {
                prefix: "104.16.0.0/13".to_string(),
                origin_asn: 13335,
                visibility: 2500,
            }
        );
        assert_eq!(entries[3].prefix, "1.1.1.0/24");
        assert_eq!(entries[3].visibility, 4000);
    }

    #[test]
    fn test_parse_negative_visibility_is_rejected() {
        let body = r#"{"CIDR":"104.16.0.0/13","ASN":13335,"Hits":-5}"#;
        assert!(parse_route_table(body).is_empty());
    }

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay_ms(500, 0), 500);
        assert_eq!(backoff_delay_ms(500, 1), 1000);
        assert_eq!(backoff_delay_ms(500, 3), 4000);
        assert_eq!(backoff_delay_ms(0, 10), 0);
        assert_eq!(backoff_delay_ms(500, 64), u64::MAX);
        assert_eq!(backoff_delay_ms(500, u32::MAX), u64::MAX);
    }

    #[test]
    fn test_body_excerpt() {
        let long = "x".repeat(1000);
        assert_eq!(body_excerpt(long.as_str()).len(), 200);
        assert_eq!(body_excerpt("short"), "short");
    }
}
