//! IXP membership lookups against a PeeringDB-style `netixlan` endpoint.
//!
//! Membership lookups never fail outward. Every upstream problem degrades to the
//! last-known-good set for the ASN, or to an empty set, and the result carries a
//! [MembershipStatus] saying which of those happened.
use crate::cache::MembershipCache;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use tracing::{debug, info, warn};

/// Where a membership set came from.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    /// fetched from the registry during this lookup
    Fresh,
    /// served from an unexpired cache entry
    Cached,
    /// registry unavailable, served from an expired cache entry
    Stale,
    /// registry unavailable and nothing cached; the set is empty
    Unavailable,
}

impl MembershipStatus {
    /// Whether the registry or a cache actually answered for this ASN.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, MembershipStatus::Unavailable)
    }
}

/// Why an upstream answer was treated as unavailable.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DegradeReason {
    Transport(String),
    HttpStatus(u16),
    ErrorMarker(String),
    Malformed(String),
}

impl Display for DegradeReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradeReason::Transport(e) => write!(f, "transport error: {}", e),
            DegradeReason::HttpStatus(s) => write!(f, "HTTP status {}", s),
            DegradeReason::ErrorMarker(e) => write!(f, "registry error: {}", e),
            DegradeReason::Malformed(e) => write!(f, "malformed payload: {}", e),
        }
    }
}

/// IXP membership set of one ASN.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct IxpMemberships {
    pub asn: u32,
    pub ixps: BTreeSet<u32>,
    pub status: MembershipStatus,
}

impl IxpMemberships {
    pub fn len(&self) -> usize {
        self.ixps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ixps.is_empty()
    }

    /// IXP ids present in both sets.
    pub fn shared_with(&self, other: &IxpMemberships) -> BTreeSet<u32> {
        self.ixps.intersection(&other.ixps).copied().collect()
    }
}

#[derive(Debug, Deserialize)]
struct NetIxLanResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    meta: Option<NetIxLanMeta>,
}

#[derive(Debug, Deserialize)]
struct NetIxLanMeta {
    #[serde(default)]
    error: Option<String>,
}

/// Extract the set of IXP ids from a `netixlan` response body.
///
/// Entries without a numeric `ix_id` are ignored.
pub fn parse_memberships(body: &str) -> Result<BTreeSet<u32>, DegradeReason> {
    let response: NetIxLanResponse =
        serde_json::from_str(body).map_err(|e| DegradeReason::Malformed(e.to_string()))?;

    if let Some(error) = response.meta.and_then(|m| m.error) {
        if !error.trim().is_empty() {
            return Err(DegradeReason::ErrorMarker(error));
        }
    }

    let data = match response.data {
        Some(serde_json::Value::Array(data)) => data,
        Some(_) => return Err(DegradeReason::Malformed("`data` is not an array".to_string())),
        None => return Err(DegradeReason::Malformed("missing `data`".to_string())),
    };

    Ok(data
        .iter()
        .filter_map(|entry| entry.get("ix_id")?.as_u64())
        .filter_map(|id| u32::try_from(id).ok())
        .collect())
}

/// Per-ASN IXP membership source with a cache-first, fallback-on-failure policy.
#[derive(Clone)]
pub struct IxpMembershipSource {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    cache: MembershipCache,
}

impl IxpMembershipSource {
    pub fn new(client: reqwest::Client, url: &str, cache: MembershipCache) -> Self {
        Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            api_key: None,
            cache,
        }
    }

    pub fn api_key(self, api_key: Option<String>) -> Self {
        Self { api_key, ..self }
    }

    async fn fetch(&self, asn: u32) -> Result<BTreeSet<u32>, DegradeReason> {
        let mut request = self
            .client
            .get(self.url.as_str())
            .query(&[("asn", asn.to_string())]);
        if let Some(key) = &self.api_key {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Api-Key {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| DegradeReason::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DegradeReason::HttpStatus(status.as_u16()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| DegradeReason::Transport(e.to_string()))?;
        parse_memberships(body.as_str())
    }

    /// Get the IXP memberships of `asn`.
    ///
    /// Only non-empty fresh results are written to the cache, so a transient empty
    /// answer cannot hide real memberships for a whole TTL window.
    pub async fn get_memberships(&self, asn: u32) -> IxpMemberships {
        let cached = self.cache.get_entry(asn).await;
        if let Some(entry) = &cached {
            if self.cache.is_fresh(entry) {
                debug!("ixp membership cache hit for AS{}", asn);
                return IxpMemberships {
                    asn,
                    ixps: entry.value.clone(),
                    status: MembershipStatus::Cached,
                };
            }
        }

        info!("fetching ixp memberships for AS{}", asn);
        match self.fetch(asn).await {
            Ok(ixps) => {
                if ixps.is_empty() {
                    debug!("AS{} has no ixp memberships, not caching", asn);
                } else {
                    self.cache.put(asn, ixps.clone()).await;
                }
                IxpMemberships {
                    asn,
                    ixps,
                    status: MembershipStatus::Fresh,
                }
            }
            Err(reason) => match cached {
                Some(entry) => {
                    warn!(
                        "ixp registry unavailable for AS{} ({}), serving last known memberships from {}",
                        asn, reason, entry.fetched_at
                    );
                    IxpMemberships {
                        asn,
                        ixps: entry.value,
                        status: MembershipStatus::Stale,
                    }
                }
                None => {
                    warn!(
                        "ixp registry unavailable for AS{} ({}), no cached memberships",
                        asn, reason
                    );
                    IxpMemberships {
                        asn,
                        ixps: BTreeSet::new(),
                        status: MembershipStatus::Unavailable,
                    }
                }
            },
        }
    }
}
