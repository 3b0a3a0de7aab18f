#![allow(dead_code)]

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use peerlens::PeerLensConfig;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TARGET_ASN: u32 = 13335;

/// Three target routes with visibilities 100, 2500 and 4000, one unrelated route,
/// and two lines that do not parse.
pub const ROUTE_TABLE: &str = r#"{"CIDR":"104.16.0.0/13","ASN":13335,"Hits":100}
{"CIDR":"172.64.0.0/13","ASN":13335,"Hits":2500}
this is not json
{"CIDR":"2606:4700::/32","ASN":13335,"Hits":4000}
{"CIDR":"8.8.8.0/24","ASN":"not a number","Hits":3000}
{"CIDR":"193.0.0.0/21","ASN":3333,"Hits":3500}
"#;

#[derive(Clone)]
struct Reply {
    status: u16,
    body: String,
}

#[derive(Default)]
struct FakeState {
    table: Mutex<Option<Reply>>,
    table_delay_ms: AtomicUsize,
    ixp_delay_ms: AtomicUsize,
    ixps: Mutex<HashMap<u32, Reply>>,
    table_hits: AtomicUsize,
    ixp_hits: Mutex<HashMap<u32, usize>>,
}

/// Route table and IXP registry served from 127.0.0.1 on an ephemeral port.
#[derive(Clone)]
pub struct FakeUpstream {
    pub addr: SocketAddr,
    state: Arc<FakeState>,
}

pub fn netixlan_body(ixps: &[u32]) -> String {
    let data: Vec<serde_json::Value> = ixps
        .iter()
        .enumerate()
        .map(|(i, ix)| serde_json::json!({"id": i + 1, "ix_id": ix, "speed": 10000}))
        .collect();
    serde_json::json!({"data": data, "meta": {}}).to_string()
}

async fn table_handler(State(state): State<Arc<FakeState>>) -> (StatusCode, String) {
    state.table_hits.fetch_add(1, Ordering::SeqCst);
    let delay = state.table_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
    }
    let reply = state.table.lock().unwrap().clone();
    match reply {
        Some(reply) => (
            StatusCode::from_u16(reply.status).unwrap(),
            reply.body,
        ),
        None => (StatusCode::NOT_FOUND, "no table".to_string()),
    }
}

async fn netixlan_handler(
    State(state): State<Arc<FakeState>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let Some(asn) = params.get("asn").and_then(|s| s.parse::<u32>().ok()) else {
        return (StatusCode::BAD_REQUEST, "missing asn".to_string());
    };
    *state.ixp_hits.lock().unwrap().entry(asn).or_default() += 1;
    let delay = state.ixp_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
    }
    let reply = state.ixps.lock().unwrap().get(&asn).cloned();
    match reply {
        Some(reply) => (StatusCode::from_u16(reply.status).unwrap(), reply.body),
        None => (StatusCode::OK, netixlan_body(&[])),
    }
}

impl FakeUpstream {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::default());
        let app = Router::new()
            .route("/table.jsonl", get(table_handler))
            .route("/api/netixlan", get(netixlan_handler))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        FakeUpstream { addr, state }
    }

    /// Default setup: the route table above, the target at {26, 31, 59, 297}.
    pub async fn start_default() -> Self {
        let upstream = Self::start().await;
        upstream.set_table(200, ROUTE_TABLE);
        upstream.set_ixps(TARGET_ASN, &[26, 31, 59, 297]);
        upstream
    }

    pub fn set_table(&self, status: u16, body: &str) {
        *self.state.table.lock().unwrap() = Some(Reply {
            status,
            body: body.to_string(),
        });
    }

    pub fn set_table_delay(&self, delay: Duration) {
        self.state
            .table_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn set_ixp_delay(&self, delay: Duration) {
        self.state
            .ixp_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn set_ixps(&self, asn: u32, ixps: &[u32]) {
        self.set_ixp_reply(asn, 200, netixlan_body(ixps).as_str());
    }

    pub fn set_ixp_reply(&self, asn: u32, status: u16, body: &str) {
        self.state.ixps.lock().unwrap().insert(
            asn,
            Reply {
                status,
                body: body.to_string(),
            },
        );
    }

    pub fn table_hits(&self) -> usize {
        self.state.table_hits.load(Ordering::SeqCst)
    }

    pub fn ixp_hits(&self, asn: u32) -> usize {
        self.state
            .ixp_hits
            .lock()
            .unwrap()
            .get(&asn)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.table_hits() + self.state.ixp_hits.lock().unwrap().values().sum::<usize>()
    }

    pub fn config(&self) -> PeerLensConfig {
        let mut config = PeerLensConfig::default();
        config.target_asn = TARGET_ASN;
        config.upstream.route_table_url = format!("http://{}/table.jsonl", self.addr);
        config.upstream.ixp_url = format!("http://{}/api/netixlan", self.addr);
        config.upstream.timeout_secs = 5;
        config.upstream.max_retries = 1;
        config.upstream.backoff_ms = 0;
        config
    }
}
