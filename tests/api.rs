#![cfg(feature = "server")]

mod common;

use common::FakeUpstream;
use peerlens::api::create_router;
use peerlens::PeerLens;
use serde_json::Value;
use std::net::SocketAddr;

async fn start_api(lens: PeerLens) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(lens)).await.unwrap();
    });
    addr
}

async fn get(addr: SocketAddr, path: &str) -> (u16, Value) {
    let response = reqwest::get(format!("http://{}{}", addr, path))
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json::<Value>().await.unwrap())
}

#[tokio::test]
async fn test_peering_report_endpoint() {
    let upstream = FakeUpstream::start_default().await;
    upstream.set_ixps(1136, &[26, 59]);
    let addr = start_api(PeerLens::new(upstream.config()).unwrap()).await;

    let (status, body) = get(addr, "/api/peering?asn=1136").await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert!(body.get("error").is_none());
    assert_eq!(body["data"]["cached"], false);
    assert_eq!(body["data"]["route_table_size"], 4);
    assert_eq!(body["data"]["report"]["asn"], 1136);
    assert_eq!(body["data"]["report"]["shared_ixp_count"], 2);
    assert_eq!(body["data"]["report"]["score"]["total"], 87);
    assert_eq!(body["data"]["report"]["isp_ixp_status"], "fresh");
    assert!(body["data"]["elapsed_ms"].is_u64());

    let (status, body) = get(addr, "/api/peering?asn=AS1136").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["cached"], true);
}

#[tokio::test]
async fn test_invalid_asn_is_rejected_without_network() {
    let upstream = FakeUpstream::start_default().await;
    let addr = start_api(PeerLens::new(upstream.config()).unwrap()).await;

    for query in ["asn=abc", "asn=", "asn=-5", "asn=99999999999"] {
        let (status, body) = get(addr, format!("/api/peering?{}", query).as_str()).await;
        assert_eq!(status, 400, "{}", query);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("InvalidInput"));
    }
    assert_eq!(upstream.total_hits(), 0);
}

#[tokio::test]
async fn test_malformed_query_uses_envelope() {
    let upstream = FakeUpstream::start_default().await;
    let addr = start_api(PeerLens::new(upstream.config()).unwrap()).await;

    let (status, body) = get(addr, "/api/peering?asn=1136&asn=3320").await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
    assert!(body.get("data").is_none());
    assert!(body["error"].as_str().unwrap().contains("InvalidInput"));
    assert_eq!(upstream.total_hits(), 0);
}

#[tokio::test]
async fn test_isp_list_without_asn() {
    let upstream = FakeUpstream::start_default().await;
    let addr = start_api(PeerLens::new(upstream.config()).unwrap()).await;

    let (status, body) = get(addr, "/api/peering").await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    let isps = body["data"].as_array().unwrap();
    assert!(!isps.is_empty());
    assert!(isps
        .iter()
        .any(|isp| isp["asn"] == 3320 && isp["country"] == "DE"));
    assert_eq!(upstream.total_hits(), 0);
}

#[tokio::test]
async fn test_upstream_failure_is_bad_gateway() {
    let upstream = FakeUpstream::start_default().await;
    upstream.set_table(500, "internal error");
    let addr = start_api(PeerLens::new(upstream.config()).unwrap()).await;

    let (status, body) = get(addr, "/api/peering?asn=1136").await;
    assert_eq!(status, 502);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("500"));
}

#[tokio::test]
async fn test_rate_limited_registry_still_succeeds() {
    let upstream = FakeUpstream::start_default().await;
    upstream.set_ixp_reply(64512, 429, "slow down");
    let addr = start_api(PeerLens::new(upstream.config()).unwrap()).await;

    let (status, body) = get(addr, "/api/peering?asn=64512").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["report"]["shared_ixp_count"], 0);
    assert_eq!(body["data"]["report"]["isp_ixp_status"], "unavailable");
}

#[tokio::test]
async fn test_health() {
    let upstream = FakeUpstream::start().await;
    let addr = start_api(PeerLens::new(upstream.config()).unwrap()).await;

    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}
