//! Integration tests for the RPC-backed chain reader

use std::{
    net::TcpListener,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use alloy_rpc_types_eth::Filter;
use extractor::{ChainReader, RpcChainClient};
use mockito::{Matcher, Server, ServerGuard};
use primitives::{retries::RetryPolicy, validator::ConsensusAddress};
use serde_json::json;
use url::Url;

fn retry() -> RetryPolicy {
    RetryPolicy { max_retries: 1, initial_delay: Duration::from_millis(1), timeout: Duration::from_secs(5) }
}

fn client(el: &ServerGuard, cl: &ServerGuard) -> RpcChainClient {
    RpcChainClient::new(
        Url::parse(&el.url()).unwrap(),
        Url::parse(&cl.url()).unwrap(),
        retry(),
    )
}

#[tokio::test]
async fn reads_head_from_execution_rpc() {
    let mut el = Server::new_async().await;
    let cl = Server::new_async().await;
    let mock = el
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_blockNumber" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":0,"result":"0x2a"}"#)
        .create_async()
        .await;

    let head = client(&el, &cl).latest_block_number().await.unwrap();
    assert_eq!(head, 42);
    mock.assert_async().await;
}

#[tokio::test]
async fn reads_logs_from_execution_rpc() {
    let mut el = Server::new_async().await;
    let cl = Server::new_async().await;
    let mock = el
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_getLogs" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":0,"result":[]}"#)
        .create_async()
        .await;

    let filter = Filter::new().from_block(1u64).to_block(10u64);
    let logs = client(&el, &cl).get_logs(&filter).await.unwrap();
    assert!(logs.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn reads_proposer_from_consensus_rpc() {
    let el = Server::new_async().await;
    let mut cl = Server::new_async().await;
    let mock = cl
        .mock("GET", "/block")
        .match_query(Matcher::UrlEncoded("height".into(), "7".into()))
        .with_status(200)
        .with_body(
            r#"{"result":{"block":{"header":{"proposer_address":"0303030303030303030303030303030303030303"}}}}"#,
        )
        .create_async()
        .await;

    let proposer = client(&el, &cl).block_proposer(7).await.unwrap();
    assert_eq!(proposer, ConsensusAddress::repeat_byte(3));
    mock.assert_async().await;
}

/// Accept every connection and close it before answering.
fn dropping_listener() -> (Url, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);
    thread::spawn(move || {
        for stream in listener.incoming() {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });
    (url, connections)
}

#[tokio::test]
async fn dropped_connections_are_retried() {
    let (el_url, connections) = dropping_listener();
    let cl = Server::new_async().await;
    let policy = RetryPolicy {
        max_retries: 3,
        initial_delay: Duration::from_millis(1),
        timeout: Duration::from_secs(5),
    };
    let client = RpcChainClient::new(el_url, Url::parse(&cl.url()).unwrap(), policy);

    let err = client.latest_block_number().await.unwrap_err();
    assert!(err.is_transient(), "{err}");
    assert_eq!(connections.load(Ordering::SeqCst), 4);
}
