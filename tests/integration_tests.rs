//! End-to-end connection pipeline tests, driven through a real bound
//! listener and a fake origin server.

use std::net::SocketAddr;
use std::sync::Arc;

use relaycache::cache::Cache;
use relaycache::error::ProxyError;
use relaycache::pipeline::{handle_connection, run};
use relaycache::response;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn spawn_echo_origin(body: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = sock.read(&mut buf).await; // drain the request
        let response = format!("HTTP/1.0 200 OK\r\nContent-Length: {}\r\n\r\n", body.len());
        sock.write_all(response.as_bytes()).await.unwrap();
        sock.write_all(body).await.unwrap();
        sock.shutdown().await.unwrap();
    });
    addr
}

async fn connect_pair() -> (TcpStream, TcpStream, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client_side = TcpStream::connect(addr).await.unwrap();
    let (server_side, peer) = listener.accept().await.unwrap();
    (client_side, server_side, peer)
}

#[tokio::test]
async fn rejects_non_get_with_501_and_opens_no_origin() {
    let cache = Arc::new(Cache::new());
    let (mut client_side, mut server_side, peer) = connect_pair().await;

    client_side.write_all(b"POST /x HTTP/1.0\r\n\r\n").await.unwrap();

    let result = run(&mut server_side, &cache, peer).await;
    assert!(matches!(result, Err(ProxyError::UnsupportedMethod(_))));

    let resp = response::error_response(501, "Not Implemented", "Server does not support this method");
    server_side.write_all(&resp).await.ok();
    server_side.shutdown().await.ok();

    let mut buf = Vec::new();
    client_side.read_to_end(&mut buf).await.ok();
    let text = String::from_utf8_lossy(&buf);
    assert!(text.starts_with("HTTP/1.0 501 Not Implemented"));
}

#[tokio::test]
async fn serves_miss_then_hit_without_second_origin_request() {
    let origin_addr = spawn_echo_origin(b"hello").await;
    let cache = Arc::new(Cache::new());

    let (mut client_side, mut server_side, peer) = connect_pair().await;
    let request = format!(
        "GET http://{}:{}/x HTTP/1.1\r\n\r\n",
        origin_addr.ip(),
        origin_addr.port()
    );
    client_side.write_all(request.as_bytes()).await.unwrap();
    run(&mut server_side, &cache, peer).await.unwrap();
    server_side.shutdown().await.ok();
    drop(server_side);

    let mut buf = Vec::new();
    client_side.read_to_end(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf).ends_with("hello"));

    let uri = format!("http://{}:{}/x", origin_addr.ip(), origin_addr.port());
    assert_eq!(cache.total_bytes(), 5);

    let mut sink = Vec::new();
    assert!(cache.lookup_and_serve(&uri, &mut sink).await);
    assert_eq!(sink, b"hello");
}

#[tokio::test]
async fn large_response_is_relayed_but_not_cached() {
    let body: &'static [u8] =
        Box::leak(vec![b'z'; relaycache::cache::MAX_OBJECT_SIZE + 100].into_boxed_slice());
    let origin_addr = spawn_echo_origin(body).await;
    let cache = Arc::new(Cache::new());

    let (mut client_side, mut server_side, peer) = connect_pair().await;
    let request = format!(
        "GET http://{}:{}/big HTTP/1.1\r\n\r\n",
        origin_addr.ip(),
        origin_addr.port()
    );
    client_side.write_all(request.as_bytes()).await.unwrap();
    run(&mut server_side, &cache, peer).await.unwrap();
    server_side.shutdown().await.ok();
    drop(server_side);

    let mut buf = Vec::new();
    client_side.read_to_end(&mut buf).await.unwrap();
    assert!(buf.ends_with(body));
    assert_eq!(cache.total_bytes(), 0);
}

/// Drives a whole accept-and-serve cycle through `handle_connection`, the
/// same entry point `main`'s accept loop spawns for every connection,
/// against a listener bound on an ephemeral port.
#[tokio::test]
async fn handle_connection_serves_a_real_client_socket_end_to_end() {
    let origin_addr = spawn_echo_origin(b"full stack").await;
    let proxy_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy_listener.local_addr().unwrap();
    let cache = Arc::new(Cache::new());

    let accept_cache = Arc::clone(&cache);
    tokio::spawn(async move {
        let (stream, peer) = proxy_listener.accept().await.unwrap();
        handle_connection(stream, accept_cache, peer).await;
    });

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let request = format!(
        "GET http://{}:{}/y HTTP/1.1\r\n\r\n",
        origin_addr.ip(),
        origin_addr.port()
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    client.read_to_end(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf).ends_with("full stack"));
    assert_eq!(cache.total_bytes(), "full stack".len());
}

#[tokio::test]
async fn empty_request_closes_quietly_without_touching_cache() {
    let cache = Arc::new(Cache::new());
    let (client_side, mut server_side, peer) = connect_pair().await;
    drop(client_side); // client disconnects before sending anything

    let result = run(&mut server_side, &cache, peer).await;
    assert!(result.is_ok());
    assert_eq!(cache.len(), 0);
}
