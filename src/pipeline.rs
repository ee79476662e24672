// Per-connection state machine:
// READ_REQ -> LOOKUP -> (HIT->DONE) | (MISS->CONNECT->WRITE_UP->RELAY->ADMIT?->DONE)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::{Cache, MAX_OBJECT_SIZE};
use crate::error::ProxyError;
use crate::ioutil;
use crate::parser;
use crate::response;
use crate::rewriter;

// Client request-line/header read must complete within this window, or
// the connection is abandoned as if it had sent nothing.
const IDLE_READ_TIMEOUT: Duration = Duration::from_secs(30);
// Opening the origin connection must complete within this window.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
// Upper bound on a request head, guarding against an unbounded header
// stream from a misbehaving client.
const MAX_REQUEST_HEAD: usize = 8192;

// Drives one client connection to completion. Every error is recovered
// here: a failing connection never affects another.
pub async fn handle_connection(mut client: TcpStream, cache: Arc<Cache>, peer: SocketAddr) {
    match run(&mut client, &cache, peer).await {
        Ok(()) => {}
        Err(err) => {
            if let Some((code, short, long)) = err.client_status() {
                let resp = response::error_response(code, short, long);
                if let Err(write_err) = client.write_all(&resp).await {
                    warn!(%peer, error = %write_err, "failed writing error response to client");
                }
            }
            log_pipeline_error(peer, &err);
        }
    }
}

fn log_pipeline_error(peer: SocketAddr, err: &ProxyError) {
    match err {
        ProxyError::MalformedRequest | ProxyError::UnsupportedMethod(_) => {
            debug!(%peer, error = %err, "rejected request");
        }
        ProxyError::UpstreamUnreachable(_)
        | ProxyError::UpstreamWriteFailed(_)
        | ProxyError::UpstreamReadFailed(_) => {
            warn!(%peer, error = %err, "upstream failure");
        }
        ProxyError::ClientWriteFailed(_) => {
            debug!(%peer, error = %err, "client disconnected");
        }
    }
}

pub async fn run(client: &mut TcpStream, cache: &Arc<Cache>, peer: SocketAddr) -> Result<(), ProxyError> {
    let head = timeout(IDLE_READ_TIMEOUT, ioutil::read_request_head(client, MAX_REQUEST_HEAD))
        .await
        .map_err(|_| ProxyError::MalformedRequest)?
        .map_err(|_| ProxyError::MalformedRequest)?;

    if head.is_empty() {
        // Client closed without sending anything; nothing to answer.
        return Ok(());
    }

    let req = parser::parse(&head)?;
    debug!(%peer, uri = %req.uri, "parsed request");

    if cache.lookup_and_serve(&req.uri, client).await {
        debug!(%peer, uri = %req.uri, "cache hit");
        return Ok(());
    }
    debug!(%peer, uri = %req.uri, "cache miss");

    let upstream_request = rewriter::rewrite(&req);

    let mut origin = timeout(CONNECT_TIMEOUT, TcpStream::connect((req.host.as_str(), req.port)))
        .await
        .map_err(|_| {
            ProxyError::UpstreamUnreachable(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connect timed out",
            ))
        })?
        .map_err(ProxyError::UpstreamUnreachable)?;

    origin
        .write_all(&upstream_request)
        .await
        .map_err(ProxyError::UpstreamWriteFailed)?;

    relay(&mut origin, client, &req.uri, cache, peer).await
}

// RELAY + ADMIT?: streams the origin's response back to the client in
// order, accumulating it for cache admission while it stays within
// MAX_OBJECT_SIZE.
async fn relay(
    origin: &mut TcpStream,
    client: &mut TcpStream,
    uri: &str,
    cache: &Arc<Cache>,
    peer: SocketAddr,
) -> Result<(), ProxyError> {
    let mut relay_buf = vec![0u8; MAX_OBJECT_SIZE];
    let mut accumulator: Vec<u8> = Vec::new();
    let mut cacheable = true;
    let mut total: usize = 0;

    loop {
        let n = origin
            .read(&mut relay_buf)
            .await
            .map_err(ProxyError::UpstreamReadFailed)?;
        if n == 0 {
            break;
        }

        client
            .write_all(&relay_buf[..n])
            .await
            .map_err(ProxyError::ClientWriteFailed)?;

        total += n;
        if cacheable {
            if total > MAX_OBJECT_SIZE {
                cacheable = false;
                accumulator.clear();
            } else {
                accumulator.extend_from_slice(&relay_buf[..n]);
            }
        }
    }

    debug!(%peer, uri, bytes = total, cacheable, "relay complete");

    if cacheable && total > 0 && total <= MAX_OBJECT_SIZE {
        if cache.admit(uri, &accumulator) {
            debug!(%peer, uri, size = total, "admitted to cache");
        } else {
            debug!(%peer, uri, "admission rejected (duplicate key)");
        }
    }

    if total == 0 {
        warn!(%peer, uri, "origin closed without sending a response");
    } else {
        info!(%peer, uri, bytes = total, "request served from origin");
    }

    Ok(())
}
