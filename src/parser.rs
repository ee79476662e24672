// Wraps httparse's request-line/header tokenizer and exposes exactly the
// fields the pipeline needs: method, host, port, path, and uri (the
// absolute-URI cache key).

use crate::error::ProxyError;

const MAX_HEADERS: usize = 64;

#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    // The request-target exactly as the client sent it; this is the cache
    // lookup key, so it must match byte-for-byte across requests.
    pub uri: String,
    pub headers: Vec<(String, String)>,
}

impl ParsedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// Parses one complete request head (request line + headers, up to the
// blank line) out of `buf`. The caller must have already read up to the
// terminating \r\n\r\n.
pub fn parse(buf: &[u8]) -> Result<ParsedRequest, ProxyError> {
    let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut header_storage);

    let status = req.parse(buf).map_err(|_| ProxyError::MalformedRequest)?;
    if status.is_partial() {
        return Err(ProxyError::MalformedRequest);
    }

    let method = req.method.ok_or(ProxyError::MalformedRequest)?.to_string();
    let target = req.path.ok_or(ProxyError::MalformedRequest)?;
    let version = req.version.ok_or(ProxyError::MalformedRequest)?;
    // httparse encodes "HTTP/1.x" as the trailing digit only.
    if version != 0 && version != 1 {
        return Err(ProxyError::MalformedRequest);
    }

    if method != "GET" {
        return Err(ProxyError::UnsupportedMethod(method));
    }

    let headers: Vec<(String, String)> = req
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).trim().to_string(),
            )
        })
        .collect();

    let (host, port, path) = split_target(target, &headers)?;

    Ok(ParsedRequest {
        method,
        host,
        port,
        path,
        uri: target.to_string(),
        headers,
    })
}

// Splits an absolute-form request-target (http://host[:port]/path) into
// host, port, and path. Falls back to the Host header plus an origin-form
// path when the target is already in origin form.
fn split_target(
    target: &str,
    headers: &[(String, String)],
) -> Result<(String, u16, String), ProxyError> {
    if let Some(rest) = strip_scheme(target) {
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        if authority.is_empty() {
            return Err(ProxyError::MalformedRequest);
        }
        let (host, port) = split_authority(authority)?;
        let path = if path.is_empty() { "/" } else { path };
        return Ok((host, port, path.to_string()));
    }

    // Origin-form target: host/port must come from the Host header.
    if !target.starts_with('/') {
        return Err(ProxyError::MalformedRequest);
    }
    let host_header = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("host"))
        .map(|(_, v)| v.as_str())
        .ok_or(ProxyError::MalformedRequest)?;
    let (host, port) = split_authority(host_header)?;
    Ok((host, port, target.to_string()))
}

fn strip_scheme(target: &str) -> Option<&str> {
    target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("HTTP://"))
}

fn split_authority(authority: &str) -> Result<(String, u16), ProxyError> {
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port: u16 = port.parse().map_err(|_| ProxyError::MalformedRequest)?;
            Ok((host.to_string(), port))
        }
        _ => {
            if authority.is_empty() {
                Err(ProxyError::MalformedRequest)
            } else {
                Ok((authority.to_string(), 80))
            }
        }
    }
}

