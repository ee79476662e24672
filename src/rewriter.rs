// Builds the upstream HTTP/1.0 request from a parsed inbound request.

use crate::parser::ParsedRequest;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:3.10.0) Gecko/20210731 Firefox/63.0.1";

// Always downgrades to HTTP/1.0, always closes after one response, and
// always uses this proxy's fixed User-Agent.
pub fn rewrite(req: &ParsedRequest) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);

    buf.extend_from_slice(b"GET ");
    buf.extend_from_slice(req.path.as_bytes());
    buf.extend_from_slice(b" HTTP/1.0\r\n");

    match req.header("Host") {
        Some(host) => {
            buf.extend_from_slice(b"Host: ");
            buf.extend_from_slice(host.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        None => {
            buf.extend_from_slice(format!("Host: {}:{}\r\n", req.host, req.port).as_bytes());
        }
    }

    buf.extend_from_slice(format!("User-Agent: {}\r\n", USER_AGENT).as_bytes());
    buf.extend_from_slice(b"Connection: close\r\n");
    buf.extend_from_slice(b"Proxy-Connection: close\r\n");

    for (name, value) in &req.headers {
        if name.eq_ignore_ascii_case("host")
            || name.eq_ignore_ascii_case("user-agent")
            || name.eq_ignore_ascii_case("connection")
            || name.eq_ignore_ascii_case("proxy-connection")
        {
            continue;
        }
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    buf.extend_from_slice(b"\r\n");
    buf
}

