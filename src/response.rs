// Error responses written back to the client. The HTML shell is fixed; the
// only per-response cost is formatting the status line, the substituted
// message, and Content-Length.

const BODY_TEMPLATE_OPEN: &str =
    "<!DOCTYPE html><html><head><title>Server Error</title></head><body bgcolor=\"ffffff\"><h1>";
const BODY_TEMPLATE_MID: &str = "</h1><p>";
const BODY_TEMPLATE_CLOSE: &str = "</p></body></html>";

pub fn error_response(code: u16, short: &str, long: &str) -> Vec<u8> {
    let body = format!("{BODY_TEMPLATE_OPEN}{code}: {short}{BODY_TEMPLATE_MID}{long}{BODY_TEMPLATE_CLOSE}");
    let headers = format!(
        "HTTP/1.0 {code} {short}\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );

    let mut response = Vec::with_capacity(headers.len() + body.len());
    response.extend_from_slice(headers.as_bytes());
    response.extend_from_slice(body.as_bytes());
    response
}

