// Buffered-reader scaffolding: plain byte-at-a-time reads into a growable
// buffer, scanned for the head terminator. Kept small on purpose rather
// than reaching for a full buffered-line abstraction.

use tokio::io::{AsyncRead, AsyncReadExt};

// Reads until the \r\n\r\n head terminator, EOF, or `max` bytes buffered.
// Bytes past the terminator (e.g. a pipelining client) are dropped; this
// proxy handles one request per connection.
pub async fn read_request_head<R>(reader: &mut R, max: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(512);
    let mut tmp = [0u8; 256];
    loop {
        if let Some(end) = find_head_end(&buf) {
            buf.truncate(end);
            return Ok(buf);
        }
        if buf.len() >= max {
            return Ok(buf);
        }
        let n = reader.read(&mut tmp).await?;
        if n == 0 {
            return Ok(buf);
        }
        let take = n.min(max - buf.len());
        buf.extend_from_slice(&tmp[..take]);
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
        .or_else(|| buf.windows(2).position(|w| w == b"\n\n").map(|i| i + 2))
}

// Reads exactly buf.len() bytes, or returns early with n < buf.len() on EOF.
pub async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut total = 0;
    while total < buf.len() {
        let n = reader.read(&mut buf[total..]).await?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

