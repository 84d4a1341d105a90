//! Upgrade handshake — reads the inbound request, computes the accept key.

use std::io::{BufRead, BufReader, Read};
use std::net::TcpStream;

use base64::Engine as _;
use sha1::{Digest, Sha1};

use crate::error::EngineError;

const MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const KEY_HEADER: &str = "sec-websocket-key";

/// Read the request header block from `stream` and return the value of the
/// key header.
pub fn read_request_key<R: Read>(stream: R) -> Result<String, EngineError> {
    let mut reader = BufReader::new(stream);
    let mut key = None;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).map_err(|e| EngineError::ClientHandshakeFailure {
            reason: format!("failed to read request line: {e}"),
        })?;
        if n == 0 {
            return Err(EngineError::ClientHandshakeFailure {
                reason: "connection closed before headers completed".into(),
            });
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.trim().eq_ignore_ascii_case(KEY_HEADER) {
                key = Some(value.trim().to_string());
            }
        }
    }

    key.ok_or_else(|| EngineError::ClientHandshakeFailure {
        reason: format!("missing {KEY_HEADER} header"),
    })
}

/// Compute the accept key: base64(SHA-1(key ++ magic GUID)).
pub fn accept_key(request_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(request_key.as_bytes());
    hasher.update(MAGIC.as_bytes());
    let digest = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Write the minimal `101 Switching Protocols` response.
pub fn write_upgrade_response(stream: &mut TcpStream, accept: &str) -> std::io::Result<()> {
    use std::io::Write;
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    );
    stream.write_all(response.as_bytes())
}
