// Copyright (c) 2026 Driftmesh
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! One fetch slot: an HTTP/1.0 GET for a bundle payload.
//!
//! The transfer walks four phases (connect, send request, receive headers,
//! receive body). Every await carries the idle budget, so the deadline
//! effectively resets on each successful byte transfer; a stalled peer closes
//! the slot. Any failure discards the partial temp file. No retry happens at
//! this layer; a future advertisement re-triggers the fetch.

use crate::core::store::{BundleStore, StoreError};
use crate::core::types::{BundleId, Manifest};
use std::net::SocketAddrV4;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

const HEADER_BUF_BYTES: usize = 1024;
const BODY_CHUNK_BYTES: usize = 8192;

/// Transfer phase, for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchPhase {
    /// TCP connect in flight.
    Connecting,
    /// Writing the request line.
    SendingRequest,
    /// Collecting response headers.
    RxHeaders,
    /// Receiving the payload body.
    RxFile,
}

/// Fetch errors. All of them close the slot.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("connect")]
    Connect,
    #[error("socket io")]
    Io,
    #[error("file io")]
    FileIo,
    #[error("idle timeout")]
    IdleTimeout,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("malformed response")]
    MalformedResponse,
    #[error("missing content length")]
    MissingContentLength,
    #[error("illegal content length")]
    IllegalLength,
    #[error("response headers too large")]
    HeadersOverflow,
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Completion report sent back to the orchestrator when a slot finishes.
#[derive(Debug)]
pub struct FetchDone {
    /// Bundle whose slot finished.
    pub id: BundleId,
    /// Transfer outcome.
    pub result: Result<(), FetchError>,
}

/// Find the end of an HTTP header block: two LFs in a row, ignoring CR and
/// NUL bytes. Returns the index of the terminating LF.
pub(crate) fn find_header_end(buf: &[u8]) -> Option<usize> {
    let mut lfcount = 0;
    for (i, b) in buf.iter().enumerate() {
        match b {
            b'\n' => {
                lfcount += 1;
                if lfcount == 2 {
                    return Some(i);
                }
            }
            b'\r' | 0 => {}
            _ => lfcount = 0,
        }
    }
    None
}

/// Parse an HTTP/1.0 response header block into its content length.
///
/// The status line must be `HTTP/1.0 200`; the block must carry a
/// case-sensitive `Content-length:` header with a non-negative value.
///
/// This does not allocate per header and is intended for tooling and fuzzing
/// as well as the fetch path.
pub fn parse_http_headers(block: &[u8]) -> Result<i64, FetchError> {
    let text = String::from_utf8_lossy(block);
    let mut lines = text.lines();
    let status = lines.next().ok_or(FetchError::MalformedResponse)?;
    let rest = status
        .strip_prefix("HTTP/1.0 ")
        .ok_or(FetchError::MalformedResponse)?;
    let code: u16 = rest
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or(FetchError::MalformedResponse)?;
    if code != 200 {
        return Err(FetchError::HttpStatus(code));
    }
    for line in lines {
        if let Some(v) = line.strip_prefix("Content-length: ") {
            let n: i64 = v.trim().parse().map_err(|_| FetchError::MalformedResponse)?;
            if n < 0 {
                return Err(FetchError::IllegalLength);
            }
            return Ok(n);
        }
    }
    Err(FetchError::MissingContentLength)
}

/// An HTTP-over-IPv4 payload transfer.
pub struct HttpFetch {
    /// Manifest being fetched; imported on completion with `ttl - 1`.
    pub manifest: Manifest,
    /// Advertising peer (its address; the port is `http_port`).
    pub peer: SocketAddrV4,
    /// TCP port of the peer's file server.
    pub http_port: u16,
    /// Staging directory for `file.<ID>` / `manifest.<ID>`.
    pub import_dir: PathBuf,
    /// Budget between successful byte transfers.
    pub idle_timeout: Duration,
    /// Import sink.
    pub store: Arc<dyn BundleStore>,
}

/// The transfer strategy carried by a fetch slot. Only direct HTTP over IPv4
/// is implemented; overlay transfer would slot in as a second variant with
/// the same completion contract.
pub enum Transfer {
    /// Direct HTTP/1.0 GET to the peer's file server.
    HttpOverIpv4(HttpFetch),
}

impl Transfer {
    /// Bundle id this transfer is for.
    pub fn id(&self) -> BundleId {
        match self {
            Transfer::HttpOverIpv4(f) => f.manifest.id,
        }
    }

    /// Drive the transfer to completion or failure.
    pub async fn run(self) -> Result<(), FetchError> {
        match self {
            Transfer::HttpOverIpv4(f) => f.run().await,
        }
    }
}

impl HttpFetch {
    async fn run(self) -> Result<(), FetchError> {
        let file_path = self.import_dir.join(format!("file.{}", self.manifest.id));
        let res = self.transfer(&file_path).await;
        if res.is_err() {
            let _ = tokio::fs::remove_file(&file_path).await;
        }
        res
    }

    async fn transfer(&self, file_path: &Path) -> Result<(), FetchError> {
        let idle = self.idle_timeout;
        let addr = SocketAddrV4::new(*self.peer.ip(), self.http_port);
        debug!(peer = %addr, id = %self.manifest.id, phase = ?FetchPhase::Connecting, "fetch starting");

        let mut stream = timeout(idle, TcpStream::connect(addr))
            .await
            .map_err(|_| FetchError::IdleTimeout)?
            .map_err(|_| FetchError::Connect)?;

        debug!(id = %self.manifest.id, phase = ?FetchPhase::SendingRequest, "connected");
        let request = format!("GET /rhizome/file/{} HTTP/1.0\r\n\r\n", self.manifest.filehash);
        timeout(idle, stream.write_all(request.as_bytes()))
            .await
            .map_err(|_| FetchError::IdleTimeout)?
            .map_err(|_| FetchError::Io)?;

        tokio::fs::create_dir_all(&self.import_dir)
            .await
            .map_err(|_| FetchError::FileIo)?;
        let mut file = tokio::fs::File::create(file_path)
            .await
            .map_err(|_| FetchError::FileIo)?;

        debug!(id = %self.manifest.id, phase = ?FetchPhase::RxHeaders, "request sent");
        let mut buf = [0u8; HEADER_BUF_BYTES];
        let mut len = 0usize;
        let (file_len, body_start) = loop {
            if len == buf.len() {
                return Err(FetchError::HeadersOverflow);
            }
            let n = timeout(idle, stream.read(&mut buf[len..]))
                .await
                .map_err(|_| FetchError::IdleTimeout)?
                .map_err(|_| FetchError::Io)?;
            if n == 0 {
                return Err(FetchError::ConnectionClosed);
            }
            len += n;
            if let Some(end) = find_header_end(&buf[..len]) {
                let file_len = parse_http_headers(&buf[..=end])?;
                break (file_len, end + 1);
            }
        };

        // Bytes past the header terminator are the head of the body.
        let mut file_ofs: i64 = 0;
        let spill = &buf[body_start..len];
        let take = (spill.len() as i64).min(file_len) as usize;
        if take > 0 {
            file.write_all(&spill[..take])
                .await
                .map_err(|_| FetchError::FileIo)?;
            file_ofs += take as i64;
        }

        debug!(id = %self.manifest.id, phase = ?FetchPhase::RxFile, file_len, "headers parsed");
        let mut chunk = [0u8; BODY_CHUNK_BYTES];
        while file_ofs < file_len {
            let want = chunk.len().min((file_len - file_ofs) as usize);
            let n = timeout(idle, stream.read(&mut chunk[..want]))
                .await
                .map_err(|_| FetchError::IdleTimeout)?
                .map_err(|_| FetchError::Io)?;
            if n == 0 {
                return Err(FetchError::ConnectionClosed);
            }
            file.write_all(&chunk[..n])
                .await
                .map_err(|_| FetchError::FileIo)?;
            file_ofs += n as i64;
        }
        file.flush().await.map_err(|_| FetchError::FileIo)?;
        drop(file);

        let manifest_path = self.import_dir.join(format!("manifest.{}", self.manifest.id));
        tokio::fs::write(&manifest_path, self.manifest.signed_text())
            .await
            .map_err(|_| FetchError::FileIo)?;
        let ttl = self.manifest.ttl.saturating_sub(1);
        self.store.import_bundle(&self.manifest, Some(file_path), ttl)?;
        debug!(id = %self.manifest.id, bytes = file_len, "fetched and imported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_end_ignores_cr_and_nul() {
        assert_eq!(find_header_end(b"HTTP/1.0 200 OK\r\n\r\n"), Some(18));
        assert_eq!(find_header_end(b"a\n\0\r\nrest"), Some(4));
        assert_eq!(find_header_end(b"no terminator\r\n"), None);
    }

    #[test]
    fn parses_status_and_content_length() {
        let block = b"HTTP/1.0 200 OK\r\nContent-length: 2048\r\n\r\n";
        assert_eq!(parse_http_headers(block).unwrap(), 2048);
    }

    #[test]
    fn rejects_non_200() {
        let block = b"HTTP/1.0 404 Not Found\r\n\r\n";
        assert!(matches!(
            parse_http_headers(block),
            Err(FetchError::HttpStatus(404))
        ));
    }

    #[test]
    fn content_length_header_is_case_sensitive() {
        let block = b"HTTP/1.0 200 OK\r\nContent-Length: 10\r\n\r\n";
        assert!(matches!(
            parse_http_headers(block),
            Err(FetchError::MissingContentLength)
        ));
    }

    #[test]
    fn rejects_negative_length() {
        let block = b"HTTP/1.0 200 OK\r\nContent-length: -1\r\n\r\n";
        assert!(matches!(
            parse_http_headers(block),
            Err(FetchError::IllegalLength)
        ));
    }
}
