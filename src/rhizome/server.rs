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

//! Peer-side of the bundle file protocol.
//!
//! Serves `GET /rhizome/file/<UPPER-HEX-FILEHASH> HTTP/1.0` from the local
//! store. Responses are plain HTTP/1.0: status 200 with `Content-length` and
//! the raw payload, or 404. Hand-rolled because fetchers require HTTP/1.0
//! status lines.

use crate::core::store::BundleStore;
use crate::core::types::FileHash;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

const REQUEST_MAX_BYTES: usize = 1024;

/// Bind and serve the file protocol until the task is dropped.
pub async fn serve_files(store: Arc<dyn BundleStore>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(store, listener).await
}

/// Serve the file protocol on an already-bound listener.
pub async fn serve_listener(
    store: Arc<dyn BundleStore>,
    listener: TcpListener,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "file server listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            if let Err(e) = handle_conn(store, stream).await {
                debug!(peer = %peer, error = %e, "file request failed");
            }
        });
    }
}

/// Extract the requested file hash from a request line, if well-formed.
fn parse_request_line(line: &str) -> Option<FileHash> {
    let rest = line.strip_prefix("GET /rhizome/file/")?;
    let hash = rest.split_whitespace().next()?;
    FileHash::from_hex(hash).ok()
}

async fn handle_conn(store: Arc<dyn BundleStore>, mut stream: TcpStream) -> std::io::Result<()> {
    let mut buf = [0u8; REQUEST_MAX_BYTES];
    let mut len = 0usize;
    // Read until the end of the request head.
    loop {
        if len == buf.len() {
            return respond_404(&mut stream).await;
        }
        let n = stream.read(&mut buf[len..]).await?;
        if n == 0 {
            return Ok(());
        }
        len += n;
        if buf[..len].windows(2).any(|w| w == b"\n\n")
            || buf[..len].windows(4).any(|w| w == b"\r\n\r\n")
        {
            break;
        }
    }

    let head = String::from_utf8_lossy(&buf[..len]);
    let Some(hash) = head.lines().next().and_then(parse_request_line) else {
        warn!("malformed file request");
        return respond_404(&mut stream).await;
    };

    let Ok(Some(path)) = store.payload_path(&hash) else {
        debug!(%hash, "requested file not held");
        return respond_404(&mut stream).await;
    };

    let body = tokio::fs::read(&path).await?;
    let header = format!("HTTP/1.0 200 OK\r\nContent-length: {}\r\n\r\n", body.len());
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.flush().await?;
    debug!(%hash, bytes = body.len(), "served file");
    Ok(())
}

async fn respond_404(stream: &mut TcpStream) -> std::io::Result<()> {
    stream
        .write_all(b"HTTP/1.0 404 Not Found\r\n\r\n")
        .await?;
    stream.flush().await
}
