// Copyright 2026 The Supervision Core Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Transport abstraction behind every pooled channel. Both the Unix-domain
//! and TCP dialers speak the same length-prefixed binary framing, so the
//! pool never has to know which kind of endpoint it leased a channel
//! against (§4.2 "Transport selection").

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use supervision_common::{SupervisionError, SupervisionResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::Mutex;

const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// A dialed connection capable of a single RPC-shaped `invoke`. Each
/// implementation owns exactly one underlying socket; concurrency across
/// channels is achieved by the pool holding several `PluginTransport`s,
/// not by multiplexing inside one.
#[async_trait]
pub trait PluginTransport: Send + Sync {
    async fn invoke(&self, method: &str, request: Bytes) -> SupervisionResult<Bytes>;

    /// Cheap, synchronous liveness check based on the last observed I/O
    /// outcome — does not perform a new round trip.
    fn is_healthy(&self) -> bool;

    async fn close(&self);
}

/// Length-prefixed framing over any bidirectional async byte stream:
/// `[u32 method_len][method bytes][u32 payload_len][payload bytes]` for
/// requests, and `[u8 ok][u32 payload_len][payload bytes]` for responses
/// (`ok = 0` means `payload` is a UTF-8 error message).
struct FramedTransport<S> {
    stream: Mutex<S>,
    healthy: AtomicBool,
}

impl<S> FramedTransport<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin,
{
    fn new(stream: S) -> Self {
        Self {
            stream: Mutex::new(stream),
            healthy: AtomicBool::new(true),
        }
    }

    async fn invoke_inner(&self, method: &str, request: Bytes) -> SupervisionResult<Bytes> {
        let mut stream = self.stream.lock().await;

        let method_bytes = method.as_bytes();
        let mut header = Vec::with_capacity(8 + method_bytes.len());
        header.extend_from_slice(&(method_bytes.len() as u32).to_be_bytes());
        header.extend_from_slice(method_bytes);
        header.extend_from_slice(&(request.len() as u32).to_be_bytes());

        let write_result = async {
            stream.write_all(&header).await?;
            stream.write_all(&request).await?;
            stream.flush().await
        }
        .await;
        if write_result.is_err() {
            self.healthy.store(false, Ordering::Release);
            return Err(SupervisionError::Unavailable(
                "transport write failed".to_string(),
            ));
        }

        let mut ok_byte = [0u8; 1];
        if stream.read_exact(&mut ok_byte).await.is_err() {
            self.healthy.store(false, Ordering::Release);
            return Err(SupervisionError::Unavailable(
                "transport read failed".to_string(),
            ));
        }

        let mut len_buf = [0u8; 4];
        if stream.read_exact(&mut len_buf).await.is_err() {
            self.healthy.store(false, Ordering::Release);
            return Err(SupervisionError::Unavailable(
                "transport read failed".to_string(),
            ));
        }
        let payload_len = u32::from_be_bytes(len_buf);
        if payload_len > MAX_FRAME_BYTES {
            self.healthy.store(false, Ordering::Release);
            return Err(SupervisionError::Internal(format!(
                "response frame too large: {payload_len} bytes"
            )));
        }

        let mut payload = vec![0u8; payload_len as usize];
        if stream.read_exact(&mut payload).await.is_err() {
            self.healthy.store(false, Ordering::Release);
            return Err(SupervisionError::Unavailable(
                "transport read failed".to_string(),
            ));
        }

        if ok_byte[0] == 0 {
            let message = String::from_utf8_lossy(&payload).into_owned();
            return Err(SupervisionError::Internal(message));
        }

        Ok(Bytes::from(payload))
    }
}

#[async_trait]
impl PluginTransport for FramedTransport<UnixStream> {
    async fn invoke(&self, method: &str, request: Bytes) -> SupervisionResult<Bytes> {
        self.invoke_inner(method, request).await
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    async fn close(&self) {
        self.healthy.store(false, Ordering::Release);
        let mut stream = self.stream.lock().await;
        let _ = stream.shutdown().await;
    }
}

#[async_trait]
impl PluginTransport for FramedTransport<TcpStream> {
    async fn invoke(&self, method: &str, request: Bytes) -> SupervisionResult<Bytes> {
        self.invoke_inner(method, request).await
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    async fn close(&self) {
        self.healthy.store(false, Ordering::Release);
        let mut stream = self.stream.lock().await;
        let _ = stream.shutdown().await;
    }
}

/// Dials a Unix-domain socket endpoint, used for local services.
pub async fn dial_uds(path: &Path) -> SupervisionResult<Arc<dyn PluginTransport>> {
    let stream = UnixStream::connect(path)
        .await
        .map_err(|e| SupervisionError::Unavailable(format!("dial {path:?} failed: {e}")))?;
    Ok(Arc::new(FramedTransport::new(stream)))
}

/// Dials a TCP endpoint, used for remote services.
pub async fn dial_tcp(addr: SocketAddr) -> SupervisionResult<Arc<dyn PluginTransport>> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| SupervisionError::Unavailable(format!("dial {addr} failed: {e}")))?;
    Ok(Arc::new(FramedTransport::new(stream)))
}
