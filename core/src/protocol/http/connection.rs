/*
 * connection.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Postino, an HTTP/1.1 client library.
 *
 * Postino is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Postino is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Postino.  If not, see <http://www.gnu.org/licenses/>.
 */

//! HTTP connection: one TCP or TLS stream plus its pool key and read buffer.
//!
//! The read buffer belongs to the connection, so bytes read past the end of one response
//! stay with the socket they came from.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream as TokioTlsStream;

use crate::net;
use crate::protocol::http::error::{HttpError, Result};
use crate::uri::{Scheme, Url};

/// Size of one socket read, and of each payload write.
pub const IO_CHUNK: usize = 8192;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Pool identity of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl PoolKey {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }
}

impl From<&Url> for PoolKey {
    fn from(url: &Url) -> Self {
        Self::new(url.scheme(), url.host(), url.port())
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

/// Unified stream: plain TCP or TLS. Implements AsyncRead + AsyncWrite.
pub enum HttpStream {
    Plain(TcpStream),
    Tls(Box<TokioTlsStream<TcpStream>>),
}

impl AsyncRead for HttpStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for HttpStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_flush(cx),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// A live socket owned by the pool and lent to one exchange at a time.
pub struct HttpConnection {
    id: u64,
    key: PoolKey,
    stream: HttpStream,
    read_buf: BytesMut,
    io_timeout: Duration,
    served: u32,
}

impl HttpConnection {
    /// Connect to the key's host and port; for https, perform the TLS handshake.
    /// Both steps are bounded by `limit`, which also becomes the per-read/write timeout.
    pub async fn open(key: PoolKey, limit: Duration) -> Result<Self> {
        let tcp = net::connect_tcp(&key.host, key.port, limit).await?;
        let stream = if key.scheme.is_secure() {
            HttpStream::Tls(Box::new(net::handshake(tcp, &key.host, limit).await?))
        } else {
            HttpStream::Plain(tcp)
        };
        Ok(Self::new(key, stream, limit))
    }

    pub fn new(key: PoolKey, stream: HttpStream, io_timeout: Duration) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            key,
            stream,
            read_buf: BytesMut::with_capacity(IO_CHUNK),
            io_timeout,
            served: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.stream, HttpStream::Tls(_))
    }

    /// Number of complete exchanges this connection has carried.
    pub fn served(&self) -> u32 {
        self.served
    }

    pub(crate) fn mark_served(&mut self) {
        self.served += 1;
    }

    pub fn set_io_timeout(&mut self, limit: Duration) {
        self.io_timeout = limit;
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let limit = self.io_timeout;
        timeout(limit, self.stream.write_all(data))
            .await
            .map_err(|_| timed_out("write", limit))??;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        let limit = self.io_timeout;
        timeout(limit, self.stream.flush())
            .await
            .map_err(|_| timed_out("write", limit))??;
        Ok(())
    }

    /// Read once from the socket into the read buffer. EOF is an error: a response was expected.
    pub async fn fill(&mut self) -> Result<usize> {
        let mut tmp = [0u8; IO_CHUNK];
        let limit = self.io_timeout;
        let n = timeout(limit, self.stream.read(&mut tmp))
            .await
            .map_err(|_| timed_out("read", limit))??;
        if n == 0 {
            return Err(HttpError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "HTTP connection closed",
            )));
        }
        self.read_buf.extend_from_slice(&tmp[..n]);
        Ok(n)
    }

    pub fn read_buf(&mut self) -> &mut BytesMut {
        &mut self.read_buf
    }
}

fn timed_out(operation: &'static str, limit: Duration) -> HttpError {
    HttpError::Timeout {
        operation,
        seconds: limit.as_secs(),
    }
}

impl fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("tls", &self.is_tls())
            .field("served", &self.served)
            .field("buffered", &self.read_buf.len())
            .finish()
    }
}
