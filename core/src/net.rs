/*
 * net.rs
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

//! Socket plumbing: bounded TCP connect and TLS handshake with rustls.
//!
//! Trust roots come from the platform store, falling back to the Mozilla set from webpki-roots.
//! ALPN offers only `http/1.1`.

use std::io;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::client::ClientConfig;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::RootCertStore;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

use crate::protocol::http::error::{HttpError, Result};

/// Build a root certificate store: platform native certs first, then webpki-roots as fallback.
fn build_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            for cert in certs {
                let _ = root_store.add(cert);
            }
        }
        Err(e) => trace!("native root certificates unavailable: {}", e),
    }
    if root_store.is_empty() {
        root_store.roots = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    }
    root_store
}

/// TLS client config for HTTP/1.1 (ALPN `http/1.1`, no client auth).
pub fn http_client_config() -> Arc<ClientConfig> {
    let mut config = ClientConfig::builder()
        .with_root_certificates(build_root_store())
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Arc::new(config)
}

static DEFAULT_CONNECTOR: OnceLock<TlsConnector> = OnceLock::new();

fn default_connector() -> &'static TlsConnector {
    DEFAULT_CONNECTOR.get_or_init(|| TlsConnector::from(http_client_config()))
}

/// Open a TCP connection, failing with `Timeout` after `limit`.
pub async fn connect_tcp(host: &str, port: u16, limit: Duration) -> Result<TcpStream> {
    let addr = format!("{}:{}", host, port);
    let tcp = timeout(limit, TcpStream::connect(&addr))
        .await
        .map_err(|_| HttpError::Timeout {
            operation: "connect",
            seconds: limit.as_secs(),
        })?
        .map_err(|source| HttpError::Connect {
            host: host.to_string(),
            port,
            source,
        })?;
    let _ = tcp.set_nodelay(true);
    debug!("connected to {}", addr);
    Ok(tcp)
}

/// Perform the TLS handshake over an open TCP stream.
pub async fn handshake(tcp: TcpStream, host: &str, limit: Duration) -> Result<TlsStream<TcpStream>> {
    // IPv6 literals are kept bracketed in URLs; rustls wants the bare address
    let name = host.trim_start_matches('[').trim_end_matches(']').to_string();
    let server_name = ServerName::try_from(name).map_err(|e| HttpError::Tls {
        host: host.to_string(),
        source: io::Error::new(io::ErrorKind::InvalidInput, e),
    })?;
    let tls = timeout(limit, default_connector().connect(server_name, tcp))
        .await
        .map_err(|_| HttpError::Timeout {
            operation: "TLS handshake",
            seconds: limit.as_secs(),
        })?
        .map_err(|source| HttpError::Tls {
            host: host.to_string(),
            source,
        })?;
    debug!("TLS established with {}", host);
    Ok(tls)
}
