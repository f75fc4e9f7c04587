/*
 * pool.rs
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

//! Connection pool keyed by (scheme, host, port).
//!
//! Acquiring takes the connection out of the pool, so two in-flight exchanges never share a
//! socket. One coarse lock guards the key -> connections map and is never held across I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::protocol::http::connection::{HttpConnection, PoolKey};
use crate::protocol::http::error::Result;

#[derive(Default)]
pub struct ConnectionPool {
    idle: Mutex<HashMap<PoolKey, Vec<HttpConnection>>>,
    opened: AtomicUsize,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PoolKey, Vec<HttpConnection>>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take a pooled connection for `key`, or open a new one (TCP connect, then TLS for https).
    pub async fn acquire(&self, key: &PoolKey, limit: Duration) -> Result<HttpConnection> {
        let pooled = {
            let mut idle = self.lock();
            let conn = idle.get_mut(key).and_then(|v| v.pop());
            if idle.get(key).is_some_and(|v| v.is_empty()) {
                idle.remove(key);
            }
            conn
        };
        if let Some(mut conn) = pooled {
            debug!("reusing connection {} to {}", conn.id(), key);
            conn.set_io_timeout(limit);
            return Ok(conn);
        }
        let conn = HttpConnection::open(key.clone(), limit).await?;
        self.opened.fetch_add(1, Ordering::Relaxed);
        debug!("opened connection {} to {}", conn.id(), key);
        Ok(conn)
    }

    /// Return a healthy connection for reuse.
    pub fn release(&self, conn: HttpConnection) {
        debug!("releasing connection {} to {}", conn.id(), conn.key());
        self.lock().entry(conn.key().clone()).or_default().push(conn);
    }

    /// Close a connection that must not be reused. Dropping the stream closes the socket.
    pub fn discard(&self, conn: HttpConnection) {
        debug!("discarding connection {} to {}", conn.id(), conn.key());
        drop(conn);
    }

    /// Close every idle connection for `key`.
    pub fn close(&self, key: &PoolKey) {
        if let Some(conns) = self.lock().remove(key) {
            debug!("closing {} idle connection(s) to {}", conns.len(), key);
        }
    }

    /// Close every idle connection.
    pub fn close_all(&self) {
        let mut idle = self.lock();
        let n: usize = idle.values().map(Vec::len).sum();
        if n > 0 {
            debug!("closing {} idle connection(s)", n);
        }
        idle.clear();
    }

    /// Number of sockets this pool has opened since it was created.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    /// Number of idle connections currently pooled.
    pub fn idle(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let idle: Vec<(String, usize)> = self
            .lock()
            .iter()
            .map(|(k, v)| (k.to_string(), v.len()))
            .collect();
        f.debug_struct("ConnectionPool")
            .field("opened", &self.opened())
            .field("idle", &idle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uri::Scheme;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn acquire_release_reuses_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = tokio::spawn(async move {
            let mut held = Vec::new();
            for _ in 0..2 {
                if let Ok((s, _)) = listener.accept().await {
                    held.push(s);
                }
            }
            held
        });

        let pool = ConnectionPool::new();
        let key = PoolKey::new(Scheme::Http, "127.0.0.1", port);
        let limit = Duration::from_secs(5);

        let first = pool.acquire(&key, limit).await.unwrap();
        let first_id = first.id();
        assert_eq!(pool.idle(), 0);
        pool.release(first);
        assert_eq!(pool.idle(), 1);

        let again = pool.acquire(&key, limit).await.unwrap();
        assert_eq!(again.id(), first_id);
        assert_eq!(pool.opened(), 1);

        // Checked out, so a concurrent caller gets a fresh socket.
        let other = pool.acquire(&key, limit).await.unwrap();
        assert_ne!(other.id(), first_id);
        assert_eq!(pool.opened(), 2);

        pool.discard(again);
        pool.release(other);
        pool.close(&key);
        assert_eq!(pool.idle(), 0);
        drop(accepted);
    }
}
