/*
 * client.rs
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

//! HTTP client: resolves targets, runs hops through the pool and transport, keeps the cookie
//! jar current and follows redirects.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::protocol::http::connection::PoolKey;
use crate::protocol::http::cookie::CookieJar;
use crate::protocol::http::error::Result;
use crate::protocol::http::header::HeaderSet;
use crate::protocol::http::pool::ConnectionPool;
use crate::protocol::http::redirect;
use crate::protocol::http::request::{Method, Payload, Request};
use crate::protocol::http::response::{BodySink, Response, ResponseHead};
use crate::protocol::http::status;
use crate::protocol::http::transport::{self, ExchangeContext};
use crate::uri::{Url, UrlOrPath};

struct Settings {
    config: ClientConfig,
    base_url: Option<Url>,
}

/// One-shot transfer options consumed by the next `request`.
#[derive(Default)]
struct Pending {
    payload_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
}

/// HTTP/1.1 client. Safe to share between tasks; every call takes its own pooled connection.
pub struct HttpClient {
    settings: RwLock<Settings>,
    pool: ConnectionPool,
    jar: Arc<CookieJar>,
    pending: Mutex<Pending>,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            settings: RwLock::new(Settings {
                config: ClientConfig::default(),
                base_url: None,
            }),
            pool: ConnectionPool::new(),
            jar: Arc::new(CookieJar::new()),
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Client with the given settings. Fails when `base_url` does not parse.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let base_url = config.base_url.as_deref().map(Url::parse).transpose()?;
        let client = Self::new();
        *client.settings_mut() = Settings { config, base_url };
        Ok(client)
    }

    /// Share a cookie jar with other clients.
    pub fn with_cookie_jar(mut self, jar: Arc<CookieJar>) -> Self {
        self.jar = jar;
        self
    }

    fn settings(&self) -> std::sync::RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(|e| e.into_inner())
    }

    fn settings_mut(&self) -> std::sync::RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(|e| e.into_inner())
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the current settings.
    pub fn config(&self) -> ClientConfig {
        self.settings().config.clone()
    }

    pub fn set_base_url(&self, url: &str) -> Result<()> {
        let parsed = Url::parse(url)?;
        let mut settings = self.settings_mut();
        settings.config.base_url = Some(parsed.to_string());
        settings.base_url = Some(parsed);
        Ok(())
    }

    pub fn base_url(&self) -> Option<Url> {
        self.settings().base_url.clone()
    }

    /// Set the connect/read/write timeout. Zero is refused and returns false.
    pub fn set_timeout(&self, secs: u64) -> bool {
        if secs == 0 {
            return false;
        }
        self.settings_mut().config.timeout_secs = secs;
        true
    }

    pub fn timeout(&self) -> Duration {
        self.settings().config.timeout()
    }

    pub fn set_follow_redirects(&self, follow: bool) {
        self.settings_mut().config.follow_redirects = follow;
    }

    pub fn follow_redirects(&self) -> bool {
        self.settings().config.follow_redirects
    }

    pub fn set_user_agent(&self, agent: Option<String>) {
        self.settings_mut().config.user_agent = agent;
    }

    pub fn cookie_jar(&self) -> Arc<CookieJar> {
        Arc::clone(&self.jar)
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Stream the next request's payload from `path`. Returns false (and changes nothing)
    /// unless `path` is an existing regular file.
    pub fn payload_from_file(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if !path.is_file() {
            return false;
        }
        self.pending().payload_file = Some(path.to_path_buf());
        true
    }

    /// Write the next final response body to `path`, or to a fresh temp file when None.
    /// Returns the path that will be written.
    pub fn output_body_to_file(&self, path: Option<PathBuf>) -> PathBuf {
        let path = path.unwrap_or_else(|| {
            std::env::temp_dir().join(format!("postino-{:016x}", rand::random::<u64>()))
        });
        self.pending().output_file = Some(path.clone());
        path
    }

    /// Close pooled connections to the URL's scheme, host and port.
    pub fn close_connection(&self, url: &Url) {
        self.pool.close(&PoolKey::from(url));
    }

    pub async fn get(&self, target: impl Into<UrlOrPath>) -> Result<Response> {
        let follow = self.follow_redirects();
        self.request(target, "GET", HeaderSet::new(), None, follow, 0).await
    }

    pub async fn post(&self, target: impl Into<UrlOrPath>, headers: HeaderSet, body: Bytes) -> Result<Response> {
        let follow = self.follow_redirects();
        self.request(target, "POST", headers, Some(body), follow, 0).await
    }

    /// Issue one logical request. `redirect_count` is the number of hops already taken.
    ///
    /// The method is checked before anything touches the network. A pending payload file is
    /// used when `body` is None; a pending output file receives the final response body.
    pub async fn request(
        &self,
        target: impl Into<UrlOrPath>,
        method: &str,
        headers: HeaderSet,
        body: Option<Bytes>,
        follow_redirects: bool,
        redirect_count: u32,
    ) -> Result<Response> {
        let method: Method = method.parse()?;
        let (url, config) = {
            let settings = self.settings();
            (target.into().resolve(settings.base_url.as_ref())?, settings.config.clone())
        };
        let Pending {
            payload_file,
            output_file,
        } = std::mem::take(&mut *self.pending());

        let mut req = Request::new(method, url);
        req.headers = headers;
        req.payload = match (body, payload_file) {
            (Some(bytes), _) => Payload::Bytes(bytes),
            (None, Some(path)) => Payload::File(path),
            (None, None) => Payload::Empty,
        };

        let max = config.max_redirects;
        let mut hops = redirect_count;
        loop {
            let will_follow = |head: &ResponseHead| {
                follow_redirects
                    && status::is_redirect(head.code)
                    && hops.saturating_add(1) < max
                    && redirect::location(&req.url, &head.headers).is_some()
            };
            let sink = |head: &ResponseHead| match (&output_file, will_follow(head)) {
                (Some(path), false) => BodySink::File(path.clone()),
                _ => BodySink::Memory,
            };
            let response = self.hop(&req, &config, sink).await?;
            self.jar.add_from_headers(&req.url, &response.headers);

            if !follow_redirects || !status::is_redirect(response.code) {
                return Ok(response);
            }
            let Some(next) = redirect::next_request(&req, &response) else {
                return Ok(response);
            };
            hops = hops.saturating_add(1);
            if hops >= max {
                warn!(
                    "redirect limit ({}) reached at {}; returning {}",
                    max, req.url, response.code
                );
                return Ok(response);
            }
            debug!(
                "{} redirect {} -> {} {} (hop {})",
                response.code, req.url, next.method, next.url, hops
            );
            req = next;
        }
    }

    /// One exchange on a pooled connection. Errors discard the connection.
    async fn hop<F>(&self, req: &Request, config: &ClientConfig, sink: F) -> Result<Response>
    where
        F: FnOnce(&ResponseHead) -> BodySink,
    {
        let key = PoolKey::from(&req.url);
        let mut conn = self.pool.acquire(&key, config.timeout()).await?;
        let cookies = self.jar.cookie_header_for(&req.url);
        let ctx = ExchangeContext {
            user_agent: config.user_agent.as_deref(),
            cookies: &cookies,
        };
        match transport::execute(&mut conn, req, &ctx, sink).await {
            Ok(exchange) => {
                if exchange.reusable {
                    self.pool.release(conn);
                } else {
                    self.pool.discard(conn);
                }
                Ok(exchange.response)
            }
            Err(e) => {
                debug!("{} {} failed: {}", req.method, req.url, e);
                self.pool.discard(conn);
                Err(e)
            }
        }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HttpClient {
    fn drop(&mut self) {
        self.pool.close_all();
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.settings().config)
            .field("pool", &self.pool)
            .field("cookies", &self.jar.len())
            .finish()
    }
}
