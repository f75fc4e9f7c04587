/*
 * cookie.rs
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

//! Cookie jar: stores cookies keyed by (domain, path, name), absorbs `Set-Cookie` response
//! headers and computes the `Cookie` request header for a URL.
//!
//! All access goes through one lock: a redirect chain both reads the jar (to build `Cookie`)
//! and writes it (from `Set-Cookie`) within a single logical request. Expired cookies are
//! dropped lazily when the jar is read.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::protocol::http::header::{self, HeaderSet};
use crate::uri::Url;

/// Legacy `Expires` layouts seen in the wild besides RFC 1123.
const LEGACY_EXPIRES_FORMATS: &[&str] = &["%a, %d-%b-%Y %H:%M:%S GMT", "%A, %d-%b-%y %H:%M:%S GMT"];

/// A single HTTP cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Lower-case domain without a leading dot.
    pub domain: String,
    pub path: String,
    /// None for session cookies.
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
    pub http_only: bool,
    /// Set when the cookie had no Domain attribute: only the exact host receives it.
    pub host_only: bool,
    /// Creation order within the jar, used for stable output ordering.
    #[serde(default)]
    created: u64,
}

impl Cookie {
    /// Host-only session cookie for path `/`.
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: normalize_domain(&domain.into()),
            path: "/".to_string(),
            expires: None,
            secure: false,
            http_only: false,
            host_only: true,
            created: 0,
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Make this a domain cookie (sent to subdomains too).
    pub fn domain_cookie(mut self) -> Self {
        self.host_only = false;
        self
    }

    pub fn expires(mut self, at: DateTime<Utc>) -> Self {
        self.expires = Some(at);
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|exp| exp <= now)
    }

    pub fn domain_matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        if self.host_only {
            host == self.domain
        } else {
            domain_match(&host, &self.domain)
        }
    }

    /// Path match: equal, or a prefix ending at a `/` boundary.
    pub fn path_matches(&self, request_path: &str) -> bool {
        if request_path == self.path {
            return true;
        }
        request_path.starts_with(&self.path)
            && (self.path.ends_with('/') || request_path[self.path.len()..].starts_with('/'))
    }

    /// Whether this cookie goes out with a request to `url` at time `now`.
    pub fn matches(&self, url: &Url, now: DateTime<Utc>) -> bool {
        !self.is_expired_at(now)
            && self.domain_matches(url.host())
            && self.path_matches(url.path())
            && (!self.secure || url.scheme().is_secure())
    }

    /// Parse a `Set-Cookie` value received from `source`.
    ///
    /// Domain defaults to the source host (host-only) and Path to the directory of the
    /// source path. A Domain attribute that does not cover the source host is rejected.
    /// Max-Age takes precedence over Expires.
    pub fn parse(set_cookie: &str, source: &Url, now: DateTime<Utc>) -> Option<Self> {
        let mut parts = set_cookie.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let mut cookie = Cookie::new(name, value.trim().trim_matches('"'), source.host());
        cookie.path = default_path(source.path());

        let mut max_age: Option<i64> = None;
        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attr.trim(), ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "domain" if !val.is_empty() => {
                    let domain = normalize_domain(val);
                    if !domain_match(&source.host().to_ascii_lowercase(), &domain) {
                        trace!("rejecting cookie {} for domain {} from {}", name, domain, source.host());
                        return None;
                    }
                    cookie.domain = domain;
                    cookie.host_only = false;
                }
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "expires" => {
                    if let Some(at) = parse_expires(val) {
                        cookie.expires = Some(at);
                    }
                }
                "max-age" => max_age = val.parse::<i64>().ok().or(max_age),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                _ => {}
            }
        }
        if let Some(secs) = max_age {
            cookie.expires = Some(if secs <= 0 {
                now
            } else {
                now.checked_add_signed(Duration::seconds(secs.min(i64::MAX / 1000)))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            });
        }
        Some(cookie)
    }

    fn key(&self) -> CookieKey {
        (self.domain.clone(), self.path.clone(), self.name.clone())
    }
}

type CookieKey = (String, String, String);

#[derive(Default)]
struct JarState {
    cookies: HashMap<CookieKey, Cookie>,
    next_seq: u64,
}

/// Thread-safe cookie storage shared by every request on a client.
#[derive(Default)]
pub struct CookieJar {
    state: Mutex<JarState>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JarState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a cookie, replacing any with the same (domain, path, name). An already expired
    /// cookie deletes the stored one instead.
    pub fn add(&self, cookie: Cookie) {
        let mut state = self.lock();
        Self::insert(&mut state, cookie, Utc::now());
    }

    fn insert(state: &mut JarState, mut cookie: Cookie, now: DateTime<Utc>) {
        let key = cookie.key();
        if cookie.is_expired_at(now) {
            state.cookies.remove(&key);
            return;
        }
        cookie.created = match state.cookies.get(&key) {
            Some(existing) => existing.created,
            None => {
                state.next_seq += 1;
                state.next_seq
            }
        };
        state.cookies.insert(key, cookie);
    }

    /// Absorb every `Set-Cookie` header of a response received from `source`.
    pub fn add_from_headers(&self, source: &Url, headers: &HeaderSet) {
        let now = Utc::now();
        let mut state = self.lock();
        for value in headers.get_all(header::SET_COOKIE) {
            match Cookie::parse(value, source, now) {
                Some(cookie) => Self::insert(&mut state, cookie, now),
                None => trace!("ignoring Set-Cookie from {}: {}", source, value),
            }
        }
    }

    /// Cookies to send to `target`: longest path first, then oldest first.
    pub fn cookies_for(&self, target: &Url) -> Vec<Cookie> {
        let now = Utc::now();
        let mut state = self.lock();
        state.cookies.retain(|_, c| !c.is_expired_at(now));
        let mut out: Vec<Cookie> = state
            .cookies
            .values()
            .filter(|c| c.matches(target, now))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then(a.created.cmp(&b.created)));
        out
    }

    /// `name=value; name2=value2` for `target`, or an empty string when nothing matches.
    pub fn cookie_header_for(&self, target: &Url) -> String {
        self.cookies_for(target)
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn all(&self) -> Vec<Cookie> {
        let mut out: Vec<Cookie> = self.lock().cookies.values().cloned().collect();
        out.sort_by_key(|c| c.created);
        out
    }

    pub fn remove(&self, domain: &str, path: &str, name: &str) -> bool {
        let key = (normalize_domain(domain), path.to_string(), name.to_string());
        self.lock().cookies.remove(&key).is_some()
    }

    pub fn clear(&self) {
        self.lock().cookies.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all cookies as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.all())
    }

    /// Restore a jar from a `to_json` snapshot. Expired entries are skipped.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let cookies: Vec<Cookie> = serde_json::from_str(json)?;
        let jar = CookieJar::new();
        {
            let now = Utc::now();
            let mut state = jar.lock();
            for cookie in cookies {
                Self::insert(&mut state, cookie, now);
            }
        }
        Ok(jar)
    }
}

impl std::fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieJar").field("len", &self.len()).finish()
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// `host` equals `domain` or is a subdomain of it.
fn domain_match(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

/// Directory of the request path: up to, not including, the last `/`; `/` at minimum.
fn default_path(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

fn parse_expires(val: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(val) {
        return Some(dt.with_timezone(&Utc));
    }
    LEGACY_EXPIRES_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(val, fmt).ok())
        .map(|naive| naive.and_utc())
}
