/*
 * config.rs
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

//! Client settings. Loaded from JSON or built in code; every field has a default so a partial
//! document is enough.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Seconds allowed for connect, TLS handshake and each socket read or write.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Redirect hops followed before the last response is returned as-is.
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub timeout_secs: u64,
    pub max_redirects: u32,
    pub follow_redirects: bool,
    /// Base URL that relative request targets are resolved against.
    pub base_url: Option<String>,
    /// Sent as `User-Agent` unless the caller supplies one.
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            follow_redirects: true,
            base_url: None,
            user_agent: None,
        }
    }
}

impl ClientConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Timeout as a duration; zero is never returned.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.max_redirects, 5);
        assert!(cfg.follow_redirects);
        assert!(cfg.base_url.is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = ClientConfig::from_json(r#"{"timeout_secs": 4, "user_agent": "postino/0.1"}"#).unwrap();
        assert_eq!(cfg.timeout_secs, 4);
        assert_eq!(cfg.user_agent.as_deref(), Some("postino/0.1"));
        assert_eq!(cfg.max_redirects, DEFAULT_MAX_REDIRECTS);

        let back = ClientConfig::from_json(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(back, cfg);
        assert!(ClientConfig::from_json("[]").is_err());
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let cfg = ClientConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(cfg.timeout(), Duration::from_secs(1));
    }
}
