/*
 * uri.rs
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

//! Request URLs: `http`/`https` scheme, host, port, absolute path and an ordered query.
//!
//! Query keys are unique per URL; setting an existing key replaces its value in place.
//! Fragments and user-info are dropped when parsing, since neither goes on the wire.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::protocol::http::error::{HttpError, Result};

/// Path safe set: `/` separates segments and existing `%XX` escapes are left alone.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Query component safe set: encode the pair separators and anything that would end the query.
const QUERY_COMPONENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'[')
    .add(b']')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("http") {
            Some(Scheme::Http)
        } else if s.eq_ignore_ascii_case("https") {
            Some(Scheme::Https)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::Https)
    }
}

/// Absolute request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    scheme: Scheme,
    host: String,
    port: u16,
    path: String,
    query: Vec<(String, String)>,
}

impl Url {
    /// Parse an absolute `http://` or `https://` URL.
    pub fn parse(input: &str) -> Result<Self> {
        let input = strip_fragment(input.trim());
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| HttpError::InvalidUrl(format!("missing scheme: {}", input)))?;
        let scheme = Scheme::parse(scheme)
            .ok_or_else(|| HttpError::InvalidUrl(format!("unsupported scheme: {}", scheme)))?;

        let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
        let (authority, target) = rest.split_at(authority_end);
        // user-info is not sent
        let authority = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
        let (host, port) = split_host_port(authority, scheme)?;

        let (path, query) = split_target(target);
        Ok(Self {
            scheme,
            host,
            port,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            query,
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: &str) {
        let (path, query) = split_target(path);
        self.path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        self.query = query;
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a query parameter; an existing key keeps its position and takes the new value.
    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.query.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.query.push((key, value)),
        }
    }

    /// Percent-encoded `k=v&k2=v2`, empty when there are no parameters.
    pub fn query_string(&self) -> String {
        self.query
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(k, QUERY_COMPONENT),
                    utf8_percent_encode(v, QUERY_COMPONENT)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Percent-encoded absolute path with query, as used on the request line.
    pub fn request_target(&self) -> String {
        let path = utf8_percent_encode(&self.path, PATH);
        let query = self.query_string();
        if query.is_empty() {
            path.to_string()
        } else {
            format!("{}?{}", path, query)
        }
    }

    /// Host header value: host, plus port when it is not the scheme default.
    pub fn host_header(&self) -> String {
        if self.port == self.scheme.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Resolve a reference (absolute URL, `//host`, `/path`, `?query` or relative path) against this URL.
    pub fn resolve(&self, reference: &str) -> Result<Url> {
        let reference = strip_fragment(reference.trim());
        if reference.is_empty() {
            return Err(HttpError::InvalidUrl("empty reference".into()));
        }
        if has_scheme(reference) {
            return Url::parse(reference);
        }
        if reference.starts_with("//") {
            return Url::parse(&format!("{}:{}", self.scheme.as_str(), reference));
        }

        let mut out = self.clone();
        if reference.starts_with('/') {
            let (path, query) = split_target(reference);
            out.path = remove_dot_segments(path);
            out.query = query;
        } else if let Some(q) = reference.strip_prefix('?') {
            out.query = parse_query(q);
        } else {
            let (path, query) = split_target(reference);
            let dir = match self.path.rfind('/') {
                Some(i) => &self.path[..=i],
                None => "/",
            };
            out.path = remove_dot_segments(&format!("{}{}", dir, path));
            out.query = query;
        }
        Ok(out)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}{}",
            self.scheme.as_str(),
            self.host_header(),
            self.request_target()
        )
    }
}

impl std::str::FromStr for Url {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self> {
        Url::parse(s)
    }
}

/// Request target as given by the caller: already absolute, or to be resolved against the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlOrPath {
    Absolute(Url),
    Relative(String),
}

impl UrlOrPath {
    pub fn resolve(&self, base: Option<&Url>) -> Result<Url> {
        match (self, base) {
            (UrlOrPath::Absolute(url), _) => Ok(url.clone()),
            (UrlOrPath::Relative(s), Some(base)) => base.resolve(s),
            (UrlOrPath::Relative(s), None) if has_scheme(s) => Url::parse(s),
            (UrlOrPath::Relative(s), None) => Err(HttpError::InvalidUrl(format!(
                "relative reference {} without a base URL",
                s
            ))),
        }
    }
}

impl From<Url> for UrlOrPath {
    fn from(url: Url) -> Self {
        UrlOrPath::Absolute(url)
    }
}

impl From<&Url> for UrlOrPath {
    fn from(url: &Url) -> Self {
        UrlOrPath::Absolute(url.clone())
    }
}

impl From<&str> for UrlOrPath {
    fn from(s: &str) -> Self {
        match Url::parse(s) {
            Ok(url) => UrlOrPath::Absolute(url),
            Err(_) => UrlOrPath::Relative(s.to_string()),
        }
    }
}

impl From<String> for UrlOrPath {
    fn from(s: String) -> Self {
        UrlOrPath::from(s.as_str())
    }
}

fn strip_fragment(s: &str) -> &str {
    s.split_once('#').map_or(s, |(before, _)| before)
}

/// True when the reference starts with `scheme://` (before any path or query).
fn has_scheme(s: &str) -> bool {
    match s.find("://") {
        Some(i) => {
            let scheme = &s[..i];
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        }
        None => false,
    }
}

fn split_host_port(authority: &str, scheme: Scheme) -> Result<(String, u16)> {
    let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
        // IPv6 literal; keep the brackets so host:port stays unambiguous
        let end = rest
            .find(']')
            .ok_or_else(|| HttpError::InvalidUrl(format!("unterminated IPv6 host: {}", authority)))?;
        let host = &authority[..end + 2];
        let after = &rest[end + 1..];
        (host, after.strip_prefix(':'))
    } else {
        match authority.rsplit_once(':') {
            Some((h, p)) => (h, Some(p)),
            None => (authority, None),
        }
    };
    if host.is_empty() {
        return Err(HttpError::InvalidUrl("missing host".into()));
    }
    let port = match port {
        Some("") | None => scheme.default_port(),
        Some(p) => p
            .parse::<u16>()
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| HttpError::InvalidUrl(format!("invalid port: {}", p)))?,
    };
    Ok((host.to_ascii_lowercase(), port))
}

fn split_target(target: &str) -> (&str, Vec<(String, String)>) {
    match target.split_once('?') {
        Some((path, q)) => (path, parse_query(q)),
        None => (target, Vec::new()),
    }
}

fn parse_query(q: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for pair in q.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        let k = decode_component(k);
        let v = decode_component(v);
        match out.iter_mut().find(|(ek, _)| *ek == k) {
            Some(entry) => entry.1 = v,
            None => out.push((k, v)),
        }
    }
    out
}

fn decode_component(s: &str) -> String {
    let s = s.replace('+', " ");
    percent_decode_str(&s).decode_utf8_lossy().into_owned()
}

fn remove_dot_segments(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let trailing = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    let mut out = format!("/{}", segments.join("/"));
    if trailing && out.len() > 1 {
        out.push('/');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_urls() {
        let u = Url::parse("http://www.example.com").unwrap();
        assert_eq!(u.scheme(), Scheme::Http);
        assert_eq!(u.host(), "www.example.com");
        assert_eq!(u.port(), 80);
        assert_eq!(u.path(), "/");

        let u = Url::parse("https://www.domain.wales/some/path/to/file.xml").unwrap();
        assert_eq!(u.port(), 443);
        assert_eq!(u.path(), "/some/path/to/file.xml");

        let u = Url::parse("https://www.domain.wales:8989/some/path/to/file.xml").unwrap();
        assert_eq!(u.port(), 8989);
        assert_eq!(u.host_header(), "www.domain.wales:8989");
    }

    #[test]
    fn drops_userinfo_and_fragment() {
        let u = Url::parse("http://user:pw@Example.COM/a?b=c#frag").unwrap();
        assert_eq!(u.host(), "example.com");
        assert_eq!(u.request_target(), "/a?b=c");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Url::parse("ftp://example.com/").is_err());
        assert!(Url::parse("/just/a/path").is_err());
        assert!(Url::parse("http://:80/").is_err());
        assert!(Url::parse("http://example.com:99999/").is_err());
    }

    #[test]
    fn ipv6_host() {
        let u = Url::parse("http://[::1]:8080/x").unwrap();
        assert_eq!(u.host(), "[::1]");
        assert_eq!(u.port(), 8080);
        assert_eq!(u.to_string(), "http://[::1]:8080/x");
    }

    #[test]
    fn query_keys_unique_last_write_wins() {
        let mut u = Url::parse("http://h/p?a=1&b=2&a=3").unwrap();
        assert_eq!(u.params().len(), 2);
        assert_eq!(u.param("a"), Some("3"));
        u.set_param("b", "x y");
        u.set_param("c", "&");
        assert_eq!(u.request_target(), "/p?a=3&b=x%20y&c=%26");
    }

    #[test]
    fn path_is_encoded_on_the_request_line() {
        let u = Url::parse("http://h/a b/caf\u{e9}?q=1").unwrap();
        assert_eq!(u.path(), "/a b/caf\u{e9}");
        assert_eq!(u.request_target(), "/a%20b/caf%C3%A9?q=1");
        let u = Url::parse("http://h/already%20encoded/x").unwrap();
        assert_eq!(u.request_target(), "/already%20encoded/x");
        let next = u.resolve("/a b").unwrap();
        assert_eq!(next.to_string(), "http://h/a%20b");
    }

    #[test]
    fn set_path_replaces_path_and_query() {
        let mut u = Url::parse("http://h/old?x=1").unwrap();
        u.set_path("new/place?y=2");
        assert_eq!(u.path(), "/new/place");
        assert_eq!(u.request_target(), "/new/place?y=2");
        u.set_path("/plain");
        assert_eq!(u.request_target(), "/plain");
    }

    #[test]
    fn decodes_query() {
        let u = Url::parse("http://h/?q=hello+world&e=%C3%A9").unwrap();
        assert_eq!(u.param("q"), Some("hello world"));
        assert_eq!(u.param("e"), Some("é"));
    }

    #[test]
    fn resolves_references() {
        let base = Url::parse("https://example.com:8443/a/b/c?x=1").unwrap();
        assert_eq!(base.resolve("/new").unwrap().to_string(), "https://example.com:8443/new");
        assert_eq!(base.resolve("d").unwrap().to_string(), "https://example.com:8443/a/b/d");
        assert_eq!(base.resolve("../d?y=2").unwrap().to_string(), "https://example.com:8443/a/d?y=2");
        assert_eq!(base.resolve("?z=3").unwrap().to_string(), "https://example.com:8443/a/b/c?z=3");
        assert_eq!(base.resolve("//other.org/p").unwrap().to_string(), "https://other.org/p");
        assert_eq!(base.resolve("http://other.example/x").unwrap().to_string(), "http://other.example/x");
        assert!(base.resolve("").is_err());
        assert!(base.resolve("http://bad:port/").is_err());
    }

    #[test]
    fn url_or_path() {
        let base = Url::parse("http://api.example.com/v1/").unwrap();
        let rel = UrlOrPath::from("/users?id=7");
        assert!(matches!(rel, UrlOrPath::Relative(_)));
        assert_eq!(rel.resolve(Some(&base)).unwrap().to_string(), "http://api.example.com/users?id=7");
        assert!(rel.resolve(None).is_err());

        let abs = UrlOrPath::from("http://other/x");
        assert!(matches!(abs, UrlOrPath::Absolute(_)));
        assert_eq!(abs.resolve(Some(&base)).unwrap().host(), "other");
    }
}
