/*
 * header.rs
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

//! Header fields: ordered name/value pairs with case-insensitive lookup.
//!
//! Insertion order is kept for serialization. Lookup returns the *last* value for a name,
//! so a later field of the same name overrides an earlier one for read purposes.

use std::fmt;

pub const HOST: &str = "Host";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const CONNECTION: &str = "Connection";
pub const EXPECT: &str = "Expect";
pub const COOKIE: &str = "Cookie";
pub const SET_COOKIE: &str = "Set-Cookie";
pub const LOCATION: &str = "Location";
pub const USER_AGENT: &str = "User-Agent";
pub const AUTHORIZATION: &str = "Authorization";

/// One header field. Name identity is case-insensitive; the value is opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: String,
    value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Parse `Name: value` (no CRLF). Returns None when there is no colon or the name is empty.
    pub fn parse_line(line: &str) -> Option<Self> {
        let (name, value) = line.split_once(':')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self::new(name, value.trim()))
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<Header>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, keeping any earlier fields of the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.push(Header::new(name, value));
        self
    }

    /// Replace every field of this name with a single new one at the end.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.remove(&name);
        self.entries.push(Header::new(name, value));
        self
    }

    /// Last value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|h| h.is(name))
            .map(|h| h.value())
    }

    /// All values for `name`, in order received.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |h| h.is(name))
            .map(|h| h.value())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|h| h.is(name))
    }

    /// Remove every field of this name. Returns true if anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|h| !h.is(name));
        self.entries.len() != before
    }

    /// True when a comma-separated value of `name` contains `token` (case-insensitive).
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name)
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.entries.iter()
    }

    /// Serialize as `Name: value\r\n` lines in insertion order (no terminating blank line).
    pub fn write_to(&self, out: &mut String) {
        for h in &self.entries {
            out.push_str(&h.name);
            out.push_str(": ");
            out.push_str(&h.value);
            out.push_str("\r\n");
        }
    }
}

impl<'a> IntoIterator for &'a HeaderSet {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = HeaderSet::new();
        for (k, v) in iter {
            set.append(k, v);
        }
        set
    }
}

impl<K: Into<String>, V: Into<String>> From<Vec<(K, V)>> for HeaderSet {
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_and_last_wins() {
        let mut h = HeaderSet::new();
        h.append("Content-Type", "text/plain");
        h.append("content-type", "application/json");
        assert_eq!(h.get("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(h.get_all("Content-Type").count(), 2);
        assert!(h.get("Accept").is_none());
    }

    #[test]
    fn set_replaces_and_moves_to_end() {
        let mut h: HeaderSet = vec![("Host", "a"), ("Accept", "*/*")].into();
        h.set("host", "b");
        let names: Vec<&str> = h.iter().map(|x| x.name()).collect();
        assert_eq!(names, vec!["Accept", "host"]);
        assert_eq!(h.get("Host"), Some("b"));
    }

    #[test]
    fn serializes_in_insertion_order() {
        let h: HeaderSet = vec![("B", "2"), ("A", "1")].into();
        let mut out = String::new();
        h.write_to(&mut out);
        assert_eq!(out, "B: 2\r\nA: 1\r\n");
    }

    #[test]
    fn parse_line_trims_and_keeps_colons_in_value() {
        let h = Header::parse_line("Location:  http://x:81/y ").unwrap();
        assert_eq!(h.name(), "Location");
        assert_eq!(h.value(), "http://x:81/y");
        assert!(Header::parse_line("no colon here").is_none());
        assert!(Header::parse_line(": empty").is_none());
    }

    #[test]
    fn token_lists() {
        let h: HeaderSet = vec![("Connection", "Upgrade, close")].into();
        assert!(h.has_token("connection", "CLOSE"));
        assert!(!h.has_token("connection", "keep-alive"));
    }
}
