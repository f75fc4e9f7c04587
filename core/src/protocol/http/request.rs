/*
 * request.rs
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

//! HTTP request: method, target URL, headers, optional payload.
//!
//! A `Request` is transient: the client builds one per hop and the transport serializes it.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use bytes::Bytes;

use crate::protocol::http::error::{HttpError, Result};
use crate::protocol::http::header::HeaderSet;
use crate::uri::Url;

/// Supported request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Put,
    Patch,
    Delete,
    Post,
    Trace,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Post => "POST",
            Method::Trace => "TRACE",
        }
    }

    /// Methods whose requests normally carry a payload; these get `Content-Length: 0` when empty.
    pub fn expects_payload(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl FromStr for Method {
    type Err = HttpError;

    /// Case-insensitive; anything outside the supported set is `UnsupportedMethod`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "POST" => Ok(Method::Post),
            "TRACE" => Ok(Method::Trace),
            _ => Err(HttpError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request payload: in memory, streamed from a file, or absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Payload {
    #[default]
    Empty,
    Bytes(Bytes),
    File(PathBuf),
}

impl Payload {
    /// Size in bytes, known before anything is written. Reads file metadata for `File`.
    pub async fn len(&self) -> Result<u64> {
        match self {
            Payload::Empty => Ok(0),
            Payload::Bytes(b) => Ok(b.len() as u64),
            Payload::File(path) => tokio::fs::metadata(path)
                .await
                .map(|m| m.len())
                .map_err(|source| HttpError::Payload {
                    path: path.clone(),
                    source,
                }),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Empty => true,
            Payload::Bytes(b) => b.is_empty(),
            Payload::File(_) => false,
        }
    }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self {
        Payload::Bytes(b)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(v))
    }
}

impl From<&'static str> for Payload {
    fn from(s: &'static str) -> Self {
        Payload::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

/// One hop's worth of request state.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    /// Caller-supplied headers; the transport adds Host, Content-Length, Cookie, Expect.
    pub headers: HeaderSet,
    pub payload: Payload,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderSet::new(),
            payload: Payload::Empty,
        }
    }

    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.append(name, value);
        self
    }

    pub fn payload(&mut self, payload: impl Into<Payload>) -> &mut Self {
        self.payload = payload.into();
        self
    }
}
