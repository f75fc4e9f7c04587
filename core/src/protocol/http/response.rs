/*
 * response.rs
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

//! HTTP response: version, status, headers and a body held in memory or on disk.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::protocol::http::header::HeaderSet;
use crate::protocol::http::status::{self, StatusClass};

/// Where the transport should put the response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BodySink {
    #[default]
    Memory,
    File(PathBuf),
}

/// Response body: either in memory or in a file, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Memory(Bytes),
    File(PathBuf),
}

impl Default for Body {
    fn default() -> Self {
        Body::Memory(Bytes::new())
    }
}

/// Status line and headers of a response, before the body is read.
#[derive(Debug, Clone, Default)]
pub struct ResponseHead {
    pub version: String,
    pub code: u16,
    pub reason: String,
    pub headers: HeaderSet,
}

#[derive(Debug, Clone, Default)]
pub struct Response {
    pub version: String,
    pub code: u16,
    pub reason: String,
    pub headers: HeaderSet,
    pub body: Body,
}

impl Response {
    pub fn new(head: ResponseHead, body: Body) -> Self {
        Self {
            version: head.version,
            code: head.code,
            reason: head.reason,
            headers: head.headers,
            body,
        }
    }

    pub fn status_class(&self) -> Option<StatusClass> {
        StatusClass::of(self.code)
    }

    pub fn is_success(&self) -> bool {
        self.status_class() == Some(StatusClass::Success)
    }

    pub fn is_redirect(&self) -> bool {
        status::is_redirect(self.code)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// In-memory body, or None when the body went to a file.
    pub fn body_bytes(&self) -> Option<&Bytes> {
        match &self.body {
            Body::Memory(b) => Some(b),
            Body::File(_) => None,
        }
    }

    pub fn body_file(&self) -> Option<&Path> {
        match &self.body {
            Body::Memory(_) => None,
            Body::File(p) => Some(p),
        }
    }

    /// In-memory body as UTF-8 (lossy). Empty for file bodies.
    pub fn text(&self) -> Cow<'_, str> {
        match &self.body {
            Body::Memory(b) => String::from_utf8_lossy(b),
            Body::File(_) => Cow::Borrowed(""),
        }
    }
}
