/*
 * lib.rs
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

//! Postino core: an HTTP/1.1 client written directly against the wire protocol.
//!
//! Connections are pooled and reused, TLS is negotiated with rustls, bodies are decoded from
//! Content-Length or chunked framing into memory or a file, redirects are followed with a hop
//! ceiling, and cookies are round-tripped through a shared jar.

pub mod config;
pub mod net;
pub mod protocol;
pub mod uri;

pub use config::ClientConfig;
pub use protocol::http::{
    Body, Cookie, CookieJar, HeaderSet, HttpClient, HttpError, Method, Response, Result,
};
pub use uri::{Scheme, Url, UrlOrPath};
