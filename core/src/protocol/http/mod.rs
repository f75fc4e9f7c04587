/*
 * mod.rs
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

//! HTTP/1.1 client with push-parsed responses.
//!
//! - Connections are pooled per (scheme, host, port) and checked out exclusively.
//! - Buffers: `bytes` crate (BytesMut for the parse buffer, Bytes for payloads and bodies).
//! - HTTP/1.1 only: state-machine response parser with Content-Length and chunked framing.
//! - TLS with ALPN `http/1.1`.
//! - Redirects are followed in a bounded loop; cookies are kept in a shared jar.

mod request;
mod response;
mod transport;

pub mod client;
pub mod connection;
pub mod cookie;
pub mod error;
pub mod h1;
pub mod header;
pub mod pool;
pub mod redirect;
pub mod status;

pub use client::HttpClient;
pub use connection::{HttpConnection, HttpStream, PoolKey};
pub use cookie::{Cookie, CookieJar};
pub use error::{HttpError, Result};
pub use h1::H1ResponseHandler;
pub use header::{Header, HeaderSet};
pub use pool::ConnectionPool;
pub use request::{Method, Payload, Request};
pub use response::{Body, BodySink, Response, ResponseHead};
pub use status::StatusClass;
pub use transport::{execute, Exchange, ExchangeContext};
