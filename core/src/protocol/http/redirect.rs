/*
 * redirect.rs
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

//! Redirect decisions: which responses are followed and how the next request is derived.
//!
//! | Status             | Method    | Payload   |
//! |--------------------|-----------|-----------|
//! | 303                | GET       | dropped   |
//! | 301, 302, 307, 308 | unchanged | unchanged |
//! | 300, 304, 305, 306 | unchanged | unchanged |
//!
//! Credentials the caller attached (`Authorization`, `Cookie`) do not follow a redirect to
//! another host. Hop counting lives in the client loop; this module only derives the next request.

use tracing::warn;

use crate::protocol::http::header::{self, HeaderSet};
use crate::protocol::http::request::{Method, Payload, Request};
use crate::protocol::http::response::Response;
use crate::protocol::http::status;
use crate::uri::Url;

/// Request headers that describe the payload; dropped together with it on 303.
const PAYLOAD_HEADERS: &[&str] = &[
    header::CONTENT_LENGTH,
    header::CONTENT_TYPE,
    header::TRANSFER_ENCODING,
    header::EXPECT,
];

/// Method and whether the payload survives, for a redirect with `code` of a `method` request.
pub fn rewrite_method(code: u16, method: Method) -> (Method, bool) {
    if code == status::SEE_OTHER {
        (Method::Get, false)
    } else {
        (method, true)
    }
}

/// Absolute target of a redirect, from the `Location` header resolved against `current`.
///
/// None when the header is missing, empty or unparseable; the response is then final.
pub fn location(current: &Url, headers: &HeaderSet) -> Option<Url> {
    let value = headers.get(header::LOCATION)?.trim();
    if value.is_empty() {
        return None;
    }
    match current.resolve(value) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!("ignoring unusable Location {:?} from {}: {}", value, current, e);
            None
        }
    }
}

/// The request to issue after `response`, or None when it must be returned as-is.
pub fn next_request(current: &Request, response: &Response) -> Option<Request> {
    if !status::is_redirect(response.code) {
        return None;
    }
    let url = location(&current.url, &response.headers)?;
    let (method, keep_payload) = rewrite_method(response.code, current.method);

    let mut headers = current.headers.clone();
    let payload = if keep_payload {
        current.payload.clone()
    } else {
        for name in PAYLOAD_HEADERS {
            headers.remove(name);
        }
        Payload::Empty
    };
    if !url.host().eq_ignore_ascii_case(current.url.host()) {
        headers.remove(header::AUTHORIZATION);
        headers.remove(header::COOKIE);
    }
    Some(Request {
        method,
        url,
        headers,
        payload,
    })
}
