/*
 * error.rs
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

//! HTTP client errors.
//!
//! Any error raised while a connection is mid-exchange means that connection was
//! discarded. Running out of redirect hops is not an error: the last response is returned.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HttpError>;

#[derive(Debug, Error)]
pub enum HttpError {
    /// Host unreachable, connection refused, DNS failure.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// TLS handshake failure (or an unusable server name).
    #[error("TLS handshake with {host} failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: io::Error,
    },

    /// Connect, handshake, read or write did not finish within the configured timeout.
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: &'static str, seconds: u64 },

    /// Unparseable status line, unsupported version, unrecognised body framing.
    #[error("HTTP protocol error: {0}")]
    Protocol(String),

    #[error("unsupported request method: {0}")]
    UnsupportedMethod(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Payload file missing or unreadable.
    #[error("cannot read payload file {}: {source}", path.display())]
    Payload {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Output file could not be created or written.
    #[error("cannot write response body to {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Socket failure while writing the request or reading the response.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl HttpError {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, HttpError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let e = HttpError::Connect {
            host: "example.com".into(),
            port: 8080,
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(e.to_string(), "failed to connect to example.com:8080: refused");

        let t = HttpError::Timeout { operation: "connect", seconds: 3 };
        assert!(t.is_timeout());
        assert_eq!(t.to_string(), "connect timed out after 3s");
    }

    #[test]
    fn io_errors_convert() {
        let e: HttpError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(e, HttpError::Io(_)));
    }
}
