/*
 * parser.rs
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

//! HTTP/1.1 response push parser: status line, headers, body (Content-Length or chunked).

use bytes::Buf;
use bytes::BytesMut;

use crate::protocol::http::error::{HttpError, Result};
use crate::protocol::http::header::{self, Header, HeaderSet};
use crate::protocol::http::request::Method;
use crate::protocol::http::status;

/// Longest status, header, chunk-size or trailer line accepted.
const MAX_LINE: usize = 64 * 1024;

/// Callback for HTTP/1.1 response events. The transport implements this to collect the head
/// and route body bytes to the response sink.
pub trait H1ResponseHandler {
    fn status(&mut self, version: &str, code: u16, reason: &str);
    fn header(&mut self, name: &str, value: &str);
    fn body_chunk(&mut self, data: &[u8]);
    fn trailer(&mut self, name: &str, value: &str);
    fn complete(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Idle,
    StatusLine,
    Headers,
    /// Headers done; caller must call set_body_mode().
    HeadersComplete,
    Body,
    ChunkSize,
    ChunkData,
    /// CRLF after a chunk's data.
    ChunkDataEnd,
    ChunkTrailer,
}

/// How the body of a response is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    None,
    Length(u64),
    Chunked,
}

/// Decide body framing from the response head.
///
/// HEAD responses and 1xx/204/304 have no body. Chunked wins over Content-Length when both are
/// present. With neither, the body is empty. A Transfer-Encoding that does not end in chunked,
/// or a Content-Length that is not a number, cannot be framed and is a protocol error.
pub fn body_mode(method: Method, code: u16, headers: &HeaderSet) -> Result<BodyMode> {
    if method == Method::Head || status::is_bodiless(code) {
        return Ok(BodyMode::None);
    }
    if let Some(te) = headers.get(header::TRANSFER_ENCODING) {
        let last = te.rsplit(',').next().unwrap_or("").trim();
        if last.eq_ignore_ascii_case("chunked") {
            return Ok(BodyMode::Chunked);
        }
        return Err(HttpError::protocol(format!(
            "unsupported transfer-encoding: {}",
            te
        )));
    }
    match headers.get(header::CONTENT_LENGTH) {
        Some(cl) => {
            let n = cl
                .trim()
                .parse::<u64>()
                .map_err(|_| HttpError::protocol(format!("invalid content-length: {}", cl)))?;
            Ok(if n == 0 { BodyMode::None } else { BodyMode::Length(n) })
        }
        None => Ok(BodyMode::None),
    }
}

/// Push parser for HTTP/1.1 response. Feed bytes via `receive`; handler is invoked as complete tokens are parsed.
pub struct ResponseParser {
    state: ParseState,
    remaining: u64,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::StatusLine,
            remaining: 0,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = ParseState::StatusLine;
        self.remaining = 0;
    }

    /// Find CRLF in buf; return the offset of the CR, or None if not found.
    fn find_crlf(buf: &[u8]) -> Option<usize> {
        buf.windows(2).position(|w| w == b"\r\n")
    }

    /// Split one CRLF-terminated line off the front of buf, without the CRLF.
    fn take_line(buf: &mut BytesMut) -> Result<Option<String>> {
        let line_end = match Self::find_crlf(buf) {
            Some(n) => n,
            None if buf.len() > MAX_LINE => {
                return Err(HttpError::protocol("line too long"));
            }
            None => return Ok(None),
        };
        let line = buf.split_to(line_end + 2);
        let s = std::str::from_utf8(&line[..line_end])
            .map_err(|_| HttpError::protocol("line is not valid UTF-8"))?;
        Ok(Some(s.to_string()))
    }

    /// Consume and parse as much as possible from buf. Partial data remains in buf.
    /// Stops at HeadersComplete and Idle; bytes after the end of the response are left unread.
    pub fn receive<H: H1ResponseHandler>(&mut self, buf: &mut BytesMut, handler: &mut H) -> Result<()> {
        while !buf.is_empty() {
            match self.state {
                ParseState::StatusLine => {
                    let line = match Self::take_line(buf)? {
                        Some(l) => l,
                        None => return Ok(()),
                    };
                    let (version, code, reason) = parse_status_line(&line)?;
                    handler.status(version, code, reason);
                    self.state = ParseState::Headers;
                }
                ParseState::Headers => {
                    let line = match Self::take_line(buf)? {
                        Some(l) => l,
                        None => return Ok(()),
                    };
                    if line.is_empty() {
                        self.state = ParseState::HeadersComplete;
                        return Ok(());
                    }
                    let h = Header::parse_line(&line)
                        .ok_or_else(|| HttpError::protocol(format!("malformed header: {}", line)))?;
                    handler.header(h.name(), h.value());
                }
                ParseState::Body => {
                    let to_read = self.remaining.min(buf.len() as u64) as usize;
                    let chunk = buf.split_to(to_read);
                    handler.body_chunk(&chunk);
                    self.remaining -= to_read as u64;
                    if self.remaining == 0 {
                        self.finish(handler);
                        return Ok(());
                    }
                }
                ParseState::ChunkSize => {
                    let line = match Self::take_line(buf)? {
                        Some(l) => l,
                        None => return Ok(()),
                    };
                    let hex_part = line.split(';').next().unwrap_or("").trim();
                    self.remaining = u64::from_str_radix(hex_part, 16)
                        .map_err(|_| HttpError::protocol(format!("invalid chunk size: {}", line)))?;
                    self.state = if self.remaining == 0 {
                        ParseState::ChunkTrailer
                    } else {
                        ParseState::ChunkData
                    };
                }
                ParseState::ChunkData => {
                    let to_read = self.remaining.min(buf.len() as u64) as usize;
                    let chunk = buf.split_to(to_read);
                    handler.body_chunk(&chunk);
                    self.remaining -= to_read as u64;
                    if self.remaining == 0 {
                        self.state = ParseState::ChunkDataEnd;
                    }
                }
                ParseState::ChunkDataEnd => {
                    if buf.len() < 2 {
                        return Ok(());
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(HttpError::protocol("missing CRLF after chunk data"));
                    }
                    buf.advance(2);
                    self.state = ParseState::ChunkSize;
                }
                ParseState::ChunkTrailer => {
                    let line = match Self::take_line(buf)? {
                        Some(l) => l,
                        None => return Ok(()),
                    };
                    if line.is_empty() {
                        self.finish(handler);
                        return Ok(());
                    }
                    if let Some(h) = Header::parse_line(&line) {
                        handler.trailer(h.name(), h.value());
                    }
                }
                ParseState::HeadersComplete | ParseState::Idle => return Ok(()),
            }
        }
        Ok(())
    }

    /// Called after headers are received (state HeadersComplete).
    pub fn set_body_mode<H: H1ResponseHandler>(&mut self, mode: BodyMode, handler: &mut H) {
        if self.state != ParseState::HeadersComplete {
            return;
        }
        match mode {
            BodyMode::Chunked => self.state = ParseState::ChunkSize,
            BodyMode::Length(n) if n > 0 => {
                self.remaining = n;
                self.state = ParseState::Body;
            }
            _ => self.finish(handler),
        }
    }

    fn finish<H: H1ResponseHandler>(&mut self, handler: &mut H) {
        handler.complete();
        self.state = ParseState::Idle;
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// `HTTP/1.1 200 OK` -> ("HTTP/1.1", 200, "OK"). The reason phrase may be empty or contain spaces.
pub fn parse_status_line(line: &str) -> Result<(&str, u16, &str)> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or("");
    if version != "HTTP/1.1" && version != "HTTP/1.0" {
        return Err(HttpError::protocol(format!("unsupported HTTP version in status line: {}", line)));
    }
    let code = parts
        .next()
        .filter(|c| c.len() == 3)
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| HttpError::protocol(format!("malformed status line: {}", line)))?;
    let reason = parts.next().unwrap_or("").trim();
    Ok((version, code, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        status: Option<(String, u16, String)>,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        trailers: Vec<(String, String)>,
        completed: bool,
    }

    impl H1ResponseHandler for Recorder {
        fn status(&mut self, version: &str, code: u16, reason: &str) {
            self.status = Some((version.to_string(), code, reason.to_string()));
        }
        fn header(&mut self, name: &str, value: &str) {
            self.headers.push((name.to_string(), value.to_string()));
        }
        fn body_chunk(&mut self, data: &[u8]) {
            self.body.extend_from_slice(data);
        }
        fn trailer(&mut self, name: &str, value: &str) {
            self.trailers.push((name.to_string(), value.to_string()));
        }
        fn complete(&mut self) {
            self.completed = true;
        }
    }

    /// Feed `input` in pieces of `step` bytes, switching to body mode once headers are done.
    fn run(input: &[u8], step: usize, method: Method) -> Result<(Recorder, BytesMut)> {
        let mut parser = ResponseParser::new();
        let mut rec = Recorder::default();
        let mut buf = BytesMut::new();
        for piece in input.chunks(step) {
            buf.extend_from_slice(piece);
            loop {
                parser.receive(&mut buf, &mut rec)?;
                if parser.state() == ParseState::HeadersComplete {
                    let headers: HeaderSet = rec.headers.iter().cloned().collect();
                    let code = rec.status.as_ref().map(|s| s.1).unwrap_or(0);
                    let mode = body_mode(method, code, &headers)?;
                    parser.set_body_mode(mode, &mut rec);
                    continue;
                }
                break;
            }
            if parser.state() == ParseState::Idle {
                break;
            }
        }
        Ok((rec, buf))
    }

    fn chunked(pieces: &[&[u8]]) -> Vec<u8> {
        let mut out = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
        for p in pieces {
            out.extend_from_slice(format!("{:x}\r\n", p.len()).as_bytes());
            out.extend_from_slice(p);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"0\r\n\r\n");
        out
    }

    #[test]
    fn status_line_variants() {
        assert_eq!(parse_status_line("HTTP/1.1 200 OK").unwrap(), ("HTTP/1.1", 200, "OK"));
        assert_eq!(parse_status_line("HTTP/1.0 404 Not Found").unwrap().2, "Not Found");
        assert_eq!(parse_status_line("HTTP/1.1 204").unwrap().2, "");
        assert!(parse_status_line("HTTP/2 200 OK").is_err());
        assert!(parse_status_line("ICY 200 OK").is_err());
        assert!(parse_status_line("HTTP/1.1 abc OK").is_err());
        assert!(parse_status_line("HTTP/1.1 2000 OK").is_err());
    }

    #[test]
    fn content_length_body() {
        let input = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhelloEXTRA";
        let (rec, rest) = run(input, input.len(), Method::Get).unwrap();
        assert!(rec.completed);
        assert_eq!(rec.body, b"hello");
        assert_eq!(&rest[..], b"EXTRA");
    }

    #[test]
    fn no_framing_means_empty_body_and_nothing_consumed() {
        let input = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\nNEXT";
        let (rec, rest) = run(input, input.len(), Method::Get).unwrap();
        assert!(rec.completed);
        assert!(rec.body.is_empty());
        assert_eq!(&rest[..], b"NEXT");

        let input = b"HTTP/1.1 200 OK\r\nServer: x\r\n\r\nNEXT";
        let (rec, rest) = run(input, input.len(), Method::Get).unwrap();
        assert!(rec.body.is_empty());
        assert_eq!(&rest[..], b"NEXT");
    }

    #[test]
    fn chunked_decode_is_independent_of_boundaries() {
        let payload = b"The quick brown fox jumps over the lazy dog";
        let splits: [&[usize]; 4] = [&[43], &[1, 42], &[10, 10, 10, 13], &[20, 3, 20]];
        for split in splits {
            let mut pieces: Vec<&[u8]> = Vec::new();
            let mut at = 0;
            for n in split {
                pieces.push(&payload[at..at + n]);
                at += n;
            }
            let wire = chunked(&pieces);
            for step in [1, 3, 7, wire.len()] {
                let (rec, rest) = run(&wire, step, Method::Get).unwrap();
                assert!(rec.completed);
                assert_eq!(rec.body, payload.to_vec());
                assert!(rest.is_empty());
            }
        }
    }

    #[test]
    fn chunk_extensions_and_trailers() {
        let input = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3;ext=1\r\nabc\r\n0\r\nX-Sum: 9\r\n\r\n";
        let (rec, _) = run(input, 4, Method::Get).unwrap();
        assert_eq!(rec.body, b"abc");
        assert_eq!(rec.trailers, vec![("X-Sum".to_string(), "9".to_string())]);
    }

    #[test]
    fn chunked_wins_over_content_length() {
        let input = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nok\r\n0\r\n\r\n";
        let (rec, _) = run(input, input.len(), Method::Get).unwrap();
        assert!(rec.completed);
        assert_eq!(rec.body, b"ok");
    }

    #[test]
    fn head_response_has_no_body() {
        let input = b"HTTP/1.1 200 OK\r\nContent-Length: 1234\r\n\r\n";
        let (rec, _) = run(input, input.len(), Method::Head).unwrap();
        assert!(rec.completed);
        assert!(rec.body.is_empty());
    }

    #[test]
    fn framing_errors() {
        let bad_te = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip\r\n\r\nxxxx";
        assert!(matches!(run(bad_te, 64, Method::Get), Err(HttpError::Protocol(_))));
        let bad_cl = b"HTTP/1.1 200 OK\r\nContent-Length: ten\r\n\r\n";
        assert!(matches!(run(bad_cl, 64, Method::Get), Err(HttpError::Protocol(_))));
        let bad_chunk = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n";
        assert!(matches!(run(bad_chunk, 64, Method::Get), Err(HttpError::Protocol(_))));
        let no_crlf = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nokXX0\r\n\r\n";
        assert!(matches!(run(no_crlf, 64, Method::Get), Err(HttpError::Protocol(_))));
    }

    #[test]
    fn serialized_request_headers_reparse() {
        let mut sent = HeaderSet::new();
        sent.append("Host", "example.com:8080")
            .append("Accept", "*/*")
            .append("Cookie", "a=1; b=2")
            .append("X-Empty", "")
            .append("Content-Length", "3");
        let mut wire = String::from("HTTP/1.1 200 OK\r\n");
        sent.write_to(&mut wire);
        wire.push_str("\r\n");

        let mut parser = ResponseParser::new();
        let mut rec = Recorder::default();
        let mut buf = BytesMut::from(wire.as_bytes());
        parser.receive(&mut buf, &mut rec).unwrap();
        assert_eq!(parser.state(), ParseState::HeadersComplete);

        let mut expected: Vec<(String, String)> = sent
            .iter()
            .map(|h| (h.name().to_string(), h.value().to_string()))
            .collect();
        let mut got = rec.headers.clone();
        expected.sort();
        got.sort();
        assert_eq!(expected, got);
    }
}
