/*
 * transport.rs
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

//! One request/response exchange over an already-open connection.
//!
//! Serializes the request head, runs the `Expect: 100-continue` handshake when there is a
//! payload, streams the payload, then drives the HTTP/1.1 push parser until the final
//! response is complete. Interim 1xx responses are skipped. The body goes to memory or is
//! streamed to a file, as chosen by the caller once the head is known.

use bytes::BytesMut;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace};

use crate::protocol::http::connection::{HttpConnection, IO_CHUNK};
use crate::protocol::http::error::{HttpError, Result};
use crate::protocol::http::h1::{body_mode, H1ResponseHandler, ParseState, ResponseParser};
use crate::protocol::http::header::{self, HeaderSet};
use crate::protocol::http::request::{Method, Payload, Request};
use crate::protocol::http::response::{Body, BodySink, Response, ResponseHead};
use crate::protocol::http::status::{self, StatusClass};

/// Values the client adds to every request on top of the caller's headers.
#[derive(Debug, Clone, Default)]
pub struct ExchangeContext<'a> {
    pub user_agent: Option<&'a str>,
    /// Jar-derived `name=value; ...` list; empty when no cookie applies.
    pub cookies: &'a str,
}

/// Result of an exchange: the final response and whether the connection may go back to the pool.
#[derive(Debug)]
pub struct Exchange {
    pub response: Response,
    pub reusable: bool,
}

/// Collects parser events for one response.
#[derive(Default)]
struct Collector {
    head: ResponseHead,
    body: BytesMut,
    trailers: HeaderSet,
}

impl Collector {
    fn reset(&mut self) {
        *self = Collector::default();
    }
}

impl H1ResponseHandler for Collector {
    fn status(&mut self, version: &str, code: u16, reason: &str) {
        self.head.version = version.to_string();
        self.head.code = code;
        self.head.reason = reason.to_string();
    }

    fn header(&mut self, name: &str, value: &str) {
        self.head.headers.append(name, value);
    }

    fn body_chunk(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    fn trailer(&mut self, name: &str, value: &str) {
        self.trailers.append(name, value);
    }

    fn complete(&mut self) {}
}

/// Run `req` on `conn`. `choose_sink` sees the final response head and picks where the body goes.
///
/// Any error leaves the connection in an unknown state; the caller must discard it.
pub async fn execute<F>(
    conn: &mut HttpConnection,
    req: &Request,
    ctx: &ExchangeContext<'_>,
    choose_sink: F,
) -> Result<Exchange>
where
    F: FnOnce(&ResponseHead) -> BodySink,
{
    let payload_len = req.payload.len().await?;
    let headers = request_headers(req, ctx, payload_len);
    let expect_continue = payload_len > 0;

    let mut head = format!("{} {} HTTP/1.1\r\n", req.method, req.url.request_target());
    headers.write_to(&mut head);
    head.push_str("\r\n");
    debug!("{} {} on connection {}", req.method, req.url, conn.id());
    trace!("request head:\n{}", head);
    conn.write_all(head.as_bytes()).await?;

    let mut parser = ResponseParser::new();
    let mut collector = Collector::default();

    if expect_continue {
        conn.flush().await?;
        if !read_head(conn, &mut parser, &mut collector, true).await? {
            // Server answered without 100: that answer is final and the payload was never sent.
            debug!(
                "expectation answered with {} by {}; payload not sent",
                collector.head.code,
                conn.key()
            );
            let response = read_body(conn, req, &mut parser, &mut collector, choose_sink).await?;
            return Ok(Exchange {
                response,
                reusable: false,
            });
        }
    }
    send_payload(conn, &req.payload).await?;
    conn.flush().await?;

    read_head(conn, &mut parser, &mut collector, false).await?;
    let response = read_body(conn, req, &mut parser, &mut collector, choose_sink).await?;
    let leftover = conn.read_buf().len();
    let reusable = keeps_alive(&response, &headers)
        && is_delimited(req, &response)
        && leftover == 0;
    if leftover > 0 {
        trace!("{} unread bytes after response from {}", leftover, conn.key());
    }
    conn.mark_served();
    debug!(
        "{} {} -> {} {} (reusable: {})",
        req.method, req.url, response.code, response.reason, reusable
    );
    Ok(Exchange { response, reusable })
}

/// Wire headers: Host first, then the caller's, then User-Agent, Content-Length, Cookie and
/// Expect as they apply. Injected values replace caller values of the same name.
fn request_headers(req: &Request, ctx: &ExchangeContext<'_>, payload_len: u64) -> HeaderSet {
    let mut headers = HeaderSet::new();
    if !req.headers.contains(header::HOST) {
        headers.append(header::HOST, req.url.host_header());
    }
    for h in &req.headers {
        headers.append(h.name(), h.value());
    }
    if let Some(agent) = ctx.user_agent {
        if !headers.contains(header::USER_AGENT) {
            headers.append(header::USER_AGENT, agent);
        }
    }
    if payload_len > 0 || req.method.expects_payload() {
        headers.remove(header::TRANSFER_ENCODING);
        headers.set(header::CONTENT_LENGTH, payload_len.to_string());
    } else {
        headers.remove(header::CONTENT_LENGTH);
    }
    if !ctx.cookies.is_empty() {
        let merged = match req.headers.get(header::COOKIE) {
            Some(own) if !own.trim().is_empty() => format!("{}; {}", own, ctx.cookies),
            _ => ctx.cookies.to_string(),
        };
        headers.set(header::COOKIE, merged);
    }
    if payload_len > 0 {
        headers.set(header::EXPECT, "100-continue");
    } else {
        headers.remove(header::EXPECT);
    }
    headers
}

/// Stream the payload in `IO_CHUNK` pieces.
async fn send_payload(conn: &mut HttpConnection, payload: &Payload) -> Result<()> {
    match payload {
        Payload::Empty => Ok(()),
        Payload::Bytes(bytes) => {
            for chunk in bytes.chunks(IO_CHUNK) {
                conn.write_all(chunk).await?;
            }
            Ok(())
        }
        Payload::File(path) => {
            let payload_err = |source| HttpError::Payload {
                path: path.clone(),
                source,
            };
            let mut file = File::open(path).await.map_err(payload_err)?;
            let mut buf = vec![0u8; IO_CHUNK];
            loop {
                let n = file.read(&mut buf).await.map_err(payload_err)?;
                if n == 0 {
                    return Ok(());
                }
                conn.write_all(&buf[..n]).await?;
            }
        }
    }
}

/// Read until a non-interim response head has been parsed.
///
/// Interim 1xx heads are discarded. With `until_continue`, a 100 ends the wait early and the
/// function returns true; otherwise it returns false once a final head is in `collector`.
async fn read_head(
    conn: &mut HttpConnection,
    parser: &mut ResponseParser,
    collector: &mut Collector,
    until_continue: bool,
) -> Result<bool> {
    loop {
        parser.receive(conn.read_buf(), collector)?;
        if parser.state() != ParseState::HeadersComplete {
            conn.fill().await?;
            continue;
        }
        let code = collector.head.code;
        if StatusClass::of(code) != Some(StatusClass::Informational)
            || code == status::SWITCHING_PROTOCOLS
        {
            return Ok(false);
        }
        trace!("interim {} from {}", code, conn.key());
        parser.reset();
        collector.reset();
        if code == status::CONTINUE && until_continue {
            return Ok(true);
        }
    }
}

/// Read the body of the head already in `collector` and assemble the response.
async fn read_body<F>(
    conn: &mut HttpConnection,
    req: &Request,
    parser: &mut ResponseParser,
    collector: &mut Collector,
    choose_sink: F,
) -> Result<Response>
where
    F: FnOnce(&ResponseHead) -> BodySink,
{
    let mode = body_mode(req.method, collector.head.code, &collector.head.headers)?;
    let sink = choose_sink(&collector.head);
    let mut file = match &sink {
        BodySink::Memory => None,
        BodySink::File(path) => Some((
            path,
            File::create(path).await.map_err(|source| HttpError::Output {
                path: path.clone(),
                source,
            })?,
        )),
    };

    parser.set_body_mode(mode, collector);
    loop {
        parser.receive(conn.read_buf(), collector)?;
        if let Some((path, f)) = file.as_mut() {
            if !collector.body.is_empty() {
                f.write_all(&collector.body)
                    .await
                    .map_err(|source| HttpError::Output {
                        path: path.to_path_buf(),
                        source,
                    })?;
                collector.body.clear();
            }
        }
        if parser.state() == ParseState::Idle {
            break;
        }
        conn.fill().await?;
    }

    let body = match file {
        Some((path, mut f)) => {
            f.flush().await.map_err(|source| HttpError::Output {
                path: path.clone(),
                source,
            })?;
            Body::File(path.clone())
        }
        None => Body::Memory(collector.body.split().freeze()),
    };
    let mut head = std::mem::take(&mut collector.head);
    for t in &collector.trailers {
        head.headers.append(t.name(), t.value());
    }
    Ok(Response::new(head, body))
}

/// Keep-alive unless either side said close, or the server speaks HTTP/1.0 without keep-alive.
fn keeps_alive(response: &Response, sent: &HeaderSet) -> bool {
    if response.code == status::SWITCHING_PROTOCOLS
        || sent.has_token(header::CONNECTION, "close")
        || response.headers.has_token(header::CONNECTION, "close")
    {
        return false;
    }
    response.version != "HTTP/1.0" || response.headers.has_token(header::CONNECTION, "keep-alive")
}

/// Whether the end of the body was known from the message itself. A response with neither
/// Content-Length nor Transfer-Encoding could be followed by more bytes, so its connection
/// is not reused.
fn is_delimited(req: &Request, response: &Response) -> bool {
    req.method == Method::Head
        || status::is_bodiless(response.code)
        || response.headers.contains(header::CONTENT_LENGTH)
        || response.headers.contains(header::TRANSFER_ENCODING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::connection::PoolKey;
    use crate::uri::{Scheme, Url};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accept one connection; read the request head, send `interim` (if any), read
    /// Content-Length bytes of body, then write `reply`. Returns head and body as received.
    async fn serve_once(interim: Option<&'static [u8]>, reply: &'static [u8]) -> (u16, JoinHandle<(String, Vec<u8>)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(sock);
            let mut head = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                head.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("Content-Length: "))
                .map(|v| v.trim().parse::<usize>().unwrap())
                .unwrap_or(0);
            let mut body = vec![0u8; len];
            if let Some(interim) = interim {
                reader.get_mut().write_all(interim).await.unwrap();
                if interim.starts_with(b"HTTP/1.1 100") {
                    reader.read_exact(&mut body).await.unwrap();
                } else {
                    body.clear();
                }
            } else {
                reader.read_exact(&mut body).await.unwrap();
            }
            reader.get_mut().write_all(reply).await.unwrap();
            (head, body)
        });
        (port, handle)
    }

    async fn connect(port: u16) -> HttpConnection {
        HttpConnection::open(PoolKey::new(Scheme::Http, "127.0.0.1", port), Duration::from_secs(5))
            .await
            .unwrap()
    }

    fn request(method: Method, port: u16, path: &str) -> Request {
        Request::new(method, Url::parse(&format!("http://127.0.0.1:{}{}", port, path)).unwrap())
    }

    #[tokio::test]
    async fn get_with_injected_headers() {
        let (port, server) = serve_once(None, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi").await;
        let mut conn = connect(port).await;
        let mut req = request(Method::Get, port, "/a?x=1");
        req.header("Cookie", "own=1");
        let ctx = ExchangeContext {
            user_agent: Some("postino-test"),
            cookies: "jar=2",
        };
        let ex = execute(&mut conn, &req, &ctx, |_| BodySink::Memory).await.unwrap();
        assert_eq!(ex.response.code, 200);
        assert_eq!(ex.response.text(), "hi");
        assert!(ex.reusable);
        assert_eq!(conn.served(), 1);

        let (head, _) = server.await.unwrap();
        assert!(head.starts_with("GET /a?x=1 HTTP/1.1\r\nHost: 127.0.0.1:"));
        assert!(head.contains("User-Agent: postino-test\r\n"));
        assert!(head.contains("Cookie: own=1; jar=2\r\n"));
        assert!(!head.contains("Content-Length"));
        assert!(!head.contains("Expect"));
    }

    #[tokio::test]
    async fn empty_post_sends_zero_length() {
        let (port, server) = serve_once(None, b"HTTP/1.1 204 No Content\r\nContent-Length: 7\r\n\r\n").await;
        let mut conn = connect(port).await;
        let req = request(Method::Post, port, "/");
        let ex = execute(&mut conn, &req, &ExchangeContext::default(), |_| BodySink::Memory)
            .await
            .unwrap();
        assert_eq!(ex.response.code, 204);
        assert!(ex.response.body_bytes().unwrap().is_empty());
        let (head, _) = server.await.unwrap();
        assert!(head.contains("Content-Length: 0\r\n"));
    }

    #[tokio::test]
    async fn expect_continue_then_payload() {
        let (port, server) = serve_once(
            Some(b"HTTP/1.1 100 Continue\r\n\r\n"),
            b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n",
        )
        .await;
        let mut conn = connect(port).await;
        let mut req = request(Method::Put, port, "/up");
        req.payload("abc");
        let ex = execute(&mut conn, &req, &ExchangeContext::default(), |_| BodySink::Memory)
            .await
            .unwrap();
        assert_eq!(ex.response.code, 201);
        assert!(ex.reusable);
        let (head, body) = server.await.unwrap();
        assert!(head.contains("Expect: 100-continue\r\n"));
        assert!(head.contains("Content-Length: 3\r\n"));
        assert_eq!(body, b"abc");
    }

    #[tokio::test]
    async fn expectation_refused_is_final() {
        let (port, server) = serve_once(
            Some(b"HTTP/1.1 417 Expectation Failed\r\nContent-Length: 4\r\n\r\nnope"),
            b"",
        )
        .await;
        let mut conn = connect(port).await;
        let mut req = request(Method::Post, port, "/");
        req.payload("data");
        let ex = execute(&mut conn, &req, &ExchangeContext::default(), |_| BodySink::Memory)
            .await
            .unwrap();
        assert_eq!(ex.response.code, status::EXPECTATION_FAILED);
        assert_eq!(ex.response.text(), "nope");
        assert!(!ex.reusable);
        let (_, body) = server.await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn interim_responses_are_skipped() {
        let (port, _server) = serve_once(
            None,
            b"HTTP/1.1 102 Processing\r\n\r\nHTTP/1.1 103 Early Hints\r\nLink: </a>\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
        )
        .await;
        let mut conn = connect(port).await;
        let req = request(Method::Get, port, "/");
        let ex = execute(&mut conn, &req, &ExchangeContext::default(), |_| BodySink::Memory)
            .await
            .unwrap();
        assert_eq!(ex.response.code, 200);
        assert!(ex.response.header("Link").is_none());
        assert_eq!(ex.response.text(), "ok");
    }

    #[tokio::test]
    async fn chunked_body_to_file_with_trailers() {
        let (port, _server) = serve_once(
            None,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\nX-Done: yes\r\n\r\n",
        )
        .await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("body.txt");
        let mut conn = connect(port).await;
        let req = request(Method::Get, port, "/");
        let target = out.clone();
        let ex = execute(&mut conn, &req, &ExchangeContext::default(), move |head| {
            assert_eq!(head.code, 200);
            BodySink::File(target)
        })
        .await
        .unwrap();
        assert_eq!(ex.response.body_file(), Some(out.as_path()));
        assert_eq!(ex.response.header("X-Done"), Some("yes"));
        assert_eq!(std::fs::read(&out).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn http10_and_close_are_not_reusable() {
        let (port, _s) = serve_once(None, b"HTTP/1.0 200 OK\r\nContent-Length: 0\r\n\r\n").await;
        let mut conn = connect(port).await;
        let req = request(Method::Get, port, "/");
        let ex = execute(&mut conn, &req, &ExchangeContext::default(), |_| BodySink::Memory)
            .await
            .unwrap();
        assert!(!ex.reusable);

        let (port, _s) = serve_once(None, b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n").await;
        let mut conn = connect(port).await;
        let req = request(Method::Head, port, "/");
        let ex = execute(&mut conn, &req, &ExchangeContext::default(), |_| BodySink::Memory)
            .await
            .unwrap();
        assert!(!ex.reusable);
    }

    #[tokio::test]
    async fn surplus_bytes_make_connection_unusable() {
        let (port, _s) = serve_once(None, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nokEXTRA").await;
        let mut conn = connect(port).await;
        let req = request(Method::Get, port, "/");
        let ex = execute(&mut conn, &req, &ExchangeContext::default(), |_| BodySink::Memory)
            .await
            .unwrap();
        assert_eq!(ex.response.text(), "ok");
        assert!(!ex.reusable);

        let (port, _s) = serve_once(None, b"HTTP/1.1 200 OK\r\nServer: x\r\n\r\n").await;
        let mut conn = connect(port).await;
        let req = request(Method::Get, port, "/");
        let ex = execute(&mut conn, &req, &ExchangeContext::default(), |_| BodySink::Memory)
            .await
            .unwrap();
        assert!(ex.response.body_bytes().unwrap().is_empty());
        assert!(!ex.reusable);
    }

    #[tokio::test]
    async fn malformed_status_line_is_protocol_error() {
        let (port, _s) = serve_once(None, b"HTTP/9 200 OK\r\n\r\n").await;
        let mut conn = connect(port).await;
        let req = request(Method::Get, port, "/");
        let err = execute(&mut conn, &req, &ExchangeContext::default(), |_| BodySink::Memory)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Protocol(_)));
    }

    #[test]
    fn transfer_encoding_dropped_when_length_is_known() {
        let url = Url::parse("http://h/").unwrap();
        let mut req = Request::new(Method::Post, url);
        req.header("Transfer-Encoding", "chunked").header("Content-Length", "99");
        let headers = request_headers(&req, &ExchangeContext::default(), 4);
        assert!(!headers.contains("Transfer-Encoding"));
        assert_eq!(headers.get("content-length"), Some("4"));
        assert_eq!(headers.get("Expect"), Some("100-continue"));
        assert_eq!(headers.iter().next().map(|h| h.name()), Some("Host"));
    }
}
