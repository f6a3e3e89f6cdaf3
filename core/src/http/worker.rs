/*
 * worker.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Corriere, an embeddable HTTP client.
 *
 * Corriere is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Corriere is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Corriere.  If not, see <http://www.gnu.org/licenses/>.
 */

//! The per-request worker: one blocking thread that drives the HTTP/1.1
//! exchange end to end. Build and send the request, parse status and
//! headers, follow redirects (bounded), then consume the body under chunked,
//! Content-Length, or read-until-close framing — to memory or to a file,
//! resuming a partial file with a Range request when the server cooperates.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::{BufMut, BytesMut};

use crate::error::HttpError;
use crate::http::reader::{hex_to_u64, read_exact, read_line};
use crate::http::request::{Outcome, RequestOptions, Shared, STATE_DONE, STATE_ERROR};
use crate::net::{self, Connection};
use crate::url::{self, ParsedUrl};

const MAX_REDIRECTS: usize = 10;
const USER_AGENT: &str = "Corriere/0.1";
const LOCATION_MAX: usize = 2047;
const FILE_COPY_CHUNK: usize = 4096;

/// Response state built up across the exchange. Kept outside the fallible
/// path so raw headers survive a failure for diagnostics.
#[derive(Default)]
struct Transfer {
    body: BytesMut,
    headers_raw: BytesMut,
    status: u16,
}

/// Thread entry point. Publishes DONE/ERROR with release ordering after all
/// output buffers are final, and hands the outputs back for the join.
pub(crate) fn run(options: RequestOptions, shared: &Shared) -> Outcome {
    shared.uploaded.store(0, Ordering::Relaxed);
    shared.downloaded.store(0, Ordering::Relaxed);
    shared.total.store(-1, Ordering::Relaxed);

    let to_file = options.output_path.is_some();
    let mut transfer = Transfer::default();

    match execute(&options, shared, &mut transfer) {
        Ok(()) => {
            let outcome = Outcome {
                body: if to_file {
                    None
                } else {
                    Some(transfer.body.to_vec())
                },
                status: transfer.status,
                headers_raw: transfer.headers_raw.to_vec(),
                error: None,
            };
            shared.state.store(STATE_DONE, Ordering::Release);
            outcome
        }
        Err(e) => {
            let outcome = Outcome {
                body: None,
                status: 0,
                headers_raw: transfer.headers_raw.to_vec(),
                error: Some(e),
            };
            shared.state.store(STATE_ERROR, Ordering::Release);
            outcome
        }
    }
}

fn execute(
    options: &RequestOptions,
    shared: &Shared,
    transfer: &mut Transfer,
) -> Result<(), HttpError> {
    // Resume probe, before any request: a non-empty existing output file is
    // a candidate for a Range request on the first attempt only.
    let mut resume_offset: i64 = 0;
    if let (Some(path), false) = (&options.output_path, options.override_output) {
        if let Ok(meta) = std::fs::metadata(path) {
            if meta.is_file() && meta.len() > 0 {
                resume_offset = meta.len() as i64;
                eprintln!(
                    "[http] resume: existing file {} is {} bytes",
                    path, resume_offset
                );
            }
        }
    }

    let timeout = if options.timeout_secs > 0.0 {
        Some(Duration::from_secs_f32(options.timeout_secs))
    } else {
        None
    };

    let mut current_url = options.url.clone();
    let mut method = options.method.clone();
    let mut body = options.body.clone();

    for _ in 0..=MAX_REDIRECTS {
        let url = url::parse(&current_url)
            .ok_or_else(|| HttpError::InvalidUrl(current_url.clone()))?;

        if url.https {
            crate::tls::init().map_err(|e| match e {
                HttpError::TlsUnavailable(reason) => HttpError::HttpsUnavailable(reason),
                other => other,
            })?;
        }

        let mut conn = net::connect(&url, timeout)?;

        let mut sendbuf = BytesMut::with_capacity(1024);
        build_request(
            &mut sendbuf,
            &method,
            &url,
            &options.headers,
            resume_offset,
            &body,
        );
        send_all(&mut conn, &sendbuf, shared).map_err(|_| HttpError::SendRequest)?;
        drop(sendbuf);

        let mut line = BytesMut::new();
        if !read_line(&mut conn, &mut line) {
            return Err(HttpError::ReadStatusLine);
        }
        transfer.status = parse_status_code(&line);

        let mut content_length: i64 = -1;
        let mut chunked = false;
        let mut location: Option<String> = None;
        loop {
            if !read_line(&mut conn, &mut line) {
                return Err(HttpError::ReadHeaders);
            }
            if line.is_empty() {
                break;
            }
            transfer.headers_raw.extend_from_slice(&line);
            transfer.headers_raw.put_u8(b'\n');
            scan_header(
                &line,
                &mut content_length,
                &mut chunked,
                &mut location,
                &shared.total,
            );
        }

        if matches!(transfer.status, 301..=303 | 307 | 308) {
            if let Some(loc) = location {
                drop(conn);

                let new_url = if loc.starts_with('/') {
                    rebuild_root_relative(&url, &loc)
                } else {
                    // Anything else is taken as absolute.
                    loc
                };
                eprintln!(
                    "[http] redirect {}: {} -> {}",
                    transfer.status, current_url, new_url
                );
                current_url = new_url;

                // Fresh attempt: discard response state and telemetry, and
                // never carry the resume offset through a redirect.
                transfer.headers_raw.clear();
                transfer.body.clear();
                shared.total.store(-1, Ordering::Relaxed);
                shared.uploaded.store(0, Ordering::Relaxed);
                shared.downloaded.store(0, Ordering::Relaxed);
                resume_offset = 0;

                if transfer.status == 303 {
                    method = "GET".to_string();
                    body.clear();
                }
                continue;
            }
        }

        // Redirects resolved; bind the output file before body bytes flow.
        let mut out_file: Option<File> = None;
        if let Some(path) = &options.output_path {
            if resume_offset > 0 && transfer.status == 206 {
                let file = OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(path)
                    .map_err(|_| HttpError::OpenOutputFile(path.clone()))?;
                // The bytes already on disk count as downloaded, and the
                // advertised length is only the remainder.
                shared
                    .downloaded
                    .store(resume_offset as u64, Ordering::Relaxed);
                if content_length >= 0 {
                    shared
                        .total
                        .store(content_length + resume_offset, Ordering::Relaxed);
                }
                eprintln!(
                    "[http] resuming at offset {} (status 206)",
                    resume_offset
                );
                out_file = Some(file);
            } else {
                if resume_offset > 0 && transfer.status == 200 {
                    eprintln!("[http] server ignored Range, restarting download");
                }
                let file =
                    File::create(path).map_err(|_| HttpError::OpenOutputFile(path.clone()))?;
                resume_offset = 0;
                out_file = Some(file);
            }
        }

        if chunked {
            read_chunked_body(&mut conn, transfer, out_file.as_mut(), shared, &mut line)?;
        } else if content_length >= 0 {
            read_sized_body(
                &mut conn,
                transfer,
                out_file.as_mut(),
                shared,
                content_length as u64,
            )?;
        } else {
            read_until_close(&mut conn, transfer, out_file.as_mut(), shared)?;
        }

        return Ok(());
    }

    Err(HttpError::TooManyRedirects)
}

/// Assemble the request head and body into one buffer, in wire order:
/// request line, Host, User-Agent, Connection: close, caller headers as
/// given, Range when resuming, Content-Length when a body is present, blank
/// line, body bytes.
fn build_request(
    sendbuf: &mut BytesMut,
    method: &str,
    url: &ParsedUrl,
    headers: &[(String, String)],
    resume_offset: i64,
    body: &[u8],
) {
    sendbuf.extend_from_slice(method.as_bytes());
    sendbuf.put_u8(b' ');
    sendbuf.extend_from_slice(url.path.as_bytes());
    sendbuf.extend_from_slice(b" HTTP/1.1\r\n");

    sendbuf.extend_from_slice(b"Host: ");
    sendbuf.extend_from_slice(url.host.as_bytes());
    sendbuf.extend_from_slice(b"\r\n");

    sendbuf.extend_from_slice(b"User-Agent: ");
    sendbuf.extend_from_slice(USER_AGENT.as_bytes());
    sendbuf.extend_from_slice(b"\r\n");

    // One request per connection; no reuse.
    sendbuf.extend_from_slice(b"Connection: close\r\n");

    for (name, value) in headers {
        sendbuf.extend_from_slice(name.as_bytes());
        sendbuf.extend_from_slice(b": ");
        sendbuf.extend_from_slice(value.as_bytes());
        sendbuf.extend_from_slice(b"\r\n");
    }

    if resume_offset > 0 {
        sendbuf.extend_from_slice(format!("Range: bytes={}-\r\n", resume_offset).as_bytes());
    }

    if !body.is_empty() {
        sendbuf.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }

    sendbuf.extend_from_slice(b"\r\n");

    if !body.is_empty() {
        sendbuf.extend_from_slice(body);
    }
}

/// Drain `data` into the connection, crediting sent bytes as upload
/// progress.
fn send_all(conn: &mut Connection, data: &[u8], shared: &Shared) -> std::io::Result<()> {
    let mut sent = 0;
    while sent < data.len() {
        let n = conn.write(&data[sent..])?;
        if n == 0 {
            return Err(std::io::ErrorKind::WriteZero.into());
        }
        sent += n;
        shared.uploaded.fetch_add(n as u64, Ordering::Relaxed);
    }
    Ok(())
}

/// Parse the status code out of `HTTP/x.y NNN reason`: skip the first
/// space-delimited token, then take the leading decimal digits (none ⇒ 0).
fn parse_status_code(line: &[u8]) -> u16 {
    let mut i = 0;
    while i < line.len() && line[i] != b' ' {
        i += 1;
    }
    while i < line.len() && line[i] == b' ' {
        i += 1;
    }
    let mut code: u32 = 0;
    while i < line.len() && line[i].is_ascii_digit() {
        code = code.saturating_mul(10).saturating_add((line[i] - b'0') as u32);
        i += 1;
    }
    code.min(u16::MAX as u32) as u16
}

/// Signed decimal prefix parse with strtoll's shape: leading whitespace,
/// optional sign, digits; anything else ends the number (none ⇒ 0).
fn parse_i64_prefix(s: &[u8]) -> i64 {
    let mut i = 0;
    while i < s.len() && (s[i] == b' ' || s[i] == b'\t') {
        i += 1;
    }
    let negative = if i < s.len() && (s[i] == b'-' || s[i] == b'+') {
        let neg = s[i] == b'-';
        i += 1;
        neg
    } else {
        false
    };
    let mut val: i64 = 0;
    while i < s.len() && s[i].is_ascii_digit() {
        val = val
            .saturating_mul(10)
            .saturating_add((s[i] - b'0') as i64);
        i += 1;
    }
    if negative {
        -val
    } else {
        val
    }
}

fn contains_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}

/// Detect the three load-bearing headers by exact name length and ASCII
/// case-insensitive equality; everything else is stored raw only. A parsed
/// Content-Length is published to the progress total as it is seen.
fn scan_header(
    line: &[u8],
    content_length: &mut i64,
    chunked: &mut bool,
    location: &mut Option<String>,
    total: &std::sync::atomic::AtomicI64,
) {
    let colon = match line.iter().position(|&b| b == b':') {
        Some(i) => i,
        None => return,
    };
    let name = &line[..colon];
    let mut value = &line[colon + 1..];
    while value.first() == Some(&b' ') {
        value = &value[1..];
    }

    match name.len() {
        14 if name.eq_ignore_ascii_case(b"content-length") => {
            *content_length = parse_i64_prefix(value);
            total.store(*content_length, Ordering::Relaxed);
        }
        17 if name.eq_ignore_ascii_case(b"transfer-encoding") => {
            if contains_ignore_ascii_case(value, b"chunked") {
                *chunked = true;
            }
        }
        8 if name.eq_ignore_ascii_case(b"location") => {
            let mut loc = String::from_utf8_lossy(value).into_owned();
            if loc.len() > LOCATION_MAX {
                let mut cut = LOCATION_MAX;
                while !loc.is_char_boundary(cut) {
                    cut -= 1;
                }
                loc.truncate(cut);
            }
            *location = Some(loc);
        }
        _ => {}
    }
}

/// Rewrite a root-relative Location against the current scheme, host, and
/// port; the port is omitted iff it is the scheme default.
fn rebuild_root_relative(url: &ParsedUrl, location: &str) -> String {
    let scheme = if url.https { "https://" } else { "http://" };
    if url.is_default_port() {
        format!("{}{}{}", scheme, url.host, location)
    } else {
        format!("{}{}:{}{}", scheme, url.host, url.port, location)
    }
}

/// Copy exactly `remaining` body bytes from the connection into the file.
fn copy_to_file(
    conn: &mut Connection,
    file: &mut File,
    mut remaining: u64,
    shared: &Shared,
    read_error: HttpError,
) -> Result<(), HttpError> {
    let mut buf = [0u8; FILE_COPY_CHUNK];
    while remaining > 0 {
        let want = remaining.min(FILE_COPY_CHUNK as u64) as usize;
        let n = match conn.read(&mut buf[..want]) {
            Ok(n) if n > 0 => n,
            _ => return Err(read_error),
        };
        file.write_all(&buf[..n])
            .map_err(|_| HttpError::WriteOutputFile)?;
        shared.downloaded.fetch_add(n as u64, Ordering::Relaxed);
        remaining -= n as u64;
    }
    Ok(())
}

/// Chunked framing: hex size line, data, CRLF, repeated; a zero-size chunk
/// plus one trailer line ends the body. A failed read at a chunk boundary
/// ends the loop quietly — only failed chunk data reads are errors.
fn read_chunked_body(
    conn: &mut Connection,
    transfer: &mut Transfer,
    mut out_file: Option<&mut File>,
    shared: &Shared,
    line: &mut BytesMut,
) -> Result<(), HttpError> {
    loop {
        if !read_line(conn, line) {
            return Ok(());
        }
        let chunk_size = hex_to_u64(line);
        if chunk_size == 0 {
            read_line(conn, line);
            return Ok(());
        }
        match out_file.as_deref_mut() {
            Some(file) => {
                copy_to_file(conn, file, chunk_size, shared, HttpError::ReadChunkedBody)?
            }
            None => {
                if !read_exact(conn, &mut transfer.body, chunk_size, Some(&shared.downloaded)) {
                    return Err(HttpError::ReadChunkedBody);
                }
            }
        }
        // Data is followed by its own CRLF; tolerate its absence at EOF.
        read_line(conn, line);
    }
}

/// Content-Length framing: exactly `length` bytes.
fn read_sized_body(
    conn: &mut Connection,
    transfer: &mut Transfer,
    out_file: Option<&mut File>,
    shared: &Shared,
    length: u64,
) -> Result<(), HttpError> {
    match out_file {
        Some(file) => copy_to_file(conn, file, length, shared, HttpError::ReadBody),
        None => {
            if !read_exact(conn, &mut transfer.body, length, Some(&shared.downloaded)) {
                return Err(HttpError::ReadBody);
            }
            Ok(())
        }
    }
}

/// No framing at all: the body is whatever arrives until the peer closes.
fn read_until_close(
    conn: &mut Connection,
    transfer: &mut Transfer,
    mut out_file: Option<&mut File>,
    shared: &Shared,
) -> Result<(), HttpError> {
    let mut buf = [0u8; FILE_COPY_CHUNK];
    loop {
        let n = match conn.read(&mut buf) {
            Ok(n) if n > 0 => n,
            _ => return Ok(()),
        };
        match out_file.as_deref_mut() {
            Some(file) => file
                .write_all(&buf[..n])
                .map_err(|_| HttpError::WriteOutputFile)?,
            None => transfer.body.extend_from_slice(&buf[..n]),
        }
        shared.downloaded.fetch_add(n as u64, Ordering::Relaxed);
    }
}
