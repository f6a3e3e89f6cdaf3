/*
 * error.rs
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

//! Request errors. The Display strings are stable and matched by callers
//! (and by the test suite); do not reword them.

use std::fmt;

/// Everything that can go wrong between submit() and result().
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// Unparseable URL or unsupported scheme.
    InvalidUrl(String),
    /// HTTPS requested but no TLS backend is usable. Carries the backend reason.
    HttpsUnavailable(String),
    /// The runtime-loaded TLS backend could not be set up.
    TlsUnavailable(String),
    /// Socket subsystem init failed (Windows only).
    WsaStartup(i32),
    /// Name resolution failed.
    Resolve {
        host: String,
        port: String,
        reason: String,
    },
    /// TCP connect failed on every resolved address. Carries the last OS error.
    Connect {
        host: String,
        port: String,
        code: i32,
    },
    /// TLS negotiation failed. Carries a backend-specific code or reason.
    TlsHandshake(String),
    /// The bounded handshake loop ran out of iterations.
    TlsHandshakeTimeout,
    /// send_all could not drain the request buffer.
    SendRequest,
    ReadStatusLine,
    ReadHeaders,
    ReadBody,
    ReadChunkedBody,
    OpenOutputFile(String),
    WriteOutputFile,
    TooManyRedirects,
    /// Handle contract: non-blocking result probe while the worker runs.
    StillInProgress,
    /// Handle contract: result() called a second time.
    AlreadyConsumed,
    /// Anything without a dedicated variant (TLS session setup, worker panic).
    Message(String),
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::InvalidUrl(url) => write!(f, "invalid URL: {}", url),
            HttpError::HttpsUnavailable(reason) => {
                write!(f, "HTTPS not available ({})", reason)
            }
            HttpError::TlsUnavailable(reason) => write!(f, "TLS not available ({})", reason),
            HttpError::WsaStartup(code) => write!(f, "WSAStartup failed: {}", code),
            HttpError::Resolve { host, port, reason } => {
                write!(f, "getaddrinfo({}:{}) failed: {}", host, port, reason)
            }
            HttpError::Connect { host, port, code } => {
                write!(f, "connect({}:{}) failed: {}", host, port, code)
            }
            HttpError::TlsHandshake(code) => write!(f, "TLS handshake failed: {}", code),
            HttpError::TlsHandshakeTimeout => {
                write!(f, "TLS handshake timeout (too many iterations)")
            }
            HttpError::SendRequest => write!(f, "failed to send request"),
            HttpError::ReadStatusLine => write!(f, "failed to read status line"),
            HttpError::ReadHeaders => write!(f, "failed to read headers"),
            HttpError::ReadBody => write!(f, "failed to read body"),
            HttpError::ReadChunkedBody => write!(f, "failed to read chunked body"),
            HttpError::OpenOutputFile(path) => {
                write!(f, "failed to open output file: {}", path)
            }
            HttpError::WriteOutputFile => write!(f, "failed to write output file"),
            HttpError::TooManyRedirects => write!(f, "too many redirects (max 10)"),
            HttpError::StillInProgress => write!(f, "request still in progress"),
            HttpError::AlreadyConsumed => write!(f, "request already consumed"),
            HttpError::Message(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for HttpError {}
