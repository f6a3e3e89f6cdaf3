/*
 * lib.rs
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

//! Corriere: an embeddable HTTP/1.1 client with opportunistic HTTPS.
//!
//! Built for interactive hosts (game engines, tooling) that issue network
//! requests without blocking their main loop: each request runs on its own
//! worker thread behind a poll-friendly handle, downloads can stream to a
//! file and resume across runs, and HTTPS needs no link-time TLS library —
//! SChannel on Windows, OpenSSL loaded at runtime elsewhere. When no TLS
//! backend is usable, https submissions fail with a clear error and plain
//! http keeps working.
//!
//! ```no_run
//! use corriere_core::{submit, RequestOptions};
//!
//! let mut handle = submit(RequestOptions::new("http://example.com/"));
//! while !handle.done() {
//!     let p = handle.progress();
//!     eprintln!("{} of {} bytes", p.downloaded, p.total);
//! }
//! let result = handle.result();
//! assert_eq!(result.status, 200);
//! ```

pub mod error;
pub mod http;
pub mod net;
pub mod tls;
pub mod url;

pub use error::HttpError;
pub use http::{submit, HttpResult, Progress, RequestHandle, RequestOptions};

/// True when HTTPS requests can be attempted on this build/host. Performs
/// the backend's lazy init on first call, like a request pre-flight would.
pub fn tls_available() -> bool {
    tls::available()
}

/// Release process-wide state: the TLS backend/credentials, and on Windows
/// the socket subsystem iff this module initialized it. Safe to call when no
/// request was ever issued; in-flight workers keep what they hold until they
/// finish.
pub fn shutdown() {
    tls::shutdown();
    #[cfg(windows)]
    net::winsock::shutdown();
}
