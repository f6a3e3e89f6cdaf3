/*
 * request.rs
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

//! Request inputs and the shared per-request state the worker publishes
//! through: three relaxed progress counters and the RUNNING/DONE/ERROR word
//! (release on store, acquire on load).

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};

use crate::error::HttpError;

pub(crate) const STATE_RUNNING: u8 = 0;
pub(crate) const STATE_DONE: u8 = 1;
pub(crate) const STATE_ERROR: u8 = 2;

/// Everything a request needs, fixed at submit(). Headers keep caller order
/// and are sent as given, without de-duplication.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Applied as the socket read/write timeout; 0 disables.
    pub timeout_secs: f32,
    /// Stream the response body to this file instead of memory.
    pub output_path: Option<String>,
    /// Discard an existing output file instead of attempting a resume.
    pub override_output: bool,
}

impl RequestOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: Vec::new(),
            body: Vec::new(),
            timeout_secs: 30.0,
            output_path: None,
            override_output: false,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn timeout_secs(mut self, secs: f32) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn override_output(mut self, override_output: bool) -> Self {
        self.override_output = override_output;
        self
    }
}

/// Non-blocking progress snapshot. Values may lag the worker but each is
/// individually coherent; `total` is −1 until a Content-Length is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub uploaded: u64,
    pub downloaded: u64,
    pub total: i64,
}

/// State shared between a worker and its handle.
pub(crate) struct Shared {
    pub state: AtomicU8,
    pub uploaded: AtomicU64,
    pub downloaded: AtomicU64,
    pub total: AtomicI64,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_RUNNING),
            uploaded: AtomicU64::new(0),
            downloaded: AtomicU64::new(0),
            total: AtomicI64::new(-1),
        }
    }

    pub fn snapshot(&self) -> Progress {
        Progress {
            uploaded: self.uploaded.load(Ordering::Relaxed),
            downloaded: self.downloaded.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
        }
    }
}

/// What the worker hands back at join time. Buffer ownership moves to the
/// caller here; nothing else ever writes these.
pub(crate) struct Outcome {
    pub body: Option<Vec<u8>>,
    pub status: u16,
    pub headers_raw: Vec<u8>,
    pub error: Option<HttpError>,
}
