/*
 * handle.rs
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

//! The caller-facing handle: submit spawns the worker, `done()` polls
//! without blocking, `result()` joins and consumes the outputs exactly once,
//! `progress()` snapshots the counters. Dropping the handle joins the worker
//! so a request record never outlives its thread.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::HttpError;
use crate::http::request::{Outcome, Progress, RequestOptions, Shared, STATE_RUNNING};
use crate::http::worker;

/// Start a request on its own worker thread and return the handle for it.
pub fn submit(options: RequestOptions) -> RequestHandle {
    let shared = Arc::new(Shared::new());
    let worker_shared = shared.clone();
    let join = thread::spawn(move || worker::run(options, &worker_shared));
    RequestHandle {
        shared,
        join: Some(join),
    }
}

/// The final answer for one request. On failure `error` is set, `status` is
/// 0 and the map is empty; `headers_raw` keeps whatever header lines arrived
/// before the failure, for diagnostics.
#[derive(Debug, Clone)]
pub struct HttpResult {
    /// In-memory body; None when the body went to a file or on error.
    pub body: Option<Vec<u8>>,
    pub status: u16,
    /// Lowercased name → value with leading spaces trimmed. Duplicate
    /// headers collapse last-wins; multi-value consumers parse headers_raw.
    pub headers: HashMap<String, String>,
    /// Verbatim header lines, one per line, as received.
    pub headers_raw: Vec<u8>,
    pub error: Option<String>,
}

/// One in-flight or finished request.
pub struct RequestHandle {
    shared: Arc<Shared>,
    join: Option<JoinHandle<Outcome>>,
}

impl RequestHandle {
    /// True once the worker has published a terminal state. Never blocks,
    /// and never goes back to false.
    pub fn done(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) != STATE_RUNNING
    }

    /// Join the worker (blocking if it is still running) and take the
    /// outputs. A second call gets "request already consumed".
    pub fn result(&mut self) -> HttpResult {
        let join = match self.join.take() {
            Some(join) => join,
            None => return HttpResult::from_error(HttpError::AlreadyConsumed),
        };
        let outcome = match join.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                return HttpResult::from_error(HttpError::Message("worker thread panicked".into()))
            }
        };
        match outcome.error {
            Some(e) => HttpResult {
                body: None,
                status: 0,
                headers: HashMap::new(),
                headers_raw: outcome.headers_raw,
                error: Some(e.to_string()),
            },
            None => HttpResult {
                body: outcome.body,
                status: outcome.status,
                headers: parse_headers(&outcome.headers_raw),
                headers_raw: outcome.headers_raw,
                error: None,
            },
        }
    }

    /// Snapshot of the three progress counters. Non-blocking; values may be
    /// stale but are individually coherent.
    pub fn progress(&self) -> Progress {
        self.shared.snapshot()
    }
}

impl Drop for RequestHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl HttpResult {
    fn from_error(e: HttpError) -> Self {
        HttpResult {
            body: None,
            status: 0,
            headers: HashMap::new(),
            headers_raw: Vec::new(),
            error: Some(e.to_string()),
        }
    }
}

/// Build the headers map from the raw block: one `Name: value` per line,
/// names lowercased, leading value spaces trimmed, last occurrence wins.
pub(crate) fn parse_headers(raw: &[u8]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in raw.split(|&b| b == b'\n') {
        let colon = match line.iter().position(|&b| b == b':') {
            Some(i) => i,
            None => continue,
        };
        let name = String::from_utf8_lossy(&line[..colon]).to_ascii_lowercase();
        let mut value = &line[colon + 1..];
        while value.first() == Some(&b' ') {
            value = &value[1..];
        }
        map.insert(name, String::from_utf8_lossy(value).into_owned());
    }
    map
}
