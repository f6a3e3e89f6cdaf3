/*
 * mod.rs
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

//! HTTP/1.1 request engine: one worker thread per request, polled through a
//! thread-safe handle.
//!
//! Design:
//! - `submit(options)` spawns the worker and returns a `RequestHandle`.
//! - The worker owns the exchange: request assembly, status/header parse,
//!   redirect loop (301/302/303/307/308, 303 rewrites to GET), body framing
//!   (chunked, Content-Length, read-until-close), optional streaming to a
//!   file with Range-based resume.
//! - Progress is three relaxed atomics; completion is a release-ordered
//!   state word the handle reads with acquire.

mod handle;
mod reader;
mod request;
mod worker;

pub use handle::{submit, HttpResult, RequestHandle};
pub use request::{Progress, RequestOptions};
