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

//! C FFI for corriere core. Requests are opaque handles created by
//! corriere_request_submit and released with corriere_request_free (which
//! joins the worker). All string parameters are UTF-8 NUL-terminated.
//! Returned strings are freed with corriere_free_string, returned body
//! buffers with corriere_free_bytes. Out-parameters may be NULL when the
//! caller does not want that value.

use libc::{c_char, c_float, c_int, size_t};
use std::ffi::{CStr, CString};
use std::ptr;

use corriere_core::{submit, RequestHandle, RequestOptions};

/// Opaque request handle.
pub struct CorriereRequest {
    handle: RequestHandle,
}

unsafe fn opt_str(s: *const c_char) -> Option<String> {
    if s.is_null() {
        None
    } else {
        CStr::from_ptr(s).to_str().ok().map(str::to_owned)
    }
}

/// NUL bytes cannot survive a C string; strip them rather than fail.
fn to_c_string(bytes: Vec<u8>) -> CString {
    match CString::new(bytes) {
        Ok(s) => s,
        Err(e) => {
            let mut bytes = e.into_vec();
            bytes.retain(|&b| b != 0);
            CString::new(bytes).unwrap_or_default()
        }
    }
}

fn bytes_into_raw(bytes: Vec<u8>) -> (*mut u8, size_t) {
    let mut boxed = bytes.into_boxed_slice();
    let ptr = boxed.as_mut_ptr();
    let len = boxed.len();
    std::mem::forget(boxed);
    (ptr, len)
}

/// Module open. Nothing to install on the C side; present so hosts can pair
/// it with corriere_shutdown.
#[no_mangle]
pub extern "C" fn corriere_open() {}

/// Release process-wide state (TLS backend, socket subsystem where this
/// module initialized it). Safe with no requests ever issued.
#[no_mangle]
pub extern "C" fn corriere_shutdown() {
    corriere_core::shutdown();
}

/// 1 when HTTPS requests can be attempted, 0 otherwise.
#[no_mangle]
pub extern "C" fn corriere_tls_available() -> c_int {
    corriere_core::tls_available() as c_int
}

/// Submit a request. `url` is required; `method` defaults to GET when NULL;
/// `header_names`/`header_values` are parallel arrays of `header_count`
/// entries sent in order; `body` may be NULL when `body_len` is 0;
/// `timeout_secs` <= 0 disables the socket timeout; `output_path` (optional)
/// streams the body to a file, resuming unless `override_output` is
/// non-zero. Returns NULL on invalid arguments.
#[no_mangle]
pub unsafe extern "C" fn corriere_request_submit(
    url: *const c_char,
    method: *const c_char,
    header_names: *const *const c_char,
    header_values: *const *const c_char,
    header_count: size_t,
    body: *const u8,
    body_len: size_t,
    timeout_secs: c_float,
    output_path: *const c_char,
    override_output: c_int,
) -> *mut CorriereRequest {
    let url = match opt_str(url) {
        Some(url) => url,
        None => return ptr::null_mut(),
    };

    let mut options = RequestOptions::new(url)
        .timeout_secs(timeout_secs)
        .override_output(override_output != 0);
    if let Some(method) = opt_str(method) {
        options = options.method(method);
    }
    if let Some(path) = opt_str(output_path) {
        options = options.output_path(path);
    }

    if header_count > 0 {
        if header_names.is_null() || header_values.is_null() {
            return ptr::null_mut();
        }
        for i in 0..header_count {
            let name = opt_str(*header_names.add(i));
            let value = opt_str(*header_values.add(i));
            match (name, value) {
                (Some(name), Some(value)) => options = options.header(name, value),
                _ => return ptr::null_mut(),
            }
        }
    }

    if body_len > 0 {
        if body.is_null() {
            return ptr::null_mut();
        }
        options = options.body(std::slice::from_raw_parts(body, body_len).to_vec());
    }

    Box::into_raw(Box::new(CorriereRequest {
        handle: submit(options),
    }))
}

/// 1 once the request has reached a terminal state. Never blocks.
#[no_mangle]
pub unsafe extern "C" fn corriere_request_done(req: *const CorriereRequest) -> c_int {
    match req.as_ref() {
        Some(req) => req.handle.done() as c_int,
        None => 1,
    }
}

/// Take the result. With `wait` non-zero the call joins the worker; with
/// `wait` zero an unfinished request yields 1 and the error string
/// "request still in progress" without consuming anything. Returns 0 on a
/// completed response (out_error is NULL), -1 on a failed or already
/// consumed request (out_error is set), 1 when still in progress.
///
/// `out_body` is NULL when the body was streamed to a file or on failure;
/// free it with corriere_free_bytes. `out_headers` is the raw header block
/// (one line per header); free it and `out_error` with
/// corriere_free_string.
#[no_mangle]
pub unsafe extern "C" fn corriere_request_result(
    req: *mut CorriereRequest,
    wait: c_int,
    out_body: *mut *mut u8,
    out_body_len: *mut size_t,
    out_status: *mut c_int,
    out_headers: *mut *mut c_char,
    out_error: *mut *mut c_char,
) -> c_int {
    let store_error = |out_error: *mut *mut c_char, message: &str| {
        if !out_error.is_null() {
            *out_error = to_c_string(message.as_bytes().to_vec()).into_raw();
        }
    };

    if !out_body.is_null() {
        *out_body = ptr::null_mut();
    }
    if !out_body_len.is_null() {
        *out_body_len = 0;
    }
    if !out_status.is_null() {
        *out_status = 0;
    }
    if !out_headers.is_null() {
        *out_headers = ptr::null_mut();
    }
    if !out_error.is_null() {
        *out_error = ptr::null_mut();
    }

    let req = match req.as_mut() {
        Some(req) => req,
        None => {
            store_error(out_error, "request already consumed");
            return -1;
        }
    };

    if wait == 0 && !req.handle.done() {
        store_error(out_error, "request still in progress");
        return 1;
    }

    let result = req.handle.result();

    if !out_status.is_null() {
        *out_status = result.status as c_int;
    }
    if !out_headers.is_null() {
        *out_headers = to_c_string(result.headers_raw).into_raw();
    }
    if let Some(error) = result.error {
        store_error(out_error, &error);
        return -1;
    }
    if let Some(body) = result.body {
        let (body_ptr, body_len) = bytes_into_raw(body);
        if !out_body.is_null() {
            *out_body = body_ptr;
            if !out_body_len.is_null() {
                *out_body_len = body_len;
            }
        } else {
            // Caller declined the body; reclaim it.
            corriere_free_bytes(body_ptr, body_len);
        }
    }
    0
}

/// Snapshot the progress counters. `out_total` is -1 while the length is
/// unknown.
#[no_mangle]
pub unsafe extern "C" fn corriere_request_progress(
    req: *const CorriereRequest,
    out_uploaded: *mut u64,
    out_downloaded: *mut u64,
    out_total: *mut i64,
) {
    let (uploaded, downloaded, total) = match req.as_ref() {
        Some(req) => {
            let p = req.handle.progress();
            (p.uploaded, p.downloaded, p.total)
        }
        None => (0, 0, 0),
    };
    if !out_uploaded.is_null() {
        *out_uploaded = uploaded;
    }
    if !out_downloaded.is_null() {
        *out_downloaded = downloaded;
    }
    if !out_total.is_null() {
        *out_total = total;
    }
}

/// Destroy a request: joins the worker and releases everything it owned.
/// NULL is a no-op; a non-NULL pointer must be freed exactly once.
#[no_mangle]
pub unsafe extern "C" fn corriere_request_free(req: *mut CorriereRequest) {
    if !req.is_null() {
        drop(Box::from_raw(req));
    }
}

/// Free a string returned by this library.
#[no_mangle]
pub unsafe extern "C" fn corriere_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Free a body buffer returned by this library.
#[no_mangle]
pub unsafe extern "C" fn corriere_free_bytes(bytes: *mut u8, len: size_t) {
    if !bytes.is_null() {
        drop(Vec::from_raw_parts(bytes, len, len));
    }
}
