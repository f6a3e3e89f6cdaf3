/*
 * openssl.rs
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

//! TLS backend for Unix: OpenSSL loaded at runtime through the OS loader.
//! Nothing links against libssl; if the libraries or required entry points
//! are missing, HTTPS requests fail with "TLS not available (...)" and plain
//! HTTP is unaffected.

use std::ffi::CString;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::raw::{c_int, c_long, c_void};
use std::os::unix::io::AsRawFd;
use std::sync::{Arc, Mutex};

use libloading::Library;

use crate::error::HttpError;

const SSL_CTRL_SET_TLSEXT_HOSTNAME: c_int = 55;
const TLSEXT_NAMETYPE_HOST_NAME: c_long = 0;

// Candidate library names, newest major version first. Resolution uses the
// loader's default search path only.
#[cfg(not(target_os = "macos"))]
const CRYPTO_NAMES: &[&str] = &["libcrypto.so.3", "libcrypto.so.1.1", "libcrypto.so"];
#[cfg(target_os = "macos")]
const CRYPTO_NAMES: &[&str] = &[
    "libcrypto.so.3",
    "libcrypto.so.1.1",
    "libcrypto.so",
    "libcrypto.3.dylib",
    "libcrypto.1.1.dylib",
    "libcrypto.dylib",
];
#[cfg(not(target_os = "macos"))]
const SSL_NAMES: &[&str] = &["libssl.so.3", "libssl.so.1.1", "libssl.so"];
#[cfg(target_os = "macos")]
const SSL_NAMES: &[&str] = &[
    "libssl.so.3",
    "libssl.so.1.1",
    "libssl.so",
    "libssl.3.dylib",
    "libssl.1.1.dylib",
    "libssl.dylib",
];

type InitSslFn = unsafe extern "C" fn(u64, *mut c_void) -> c_int;
type MethodFn = unsafe extern "C" fn() -> *const c_void;
type CtxNewFn = unsafe extern "C" fn(*const c_void) -> *mut c_void;
type CtxFreeFn = unsafe extern "C" fn(*mut c_void);
type SslNewFn = unsafe extern "C" fn(*mut c_void) -> *mut c_void;
type SslFreeFn = unsafe extern "C" fn(*mut c_void);
type SetFdFn = unsafe extern "C" fn(*mut c_void, c_int) -> c_int;
type ConnectFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type ReadFn = unsafe extern "C" fn(*mut c_void, *mut c_void, c_int) -> c_int;
type WriteFn = unsafe extern "C" fn(*mut c_void, *const c_void, c_int) -> c_int;
type ShutdownFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type CtrlFn = unsafe extern "C" fn(*mut c_void, c_int, c_long, *mut c_void) -> c_long;
type GetErrorFn = unsafe extern "C" fn(*const c_void, c_int) -> c_int;

/// Resolved OpenSSL entry points. The libraries stay open for as long as any
/// session holds an Arc to this table; dropping the last Arc unloads them.
pub struct OpensslApi {
    // Keep load order: ssl depends on crypto.
    _ssl: Library,
    _crypto: Library,

    tls_client_method: MethodFn,
    ssl_ctx_new: CtxNewFn,
    ssl_ctx_free: CtxFreeFn,
    ssl_new: SslNewFn,
    ssl_free: SslFreeFn,
    ssl_set_fd: SetFdFn,
    ssl_connect: ConnectFn,
    ssl_read: ReadFn,
    ssl_write: WriteFn,
    ssl_shutdown: ShutdownFn,
    // Optional: older builds may lack these; SNI and error codes degrade.
    ssl_ctrl: Option<CtrlFn>,
    ssl_get_error: Option<GetErrorFn>,
}

enum BackendState {
    Uninit,
    Ready(Arc<OpensslApi>),
    Failed(String),
}

static BACKEND: Mutex<BackendState> = Mutex::new(BackendState::Uninit);

fn open_any(names: &[&str]) -> Option<Library> {
    for name in names {
        // Safety: library init sections run here; OpenSSL's are benign.
        if let Ok(lib) = unsafe { Library::new(name) } {
            return Some(lib);
        }
    }
    None
}

macro_rules! required_sym {
    ($lib:expr, $name:literal, $ty:ty) => {
        match unsafe { $lib.get::<$ty>($name) } {
            Ok(sym) => *sym,
            Err(_) => return Err("missing OpenSSL symbols".to_string()),
        }
    };
}

macro_rules! optional_sym {
    ($lib:expr, $name:literal, $ty:ty) => {
        unsafe { $lib.get::<$ty>($name) }.ok().map(|sym| *sym)
    };
}

fn load() -> Result<OpensslApi, String> {
    let crypto = open_any(CRYPTO_NAMES).ok_or_else(|| "libcrypto not found".to_string())?;
    let ssl = open_any(SSL_NAMES).ok_or_else(|| "libssl not found".to_string())?;

    let init_ssl = optional_sym!(&ssl, b"OPENSSL_init_ssl\0", InitSslFn);

    let api = OpensslApi {
        tls_client_method: required_sym!(&ssl, b"TLS_client_method\0", MethodFn),
        ssl_ctx_new: required_sym!(&ssl, b"SSL_CTX_new\0", CtxNewFn),
        ssl_ctx_free: required_sym!(&ssl, b"SSL_CTX_free\0", CtxFreeFn),
        ssl_new: required_sym!(&ssl, b"SSL_new\0", SslNewFn),
        ssl_free: required_sym!(&ssl, b"SSL_free\0", SslFreeFn),
        ssl_set_fd: required_sym!(&ssl, b"SSL_set_fd\0", SetFdFn),
        ssl_connect: required_sym!(&ssl, b"SSL_connect\0", ConnectFn),
        ssl_read: required_sym!(&ssl, b"SSL_read\0", ReadFn),
        ssl_write: required_sym!(&ssl, b"SSL_write\0", WriteFn),
        ssl_shutdown: required_sym!(&ssl, b"SSL_shutdown\0", ShutdownFn),
        ssl_ctrl: optional_sym!(&ssl, b"SSL_ctrl\0", CtrlFn),
        ssl_get_error: optional_sym!(&ssl, b"SSL_get_error\0", GetErrorFn),
        _ssl: ssl,
        _crypto: crypto,
    };

    if let Some(init) = init_ssl {
        unsafe { init(0, std::ptr::null_mut()) };
    }

    Ok(api)
}

/// Get the shared entry-point table, loading the libraries on first use.
/// A load failure is memoized; later calls fail fast with the same reason.
pub fn api() -> Result<Arc<OpensslApi>, HttpError> {
    let mut state = BACKEND.lock().unwrap();
    match &*state {
        BackendState::Ready(api) => Ok(api.clone()),
        BackendState::Failed(reason) => Err(HttpError::TlsUnavailable(reason.clone())),
        BackendState::Uninit => match load() {
            Ok(api) => {
                let api = Arc::new(api);
                *state = BackendState::Ready(api.clone());
                Ok(api)
            }
            Err(reason) => {
                *state = BackendState::Failed(reason.clone());
                Err(HttpError::TlsUnavailable(reason))
            }
        },
    }
}

/// Drop the process-wide handle. In-flight sessions keep the libraries alive
/// through their own Arc; the dlclose happens when the last one finishes.
pub fn shutdown() {
    let mut state = BACKEND.lock().unwrap();
    *state = BackendState::Uninit;
}

/// One TLS session over an owned TCP stream. I/O is delegated to the loaded
/// library's blocking SSL_read/SSL_write on the stream's fd.
pub struct TlsSession {
    api: Arc<OpensslApi>,
    // The stream owns the fd; kept so the socket closes after TLS teardown.
    stream: TcpStream,
    ctx: *mut c_void,
    ssl: *mut c_void,
}

// The raw pointers are owned exclusively by this session; the session moves
// with its worker thread and is never shared.
unsafe impl Send for TlsSession {}

impl TlsSession {
    /// Handshake on an already-connected stream with SNI set to `host`.
    pub fn connect(stream: TcpStream, host: &str) -> Result<Self, HttpError> {
        let api = api()?;

        let ctx = unsafe { (api.ssl_ctx_new)((api.tls_client_method)()) };
        if ctx.is_null() {
            return Err(HttpError::Message("TLS context creation failed".into()));
        }

        let ssl = unsafe { (api.ssl_new)(ctx) };
        if ssl.is_null() {
            unsafe { (api.ssl_ctx_free)(ctx) };
            return Err(HttpError::Message("TLS session creation failed".into()));
        }

        unsafe { (api.ssl_set_fd)(ssl, stream.as_raw_fd()) };

        // SNI: virtual-hosted servers need the name to pick a certificate.
        if let (Some(ctrl), Ok(name)) = (api.ssl_ctrl, CString::new(host)) {
            unsafe {
                ctrl(
                    ssl,
                    SSL_CTRL_SET_TLSEXT_HOSTNAME,
                    TLSEXT_NAMETYPE_HOST_NAME,
                    name.as_ptr() as *mut c_void,
                );
            }
        }

        let ret = unsafe { (api.ssl_connect)(ssl) };
        if ret <= 0 {
            let code = api
                .ssl_get_error
                .map(|get| unsafe { get(ssl, ret) })
                .unwrap_or(ret);
            unsafe {
                (api.ssl_free)(ssl);
                (api.ssl_ctx_free)(ctx);
            }
            return Err(HttpError::TlsHandshake(code.to_string()));
        }

        Ok(TlsSession {
            api,
            stream,
            ctx,
            ssl,
        })
    }
}

impl Read for TlsSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len().min(c_int::MAX as usize) as c_int;
        let n = unsafe { (self.api.ssl_read)(self.ssl, buf.as_mut_ptr() as *mut c_void, len) };
        if n > 0 {
            Ok(n as usize)
        } else if n == 0 {
            Ok(0)
        } else {
            Err(io::Error::new(io::ErrorKind::Other, "SSL_read failed"))
        }
    }
}

impl Write for TlsSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len().min(c_int::MAX as usize) as c_int;
        let n = unsafe { (self.api.ssl_write)(self.ssl, buf.as_ptr() as *const c_void, len) };
        if n > 0 {
            Ok(n as usize)
        } else {
            Err(io::Error::new(io::ErrorKind::Other, "SSL_write failed"))
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Drop for TlsSession {
    fn drop(&mut self) {
        // Session teardown before the socket closes with the stream.
        unsafe {
            (self.api.ssl_shutdown)(self.ssl);
            (self.api.ssl_free)(self.ssl);
            (self.api.ssl_ctx_free)(self.ctx);
        }
    }
}
