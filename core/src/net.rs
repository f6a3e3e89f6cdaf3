/*
 * net.rs
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

//! Connection layer: name resolution, TCP connect with per-address retry,
//! plain or TLS stream behind one Read/Write type. Connections are owned by
//! a single worker thread and never shared.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::HttpError;
use crate::tls::TlsSession;
use crate::url::ParsedUrl;

/// One request's transport: plain TCP or a TLS session over it.
pub enum Connection {
    Plain(TcpStream),
    Tls(TlsSession),
}

/// Resolve `host:port`, try each address in order, and keep the first socket
/// that connects. For https URLs the TLS handshake runs before returning, so
/// a `Connection` is always ready for request bytes. `timeout` becomes the
/// socket read and write timeout.
pub fn connect(url: &ParsedUrl, timeout: Option<Duration>) -> Result<Connection, HttpError> {
    #[cfg(windows)]
    winsock::init()?;

    let authority = format!("{}:{}", url.host, url.port);
    let addrs = authority
        .to_socket_addrs()
        .map_err(|e| HttpError::Resolve {
            host: url.host.clone(),
            port: url.port.clone(),
            reason: e.to_string(),
        })?;

    let mut last_code = 0;
    let mut stream = None;
    for addr in addrs {
        match TcpStream::connect(addr) {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(e) => last_code = e.raw_os_error().unwrap_or(-1),
        }
    }
    let stream = stream.ok_or_else(|| HttpError::Connect {
        host: url.host.clone(),
        port: url.port.clone(),
        code: last_code,
    })?;

    if timeout.is_some() {
        let _ = stream.set_read_timeout(timeout);
        let _ = stream.set_write_timeout(timeout);
    }

    if url.https {
        Ok(Connection::Tls(TlsSession::connect(stream, &url.host)?))
    } else {
        Ok(Connection::Plain(stream))
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Plain(s) => s.read(buf),
            Connection::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Plain(s) => s.write(buf),
            Connection::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Connection::Plain(s) => s.flush(),
            Connection::Tls(s) => s.flush(),
        }
    }
}

// Dropping a Connection closes it: the TLS session shuts down and frees its
// provider context before the socket closes with the stream.

/// Process-wide Winsock lifecycle. The standard library initializes Winsock
/// for its own sockets; this explicit one-shot exists so shutdown() can tear
/// the subsystem down iff this module brought it up, and so init failures
/// surface as "WSAStartup failed" rather than a connect error.
#[cfg(windows)]
pub mod winsock {
    use std::mem;
    use std::sync::atomic::{AtomicI32, Ordering};

    use windows_sys::Win32::Networking::WinSock::{WSACleanup, WSAStartup, WSADATA};

    use crate::error::HttpError;

    const UNINIT: i32 = 0;
    const INITIALIZING: i32 = 1;
    const READY: i32 = 2;
    const FAILED: i32 = -1;

    static STATE: AtomicI32 = AtomicI32::new(UNINIT);
    static FAIL_CODE: AtomicI32 = AtomicI32::new(0);

    /// Exactly one caller wins the CAS and runs WSAStartup; everyone else
    /// observes the final state.
    pub fn init() -> Result<(), HttpError> {
        if STATE
            .compare_exchange(UNINIT, INITIALIZING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let mut data: WSADATA = unsafe { mem::zeroed() };
            let rc = unsafe { WSAStartup(0x0202, &mut data) };
            if rc != 0 {
                FAIL_CODE.store(rc, Ordering::Relaxed);
                STATE.store(FAILED, Ordering::Release);
                return Err(HttpError::WsaStartup(rc));
            }
            STATE.store(READY, Ordering::Release);
            return Ok(());
        }

        loop {
            match STATE.load(Ordering::Acquire) {
                READY => return Ok(()),
                FAILED => return Err(HttpError::WsaStartup(FAIL_CODE.load(Ordering::Relaxed))),
                _ => std::hint::spin_loop(),
            }
        }
    }

    /// WSACleanup iff this module ran WSAStartup.
    pub fn shutdown() {
        if STATE
            .compare_exchange(READY, UNINIT, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            unsafe { WSACleanup() };
        }
    }
}
