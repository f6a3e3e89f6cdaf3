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

//! TLS backends, selected at build time: SChannel on Windows (native OS
//! provider, no external dependency), runtime-loaded OpenSSL elsewhere.
//! Both expose a `TlsSession` over an owned `TcpStream` plus process-wide
//! init/shutdown.

use crate::error::HttpError;

#[cfg(unix)]
pub mod openssl;
#[cfg(windows)]
pub mod schannel;

#[cfg(unix)]
pub use openssl::TlsSession;
#[cfg(windows)]
pub use schannel::TlsSession;

/// Set up the process-wide backend state (library load or credentials
/// acquisition). Lazy and memoized; cheap after the first call.
pub fn init() -> Result<(), HttpError> {
    #[cfg(unix)]
    return openssl::api().map(|_| ());
    #[cfg(windows)]
    return schannel::credentials().map(|_| ());
}

/// True when HTTPS requests can be attempted. Triggers lazy init.
pub fn available() -> bool {
    init().is_ok()
}

/// Release the process-wide backend state. Safe to call with requests never
/// issued; a later init() starts over.
pub fn shutdown() {
    #[cfg(unix)]
    openssl::shutdown();
    #[cfg(windows)]
    schannel::shutdown();
}
