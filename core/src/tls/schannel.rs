/*
 * schannel.rs
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

//! TLS backend for Windows: native SChannel, no external dependency.
//!
//! The provider encrypts and decrypts in place, a read may return less or
//! more than one TLS record, and the caller may ask for fewer bytes than one
//! decrypted record contains. Two connection-scoped buffers absorb the
//! mismatch: an encrypted-input buffer that holds over any SECBUFFER_EXTRA
//! tail between calls, and a plaintext remainder drained before the socket
//! is touched again. Plaintext must be copied out BEFORE the EXTRA tail is
//! moved to the front of the same buffer the plaintext aliases into.

use std::ffi::CString;
use std::io::{self, Read, Write};
use std::mem;
use std::net::TcpStream;
use std::os::raw::c_void;
use std::ptr;
use std::sync::Mutex;

use windows_sys::Win32::Foundation::{
    SEC_E_INCOMPLETE_MESSAGE, SEC_E_OK, SEC_I_CONTEXT_EXPIRED, SEC_I_CONTINUE_NEEDED,
};
use windows_sys::Win32::Security::Authentication::Identity::{
    AcquireCredentialsHandleA, DecryptMessage, DeleteSecurityContext, EncryptMessage,
    FreeContextBuffer, FreeCredentialsHandle, InitializeSecurityContextA,
    QueryContextAttributesA, SecBuffer, SecBufferDesc, SecPkgContext_StreamSizes,
    ISC_REQ_ALLOCATE_MEMORY, ISC_REQ_CONFIDENTIALITY, ISC_REQ_INTEGRITY,
    ISC_REQ_MANUAL_CRED_VALIDATION, ISC_REQ_SEQUENCE_DETECT, ISC_REQ_STREAM, SCHANNEL_CRED,
    SCHANNEL_CRED_VERSION, SCH_CRED_MANUAL_CRED_VALIDATION, SCH_USE_STRONG_CRYPTO,
    SECBUFFER_DATA, SECBUFFER_EMPTY, SECBUFFER_EXTRA, SECBUFFER_STREAM_HEADER,
    SECBUFFER_STREAM_TRAILER, SECBUFFER_TOKEN, SECBUFFER_VERSION, SECPKG_ATTR_STREAM_SIZES,
    SECPKG_CRED_OUTBOUND, UNISP_NAME_A,
};
use windows_sys::Win32::Security::Credentials::SecHandle;

use crate::error::HttpError;

const HANDSHAKE_MAX_ITERATIONS: usize = 100;
const READ_BUFFER_INITIAL: usize = 16384;

const CONTEXT_REQ: u32 = ISC_REQ_SEQUENCE_DETECT
    | ISC_REQ_CONFIDENTIALITY
    | ISC_REQ_INTEGRITY
    | ISC_REQ_STREAM
    | ISC_REQ_ALLOCATE_MEMORY
    | ISC_REQ_MANUAL_CRED_VALIDATION;

enum CredState {
    Uninit,
    Ready(SecHandle),
    Failed(String),
}

static CREDENTIALS: Mutex<CredState> = Mutex::new(CredState::Uninit);

/// Process-wide client credentials, acquired lazily on first use.
/// Protocol version is auto-negotiated; certificates are NOT verified
/// (manual credential validation, a documented caveat of this backend).
pub fn credentials() -> Result<SecHandle, HttpError> {
    let mut state = CREDENTIALS.lock().unwrap();
    match &*state {
        CredState::Ready(handle) => Ok(*handle),
        CredState::Failed(reason) => Err(HttpError::TlsHandshake(reason.clone())),
        CredState::Uninit => {
            eprintln!("[tls] acquiring SChannel credentials");
            let mut cred: SCHANNEL_CRED = unsafe { mem::zeroed() };
            cred.dwVersion = SCHANNEL_CRED_VERSION;
            // 0 lets the provider pick the best protocol available.
            cred.grbitEnabledProtocols = 0;
            cred.dwFlags = SCH_CRED_MANUAL_CRED_VALIDATION | SCH_USE_STRONG_CRYPTO;

            let mut handle = SecHandle {
                dwLower: 0,
                dwUpper: 0,
            };
            let mut expiry: i64 = 0;
            let status = unsafe {
                AcquireCredentialsHandleA(
                    ptr::null(),
                    UNISP_NAME_A,
                    SECPKG_CRED_OUTBOUND,
                    ptr::null(),
                    &cred as *const _ as *const c_void,
                    None,
                    ptr::null(),
                    &mut handle,
                    &mut expiry,
                )
            };
            if status != SEC_E_OK {
                let reason = format!("AcquireCredentialsHandle failed: 0x{:x}", status as u32);
                *state = CredState::Failed(reason.clone());
                return Err(HttpError::TlsHandshake(reason));
            }
            *state = CredState::Ready(handle);
            Ok(handle)
        }
    }
}

/// Free the process-wide credentials. A later request re-acquires them.
pub fn shutdown() {
    let mut state = CREDENTIALS.lock().unwrap();
    if let CredState::Ready(handle) = &*state {
        unsafe { FreeCredentialsHandle(handle) };
    }
    *state = CredState::Uninit;
}

fn empty_buffer() -> SecBuffer {
    SecBuffer {
        cbBuffer: 0,
        BufferType: SECBUFFER_EMPTY,
        pvBuffer: ptr::null_mut(),
    }
}

/// One TLS session over an owned TCP stream.
pub struct TlsSession {
    stream: TcpStream,
    ctx: SecHandle,
    /// Encrypted bytes from the network, `read_len` valid. Doubles on demand.
    read_buf: Vec<u8>,
    read_len: usize,
    /// Decrypted bytes the caller has not asked for yet.
    plain: Vec<u8>,
    plain_off: usize,
}

impl TlsSession {
    /// Handshake on an already-connected stream, with `host` as the target
    /// name for SNI and any EXTRA application bytes preserved for the first
    /// read.
    pub fn connect(stream: TcpStream, host: &str) -> Result<Self, HttpError> {
        let cred = credentials()?;
        let target = CString::new(host)
            .map_err(|_| HttpError::Message("invalid host name".into()))?;

        let mut session = TlsSession {
            stream,
            ctx: SecHandle {
                dwLower: 0,
                dwUpper: 0,
            },
            read_buf: Vec::new(),
            read_len: 0,
            plain: Vec::new(),
            plain_off: 0,
        };
        session.handshake(&cred, &target, host)?;
        Ok(session)
    }

    fn handshake(
        &mut self,
        cred: &SecHandle,
        target: &CString,
        host: &str,
    ) -> Result<(), HttpError> {
        eprintln!("[tls] starting handshake with {}", host);

        let mut receive = vec![0u8; READ_BUFFER_INITIAL];
        let mut receive_len: usize = 0;
        let mut initial = true;

        for _ in 0..HANDSHAKE_MAX_ITERATIONS {
            let mut out_buffers = [SecBuffer {
                cbBuffer: 0,
                BufferType: SECBUFFER_TOKEN,
                pvBuffer: ptr::null_mut(),
            }];
            let mut out_desc = SecBufferDesc {
                ulVersion: SECBUFFER_VERSION,
                cBuffers: 1,
                pBuffers: out_buffers.as_mut_ptr(),
            };
            let mut in_buffers = [
                SecBuffer {
                    cbBuffer: receive_len as u32,
                    BufferType: SECBUFFER_TOKEN,
                    pvBuffer: receive.as_mut_ptr() as *mut c_void,
                },
                empty_buffer(),
            ];
            let in_desc = SecBufferDesc {
                ulVersion: SECBUFFER_VERSION,
                cBuffers: 2,
                pBuffers: in_buffers.as_mut_ptr(),
            };
            let mut attrs: u32 = 0;
            let mut expiry: i64 = 0;

            let ctx_in: *const SecHandle = if initial { ptr::null() } else { &self.ctx };
            let ctx_out: *mut SecHandle = if initial {
                &mut self.ctx
            } else {
                ptr::null_mut()
            };
            let desc_in: *const SecBufferDesc = if initial { ptr::null() } else { &in_desc };
            let status = unsafe {
                InitializeSecurityContextA(
                    cred,
                    ctx_in,
                    target.as_ptr() as *const u8,
                    CONTEXT_REQ,
                    0,
                    0,
                    desc_in,
                    0,
                    ctx_out,
                    &mut out_desc,
                    &mut attrs,
                    &mut expiry,
                )
            };
            initial = false;

            if status == SEC_E_OK {
                // Handshake complete; push out the final token if one was
                // produced.
                let token_len = out_buffers[0].cbBuffer as usize;
                if token_len > 0 {
                    let token = unsafe {
                        std::slice::from_raw_parts(out_buffers[0].pvBuffer as *const u8, token_len)
                    };
                    let sent = (&self.stream).write_all(token);
                    unsafe { FreeContextBuffer(out_buffers[0].pvBuffer) };
                    if sent.is_err() {
                        return Err(HttpError::TlsHandshake(
                            "failed to send final handshake token".into(),
                        ));
                    }
                }

                // The server may have sent application data right behind the
                // handshake; keep it for the first decrypt.
                if in_buffers[1].BufferType == SECBUFFER_EXTRA && in_buffers[1].cbBuffer > 0 {
                    let extra = in_buffers[1].cbBuffer as usize;
                    self.read_buf = vec![0u8; READ_BUFFER_INITIAL.max(extra)];
                    self.read_buf[..extra]
                        .copy_from_slice(&receive[receive_len - extra..receive_len]);
                    self.read_len = extra;
                }

                eprintln!("[tls] handshake with {} complete", host);
                return Ok(());
            } else if status == SEC_E_INCOMPLETE_MESSAGE {
                // The provider consumed nothing; the whole buffer is still
                // valid. Append more bytes and retry.
                let n = match (&self.stream).read(&mut receive[receive_len..]) {
                    Ok(n) if n > 0 => n,
                    _ => {
                        return Err(HttpError::TlsHandshake(
                            "failed to receive handshake response".into(),
                        ))
                    }
                };
                receive_len += n;
            } else if status == SEC_I_CONTINUE_NEEDED {
                let token_len = out_buffers[0].cbBuffer as usize;
                if token_len > 0 {
                    let token = unsafe {
                        std::slice::from_raw_parts(out_buffers[0].pvBuffer as *const u8, token_len)
                    };
                    let sent = (&self.stream).write_all(token);
                    unsafe { FreeContextBuffer(out_buffers[0].pvBuffer) };
                    if sent.is_err() {
                        return Err(HttpError::TlsHandshake(
                            "failed to send handshake token".into(),
                        ));
                    }
                } else if !out_buffers[0].pvBuffer.is_null() {
                    unsafe { FreeContextBuffer(out_buffers[0].pvBuffer) };
                }

                // Unconsumed trailing bytes move to the front and feed the
                // next iteration; otherwise read fresh data from the socket.
                let extra = in_buffers
                    .iter()
                    .find(|b| b.BufferType == SECBUFFER_EXTRA && b.cbBuffer > 0)
                    .map(|b| b.cbBuffer as usize);
                if let Some(extra) = extra {
                    receive.copy_within(receive_len - extra..receive_len, 0);
                    receive_len = extra;
                } else {
                    let n = match (&self.stream).read(&mut receive[..]) {
                        Ok(n) if n > 0 => n,
                        _ => {
                            return Err(HttpError::TlsHandshake(
                                "failed to receive handshake response".into(),
                            ))
                        }
                    };
                    receive_len = n;
                }
            } else {
                if !out_buffers[0].pvBuffer.is_null() {
                    unsafe { FreeContextBuffer(out_buffers[0].pvBuffer) };
                }
                return Err(HttpError::TlsHandshake(format!("0x{:x}", status as u32)));
            }
        }

        Err(HttpError::TlsHandshakeTimeout)
    }
}

impl Read for TlsSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        // 1. Drain buffered plaintext from a previous decrypt.
        if self.plain_off < self.plain.len() {
            let n = buf.len().min(self.plain.len() - self.plain_off);
            buf[..n].copy_from_slice(&self.plain[self.plain_off..self.plain_off + n]);
            self.plain_off += n;
            if self.plain_off >= self.plain.len() {
                self.plain = Vec::new();
                self.plain_off = 0;
            }
            return Ok(n);
        }

        if self.read_buf.is_empty() {
            self.read_buf = vec![0u8; READ_BUFFER_INITIAL];
        }

        loop {
            // 2. Fill the encrypted buffer when it runs dry.
            if self.read_len == 0 {
                let n = (&self.stream).read(&mut self.read_buf[..])?;
                if n == 0 {
                    return Ok(0);
                }
                self.read_len = n;
            }

            // 3. Decrypt in place.
            let mut buffers = [
                SecBuffer {
                    cbBuffer: self.read_len as u32,
                    BufferType: SECBUFFER_DATA,
                    pvBuffer: self.read_buf.as_mut_ptr() as *mut c_void,
                },
                empty_buffer(),
                empty_buffer(),
                empty_buffer(),
            ];
            let mut desc = SecBufferDesc {
                ulVersion: SECBUFFER_VERSION,
                cBuffers: 4,
                pBuffers: buffers.as_mut_ptr(),
            };
            let status =
                unsafe { DecryptMessage(&self.ctx, &mut desc, 0, ptr::null_mut()) };

            if status == SEC_E_OK {
                let base = self.read_buf.as_ptr() as usize;
                let data = buffers
                    .iter()
                    .find(|b| b.BufferType == SECBUFFER_DATA && b.cbBuffer > 0)
                    .map(|b| {
                        let off = b.pvBuffer as usize - base;
                        (off, b.cbBuffer as usize)
                    });
                let extra = buffers
                    .iter()
                    .find(|b| b.BufferType == SECBUFFER_EXTRA && b.cbBuffer > 0)
                    .map(|b| b.cbBuffer as usize);

                let (off, plain_len) = match data {
                    Some(range) => range,
                    None => {
                        // Empty record; keep any EXTRA tail and go again.
                        match extra {
                            Some(e) => {
                                self.read_buf.copy_within(self.read_len - e..self.read_len, 0);
                                self.read_len = e;
                            }
                            None => self.read_len = 0,
                        }
                        continue;
                    }
                };

                // 4. Copy plaintext out FIRST; the EXTRA move below would
                // overwrite the region the plaintext lives in.
                let n = plain_len.min(buf.len());
                buf[..n].copy_from_slice(&self.read_buf[off..off + n]);
                if n < plain_len {
                    self.plain = self.read_buf[off + n..off + plain_len].to_vec();
                    self.plain_off = 0;
                }

                match extra {
                    Some(e) => {
                        self.read_buf.copy_within(self.read_len - e..self.read_len, 0);
                        self.read_len = e;
                    }
                    None => self.read_len = 0,
                }

                return Ok(n);
            } else if status == SEC_E_INCOMPLETE_MESSAGE {
                // Not a whole record yet; grow if full and append more bytes.
                if self.read_len >= self.read_buf.len() {
                    let doubled = self.read_buf.len() * 2;
                    self.read_buf.resize(doubled, 0);
                }
                let n = (&self.stream).read(&mut self.read_buf[self.read_len..])?;
                if n == 0 {
                    return Ok(0);
                }
                self.read_len += n;
            } else if status == SEC_I_CONTEXT_EXPIRED {
                // Peer close_notify: graceful EOF.
                self.read_len = 0;
                return Ok(0);
            } else {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("DecryptMessage failed: 0x{:x}", status as u32),
                ));
            }
        }
    }
}

impl Write for TlsSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut sizes: SecPkgContext_StreamSizes = unsafe { mem::zeroed() };
        let status = unsafe {
            QueryContextAttributesA(
                &self.ctx,
                SECPKG_ATTR_STREAM_SIZES,
                &mut sizes as *mut _ as *mut c_void,
            )
        };
        if status != SEC_E_OK {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "QueryContextAttributes failed",
            ));
        }

        let header = sizes.cbHeader as usize;
        let trailer = sizes.cbTrailer as usize;
        let len = buf.len().min(sizes.cbMaximumMessage as usize);

        let mut frame = vec![0u8; header + len + trailer];
        frame[header..header + len].copy_from_slice(&buf[..len]);

        let mut buffers = [
            SecBuffer {
                cbBuffer: header as u32,
                BufferType: SECBUFFER_STREAM_HEADER,
                pvBuffer: frame.as_mut_ptr() as *mut c_void,
            },
            SecBuffer {
                cbBuffer: len as u32,
                BufferType: SECBUFFER_DATA,
                pvBuffer: unsafe { frame.as_mut_ptr().add(header) } as *mut c_void,
            },
            SecBuffer {
                cbBuffer: trailer as u32,
                BufferType: SECBUFFER_STREAM_TRAILER,
                pvBuffer: unsafe { frame.as_mut_ptr().add(header + len) } as *mut c_void,
            },
            empty_buffer(),
        ];
        let mut desc = SecBufferDesc {
            ulVersion: SECBUFFER_VERSION,
            cBuffers: 4,
            pBuffers: buffers.as_mut_ptr(),
        };

        let status = unsafe { EncryptMessage(&self.ctx, 0, &mut desc, 0) };
        if status != SEC_E_OK {
            return Err(io::Error::new(io::ErrorKind::Other, "EncryptMessage failed"));
        }

        // One best-effort send of the whole frame; on success the caller is
        // credited with the plaintext length.
        let sent = (&self.stream).write(&frame)?;
        if sent == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Drop for TlsSession {
    fn drop(&mut self) {
        // Context teardown before the socket closes with the stream.
        if self.ctx.dwLower != 0 || self.ctx.dwUpper != 0 {
            unsafe { DeleteSecurityContext(&self.ctx) };
        }
    }
}
