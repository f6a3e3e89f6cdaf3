/*
 * reader.rs
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

//! Line and framed reads over a blocking stream: CRLF-terminated lines for
//! the status line, headers and chunk sizes; exact-count reads for sized
//! bodies and chunk data.

use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{BufMut, BytesMut};

/// Largest single read issued against the transport.
const READ_CHUNK_MAX: u64 = 65536;

/// Read one CRLF-terminated line into `line` (cleared first); the CRLF is
/// stripped. A CR not followed by LF is kept. Returns false when the stream
/// ends mid-line.
pub fn read_line<R: Read>(conn: &mut R, line: &mut BytesMut) -> bool {
    line.clear();
    let mut byte = [0u8; 1];
    loop {
        match conn.read(&mut byte) {
            Ok(1) => {}
            _ => return false,
        }
        if byte[0] == b'\r' {
            let cr_follower = match conn.read(&mut byte) {
                Ok(1) => byte[0],
                _ => return false,
            };
            if cr_follower == b'\n' {
                return true;
            }
            line.put_u8(b'\r');
            line.put_u8(cr_follower);
        } else {
            line.put_u8(byte[0]);
        }
    }
}

/// Append exactly `count` bytes from the stream to `buf`, in reads of at
/// most 64 KiB, crediting each read to `downloaded` when given. Returns
/// false if the stream ends early; `buf` keeps what arrived.
pub fn read_exact<R: Read>(
    conn: &mut R,
    buf: &mut BytesMut,
    count: u64,
    downloaded: Option<&AtomicU64>,
) -> bool {
    buf.reserve(count.min(usize::MAX as u64) as usize);
    let mut total: u64 = 0;
    while total < count {
        let want = (count - total).min(READ_CHUNK_MAX) as usize;
        let start = buf.len();
        buf.resize(start + want, 0);
        match conn.read(&mut buf[start..start + want]) {
            Ok(n) if n > 0 => {
                buf.truncate(start + n);
                total += n as u64;
                if let Some(counter) = downloaded {
                    counter.fetch_add(n as u64, Ordering::Relaxed);
                }
            }
            _ => {
                buf.truncate(start);
                return false;
            }
        }
    }
    true
}

/// Parse a hexadecimal chunk size, stopping at the first non-hex byte.
/// Chunk extensions (`;...`) therefore end the number; garbage yields 0.
pub fn hex_to_u64(s: &[u8]) -> u64 {
    let mut val: u64 = 0;
    for &b in s {
        match (b as char).to_digit(16) {
            Some(d) => val = (val << 4) | d as u64,
            None => break,
        }
    }
    val
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn line_strips_crlf() {
        let mut cur = Cursor::new(b"HTTP/1.1 200 OK\r\nnext".to_vec());
        let mut line = BytesMut::new();
        assert!(read_line(&mut cur, &mut line));
        assert_eq!(&line[..], b"HTTP/1.1 200 OK");
    }

    #[test]
    fn lone_cr_is_kept() {
        let mut cur = Cursor::new(b"a\rb\r\n".to_vec());
        let mut line = BytesMut::new();
        assert!(read_line(&mut cur, &mut line));
        assert_eq!(&line[..], b"a\rb");
    }

    #[test]
    fn eof_mid_line_fails() {
        let mut cur = Cursor::new(b"no terminator".to_vec());
        let mut line = BytesMut::new();
        assert!(!read_line(&mut cur, &mut line));
    }

    #[test]
    fn empty_line_is_ok() {
        let mut cur = Cursor::new(b"\r\n".to_vec());
        let mut line = BytesMut::new();
        assert!(read_line(&mut cur, &mut line));
        assert!(line.is_empty());
    }

    #[test]
    fn exact_read_appends_and_counts() {
        let mut cur = Cursor::new(b"hello world".to_vec());
        let mut buf = BytesMut::new();
        let counter = AtomicU64::new(0);
        assert!(read_exact(&mut cur, &mut buf, 5, Some(&counter)));
        assert_eq!(&buf[..], b"hello");
        assert_eq!(counter.load(Ordering::Relaxed), 5);
        assert!(read_exact(&mut cur, &mut buf, 6, Some(&counter)));
        assert_eq!(&buf[..], b"hello world");
        assert_eq!(counter.load(Ordering::Relaxed), 11);
    }

    #[test]
    fn exact_read_fails_on_short_stream() {
        let mut cur = Cursor::new(b"abc".to_vec());
        let mut buf = BytesMut::new();
        assert!(!read_exact(&mut cur, &mut buf, 10, None));
        assert_eq!(&buf[..], b"abc");
    }

    #[test]
    fn hex_parse_is_permissive() {
        assert_eq!(hex_to_u64(b"0"), 0);
        assert_eq!(hex_to_u64(b"a"), 10);
        assert_eq!(hex_to_u64(b"1A2b"), 0x1a2b);
        assert_eq!(hex_to_u64(b"ff; ext=1"), 0xff);
        assert_eq!(hex_to_u64(b"zzz"), 0);
        assert_eq!(hex_to_u64(b""), 0);
    }
}
