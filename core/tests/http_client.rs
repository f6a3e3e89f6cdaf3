/*
 * http_client.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Integration tests for the HTTP client. Each scenario scripts a loopback
 * TCP server on its own thread and drives the full request/response cycle:
 * framing, redirects, resume, progress, and the handle contract. One real
 * HTTPS test at the end is #[ignore]d because it needs the network.
 *
 * Run with:
 *   cargo test -p corriere_core --test http_client
 */

use std::fs;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::thread;

use corriere_core::{submit, RequestOptions};

/// Find a byte subsequence.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Content-Length of a request head, 0 when absent.
fn request_content_length(head: &[u8]) -> usize {
    for line in head.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if let Some(colon) = line.iter().position(|&b| b == b':') {
            if line[..colon].eq_ignore_ascii_case(b"content-length") {
                let value = String::from_utf8_lossy(&line[colon + 1..]);
                return value.trim().parse().unwrap_or(0);
            }
        }
    }
    0
}

/// Read one full request (head plus any Content-Length body).
fn read_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    loop {
        let n = match stream.read(&mut tmp) {
            Ok(n) if n > 0 => n,
            _ => break,
        };
        buf.extend_from_slice(&tmp[..n]);
        if let Some(head_end) = find(&buf, b"\r\n\r\n") {
            let body_len = request_content_length(&buf[..head_end]);
            if buf.len() >= head_end + 4 + body_len {
                break;
            }
        }
    }
    buf
}

/// Accept one connection per scripted response, capture the request, send
/// the response, close. Returns the authority to dial and the captured
/// requests at join.
fn serve(responses: Vec<Vec<u8>>) -> (String, thread::JoinHandle<Vec<Vec<u8>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let authority = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    let handle = thread::spawn(move || {
        let mut requests = Vec::new();
        for response in responses {
            let (mut stream, _) = listener.accept().unwrap();
            requests.push(read_request(&mut stream));
            stream.write_all(&response).unwrap();
        }
        requests
    });
    (authority, handle)
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("corriere_test_{}_{}", std::process::id(), name))
}

#[test]
fn get_with_known_length() {
    let (authority, server) = serve(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello".to_vec(),
    ]);

    let mut handle = submit(RequestOptions::new(format!("http://{}/", authority)));
    while !handle.done() {
        thread::yield_now();
    }
    let result = handle.result();

    assert_eq!(result.error, None);
    assert_eq!(result.status, 200);
    assert_eq!(result.body.as_deref(), Some(&b"hello"[..]));
    assert_eq!(
        result.headers.get("content-length").map(String::as_str),
        Some("5")
    );
    // done() is monotonic: once true, true forever.
    assert!(handle.done());

    let requests = server.join().unwrap();
    let head = String::from_utf8_lossy(&requests[0]);
    assert!(head.starts_with("GET / HTTP/1.1\r\n"));
    assert!(head.contains("Host: 127.0.0.1\r\n"));
    assert!(head.contains("User-Agent: Corriere/0.1\r\n"));
    assert!(head.contains("Connection: close\r\n"));
}

#[test]
fn chunked_body_reassembles() {
    let (authority, server) = serve(vec![
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n"
            .to_vec(),
    ]);

    let mut handle = submit(RequestOptions::new(format!("http://{}/", authority)));
    let result = handle.result();

    assert_eq!(result.error, None);
    assert_eq!(result.status, 200);
    assert_eq!(result.body.as_deref(), Some(&b"hello world"[..]));
    assert_eq!(handle.progress().downloaded, 11);
    server.join().unwrap();
}

#[test]
fn caller_headers_and_body_are_sent_verbatim() {
    let (authority, server) = serve(vec![
        b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n".to_vec(),
    ]);

    let mut handle = submit(
        RequestOptions::new(format!("http://{}/submit", authority))
            .method("POST")
            .header("X-First", "1")
            .header("X-Second", "2")
            .body(&b"payload"[..]),
    );
    let result = handle.result();
    assert_eq!(result.error, None);
    assert_eq!(result.status, 204);

    let requests = server.join().unwrap();
    let text = String::from_utf8_lossy(&requests[0]);
    assert!(text.starts_with("POST /submit HTTP/1.1\r\n"));
    let first = text.find("X-First: 1\r\n").unwrap();
    let second = text.find("X-Second: 2\r\n").unwrap();
    assert!(first < second, "caller header order must be preserved");
    assert!(text.contains("Content-Length: 7\r\n"));
    assert!(text.ends_with("\r\n\r\npayload"));
}

#[test]
fn redirect_absolute_location_is_followed() {
    let (authority_b, server_b) =
        serve(vec![b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok".to_vec()]);
    let redirect = format!(
        "HTTP/1.1 301 Moved Permanently\r\nLocation: http://{}/\r\n\r\n",
        authority_b
    );
    let (authority_a, server_a) = serve(vec![redirect.into_bytes()]);

    let mut handle = submit(RequestOptions::new(format!("http://{}/start", authority_a)));
    let result = handle.result();

    assert_eq!(result.error, None);
    assert_eq!(result.status, 200);
    assert_eq!(result.body.as_deref(), Some(&b"ok"[..]));

    // Counters were reset at the redirect and advanced with the second
    // attempt only.
    let progress = handle.progress();
    assert_eq!(progress.downloaded, 2);
    assert_eq!(progress.total, 2);

    server_a.join().unwrap();
    let requests_b = server_b.join().unwrap();
    assert!(requests_b[0].starts_with(b"GET / HTTP/1.1\r\n"));
}

#[test]
fn redirect_root_relative_location_keeps_authority() {
    let (authority, server) = serve(vec![
        b"HTTP/1.1 302 Found\r\nLocation: /moved\r\n\r\n".to_vec(),
        b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nnew".to_vec(),
    ]);

    let mut handle = submit(RequestOptions::new(format!("http://{}/old", authority)));
    let result = handle.result();

    assert_eq!(result.error, None);
    assert_eq!(result.body.as_deref(), Some(&b"new"[..]));

    let requests = server.join().unwrap();
    assert!(requests[1].starts_with(b"GET /moved HTTP/1.1\r\n"));
}

#[test]
fn redirect_303_rewrites_method_to_get() {
    let (authority, server) = serve(vec![
        b"HTTP/1.1 303 See Other\r\nLocation: /r\r\n\r\n".to_vec(),
        b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\ndone".to_vec(),
    ]);

    let mut handle = submit(
        RequestOptions::new(format!("http://{}/form", authority))
            .method("POST")
            .body(&b"x"[..]),
    );
    let result = handle.result();

    assert_eq!(result.error, None);
    assert_eq!(result.status, 200);
    assert_eq!(result.body.as_deref(), Some(&b"done"[..]));

    let requests = server.join().unwrap();
    let first = String::from_utf8_lossy(&requests[0]);
    assert!(first.starts_with("POST /form HTTP/1.1\r\n"));
    assert!(first.contains("Content-Length: 1\r\n"));

    let second = String::from_utf8_lossy(&requests[1]);
    assert!(second.starts_with("GET /r HTTP/1.1\r\n"));
    assert!(!second.contains("Content-Length"));
    assert!(second.ends_with("\r\n\r\n"));
}

#[test]
fn resume_appends_on_206() {
    let path = temp_path("resume206");
    fs::write(&path, vec![b'a'; 100]).unwrap();

    let mut response = b"HTTP/1.1 206 Partial Content\r\nContent-Length: 50\r\n\r\n".to_vec();
    response.extend_from_slice(&[b'b'; 50]);
    let (authority, server) = serve(vec![response]);

    let mut handle = submit(
        RequestOptions::new(format!("http://{}/file", authority))
            .output_path(path.to_str().unwrap()),
    );
    let result = handle.result();

    assert_eq!(result.error, None);
    assert_eq!(result.status, 206);
    assert_eq!(result.body, None);

    let on_disk = fs::read(&path).unwrap();
    assert_eq!(on_disk.len(), 150);
    assert!(on_disk[..100].iter().all(|&b| b == b'a'));
    assert!(on_disk[100..].iter().all(|&b| b == b'b'));

    let progress = handle.progress();
    assert_eq!(progress.downloaded, 150);
    assert_eq!(progress.total, 150);

    let requests = server.join().unwrap();
    assert!(find(&requests[0], b"Range: bytes=100-\r\n").is_some());

    fs::remove_file(&path).unwrap();
}

#[test]
fn resume_restarts_when_server_ignores_range() {
    let path = temp_path("resume200");
    fs::write(&path, vec![b'a'; 100]).unwrap();

    let mut response = b"HTTP/1.1 200 OK\r\nContent-Length: 200\r\n\r\n".to_vec();
    response.extend_from_slice(&[b'c'; 200]);
    let (authority, server) = serve(vec![response]);

    let mut handle = submit(
        RequestOptions::new(format!("http://{}/file", authority))
            .output_path(path.to_str().unwrap()),
    );
    let result = handle.result();

    assert_eq!(result.error, None);
    assert_eq!(result.status, 200);

    let on_disk = fs::read(&path).unwrap();
    assert_eq!(on_disk.len(), 200);
    assert!(on_disk.iter().all(|&b| b == b'c'));
    assert_eq!(handle.progress().downloaded, 200);

    server.join().unwrap();
    fs::remove_file(&path).unwrap();
}

#[test]
fn override_skips_resume_probe() {
    let path = temp_path("override");
    fs::write(&path, vec![b'a'; 100]).unwrap();

    let (authority, server) = serve(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc".to_vec(),
    ]);

    let mut handle = submit(
        RequestOptions::new(format!("http://{}/file", authority))
            .output_path(path.to_str().unwrap())
            .override_output(true),
    );
    let result = handle.result();
    assert_eq!(result.error, None);

    assert_eq!(fs::read(&path).unwrap(), b"abc");

    let requests = server.join().unwrap();
    assert!(find(&requests[0], b"Range:").is_none());

    fs::remove_file(&path).unwrap();
}

#[test]
fn too_many_redirects_fails() {
    // 11 attempts (initial + 10 redirects) all answered with a redirect.
    let responses: Vec<Vec<u8>> = (0..11)
        .map(|i| {
            format!(
                "HTTP/1.1 301 Moved Permanently\r\nLocation: /{}\r\n\r\n",
                if i % 2 == 0 { "a" } else { "b" }
            )
            .into_bytes()
        })
        .collect();
    let (authority, server) = serve(responses);

    let mut handle = submit(RequestOptions::new(format!("http://{}/", authority)));
    let result = handle.result();

    assert_eq!(result.error.as_deref(), Some("too many redirects (max 10)"));
    assert_eq!(result.status, 0);
    server.join().unwrap();
}

#[test]
fn body_without_framing_reads_until_close() {
    let (authority, server) = serve(vec![b"HTTP/1.1 200 OK\r\n\r\nstream-end".to_vec()]);

    let mut handle = submit(RequestOptions::new(format!("http://{}/", authority)));
    let result = handle.result();

    assert_eq!(result.error, None);
    assert_eq!(result.body.as_deref(), Some(&b"stream-end"[..]));
    // No Content-Length was seen, so the total stays unknown.
    assert_eq!(handle.progress().total, -1);
    server.join().unwrap();
}

#[test]
fn echoed_body_round_trips() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let authority = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_request(&mut stream);
        let head_end = find(&request, b"\r\n\r\n").unwrap();
        let body = &request[head_end + 4..];
        let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len());
        stream.write_all(response.as_bytes()).unwrap();
        stream.write_all(body).unwrap();
    });

    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let mut handle = submit(
        RequestOptions::new(format!("http://{}/echo", authority))
            .method("POST")
            .body(payload.clone()),
    );
    let result = handle.result();

    assert_eq!(result.error, None);
    assert_eq!(result.body.as_deref(), Some(&payload[..]));
    let progress = handle.progress();
    assert!(progress.uploaded >= payload.len() as u64);
    assert_eq!(progress.downloaded, payload.len() as u64);
    server.join().unwrap();
}

#[test]
fn parallel_requests_do_not_cross_contaminate() {
    let mut servers = Vec::new();
    let mut handles = Vec::new();
    for i in 0..4 {
        let body = format!("response-{}", i);
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let (authority, server) = serve(vec![response.into_bytes()]);
        servers.push(server);
        handles.push(submit(RequestOptions::new(format!(
            "http://{}/{}",
            authority, i
        ))));
    }

    for (i, handle) in handles.iter_mut().enumerate() {
        let result = handle.result();
        assert_eq!(result.error, None);
        assert_eq!(result.body.as_deref(), Some(format!("response-{}", i).as_bytes()));
    }
    for server in servers {
        server.join().unwrap();
    }
}

#[test]
fn result_is_consume_once() {
    let (authority, server) = serve(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi".to_vec(),
    ]);

    let mut handle = submit(RequestOptions::new(format!("http://{}/", authority)));
    let first = handle.result();
    assert_eq!(first.error, None);

    let second = handle.result();
    assert_eq!(second.error.as_deref(), Some("request already consumed"));
    assert_eq!(second.body, None);
    server.join().unwrap();
}

#[test]
fn invalid_url_errors_at_once() {
    let mut handle = submit(RequestOptions::new("gopher://example.com/"));
    let result = handle.result();
    assert_eq!(
        result.error.as_deref(),
        Some("invalid URL: gopher://example.com/")
    );
    assert_eq!(result.status, 0);
}

#[test]
fn connect_refused_reports_host_and_port() {
    // Grab a free port, then close the listener so the connect is refused.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut handle = submit(RequestOptions::new(format!("http://127.0.0.1:{}/", port)));
    let result = handle.result();
    let error = result.error.expect("connect must fail");
    assert!(
        error.starts_with(&format!("connect(127.0.0.1:{}) failed:", port)),
        "unexpected error: {}",
        error
    );
}

#[test]
fn tls_available_is_callable() {
    // Whether a backend loads depends on the host; the call itself must be
    // safe and stable.
    let first = corriere_core::tls_available();
    let second = corriere_core::tls_available();
    assert_eq!(first, second);
}

#[test]
#[ignore] // requires network; run with: cargo test --test http_client -- --ignored
fn https_get_real_host() {
    if !corriere_core::tls_available() {
        eprintln!("TLS backend not available on this host, skipping");
        return;
    }
    let mut handle = submit(RequestOptions::new("https://example.com/"));
    let result = handle.result();
    assert_eq!(result.error, None);
    assert_eq!(result.status, 200);
    assert!(result.body.map(|b| !b.is_empty()).unwrap_or(false));
}
