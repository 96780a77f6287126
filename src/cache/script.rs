//! Query log fetching and replay script generation
//!
//! The replay script loads every chunk of a sample, then runs the query log
//! twice: once with result verification into `verify_out`, once without into
//! `no_verify_out`. Each pass ends with `analyze`.

use crate::context::{ExecContext, FsOperation};
use crate::error::{LabError, LabResult};
use crate::signature::{sign_bytes, validate_data, Signature};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Upper bound on a downloaded query log
const MAX_QUERY_LOG_BYTES: u64 = 512 * 1024 * 1024;

/// Download the query log at `url` and check it against `expected`.
///
/// Returns the non-empty lines of the log.
pub fn fetch_query_log(url: &str, expected: &Signature) -> LabResult<Vec<String>> {
    info!("Fetching query log from {}", url);

    let mut response = ureq::get(url).call().map_err(|e| LabError::QueryLogFetch {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let body = response
        .body_mut()
        .with_config()
        .limit(MAX_QUERY_LOG_BYTES)
        .read_to_vec()
        .map_err(|e| LabError::QueryLogFetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if !validate_data(&body, expected) {
        return Err(LabError::QueryLogSignatureMismatch {
            url: url.to_string(),
            expected: expected.clone(),
            actual: sign_bytes(&body),
        });
    }

    let queries = non_empty_lines(&String::from_utf8_lossy(&body));
    debug!("Query log has {} queries", queries.len());
    Ok(queries)
}

/// Split `content` into lines, dropping empty ones
pub fn non_empty_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Render the replay script text
pub fn render_script(
    chunks: &[String],
    queries: &[String],
    verify_out: &Path,
    no_verify_out: &Path,
) -> String {
    let mut script = String::new();
    for chunk in chunks.iter().filter(|c| !c.is_empty()) {
        let _ = writeln!(script, "cache chunk {}", chunk);
    }
    render_pass(&mut script, queries, verify_out, "verify one");
    render_pass(&mut script, queries, no_verify_out, "query one");
    script
}

fn render_pass(script: &mut String, queries: &[String], out_dir: &Path, command: &str) {
    let _ = writeln!(script, "cd {}", out_dir.display());
    for query in queries.iter().filter(|q| !q.is_empty()) {
        let _ = writeln!(script, "{} {}", command, query);
    }
    script.push_str("analyze\n");
}

/// Write the script to `path`, replacing any previous version
pub fn write_script(ctx: &ExecContext, path: &Path, script: &str) -> LabResult<()> {
    ctx.run(
        FsOperation::Write {
            path: path.to_path_buf(),
        },
        || fs::write(path, script),
    )
    .map_err(|e| LabError::io(format!("writing script file {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use tempfile::TempDir;

    /// Serve `body` once on a local port, returning the URL
    fn serve_once(body: &'static [u8]) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/queries.txt", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request).unwrap();
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(header.as_bytes()).unwrap();
            stream.write_all(body).unwrap();
            stream.flush().unwrap();
        });
        (url, handle)
    }

    const QUERY_LOG: &[u8] = b"wikipedia\nrust borrow checker\n\n";

    #[test]
    fn fetch_checks_signature() {
        let (url, server) = serve_once(QUERY_LOG);
        let queries = fetch_query_log(&url, &sign_bytes(QUERY_LOG)).unwrap();
        server.join().unwrap();
        assert_eq!(queries, vec!["wikipedia", "rust borrow checker"]);
    }

    #[test]
    fn fetch_rejects_wrong_signature() {
        let (url, server) = serve_once(QUERY_LOG);
        let err = fetch_query_log(&url, &sign_bytes(b"another log")).unwrap_err();
        server.join().unwrap();
        match err {
            LabError::QueryLogSignatureMismatch { actual, .. } => {
                assert_eq!(actual, sign_bytes(QUERY_LOG))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn fetch_unreachable_host() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/queries.txt", listener.local_addr().unwrap());
        drop(listener);
        let err = fetch_query_log(&url, &sign_bytes(b"")).unwrap_err();
        assert!(matches!(err, LabError::QueryLogFetch { .. }));
    }

    #[test]
    fn render_layout() {
        let chunks = vec!["/c/chunk1".to_string(), "/c/chunk2".to_string(), String::new()];
        let queries = vec!["dogs".to_string(), "cats".to_string()];
        let script = render_script(
            &chunks,
            &queries,
            Path::new("/r/verify_out"),
            Path::new("/r/no_verify_out"),
        );
        assert_eq!(
            script,
            "cache chunk /c/chunk1\n\
             cache chunk /c/chunk2\n\
             cd /r/verify_out\n\
             verify one dogs\n\
             verify one cats\n\
             analyze\n\
             cd /r/no_verify_out\n\
             query one dogs\n\
             query one cats\n\
             analyze\n"
        );
    }

    #[test]
    fn render_without_queries_still_analyzes() {
        let script = render_script(&[], &[], Path::new("/v"), Path::new("/n"));
        assert_eq!(script, "cd /v\nanalyze\ncd /n\nanalyze\n");
    }

    #[test]
    fn write_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("script.txt");
        let ctx = ExecContext::test();
        write_script(&ctx, &path, "first\n").unwrap();
        write_script(&ctx, &path, "second\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
    }

    #[test]
    fn non_empty_lines_drops_blanks() {
        assert_eq!(non_empty_lines("a\n\nb\n"), vec!["a", "b"]);
    }
}
