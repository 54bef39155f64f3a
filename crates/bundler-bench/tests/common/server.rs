//! Minimal stand-in for a dev server
//!
//! Serves a page that polls `/state` and logs the HMR markers once the probe
//! files in the project directory contain their instrumentation, the same
//! console output a real dev server produces after a hot update.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const PAGE: &str = r#"<!doctype html>
<html>
<head><title>probe</title></head>
<body>
<div id="app">probe</div>
<script>
  const seen = { root: false, leaf: false };
  setInterval(async () => {
    const state = await (await fetch('/state')).json();
    if (state.root && !seen.root) {
      seen.root = true;
      console.log('root hmr', Date.now());
    }
    if (state.leaf && !seen.leaf) {
      seen.leaf = true;
      console.log('leaf hmr', Date.now());
    }
  }, 20);
</script>
</body>
</html>
"#;

/// A running fake dev server
pub struct FakeDevServer {
    pub port: u16,
    handle: JoinHandle<()>,
}

impl Drop for FakeDevServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serve [`PAGE`] and the probe state of `root_file` / `leaf_file`
pub async fn start(root_file: PathBuf, leaf_file: PathBuf) -> FakeDevServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let root_file = root_file.clone();
            let leaf_file = leaf_file.clone();
            tokio::spawn(async move {
                let _ = respond(stream, &root_file, &leaf_file).await;
            });
        }
    });

    FakeDevServer { port, handle }
}

fn instrumented(path: &Path, marker: &str) -> bool {
    std::fs::read_to_string(path)
        .map(|content| content.contains(marker))
        .unwrap_or(false)
}

async fn respond(
    mut stream: TcpStream,
    root_file: &Path,
    leaf_file: &Path,
) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let request = String::from_utf8_lossy(&request);
    let path = request.split_whitespace().nth(1).unwrap_or("/");

    let (content_type, body) = match path {
        "/state" => (
            "application/json",
            format!(
                r#"{{"root":{},"leaf":{}}}"#,
                instrumented(root_file, "root hmr"),
                instrumented(leaf_file, "leaf hmr")
            ),
        ),
        "/" => ("text/html", PAGE.to_string()),
        _ => ("text/plain", String::new()),
    };
    let status = if body.is_empty() { "404 Not Found" } else { "200 OK" };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
