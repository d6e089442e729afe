#![allow(dead_code)]

use clap::Parser;
use std::fs::File;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use tabula::{AppConfig, Args, RunSummary};

pub const PEOPLE_MAPPING: &str = r#"
base = "http://example.org/"

[prefixes]
ex = "http://example.org/ns#"

[[query]]
offset = 1
construct = [
    "<person/{id}> a ex:Person",
    "<person/{id}> ex:name ?name",
]
"#;

pub const PEOPLE_CSV: &str = "id,name\n1,Ann\n2,Bob\n";

pub fn write_file(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("Failed to write test file");
    path
}

pub fn write_gzip(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    let file = File::create(&path).expect("Failed to create gzip file");
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    encoder.write_all(contents).expect("Failed to compress");
    encoder.finish().expect("Failed to finish gzip stream");
    path
}

pub fn path_str(path: &Path) -> String {
    path.display().to_string()
}

pub fn args(argv: &[&str]) -> Args {
    Args::try_parse_from(std::iter::once("tabula").chain(argv.iter().copied()))
        .expect("arguments should parse")
}

/// Run with default configuration and return the output text.
pub fn run_to_string(args: &Args) -> (String, RunSummary) {
    run_with_config(args, &AppConfig::default())
}

pub fn run_with_config(args: &Args, config: &AppConfig) -> (String, RunSummary) {
    let mut out = Vec::new();
    let summary = tabula::run(args, config, &mut out).expect("run should succeed");
    (String::from_utf8(out).expect("output is UTF-8"), summary)
}

/// Serve `body` over HTTP to `requests` consecutive requests; returns the
/// base URL.
pub fn serve_http(body: &str, requests: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test server");
    let addr = listener.local_addr().expect("listener has an address");
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    std::thread::spawn(move || {
        for _ in 0..requests {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request);
            let _ = stream.write_all(response.as_bytes());
        }
    });
    format!("http://{addr}")
}
