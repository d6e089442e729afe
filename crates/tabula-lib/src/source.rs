//! Reopenable byte sources and locator classification.

use crate::error::{Result, TabulaError};
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use tabula_cli::CompressionFormat;
#[cfg(feature = "http")]
use tracing::debug;

/// Per-request timeout for remote inputs.
#[cfg(feature = "http")]
pub const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

/// Something a table can open once per pass.
pub trait InputSource {
    /// Open a fresh stream positioned at the start of the data.
    fn open(&self) -> Result<Box<dyn Read>>;

    /// Human-readable name for messages and logs.
    fn describe(&self) -> String;
}

/// A local file, optionally compressed.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    compression: Option<CompressionFormat>,
}

impl FileSource {
    /// Compression is taken from `compression` when given, otherwise
    /// from the file extension.
    pub fn new(path: impl Into<PathBuf>, compression: Option<CompressionFormat>) -> Self {
        let path = path.into();
        let compression = compression.or_else(|| CompressionFormat::from_extension(&path));
        Self { path, compression }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InputSource for FileSource {
    fn open(&self) -> Result<Box<dyn Read>> {
        let file = File::open(&self.path).map_err(|e| TabulaError::io(self.describe(), e))?;
        decompress(Box::new(BufReader::new(file)), self.compression, &self.describe())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Wrap `reader` in the decoder for `compression`, if any.
pub fn decompress(
    reader: Box<dyn Read>,
    compression: Option<CompressionFormat>,
    context: &str,
) -> Result<Box<dyn Read>> {
    let stream: Box<dyn Read> = match compression {
        None => reader,
        Some(CompressionFormat::Gzip) => Box::new(flate2::read::MultiGzDecoder::new(reader)),
        Some(CompressionFormat::Zstd) => Box::new(
            zstd::stream::read::Decoder::new(reader).map_err(|e| TabulaError::io(context, e))?,
        ),
        Some(CompressionFormat::Bzip2) => Box::new(bzip2::read::BzDecoder::new(reader)),
        Some(CompressionFormat::Xz) => Box::new(xz2::read::XzDecoder::new(reader)),
    };
    Ok(stream)
}

/// In-memory data that can be read any number of times.
#[derive(Debug, Clone)]
pub struct BytesSource {
    name: String,
    bytes: Vec<u8>,
}

impl BytesSource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

impl InputSource for BytesSource {
    fn open(&self) -> Result<Box<dyn Read>> {
        Ok(Box::new(Cursor::new(self.bytes.clone())))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// A stream that can be opened exactly once, such as standard input.
pub struct SingleUseSource {
    name: String,
    stream: RefCell<Option<Box<dyn Read>>>,
}

impl SingleUseSource {
    pub fn new(name: impl Into<String>, stream: Box<dyn Read>) -> Self {
        Self {
            name: name.into(),
            stream: RefCell::new(Some(stream)),
        }
    }
}

impl InputSource for SingleUseSource {
    fn open(&self) -> Result<Box<dyn Read>> {
        self.stream
            .borrow_mut()
            .take()
            .ok_or_else(|| TabulaError::MultiPassUnsupported(self.name.clone()))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Where a locator points, decided from its text alone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Location {
    Local(PathBuf),
    Http(String),
    Remote { scheme: String },
}

/// Classify a locator (with any `#` fragment already removed) using
/// string parsing only. `file:` URLs are local.
pub fn classify(locator: &str) -> Location {
    if let Some(idx) = locator.find("://") {
        let scheme = locator[..idx].to_lowercase();
        if scheme == "file" {
            if let Some(path) = url::Url::parse(locator)
                .ok()
                .and_then(|u| u.to_file_path().ok())
            {
                return Location::Local(path);
            }
            return Location::Local(PathBuf::from(&locator[idx + 3..]));
        }
        if scheme == "http" || scheme == "https" {
            return Location::Http(locator.to_string());
        }
        return Location::Remote { scheme };
    }
    Location::Local(PathBuf::from(locator))
}

/// Open a locator as an input source.
pub fn open_locator(
    locator: &str,
    compression: Option<CompressionFormat>,
) -> Result<Box<dyn InputSource>> {
    match classify(locator) {
        Location::Local(path) => Ok(Box::new(FileSource::new(path, compression))),
        #[cfg(feature = "http")]
        Location::Http(url) => Ok(Box::new(UrlSource::new(url, compression))),
        #[cfg(not(feature = "http"))]
        Location::Http(_) => Err(TabulaError::NotFound(format!(
            "{locator} (built without HTTP support)"
        ))),
        Location::Remote { scheme } => Err(TabulaError::NotFound(format!(
            "{locator} (unsupported scheme '{scheme}')"
        ))),
    }
}

/// A resource fetched over HTTP(S). Every pass issues a new request.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct UrlSource {
    url: String,
    compression: Option<CompressionFormat>,
}

#[cfg(feature = "http")]
impl UrlSource {
    /// Compression is taken from `compression` when given, otherwise
    /// from the extension of the URL path.
    pub fn new(url: impl Into<String>, compression: Option<CompressionFormat>) -> Self {
        let url = url.into();
        let compression = compression.or_else(|| {
            url::Url::parse(&url)
                .ok()
                .and_then(|u| CompressionFormat::from_extension(Path::new(u.path())))
        });
        Self { url, compression }
    }
}

#[cfg(feature = "http")]
impl InputSource for UrlSource {
    fn open(&self) -> Result<Box<dyn Read>> {
        debug!(url = %self.url, "requesting");
        let response = ureq::get(&self.url)
            .timeout(HTTP_TIMEOUT)
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(404 | 410, _) => TabulaError::NotFound(self.url.clone()),
                ureq::Error::Status(status, response) => TabulaError::io(
                    self.url.clone(),
                    std::io::Error::other(format!(
                        "server returned {} {}",
                        status,
                        response.status_text()
                    )),
                ),
                ureq::Error::Transport(transport) => TabulaError::io(
                    self.url.clone(),
                    std::io::Error::other(transport.to_string()),
                ),
            })?;
        decompress(response.into_reader(), self.compression, &self.url)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Expand a `*` in the file-name part of a locator. The fragment, if
/// any, is carried over to every match. Locators without a wildcard are
/// returned unchanged.
pub fn expand_locator(locator: &str) -> Result<Vec<String>> {
    let (path_part, fragment) = match locator.find('#') {
        Some(idx) => (&locator[..idx], Some(&locator[idx..])),
        None => (locator, None),
    };
    let file_name = path_part.rsplit(['/', '\\']).next().unwrap_or(path_part);
    if !file_name.contains('*') || path_part.contains("://") {
        return Ok(vec![locator.to_string()]);
    }

    let paths = glob::glob(path_part).map_err(|e| TabulaError::MalformedOption {
        option: "input".to_string(),
        value: locator.to_string(),
        reason: e.to_string(),
    })?;
    let mut expanded = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| {
            let context = e.path().display().to_string();
            TabulaError::io(context, e.into_error())
        })?;
        if path.is_file() {
            expanded.push(format!(
                "{}{}",
                path.display(),
                fragment.unwrap_or_default()
            ));
        }
    }
    if expanded.is_empty() {
        return Err(TabulaError::NotFound(format!("no files match {path_part}")));
    }
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn read_to_string(source: &dyn InputSource) -> String {
        let mut out = String::new();
        source.open().unwrap().read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn classify_local_paths() {
        assert_eq!(classify("data.csv"), Location::Local(PathBuf::from("data.csv")));
        assert_eq!(
            classify("/tmp/data.csv"),
            Location::Local(PathBuf::from("/tmp/data.csv"))
        );
    }

    #[test]
    fn classify_file_url() {
        assert_eq!(
            classify("file:///tmp/data.csv"),
            Location::Local(PathBuf::from("/tmp/data.csv"))
        );
    }

    #[test]
    fn classify_remote() {
        assert_eq!(
            classify("HTTPS://example.com/data.csv"),
            Location::Http("HTTPS://example.com/data.csv".to_string())
        );
        assert_eq!(
            classify("s3://bucket/key.csv"),
            Location::Remote {
                scheme: "s3".to_string()
            }
        );
        assert!(matches!(
            open_locator("s3://bucket/key.csv", None),
            Err(TabulaError::NotFound(_))
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        let source = FileSource::new("/definitely/not/here.csv", None);
        assert!(matches!(source.open(), Err(TabulaError::NotFound(_))));
    }

    #[test]
    fn file_source_reopens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "x\n1\n").unwrap();
        let source = FileSource::new(&path, None);
        assert_eq!(read_to_string(&source), "x\n1\n");
        assert_eq!(read_to_string(&source), "x\n1\n");
    }

    #[test]
    fn gzip_detected_from_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.csv.gz");
        let file = File::create(&path).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(b"x,y\n1,2\n").unwrap();
        encoder.finish().unwrap();
        let source = FileSource::new(&path, None);
        assert_eq!(read_to_string(&source), "x,y\n1,2\n");
    }

    #[test]
    fn decompress_gzip_stream() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"piped").unwrap();
        let bytes = encoder.finish().unwrap();
        let mut out = String::new();
        decompress(
            Box::new(Cursor::new(bytes)),
            Some(CompressionFormat::Gzip),
            "pipe",
        )
        .unwrap()
        .read_to_string(&mut out)
        .unwrap();
        assert_eq!(out, "piped");
    }

    #[test]
    fn single_use_source_fails_second_open() {
        let source = SingleUseSource::new("pipe", Box::new(Cursor::new(b"abc".to_vec())));
        assert_eq!(read_to_string(&source), "abc");
        assert!(matches!(
            source.open(),
            Err(TabulaError::MultiPassUnsupported(ref name)) if name == "pipe"
        ));
    }

    #[test]
    fn expand_without_wildcard_is_identity() {
        assert_eq!(
            expand_locator("data.csv#header=absent").unwrap(),
            vec!["data.csv#header=absent"]
        );
    }

    #[test]
    fn expand_wildcard_keeps_fragment() {
        let dir = TempDir::new().unwrap();
        for name in ["b.csv", "a.csv", "c.txt"] {
            std::fs::write(dir.path().join(name), "x\n").unwrap();
        }
        let pattern = format!("{}/*.csv#delimiter=tab", dir.path().display());
        let expanded = expand_locator(&pattern).unwrap();
        assert_eq!(expanded.len(), 2);
        assert!(expanded[0].ends_with("a.csv#delimiter=tab"));
        assert!(expanded[1].ends_with("b.csv#delimiter=tab"));
    }

    #[test]
    fn expand_without_matches_is_not_found() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/*.csv", dir.path().display());
        assert!(matches!(
            expand_locator(&pattern),
            Err(TabulaError::NotFound(_))
        ));
    }

    #[cfg(feature = "http")]
    mod http {
        use super::*;
        use std::net::TcpListener;

        /// Answer one request per entry of `responses`, in order.
        fn serve(responses: Vec<String>) -> String {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            std::thread::spawn(move || {
                for response in responses {
                    let (mut stream, _) = listener.accept().unwrap();
                    let mut request = [0u8; 4096];
                    let _ = stream.read(&mut request);
                    stream.write_all(response.as_bytes()).unwrap();
                }
            });
            format!("http://{addr}")
        }

        fn response(status: &str, body: &str) -> String {
            format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
        }

        #[test]
        fn url_source_reopens_with_a_new_request() {
            let base = serve(vec![
                response("200 OK", "x\n1\n"),
                response("200 OK", "x\n1\n"),
            ]);
            let source = open_locator(&format!("{base}/data.csv"), None).unwrap();
            assert_eq!(source.describe(), format!("{base}/data.csv"));
            assert_eq!(read_to_string(source.as_ref()), "x\n1\n");
            assert_eq!(read_to_string(source.as_ref()), "x\n1\n");
        }

        #[test]
        fn http_404_is_not_found() {
            let base = serve(vec![response("404 Not Found", "")]);
            let source = UrlSource::new(format!("{base}/missing.csv"), None);
            assert!(matches!(
                source.open(),
                Err(TabulaError::NotFound(ref url)) if url.ends_with("/missing.csv")
            ));
        }

        #[test]
        fn server_error_is_io() {
            let base = serve(vec![response("500 Internal Server Error", "")]);
            let source = UrlSource::new(format!("{base}/data.csv"), None);
            assert!(matches!(source.open(), Err(TabulaError::Io { .. })));
        }

        #[test]
        fn compression_from_url_path() {
            let source = UrlSource::new("http://example.com/a/data.csv.gz?v=2", None);
            assert_eq!(source.compression, Some(CompressionFormat::Gzip));
        }
    }
}
