use reqwest::Method;
use serde_json::Value;

/// Binary payload for a photo upload.
///
/// * `contents` binary contents of the file
/// * `mime_type` Compliant mime type string of the data `image/png`, `tiff` etc.
/// * `file_name` name of the file, as a relative path
#[derive(Clone, Debug)]
pub struct FileUpload {
    pub contents: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

#[derive(Clone, Debug, Default)]
pub(crate) enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(FileUpload),
}

/// A single outbound request.
///
/// Kept in a shape that can be materialized into a fresh `reqwest::Request`
/// more than once: the retry that follows a token refresh rebuilds the
/// request (multipart body included) from this spec.
#[derive(Clone, Debug)]
pub(crate) struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    /// Attach a pre-encoded query string. An empty string means no query.
    pub fn query(mut self, query: String) -> Self {
        if !query.is_empty() {
            self.query = Some(query);
        }
        self
    }

    #[allow(dead_code)]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    pub fn multipart(mut self, file: FileUpload) -> Self {
        self.body = RequestBody::Multipart(file);
        self
    }
}
