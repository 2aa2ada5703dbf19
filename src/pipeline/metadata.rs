//! Repository metadata from the hosting API.

use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{IoContext, MineError, Result};

/// API credentials handed out round-robin.
#[derive(Debug, Default)]
pub struct TokenPool {
    tokens: Vec<String>,
    cursor: Mutex<usize>,
}

impl TokenPool {
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens,
            cursor: Mutex::new(0),
        }
    }

    /// Use `configured` when non-empty, else the first column of `file` if it exists.
    pub fn load(configured: &[String], file: &Path) -> Result<Self> {
        if !configured.is_empty() || !file.is_file() {
            return Ok(Self::new(configured.to_vec()));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(file)?;
        let mut tokens = Vec::new();
        for record in reader.records() {
            let record = record?;
            match record.get(0).map(str::trim) {
                Some(token) if !token.is_empty() => tokens.push(token.to_string()),
                _ => {}
            }
        }
        info!("Loaded {} API tokens from {}", tokens.len(), file.display());
        Ok(Self::new(tokens))
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Next token in rotation.
    pub fn next_token(&self) -> Option<&str> {
        if self.tokens.is_empty() {
            return None;
        }
        let mut cursor = self.cursor.lock();
        let token = &self.tokens[*cursor];
        *cursor = (*cursor + 1) % self.tokens.len();
        Some(token)
    }
}

/// Fetch `url` with the next token and store the raw response in `dest`.
///
/// HTTP error statuses are stored like any other response; only transport
/// failures are errors. Does nothing when the pool is empty.
pub fn fetch_metadata(tokens: &TokenPool, url: &str, dest: &Path) -> Result<bool> {
    let Some(token) = tokens.next_token() else {
        return Ok(false);
    };
    debug!("Fetching metadata from {}", url);
    let response = match ureq::get(url)
        .set("Authorization", &format!("token {}", token))
        .set("Accept", "application/vnd.github+json")
        .set("User-Agent", "repomine")
        .call()
    {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(e) => return Err(MineError::Metadata(format!("{}: {}", url, e))),
    };
    let text = render_response(response)?;
    fs::write(dest, text).at(dest)?;
    Ok(true)
}

/// Status line, headers, blank line, body.
fn render_response(response: ureq::Response) -> Result<String> {
    let mut text = format!(
        "{} {} {}\r\n",
        response.http_version(),
        response.status(),
        response.status_text()
    );
    for name in response.headers_names() {
        if let Some(value) = response.header(&name) {
            text.push_str(&format!("{}: {}\r\n", name, value));
        }
    }
    text.push_str("\r\n");
    let body = response
        .into_string()
        .map_err(|e| MineError::Metadata(format!("reading response body: {}", e)))?;
    text.push_str(&body);
    Ok(text)
}
