//! PDF text extraction, local or remote.
//!
//! Local extraction only pulls literal strings shown by `Tj`/`TJ` operators
//! out of uncompressed content streams; anything richer belongs to a remote
//! extraction service.

use crate::error::Result;
#[cfg(feature = "http")]
use crate::error::SolverError;
use crate::services::TextExtractor;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPdfExtractor;

impl TextExtractor for LocalPdfExtractor {
    fn extract_text(&self, _filename: &str, bytes: &[u8]) -> Result<String> {
        if !bytes.starts_with(b"%PDF") {
            return Ok(String::from_utf8_lossy(bytes).into_owned());
        }
        Ok(shown_strings(bytes).join(" "))
    }
}

/// Literal `( ... )` strings followed by a text-showing operator.
fn shown_strings(bytes: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'(' {
            i += 1;
            continue;
        }
        let mut depth = 1usize;
        let mut buf = Vec::new();
        let mut j = i + 1;
        while j < bytes.len() && depth > 0 {
            match bytes[j] {
                b'\\' if j + 1 < bytes.len() => {
                    buf.push(match bytes[j + 1] {
                        b'n' => b'\n',
                        b't' => b'\t',
                        other => other,
                    });
                    j += 2;
                    continue;
                }
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ => {}
            }
            if depth > 0 {
                buf.push(bytes[j]);
            }
            j += 1;
        }
        if shows_text(&bytes[j.min(bytes.len())..]) {
            let s = String::from_utf8_lossy(&buf).trim().to_string();
            if !s.is_empty() {
                out.push(s);
            }
        }
        i = j;
    }
    out
}

/// The next operator after a string (skipping an array close) is `Tj`/`TJ`/`'`.
fn shows_text(rest: &[u8]) -> bool {
    let tail: Vec<u8> = rest
        .iter()
        .copied()
        .skip_while(|b| b.is_ascii_whitespace() || *b == b']' || b.is_ascii_digit() || *b == b'-')
        .take(2)
        .collect();
    tail.starts_with(b"Tj") || tail.starts_with(b"TJ") || tail.starts_with(b"'") || tail.starts_with(b"(")
}

/// Remote extraction service.
///
/// Request: `{ "filename": "...", "content_b64": "..." }`.
/// Response: `{ "pages": [ { "text": "..." }, ... ] }`, page texts concatenated.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct RemotePdfExtractor {
    endpoint: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl RemotePdfExtractor {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        if timeout_secs == 0 {
            return Err(SolverError::Config(
                "pdf extraction timeout must be > 0 seconds".to_string(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SolverError::Service(format!("http client build failed: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[cfg(feature = "http")]
impl TextExtractor for RemotePdfExtractor {
    fn extract_text(&self, filename: &str, bytes: &[u8]) -> Result<String> {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        #[derive(serde::Serialize)]
        struct Req<'a> {
            filename: &'a str,
            content_b64: String,
        }

        #[derive(serde::Deserialize)]
        struct Page {
            text: String,
        }

        #[derive(serde::Deserialize)]
        struct Resp {
            pages: Vec<Page>,
        }

        let body = Req {
            filename,
            content_b64: STANDARD.encode(bytes),
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| SolverError::Service(format!("pdf extraction request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(SolverError::Service(format!(
                "pdf extraction request failed: status {}",
                resp.status()
            )));
        }
        let parsed: Resp = resp
            .json()
            .map_err(|e| SolverError::Service(format!("invalid pdf extraction response: {e}")))?;
        Ok(parsed.pages.into_iter().map(|p| p.text).collect())
    }
}
