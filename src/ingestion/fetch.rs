//! Document download: URL resolution, format allow-list, size ceiling, and
//! a guaranteed-release temp spool.
//!
//! Unsupported and oversized documents degrade to an empty segment list so
//! the orchestrator can still return a best-effort answer set; only genuine
//! transport failures surface as [`RagError::Fetch`]. This component never
//! retries.

use std::io::Write;
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::Client;
use tempfile::NamedTempFile;
use url::Url;

use super::extract;
use crate::providers::OcrEngine;
use crate::types::{RagError, Segment};

/// Hard ceiling on downloaded payload size: 500 MiB.
pub const MAX_DOCUMENT_BYTES: u64 = 500 * 1024 * 1024;

/// File formats the fetcher knows how to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Txt,
    Pptx,
    Xlsx,
    Xls,
    Image,
}

impl DocumentFormat {
    /// Maps the URL path's extension onto a supported format.
    pub fn from_url(url: &Url) -> Option<Self> {
        let path = url.path().to_lowercase();
        let extension = path.rsplit_once('.')?.1;
        match extension {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Txt),
            "pptx" => Some(Self::Pptx),
            "xlsx" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            "png" | "jpg" | "jpeg" => Some(Self::Image),
            _ => None,
        }
    }
}

/// Resolves the effective document URL, unwrapping redirect-wrapper pages
/// that carry the real target in a `src` query parameter.
pub fn resolve_source_url(raw: &str) -> Result<Url, RagError> {
    let url = Url::parse(raw).map_err(|err| RagError::Fetch(format!("invalid url {raw:?}: {err}")))?;
    if let Some((_, inner)) = url.query_pairs().find(|(key, _)| key == "src") {
        let inner = inner.into_owned();
        return Url::parse(&inner)
            .map_err(|err| RagError::Fetch(format!("invalid src redirect {inner:?}: {err}")));
    }
    Ok(url)
}

/// Downloads a document and extracts its text segments.
#[derive(Clone)]
pub struct DocumentFetcher {
    client: Client,
    ocr: Arc<dyn OcrEngine>,
    max_bytes: u64,
}

impl DocumentFetcher {
    pub fn new(client: Client, ocr: Arc<dyn OcrEngine>) -> Self {
        Self {
            client,
            ocr,
            max_bytes: MAX_DOCUMENT_BYTES,
        }
    }

    /// Overrides the size ceiling; tests exercise the oversize path with
    /// small payloads.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Fetches `url` and returns its extracted segments.
    ///
    /// Empty result means "unsupported or oversized", not failure.
    pub async fn fetch(&self, url: &Url) -> Result<Vec<Segment>, RagError> {
        let Some(format) = DocumentFormat::from_url(url) else {
            tracing::warn!(url = %url, "unsupported document extension, skipping");
            return Ok(Vec::new());
        };

        tracing::debug!(url = %url, ?format, "fetching document");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;

        // Lightweight probe: trust a declared Content-Length before reading
        // the body.
        if let Some(declared) = response.content_length() {
            if declared > self.max_bytes {
                tracing::warn!(url = %url, declared, "document exceeds size ceiling, skipping");
                return Ok(Vec::new());
            }
        }

        // Spool to a temp file; drop releases it on every exit path.
        let mut spool = NamedTempFile::new()?;
        let mut total: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(piece) = stream.next().await {
            let piece = piece?;
            total += piece.len() as u64;
            if total > self.max_bytes {
                tracing::warn!(url = %url, total, "document exceeded size ceiling mid-download, skipping");
                return Ok(Vec::new());
            }
            spool.write_all(&piece)?;
        }
        spool.flush()?;

        let bytes = tokio::fs::read(spool.path()).await?;
        tracing::debug!(url = %url, bytes = bytes.len(), "document downloaded, extracting");
        extract::extract_segments(format, &bytes, url, self.ocr.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockOcrEngine;

    fn fetcher() -> DocumentFetcher {
        DocumentFetcher::new(Client::new(), Arc::new(MockOcrEngine::new("")))
    }

    #[test]
    fn resolves_src_redirect_wrappers() {
        let resolved = resolve_source_url(
            "https://viewer.example.com/open?src=https%3A%2F%2Ffiles.example.com%2Fpolicy.pdf",
        )
        .unwrap();
        assert_eq!(resolved.as_str(), "https://files.example.com/policy.pdf");
    }

    #[test]
    fn passes_plain_urls_through() {
        let resolved = resolve_source_url("https://files.example.com/policy.pdf").unwrap();
        assert_eq!(resolved.as_str(), "https://files.example.com/policy.pdf");
    }

    #[test]
    fn rejects_unparseable_urls() {
        assert!(matches!(
            resolve_source_url("not a url"),
            Err(RagError::Fetch(_))
        ));
    }

    #[test]
    fn format_allow_list_covers_supported_extensions() {
        let supported = [
            ("a.pdf", DocumentFormat::Pdf),
            ("b.DOCX", DocumentFormat::Docx),
            ("c.txt", DocumentFormat::Txt),
            ("d.pptx", DocumentFormat::Pptx),
            ("e.xlsx", DocumentFormat::Xlsx),
            ("f.xls", DocumentFormat::Xls),
            ("g.png", DocumentFormat::Image),
            ("h.jpg", DocumentFormat::Image),
            ("i.jpeg", DocumentFormat::Image),
        ];
        for (name, expected) in supported {
            let url = Url::parse(&format!("https://e.com/{name}")).unwrap();
            assert_eq!(DocumentFormat::from_url(&url), Some(expected), "{name}");
        }
        for name in ["j.exe", "k.html", "noextension", "m.tar.gz"] {
            let url = Url::parse(&format!("https://e.com/{name}")).unwrap();
            assert_eq!(DocumentFormat::from_url(&url), None, "{name}");
        }
    }

    #[test]
    fn query_string_does_not_leak_into_extension() {
        let url = Url::parse("https://e.com/doc.pdf?sig=abc.txt").unwrap();
        assert_eq!(DocumentFormat::from_url(&url), Some(DocumentFormat::Pdf));
    }

    #[tokio::test]
    async fn unsupported_extension_yields_empty_not_error() {
        let server = httpmock::MockServer::start_async().await;
        let url = Url::parse(&server.url("/doc.html")).unwrap();
        let segments = fetcher().fetch(&url).await.unwrap();
        assert!(segments.is_empty());
    }

    #[tokio::test]
    async fn oversized_declared_payload_yields_empty() {
        let server = httpmock::MockServer::start_async().await;
        let body = "x".repeat(64);
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/big.txt");
                then.status(200).body(&body);
            })
            .await;
        let url = Url::parse(&server.url("/big.txt")).unwrap();
        let segments = fetcher().with_max_bytes(16).fetch(&url).await.unwrap();
        assert!(segments.is_empty());
    }

    #[tokio::test]
    async fn fetches_and_extracts_plain_text() {
        let server = httpmock::MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/note.txt");
                then.status(200).body("hello from the document");
            })
            .await;
        let url = Url::parse(&server.url("/note.txt")).unwrap();
        let segments = fetcher().fetch(&url).await.unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].content, "hello from the document");
        assert_eq!(segments[0].metadata.source, url.as_str());
    }

    #[tokio::test]
    async fn network_failure_is_a_fetch_error() {
        let server = httpmock::MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/gone.txt");
                then.status(500);
            })
            .await;
        let url = Url::parse(&server.url("/gone.txt")).unwrap();
        assert!(matches!(
            fetcher().fetch(&url).await,
            Err(RagError::Fetch(_))
        ));
    }
}
