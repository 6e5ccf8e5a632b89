//! PubMed E-utilities abstract fetching and the combined-abstract block.

mod parser;

pub use parser::extract_abstract;

use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use tracing::{debug, info};

use crate::cache::{Cache, CacheError, Partition};

const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";
const MAX_RESPONSE_BYTES: usize = 10_000_000;
/// Concurrent efetch requests per combined block.
const FETCH_CONCURRENCY: usize = 4;
/// Separator between abstracts in a combined block.
pub const ABSTRACT_DELIMITER: &str = "\n\n";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid efetch URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("fetch failed: status {0}")]
    Status(u16),

    #[error("response too large (>{} bytes)", MAX_RESPONSE_BYTES)]
    TooLarge,

    #[error("malformed PubMed XML: {0}")]
    Parse(#[from] quick_xml::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Source of abstracts by PMID.
/// Implemented by `PubMedClient` for production; mock implementations used in tests.
pub trait AbstractSource {
    /// `Ok(None)` means the document has no abstract.
    async fn fetch(&self, pmid: &str) -> Result<Option<String>, FetchError>;
}

#[derive(Clone)]
pub struct PubMedClient {
    http: Client,
    base_url: String,
}

impl PubMedClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: EFETCH_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
        }
    }

    async fn download(&self, pmid: &str) -> Result<String, FetchError> {
        let url = url::Url::parse_with_params(
            &self.base_url,
            [("db", "pubmed"), ("id", pmid), ("retmode", "xml")],
        )?;

        let response = self
            .http
            .get(url)
            .header("User-Agent", crate::USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        if let Some(len) = response.content_length()
            && len as usize > MAX_RESPONSE_BYTES
        {
            return Err(FetchError::TooLarge);
        }

        let mut body = Vec::new();
        let mut stream = response;
        while let Some(chunk) = stream.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() > MAX_RESPONSE_BYTES {
                return Err(FetchError::TooLarge);
            }
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

impl AbstractSource for PubMedClient {
    async fn fetch(&self, pmid: &str) -> Result<Option<String>, FetchError> {
        let xml = self.download(pmid).await?;
        let text = extract_abstract(&xml)?;
        debug!(pmid, found = text.is_some(), bytes = xml.len(), "efetch complete");
        Ok(text)
    }
}

/// Result of looking up one PMID for a combined block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractLookup {
    pub pmid: String,
    pub text: Option<String>,
    pub cached: bool,
}

/// Cache-first abstract lookup keyed by the raw PMID. Only found abstracts
/// are stored, so a missing abstract is re-fetched next time.
pub async fn fetch_cached(
    source: &impl AbstractSource,
    cache: &Cache,
    pmid: &str,
) -> Result<(Option<String>, bool), FetchError> {
    if let Some(hit) = cache.get(Partition::Abstracts, pmid).await {
        debug!(pmid, "abstract cache hit");
        return Ok((Some(hit), true));
    }

    let _guard = cache.lock_key(Partition::Abstracts, pmid).await;
    if let Some(hit) = cache.get(Partition::Abstracts, pmid).await {
        return Ok((Some(hit), true));
    }

    let text = source.fetch(pmid).await?;
    if let Some(text) = &text {
        cache.put(Partition::Abstracts, pmid, text.clone()).await?;
    }
    Ok((text, false))
}

/// Splits a comma-separated PMID list, trimming whitespace and dropping empty tokens.
pub fn parse_pmids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn format_entry(pmid: &str, text: &str) -> String {
    format!("(PMID: {pmid}) {text}")
}

#[derive(Debug)]
pub struct Combined {
    pub text: String,
    pub lookups: Vec<AbstractLookup>,
}

impl Combined {
    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.lookups
            .iter()
            .filter(|l| l.text.is_none())
            .map(|l| l.pmid.as_str())
    }

    pub fn all_cached(&self) -> bool {
        self.lookups.iter().all(|l| l.cached)
    }
}

/// Fetches every PMID (cache first) and joins the found abstracts in input
/// order. PMIDs without an abstract contribute nothing to the text.
///
/// The first fetch error fails the whole block.
pub async fn combine(
    source: &impl AbstractSource,
    cache: &Cache,
    pmids: &[String],
) -> Result<Combined, FetchError> {
    let lookups: Vec<AbstractLookup> = stream::iter(pmids)
        .map(|pmid| async move {
            let (text, cached) = fetch_cached(source, cache, pmid).await?;
            Ok::<_, FetchError>(AbstractLookup {
                pmid: pmid.clone(),
                text,
                cached,
            })
        })
        .buffered(FETCH_CONCURRENCY)
        .try_collect()
        .await?;

    let text = lookups
        .iter()
        .filter_map(|l| l.text.as_deref().map(|t| format_entry(&l.pmid, t)))
        .collect::<Vec<_>>()
        .join(ABSTRACT_DELIMITER);

    let combined = Combined { text, lookups };
    info!(
        requested = pmids.len(),
        missing = combined.missing().count(),
        "abstracts combined"
    );
    Ok(combined)
}



#[cfg(test)]
mod http_tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ARTICLE: &str = r#"<?xml version="1.0" ?>
<PubmedArticleSet><PubmedArticle><MedlineCitation><Article>
<Abstract><AbstractText>Effect observed.</AbstractText></Abstract>
</Article></MedlineCitation></PubmedArticle></PubmedArticleSet>"#;

    fn client(server: &MockServer) -> PubMedClient {
        PubMedClient::with_base_url(Client::new(), &format!("{}/efetch.fcgi", server.uri()))
    }

    #[tokio::test]
    async fn fetch_sends_efetch_params_and_extracts_abstract() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/efetch.fcgi"))
            .and(query_param("db", "pubmed"))
            .and(query_param("id", "111"))
            .and(query_param("retmode", "xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server).fetch("111").await.unwrap();
        assert_eq!(text.as_deref(), Some("Effect observed."));
    }

    #[tokio::test]
    async fn fetch_without_abstract_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<PubmedArticleSet></PubmedArticleSet>"),
            )
            .mount(&server)
            .await;

        assert_eq!(client(&server).fetch("222").await.unwrap(), None);
    }

    #[tokio::test]
    async fn fetch_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = client(&server).fetch("111").await;
        assert!(matches!(result, Err(FetchError::Status(500))));
    }

    #[tokio::test]
    async fn fetch_too_large_body_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(MAX_RESPONSE_BYTES + 1)))
            .mount(&server)
            .await;

        let result = client(&server).fetch("111").await;
        assert!(matches!(result, Err(FetchError::TooLarge)));
    }

    #[tokio::test]
    async fn fetch_malformed_xml_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<a><AbstractText>x</b>"))
            .mount(&server)
            .await;

        let result = client(&server).fetch("111").await;
        assert!(matches!(result, Err(FetchError::Parse(_))));
    }
}
