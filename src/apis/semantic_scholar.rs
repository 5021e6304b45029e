use super::{squash_whitespace, PaperRecord, PaperSource, Source, SourceError};
use async_trait::async_trait;
use serde::Deserialize;

const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";
const FIELDS: &str = "title,abstract,authors,year,venue,url,citationCount,externalIds,openAccessPdf";
/// The search endpoint rejects larger pages.
const MAX_PAGE_SIZE: u32 = 100;

pub struct SemanticScholarClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarClient {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self::with_base_url(client, BASE_URL, api_key)
    }

    pub fn with_base_url(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn add_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }
}

#[derive(Deserialize)]
struct S2SearchResponse {
    data: Option<Vec<S2Paper>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    paper_id: Option<String>,
    title: Option<String>,
    authors: Option<Vec<S2Author>>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<i32>,
    venue: Option<String>,
    citation_count: Option<u32>,
    url: Option<String>,
    open_access_pdf: Option<S2Pdf>,
    external_ids: Option<S2ExternalIds>,
}

#[derive(Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

#[derive(Deserialize)]
struct S2Author {
    name: Option<String>,
}

#[derive(Deserialize)]
struct S2Pdf {
    url: Option<String>,
}

fn s2_to_paper(p: S2Paper) -> Option<PaperRecord> {
    let paper_id = p.paper_id.filter(|id| !id.trim().is_empty())?;
    let url = p
        .url
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| format!("https://www.semanticscholar.org/paper/{}", paper_id));
    Some(PaperRecord {
        source_id: Source::SemanticScholar.source_id(&paper_id),
        title: squash_whitespace(p.title.as_deref().unwrap_or("")),
        abstract_text: p.abstract_text.unwrap_or_default(),
        authors: p
            .authors
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| a.name)
            .collect(),
        year: p.year,
        venue: p.venue.unwrap_or_default(),
        url,
        pdf_url: p.open_access_pdf.and_then(|pdf| pdf.url).filter(|u| !u.is_empty()),
        citations: p.citation_count.unwrap_or(0),
        source: Source::SemanticScholar,
        doi: p.external_ids.and_then(|ids| ids.doi).filter(|d| !d.is_empty()),
    })
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(SourceError::Api {
        status: status.as_u16(),
        message: message.chars().take(200).collect(),
    })
}

#[async_trait]
impl PaperSource for SemanticScholarClient {
    fn source(&self) -> Source {
        Source::SemanticScholar
    }

    async fn fetch_page(
        &self,
        query: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<PaperRecord>, SourceError> {
        let url = format!("{}/paper/search", self.base_url);
        let limit = limit.min(MAX_PAGE_SIZE).to_string();
        let offset = offset.to_string();
        let resp = self
            .add_auth(self.client.get(&url).query(&[
                ("query", query),
                ("offset", offset.as_str()),
                ("limit", limit.as_str()),
                ("fields", FIELDS),
            ]))
            .send()
            .await?;
        let resp: S2SearchResponse = check_status(resp).await?.json().await?;
        Ok(resp
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(s2_to_paper)
            .collect())
    }

    async fn fetch_paper(&self, native_id: &str) -> Result<Option<PaperRecord>, SourceError> {
        let url = format!("{}/paper/{}", self.base_url, native_id);
        let resp = self
            .add_auth(self.client.get(&url).query(&[("fields", FIELDS)]))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let paper: S2Paper = check_status(resp).await?.json().await?;
        Ok(s2_to_paper(paper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_search() -> serde_json::Value {
        serde_json::json!({
            "total": 2,
            "offset": 10,
            "data": [
                {
                    "paperId": "abc123",
                    "title": "Attention Is All You Need",
                    "abstract": "We propose the Transformer.",
                    "authors": [{"name": "Ashish Vaswani"}, {"name": "Noam Shazeer"}],
                    "year": 2017,
                    "venue": "NeurIPS",
                    "url": "https://www.semanticscholar.org/paper/abc123",
                    "citationCount": 90000,
                    "openAccessPdf": {"url": "https://arxiv.org/pdf/1706.03762"},
                    "externalIds": {"ArXiv": "1706.03762", "DOI": "10.48550/arXiv.1706.03762"}
                },
                {
                    "paperId": "def456",
                    "title": "No Metadata",
                    "abstract": null,
                    "authors": null,
                    "year": null,
                    "venue": null,
                    "url": null,
                    "citationCount": null,
                    "openAccessPdf": null
                },
                {
                    "paperId": null,
                    "title": "Missing Id"
                }
            ]
        })
    }

    #[tokio::test]
    async fn test_search_translates_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/search"))
            .and(query_param("query", "transformers"))
            .and(query_param("offset", "10"))
            .and(query_param("limit", "20"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_search()))
            .expect(1)
            .mount(&server)
            .await;

        let client = SemanticScholarClient::with_base_url(
            reqwest::Client::new(),
            server.uri(),
            Some("secret".into()),
        );
        let papers = client.fetch_page("transformers", 20, 10).await.unwrap();
        assert_eq!(papers.len(), 2);

        let p = &papers[0];
        assert_eq!(p.source_id, "semantic_scholar_abc123");
        assert_eq!(p.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(p.year, Some(2017));
        assert_eq!(p.venue, "NeurIPS");
        assert_eq!(p.citations, 90000);
        assert_eq!(p.pdf_url.as_deref(), Some("https://arxiv.org/pdf/1706.03762"));
        assert_eq!(p.doi.as_deref(), Some("10.48550/arXiv.1706.03762"));

        let bare = &papers[1];
        assert_eq!(bare.citations, 0);
        assert_eq!(bare.doi, None);
        assert_eq!(bare.abstract_text, "");
        assert_eq!(bare.url, "https://www.semanticscholar.org/paper/def456");
    }

    #[tokio::test]
    async fn test_search_caps_page_size() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/search"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = SemanticScholarClient::with_base_url(reqwest::Client::new(), server.uri(), None);
        assert!(client.fetch_page("q", 400, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_search_degrades_to_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/search"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .mount(&server)
            .await;

        let client = SemanticScholarClient::with_base_url(reqwest::Client::new(), server.uri(), None);
        let err = client.fetch_page("q", 10, 0).await.unwrap_err();
        assert!(matches!(err, SourceError::Api { status: 429, .. }));
        assert!(client.search("q", 10, 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_get_details() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "paperId": "abc123",
                "title": "A  Paper\n Title",
                "authors": [{"name": "Grace Hopper"}],
                "year": 1952
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/paper/nope"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = SemanticScholarClient::with_base_url(reqwest::Client::new(), server.uri(), None);
        let p = client.get_details("abc123").await.unwrap();
        assert_eq!(p.title, "A Paper Title");
        assert_eq!(p.source, Source::SemanticScholar);
        assert!(client.get_details("nope").await.is_none());
    }
}
