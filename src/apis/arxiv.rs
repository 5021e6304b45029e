use super::{squash_whitespace, PaperRecord, PaperSource, Source, SourceError};
use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;

const BASE_URL: &str = "https://export.arxiv.org/api/query";
const ATOM_NS: &[u8] = b"http://www.w3.org/2005/Atom";
const ARXIV_NS: &[u8] = b"http://arxiv.org/schemas/atom";

pub struct ArxivClient {
    client: reqwest::Client,
    base_url: String,
}

impl ArxivClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, BASE_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<Vec<PaperRecord>, SourceError> {
        let resp = self.client.get(&self.base_url).query(params).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }
        parse_atom_feed(&body)
    }
}

#[async_trait]
impl PaperSource for ArxivClient {
    fn source(&self) -> Source {
        Source::Arxiv
    }

    async fn fetch_page(
        &self,
        query: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<PaperRecord>, SourceError> {
        let search_query = format!("all:{}", query);
        let start = offset.to_string();
        let max_results = limit.to_string();
        self.query(&[
            ("search_query", search_query.as_str()),
            ("start", start.as_str()),
            ("max_results", max_results.as_str()),
            ("sortBy", "relevance"),
            ("sortOrder", "descending"),
        ])
        .await
    }

    async fn fetch_paper(&self, native_id: &str) -> Result<Option<PaperRecord>, SourceError> {
        let results = self.query(&[("id_list", native_id)]).await?;
        Ok(results.into_iter().next())
    }
}

/// Extract the native arXiv id from an entry `<id>` such as
/// `http://arxiv.org/abs/2301.12345v1` or `http://arxiv.org/abs/hep-th/9901001v2`.
fn native_id(entry_id: &str) -> Option<String> {
    let entry_id = entry_id.trim();
    if entry_id.contains("/api/errors") {
        return None;
    }
    let id = match entry_id.find("/abs/") {
        Some(pos) => &entry_id[pos + "/abs/".len()..],
        None if !entry_id.contains("://") => entry_id,
        None => return None,
    };
    let id = id.trim_matches('/');
    (!id.is_empty()).then(|| id.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Title,
    Summary,
    Id,
    Published,
    AuthorName,
    JournalRef,
    Doi,
}

#[derive(Default)]
struct EntryBuilder {
    title: String,
    summary: String,
    id: String,
    published: String,
    authors: Vec<String>,
    author_name: String,
    journal_ref: String,
    doi: String,
}

impl EntryBuilder {
    fn push_text(&mut self, field: Field, text: &str) {
        match field {
            Field::Title => self.title.push_str(text),
            Field::Summary => self.summary.push_str(text),
            Field::Id => self.id.push_str(text),
            Field::Published => self.published.push_str(text),
            Field::AuthorName => self.author_name.push_str(text),
            Field::JournalRef => self.journal_ref.push_str(text),
            Field::Doi => self.doi.push_str(text),
        }
    }

    fn finish_author(&mut self) {
        let name = squash_whitespace(&self.author_name);
        if !name.is_empty() {
            self.authors.push(name);
        }
        self.author_name.clear();
    }

    fn build(self) -> Option<PaperRecord> {
        let id = native_id(&self.id)?;
        let title = squash_whitespace(&self.title);
        if title.is_empty() {
            return None;
        }
        let journal_ref = squash_whitespace(&self.journal_ref);
        let doi = squash_whitespace(&self.doi);
        Some(PaperRecord {
            source_id: Source::Arxiv.source_id(&id),
            title,
            abstract_text: squash_whitespace(&self.summary),
            authors: self.authors,
            year: self.published.trim().get(..4).and_then(|y| y.parse().ok()),
            venue: if journal_ref.is_empty() {
                "arXiv".to_string()
            } else {
                journal_ref
            },
            url: format!("https://arxiv.org/abs/{}", id),
            pdf_url: Some(format!("https://arxiv.org/pdf/{}", id)),
            citations: 0,
            source: Source::Arxiv,
            doi: (!doi.is_empty()).then_some(doi),
        })
    }
}

fn is_ns(resolved: &ResolveResult<'_>, ns: &[u8]) -> bool {
    matches!(resolved, ResolveResult::Bound(Namespace(bound)) if *bound == ns)
}

fn field_for(resolved: &ResolveResult<'_>, e: &BytesStart<'_>, in_author: bool) -> Option<Field> {
    let local = e.local_name();
    if is_ns(resolved, ATOM_NS) {
        match local.as_ref() {
            b"title" => Some(Field::Title),
            b"summary" => Some(Field::Summary),
            b"id" => Some(Field::Id),
            b"published" => Some(Field::Published),
            b"name" if in_author => Some(Field::AuthorName),
            _ => None,
        }
    } else if is_ns(resolved, ARXIV_NS) {
        match local.as_ref() {
            b"journal_ref" => Some(Field::JournalRef),
            b"doi" => Some(Field::Doi),
            _ => None,
        }
    } else {
        None
    }
}

/// Parse an arXiv Atom feed into paper records.
///
/// Elements are matched by namespace, so the feed-level `<title>`/`<id>`
/// and foreign elements are ignored. Entries without an id or title are
/// skipped, as are the API's error entries.
pub(crate) fn parse_atom_feed(xml: &str) -> Result<Vec<PaperRecord>, SourceError> {
    let mut reader = NsReader::from_str(xml);
    let mut papers = Vec::new();
    let mut entry: Option<EntryBuilder> = None;
    let mut field: Option<Field> = None;
    let mut in_author = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_resolved_event_into(&mut buf) {
            Ok((resolved, Event::Start(e))) => {
                let is_atom = is_ns(&resolved, ATOM_NS);
                match e.local_name().as_ref() {
                    b"entry" if is_atom => {
                        entry = Some(EntryBuilder::default());
                        field = None;
                        in_author = false;
                    }
                    b"author" if is_atom && entry.is_some() => in_author = true,
                    _ if entry.is_some() => field = field_for(&resolved, &e, in_author),
                    _ => {}
                }
            }
            Ok((_, Event::Text(e))) => {
                if let (Some(current), Some(f)) = (entry.as_mut(), field) {
                    let text = e.unescape().unwrap_or_default();
                    current.push_text(f, &text);
                }
            }
            Ok((_, Event::CData(e))) => {
                if let (Some(current), Some(f)) = (entry.as_mut(), field) {
                    current.push_text(f, &String::from_utf8_lossy(&e));
                }
            }
            Ok((resolved, Event::End(e))) => {
                let is_atom = is_ns(&resolved, ATOM_NS);
                match e.local_name().as_ref() {
                    b"entry" if is_atom => {
                        if let Some(done) = entry.take() {
                            match done.build() {
                                Some(paper) => papers.push(paper),
                                None => tracing::debug!("Skipping incomplete arXiv entry"),
                            }
                        }
                        in_author = false;
                    }
                    b"author" if is_atom => {
                        if let Some(current) = entry.as_mut() {
                            current.finish_author();
                        }
                        in_author = false;
                    }
                    _ => {}
                }
                field = None;
            }
            Ok((_, Event::Eof)) => break,
            Err(e) => return Err(SourceError::Parse(format!("XML parse error: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(papers)
}
