use std::time::Duration;

use async_trait::async_trait;
use papergraph_core::CatalogConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ScienceError};
use crate::http::RateLimitedClient;
use crate::reconstruct::InvertedIndex;
use crate::sources::{AuthorMatch, WorksCatalog, WorksPage};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenAlexOpenAccess {
    pub is_oa: bool,
    pub oa_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenAlexAuthorship {
    pub author_id: Option<String>,
    pub display_name: Option<String>,
}

/// Typed view of one raw OpenAlex work. Only `id` is required.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenAlexWork {
    pub id: String,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub publication_year: Option<i32>,
    pub cited_by_count: Option<u32>,
    pub topics: Vec<String>,
    pub authorships: Vec<OpenAlexAuthorship>,
    pub open_access: OpenAlexOpenAccess,
    pub abstract_inverted_index: Option<InvertedIndex>,
}

impl OpenAlexWork {
    pub fn from_json(v: &Value) -> Result<Self> {
        let id = v
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ScienceError::Parse("OpenAlex work without an id".to_string()))?
            .to_string();

        let title = v
            .get("title")
            .and_then(Value::as_str)
            .or_else(|| v.get("display_name").and_then(Value::as_str))
            .map(ToOwned::to_owned);

        let publication_year = v
            .get("publication_year")
            .and_then(Value::as_i64)
            .and_then(|n| i32::try_from(n).ok());

        let cited_by_count = v
            .get("cited_by_count")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok());

        let topics = v
            .get("topics")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|topic| topic.get("display_name").and_then(Value::as_str))
                    .map(ToOwned::to_owned)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let authorships = v
            .get("authorships")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().map(parse_authorship).collect::<Vec<_>>())
            .unwrap_or_default();

        Ok(Self {
            id,
            doi: v.get("doi").and_then(Value::as_str).map(ToOwned::to_owned),
            title,
            publication_year,
            cited_by_count,
            topics,
            authorships,
            open_access: parse_open_access(v.get("open_access")),
            abstract_inverted_index: parse_inverted_index(v.get("abstract_inverted_index")),
        })
    }
}

pub struct OpenAlexSource {
    client: RateLimitedClient,
    base_url: String,
    page_size: u32,
    search_limit: u32,
}

impl OpenAlexSource {
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let client = RateLimitedClient::new(
            config.politeness_delay(),
            config.max_retries,
            &config.user_agent(),
        )?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size.clamp(1, 200),
            search_limit: config.search_limit.clamp(1, 200),
        })
    }

    pub fn with_params(base_url: &str, min_interval: Duration) -> Result<Self> {
        Self::from_config(&CatalogConfig {
            base_url: base_url.to_string(),
            politeness_delay_ms: saturating_millis(min_interval),
            ..CatalogConfig::default()
        })
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl WorksCatalog for OpenAlexSource {
    fn name(&self) -> &str {
        "openalex"
    }

    async fn find_author(
        &self,
        name: &str,
        institution: Option<&str>,
    ) -> Result<Option<AuthorMatch>> {
        let url = format!("{}/authors", self.base_url);
        let mut query = vec![
            ("search", name.to_string()),
            ("per-page", self.search_limit.to_string()),
        ];
        if let Some(inst) = institution.map(str::trim).filter(|s| !s.is_empty()) {
            query.push((
                "filter",
                format!("last_known_institution.display_name.search:{inst}"),
            ));
        }

        let json: Value = self
            .client
            .get_json(&url, &query)
            .await
            .map_err(catalog_unavailable)?;

        let author = json
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .and_then(|first| {
                let id = first.get("id").and_then(Value::as_str)?;
                Some(AuthorMatch {
                    id: id.to_string(),
                    display_name: first
                        .get("display_name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    works_count: first
                        .get("works_count")
                        .and_then(Value::as_u64)
                        .and_then(|n| u32::try_from(n).ok()),
                })
            });
        Ok(author)
    }

    async fn fetch_works_page(&self, author_id: &str, cursor: &str) -> Result<WorksPage> {
        let url = format!("{}/works", self.base_url);
        let query = [
            ("filter", format!("author.id:{author_id},is_oa:true")),
            ("per-page", self.page_size.to_string()),
            ("cursor", cursor.to_string()),
        ];
        debug!(author_id, cursor, "fetching works page");

        let json: Value = self
            .client
            .get_json(&url, &query)
            .await
            .map_err(catalog_unavailable)?;

        let works = json
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| ScienceError::Parse("works page without results".to_string()))?
            .iter()
            .map(OpenAlexWork::from_json)
            .collect::<Result<Vec<_>>>()?;

        let next_cursor = json
            .get("meta")
            .and_then(|meta| meta.get("next_cursor"))
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .map(ToOwned::to_owned);

        Ok(WorksPage { works, next_cursor })
    }
}

fn catalog_unavailable(err: ScienceError) -> ScienceError {
    if err.is_network() {
        ScienceError::CatalogUnavailable(err.to_string())
    } else {
        err
    }
}

fn parse_open_access(value: Option<&Value>) -> OpenAlexOpenAccess {
    let Some(obj) = value.and_then(Value::as_object) else {
        return OpenAlexOpenAccess::default();
    };

    OpenAlexOpenAccess {
        is_oa: obj.get("is_oa").and_then(Value::as_bool).unwrap_or(false),
        oa_url: obj
            .get("oa_url")
            .and_then(Value::as_str)
            .filter(|url| !url.trim().is_empty())
            .map(ToOwned::to_owned),
    }
}

fn parse_authorship(value: &Value) -> OpenAlexAuthorship {
    let author = value.get("author").and_then(Value::as_object);
    OpenAlexAuthorship {
        author_id: author
            .and_then(|obj| obj.get("id"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        display_name: author
            .and_then(|obj| obj.get("display_name"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
    }
}

// Non-integer positions are dropped here; sign checks happen at reconstruction.
fn parse_inverted_index(value: Option<&Value>) -> Option<InvertedIndex> {
    let obj = value.and_then(Value::as_object)?;
    Some(
        obj.iter()
            .map(|(word, positions)| {
                let positions = positions
                    .as_array()
                    .map(|arr| arr.iter().filter_map(Value::as_i64).collect::<Vec<_>>())
                    .unwrap_or_default();
                (word.clone(), positions)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[test]
    fn parses_typed_work_from_json() {
        let raw = json!({
            "id": "https://openalex.org/W1",
            "display_name": "Fallback title",
            "doi": "https://doi.org/10.1/abc",
            "publication_year": 2020,
            "cited_by_count": 12,
            "topics": [{"display_name": "T1"}, {"display_name": "T2"}],
            "authorships": [
                {"author": {"id": "https://openalex.org/A1", "display_name": "Ada"}},
                {"author": {}}
            ],
            "open_access": {"is_oa": true, "oa_url": "https://example.org/p.pdf"},
            "abstract_inverted_index": {"hello": [0], "world": [1, 2.5]}
        });
        let work = OpenAlexWork::from_json(&raw).unwrap();
        assert_eq!(work.title.as_deref(), Some("Fallback title"));
        assert_eq!(work.publication_year, Some(2020));
        assert_eq!(work.cited_by_count, Some(12));
        assert_eq!(work.topics, vec!["T1", "T2"]);
        assert_eq!(work.authorships.len(), 2);
        assert_eq!(work.authorships[1].display_name, None);
        assert!(work.open_access.is_oa);
        let index = work.abstract_inverted_index.unwrap();
        assert_eq!(index["world"], vec![1]);
    }

    #[test]
    fn work_without_id_is_rejected() {
        let err = OpenAlexWork::from_json(&json!({"title": "No id"})).unwrap_err();
        assert!(matches!(err, ScienceError::Parse(_)));
        assert!(OpenAlexWork::from_json(&json!({"id": "  "})).is_err());
    }

    #[tokio::test]
    async fn find_author_takes_first_result() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/authors")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("search".into(), "Ada Lovelace".into()),
                Matcher::UrlEncoded("per-page".into(), "5".into()),
                Matcher::UrlEncoded(
                    "filter".into(),
                    "last_known_institution.display_name.search:Analytical".into(),
                ),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"results": [
                    {"id": "https://openalex.org/A1", "display_name": "Ada Lovelace", "works_count": 7},
                    {"id": "https://openalex.org/A2", "display_name": "Ada L."}
                ]}"#,
            )
            .create_async()
            .await;

        let source = OpenAlexSource::with_params(&server.url(), Duration::ZERO).unwrap();
        let author = source
            .find_author("Ada Lovelace", Some("Analytical"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(author.id, "https://openalex.org/A1");
        assert_eq!(author.works_count, Some(7));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn find_author_without_results_is_none() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/authors")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"results": []}"#)
            .create_async()
            .await;

        let source = OpenAlexSource::with_params(&server.url(), Duration::ZERO).unwrap();
        assert_eq!(source.find_author("Nobody", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn works_page_sends_filter_and_cursor() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("filter".into(), "author.id:A1,is_oa:true".into()),
                Matcher::UrlEncoded("per-page".into(), "50".into()),
                Matcher::UrlEncoded("cursor".into(), "*".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"meta": {"next_cursor": "abc"},
                    "results": [{"id": "https://openalex.org/W1", "title": "One"}]}"#,
            )
            .create_async()
            .await;

        let source = OpenAlexSource::with_params(&server.url(), Duration::ZERO).unwrap();
        let page = source.fetch_works_page("A1", "*").await.unwrap();
        assert_eq!(page.works.len(), 1);
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn last_page_has_no_cursor() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/works")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"meta": {"next_cursor": null}, "results": []}"#)
            .create_async()
            .await;

        let source = OpenAlexSource::with_params(&server.url(), Duration::ZERO).unwrap();
        let page = source.fetch_works_page("A1", "c9").await.unwrap();
        assert!(page.works.is_empty());
        assert_eq!(page.next_cursor, None);
    }

    #[tokio::test]
    async fn server_error_is_catalog_unavailable() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/works")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let source = OpenAlexSource::with_params(&server.url(), Duration::ZERO).unwrap();
        let err = source.fetch_works_page("A1", "*").await.unwrap_err();
        assert!(matches!(err, ScienceError::CatalogUnavailable(_)));
    }

    #[test]
    fn oversized_delay_saturates() {
        assert_eq!(saturating_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }
}
