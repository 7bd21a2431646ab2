use std::time::Duration;

use async_trait::async_trait;
use papergraph_core::{PaperRecord, StoreConfig};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::store::{PaperStore, RemoteId};
use crate::error::{Result, ScienceError};
use crate::http::RateLimitedClient;

const PAPERS: &str = "api/papers";
const LINKS: &str = "api/graph-links";

/// Strapi v5 content API: `papers` and `graph-links` collections.
pub struct StrapiStore {
    client: RateLimitedClient,
    base_url: String,
}

impl StrapiStore {
    pub fn new(client: RateLimitedClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &StoreConfig, user_agent: &str) -> Result<Self> {
        let client = RateLimitedClient::with_timeout(
            Duration::ZERO,
            0,
            user_agent,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        let client = match config.token() {
            Some(token) => client.with_bearer(&token)?,
            None => {
                warn!(env = %config.token_env, "no store token set, sending unauthenticated requests");
                client
            }
        };
        Ok(Self::new(client, config.base_url.clone()))
    }

    fn url(&self, collection: &str) -> String {
        format!("{}/{collection}", self.base_url)
    }

    async fn first_match(&self, collection: &str, query: &[(&str, String)]) -> Result<Option<RemoteId>> {
        let body: Value = self.client.get_json(&self.url(collection), query).await?;
        Ok(body
            .get("data")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(remote_id))
    }

    async fn create(&self, collection: &str, key: &str, data: Value) -> Result<RemoteId> {
        let body: Value = self
            .client
            .post_json(&self.url(collection), &json!({ "data": data }))
            .await
            .map_err(|e| ScienceError::RemoteWriteFailed(key.to_string(), e.to_string()))?;
        body.get("data").and_then(remote_id).ok_or_else(|| {
            ScienceError::RemoteWriteFailed(
                key.to_string(),
                "response carries no documentId or id".to_string(),
            )
        })
    }
}

/// `documentId` (Strapi 5) or the numeric `id` (Strapi 4).
fn remote_id(entry: &Value) -> Option<RemoteId> {
    if let Some(document_id) = entry.get("documentId").and_then(Value::as_str) {
        return Some(document_id.to_string());
    }
    match entry.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Strapi 4 relations are filtered by numeric `id`, Strapi 5 by `documentId`.
fn relation_filter(relation: Relation, id: &str) -> &'static str {
    let numeric = id.parse::<u64>().is_ok();
    match (relation, numeric) {
        (Relation::Source, true) => "filters[source][id][$eq]",
        (Relation::Source, false) => "filters[source][documentId][$eq]",
        (Relation::Target, true) => "filters[target][id][$eq]",
        (Relation::Target, false) => "filters[target][documentId][$eq]",
    }
}

#[derive(Clone, Copy)]
enum Relation {
    Source,
    Target,
}

#[async_trait]
impl PaperStore for StrapiStore {
    fn name(&self) -> &str {
        "strapi"
    }

    async fn find_paper_by_external_id(&self, external_id: &str) -> Result<Option<RemoteId>> {
        self.first_match(
            PAPERS,
            &[
                ("filters[openAlexId][$eq]", external_id.to_string()),
                ("pagination[pageSize]", "1".to_string()),
            ],
        )
        .await
    }

    async fn create_paper(&self, record: &PaperRecord) -> Result<RemoteId> {
        let data = serde_json::to_value(record).map_err(|e| ScienceError::Parse(e.to_string()))?;
        let id = self.create(PAPERS, &record.external_id, data).await?;
        debug!(external_id = %record.external_id, remote_id = %id, "created paper");
        Ok(id)
    }

    async fn find_link(&self, source: &RemoteId, target: &RemoteId) -> Result<Option<RemoteId>> {
        for (a, b) in [(source, target), (target, source)] {
            let found = self
                .first_match(
                    LINKS,
                    &[
                        (relation_filter(Relation::Source, a), a.clone()),
                        (relation_filter(Relation::Target, b), b.clone()),
                        ("pagination[pageSize]", "1".to_string()),
                    ],
                )
                .await?;
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    async fn create_link(
        &self,
        source: &RemoteId,
        target: &RemoteId,
        score: f64,
    ) -> Result<RemoteId> {
        let key = format!("{source}<->{target}");
        let data = json!({ "source": source, "target": target, "score": score });
        self.create(LINKS, &key, data).await
    }
}
