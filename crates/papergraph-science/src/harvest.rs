use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use papergraph_core::{CatalogConfig, PaperRecord};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::{Result, ScienceError};
use crate::normalize::normalize_works;
use crate::sources::openalex::OpenAlexWork;
use crate::sources::{AuthorMatch, INITIAL_CURSOR, WorksCatalog};

/// Outcome of one complete harvest.
#[derive(Debug, Clone, Default)]
pub struct Harvest {
    pub author_id: String,
    pub works: Vec<OpenAlexWork>,
    pub pages: usize,
}

impl Harvest {
    pub fn records(&self) -> Vec<PaperRecord> {
        normalize_works(&self.works)
    }

    pub fn stats(&self) -> HarvestStats {
        HarvestStats {
            author_id: self.author_id.clone(),
            pages: self.pages,
            records: self.works.len(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestStats {
    pub author_id: String,
    pub pages: usize,
    pub records: usize,
}

/// Pages through an author's works, one cursor at a time.
///
/// Successive page requests are separated by at least `politeness_delay`.
/// A failing page aborts the whole harvest.
pub struct CorpusHarvester<C: WorksCatalog> {
    catalog: Arc<C>,
    politeness_delay: Duration,
}

impl<C: WorksCatalog> CorpusHarvester<C> {
    pub fn new(catalog: Arc<C>, politeness_delay: Duration) -> Self {
        Self {
            catalog,
            politeness_delay,
        }
    }

    pub fn from_config(catalog: Arc<C>, config: &CatalogConfig) -> Self {
        Self::new(catalog, config.politeness_delay())
    }

    pub async fn find_author(
        &self,
        name: &str,
        institution: Option<&str>,
    ) -> Result<Option<AuthorMatch>> {
        let author = self.catalog.find_author(name, institution).await?;
        match &author {
            Some(found) => info!(id = %found.id, name = %found.display_name, "found author"),
            None => info!(name, "no author found"),
        }
        Ok(author)
    }

    pub async fn harvest(&self, author_id: &str) -> Result<Harvest> {
        let mut works = Vec::new();
        let mut cursor = INITIAL_CURSOR.to_string();
        let mut used = HashSet::new();
        let mut pages = 0usize;
        let mut last_request: Option<Instant> = None;

        loop {
            if let Some(t) = last_request {
                let elapsed = t.elapsed();
                if elapsed < self.politeness_delay {
                    sleep(self.politeness_delay - elapsed).await;
                }
            }
            last_request = Some(Instant::now());
            used.insert(cursor.clone());

            let page = self.catalog.fetch_works_page(author_id, &cursor).await?;
            pages += 1;
            debug!(page = pages, records = page.works.len(), "received works page");
            works.extend(page.works);

            match page.next_cursor {
                Some(next) if used.contains(&next) => {
                    return Err(ScienceError::Parse(format!(
                        "{} returned an already used cursor: {next}",
                        self.catalog.name()
                    )));
                }
                Some(next) => cursor = next,
                None => break,
            }
        }

        info!(author_id, pages, records = works.len(), "harvest complete");
        Ok(Harvest {
            author_id: author_id.to_string(),
            works,
            pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::WorksPage;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ScriptedCatalog {
        pages: HashMap<String, std::result::Result<WorksPage, String>>,
        calls: Mutex<Vec<(String, Instant)>>,
    }

    impl ScriptedCatalog {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn page(mut self, cursor: &str, ids: &[&str], next: Option<&str>) -> Self {
            let works = ids
                .iter()
                .map(|id| OpenAlexWork {
                    id: id.to_string(),
                    ..Default::default()
                })
                .collect();
            self.pages.insert(
                cursor.to_string(),
                Ok(WorksPage {
                    works,
                    next_cursor: next.map(ToOwned::to_owned),
                }),
            );
            self
        }

        fn failing(mut self, cursor: &str) -> Self {
            self.pages.insert(cursor.to_string(), Err("boom".to_string()));
            self
        }

        fn cursors(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
        }
    }

    #[async_trait]
    impl WorksCatalog for ScriptedCatalog {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn find_author(&self, name: &str, _: Option<&str>) -> Result<Option<AuthorMatch>> {
            Ok((name == "Ada").then(|| AuthorMatch {
                id: "A1".to_string(),
                display_name: "Ada".to_string(),
                works_count: None,
            }))
        }

        async fn fetch_works_page(&self, _author_id: &str, cursor: &str) -> Result<WorksPage> {
            self.calls
                .lock()
                .unwrap()
                .push((cursor.to_string(), Instant::now()));
            match self.pages.get(cursor) {
                Some(Ok(page)) => Ok(page.clone()),
                Some(Err(msg)) => Err(ScienceError::CatalogUnavailable(msg.clone())),
                None => Err(ScienceError::CatalogUnavailable(format!("unknown cursor {cursor}"))),
            }
        }
    }

    #[tokio::test]
    async fn follows_cursors_until_absent() {
        let catalog = Arc::new(
            ScriptedCatalog::new()
                .page("*", &["W1", "W2"], Some("c1"))
                .page("c1", &["W3"], Some("c2"))
                .page("c2", &["W4"], None),
        );
        let harvester = CorpusHarvester::new(catalog.clone(), Duration::ZERO);

        let harvest = harvester.harvest("A1").await.unwrap();
        let ids: Vec<_> = harvest.works.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["W1", "W2", "W3", "W4"]);
        assert_eq!(harvest.pages, 3);
        assert_eq!(catalog.cursors(), vec!["*", "c1", "c2"]);
    }

    #[tokio::test]
    async fn waits_between_page_requests() {
        let delay = Duration::from_millis(40);
        let catalog = Arc::new(
            ScriptedCatalog::new()
                .page("*", &["W1"], Some("c1"))
                .page("c1", &["W2"], Some("c2"))
                .page("c2", &["W3"], None),
        );
        let harvester = CorpusHarvester::new(catalog.clone(), delay);
        harvester.harvest("A1").await.unwrap();

        // Timestamps are taken inside the fake, just after the harvester's own.
        let slack = Duration::from_millis(1);
        let calls = catalog.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert!(pair[1].1.duration_since(pair[0].1) + slack >= delay);
        }
    }

    #[tokio::test]
    async fn failing_page_aborts_without_partial_corpus() {
        let catalog = Arc::new(
            ScriptedCatalog::new()
                .page("*", &["W1"], Some("c1"))
                .failing("c1"),
        );
        let harvester = CorpusHarvester::new(catalog.clone(), Duration::ZERO);
        let err = harvester.harvest("A1").await.unwrap_err();
        assert!(matches!(err, ScienceError::CatalogUnavailable(_)));
        assert_eq!(catalog.cursors(), vec!["*", "c1"]);
    }

    #[tokio::test]
    async fn repeated_cursor_is_an_error() {
        let catalog = Arc::new(ScriptedCatalog::new().page("*", &["W1"], Some("*")));
        let harvester = CorpusHarvester::new(catalog, Duration::ZERO);
        assert!(matches!(
            harvester.harvest("A1").await,
            Err(ScienceError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn cursor_cycle_is_an_error() {
        let catalog = Arc::new(
            ScriptedCatalog::new()
                .page("*", &["W1"], Some("c1"))
                .page("c1", &["W2"], Some("c2"))
                .page("c2", &["W3"], Some("c1")),
        );
        let harvester = CorpusHarvester::new(catalog.clone(), Duration::ZERO);
        assert!(matches!(
            harvester.harvest("A1").await,
            Err(ScienceError::Parse(_))
        ));
        assert_eq!(catalog.cursors(), vec!["*", "c1", "c2"]);
    }

    #[tokio::test]
    async fn empty_single_page_is_an_empty_corpus() {
        let catalog = Arc::new(ScriptedCatalog::new().page("*", &[], None));
        let harvester = CorpusHarvester::new(catalog, Duration::ZERO);
        let harvest = harvester.harvest("A1").await.unwrap();
        assert!(harvest.works.is_empty());
        assert_eq!(harvest.stats().pages, 1);
    }

    #[tokio::test]
    async fn unknown_author_is_none() {
        let harvester = CorpusHarvester::new(Arc::new(ScriptedCatalog::new()), Duration::ZERO);
        assert!(harvester.find_author("Nobody", None).await.unwrap().is_none());
        assert_eq!(
            harvester.find_author("Ada", None).await.unwrap().unwrap().id,
            "A1"
        );
    }

    #[tokio::test]
    async fn records_are_normalized_in_catalog_order() {
        let catalog = Arc::new(ScriptedCatalog::new().page("*", &["W2", "W1"], None));
        let harvester = CorpusHarvester::new(catalog, Duration::ZERO);
        let records = harvester.harvest("A1").await.unwrap().records();
        let ids: Vec<_> = records.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, vec!["W2", "W1"]);
    }
}
