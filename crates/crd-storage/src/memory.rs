//! Fixture-backed [`DashboardStore`], used when no database is configured and by tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crd_core::{
    Analysis, AnalysisFilter, AnalysisSort, Article, ArticleFilter, ArticleSort, ArticleStatus,
    Contractor, ContractorFilter, ContractorSort, DistinctField, ListQuery, Page, Review,
    ReviewFilter, ReviewSort, SearchFilter, SearchSort, SearchedCity, SortKey, TableCounts,
    UsageFilter, UsageLog, UsageSort,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{DashboardStore, StorageError, StorageResult};

/// On-disk shape of `fixtures/dashboard.json`: one array per table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardFixture {
    pub contractors: Vec<Contractor>,
    pub reviews: Vec<Review>,
    pub analyses: Vec<Analysis>,
    pub articles: Vec<Article>,
    pub usage_logs: Vec<UsageLog>,
    pub searched_cities: Vec<SearchedCity>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<DashboardFixture>,
}

impl MemoryStore {
    pub fn new(fixture: DashboardFixture) -> Self {
        Self {
            data: RwLock::new(fixture),
        }
    }

    pub async fn from_fixture_file(path: &Path) -> StorageResult<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| StorageError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let fixture: DashboardFixture = serde_json::from_str(&text)?;
        Ok(Self::new(fixture))
    }
}

fn page_of<S>(rows: Vec<S::Row>, query: &ListQuery<S>) -> Page<S::Row>
where
    S: SortKey,
{
    let mut rows = rows;
    query.sort_rows(&mut rows);
    Page::from_rows(rows, query.pagination)
}

fn distinct<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Vec<String> {
    values
        .flatten()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[async_trait]
impl DashboardStore for MemoryStore {
    async fn list_contractors(
        &self,
        filter: &ContractorFilter,
        query: ListQuery<ContractorSort>,
    ) -> StorageResult<Page<Contractor>> {
        let data = self.data.read().await;
        let rows = data
            .contractors
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        Ok(page_of(rows, &query))
    }

    async fn get_contractor(&self, id: Uuid) -> StorageResult<Option<Contractor>> {
        let data = self.data.read().await;
        Ok(data.contractors.iter().find(|c| c.id == id).cloned())
    }

    async fn contractor_names(&self, ids: &[Uuid]) -> StorageResult<HashMap<Uuid, String>> {
        let wanted = ids.iter().collect::<HashSet<_>>();
        let data = self.data.read().await;
        Ok(data
            .contractors
            .iter()
            .filter(|c| wanted.contains(&c.id))
            .map(|c| (c.id, c.business_name.clone()))
            .collect())
    }

    async fn list_reviews(
        &self,
        filter: &ReviewFilter,
        query: ListQuery<ReviewSort>,
    ) -> StorageResult<Page<Review>> {
        let data = self.data.read().await;
        let rows = data
            .reviews
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        Ok(page_of(rows, &query))
    }

    async fn rating_counts(&self, filter: &ReviewFilter) -> StorageResult<BTreeMap<i32, u64>> {
        let data = self.data.read().await;
        let mut counts = BTreeMap::new();
        for review in data.reviews.iter().filter(|r| filter.matches(r)) {
            *counts.entry(review.rating).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn list_analyses(
        &self,
        filter: &AnalysisFilter,
        query: ListQuery<AnalysisSort>,
    ) -> StorageResult<Page<Analysis>> {
        let data = self.data.read().await;
        let rows = data
            .analyses
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        Ok(page_of(rows, &query))
    }

    async fn scan_analyses(
        &self,
        filter: &AnalysisFilter,
        limit: u32,
    ) -> StorageResult<Vec<Analysis>> {
        let data = self.data.read().await;
        let mut rows = data
            .analyses
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| b.analyzed_at.cmp(&a.analyzed_at).then_with(|| a.id.cmp(&b.id)));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn get_analysis(&self, id: Uuid) -> StorageResult<Option<Analysis>> {
        let data = self.data.read().await;
        Ok(data.analyses.iter().find(|a| a.id == id).cloned())
    }

    async fn latest_analysis_for(&self, contractor_id: Uuid) -> StorageResult<Option<Analysis>> {
        let data = self.data.read().await;
        Ok(data
            .analyses
            .iter()
            .filter(|a| a.contractor_id == contractor_id)
            .max_by(|a, b| {
                a.analyzed_at
                    .cmp(&b.analyzed_at)
                    .then_with(|| b.id.cmp(&a.id))
            })
            .cloned())
    }

    async fn list_articles(
        &self,
        filter: &ArticleFilter,
        query: ListQuery<ArticleSort>,
    ) -> StorageResult<Page<Article>> {
        let data = self.data.read().await;
        let rows = data
            .articles
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        Ok(page_of(rows, &query))
    }

    async fn get_article(&self, id: Uuid) -> StorageResult<Option<Article>> {
        let data = self.data.read().await;
        Ok(data.articles.iter().find(|a| a.id == id).cloned())
    }

    async fn set_article_status(
        &self,
        id: Uuid,
        status: ArticleStatus,
    ) -> StorageResult<Option<Article>> {
        let mut data = self.data.write().await;
        let Some(article) = data.articles.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        article.status = status;
        article.published_at = match status {
            ArticleStatus::Published => article.published_at.or_else(|| Some(Utc::now())),
            ArticleStatus::Draft | ArticleStatus::Archived => None,
        };
        Ok(Some(article.clone()))
    }

    async fn list_usage_logs(
        &self,
        filter: &UsageFilter,
        query: ListQuery<UsageSort>,
    ) -> StorageResult<Page<UsageLog>> {
        let data = self.data.read().await;
        let rows = data
            .usage_logs
            .iter()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        Ok(page_of(rows, &query))
    }

    async fn usage_logs_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> StorageResult<Vec<UsageLog>> {
        let data = self.data.read().await;
        let mut rows = data
            .usage_logs
            .iter()
            .filter(|u| u.created_at >= since)
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn list_searched_cities(
        &self,
        filter: &SearchFilter,
        query: ListQuery<SearchSort>,
    ) -> StorageResult<Page<SearchedCity>> {
        let data = self.data.read().await;
        let rows = data
            .searched_cities
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        Ok(page_of(rows, &query))
    }

    async fn all_searched_cities(&self, limit: u32) -> StorageResult<Vec<SearchedCity>> {
        let data = self.data.read().await;
        let mut rows = data.searched_cities.clone();
        rows.sort_by(|a, b| b.searched_at.cmp(&a.searched_at).then_with(|| a.id.cmp(&b.id)));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn distinct_values(&self, field: DistinctField) -> StorageResult<Vec<String>> {
        let data = self.data.read().await;
        let values = match field {
            DistinctField::ContractorCity => distinct(data.contractors.iter().map(|c| c.city.as_deref())),
            DistinctField::ContractorState => {
                distinct(data.contractors.iter().map(|c| c.state.as_deref()))
            }
            DistinctField::ContractorCategory => {
                distinct(data.contractors.iter().map(|c| c.category.as_deref()))
            }
            DistinctField::UsageModel => {
                distinct(data.usage_logs.iter().map(|u| Some(u.model.as_str())))
            }
            DistinctField::UsageOperation => {
                distinct(data.usage_logs.iter().map(|u| Some(u.operation.as_str())))
            }
            DistinctField::SearchState => {
                distinct(data.searched_cities.iter().map(|s| Some(s.state.as_str())))
            }
        };
        Ok(values)
    }

    async fn table_counts(&self) -> StorageResult<TableCounts> {
        let data = self.data.read().await;
        let contractors_with_reviews = data
            .reviews
            .iter()
            .map(|r| r.contractor_id)
            .collect::<HashSet<_>>()
            .len();
        Ok(TableCounts {
            searched_cities: data.searched_cities.len() as u64,
            contractors: data.contractors.len() as u64,
            contractors_with_reviews: contractors_with_reviews as u64,
            reviews: data.reviews.len() as u64,
            analyses: data.analyses.len() as u64,
            articles: data.articles.len() as u64,
            published_articles: data
                .articles
                .iter()
                .filter(|a| a.status == ArticleStatus::Published)
                .count() as u64,
            usage_logs: data.usage_logs.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crd_core::{Pagination, SortDirection};

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).single().unwrap()
    }

    fn contractor(name: &str, city: &str, state: &str, rating: f64) -> Contractor {
        Contractor {
            id: Uuid::new_v4(),
            business_name: name.into(),
            category: Some("Chimney Sweep".into()),
            city: Some(city.into()),
            state: Some(state.into()),
            address: None,
            phone: None,
            website: None,
            google_place_id: None,
            rating: Some(rating),
            review_count: 3,
            search_terms: vec![],
            created_at: ts(1),
            updated_at: ts(1),
        }
    }

    fn article(contractor_id: Uuid, title: &str, status: ArticleStatus) -> Article {
        Article {
            id: Uuid::new_v4(),
            contractor_id,
            title: title.into(),
            slug: title.to_lowercase().replace(' ', "-"),
            content_markdown: "# Hello".into(),
            status,
            word_count: Some(1),
            model_used: None,
            generated_at: ts(2),
            published_at: None,
        }
    }

    fn fixture() -> DashboardFixture {
        let a = contractor("Acme Chimney", "Denver", "CO", 4.8);
        let b = contractor("Flue Pros", "Boulder", "CO", 4.1);
        let c = contractor("Hearth & Home", " Austin ", "TX", 3.7);
        let articles = vec![
            article(a.id, "Acme Review Roundup", ArticleStatus::Draft),
            article(b.id, "Flue Pros Guide", ArticleStatus::Published),
        ];
        DashboardFixture {
            contractors: vec![a, b, c],
            articles,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn list_contractors_filters_sorts_and_paginates() {
        let store = MemoryStore::new(fixture());
        let filter = ContractorFilter {
            state: Some("co".into()),
            ..Default::default()
        };
        let query = ListQuery::new(Pagination::new(1, 1), ContractorSort::Rating, SortDirection::Desc);
        let page = store.list_contractors(&filter, query).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].business_name, "Acme Chimney");
        assert_eq!(page.total_pages(), 2);
    }

    #[tokio::test]
    async fn missing_rows_are_none() {
        let store = MemoryStore::new(fixture());
        assert!(store.get_contractor(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store
            .set_article_status(Uuid::new_v4(), ArticleStatus::Published)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn publishing_stamps_and_unpublishing_clears() {
        let store = MemoryStore::new(fixture());
        let draft = store
            .list_articles(
                &ArticleFilter {
                    status: Some(ArticleStatus::Draft),
                    ..Default::default()
                },
                ListQuery::default(),
            )
            .await
            .unwrap()
            .items
            .remove(0);

        let published = store
            .set_article_status(draft.id, ArticleStatus::Published)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(published.status, ArticleStatus::Published);
        assert!(published.published_at.is_some());

        let counts = store.table_counts().await.unwrap();
        assert_eq!(counts.published_articles, 2);

        let reverted = store
            .set_article_status(draft.id, ArticleStatus::Draft)
            .await
            .unwrap()
            .unwrap();
        assert!(reverted.published_at.is_none());
    }

    #[tokio::test]
    async fn distinct_values_are_trimmed_and_sorted() {
        let store = MemoryStore::new(fixture());
        let cities = store
            .distinct_values(DistinctField::ContractorCity)
            .await
            .unwrap();
        assert_eq!(cities, vec!["Austin", "Boulder", "Denver"]);
        let states = store
            .distinct_values(DistinctField::ContractorState)
            .await
            .unwrap();
        assert_eq!(states, vec!["CO", "TX"]);
    }

    async fn workspace_fixture() -> MemoryStore {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/dashboard.json");
        MemoryStore::from_fixture_file(&path).await.unwrap()
    }

    #[tokio::test]
    async fn rating_counts_cover_every_matching_review() {
        let store = workspace_fixture().await;
        let summit = Uuid::parse_str("a1000000-0000-4000-8000-000000000001").unwrap();
        let counts = store
            .rating_counts(&ReviewFilter::for_contractor(summit))
            .await
            .unwrap();
        assert_eq!(counts, BTreeMap::from([(4, 1), (5, 3)]));

        let all = store.rating_counts(&ReviewFilter::default()).await.unwrap();
        assert_eq!(all.values().sum::<u64>(), 10);
    }

    #[tokio::test]
    async fn scan_analyses_is_newest_first_and_capped() {
        let store = workspace_fixture().await;
        let all = store
            .scan_analyses(&AnalysisFilter::default(), 100)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].analyzed_at >= w[1].analyzed_at));

        let capped = store
            .scan_analyses(&AnalysisFilter::default(), 2)
            .await
            .unwrap();
        assert_eq!(capped, all[..2].to_vec());
    }

    #[tokio::test]
    async fn fixture_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dashboard.json");
        std::fs::write(&path, serde_json::to_vec(&fixture()).unwrap()).unwrap();
        let store = MemoryStore::from_fixture_file(&path).await.unwrap();
        assert_eq!(store.table_counts().await.unwrap().contractors, 3);

        let missing = MemoryStore::from_fixture_file(&dir.path().join("nope.json")).await;
        assert!(matches!(missing, Err(StorageError::Io { .. })));
    }
}
