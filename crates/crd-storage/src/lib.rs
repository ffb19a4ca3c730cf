//! Data access for the dashboard: the `DashboardStore` seam, its Postgres and fixture
//! implementations, the revalidation cache and the article exporter.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crd_core::{
    Analysis, AnalysisFilter, AnalysisSort, Article, ArticleFilter, ArticleSort, ArticleStatus,
    Contractor, ContractorFilter, ContractorSort, DistinctField, ListQuery, Page, Review,
    ReviewFilter, ReviewSort, SearchFilter, SearchSort, SearchedCity, TableCounts, UsageFilter,
    UsageLog, UsageSort,
};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub mod cache;
pub mod export;
pub mod memory;
pub mod pg;

pub use cache::Revalidate;
pub use export::{ArticleExporter, ExportManifest, ExportManifestFile, ExportedArticle};
pub use memory::{DashboardFixture, MemoryStore};
pub use pg::{create_pool, PgStore};

pub const CRATE_NAME: &str = "crd-storage";

/// Upper bound on rows pulled for in-memory aggregation or filtering.
pub const MAX_SCAN_ROWS: u32 = 10_000;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid row: {0}")]
    InvalidRow(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Read access to the agent's tables plus the one edit the dashboard makes.
///
/// Lookups by id return `Ok(None)` when the row does not exist.
#[async_trait]
pub trait DashboardStore: Send + Sync {
    async fn list_contractors(
        &self,
        filter: &ContractorFilter,
        query: ListQuery<ContractorSort>,
    ) -> StorageResult<Page<Contractor>>;

    async fn get_contractor(&self, id: Uuid) -> StorageResult<Option<Contractor>>;

    /// Business names for the given ids; unknown ids are omitted.
    async fn contractor_names(&self, ids: &[Uuid]) -> StorageResult<HashMap<Uuid, String>>;

    async fn list_reviews(
        &self,
        filter: &ReviewFilter,
        query: ListQuery<ReviewSort>,
    ) -> StorageResult<Page<Review>>;

    /// Number of matching reviews per star rating.
    async fn rating_counts(&self, filter: &ReviewFilter) -> StorageResult<BTreeMap<i32, u64>>;

    async fn list_analyses(
        &self,
        filter: &AnalysisFilter,
        query: ListQuery<AnalysisSort>,
    ) -> StorageResult<Page<Analysis>>;

    /// Matching analyses, newest first, at most `limit` rows.
    async fn scan_analyses(
        &self,
        filter: &AnalysisFilter,
        limit: u32,
    ) -> StorageResult<Vec<Analysis>>;

    async fn get_analysis(&self, id: Uuid) -> StorageResult<Option<Analysis>>;

    async fn latest_analysis_for(&self, contractor_id: Uuid) -> StorageResult<Option<Analysis>>;

    async fn list_articles(
        &self,
        filter: &ArticleFilter,
        query: ListQuery<ArticleSort>,
    ) -> StorageResult<Page<Article>>;

    async fn get_article(&self, id: Uuid) -> StorageResult<Option<Article>>;

    /// Sets the status; publishing stamps `published_at` once, other statuses clear it.
    async fn set_article_status(
        &self,
        id: Uuid,
        status: ArticleStatus,
    ) -> StorageResult<Option<Article>>;

    async fn list_usage_logs(
        &self,
        filter: &UsageFilter,
        query: ListQuery<UsageSort>,
    ) -> StorageResult<Page<UsageLog>>;

    /// Newest first, at most `limit` rows.
    async fn usage_logs_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> StorageResult<Vec<UsageLog>>;

    async fn list_searched_cities(
        &self,
        filter: &SearchFilter,
        query: ListQuery<SearchSort>,
    ) -> StorageResult<Page<SearchedCity>>;

    /// Newest first, at most `limit` rows.
    async fn all_searched_cities(&self, limit: u32) -> StorageResult<Vec<SearchedCity>>;

    /// Trimmed, non-empty, sorted distinct values of a column.
    async fn distinct_values(&self, field: DistinctField) -> StorageResult<Vec<String>>;

    async fn table_counts(&self) -> StorageResult<TableCounts>;
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub fixture_path: PathBuf,
}

impl DbConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            max_connections: std::env::var("CRD_DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(pg::DEFAULT_MAX_CONNECTIONS),
            fixture_path: std::env::var("CRD_FIXTURE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("fixtures/dashboard.json")),
        }
    }
}

/// Postgres when `DATABASE_URL` is set, otherwise the JSON fixture.
pub async fn open_store(config: &DbConfig) -> StorageResult<Arc<dyn DashboardStore>> {
    match &config.database_url {
        Some(url) => {
            let pool = pg::create_pool_with_options(url, config.max_connections).await?;
            info!(max_connections = config.max_connections, "connected to postgres");
            Ok(Arc::new(PgStore::new(pool)))
        }
        None => {
            let store = MemoryStore::from_fixture_file(&config.fixture_path).await?;
            info!(fixture = %config.fixture_path.display(), "DATABASE_URL not set; serving fixture data");
            Ok(Arc::new(store))
        }
    }
}
