//! Postgres implementation of [`DashboardStore`] built on `sqlx::QueryBuilder`.
//!
//! Filter values are always bound; only whitelisted sort columns and table names are
//! spliced into SQL text.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crd_core::{
    Analysis, AnalysisFilter, AnalysisSort, Article, ArticleFilter, ArticleSort, ArticleStatus,
    Contractor, ContractorFilter, ContractorSort, DistinctField, ListQuery, Page, Review,
    ReviewFilter, ReviewSort, SearchFilter, SearchSort, SearchedCity, SortKey, TableCounts,
    UsageFilter, UsageLog, UsageSort,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug_span, warn, Instrument};
use uuid::Uuid;

use crate::{DashboardStore, StorageError, StorageResult, MAX_SCAN_ROWS};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

const CONTRACTOR_COLUMNS: &str = "id, business_name, category, city, state, address, phone, \
     website, google_place_id, rating::float8 AS rating, \
     COALESCE(review_count, 0)::int4 AS review_count, search_terms, created_at, updated_at";
const REVIEW_COLUMNS: &str =
    "id, contractor_id, reviewer_name, rating::int4 AS rating, review_text, review_date, created_at";
const ANALYSIS_COLUMNS: &str = "id, contractor_id, analysis_json, model_used, \
     COALESCE(reviews_analyzed, 0)::int4 AS reviews_analyzed, analyzed_at";
const ARTICLE_COLUMNS: &str = "id, contractor_id, title, slug, \
     COALESCE(content_markdown, '') AS content_markdown, status, word_count::int4 AS word_count, \
     model_used, generated_at, published_at";
const USAGE_COLUMNS: &str = "id, operation, model, \
     COALESCE(input_tokens, 0)::int8 AS input_tokens, \
     COALESCE(output_tokens, 0)::int8 AS output_tokens, \
     COALESCE(cost_usd, 0)::float8 AS cost_usd, COALESCE(duration_ms, 0)::int8 AS duration_ms, \
     contractor_id, COALESCE(success, TRUE) AS success, error_message, created_at";
const SEARCH_COLUMNS: &str = "id, city, state, search_term, \
     COALESCE(results_count, 0)::int4 AS results_count, searched_at";

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    create_pool_with_options(database_url, DEFAULT_MAX_CONNECTIONS).await
}

pub async fn create_pool_with_options(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect(database_url)
        .await
}

/// A filter that knows how to append its predicates after a `WHERE 1=1`.
pub(crate) trait SqlFilter {
    fn push_predicates(&self, qb: &mut QueryBuilder<'_, Postgres>);
}

/// `%needle%` with LIKE metacharacters escaped.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_eq_ci(qb: &mut QueryBuilder<'_, Postgres>, column: &str, value: &str) {
    qb.push(format!(" AND lower(btrim({column})) = "));
    qb.push_bind(value.trim().to_lowercase());
}

fn push_ilike_any(qb: &mut QueryBuilder<'_, Postgres>, columns: &[&str], needle: &str) {
    let pattern = like_pattern(needle);
    qb.push(" AND (");
    for (idx, column) in columns.iter().enumerate() {
        if idx > 0 {
            qb.push(" OR ");
        }
        qb.push(format!("{column} ILIKE "));
        qb.push_bind(pattern.clone());
    }
    qb.push(")");
}

impl SqlFilter for ContractorFilter {
    fn push_predicates(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(search) = &self.search {
            push_ilike_any(qb, &["business_name", "category", "city", "address"], search);
        }
        if let Some(city) = &self.city {
            push_eq_ci(qb, "city", city);
        }
        if let Some(state) = &self.state {
            push_eq_ci(qb, "state", state);
        }
        if let Some(category) = &self.category {
            push_eq_ci(qb, "category", category);
        }
        if let Some(min) = self.min_rating {
            qb.push(" AND rating >= ");
            qb.push_bind(min);
        }
        match self.has_reviews {
            Some(true) => {
                qb.push(" AND COALESCE(review_count, 0) > 0");
            }
            Some(false) => {
                qb.push(" AND COALESCE(review_count, 0) = 0");
            }
            None => {}
        }
    }
}

impl SqlFilter for ReviewFilter {
    fn push_predicates(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(id) = self.contractor_id {
            qb.push(" AND contractor_id = ");
            qb.push_bind(id);
        }
        if let Some(min) = self.min_rating {
            qb.push(" AND rating >= ");
            qb.push_bind(min);
        }
        if let Some(max) = self.max_rating {
            qb.push(" AND rating <= ");
            qb.push_bind(max);
        }
        match self.has_text {
            Some(true) => {
                qb.push(" AND NULLIF(btrim(review_text), '') IS NOT NULL");
            }
            Some(false) => {
                qb.push(" AND NULLIF(btrim(review_text), '') IS NULL");
            }
            None => {}
        }
        if let Some(search) = &self.search {
            push_ilike_any(qb, &["review_text", "reviewer_name"], search);
        }
    }
}

impl SqlFilter for AnalysisFilter {
    fn push_predicates(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(id) = self.contractor_id {
            qb.push(" AND contractor_id = ");
            qb.push_bind(id);
        }
        if let Some(sentiment) = &self.sentiment {
            push_eq_ci(
                qb,
                "COALESCE(analysis_json->>'sentiment', analysis_json->>'overall_sentiment')",
                sentiment,
            );
        }
    }
}

impl SqlFilter for ArticleFilter {
    fn push_predicates(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(id) = self.contractor_id {
            qb.push(" AND contractor_id = ");
            qb.push_bind(id);
        }
        if let Some(status) = self.status {
            qb.push(" AND status = ");
            qb.push_bind(status.as_str());
        }
        if let Some(search) = &self.search {
            push_ilike_any(qb, &["title", "slug"], search);
        }
    }
}

impl SqlFilter for UsageFilter {
    fn push_predicates(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(operation) = &self.operation {
            push_eq_ci(qb, "operation", operation);
        }
        if let Some(model) = &self.model {
            push_eq_ci(qb, "model", model);
        }
        if let Some(success) = self.success {
            qb.push(" AND COALESCE(success, TRUE) = ");
            qb.push_bind(success);
        }
        if let Some(since) = self.since {
            qb.push(" AND created_at >= ");
            qb.push_bind(since);
        }
    }
}

impl SqlFilter for SearchFilter {
    fn push_predicates(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(city) = &self.city {
            push_ilike_any(qb, &["city"], city);
        }
        if let Some(state) = &self.state {
            push_eq_ci(qb, "state", state);
        }
        if let Some(term) = &self.search_term {
            push_ilike_any(qb, &["search_term"], term);
        }
    }
}

pub(crate) fn count_sql<'a, F: SqlFilter>(table: &str, filter: &F) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {table} WHERE 1=1"));
    filter.push_predicates(&mut qb);
    qb
}

pub(crate) fn rating_counts_sql<'a>(filter: &ReviewFilter) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT rating::int4 AS rating, COUNT(*) AS n FROM reviews WHERE rating IS NOT NULL",
    );
    filter.push_predicates(&mut qb);
    qb.push(" GROUP BY 1 ORDER BY 1");
    qb
}

pub(crate) fn page_sql<'a, F: SqlFilter, S: SortKey>(
    table: &str,
    columns: &str,
    filter: &F,
    query: &ListQuery<S>,
) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {columns} FROM {table} WHERE 1=1"));
    filter.push_predicates(&mut qb);
    qb.push(format!(
        " ORDER BY {} {} NULLS LAST, id",
        query.sort.column(),
        query.direction.sql()
    ));
    qb.push(" LIMIT ");
    qb.push_bind(i64::from(query.pagination.limit()));
    qb.push(" OFFSET ");
    qb.push_bind(query.pagination.offset() as i64);
    qb
}

/// The contractor search is retried in memory only for database failures on a search query.
pub(crate) fn falls_back_to_memory(err: &StorageError, filter: &ContractorFilter) -> bool {
    matches!(err, StorageError::Database(_)) && filter.search.is_some()
}

/// In-memory half of the search fallback: `rows` were scanned without the search
/// predicate, so the full filter is applied here before sorting and slicing.
pub(crate) fn search_fallback_page(
    rows: Vec<Contractor>,
    filter: &ContractorFilter,
    query: &ListQuery<ContractorSort>,
) -> Page<Contractor> {
    let mut rows = rows
        .into_iter()
        .filter(|c| filter.matches(c))
        .collect::<Vec<_>>();
    query.sort_rows(&mut rows);
    Page::from_rows(rows, query.pagination)
}

fn contractor_from_row(row: &PgRow) -> Result<Contractor, sqlx::Error> {
    Ok(Contractor {
        id: row.try_get("id")?,
        business_name: row.try_get("business_name")?,
        category: row.try_get("category")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        address: row.try_get("address")?,
        phone: row.try_get("phone")?,
        website: row.try_get("website")?,
        google_place_id: row.try_get("google_place_id")?,
        rating: row.try_get("rating")?,
        review_count: row.try_get("review_count")?,
        search_terms: row
            .try_get::<Option<Vec<String>>, _>("search_terms")?
            .unwrap_or_default(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn review_from_row(row: &PgRow) -> Result<Review, sqlx::Error> {
    Ok(Review {
        id: row.try_get("id")?,
        contractor_id: row.try_get("contractor_id")?,
        reviewer_name: row.try_get("reviewer_name")?,
        rating: row.try_get("rating")?,
        review_text: row.try_get("review_text")?,
        review_date: row.try_get("review_date")?,
        created_at: row.try_get("created_at")?,
    })
}

fn analysis_from_row(row: &PgRow) -> Result<Analysis, sqlx::Error> {
    Ok(Analysis {
        id: row.try_get("id")?,
        contractor_id: row.try_get("contractor_id")?,
        analysis_json: row
            .try_get::<Option<serde_json::Value>, _>("analysis_json")?
            .unwrap_or(serde_json::Value::Null),
        model_used: row.try_get("model_used")?,
        reviews_analyzed: row.try_get("reviews_analyzed")?,
        analyzed_at: row.try_get("analyzed_at")?,
    })
}

fn article_from_row(row: &PgRow) -> Result<Article, sqlx::Error> {
    let status: Option<String> = row.try_get("status")?;
    Ok(Article {
        id: row.try_get("id")?,
        contractor_id: row.try_get("contractor_id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        content_markdown: row.try_get("content_markdown")?,
        status: status
            .as_deref()
            .and_then(ArticleStatus::parse)
            .unwrap_or_default(),
        word_count: row.try_get("word_count")?,
        model_used: row.try_get("model_used")?,
        generated_at: row.try_get("generated_at")?,
        published_at: row.try_get("published_at")?,
    })
}

fn usage_from_row(row: &PgRow) -> Result<UsageLog, sqlx::Error> {
    Ok(UsageLog {
        id: row.try_get("id")?,
        operation: row.try_get("operation")?,
        model: row.try_get("model")?,
        input_tokens: row.try_get("input_tokens")?,
        output_tokens: row.try_get("output_tokens")?,
        cost_usd: row.try_get("cost_usd")?,
        duration_ms: row.try_get("duration_ms")?,
        contractor_id: row.try_get("contractor_id")?,
        success: row.try_get("success")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
    })
}

fn searched_city_from_row(row: &PgRow) -> Result<SearchedCity, sqlx::Error> {
    Ok(SearchedCity {
        id: row.try_get("id")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        search_term: row.try_get("search_term")?,
        results_count: row.try_get("results_count")?,
        searched_at: row.try_get("searched_at")?,
    })
}

fn count_to_u64(value: i64, what: &str) -> StorageResult<u64> {
    u64::try_from(value).map_err(|_| StorageError::InvalidRow(format!("negative count for {what}")))
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Count and page queries run concurrently against the pool.
    async fn fetch_page<F, S, T>(
        &self,
        table: &'static str,
        columns: &'static str,
        filter: &F,
        query: ListQuery<S>,
        map: fn(&PgRow) -> Result<T, sqlx::Error>,
    ) -> StorageResult<Page<T>>
    where
        F: SqlFilter + Sync,
        S: SortKey,
        T: Send,
    {
        let span = debug_span!("store_page", table, page = query.pagination.page());
        async {
            let mut count_qb = count_sql(table, filter);
            let mut page_qb = page_sql(table, columns, filter, &query);
            let (total, rows) = tokio::try_join!(
                count_qb.build_query_scalar::<i64>().fetch_one(&self.pool),
                page_qb.build().fetch_all(&self.pool),
            )?;
            let items = rows.iter().map(map).collect::<Result<Vec<_>, _>>()?;
            Ok::<_, StorageError>(Page {
                items,
                total: count_to_u64(total, table)?,
                page: query.pagination.page(),
                per_page: query.pagination.per_page(),
            })
        }
        .instrument(span)
        .await
    }

    async fn fetch_by_id<T>(
        &self,
        table: &'static str,
        columns: &'static str,
        id: Uuid,
        map: fn(&PgRow) -> Result<T, sqlx::Error>,
    ) -> StorageResult<Option<T>> {
        let row = sqlx::query(&format!("SELECT {columns} FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(map).transpose()?)
    }

    /// Contractor rows for the in-memory search fallback, capped at [`MAX_SCAN_ROWS`].
    async fn scan_contractors(&self, filter: &ContractorFilter) -> StorageResult<Vec<Contractor>> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {CONTRACTOR_COLUMNS} FROM contractors WHERE 1=1"
        ));
        filter.push_predicates(&mut qb);
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(MAX_SCAN_ROWS));
        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(contractor_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl DashboardStore for PgStore {
    async fn list_contractors(
        &self,
        filter: &ContractorFilter,
        query: ListQuery<ContractorSort>,
    ) -> StorageResult<Page<Contractor>> {
        match self
            .fetch_page("contractors", CONTRACTOR_COLUMNS, filter, query, contractor_from_row)
            .await
        {
            Err(err) if falls_back_to_memory(&err, filter) => {
                warn!(error = %err, "contractor search query failed; filtering in memory");
                let rows = self.scan_contractors(&filter.without_search()).await?;
                Ok(search_fallback_page(rows, filter, &query))
            }
            other => other,
        }
    }

    async fn get_contractor(&self, id: Uuid) -> StorageResult<Option<Contractor>> {
        self.fetch_by_id("contractors", CONTRACTOR_COLUMNS, id, contractor_from_row)
            .await
    }

    async fn contractor_names(&self, ids: &[Uuid]) -> StorageResult<HashMap<Uuid, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query("SELECT id, business_name FROM contractors WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            out.insert(row.try_get("id")?, row.try_get("business_name")?);
        }
        Ok(out)
    }

    async fn list_reviews(
        &self,
        filter: &ReviewFilter,
        query: ListQuery<ReviewSort>,
    ) -> StorageResult<Page<Review>> {
        self.fetch_page("reviews", REVIEW_COLUMNS, filter, query, review_from_row)
            .await
    }

    async fn rating_counts(&self, filter: &ReviewFilter) -> StorageResult<BTreeMap<i32, u64>> {
        let mut qb = rating_counts_sql(filter);
        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let rating: i32 = row.try_get("rating")?;
            let n: i64 = row.try_get("n")?;
            counts.insert(rating, count_to_u64(n, "reviews")?);
        }
        Ok(counts)
    }

    async fn list_analyses(
        &self,
        filter: &AnalysisFilter,
        query: ListQuery<AnalysisSort>,
    ) -> StorageResult<Page<Analysis>> {
        self.fetch_page("review_analysis", ANALYSIS_COLUMNS, filter, query, analysis_from_row)
            .await
    }

    async fn scan_analyses(
        &self,
        filter: &AnalysisFilter,
        limit: u32,
    ) -> StorageResult<Vec<Analysis>> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {ANALYSIS_COLUMNS} FROM review_analysis WHERE 1=1"
        ));
        filter.push_predicates(&mut qb);
        qb.push(" ORDER BY analyzed_at DESC, id LIMIT ");
        qb.push_bind(i64::from(limit));
        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(analysis_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn get_analysis(&self, id: Uuid) -> StorageResult<Option<Analysis>> {
        self.fetch_by_id("review_analysis", ANALYSIS_COLUMNS, id, analysis_from_row)
            .await
    }

    async fn latest_analysis_for(&self, contractor_id: Uuid) -> StorageResult<Option<Analysis>> {
        let row = sqlx::query(&format!(
            "SELECT {ANALYSIS_COLUMNS} FROM review_analysis \
             WHERE contractor_id = $1 ORDER BY analyzed_at DESC, id LIMIT 1"
        ))
        .bind(contractor_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(analysis_from_row).transpose()?)
    }

    async fn list_articles(
        &self,
        filter: &ArticleFilter,
        query: ListQuery<ArticleSort>,
    ) -> StorageResult<Page<Article>> {
        self.fetch_page("review_articles", ARTICLE_COLUMNS, filter, query, article_from_row)
            .await
    }

    async fn get_article(&self, id: Uuid) -> StorageResult<Option<Article>> {
        self.fetch_by_id("review_articles", ARTICLE_COLUMNS, id, article_from_row)
            .await
    }

    async fn set_article_status(
        &self,
        id: Uuid,
        status: ArticleStatus,
    ) -> StorageResult<Option<Article>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE review_articles
               SET status = $2,
                   published_at = CASE WHEN $2 = 'published'
                                       THEN COALESCE(published_at, NOW())
                                       ELSE NULL END
             WHERE id = $1
         RETURNING {ARTICLE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(article_from_row).transpose()?)
    }

    async fn list_usage_logs(
        &self,
        filter: &UsageFilter,
        query: ListQuery<UsageSort>,
    ) -> StorageResult<Page<UsageLog>> {
        self.fetch_page("ai_usage_log", USAGE_COLUMNS, filter, query, usage_from_row)
            .await
    }

    async fn usage_logs_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> StorageResult<Vec<UsageLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {USAGE_COLUMNS} FROM ai_usage_log \
             WHERE created_at >= $1 ORDER BY created_at DESC, id LIMIT $2"
        ))
        .bind(since)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(usage_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_searched_cities(
        &self,
        filter: &SearchFilter,
        query: ListQuery<SearchSort>,
    ) -> StorageResult<Page<SearchedCity>> {
        self.fetch_page("searched_cities", SEARCH_COLUMNS, filter, query, searched_city_from_row)
            .await
    }

    async fn all_searched_cities(&self, limit: u32) -> StorageResult<Vec<SearchedCity>> {
        let rows = sqlx::query(&format!(
            "SELECT {SEARCH_COLUMNS} FROM searched_cities ORDER BY searched_at DESC, id LIMIT $1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(searched_city_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn distinct_values(&self, field: DistinctField) -> StorageResult<Vec<String>> {
        let column = field.column();
        let rows = sqlx::query(&format!(
            "SELECT DISTINCT btrim({column}) AS value FROM {table} \
             WHERE {column} IS NOT NULL AND btrim({column}) <> '' ORDER BY 1",
            table = field.table()
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| row.try_get::<String, _>("value"))
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn table_counts(&self) -> StorageResult<TableCounts> {
        let row = sqlx::query(
            r#"
            SELECT (SELECT COUNT(*) FROM searched_cities) AS searched_cities,
                   (SELECT COUNT(*) FROM contractors) AS contractors,
                   (SELECT COUNT(DISTINCT contractor_id) FROM reviews) AS contractors_with_reviews,
                   (SELECT COUNT(*) FROM reviews) AS reviews,
                   (SELECT COUNT(*) FROM review_analysis) AS analyses,
                   (SELECT COUNT(*) FROM review_articles) AS articles,
                   (SELECT COUNT(*) FROM review_articles WHERE status = 'published') AS published_articles,
                   (SELECT COUNT(*) FROM ai_usage_log) AS usage_logs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let get = |name: &'static str| -> StorageResult<u64> {
            let value: i64 = row.try_get(name)?;
            count_to_u64(value, name)
        };
        Ok(TableCounts {
            searched_cities: get("searched_cities")?,
            contractors: get("contractors")?,
            contractors_with_reviews: get("contractors_with_reviews")?,
            reviews: get("reviews")?,
            analyses: get("analyses")?,
            articles: get("articles")?,
            published_articles: get("published_articles")?,
            usage_logs: get("usage_logs")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crd_core::{Pagination, SortDirection};

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern(" acme "), "%acme%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn contractor_page_sql_binds_filters_and_paginates() {
        let filter = ContractorFilter {
            search: Some("chimney".into()),
            state: Some("CO".into()),
            min_rating: Some(4.0),
            has_reviews: Some(true),
            ..Default::default()
        };
        let query = ListQuery::new(
            Pagination::new(3, 20),
            ContractorSort::Rating,
            SortDirection::Desc,
        );
        let qb = page_sql("contractors", CONTRACTOR_COLUMNS, &filter, &query);
        let sql = qb.sql();

        assert!(sql.contains(
            "AND (business_name ILIKE $1 OR category ILIKE $2 OR city ILIKE $3 OR address ILIKE $4)"
        ));
        assert!(sql.contains("AND lower(btrim(state)) = $5"));
        assert!(sql.contains("AND rating >= $6"));
        assert!(sql.contains("AND COALESCE(review_count, 0) > 0"));
        assert!(sql.ends_with("ORDER BY rating DESC NULLS LAST, id LIMIT $7 OFFSET $8"));
        assert!(!sql.contains("chimney"));
    }

    #[test]
    fn count_sql_shares_predicates_without_ordering() {
        let filter = ReviewFilter {
            contractor_id: Some(Uuid::nil()),
            min_rating: Some(2),
            has_text: Some(false),
            ..Default::default()
        };
        let qb = count_sql("reviews", &filter);
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM reviews WHERE 1=1 AND contractor_id = $1 AND rating >= $2 \
             AND NULLIF(btrim(review_text), '') IS NULL"
        );
    }

    #[test]
    fn empty_filter_produces_plain_listing() {
        let query = ListQuery::<UsageSort>::new(
            Pagination::default(),
            UsageSort::TotalTokens,
            SortDirection::Asc,
        );
        let qb = page_sql("ai_usage_log", "id", &UsageFilter::default(), &query);
        assert_eq!(
            qb.sql(),
            "SELECT id FROM ai_usage_log WHERE 1=1 \
             ORDER BY (input_tokens + output_tokens) ASC NULLS LAST, id LIMIT $1 OFFSET $2"
        );
    }

    #[test]
    fn analysis_sentiment_reads_both_json_keys() {
        let filter = AnalysisFilter {
            sentiment: Some("Positive".into()),
            ..Default::default()
        };
        let qb = count_sql("review_analysis", &filter);
        assert!(qb.sql().contains(
            "lower(btrim(COALESCE(analysis_json->>'sentiment', analysis_json->>'overall_sentiment'))) = $1"
        ));
    }

    #[test]
    fn rating_counts_group_by_star() {
        let qb = rating_counts_sql(&ReviewFilter::for_contractor(Uuid::nil()));
        assert_eq!(
            qb.sql(),
            "SELECT rating::int4 AS rating, COUNT(*) AS n FROM reviews WHERE rating IS NOT NULL \
             AND contractor_id = $1 GROUP BY 1 ORDER BY 1"
        );
    }

    #[test]
    fn only_database_errors_on_search_queries_fall_back() {
        let search = ContractorFilter {
            search: Some("chimney".into()),
            ..Default::default()
        };
        let db_error = StorageError::Database(sqlx::Error::PoolTimedOut);
        assert!(falls_back_to_memory(&db_error, &search));
        assert!(!falls_back_to_memory(&db_error, &search.without_search()));
        assert!(!falls_back_to_memory(
            &StorageError::InvalidRow("bad".into()),
            &search
        ));
    }

    fn fixture_contractors() -> Vec<Contractor> {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../fixtures/dashboard.json");
        let fixture: crate::DashboardFixture =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        fixture.contractors
    }

    #[tokio::test]
    async fn search_fallback_matches_the_store_listing() {
        let contractors = fixture_contractors();
        let filter = ContractorFilter {
            search: Some("DENVER".into()),
            has_reviews: Some(true),
            ..Default::default()
        };
        let query = ListQuery::new(
            Pagination::new(2, 1),
            ContractorSort::BusinessName,
            SortDirection::Asc,
        );
        let scanned = contractors
            .iter()
            .filter(|c| filter.without_search().matches(c))
            .cloned()
            .collect::<Vec<_>>();
        let page = search_fallback_page(scanned, &filter, &query);
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].business_name, "Summit Chimney Sweeps");

        let store = crate::MemoryStore::new(crate::DashboardFixture {
            contractors,
            ..Default::default()
        });
        let listed = store.list_contractors(&filter, query).await.unwrap();
        assert_eq!(listed, page);
    }

    /// Runs the SQL predicates and the in-memory `matches` over the same rows.
    #[tokio::test]
    #[ignore = "requires database"]
    async fn sql_and_memory_filters_agree_on_live_rows() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pg = PgStore::new(create_pool(&url).await.expect("pool"));
        let rows = pg
            .scan_contractors(&ContractorFilter::default())
            .await
            .expect("scan");
        let memory = crate::MemoryStore::new(crate::DashboardFixture {
            contractors: rows.clone(),
            ..Default::default()
        });
        let filters = [
            ContractorFilter::default(),
            ContractorFilter {
                search: Some("chimney".into()),
                ..Default::default()
            },
            ContractorFilter {
                min_rating: Some(4.0),
                has_reviews: Some(true),
                ..Default::default()
            },
            ContractorFilter {
                state: Some(" co ".into()),
                ..Default::default()
            },
        ];
        for filter in filters {
            let query = ListQuery::new(
                Pagination::new(1, 100),
                ContractorSort::ReviewCount,
                SortDirection::Desc,
            );
            let from_sql = pg.list_contractors(&filter, query).await.expect("sql");
            let from_memory = memory.list_contractors(&filter, query).await.expect("memory");
            let ids = |p: &Page<Contractor>| p.items.iter().map(|c| c.id).collect::<Vec<_>>();
            assert_eq!(from_sql.total, from_memory.total, "{filter:?}");
            assert_eq!(ids(&from_sql), ids(&from_memory), "{filter:?}");
            if filter.search.is_some() {
                let fallback = search_fallback_page(rows.clone(), &filter, &query);
                assert_eq!(ids(&fallback), ids(&from_sql), "{filter:?}");
            }
        }
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn table_counts_against_live_database() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let store = PgStore::new(create_pool(&url).await.expect("pool"));
        let counts = store.table_counts().await.expect("counts");
        assert!(counts.contractors_with_reviews <= counts.contractors.max(counts.reviews));
    }
}
