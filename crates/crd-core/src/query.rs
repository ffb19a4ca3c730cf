//! Filters, sort keys and pagination shared by the SQL and in-memory stores.
//!
//! Every filter has a `matches` method that mirrors the predicate the Postgres store
//! builds, so the fixture store and the search fallback agree with the database.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Analysis, Article, ArticleStatus, Contractor, Review, SearchedCity, UsageLog};

const MAX_PER_PAGE: u32 = 100;
const DEFAULT_PER_PAGE: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u32,
    per_page: u32,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn from_params(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self::new(page.unwrap_or(1), per_page.unwrap_or(DEFAULT_PER_PAGE))
    }

    /// 1-indexed.
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// SQL OFFSET: `(page - 1) * per_page`.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u32 {
        self.per_page
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn empty(pagination: Pagination) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: pagination.page(),
            per_page: pagination.per_page(),
        }
    }

    /// Slice an already filtered and sorted set.
    pub fn from_rows(rows: Vec<T>, pagination: Pagination) -> Self {
        let total = rows.len() as u64;
        let items = rows
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .collect();
        Self {
            items,
            total,
            page: pagination.page(),
            per_page: pagination.per_page(),
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.total == 0 {
            1
        } else {
            self.total.div_ceil(u64::from(self.per_page.max(1))).max(1) as u32
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

/// Whitelisted sort column for one table.
pub trait SortKey: Copy + Default + Send + Sync + 'static {
    type Row;

    fn parse(value: &str) -> Option<Self>;
    fn as_str(self) -> &'static str;
    fn column(self) -> &'static str;
    /// Row ordering with NULLs last in either direction, ties broken by id ascending.
    fn compare(self, a: &Self::Row, b: &Self::Row, direction: SortDirection) -> Ordering;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListQuery<S> {
    pub pagination: Pagination,
    pub sort: S,
    pub direction: SortDirection,
}

impl<S: SortKey> ListQuery<S> {
    pub fn new(pagination: Pagination, sort: S, direction: SortDirection) -> Self {
        Self {
            pagination,
            sort,
            direction,
        }
    }

    pub fn sort_rows(&self, rows: &mut [S::Row]) {
        rows.sort_by(|a, b| self.sort.compare(a, b, self.direction));
    }
}

fn cmp_nulls_last<T: PartialOrd>(a: Option<T>, b: Option<T>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => direction.apply(a.partial_cmp(&b).unwrap_or(Ordering::Equal)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn cmp_values<T: PartialOrd>(a: T, b: T, direction: SortDirection) -> Ordering {
    cmp_nulls_last(Some(a), Some(b), direction)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContractorSort {
    BusinessName,
    Rating,
    #[default]
    ReviewCount,
    City,
    CreatedAt,
}

impl SortKey for ContractorSort {
    type Row = Contractor;

    fn parse(value: &str) -> Option<Self> {
        match value {
            "business_name" | "name" => Some(Self::BusinessName),
            "rating" => Some(Self::Rating),
            "review_count" | "reviews" => Some(Self::ReviewCount),
            "city" => Some(Self::City),
            "created_at" => Some(Self::CreatedAt),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::BusinessName => "business_name",
            Self::Rating => "rating",
            Self::ReviewCount => "review_count",
            Self::City => "city",
            Self::CreatedAt => "created_at",
        }
    }

    fn column(self) -> &'static str {
        self.as_str()
    }

    fn compare(self, a: &Contractor, b: &Contractor, direction: SortDirection) -> Ordering {
        let primary = match self {
            Self::BusinessName => cmp_values(
                a.business_name.to_lowercase(),
                b.business_name.to_lowercase(),
                direction,
            ),
            Self::Rating => cmp_nulls_last(a.rating, b.rating, direction),
            Self::ReviewCount => cmp_values(a.review_count, b.review_count, direction),
            Self::City => cmp_nulls_last(
                a.city.as_deref().map(str::to_lowercase),
                b.city.as_deref().map(str::to_lowercase),
                direction,
            ),
            Self::CreatedAt => cmp_values(a.created_at, b.created_at, direction),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReviewSort {
    Rating,
    ReviewDate,
    #[default]
    CreatedAt,
}

impl SortKey for ReviewSort {
    type Row = Review;

    fn parse(value: &str) -> Option<Self> {
        match value {
            "rating" => Some(Self::Rating),
            "review_date" | "date" => Some(Self::ReviewDate),
            "created_at" => Some(Self::CreatedAt),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Rating => "rating",
            Self::ReviewDate => "review_date",
            Self::CreatedAt => "created_at",
        }
    }

    fn column(self) -> &'static str {
        self.as_str()
    }

    fn compare(self, a: &Review, b: &Review, direction: SortDirection) -> Ordering {
        let primary = match self {
            Self::Rating => cmp_values(a.rating, b.rating, direction),
            Self::ReviewDate => cmp_nulls_last(a.review_date, b.review_date, direction),
            Self::CreatedAt => cmp_values(a.created_at, b.created_at, direction),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisSort {
    #[default]
    AnalyzedAt,
    ReviewsAnalyzed,
}

impl SortKey for AnalysisSort {
    type Row = Analysis;

    fn parse(value: &str) -> Option<Self> {
        match value {
            "analyzed_at" => Some(Self::AnalyzedAt),
            "reviews_analyzed" => Some(Self::ReviewsAnalyzed),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::AnalyzedAt => "analyzed_at",
            Self::ReviewsAnalyzed => "reviews_analyzed",
        }
    }

    fn column(self) -> &'static str {
        self.as_str()
    }

    fn compare(self, a: &Analysis, b: &Analysis, direction: SortDirection) -> Ordering {
        let primary = match self {
            Self::AnalyzedAt => cmp_values(a.analyzed_at, b.analyzed_at, direction),
            Self::ReviewsAnalyzed => cmp_values(a.reviews_analyzed, b.reviews_analyzed, direction),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArticleSort {
    Title,
    #[default]
    GeneratedAt,
    WordCount,
}

impl SortKey for ArticleSort {
    type Row = Article;

    fn parse(value: &str) -> Option<Self> {
        match value {
            "title" => Some(Self::Title),
            "generated_at" => Some(Self::GeneratedAt),
            "word_count" => Some(Self::WordCount),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::GeneratedAt => "generated_at",
            Self::WordCount => "word_count",
        }
    }

    fn column(self) -> &'static str {
        self.as_str()
    }

    fn compare(self, a: &Article, b: &Article, direction: SortDirection) -> Ordering {
        let primary = match self {
            Self::Title => cmp_values(a.title.to_lowercase(), b.title.to_lowercase(), direction),
            Self::GeneratedAt => cmp_values(a.generated_at, b.generated_at, direction),
            Self::WordCount => cmp_nulls_last(a.word_count, b.word_count, direction),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UsageSort {
    #[default]
    CreatedAt,
    CostUsd,
    DurationMs,
    TotalTokens,
}

impl SortKey for UsageSort {
    type Row = UsageLog;

    fn parse(value: &str) -> Option<Self> {
        match value {
            "created_at" => Some(Self::CreatedAt),
            "cost_usd" | "cost" => Some(Self::CostUsd),
            "duration_ms" | "duration" => Some(Self::DurationMs),
            "total_tokens" | "tokens" => Some(Self::TotalTokens),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::CostUsd => "cost_usd",
            Self::DurationMs => "duration_ms",
            Self::TotalTokens => "total_tokens",
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::TotalTokens => "(input_tokens + output_tokens)",
            other => other.as_str(),
        }
    }

    fn compare(self, a: &UsageLog, b: &UsageLog, direction: SortDirection) -> Ordering {
        let primary = match self {
            Self::CreatedAt => cmp_values(a.created_at, b.created_at, direction),
            Self::CostUsd => cmp_values(a.cost_usd, b.cost_usd, direction),
            Self::DurationMs => cmp_values(a.duration_ms, b.duration_ms, direction),
            Self::TotalTokens => cmp_values(a.total_tokens(), b.total_tokens(), direction),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchSort {
    #[default]
    SearchedAt,
    City,
    ResultsCount,
}

impl SortKey for SearchSort {
    type Row = SearchedCity;

    fn parse(value: &str) -> Option<Self> {
        match value {
            "searched_at" => Some(Self::SearchedAt),
            "city" => Some(Self::City),
            "results_count" | "results" => Some(Self::ResultsCount),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::SearchedAt => "searched_at",
            Self::City => "city",
            Self::ResultsCount => "results_count",
        }
    }

    fn column(self) -> &'static str {
        self.as_str()
    }

    fn compare(self, a: &SearchedCity, b: &SearchedCity, direction: SortDirection) -> Ordering {
        let primary = match self {
            Self::SearchedAt => cmp_values(a.searched_at, b.searched_at, direction),
            Self::City => cmp_values(a.city.to_lowercase(), b.city.to_lowercase(), direction),
            Self::ResultsCount => cmp_values(a.results_count, b.results_count, direction),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

/// Case-insensitive substring test; the in-memory twin of `ILIKE '%needle%'`.
pub fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(&needle.to_lowercase()))
        .unwrap_or(false)
}

/// Case-insensitive equality; the in-memory twin of `lower(col) = lower($n)`.
pub fn eq_ci(value: Option<&str>, expected: &str) -> bool {
    value
        .map(|v| v.trim().eq_ignore_ascii_case(expected.trim()))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractorFilter {
    /// Matched against business name, category, city and address.
    pub search: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub category: Option<String>,
    pub min_rating: Option<f64>,
    pub has_reviews: Option<bool>,
}

impl ContractorFilter {
    pub fn matches(&self, row: &Contractor) -> bool {
        if let Some(needle) = &self.search {
            let hit = contains_ci(Some(&row.business_name), needle)
                || contains_ci(row.category.as_deref(), needle)
                || contains_ci(row.city.as_deref(), needle)
                || contains_ci(row.address.as_deref(), needle);
            if !hit {
                return false;
            }
        }
        if let Some(city) = &self.city {
            if !eq_ci(row.city.as_deref(), city) {
                return false;
            }
        }
        if let Some(state) = &self.state {
            if !eq_ci(row.state.as_deref(), state) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if !eq_ci(row.category.as_deref(), category) {
                return false;
            }
        }
        if let Some(min) = self.min_rating {
            if !row.rating.map(|r| r >= min).unwrap_or(false) {
                return false;
            }
        }
        if let Some(has_reviews) = self.has_reviews {
            if (row.review_count > 0) != has_reviews {
                return false;
            }
        }
        true
    }

    /// Same filter with the free-text search removed.
    pub fn without_search(&self) -> Self {
        Self {
            search: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewFilter {
    pub contractor_id: Option<Uuid>,
    pub min_rating: Option<i32>,
    pub max_rating: Option<i32>,
    pub has_text: Option<bool>,
    /// Matched against review text and reviewer name.
    pub search: Option<String>,
}

impl ReviewFilter {
    pub fn for_contractor(contractor_id: Uuid) -> Self {
        Self {
            contractor_id: Some(contractor_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, row: &Review) -> bool {
        if let Some(id) = self.contractor_id {
            if row.contractor_id != id {
                return false;
            }
        }
        if let Some(min) = self.min_rating {
            if row.rating < min {
                return false;
            }
        }
        if let Some(max) = self.max_rating {
            if row.rating > max {
                return false;
            }
        }
        if let Some(has_text) = self.has_text {
            if row.has_text() != has_text {
                return false;
            }
        }
        if let Some(needle) = &self.search {
            if !contains_ci(row.review_text.as_deref(), needle)
                && !contains_ci(row.reviewer_name.as_deref(), needle)
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisFilter {
    pub contractor_id: Option<Uuid>,
    pub sentiment: Option<String>,
}

impl AnalysisFilter {
    pub fn matches(&self, row: &Analysis) -> bool {
        if let Some(id) = self.contractor_id {
            if row.contractor_id != id {
                return false;
            }
        }
        if let Some(sentiment) = &self.sentiment {
            if !eq_ci(row.summary().sentiment.as_deref(), sentiment) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleFilter {
    pub contractor_id: Option<Uuid>,
    pub status: Option<ArticleStatus>,
    /// Matched against title and slug.
    pub search: Option<String>,
}

impl ArticleFilter {
    pub fn matches(&self, row: &Article) -> bool {
        if let Some(id) = self.contractor_id {
            if row.contractor_id != id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if row.status != status {
                return false;
            }
        }
        if let Some(needle) = &self.search {
            if !contains_ci(Some(&row.title), needle) && !contains_ci(Some(&row.slug), needle) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageFilter {
    pub operation: Option<String>,
    pub model: Option<String>,
    pub success: Option<bool>,
    pub since: Option<DateTime<Utc>>,
}

impl UsageFilter {
    pub fn matches(&self, row: &UsageLog) -> bool {
        if let Some(op) = &self.operation {
            if !eq_ci(Some(&row.operation), op) {
                return false;
            }
        }
        if let Some(model) = &self.model {
            if !eq_ci(Some(&row.model), model) {
                return false;
            }
        }
        if let Some(success) = self.success {
            if row.success != success {
                return false;
            }
        }
        if let Some(since) = self.since {
            if row.created_at < since {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Substring match.
    pub city: Option<String>,
    pub state: Option<String>,
    /// Substring match.
    pub search_term: Option<String>,
}

impl SearchFilter {
    pub fn matches(&self, row: &SearchedCity) -> bool {
        if let Some(city) = &self.city {
            if !contains_ci(Some(&row.city), city) {
                return false;
            }
        }
        if let Some(state) = &self.state {
            if !eq_ci(Some(&row.state), state) {
                return false;
            }
        }
        if let Some(term) = &self.search_term {
            if !contains_ci(Some(&row.search_term), term) {
                return false;
            }
        }
        true
    }
}

/// Columns that feed filter dropdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistinctField {
    ContractorCity,
    ContractorState,
    ContractorCategory,
    UsageModel,
    UsageOperation,
    SearchState,
}

impl DistinctField {
    pub fn table(self) -> &'static str {
        match self {
            Self::ContractorCity | Self::ContractorState | Self::ContractorCategory => "contractors",
            Self::UsageModel | Self::UsageOperation => "ai_usage_log",
            Self::SearchState => "searched_cities",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::ContractorCity => "city",
            Self::ContractorState | Self::SearchState => "state",
            Self::ContractorCategory => "category",
            Self::UsageModel => "model",
            Self::UsageOperation => "operation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn contractor(name: &str, city: &str, rating: Option<f64>, reviews: i32) -> Contractor {
        let ts = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().unwrap();
        Contractor {
            id: Uuid::new_v4(),
            business_name: name.into(),
            category: Some("Chimney Sweep".into()),
            city: Some(city.into()),
            state: Some("CO".into()),
            address: None,
            phone: None,
            website: None,
            google_place_id: None,
            rating,
            review_count: reviews,
            search_terms: vec![],
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn offset_calculation() {
        assert_eq!(Pagination::new(1, 10).offset(), 0);
        assert_eq!(Pagination::new(2, 10).offset(), 10);
        assert_eq!(Pagination::new(3, 25).offset(), 50);
    }

    #[test]
    fn pagination_clamps() {
        assert_eq!(Pagination::new(0, 10).page(), 1);
        assert_eq!(Pagination::new(1, 0).per_page(), 1);
        assert_eq!(Pagination::new(1, 999).per_page(), 100);
        assert_eq!(Pagination::from_params(None, None), Pagination::default());
    }

    #[test]
    fn last_representable_page_is_empty_not_a_panic() {
        let pagination = Pagination::new(u32::MAX, 100);
        assert_eq!(pagination.offset(), u64::from(u32::MAX - 1) * 100);
        let page = Page::from_rows((1..=12).collect::<Vec<_>>(), pagination);
        assert!(page.items.is_empty());
        assert_eq!(page.total, 12);
        assert!(!page.has_next());
        assert!(page.has_prev());
    }

    #[test]
    fn page_from_rows_slices_and_counts() {
        let page = Page::from_rows((1..=12).collect::<Vec<_>>(), Pagination::new(2, 5));
        assert_eq!(page.items, vec![6, 7, 8, 9, 10]);
        assert_eq!(page.total, 12);
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());
        assert!(page.has_prev());

        let empty: Page<u8> = Page::empty(Pagination::default());
        assert_eq!(empty.total_pages(), 1);
        assert!(!empty.has_next());
    }

    #[test]
    fn contractor_filter_combines_predicates() {
        let denver = contractor("Acme Chimney", "Denver", Some(4.6), 12);
        let boulder = contractor("Flue Pros", "Boulder", Some(3.9), 0);

        let filter = ContractorFilter {
            search: Some("acme".into()),
            ..Default::default()
        };
        assert!(filter.matches(&denver));
        assert!(!filter.matches(&boulder));

        let filter = ContractorFilter {
            city: Some("denver".into()),
            min_rating: Some(4.5),
            has_reviews: Some(true),
            ..Default::default()
        };
        assert!(filter.matches(&denver));
        assert!(!filter.matches(&boulder));

        let unrated = contractor("Unrated", "Denver", None, 0);
        let filter = ContractorFilter {
            min_rating: Some(1.0),
            ..Default::default()
        };
        assert!(!filter.matches(&unrated));
    }

    #[test]
    fn sort_puts_nulls_last_in_both_directions() {
        let mut rows = vec![
            contractor("A", "X", None, 1),
            contractor("B", "X", Some(4.0), 2),
            contractor("C", "X", Some(4.8), 3),
        ];
        let desc = ListQuery::new(Pagination::default(), ContractorSort::Rating, SortDirection::Desc);
        desc.sort_rows(&mut rows);
        assert_eq!(rows[0].business_name, "C");
        assert_eq!(rows[2].business_name, "A");

        let asc = ListQuery::new(Pagination::default(), ContractorSort::Rating, SortDirection::Asc);
        asc.sort_rows(&mut rows);
        assert_eq!(rows[0].business_name, "B");
        assert_eq!(rows[2].business_name, "A");
    }

    #[test]
    fn sort_keys_only_parse_whitelisted_names() {
        assert_eq!(ContractorSort::parse("rating"), Some(ContractorSort::Rating));
        assert_eq!(ContractorSort::parse("rating; drop table contractors"), None);
        assert_eq!(UsageSort::parse("tokens").map(SortKey::column), Some("(input_tokens + output_tokens)"));
        assert_eq!(SortDirection::parse("ASC"), Some(SortDirection::Asc));
    }
}
