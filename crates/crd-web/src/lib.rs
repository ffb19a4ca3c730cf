//! Axum + Askama dashboard over the contractor-review agent's tables.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use askama::Template;
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use crd_core::{
    AnalysisSort, ArticleFilter, ArticleSort, ArticleStatus, ContractorSort, DistinctField,
    ListQuery, Page, Pagination, ReviewFilter, ReviewSort, SearchSort, Sentiment, SortDirection,
    TableCounts, UsageSort,
};
use crd_reports::{
    cost_histogram, daily_trend, duplicate_search_keys, duration_histogram, pipeline_status,
    rating_distribution_from_counts, render_preview, sentiment_breakdown, Histogram, RatingBar,
    SentimentCount, StageStatus, UsageSummary,
};
use crd_storage::{
    open_store, ArticleExporter, DashboardStore, DbConfig, Revalidate, StorageResult,
    MAX_SCAN_ROWS,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

mod params;
mod views;

use params::{options, text, ListParams, Pager, SelectOption, SortLink};
use views::{
    AnalysisRow, ArticleRow, ContractorRow, DuplicateRow, ReviewRow, SearchRow, TrendRow,
    UsageCard, UsageRow,
};

pub const CRATE_NAME: &str = "crd-web";

const DEFAULT_REVALIDATE_SECS: u64 = 60;
const OVERVIEW_WINDOW_DAYS: u32 = 7;
const DETAIL_ROWS: u32 = 100;

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub revalidate: Duration,
    pub workspace_root: PathBuf,
}

impl WebConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("CRD_WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("CRD_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            revalidate: Duration::from_secs(
                std::env::var("CRD_REVALIDATE_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_REVALIDATE_SECS),
            ),
            workspace_root: PathBuf::from("."),
        }
    }
}

pub struct AppState {
    pub store: Arc<dyn DashboardStore>,
    pub exporter: ArticleExporter,
    pub workspace_root: PathBuf,
    overview: Revalidate<Overview>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DashboardStore>,
        exporter: ArticleExporter,
        workspace_root: impl Into<PathBuf>,
        revalidate: Duration,
    ) -> Self {
        Self {
            store,
            exporter,
            workspace_root: workspace_root.into(),
            overview: Revalidate::new(revalidate),
        }
    }
}

/// Payload behind `/`, rebuilt at most once per revalidation window.
#[derive(Debug, Clone)]
struct Overview {
    counts: TableCounts,
    stages: Vec<StageStatus>,
    usage: UsageCard,
    recent_articles: Vec<ArticleRow>,
    refreshed_at: String,
}

impl Overview {
    fn empty() -> Self {
        let counts = TableCounts::default();
        Self {
            stages: pipeline_status(&counts),
            counts,
            usage: UsageCard::from_summary(&UsageSummary::default()),
            recent_articles: vec![],
            refreshed_at: views::datetime(Utc::now()),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    overview: Overview,
    window_days: u32,
}

#[derive(Template)]
#[template(path = "contractors.html")]
struct ContractorsTemplate {
    rows: Vec<ContractorRow>,
    pager: Pager,
    columns: Vec<SortLink>,
    q: String,
    min_rating: String,
    cities: Vec<SelectOption>,
    states: Vec<SelectOption>,
    categories: Vec<SelectOption>,
}

#[derive(Template)]
#[template(path = "contractors_table_partial.html")]
struct ContractorsTablePartialTemplate {
    rows: Vec<ContractorRow>,
    pager: Pager,
    columns: Vec<SortLink>,
}

#[derive(Template)]
#[template(path = "contractor_detail.html")]
struct ContractorDetailTemplate {
    contractor: ContractorRow,
    rating_bars: Vec<RatingBar>,
    rating_total: u64,
    average_rating: String,
    reviews_total: u64,
    reviews_truncated: bool,
    reviews: Vec<ReviewRow>,
    analyses: Vec<AnalysisRow>,
    articles: Vec<ArticleRow>,
}

#[derive(Template)]
#[template(path = "reviews.html")]
struct ReviewsTemplate {
    rows: Vec<ReviewRow>,
    pager: Pager,
    columns: Vec<SortLink>,
    q: String,
    min_rating: String,
    max_rating: String,
    contractor: String,
    has_text: Vec<SelectOption>,
}

#[derive(Template)]
#[template(path = "analyses.html")]
struct AnalysesTemplate {
    rows: Vec<AnalysisRow>,
    pager: Pager,
    columns: Vec<SortLink>,
    sentiments: Vec<SelectOption>,
    breakdown: Vec<SentimentCount>,
    breakdown_rows: usize,
}

#[derive(Template)]
#[template(path = "analysis_detail.html")]
struct AnalysisDetailTemplate {
    row: AnalysisRow,
    raw_json: String,
}

#[derive(Template)]
#[template(path = "articles.html")]
struct ArticlesTemplate {
    rows: Vec<ArticleRow>,
    pager: Pager,
    columns: Vec<SortLink>,
    q: String,
    statuses: Vec<SelectOption>,
}

#[derive(Template)]
#[template(path = "article_detail.html")]
struct ArticleDetailTemplate {
    row: ArticleRow,
    preview_html: String,
}

#[derive(Template)]
#[template(path = "article_status_partial.html")]
struct ArticleStatusPartialTemplate {
    row: ArticleRow,
}

#[derive(Template)]
#[template(path = "article_export_partial.html")]
struct ArticleExportPartialTemplate {
    path: String,
    short_hash: String,
    bytes: usize,
    unchanged: bool,
}

#[derive(Template)]
#[template(path = "usage.html")]
struct UsageTemplate {
    days: u32,
    day_options: Vec<SelectOption>,
    card: UsageCard,
    durations: Histogram,
    costs: Histogram,
    trend: Vec<TrendRow>,
    rows: Vec<UsageRow>,
    pager: Pager,
    columns: Vec<SortLink>,
    models: Vec<SelectOption>,
    operations: Vec<SelectOption>,
    outcomes: Vec<SelectOption>,
}

#[derive(Template)]
#[template(path = "searches.html")]
struct SearchesTemplate {
    rows: Vec<SearchRow>,
    pager: Pager,
    columns: Vec<SortLink>,
    city: String,
    term: String,
    states: Vec<SelectOption>,
    duplicates: Vec<DuplicateRow>,
    scanned: usize,
}

#[derive(Template)]
#[template(path = "not_found.html")]
struct NotFoundTemplate {
    what: &'static str,
}

const CONTRACTOR_COLUMNS: &[(ContractorSort, &str)] = &[
    (ContractorSort::BusinessName, "Business"),
    (ContractorSort::City, "Location"),
    (ContractorSort::Rating, "Rating"),
    (ContractorSort::ReviewCount, "Reviews"),
    (ContractorSort::CreatedAt, "Added"),
];

const REVIEW_COLUMNS: &[(ReviewSort, &str)] = &[
    (ReviewSort::Rating, "Rating"),
    (ReviewSort::ReviewDate, "Review date"),
    (ReviewSort::CreatedAt, "Collected"),
];

const ANALYSIS_COLUMNS: &[(AnalysisSort, &str)] = &[
    (AnalysisSort::ReviewsAnalyzed, "Reviews"),
    (AnalysisSort::AnalyzedAt, "Analyzed"),
];

const ARTICLE_COLUMNS: &[(ArticleSort, &str)] = &[
    (ArticleSort::Title, "Title"),
    (ArticleSort::WordCount, "Words"),
    (ArticleSort::GeneratedAt, "Generated"),
];

const USAGE_COLUMNS: &[(UsageSort, &str)] = &[
    (UsageSort::CreatedAt, "When"),
    (UsageSort::TotalTokens, "Tokens"),
    (UsageSort::CostUsd, "Cost"),
    (UsageSort::DurationMs, "Duration"),
];

const SEARCH_COLUMNS: &[(SearchSort, &str)] = &[
    (SearchSort::City, "City"),
    (SearchSort::ResultsCount, "Results"),
    (SearchSort::SearchedAt, "Searched"),
];

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/contractors", get(contractors_page_handler))
        .route("/contractors/table", get(contractors_table_handler))
        .route("/contractors/{id}", get(contractor_detail_handler))
        .route("/reviews", get(reviews_handler))
        .route("/analyses", get(analyses_handler))
        .route("/analyses/{id}", get(analysis_detail_handler))
        .route("/articles", get(articles_handler))
        .route("/articles/{id}", get(article_detail_handler))
        .route("/articles/{id}/status", post(article_status_handler))
        .route("/articles/{id}/export", post(article_export_handler))
        .route("/usage", get(usage_handler))
        .route("/usage/chart", get(usage_chart_handler))
        .route("/searches", get(searches_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route("/assets/static/app.css", get(app_css_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = WebConfig::from_env();
    let store = open_store(&DbConfig::from_env())
        .await
        .context("opening dashboard store")?;
    let state = AppState::new(
        store,
        ArticleExporter::from_env(),
        config.workspace_root.clone(),
        config.revalidate,
    );
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("binding {}:{}", config.host, config.port))?;
    info!(host = %config.host, port = config.port, "dashboard listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Logs a failed query and substitutes `fallback`, so the page still renders.
fn logged<T>(what: &'static str, result: StorageResult<T>, fallback: impl FnOnce() -> T) -> T {
    result.unwrap_or_else(|err| {
        error!(error = %err, query = what, "query failed; rendering empty result");
        fallback()
    })
}

async fn names_for(
    store: &dyn DashboardStore,
    ids: impl IntoIterator<Item = Uuid>,
) -> HashMap<Uuid, String> {
    let mut ids = ids.into_iter().collect::<Vec<_>>();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return HashMap::new();
    }
    logged("contractor names", store.contractor_names(&ids).await, HashMap::new)
}

async fn load_overview(store: &dyn DashboardStore) -> StorageResult<Overview> {
    let since = Utc::now() - chrono::Duration::days(i64::from(OVERVIEW_WINDOW_DAYS));
    let recent_query = ListQuery::new(
        Pagination::new(1, 5),
        ArticleSort::GeneratedAt,
        SortDirection::Desc,
    );
    let all_articles = ArticleFilter::default();
    let (counts, logs, recent) = tokio::try_join!(
        store.table_counts(),
        store.usage_logs_since(since, MAX_SCAN_ROWS),
        store.list_articles(&all_articles, recent_query),
    )?;
    let names = names_for(store, recent.items.iter().map(|a| a.contractor_id)).await;
    Ok(Overview {
        stages: pipeline_status(&counts),
        counts,
        usage: UsageCard::from_summary(&UsageSummary::from_logs(&logs)),
        recent_articles: recent
            .items
            .iter()
            .map(|a| ArticleRow::from_article(a, &names))
            .collect(),
        refreshed_at: views::datetime(Utc::now()),
    })
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let overview = state
        .overview
        .get_or_refresh(|| load_overview(state.store.as_ref()))
        .await;
    render_html(IndexTemplate {
        overview: logged("overview", overview, Overview::empty),
        window_days: OVERVIEW_WINDOW_DAYS,
    })
}

async fn contractor_table(
    state: &AppState,
    params: &ListParams,
) -> (Vec<ContractorRow>, Pager, Vec<SortLink>) {
    let pagination = params.pagination();
    let page = logged(
        "contractors",
        state
            .store
            .list_contractors(&params.contractor_filter(), params.list_query())
            .await,
        || Page::empty(pagination),
    );
    (
        page.items.iter().map(ContractorRow::from_contractor).collect(),
        params.pager("/contractors", &page),
        params.sort_links("/contractors", CONTRACTOR_COLUMNS),
    )
}

async fn contractors_page_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let store = state.store.as_ref();
    let ((rows, pager, columns), cities, states, categories) = tokio::join!(
        contractor_table(&state, &params),
        store.distinct_values(DistinctField::ContractorCity),
        store.distinct_values(DistinctField::ContractorState),
        store.distinct_values(DistinctField::ContractorCategory),
    );
    render_html(ContractorsTemplate {
        rows,
        pager,
        columns,
        q: text(&params.q).unwrap_or_default(),
        min_rating: text(&params.min_rating).unwrap_or_default(),
        cities: options(&logged("cities", cities, Vec::new), &params.city),
        states: options(&logged("states", states, Vec::new), &params.state),
        categories: options(&logged("categories", categories, Vec::new), &params.category),
    })
}

async fn contractors_table_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let (rows, pager, columns) = contractor_table(&state, &params).await;
    let mut resp = render_html(ContractorsTablePartialTemplate {
        rows,
        pager,
        columns,
    });
    resp.headers_mut().insert(
        header::HeaderName::from_static("hx-trigger"),
        header::HeaderValue::from_static("contractorsTableLoaded"),
    );
    resp
}

async fn contractor_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let Ok(id) = Uuid::parse_str(&id) else {
        return not_found("Contractor");
    };
    let contractor = match state.store.get_contractor(id).await {
        Ok(Some(contractor)) => contractor,
        Ok(None) => return not_found("Contractor"),
        Err(err) => {
            error!(%id, error = %err, "loading contractor");
            return not_found("Contractor");
        }
    };

    let pagination = Pagination::new(1, DETAIL_ROWS);
    let review_filter = ReviewFilter::for_contractor(id);
    let article_filter = ArticleFilter {
        contractor_id: Some(id),
        ..ArticleFilter::default()
    };
    let (reviews, ratings, analysis, articles) = tokio::join!(
        state.store.list_reviews(
            &review_filter,
            ListQuery::new(pagination, ReviewSort::ReviewDate, SortDirection::Desc),
        ),
        state.store.rating_counts(&review_filter),
        state.store.latest_analysis_for(id),
        state.store.list_articles(
            &article_filter,
            ListQuery::new(pagination, ArticleSort::GeneratedAt, SortDirection::Desc),
        ),
    );
    let reviews = logged("contractor reviews", reviews, || Page::empty(pagination));
    let ratings = logged("contractor ratings", ratings, Default::default);
    let analysis = logged("contractor analysis", analysis, || None);
    let articles = logged("contractor articles", articles, || Page::empty(pagination)).items;

    let names = HashMap::from([(contractor.id, contractor.business_name.clone())]);
    let distribution = rating_distribution_from_counts(&ratings);
    render_html(ContractorDetailTemplate {
        contractor: ContractorRow::from_contractor(&contractor),
        rating_bars: distribution.bars,
        rating_total: distribution.total,
        average_rating: distribution
            .average
            .map(|avg| format!("{avg:.2}"))
            .unwrap_or_else(|| "n/a".to_string()),
        reviews_total: reviews.total,
        reviews_truncated: reviews.total > reviews.items.len() as u64,
        reviews: reviews
            .items
            .iter()
            .map(|r| ReviewRow::from_review(r, &names))
            .collect(),
        analyses: analysis
            .iter()
            .map(|a| AnalysisRow::from_analysis(a, &names))
            .collect(),
        articles: articles.iter().map(|a| ArticleRow::from_article(a, &names)).collect(),
    })
}

async fn reviews_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let pagination = params.pagination();
    let page = logged(
        "reviews",
        state
            .store
            .list_reviews(&params.review_filter(), params.list_query())
            .await,
        || Page::empty(pagination),
    );
    let names = names_for(state.store.as_ref(), page.items.iter().map(|r| r.contractor_id)).await;
    let contractor = params::uuid(&params.contractor)
        .map(|id| id.to_string())
        .unwrap_or_default();
    render_html(ReviewsTemplate {
        rows: page.items.iter().map(|r| ReviewRow::from_review(r, &names)).collect(),
        pager: params.pager("/reviews", &page),
        columns: params.sort_links("/reviews", REVIEW_COLUMNS),
        q: text(&params.q).unwrap_or_default(),
        min_rating: text(&params.min_rating).unwrap_or_default(),
        max_rating: text(&params.max_rating).unwrap_or_default(),
        contractor,
        has_text: choices(
            &[("true", "With text"), ("false", "Rating only")],
            &params.has_text,
        ),
    })
}

fn choices(pairs: &[(&str, &str)], current: &Option<String>) -> Vec<SelectOption> {
    let current = text(current);
    pairs
        .iter()
        .map(|(value, label)| SelectOption {
            value: value.to_string(),
            label: label.to_string(),
            selected: current.as_deref() == Some(*value),
        })
        .collect()
}

async fn analyses_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let pagination = params.pagination();
    let filter = params.analysis_filter();
    let (page, scanned) = tokio::join!(
        state.store.list_analyses(&filter, params.list_query()),
        state.store.scan_analyses(&filter, MAX_SCAN_ROWS),
    );
    let page = logged("analyses", page, || Page::empty(pagination));
    let scanned = logged("analysis scan", scanned, Vec::new);
    if scanned.len() as u32 >= MAX_SCAN_ROWS {
        warn!(rows = scanned.len(), "analysis scan truncated; breakdown covers the newest rows only");
    }
    let names = names_for(state.store.as_ref(), page.items.iter().map(|a| a.contractor_id)).await;
    let sentiment_pairs = Sentiment::ALL
        .iter()
        .filter(|s| **s != Sentiment::Unknown)
        .map(|s| (s.as_str(), s.as_str()))
        .collect::<Vec<_>>();
    render_html(AnalysesTemplate {
        breakdown: sentiment_breakdown(&scanned),
        breakdown_rows: scanned.len(),
        rows: page
            .items
            .iter()
            .map(|a| AnalysisRow::from_analysis(a, &names))
            .collect(),
        pager: params.pager("/analyses", &page),
        columns: params.sort_links("/analyses", ANALYSIS_COLUMNS),
        sentiments: choices(&sentiment_pairs, &params.sentiment),
    })
}

async fn analysis_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let Ok(id) = Uuid::parse_str(&id) else {
        return not_found("Analysis");
    };
    let analysis = match state.store.get_analysis(id).await {
        Ok(Some(analysis)) => analysis,
        Ok(None) => return not_found("Analysis"),
        Err(err) => {
            error!(%id, error = %err, "loading analysis");
            return not_found("Analysis");
        }
    };
    let names = names_for(state.store.as_ref(), [analysis.contractor_id]).await;
    let raw_json = serde_json::to_string_pretty(&analysis.analysis_json)
        .unwrap_or_else(|_| analysis.analysis_json.to_string());
    render_html(AnalysisDetailTemplate {
        row: AnalysisRow::from_analysis(&analysis, &names),
        raw_json,
    })
}

async fn articles_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let pagination = params.pagination();
    let page = logged(
        "articles",
        state
            .store
            .list_articles(&params.article_filter(), params.list_query())
            .await,
        || Page::empty(pagination),
    );
    let names = names_for(state.store.as_ref(), page.items.iter().map(|a| a.contractor_id)).await;
    render_html(ArticlesTemplate {
        rows: page
            .items
            .iter()
            .map(|a| ArticleRow::from_article(a, &names))
            .collect(),
        pager: params.pager("/articles", &page),
        columns: params.sort_links("/articles", ARTICLE_COLUMNS),
        q: text(&params.q).unwrap_or_default(),
        statuses: choices(
            &[("draft", "Draft"), ("published", "Published"), ("archived", "Archived")],
            &params.status,
        ),
    })
}

async fn load_article(
    state: &AppState,
    raw_id: &str,
) -> Result<(crd_core::Article, HashMap<Uuid, String>), Response> {
    let id = Uuid::parse_str(raw_id).map_err(|_| not_found("Article"))?;
    let article = match state.store.get_article(id).await {
        Ok(Some(article)) => article,
        Ok(None) => return Err(not_found("Article")),
        Err(err) => {
            error!(%id, error = %err, "loading article");
            return Err(not_found("Article"));
        }
    };
    let names = names_for(state.store.as_ref(), [article.contractor_id]).await;
    Ok((article, names))
}

async fn article_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    match load_article(&state, &id).await {
        Ok((article, names)) => render_html(ArticleDetailTemplate {
            preview_html: render_preview(&article.content_markdown),
            row: ArticleRow::from_article(&article, &names),
        }),
        Err(resp) => resp,
    }
}

#[derive(Debug, Default, Deserialize)]
struct StatusParams {
    status: Option<String>,
}

/// Sets `?status=` when given, otherwise toggles publish state.
/// An unrecognised status is rejected without touching the row.
async fn article_status_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Query(params): Query<StatusParams>,
) -> Response {
    let requested = match text(&params.status) {
        None => None,
        Some(raw) => match ArticleStatus::parse(&raw) {
            Some(status) => Some(status),
            None => {
                warn!(%id, status = %raw, "rejecting unknown article status");
                return bad_request("Unknown article status; expected draft, published or archived.");
            }
        },
    };
    let (article, names) = match load_article(&state, &id).await {
        Ok(found) => found,
        Err(resp) => return resp,
    };
    let next = requested.unwrap_or_else(|| article.status.toggled());
    match state.store.set_article_status(article.id, next).await {
        Ok(Some(updated)) => {
            info!(id = %updated.id, status = updated.status.as_str(), "article status changed");
            state.overview.invalidate().await;
            render_html(ArticleStatusPartialTemplate {
                row: ArticleRow::from_article(&updated, &names),
            })
        }
        Ok(None) => not_found("Article"),
        Err(err) => server_error(anyhow::anyhow!("failed to update article status: {err}")),
    }
}

async fn article_export_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let (article, names) = match load_article(&state, &id).await {
        Ok(found) => found,
        Err(resp) => return resp,
    };
    let contractor = names.get(&article.contractor_id).map(String::as_str);
    match state.exporter.export(&article, contractor).await {
        Ok(exported) => {
            info!(
                id = %exported.article_id,
                path = %exported.absolute_path.display(),
                unchanged = exported.unchanged,
                "article exported"
            );
            render_html(ArticleExportPartialTemplate {
                path: exported.relative_path.display().to_string(),
                short_hash: exported.content_hash.chars().take(12).collect(),
                bytes: exported.byte_size,
                unchanged: exported.unchanged,
            })
        }
        Err(err) => server_error(err),
    }
}

async fn usage_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let now = Utc::now();
    let days = params.window_days();
    let pagination = params.pagination();
    let store = state.store.as_ref();
    let filter = params.usage_filter(now);
    let (logs, page, models, operations) = tokio::join!(
        store.usage_logs_since(params.window_start(now), MAX_SCAN_ROWS),
        store.list_usage_logs(&filter, params.list_query()),
        store.distinct_values(DistinctField::UsageModel),
        store.distinct_values(DistinctField::UsageOperation),
    );
    let logs = logged("usage window", logs, Vec::new);
    if logs.len() as u32 >= MAX_SCAN_ROWS {
        warn!(days, rows = logs.len(), "usage window truncated; aggregates cover the newest rows only");
    }
    let page = logged("usage logs", page, || Page::empty(pagination));
    let day_pairs = [("7", "7 days"), ("30", "30 days"), ("90", "90 days")];
    let current_days = Some(days.to_string());
    render_html(UsageTemplate {
        days,
        day_options: choices(&day_pairs, &current_days),
        card: UsageCard::from_summary(&UsageSummary::from_logs(&logs)),
        durations: duration_histogram(&logs),
        costs: cost_histogram(&logs),
        trend: daily_trend(&logs, days, now.date_naive())
            .iter()
            .map(TrendRow::from_point)
            .collect(),
        rows: page.items.iter().map(UsageRow::from_log).collect(),
        pager: params.pager("/usage", &page),
        columns: params.sort_links("/usage", USAGE_COLUMNS),
        models: options(&logged("models", models, Vec::new), &params.model),
        operations: options(&logged("operations", operations, Vec::new), &params.operation),
        outcomes: choices(&[("true", "Succeeded"), ("false", "Failed")], &params.success),
    })
}

async fn usage_chart_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let now = Utc::now();
    let days = params.window_days();
    let logs = logged(
        "usage chart",
        state
            .store
            .usage_logs_since(params.window_start(now), MAX_SCAN_ROWS)
            .await,
        Vec::new,
    );
    let trend = daily_trend(&logs, days, now.date_naive());
    let x = trend.iter().map(|p| p.date.to_string()).collect::<Vec<_>>();
    let calls = trend.iter().map(|p| p.calls).collect::<Vec<_>>();
    let cost = trend
        .iter()
        .map(|p| (p.cost_usd * 10_000.0).round() / 10_000.0)
        .collect::<Vec<_>>();
    Json(serde_json::json!({
        "data": [
            {
                "type": "bar",
                "name": "Calls",
                "x": x,
                "y": calls,
                "marker": {"color": "#0ea5e9"}
            },
            {
                "type": "scatter",
                "mode": "lines+markers",
                "name": "Cost (USD)",
                "x": x,
                "y": cost,
                "yaxis": "y2",
                "line": {"color": "#f97316"}
            }
        ],
        "layout": {
            "title": format!("AI usage, last {days} days"),
            "paper_bgcolor": "#ffffff",
            "plot_bgcolor": "#f8fafc",
            "yaxis": {"title": "Calls"},
            "yaxis2": {"title": "USD", "overlaying": "y", "side": "right"}
        }
    }))
    .into_response()
}

async fn searches_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let pagination = params.pagination();
    let store = state.store.as_ref();
    let filter = params.search_filter();
    let (page, all, states) = tokio::join!(
        store.list_searched_cities(&filter, params.list_query()),
        store.all_searched_cities(MAX_SCAN_ROWS),
        store.distinct_values(DistinctField::SearchState),
    );
    let page = logged("searched cities", page, || Page::empty(pagination));
    let all = logged("search history", all, Vec::new);
    let duplicates = duplicate_search_keys(&all);
    let repeated = duplicates
        .iter()
        .map(|d| d.key.as_str())
        .collect::<HashSet<_>>();
    render_html(SearchesTemplate {
        rows: page
            .items
            .iter()
            .map(|s| SearchRow::from_search(s, repeated.contains(s.search_key().as_str())))
            .collect(),
        pager: params.pager("/searches", &page),
        columns: params.sort_links("/searches", SEARCH_COLUMNS),
        city: text(&params.city).unwrap_or_default(),
        term: text(&params.term).unwrap_or_default(),
        states: options(&logged("search states", states, Vec::new), &params.state),
        duplicates: duplicates.iter().map(DuplicateRow::from_duplicate).collect(),
        scanned: all.len(),
    })
}

async fn app_css_handler(State(state): State<Arc<AppState>>) -> Response {
    let css_path = state.workspace_root.join("assets/static/app.css");
    match tokio::fs::read_to_string(&css_path).await {
        Ok(css) => ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], css).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, Html("/* missing app.css */".to_string())).into_response(),
    }
}

fn not_found(what: &'static str) -> Response {
    let mut resp = render_html(NotFoundTemplate { what });
    if resp.status() == StatusCode::OK {
        *resp.status_mut() = StatusCode::NOT_FOUND;
    }
    resp
}

fn bad_request(message: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, Html(message.to_string())).into_response()
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}
