//! Display rows: domain structs flattened into the strings the templates print.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use crd_core::{Analysis, Article, Contractor, Review, SearchedCity, UsageLog};
use crd_reports::{
    format_duration_ms, format_usd, word_count, DailyPoint, DuplicateSearch, GroupUsage, UsageSummary,
};
use uuid::Uuid;

const DASH: &str = "—";

pub fn date(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

pub fn datetime(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

fn or_dash(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DASH)
        .to_string()
}

pub fn stars(rating: i32) -> String {
    let filled = rating.clamp(0, 5) as usize;
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let cut = trimmed.chars().take(max_chars).collect::<String>();
        format!("{}…", cut.trim_end())
    }
}

/// Agent-written URLs are only linked when they use http or https.
pub fn safe_href(url: &str) -> Option<String> {
    let url = url.trim();
    let scheme = url.split_once("://")?.0;
    (scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https"))
        .then(|| url.to_string())
}

fn contractor_name(names: &HashMap<Uuid, String>, id: Uuid) -> String {
    names
        .get(&id)
        .cloned()
        .unwrap_or_else(|| "Unknown contractor".to_string())
}

#[derive(Debug, Clone)]
pub struct ContractorRow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub location: String,
    pub rating: String,
    pub review_count: i32,
    pub phone: String,
    pub website: String,
    /// Empty unless the website is an http(s) URL.
    pub website_href: String,
    pub address: String,
    pub search_terms: String,
    pub created_at: String,
}

impl ContractorRow {
    pub fn from_contractor(c: &Contractor) -> Self {
        let location = c.location();
        Self {
            id: c.id.to_string(),
            name: c.business_name.clone(),
            category: or_dash(c.category.as_deref()),
            location: if location.is_empty() {
                DASH.to_string()
            } else {
                location
            },
            rating: c
                .rating
                .map(|r| format!("{r:.1}"))
                .unwrap_or_else(|| DASH.to_string()),
            review_count: c.review_count,
            phone: or_dash(c.phone.as_deref()),
            website: c.website.as_deref().map(str::trim).unwrap_or_default().to_string(),
            website_href: c.website.as_deref().and_then(safe_href).unwrap_or_default(),
            address: or_dash(c.address.as_deref()),
            search_terms: if c.search_terms.is_empty() {
                DASH.to_string()
            } else {
                c.search_terms.join(", ")
            },
            created_at: date(c.created_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReviewRow {
    pub contractor_id: String,
    pub contractor_name: String,
    pub reviewer: String,
    pub rating: i32,
    pub stars: String,
    pub excerpt: String,
    pub text: String,
    pub date: String,
    pub collected_at: String,
}

impl ReviewRow {
    pub fn from_review(r: &Review, names: &HashMap<Uuid, String>) -> Self {
        let text = r.review_text.clone().unwrap_or_default();
        Self {
            contractor_id: r.contractor_id.to_string(),
            contractor_name: contractor_name(names, r.contractor_id),
            reviewer: r
                .reviewer_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Anonymous".to_string()),
            rating: r.rating,
            stars: stars(r.rating),
            excerpt: truncate(&text, 160),
            text,
            date: r.review_date.map(date).unwrap_or_else(|| DASH.to_string()),
            collected_at: date(r.created_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisRow {
    pub id: String,
    pub contractor_id: String,
    pub contractor_name: String,
    pub sentiment: &'static str,
    pub score: String,
    pub services: String,
    pub themes: Vec<String>,
    pub strengths: Vec<String>,
    pub concerns: Vec<String>,
    pub summary: String,
    pub reviews_analyzed: i32,
    pub model: String,
    pub analyzed_at: String,
}

impl AnalysisRow {
    pub fn from_analysis(a: &Analysis, names: &HashMap<Uuid, String>) -> Self {
        let summary = a.summary();
        Self {
            id: a.id.to_string(),
            contractor_id: a.contractor_id.to_string(),
            contractor_name: contractor_name(names, a.contractor_id),
            sentiment: summary.sentiment_label().as_str(),
            score: summary
                .sentiment_score
                .map(|s| format!("{s:.2}"))
                .unwrap_or_else(|| DASH.to_string()),
            services: if summary.detected_services.is_empty() {
                DASH.to_string()
            } else {
                summary.detected_services.join(", ")
            },
            themes: summary.themes,
            strengths: summary.strengths,
            concerns: summary.concerns,
            summary: summary.summary.unwrap_or_default(),
            reviews_analyzed: a.reviews_analyzed,
            model: or_dash(a.model_used.as_deref()),
            analyzed_at: datetime(a.analyzed_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArticleRow {
    pub id: String,
    pub contractor_id: String,
    pub contractor_name: String,
    pub title: String,
    pub slug: String,
    pub status: &'static str,
    pub is_published: bool,
    pub word_count: usize,
    pub model: String,
    pub generated_at: String,
    pub published_at: String,
}

impl ArticleRow {
    pub fn from_article(a: &Article, names: &HashMap<Uuid, String>) -> Self {
        Self {
            id: a.id.to_string(),
            contractor_id: a.contractor_id.to_string(),
            contractor_name: contractor_name(names, a.contractor_id),
            title: a.title.clone(),
            slug: a.slug.clone(),
            status: a.status.as_str(),
            is_published: a.status == crd_core::ArticleStatus::Published,
            word_count: a
                .word_count
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or_else(|| word_count(&a.content_markdown)),
            model: or_dash(a.model_used.as_deref()),
            generated_at: date(a.generated_at),
            published_at: a.published_at.map(date).unwrap_or_else(|| DASH.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UsageRow {
    pub created_at: String,
    pub operation: String,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost: String,
    pub duration: String,
    pub success: bool,
    pub error: String,
}

impl UsageRow {
    pub fn from_log(l: &UsageLog) -> Self {
        Self {
            created_at: datetime(l.created_at),
            operation: l.operation.clone(),
            model: l.model.clone(),
            input_tokens: l.input_tokens,
            output_tokens: l.output_tokens,
            cost: format_usd(l.cost_usd),
            duration: format_duration_ms(l.duration_ms as f64),
            success: l.success,
            error: l.error_message.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchRow {
    pub city: String,
    pub state: String,
    pub term: String,
    pub results_count: i32,
    pub searched_at: String,
    pub repeated: bool,
}

impl SearchRow {
    pub fn from_search(s: &SearchedCity, repeated: bool) -> Self {
        Self {
            city: s.city.clone(),
            state: s.state.clone(),
            term: s.search_term.clone(),
            results_count: s.results_count,
            searched_at: datetime(s.searched_at),
            repeated,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateRow {
    pub city: String,
    pub state: String,
    pub term: String,
    pub count: u64,
    pub last_searched_at: String,
}

impl DuplicateRow {
    pub fn from_duplicate(d: &DuplicateSearch) -> Self {
        Self {
            city: d.city.clone(),
            state: d.state.clone(),
            term: d.search_term.clone(),
            count: d.count,
            last_searched_at: datetime(d.last_searched_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupRow {
    pub name: String,
    pub calls: u64,
    pub cost: String,
    pub tokens: i64,
    pub avg_duration: String,
}

impl GroupRow {
    pub fn from_group(g: &GroupUsage) -> Self {
        Self {
            name: g.name.clone(),
            calls: g.calls,
            cost: format_usd(g.cost_usd),
            tokens: g.tokens,
            avg_duration: format_duration_ms(g.avg_duration_ms),
        }
    }
}

/// Headline usage numbers, pre-formatted.
#[derive(Debug, Clone)]
pub struct UsageCard {
    pub calls: u64,
    pub failed: u64,
    pub success_rate: u8,
    pub total_cost: String,
    pub avg_cost: String,
    pub avg_duration: String,
    pub tokens: i64,
    pub by_model: Vec<GroupRow>,
    pub by_operation: Vec<GroupRow>,
}

impl UsageCard {
    pub fn from_summary(s: &UsageSummary) -> Self {
        Self {
            calls: s.total_calls,
            failed: s.failed,
            success_rate: s.success_rate(),
            total_cost: format_usd(s.total_cost_usd),
            avg_cost: format_usd(s.avg_cost_usd),
            avg_duration: format_duration_ms(s.avg_duration_ms),
            tokens: s.total_tokens(),
            by_model: s.by_model.iter().map(GroupRow::from_group).collect(),
            by_operation: s.by_operation.iter().map(GroupRow::from_group).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrendRow {
    pub label: String,
    pub calls: u64,
    pub cost: String,
    pub tokens: i64,
    pub width: u8,
}

impl TrendRow {
    pub fn from_point(p: &DailyPoint) -> Self {
        Self {
            label: p.label.clone(),
            calls: p.calls,
            cost: format_usd(p.cost_usd),
            tokens: p.tokens,
            width: p.percent_of_max_calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stars_are_clamped() {
        assert_eq!(stars(4), "★★★★☆");
        assert_eq!(stars(9), "★★★★★");
        assert_eq!(stars(-1), "☆☆☆☆☆");
    }

    #[test]
    fn only_http_websites_become_links() {
        assert_eq!(
            safe_href(" https://summitsweeps.example "),
            Some("https://summitsweeps.example".to_string())
        );
        assert_eq!(safe_href("HTTP://a.example/x"), Some("HTTP://a.example/x".to_string()));
        assert_eq!(safe_href("javascript:alert(1)"), None);
        assert_eq!(safe_href("javascript://%0aalert(1)"), None);
        assert_eq!(safe_href("data:text/html,hi"), None);
        assert_eq!(safe_href("www.example.com"), None);
    }

    #[test]
    fn long_reviews_get_an_excerpt() {
        let text = "word ".repeat(60);
        let review = Review {
            id: Uuid::new_v4(),
            contractor_id: Uuid::new_v4(),
            reviewer_name: Some("  ".into()),
            rating: 5,
            review_text: Some(text),
            review_date: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single().unwrap(),
        };
        let row = ReviewRow::from_review(&review, &HashMap::new());
        assert_eq!(row.reviewer, "Anonymous");
        assert_eq!(row.contractor_name, "Unknown contractor");
        assert!(row.excerpt.ends_with('…'));
        assert!(row.excerpt.chars().count() <= 161);
        assert_eq!(row.date, "—");
        assert_eq!(row.collected_at, "2026-01-02");
    }
}
