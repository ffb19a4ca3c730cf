//! Query-string handling for list pages.
//!
//! Every value arrives as an optional string. Blank values mean "no filter" and values
//! that fail to parse are dropped rather than rejected, so a hand-edited URL still renders.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use crd_core::{
    AnalysisFilter, ArticleFilter, ArticleStatus, ContractorFilter, ListQuery, Page, Pagination,
    ReviewFilter, SearchFilter, SortDirection, SortKey, UsageFilter,
};
use serde::Deserialize;
use uuid::Uuid;

pub const DEFAULT_WINDOW_DAYS: u32 = 30;
const MAX_WINDOW_DAYS: u32 = 365;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub q: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub category: Option<String>,
    pub min_rating: Option<String>,
    pub max_rating: Option<String>,
    pub has_reviews: Option<String>,
    pub has_text: Option<String>,
    pub contractor: Option<String>,
    pub sentiment: Option<String>,
    pub status: Option<String>,
    pub operation: Option<String>,
    pub model: Option<String>,
    pub success: Option<String>,
    pub days: Option<String>,
    pub term: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
}

pub fn text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

pub fn number<T: FromStr>(value: &Option<String>) -> Option<T> {
    value.as_deref().and_then(|v| v.trim().parse().ok())
}

pub fn flag(value: &Option<String>) -> Option<bool> {
    match value.as_deref()?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn uuid(value: &Option<String>) -> Option<Uuid> {
    value.as_deref().and_then(|v| Uuid::parse_str(v.trim()).ok())
}

impl ListParams {
    pub fn pagination(&self) -> Pagination {
        Pagination::from_params(number(&self.page), number(&self.per_page))
    }

    /// Unknown sort keys fall back to the table's default column.
    pub fn list_query<S: SortKey>(&self) -> ListQuery<S> {
        let sort = self
            .sort
            .as_deref()
            .and_then(|v| S::parse(v.trim()))
            .unwrap_or_default();
        let direction = self
            .dir
            .as_deref()
            .and_then(SortDirection::parse)
            .unwrap_or_default();
        ListQuery::new(self.pagination(), sort, direction)
    }

    pub fn window_days(&self) -> u32 {
        number(&self.days)
            .unwrap_or(DEFAULT_WINDOW_DAYS)
            .clamp(1, MAX_WINDOW_DAYS)
    }

    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.window_days()))
    }

    pub fn contractor_filter(&self) -> ContractorFilter {
        ContractorFilter {
            search: text(&self.q),
            city: text(&self.city),
            state: text(&self.state),
            category: text(&self.category),
            min_rating: number(&self.min_rating),
            has_reviews: flag(&self.has_reviews),
        }
    }

    pub fn review_filter(&self) -> ReviewFilter {
        ReviewFilter {
            contractor_id: uuid(&self.contractor),
            min_rating: number(&self.min_rating),
            max_rating: number(&self.max_rating),
            has_text: flag(&self.has_text),
            search: text(&self.q),
        }
    }

    pub fn analysis_filter(&self) -> AnalysisFilter {
        AnalysisFilter {
            contractor_id: uuid(&self.contractor),
            sentiment: text(&self.sentiment),
        }
    }

    pub fn article_filter(&self) -> ArticleFilter {
        ArticleFilter {
            contractor_id: uuid(&self.contractor),
            status: self.status.as_deref().and_then(ArticleStatus::parse),
            search: text(&self.q),
        }
    }

    pub fn usage_filter(&self, now: DateTime<Utc>) -> UsageFilter {
        UsageFilter {
            operation: text(&self.operation),
            model: text(&self.model),
            success: flag(&self.success),
            since: Some(self.window_start(now)),
        }
    }

    pub fn search_filter(&self) -> SearchFilter {
        SearchFilter {
            city: text(&self.city),
            state: text(&self.state),
            search_term: text(&self.term),
        }
    }

    fn pairs(&self) -> Vec<(&'static str, &Option<String>)> {
        vec![
            ("q", &self.q),
            ("city", &self.city),
            ("state", &self.state),
            ("category", &self.category),
            ("min_rating", &self.min_rating),
            ("max_rating", &self.max_rating),
            ("has_reviews", &self.has_reviews),
            ("has_text", &self.has_text),
            ("contractor", &self.contractor),
            ("sentiment", &self.sentiment),
            ("status", &self.status),
            ("operation", &self.operation),
            ("model", &self.model),
            ("success", &self.success),
            ("days", &self.days),
            ("term", &self.term),
            ("sort", &self.sort),
            ("dir", &self.dir),
            ("page", &self.page),
            ("per_page", &self.per_page),
        ]
    }

    /// `base` plus the current non-blank params, with `overrides` replacing same-named keys.
    pub fn href(&self, base: &str, overrides: &[(&str, String)]) -> String {
        let mut parts = Vec::new();
        for (key, value) in self.pairs() {
            if overrides.iter().any(|(k, _)| *k == key) {
                continue;
            }
            if let Some(value) = text(value) {
                parts.push(format!("{key}={}", urlencoding::encode(&value)));
            }
        }
        for (key, value) in overrides {
            if !value.is_empty() {
                parts.push(format!("{key}={}", urlencoding::encode(value)));
            }
        }
        if parts.is_empty() {
            base.to_string()
        } else {
            format!("{base}?{}", parts.join("&"))
        }
    }

    /// Header links: clicking the active column flips direction, any other column starts descending.
    pub fn sort_links<S: SortKey>(&self, base: &str, columns: &[(S, &'static str)]) -> Vec<SortLink> {
        let current = self.list_query::<S>();
        columns
            .iter()
            .map(|&(key, label)| {
                let active = key.as_str() == current.sort.as_str();
                let direction = if active {
                    current.direction.flipped()
                } else {
                    SortDirection::Desc
                };
                SortLink {
                    label,
                    href: self.href(
                        base,
                        &[
                            ("sort", key.as_str().to_string()),
                            ("dir", direction.as_str().to_string()),
                            ("page", String::new()),
                        ],
                    ),
                    indicator: match (active, current.direction) {
                        (false, _) => "",
                        (true, SortDirection::Asc) => "▲",
                        (true, SortDirection::Desc) => "▼",
                    },
                }
            })
            .collect()
    }

    pub fn pager<T>(&self, base: &str, page: &Page<T>) -> Pager {
        let total_pages = page.total_pages();
        Pager {
            page: page.page,
            total_pages,
            total: page.total,
            has_prev: page.has_prev(),
            has_next: page.has_next(),
            prev_href: self.href(base, &[("page", page.page.saturating_sub(1).max(1).to_string())]),
            next_href: self.href(base, &[("page", page.page.saturating_add(1).to_string())]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SortLink {
    pub label: &'static str,
    pub href: String,
    pub indicator: &'static str,
}

#[derive(Debug, Clone)]
pub struct Pager {
    pub page: u32,
    pub total_pages: u32,
    pub total: u64,
    pub has_prev: bool,
    pub has_next: bool,
    pub prev_href: String,
    pub next_href: String,
}

/// `<select>` entry.
#[derive(Debug, Clone)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

pub fn options(values: &[String], current: &Option<String>) -> Vec<SelectOption> {
    let current = text(current);
    values
        .iter()
        .map(|v| SelectOption {
            value: v.clone(),
            label: v.clone(),
            selected: current
                .as_deref()
                .map(|c| c.eq_ignore_ascii_case(v))
                .unwrap_or(false),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crd_core::ContractorSort;

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        let encoded = pairs
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let uri: axum::http::Uri = format!("/x?{encoded}").parse().unwrap();
        axum::extract::Query::<ListParams>::try_from_uri(&uri).unwrap().0
    }

    #[test]
    fn blank_and_garbage_values_are_ignored() {
        let p = params(&[
            ("q", "  "),
            ("city", " Denver "),
            ("min_rating", "four"),
            ("has_reviews", "yes"),
            ("page", "-3"),
            ("per_page", "500"),
        ]);
        let filter = p.contractor_filter();
        assert_eq!(filter.search, None);
        assert_eq!(filter.city.as_deref(), Some("Denver"));
        assert_eq!(filter.min_rating, None);
        assert_eq!(filter.has_reviews, Some(true));
        assert_eq!(p.pagination(), Pagination::new(1, 100));
    }

    #[test]
    fn unknown_sort_falls_back_to_default() {
        let p = params(&[("sort", "password; drop table"), ("dir", "sideways")]);
        let query = p.list_query::<ContractorSort>();
        assert_eq!(query.sort, ContractorSort::ReviewCount);
        assert_eq!(query.direction, SortDirection::Desc);
    }

    #[test]
    fn hrefs_keep_filters_and_override_page() {
        let p = params(&[("city", "Fort Collins"), ("page", "2"), ("q", "")]);
        assert_eq!(
            p.href("/contractors", &[("page", "3".into())]),
            "/contractors?city=Fort%20Collins&page=3"
        );
        assert_eq!(p.href("/contractors", &[("city", String::new())]), "/contractors?page=2");
    }

    #[test]
    fn sort_links_flip_active_column() {
        let p = params(&[("sort", "rating"), ("dir", "desc"), ("page", "4")]);
        let links = p.sort_links(
            "/contractors",
            &[(ContractorSort::Rating, "Rating"), (ContractorSort::City, "City")],
        );
        assert_eq!(links[0].href, "/contractors?sort=rating&dir=asc");
        assert_eq!(links[0].indicator, "▼");
        assert_eq!(links[1].href, "/contractors?sort=city&dir=desc");
        assert_eq!(links[1].indicator, "");
    }

    #[test]
    fn usage_window_is_clamped() {
        let now = Utc::now();
        assert_eq!(params(&[("days", "0")]).window_days(), 1);
        assert_eq!(params(&[("days", "9999")]).window_days(), 365);
        assert_eq!(params(&[]).window_days(), DEFAULT_WINDOW_DAYS);
        let filter = params(&[("days", "7"), ("success", "false")]).usage_filter(now);
        assert_eq!(filter.since, Some(now - Duration::days(7)));
        assert_eq!(filter.success, Some(false));
    }

    #[test]
    fn invalid_contractor_id_is_dropped() {
        let p = params(&[("contractor", "not-a-uuid"), ("status", "Published")]);
        assert_eq!(p.review_filter().contractor_id, None);
        assert_eq!(p.article_filter().status, Some(ArticleStatus::Published));
    }

    #[test]
    fn pager_at_the_last_page_number_does_not_overflow() {
        let p = params(&[("page", "4294967295")]);
        let page = Page::<u8>::empty(p.pagination());
        let pager = p.pager("/contractors", &page);
        assert_eq!(pager.page, u32::MAX);
        assert!(pager.has_prev);
        assert!(!pager.has_next);
        assert_eq!(pager.next_href, "/contractors?page=4294967295");
    }
}
