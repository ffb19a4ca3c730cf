//! Aggregations behind the dashboard cards and charts.
//!
//! Everything here is a linear pass over rows the caller already fetched.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Duration, NaiveDate};
use crd_core::{Analysis, PipelineStage, Review, SearchedCity, Sentiment, TableCounts, UsageLog};
use serde::Serialize;

pub mod markdown;

pub use markdown::{render_preview, word_count};

pub const CRATE_NAME: &str = "crd-reports";

/// A bucket covers values below `upper` that no earlier bucket took; `None` is unbounded.
#[derive(Debug, Clone, Copy)]
pub struct BucketSpec {
    pub label: &'static str,
    pub upper: Option<f64>,
}

pub const DURATION_BUCKETS_MS: [BucketSpec; 6] = [
    BucketSpec { label: "<1s", upper: Some(1_000.0) },
    BucketSpec { label: "1-5s", upper: Some(5_000.0) },
    BucketSpec { label: "5-15s", upper: Some(15_000.0) },
    BucketSpec { label: "15-30s", upper: Some(30_000.0) },
    BucketSpec { label: "30-60s", upper: Some(60_000.0) },
    BucketSpec { label: "60s+", upper: None },
];

pub const COST_BUCKETS_USD: [BucketSpec; 6] = [
    BucketSpec { label: "<$0.001", upper: Some(0.001) },
    BucketSpec { label: "$0.001-0.01", upper: Some(0.01) },
    BucketSpec { label: "$0.01-0.05", upper: Some(0.05) },
    BucketSpec { label: "$0.05-0.10", upper: Some(0.10) },
    BucketSpec { label: "$0.10-0.50", upper: Some(0.50) },
    BucketSpec { label: "$0.50+", upper: None },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBucket {
    pub label: String,
    pub count: u64,
    /// Share of all values.
    pub percent_of_total: u8,
    /// Bar width relative to the tallest bucket.
    pub percent_of_max: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub buckets: Vec<HistogramBucket>,
    pub total: u64,
}

pub fn percent(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        0
    } else {
        ((part as f64 * 100.0 / whole as f64).round() as u64).min(100) as u8
    }
}

pub fn histogram(values: impl IntoIterator<Item = f64>, specs: &[BucketSpec]) -> Histogram {
    let mut counts = vec![0u64; specs.len()];
    let mut total = 0u64;
    for value in values {
        if let Some(idx) = specs
            .iter()
            .position(|s| s.upper.map(|upper| value < upper).unwrap_or(true))
        {
            counts[idx] += 1;
            total += 1;
        }
    }
    let max = counts.iter().copied().max().unwrap_or(0);
    Histogram {
        buckets: specs
            .iter()
            .zip(counts)
            .map(|(spec, count)| HistogramBucket {
                label: spec.label.to_string(),
                count,
                percent_of_total: percent(count, total),
                percent_of_max: percent(count, max),
            })
            .collect(),
        total,
    }
}

pub fn duration_histogram(logs: &[UsageLog]) -> Histogram {
    histogram(logs.iter().map(|l| l.duration_ms as f64), &DURATION_BUCKETS_MS)
}

pub fn cost_histogram(logs: &[UsageLog]) -> Histogram {
    histogram(logs.iter().map(|l| l.cost_usd), &COST_BUCKETS_USD)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub label: String,
    pub calls: u64,
    pub cost_usd: f64,
    pub tokens: i64,
    pub percent_of_max_calls: u8,
}

/// One point per UTC day for the `days` days ending at `today`, zero-filled.
pub fn daily_trend(logs: &[UsageLog], days: u32, today: NaiveDate) -> Vec<DailyPoint> {
    let days = days.max(1);
    let start = today - Duration::days(i64::from(days) - 1);
    let mut by_day: BTreeMap<NaiveDate, (u64, f64, i64)> = BTreeMap::new();
    for offset in 0..days {
        by_day.insert(start + Duration::days(i64::from(offset)), (0, 0.0, 0));
    }
    for log in logs {
        if let Some(entry) = by_day.get_mut(&log.created_at.date_naive()) {
            entry.0 += 1;
            entry.1 += log.cost_usd;
            entry.2 += log.total_tokens();
        }
    }
    let max_calls = by_day.values().map(|v| v.0).max().unwrap_or(0);
    by_day
        .into_iter()
        .map(|(date, (calls, cost_usd, tokens))| DailyPoint {
            date,
            label: date.format("%b %d").to_string(),
            calls,
            cost_usd,
            tokens,
            percent_of_max_calls: percent(calls, max_calls),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupUsage {
    pub name: String,
    pub calls: u64,
    pub cost_usd: f64,
    pub tokens: i64,
    pub avg_duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct UsageSummary {
    pub total_calls: u64,
    pub successful: u64,
    pub failed: u64,
    pub total_cost_usd: f64,
    pub avg_cost_usd: f64,
    pub avg_duration_ms: f64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub by_model: Vec<GroupUsage>,
    pub by_operation: Vec<GroupUsage>,
}

impl UsageSummary {
    pub fn from_logs(logs: &[UsageLog]) -> Self {
        let total_calls = logs.len() as u64;
        let successful = logs.iter().filter(|l| l.success).count() as u64;
        let total_cost_usd = logs.iter().map(|l| l.cost_usd).sum::<f64>();
        let total_duration = logs.iter().map(|l| l.duration_ms as f64).sum::<f64>();
        Self {
            total_calls,
            successful,
            failed: total_calls - successful,
            total_cost_usd,
            avg_cost_usd: average(total_cost_usd, total_calls),
            avg_duration_ms: average(total_duration, total_calls),
            total_input_tokens: logs.iter().map(|l| l.input_tokens).sum(),
            total_output_tokens: logs.iter().map(|l| l.output_tokens).sum(),
            by_model: group_usage(logs, |l| l.model.as_str()),
            by_operation: group_usage(logs, |l| l.operation.as_str()),
        }
    }

    pub fn success_rate(&self) -> u8 {
        percent(self.successful, self.total_calls)
    }

    pub fn total_tokens(&self) -> i64 {
        self.total_input_tokens + self.total_output_tokens
    }
}

fn average(sum: f64, n: u64) -> f64 {
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Groups sorted by cost descending, then name.
fn group_usage<'a>(logs: &'a [UsageLog], key: impl Fn(&'a UsageLog) -> &'a str) -> Vec<GroupUsage> {
    let mut groups: HashMap<&str, (u64, f64, i64, f64)> = HashMap::new();
    for log in logs {
        let entry = groups.entry(key(log)).or_default();
        entry.0 += 1;
        entry.1 += log.cost_usd;
        entry.2 += log.total_tokens();
        entry.3 += log.duration_ms as f64;
    }
    let mut out = groups
        .into_iter()
        .map(|(name, (calls, cost_usd, tokens, duration))| GroupUsage {
            name: name.to_string(),
            calls,
            cost_usd,
            tokens,
            avg_duration_ms: average(duration, calls),
        })
        .collect::<Vec<_>>();
    out.sort_by(|a, b| {
        b.cost_usd
            .partial_cmp(&a.cost_usd)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingBar {
    pub stars: u8,
    pub count: u64,
    pub percent_of_total: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingDistribution {
    /// Five stars first.
    pub bars: Vec<RatingBar>,
    pub total: u64,
    pub average: Option<f64>,
}

/// Ratings outside 1..=5 are ignored.
pub fn rating_distribution(reviews: &[Review]) -> RatingDistribution {
    let mut counts = BTreeMap::new();
    for review in reviews {
        *counts.entry(review.rating).or_insert(0u64) += 1;
    }
    rating_distribution_from_counts(&counts)
}

/// Same as [`rating_distribution`] from per-star counts; ratings outside 1..=5 are ignored.
pub fn rating_distribution_from_counts(counts: &BTreeMap<i32, u64>) -> RatingDistribution {
    let count_for = |stars: u8| counts.get(&i32::from(stars)).copied().unwrap_or(0);
    let total = (1..=5u8).map(count_for).sum::<u64>();
    let sum = (1..=5u8)
        .map(|stars| u64::from(stars) * count_for(stars))
        .sum::<u64>();
    RatingDistribution {
        bars: (1..=5u8)
            .rev()
            .map(|stars| {
                let count = count_for(stars);
                RatingBar {
                    stars,
                    count,
                    percent_of_total: percent(count, total),
                }
            })
            .collect(),
        total,
        average: (total > 0).then(|| sum as f64 / total as f64),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentCount {
    pub sentiment: &'static str,
    pub count: u64,
    pub percent_of_total: u8,
}

/// Non-zero sentiment counts in a fixed positive-to-unknown order.
pub fn sentiment_breakdown(analyses: &[Analysis]) -> Vec<SentimentCount> {
    let mut counts: HashMap<Sentiment, u64> = HashMap::new();
    for analysis in analyses {
        *counts.entry(analysis.summary().sentiment_label()).or_default() += 1;
    }
    let total = analyses.len() as u64;
    Sentiment::ALL
        .iter()
        .filter_map(|s| {
            counts.get(s).map(|&count| SentimentCount {
                sentiment: s.as_str(),
                count,
                percent_of_total: percent(count, total),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateSearch {
    pub key: String,
    pub city: String,
    pub state: String,
    pub search_term: String,
    pub count: u64,
    pub last_searched_at: chrono::DateTime<chrono::Utc>,
}

/// Search keys that occur more than once, most repeated first.
pub fn duplicate_search_keys(rows: &[SearchedCity]) -> Vec<DuplicateSearch> {
    let mut seen: HashMap<String, (u64, &SearchedCity)> = HashMap::new();
    for row in rows {
        let entry = seen.entry(row.search_key()).or_insert((0, row));
        entry.0 += 1;
        if row.searched_at > entry.1.searched_at {
            entry.1 = row;
        }
    }
    let mut out = seen
        .into_iter()
        .filter(|(_, (count, _))| *count > 1)
        .map(|(key, (count, latest))| DuplicateSearch {
            key,
            city: latest.city.trim().to_string(),
            state: latest.state.trim().to_string(),
            search_term: latest.search_term.trim().to_string(),
            count,
            last_searched_at: latest.searched_at,
        })
        .collect::<Vec<_>>();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    out
}

/// Trimmed, non-empty, de-duplicated, sorted.
pub fn distinct_sorted<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|v| v.as_ref().trim().to_string())
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageStatus {
    #[serde(skip)]
    pub stage: PipelineStage,
    pub label: &'static str,
    pub description: &'static str,
    pub count: u64,
    pub unit: &'static str,
    pub detail: String,
    pub progress_pct: u8,
}

/// Read-only pipeline cards derived from table counts.
pub fn pipeline_status(counts: &TableCounts) -> Vec<StageStatus> {
    PipelineStage::ALL
        .iter()
        .map(|&stage| {
            let (count, unit, detail, progress_pct) = match stage {
                PipelineStage::Discover => (
                    counts.contractors,
                    "contractors",
                    format!("{} city searches", counts.searched_cities),
                    if counts.contractors > 0 { 100 } else { 0 },
                ),
                PipelineStage::Collect => (
                    counts.reviews,
                    "reviews",
                    format!(
                        "{} of {} contractors have reviews",
                        counts.contractors_with_reviews, counts.contractors
                    ),
                    percent(counts.contractors_with_reviews, counts.contractors),
                ),
                PipelineStage::Analyze => (
                    counts.analyses,
                    "analyses",
                    format!(
                        "{} of {} reviewed contractors analyzed",
                        counts.analyses.min(counts.contractors_with_reviews),
                        counts.contractors_with_reviews
                    ),
                    percent(counts.analyses, counts.contractors_with_reviews),
                ),
                PipelineStage::Generate => (
                    counts.articles,
                    "articles",
                    format!("{} published", counts.published_articles),
                    percent(counts.articles, counts.analyses),
                ),
            };
            StageStatus {
                stage,
                label: stage.label(),
                description: stage.description(),
                count,
                unit,
                detail,
                progress_pct,
            }
        })
        .collect()
}

pub fn format_usd(value: f64) -> String {
    if value.abs() < 1.0 {
        format!("${value:.4}")
    } else {
        format!("${value:.2}")
    }
}

pub fn format_duration_ms(ms: f64) -> String {
    if ms < 1_000.0 {
        format!("{ms:.0}ms")
    } else if ms < 60_000.0 {
        format!("{:.1}s", ms / 1_000.0)
    } else {
        let secs = (ms / 1_000.0).round() as u64;
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

/// Plain markdown usage report for the CLI.
pub fn usage_report_markdown(summary: &UsageSummary, trend: &[DailyPoint]) -> String {
    let mut lines = vec!["# AI Usage Report".to_string(), String::new()];
    lines.push(format!("- calls: {}", summary.total_calls));
    lines.push(format!(
        "- success rate: {}% ({} failed)",
        summary.success_rate(),
        summary.failed
    ));
    lines.push(format!("- total cost: {}", format_usd(summary.total_cost_usd)));
    lines.push(format!("- average cost: {}", format_usd(summary.avg_cost_usd)));
    lines.push(format!(
        "- average duration: {}",
        format_duration_ms(summary.avg_duration_ms)
    ));
    lines.push(format!(
        "- tokens: {} in / {} out",
        summary.total_input_tokens, summary.total_output_tokens
    ));
    lines.push(String::new());

    if !summary.by_model.is_empty() {
        lines.push("## By Model".to_string());
        for group in &summary.by_model {
            lines.push(format!(
                "- {}: {} calls, {}",
                group.name,
                group.calls,
                format_usd(group.cost_usd)
            ));
        }
        lines.push(String::new());
    }

    if !trend.is_empty() {
        lines.push("## Daily".to_string());
        for point in trend {
            lines.push(format!(
                "- {}: {} calls, {}",
                point.date,
                point.calls,
                format_usd(point.cost_usd)
            ));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).single().unwrap()
    }

    fn log(model: &str, cost: f64, duration_ms: i64, created_at: DateTime<Utc>, success: bool) -> UsageLog {
        UsageLog {
            id: Uuid::new_v4(),
            operation: "analyze".into(),
            model: model.into(),
            input_tokens: 100,
            output_tokens: 50,
            cost_usd: cost,
            duration_ms,
            contractor_id: None,
            success,
            error_message: None,
            created_at,
        }
    }

    fn search(city: &str, state: &str, term: &str, day: u32) -> SearchedCity {
        SearchedCity {
            id: Uuid::new_v4(),
            city: city.into(),
            state: state.into(),
            search_term: term.into(),
            results_count: 5,
            searched_at: at(day, 8),
        }
    }

    #[test]
    fn histogram_bounds_are_lower_inclusive() {
        let logs = vec![
            log("m", 0.0005, 999, at(1, 1), true),
            log("m", 0.001, 1_000, at(1, 1), true),
            log("m", 0.01, 59_999, at(1, 1), true),
            log("m", 0.75, 60_000, at(1, 1), true),
        ];
        let durations = duration_histogram(&logs);
        let counts = durations.buckets.iter().map(|b| b.count).collect::<Vec<_>>();
        assert_eq!(counts, vec![1, 1, 0, 0, 1, 1]);
        assert_eq!(durations.total, 4);
        assert_eq!(durations.buckets[0].percent_of_total, 25);
        assert_eq!(durations.buckets[0].percent_of_max, 100);

        let costs = cost_histogram(&logs);
        let counts = costs.buckets.iter().map(|b| b.count).collect::<Vec<_>>();
        assert_eq!(counts, vec![1, 1, 1, 0, 0, 1]);
    }

    #[test]
    fn empty_histogram_has_zero_widths() {
        let h = duration_histogram(&[]);
        assert_eq!(h.total, 0);
        assert!(h.buckets.iter().all(|b| b.count == 0 && b.percent_of_max == 0));
    }

    #[test]
    fn daily_trend_is_zero_filled() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        let logs = vec![
            log("m", 0.02, 100, at(7, 10), true),
            log("m", 0.03, 100, at(7, 23), true),
            log("m", 0.01, 100, at(5, 1), true),
            log("m", 9.99, 100, at(1, 1), true),
        ];
        let trend = daily_trend(&logs, 3, today);
        assert_eq!(trend.len(), 3);
        assert_eq!(trend[0].date, NaiveDate::from_ymd_opt(2026, 3, 5).unwrap());
        assert_eq!(trend.iter().map(|p| p.calls).collect::<Vec<_>>(), vec![1, 0, 2]);
        assert!((trend[2].cost_usd - 0.05).abs() < 1e-9);
        assert_eq!(trend[2].tokens, 300);
        assert_eq!(trend[2].percent_of_max_calls, 100);
        assert_eq!(trend[0].percent_of_max_calls, 50);
        assert_eq!(trend[1].label, "Mar 06");
    }

    #[test]
    fn usage_summary_groups_by_model() {
        let logs = vec![
            log("claude-haiku", 0.01, 1_000, at(1, 1), true),
            log("claude-sonnet", 0.20, 3_000, at(1, 2), true),
            log("claude-haiku", 0.02, 2_000, at(1, 3), false),
        ];
        let summary = UsageSummary::from_logs(&logs);
        assert_eq!(summary.total_calls, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.success_rate(), 67);
        assert!((summary.avg_duration_ms - 2_000.0).abs() < 1e-9);
        assert_eq!(summary.by_model[0].name, "claude-sonnet");
        assert_eq!(summary.by_model[1].calls, 2);
        assert!((summary.by_model[1].avg_duration_ms - 1_500.0).abs() < 1e-9);
        assert_eq!(summary.total_tokens(), 450);

        let empty = UsageSummary::from_logs(&[]);
        assert_eq!(empty.avg_cost_usd, 0.0);
        assert_eq!(empty.success_rate(), 0);
    }

    #[test]
    fn duplicates_report_only_repeated_keys() {
        let rows = vec![
            search("Denver", "CO", "chimney sweep", 1),
            search(" denver", "co", "Chimney Sweep ", 4),
            search("Denver", "CO", "chimney sweep", 2),
            search("Boulder", "CO", "chimney sweep", 1),
            search("Austin", "TX", "fireplace repair", 1),
            search("austin", "TX", "fireplace repair", 3),
        ];
        let dups = duplicate_search_keys(&rows);
        assert_eq!(dups.len(), 2);
        assert_eq!(dups[0].key, "denver|co|chimney sweep");
        assert_eq!(dups[0].count, 3);
        assert_eq!(dups[0].last_searched_at, at(4, 8));
        assert_eq!(dups[0].city, "denver");
        assert_eq!(dups[1].key, "austin|tx|fireplace repair");
        assert_eq!(dups[1].count, 2);
    }

    #[test]
    fn distinct_values_are_clean() {
        assert_eq!(
            distinct_sorted(vec![" CO", "TX", "", "CO ", "AZ"]),
            vec!["AZ", "CO", "TX"]
        );
    }

    #[test]
    fn rating_distribution_ignores_out_of_range() {
        let mk = |rating| Review {
            id: Uuid::new_v4(),
            contractor_id: Uuid::nil(),
            reviewer_name: None,
            rating,
            review_text: None,
            review_date: None,
            created_at: at(1, 1),
        };
        let dist = rating_distribution(&[mk(5), mk(5), mk(4), mk(1), mk(0), mk(9)]);
        assert_eq!(dist.total, 4);
        assert_eq!(dist.bars[0].stars, 5);
        assert_eq!(dist.bars[0].count, 2);
        assert_eq!(dist.bars[0].percent_of_total, 50);
        assert_eq!(dist.average, Some(3.75));
        assert_eq!(rating_distribution(&[]).average, None);
    }

    #[test]
    fn rating_distribution_from_grouped_counts() {
        let counts = BTreeMap::from([(5, 300), (4, 100), (1, 100), (0, 7)]);
        let dist = rating_distribution_from_counts(&counts);
        assert_eq!(dist.total, 500);
        assert_eq!(dist.bars[0].count, 300);
        assert_eq!(dist.bars[0].percent_of_total, 60);
        assert_eq!(dist.bars[3].stars, 2);
        assert_eq!(dist.bars[3].count, 0);
        assert_eq!(dist.average, Some(4.0));
    }

    #[test]
    fn sentiment_breakdown_counts_labels() {
        let mk = |json: serde_json::Value| Analysis {
            id: Uuid::new_v4(),
            contractor_id: Uuid::nil(),
            analysis_json: json,
            model_used: None,
            reviews_analyzed: 1,
            analyzed_at: at(1, 1),
        };
        let rows = vec![
            mk(serde_json::json!({"sentiment": "positive"})),
            mk(serde_json::json!({"overall_sentiment": "Positive"})),
            mk(serde_json::json!({})),
        ];
        let breakdown = sentiment_breakdown(&rows);
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].sentiment, "positive");
        assert_eq!(breakdown[0].count, 2);
        assert_eq!(breakdown[1].sentiment, "unknown");
    }

    #[test]
    fn pipeline_status_reads_counts() {
        let counts = TableCounts {
            searched_cities: 4,
            contractors: 10,
            contractors_with_reviews: 8,
            reviews: 120,
            analyses: 6,
            articles: 3,
            published_articles: 1,
            usage_logs: 30,
        };
        let stages = pipeline_status(&counts);
        assert_eq!(stages.len(), 4);
        assert_eq!(stages[0].label, "Discover");
        assert_eq!(stages[0].detail, "4 city searches");
        assert_eq!(stages[1].progress_pct, 80);
        assert_eq!(stages[2].progress_pct, 75);
        assert_eq!(stages[3].count, 3);
        assert_eq!(stages[3].progress_pct, 50);

        let empty = pipeline_status(&TableCounts::default());
        assert!(empty.iter().all(|s| s.progress_pct == 0));
    }

    #[test]
    fn formats_money_and_durations() {
        assert_eq!(format_usd(0.01234), "$0.0123");
        assert_eq!(format_usd(12.5), "$12.50");
        assert_eq!(format_duration_ms(850.0), "850ms");
        assert_eq!(format_duration_ms(1_340.0), "1.3s");
        assert_eq!(format_duration_ms(125_000.0), "2m 05s");
    }

    #[test]
    fn usage_report_lists_models_and_days() {
        let logs = vec![log("claude-haiku", 0.01, 1_000, at(7, 1), true)];
        let summary = UsageSummary::from_logs(&logs);
        let trend = daily_trend(&logs, 2, NaiveDate::from_ymd_opt(2026, 3, 7).unwrap());
        let report = usage_report_markdown(&summary, &trend);
        assert!(report.starts_with("# AI Usage Report"));
        assert!(report.contains("- claude-haiku: 1 calls, $0.0100"));
        assert!(report.contains("- 2026-03-06: 0 calls, $0.0000"));
    }
}
