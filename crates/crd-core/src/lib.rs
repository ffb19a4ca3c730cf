//! Row types for the contractor-review database and the query vocabulary shared by every crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod query;

pub use query::{
    AnalysisFilter, AnalysisSort, ArticleFilter, ArticleSort, ContractorFilter, ContractorSort,
    DistinctField, ListQuery, Page, Pagination, ReviewFilter, ReviewSort, SearchFilter, SearchSort,
    SortDirection, SortKey, UsageFilter, UsageSort,
};

pub const CRATE_NAME: &str = "crd-core";

/// A business discovered by the agent; everything else hangs off `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contractor {
    pub id: Uuid,
    pub business_name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub google_place_id: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: i32,
    #[serde(default)]
    pub search_terms: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contractor {
    /// "City, ST" with whichever parts are present.
    pub fn location(&self) -> String {
        match (self.city.as_deref(), self.state.as_deref()) {
            (Some(city), Some(state)) => format!("{city}, {state}"),
            (Some(city), None) => city.to_string(),
            (None, Some(state)) => state.to_string(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub contractor_id: Uuid,
    #[serde(default)]
    pub reviewer_name: Option<String>,
    pub rating: i32,
    #[serde(default)]
    pub review_text: Option<String>,
    #[serde(default)]
    pub review_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn has_text(&self) -> bool {
        self.review_text
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Agent-produced analysis; `analysis_json` is stored verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: Uuid,
    pub contractor_id: Uuid,
    pub analysis_json: serde_json::Value,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub reviews_analyzed: i32,
    pub analyzed_at: DateTime<Utc>,
}

impl Analysis {
    /// Typed view over the JSON payload. Malformed payloads yield an empty summary.
    pub fn summary(&self) -> AnalysisSummary {
        serde_json::from_value(self.analysis_json.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisSummary {
    #[serde(alias = "overall_sentiment")]
    pub sentiment: Option<String>,
    pub sentiment_score: Option<f64>,
    #[serde(alias = "services")]
    pub detected_services: Vec<String>,
    pub themes: Vec<String>,
    pub strengths: Vec<String>,
    pub concerns: Vec<String>,
    pub summary: Option<String>,
}

impl AnalysisSummary {
    pub fn sentiment_label(&self) -> Sentiment {
        self.sentiment
            .as_deref()
            .map(Sentiment::parse)
            .unwrap_or(Sentiment::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sentiment {
    Positive,
    Mixed,
    Neutral,
    Negative,
    Unknown,
}

impl Sentiment {
    pub const ALL: [Sentiment; 5] = [
        Sentiment::Positive,
        Sentiment::Mixed,
        Sentiment::Neutral,
        Sentiment::Negative,
        Sentiment::Unknown,
    ];

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "positive" => Self::Positive,
            "mixed" => Self::Mixed,
            "neutral" => Self::Neutral,
            "negative" => Self::Negative,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Mixed => "mixed",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl ArticleStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    /// Publish toggle: published articles go back to draft, anything else gets published.
    pub fn toggled(self) -> Self {
        match self {
            Self::Published => Self::Draft,
            Self::Draft | Self::Archived => Self::Published,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub contractor_id: Uuid,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub content_markdown: String,
    #[serde(default)]
    pub status: ArticleStatus,
    #[serde(default)]
    pub word_count: Option<i32>,
    #[serde(default)]
    pub model_used: Option<String>,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageLog {
    pub id: Uuid,
    pub operation: String,
    pub model: String,
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub contractor_id: Option<Uuid>,
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl UsageLog {
    pub fn total_tokens(&self) -> i64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchedCity {
    pub id: Uuid,
    pub city: String,
    pub state: String,
    pub search_term: String,
    #[serde(default)]
    pub results_count: i32,
    pub searched_at: DateTime<Utc>,
}

impl SearchedCity {
    /// Normalised `(city, state, search_term)` triple used to spot repeated searches.
    pub fn search_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.city.trim().to_lowercase(),
            self.state.trim().to_lowercase(),
            self.search_term.trim().to_lowercase()
        )
    }
}

/// Row counts behind the pipeline status cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableCounts {
    pub searched_cities: u64,
    pub contractors: u64,
    pub contractors_with_reviews: u64,
    pub reviews: u64,
    pub analyses: u64,
    pub articles: u64,
    pub published_articles: u64,
    pub usage_logs: u64,
}

/// Stages of the external agent. Display only; nothing here advances a contractor between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Discover,
    Collect,
    Analyze,
    Generate,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 4] = [
        PipelineStage::Discover,
        PipelineStage::Collect,
        PipelineStage::Analyze,
        PipelineStage::Generate,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Discover => "Discover",
            Self::Collect => "Collect",
            Self::Analyze => "Analyze",
            Self::Generate => "Generate",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Discover => "City searches that surface contractors",
            Self::Collect => "Reviews pulled for discovered contractors",
            Self::Analyze => "AI analyses of collected reviews",
            Self::Generate => "AI articles written from analyses",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap()
    }

    #[test]
    fn search_key_normalises_case_and_whitespace() {
        let a = SearchedCity {
            id: Uuid::new_v4(),
            city: " Denver ".into(),
            state: "CO".into(),
            search_term: "Chimney Sweep".into(),
            results_count: 10,
            searched_at: ts(),
        };
        let mut b = a.clone();
        b.city = "denver".into();
        b.state = "co ".into();
        b.search_term = "chimney sweep".into();
        assert_eq!(a.search_key(), "denver|co|chimney sweep");
        assert_eq!(a.search_key(), b.search_key());
    }

    #[test]
    fn article_status_toggle() {
        assert_eq!(ArticleStatus::Draft.toggled(), ArticleStatus::Published);
        assert_eq!(ArticleStatus::Published.toggled(), ArticleStatus::Draft);
        assert_eq!(ArticleStatus::Archived.toggled(), ArticleStatus::Published);
        assert_eq!(ArticleStatus::parse(" Published "), Some(ArticleStatus::Published));
        assert_eq!(ArticleStatus::parse("live"), None);
    }

    #[test]
    fn analysis_summary_tolerates_aliases_and_garbage() {
        let analysis = Analysis {
            id: Uuid::new_v4(),
            contractor_id: Uuid::new_v4(),
            analysis_json: serde_json::json!({
                "overall_sentiment": "Positive",
                "sentiment_score": 0.82,
                "services": ["chimney sweep"],
                "unexpected": true
            }),
            model_used: None,
            reviews_analyzed: 12,
            analyzed_at: ts(),
        };
        let summary = analysis.summary();
        assert_eq!(summary.sentiment_label(), Sentiment::Positive);
        assert_eq!(summary.detected_services, vec!["chimney sweep".to_string()]);

        let broken = Analysis {
            analysis_json: serde_json::json!("not an object"),
            ..analysis
        };
        assert_eq!(broken.summary(), AnalysisSummary::default());
    }

    #[test]
    fn contractor_location_joins_present_parts() {
        let contractor = Contractor {
            id: Uuid::new_v4(),
            business_name: "Acme Chimney".into(),
            category: None,
            city: Some("Boulder".into()),
            state: None,
            address: None,
            phone: None,
            website: None,
            google_place_id: None,
            rating: None,
            review_count: 0,
            search_terms: vec![],
            created_at: ts(),
            updated_at: ts(),
        };
        assert_eq!(contractor.location(), "Boulder");
    }
}
