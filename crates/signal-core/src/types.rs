use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::PipelineError;

/// Kind of object stored in the shared vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    NewsChunk,
    CompanyProfile,
    CompanyRisk,
    CompanyCatalyst,
    CompanyThesis,
    IndustryProfile,
    IndustryPlayer,
}

impl ObjectType {
    /// Research objects owned by a single company
    pub const COMPANY: [ObjectType; 4] = [
        ObjectType::CompanyProfile,
        ObjectType::CompanyRisk,
        ObjectType::CompanyCatalyst,
        ObjectType::CompanyThesis,
    ];

    /// Research objects owned by an industry
    pub const INDUSTRY: [ObjectType; 2] = [ObjectType::IndustryProfile, ObjectType::IndustryPlayer];

    /// Every research object type (everything except news chunks)
    pub const RESEARCH: [ObjectType; 6] = [
        ObjectType::CompanyProfile,
        ObjectType::CompanyRisk,
        ObjectType::CompanyCatalyst,
        ObjectType::CompanyThesis,
        ObjectType::IndustryProfile,
        ObjectType::IndustryPlayer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::NewsChunk => "news_chunk",
            ObjectType::CompanyProfile => "company_profile",
            ObjectType::CompanyRisk => "company_risk",
            ObjectType::CompanyCatalyst => "company_catalyst",
            ObjectType::CompanyThesis => "company_thesis",
            ObjectType::IndustryProfile => "industry_profile",
            ObjectType::IndustryPlayer => "industry_player",
        }
    }

    pub fn is_company_object(&self) -> bool {
        Self::COMPANY.contains(self)
    }

    pub fn is_industry_object(&self) -> bool {
        Self::INDUSTRY.contains(self)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "news_chunk" => Ok(ObjectType::NewsChunk),
            "company_profile" => Ok(ObjectType::CompanyProfile),
            "company_risk" => Ok(ObjectType::CompanyRisk),
            "company_catalyst" => Ok(ObjectType::CompanyCatalyst),
            "company_thesis" => Ok(ObjectType::CompanyThesis),
            "industry_profile" => Ok(ObjectType::IndustryProfile),
            "industry_player" => Ok(ObjectType::IndustryPlayer),
            other => Err(PipelineError::InvalidData(format!(
                "unknown object type: {other}"
            ))),
        }
    }
}

/// One embedded object in the vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkVector {
    pub object_type: ObjectType,
    pub object_id: i64,
    pub chunk_index: i32,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Nearest-neighbour result from the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub object_type: ObjectType,
    pub object_id: i64,
    pub chunk_id: i32,
    /// 1 - cosine distance, in [-1, 1]
    pub similarity: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A chunk of an already-ingested news item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsChunk {
    pub news_id: i64,
    pub chunk_index: i32,
    pub text: String,
    pub published_at: DateTime<Utc>,
}

/// Candidate mention supplied by NER or the token scanner, before resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionCandidate {
    pub surface_text: String,
    /// Character offsets (not bytes) into the chunk text
    pub start: usize,
    pub end: usize,
    pub normalized_key: String,
}

/// What an alias resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Company,
    Industry,
    IndustryPlayer,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Company => "company",
            TargetType::Industry => "industry",
            TargetType::IndustryPlayer => "industry_player",
        }
    }
}

impl FromStr for TargetType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "company" => Ok(TargetType::Company),
            "industry" => Ok(TargetType::Industry),
            "industry_player" => Ok(TargetType::IndustryPlayer),
            other => Err(PipelineError::InvalidData(format!(
                "unknown target type: {other}"
            ))),
        }
    }
}

/// A resolved entity mention inside one news chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Mention {
    pub news_id: i64,
    pub chunk_index: i32,
    pub surface_text: String,
    pub start_char: usize,
    pub end_char: usize,
    pub normalized_key: String,
    pub lexical_score: f64,
    pub semantic_score: f64,
    pub final_score: f64,
    pub target_type: TargetType,
    pub target_id: i64,
    pub method: String,
}

/// Which kind of entity a signal belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Company,
    Industry,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Company => "company",
            EntityKind::Industry => "industry",
        }
    }
}

/// One audit-trail entry of a rollup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Contribution {
    pub news_id: i64,
    pub chunk_id: i32,
    pub object_type: ObjectType,
    pub object_id: i64,
    pub similarity: f64,
    pub polarity: f64,
    pub decay: f64,
    pub contribution: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Vector-hit rollup result for one entity and one window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Signal {
    pub entity_kind: EntityKind,
    pub entity_id: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub score: f64,
    pub details: Vec<Contribution>,
    pub top_news_ids: Vec<i64>,
    pub updated_at: DateTime<Utc>,
}

/// Structured news-score rollup result for one entity.
///
/// Written to fields of the signal record that the vector-hit rollup never touches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewsWindowScore {
    pub entity_kind: EntityKind,
    pub entity_id: i64,
    pub window_score: f64,
    pub window_count: i64,
    pub last_aggregated_at: DateTime<Utc>,
}

/// Company master record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub id: i64,
    pub ticker: String,
    pub name: String,
    pub market_cap: Option<f64>,
    pub is_active: bool,
}

/// Industry master record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndustryRecord {
    pub id: i64,
    pub name: String,
}

/// A participant of an industry, optionally bound to a listed company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryPlayerRecord {
    pub id: i64,
    pub industry_id: i64,
    pub company_id: Option<i64>,
    pub name: String,
    pub market_cap_usd: Option<f64>,
}

/// Side of an investment thesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThesisSide {
    For,
    Against,
}

impl ThesisSide {
    pub fn from_label(s: &str) -> Self {
        if s.eq_ignore_ascii_case("for") {
            ThesisSide::For
        } else {
            ThesisSide::Against
        }
    }
}

/// Research object referenced by a vector hit, with the fields that decide
/// ownership and polarity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResearchObject {
    CompanyProfile { company_id: i64 },
    CompanyRisk { company_id: i64 },
    CompanyCatalyst { company_id: i64, positive: bool },
    CompanyThesis { company_id: i64, side: ThesisSide },
    IndustryProfile { industry_id: i64 },
    IndustryPlayer(IndustryPlayerRecord),
}

impl ResearchObject {
    pub fn object_type(&self) -> ObjectType {
        match self {
            ResearchObject::CompanyProfile { .. } => ObjectType::CompanyProfile,
            ResearchObject::CompanyRisk { .. } => ObjectType::CompanyRisk,
            ResearchObject::CompanyCatalyst { .. } => ObjectType::CompanyCatalyst,
            ResearchObject::CompanyThesis { .. } => ObjectType::CompanyThesis,
            ResearchObject::IndustryProfile { .. } => ObjectType::IndustryProfile,
            ResearchObject::IndustryPlayer(_) => ObjectType::IndustryPlayer,
        }
    }
}

/// OHLCV bar data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Daily price history of one symbol, oldest bar first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }
}

/// Percentile relative strength of one symbol. `None` means undefined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RelativeStrengthRow {
    pub p1m: Option<f64>,
    pub p3m: Option<f64>,
    pub p6m: Option<f64>,
    pub rs100: Option<f64>,
}

/// Daily ranked trade candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Recommendation {
    pub company_id: i64,
    pub symbol: String,
    pub as_of_date: NaiveDate,
    pub rs_score: f64,
    pub rs_p1m: Option<f64>,
    pub rs_p3m: Option<f64>,
    pub rs_p6m: Option<f64>,
    pub rs_method: String,
    pub stage2_pass: bool,
    pub stage2_reasons: BTreeMap<String, bool>,
    pub news_window_score: f64,
    pub news_weight_factor: f64,
    pub final_score: f64,
    pub rank: u32,
    pub details: serde_json::Value,
}

/// Per-target sentiment inside a structured news-score payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentTarget {
    pub target: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub confidence: f64,
}

/// Multipliers of a structured news-score payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBlock {
    #[serde(default)]
    pub impact_score: f64,
    #[serde(default)]
    pub credibility_score: f64,
    #[serde(default)]
    pub novelty_score: f64,
    #[serde(default = "default_decayed_weight")]
    pub decayed_weight: f64,
    #[serde(default = "default_half_life_hours")]
    pub decay_half_life_hours: f64,
}

fn default_decayed_weight() -> f64 {
    1.0
}

fn default_half_life_hours() -> f64 {
    72.0
}

impl Default for ScoreBlock {
    fn default() -> Self {
        Self {
            impact_score: 0.0,
            credibility_score: 0.0,
            novelty_score: 0.0,
            decayed_weight: default_decayed_weight(),
            decay_half_life_hours: default_half_life_hours(),
        }
    }
}

/// Structured score payload produced by the external news scorer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewsScorePayload {
    #[serde(default)]
    pub sentiment_overall: f64,
    #[serde(default)]
    pub targets: Vec<SentimentTarget>,
    #[serde(default)]
    pub scores: ScoreBlock,
}

/// A scored news item together with the entities it was linked to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredNewsItem {
    pub news_id: i64,
    pub published_at: DateTime<Utc>,
    pub payload: NewsScorePayload,
    pub linked_company_ids: Vec<i64>,
    pub linked_industry_ids: Vec<i64>,
}

/// End-of-run summary shared by every stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub processed: usize,
    pub skipped: usize,
    pub companies_updated: usize,
    pub industries_updated: usize,
    /// Skip tally by reason
    pub skip_reasons: BTreeMap<String, usize>,
}

impl RunStats {
    pub fn skip(&mut self, reason: &str) {
        self.skipped += 1;
        *self.skip_reasons.entry(reason.to_string()).or_insert(0) += 1;
    }
}
