//! Heuristic, feedback-aware ranking of catalog records.
//!
//! Scores are strictly additive so every contribution can be reported as a
//! reason string next to the final score.

use crate::catalog::ToolCatalog;
use crate::error::{AppError, Result};
use crate::ingestion::types::ToolRecord;
use crate::persistence::FeedbackSummary;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\w-]+").expect("token pattern is a valid regex"));

/// Scoring constants. Defaults reproduce the reference heuristic; the
/// feedback values are meant to be tuned from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingWeights {
    pub tool_id_match: f64,
    pub text_match: f64,
    pub tag_match: f64,
    pub language_match: f64,
    pub language_miss: f64,
    pub usage_guidance: f64,
    pub tag_density: f64,
    /// Maximum success/error count that still moves the score
    pub feedback_cap: u64,
    pub feedback_success: f64,
    pub feedback_error: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            tool_id_match: 3.0,
            text_match: 2.0,
            tag_match: 1.0,
            language_match: 1.5,
            language_miss: 1.0,
            usage_guidance: 0.25,
            tag_density: 0.2,
            feedback_cap: 3,
            feedback_success: 0.5,
            feedback_error: 0.75,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RankOptions {
    /// Maximum results; 0 returns the whole ranked list
    pub top_n: usize,
    pub preferred_language: Option<String>,
    pub sources: Option<Vec<String>>,
    pub tool_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedTool {
    pub record: ToolRecord,
    pub score: f64,
    pub reasons: Vec<String>,
}

impl RankedTool {
    /// Response shape for API callers; the raw descriptor is opt-in.
    pub fn to_json(&self, include_descriptor: bool) -> Value {
        let mut payload = json!({
            "tool_id": self.record.tool_id,
            "score": (self.score * 10_000.0).round() / 10_000.0,
            "description": self.record.description,
            "when_to_use": self.record.when_to_use,
            "languages": self.record.languages,
            "tags": self.record.tags,
            "source": self.record.source,
            "reasons": self.reasons,
        });
        if include_descriptor {
            payload["descriptor"] = self.record.raw_descriptor.clone();
        }
        payload
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolRanker {
    weights: RankingWeights,
}

impl ToolRanker {
    pub fn new(weights: RankingWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &RankingWeights {
        &self.weights
    }

    /// Rank the catalog's tools against `query`.
    ///
    /// Feedback is folded in only when the catalog has storage attached.
    pub fn rank(
        &self,
        catalog: &mut ToolCatalog,
        query: &str,
        options: &RankOptions,
    ) -> Result<Vec<RankedTool>> {
        validate_query(query)?;

        let records = catalog.list_tools(options.sources.as_deref(), options.tool_ids.as_deref())?;
        let feedback = match catalog.storage() {
            Some(_) => Some(catalog.feedback_summary()?),
            None => None,
        };

        self.rank_records(
            records,
            feedback.as_ref(),
            query,
            options.top_n,
            options.preferred_language.as_deref(),
        )
    }

    /// Score already-fetched records. Pure computation; takes no locks.
    pub fn rank_records(
        &self,
        records: Vec<ToolRecord>,
        feedback: Option<&FeedbackSummary>,
        query: &str,
        top_n: usize,
        preferred_language: Option<&str>,
    ) -> Result<Vec<RankedTool>> {
        validate_query(query)?;
        let tokens = tokenize(query);

        let mut ranked: Vec<RankedTool> = records
            .into_iter()
            .filter_map(|record| {
                let (mut score, mut reasons) = self.score_record(&record, &tokens, preferred_language);
                if let Some(stats) = feedback.and_then(|f| f.get(&record.feedback_key())) {
                    let cap = self.weights.feedback_cap;
                    if stats.success > 0 {
                        score += stats.success.min(cap) as f64 * self.weights.feedback_success;
                        reasons.push(format!("historical successes: {}", stats.success));
                    }
                    if stats.error > 0 {
                        score -= stats.error.min(cap) as f64 * self.weights.feedback_error;
                        reasons.push(format!("historical errors: {}", stats.error));
                    }
                }
                (score > 0.0).then_some(RankedTool {
                    record,
                    score,
                    reasons,
                })
            })
            .collect();

        // Stable: equal scores keep catalog order.
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if top_n > 0 {
            ranked.truncate(top_n);
        }

        tracing::debug!(query, tokens = tokens.len(), results = ranked.len(), "Ranking complete");
        Ok(ranked)
    }

    fn score_record(
        &self,
        record: &ToolRecord,
        tokens: &[String],
        preferred_language: Option<&str>,
    ) -> (f64, Vec<String>) {
        let w = &self.weights;
        let mut score = 0.0;
        let mut reasons = Vec::new();

        let tool_id = record.tool_id.to_lowercase();
        let text = format!(
            "{} {}",
            record.description,
            record.when_to_use.as_deref().unwrap_or("")
        )
        .to_lowercase();
        let tags: Vec<String> = record.tags.iter().map(|t| t.to_lowercase()).collect();

        for token in tokens {
            if tool_id.contains(token.as_str()) {
                score += w.tool_id_match;
                reasons.push(format!("token '{}' matched tool_id", token));
            }
            if text.contains(token.as_str()) {
                score += w.text_match;
                reasons.push(format!("token '{}' matched description", token));
            }
            if tags.iter().any(|tag| tag.contains(token.as_str())) {
                score += w.tag_match;
                reasons.push(format!("token '{}' matched tag", token));
            }
        }

        if let Some(language) = preferred_language.map(str::trim).filter(|l| !l.is_empty()) {
            let language = language.to_lowercase();
            if record
                .languages
                .iter()
                .any(|l| l.to_lowercase().starts_with(&language))
            {
                score += w.language_match;
                reasons.push(format!("preferred language '{}' available", language));
            } else {
                score -= w.language_miss;
                reasons.push(format!("language '{}' not available", language));
            }
        }

        if record.when_to_use.as_deref().is_some_and(|s| !s.is_empty()) {
            score += w.usage_guidance;
            reasons.push("has usage guidance".to_string());
        }

        if !record.tags.is_empty() {
            let bonus = (record.tags.len() as f64).ln_1p() * w.tag_density;
            score += bonus;
            reasons.push(format!("tag density bonus {:.3}", bonus));
        }

        (score, reasons)
    }
}

/// Reject blank queries before any catalog work.
pub fn validate_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(AppError::InvalidArgument(
            "query cannot be empty when ranking tools".to_string(),
        ));
    }
    Ok(())
}

/// Lower-cased `[\w-]+` tokens of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}
