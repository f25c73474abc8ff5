//! Content records that flow through workflow state.
//!
//! These are the payload shapes the engine merges and persists: collected
//! articles, extracted facts, script drafts, and the structured decision
//! records produced at approval gates. The engine never inspects article or
//! fact *content*; it only needs stable keys for deduplicating merges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::NodeId;

/// A collected source article with provenance.
///
/// Articles are merged append-unique keyed by [`source_url`](Self::source_url):
/// two concurrent collectors reporting the same URL yield one entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    /// Dedup key; every claim downstream traces back here.
    pub source_url: String,
    pub source_name: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default = "default_relevance")]
    pub relevance: f32,
    pub fetched_at: DateTime<Utc>,
}

fn default_relevance() -> f32 {
    0.5
}

impl Article {
    pub fn new(
        source_url: impl Into<String>,
        source_name: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_url: source_url.into(),
            source_name: source_name.into(),
            title: title.into(),
            summary: None,
            category: None,
            relevance: default_relevance(),
            fetched_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_relevance(mut self, relevance: f32) -> Self {
        self.relevance = relevance;
        self
    }
}

/// A fact extracted from an article, keyed by its own id for deduplication.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    /// Chain of custody back to the source article.
    pub article_id: String,
    pub claim: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    0.7
}

impl Fact {
    pub fn new(article_id: impl Into<String>, claim: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            article_id: article_id.into(),
            claim: claim.into(),
            confidence: default_confidence(),
        }
    }
}

/// Review status of a script draft.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    #[default]
    Draft,
    PendingReview,
    Approved,
    Rejected,
    Revised,
}

/// A versioned script draft. The `draft` channel carries at most one and
/// overwrites on merge; versions are bumped by the node that regenerates it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub version: u32,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default)]
    pub status: DraftStatus,
    pub created_at: DateTime<Utc>,
}

impl Draft {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            version: 1,
            content: content.into(),
            caption: None,
            status: DraftStatus::Draft,
            created_at: Utc::now(),
        }
    }

    /// Next revision of this draft with replaced content.
    #[must_use]
    pub fn revised(&self, content: impl Into<String>) -> Self {
        Self {
            version: self.version + 1,
            content: content.into(),
            caption: self.caption.clone(),
            status: DraftStatus::Revised,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: DraftStatus) -> Self {
        self.status = status;
        self
    }
}

/// Structured rejection reasons, recorded for later analysis of reviewer
/// feedback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    FactCheckFailed,
    ToneMismatch,
    TooLong,
    TooShort,
    MissingContext,
    OutdatedInfo,
    QualityIssues,
    Other,
}

/// One approval or rejection outcome at a gate.
///
/// Records are append-only: the decision log grows, records are never
/// mutated, and the router reads only the *latest* record for a given gate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: String,
    pub thread_id: String,
    /// The gate this decision answers.
    pub gate: NodeId,
    pub approved: bool,
    #[serde(default)]
    pub reason_codes: Vec<ReasonCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Which draft version was under review.
    #[serde(default)]
    pub revision_of: u32,
    pub decided_at: DateTime<Utc>,
}

impl DecisionRecord {
    fn new(thread_id: impl Into<String>, gate: impl Into<NodeId>, approved: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            gate: gate.into(),
            approved,
            reason_codes: Vec::new(),
            notes: None,
            revision_of: 0,
            decided_at: Utc::now(),
        }
    }

    pub fn approve(thread_id: impl Into<String>, gate: impl Into<NodeId>) -> Self {
        Self::new(thread_id, gate, true)
    }

    pub fn reject(thread_id: impl Into<String>, gate: impl Into<NodeId>) -> Self {
        Self::new(thread_id, gate, false)
    }

    #[must_use]
    pub fn with_reasons(mut self, reason_codes: Vec<ReasonCode>) -> Self {
        self.reason_codes = reason_codes;
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    #[must_use]
    pub fn for_revision(mut self, version: u32) -> Self {
        self.revision_of = version;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_defaults() {
        let article = Article::new("https://example.com/a", "Example Wire", "Headline");
        assert!(!article.id.is_empty());
        assert_eq!(article.relevance, 0.5);
        assert!(article.category.is_none());
    }

    #[test]
    fn draft_revision_bumps_version() {
        let draft = Draft::new("first cut");
        let revised = draft.revised("second cut");
        assert_eq!(revised.version, 2);
        assert_eq!(revised.status, DraftStatus::Revised);
        assert_eq!(draft.version, 1);
    }

    #[test]
    fn decision_constructors() {
        let ok = DecisionRecord::approve("2026-W32", NodeId::named("script_review"));
        assert!(ok.approved);
        let no = DecisionRecord::reject("2026-W32", NodeId::named("script_review"))
            .with_reasons(vec![ReasonCode::ToneMismatch])
            .with_notes("needs a softer open");
        assert!(!no.approved);
        assert_eq!(no.reason_codes.len(), 1);
    }

    #[test]
    fn decision_serde_roundtrip() {
        let record = DecisionRecord::approve("t", NodeId::named("g")).for_revision(2);
        let json = serde_json::to_string(&record).unwrap();
        let parsed: DecisionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, parsed);
    }
}
