use greenroom::content::Article;
use greenroom::state::{StateSnapshot, WorkflowState};
use serde_json::json;

pub fn empty_snapshot() -> StateSnapshot {
    WorkflowState::new().snapshot()
}

pub fn state_with_article(url: &str) -> WorkflowState {
    WorkflowState::builder()
        .with_article(Article::new(url, "Example Wire", url))
        .with_extra("week", json!(32))
        .build()
}

/// Article whose content is fully determined by its URL, so keyed merges
/// are insensitive to which duplicate survives.
pub fn keyed_article(url: &str) -> Article {
    Article {
        id: url.to_string(),
        source_url: url.to_string(),
        source_name: "Example Wire".to_string(),
        title: url.to_string(),
        summary: None,
        category: None,
        relevance: 0.5,
        fetched_at: chrono::DateTime::UNIX_EPOCH,
    }
}
