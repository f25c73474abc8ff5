use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use greenroom::content::{Article, Draft, Fact};
use greenroom::node::{NodeContext, NodeError, NodeHandler, NodePartial};
use greenroom::state::StateSnapshot;
use greenroom::utils::collections::new_extra_map;
use serde_json::json;

/// Emits one article keyed by a fixed URL.
#[derive(Debug, Clone)]
pub struct ArticleNode {
    pub url: &'static str,
}

impl ArticleNode {
    pub fn new(url: &'static str) -> Self {
        Self { url }
    }
}

#[async_trait]
impl NodeHandler for ArticleNode {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        Ok(NodePartial::new().with_articles(vec![Article::new(self.url, "Example Wire", self.url)]))
    }
}

/// Extracts one fact per article currently in state.
#[derive(Debug, Clone)]
pub struct FactNode;

#[async_trait]
impl NodeHandler for FactNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let facts: Vec<Fact> = snapshot
            .articles
            .iter()
            .map(|a| Fact {
                id: format!("fact-{}", a.source_url),
                article_id: a.id.clone(),
                claim: format!("claim from {}", a.source_url),
                confidence: 0.7,
            })
            .collect();
        Ok(NodePartial::new().with_facts(facts))
    }
}

/// Writes one entry into the extra channel.
#[derive(Debug, Clone)]
pub struct ExtraNode {
    pub key: &'static str,
    pub value: &'static str,
}

#[async_trait]
impl NodeHandler for ExtraNode {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let mut extra = new_extra_map();
        extra.insert(self.key.to_string(), json!(self.value));
        Ok(NodePartial::new().with_extra(extra))
    }
}

/// Compiles a draft from current state and counts its executions; the draft
/// content encodes the revision count so tests can see regeneration.
#[derive(Debug, Clone, Default)]
pub struct CompileNode {
    pub executions: Arc<AtomicU32>,
}

impl CompileNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn execution_count(&self) -> u32 {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeHandler for CompileNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let revision = snapshot.control.revision_count;
        let draft = Draft::new(format!(
            "script over {} articles (revision {revision})",
            snapshot.articles.len()
        ));
        Ok(NodePartial::new().with_draft(draft))
    }
}

/// Sleeps long enough to trip a 1-second timeout.
#[derive(Debug, Clone)]
pub struct SleepyNode;

#[async_trait]
impl NodeHandler for SleepyNode {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        let mut extra = new_extra_map();
        extra.insert("slept".into(), json!(true));
        Ok(NodePartial::new().with_extra(extra))
    }
}

/// Always fails with a handler error.
#[derive(Debug, Clone, Default)]
pub struct FailingNode;

#[async_trait]
impl NodeHandler for FailingNode {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        Err(NodeError::MissingInput { what: "test_key" })
    }
}

/// Does nothing.
#[derive(Debug, Clone)]
pub struct NoopNode;

#[async_trait]
impl NodeHandler for NoopNode {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        Ok(NodePartial::default())
    }
}
