//! Property tests for the merge algebra laws the engine's concurrency
//! model depends on: append-unique merges must be idempotent and
//! order-insensitive, dict-union must be associative and commutative over
//! non-conflicting writes.

use proptest::prelude::*;
use rustc_hash::FxHashMap;
use serde_json::json;

use greenroom::channels::Channel;
use greenroom::content::Article;
use greenroom::node::NodePartial;
use greenroom::reducers::{AppendUniqueArticles, MapMerge, Reducer};
use greenroom::state::WorkflowState;

fn keyed(urls: &[u8]) -> Vec<Article> {
    urls.iter()
        .map(|n| {
            let url = format!("https://e.com/{n}");
            Article {
                id: url.clone(),
                source_url: url.clone(),
                source_name: "Example Wire".into(),
                title: url,
                summary: None,
                category: None,
                relevance: 0.5,
                fetched_at: chrono::DateTime::UNIX_EPOCH,
            }
        })
        .collect()
}

fn merged_urls(fragments: &[Vec<Article>]) -> Vec<String> {
    let mut state = WorkflowState::new();
    for fragment in fragments {
        AppendUniqueArticles.apply(
            &mut state,
            &NodePartial::new().with_articles(fragment.clone()),
        );
    }
    state
        .articles
        .snapshot()
        .iter()
        .map(|a| a.source_url.clone())
        .collect()
}

proptest! {
    #[test]
    fn append_unique_idempotent(
        a in proptest::collection::vec(0u8..16, 0..12),
        b in proptest::collection::vec(0u8..16, 0..12),
    ) {
        let a = keyed(&a);
        let b = keyed(&b);
        let once = merged_urls(&[a.clone(), b.clone()]);
        let twice = merged_urls(&[a, b.clone(), b]);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn append_unique_commutative_key_sets(
        a in proptest::collection::vec(0u8..16, 0..12),
        b in proptest::collection::vec(0u8..16, 0..12),
    ) {
        let a = keyed(&a);
        let b = keyed(&b);
        let mut ab = merged_urls(&[a.clone(), b.clone()]);
        let mut ba = merged_urls(&[b, a]);
        ab.sort();
        ba.sort();
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn append_unique_associative(
        a in proptest::collection::vec(0u8..16, 0..8),
        b in proptest::collection::vec(0u8..16, 0..8),
        c in proptest::collection::vec(0u8..16, 0..8),
    ) {
        let a = keyed(&a);
        let b = keyed(&b);
        let c = keyed(&c);

        // merge(merge(a, b), c)
        let left = merged_urls(&[a.clone(), b.clone(), c.clone()]);

        // merge(a, merge(b, c)): pre-merge b and c, then merge into a.
        let mut bc_state = WorkflowState::new();
        AppendUniqueArticles.apply(&mut bc_state, &NodePartial::new().with_articles(b));
        AppendUniqueArticles.apply(&mut bc_state, &NodePartial::new().with_articles(c));
        let bc = bc_state.articles.snapshot();
        let right = merged_urls(&[a, bc]);

        prop_assert_eq!(left, right);
    }

    #[test]
    fn dict_union_commutative_without_conflicts(
        a_keys in proptest::collection::vec("[a-d]{1,4}", 0..8),
        b_keys in proptest::collection::vec("[a-d]{1,4}", 0..8),
    ) {
        // Disjoint namespaces: conflicts are out of scope for this law.
        let mut a = FxHashMap::default();
        for k in &a_keys {
            a.insert(format!("a_{k}"), json!(k));
        }
        let mut b = FxHashMap::default();
        for k in &b_keys {
            b.insert(format!("b_{k}"), json!(k));
        }

        let mut ab = WorkflowState::new();
        MapMerge.apply(&mut ab, &NodePartial::new().with_extra(a.clone()));
        MapMerge.apply(&mut ab, &NodePartial::new().with_extra(b.clone()));

        let mut ba = WorkflowState::new();
        MapMerge.apply(&mut ba, &NodePartial::new().with_extra(b));
        MapMerge.apply(&mut ba, &NodePartial::new().with_extra(a));

        prop_assert_eq!(ab.extra.snapshot(), ba.extra.snapshot());
    }

    #[test]
    fn dict_union_associative(
        a_keys in proptest::collection::vec("[a-d]{1,3}", 0..6),
        b_keys in proptest::collection::vec("[e-h]{1,3}", 0..6),
        c_keys in proptest::collection::vec("[i-l]{1,3}", 0..6),
    ) {
        let to_map = |prefix: &str, keys: &[String]| {
            let mut m = FxHashMap::default();
            for k in keys {
                m.insert(format!("{prefix}_{k}"), json!(k));
            }
            m
        };
        let a = to_map("a", &a_keys);
        let b = to_map("b", &b_keys);
        let c = to_map("c", &c_keys);

        let mut left = WorkflowState::new();
        for m in [&a, &b, &c] {
            MapMerge.apply(&mut left, &NodePartial::new().with_extra(m.clone()));
        }

        let mut bc = WorkflowState::new();
        MapMerge.apply(&mut bc, &NodePartial::new().with_extra(b));
        MapMerge.apply(&mut bc, &NodePartial::new().with_extra(c));
        let mut right = WorkflowState::new();
        MapMerge.apply(&mut right, &NodePartial::new().with_extra(a));
        MapMerge.apply(&mut right, &NodePartial::new().with_extra(bc.extra.snapshot()));

        prop_assert_eq!(left.extra.snapshot(), right.extra.snapshot());
    }
}
