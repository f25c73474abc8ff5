use greenroom::channels::Channel;
use greenroom::state::WorkflowState;

pub fn assert_extra_has(state: &WorkflowState, key: &str) {
    assert!(
        state.extra.snapshot().contains_key(key),
        "extra channel missing key '{key}'"
    );
}

pub fn article_urls(state: &WorkflowState) -> Vec<String> {
    let mut urls: Vec<String> = state
        .articles
        .snapshot()
        .iter()
        .map(|a| a.source_url.clone())
        .collect();
    urls.sort();
    urls
}
