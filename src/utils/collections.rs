//! Collection constructors shared across modules.

use rustc_hash::FxHashMap;
use serde_json::Value;

/// New empty map for the extra channel / `NodePartial::extra`.
#[must_use]
pub fn new_extra_map() -> FxHashMap<String, Value> {
    FxHashMap::default()
}
