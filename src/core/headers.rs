//! Request header merging
//!
//! Headers captured when a connection was accepted are delivered to an app
//! once, together with any headers the broker cached for the same client.

use axum::http::HeaderMap;
use std::collections::BTreeMap;

/// Flatten and merge two header maps
///
/// Repeated values for one name are joined with `,`. On a name collision the
/// connection's `own` headers replace the `cached` ones. Values that are not
/// valid UTF-8 are skipped.
pub fn merge_headers(own: &HeaderMap, cached: &HeaderMap) -> BTreeMap<String, String> {
    let mut merged = flatten(cached);
    merged.extend(flatten(own));
    merged
}

fn flatten(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    for name in headers.keys() {
        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            continue;
        }
        flat.insert(name.as_str().to_string(), values.join(","));
    }
    flat
}
