//! Identifier extraction and pagination for discovery listings

use crate::error::Result;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;

/// Pull `uuid` fields out of a listing payload.
///
/// Accepts a bare array of objects, or an object whose array-valued fields
/// hold objects (one level deep). Order of first appearance is kept.
pub fn extract_uuids(payload: &Value) -> Vec<String> {
    match payload {
        Value::Array(items) => uuids_from_array(items),
        Value::Object(root) => {
            let mut ids = Vec::new();
            if let Some(uuid) = uuid_field(root) {
                ids.push(uuid);
            }
            for value in root.values() {
                if let Value::Array(items) = value {
                    ids.extend(uuids_from_array(items));
                }
            }
            dedupe(ids)
        }
        _ => Vec::new(),
    }
}

fn uuids_from_array(items: &[Value]) -> Vec<String> {
    let ids = items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(uuid_field)
        .collect();
    dedupe(ids)
}

fn uuid_field(obj: &serde_json::Map<String, Value>) -> Option<String> {
    obj.get("uuid")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn dedupe(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(values.len());
    values.into_iter().filter(|v| seen.insert(v.clone())).collect()
}

/// Walk an offset-paginated listing until it is exhausted.
///
/// Stops on a short page, and also on a page that adds nothing new, so a
/// backend that keeps repeating a full page cannot loop forever.
pub async fn paginate_uuids<F, Fut>(limit: usize, mut fetch_page: F) -> Result<Vec<String>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let limit = limit.max(1);
    let mut seen = HashSet::new();
    let mut discovered = Vec::new();
    let mut offset = 0;

    loop {
        let payload = fetch_page(offset).await?;
        let page = extract_uuids(&payload);

        let mut new_items = 0;
        for id in &page {
            if seen.insert(id.clone()) {
                discovered.push(id.clone());
                new_items += 1;
            }
        }

        if page.len() < limit || new_items == 0 {
            break;
        }
        offset += limit;
    }

    discovered.sort();
    Ok(discovered)
}
