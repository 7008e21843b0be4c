//! Identifier space resolution: a numeric range or a discovered listing

use rand::seq::SliceRandom;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::config::{Config, IdSpaceConfig};
use crate::error::DiscoveryError;
use crate::source::DataSource;
use crate::types::Identifier;

/// Every identifier in the inclusive range `[start, end]`
///
/// Empty when `start > end`. [`Config::validate`] rejects that case, and ranges
/// wider than [`MAX_ID_SPAN`](crate::config::MAX_ID_SPAN), up front.
pub fn range_ids(ids: &IdSpaceConfig) -> Vec<Identifier> {
    (ids.start..=ids.end).map(Identifier).collect()
}

/// Collect candidate identifiers from a listing document
///
/// The walk visits every nested value. An object whose `id_field` holds an
/// integer (or an integer-valued string) contributes it, and any bare
/// non-negative integer found anywhere contributes itself. Negative and
/// fractional numbers are skipped.
pub fn harvest_identifiers(value: &Value, id_field: &str) -> BTreeSet<Identifier> {
    let mut found = BTreeSet::new();
    harvest_into(value, id_field, &mut found);
    found
}

fn harvest_into(value: &Value, id_field: &str, found: &mut BTreeSet<Identifier>) {
    match value {
        Value::Object(map) => {
            // Numeric values are picked up by the walk below
            if let Some(id) = map
                .get(id_field)
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<Identifier>().ok())
            {
                found.insert(id);
            }
            for nested in map.values() {
                harvest_into(nested, id_field, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                harvest_into(item, id_field, found);
            }
        }
        Value::Number(n) => {
            if let Some(id) = n.as_u64() {
                found.insert(Identifier(id));
            }
        }
        Value::Null | Value::Bool(_) | Value::String(_) => {}
    }
}

/// Parse listing output into a sorted, duplicate-free identifier list
pub fn parse_listing(text: &str, id_field: &str) -> Result<Vec<Identifier>, DiscoveryError> {
    let value: Value = serde_json::from_str(text)?;
    let found = harvest_identifiers(&value, id_field);
    if found.is_empty() {
        return Err(DiscoveryError::NoCandidates);
    }
    Ok(found.into_iter().collect())
}

/// Run the listing call and parse its output
pub async fn discover(
    source: &dyn DataSource,
    config: &Config,
) -> Result<Vec<Identifier>, DiscoveryError> {
    let text = source.list(config.source.discovery_timeout).await?;
    parse_listing(&text, &config.source.id_field)
}

/// Decide which identifiers this run will fetch
///
/// With discovery enabled, a failed or useless listing falls back to the
/// configured range with a warning. The result is shuffled when requested.
pub async fn resolve_identifiers(config: &Config, source: &dyn DataSource) -> Vec<Identifier> {
    let mut ids = if config.ids.discover {
        match discover(source, config).await {
            Ok(ids) => {
                tracing::info!(count = ids.len(), source = source.name(), "Discovered identifiers");
                ids
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    start = config.ids.start,
                    end = config.ids.end,
                    "Discovery failed, falling back to range"
                );
                range_ids(&config.ids)
            }
        }
    } else {
        range_ids(&config.ids)
    };

    if config.ids.shuffle {
        ids.shuffle(&mut rand::thread_rng());
    }
    ids
}
