//! Translation of download request parameters into collection queries.
//!
//! A download request carries a flat mapping of string keys to string values.
//! Four keys control pagination and ordering; every other key becomes an entry
//! of the filter document. Filter values are coerced from MongoDB extended
//! JSON so that callers can send typed filters (`{"$gt": 5}`, `true`,
//! `{"$oid": "..."}`) through the same textual interface as plain strings.
//!
//! No whitelist of filterable fields is applied. Values are placed into the
//! filter as parsed BSON, never spliced into query text.

use crate::error::{MountError, MountResult};
use crate::models::{DEFAULT_SORT_FIELD, FilterValue, QueryDescriptor, SortDirection};
use bson::{Bson, Document};
use std::collections::{BTreeMap, HashMap};

/// Reserved parameter names.
pub mod keys {
    pub const LIMIT: &str = "limit";
    pub const OFFSET: &str = "offset";
    pub const SORT: &str = "sort";
    pub const SORT_DIR: &str = "sortdir";

    pub const ALL: [&str; 4] = [LIMIT, OFFSET, SORT, SORT_DIR];
}

/// Translate raw request parameters into a query.
///
/// The caller's mapping is left untouched; the translator works on its own copy.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use mongo_reader::translator::parse_query;
/// use mongo_reader::models::SortDirection;
///
/// let params = HashMap::from([
///     ("age".to_string(), "25".to_string()),
///     ("sort".to_string(), "name".to_string()),
///     ("sortdir".to_string(), "-1".to_string()),
///     ("limit".to_string(), "2".to_string()),
/// ]);
///
/// let query = parse_query(&params).unwrap();
/// assert_eq!(query.sort_field, "name");
/// assert_eq!(query.sort_direction, SortDirection::Descending);
/// assert_eq!(query.limit, 2);
/// assert_eq!(query.filter.get_i32("age").unwrap(), 25);
/// ```
pub fn parse_query(params: &HashMap<String, String>) -> MountResult<QueryDescriptor> {
    let mut params = params.clone();

    let limit = match params.remove(keys::LIMIT) {
        Some(raw) => parse_non_negative(keys::LIMIT, &raw)?,
        None => 0,
    };
    let skip = match params.remove(keys::OFFSET) {
        Some(raw) => parse_non_negative(keys::OFFSET, &raw)?,
        None => 0,
    };
    let sort_field = params
        .remove(keys::SORT)
        .unwrap_or_else(|| DEFAULT_SORT_FIELD.to_string());
    let sort_direction = match params.remove(keys::SORT_DIR) {
        Some(raw) => parse_sort_direction(&raw)?,
        None => SortDirection::Ascending,
    };

    Ok(QueryDescriptor {
        filter: build_filter(params),
        sort_field,
        sort_direction,
        skip,
        limit,
    })
}

/// Coerce one textual filter value.
///
/// Total: text that is not valid extended JSON is kept verbatim as a string.
pub fn coerce_value(raw: &str) -> FilterValue {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(raw) else {
        return FilterValue::String(raw.to_string());
    };

    match Bson::try_from(json) {
        Ok(value) => FilterValue::from(value),
        Err(_) => FilterValue::String(raw.to_string()),
    }
}

/// Build the filter document. Keys are inserted in sorted order.
fn build_filter(params: HashMap<String, String>) -> Document {
    let ordered: BTreeMap<String, String> = params.into_iter().collect();
    let mut filter = Document::new();
    for (field, raw) in ordered {
        filter.insert(field, coerce_value(&raw).into_bson());
    }
    filter
}

fn parse_integer(field: &str, raw: &str) -> MountResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| MountError::validation(field, raw, "expected an integer"))
}

fn parse_non_negative(field: &str, raw: &str) -> MountResult<u64> {
    let value = parse_integer(field, raw)?;
    u64::try_from(value)
        .map_err(|_| MountError::validation(field, raw, "must not be negative"))
}

fn parse_sort_direction(raw: &str) -> MountResult<SortDirection> {
    let value = parse_integer(keys::SORT_DIR, raw)?;
    SortDirection::from_i64(value).ok_or_else(|| {
        MountError::validation(
            keys::SORT_DIR,
            raw,
            "must be 1 (ascending) or -1 (descending)",
        )
    })
}
