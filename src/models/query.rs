//! Query-related data models.
//!
//! This module defines the translated query handed to the driver and the
//! tagged filter values produced by parameter coercion.

use bson::{Bson, Document, doc};
use mongodb::options::FindOptions;

/// Sort field used when the request does not name one.
pub const DEFAULT_SORT_FIELD: &str = "_id";

/// Direction of the single sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    /// Map the wire integer onto a direction. Only `1` and `-1` are valid.
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Ascending),
            -1 => Some(Self::Descending),
            _ => None,
        }
    }

    /// The integer the driver expects in a sort document.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// A filter value after coercion from its textual form.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Int(i64),
    Double(f64),
    Bool(bool),
    Null,
    /// Embedded document, including operator expressions such as `{"$gt": 5}`.
    Document(Document),
    Array(Vec<Bson>),
    /// Database-specific scalar such as an ObjectId or a date.
    Extended(Bson),
    /// Either a quoted JSON string or text that did not parse at all.
    String(String),
}

impl FilterValue {
    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::Bool(_) => "bool",
            Self::Null => "null",
            Self::Document(_) => "document",
            Self::Array(_) => "array",
            Self::Extended(_) => "extended",
            Self::String(_) => "string",
        }
    }

    /// Convert into the BSON value placed in the filter document.
    pub fn into_bson(self) -> Bson {
        match self {
            Self::Int(i) => match i32::try_from(i) {
                Ok(small) => Bson::Int32(small),
                Err(_) => Bson::Int64(i),
            },
            Self::Double(f) => Bson::Double(f),
            Self::Bool(b) => Bson::Boolean(b),
            Self::Null => Bson::Null,
            Self::Document(d) => Bson::Document(d),
            Self::Array(a) => Bson::Array(a),
            Self::Extended(b) => b,
            Self::String(s) => Bson::String(s),
        }
    }
}

impl From<Bson> for FilterValue {
    fn from(value: Bson) -> Self {
        match value {
            Bson::Int32(i) => Self::Int(i64::from(i)),
            Bson::Int64(i) => Self::Int(i),
            Bson::Double(f) => Self::Double(f),
            Bson::Boolean(b) => Self::Bool(b),
            Bson::Null => Self::Null,
            Bson::Document(d) => Self::Document(d),
            Bson::Array(a) => Self::Array(a),
            Bson::String(s) => Self::String(s),
            other => Self::Extended(other),
        }
    }
}

/// A validated query against one mounted collection.
///
/// Invariants: `skip` and `limit` are non-negative by type, and the sort
/// direction is one of the two [`SortDirection`] variants.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub filter: Document,
    pub sort_field: String,
    pub sort_direction: SortDirection,
    pub skip: u64,
    /// 0 means unbounded
    pub limit: u64,
}

impl Default for QueryDescriptor {
    fn default() -> Self {
        Self {
            filter: Document::new(),
            sort_field: DEFAULT_SORT_FIELD.to_string(),
            sort_direction: SortDirection::Ascending,
            skip: 0,
            limit: 0,
        }
    }
}

impl QueryDescriptor {
    /// The sort document, e.g. `{"name": -1}`.
    pub fn sort_document(&self) -> Document {
        doc! { &self.sort_field: self.sort_direction.as_i32() }
    }

    /// Driver options applying sort, skip and limit to the cursor.
    pub fn find_options(&self) -> FindOptions {
        let mut options = FindOptions::default();
        options.sort = Some(self.sort_document());
        if self.skip > 0 {
            options.skip = Some(self.skip);
        }
        if self.limit > 0 {
            options.limit = Some(i64::try_from(self.limit).unwrap_or(i64::MAX));
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_direction_from_i64() {
        assert_eq!(SortDirection::from_i64(1), Some(SortDirection::Ascending));
        assert_eq!(SortDirection::from_i64(-1), Some(SortDirection::Descending));
        assert_eq!(SortDirection::from_i64(0), None);
        assert_eq!(SortDirection::from_i64(2), None);
    }

    #[test]
    fn test_descriptor_defaults() {
        let query = QueryDescriptor::default();
        assert_eq!(query.sort_field, "_id");
        assert_eq!(query.sort_direction, SortDirection::Ascending);
        assert_eq!(query.skip, 0);
        assert_eq!(query.limit, 0);
        assert!(query.filter.is_empty());
    }

    #[test]
    fn test_find_options_unbounded() {
        let options = QueryDescriptor::default().find_options();
        assert_eq!(options.sort, Some(doc! { "_id": 1 }));
        assert_eq!(options.skip, None);
        assert_eq!(options.limit, None);
    }

    #[test]
    fn test_find_options_window() {
        let query = QueryDescriptor {
            sort_field: "name".to_string(),
            sort_direction: SortDirection::Descending,
            skip: 10,
            limit: 2,
            ..QueryDescriptor::default()
        };
        let options = query.find_options();
        assert_eq!(options.sort, Some(doc! { "name": -1 }));
        assert_eq!(options.skip, Some(10));
        assert_eq!(options.limit, Some(2));
    }

    #[test]
    fn test_filter_value_into_bson() {
        assert_eq!(FilterValue::Int(25).into_bson(), Bson::Int32(25));
        assert_eq!(
            FilterValue::Int(5_000_000_000).into_bson(),
            Bson::Int64(5_000_000_000)
        );
        assert_eq!(
            FilterValue::String("x".to_string()).into_bson(),
            Bson::String("x".to_string())
        );
    }

    #[test]
    fn test_filter_value_from_bson() {
        assert_eq!(FilterValue::from(Bson::Int32(3)), FilterValue::Int(3));
        assert_eq!(FilterValue::from(Bson::Null), FilterValue::Null);
        let oid = bson::oid::ObjectId::new();
        assert_eq!(
            FilterValue::from(Bson::ObjectId(oid)),
            FilterValue::Extended(Bson::ObjectId(oid))
        );
    }
}
