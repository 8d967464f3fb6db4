//! Translation of query-string parameters into filter and search documents.
//!
//! Recognized parameters live in one table; both query styles iterate it, so
//! adding a searchable field only means adding a row.

use bson::{doc, Bson, Document};
use mongodb::options::Hint;
use std::collections::HashMap;

/// Default dynamic Atlas Search index
pub const DEFAULT_SEARCH_INDEX: &str = "default";

/// How a parameter is matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStyle {
    /// Exact equality, used by scan queries
    Equality,
    /// Analyzed full-text match, used by managed search
    Text,
}

/// A recognized query-string parameter and the field it targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryField {
    pub param: &'static str,
    pub path: &'static str,
}

pub const QUERY_FIELDS: &[QueryField] = &[
    QueryField {
        param: "id",
        path: "restaurantId",
    },
    QueryField {
        param: "firstName",
        path: "owners.firstName",
    },
    QueryField {
        param: "lastName",
        path: "owners.lastName",
    },
    QueryField {
        param: "city",
        path: "address.city",
    },
    QueryField {
        param: "state",
        path: "address.state",
    },
    QueryField {
        param: "country",
        path: "address.country",
    },
];

/// Look up the field path for a parameter name
pub fn field_path(param: &str) -> Option<&'static str> {
    QUERY_FIELDS
        .iter()
        .find(|f| f.param == param)
        .map(|f| f.path)
}

/// Result shape requested by an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// At most one record
    One,
    /// Matches, capped only when a result limit is configured
    Many,
    /// Every match
    All,
}

impl Lookup {
    /// Endpoint name under `/scan` and `/atlas-search`
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::One => "get-restaurant",
            Self::Many => "get-restaurants",
            Self::All => "get-all-restaurants",
        }
    }

    /// Record cap for this lookup; a non-positive `result_limit` means none
    pub fn limit(&self, result_limit: i64) -> Option<i64> {
        match self {
            Self::One => Some(1),
            Self::Many => (result_limit > 0).then_some(result_limit),
            Self::All => None,
        }
    }
}

/// Access path requested for a scan query via `scanType`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScanType {
    /// Let the planner choose, normally one of the secondary indexes
    #[default]
    Index,
    /// Force a full collection scan (`$natural` order)
    Column,
    /// Force a specific index by name
    Named(String),
}

impl ScanType {
    pub fn parse(value: &str) -> Self {
        match value {
            "" | "index" => Self::Index,
            "column" => Self::Column,
            name => Self::Named(name.to_string()),
        }
    }

    /// Driver hint for this access path
    pub fn hint(&self) -> Option<Hint> {
        match self {
            Self::Index => None,
            Self::Column => Some(Hint::Keys(doc! { "$natural": 1 })),
            Self::Named(name) => Some(Hint::Name(name.clone())),
        }
    }

    /// Same hint in the shape the `explain` command expects
    pub fn hint_bson(&self) -> Option<Bson> {
        match self {
            Self::Index => None,
            Self::Column => Some(Bson::Document(doc! { "$natural": 1 })),
            Self::Named(name) => Some(Bson::String(name.clone())),
        }
    }
}

/// Per-call options, passed explicitly into every query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Request and log the execution plan; never changes the payload
    pub explain: bool,
    /// Named search index; `None` falls back to the default dynamic index
    pub search_index: Option<String>,
    /// Maximum number of records to return; `None` means unbounded
    pub limit: Option<i64>,
    /// Access path for scan queries; ignored by managed search
    pub scan_type: ScanType,
}

impl QueryOptions {
    pub fn with_limit(mut self, limit: Option<i64>) -> Self {
        self.limit = limit;
        self
    }

    /// The search index to use, falling back to `fallback`
    pub fn search_index_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.search_index
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback)
    }
}

/// Recognized conditions extracted from a query string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    conditions: Vec<(&'static str, String)>,
}

impl QueryParams {
    /// Keep recognized, non-empty parameters in table order; ignore the rest
    pub fn from_map(params: &HashMap<String, String>) -> Self {
        let conditions = QUERY_FIELDS
            .iter()
            .filter_map(|field| {
                params
                    .get(field.param)
                    .filter(|v| !v.is_empty())
                    .map(|v| (field.path, v.clone()))
            })
            .collect();
        Self { conditions }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// (field path, value) pairs
    pub fn conditions(&self) -> &[(&'static str, String)] {
        &self.conditions
    }

    /// Build a conventional filter: one condition stands alone, several are AND-ed
    pub fn to_filter(&self) -> Document {
        let mut clauses: Vec<Document> = self
            .conditions
            .iter()
            .map(|(path, value)| clause(MatchStyle::Equality, path, value))
            .collect();

        match clauses.len() {
            0 => Document::new(),
            1 => clauses.remove(0),
            _ => doc! { "$and": clauses },
        }
    }

    /// Build the `$search` stage; all text clauses are required (`must`)
    pub fn to_search_stage(&self, index: &str) -> Document {
        if self.conditions.is_empty() {
            return doc! {
                "$search": {
                    "index": index,
                    "exists": { "path": "restaurantId" },
                }
            };
        }

        let must: Vec<Document> = self
            .conditions
            .iter()
            .map(|(path, value)| clause(MatchStyle::Text, path, value))
            .collect();

        doc! {
            "$search": {
                "index": index,
                "compound": { "must": must },
            }
        }
    }

    /// Full aggregation pipeline for a managed search query
    pub fn to_search_pipeline(&self, index: &str, limit: Option<i64>) -> Vec<Document> {
        let mut pipeline = vec![self.to_search_stage(index)];
        if let Some(limit) = limit {
            pipeline.push(doc! { "$limit": limit });
        }
        pipeline
    }
}

fn clause(style: MatchStyle, path: &str, value: &str) -> Document {
    match style {
        MatchStyle::Equality => {
            let mut d = Document::new();
            d.insert(path, Bson::String(value.to_string()));
            d
        }
        MatchStyle::Text => doc! {
            "text": { "query": value, "path": path }
        },
    }
}

/// Parse per-call options from the query string
pub fn parse_options(params: &HashMap<String, String>) -> QueryOptions {
    let explain = params
        .get("explain")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false);

    let search_index = params
        .get("searchIndex")
        .filter(|v| !v.is_empty())
        .cloned();

    let scan_type = params
        .get("scanType")
        .map(|v| ScanType::parse(v))
        .unwrap_or_default();

    QueryOptions {
        explain,
        search_index,
        limit: None,
        scan_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_no_params_matches_everything() {
        let q = QueryParams::from_map(&params(&[]));
        assert!(q.is_empty());
        assert_eq!(q.to_filter(), Document::new());
    }

    #[test]
    fn test_single_param_is_plain_equality() {
        let q = QueryParams::from_map(&params(&[("city", "CITY A")]));
        assert_eq!(q.to_filter(), doc! { "address.city": "CITY A" });
    }

    #[test]
    fn test_multiple_params_are_anded() {
        let q = QueryParams::from_map(&params(&[
            ("country", "COUNTRY A"),
            ("firstName", "JOHN"),
        ]));
        assert_eq!(
            q.to_filter(),
            doc! { "$and": [
                { "owners.firstName": "JOHN" },
                { "address.country": "COUNTRY A" },
            ]}
        );
    }

    #[test]
    fn test_unknown_and_empty_params_are_ignored() {
        let q = QueryParams::from_map(&params(&[
            ("zip", "12345"),
            ("explain", "true"),
            ("scanType", "column"),
            ("state", ""),
            ("id", "abc"),
        ]));
        assert_eq!(q.len(), 1);
        assert_eq!(q.to_filter(), doc! { "restaurantId": "abc" });
    }

    #[test]
    fn test_every_param_has_a_path() {
        for name in ["id", "firstName", "lastName", "city", "state", "country"] {
            assert!(field_path(name).is_some(), "missing mapping for {}", name);
        }
        assert_eq!(field_path("city"), Some("address.city"));
        assert_eq!(field_path("nope"), None);
    }

    #[test]
    fn test_search_stage_uses_compound_must() {
        let q = QueryParams::from_map(&params(&[("lastName", "SMITH"), ("city", "CITY B")]));
        let stage = q.to_search_stage("restaurants_idx");
        assert_eq!(
            stage,
            doc! { "$search": {
                "index": "restaurants_idx",
                "compound": { "must": [
                    { "text": { "query": "SMITH", "path": "owners.lastName" } },
                    { "text": { "query": "CITY B", "path": "address.city" } },
                ]},
            }}
        );
    }

    #[test]
    fn test_search_without_params_matches_all() {
        let q = QueryParams::from_map(&params(&[]));
        let stage = q.to_search_stage(DEFAULT_SEARCH_INDEX);
        let search = stage.get_document("$search").unwrap();
        assert_eq!(search.get_str("index").unwrap(), "default");
        assert!(search.contains_key("exists"));
    }

    #[test]
    fn test_search_pipeline_limit() {
        let q = QueryParams::from_map(&params(&[("state", "STATE A")]));
        assert_eq!(q.to_search_pipeline("default", None).len(), 1);

        let pipeline = q.to_search_pipeline("default", Some(1));
        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline[1], doc! { "$limit": 1_i64 });
    }

    #[test]
    fn test_lookup_limits() {
        assert_eq!(Lookup::One.limit(100), Some(1));
        assert_eq!(Lookup::Many.limit(100), Some(100));
        assert_eq!(Lookup::Many.limit(0), None);
        assert_eq!(Lookup::All.limit(100), None);
        assert_eq!(Lookup::Many.endpoint(), "get-restaurants");
    }

    #[test]
    fn test_scan_type_maps_to_hint() {
        let opts = parse_options(&params(&[("scanType", "column")]));
        assert_eq!(opts.scan_type, ScanType::Column);
        assert!(matches!(opts.scan_type.hint(), Some(Hint::Keys(d)) if d == doc! { "$natural": 1 }));

        let opts = parse_options(&params(&[("scanType", "address.city_1")]));
        assert_eq!(opts.scan_type, ScanType::Named("address.city_1".to_string()));
        assert!(matches!(opts.scan_type.hint(), Some(Hint::Name(n)) if n == "address.city_1"));
        assert_eq!(
            opts.scan_type.hint_bson(),
            Some(Bson::String("address.city_1".to_string()))
        );

        for value in [None, Some("index"), Some("")] {
            let map = match value {
                Some(v) => params(&[("scanType", v)]),
                None => params(&[]),
            };
            let opts = parse_options(&map);
            assert_eq!(opts.scan_type, ScanType::Index);
            assert!(opts.scan_type.hint().is_none());
        }
    }

    #[test]
    fn test_parse_options() {
        let opts = parse_options(&params(&[("explain", "true"), ("searchIndex", "named")]));
        assert!(opts.explain);
        assert_eq!(opts.search_index_or(DEFAULT_SEARCH_INDEX), "named");

        let opts = parse_options(&params(&[("explain", "no"), ("searchIndex", "")]));
        assert!(!opts.explain);
        assert_eq!(opts.search_index, None);
        assert_eq!(opts.search_index_or(DEFAULT_SEARCH_INDEX), DEFAULT_SEARCH_INDEX);
    }
}
