//! In-memory store for tests that run without a MongoDB deployment.
//!
//! Filters support plain (dotted-path) equality and `$and`. Pipelines support
//! a leading `$search` stage (`exists` or `compound.must` of `text` clauses)
//! followed by an optional `$limit`. Text clauses match when any analyzed
//! query term appears among the field's terms, case-insensitively.
//!
//! Like a real deployment, index DDL is refused while a transaction is open.

use async_trait::async_trait;
use bson::{Bson, Document};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::index::IndexSpec;
use crate::models::Restaurant;
use crate::query::{QueryOptions, ScanType};
use crate::store::{InstallTarget, RestaurantRepository, Result, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<Restaurant>>,
    indexes: RwLock<Vec<String>>,
    fail_indexes: AtomicBool,
    explained: AtomicUsize,
    last_search_index: RwLock<Option<String>>,
    last_scan_type: RwLock<Option<ScanType>>,
    open_transactions: AtomicUsize,
}

/// Staged copy of the collection, applied on commit
pub struct MemoryTransaction {
    staged: Vec<Restaurant>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Restaurant>) -> Self {
        let store = Self::default();
        *store.records.write().unwrap() = records;
        store
    }

    pub fn records(&self) -> Vec<Restaurant> {
        self.records.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indexes.read().unwrap().clone()
    }

    /// Make the next index rebuilds report failure
    pub fn fail_index_builds(&self, fail: bool) {
        self.fail_indexes.store(fail, Ordering::SeqCst);
    }

    /// Number of queries that asked for an execution plan
    pub fn explain_count(&self) -> usize {
        self.explained.load(Ordering::SeqCst)
    }

    /// Index named by the most recent `$search` stage
    pub fn last_search_index(&self) -> Option<String> {
        self.last_search_index.read().unwrap().clone()
    }

    /// Scan type of the most recent find
    pub fn last_scan_type(&self) -> Option<ScanType> {
        self.last_scan_type.read().unwrap().clone()
    }

    pub fn open_transactions(&self) -> usize {
        self.open_transactions.load(Ordering::SeqCst)
    }

    fn note_explain(&self, options: &QueryOptions) {
        if options.explain {
            self.explained.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn matching(&self, filter: &Document) -> Vec<Restaurant> {
        self.records
            .read()
            .unwrap()
            .iter()
            .filter(|r| matches_filter(filter, &to_document(r)))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RestaurantRepository for MemoryStore {
    async fn find_one(
        &self,
        filter: Document,
        options: &QueryOptions,
    ) -> Result<Option<Restaurant>> {
        self.note_explain(options);
        *self.last_scan_type.write().unwrap() = Some(options.scan_type.clone());
        Ok(self.matching(&filter).into_iter().next())
    }

    async fn find_many(&self, filter: Document, options: &QueryOptions) -> Result<Vec<Restaurant>> {
        self.note_explain(options);
        *self.last_scan_type.write().unwrap() = Some(options.scan_type.clone());
        let mut found = self.matching(&filter);
        if let Some(limit) = options.limit {
            found.truncate(limit.max(0) as usize);
        }
        Ok(found)
    }

    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: &QueryOptions,
    ) -> Result<Vec<Restaurant>> {
        self.note_explain(options);
        let mut results = self.records();

        for stage in &pipeline {
            if let Ok(search) = stage.get_document("$search") {
                *self.last_search_index.write().unwrap() =
                    search.get_str("index").ok().map(str::to_string);
                results.retain(|r| matches_search(search, &to_document(r)));
            } else if let Some(limit) = stage.get("$limit").and_then(bson_as_i64) {
                results.truncate(limit.max(0) as usize);
            }
        }

        Ok(results)
    }
}

#[async_trait]
impl InstallTarget for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        self.open_transactions.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTransaction {
            staged: self.records(),
        })
    }

    async fn count(&self, txn: &mut MemoryTransaction) -> Result<u64> {
        Ok(txn.staged.len() as u64)
    }

    async fn clear(&self, txn: &mut MemoryTransaction) -> Result<u64> {
        let deleted = txn.staged.len() as u64;
        txn.staged.clear();
        Ok(deleted)
    }

    async fn insert_many(&self, txn: &mut MemoryTransaction, records: &[Restaurant]) -> Result<u64> {
        txn.staged.extend_from_slice(records);
        Ok(records.len() as u64)
    }

    async fn rebuild_indexes(&self, indexes: &[IndexSpec]) -> Result<bool> {
        if self.open_transactions() > 0 {
            return Err(StoreError::TransactionOpen);
        }
        // A failed rebuild restores the previous set
        if self.fail_indexes.load(Ordering::SeqCst) {
            return Ok(false);
        }
        *self.indexes.write().unwrap() = indexes.iter().map(IndexSpec::name).collect();
        Ok(true)
    }

    async fn commit(&self, txn: MemoryTransaction) -> Result<()> {
        *self.records.write().unwrap() = txn.staged;
        self.open_transactions.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn abort(&self, _txn: MemoryTransaction) -> Result<()> {
        self.open_transactions.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn to_document(record: &Restaurant) -> Document {
    bson::to_document(record).unwrap_or_default()
}

fn bson_as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        _ => None,
    }
}

/// Values reachable through a dotted path, flattening arrays on the way
fn values_at<'a>(value: &'a Bson, path: &[&str], out: &mut Vec<&'a Bson>) {
    match (path.split_first(), value) {
        (None, Bson::Array(items)) => out.extend(items.iter()),
        (None, v) => out.push(v),
        (Some(_), Bson::Array(items)) => {
            for item in items {
                values_at(item, path, out);
            }
        }
        (Some((head, rest)), Bson::Document(d)) => {
            if let Some(v) = d.get(*head) {
                values_at(v, rest, out);
            }
        }
        _ => {}
    }
}

fn field_values<'a>(record: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = segments.split_first() {
        if let Some(v) = record.get(*head) {
            values_at(v, rest, &mut out);
        }
    }
    out
}

fn matches_filter(filter: &Document, record: &Document) -> bool {
    filter.iter().all(|(key, expected)| match key.as_str() {
        "$and" => match expected {
            Bson::Array(clauses) => clauses.iter().all(|c| match c {
                Bson::Document(d) => matches_filter(d, record),
                _ => false,
            }),
            _ => false,
        },
        path => field_values(record, path).into_iter().any(|v| v == expected),
    })
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn matches_text(clause: &Document, record: &Document) -> bool {
    let (Ok(query), Ok(path)) = (clause.get_str("query"), clause.get_str("path")) else {
        return false;
    };
    let wanted = terms(query);

    field_values(record, path).into_iter().any(|v| match v {
        Bson::String(s) => terms(s).iter().any(|t| wanted.contains(t)),
        _ => false,
    })
}

fn matches_search(search: &Document, record: &Document) -> bool {
    if let Ok(exists) = search.get_document("exists") {
        return exists
            .get_str("path")
            .map(|p| !field_values(record, p).is_empty())
            .unwrap_or(false);
    }

    let Ok(must) = search
        .get_document("compound")
        .and_then(|c| c.get_array("must"))
    else {
        return false;
    };

    must.iter().all(|clause| match clause {
        Bson::Document(d) => d
            .get_document("text")
            .map(|t| matches_text(t, record))
            .unwrap_or(false),
        _ => false,
    })
}
