//! Single-table key-value abstraction (spec.md §3/§4). Every record in this
//! system — messages, sessions, ledger counters, metadata, preferences — is
//! modeled as an item keyed by a composite `(pk, sk)`, with one local
//! secondary index (`lsi1_sk`, sharing the table's partition key) used for
//! range queries that don't follow the primary sort key, mirroring a single
//! DynamoDB table design.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    pub pk: String,
    pub sk: String,
    pub lsi1_sk: Option<String>,
    pub attributes: Map<String, Value>,
}

impl Item {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
            lsi1_sk: None,
            attributes: Map::new(),
        }
    }

    pub fn with_lsi1(mut self, lsi1_sk: impl Into<String>) -> Self {
        self.lsi1_sk = Some(lsi1_sk.into());
        self
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// A page of items returned from a range query, with an opaque continuation
/// token the caller passes back as `start_key` to fetch the next page.
#[derive(Clone, Debug, Default)]
pub struct Page {
    pub items: Vec<Item>,
    pub next_start_key: Option<String>,
}

#[derive(Clone, Debug)]
pub enum WriteOp {
    Put(Item),
    /// Put, but fails with `StoreError::ConditionFailed` if the item already exists.
    PutIfAbsent(Item),
    Delete { pk: String, sk: String },
}

/// Queries the primary index by partition key, optionally restricted to sort
/// keys with the given prefix, in ascending sort-key order.
#[derive(Clone, Debug, Default)]
pub struct QuerySpec {
    pub sk_prefix: Option<String>,
    pub limit: Option<usize>,
    pub start_key: Option<String>,
    pub ascending: bool,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get_item(&self, pk: &str, sk: &str) -> Result<Option<Item>>;

    async fn put_item(&self, item: Item) -> Result<()>;

    /// Applies every op as a single all-or-nothing unit, matching the
    /// append-plus-ledger-update pattern the Message Store and Cost Ledger
    /// need (spec.md §4.A/§4.C).
    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<()>;

    async fn query(&self, pk: &str, spec: QuerySpec) -> Result<Page>;

    /// Queries the LSI1 local secondary index: same partition key, sorted by
    /// `lsi1_sk` instead of `sk`.
    async fn query_lsi1(&self, pk: &str, spec: QuerySpec) -> Result<Page>;

    async fn delete_item(&self, pk: &str, sk: &str) -> Result<()>;

    /// Atomically adds `delta` to a numeric field, creating the item (and
    /// field) at zero if absent, and returns the field's new value. Used for
    /// message sequence numbers and cost-ledger counters (spec.md §4.A/§4.C).
    async fn increment(&self, pk: &str, sk: &str, field: &str, delta: i64) -> Result<i64>;
}
