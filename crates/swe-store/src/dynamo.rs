//! DynamoDB-backed `KvStore`: the production implementation, a single table
//! keyed by `pk`/`sk` with an `LSI1` local secondary index on `lsi1_sk`.

use crate::error::{Result, StoreError};
use crate::kv::{Item, KvStore, Page, QuerySpec, WriteOp};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, Put, TransactWriteItem};
use aws_sdk_dynamodb::Client;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub struct DynamoStore {
    client: Client,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub async fn from_env(table_name: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(Client::new(&config), table_name)
    }
}

fn value_to_av(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(arr) => AttributeValue::L(arr.iter().map(value_to_av).collect()),
        Value::Object(obj) => {
            let mut map = HashMap::new();
            for (k, v) in obj {
                map.insert(k.clone(), value_to_av(v));
            }
            AttributeValue::M(map)
        }
    }
}

fn av_to_value(av: &AttributeValue) -> Value {
    match av {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => serde_json::Number::from_f64(n.parse().unwrap_or(0.0))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::L(list) => Value::Array(list.iter().map(av_to_value).collect()),
        AttributeValue::M(map) => {
            let mut obj = Map::new();
            for (k, v) in map {
                obj.insert(k.clone(), av_to_value(v));
            }
            Value::Object(obj)
        }
        _ => Value::Null,
    }
}

fn item_to_av_map(item: &Item) -> HashMap<String, AttributeValue> {
    let mut map = HashMap::new();
    map.insert("pk".to_string(), AttributeValue::S(item.pk.clone()));
    map.insert("sk".to_string(), AttributeValue::S(item.sk.clone()));
    if let Some(lsi1) = &item.lsi1_sk {
        map.insert("lsi1_sk".to_string(), AttributeValue::S(lsi1.clone()));
    }
    for (k, v) in &item.attributes {
        map.insert(k.clone(), value_to_av(v));
    }
    map
}

fn av_map_to_item(map: &HashMap<String, AttributeValue>) -> Item {
    let pk = map
        .get("pk")
        .and_then(|v| v.as_s().ok())
        .cloned()
        .unwrap_or_default();
    let sk = map
        .get("sk")
        .and_then(|v| v.as_s().ok())
        .cloned()
        .unwrap_or_default();
    let lsi1_sk = map.get("lsi1_sk").and_then(|v| v.as_s().ok()).cloned();

    let mut attributes = Map::new();
    for (k, v) in map {
        if k == "pk" || k == "sk" || k == "lsi1_sk" {
            continue;
        }
        attributes.insert(k.clone(), av_to_value(v));
    }

    Item {
        pk,
        sk,
        lsi1_sk,
        attributes,
    }
}

#[async_trait]
impl KvStore for DynamoStore {
    async fn get_item(&self, pk: &str, sk: &str) -> Result<Option<Item>> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("pk", AttributeValue::S(pk.to_string()))
            .key("sk", AttributeValue::S(sk.to_string()))
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(resp.item().map(av_map_to_item))
    }

    async fn put_item(&self, item: Item) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item_to_av_map(&item)))
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut items = Vec::with_capacity(ops.len());
        for op in ops {
            let entry = match op {
                WriteOp::Put(item) => TransactWriteItem::builder()
                    .put(
                        Put::builder()
                            .table_name(&self.table_name)
                            .set_item(Some(item_to_av_map(&item)))
                            .build()
                            .map_err(|e| StoreError::Backend(e.to_string()))?,
                    )
                    .build(),
                WriteOp::PutIfAbsent(item) => TransactWriteItem::builder()
                    .put(
                        Put::builder()
                            .table_name(&self.table_name)
                            .set_item(Some(item_to_av_map(&item)))
                            .condition_expression("attribute_not_exists(pk)")
                            .build()
                            .map_err(|e| StoreError::Backend(e.to_string()))?,
                    )
                    .build(),
                WriteOp::Delete { pk, sk } => TransactWriteItem::builder()
                    .delete(
                        aws_sdk_dynamodb::types::Delete::builder()
                            .table_name(&self.table_name)
                            .key("pk", AttributeValue::S(pk))
                            .key("sk", AttributeValue::S(sk))
                            .build()
                            .map_err(|e| StoreError::Backend(e.to_string()))?,
                    )
                    .build(),
            };
            items.push(entry);
        }

        self.client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("ConditionalCheckFailed") {
                    StoreError::ConditionFailed(e.to_string())
                } else {
                    StoreError::Backend(e.to_string())
                }
            })?;
        Ok(())
    }

    async fn query(&self, pk: &str, spec: QuerySpec) -> Result<Page> {
        let mut request = self
            .client
            .query()
            .table_name(&self.table_name)
            .scan_index_forward(spec.ascending)
            .expression_attribute_values(":pk", AttributeValue::S(pk.to_string()));

        let key_condition = if let Some(prefix) = &spec.sk_prefix {
            request = request
                .expression_attribute_values(":sk_prefix", AttributeValue::S(prefix.clone()));
            "pk = :pk and begins_with(sk, :sk_prefix)"
        } else {
            "pk = :pk"
        };
        request = request.key_condition_expression(key_condition);

        if let Some(limit) = spec.limit {
            request = request.limit(limit as i32);
        }
        if let Some(start) = &spec.start_key {
            let mut exclusive_start = HashMap::new();
            exclusive_start.insert("pk".to_string(), AttributeValue::S(pk.to_string()));
            exclusive_start.insert("sk".to_string(), AttributeValue::S(start.clone()));
            request = request.set_exclusive_start_key(Some(exclusive_start));
        }

        let resp = request
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let items = resp
            .items()
            .iter()
            .map(av_map_to_item)
            .collect::<Vec<_>>();
        let next_start_key = resp
            .last_evaluated_key()
            .and_then(|k| k.get("sk"))
            .and_then(|v| v.as_s().ok())
            .cloned();

        Ok(Page {
            items,
            next_start_key,
        })
    }

    async fn query_lsi1(&self, pk: &str, spec: QuerySpec) -> Result<Page> {
        let mut request = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name("LSI1")
            .scan_index_forward(spec.ascending)
            .expression_attribute_values(":pk", AttributeValue::S(pk.to_string()));

        let key_condition = if let Some(prefix) = &spec.sk_prefix {
            request = request
                .expression_attribute_values(":lsi1_prefix", AttributeValue::S(prefix.clone()));
            "pk = :pk and begins_with(lsi1_sk, :lsi1_prefix)"
        } else {
            "pk = :pk"
        };
        request = request.key_condition_expression(key_condition);

        if let Some(limit) = spec.limit {
            request = request.limit(limit as i32);
        }
        // A local secondary index shares the base table's partition key, so
        // resuming a query needs the full primary key (pk, sk) *and* the
        // index's sort key (lsi1_sk), not lsi1_sk alone. We round-trip that
        // triple through `start_key` as `sk\x1Flsi1_sk` (pk is already a
        // query parameter).
        if let Some(start) = &spec.start_key {
            if let Some((sk, lsi1_sk)) = start.split_once('\u{1F}') {
                let mut exclusive_start = HashMap::new();
                exclusive_start.insert("pk".to_string(), AttributeValue::S(pk.to_string()));
                exclusive_start.insert("sk".to_string(), AttributeValue::S(sk.to_string()));
                exclusive_start.insert("lsi1_sk".to_string(), AttributeValue::S(lsi1_sk.to_string()));
                request = request.set_exclusive_start_key(Some(exclusive_start));
            }
        }

        let resp = request
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let items = resp
            .items()
            .iter()
            .map(av_map_to_item)
            .collect::<Vec<_>>();
        let next_start_key = resp.last_evaluated_key().and_then(|k| {
            let sk = k.get("sk").and_then(|v| v.as_s().ok())?;
            let lsi1_sk = k.get("lsi1_sk").and_then(|v| v.as_s().ok())?;
            Some(format!("{sk}\u{1F}{lsi1_sk}"))
        });

        Ok(Page {
            items,
            next_start_key,
        })
    }

    async fn delete_item(&self, pk: &str, sk: &str) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("pk", AttributeValue::S(pk.to_string()))
            .key("sk", AttributeValue::S(sk.to_string()))
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn increment(&self, pk: &str, sk: &str, field: &str, delta: i64) -> Result<i64> {
        let resp = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("pk", AttributeValue::S(pk.to_string()))
            .key("sk", AttributeValue::S(sk.to_string()))
            .update_expression("ADD #f :delta")
            .expression_attribute_names("#f", field)
            .expression_attribute_values(":delta", AttributeValue::N(delta.to_string()))
            .return_values(aws_sdk_dynamodb::types::ReturnValue::UpdatedNew)
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let value = resp
            .attributes()
            .and_then(|attrs| attrs.get(field))
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse::<i64>().ok())
            .unwrap_or(0);
        Ok(value)
    }
}
