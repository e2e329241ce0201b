//! In-memory `KvStore`, backing tests and local/dev runs without AWS
//! credentials. Grounded in the teacher's `DashMap`-backed `SessionRegistry`.

use crate::error::{Result, StoreError};
use crate::kv::{Item, KvStore, Page, QuerySpec, WriteOp};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryStore {
    items: DashMap<(String, String), Item>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(&self, op: &WriteOp) -> Result<()> {
        match op {
            WriteOp::Put(item) => {
                self.items
                    .insert((item.pk.clone(), item.sk.clone()), item.clone());
                Ok(())
            }
            WriteOp::PutIfAbsent(item) => {
                let key = (item.pk.clone(), item.sk.clone());
                if self.items.contains_key(&key) {
                    return Err(StoreError::ConditionFailed(format!(
                        "item already exists: {}/{}",
                        item.pk, item.sk
                    )));
                }
                self.items.insert(key, item.clone());
                Ok(())
            }
            WriteOp::Delete { pk, sk } => {
                self.items.remove(&(pk.clone(), sk.clone()));
                Ok(())
            }
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get_item(&self, pk: &str, sk: &str) -> Result<Option<Item>> {
        Ok(self.items.get(&(pk.to_string(), sk.to_string())).map(|r| r.clone()))
    }

    async fn put_item(&self, item: Item) -> Result<()> {
        self.apply(&WriteOp::Put(item))
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<()> {
        for op in &ops {
            if let WriteOp::PutIfAbsent(item) = op {
                let key = (item.pk.clone(), item.sk.clone());
                if self.items.contains_key(&key) {
                    return Err(StoreError::ConditionFailed(format!(
                        "item already exists: {}/{}",
                        item.pk, item.sk
                    )));
                }
            }
        }
        for op in ops {
            self.apply(&op)?;
        }
        Ok(())
    }

    async fn query(&self, pk: &str, spec: QuerySpec) -> Result<Page> {
        let mut matched: Vec<Item> = self
            .items
            .iter()
            .filter(|e| e.key().0 == pk)
            .filter(|e| match &spec.sk_prefix {
                Some(prefix) => e.key().1.starts_with(prefix.as_str()),
                None => true,
            })
            .filter(|e| match &spec.start_key {
                Some(start) => {
                    if spec.ascending {
                        e.key().1.as_str() > start.as_str()
                    } else {
                        e.key().1.as_str() < start.as_str()
                    }
                }
                None => true,
            })
            .map(|e| e.value().clone())
            .collect();

        if spec.ascending {
            matched.sort_by(|a, b| a.sk.cmp(&b.sk));
        } else {
            matched.sort_by(|a, b| b.sk.cmp(&a.sk));
        }

        let next_start_key = if let Some(limit) = spec.limit {
            if matched.len() > limit {
                matched.truncate(limit);
                matched.last().map(|item| item.sk.clone())
            } else {
                None
            }
        } else {
            None
        };

        Ok(Page {
            items: matched,
            next_start_key,
        })
    }

    async fn query_lsi1(&self, pk: &str, spec: QuerySpec) -> Result<Page> {
        let mut matched: Vec<Item> = self
            .items
            .iter()
            .filter(|e| e.key().0 == pk)
            .filter(|e| e.value().lsi1_sk.is_some())
            .filter(|e| match &spec.sk_prefix {
                Some(prefix) => e
                    .value()
                    .lsi1_sk
                    .as_deref()
                    .map(|s| s.starts_with(prefix.as_str()))
                    .unwrap_or(false),
                None => true,
            })
            .filter(|e| match &spec.start_key {
                Some(start) => {
                    let lsi1 = e.value().lsi1_sk.as_deref().unwrap_or_default();
                    if spec.ascending {
                        lsi1 > start.as_str()
                    } else {
                        lsi1 < start.as_str()
                    }
                }
                None => true,
            })
            .map(|e| e.value().clone())
            .collect();

        matched.sort_by(|a, b| a.lsi1_sk.cmp(&b.lsi1_sk));
        if !spec.ascending {
            matched.reverse();
        }

        let next_start_key = if let Some(limit) = spec.limit {
            if matched.len() > limit {
                matched.truncate(limit);
                matched.last().and_then(|item| item.lsi1_sk.clone())
            } else {
                None
            }
        } else {
            None
        };

        Ok(Page {
            items: matched,
            next_start_key,
        })
    }

    async fn delete_item(&self, pk: &str, sk: &str) -> Result<()> {
        self.items.remove(&(pk.to_string(), sk.to_string()));
        Ok(())
    }

    async fn increment(&self, pk: &str, sk: &str, field: &str, delta: i64) -> Result<i64> {
        let mut entry = self
            .items
            .entry((pk.to_string(), sk.to_string()))
            .or_insert_with(|| Item::new(pk, sk));
        let current = entry
            .attributes
            .get(field)
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let next = current + delta;
        entry.attributes.insert(field.to_string(), (next).into());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = MemoryStore::new();
        let item = Item::new("SESSION#abc", "MSG#0001").set("role", "user");
        store.put_item(item.clone()).await.unwrap();
        let got = store.get_item("SESSION#abc", "MSG#0001").await.unwrap();
        assert_eq!(got, Some(item));
    }

    #[tokio::test]
    async fn conditional_put_fails_on_duplicate() {
        let store = MemoryStore::new();
        let item = Item::new("SESSION#abc", "MSG#0001");
        store
            .transact_write(vec![WriteOp::PutIfAbsent(item.clone())])
            .await
            .unwrap();
        let err = store
            .transact_write(vec![WriteOp::PutIfAbsent(item)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed(_)));
    }

    #[tokio::test]
    async fn query_filters_by_prefix_and_partition() {
        let store = MemoryStore::new();
        for i in 0..3 {
            store
                .put_item(Item::new("SESSION#abc", format!("MSG#{i:04}")))
                .await
                .unwrap();
        }
        store
            .put_item(Item::new("SESSION#other", "MSG#0000"))
            .await
            .unwrap();

        let page = store
            .query(
                "SESSION#abc",
                QuerySpec {
                    sk_prefix: Some("MSG#".to_string()),
                    ascending: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.items[0].sk, "MSG#0000");
    }
}
