//! Cost & Token Ledger (spec.md §4.C): per-`(session, model)` running token
//! counters, rolled up into a USD estimate via the static price table.

use crate::error::Result;
use crate::kv::{Item, KvStore, QuerySpec};
use crate::prices::cost_usd;
use std::sync::Arc;
use swe_core::{SessionKey, Usage};

fn session_pk(key: &SessionKey) -> String {
    format!("SESSION#{}", key.as_str())
}

fn ledger_sk(model: &str) -> String {
    format!("LEDGER#{model}")
}

#[derive(Clone, Debug, Default)]
pub struct LedgerEntry {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
}

impl LedgerEntry {
    pub fn cost_usd(&self) -> Option<f64> {
        cost_usd(
            &self.model,
            self.input_tokens,
            self.output_tokens,
            self.cache_read_tokens,
            self.cache_write_tokens,
        )
    }
}

fn item_to_entry(item: &Item) -> LedgerEntry {
    let model = item
        .sk
        .strip_prefix("LEDGER#")
        .unwrap_or(&item.sk)
        .to_string();
    LedgerEntry {
        model,
        input_tokens: item.get("inputTokens").and_then(|v| v.as_u64()).unwrap_or(0),
        output_tokens: item.get("outputTokens").and_then(|v| v.as_u64()).unwrap_or(0),
        cache_read_tokens: item
            .get("cacheReadTokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        cache_write_tokens: item
            .get("cacheWriteTokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
    }
}

pub struct CostLedger {
    kv: Arc<dyn KvStore>,
}

impl CostLedger {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Adds one provider call's usage to the session/model running counters.
    pub async fn record_usage(
        &self,
        session: &SessionKey,
        model: &str,
        usage: &Usage,
    ) -> Result<()> {
        let pk = session_pk(session);
        let sk = ledger_sk(model);
        self.kv
            .increment(&pk, &sk, "inputTokens", usage.input_tokens as i64)
            .await?;
        self.kv
            .increment(&pk, &sk, "outputTokens", usage.output_tokens as i64)
            .await?;
        self.kv
            .increment(
                &pk,
                &sk,
                "cacheReadTokens",
                usage.cache_read_input_tokens as i64,
            )
            .await?;
        self.kv
            .increment(
                &pk,
                &sk,
                "cacheWriteTokens",
                usage.cache_write_input_tokens as i64,
            )
            .await?;
        Ok(())
    }

    /// Per-model ledger entries for a session.
    pub async fn entries(&self, session: &SessionKey) -> Result<Vec<LedgerEntry>> {
        let spec = QuerySpec {
            sk_prefix: Some("LEDGER#".to_string()),
            ascending: true,
            ..Default::default()
        };
        let page = self.kv.query(&session_pk(session), spec).await?;
        Ok(page.items.iter().map(item_to_entry).collect())
    }

    /// Total USD cost across every model used by the session, if every model
    /// involved has a price-table entry.
    pub async fn total_cost_usd(&self, session: &SessionKey) -> Result<Option<f64>> {
        let entries = self.entries(session).await?;
        let mut total = 0.0;
        for entry in &entries {
            match entry.cost_usd() {
                Some(cost) => total += cost,
                None => return Ok(None),
            }
        }
        Ok(Some(total))
    }
}
