//! Static per-model USD-per-million-token pricing (SPEC_FULL.md §2), used by
//! the Cost & Token Ledger rollup. Entries mirror the model ids in
//! `swe-llm`'s capability table; kept here rather than duplicated so the
//! ledger crate doesn't need a circular dependency on the LLM client.

#[derive(Clone, Copy, Debug)]
pub struct ModelPrice {
    pub model_id: &'static str,
    /// USD per million input tokens.
    pub input: f64,
    /// USD per million output tokens.
    pub output: f64,
    /// USD per million cache-read tokens.
    pub cache_read: f64,
    /// USD per million cache-write tokens.
    pub cache_write: f64,
}

pub const PRICE_TABLE: &[ModelPrice] = &[
    ModelPrice {
        model_id: "claude-opus-4",
        input: 15.0,
        output: 75.0,
        cache_read: 1.5,
        cache_write: 18.75,
    },
    ModelPrice {
        model_id: "claude-sonnet-4",
        input: 3.0,
        output: 15.0,
        cache_read: 0.3,
        cache_write: 3.75,
    },
    ModelPrice {
        model_id: "claude-haiku-4",
        input: 0.8,
        output: 4.0,
        cache_read: 0.08,
        cache_write: 1.0,
    },
];

pub fn price_for(model_id: &str) -> Option<&'static ModelPrice> {
    PRICE_TABLE.iter().find(|p| p.model_id == model_id)
}

/// USD cost for the given token counts, or `None` if the model has no
/// price-table entry (the rollup then reports tokens only).
pub fn cost_usd(
    model_id: &str,
    input_tokens: u64,
    output_tokens: u64,
    cache_read_tokens: u64,
    cache_write_tokens: u64,
) -> Option<f64> {
    let price = price_for(model_id)?;
    let million = 1_000_000.0;
    Some(
        (input_tokens as f64 / million) * price.input
            + (output_tokens as f64 / million) * price.output
            + (cache_read_tokens as f64 / million) * price.cache_read
            + (cache_write_tokens as f64 / million) * price.cache_write,
    )
}
