//! Shared helpers for integration tests.
#![allow(dead_code)]

use serde_json::{json, Value};

/// Install a fmt subscriber once so `RUST_LOG=debug` surfaces crate
/// diagnostics during test runs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn order(id: &str, symbol: &str, qty: u64) -> Value {
    json!({"id": id, "symbol": symbol, "qty": qty})
}

pub fn fill(id: &str, order_id: &str, px: f64) -> Value {
    json!({"id": id, "order": order_id, "px": px})
}
