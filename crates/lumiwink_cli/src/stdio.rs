//! JSON-lines bus over stdin/stdout.
//!
//! Stand-in for the real pub/sub transport: one message per line,
//! `{"topic": "...", "payload": {...}}` in both directions.

use anyhow::Result;
use lumiwink_core::Outbound;
use lumiwink_orchestrator::Dispatcher;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

#[derive(Debug, Deserialize)]
struct InboundLine {
    topic: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct OutboundLine<'a> {
    topic: &'a str,
    payload: serde_json::Value,
}

/// Feed stdin lines to the dispatcher until EOF.
pub async fn pump_stdin(dispatcher: &Dispatcher) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<InboundLine>(line) {
            Ok(msg) => {
                let payload = msg.payload.to_string();
                dispatcher.handle(&msg.topic, payload.as_bytes()).await;
            }
            Err(e) => tracing::warn!("Skipping unreadable bus line: {}", e),
        }
    }
    Ok(())
}

/// Write outbound notices to stdout until every publisher is gone.
pub async fn drain_to_stdout(mut rx: mpsc::UnboundedReceiver<Outbound>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(msg) = rx.recv().await {
        let (topic, _) = Dispatcher::encode(&msg);
        let line = serde_json::to_string(&OutboundLine {
            topic,
            payload: msg.payload(),
        })?;
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}
