//! Newline-delimited JSON host bridge over stdin/stdout.
//!
//! Each stdin line is one host message. Each message gets exactly one
//! acknowledgement line on stdout. Logs go to stderr, never stdout.

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use scorpion_chat::{BridgeOutcome, HostBridgeHandle};

#[derive(Debug, Serialize)]
struct Ack {
    #[serde(rename = "type")]
    kind: &'static str,
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<BridgeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Ack {
    fn outcome(outcome: BridgeOutcome) -> Self {
        Self {
            kind: "ACK",
            accepted: outcome.is_accepted(),
            outcome: Some(outcome),
            error: None,
        }
    }

    fn error(error: impl Into<String>) -> Self {
        Self {
            kind: "ACK",
            accepted: false,
            outcome: None,
            error: Some(error.into()),
        }
    }
}

/// Forward host lines from `reader` to the bridge until EOF.
pub async fn pump<R, W>(
    reader: R,
    mut writer: W,
    bridge: HostBridgeHandle,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let ack = match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(message) => match bridge.deliver(message).await {
                Ok(outcome) => Ack::outcome(outcome),
                Err(e) => {
                    tracing::error!(error = %e, "Host bridge unavailable");
                    Ack::error(e.to_string())
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Skipping host line that is not JSON");
                Ack::error(format!("invalid JSON: {}", e))
            }
        };

        let mut out = serde_json::to_vec(&ack)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
    }
    tracing::info!("Host closed stdin");
    Ok(())
}
