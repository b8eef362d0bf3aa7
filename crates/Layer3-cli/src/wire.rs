//! JSON lines transport over stdin/stdout

use playpen_process::Message;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Parse one input line. Blank lines and malformed JSON yield `None`.
pub fn decode(line: &str) -> Option<Message> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!("Skipping malformed command: {}", e);
            None
        }
    }
}

pub fn encode(msg: &Message) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

/// Forward commands read from `input` until EOF or the session goes away
pub async fn read_commands<R>(input: R, commands: mpsc::Sender<Message>) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let Some(msg) = decode(&line) else {
            continue;
        };
        debug!("Command {} for {}", msg.kind, msg.id);
        if commands.send(msg).await.is_err() {
            break;
        }
    }
    Ok(())
}

/// Write every message as one JSON line until the stream closes
pub async fn write_messages<W>(mut output: W, mut messages: mpsc::Receiver<Message>) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = messages.recv().await {
        output.write_all(encode(&msg)?.as_bytes()).await?;
        output.flush().await?;
    }
    Ok(())
}
