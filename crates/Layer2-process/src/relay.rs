//! Output relay - turns raw child output into messages

use crate::message::{Message, MessageKind};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::trace;

/// Byte sink that converts every write into one message on `out`
#[derive(Debug, Clone)]
pub struct MessageWriter {
    id: String,
    kind: MessageKind,
    out: mpsc::Sender<Message>,
}

impl MessageWriter {
    pub fn new(id: impl Into<String>, kind: MessageKind, out: mpsc::Sender<Message>) -> Self {
        Self {
            id: id.into(),
            kind,
            out,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Send `bytes` as a single message. Always reports the full length.
    ///
    /// Waits while the destination is full. If the destination has been
    /// closed the chunk is discarded.
    pub async fn write(&self, bytes: &[u8]) -> io::Result<usize> {
        let msg = Message::new(
            self.id.clone(),
            self.kind,
            String::from_utf8_lossy(bytes).into_owned(),
        );
        if self.out.send(msg).await.is_err() {
            trace!("{} output of {} discarded, receiver closed", self.kind, self.id);
        }
        Ok(bytes.len())
    }

    /// Copy `reader` to the destination until EOF, one message per read
    pub async fn pump<R>(&self, mut reader: R, buffer_size: usize) -> io::Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; buffer_size.max(1)];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            total += self.write(&buf[..n]).await? as u64;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_one_write_one_message() {
        let (tx, mut rx) = mpsc::channel(8);
        let writer = MessageWriter::new("4", MessageKind::Stdout, tx);

        let n = writer.write(b"line one\nline two\n").await.unwrap();
        assert_eq!(n, 18);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.id, "4");
        assert_eq!(msg.kind, MessageKind::Stdout);
        assert_eq!(msg.body, "line one\nline two\n");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_write_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let writer = MessageWriter::new("4", MessageKind::Stderr, tx);

        assert_eq!(writer.write(b"lost").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_pump_chunks_in_order() {
        let (tx, mut rx) = mpsc::channel(16);
        let writer = MessageWriter::new("9", MessageKind::Stderr, tx);

        let total = writer.pump(&b"abcdefghij"[..], 4).await.unwrap();
        assert_eq!(total, 10);
        drop(writer);

        let mut bodies = Vec::new();
        while let Some(msg) = rx.recv().await {
            assert_eq!(msg.kind, MessageKind::Stderr);
            bodies.push(msg.body);
        }
        assert_eq!(bodies.concat(), "abcdefghij");
        assert!(bodies.iter().all(|b| b.len() <= 4));
    }
}
