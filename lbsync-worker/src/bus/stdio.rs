//! Line-oriented stdin/stdout transport.
//!
//! Each non-empty stdin line is one raw payload on the subscribed subject.
//! Published messages are written to stdout as `<subject> <payload>` lines.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::sync::Mutex;
use tokio_stream::wrappers::SplitStream;
use tokio_stream::StreamExt;
use tracing::warn;

use super::{BusError, Message, MessageBus, MessageStream};

pub struct StdioBus {
    stdout: Mutex<Stdout>,
}

impl Default for StdioBus {
    fn default() -> Self {
        Self::new()
    }
}

impl StdioBus {
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }
}

/// Strip a trailing carriage return; `None` for blank lines.
fn trim_line(mut line: Vec<u8>) -> Option<Vec<u8>> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    Some(line)
}

/// Split `reader` into messages on `subject`. The stream ends at end of
/// input or at the first read error.
fn line_stream<R>(reader: R, subject: String) -> MessageStream
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let lines = SplitStream::new(reader.split(b'\n'));
    Box::pin(
        lines
            .map_while(|line| match line {
                Ok(line) => Some(line),
                Err(e) => {
                    warn!("Failed to read input, closing subscription: {}", e);
                    None
                }
            })
            .filter_map(move |line| {
                trim_line(line).map(|payload| Message {
                    subject: subject.clone(),
                    payload,
                })
            }),
    )
}

#[async_trait]
impl MessageBus for StdioBus {
    async fn subscribe(&self, subject: &str) -> Result<MessageStream, BusError> {
        Ok(line_stream(
            BufReader::new(tokio::io::stdin()),
            subject.to_string(),
        ))
    }

    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), BusError> {
        let mut line = Vec::with_capacity(subject.len() + payload.len() + 2);
        line.extend_from_slice(subject.as_bytes());
        line.push(b' ');
        line.extend_from_slice(payload);
        line.push(b'\n');

        let mut stdout = self.stdout.lock().await;
        stdout.write_all(&line).await?;
        stdout.flush().await?;
        Ok(())
    }
}
