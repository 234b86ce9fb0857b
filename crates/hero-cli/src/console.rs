//! A gateway for local testing: every stdin line is a chat message, every
//! send is printed to stdout.

use std::sync::Arc;

use async_trait::async_trait;
use hero::core::{
    Author, ConnectionMonitor, EventSink, Gateway, GatewayError, GatewayEvent, GatewayResult,
    MessagePayload, OutgoingMessage,
};
use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Channel every console message is posted in.
pub const CONSOLE_CHANNEL: u64 = 1;
/// Guild the console channel belongs to, so guild-only commands work.
pub const CONSOLE_GUILD: u64 = 1;

type Input = Box<dyn AsyncBufRead + Send + Unpin>;
type Output = Box<dyn AsyncWrite + Send + Unpin>;

pub struct ConsoleGateway {
    author_id: u64,
    input: Mutex<Option<Input>>,
    output: tokio::sync::Mutex<Output>,
    reader: Mutex<Option<JoinHandle<()>>>,
    monitor: Mutex<Option<ConnectionMonitor>>,
    eof: CancellationToken,
}

impl ConsoleGateway {
    /// Reads stdin and writes stdout; messages are authored by `author_id`.
    pub fn stdio(author_id: u64) -> Arc<Self> {
        Self::new(
            author_id,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
    }

    pub fn new<R, W>(author_id: u64, input: R, output: W) -> Arc<Self>
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Arc::new(Self {
            author_id,
            input: Mutex::new(Some(Box::new(input))),
            output: tokio::sync::Mutex::new(Box::new(output)),
            reader: Mutex::new(None),
            monitor: Mutex::new(None),
            eof: CancellationToken::new(),
        })
    }

    /// Resolves once the input has reached end of file.
    pub async fn input_closed(&self) {
        self.eof.cancelled().await;
    }
}

fn console_message(id: u64, author_id: u64, content: &str) -> MessagePayload {
    MessagePayload {
        id,
        author: Author {
            id: author_id,
            name: "console".to_string(),
            bot: false,
        },
        channel_id: CONSOLE_CHANNEL,
        guild_id: Some(CONSOLE_GUILD),
        content: content.to_string(),
    }
}

#[async_trait]
impl Gateway for ConsoleGateway {
    fn name(&self) -> &str {
        "console"
    }

    async fn connect(
        self: Arc<Self>,
        sink: EventSink,
        monitor: ConnectionMonitor,
    ) -> GatewayResult<()> {
        let Some(input) = self.input.lock().take() else {
            return Err(GatewayError::Connect(
                "console input is already in use".to_string(),
            ));
        };

        let author_id = self.author_id;
        let eof = self.eof.clone();
        let handle = tokio::spawn(async move {
            let mut lines = input.lines();
            let mut next_id = 1;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let message = console_message(next_id, author_id, line);
                        if sink.emit(GatewayEvent::message(&message)).is_err() {
                            break;
                        }
                        next_id += 1;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Failed to read console input");
                        break;
                    }
                }
            }
            debug!("Console input closed");
            eof.cancel();
        });

        *self.reader.lock() = Some(handle);
        monitor.mark_ready();
        *self.monitor.lock() = Some(monitor);
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> GatewayResult<()> {
        let mut output = self.output.lock().await;
        let line = format!("{}\n", message.content);
        output
            .write_all(line.as_bytes())
            .await
            .map_err(|e| GatewayError::send(e.to_string()))?;
        output
            .flush()
            .await
            .map_err(|e| GatewayError::send(e.to_string()))
    }

    async fn close(&self) -> GatewayResult<()> {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        if let Some(monitor) = self.monitor.lock().take() {
            monitor.mark_closed();
        }
        Ok(())
    }
}
