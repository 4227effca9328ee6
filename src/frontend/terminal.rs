// ABOUTME: Line-oriented terminal front-end
// ABOUTME: Each input line is a message for the bot, replies are printed as "- <text>"

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;
use vacbot_core::{Frontend, FrontendError, Message};

/// Front-end reading messages from `R` and writing replies to `W`
pub struct TerminalFrontend<R, W> {
    lines: Mutex<Lines<R>>,
    output: Mutex<W>,
}

impl TerminalFrontend<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Front-end over the process' standard input and output
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> TerminalFrontend<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            lines: Mutex::new(input.lines()),
            output: Mutex::new(output),
        }
    }
}

#[async_trait]
impl<R, W> Frontend for TerminalFrontend<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Metadata = ();

    async fn await_next_message(&self) -> Result<Message, FrontendError> {
        let mut lines = self.lines.lock().await;
        match lines.next_line().await {
            Ok(Some(line)) => Ok(Message::text_only(line)),
            Ok(None) => Err(FrontendError::Closed),
            Err(e) => Err(FrontendError::with_source("Failed to read from terminal", e)),
        }
    }

    async fn is_message_for_bot(&self, _message: &Message) -> Result<bool, FrontendError> {
        Ok(true)
    }

    async fn send_message(&self, message: Message) -> Result<(), FrontendError> {
        let line = format!("- {}\n", message.text());
        let mut output = self.output.lock().await;
        output
            .write_all(line.as_bytes())
            .await
            .map_err(|e| FrontendError::with_source("Failed to write to terminal", e))?;
        output
            .flush()
            .await
            .map_err(|e| FrontendError::with_source("Failed to flush terminal", e))
    }

    async fn close(&self) -> Result<(), FrontendError> {
        self.output
            .lock()
            .await
            .flush()
            .await
            .map_err(|e| FrontendError::with_source("Failed to flush terminal", e))
    }
}
