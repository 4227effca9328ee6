// ABOUTME: End-to-end tests running the dispatcher over the terminal front-end
// ABOUTME: Uses in-memory input and a shared output buffer with the canned responder

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use vacbot::frontend::TerminalFrontend;
use vacbot::responder::CannedResponder;
use vacbot_core::{
    Dispatcher, DispatcherConfig, DispatcherState, PoolConfig, ShutdownReport, ShutdownTimeouts,
};

/// Output sink the test can inspect while the front-end owns the writer
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn test_config() -> DispatcherConfig {
    DispatcherConfig::default()
        .with_pool(PoolConfig::new(2).with_max_queued_tasks(16))
        .with_shutdown_timeouts(ShutdownTimeouts {
            graceful_drain: Duration::from_secs(5),
            forced_cancel: Duration::from_secs(1),
        })
}

async fn wait_for_lines(output: &SharedBuffer, count: usize) {
    for _ in 0..200 {
        if output.lines().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} output lines, got {:?}", count, output.lines());
}

#[tokio::test]
async fn test_every_line_gets_a_reply() {
    let input: &'static [u8] = b"hello\nDo vaccines cause autism?\nbye\n";
    let output = SharedBuffer::default();
    let frontend = TerminalFrontend::new(BufReader::new(input), output.clone());
    let dispatcher = Dispatcher::new(frontend, CannedResponder::new().unwrap(), test_config());

    dispatcher.run().await.unwrap();
    let report = dispatcher.stop().await.unwrap();

    assert_eq!(report, ShutdownReport::Graceful);
    let lines = output.lines();
    assert_eq!(lines.len(), 3, "{:?}", lines);
    assert!(lines.iter().all(|line| line.starts_with("- ")));
}

#[tokio::test]
async fn test_blank_lines_are_not_answered() {
    let input: &'static [u8] = b"\n   \r\nhi\n";
    let output = SharedBuffer::default();
    let frontend = TerminalFrontend::new(BufReader::new(input), output.clone());
    let dispatcher = Dispatcher::new(frontend, CannedResponder::new().unwrap(), test_config());

    dispatcher.run().await.unwrap();
    dispatcher.stop().await.unwrap();

    assert_eq!(output.lines().len(), 1);
}

#[tokio::test]
async fn test_stop_while_input_is_open() {
    let (mut input_tx, input_rx) = tokio::io::duplex(1024);
    let output = SharedBuffer::default();
    let frontend = TerminalFrontend::new(BufReader::new(input_rx), output.clone());
    let dispatcher = Dispatcher::new(frontend, CannedResponder::new().unwrap(), test_config());

    input_tx.write_all(b"good morning\n").await.unwrap();

    let (run_result, outcome) = tokio::join!(dispatcher.run(), async {
        wait_for_lines(&output, 1).await;
        dispatcher.stop().await
    });

    run_result.unwrap();
    assert_eq!(outcome, Ok(ShutdownReport::Graceful));
    assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    assert!(output.lines()[0].starts_with("- "));
    drop(input_tx);
}
