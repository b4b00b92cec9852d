use crate::metrics::Metrics;
use crate::models::ConsoleCommand;
use crate::state::LifecycleMonitor;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::ChildStdin;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::timeout;

/// Size of a single read from the engine's output pipe
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Errors that can occur when talking to the running quest
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("no quest is running")]
    NotRunning,

    #[error("failed to write console command: {0}")]
    Io(#[from] std::io::Error),
}

/// Splits a byte stream into text lines.
///
/// Bytes accumulate until `\n`; the line is then emitted without its
/// terminator (and without a trailing `\r`). Decoding happens per complete
/// line, so a multi-byte character split across two reads is never mangled.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completed, in order
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = bytes;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            lines.push(self.take_line());
            rest = &rest[pos + 1..];
        }
        self.pending.extend_from_slice(rest);

        lines
    }

    /// Number of buffered bytes still waiting for a terminator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Flush an unterminated tail at end of stream
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn take_line(&mut self) -> String {
        if self.pending.last() == Some(&b'\r') {
            self.pending.pop();
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}

/// Drain `reader` to end of stream, handing each line to `sink`.
///
/// Read errors (a broken pipe when the engine dies) end the stream like EOF;
/// the lifecycle monitor reports the exit. Returns the number of lines seen.
pub async fn pump_lines<R, F>(mut reader: R, mut sink: F) -> usize
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut framer = LineFramer::new();
    let mut buffer = vec![0u8; READ_CHUNK_SIZE];
    let mut count = 0;

    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                for line in framer.push(&buffer[..n]) {
                    sink(line);
                    count += 1;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!("Output stream closed with error: {}", e);
                break;
            }
        }
    }

    if let Some(tail) = framer.finish() {
        sink(tail);
        count += 1;
    }

    count
}

/// Write one command and its terminator, then flush.
pub async fn write_command<W>(writer: &mut W, command: &ConsoleCommand) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&command.to_wire()).await?;
    writer.flush().await
}

/// Write side of the running quest's standard input.
///
/// Writes are serialized by an async mutex. [`close`](Self::close) cancels a
/// write parked on a full pipe, so teardown never waits on the quest reading
/// its input.
#[derive(Clone)]
pub struct ConsoleInput {
    writer: Arc<Mutex<Option<ChildStdin>>>,
    closed: Arc<watch::Sender<bool>>,
}

impl ConsoleInput {
    pub(crate) fn new(stdin: Option<ChildStdin>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            writer: Arc::new(Mutex::new(stdin)),
            closed: Arc::new(closed),
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Write one command; [`ConsoleError::NotRunning`] once the input is closed
    pub(crate) async fn write(&self, command: &ConsoleCommand) -> Result<(), ConsoleError> {
        let mut closed_rx = self.closed.subscribe();
        tokio::select! {
            biased;
            _ = input_closed(&mut closed_rx) => Err(ConsoleError::NotRunning),
            result = self.write_locked(command) => result,
        }
    }

    async fn write_locked(&self, command: &ConsoleCommand) -> Result<(), ConsoleError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ConsoleError::NotRunning)?;

        match write_command(writer, command).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::debug!("Quest closed its input, dropping console writer");
                guard.take();
                Err(ConsoleError::NotRunning)
            }
            Err(e) => Err(ConsoleError::Io(e)),
        }
    }

    /// Close the input, cancelling any write in flight.
    ///
    /// Returns `false` if the writer could not be reclaimed within `grace`.
    pub(crate) async fn close(&self, grace: Duration) -> bool {
        self.closed.send_replace(true);
        match timeout(grace, self.writer.lock()).await {
            Ok(mut guard) => {
                guard.take();
                true
            }
            Err(_) => false,
        }
    }
}

async fn input_closed(closed_rx: &mut watch::Receiver<bool>) {
    loop {
        if *closed_rx.borrow_and_update() {
            return;
        }
        if closed_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Lines printed by the running quest.
///
/// One `ConsoleOutput` exists per run; it yields lines in emission order and
/// returns `None` for good once the process is gone and its output drained.
#[derive(Debug)]
pub struct ConsoleOutput {
    rx: mpsc::UnboundedReceiver<String>,
}

impl ConsoleOutput {
    pub(crate) fn channel() -> (mpsc::UnboundedSender<String>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Wait for the next line; `None` once the stream has ended
    pub async fn next_line(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Take a line if one is already buffered
    pub fn try_next_line(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Read every remaining line until the stream ends
    pub async fn collect_remaining(mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.rx.recv().await {
            lines.push(line);
        }
        lines
    }
}

/// Sends console commands to the quest currently supervised by a
/// [`LifecycleMonitor`].
///
/// The bridge holds no process resources of its own; every write goes
/// through the monitor's [`ConsoleInput`].
#[derive(Clone)]
pub struct ConsoleBridge {
    monitor: LifecycleMonitor,
    metrics: Arc<Metrics>,
}

impl ConsoleBridge {
    pub fn new(monitor: LifecycleMonitor, metrics: Arc<Metrics>) -> Self {
        Self { monitor, metrics }
    }

    /// Send one line of script to the running quest.
    ///
    /// Fails with [`ConsoleError::NotRunning`] when no quest is running or
    /// the quest has closed its input.
    pub async fn send(&self, command: impl Into<ConsoleCommand>) -> Result<(), ConsoleError> {
        let command = command.into();
        let input = self.monitor.console_input().ok_or(ConsoleError::NotRunning)?;

        input.write(&command).await?;

        tracing::debug!("Console command sent: {}", command.text());
        self.metrics.record_command_sent();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_framer_single_chunk() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"one\ntwo\n");
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(framer.pending_len(), 0);
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_framer_partial_lines() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"hel").is_empty());
        assert_eq!(framer.pending_len(), 3);
        assert_eq!(framer.push(b"lo\nwor"), vec!["hello"]);
        assert_eq!(framer.push(b"ld\n"), vec!["world"]);
    }

    #[test]
    fn test_framer_crlf_and_empty_lines() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"a\r\n\nb\r"), vec!["a", ""]);
        assert_eq!(framer.push(b"\n"), vec!["b"]);
    }

    #[test]
    fn test_framer_split_utf8() {
        let text = "héros\n".as_bytes();
        let mut framer = LineFramer::new();
        // Split inside the two-byte 'é'
        assert!(framer.push(&text[..2]).is_empty());
        assert_eq!(framer.push(&text[2..]), vec!["héros"]);
    }

    #[test]
    fn test_framer_every_split_point() {
        let text = b"first line\nsecond\r\n\nfourth\n";
        for split in 0..=text.len() {
            let mut framer = LineFramer::new();
            let mut lines = framer.push(&text[..split]);
            lines.extend(framer.push(&text[split..]));
            assert_eq!(lines, vec!["first line", "second", "", "fourth"], "split at {}", split);
        }
    }

    #[test]
    fn test_framer_flushes_tail() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"no newline").is_empty());
        assert_eq!(framer.finish(), Some("no newline".to_string()));
        assert_eq!(framer.finish(), None);
    }

    #[tokio::test]
    async fn test_pump_lines_across_reads() {
        let reader = Builder::new()
            .read(b"> hel")
            .read(b"lo\n> wor")
            .read(b"ld\n")
            .read(b"> !\n")
            .build();

        let mut lines = Vec::new();
        let count = pump_lines(reader, |line| lines.push(line)).await;

        assert_eq!(count, 3);
        assert_eq!(lines, vec!["> hello", "> world", "> !"]);
    }

    #[tokio::test]
    async fn test_pump_lines_stops_on_read_error() {
        let reader = Builder::new()
            .read(b"ok\npart")
            .read_error(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
            .build();

        let mut lines = Vec::new();
        pump_lines(reader, |line| lines.push(line)).await;

        assert_eq!(lines, vec!["ok", "part"]);
    }

    #[tokio::test]
    async fn test_write_command_order() {
        let mut writer = Builder::new()
            .write(b"print(1)\n")
            .write(b"print(2)\n")
            .build();

        write_command(&mut writer, &ConsoleCommand::new("print(1)")).await.unwrap();
        write_command(&mut writer, &ConsoleCommand::new("print(2)\n")).await.unwrap();
    }

    #[tokio::test]
    async fn test_console_output_ends() {
        let (tx, mut output) = ConsoleOutput::channel();
        tx.send("a".to_string()).unwrap();
        tx.send("b".to_string()).unwrap();
        drop(tx);

        assert_eq!(output.next_line().await.as_deref(), Some("a"));
        assert_eq!(output.collect_remaining().await, vec!["b"]);
    }

    #[tokio::test]
    async fn test_send_without_quest() {
        let bridge = ConsoleBridge::new(LifecycleMonitor::default(), Arc::new(Metrics::new()));
        let result = bridge.send("sol.main.exit()").await;
        assert!(matches!(result, Err(ConsoleError::NotRunning)));
    }

    #[tokio::test]
    async fn test_closed_input_refuses_writes() {
        let input = ConsoleInput::new(None);
        assert!(!input.is_closed());

        assert!(input.close(Duration::from_millis(50)).await);
        assert!(input.is_closed());

        let result = input.write(&ConsoleCommand::new("print('late')")).await;
        assert!(matches!(result, Err(ConsoleError::NotRunning)));
    }
}
