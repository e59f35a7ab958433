//! Terminal Session Multiplexer
//!
//! Pumps bytes between the local terminal and a koko terminal channel.
//!
//! ```text
//!  local input ──reader task──┐
//!  channel frames ─reader task─┼──▶ event queue ──▶ coordinator ──▶ channel sink
//!  resize watch ──reader task──┘                       │
//!                                                      └──▶ local output
//! ```
//!
//! Readers only forward events; the coordinator is the single writer to both
//! the channel and the local output. There are no retries: any I/O failure
//! ends the session and is returned to the caller.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::TerminalError;
use super::protocol::{ChannelMessage, MessageType, TerminalGeometry};

/// Bytes read from the local terminal per read call
const INPUT_BUFFER_SIZE: usize = 8 * 1024;
/// Pending events between the readers and the coordinator
const EVENT_QUEUE_CAPACITY: usize = 256;

/// The local side of a session.
///
/// Raw mode is entered once the channel is up; dropping the returned guard
/// must restore the previous terminal mode.
pub trait LocalTerminal {
    type Input: AsyncRead + Unpin + Send + 'static;
    type Output: AsyncWrite + Unpin + Send;
    type RawMode: Send;

    fn enter_raw_mode(&mut self) -> Result<Self::RawMode, TerminalError>;

    fn size(&self) -> Result<TerminalGeometry, TerminalError>;

    fn into_io(self) -> TerminalIo<Self::Input, Self::Output>;
}

/// Streams handed over by a [`LocalTerminal`] for the steady state.
pub struct TerminalIo<I, O> {
    pub input: I,
    pub output: O,
    /// Latest terminal size; intermediate values may be skipped.
    pub resize: watch::Receiver<TerminalGeometry>,
}

#[derive(Debug)]
enum SessionEvent {
    Input(String),
    InputFailed(TerminalError),
    Remote(ChannelMessage),
    RemoteFailed(TerminalError),
    Resize(TerminalGeometry),
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Closed,
}

/// Run a terminal session to completion.
///
/// Waits for the server's CONNECT frame, adopts its id for every outgoing
/// frame, announces the local geometry with TERMINAL_INIT and then relays
/// until CLOSE (`Ok`) or the first I/O error. The sink is closed and the
/// terminal mode restored on every exit path.
pub async fn run_session<T, S, R>(terminal: T, mut sink: S, frames: R) -> Result<(), TerminalError>
where
    T: LocalTerminal,
    S: Sink<ChannelMessage, Error = TerminalError> + Unpin,
    R: Stream<Item = Result<ChannelMessage, TerminalError>> + Unpin + Send + 'static,
{
    let result = drive(terminal, &mut sink, frames).await;

    if let Err(e) = sink.close().await {
        debug!("Closing terminal channel failed: {}", e);
    }

    match &result {
        Ok(()) => info!("Terminal session closed by remote"),
        Err(e) => warn!("Terminal session ended: {}", e),
    }
    result
}

async fn drive<T, S, R>(mut terminal: T, sink: &mut S, mut frames: R) -> Result<(), TerminalError>
where
    T: LocalTerminal,
    S: Sink<ChannelMessage, Error = TerminalError> + Unpin,
    R: Stream<Item = Result<ChannelMessage, TerminalError>> + Unpin + Send + 'static,
{
    let connect = match frames.next().await {
        Some(frame) => frame?,
        None => return Err(TerminalError::ChannelClosed),
    };
    if connect.kind != MessageType::Connect {
        return Err(TerminalError::Protocol(format!(
            "expected CONNECT message, but got {:?}",
            connect.kind
        )));
    }
    let correlation_id = connect.id;
    info!("Terminal channel connected (id {})", correlation_id);

    let _raw_mode = terminal.enter_raw_mode()?;
    let geometry = terminal.size()?;
    sink.send(ChannelMessage::terminal_init(&correlation_id, geometry))
        .await?;
    debug!("Sent TERMINAL_INIT {}x{}", geometry.cols, geometry.rows);

    let TerminalIo {
        input,
        output,
        resize,
    } = terminal.into_io();

    let (events_tx, events) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let _readers = ReaderTasks(vec![
        tokio::spawn(forward_input(input, events_tx.clone())),
        tokio::spawn(forward_frames(frames, events_tx.clone())),
        tokio::spawn(forward_resizes(resize, events_tx)),
    ]);

    Multiplexer {
        correlation_id,
        sink,
        output,
        last_output_byte: None,
    }
    .run(events)
    .await
}

/// Aborts the reader tasks when the session ends, whichever way it ends.
struct ReaderTasks(Vec<JoinHandle<()>>);

impl Drop for ReaderTasks {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

struct Multiplexer<'a, S, O> {
    correlation_id: String,
    sink: &'a mut S,
    output: O,
    /// Final byte of the most recent non-empty TERMINAL_DATA payload
    last_output_byte: Option<u8>,
}

impl<S, O> Multiplexer<'_, S, O>
where
    S: Sink<ChannelMessage, Error = TerminalError> + Unpin,
    O: AsyncWrite + Unpin,
{
    async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) -> Result<(), TerminalError> {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Input(text) => {
                    self.send(ChannelMessage::terminal_data(&self.correlation_id, text))
                        .await?;
                }
                SessionEvent::Remote(frame) => {
                    if self.handle_frame(frame).await? == Flow::Closed {
                        return Ok(());
                    }
                }
                SessionEvent::Resize(geometry) => {
                    debug!("Terminal resized to {}x{}", geometry.cols, geometry.rows);
                    self.send(ChannelMessage::terminal_resize(&self.correlation_id, geometry))
                        .await?;
                }
                SessionEvent::InputFailed(e) | SessionEvent::RemoteFailed(e) => return Err(e),
            }
        }
        Err(TerminalError::ChannelClosed)
    }

    async fn handle_frame(&mut self, frame: ChannelMessage) -> Result<Flow, TerminalError> {
        match frame.kind {
            MessageType::TerminalData => {
                self.write_local(frame.data.as_bytes()).await?;
                if let Some(&last) = frame.data.as_bytes().last() {
                    self.last_output_byte = Some(last);
                }
            }
            MessageType::Close => {
                // Leave the local prompt on a fresh line. With no output seen
                // yet there is nothing to correct.
                if matches!(self.last_output_byte, Some(last) if last != b'\n') {
                    self.write_local(b"\r\n").await?;
                }
                return Ok(Flow::Closed);
            }
            MessageType::Ping => {
                self.send(frame).await?;
            }
            other => {
                debug!("Ignoring {:?} frame", other);
            }
        }
        Ok(Flow::Continue)
    }

    async fn send(&mut self, frame: ChannelMessage) -> Result<(), TerminalError> {
        self.sink.send(frame).await
    }

    async fn write_local(&mut self, bytes: &[u8]) -> Result<(), TerminalError> {
        self.output.write_all(bytes).await?;
        self.output.flush().await?;
        Ok(())
    }
}

async fn forward_input<I>(mut input: I, events: mpsc::Sender<SessionEvent>)
where
    I: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; INPUT_BUFFER_SIZE];
    let mut pending = Utf8Pending::default();

    loop {
        let event = match input.read(&mut buf).await {
            Ok(0) => SessionEvent::InputFailed(TerminalError::InputClosed),
            Ok(n) => match pending.push(&buf[..n]) {
                Some(text) => SessionEvent::Input(text),
                None => continue,
            },
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => SessionEvent::InputFailed(e.into()),
        };

        let last = matches!(event, SessionEvent::InputFailed(_));
        if events.send(event).await.is_err() || last {
            break;
        }
    }
    debug!("Local input reader stopped");
}

async fn forward_frames<R>(mut frames: R, events: mpsc::Sender<SessionEvent>)
where
    R: Stream<Item = Result<ChannelMessage, TerminalError>> + Unpin,
{
    loop {
        let event = match frames.next().await {
            Some(Ok(frame)) => SessionEvent::Remote(frame),
            Some(Err(e)) => SessionEvent::RemoteFailed(e),
            None => SessionEvent::RemoteFailed(TerminalError::ChannelClosed),
        };

        let last = !matches!(event, SessionEvent::Remote(_));
        if events.send(event).await.is_err() || last {
            break;
        }
    }
    debug!("Channel reader stopped");
}

async fn forward_resizes(
    mut resize: watch::Receiver<TerminalGeometry>,
    events: mpsc::Sender<SessionEvent>,
) {
    // A closed resize source only means no further resizes
    while resize.changed().await.is_ok() {
        let geometry = *resize.borrow_and_update();
        if events.send(SessionEvent::Resize(geometry)).await.is_err() {
            break;
        }
    }
}

/// Holds back the tail of a UTF-8 character split across reads.
#[derive(Default)]
struct Utf8Pending {
    bytes: Vec<u8>,
}

impl Utf8Pending {
    /// Append a chunk and return whatever is complete so far.
    ///
    /// Each invalid sequence becomes one U+FFFD. An unfinished character at
    /// the end stays buffered for the next chunk.
    fn push(&mut self, chunk: &[u8]) -> Option<String> {
        self.bytes.extend_from_slice(chunk);

        let mut text = String::new();
        let mut rest: &[u8] = &self.bytes;
        let consumed = loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break self.bytes.len();
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => break self.bytes.len() - after.len(),
                    }
                }
            }
        };
        self.bytes.drain(..consumed);

        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}
