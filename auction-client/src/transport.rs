//! Connection plumbing shared by the registry and the terminal.
//!
//! A [`Dialer`] opens a [`Link`] to an auction server. The read half of every
//! link is drained by a small task, the line pump, which forwards each line to
//! the event loop over a channel. Standard input is read the same way from a
//! dedicated thread. The event loop stays the only place where auction state
//! is touched.

use std::{
    future::Future,
    io::{self, BufRead},
    thread,
};

use tokio::{
    io::{AsyncBufRead, AsyncWrite, BufReader},
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
};
use tracing::debug;

use crate::{
    error::{DecodeError, FrameError},
    message::{LINE_ENDINGS, read_line},
};

pub type BoxedReader = Box<dyn AsyncBufRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Both halves of a freshly opened server connection.
pub struct Link {
    pub peer: String,
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
}

impl Link {
    pub fn new<R, W>(peer: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            peer: peer.into(),
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

/// Opens connections to auction servers.
pub trait Dialer {
    fn dial(&self, host: &str, port: u16) -> impl Future<Output = io::Result<Link>> + Send;
}

/// Dials real servers over TCP. Host names are resolved by tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    async fn dial(&self, host: &str, port: u16) -> io::Result<Link> {
        let stream = TcpStream::connect((host, port)).await?;
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| format!("{host}:{port}"));
        let (reader, writer) = stream.into_split();
        Ok(Link::new(peer, BufReader::new(reader), writer))
    }
}

/// What a line pump observed on its stream.
#[derive(Debug)]
pub enum LineEvent {
    Line(String),
    /// The peer closed the stream.
    Eof,
    Failed(io::Error),
    /// The bytes that arrived are not a server message.
    Malformed(DecodeError),
}

/// Spawns a task that forwards every frame from `reader` to `tx`.
///
/// `wrap` tags each event for the receiving side. The task ends after
/// forwarding `Eof`, `Failed` or `Malformed`, or as soon as the receiver is
/// gone.
pub fn spawn_line_pump<R, T, F>(
    mut reader: R,
    tx: mpsc::UnboundedSender<T>,
    wrap: F,
) -> JoinHandle<()>
where
    R: AsyncBufRead + Send + Unpin + 'static,
    T: Send + 'static,
    F: Fn(LineEvent) -> T + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let (event, done) = match read_line(&mut reader).await {
                Ok(Some(line)) => (LineEvent::Line(line), false),
                Ok(None) => (LineEvent::Eof, true),
                Err(FrameError::Io(err)) => (LineEvent::Failed(err), true),
                Err(FrameError::Malformed(err)) => (LineEvent::Malformed(err), true),
            };
            if tx.send(wrap(event)).is_err() {
                debug!("line pump receiver dropped");
                break;
            }
            if done {
                break;
            }
        }
    })
}

/// Reads standard input on a dedicated thread and forwards each line to `tx`.
///
/// The blocking read lives outside the runtime so a pending read never holds
/// up process exit.
pub fn spawn_stdin_pump(tx: mpsc::UnboundedSender<LineEvent>) -> io::Result<()> {
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let mut stdin = io::stdin().lock();
            let mut line = String::new();
            loop {
                line.clear();
                let event = match stdin.read_line(&mut line) {
                    Ok(0) => LineEvent::Eof,
                    Ok(_) => LineEvent::Line(line.trim_end_matches(LINE_ENDINGS).to_string()),
                    Err(err) => LineEvent::Failed(err),
                };
                let done = !matches!(event, LineEvent::Line(_));
                if tx.send(event).is_err() || done {
                    break;
                }
            }
        })
        .map(|_| ())
}
