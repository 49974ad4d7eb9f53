//! The coordinating loop of the client.
//!
//! One task owns the [`Registry`] and is the only code that mutates it. Lines
//! from standard input and from every auction connection reach it over
//! channels fed by line pumps; each iteration waits until at least one source
//! has something, then handles at most one terminal line followed by at most
//! one line per connection in ascending slot order. Lines that arrive together
//! are therefore always handled in the same order.

use std::{collections::VecDeque, io};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    select,
    sync::mpsc,
};
use tracing::{debug, info};

use crate::{
    command::Command,
    error::ClientError,
    message::{ServerUpdate, decode, write_line},
    registry::{DEFAULT_MAX_AUCTIONS, Inbound, Registry},
    transport::{Dialer, LineEvent},
};

pub const PROMPT: &str = "Enter new command: ";

pub const MENU: &str = "The following operations are available:
    show
    add <server address> <port number>
    bid <item index> <bid value>
    quit";

/// Settings for one client session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Number of registry slots.
    pub max_auctions: usize,
    /// Print [`PROMPT`] before every wait.
    pub prompt: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_auctions: DEFAULT_MAX_AUCTIONS,
            prompt: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Terminated,
}

pub struct EventLoop<D, O, E> {
    dialer: D,
    username: String,
    registry: Registry,
    input: mpsc::UnboundedReceiver<LineEvent>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    /// Lines received but not yet handled, one queue per slot.
    backlog: Vec<VecDeque<LineEvent>>,
    out: O,
    err: E,
    prompt: bool,
    state: LoopState,
}

impl<D, O, E> EventLoop<D, O, E>
where
    D: Dialer,
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    /// Builds a loop reading commands from `input` and writing to `out`/`err`.
    pub fn new(
        config: &ClientConfig,
        dialer: D,
        username: impl Into<String>,
        input: mpsc::UnboundedReceiver<LineEvent>,
        out: O,
        err: E,
    ) -> Self {
        let (registry, inbound) = Registry::new(config.max_auctions);
        Self {
            dialer,
            username: username.into(),
            registry,
            input,
            inbound,
            backlog: (0..config.max_auctions).map(|_| VecDeque::new()).collect(),
            out,
            err,
            prompt: config.prompt,
            state: LoopState::Running,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn out(&self) -> &O {
        &self.out
    }

    pub fn err(&self) -> &E {
        &self.err
    }

    /// Runs until `quit`, end of input, or a fatal error.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        while self.step().await? == LoopState::Running {}
        Ok(())
    }

    /// Performs one iteration. Any error closes every connection before it is returned.
    pub async fn step(&mut self) -> Result<LoopState, ClientError> {
        match self.iterate().await {
            Ok(state) => Ok(state),
            Err(err) => {
                self.shutdown().await;
                Err(err)
            }
        }
    }

    async fn iterate(&mut self) -> Result<LoopState, ClientError> {
        if self.state == LoopState::Terminated {
            return Ok(LoopState::Terminated);
        }
        if self.prompt {
            self.out.write_all(PROMPT.as_bytes()).await?;
            self.out.flush().await?;
        }

        if let Some(event) = self.wait_ready().await {
            self.handle_input(event).await?;
            if self.state == LoopState::Terminated {
                return Ok(LoopState::Terminated);
            }
        }

        for slot in 0..self.backlog.len() {
            if let Some(event) = self.backlog[slot].pop_front() {
                self.handle_server_event(slot, event).await?;
            }
        }

        Ok(self.state)
    }

    /// Suspends until a terminal line or a connection line is available.
    ///
    /// Never suspends while lines are still queued from an earlier wake-up.
    /// Returns the terminal line, if one is ready; connection lines land in
    /// the backlog.
    async fn wait_ready(&mut self) -> Option<LineEvent> {
        if self.backlog.iter().all(VecDeque::is_empty) {
            select! {
                biased;
                event = self.input.recv() => {
                    self.drain_inbound();
                    return Some(event.unwrap_or(LineEvent::Eof));
                }
                Some(inbound) = self.inbound.recv() => self.enqueue(inbound),
            }
        }
        self.drain_inbound();
        self.input.try_recv().ok()
    }

    fn drain_inbound(&mut self) {
        while let Ok(inbound) = self.inbound.try_recv() {
            self.enqueue(inbound);
        }
    }

    fn enqueue(&mut self, inbound: Inbound) {
        if self.registry.owns(inbound.slot, inbound.conn_id) {
            self.backlog[inbound.slot].push_back(inbound.event);
        } else {
            debug!(slot = inbound.slot, "dropping line from a released connection");
        }
    }

    async fn handle_input(&mut self, event: LineEvent) -> Result<(), ClientError> {
        match event {
            LineEvent::Line(line) => {
                if line.trim().is_empty() {
                    return Ok(());
                }
                self.dispatch(Command::parse(&line)).await
            }
            LineEvent::Eof => {
                info!("standard input closed");
                self.shutdown().await;
                Ok(())
            }
            LineEvent::Failed(err) => Err(ClientError::Io(err)),
            LineEvent::Malformed(err) => Err(ClientError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                err,
            ))),
        }
    }

    async fn dispatch(&mut self, command: Command) -> Result<(), ClientError> {
        match command {
            Command::Show => self.show().await?,
            Command::Help => write_line(&mut self.out, MENU).await?,
            Command::Add { host, port } => {
                let added = self
                    .registry
                    .activate(&self.dialer, &host, port, &self.username)
                    .await;
                match added {
                    Ok(slot) => info!(slot, %host, port, "auction added"),
                    Err(err) => self.report(&err.to_string()).await?,
                }
            }
            Command::Bid { slot, amount } => self.bid(slot, amount).await?,
            Command::Quit => self.shutdown().await,
            Command::Invalid { reason } => self.report(&reason).await?,
        }
        Ok(())
    }

    async fn show(&mut self) -> io::Result<()> {
        write_line(&mut self.out, "Current Auctions:").await?;
        for row in self.registry.snapshot() {
            write_line(&mut self.out, &row.to_string()).await?;
        }
        Ok(())
    }

    async fn bid(&mut self, slot: usize, amount: i64) -> io::Result<()> {
        let capacity = self.registry.capacity();
        if slot >= capacity {
            return self
                .report(&format!("item index {slot} is out of range (0..{capacity})"))
                .await;
        }
        if !self.registry.is_active(slot) {
            return self
                .report(&format!("there is no auction open at {slot}"))
                .await;
        }
        if amount < 0 {
            return self
                .report("unable to process a negative value for bid")
                .await;
        }
        let sent = self.registry.send(slot, amount).await;
        match sent {
            Ok(()) => {
                debug!(slot, amount, "bid sent");
                Ok(())
            }
            Err(err) => self.report(&err.to_string()).await,
        }
    }

    async fn handle_server_event(
        &mut self,
        slot: usize,
        event: LineEvent,
    ) -> Result<(), ClientError> {
        let line = match event {
            LineEvent::Line(line) => line,
            LineEvent::Eof => {
                self.report(&format!("auction {slot} disconnected without closing"))
                    .await?;
                self.release(slot).await;
                return Ok(());
            }
            LineEvent::Failed(err) => {
                self.report(&format!("failed to read from auction {slot}: {err}"))
                    .await?;
                self.release(slot).await;
                return Ok(());
            }
            LineEvent::Malformed(source) => return Err(ClientError::Protocol { slot, source }),
        };

        let Some(state) = self.registry.state(slot) else {
            return Ok(());
        };
        let update =
            decode(&line, state).map_err(|source| ClientError::Protocol { slot, source })?;

        let seconds_left = match &update {
            ServerUpdate::Closed { notice } => {
                self.server_line(notice).await?;
                self.release(slot).await;
                return Ok(());
            }
            ServerUpdate::FirstBid { seconds_left, .. }
            | ServerUpdate::SubsequentBid { seconds_left, .. } => *seconds_left,
        };

        let Some(state) = self.registry.apply(slot, &update) else {
            return Ok(());
        };
        let text = format!(
            "New bid for {} [{}] is {} ({} seconds left)",
            state.item().unwrap_or_default(),
            slot,
            state.current_bid().unwrap_or(-1),
            seconds_left
        );
        self.server_line(&text).await?;
        Ok(())
    }

    async fn release(&mut self, slot: usize) {
        self.registry.deactivate(slot).await;
        self.backlog[slot].clear();
    }

    /// Closes every connection and ends the loop.
    async fn shutdown(&mut self) {
        let closed = self.registry.close_all().await;
        self.backlog.iter_mut().for_each(VecDeque::clear);
        self.state = LoopState::Terminated;
        info!(closed, "auction client terminated");
    }

    /// Prints a line pushed by a server, moving off the prompt line first.
    async fn server_line(&mut self, text: &str) -> io::Result<()> {
        if self.prompt {
            self.out.write_all(b"\n").await?;
        }
        write_line(&mut self.out, text).await
    }

    async fn report(&mut self, message: &str) -> io::Result<()> {
        write_line(&mut self.err, message).await
    }
}
