//! Fixed-capacity table of live auction connections.
//!
//! Each slot is either empty or owns exactly one connection together with the
//! state learned from that server. There is no half-active slot: the item and
//! bid live inside the occupied variant, so resetting a slot drops all three
//! at once.

use std::{fmt, io};

use tokio::{io::AsyncWriteExt, sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    error::{RegistryError, SendError},
    message::{ServerUpdate, write_line},
    transport::{BoxedWriter, Dialer, LineEvent, spawn_line_pump},
};

/// Default number of auctions a client may follow at once.
pub const DEFAULT_MAX_AUCTIONS: usize = 5;

/// A line (or end of stream) read from the connection in `slot`.
///
/// `conn_id` identifies the connection that produced it, so lines still in
/// flight from a connection that has since been replaced can be discarded.
#[derive(Debug)]
pub struct Inbound {
    pub slot: usize,
    pub conn_id: u64,
    pub event: LineEvent,
}

/// What the client knows about one auction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuctionState {
    item: Option<String>,
    current_bid: Option<i64>,
}

impl AuctionState {
    pub fn item(&self) -> Option<&str> {
        self.item.as_deref()
    }

    pub fn current_bid(&self) -> Option<i64> {
        self.current_bid
    }

    /// Folds a bid update into the state. The item is only ever set once.
    pub fn apply(&mut self, update: &ServerUpdate) {
        match update {
            ServerUpdate::FirstBid { item, bid, .. } => {
                if self.item.is_none() {
                    self.item = Some(item.clone());
                }
                self.current_bid = Some(*bid);
            }
            ServerUpdate::SubsequentBid { bid, .. } => self.current_bid = Some(*bid),
            ServerUpdate::Closed { .. } => {}
        }
    }
}

/// One row of the `show` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionView {
    pub index: usize,
    pub item: Option<String>,
    pub bid: Option<i64>,
}

impl fmt::Display for AuctionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}) {} bid = {}",
            self.index,
            self.item.as_deref().unwrap_or(""),
            self.bid.unwrap_or(-1)
        )
    }
}

struct Connection {
    id: u64,
    peer: String,
    writer: BoxedWriter,
    pump: JoinHandle<()>,
}

impl Connection {
    async fn close(mut self) -> io::Result<()> {
        self.pump.abort();
        self.writer.shutdown().await
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // The pump owns the read half; stopping it releases the socket.
        self.pump.abort();
    }
}

struct Slot {
    connection: Connection,
    state: AuctionState,
}

pub struct Registry {
    slots: Vec<Option<Slot>>,
    inbound: mpsc::UnboundedSender<Inbound>,
    next_conn_id: u64,
}

impl Registry {
    /// Creates an empty registry and the receiver every connection's lines arrive on.
    pub fn new(capacity: usize) -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (inbound, rx) = mpsc::unbounded_channel();
        let registry = Self {
            slots: (0..capacity).map(|_| None).collect(),
            inbound,
            next_conn_id: 1,
        };
        (registry, rx)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_active(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Some(_)))
    }

    /// True if `conn_id` is the connection currently held by `slot`.
    pub fn owns(&self, slot: usize, conn_id: u64) -> bool {
        matches!(self.slots.get(slot), Some(Some(held)) if held.connection.id == conn_id)
    }

    pub fn state(&self, slot: usize) -> Option<&AuctionState> {
        self.slot(slot).map(|held| &held.state)
    }

    pub fn peer(&self, slot: usize) -> Option<&str> {
        self.slot(slot).map(|held| held.connection.peer.as_str())
    }

    /// Applies a decoded update to an active slot and returns the new state.
    pub fn apply(&mut self, slot: usize, update: &ServerUpdate) -> Option<&AuctionState> {
        let held = self.slots.get_mut(slot)?.as_mut()?;
        held.state.apply(update);
        Some(&held.state)
    }

    /// Connects to `host:port`, introduces the user, and claims the first free slot.
    ///
    /// Capacity is checked before dialing, so a full registry never opens a socket.
    pub async fn activate<D: Dialer>(
        &mut self,
        dialer: &D,
        host: &str,
        port: u16,
        username: &str,
    ) -> Result<usize, RegistryError> {
        let Some(index) = self.slots.iter().position(Option::is_none) else {
            return Err(RegistryError::Full {
                capacity: self.capacity(),
            });
        };

        let addr = format!("{host}:{port}");
        let mut link = dialer
            .dial(host, port)
            .await
            .map_err(|source| RegistryError::Connect {
                addr: addr.clone(),
                source,
            })?;
        write_line(&mut link.writer, username)
            .await
            .map_err(|source| RegistryError::Connect { addr, source })?;

        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;
        let pump = spawn_line_pump(link.reader, self.inbound.clone(), move |event| Inbound {
            slot: index,
            conn_id,
            event,
        });

        debug!(slot = index, peer = %link.peer, "new server connected, awaiting item");
        self.slots[index] = Some(Slot {
            connection: Connection {
                id: conn_id,
                peer: link.peer,
                writer: link.writer,
                pump,
            },
            state: AuctionState::default(),
        });
        Ok(index)
    }

    /// Closes the connection in `slot` and resets it. Returns false if it was already empty.
    pub async fn deactivate(&mut self, slot: usize) -> bool {
        let Some(held) = self.slots.get_mut(slot).and_then(Option::take) else {
            return false;
        };
        let peer = held.connection.peer.clone();
        if let Err(error) = held.connection.close().await {
            warn!(slot, %peer, ?error, "failed to shut down auction connection cleanly");
        }
        debug!(slot, %peer, "auction connection released");
        true
    }

    /// Closes every active connection and returns how many were closed.
    pub async fn close_all(&mut self) -> usize {
        let mut closed = 0;
        for slot in 0..self.slots.len() {
            if self.deactivate(slot).await {
                closed += 1;
            }
        }
        closed
    }

    /// Lists the active auctions in slot order.
    pub fn snapshot(&self) -> Vec<AuctionView> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_ref().map(|held| AuctionView {
                    index,
                    item: held.state.item.clone(),
                    bid: held.state.current_bid,
                })
            })
            .collect()
    }

    /// Writes a bid to the server behind `slot`.
    pub async fn send(&mut self, slot: usize, amount: i64) -> Result<(), SendError> {
        let held = self
            .slots
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(SendError::NoSuchAuction(slot))?;
        write_line(&mut held.connection.writer, &amount.to_string())
            .await
            .map_err(|source| SendError::Transport { slot, source })
    }

    fn slot(&self, slot: usize) -> Option<&Slot> {
        self.slots.get(slot).and_then(Option::as_ref)
    }
}
