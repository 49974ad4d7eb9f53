use std::io;

use thiserror::Error;

/// A server line that does not follow the `<item> <bid> <seconds>` layout.
///
/// The auction servers are trusted to speak the protocol, so once a stream
/// stops decoding the client cannot keep interpreting it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed server message {line:?}: {reason}")]
    Malformed { line: String, reason: &'static str },
}

/// Failures while reading one frame from an auction server.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The bytes arrived but cannot be a server message.
    #[error(transparent)]
    Malformed(#[from] DecodeError),
}

/// Failures while opening a new auction connection.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Every slot already holds a live connection.
    #[error("maximum number of auctions ({capacity}) reached")]
    Full { capacity: usize },

    /// Name resolution or the TCP connect itself failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Failures while relaying a bid to a server.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("there is no auction open at {0}")]
    NoSuchAuction(usize),

    #[error("failed to send to auction {slot}: {source}")]
    Transport {
        slot: usize,
        #[source]
        source: io::Error,
    },
}

/// Errors that end the client session.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol violation on auction {slot}: {source}")]
    Protocol {
        slot: usize,
        #[source]
        source: DecodeError,
    },

    #[error("no username provided")]
    NoUsername,

    #[error("terminal i/o failed: {0}")]
    Io(#[from] io::Error),
}
