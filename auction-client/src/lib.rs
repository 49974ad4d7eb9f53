//! Terminal client that follows several auction servers at once.
//!
//! One process keeps a command session on standard input while holding TCP
//! connections to up to `--max-auctions` servers, each pushing
//! `<item> <bid> <seconds left>` lines. Each module owns one concern:
//!
//! - [`cli`] parses the command-line flags into a [`event_loop::ClientConfig`].
//! - [`command`] turns a line of user input into a [`command::Command`].
//! - [`message`] decodes server lines and provides line-framed reads and writes.
//! - [`registry`] holds the fixed table of auction slots and their connections.
//! - [`transport`] opens connections and pumps their lines onto channels.
//! - [`event_loop`] waits on every source and applies commands and updates.
//! - [`client`] wires the loop to the real terminal and TCP.
//!
//! Tests drive [`event_loop::EventLoop`] through in-memory transports, so
//! ordering and shutdown behavior can be checked without a network.

pub mod cli;
pub mod client;
pub mod command;
pub mod error;
pub mod event_loop;
pub mod message;
pub mod registry;
pub mod transport;
