//! Parsing of the interactive commands typed on standard input.
//!
//! Parsing is pure: every call tokenizes a fresh copy of the line and never
//! touches the registry. Range checks that depend on the registry (slot in
//! use, capacity) happen in the event loop.

/// One line of user input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Show,
    Help,
    Add { host: String, port: u16 },
    /// `amount` stays signed so a negative bid reaches the event loop, which
    /// rejects it before anything is written to the wire.
    Bid { slot: usize, amount: i64 },
    Quit,
    Invalid { reason: String },
}

const ADD_USAGE: &str = "add requires exactly two arguments: add <server address> <port number>";
const BID_USAGE: &str = "bid requires exactly two arguments: bid <item index> <bid value>";
const COMMAND_HINT: &str = "Try: show, add <address> <port>, bid <index> <amount>, help, quit";

impl Command {
    /// Parses a line of user input into a command.
    ///
    /// # Syntax
    /// Keywords are case-insensitive:
    /// - `show` - list the active auctions
    /// - `add <server address> <port number>` - connect to another auction server
    /// - `bid <item index> <bid value>` - send a bid to one auction
    /// - `help` - print the menu again
    /// - `quit` - close every connection and exit
    pub fn parse(line: &str) -> Self {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(keyword) = parts.first() else {
            return invalid("empty command");
        };

        match (keyword.to_lowercase().as_str(), parts.len()) {
            ("show", 1) => Command::Show,
            ("help", 1) => Command::Help,
            ("quit", 1) => Command::Quit,
            ("add", 3) => parse_add(parts[1], parts[2]),
            ("bid", 3) => parse_bid(parts[1], parts[2]),
            ("show" | "help" | "quit", _) => invalid(format!("{keyword} takes no arguments")),
            ("add", _) => invalid(ADD_USAGE),
            ("bid", _) => invalid(BID_USAGE),
            _ => invalid(format!("unknown command '{keyword}'. {COMMAND_HINT}")),
        }
    }
}

fn parse_add(host: &str, port: &str) -> Command {
    match port.parse::<u16>() {
        Ok(port) => Command::Add {
            host: host.to_string(),
            port,
        },
        Err(_) => invalid(format!("invalid port number '{port}'")),
    }
}

fn parse_bid(slot: &str, amount: &str) -> Command {
    let Ok(slot) = slot.parse::<usize>() else {
        return invalid(format!("invalid item index '{slot}'"));
    };
    match amount.parse::<i64>() {
        Ok(amount) => Command::Bid { slot, amount },
        Err(_) => invalid(format!("invalid bid value '{amount}'")),
    }
}

fn invalid(reason: impl Into<String>) -> Command {
    Command::Invalid {
        reason: reason.into(),
    }
}
