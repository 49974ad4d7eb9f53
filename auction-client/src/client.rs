use std::io;

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tracing::info;

use crate::{
    cli::Args,
    error::ClientError,
    event_loop::{EventLoop, MENU},
    message::write_line,
    transport::{LineEvent, TcpDialer, spawn_stdin_pump},
};

const USERNAME_PROMPT: &str = "Please enter a username: ";

/// Runs an interactive session on the process's terminal.
pub async fn run(args: Args) -> Result<()> {
    let config = args.config();
    let (input_tx, mut input) = mpsc::unbounded_channel();
    spawn_stdin_pump(input_tx).context("failed to start reading standard input")?;

    let mut stdout = tokio::io::stdout();
    let username = match args.username {
        Some(username) => username,
        None => read_username(&mut input, &mut stdout).await?,
    };
    info!(%username, "starting auction client");
    write_line(&mut stdout, MENU).await?;

    let mut event_loop = EventLoop::new(
        &config,
        TcpDialer,
        username,
        input,
        stdout,
        tokio::io::stderr(),
    );
    event_loop.run().await?;
    Ok(())
}

/// Prompts for the username and takes the first non-blank line as the answer.
pub async fn read_username<W>(
    input: &mut mpsc::UnboundedReceiver<LineEvent>,
    out: &mut W,
) -> Result<String, ClientError>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(USERNAME_PROMPT.as_bytes()).await?;
    out.flush().await?;

    loop {
        match input.recv().await {
            Some(LineEvent::Line(line)) => {
                let username = line.trim();
                if !username.is_empty() {
                    return Ok(username.to_string());
                }
            }
            Some(LineEvent::Failed(err)) => return Err(ClientError::Io(err)),
            Some(LineEvent::Malformed(err)) => {
                return Err(ClientError::Io(io::Error::new(io::ErrorKind::InvalidData, err)));
            }
            Some(LineEvent::Eof) | None => return Err(ClientError::NoUsername),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn username_skips_blank_lines() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(LineEvent::Line("   ".into())).unwrap();
        tx.send(LineEvent::Line(" alice \n".into())).unwrap();
        let mut out = Vec::new();

        let username = read_username(&mut rx, &mut out).await.expect("username");
        assert_eq!(username, "alice");
        assert_eq!(out, USERNAME_PROMPT.as_bytes());
    }

    #[tokio::test]
    async fn missing_username_is_an_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(LineEvent::Eof).unwrap();
        let mut out = Vec::new();

        let result = read_username(&mut rx, &mut out).await;
        assert!(matches!(result, Err(ClientError::NoUsername)));
    }
}
