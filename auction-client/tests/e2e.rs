use std::{process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpListener,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    process::{Child, ChildStdin, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);
const MENU_LINES: usize = 5;

#[tokio::test]
async fn cli_auction_end_to_end() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let mut client = spawn_client("alice").await?;
    for _ in 0..MENU_LINES {
        read_line_expect(&mut client.stdout, "waiting for menu").await?;
    }

    // Connect to the auction server; it first learns who is bidding.
    client.send_line(&format!("add 127.0.0.1 {port}")).await?;
    let (mut server_reader, mut server_writer) = accept(&listener).await?;
    let username = read_line_expect(&mut server_reader, "waiting for username").await?;
    assert_eq!(username, "alice");

    // First contact binds the item name.
    server_writer.write_all(b"Widget 100 30\n").await?;
    let update = read_line_expect(&mut client.stdout, "waiting for first bid").await?;
    assert_eq!(update, "New bid for Widget [0] is 100 (30 seconds left)");

    // A bid typed by the user reaches the server.
    client.send_line("bid 0 120").await?;
    let bid = read_line_expect(&mut server_reader, "waiting for bid").await?;
    assert_eq!(bid, "120");

    server_writer.write_all(b"Widget 120 20\n").await?;
    let update = read_line_expect(&mut client.stdout, "waiting for second bid").await?;
    assert_eq!(update, "New bid for Widget [0] is 120 (20 seconds left)");

    client.send_line("show").await?;
    assert_eq!(
        read_line_expect(&mut client.stdout, "waiting for show header").await?,
        "Current Auctions:"
    );
    assert_eq!(
        read_line_expect(&mut client.stdout, "waiting for show row").await?,
        "(0) Widget bid = 120"
    );

    // Closing notice is echoed and the slot is released.
    server_writer
        .write_all(b"Auction closed: Widget sold to alice for 120\n")
        .await?;
    let closed = read_line_expect(&mut client.stdout, "waiting for close notice").await?;
    assert_eq!(closed, "Auction closed: Widget sold to alice for 120");
    assert!(read_line(&mut server_reader).await?.is_none());

    client.send_line("show").await?;
    client.send_line("quit").await?;
    assert_eq!(
        read_line_expect(&mut client.stdout, "waiting for empty show").await?,
        "Current Auctions:"
    );
    assert!(read_line(&mut client.stdout).await?.is_none());

    ensure_success(&mut client.child).await
}

#[tokio::test]
async fn quit_closes_open_connections() -> Result<()> {
    let first = TcpListener::bind("127.0.0.1:0").await?;
    let second = TcpListener::bind("127.0.0.1:0").await?;

    let mut client = spawn_client("bob").await?;
    client
        .send_line(&format!("add 127.0.0.1 {}", first.local_addr()?.port()))
        .await?;
    client
        .send_line(&format!("add 127.0.0.1 {}", second.local_addr()?.port()))
        .await?;

    let (mut first_reader, _first_writer) = accept(&first).await?;
    let (mut second_reader, _second_writer) = accept(&second).await?;
    assert_eq!(read_line_expect(&mut first_reader, "first username").await?, "bob");
    assert_eq!(read_line_expect(&mut second_reader, "second username").await?, "bob");

    client.send_line("quit").await?;
    assert!(read_line(&mut first_reader).await?.is_none());
    assert!(read_line(&mut second_reader).await?.is_none());

    ensure_success(&mut client.child).await
}

#[tokio::test]
async fn protocol_violation_exits_with_failure() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let mut client = spawn_client("carol").await?;
    client.send_line(&format!("add 127.0.0.1 {port}")).await?;
    let (mut server_reader, mut server_writer) = accept(&listener).await?;
    assert_eq!(read_line_expect(&mut server_reader, "username").await?, "carol");

    server_writer.write_all(b"Widget lots 30\n").await?;
    assert!(read_line(&mut server_reader).await?.is_none());

    let status = timeout(READ_TIMEOUT, client.child.wait())
        .await
        .context("timed out waiting for client to exit")?
        .context("failed to await client process")?;
    assert!(!status.success());
    Ok(())
}

struct ClientProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ClientProcess {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to send line '{line}'"))?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }
}

async fn spawn_client(username: &str) -> Result<ClientProcess> {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_auction-client"));
    cmd.arg("--username")
        .arg(username)
        .arg("--no-prompt")
        .env("RUST_LOG", "warn")
        .env("RUST_LOG_STYLE", "never")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn client {username}"))?;
    let stdin = child
        .stdin
        .take()
        .context("client stdin missing after spawn")?;
    let stdout = child
        .stdout
        .take()
        .context("client stdout missing after spawn")?;

    Ok(ClientProcess {
        child,
        stdin,
        stdout: BufReader::new(stdout),
    })
}

async fn accept(listener: &TcpListener) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
    let (stream, _) = timeout(READ_TIMEOUT, listener.accept())
        .await
        .context("timed out waiting for the client to connect")??;
    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader), writer))
}

async fn read_line_expect<R>(reader: &mut R, description: &str) -> Result<String>
where
    R: AsyncBufReadExt + Unpin,
{
    match read_line(reader).await {
        Ok(Some(line)) => Ok(line),
        Ok(None) => Err(anyhow!("{description}: stream closed")),
        Err(err) => Err(err.context(format!("{description}: failed to read line"))),
    }
}

async fn read_line<R>(reader: &mut R) -> Result<Option<String>>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut line = String::new();
    let bytes_io = match timeout(READ_TIMEOUT, reader.read_line(&mut line)).await {
        Ok(result) => result,
        Err(_) => return Err(anyhow!("timed out waiting for line")),
    };
    if bytes_io? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn ensure_success(child: &mut Child) -> Result<()> {
    let status = timeout(READ_TIMEOUT, child.wait())
        .await
        .context("timed out waiting for client to exit")?
        .context("failed to await client process")?;
    if !status.success() {
        return Err(anyhow!("client exited with status {status}"));
    }
    Ok(())
}
