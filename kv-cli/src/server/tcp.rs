//! The TCP line-protocol listener: an accept loop handing each connection
//! its own session task, and the per-connection state machine described by
//! `original_source/cmd/kv-tcp/main.go` (`conn.serve`, `parseCommandLine`) —
//! translated from a `select`-over-channels loop into a `tokio::select!`
//! racing the next line read against shutdown, and from a bespoke
//! three-way token splitter into [`super::protocol::parse`].

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use kv_rs::error::{CResult, Error};
use kv_rs::storage::{Store, TxContext};
use kv_rs::txn::command::CommandOutcome;
use kv_rs::txn::{Command, Transactor};

use super::protocol;

/// Matches the source's `bufio.NewReaderSize(c.nc, 4<<10)`.
const MAX_LINE_BYTES: u64 = 4 * 1024;

/// Accepts connections on `addr` until `shutdown` fires, handing each one
/// its own session task. Each session gets a child of `shutdown` so a
/// server-wide cancellation reaches every in-flight lock wait. Returns once
/// every session has exited.
pub async fn serve<S: Store + 'static>(
    addr: &str,
    transactor: Arc<Transactor<S>>,
    shutdown: CancellationToken,
) -> CResult<()> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("tcp listening on {}", addr);

    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                log::info!("tcp listener on {} shutting down", addr);
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        log::warn!("tcp accept error: {}", e);
                        continue;
                    }
                };
                let transactor = transactor.clone();
                let session_cancel = shutdown.child_token();
                sessions.spawn(async move {
                    if let Err(e) = handle_connection(stream, transactor, session_cancel).await {
                        log::warn!("session with {} ended with error: {}", peer, e);
                    }
                });
            }
        }
    }

    while sessions.join_next().await.is_some() {}
    Ok(())
}

/// Drives one connection: Idle/InTx/Closed per the line read, with an
/// implicit rollback on QUIT, disconnect or cancellation if a transaction
/// was left open.
async fn handle_connection<S: Store>(
    stream: TcpStream,
    transactor: Arc<Transactor<S>>,
    cancel: CancellationToken,
) -> CResult<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut ctx = TxContext::NONE;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("session cancelled, closing connection");
                break;
            }
            line = read_line_capped(&mut reader) => line?,
        };

        let Some(line) = line else {
            break; // peer closed the connection
        };

        let command = match protocol::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                writer.write_all(protocol::render_error(&e).as_bytes()).await?;
                continue;
            }
        };

        let quitting = matches!(command, Command::Quit);
        let finalizing = matches!(command, Command::Commit | Command::Rollback);

        match transactor.execute(ctx, &cancel, command).await {
            Ok(outcome) => {
                match outcome {
                    CommandOutcome::Began(txid) => ctx = TxContext::new(txid),
                    _ if finalizing => ctx = TxContext::NONE,
                    _ => {}
                }
                writer.write_all(protocol::render_outcome(&outcome).as_bytes()).await?;
                if quitting {
                    break;
                }
            }
            Err(e @ Error::Internal(_)) => {
                writer.write_all(protocol::render_error(&e).as_bytes()).await?;
                log::warn!("internal error on connection, closing: {}", e);
                break;
            }
            Err(e) => {
                writer.write_all(protocol::render_error(&e).as_bytes()).await?;
            }
        }
    }

    if ctx.has_transaction() {
        if let Err(e) = transactor.rollback(ctx).await {
            log::warn!("implicit rollback on disconnect failed: {}", e);
        }
    }

    Ok(())
}

/// Reads one line, bounded to [`MAX_LINE_BYTES`]. `Ok(None)` means the peer
/// closed the connection with no more data; a line exceeding the cap is
/// reported as a parse error after resynchronising on the next newline.
async fn read_line_capped<R: AsyncBufRead + Unpin>(reader: &mut R) -> CResult<Option<String>> {
    let mut buf = Vec::new();
    let n = {
        let mut limited = AsyncReadExt::take(&mut *reader, MAX_LINE_BYTES);
        limited.read_until(b'\n', &mut buf).await?
    };

    if n == 0 {
        return Ok(None);
    }

    if !buf.ends_with(b"\n") {
        if buf.len() as u64 >= MAX_LINE_BYTES {
            drain_until_newline(reader).await?;
            return Err(Error::Parse(format!("line exceeds {} byte limit", MAX_LINE_BYTES)));
        }
        return Ok(None); // EOF mid-line
    }

    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

async fn drain_until_newline<R: AsyncBufRead + Unpin>(reader: &mut R) -> CResult<()> {
    let mut discard = Vec::new();
    reader.read_until(b'\n', &mut discard).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_rs::storage::memory::MemoryStore;
    use kv_rs::txn::SerializableStore;
    use std::net::SocketAddr;
    use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader as TokioBufReader};
    use tokio::net::TcpStream as ClientStream;

    async fn harness() -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let transactor = Arc::new(Transactor::new(Arc::new(SerializableStore::new(MemoryStore::new()))));
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut sessions = JoinSet::new();
            loop {
                tokio::select! {
                    _ = shutdown_clone.cancelled() => break,
                    accepted = listener.accept() => {
                        let (stream, _) = accepted.unwrap();
                        let transactor = transactor.clone();
                        let cancel = shutdown_clone.child_token();
                        sessions.spawn(async move {
                            let _ = handle_connection(stream, transactor, cancel).await;
                        });
                    }
                }
            }
            while sessions.join_next().await.is_some() {}
        });

        (addr, shutdown, handle)
    }

    async fn roundtrip(addr: SocketAddr, lines: &[&str]) -> Vec<String> {
        let stream = ClientStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = TokioBufReader::new(read_half);
        let mut out = Vec::new();

        for line in lines {
            write_half.write_all(format!("{}\n", line).as_bytes()).await.unwrap();
            let mut response = String::new();
            reader.read_line(&mut response).await.unwrap();
            out.push(response);
        }

        out
    }

    #[tokio::test]
    async fn set_get_del_get_matches_the_literal_scenario() {
        let (addr, shutdown, _handle) = harness().await;
        let responses = roundtrip(addr, &["SET a 1", "GET a", "DEL a", "GET a"]).await;
        assert_eq!(responses, vec!["OK\r\n", "1\n", "OK\r\n", "\r\n"]);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn begin_set_rollback_leaves_no_trace() {
        let (addr, shutdown, _handle) = harness().await;
        let responses = roundtrip(addr, &["BEGIN", "SET x hello", "ROLLBACK", "GET x"]).await;
        assert_eq!(responses, vec!["OK\r\n", "OK\r\n", "OK\r\n", "\r\n"]);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn nested_begin_is_an_error_but_session_stays_open() {
        let (addr, shutdown, _handle) = harness().await;
        let responses = roundtrip(addr, &["BEGIN", "BEGIN", "ROLLBACK"]).await;
        assert_eq!(responses[0], "OK\r\n");
        assert!(responses[1].ends_with("\r\n") && responses[1] != "OK\r\n");
        assert_eq!(responses[2], "OK\r\n");
        shutdown.cancel();
    }

    #[tokio::test]
    async fn unknown_command_keeps_connection_open() {
        let (addr, shutdown, _handle) = harness().await;
        let responses = roundtrip(addr, &["FROB a", "SET a 1", "GET a"]).await;
        assert!(responses[0].ends_with("\r\n"));
        assert_eq!(responses[1], "OK\r\n");
        assert_eq!(responses[2], "1\n");
        shutdown.cancel();
    }
}
