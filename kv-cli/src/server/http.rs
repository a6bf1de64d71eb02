//! The optional HTTP interface: GET/PUT/POST/DELETE on `/{key}`, each
//! request autocommitted, no transaction semantics.
//!
//! Grounded on `original_source/cmd/kvapi/{main,handlers/kv}.go`, which
//! routes through `gorilla/mux` to three handlers keyed on method. The
//! teacher stack carries no HTTP server framework, so this listener parses
//! just enough of HTTP/1.1 by hand: a request line, a `Content-Length`
//! body for writes, nothing else (no chunked transfer, no keep-alive).

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use kv_rs::error::{CResult, Error};
use kv_rs::storage::{Store, TxContext};
use kv_rs::txn::command::CommandOutcome;
use kv_rs::txn::{Command, Transactor};

/// Accepts connections on `addr` until `shutdown` fires. Each request is
/// handled and the connection closed (no keep-alive), matching the
/// one-shot-per-request style of the handlers this is grounded on.
pub async fn serve<S: Store + 'static>(
    addr: &str,
    transactor: Arc<Transactor<S>>,
    shutdown: CancellationToken,
) -> CResult<()> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("http listening on {}", addr);

    let mut requests = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                log::info!("http listener on {} shutting down", addr);
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        log::warn!("http accept error: {}", e);
                        continue;
                    }
                };
                let transactor = transactor.clone();
                let cancel = shutdown.child_token();
                requests.spawn(async move {
                    if let Err(e) = handle_request(stream, transactor, cancel).await {
                        log::warn!("http request from {} failed: {}", peer, e);
                    }
                });
            }
        }
    }

    while requests.join_next().await.is_some() {}
    Ok(())
}

struct RequestLine {
    method: String,
    key: String,
}

async fn handle_request<S: Store>(
    stream: TcpStream,
    transactor: Arc<Transactor<S>>,
    cancel: CancellationToken,
) -> CResult<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let request = match read_request_line(&mut reader).await? {
        Some(r) => r,
        None => return Ok(()),
    };

    let content_length = read_headers(&mut reader).await?;

    let outcome = match request.method.as_str() {
        "GET" => transactor.execute(TxContext::NONE, &cancel, Command::get(request.key.as_str())).await,
        "PUT" | "POST" => {
            let body = read_body(&mut reader, content_length).await?;
            transactor
                .execute(TxContext::NONE, &cancel, Command::set(request.key.as_str(), body))
                .await
        }
        "DELETE" => {
            transactor.execute(TxContext::NONE, &cancel, Command::delete(request.key.as_str())).await
        }
        other => {
            write_response(&mut writer, 405, "Method Not Allowed", &[], other).await?;
            return Ok(());
        }
    };

    match outcome {
        Ok(CommandOutcome::Value(value)) => {
            write_response(&mut writer, 200, "OK", &[], &value).await?;
        }
        Ok(CommandOutcome::Miss) => {
            write_response(&mut writer, 404, "Not Found", &[], &format!("{} not found", request.key)).await?;
        }
        Ok(CommandOutcome::Ok) if request.method == "DELETE" => {
            write_response(&mut writer, 204, "No Content", &[], "").await?;
        }
        Ok(CommandOutcome::Ok) => {
            let location = format!("/{}", request.key);
            write_response(&mut writer, 201, "Created", &[("Location", &location)], "OK").await?;
        }
        Ok(_) => unreachable!("GET/SET/DEL only ever produce Value, Miss or Ok"),
        Err(Error::NotFound) => {
            write_response(&mut writer, 404, "Not Found", &[], &format!("{} not found", request.key)).await?;
        }
        Err(e) => {
            write_response(&mut writer, 500, "Internal Server Error", &[], &e.to_string()).await?;
        }
    }

    Ok(())
}

async fn read_request_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> CResult<Option<RequestLine>> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let method = parts.next().ok_or_else(|| Error::Parse("missing HTTP method".into()))?;
    let target = parts.next().ok_or_else(|| Error::Parse("missing HTTP target".into()))?;
    let key = target.trim_start_matches('/').to_string();
    if key.is_empty() {
        return Err(Error::Parse("request target must name a key: /{key}".into()));
    }

    Ok(Some(RequestLine { method: method.to_ascii_uppercase(), key }))
}

/// Reads header lines up to the blank line that ends them, returning the
/// `Content-Length` if present. Header values beyond that are unused: this
/// handler needs nothing else from the request.
async fn read_headers<R: AsyncBufRead + Unpin>(reader: &mut R) -> CResult<usize> {
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    Ok(content_length)
}

async fn read_body<R: AsyncRead + Unpin>(reader: &mut R, content_length: usize) -> CResult<String> {
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;
    Ok(String::from_utf8_lossy(&body).into_owned())
}

async fn write_response<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    status: u16,
    reason: &str,
    extra_headers: &[(&str, &str)],
    body: &str,
) -> CResult<()> {
    let mut response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        reason,
        body.len()
    );
    for (name, value) in extra_headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str("\r\n");
    response.push_str(body);

    writer.write_all(response.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_rs::storage::memory::MemoryStore;
    use kv_rs::txn::SerializableStore;
    use std::net::SocketAddr;
    use tokio::io::AsyncReadExt as _;

    async fn harness() -> (SocketAddr, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let transactor = Arc::new(Transactor::new(Arc::new(SerializableStore::new(MemoryStore::new()))));
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            let mut requests = JoinSet::new();
            loop {
                tokio::select! {
                    _ = shutdown_clone.cancelled() => break,
                    accepted = listener.accept() => {
                        let (stream, _) = accepted.unwrap();
                        let transactor = transactor.clone();
                        let cancel = shutdown_clone.child_token();
                        requests.spawn(async move {
                            let _ = handle_request(stream, transactor, cancel).await;
                        });
                    }
                }
            }
            while requests.join_next().await.is_some() {}
        });

        (addr, shutdown)
    }

    async fn send(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn put_then_get_round_trips_the_value() {
        let (addr, shutdown) = harness().await;

        let put = send(addr, "PUT /a HTTP/1.1\r\nContent-Length: 1\r\n\r\n1").await;
        assert!(put.starts_with("HTTP/1.1 201 Created"));
        assert!(put.contains("Location: /a"));

        let get = send(addr, "GET /a HTTP/1.1\r\n\r\n").await;
        assert!(get.starts_with("HTTP/1.1 200 OK"));
        assert!(get.ends_with("1"));

        shutdown.cancel();
    }

    #[tokio::test]
    async fn get_on_a_missing_key_is_404() {
        let (addr, shutdown) = harness().await;
        let get = send(addr, "GET /missing HTTP/1.1\r\n\r\n").await;
        assert!(get.starts_with("HTTP/1.1 404 Not Found"));
        shutdown.cancel();
    }

    #[tokio::test]
    async fn delete_is_204() {
        let (addr, shutdown) = harness().await;
        send(addr, "PUT /a HTTP/1.1\r\nContent-Length: 1\r\n\r\n1").await;
        let delete = send(addr, "DELETE /a HTTP/1.1\r\n\r\n").await;
        assert!(delete.starts_with("HTTP/1.1 204 No Content"));
        shutdown.cancel();
    }
}
