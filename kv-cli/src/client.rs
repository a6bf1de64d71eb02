//! The interactive `kvcli` shell: a `rustyline` REPL that sends lines
//! verbatim to a running `kvcli serve` TCP listener and prints back whatever
//! the line protocol responds with. This is the supplemented
//! "interactive shell" feature: in spirit of the teacher's
//! `Session::handle_repl`, but redirected at the TCP protocol instead of a
//! local storage engine, since this crate's store only ever lives behind
//! the transactor inside a `serve` process.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use rustyline::config::Builder;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Editor};

use crate::rusty::CliHelper;

const KEYWORDS: &[&str] = &["SET", "GET", "DEL", "BEGIN", "COMMIT", "ROLLBACK", "QUIT"];

/// One connection to a `kvcli serve` TCP listener: a line writer and a line
/// reader sharing the same socket.
pub struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Client { stream, reader })
    }

    /// Sends one line (a newline is appended) and reads exactly one response
    /// line back, matching the line-for-line request/response protocol.
    pub fn send(&mut self, line: &str) -> Result<String> {
        writeln!(self.stream, "{}", line)?;
        let mut response = String::new();
        let n = self.reader.read_line(&mut response)?;
        if n == 0 {
            return Err(anyhow!("server closed the connection"));
        }
        Ok(response)
    }
}

/// Runs the REPL against `addr` until the user quits (`exit`/`quit`/EOF/^D)
/// or `running` is cleared by a Ctrl+C handler installed by the caller.
pub fn run_repl(addr: &str, prompt: &str, running: Arc<AtomicBool>) -> Result<()> {
    println!("Welcome to {}.", prompt);
    println!("Connecting to {}.", addr);
    println!();

    let mut client = Client::connect(addr)?;

    let config = Builder::new().completion_prompt_limit(5).completion_type(CompletionType::Circular).build();
    let mut rl = Editor::<CliHelper, DefaultHistory>::with_config(config)?;
    rl.set_helper(Some(CliHelper::with_keywords(Arc::new(
        KEYWORDS.iter().map(|s| s.to_string()).collect(),
    ))));
    rl.load_history(&history_path()).ok();

    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        match rl.readline(&format!("{} > ", prompt)) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                    let _ = client.send("QUIT");
                    break;
                }

                let _ = rl.add_history_entry(line);
                match client.send(line) {
                    Ok(response) => print!("{}", render(&response)),
                    Err(e) => eprintln!("error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("io err: {e}");
                break;
            }
        }
    }

    println!("Bye~");
    let _ = rl.save_history(&history_path());
    Ok(())
}

/// A bare `\r\n` (GET miss) renders as `(nil)` for an interactive user; every
/// other response is the wire line as-is, newline included.
fn render(response: &str) -> String {
    if response == "\r\n" {
        "(nil)\n".to_string()
    } else {
        response.to_string()
    }
}

/// Sends `query`, a single line, and prints its response. Used for
/// non-interactive `--query` invocations.
pub fn run_one_shot(addr: &str, query: &str) -> Result<()> {
    let mut client = Client::connect(addr)?;
    let response = client.send(query.trim())?;
    print!("{}", render(&response));
    Ok(())
}

fn history_path() -> String {
    format!("{}/.kvcli_history", std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
}
