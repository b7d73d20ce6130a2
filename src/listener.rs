// src/listener.rs

//! A6 command listener: a thin line-delimited TCP front end exposing the
//! §6.1 command vocabulary (plus `PING`) to manual operators. Grounded on
//! the teacher's `core::warden::listener` — one task per connection, one
//! command per line — generalized from a RESP-array frame to a plain
//! `VERB key=value ...` line since this crate has no wire protocol of its
//! own to frame with. Requests are handed off over a channel rather than
//! touched directly, since `MonitorState` is exclusively owned by the tick
//! task (§5).
use crate::command::{Command, CommandResult};
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

pub type CommandRequest = (Command, oneshot::Sender<CommandResult>);

/// Binds `port` and serves the command vocabulary until the process exits.
pub async fn run_listener(port: u16, tx: mpsc::Sender<CommandRequest>) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "command listener ready");

    loop {
        let (socket, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "failed to accept command connection");
                continue;
            }
        };
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, tx).await {
                warn!(%addr, error = %e, "command connection ended with an error");
            }
        });
    }
}

async fn handle_connection(
    socket: TcpStream,
    tx: mpsc::Sender<CommandRequest>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = match parse_line(line) {
            Ok(ParsedLine::Ping) => "PONG".to_string(),
            Ok(ParsedLine::Command(cmd)) => {
                let (resp_tx, resp_rx) = oneshot::channel();
                if tx.send((cmd, resp_tx)).await.is_err() {
                    "ERR monitor tick loop is not running".to_string()
                } else {
                    match resp_rx.await {
                        Ok(result) => format_result(&result),
                        Err(_) => "ERR monitor dropped the request".to_string(),
                    }
                }
            }
            Err(msg) => format!("ERR {msg}"),
        };
        write_half.write_all(reply.as_bytes()).await?;
        write_half.write_all(b"\n").await?;
    }
    Ok(())
}

fn format_result(result: &CommandResult) -> String {
    match result {
        CommandResult::Success(None) => "OK".to_string(),
        CommandResult::Success(Some(msg)) => format!("OK {msg}"),
        CommandResult::Failure(msg) => format!("ERR {msg}"),
        CommandResult::Pending => "PENDING".to_string(),
        CommandResult::Running => "RUNNING".to_string(),
    }
}

enum ParsedLine {
    Ping,
    Command(Command),
}

/// Parses one `VERB key=value ...` line into a `Command`. Unknown verbs and
/// missing required arguments are reported back to the caller rather than
/// silently ignored.
fn parse_line(line: &str) -> Result<ParsedLine, String> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().unwrap_or("").to_ascii_uppercase();
    let args: HashMap<String, String> = parts
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
        .collect();

    match verb.as_str() {
        "PING" => Ok(ParsedLine::Ping),
        "FAILOVER" => Ok(ParsedLine::Command(Command::Failover)),
        "SWITCHOVER" => Ok(ParsedLine::Command(Command::Switchover {
            new_primary: args.get("new").cloned(),
            current_primary: args.get("current").cloned(),
        })),
        "REJOIN" => {
            let server = args
                .get("server")
                .cloned()
                .ok_or_else(|| "rejoin requires server=<name>".to_string())?;
            Ok(ParsedLine::Command(Command::Rejoin { server }))
        }
        "RESET-REPLICATION" => Ok(ParsedLine::Command(Command::ResetReplication {
            primary: args.get("primary").cloned(),
        })),
        "RELEASE-LOCKS" => Ok(ParsedLine::Command(Command::ReleaseLocks)),
        "FETCH-CMD-RESULT" => Ok(ParsedLine::Command(Command::FetchCmdResult)),
        "CANCEL-CMD" => Ok(ParsedLine::Command(Command::CancelCmd)),
        "" => Err("empty command".to_string()),
        other => Err(format!("unknown command '{other}'")),
    }
}
