// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Client utility functions: drive the admin protocol from the CLI over a
//! plain blocking connection.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::scripts::check_script;
use crate::transfer::{frame_script, RecvState, ScriptReceiver};

const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("daemon reported: {0}")]
    Daemon(String),
    #[error("{0}")]
    Script(#[from] xev_script::ScriptError),
    #[error("protocol error: {0}")]
    Protocol(String),
}

fn connect(host: &str, port: u16) -> Result<TcpStream, ClientError> {
    let stream = TcpStream::connect((host, port))?;
    stream.set_read_timeout(Some(REPLY_TIMEOUT))?;
    Ok(stream)
}

fn read_reply(reader: &mut BufReader<TcpStream>) -> Result<String, ClientError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Err(ClientError::Protocol("connection closed by daemon".into()));
    }
    Ok(line.trim_end().to_string())
}

/// `--command`: send one `cl:` line and return the daemon's reply.
pub fn send_command(host: &str, port: u16, cmdline: &str) -> Result<String, ClientError> {
    let mut stream = connect(host, port)?;
    write!(stream, "cl:{cmdline}\n")?;
    stream.flush()?;
    let mut reader = BufReader::new(stream);
    read_reply(&mut reader)
}

/// `--get`: download a script by name into `file`.
pub fn get_script(host: &str, port: u16, name: &str, file: &Path) -> Result<(), ClientError> {
    let mut stream = connect(host, port)?;
    write!(stream, "ss:{name}\n")?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut receiver = ScriptReceiver::default();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Err(ClientError::Protocol(
                "connection closed during transfer".into(),
            ));
        }
        if receiver.feed(line.trim_end()) {
            break;
        }
    }

    match receiver.state() {
        RecvState::Finished => {
            std::fs::write(file, receiver.script())?;
            Ok(())
        }
        _ => Err(ClientError::Daemon(
            receiver.error().unwrap_or("script receive error").to_string(),
        )),
    }
}

/// `--put`: syntax-check `file` locally, then upload it under `name`.
pub fn put_script(host: &str, port: u16, name: &str, file: &Path) -> Result<(), ClientError> {
    let text = std::fs::read_to_string(file)?;
    check_script(&text)?;

    let mut stream = connect(host, port)?;
    write!(stream, "rs:{name}\n")?;
    for line in frame_script(name, &text) {
        stream.write_all(line.as_bytes())?;
    }
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let reply = read_reply(&mut reader)?;
    if let Some(msg) = reply.strip_prefix("er:") {
        return Err(ClientError::Daemon(msg.to_string()));
    }
    Ok(())
}

/// `--check`: compile a script file locally and report diagnostics.
pub fn check_file(file: &Path) -> Result<(), ClientError> {
    let text = std::fs::read_to_string(file)?;
    check_script(&text)?;
    Ok(())
}
