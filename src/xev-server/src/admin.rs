// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Admin TCP server.
//!
//! Line-oriented protocol on the main poller, one session state machine
//! per connection:
//!
//! - `cl:<cmdline>` runs a command (`exec <scriptname>`)
//! - `ss:<name>` downloads a script as `sb:/sl:/se:` frames
//! - `rs:<name>` announces an upload; the following `sb:/sl:/se:` frames
//!   are collected and stored
//! - every command is answered with `ok:` or `er:<msg>`
//!
//! Sockets are non-blocking; reads and writes are buffered per connection
//! and interest is widened to writable only while output is pending.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::os::fd::AsRawFd;

use mio::net::{TcpListener, TcpStream};
use mio::Token;
use tracing::{debug, info, warn};

use xev_core::{Engine, Registrar, Watch};
use xev_proto::ServiceTag;
use xev_store::Store;

use crate::scripts::run_script;
use crate::transfer::{frame_script, ScriptReceiver};

/// Connection tokens start here; lower tokens name the fixed sources.
pub const ADMIN_TOKEN_BASE: usize = 16;

/// A read buffer larger than this without a newline is protocol abuse.
const MAX_PENDING_LINE: usize = 4096;

/// What command handling needs besides the connection itself.
pub struct AdminCtx<'a> {
    pub engine: &'a mut Engine,
    pub store: &'a dyn Store,
    pub local_tag: &'a ServiceTag,
}

struct Conn {
    stream: TcpStream,
    peer: SocketAddr,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
    recv: Option<ScriptReceiver>,
    closing: bool,
    mask: Watch,
}

impl Conn {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            read_buf: Vec::new(),
            write_buf: Vec::new(),
            recv: None,
            closing: false,
            mask: Watch::IN,
        }
    }

    fn queue(&mut self, text: &str) {
        self.write_buf.extend_from_slice(text.as_bytes());
    }

    fn respond(&mut self, line: &str) {
        debug!(peer = %self.peer, response = line, "admin response");
        self.queue(line);
        self.queue("\n");
    }

    /// Read everything available; returns false when the peer hung up.
    fn fill(&mut self) -> io::Result<bool> {
        let mut chunk = [0u8; 1024];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) => return Err(e),
            }
        }
    }

    /// Write as much buffered output as the socket takes.
    fn flush(&mut self) -> io::Result<()> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "socket write zero"));
                }
                Ok(n) => {
                    self.write_buf.drain(..n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn desired_mask(&self) -> Watch {
        if self.write_buf.is_empty() {
            Watch::IN
        } else {
            Watch::IN | Watch::OUT
        }
    }

    /// Pop complete lines off the read buffer and process them.
    fn drain_lines(&mut self, ctx: &mut AdminCtx<'_>) {
        while let Some(pos) = self.read_buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.read_buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.is_empty() {
                self.process_line(line, ctx);
            }
        }
        if self.read_buf.len() > MAX_PENDING_LINE {
            warn!(peer = %self.peer, "admin line too long, dropping connection");
            self.closing = true;
        }
    }

    fn process_line(&mut self, line: &str, ctx: &mut AdminCtx<'_>) {
        if self.recv.is_some() {
            self.continue_upload(line, ctx);
            return;
        }

        debug!(peer = %self.peer, line, "admin line");
        if let Some(cmdline) = line.strip_prefix("cl:") {
            self.client_command(cmdline, ctx);
        } else if let Some(name) = line.strip_prefix("ss:") {
            self.send_script(name, ctx);
        } else if line.strip_prefix("rs:").is_some() {
            debug!(peer = %self.peer, "upload announced");
            self.recv = Some(ScriptReceiver::default());
        }
        // Anything else on an idle session is ignored.
    }

    fn continue_upload(&mut self, line: &str, ctx: &mut AdminCtx<'_>) {
        let Some(rx) = self.recv.as_mut() else {
            return;
        };
        if !rx.feed(line) {
            return;
        }
        let rx = self
            .recv
            .take()
            .unwrap_or_else(|| unreachable!("upload receiver was just fed"));

        if rx.is_error() {
            self.respond(&format!("er:{}", rx.error().unwrap_or("script receive error")));
            return;
        }
        let Some(name) = rx.name() else {
            self.respond("er:script receive error");
            return;
        };
        match ctx.store.upsert_script(name, rx.script()) {
            Ok(()) => {
                info!(script = name, "script stored");
                self.respond("ok:");
            }
            Err(e) => {
                warn!("error while saving script: {e}");
                self.respond("er:could not save script");
            }
        }
    }

    fn client_command(&mut self, cmdline: &str, ctx: &mut AdminCtx<'_>) {
        let mut parts = cmdline.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("exec"), Some(name)) => match ctx.store.fetch_script(name) {
                Ok(Some(text)) => {
                    match run_script(ctx.engine, ctx.local_tag, ctx.store, &text, None) {
                        Ok(_) => self.respond("ok:"),
                        Err(e) => self.respond(&format!("er:{e}")),
                    }
                }
                Ok(None) => self.respond("er:script not in database"),
                Err(e) => self.respond(&format!("er:{e}")),
            },
            (Some("exec"), None) => self.respond("er:exec requires a script name"),
            _ => self.respond("er:command not recognized"),
        }
    }

    fn send_script(&mut self, name: &str, ctx: &mut AdminCtx<'_>) {
        match ctx.store.fetch_script(name) {
            Ok(Some(script)) => {
                for line in frame_script(name, &script) {
                    self.queue(&line);
                }
            }
            Ok(None) => self.respond("er:script not in database"),
            Err(e) => self.respond(&format!("er:{e}")),
        }
    }
}

pub struct AdminServer {
    listener: TcpListener,
    conns: HashMap<Token, Conn>,
    next_token: usize,
}

impl AdminServer {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        info!(%addr, "admin server listening");
        Ok(Self {
            listener,
            conns: HashMap::new(),
            next_token: ADMIN_TOKEN_BASE,
        })
    }

    pub fn listener_fd(&self) -> std::os::fd::RawFd {
        self.listener.as_raw_fd()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn owns(&self, token: Token) -> bool {
        self.conns.contains_key(&token)
    }

    /// Accept every pending connection and register it for reads.
    pub fn accept(&mut self, reg: &Registrar) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    if let Err(e) = reg.register(stream.as_raw_fd(), Watch::IN, token) {
                        warn!("could not register admin connection: {e}");
                        continue;
                    }
                    info!(%peer, "admin client connected");
                    self.conns.insert(token, Conn::new(stream, peer));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("admin accept error: {e}");
                    break;
                }
            }
        }
    }

    /// Handle readiness on one connection token.
    pub fn handle_event(
        &mut self,
        reg: &Registrar,
        token: Token,
        events: Watch,
        ctx: &mut AdminCtx<'_>,
    ) {
        let Some(conn) = self.conns.get_mut(&token) else {
            return;
        };

        if events.contains(Watch::IN) || events.contains(Watch::RD_HUP) {
            match conn.fill() {
                Ok(true) => conn.drain_lines(ctx),
                Ok(false) => {
                    // Peer closed; whatever lines arrived still run.
                    conn.drain_lines(ctx);
                    conn.closing = true;
                }
                Err(e) => {
                    warn!(peer = %conn.peer, "admin read error: {e}");
                    conn.closing = true;
                }
            }
        }

        if let Err(e) = conn.flush() {
            warn!(peer = %conn.peer, "admin write error: {e}");
            conn.closing = true;
        }

        if conn.closing {
            info!(peer = %conn.peer, "admin client disconnected");
            if let Err(e) = reg.unregister(conn.stream.as_raw_fd()) {
                debug!("admin connection unregister: {e}");
            }
            self.conns.remove(&token);
            return;
        }

        // Widen or narrow interest depending on pending output.
        let desired = conn.desired_mask();
        if desired != conn.mask {
            if let Err(e) = reg.reregister(conn.stream.as_raw_fd(), desired, token) {
                warn!("admin connection reregister failed: {e}");
            } else {
                conn.mask = desired;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use xev_core::EngineConfig;
    use xev_store::MemoryStore;

    struct Fixture {
        engine: Engine,
        store: MemoryStore,
        tag: ServiceTag,
        _capture: std::net::UdpSocket,
    }

    impl Fixture {
        fn new() -> Self {
            let capture = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
            let cfg = EngineConfig {
                ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                broadcast: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: capture.local_addr().unwrap().port(),
            };
            let (engine, _rx) = Engine::new(&cfg).unwrap();
            Self {
                engine,
                store: MemoryStore::new(),
                tag: "xev-event.main".parse().unwrap(),
                _capture: capture,
            }
        }
    }

    /// A connection backed by a real localhost socket pair.
    fn conn_pair() -> (Conn, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server_side, peer) = listener.accept().unwrap();
        server_side.set_nonblocking(true).unwrap();
        (
            Conn::new(TcpStream::from_std(server_side), peer),
            client,
        )
    }

    fn process(conn: &mut Conn, fx: &mut Fixture, line: &str) {
        let mut ctx = AdminCtx {
            engine: &mut fx.engine,
            store: &fx.store,
            local_tag: &fx.tag,
        };
        conn.process_line(line, &mut ctx);
    }

    fn queued(conn: &Conn) -> String {
        String::from_utf8_lossy(&conn.write_buf).into_owned()
    }

    #[test]
    fn exec_of_missing_script_reports_error() {
        let mut fx = Fixture::new();
        let (mut conn, _client) = conn_pair();
        process(&mut conn, &mut fx, "cl:exec nosuch");
        assert_eq!(queued(&conn), "er:script not in database\n");
    }

    #[test]
    fn exec_runs_stored_script() {
        let mut fx = Fixture::new();
        fx.store
            .upsert_script("noop", "%scratch{ran} = 1;")
            .unwrap();
        let (mut conn, _client) = conn_pair();
        process(&mut conn, &mut fx, "cl:exec noop");
        assert_eq!(queued(&conn), "ok:\n");
    }

    #[test]
    fn exec_of_failing_script_reports_reason() {
        let mut fx = Fixture::new();
        fx.store
            .upsert_script("broken", "%a{b} = %missing{key};")
            .unwrap();
        let (mut conn, _client) = conn_pair();
        process(&mut conn, &mut fx, "cl:exec broken");
        let out = queued(&conn);
        assert!(out.starts_with("er:"), "got {out}");
        assert!(out.contains("undefined"));
    }

    #[test]
    fn unknown_command_is_rejected() {
        let mut fx = Fixture::new();
        let (mut conn, _client) = conn_pair();
        process(&mut conn, &mut fx, "cl:frobnicate");
        assert_eq!(queued(&conn), "er:command not recognized\n");
    }

    #[test]
    fn download_frames_the_script() {
        let mut fx = Fixture::new();
        fx.store
            .upsert_script("porch", "%xplout{a} = 1;\n%xplout{b} = 2;\n")
            .unwrap();
        let (mut conn, _client) = conn_pair();
        process(&mut conn, &mut fx, "ss:porch");
        assert_eq!(
            queued(&conn),
            "sb:porch\nsl:%xplout{a} = 1;\nsl:%xplout{b} = 2;\nse:porch\n"
        );
    }

    #[test]
    fn download_of_missing_script_errors() {
        let mut fx = Fixture::new();
        let (mut conn, _client) = conn_pair();
        process(&mut conn, &mut fx, "ss:nosuch");
        assert_eq!(queued(&conn), "er:script not in database\n");
    }

    #[test]
    fn upload_session_stores_script() {
        let mut fx = Fixture::new();
        let (mut conn, _client) = conn_pair();
        for line in [
            "rs:porch",
            "sb:porch",
            "sl:%xplout{a} = 1;",
            "se:porch",
        ] {
            process(&mut conn, &mut fx, line);
        }
        assert_eq!(queued(&conn), "ok:\n");
        assert_eq!(
            fx.store.fetch_script("porch").unwrap().as_deref(),
            Some("%xplout{a} = 1;\n")
        );
    }

    #[test]
    fn upload_abort_reports_error_and_stores_nothing() {
        let mut fx = Fixture::new();
        let (mut conn, _client) = conn_pair();
        for line in ["rs:porch", "sb:porch", "er:client gave up"] {
            process(&mut conn, &mut fx, line);
        }
        let out = queued(&conn);
        assert!(out.starts_with("er:"), "got {out}");
        assert_eq!(fx.store.fetch_script("porch").unwrap(), None);
    }

    #[test]
    fn upload_session_resets_after_completion() {
        let mut fx = Fixture::new();
        let (mut conn, _client) = conn_pair();
        for line in ["rs:a", "sb:a", "sl:%x{y} = 1;", "se:a"] {
            process(&mut conn, &mut fx, line);
        }
        // Back in idle state: commands work again.
        process(&mut conn, &mut fx, "cl:exec a");
        let out = queued(&conn);
        assert!(out.ends_with("ok:\n"), "got {out}");
    }
}
