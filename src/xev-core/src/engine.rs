// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Service registry and message dispatcher.
//!
//! Holds the locally hosted services, the broadcast socket, and the local
//! ephemeral port used for hub-echo detection. Drives the per-service
//! hub-discovery state machine and heartbeat timing from a 1 Hz tick, and
//! classifies and routes every received message through the per-service
//! reporting filter to the installed listener.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::{SystemTime, UNIX_EPOCH};

use mio::net::UdpSocket;
use thiserror::Error;
use tracing::{debug, info, warn};

use xev_proto::{
    encode, parse, FrameError, Message, MessageKind, Schema, ServiceTag, TagError, Target,
};

use crate::ident;

/// Heartbeat interval for a confirmed service, seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL: u32 = 300;

/// Heartbeat cadence while searching for a hub, seconds.
const HUB_DISCOVERY_INTERVAL: u32 = 3;

/// Fallback cadence after discovery gives up, seconds.
const HUB_NO_ECHO_INTERVAL: u32 = 60;

/// Discovery heartbeats sent before backing off to `NoEcho`.
const DISCOVERY_MAX_TRIES: u32 = 40;

/// Longest accepted heartbeat interval, seconds (two days).
const MAX_HEARTBEAT_INTERVAL: u32 = 172_800;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Frame(#[from] FrameError),
    #[error("{0}")]
    Tag(#[from] TagError),
    #[error("no such service")]
    UnknownService,
}

/// Per-service hub discovery progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Unconfirmed,
    NoEcho,
    Confirmed,
}

/// What a service wants reported to its listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Everything,
    OwnMessages,
    ConfigOnly,
    Normal,
}

/// Classification of a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgClass {
    Heartbeat,
    Group,
    Config,
    Normal,
}

/// Stable handle for a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId(usize);

/// Delivery context handed to the listener with each reported message.
#[derive(Debug, Clone, Copy)]
pub struct Delivery {
    pub service: ServiceId,
    pub class: MsgClass,
    pub is_us: bool,
    pub is_broadcast: bool,
}

/// Installed by the daemon to receive dispatched messages. The engine
/// hands itself back so a listener can transmit (scripts emitting
/// commands) while a dispatch is in flight.
pub trait MessageListener {
    fn on_message(&mut self, engine: &mut Engine, msg: &Message, delivery: &Delivery);
}

struct Service {
    tag: ServiceTag,
    version: Option<String>,
    enabled: bool,
    heartbeat_interval: u32,
    heartbeat_remaining: u32,
    discovery: DiscoveryState,
    discovery_tries: u32,
    last_heartbeat_at: Option<i64>,
    report_mode: ReportMode,
    report_group: bool,
    cached_heartbeat: Option<Message>,
}

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Local interface address, advertised as `remote-ip` in heartbeats.
    pub ip: IpAddr,
    /// Destination address for broadcast transmissions.
    pub broadcast: IpAddr,
    /// xPL service port, normally 3865.
    pub port: u16,
}

pub struct Engine {
    services: Vec<Option<Service>>,
    broadcast: UdpSocket,
    broadcast_addr: SocketAddr,
    local_port: u16,
    remote_ip: String,
    uniq_prefix: String,
    ticks: u64,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn millis_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn addr_octets(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

impl Engine {
    /// Bind the broadcast (TX) and local (RX) sockets. The RX socket takes
    /// the ephemeral port advertised in heartbeats and is handed to the
    /// receive thread by the caller.
    pub fn new(cfg: &EngineConfig) -> Result<(Engine, UdpSocket), EngineError> {
        let local = std::net::UdpSocket::bind((cfg.ip, 0))?;
        local.set_broadcast(true)?;
        local.set_nonblocking(true)?;
        let local_port = local.local_addr()?.port();
        let rx_socket = UdpSocket::from_std(local);

        let tx = std::net::UdpSocket::bind((cfg.ip, 0))?;
        tx.set_broadcast(true)?;
        tx.set_nonblocking(true)?;
        let broadcast = UdpSocket::from_std(tx);
        let broadcast_addr = SocketAddr::new(cfg.broadcast, cfg.port);

        let uniq_prefix = ident::unique_prefix(&addr_octets(cfg.ip));
        debug!(port = local_port, prefix = %uniq_prefix, "xpl engine sockets ready");

        Ok((
            Engine {
                services: Vec::new(),
                broadcast,
                broadcast_addr,
                local_port,
                remote_ip: cfg.ip.to_string(),
                uniq_prefix,
                ticks: 0,
            },
            rx_socket,
        ))
    }

    /// The ephemeral port the hub echoes to; carried in heartbeat bodies.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Create a disabled service. A `None` instance id gets an
    /// auto-generated one.
    pub fn new_service(
        &mut self,
        vendor: &str,
        device: &str,
        instance: Option<&str>,
        version: Option<&str>,
    ) -> Result<ServiceId, EngineError> {
        let generated;
        let instance = match instance {
            Some(id) => id,
            None => {
                generated = ident::fairly_unique_instance(&self.uniq_prefix, millis_now());
                debug!(instance = %generated, "generated instance id");
                &generated
            }
        };
        let tag = ServiceTag::new(vendor, device, instance)?;
        let service = Service {
            tag,
            version: version.map(str::to_string),
            enabled: false,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_remaining: 0,
            discovery: DiscoveryState::Unconfirmed,
            discovery_tries: 0,
            last_heartbeat_at: None,
            report_mode: ReportMode::Normal,
            report_group: false,
            cached_heartbeat: None,
        };
        self.services.push(Some(service));
        Ok(ServiceId(self.services.len() - 1))
    }

    /// Remove a service, disabling it (goodbye heartbeat) first if needed.
    pub fn destroy_service(&mut self, id: ServiceId) -> Result<(), EngineError> {
        if self.service(id)?.enabled {
            self.disable_service(id)?;
        }
        self.services[id.0] = None;
        Ok(())
    }

    fn service(&self, id: ServiceId) -> Result<&Service, EngineError> {
        self.services
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(EngineError::UnknownService)
    }

    fn service_mut(&mut self, id: ServiceId) -> Result<&mut Service, EngineError> {
        self.services
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(EngineError::UnknownService)
    }

    pub fn service_tag(&self, id: ServiceId) -> Result<&ServiceTag, EngineError> {
        Ok(&self.service(id)?.tag)
    }

    pub fn discovery_state(&self, id: ServiceId) -> Result<DiscoveryState, EngineError> {
        Ok(self.service(id)?.discovery)
    }

    pub fn heartbeat_remaining(&self, id: ServiceId) -> Result<u32, EngineError> {
        Ok(self.service(id)?.heartbeat_remaining)
    }

    pub fn last_heartbeat_at(&self, id: ServiceId) -> Result<Option<i64>, EngineError> {
        Ok(self.service(id)?.last_heartbeat_at)
    }

    /// Change the confirmed-state heartbeat interval. Out-of-range values
    /// are ignored.
    pub fn set_heartbeat_interval(&mut self, id: ServiceId, seconds: u32) -> Result<(), EngineError> {
        if seconds == 0 || seconds > MAX_HEARTBEAT_INTERVAL {
            return Ok(());
        }
        self.service_mut(id)?.heartbeat_interval = seconds;
        Ok(())
    }

    /// Configure what the listener sees for this service.
    pub fn set_report_mode(
        &mut self,
        id: ServiceId,
        mode: ReportMode,
        report_group: bool,
    ) -> Result<(), EngineError> {
        let svc = self.service_mut(id)?;
        svc.report_mode = mode;
        svc.report_group = report_group;
        Ok(())
    }

    /// Enable a service: reset discovery and send the first discovery
    /// heartbeat immediately.
    pub fn enable_service(&mut self, id: ServiceId) -> Result<(), EngineError> {
        {
            let svc = self.service_mut(id)?;
            if svc.enabled {
                return Ok(());
            }
            svc.enabled = true;
            svc.cached_heartbeat = None;
            svc.discovery = DiscoveryState::Unconfirmed;
            svc.discovery_tries = 0;
        }
        if !self.send_heartbeat(id)? {
            warn!("initial discovery heartbeat send failed");
        }
        Ok(())
    }

    /// Disable a service and broadcast its goodbye heartbeat.
    pub fn disable_service(&mut self, id: ServiceId) -> Result<(), EngineError> {
        {
            let svc = self.service_mut(id)?;
            if !svc.enabled {
                return Ok(());
            }
            svc.enabled = false;
        }
        let goodbye = self.build_heartbeat(id, true)?;
        if !self.send(&goodbye)? {
            warn!("goodbye heartbeat send failed");
        }
        Ok(())
    }

    fn build_heartbeat(&self, id: ServiceId, goodbye: bool) -> Result<Message, EngineError> {
        let svc = self.service(id)?;
        let schema = if goodbye {
            Schema::new("hbeat", "end")
        } else {
            Schema::new("hbeat", "app")
        };
        let mut msg = Message::broadcast(MessageKind::Status, svc.tag.clone(), schema);
        msg.body
            .push("interval", &(svc.heartbeat_interval / 60).to_string());
        msg.body.push("port", &self.local_port.to_string());
        msg.body.push("remote-ip", &self.remote_ip);
        if let Some(version) = &svc.version {
            msg.body.push("version", version);
        }
        Ok(msg)
    }

    /// Send a heartbeat now and refill the timer from the discovery state.
    /// Returns false when the send failed; the timer is left at zero so the
    /// next tick retries.
    fn send_heartbeat(&mut self, id: ServiceId) -> Result<bool, EngineError> {
        let msg = match self.service(id)?.cached_heartbeat.clone() {
            Some(msg) => msg,
            None => {
                let msg = self.build_heartbeat(id, false)?;
                self.service_mut(id)?.cached_heartbeat = Some(msg.clone());
                msg
            }
        };
        if !self.send(&msg)? {
            return Ok(false);
        }

        let svc = self.service_mut(id)?;
        svc.last_heartbeat_at = Some(unix_now());
        let refill = match svc.discovery {
            DiscoveryState::Unconfirmed => {
                svc.discovery_tries += 1;
                if svc.discovery_tries >= DISCOVERY_MAX_TRIES {
                    warn!(
                        interval = HUB_NO_ECHO_INTERVAL,
                        "no hub found, dropping heartbeat rate"
                    );
                    svc.discovery = DiscoveryState::NoEcho;
                    HUB_NO_ECHO_INTERVAL
                } else {
                    debug!(tries = svc.discovery_tries, "attempting to discover hub");
                    HUB_DISCOVERY_INTERVAL
                }
            }
            DiscoveryState::NoEcho => {
                warn!("still no hub found");
                HUB_NO_ECHO_INTERVAL
            }
            DiscoveryState::Confirmed => svc.heartbeat_interval,
        };
        svc.heartbeat_remaining = refill;
        debug!(interval = refill, service = %svc.tag, "sent heartbeat");
        Ok(true)
    }

    /// 1 Hz tick: send or count down each enabled service's heartbeat.
    pub fn tick(&mut self) {
        self.ticks += 1;
        for idx in 0..self.services.len() {
            let id = ServiceId(idx);
            let due = match self.services[idx].as_ref() {
                Some(svc) if svc.enabled => svc.heartbeat_remaining == 0,
                _ => continue,
            };
            if due {
                match self.send_heartbeat(id) {
                    Ok(true) => {}
                    Ok(false) => warn!("refresh heartbeat send failed"),
                    Err(e) => warn!("refresh heartbeat error: {e}"),
                }
            } else if let Some(svc) = self.services[idx].as_mut() {
                svc.heartbeat_remaining -= 1;
            }
        }
    }

    /// Encode and broadcast one message. Returns false (after logging) on
    /// oversize frames and would-block drops; hard socket errors propagate.
    pub fn send(&mut self, msg: &Message) -> Result<bool, EngineError> {
        let wire = match encode(msg) {
            Ok(wire) => wire,
            Err(e) => {
                warn!("message not sent: {e}");
                return Ok(false);
            }
        };
        match self.broadcast.send_to(wire.as_bytes(), self.broadcast_addr) {
            Ok(n) if n == wire.len() => Ok(true),
            Ok(n) => {
                warn!(sent = n, want = wire.len(), "short datagram send");
                Ok(false)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                warn!("broadcast socket busy, message dropped");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn classify(msg: &Message) -> MsgClass {
        let class = msg.schema.class.as_str();
        let typ = msg.schema.typ.as_str();
        if class == "hbeat" && typ == "app" {
            MsgClass::Heartbeat
        } else if class == "xpl" && typ == "group" {
            MsgClass::Group
        } else if typ == "app" && msg.source.device == "config" {
            MsgClass::Config
        } else {
            MsgClass::Normal
        }
    }

    fn is_heartbeat_request(msg: &Message) -> bool {
        msg.schema.class == "hbeat"
            && msg.schema.typ == "request"
            && msg.body.get("command") == Some("request")
    }

    /// Parse one raw datagram and dispatch it. Parse failures propagate so
    /// the caller can log the offset and drop the packet.
    pub fn process_raw(
        &mut self,
        raw: &str,
        listener: &mut impl MessageListener,
    ) -> Result<(), FrameError> {
        let msg = parse(raw)?;
        self.dispatch(&msg, listener);
        Ok(())
    }

    /// Classify a message and run it through each enabled service's
    /// reporting filter, then hand the resulting deliveries to the
    /// listener one by one.
    pub fn dispatch(&mut self, msg: &Message, listener: &mut impl MessageListener) {
        let deliveries = self.route(msg);
        for delivery in deliveries {
            listener.on_message(self, msg, &delivery);
        }
    }

    fn route(&mut self, msg: &Message) -> Vec<Delivery> {
        let class = Self::classify(msg);
        let is_broadcast = msg.is_broadcast();

        if Self::is_heartbeat_request(msg) {
            // A hub is collecting heartbeats; accelerate everyone's next one
            // into the 2..=6 second window.
            for svc in self.services.iter_mut().flatten() {
                let mut r = svc.heartbeat_remaining % 7;
                if r < 2 {
                    r += 2;
                }
                svc.heartbeat_remaining = r;
            }
        }

        let mut deliveries = Vec::new();
        for idx in 0..self.services.len() {
            let Some(svc) = self.services[idx].as_mut() else {
                continue;
            };
            if !svc.enabled {
                continue;
            }

            let is_us = svc.tag.matches(&msg.source);
            if is_us && class == MsgClass::Heartbeat && svc.discovery != DiscoveryState::Confirmed
            {
                info!(service = %svc.tag, "hub confirmed");
                svc.discovery = DiscoveryState::Confirmed;
                svc.heartbeat_remaining = svc.heartbeat_interval;
            }

            let report = match svc.report_mode {
                ReportMode::Everything => true,
                ReportMode::OwnMessages => is_us,
                ReportMode::ConfigOnly => class == MsgClass::Config,
                ReportMode::Normal => {
                    if is_broadcast {
                        !is_us
                    } else if class == MsgClass::Group {
                        svc.report_group
                    } else {
                        match &msg.target {
                            Target::Unicast(t) => svc.tag.matches(t),
                            Target::Broadcast => false,
                        }
                    }
                }
            };

            if report {
                deliveries.push(Delivery {
                    service: ServiceId(idx),
                    class,
                    is_us,
                    is_broadcast,
                });
            }
        }
        deliveries
    }

    #[cfg(test)]
    fn force_heartbeat_remaining(&mut self, id: ServiceId, value: u32) {
        self.services[id.0].as_mut().unwrap().heartbeat_remaining = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, UdpSocket as StdUdp};
    use std::time::Duration;

    /// Engine wired to a capture socket standing in for the hub.
    fn engine_fixture() -> (Engine, StdUdp) {
        let hub = StdUdp::bind("127.0.0.1:0").unwrap();
        hub.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
        let cfg = EngineConfig {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            broadcast: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: hub.local_addr().unwrap().port(),
        };
        let (engine, _rx_socket) = Engine::new(&cfg).unwrap();
        (engine, hub)
    }

    fn recv_frame(hub: &StdUdp) -> String {
        let mut buf = [0u8; 1500];
        let (len, _) = hub.recv_from(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..len]).into_owned()
    }

    struct Collect {
        seen: Vec<(MsgClass, bool, bool)>,
    }

    impl MessageListener for Collect {
        fn on_message(&mut self, _engine: &mut Engine, _msg: &Message, d: &Delivery) {
            self.seen.push((d.class, d.is_us, d.is_broadcast));
        }
    }

    fn echo_heartbeat(tag: &str) -> String {
        format!(
            "xpl-stat\n{{\nhop=1\nsource={tag}\ntarget=*\n}}\nhbeat.app\n{{\n\
             interval=5\nport=12345\nremote-ip=192.0.2.1\n}}\n"
        )
    }

    #[test]
    fn enable_sends_discovery_heartbeat() {
        let (mut engine, hub) = engine_fixture();
        let id = engine
            .new_service("acme", "test", Some("default"), Some("1.0"))
            .unwrap();
        engine.enable_service(id).unwrap();

        let frame = recv_frame(&hub);
        assert!(frame.starts_with("xpl-stat\n"));
        assert!(frame.contains("source=acme-test.default\n"));
        assert!(frame.contains("hbeat.app\n"));
        assert!(frame.contains(&format!("port={}\n", engine.local_port())));
        assert!(frame.contains("version=1.0\n"));
        assert_eq!(
            engine.discovery_state(id).unwrap(),
            DiscoveryState::Unconfirmed
        );
        assert_eq!(engine.heartbeat_remaining(id).unwrap(), 3);
    }

    #[test]
    fn heartbeat_echo_confirms_discovery() {
        let (mut engine, _hub) = engine_fixture();
        let id = engine
            .new_service("acme", "test", Some("default"), None)
            .unwrap();
        engine.enable_service(id).unwrap();

        let mut listener = Collect { seen: Vec::new() };
        engine
            .process_raw(&echo_heartbeat("acme-test.default"), &mut listener)
            .unwrap();

        assert_eq!(
            engine.discovery_state(id).unwrap(),
            DiscoveryState::Confirmed
        );
        assert_eq!(
            engine.heartbeat_remaining(id).unwrap(),
            DEFAULT_HEARTBEAT_INTERVAL
        );
        // Own broadcast is suppressed under Normal reporting.
        assert!(listener.seen.is_empty());
    }

    #[test]
    fn foreign_heartbeat_does_not_confirm() {
        let (mut engine, _hub) = engine_fixture();
        let id = engine
            .new_service("acme", "test", Some("default"), None)
            .unwrap();
        engine.enable_service(id).unwrap();

        let mut listener = Collect { seen: Vec::new() };
        engine
            .process_raw(&echo_heartbeat("other-node.main"), &mut listener)
            .unwrap();

        assert_eq!(
            engine.discovery_state(id).unwrap(),
            DiscoveryState::Unconfirmed
        );
        // Foreign broadcast heartbeat is reported normally.
        assert_eq!(listener.seen, vec![(MsgClass::Heartbeat, false, true)]);
    }

    #[test]
    fn discovery_backs_off_after_max_tries() {
        let (mut engine, hub) = engine_fixture();
        let id = engine
            .new_service("acme", "test", Some("default"), None)
            .unwrap();
        engine.enable_service(id).unwrap();

        for _ in 0..DISCOVERY_MAX_TRIES {
            engine.force_heartbeat_remaining(id, 0);
            engine.tick();
        }
        assert_eq!(engine.discovery_state(id).unwrap(), DiscoveryState::NoEcho);
        assert_eq!(
            engine.heartbeat_remaining(id).unwrap(),
            HUB_NO_ECHO_INTERVAL
        );
        // Drain whatever the hub capture socket buffered.
        while hub.recv_from(&mut [0u8; 1500]).is_ok() {}
    }

    #[test]
    fn tick_decrements_until_send() {
        let (mut engine, hub) = engine_fixture();
        let id = engine
            .new_service("acme", "test", Some("default"), None)
            .unwrap();
        engine.enable_service(id).unwrap();
        let _ = recv_frame(&hub);

        let before = engine.heartbeat_remaining(id).unwrap();
        engine.tick();
        assert_eq!(engine.heartbeat_remaining(id).unwrap(), before - 1);
    }

    #[test]
    fn heartbeat_request_clamps_remaining() {
        let (mut engine, _hub) = engine_fixture();
        let id = engine
            .new_service("acme", "test", Some("default"), None)
            .unwrap();
        engine.enable_service(id).unwrap();
        engine.force_heartbeat_remaining(id, 100);

        let frame = "xpl-cmnd\n{\nhop=1\nsource=hub-query.main\ntarget=*\n}\n\
                     hbeat.request\n{\ncommand=request\n}\n";
        let mut listener = Collect { seen: Vec::new() };
        engine.process_raw(frame, &mut listener).unwrap();

        let r = engine.heartbeat_remaining(id).unwrap();
        assert!((2..=6).contains(&r), "remaining {r} outside [2,6]");
    }

    #[test]
    fn disable_sends_goodbye() {
        let (mut engine, hub) = engine_fixture();
        let id = engine
            .new_service("acme", "test", Some("default"), None)
            .unwrap();
        engine.enable_service(id).unwrap();
        let _ = recv_frame(&hub);

        engine.disable_service(id).unwrap();
        let frame = recv_frame(&hub);
        assert!(frame.contains("hbeat.end\n"));
    }

    #[test]
    fn targeted_message_reaches_only_matching_service() {
        let (mut engine, _hub) = engine_fixture();
        let a = engine.new_service("acme", "test", Some("one"), None).unwrap();
        let b = engine.new_service("acme", "test", Some("two"), None).unwrap();
        engine.enable_service(a).unwrap();
        engine.enable_service(b).unwrap();

        let frame = "xpl-cmnd\n{\nhop=1\nsource=other-node.main\ntarget=acme-test.one\n}\n\
                     control.basic\n{\ncurrent=on\n}\n";

        struct ByService {
            hits: Vec<ServiceId>,
        }
        impl MessageListener for ByService {
            fn on_message(&mut self, _engine: &mut Engine, _msg: &Message, d: &Delivery) {
                self.hits.push(d.service);
            }
        }
        let mut listener = ByService { hits: Vec::new() };
        engine.process_raw(frame, &mut listener).unwrap();
        assert_eq!(listener.hits, vec![a]);
    }

    #[test]
    fn report_modes_filter_deliveries() {
        let (mut engine, _hub) = engine_fixture();
        let id = engine
            .new_service("acme", "test", Some("default"), None)
            .unwrap();
        engine.enable_service(id).unwrap();

        let own = echo_heartbeat("acme-test.default");
        let foreign = "xpl-trig\n{\nhop=1\nsource=acme-sense.pool\ntarget=*\n}\n\
                       sensor.basic\n{\ndevice=pump\ncurrent=on\n}\n";

        // OwnMessages: only our own traffic.
        engine
            .set_report_mode(id, ReportMode::OwnMessages, false)
            .unwrap();
        let mut listener = Collect { seen: Vec::new() };
        engine.process_raw(&own, &mut listener).unwrap();
        engine.process_raw(foreign, &mut listener).unwrap();
        assert_eq!(listener.seen, vec![(MsgClass::Heartbeat, true, true)]);

        // Everything: both.
        engine
            .set_report_mode(id, ReportMode::Everything, false)
            .unwrap();
        let mut listener = Collect { seen: Vec::new() };
        engine.process_raw(&own, &mut listener).unwrap();
        engine.process_raw(foreign, &mut listener).unwrap();
        assert_eq!(listener.seen.len(), 2);

        // ConfigOnly: neither of these.
        engine
            .set_report_mode(id, ReportMode::ConfigOnly, false)
            .unwrap();
        let mut listener = Collect { seen: Vec::new() };
        engine.process_raw(&own, &mut listener).unwrap();
        engine.process_raw(foreign, &mut listener).unwrap();
        assert!(listener.seen.is_empty());
    }

    #[test]
    fn auto_generated_instance_is_well_formed() {
        let (mut engine, _hub) = engine_fixture();
        let id = engine.new_service("acme", "test", None, None).unwrap();
        let tag = engine.service_tag(id).unwrap();
        assert_eq!(tag.instance.len(), 12);
    }
}
