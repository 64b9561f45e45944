// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Trigger orchestration.
//!
//! Every broadcast heartbeat updates the heartbeat log. Every broadcast
//! trigger is resolved to a source tag (optionally extended with a
//! sub-address by the `preprocess` script or the canned extraction rules),
//! matched against the script catalog, executed, and logged.

use tracing::{debug, info, warn};

use xev_core::{Delivery, Engine, MessageListener, MsgClass};
use xev_proto::{Message, MessageKind, ServiceTag};
use xev_store::Store;

use crate::scripts::run_script;

/// Name of the optional sub-address extraction script.
const PREPROCESS_SCRIPT: &str = "preprocess";

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Canned sub-address extraction for well-known schemas.
fn canned_subaddress(msg: &Message) -> Option<String> {
    let schema = msg.schema.to_string();
    let key = match schema.as_str() {
        "sensor.basic" => "device",
        "hvac.zone" | "security.gateway" => "zone",
        _ => return None,
    };
    msg.body.get(key).map(str::to_string)
}

/// The per-dispatch listener: everything the orchestrator needs besides
/// the engine, which the dispatcher hands back with each delivery.
pub struct TriggerListener<'a> {
    pub store: &'a dyn Store,
    pub local_tag: ServiceTag,
    pub exit_on_error: bool,
    /// Set when a script failed and `exit_on_error` is on.
    pub abort: Option<String>,
}

impl<'a> TriggerListener<'a> {
    pub fn new(store: &'a dyn Store, local_tag: ServiceTag, exit_on_error: bool) -> Self {
        Self {
            store,
            local_tag,
            exit_on_error,
            abort: None,
        }
    }

    fn script_failed(&mut self, what: &str, reason: String) {
        warn!("{what} failed: {reason}");
        if self.exit_on_error {
            self.abort = Some(reason);
        }
    }

    /// Resolve the sub-address, run any matching script, and return the
    /// final source tag for logging.
    fn check_trigger(&mut self, engine: &mut Engine, msg: &Message) -> String {
        let base_tag = msg.source.to_string();

        let preprocess = match self.store.fetch_script(PREPROCESS_SCRIPT) {
            Ok(script) => script,
            Err(e) => {
                warn!("preprocess lookup failed: {e}");
                None
            }
        };

        let subaddress = match preprocess {
            Some(script) => {
                debug!("preprocess script found");
                match run_script(engine, &self.local_tag, self.store, &script, Some(msg)) {
                    Ok(sub) => sub,
                    Err(e) => {
                        self.script_failed("preprocess script", e.to_string());
                        None
                    }
                }
            }
            None => {
                debug!("no preprocess script, using canned sub-address handling");
                canned_subaddress(msg)
            }
        };

        let source_tag = match subaddress {
            Some(sub) if !sub.is_empty() => format!("{base_tag}:{sub}"),
            _ => base_tag,
        };
        info!(source = %source_tag, "trigger message received");

        match self.store.fetch_script_by_tag(&source_tag) {
            Ok(Some(script)) => {
                if let Err(e) =
                    run_script(engine, &self.local_tag, self.store, &script, Some(msg))
                {
                    self.script_failed("trigger script", e.to_string());
                }
            }
            Ok(None) => debug!(source = %source_tag, "no script mapped to trigger"),
            Err(e) => warn!("trigger script lookup failed: {e}"),
        }

        source_tag
    }
}

impl MessageListener for TriggerListener<'_> {
    fn on_message(&mut self, engine: &mut Engine, msg: &Message, delivery: &Delivery) {
        if !delivery.is_broadcast {
            return;
        }

        if msg.kind == MessageKind::Status && delivery.class == MsgClass::Heartbeat {
            let source = msg.source.to_string();
            debug!(source = %source, "heartbeat status received");
            if let Err(e) = self.store.update_heartbeat_log(&source, unix_now()) {
                warn!("heartbeat log update failed: {e}");
            }
            return;
        }

        if msg.kind == MessageKind::Trigger {
            let source_tag = self.check_trigger(engine, msg);
            if let Err(e) = self.store.update_trigger_log(
                &source_tag,
                &msg.schema.to_string(),
                &msg.body.joined(),
                unix_now(),
            ) {
                warn!("trigger log update failed: {e}");
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

    fn fixture() -> (Engine, std::net::UdpSocket) {
        let capture = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        capture
            .set_read_timeout(Some(std::time::Duration::from_millis(500)))
            .unwrap();
        let cfg = EngineConfig {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            broadcast: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: capture.local_addr().unwrap().port(),
        };
        let (engine, _rx) = Engine::new(&cfg).unwrap();
        (engine, capture)
    }

    fn local_tag() -> ServiceTag {
        "xev-event.main".parse().unwrap()
    }

    fn trigger_frame(body: &str, schema: &str) -> Message {
        let text = format!(
            "xpl-trig\n{{\nhop=1\nsource=acme-sense.garage\ntarget=*\n}}\n{schema}\n{{\n{body}}}\n"
        );
        xev_proto::parse(&text).unwrap()
    }

    fn broadcast_delivery() -> Delivery {
        Delivery {
            service: service_id(),
            class: MsgClass::Normal,
            is_us: false,
            is_broadcast: true,
        }
    }

    fn service_id() -> xev_core::ServiceId {
        // Any id works: the listener never dereferences it.
        let (mut engine, _c) = fixture();
        engine.new_service("x", "y", Some("z"), None).unwrap()
    }

    #[test]
    fn heartbeat_updates_heartbeat_log() {
        let (mut engine, _capture) = fixture();
        let store = MemoryStore::new();
        let mut listener = TriggerListener::new(&store, local_tag(), false);

        let msg = xev_proto::parse(
            "xpl-stat\n{\nhop=1\nsource=acme-node.attic\ntarget=*\n}\nhbeat.app\n{\n\
             interval=5\nport=3865\nremote-ip=192.0.2.9\n}\n",
        )
        .unwrap();
        let delivery = Delivery {
            class: MsgClass::Heartbeat,
            ..broadcast_delivery()
        };
        listener.on_message(&mut engine, &msg, &delivery);

        assert!(store.heartbeat_log("acme-node.attic").is_some());
        assert!(store.trigger_log("acme-node.attic").is_none());
    }

    #[test]
    fn trigger_logs_with_canned_subaddress() {
        let (mut engine, _capture) = fixture();
        let store = MemoryStore::new();
        let mut listener = TriggerListener::new(&store, local_tag(), false);

        let msg = trigger_frame("device=garage\ncurrent=on\n", "sensor.basic");
        listener.on_message(&mut engine, &msg, &broadcast_delivery());

        let row = store.trigger_log("acme-sense.garage:garage").unwrap();
        assert_eq!(row.schema, "sensor.basic");
        assert_eq!(row.nvpairs, "device=garage,current=on");
    }

    #[test]
    fn zone_schemas_use_zone_subaddress() {
        let (mut engine, _capture) = fixture();
        let store = MemoryStore::new();
        let mut listener = TriggerListener::new(&store, local_tag(), false);

        let msg = trigger_frame("zone=2\nmode=heat\n", "hvac.zone");
        listener.on_message(&mut engine, &msg, &broadcast_delivery());
        assert!(store.trigger_log("acme-sense.garage:2").is_some());
    }

    #[test]
    fn unknown_schema_logs_bare_tag() {
        let (mut engine, _capture) = fixture();
        let store = MemoryStore::new();
        let mut listener = TriggerListener::new(&store, local_tag(), false);

        let msg = trigger_frame("text=hi\n", "osd.basic");
        listener.on_message(&mut engine, &msg, &broadcast_delivery());
        assert!(store.trigger_log("acme-sense.garage").is_some());
    }

    #[test]
    fn preprocess_script_overrides_subaddress() {
        let (mut engine, _capture) = fixture();
        let store = MemoryStore::new();
        store
            .upsert_script(
                "preprocess",
                "%result{subaddress} = %xplnvin{current};",
            )
            .unwrap();
        let mut listener = TriggerListener::new(&store, local_tag(), false);

        let msg = trigger_frame("device=garage\ncurrent=on\n", "sensor.basic");
        listener.on_message(&mut engine, &msg, &broadcast_delivery());
        assert!(store.trigger_log("acme-sense.garage:on").is_some());
    }

    #[test]
    fn matching_script_runs_and_sends_command() {
        let (mut engine, capture) = fixture();
        let store = MemoryStore::new();
        store
            .upsert_script(
                "garage_open",
                "%xplin{classtype} eq \"sensor.basic\" { \
                 %xplout{device} = \"siren\"; %xplout{current} = \"on\"; \
                 xplcmd(\"acme-alarm.hall\", \"cmnd\", \"control.basic\", %xplout); }",
            )
            .unwrap();
        store
            .set_trigger_action("acme-sense.garage:garage", "garage_open")
            .unwrap();
        let mut listener = TriggerListener::new(&store, local_tag(), false);

        let msg = trigger_frame("device=garage\ncurrent=on\n", "sensor.basic");
        listener.on_message(&mut engine, &msg, &broadcast_delivery());

        let mut buf = [0u8; 1500];
        let (len, _) = capture.recv_from(&mut buf).unwrap();
        let wire = String::from_utf8_lossy(&buf[..len]);
        assert!(wire.starts_with("xpl-cmnd\n"));
        assert!(wire.contains("target=acme-alarm.hall\n"));
        assert!(wire.contains("device=siren\ncurrent=on\n"));
    }

    #[test]
    fn script_failure_sets_abort_only_when_exiting_on_error() {
        let (mut engine, _capture) = fixture();
        let store = MemoryStore::new();
        store.upsert_script("bad", "%a{b} = %missing{key};").unwrap();
        store.set_trigger_action("acme-sense.garage", "bad").unwrap();

        let msg = trigger_frame("text=hi\n", "osd.basic");

        let mut tolerant = TriggerListener::new(&store, local_tag(), false);
        tolerant.on_message(&mut engine, &msg, &broadcast_delivery());
        assert!(tolerant.abort.is_none());
        // The trigger is still logged after the failure.
        assert!(store.trigger_log("acme-sense.garage").is_some());

        let mut strict = TriggerListener::new(&store, local_tag(), true);
        strict.on_message(&mut engine, &msg, &broadcast_delivery());
        assert!(strict.abort.is_some());
    }

    #[test]
    fn raw_trigger_datagram_flows_through_dispatch() {
        let (mut engine, capture) = fixture();
        let id = engine
            .new_service("xev", "event", Some("main"), None)
            .unwrap();
        engine.enable_service(id).unwrap();
        // Swallow the discovery heartbeat the enable just broadcast.
        let _ = capture.recv_from(&mut [0u8; 1500]);

        let store = MemoryStore::new();
        store
            .upsert_script(
                "porch_light",
                "%xplout{device} = \"porch\"; %xplout{current} = \"on\"; \
                 xplcmd(\"acme-lamp.porch\", \"cmnd\", \"control.basic\", %xplout);",
            )
            .unwrap();
        store
            .set_trigger_action("acme-sense.garage:garage", "porch_light")
            .unwrap();

        let raw = "xpl-trig\n{\nhop=1\nsource=acme-sense.garage\ntarget=*\n}\n\
                   sensor.basic\n{\ndevice=garage\ncurrent=on\n}\n";
        let mut listener = TriggerListener::new(&store, local_tag(), false);
        engine.process_raw(raw, &mut listener).unwrap();

        let mut buf = [0u8; 1500];
        let (len, _) = capture.recv_from(&mut buf).unwrap();
        let wire = String::from_utf8_lossy(&buf[..len]);
        assert!(wire.starts_with("xpl-cmnd\n"));
        assert!(wire.contains("target=acme-lamp.porch\n"));
        assert!(store.trigger_log("acme-sense.garage:garage").is_some());
    }

    #[test]
    fn non_broadcast_deliveries_are_ignored() {
        let (mut engine, _capture) = fixture();
        let store = MemoryStore::new();
        let mut listener = TriggerListener::new(&store, local_tag(), false);

        let mut msg = trigger_frame("device=garage\n", "sensor.basic");
        msg.target = xev_proto::Target::Unicast("xev-event.main".parse().unwrap());
        let delivery = Delivery {
            is_broadcast: false,
            ..broadcast_delivery()
        };
        listener.on_message(&mut engine, &msg, &delivery);
        assert!(store.trigger_log("acme-sense.garage").is_none());
    }
}
