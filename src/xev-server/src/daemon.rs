// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! The daemon's world and main loop.
//!
//! Process-wide state lives in one explicit [`World`] threaded through the
//! poll dispatcher: the xPL engine, the receive-thread handle, the store,
//! the scheduler, and the admin server. The main loop blocks only in the
//! poller; a one-second deadline drives heartbeats, the watchdog assert,
//! and the scheduler.

use std::time::{Duration, Instant};

use mio::Token;
use signal_hook_mio::v1_0::Signals;
use tracing::{debug, info, warn};

use xev_app::Config;
use xev_core::{
    Engine, PollDispatch, Poller, Receiver, Registrar, ServiceId, TimeoutId, Watch,
};
use xev_proto::ServiceTag;
use xev_sched::{SchedAction, Scheduler};
use xev_store::Store;

use crate::admin::{AdminCtx, AdminServer};
use crate::error::ServerError;
use crate::scripts::run_script;
use crate::triggers::TriggerListener;

pub const RX_READY: Token = Token(0);
pub const SIGNALS_TOKEN: Token = Token(1);
pub const ADMIN_LISTENER: Token = Token(2);

const TICK: Duration = Duration::from_secs(1);

/// Receive-thread liveness is asserted every this many ticks.
const WATCHDOG_PERIOD: u64 = 10;

pub struct World {
    cfg: Config,
    engine: Engine,
    service: ServiceId,
    local_tag: ServiceTag,
    receiver: Receiver,
    store: Box<dyn Store>,
    scheduler: Scheduler,
    admin: Option<AdminServer>,
    signals: Signals,
    shutdown: bool,
    fatal: Option<ServerError>,
    schedule_loaded: bool,
    ticks: u64,
}

impl World {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: Config,
        engine: Engine,
        service: ServiceId,
        receiver: Receiver,
        store: Box<dyn Store>,
        scheduler: Scheduler,
        admin: Option<AdminServer>,
        signals: Signals,
    ) -> Result<Self, ServerError> {
        let local_tag = engine.service_tag(service)?.clone();
        Ok(Self {
            cfg,
            engine,
            service,
            local_tag,
            receiver,
            store,
            scheduler,
            admin,
            signals,
            shutdown: false,
            fatal: None,
            schedule_loaded: false,
            ticks: 0,
        })
    }

    /// Pull every queued datagram off the receive FIFO, in arrival order.
    fn drain_rx(&mut self) {
        while let Some(raw) = self.receiver.try_dequeue() {
            let mut listener = TriggerListener::new(
                &*self.store,
                self.local_tag.clone(),
                self.cfg.general.exit_on_error,
            );
            if let Err(e) = self.engine.process_raw(&raw, &mut listener) {
                warn!("dropping malformed datagram: {e}");
            }
            if let Some(reason) = listener.abort {
                self.fatal = Some(ServerError::ScriptAbort(reason));
                self.shutdown = true;
                return;
            }
        }
    }

    /// One-second housekeeping: heartbeats, watchdog, schedule.
    fn tick(&mut self) -> Result<(), ServerError> {
        self.ticks += 1;
        self.engine.tick();

        if self.ticks % WATCHDOG_PERIOD == WATCHDOG_PERIOD - 1
            && self.receiver.take_watchdog() == 0
        {
            return Err(ServerError::WatchdogStall);
        }

        if !self.schedule_loaded {
            self.schedule_loaded = true;
            match self.store.schedule_entries() {
                Ok(rows) => {
                    let loaded = self.scheduler.load_rows(
                        rows.iter()
                            .map(|r| (r.name.as_str(), r.cron_expr.as_str(), r.script_name.as_str())),
                    );
                    info!(entries = loaded, "schedule loaded");
                    self.scheduler.start();
                }
                Err(e) => {
                    warn!("cannot read schedule table, scheduler disabled: {e}");
                }
            }
        }

        for (entry, action) in self.scheduler.poll() {
            let SchedAction::RunScript(script_name) = action;
            info!(entry = %entry, script = %script_name, "schedule entry fired");
            match self.store.fetch_script(&script_name) {
                Ok(Some(text)) => {
                    if let Err(e) = run_script(
                        &mut self.engine,
                        &self.local_tag,
                        &*self.store,
                        &text,
                        None,
                    ) {
                        warn!("scheduled script failed: {e}");
                        if self.cfg.general.exit_on_error {
                            return Err(ServerError::ScriptAbort(e.to_string()));
                        }
                    }
                }
                Ok(None) => warn!(script = %script_name, "scheduled script not in database"),
                Err(e) => warn!("scheduled script lookup failed: {e}"),
            }
        }
        Ok(())
    }

    /// Goodbye heartbeat, then cooperative receive-thread shutdown.
    fn finish(mut self) -> Result<(), ServerError> {
        info!("shutting down");
        if let Err(e) = self.engine.disable_service(self.service) {
            warn!("goodbye heartbeat failed: {e}");
        }
        self.receiver.shutdown()?;
        Ok(())
    }
}

impl PollDispatch for World {
    fn ready(&mut self, reg: &Registrar, token: Token, events: Watch) {
        match token {
            RX_READY => self.drain_rx(),
            SIGNALS_TOKEN => {
                for signal in self.signals.pending() {
                    info!(signal, "termination signal received");
                    self.shutdown = true;
                }
            }
            ADMIN_LISTENER => {
                if let Some(admin) = self.admin.as_mut() {
                    admin.accept(reg);
                }
            }
            other => {
                let Some(admin) = self.admin.as_mut() else {
                    debug!(token = other.0, "event on unknown token");
                    return;
                };
                if admin.owns(other) {
                    let mut ctx = AdminCtx {
                        engine: &mut self.engine,
                        store: &*self.store,
                        local_tag: &self.local_tag,
                    };
                    admin.handle_event(reg, other, events, &mut ctx);
                } else {
                    debug!(token = other.0, "event on unknown token");
                }
            }
        }
    }

    fn timeout(&mut self, _reg: &Registrar, _id: TimeoutId) {
        // Quiet second; housekeeping runs off the main loop's deadline.
    }
}

/// Run until a termination signal or a fatal condition.
pub fn run(mut poller: Poller, mut world: World) -> Result<(), ServerError> {
    info!(service = %world.local_tag, "daemon running");
    let mut next_tick = Instant::now() + TICK;

    while !world.shutdown {
        let timeout = next_tick.saturating_duration_since(Instant::now());
        poller.wait(Some(timeout), &mut world)?;
        if Instant::now() >= next_tick {
            world.tick()?;
            next_tick += TICK;
        }
    }

    if let Some(fatal) = world.fatal.take() {
        let _ = world.finish();
        return Err(fatal);
    }
    world.finish()
}
