// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Core runtime for the xPL daemon: the readiness poller, the dedicated
//! receive thread, and the service registry with its hub-discovery state
//! machine and heartbeat timing.

pub mod engine;
pub mod ident;
pub mod poller;
pub mod rx;

pub use engine::{
    Delivery, DiscoveryState, Engine, EngineConfig, EngineError, MessageListener, MsgClass,
    ReportMode, ServiceId, DEFAULT_HEARTBEAT_INTERVAL,
};
pub use poller::{PollDispatch, Poller, Registrar, TimeoutId, Watch};
pub use rx::{Receiver, RxError, TERM_REQUEST};
