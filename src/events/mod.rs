//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to lifecycle events emitted by the verticle runtime,
//! the module resolver and the redeploy engines.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `VerticleRuntime` (deploy/undeploy), `ModuleResolver`
//!   (install), `PollingRedeployer`/`WatchRedeployer` (module changes).
//! - **Consumers**: anything that subscribes; the bus is non-persistent and
//!   the runtime operates fine with zero subscribers.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
