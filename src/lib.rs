//! geoherd — a federated "proxy herd" of location daemons.
//!
//! Each daemon accepts position reports from mobile clients over a
//! line-oriented TCP protocol, floods them to its statically configured
//! peers so the whole herd converges on every client's latest position, and
//! answers nearby-places queries by calling an external Places search API.
//!
//! Module map, leaves first:
//!
//! * [`protocol`] — wire grammar, parsing, canonical line formatting.
//! * [`store`]    — the per-client last-writer-wins record store.
//! * [`gossip`]   — flood propagation along adjacency edges.
//! * [`places`]   — the Places search HTTP adapter.
//! * [`server`]   — listener, connection handling, verb handlers.
//! * [`config`]   — herd topology and credentials, loaded once at startup.
//! * [`logging`]  — per-daemon terminal + file logging.

pub mod config;
pub mod gossip;
pub mod logging;
pub mod places;
pub mod protocol;
pub mod server;
pub mod store;
