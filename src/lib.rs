//! `ppc-core`: a multi-protocol privacy-preserving computation node.
//!
//! Three algorithms share one wire format and one task dispatcher:
//! ECDH-PSI (§4.9), CM2020 OT-extension PSI (§4.10), and OT-based PIR
//! (§4.11). [`crypto`] holds the primitives all three build on; [`protocol`]
//! holds the framing, task lifecycle, and per-algorithm state machines;
//! [`transport`] is the seam between a running task and the outside world.

pub mod config;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod transport;

pub use config::{Cm2020Params, EngineConfig};
pub use error::{PpcError, PpcResult};
pub use protocol::engine::EngineHandle;
