//! Wire framing, task lifecycle, and per-protocol state machines.

pub mod barrier;
pub mod bounded;
pub mod cm2020;
pub mod dispatcher;
pub mod ecdh_psi;
pub mod engine;
pub mod framing;
pub mod ot_pir;
pub mod task;
pub mod timer;
