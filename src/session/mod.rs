//! Session lifecycle: the connect/disconnect state machine and its heartbeat.

pub mod controller;
pub mod heartbeat;
