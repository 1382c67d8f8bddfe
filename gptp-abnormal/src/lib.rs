//! Building blocks for injecting abnormal events into a running gptp2d.
//!
//! gptp2d can be built with abnormal hooks in its send path. Through its IPC
//! socket a client registers an *abnormal event*: for a given message type the
//! daemon then skips, duplicates or corrupts outgoing messages, or pretends
//! their transmit timestamp got lost. This crate contains everything about
//! such events that does not touch the operating system:
//!
//! * the message and event type tables the daemon uses
//!   ([`MessageType`], [`EventType`]),
//! * the operator facing description of a fault ([`FaultSpec`]) and its
//!   validated form ([`ResolvedFault`]),
//! * the binary request sent to the daemon ([`ControlMessage`]),
//! * the per fault timing state machine ([`EventTimer`]).
//!
//! Spawning the daemons and multiplexing their output lives in the
//! `gptp-abnormal-linux` crate.

#![forbid(unsafe_code)]

pub mod datastructures;
pub mod fault;
pub mod ipc;
pub mod timer;

pub use datastructures::{EventType, MessageType};
pub use fault::{FaultSpec, InvalidEventConfig, ResolvedFault};
pub use ipc::ControlMessage;
pub use timer::{EventTimer, TimerAction, TimerState};
