//! Minimal in-process streams with controller capabilities.
//!
//! This is the lowest layer of plexes. A stream direction is split into:
//! - a [`ReadableController`] that enqueues items, errors or closes the
//!   stream (the controller capability), and the [`Readable`] consumer;
//! - a [`Writable`] producer handle, whose writes land in a [`Sink`], and
//!   a [`WritableController`] that can fail or finish it from below.
//!
//! Failures travel as a [`Reason`] that is shared, never rebuilt.

pub mod config;
pub mod controller;
pub mod error;
pub mod pipe;
pub mod readable;
pub mod reason;
pub mod writable;

pub use config::{StreamConfig, DEFAULT_HIGH_WATER_MARK};
pub use controller::{settle, Controller};
pub use error::{ControllerError, Result};
pub use pipe::{pipe_to, Pair};
pub use readable::{readable, Readable, ReadableController, Source};
pub use reason::{describe, HookFailure, Reason};
pub use writable::{writable, Sink, Writable, WritableController};
