//! Lifecycle coordination for simplexes and duplexes.
//!
//! A [`Simplex`] is one directional channel with start, close and error
//! transitions that each run at most once. A [`Duplex`] pairs two of them
//! into a conversation and keeps their lifecycles consistent under a
//! [`Policy`]: [`HalfDuplex`] halves stop together, [`FullDuplex`] halves
//! close independently but still fail together.
//!
//! Listener hooks run in a fixed order for every transition: the child
//! hook, then the cascade onto the sibling, then the duplex hook. A failing
//! hook turns the transition into an error whose [`Reason`] is marked as a
//! hook failure.
//!
//! [`Reason`]: plexes_stream::Reason

pub mod config;
pub mod duplex;
pub mod error;
pub mod listener;
pub mod simplex;
pub mod state;

pub use config::{DuplexConfig, SimplexConfig};
pub use duplex::{
    Coupled, Duplex, FullDuplex, FullDuplexListener, HalfDuplex, HalfDuplexListener, Independent,
    Policy,
};
pub use error::{PlexError, Result};
pub use listener::{DuplexListener, HookResult, Listener};
pub use simplex::{Simplex, SimplexListener};
pub use state::{DuplexPhase, Phase, StartState, Stop};
