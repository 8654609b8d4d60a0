//! Lifecycle coordination for paired in-process streams.
//!
//! plexes wires two one-way channels (simplexes) into a duplex and decides
//! how their shutdown is shared: a half duplex stops both directions as
//! soon as either one closes, a full duplex lets each direction close on
//! its own. Errors always take both directions down.
//!
//! # Crate Structure
//!
//! - [`stream`]: readable/writable endpoints, their controllers and `pipe_to`
//! - [`duplex`]: simplexes, listeners, and the two duplex policies
//!
//! ```no_run
//! use plexes::duplex::{HalfDuplex, HalfDuplexListener};
//!
//! # async fn demo() -> plexes::duplex::Result<()> {
//! let duplex: HalfDuplex<String> = HalfDuplex::new(HalfDuplexListener::new());
//! duplex.output().enqueue("hello".to_string())?;
//! duplex.close().await?;
//! # Ok(())
//! # }
//! ```

/// Re-export stream types.
pub mod stream {
    pub use plexes_stream::*;
}

/// Re-export simplex and duplex types.
pub mod duplex {
    pub use plexes_duplex::*;
}
