use super::{Duplex, Policy};
use crate::listener::DuplexListener;

/// Closing either half closes the other; the duplex stops as one.
#[derive(Debug)]
pub enum Coupled {}

impl Policy for Coupled {
    const NAME: &'static str = "half-duplex";
    const COUPLED: bool = true;
}

/// Duplex whose halves rise and fall together.
pub type HalfDuplex<IW, IR = IW, OW = IR, OR = IW> = Duplex<IW, IR, OW, OR, Coupled>;

/// Listener for a [`HalfDuplex`].
pub type HalfDuplexListener<IW, IR = IW, OW = IR, OR = IW> =
    DuplexListener<HalfDuplex<IW, IR, OW, OR>, IW, OW>;
