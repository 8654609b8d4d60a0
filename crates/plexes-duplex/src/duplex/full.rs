use super::{Duplex, Policy};
use crate::listener::DuplexListener;

/// Each half closes on its own; the duplex is closed once both are.
#[derive(Debug)]
pub enum Independent {}

impl Policy for Independent {
    const NAME: &'static str = "full-duplex";
    const COUPLED: bool = false;
}

/// Duplex whose halves close independently but fail together.
pub type FullDuplex<IW, IR = IW, OW = IR, OR = IW> = Duplex<IW, IR, OW, OR, Independent>;

/// Listener for a [`FullDuplex`].
pub type FullDuplexListener<IW, IR = IW, OW = IR, OR = IW> =
    DuplexListener<FullDuplex<IW, IR, OW, OR>, IW, OW>;
