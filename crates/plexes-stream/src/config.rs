/// Default number of queued items before `desired_size` turns non-positive.
pub const DEFAULT_HIGH_WATER_MARK: usize = 16;

/// Queueing configuration for a readable endpoint.
///
/// The queue itself is unbounded; the high-water mark only feeds the
/// `desired_size` backpressure hint.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Queue length at which producers are asked to pause.
    pub high_water_mark: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }
}
