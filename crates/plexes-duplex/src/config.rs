use std::sync::atomic::{AtomicU64, Ordering};

use plexes_stream::StreamConfig;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Configuration for a standalone simplex.
#[derive(Debug, Clone, Default)]
pub struct SimplexConfig {
    /// Name used in logs and errors. Auto-generated when absent.
    pub label: Option<String>,
    /// Queueing for the outgoing side.
    pub stream: StreamConfig,
}

/// Configuration for a duplex and both of its simplexes.
#[derive(Debug, Clone, Default)]
pub struct DuplexConfig {
    /// Name used in logs and errors. Auto-generated when absent.
    /// Children are labelled `<label>.input` and `<label>.output`.
    pub label: Option<String>,
    /// Queueing applied to both outgoing sides.
    pub stream: StreamConfig,
}

impl SimplexConfig {
    /// Config with an explicit label.
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }
}

impl DuplexConfig {
    /// Config with an explicit label.
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub(crate) fn child(&self, label: &str, side: &str) -> SimplexConfig {
        SimplexConfig {
            label: Some(format!("{label}.{side}")),
            stream: self.stream.clone(),
        }
    }
}

pub(crate) fn resolve_label(label: Option<&String>, kind: &str) -> String {
    match label {
        Some(label) => label.clone(),
        None => {
            let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
            format!("{kind}-{id}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_label_wins() {
        let config = DuplexConfig::labelled("conv");
        assert_eq!(resolve_label(config.label.as_ref(), "duplex"), "conv");
        assert_eq!(config.child("conv", "input").label.as_deref(), Some("conv.input"));
    }

    #[test]
    fn generated_labels_are_unique() {
        let a = resolve_label(None, "simplex");
        let b = resolve_label(None, "simplex");
        assert!(a.starts_with("simplex-"));
        assert_ne!(a, b);
    }
}
