use std::error::Error;
use std::fmt;
use std::sync::Arc;

type DynError = dyn Error + Send + Sync + 'static;

/// Opaque cause attached to an abnormal stop.
///
/// A reason is reference counted and never rebuilt while it travels between
/// endpoints, so the value observed at the far end of a chain of simplexes is
/// the very same allocation that was raised at the start. Use
/// [`Reason::ptr_eq`] to check that identity.
#[derive(Clone)]
pub struct Reason {
    inner: Arc<DynError>,
}

impl Reason {
    /// Wrap any error value.
    pub fn new<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(err),
        }
    }

    /// Build a reason from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Mark `cause` as raised by the named hook.
    ///
    /// Reasons that already carry the mark are returned untouched, so a
    /// failure bubbling through several hooks is wrapped only once.
    pub fn hook(hook: &'static str, cause: Reason) -> Self {
        if cause.is_hook_failure() {
            return cause;
        }
        Self::new(HookFailure { hook, cause })
    }

    /// True when this reason was produced by a failing hook rather than
    /// propagated from a peer.
    pub fn is_hook_failure(&self) -> bool {
        self.inner.is::<HookFailure>()
    }

    /// Name of the failing hook, if this is a hook failure.
    pub fn hook_name(&self) -> Option<&'static str> {
        self.inner.downcast_ref::<HookFailure>().map(|f| f.hook)
    }

    /// The original cause, with any hook-failure mark peeled off.
    pub fn root(&self) -> &Reason {
        match self.inner.downcast_ref::<HookFailure>() {
            Some(failure) => failure.cause.root(),
            None => self,
        }
    }

    /// Downcast the wrapped error.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Borrow the wrapped error.
    pub fn as_error(&self) -> &DynError {
        self.inner.as_ref()
    }

    /// Whether two reasons share the same allocation.
    pub fn ptr_eq(a: &Reason, b: &Reason) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reason").field(&self.inner).finish()
    }
}

impl Error for Reason {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source()
    }
}

impl From<&str> for Reason {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}

impl From<String> for Reason {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

impl From<Box<DynError>> for Reason {
    fn from(err: Box<DynError>) -> Self {
        Self {
            inner: Arc::from(err),
        }
    }
}

/// Display helper for optional reasons in log fields and error messages.
pub fn describe(reason: Option<&Reason>) -> String {
    match reason {
        Some(reason) => reason.to_string(),
        None => "no reason".to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

/// A hook returned an error; `cause` is what it returned.
#[derive(Debug, thiserror::Error)]
#[error("{hook} hook failed: {cause}")]
pub struct HookFailure {
    pub hook: &'static str,
    #[source]
    pub cause: Reason,
}
