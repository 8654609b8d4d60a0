use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use plexes_stream::Reason;

/// Outcome of a lifecycle hook.
pub type HookResult = Result<(), Reason>;

/// Hook taking only the owner handle (`open`, `close`, `flush`).
pub type Hook<H> = Arc<dyn Fn(H) -> BoxFuture<'static, HookResult> + Send + Sync>;

/// Hook receiving the error reason.
pub type ErrorHook<H> = Arc<dyn Fn(H, Option<Reason>) -> BoxFuture<'static, HookResult> + Send + Sync>;

/// Hook receiving one incoming item.
pub type MessageHook<H, M> = Arc<dyn Fn(H, M) -> BoxFuture<'static, HookResult> + Send + Sync>;

/// Lifecycle callbacks for one channel direction.
///
/// `H` is the handle passed to every hook (the simplex itself, or the
/// owning duplex for duplex children) and `M` the incoming item type. All
/// hooks are optional; without a `message` hook incoming items are
/// forwarded to the outgoing side unchanged.
pub struct Listener<H, M> {
    open: Option<Hook<H>>,
    message: Option<MessageHook<H, M>>,
    flush: Option<Hook<H>>,
    close: Option<Hook<H>>,
    error: Option<ErrorHook<H>>,
}

impl<H, M> Default for Listener<H, M> {
    fn default() -> Self {
        Self {
            open: None,
            message: None,
            flush: None,
            close: None,
            error: None,
        }
    }
}

impl<H, M> Clone for Listener<H, M> {
    fn clone(&self) -> Self {
        Self {
            open: self.open.clone(),
            message: self.message.clone(),
            flush: self.flush.clone(),
            close: self.close.clone(),
            error: self.error.clone(),
        }
    }
}

impl<H, M> std::fmt::Debug for Listener<H, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("open", &self.open.is_some())
            .field("message", &self.message.is_some())
            .field("flush", &self.flush.is_some())
            .field("close", &self.close.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

impl<H: Send + 'static, M: Send + 'static> Listener<H, M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs once before the first item flows in either direction.
    pub fn with_open<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(H) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.open = Some(Arc::new(move |handle| Box::pin(hook(handle))));
        self
    }

    /// Runs for every incoming item and owns forwarding it.
    pub fn with_message<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(H, M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.message = Some(Arc::new(move |handle, item| Box::pin(hook(handle, item))));
        self
    }

    /// Runs at the start of a graceful close, while the outgoing side still
    /// accepts items.
    pub fn with_flush<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(H) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.flush = Some(Arc::new(move |handle| Box::pin(hook(handle))));
        self
    }

    /// Runs once on graceful close.
    pub fn with_close<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(H) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.close = Some(Arc::new(move |handle| Box::pin(hook(handle))));
        self
    }

    /// Runs once on error, with the reason.
    pub fn with_error<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(H, Option<Reason>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.error = Some(Arc::new(move |handle, reason| Box::pin(hook(handle, reason))));
        self
    }

    /// Whether incoming items go through a `message` hook.
    pub fn has_message(&self) -> bool {
        self.message.is_some()
    }

    pub(crate) async fn open(&self, handle: H) -> HookResult {
        match &self.open {
            Some(hook) => hook(handle).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn message(&self, handle: H, item: M) -> HookResult {
        match &self.message {
            Some(hook) => hook(handle, item).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn flush(&self, handle: H) -> HookResult {
        match &self.flush {
            Some(hook) => hook(handle).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn close(&self, handle: H) -> HookResult {
        match &self.close {
            Some(hook) => hook(handle).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn error(&self, handle: H, reason: Option<Reason>) -> HookResult {
        match &self.error {
            Some(hook) => hook(handle, reason).await,
            None => Ok(()),
        }
    }
}

/// Callbacks for a duplex: one [`Listener`] per child plus composite
/// `close`/`error` hooks. Every hook receives the duplex handle `D`.
///
/// For each transition the child hook runs first, then the sibling is
/// torn down if the policy asks for it, then the composite hook.
pub struct DuplexListener<D, IW, OW> {
    pub(crate) input: Listener<D, IW>,
    pub(crate) output: Listener<D, OW>,
    close: Option<Hook<D>>,
    error: Option<ErrorHook<D>>,
}

impl<D, IW, OW> Default for DuplexListener<D, IW, OW> {
    fn default() -> Self {
        Self {
            input: Listener::default(),
            output: Listener::default(),
            close: None,
            error: None,
        }
    }
}

impl<D, IW, OW> Clone for DuplexListener<D, IW, OW> {
    fn clone(&self) -> Self {
        Self {
            input: self.input.clone(),
            output: self.output.clone(),
            close: self.close.clone(),
            error: self.error.clone(),
        }
    }
}

impl<D, IW, OW> std::fmt::Debug for DuplexListener<D, IW, OW> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexListener")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("close", &self.close.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

impl<D, IW, OW> DuplexListener<D, IW, OW>
where
    D: Send + 'static,
    IW: Send + 'static,
    OW: Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Hooks for the input simplex (fed by `inner.writable`).
    pub fn with_input(mut self, listener: Listener<D, IW>) -> Self {
        self.input = listener;
        self
    }

    /// Hooks for the output simplex (fed by `outer.writable`).
    pub fn with_output(mut self, listener: Listener<D, OW>) -> Self {
        self.output = listener;
        self
    }

    /// Runs once when the duplex as a whole closes gracefully.
    pub fn with_close<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.close = Some(Arc::new(move |handle| Box::pin(hook(handle))));
        self
    }

    /// Runs once when the duplex as a whole fails.
    pub fn with_error<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(D, Option<Reason>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.error = Some(Arc::new(move |handle, reason| Box::pin(hook(handle, reason))));
        self
    }

    pub(crate) async fn close(&self, handle: D) -> HookResult {
        match &self.close {
            Some(hook) => hook(handle).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn error(&self, handle: D, reason: Option<Reason>) -> HookResult {
        match &self.error {
            Some(hook) => hook(handle, reason).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn missing_hooks_succeed() {
        let listener: Listener<(), u8> = Listener::new();
        assert!(listener.open(()).await.is_ok());
        assert!(listener.message((), 1).await.is_ok());
        assert!(listener.close(()).await.is_ok());
        assert!(listener.error((), None).await.is_ok());
        assert!(!listener.has_message());
    }

    #[tokio::test]
    async fn hooks_receive_handle_and_item() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let listener: Listener<usize, usize> = Listener::new().with_message(move |base, item| {
            let counter = counter.clone();
            async move {
                counter.store(base + item, Ordering::SeqCst);
                Ok(())
            }
        });

        listener.message(40, 2).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 42);
        assert!(listener.has_message());
    }

    #[tokio::test]
    async fn hook_errors_are_returned() {
        let listener: Listener<(), ()> =
            Listener::new().with_close(|_| async { Err(Reason::msg("nope")) });
        let err = listener.close(()).await.unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }
}
