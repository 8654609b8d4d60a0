use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use plexes_stream::{
    describe, readable, settle, writable, Controller, Readable, ReadableController, Reason, Sink,
    Source, Writable, WritableController,
};
use tokio::sync::watch;

use crate::config::{resolve_label, SimplexConfig};
use crate::error::{PlexError, Result};
use crate::listener::{HookResult, Listener};
use crate::state::{step, Phase, StartState, Stop, Transition};

/// Listener for a standalone simplex; every hook receives the simplex.
pub type SimplexListener<W, R = W> = Listener<Simplex<W, R>, W>;

/// Callbacks a simplex drives. Implemented by [`SimplexListener`] and by
/// the child hooks of a duplex.
#[async_trait]
pub(crate) trait Hooks<W: Send + 'static, R: Send + 'static>: Send + Sync {
    /// Whether incoming items bypass the message hook and go straight out.
    fn forwards(&self) -> bool;
    async fn on_open(&self, simplex: Simplex<W, R>) -> HookResult;
    async fn on_message(&self, simplex: Simplex<W, R>, item: W) -> HookResult;
    async fn on_flush(&self, simplex: Simplex<W, R>) -> HookResult;
    async fn on_close(&self, simplex: Simplex<W, R>) -> HookResult;
    async fn on_error(&self, simplex: Simplex<W, R>, reason: Option<Reason>) -> HookResult;
}

#[async_trait]
impl<W: Send + 'static, R: Send + 'static> Hooks<W, R> for SimplexListener<W, R> {
    fn forwards(&self) -> bool {
        !self.has_message()
    }

    async fn on_open(&self, simplex: Simplex<W, R>) -> HookResult {
        self.open(simplex).await
    }

    async fn on_message(&self, simplex: Simplex<W, R>, item: W) -> HookResult {
        self.message(simplex, item).await
    }

    async fn on_flush(&self, simplex: Simplex<W, R>) -> HookResult {
        self.flush(simplex).await
    }

    async fn on_close(&self, simplex: Simplex<W, R>) -> HookResult {
        self.close(simplex).await
    }

    async fn on_error(&self, simplex: Simplex<W, R>, reason: Option<Reason>) -> HookResult {
        self.error(simplex, reason).await
    }
}

pub(crate) struct SimplexInner<W: Send + 'static, R: Send + 'static> {
    label: String,
    hooks: Arc<dyn Hooks<W, R>>,
    start: watch::Sender<StartState>,
    phase: watch::Sender<Phase>,
    outgoing: ReadableController<R>,
    incoming: WritableController,
    readable: Mutex<Option<Readable<R>>>,
    writable: Writable<W>,
    forward: fn(W) -> R,
}

impl<W: Send + 'static, R: Send + 'static> SimplexInner<W, R> {
    fn release_closed(&self) {
        settle("close", self.outgoing.close());
        settle("close", self.incoming.close());
        if step(&self.phase, Transition::FinishClose, Phase::next) {
            tracing::debug!(simplex = %self.label, "closed");
        }
    }

    fn release_errored(&self, reason: Option<Reason>) {
        settle("error", self.outgoing.error(reason.clone()));
        settle("error", self.incoming.error(reason.clone()));
        if step(&self.phase, Transition::FinishError, Phase::next) {
            tracing::debug!(simplex = %self.label, reason = %describe(reason.as_ref()), "errored");
        }
    }
}

impl<W: Send + 'static, R: Send + 'static> Drop for SimplexInner<W, R> {
    fn drop(&mut self) {
        let stopped = self.phase.borrow().is_stopped();
        if !stopped {
            tracing::trace!(simplex = %self.label, "released on drop");
            self.release_closed();
        }
    }
}

/// How the teardown guard finishes the stop transition.
enum Ending {
    Close,
    Error(Option<Reason>),
}

/// Tears the controllers down when dropped, whether or not the listener
/// chain it guards completed.
struct Teardown<'a, W: Send + 'static, R: Send + 'static> {
    simplex: &'a SimplexInner<W, R>,
    ending: Option<Ending>,
}

impl<'a, W: Send + 'static, R: Send + 'static> Teardown<'a, W, R> {
    fn new(simplex: &'a SimplexInner<W, R>, ending: Ending) -> Self {
        Self {
            simplex,
            ending: Some(ending),
        }
    }

    fn disarm(mut self) {
        self.ending = None;
    }
}

impl<W: Send + 'static, R: Send + 'static> Drop for Teardown<'_, W, R> {
    fn drop(&mut self) {
        match self.ending.take() {
            Some(Ending::Close) => self.simplex.release_closed(),
            Some(Ending::Error(reason)) => self.simplex.release_errored(reason),
            None => {}
        }
    }
}

/// One directional channel: writes of `W` come in through [`writable`],
/// items of `R` go out through the readable endpoint.
///
/// Handles are cheap to clone and share state. Start, close and error each
/// happen at most once; whichever of close or error comes first wins.
///
/// [`writable`]: Simplex::writable
pub struct Simplex<W: Send + 'static, R: Send + 'static = W> {
    inner: Arc<SimplexInner<W, R>>,
}

impl<W: Send + 'static, R: Send + 'static> Clone for Simplex<W, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: Send + 'static, R: Send + 'static> std::fmt::Debug for Simplex<W, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simplex")
            .field("label", &self.inner.label)
            .field("start", &*self.inner.start.borrow())
            .field("phase", &*self.inner.phase.borrow())
            .finish()
    }
}

impl<W: Send + 'static, R: Send + 'static> Simplex<W, R> {
    /// Create a simplex with default configuration.
    ///
    /// Without a `message` hook every incoming item is converted with
    /// `Into` and enqueued on the outgoing side.
    pub fn new(listener: SimplexListener<W, R>) -> Self
    where
        W: Into<R>,
    {
        Self::with_config(listener, SimplexConfig::default())
    }

    /// Create a simplex with custom configuration.
    pub fn with_config(listener: SimplexListener<W, R>, config: SimplexConfig) -> Self
    where
        W: Into<R>,
    {
        Self::with_forward(listener, config, <W as Into<R>>::into)
    }

    /// Create a simplex whose hookless forwarding maps items with `forward`.
    pub fn with_forward(
        listener: SimplexListener<W, R>,
        config: SimplexConfig,
        forward: fn(W) -> R,
    ) -> Self {
        Self::with_hooks(&config, Arc::new(listener), forward)
    }

    pub(crate) fn with_hooks(
        config: &SimplexConfig,
        hooks: Arc<dyn Hooks<W, R>>,
        forward: fn(W) -> R,
    ) -> Self {
        let label = resolve_label(config.label.as_ref(), "simplex");
        let inner = Arc::new_cyclic(|weak: &Weak<SimplexInner<W, R>>| {
            let port = Arc::new(Port {
                simplex: weak.clone(),
            });
            let (outgoing, readable) =
                readable::<R>(&config.stream, Some(port.clone() as Arc<dyn Source>));
            let (incoming, writable) = writable::<W>(port as Arc<dyn Sink<W>>);
            let (start, _) = watch::channel(StartState::Idle);
            let (phase, _) = watch::channel(Phase::Open);
            SimplexInner {
                label,
                hooks,
                start,
                phase,
                outgoing,
                incoming,
                readable: Mutex::new(Some(readable)),
                writable,
                forward,
            }
        });
        Self { inner }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Hand out the outgoing endpoint. It has a single consumer, so only the
    /// first call succeeds.
    pub fn take_readable(&self) -> Result<Readable<R>> {
        lock(&self.inner.readable)
            .take()
            .ok_or_else(|| PlexError::EndpointTaken {
                label: self.inner.label.clone(),
            })
    }

    /// A producer handle for the incoming side.
    pub fn writable(&self) -> Writable<W> {
        self.inner.writable.clone()
    }

    pub fn start_state(&self) -> StartState {
        *self.inner.start.borrow()
    }

    /// True while `open` is running.
    pub fn is_starting(&self) -> bool {
        self.start_state() == StartState::Starting
    }

    pub fn is_started(&self) -> bool {
        self.start_state() == StartState::Started
    }

    /// Snapshot of the stop axis.
    pub fn phase(&self) -> Phase {
        self.inner.phase.borrow().clone()
    }

    pub fn closing(&self) -> bool {
        self.inner.phase.borrow().is_closing()
    }

    pub fn closed(&self) -> bool {
        matches!(*self.inner.phase.borrow(), Phase::Closed)
    }

    /// `Some` once the error path began.
    pub fn erroring(&self) -> Option<Stop> {
        let phase = self.inner.phase.borrow();
        phase
            .is_erroring()
            .then(|| Stop::new(phase.reason().cloned()))
    }

    /// `Some` once the error path finished.
    pub fn errored(&self) -> Option<Stop> {
        match &*self.inner.phase.borrow() {
            Phase::Errored(reason) => Some(Stop::new(reason.clone())),
            _ => None,
        }
    }

    /// Terminal outcome, closed or errored.
    pub fn stopped(&self) -> Option<Stop> {
        self.inner.phase.borrow().stop()
    }

    /// Backpressure hint from the outgoing controller.
    pub fn desired_size(&self) -> Option<isize> {
        self.inner.outgoing.desired_size()
    }

    /// Resolve once the simplex is closed or errored.
    pub async fn wait_stopped(&self) -> Stop {
        let mut phase = self.inner.phase.subscribe();
        let stop = phase
            .wait_for(Phase::is_stopped)
            .await
            .ok()
            .and_then(|phase| phase.stop());
        stop.unwrap_or_default()
    }

    /// Queue an item on the outgoing side.
    ///
    /// Fails with [`PlexError::Stopped`] once the simplex is erroring or
    /// stopped. Enqueueing while closing is allowed so `flush` hooks can
    /// drain.
    pub fn enqueue(&self, item: R) -> Result<()> {
        {
            let phase = self.inner.phase.borrow();
            if phase.is_erroring() || phase.is_stopped() {
                return Err(PlexError::Stopped {
                    label: self.inner.label.clone(),
                    reason: phase.reason().cloned(),
                });
            }
        }
        self.inner.outgoing.enqueue(item)?;
        tracing::trace!(simplex = %self.inner.label, "enqueued");
        Ok(())
    }

    /// Fail the simplex. Only the first call from the open state has any
    /// effect; later calls return immediately.
    ///
    /// The `error` hook runs first. Both controllers are errored with
    /// `reason` afterwards, even if the hook fails.
    pub async fn error(&self, reason: Option<Reason>) {
        self.raise(reason).await;
    }

    /// [`error`](Self::error), reporting whether this call took the
    /// error path.
    pub(crate) async fn raise(&self, reason: Option<Reason>) -> bool {
        let entered = step(
            &self.inner.phase,
            Transition::BeginError(reason.clone()),
            Phase::next,
        );
        if entered {
            self.fail(reason).await;
        }
        entered
    }

    /// Close the simplex gracefully. Only the first call from the open state
    /// has any effect; later calls return `Ok(())` immediately.
    ///
    /// Runs `flush` then `close`, then closes both controllers. A failing
    /// hook turns the close into an error with a hook-marked reason, which
    /// is also returned.
    pub async fn close(&self) -> Result<()> {
        if !step(&self.inner.phase, Transition::BeginClose, Phase::next) {
            return Ok(());
        }
        tracing::debug!(simplex = %self.inner.label, "closing");

        let teardown = Teardown::new(&self.inner, Ending::Close);
        let outcome = match self.inner.hooks.on_flush(self.clone()).await {
            Ok(()) => self
                .inner
                .hooks
                .on_close(self.clone())
                .await
                .map_err(|reason| Reason::hook("close", reason)),
            Err(reason) => Err(Reason::hook("flush", reason)),
        };

        match outcome {
            Ok(()) => {
                drop(teardown);
                Ok(())
            }
            Err(reason) => {
                teardown.disarm();
                tracing::warn!(simplex = %self.inner.label, error = %reason, "close failed, erroring");
                step(
                    &self.inner.phase,
                    Transition::Escalate(reason.clone()),
                    Phase::next,
                );
                self.fail(Some(reason.clone())).await;
                Err(PlexError::Stopped {
                    label: self.inner.label.clone(),
                    reason: Some(reason),
                })
            }
        }
    }

    /// Error path once the `Erroring` state is held.
    async fn fail(&self, reason: Option<Reason>) {
        tracing::debug!(simplex = %self.inner.label, reason = %describe(reason.as_ref()), "erroring");
        let _teardown = Teardown::new(&self.inner, Ending::Error(reason.clone()));
        if let Err(failure) = self.inner.hooks.on_error(self.clone(), reason).await {
            tracing::warn!(simplex = %self.inner.label, error = %failure, "error hook failed");
        }
    }

    /// Run `open` once. Concurrent callers wait for the first one.
    async fn on_start(&self) -> HookResult {
        if !step(&self.inner.start, (), |state, ()| state.begin()) {
            return self.wait_started().await;
        }
        if !matches!(*self.inner.phase.borrow(), Phase::Open) {
            // Stopped before anything flowed; the endpoints already report it.
            step(&self.inner.start, (), |state, ()| state.abandon());
            return Ok(());
        }

        tracing::debug!(simplex = %self.inner.label, "starting");
        match self.inner.hooks.on_open(self.clone()).await {
            Ok(()) => {
                step(&self.inner.start, (), |state, ()| state.finish());
                tracing::debug!(simplex = %self.inner.label, "started");
                Ok(())
            }
            Err(reason) => {
                let reason = Reason::hook("open", reason);
                self.error(Some(reason.clone())).await;
                step(&self.inner.start, (), |state, ()| state.abandon());
                Err(reason)
            }
        }
    }

    async fn wait_started(&self) -> HookResult {
        let mut start = self.inner.start.subscribe();
        let mut phase = self.inner.phase.subscribe();
        loop {
            if *start.borrow_and_update() == StartState::Started {
                return Ok(());
            }
            {
                let phase = phase.borrow_and_update();
                if phase.is_erroring() {
                    return Err(phase
                        .reason()
                        .cloned()
                        .unwrap_or_else(|| Reason::msg("simplex errored while starting")));
                }
                if !matches!(*phase, Phase::Open) {
                    return Ok(());
                }
            }
            tokio::select! {
                _ = start.changed() => {}
                _ = phase.changed() => {}
            }
        }
    }

    async fn on_write(&self, item: W) -> HookResult {
        if self.inner.hooks.forwards() {
            if let Err(err) = self.enqueue((self.inner.forward)(item)) {
                tracing::debug!(simplex = %self.inner.label, error = %err, "forwarded item dropped");
            }
            return Ok(());
        }
        match self.inner.hooks.on_message(self.clone(), item).await {
            Ok(()) => Ok(()),
            Err(reason) => {
                let reason = Reason::hook("message", reason);
                self.error(Some(reason.clone())).await;
                Err(reason)
            }
        }
    }
}

/// Stream hooks of one simplex. Holds the simplex weakly so the endpoints
/// the simplex owns do not keep it alive.
struct Port<W: Send + 'static, R: Send + 'static> {
    simplex: Weak<SimplexInner<W, R>>,
}

impl<W: Send + 'static, R: Send + 'static> Port<W, R> {
    fn simplex(&self) -> Option<Simplex<W, R>> {
        self.simplex.upgrade().map(|inner| Simplex { inner })
    }
}

#[async_trait]
impl<W: Send + 'static, R: Send + 'static> Sink<W> for Port<W, R> {
    async fn start(&self) -> std::result::Result<(), Reason> {
        match self.simplex() {
            Some(simplex) => simplex.on_start().await,
            None => Ok(()),
        }
    }

    async fn write(&self, item: W) -> std::result::Result<(), Reason> {
        match self.simplex() {
            Some(simplex) => simplex.on_write(item).await,
            None => Err(Reason::msg("simplex dropped")),
        }
    }

    async fn close(&self) -> std::result::Result<(), Reason> {
        let Some(simplex) = self.simplex() else {
            return Ok(());
        };
        match simplex.close().await {
            Ok(()) => Ok(()),
            Err(PlexError::Stopped {
                reason: Some(reason),
                ..
            }) => Err(reason),
            Err(err) => Err(Reason::new(err)),
        }
    }

    async fn abort(&self, reason: Option<Reason>) {
        if let Some(simplex) = self.simplex() {
            simplex.error(reason).await;
        }
    }
}

#[async_trait]
impl<W: Send + 'static, R: Send + 'static> Source for Port<W, R> {
    async fn start(&self) -> std::result::Result<(), Reason> {
        // A dropped simplex already closed its controllers; let the queue drain.
        match self.simplex() {
            Some(simplex) => simplex.on_start().await,
            None => Ok(()),
        }
    }

    async fn cancel(&self, reason: Option<Reason>) {
        if let Some(simplex) = self.simplex() {
            simplex.error(reason).await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use plexes_stream::ControllerError;

    use super::*;

    #[derive(Default)]
    struct Counts {
        open: AtomicUsize,
        close: AtomicUsize,
        error: AtomicUsize,
    }

    fn counting(counts: &Arc<Counts>) -> SimplexListener<String> {
        let (open, close, error) = (counts.clone(), counts.clone(), counts.clone());
        SimplexListener::new()
            .with_open(move |_| {
                let open = open.clone();
                async move {
                    open.open.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_close(move |_| {
                let close = close.clone();
                async move {
                    close.close.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_error(move |_, _| {
                let error = error.clone();
                async move {
                    error.error.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
    }

    #[tokio::test]
    async fn identity_simplex_forwards_writes() {
        let counts = Arc::new(Counts::default());
        let simplex = Simplex::new(counting(&counts));
        let mut readable = simplex.take_readable().expect("first take should succeed");
        let writable = simplex.writable();

        writable.write("a".to_string()).await.unwrap();
        writable.write("b".to_string()).await.unwrap();

        assert_eq!(readable.read().await.unwrap().as_deref(), Some("a"));
        assert_eq!(readable.read().await.unwrap().as_deref(), Some("b"));
        assert!(simplex.is_started());
        assert_eq!(counts.open.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn readable_is_handed_out_once() {
        let simplex: Simplex<u8> = Simplex::new(SimplexListener::new());
        let _readable = simplex.take_readable().expect("first take should succeed");
        assert!(matches!(
            simplex.take_readable(),
            Err(PlexError::EndpointTaken { .. })
        ));
    }

    #[tokio::test]
    async fn message_hook_owns_forwarding() {
        let listener = SimplexListener::new().with_message(
            |simplex: Simplex<String>, item: String| async move {
                simplex.enqueue(item.to_uppercase()).map_err(Reason::new)
            },
        );
        let simplex = Simplex::with_config(listener, SimplexConfig::labelled("shout"));
        let mut readable = simplex.take_readable().unwrap();

        simplex.writable().write("hey".to_string()).await.unwrap();
        assert_eq!(readable.read().await.unwrap().as_deref(), Some("HEY"));
        assert_eq!(simplex.label(), "shout");
    }

    #[tokio::test]
    async fn forward_function_maps_items() {
        let simplex: Simplex<String, usize> = Simplex::with_forward(
            SimplexListener::new(),
            SimplexConfig::default(),
            |item: String| item.len(),
        );
        let mut readable = simplex.take_readable().unwrap();

        simplex.writable().write("four".to_string()).await.unwrap();
        assert_eq!(readable.read().await.unwrap(), Some(4));
        assert!(simplex.label().starts_with("simplex-"));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let counts = Arc::new(Counts::default());
        let simplex = Simplex::new(counting(&counts));
        let mut readable = simplex.take_readable().unwrap();

        simplex.close().await.unwrap();
        simplex.close().await.unwrap();
        simplex.error(Some(Reason::msg("late"))).await;

        assert!(simplex.closed());
        assert!(simplex.stopped().expect("closed simplex is stopped").is_clean());
        assert!(simplex.errored().is_none());
        assert_eq!(counts.close.load(Ordering::SeqCst), 1);
        assert_eq!(counts.error.load(Ordering::SeqCst), 0);
        assert_eq!(readable.read().await.unwrap(), None);
        assert!(matches!(
            simplex.writable().write("x".to_string()).await,
            Err(ControllerError::Closed)
        ));
    }

    #[tokio::test]
    async fn error_is_idempotent_and_keeps_first_reason() {
        let counts = Arc::new(Counts::default());
        let simplex = Simplex::new(counting(&counts));
        let mut readable = simplex.take_readable().unwrap();
        let first = Reason::msg("first");

        simplex.error(Some(first.clone())).await;
        simplex.error(Some(Reason::msg("second"))).await;
        simplex.close().await.unwrap();

        let stop = simplex.errored().expect("simplex should be errored");
        assert!(Reason::ptr_eq(stop.reason().unwrap(), &first));
        assert!(!simplex.closing());
        assert_eq!(counts.error.load(Ordering::SeqCst), 1);
        assert_eq!(counts.close.load(Ordering::SeqCst), 0);

        let err = readable.read().await.unwrap_err();
        assert!(Reason::ptr_eq(err.reason().unwrap(), &first));
        assert!(matches!(
            simplex.enqueue("x".to_string()),
            Err(PlexError::Stopped { .. })
        ));
    }

    #[tokio::test]
    async fn failing_close_hook_still_tears_down() {
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = errors.clone();
        let simplex: Simplex<String> = Simplex::new(
            SimplexListener::new()
                .with_close(|_| async { Err(Reason::msg("close exploded")) })
                .with_error(move |_, _| {
                    let seen = seen.clone();
                    async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
        );
        let mut readable = simplex.take_readable().unwrap();

        let err = simplex.close().await.unwrap_err();
        assert!(matches!(err, PlexError::Stopped { .. }));

        let stop = simplex.stopped().expect("simplex should be stopped");
        let reason = stop.reason().expect("escalated stop carries a reason");
        assert!(reason.is_hook_failure());
        assert_eq!(reason.hook_name(), Some("close"));
        assert_eq!(reason.root().to_string(), "close exploded");
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(readable.read().await.is_err());
        assert!(!simplex.writable().is_writable());
    }

    #[tokio::test]
    async fn failing_error_hook_still_tears_down() {
        let simplex: Simplex<String> = Simplex::new(
            SimplexListener::new().with_error(|_, _| async { Err(Reason::msg("listener broke")) }),
        );
        let mut readable = simplex.take_readable().unwrap();
        let reason = Reason::msg("boom");

        simplex.error(Some(reason.clone())).await;

        let stop = simplex.errored().expect("teardown should finish");
        assert!(Reason::ptr_eq(stop.reason().unwrap(), &reason));
        assert!(readable.read().await.is_err());
    }

    #[tokio::test]
    async fn failing_message_hook_errors_the_simplex() {
        let simplex: Simplex<String> = Simplex::new(
            SimplexListener::new().with_message(|_, _| async { Err(Reason::msg("bad item")) }),
        );
        let writable = simplex.writable();

        let err = writable.write("x".to_string()).await.unwrap_err();
        assert_eq!(
            err.reason().and_then(Reason::hook_name),
            Some("message")
        );
        let stop = simplex.errored().expect("message failure should error");
        assert_eq!(stop.reason().unwrap().root().to_string(), "bad item");
    }

    #[tokio::test]
    async fn failing_open_hook_errors_the_simplex() {
        let simplex: Simplex<String> = Simplex::new(
            SimplexListener::new().with_open(|_| async { Err(Reason::msg("no start")) }),
        );

        let err = simplex.writable().write("x".to_string()).await.unwrap_err();
        assert_eq!(err.reason().and_then(Reason::hook_name), Some("open"));
        assert!(simplex.errored().is_some());
        assert!(!simplex.is_started());
        assert_eq!(simplex.start_state(), StartState::Abandoned);
    }

    #[tokio::test]
    async fn stopping_before_open_abandons_the_start() {
        let counts = Arc::new(Counts::default());
        let simplex: Simplex<String> = Simplex::new(counting(&counts));
        simplex.close().await.unwrap();

        let err = simplex.writable().write("late".to_string()).await.unwrap_err();
        assert!(matches!(err, ControllerError::Closed));
        assert_eq!(simplex.start_state(), StartState::Abandoned);
        assert!(!simplex.is_starting());
        assert!(!simplex.is_started());
        assert_eq!(counts.open.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_writers_share_one_open() {
        let counts = Arc::new(Counts::default());
        let open = counts.clone();
        let simplex: Simplex<String> = Simplex::new(SimplexListener::new().with_open(move |_| {
            let open = open.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                open.open.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));
        let mut readable = simplex.take_readable().unwrap();

        let writable = simplex.writable();
        let (a, b) = tokio::join!(writable.write("a".to_string()), readable.read());
        a.unwrap();
        assert_eq!(b.unwrap().as_deref(), Some("a"));
        assert_eq!(counts.open.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn flush_can_enqueue_before_close() {
        let simplex: Simplex<String> = Simplex::new(SimplexListener::new().with_flush(
            |simplex: Simplex<String>| async move {
                simplex.enqueue("tail".to_string()).map_err(Reason::new)
            },
        ));
        let mut readable = simplex.take_readable().unwrap();

        simplex.close().await.unwrap();
        assert_eq!(readable.read().await.unwrap().as_deref(), Some("tail"));
        assert_eq!(readable.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn cancelling_the_readable_errors_the_simplex() {
        let simplex: Simplex<String> = Simplex::new(SimplexListener::new());
        let mut readable = simplex.take_readable().unwrap();
        let reason = Reason::msg("consumer left");

        readable.cancel(Some(reason.clone())).await;

        let stop = simplex.wait_stopped().await;
        assert!(Reason::ptr_eq(stop.reason().unwrap(), &reason));
    }

    #[tokio::test]
    async fn dropping_the_simplex_releases_the_readable() {
        let simplex: Simplex<String> = Simplex::new(SimplexListener::new());
        let mut readable = simplex.take_readable().unwrap();
        simplex.enqueue("kept".to_string()).unwrap();
        drop(simplex);

        assert_eq!(readable.read().await.unwrap().as_deref(), Some("kept"));
        assert_eq!(readable.read().await.unwrap(), None);
    }
}
