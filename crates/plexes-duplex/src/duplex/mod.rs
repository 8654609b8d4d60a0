//! Two simplexes composed into one conversation.
//!
//! A [`Duplex`] owns an `input` simplex (items written through
//! `inner.writable` come out of `outer.readable`) and an `output` simplex
//! (items written through `outer.writable` come out of `inner.readable`).
//! Two duplexes talk by piping each one's inner readable into the other's
//! inner writable.
//!
//! The policy parameter decides how the halves stop together:
//! [`Coupled`] closes the sibling when either half closes, [`Independent`]
//! waits for both halves to close. Errors cascade under both policies.

mod full;
mod half;

pub use full::{FullDuplex, FullDuplexListener, Independent};
pub use half::{Coupled, HalfDuplex, HalfDuplexListener};

use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use plexes_stream::{describe, Pair, Reason};
use tokio::sync::watch;

use crate::config::{resolve_label, DuplexConfig};
use crate::error::{PlexError, Result};
use crate::listener::{DuplexListener, HookResult};
use crate::simplex::{Hooks, Simplex};
use crate::state::{step, DuplexPhase, DuplexTransition, Stop};

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Coupled {}
    impl Sealed for super::Independent {}
}

/// How the two halves of a duplex stop together.
pub trait Policy: sealed::Sealed + Send + Sync + 'static {
    /// Name used in logs.
    const NAME: &'static str;
    /// Whether closing one half closes the other.
    const COUPLED: bool;
}

/// Which child simplex a transition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Input,
    Output,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Side::Input => "input",
            Side::Output => "output",
        }
    }
}

pub(crate) struct DuplexInner<IW, IR, OW, OR, P>
where
    IW: Send + 'static,
    IR: Send + 'static,
    OW: Send + 'static,
    OR: Send + 'static,
    P: Policy,
{
    label: String,
    input: Simplex<IW, OR>,
    output: Simplex<OW, IR>,
    listener: DuplexListener<Duplex<IW, IR, OW, OR, P>, IW, OW>,
    phase: watch::Sender<DuplexPhase>,
    _policy: PhantomData<P>,
}

/// A pair of simplexes under a stop [`Policy`].
pub struct Duplex<IW, IR, OW, OR, P>
where
    IW: Send + 'static,
    IR: Send + 'static,
    OW: Send + 'static,
    OR: Send + 'static,
    P: Policy,
{
    inner: Arc<DuplexInner<IW, IR, OW, OR, P>>,
}

impl<IW, IR, OW, OR, P> Clone for Duplex<IW, IR, OW, OR, P>
where
    IW: Send + 'static,
    IR: Send + 'static,
    OW: Send + 'static,
    OR: Send + 'static,
    P: Policy,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<IW, IR, OW, OR, P> std::fmt::Debug for Duplex<IW, IR, OW, OR, P>
where
    IW: Send + 'static,
    IR: Send + 'static,
    OW: Send + 'static,
    OR: Send + 'static,
    P: Policy,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Duplex")
            .field("label", &self.inner.label)
            .field("policy", &P::NAME)
            .field("phase", &*self.inner.phase.borrow())
            .field("input", &self.inner.input)
            .field("output", &self.inner.output)
            .finish()
    }
}

impl<IW, IR, OW, OR, P> Duplex<IW, IR, OW, OR, P>
where
    IW: Send + 'static,
    IR: Send + 'static,
    OW: Send + 'static,
    OR: Send + 'static,
    P: Policy,
{
    /// Create a duplex with default configuration.
    ///
    /// A child without a `message` hook forwards items with `Into`.
    pub fn new(listener: DuplexListener<Self, IW, OW>) -> Self
    where
        IW: Into<OR>,
        OW: Into<IR>,
    {
        Self::with_config(listener, DuplexConfig::default())
    }

    /// Create a duplex with custom configuration.
    pub fn with_config(listener: DuplexListener<Self, IW, OW>, config: DuplexConfig) -> Self
    where
        IW: Into<OR>,
        OW: Into<IR>,
    {
        let label = resolve_label(config.label.as_ref(), P::NAME);
        let inner = Arc::new_cyclic(|weak: &Weak<DuplexInner<IW, IR, OW, OR, P>>| {
            let input = Simplex::with_hooks(
                &config.child(&label, Side::Input.as_str()),
                Arc::new(InputHooks {
                    duplex: weak.clone(),
                }),
                <IW as Into<OR>>::into,
            );
            let output = Simplex::with_hooks(
                &config.child(&label, Side::Output.as_str()),
                Arc::new(OutputHooks {
                    duplex: weak.clone(),
                }),
                <OW as Into<IR>>::into,
            );
            let (phase, _) = watch::channel(DuplexPhase::Open);
            DuplexInner {
                label,
                input,
                output,
                listener,
                phase,
                _policy: PhantomData,
            }
        });
        Self { inner }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// The simplex fed by `inner.writable`, read through `outer.readable`.
    pub fn input(&self) -> &Simplex<IW, OR> {
        &self.inner.input
    }

    /// The simplex fed by `outer.writable`, read through `inner.readable`.
    pub fn output(&self) -> &Simplex<OW, IR> {
        &self.inner.output
    }

    /// Snapshot of the composite state.
    pub fn phase(&self) -> DuplexPhase {
        self.inner.phase.borrow().clone()
    }

    /// `Some` once the duplex began stopping.
    pub fn closing(&self) -> Option<Stop> {
        self.inner.phase.borrow().closing()
    }

    /// `Some` once the duplex stopped.
    pub fn closed(&self) -> Option<Stop> {
        self.inner.phase.borrow().closed()
    }

    /// The pair facing the local side: `output`'s readable and `input`'s
    /// writable. The readable can only be taken once.
    pub fn take_inner(&self) -> Result<Pair<IR, IW>> {
        Ok(Pair {
            readable: self.inner.output.take_readable()?,
            writable: self.inner.input.writable(),
        })
    }

    /// The pair facing the remote side: `input`'s readable and `output`'s
    /// writable. The readable can only be taken once.
    pub fn take_outer(&self) -> Result<Pair<OR, OW>> {
        Ok(Pair {
            readable: self.inner.input.take_readable()?,
            writable: self.inner.output.writable(),
        })
    }

    /// Close the duplex.
    ///
    /// [`Coupled`] closes the output half and lets the cascade close the
    /// input half. [`Independent`] closes input then output; the output half
    /// is closed even when closing the input half failed, and the first
    /// failure is returned.
    pub async fn close(&self) -> Result<()> {
        if P::COUPLED {
            return self.inner.output.close().await;
        }
        let input = self.inner.input.close().await;
        let output = self.inner.output.close().await;
        input.and(output)
    }

    /// Fail the duplex.
    ///
    /// The output half is errored and the cascade takes the input half
    /// with it. If the output half already left the open state the input
    /// half is errored instead, and if neither half is open any more the
    /// duplex itself takes the error path. A duplex that already started
    /// stopping keeps its first outcome.
    pub async fn error(&self, reason: Option<Reason>) {
        if self.inner.output.raise(reason.clone()).await {
            return;
        }
        if self.closing().is_some() {
            return;
        }
        if self.inner.input.raise(reason.clone()).await {
            return;
        }
        if self.enter(reason.clone()) {
            tracing::debug!(
                duplex = %self.inner.label,
                reason = %describe(reason.as_ref()),
                "erroring"
            );
            self.report_error(reason).await;
            self.finish();
        }
    }

    /// Resolve once the duplex and both halves stopped.
    pub async fn wait_closed(&self) -> Stop {
        let mut phase = self.inner.phase.subscribe();
        let stop = phase
            .wait_for(|phase| phase.closed().is_some())
            .await
            .ok()
            .and_then(|phase| phase.closed());
        self.inner.input.wait_stopped().await;
        self.inner.output.wait_stopped().await;
        stop.unwrap_or_default()
    }

    fn sibling_closing(&self, side: Side) -> bool {
        match side {
            Side::Input => self.inner.output.closing(),
            Side::Output => self.inner.input.closing(),
        }
    }

    async fn close_sibling(&self, side: Side) -> Result<()> {
        match side {
            Side::Input => self.inner.output.close().await,
            Side::Output => self.inner.input.close().await,
        }
    }

    async fn error_sibling(&self, side: Side, reason: Option<Reason>) {
        match side {
            Side::Input => self.inner.output.error(reason).await,
            Side::Output => self.inner.input.error(reason).await,
        }
    }

    fn enter(&self, reason: Option<Reason>) -> bool {
        step(
            &self.inner.phase,
            DuplexTransition::Begin(reason),
            DuplexPhase::next,
        )
    }

    fn finish(&self) {
        if step(&self.inner.phase, DuplexTransition::Finish, DuplexPhase::next) {
            let reason = self.inner.phase.borrow().closed().and_then(|stop| stop.reason().cloned());
            tracing::debug!(
                duplex = %self.inner.label,
                policy = P::NAME,
                reason = %describe(reason.as_ref()),
                "closed"
            );
        }
    }

    /// Run the composite error hook, logging its failure.
    async fn report_error(&self, reason: Option<Reason>) {
        if let Err(failure) = self.inner.listener.error(self.clone(), reason).await {
            tracing::warn!(duplex = %self.inner.label, error = %failure, "duplex error hook failed");
        }
    }

    /// The composite took the close path but cannot finish it cleanly.
    async fn escalate(&self, reason: Reason) {
        step(
            &self.inner.phase,
            DuplexTransition::Escalate(reason.clone()),
            DuplexPhase::next,
        );
        self.report_error(Some(reason)).await;
        self.finish();
    }

    /// Close hook of either child.
    async fn on_child_close(&self, side: Side) -> HookResult {
        // Evaluated before the first await so a racing sibling sees it.
        let entered = (P::COUPLED || self.sibling_closing(side)) && self.enter(None);
        if entered {
            tracing::debug!(duplex = %self.inner.label, side = side.as_str(), "closing");
        }

        let child = match side {
            Side::Input => self.inner.listener.input.close(self.clone()).await,
            Side::Output => self.inner.listener.output.close(self.clone()).await,
        };
        if let Err(reason) = child {
            let reason = Reason::hook("close", reason);
            if entered {
                self.error_sibling(side, Some(reason.clone())).await;
                self.escalate(reason.clone()).await;
            }
            return Err(reason);
        }
        if !entered {
            return Ok(());
        }

        if P::COUPLED {
            if let Err(PlexError::Stopped {
                reason: Some(reason),
                ..
            }) = self.close_sibling(side).await
            {
                self.escalate(reason).await;
                return Ok(());
            }
        }

        if let Err(reason) = self.inner.listener.close(self.clone()).await {
            let reason = Reason::hook("close", reason);
            tracing::warn!(duplex = %self.inner.label, error = %reason, "duplex close hook failed");
            self.escalate(reason).await;
            return Ok(());
        }
        self.finish();
        Ok(())
    }

    /// Error hook of either child.
    async fn on_child_error(&self, side: Side, reason: Option<Reason>) -> HookResult {
        let entered = self.enter(reason.clone());
        if entered {
            tracing::debug!(
                duplex = %self.inner.label,
                side = side.as_str(),
                reason = %describe(reason.as_ref()),
                "erroring"
            );
        }

        let child = match side {
            Side::Input => self.inner.listener.input.error(self.clone(), reason.clone()).await,
            Side::Output => self.inner.listener.output.error(self.clone(), reason.clone()).await,
        };
        if entered {
            self.error_sibling(side, reason.clone()).await;
            self.report_error(reason).await;
            self.finish();
        }
        child
    }
}

struct InputHooks<IW, IR, OW, OR, P>
where
    IW: Send + 'static,
    IR: Send + 'static,
    OW: Send + 'static,
    OR: Send + 'static,
    P: Policy,
{
    duplex: Weak<DuplexInner<IW, IR, OW, OR, P>>,
}

struct OutputHooks<IW, IR, OW, OR, P>
where
    IW: Send + 'static,
    IR: Send + 'static,
    OW: Send + 'static,
    OR: Send + 'static,
    P: Policy,
{
    duplex: Weak<DuplexInner<IW, IR, OW, OR, P>>,
}

fn upgrade<IW, IR, OW, OR, P>(
    duplex: &Weak<DuplexInner<IW, IR, OW, OR, P>>,
) -> Option<Duplex<IW, IR, OW, OR, P>>
where
    IW: Send + 'static,
    IR: Send + 'static,
    OW: Send + 'static,
    OR: Send + 'static,
    P: Policy,
{
    duplex.upgrade().map(|inner| Duplex { inner })
}

#[async_trait]
impl<IW, IR, OW, OR, P> Hooks<IW, OR> for InputHooks<IW, IR, OW, OR, P>
where
    IW: Send + 'static,
    IR: Send + 'static,
    OW: Send + 'static,
    OR: Send + 'static,
    P: Policy,
{
    fn forwards(&self) -> bool {
        upgrade(&self.duplex).map_or(true, |duplex| !duplex.inner.listener.input.has_message())
    }

    async fn on_open(&self, _: Simplex<IW, OR>) -> HookResult {
        match upgrade(&self.duplex) {
            Some(duplex) => duplex.inner.listener.input.open(duplex.clone()).await,
            None => Ok(()),
        }
    }

    async fn on_message(&self, _: Simplex<IW, OR>, item: IW) -> HookResult {
        match upgrade(&self.duplex) {
            Some(duplex) => duplex.inner.listener.input.message(duplex.clone(), item).await,
            None => Ok(()),
        }
    }

    async fn on_flush(&self, _: Simplex<IW, OR>) -> HookResult {
        match upgrade(&self.duplex) {
            Some(duplex) => duplex.inner.listener.input.flush(duplex.clone()).await,
            None => Ok(()),
        }
    }

    async fn on_close(&self, _: Simplex<IW, OR>) -> HookResult {
        match upgrade(&self.duplex) {
            Some(duplex) => duplex.on_child_close(Side::Input).await,
            None => Ok(()),
        }
    }

    async fn on_error(&self, _: Simplex<IW, OR>, reason: Option<Reason>) -> HookResult {
        match upgrade(&self.duplex) {
            Some(duplex) => duplex.on_child_error(Side::Input, reason).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<IW, IR, OW, OR, P> Hooks<OW, IR> for OutputHooks<IW, IR, OW, OR, P>
where
    IW: Send + 'static,
    IR: Send + 'static,
    OW: Send + 'static,
    OR: Send + 'static,
    P: Policy,
{
    fn forwards(&self) -> bool {
        upgrade(&self.duplex).map_or(true, |duplex| !duplex.inner.listener.output.has_message())
    }

    async fn on_open(&self, _: Simplex<OW, IR>) -> HookResult {
        match upgrade(&self.duplex) {
            Some(duplex) => duplex.inner.listener.output.open(duplex.clone()).await,
            None => Ok(()),
        }
    }

    async fn on_message(&self, _: Simplex<OW, IR>, item: OW) -> HookResult {
        match upgrade(&self.duplex) {
            Some(duplex) => duplex.inner.listener.output.message(duplex.clone(), item).await,
            None => Ok(()),
        }
    }

    async fn on_flush(&self, _: Simplex<OW, IR>) -> HookResult {
        match upgrade(&self.duplex) {
            Some(duplex) => duplex.inner.listener.output.flush(duplex.clone()).await,
            None => Ok(()),
        }
    }

    async fn on_close(&self, _: Simplex<OW, IR>) -> HookResult {
        match upgrade(&self.duplex) {
            Some(duplex) => duplex.on_child_close(Side::Output).await,
            None => Ok(()),
        }
    }

    async fn on_error(&self, _: Simplex<OW, IR>, reason: Option<Reason>) -> HookResult {
        match upgrade(&self.duplex) {
            Some(duplex) => duplex.on_child_error(Side::Output, reason).await,
            None => Ok(()),
        }
    }
}
