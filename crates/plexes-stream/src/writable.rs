use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};

use crate::controller::{lock, Flow};
use crate::error::{ControllerError, Result};
use crate::reason::Reason;

/// Hooks the writable endpoint calls on its consumer.
#[async_trait]
pub trait Sink<W: Send + 'static>: Send + Sync {
    /// Called once, before the first write or close.
    async fn start(&self) -> std::result::Result<(), Reason> {
        Ok(())
    }

    /// Handle one item. An error fails the stream with that reason.
    async fn write(&self, item: W) -> std::result::Result<(), Reason>;

    /// The producer finished gracefully.
    async fn close(&self) -> std::result::Result<(), Reason>;

    /// The producer gave up on the stream.
    async fn abort(&self, reason: Option<Reason>);
}

struct Shared {
    flow: Mutex<Flow>,
    started: OnceCell<std::result::Result<(), Reason>>,
    /// Held across every sink call: one write, close or abort at a time,
    /// in the order they were issued.
    ops: AsyncMutex<()>,
}

/// Consumer-held handle that can shut the writable side from below.
#[derive(Clone)]
pub struct WritableController {
    shared: Arc<Shared>,
}

impl WritableController {
    /// Fail the writable side; later writes report `reason`.
    pub fn error(&self, reason: Option<Reason>) -> Result<()> {
        lock(&self.shared.flow).finish(Flow::Errored(reason))
    }

    /// Mark the writable side finished; later writes report `Closed`.
    pub fn close(&self) -> Result<()> {
        lock(&self.shared.flow).finish(Flow::Closed)
    }

    pub fn is_open(&self) -> bool {
        lock(&self.shared.flow).is_open()
    }
}

impl std::fmt::Debug for WritableController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritableController")
            .field("flow", &*lock(&self.shared.flow))
            .finish()
    }
}

/// Producer side of a writable stream. Cheap to clone; clones share state.
pub struct Writable<W: Send + 'static> {
    sink: Arc<dyn Sink<W>>,
    shared: Arc<Shared>,
}

impl<W: Send + 'static> Clone for Writable<W> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<W: Send + 'static> Writable<W> {
    /// Hand one item to the sink, after any write already in flight.
    pub async fn write(&self, item: W) -> Result<()> {
        let _op = self.shared.ops.lock().await;
        self.ensure_started().await?;
        lock(&self.shared.flow).check()?;
        match self.sink.write(item).await {
            Ok(()) => Ok(()),
            Err(reason) => Err(self.fail(reason)),
        }
    }

    /// Finish the stream gracefully once in-flight writes completed.
    pub async fn close(&self) -> Result<()> {
        let _op = self.shared.ops.lock().await;
        self.ensure_started().await?;
        lock(&self.shared.flow).finish(Flow::Closed)?;
        self.sink.close().await.map_err(|reason| {
            let err = ControllerError::Errored(Some(reason));
            tracing::debug!(error = %err, "sink close failed");
            err
        })
    }

    /// Abandon the stream. A no-op once the stream already finished.
    ///
    /// Later writes fail at once; the sink hears about it after the write
    /// in flight, if any, completed.
    pub async fn abort(&self, reason: Option<Reason>) {
        let aborted = lock(&self.shared.flow)
            .finish(Flow::Errored(reason.clone()))
            .is_ok();
        if aborted {
            let _op = self.shared.ops.lock().await;
            self.sink.abort(reason).await;
        }
    }

    /// True until the stream is closed, aborted or errored from below.
    pub fn is_writable(&self) -> bool {
        lock(&self.shared.flow).is_open()
    }

    async fn ensure_started(&self) -> Result<()> {
        let sink = Arc::clone(&self.sink);
        let outcome = self
            .shared
            .started
            .get_or_init(|| async move { sink.start().await })
            .await;
        match outcome {
            Ok(()) => Ok(()),
            Err(reason) => Err(ControllerError::Errored(Some(reason.clone()))),
        }
    }

    fn fail(&self, reason: Reason) -> ControllerError {
        let mut flow = lock(&self.shared.flow);
        if flow.is_open() {
            *flow = Flow::Errored(Some(reason.clone()));
        }
        ControllerError::Errored(Some(reason))
    }
}

impl<W: Send + 'static> std::fmt::Debug for Writable<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writable")
            .field("flow", &*lock(&self.shared.flow))
            .finish()
    }
}

/// Create a writable stream feeding `sink`.
pub fn writable<W: Send + 'static>(sink: Arc<dyn Sink<W>>) -> (WritableController, Writable<W>) {
    let shared = Arc::new(Shared {
        flow: Mutex::new(Flow::Open),
        started: OnceCell::new(),
        ops: AsyncMutex::new(()),
    });
    let controller = WritableController {
        shared: Arc::clone(&shared),
    };
    (controller, Writable { sink, shared })
}
