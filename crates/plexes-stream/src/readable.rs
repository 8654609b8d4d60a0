use std::future::poll_fn;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};

use async_trait::async_trait;
use futures_core::future::BoxFuture;
use futures_core::Stream;
use tokio::sync::mpsc;

use crate::config::StreamConfig;
use crate::controller::{lock, Controller, Flow};
use crate::error::{ControllerError, Result};
use crate::reason::Reason;

/// Hooks the readable endpoint calls on its producer.
#[async_trait]
pub trait Source: Send + Sync {
    /// Called once, before the first item is pulled.
    async fn start(&self) -> std::result::Result<(), Reason> {
        Ok(())
    }

    /// The consumer gave up on the stream.
    async fn cancel(&self, reason: Option<Reason>);
}

enum Chunk<R> {
    Item(R),
    Close,
    Error,
}

struct Shared {
    flow: Mutex<Flow>,
    queued: AtomicUsize,
    high_water_mark: usize,
}

impl Shared {
    fn failure(&self) -> Option<ControllerError> {
        match &*lock(&self.flow) {
            Flow::Errored(reason) => Some(ControllerError::Errored(reason.clone())),
            _ => None,
        }
    }
}

/// Producer side of a readable stream.
pub struct ReadableController<R> {
    tx: mpsc::UnboundedSender<Chunk<R>>,
    shared: Arc<Shared>,
}

impl<R> ReadableController<R> {
    /// True until the stream is closed or errored.
    pub fn is_open(&self) -> bool {
        lock(&self.shared.flow).is_open()
    }
}

impl<R> Controller<R> for ReadableController<R> {
    fn enqueue(&self, item: R) -> Result<()> {
        lock(&self.shared.flow).check()?;
        self.tx
            .send(Chunk::Item(item))
            .map_err(|_| ControllerError::Detached)?;
        self.shared.queued.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn error(&self, reason: Option<Reason>) -> Result<()> {
        lock(&self.shared.flow).finish(Flow::Errored(reason))?;
        // Wake a consumer parked on an empty queue.
        let _ = self.tx.send(Chunk::Error);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        lock(&self.shared.flow).finish(Flow::Closed)?;
        let _ = self.tx.send(Chunk::Close);
        Ok(())
    }

    fn desired_size(&self) -> Option<isize> {
        match &*lock(&self.shared.flow) {
            Flow::Errored(_) => None,
            Flow::Closed => Some(0),
            Flow::Open => {
                let queued = self.shared.queued.load(Ordering::Acquire) as isize;
                Some(self.shared.high_water_mark as isize - queued)
            }
        }
    }
}

impl<R> std::fmt::Debug for ReadableController<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadableController")
            .field("flow", &*lock(&self.shared.flow))
            .field("queued", &self.shared.queued.load(Ordering::Relaxed))
            .finish()
    }
}

/// Consumer side of a readable stream.
///
/// Items queued before a close are still delivered; an error discards
/// whatever is still queued.
pub struct Readable<R> {
    rx: mpsc::UnboundedReceiver<Chunk<R>>,
    shared: Arc<Shared>,
    source: Option<Arc<dyn Source>>,
    starting: Option<BoxFuture<'static, std::result::Result<(), Reason>>>,
    started: bool,
    done: bool,
    failure: Option<ControllerError>,
}

// No field is ever pinned structurally.
impl<R> Unpin for Readable<R> {}

impl<R> Readable<R> {
    /// Pull the next item. `Ok(None)` once the stream closed.
    pub async fn read(&mut self) -> Result<Option<R>> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        match poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await {
            Some(Ok(item)) => Ok(Some(item)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }

    /// Give up on the stream and tell the producer why.
    pub async fn cancel(&mut self, reason: Option<Reason>) {
        if self.done {
            return;
        }
        self.done = true;
        self.rx.close();
        if let Some(source) = &self.source {
            source.cancel(reason).await;
        }
    }

    /// True once the stream reported close, error or cancel.
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn fail(&mut self, err: ControllerError) -> Poll<Option<Result<R>>> {
        self.done = true;
        self.failure = Some(err.clone());
        Poll::Ready(Some(Err(err)))
    }
}

impl<R> Stream for Readable<R> {
    type Item = Result<R>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        if !this.started {
            this.started = true;
            if let Some(source) = this.source.clone() {
                this.starting = Some(Box::pin(async move { source.start().await }));
            }
        }
        if let Some(starting) = this.starting.as_mut() {
            let outcome = ready!(starting.as_mut().poll(cx));
            this.starting = None;
            if let Err(reason) = outcome {
                return this.fail(ControllerError::Errored(Some(reason)));
            }
        }

        if let Some(err) = this.shared.failure() {
            return this.fail(err);
        }

        match ready!(this.rx.poll_recv(cx)) {
            Some(Chunk::Item(item)) => {
                this.shared.queued.fetch_sub(1, Ordering::AcqRel);
                match this.shared.failure() {
                    Some(err) => this.fail(err),
                    None => Poll::Ready(Some(Ok(item))),
                }
            }
            Some(Chunk::Error) => {
                let err = this
                    .shared
                    .failure()
                    .unwrap_or(ControllerError::Errored(None));
                this.fail(err)
            }
            Some(Chunk::Close) | None => {
                this.done = true;
                Poll::Ready(None)
            }
        }
    }
}

impl<R> std::fmt::Debug for Readable<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Readable")
            .field("started", &self.started)
            .field("done", &self.done)
            .finish()
    }
}

/// Create a readable stream, optionally backed by producer hooks.
pub fn readable<R>(
    config: &StreamConfig,
    source: Option<Arc<dyn Source>>,
) -> (ReadableController<R>, Readable<R>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        flow: Mutex::new(Flow::Open),
        queued: AtomicUsize::new(0),
        high_water_mark: config.high_water_mark,
    });
    let controller = ReadableController {
        tx,
        shared: Arc::clone(&shared),
    };
    let endpoint = Readable {
        rx,
        shared,
        source,
        starting: None,
        started: false,
        done: false,
        failure: None,
    };
    (controller, endpoint)
}
