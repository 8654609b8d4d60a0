use crate::error::Result;
use crate::readable::Readable;
use crate::writable::Writable;

/// A readable/writable pair seen from one side of a connection.
#[derive(Debug)]
pub struct Pair<R, W: Send + 'static> {
    pub readable: Readable<R>,
    pub writable: Writable<W>,
}

/// Forward every item from `source` into `dest`.
///
/// A graceful end of `source` closes `dest`; an error on `source` aborts
/// `dest` with the same reason; a failed write cancels `source` with the
/// write's reason. Resolves once either side finished.
pub async fn pipe_to<T: Send + 'static>(mut source: Readable<T>, dest: Writable<T>) -> Result<()> {
    let mut forwarded = 0usize;
    loop {
        match source.read().await {
            Ok(Some(item)) => {
                if let Err(err) = dest.write(item).await {
                    tracing::debug!(forwarded, error = %err, "pipe destination failed");
                    source.cancel(err.reason().cloned()).await;
                    return Err(err);
                }
                forwarded += 1;
            }
            Ok(None) => {
                tracing::trace!(forwarded, "pipe source closed");
                return dest.close().await;
            }
            Err(err) => {
                tracing::debug!(forwarded, error = %err, "pipe source errored");
                dest.abort(err.reason().cloned()).await;
                return Err(err);
            }
        }
    }
}
