use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use plexes_duplex::{DuplexConfig, FullDuplex, FullDuplexListener, Listener};
use plexes_stream::{pipe_to, Readable, Reason};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::codec::{FramedRead, LinesCodec};

use crate::cmd::{runtime, RelayArgs};
use crate::exit::{io_error, lines_error, plex_error, CliError, CliResult, FAILURE, SUCCESS};

type Relay = FullDuplex<String>;

pub fn run(args: RelayArgs) -> CliResult<i32> {
    runtime()?.block_on(relay(args))
}

/// stdin -> outer.writable -> output -> inner.readable -> (loopback) ->
/// inner.writable -> input -> outer.readable -> stdout.
async fn relay(args: RelayArgs) -> CliResult<i32> {
    let relayed = Arc::new(AtomicUsize::new(0));
    let duplex = build(args.fail_after, relayed.clone());
    let inner = duplex.take_inner().map_err(|err| plex_error("relay", err))?;
    let outer = duplex.take_outer().map_err(|err| plex_error("relay", err))?;
    tokio::spawn(pipe_to(inner.readable, inner.writable));
    let drain = tokio::spawn(drain(outer.readable));

    let mut lines = FramedRead::new(
        tokio::io::stdin(),
        LinesCodec::new_with_max_length(args.max_line_length),
    );
    let closed = duplex.wait_closed();
    tokio::pin!(closed);

    let stop = loop {
        tokio::select! {
            stop = &mut closed => break stop,
            line = lines.next() => match line {
                Some(Ok(line)) => {
                    if let Err(err) = outer.writable.write(line).await {
                        tracing::debug!(error = %err, "relay rejected line");
                    }
                }
                Some(Err(err)) => {
                    let err = lines_error("stdin", err);
                    duplex.error(Some(Reason::msg(err.message.clone()))).await;
                    let _ = drain.await;
                    return Err(err);
                }
                None => {
                    if let Err(err) = outer.writable.close().await {
                        tracing::debug!(error = %err, "relay already stopped at end of input");
                    }
                    break closed.await;
                }
            },
        }
    };

    let written = match drain.await {
        Ok(result) => result?,
        Err(err) => return Err(CliError::new(FAILURE, format!("stdout writer: {err}"))),
    };
    tracing::info!(
        relayed = relayed.load(Ordering::SeqCst),
        written,
        clean = stop.is_clean(),
        "relay finished"
    );

    match stop.reason() {
        Some(reason) => Err(CliError::new(FAILURE, format!("relay failed: {reason}"))),
        None => Ok(SUCCESS),
    }
}

fn build(fail_after: Option<usize>, relayed: Arc<AtomicUsize>) -> Relay {
    let input = Listener::new().with_message(move |duplex: Relay, line: String| {
        let relayed = relayed.clone();
        async move {
            let seen = relayed.fetch_add(1, Ordering::SeqCst);
            if fail_after.is_some_and(|limit| seen >= limit) {
                return Err(Reason::msg(format!("gave up after {seen} lines")));
            }
            duplex.input().enqueue(line).map_err(Reason::new)
        }
    });
    FullDuplex::with_config(
        FullDuplexListener::new().with_input(input),
        DuplexConfig::labelled("relay"),
    )
}

async fn drain(mut readable: Readable<String>) -> CliResult<usize> {
    let mut stdout = BufWriter::new(tokio::io::stdout());
    let mut written = 0usize;
    // An errored stream ends the output; the relay reports why.
    while let Ok(Some(line)) = readable.read().await {
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|err| io_error("stdout", err))?;
        stdout
            .write_all(b"\n")
            .await
            .map_err(|err| io_error("stdout", err))?;
        stdout.flush().await.map_err(|err| io_error("stdout", err))?;
        written += 1;
    }
    Ok(written)
}
