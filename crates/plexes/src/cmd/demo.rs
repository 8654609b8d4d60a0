use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use plexes_duplex::{Coupled, Duplex, DuplexConfig, DuplexListener, Independent, Listener, Policy};
use plexes_stream::{describe, pipe_to, Reason};
use tokio::sync::watch;
use tokio::time::timeout;

use crate::cmd::{parse_duration, runtime, DemoArgs};
use crate::exit::{plex_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_conversation, OutputFormat, PeerReport};

type Peer<P> = Duplex<String, String, String, String, P>;

/// What one peer observed.
struct Tally {
    received: watch::Sender<Vec<String>>,
    closes: AtomicUsize,
    errors: AtomicUsize,
}

impl Tally {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            received: watch::channel(Vec::new()).0,
            closes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        })
    }

    async fn wait_received(&self, count: usize) {
        let mut received = self.received.subscribe();
        let _ = received.wait_for(|items| items.len() >= count).await;
    }
}

pub fn run(args: DemoArgs, format: OutputFormat) -> CliResult<i32> {
    let wait = parse_duration(&args.timeout)?;
    let runtime = runtime()?;
    let peers = if args.independent {
        runtime.block_on(converse::<Independent>(&args, wait))?
    } else {
        runtime.block_on(converse::<Coupled>(&args, wait))?
    };
    print_conversation(&peers, format);
    Ok(SUCCESS)
}

/// `a` sends, `b` echoes every item back with a `!`. When `b`'s input
/// ends it closes its own output, so the hang-up reaches `a` under either
/// policy.
async fn converse<P: Policy>(args: &DemoArgs, wait: Duration) -> CliResult<Vec<PeerReport>> {
    let (a_tally, b_tally) = (Tally::new(), Tally::new());
    let a = peer::<P>("a", a_tally.clone(), false);
    let b = peer::<P>("b", b_tally.clone(), true);

    let a_inner = a.take_inner().map_err(|err| plex_error("a", err))?;
    let b_inner = b.take_inner().map_err(|err| plex_error("b", err))?;
    tokio::spawn(pipe_to(a_inner.readable, b_inner.writable));
    tokio::spawn(pipe_to(b_inner.readable, a_inner.writable));

    for message in &args.messages {
        a.output()
            .enqueue(message.clone())
            .map_err(|err| plex_error("send", err))?;
    }
    timeout(wait, a_tally.wait_received(args.messages.len()))
        .await
        .map_err(|_| CliError::new(TIMEOUT, "echoes did not arrive in time"))?;

    if args.fail {
        a.error(Some(Reason::msg("conversation aborted"))).await;
    } else {
        a.close().await.map_err(|err| plex_error("close", err))?;
    }

    let (a_stop, b_stop) = timeout(wait, async { tokio::join!(a.wait_closed(), b.wait_closed()) })
        .await
        .map_err(|_| CliError::new(TIMEOUT, "conversation did not settle in time"))?;
    tracing::info!(
        policy = P::NAME,
        a_clean = a_stop.is_clean(),
        b_clean = b_stop.is_clean(),
        "conversation settled"
    );

    Ok(vec![report(&a, &a_tally), report(&b, &b_tally)])
}

fn peer<P: Policy>(label: &str, tally: Arc<Tally>, echo: bool) -> Peer<P> {
    let received = tally.clone();
    let input = Listener::new()
        .with_message(move |duplex: Peer<P>, item: String| {
            let received = received.clone();
            async move {
                tracing::info!(duplex = duplex.label(), item = %item, "received");
                received.received.send_modify(|items| items.push(item.clone()));
                if echo {
                    duplex.output().enqueue(format!("{item}!")).map_err(Reason::new)?;
                }
                Ok(())
            }
        })
        .with_close(|duplex: Peer<P>| async move {
            duplex.output().close().await.map_err(Reason::new)
        });

    let (closes, errors) = (tally.clone(), tally);
    let listener = DuplexListener::new()
        .with_input(input)
        .with_close(move |duplex: Peer<P>| {
            let closes = closes.clone();
            async move {
                closes.closes.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(duplex = duplex.label(), "duplex close hook");
                Ok(())
            }
        })
        .with_error(move |duplex: Peer<P>, reason: Option<Reason>| {
            let errors = errors.clone();
            async move {
                errors.errors.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(
                    duplex = duplex.label(),
                    reason = %describe(reason.as_ref()),
                    "duplex error hook"
                );
                Ok(())
            }
        });
    Duplex::with_config(listener, DuplexConfig::labelled(label))
}

fn report<P: Policy>(peer: &Peer<P>, tally: &Tally) -> PeerReport {
    let (state, reason) = match peer.closed() {
        Some(stop) => match stop.reason() {
            Some(reason) => ("errored", Some(reason.to_string())),
            None => ("closed", None),
        },
        None => ("open", None),
    };
    PeerReport {
        label: peer.label().to_string(),
        policy: P::NAME,
        state,
        reason,
        input: peer.input().phase().to_string(),
        output: peer.output().phase().to_string(),
        received: tally.received.borrow().clone(),
        closes: tally.closes.load(Ordering::SeqCst),
        errors: tally.errors.load(Ordering::SeqCst),
    }
}
