use std::sync::atomic::{AtomicUsize, Ordering};

use tokio_util::sync::CancellationToken;

/// Which signal triggered cancellation: 0 = none yet.
static LAST_SIGNAL: AtomicUsize = AtomicUsize::new(0);

const SIGNAL_NAMES: [&str; 3] = ["SIGINT", "SIGTERM", "SIGHUP"];

/// The name of the signal that cancelled the process, if any.
pub fn last_signal_name() -> Option<&'static str> {
    match LAST_SIGNAL.load(Ordering::Relaxed) {
        0 => None,
        n => Some(SIGNAL_NAMES[n - 1]),
    }
}

/// Install signal handlers that cancel the given token.
///
/// The first of SIGINT/SIGTERM/SIGHUP to arrive records its name and
/// cancels; every in-flight operation observes the token and unwinds
/// through its cleanup path.
pub fn install(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let kinds = [
            (SignalKind::interrupt(), 1),
            (SignalKind::terminate(), 2),
            (SignalKind::hangup(), 3),
        ];
        for (kind, idx) in kinds {
            let cancel = cancel.clone();
            match signal(kind) {
                Ok(mut stream) => {
                    tokio::spawn(async move {
                        if stream.recv().await.is_some() {
                            LAST_SIGNAL.compare_exchange(0, idx, Ordering::SeqCst, Ordering::SeqCst).ok();
                            cancel.cancel();
                        }
                    });
                }
                Err(err) => log::warn!("installing signal handler: {err}"),
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                LAST_SIGNAL.compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst).ok();
                cancel.cancel();
            }
        });
    }
}
