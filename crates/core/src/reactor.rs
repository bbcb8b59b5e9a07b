//! The event base (§4.1): one reactor per worker thread. Registration of
//! fd readiness, timers, and child-exit delivery is expressed directly in
//! terms of a `tokio::task::LocalSet` driven by a `current_thread` runtime
//! rather than a hand-rolled epoll loop — the teacher's workspace already
//! depends on `tokio`, and a `LocalSet` gives the same single-thread,
//! cooperative scheduling guarantee §5 requires without re-deriving it.

use std::future::Future;
use std::io;
use std::time::Duration;

use tracing::{error, warn};

/// A single-threaded cooperative reactor. All registrations spawned through
/// it run on the `LocalSet` that owns it; callers are expected to drive that
/// `LocalSet` on a `current_thread` runtime, one per worker OS thread.
#[derive(Default)]
pub struct Reactor {
    local: tokio::task::LocalSet,
}

impl Reactor {
    pub fn new() -> Self {
        Reactor {
            local: tokio::task::LocalSet::new(),
        }
    }

    /// Run `driver` to completion on this reactor's `LocalSet`. Call this
    /// once per worker thread from inside a `current_thread` tokio runtime.
    pub async fn run<F>(&self, driver: F) -> F::Output
    where
        F: Future,
    {
        self.local.run_until(driver).await
    }

    /// Spawn a handler and await its outcome, logging (not propagating) a
    /// panic. Prefer this over `spawn_handler` when the caller wants to
    /// know a handler died without taking the base down.
    pub async fn spawn_and_log<F>(&self, name: &'static str, fut: F)
    where
        F: Future<Output = ()> + 'static,
    {
        let join = self.local.spawn_local(fut);
        if let Err(join_err) = join.await {
            if join_err.is_panic() {
                error!(handler = name, "reactor handler panicked; base continues");
            } else {
                warn!(handler = name, "reactor handler was cancelled");
            }
        }
    }

    /// Arm a one-shot timer of at least `dur` resolution. §4.1 requires
    /// ≥1 ms resolution; tokio's timer wheel already honors that.
    pub fn one_shot(dur: Duration) -> tokio::time::Sleep {
        tokio::time::sleep(dur)
    }

    /// Arm a repeating interval timer, firing every `dur`.
    pub fn interval(dur: Duration) -> tokio::time::Interval {
        tokio::time::interval(dur)
    }
}

/// Raw fd readiness registration, Unix-only. `register_fd` fails with an
/// `io::Error` if the fd is invalid, matching §4.1's "registration of an
/// invalid fd returns an error".
#[cfg(unix)]
pub mod fd {
    use super::*;
    use std::os::unix::io::{AsRawFd, RawFd};
    use tokio::io::unix::AsyncFd;

    struct BorrowedRawFd(RawFd);

    impl AsRawFd for BorrowedRawFd {
        fn as_raw_fd(&self) -> RawFd {
            self.0
        }
    }

    /// Register `fd` for read/write readiness notification. The fd must
    /// already be non-blocking; this function does not set `O_NONBLOCK`.
    pub fn register_fd(fd: RawFd) -> io::Result<AsyncFd<impl AsRawFd>> {
        if fd < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid fd"));
        }
        AsyncFd::new(BorrowedRawFd(fd))
    }
}

/// Child-exit delivery (§4.1's "await-child"): wraps `SIGCHLD` via tokio's
/// Unix signal stream and reaps with a non-blocking `waitpid`, delivering
/// `{pid, exit_status}` once per exited child.
#[cfg(unix)]
pub mod child {
    use std::io;

    #[derive(Debug, Clone, Copy)]
    pub struct ChildExit {
        pub pid: i32,
        pub exit_status: i32,
    }

    /// Await the next child exit visible to this process. Returns `None`
    /// once there are no more exited children to reap for this SIGCHLD.
    pub async fn next_exit() -> io::Result<Option<ChildExit>> {
        let mut sigchld = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::child())?;
        sigchld.recv().await;
        reap_one()
    }

    /// Non-blocking `waitpid(-1, WNOHANG)` for any already-exited child.
    fn reap_one() -> io::Result<Option<ChildExit>> {
        let mut status: libc::c_int = 0;
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid <= 0 {
            return Ok(None);
        }
        Ok(Some(ChildExit {
            pid,
            exit_status: status,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn spawn_and_log_runs_the_handler() {
        let reactor = Reactor::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        reactor
            .run(async move {
                reactor
                    .spawn_and_log("test", async move {
                        ran2.store(true, Ordering::SeqCst);
                    })
                    .await;
            })
            .await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn spawn_and_log_survives_a_panicking_handler() {
        let reactor = Reactor::new();
        reactor
            .run(async {
                reactor
                    .spawn_and_log("boom", async {
                        panic!("handler exploded");
                    })
                    .await;
            })
            .await;
        // Reaching here means the panic was caught and logged, not propagated.
    }

    #[cfg(unix)]
    #[test]
    fn register_fd_rejects_negative_fd() {
        let result = fd::register_fd(-1);
        assert!(result.is_err());
    }
}
