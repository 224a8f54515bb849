/// Clock and sleep seam used for request ids and deadlines
use crate::error::{ErrorCode, HandshakeError};
use futures::future::{self, Either, LocalBoxFuture};
use std::future::Future;
use std::pin::pin;
use std::time::Duration;

/// Longest delay setTimeout honours; anything above fires immediately
pub const MAX_TIMEOUT_MS: u64 = i32::MAX as u64;

pub trait Timer {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> f64;

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;
}

/// setTimeout-backed timer for every browser context
pub struct BrowserTimer;

impl Timer for BrowserTimer {
    fn now_ms(&self) -> f64 {
        js_sys::Date::now()
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        Box::pin(gloo_timers::future::TimeoutFuture::new(timeout_millis(duration)))
    }
}

fn timeout_millis(duration: Duration) -> u32 {
    duration.as_millis().min(MAX_TIMEOUT_MS as u128) as u32
}

/// Race `work` against a sleep of `deadline`. The work wins a tie.
pub async fn with_deadline<F>(
    timer: &dyn Timer,
    deadline: Duration,
    work: F,
) -> Result<F::Output, HandshakeError>
where
    F: Future,
{
    let work = pin!(work);
    match future::select(work, timer.sleep(deadline)).await {
        Either::Left((output, _)) => Ok(output),
        Either::Right(((), _)) => Err(ErrorCode::Timeout.into()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use futures::channel::oneshot;
    use std::cell::{Cell, RefCell};

    /// Sleeps only finish when the test calls `fire_all`
    #[derive(Default)]
    pub struct ManualTimer {
        clock: Cell<f64>,
        sleeps: RefCell<Vec<oneshot::Sender<()>>>,
    }

    impl ManualTimer {
        pub fn fire_all(&self) {
            for tx in self.sleeps.borrow_mut().drain(..) {
                let _ = tx.send(());
            }
        }

        pub fn armed(&self) -> usize {
            self.sleeps.borrow().iter().filter(|tx| !tx.is_canceled()).count()
        }
    }

    impl Timer for ManualTimer {
        fn now_ms(&self) -> f64 {
            let now = self.clock.get() + 1.0;
            self.clock.set(now);
            now
        }

        fn sleep(&self, _duration: Duration) -> LocalBoxFuture<'static, ()> {
            let (tx, rx) = oneshot::channel();
            self.sleeps.borrow_mut().push(tx);
            Box::pin(async move {
                let _ = rx.await;
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ManualTimer;
    use super::*;
    use futures::channel::oneshot;
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_long_sleeps_clamp_to_settimeout_range() {
        assert_eq!(timeout_millis(Duration::from_secs(30)), 30_000);
        assert_eq!(timeout_millis(Duration::from_millis(3_000_000_000)), i32::MAX as u32);
        assert_eq!(timeout_millis(Duration::MAX), i32::MAX as u32);
    }

    #[test]
    fn test_ready_work_beats_deadline() {
        let timer = ManualTimer::default();
        let out = futures::executor::block_on(with_deadline(&timer, Duration::from_secs(1), async { 7 }));
        assert_eq!(out, Ok(7));
    }

    #[test]
    fn test_deadline_fires_when_work_stalls() {
        let timer = Rc::new(ManualTimer::default());
        let result = Rc::new(RefCell::new(None));
        let (_tx, rx) = oneshot::channel::<u8>();

        let mut pool = LocalPool::new();
        {
            let timer = timer.clone();
            let result = result.clone();
            pool.spawner()
                .spawn_local(async move {
                    let out = with_deadline(timer.as_ref(), Duration::from_secs(5), rx).await;
                    *result.borrow_mut() = Some(out.map(|r| r.ok()));
                })
                .unwrap();
        }

        pool.run_until_stalled();
        assert!(result.borrow().is_none());
        assert_eq!(timer.armed(), 1);

        timer.fire_all();
        pool.run_until_stalled();
        assert_eq!(*result.borrow(), Some(Err(ErrorCode::Timeout.into())));
    }
}
