use crate::error::HostError;
use crate::time::sleep::{Sleep, sleep};

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Why a [`Timeout`] gave up on its future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("deadline elapsed")]
    Elapsed,

    #[error("can't arm the deadline timer: {0}")]
    Timer(HostError),
}

/// Bounds the execution time of `future`.
///
/// The wrapped future is dropped, and with it whatever it waits on, once
/// the duration elapses first.
///
/// # Examples
///
/// ```rust,ignore
/// match timeout(Duration::from_secs(1), handle.read_all(stream)).await {
///     Ok(data) => { /* ... */ }
///     Err(TimeoutError::Elapsed) => { /* ... */ }
///     Err(TimeoutError::Timer(error)) => { /* ... */ }
/// }
/// ```
pub fn timeout<F>(duration: Duration, future: F) -> Timeout<F>
where
    F: Future,
{
    Timeout::new(duration, future)
}

pub struct Timeout<F> {
    future: Pin<Box<F>>,
    sleep: Sleep,
}

impl<F> Timeout<F> {
    pub(crate) fn new(duration: Duration, future: F) -> Self {
        Timeout {
            future: Box::pin(future),
            sleep: sleep(duration),
        }
    }
}

impl<F> Future for Timeout<F>
where
    F: Future,
{
    type Output = Result<F::Output, TimeoutError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Poll::Ready(value) = this.future.as_mut().poll(cx) {
            return Poll::Ready(Ok(value));
        }

        match Pin::new(&mut this.sleep).poll(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Err(TimeoutError::Elapsed)),
            Poll::Ready(Err(error)) => Poll::Ready(Err(TimeoutError::Timer(error))),
            Poll::Pending => Poll::Pending,
        }
    }
}
