// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request coalescing.
//!
//! A [`RequestCoalescer`] merges the calls that arrive within one window
//! into a single execution of the underlying operation and hands the same
//! result to every caller.

use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::RecvError;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type Operation<T, E> = Box<dyn FnOnce(usize) -> BoxFuture<Result<T, E>> + Send>;

struct Batch<T, E> {
    waiters: Vec<oneshot::Sender<Result<T, E>>>,
    operation: Option<Operation<T, E>>,
    /// A driver task owns the current window.
    driving: bool,
}

/// Collapses concurrent requests into one shared execution.
///
/// The first call opens a window of fixed length. Every call made before
/// the window closes joins the batch; when it closes, the operation supplied
/// by the first caller runs once with the number of coalesced callers, and
/// its result (or error) is cloned to all of them. Calls that arrive while
/// the operation is running form the next batch, whose window opens once
/// the running execution settles.
///
/// Operations supplied by later callers of the same batch are dropped
/// unexecuted, so they must be interchangeable.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use kasa_sync::sync::RequestCoalescer;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let coalescer: RequestCoalescer<u32, kasa_sync::Error> =
///     RequestCoalescer::new(Duration::from_millis(10));
///
/// let (a, b) = tokio::join!(
///     coalescer.schedule(|count| async move { Ok(count as u32) }),
///     coalescer.schedule(|count| async move { Ok(count as u32) }),
/// );
/// assert_eq!(a.unwrap(), 2);
/// assert_eq!(b.unwrap(), 2);
/// # }
/// ```
pub struct RequestCoalescer<T, E> {
    window: Duration,
    batch: Arc<Mutex<Batch<T, E>>>,
}

impl<T, E> RequestCoalescer<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + From<RecvError> + Send + 'static,
{
    /// Creates a coalescer with the given window length.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            batch: Arc::new(Mutex::new(Batch {
                waiters: Vec::new(),
                operation: None,
                driving: false,
            })),
        }
    }

    /// Returns the window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns the number of callers waiting for a result.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.batch.lock().waiters.len()
    }

    /// Joins the current batch, or opens a new window, and waits for the
    /// shared result.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, cloned for every caller of the batch,
    /// or `E::from(RecvError)` if the operation panicked.
    pub async fn schedule<F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce(usize) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let rx = self.enqueue(operation);
        rx.await?
    }

    /// Like [`schedule`](Self::schedule), but first runs `run_now`
    /// synchronously. The hook fires exactly once per call, whether or not
    /// the call is coalesced.
    ///
    /// # Errors
    ///
    /// Same as [`schedule`](Self::schedule).
    pub async fn schedule_with<H, F, Fut>(&self, run_now: H, operation: F) -> Result<T, E>
    where
        H: FnOnce(),
        F: FnOnce(usize) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        run_now();
        self.schedule(operation).await
    }

    fn enqueue<F, Fut>(&self, operation: F) -> oneshot::Receiver<Result<T, E>>
    where
        F: FnOnce(usize) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let mut batch = self.batch.lock();
        batch.waiters.push(tx);
        if batch.operation.is_none() {
            batch.operation = Some(Box::new(move |count| Box::pin(operation(count))));
        }
        if !batch.driving {
            batch.driving = true;
            tokio::spawn(drive(Arc::clone(&self.batch), self.window));
        }
        rx
    }
}

impl<T, E> Clone for RequestCoalescer<T, E> {
    fn clone(&self) -> Self {
        Self {
            window: self.window,
            batch: Arc::clone(&self.batch),
        }
    }
}

impl<T, E> std::fmt::Debug for RequestCoalescer<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let batch = self.batch.lock();
        f.debug_struct("RequestCoalescer")
            .field("window", &self.window)
            .field("pending", &batch.waiters.len())
            .field("driving", &batch.driving)
            .finish()
    }
}

/// Runs windows back to back until a window closes with nobody waiting.
async fn drive<T, E>(batch: Arc<Mutex<Batch<T, E>>>, window: Duration)
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    loop {
        tokio::time::sleep(window).await;

        let (waiters, operation) = {
            let mut batch = batch.lock();
            (mem::take(&mut batch.waiters), batch.operation.take())
        };

        if let Some(operation) = operation {
            let count = waiters.len();
            tracing::trace!(count, "running coalesced operation");

            // A panicking operation drops the waiters, which then observe
            // a closed channel.
            match tokio::spawn(operation(count)).await {
                Ok(result) => {
                    for waiter in waiters {
                        let _ = waiter.send(result.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, count, "coalesced operation did not complete");
                }
            }
        }

        let mut next = batch.lock();
        if next.waiters.is_empty() {
            next.driving = false;
            return;
        }
    }
}
