use std::future::Future;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use log::debug;

use crate::cancel::CancellationSignal;
use crate::error::CciError;

/// Concurrency settings for [`batch_promises`].
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum number of operations in flight at any instant. Zero is treated as one.
    pub max_concurrent: usize,
    /// Extra pause after a slot frees up, before the next operation is admitted.
    pub delay: Duration,
    pub cancel: Option<CancellationSignal>,
}

impl BatchOptions {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            delay: Duration::ZERO,
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Runs independent async operations with bounded concurrency.
///
/// The returned vector is ordered like `thunks`, whatever the completion order.
/// When `max_concurrent` operations are in flight the scheduler waits for one
/// to settle, then sleeps `delay` (still driving the in-flight operations)
/// before admitting the next one.
///
/// # Errors
///
/// Fails fast with the first error observed. Operations still in flight at that
/// point are dropped and their results discarded. Returns
/// [`CciError::Cancelled`] if the cancellation signal trips before a wave.
pub async fn batch_promises<T, E, F, Fut>(
    thunks: Vec<F>,
    options: &BatchOptions,
) -> std::result::Result<Vec<T>, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: From<CciError>,
{
    let max_concurrent = options.max_concurrent.max(1);
    let mut results: Vec<Option<T>> = std::iter::repeat_with(|| None)
        .take(thunks.len())
        .collect();
    let mut in_flight = FuturesUnordered::new();

    for (index, thunk) in thunks.into_iter().enumerate() {
        if in_flight.len() >= max_concurrent {
            if let Some((done, result)) = in_flight.next().await {
                results[done] = Some(result?);
            }

            if !options.delay.is_zero() {
                let sleep = tokio::time::sleep(options.delay);
                tokio::pin!(sleep);
                loop {
                    tokio::select! {
                        () = &mut sleep => break,
                        Some((done, result)) = in_flight.next(), if !in_flight.is_empty() => {
                            results[done] = Some(result?);
                        }
                    }
                }
            }
        }

        if let Some(cancel) = &options.cancel {
            cancel.check()?;
        }

        debug!("Admitting batch operation {index} ({} in flight)", in_flight.len());
        let future = thunk();
        in_flight.push(async move { (index, future.await) });
    }

    while let Some((done, result)) = in_flight.next().await {
        results[done] = Some(result?);
    }

    Ok(results.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::{BoxFuture, FutureExt};
    use std::sync::{Arc, Mutex};
    use tokio::time::{sleep, Instant};

    type TestResult<T> = std::result::Result<T, CciError>;

    #[tokio::test(start_paused = true)]
    async fn preserves_input_order_regardless_of_completion_order() {
        let thunks: Vec<Box<dyn FnOnce() -> BoxFuture<'static, TestResult<i32>>>> = vec![
            Box::new(|| async { TestResult::Ok(1) }.boxed()),
            Box::new(|| {
                async {
                    sleep(Duration::from_millis(100)).await;
                    TestResult::Ok(2)
                }
                .boxed()
            }),
            Box::new(|| async { TestResult::Ok(3) }.boxed()),
        ];

        let results = batch_promises(thunks, &BatchOptions::new(2)).await.unwrap();

        assert_eq!(results, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn admits_next_wave_after_delay() {
        let origin = Instant::now();
        let starts = Arc::new(Mutex::new(Vec::new()));

        let thunks: Vec<_> = (0..4)
            .map(|i| {
                let starts = Arc::clone(&starts);
                move || async move {
                    starts.lock().unwrap().push((i, origin.elapsed().as_millis()));
                    TestResult::Ok(i)
                }
            })
            .collect();

        let options = BatchOptions::new(2).with_delay(Duration::from_millis(1000));
        let results = batch_promises(thunks, &options).await.unwrap();

        assert_eq!(results, vec![0, 1, 2, 3]);
        let starts = starts.lock().unwrap().clone();
        assert_eq!(
            starts,
            vec![(0, 0), (1, 0), (2, 1000), (3, 1000)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_max_concurrent() {
        let active = Arc::new(Mutex::new((0usize, 0usize)));

        let thunks: Vec<_> = (0..6u64)
            .map(|i| {
                let active = Arc::clone(&active);
                move || async move {
                    {
                        let mut guard = active.lock().unwrap();
                        guard.0 += 1;
                        guard.1 = guard.1.max(guard.0);
                    }
                    sleep(Duration::from_millis(10 * (i + 1))).await;
                    active.lock().unwrap().0 -= 1;
                    TestResult::Ok(i)
                }
            })
            .collect();

        let results = batch_promises(thunks, &BatchOptions::new(3)).await.unwrap();

        assert_eq!(results, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(active.lock().unwrap().1, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn propagates_first_failure() {
        let thunks: Vec<Box<dyn FnOnce() -> BoxFuture<'static, TestResult<i32>>>> = vec![
            Box::new(|| async { TestResult::Ok(1) }.boxed()),
            Box::new(|| async { TestResult::Err(CciError::UnknownJobState("boom".into())) }.boxed()),
            Box::new(|| {
                async {
                    sleep(Duration::from_secs(5)).await;
                    TestResult::Ok(3)
                }
                .boxed()
            }),
        ];

        let err = batch_promises(thunks, &BatchOptions::new(3)).await.unwrap_err();

        assert!(matches!(err, CciError::UnknownJobState(state) if state == "boom"));
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let thunks: Vec<fn() -> futures::future::Ready<TestResult<i32>>> = Vec::new();
        let results = batch_promises(thunks, &BatchOptions::new(2)).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn stops_admitting_once_cancelled() {
        let cancel = CancellationSignal::new();
        cancel.cancel();
        let thunks = vec![|| async { TestResult::Ok(1) }];

        let options = BatchOptions::new(1).with_cancel(cancel);
        let err = batch_promises(thunks, &options).await.unwrap_err();

        assert!(matches!(err, CciError::Cancelled));
    }
}
