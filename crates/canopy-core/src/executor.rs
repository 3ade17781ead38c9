//! Bounded-concurrency parallel executor (component C7).
//!
//! A worker pool of fixed size consumes item indices off a
//! `crossbeam-channel` queue and reports results back over another
//! channel, the same dispatch shape `shaneholloman-worktrunk`'s
//! `collect::execution` module uses for its own parallel repo work —
//! generalized here to take an explicit worker count and cancellation
//! token instead of a global `rayon` pool, since nothing else in this
//! repository needs a process-wide thread pool to coordinate cancellation
//! through.

use canopy_git::CancelToken;
use crossbeam_channel::unbounded;

use crate::error::CanopyError;

/// The outcome of a single item from [`parallel_map`]. Exactly one of
/// `value`/`err` is `Some`.
pub struct ItemResult<T> {
    pub value: Option<T>,
    pub err: Option<CanopyError>,
}

impl<T> ItemResult<T> {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.err.is_none()
    }
}

/// Run `f(index)` for every `index` in `0..n` across `workers` threads.
///
/// When `continue_on_error` is `false` (fail-fast), the first error
/// cancels `cancel`; every item still pending (already dequeued or not
/// yet started) observes the cancellation and its result carries
/// `operation_cancelled` instead of running to completion. When `true`,
/// every item runs regardless of earlier failures. The returned vector's
/// order always matches `0..n`, regardless of completion order.
pub fn parallel_map<T, F>(workers: usize, n: usize, cancel: &CancelToken, continue_on_error: bool, f: F) -> Vec<ItemResult<T>>
where
    F: Fn(usize, &CancelToken) -> Result<T, CanopyError> + Sync,
    T: Send,
{
    if n == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, n);

    let (work_tx, work_rx) = unbounded::<usize>();
    for idx in 0..n {
        // an unbounded channel never blocks on send
        work_tx.send(idx).expect("receiver outlives all sends");
    }
    drop(work_tx);

    let (result_tx, result_rx) = unbounded::<(usize, Result<T, CanopyError>)>();

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            let f = &f;
            scope.spawn(move || {
                while let Ok(idx) = work_rx.recv() {
                    let outcome = if cancel.is_cancelled() {
                        Err(CanopyError::operation_cancelled())
                    } else {
                        f(idx, cancel)
                    };
                    let failed = outcome.is_err();
                    let _ = result_tx.send((idx, outcome));
                    if failed && !continue_on_error {
                        cancel.cancel();
                    }
                }
            });
        }
        drop(result_tx);

        let mut slots: Vec<Option<ItemResult<T>>> = (0..n).map(|_| None).collect();
        for _ in 0..n {
            let (idx, outcome) = result_rx.recv().expect("all workers exited before reporting every item");
            slots[idx] = Some(match outcome {
                Ok(value) => ItemResult {
                    value: Some(value),
                    err: None,
                },
                Err(err) => ItemResult { value: None, err: Some(err) },
            });
        }
        slots.into_iter().map(|s| s.expect("every index is reported exactly once")).collect()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn preserves_input_order_regardless_of_completion_order() {
        let cancel = CancelToken::new();
        let results = parallel_map(4, 8, &cancel, true, |idx, _cancel| {
            std::thread::sleep(Duration::from_millis(u64::from(8 - idx as u32)));
            Ok::<_, CanopyError>(idx * 10)
        });
        let values: Vec<usize> = results.into_iter().map(|r| r.value.unwrap()).collect();
        assert_eq!(values, (0..8).map(|i| i * 10).collect::<Vec<_>>());
    }

    #[test]
    fn continue_on_error_runs_every_item() {
        let cancel = CancelToken::new();
        let started = AtomicUsize::new(0);
        let results = parallel_map(2, 5, &cancel, true, |idx, _cancel| {
            started.fetch_add(1, Ordering::SeqCst);
            if idx == 2 {
                Err(CanopyError::invalid_argument("boom"))
            } else {
                Ok(idx)
            }
        });
        assert_eq!(started.load(Ordering::SeqCst), 5);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 4);
        assert!(!results[2].is_ok());
    }

    #[test]
    fn fail_fast_cancels_pending_items() {
        let cancel = CancelToken::new();
        let results = parallel_map(1, 5, &cancel, false, |idx, cancel| {
            if idx == 0 {
                return Err(CanopyError::invalid_argument("boom"));
            }
            if cancel.is_cancelled() {
                return Err(CanopyError::operation_cancelled());
            }
            Ok(idx)
        });
        assert!(!results[0].is_ok());
        assert!(cancel.is_cancelled());
        // with a single worker processing in queue order, every item after
        // the failure observes cancellation
        for result in &results[1..] {
            if let Some(err) = &result.err {
                assert_eq!(err.code(), ErrorCode::OperationCancelled);
            }
        }
    }

    #[test]
    fn empty_input_returns_empty_output() {
        let cancel = CancelToken::new();
        let results = parallel_map::<(), _>(4, 0, &cancel, true, |_idx, _cancel| Ok(()));
        assert!(results.is_empty());
    }

    #[test]
    fn worker_count_is_clamped_to_item_count() {
        let cancel = CancelToken::new();
        let results = parallel_map(100, 3, &cancel, true, |idx, _cancel| Ok::<_, CanopyError>(idx));
        assert_eq!(results.len(), 3);
    }
}
