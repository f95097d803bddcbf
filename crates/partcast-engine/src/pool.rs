//! Bounded scoped worker pool
//!
//! Workers pull the next item index from a shared counter until the input is
//! exhausted. Each worker keeps its own results; they are merged back into
//! input order once every worker has finished, so the output does not depend
//! on scheduling.

use std::{
    num::NonZeroUsize,
    panic,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

/// Applies `f` to every item on at most `workers` threads, returning results in input order.
///
/// `f` receives the item's index along with the item. A panic in `f` is
/// propagated to the caller after the remaining workers stop.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
/// use partcast_engine::pool::parallel_map;
///
/// let squares = parallel_map(&[1, 2, 3, 4], NonZeroUsize::new(2).unwrap(), |_, &x| x * x);
/// assert_eq!(squares, vec![1, 4, 9, 16]);
/// ```
pub fn parallel_map<T, R, F>(items: &[T], workers: NonZeroUsize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Sync,
{
    let workers = workers.get().min(items.len());
    if workers <= 1 {
        return items.iter().enumerate().map(|(i, item)| f(i, item)).collect();
    }

    let next = AtomicUsize::new(0);
    let mut results = thread::scope(|s| {
        let handles = (0..workers)
            .map(|_| {
                s.spawn(|| {
                    let mut local = vec![];
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(item) = items.get(i) else {
                            break;
                        };
                        local.push((i, f(i, item)));
                    }
                    local
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_else(|e| panic::resume_unwind(e)))
            .collect::<Vec<_>>()
    });

    results.sort_unstable_by_key(|&(i, _)| i);
    results.into_iter().map(|(_, r)| r).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_preserves_order() {
        let items = (0..1000).collect::<Vec<u64>>();
        let out = parallel_map(&items, NonZeroUsize::new(8).unwrap(), |i, &x| (i, x * 3));
        assert_eq!(out.len(), 1000);
        for (i, &(j, v)) in out.iter().enumerate() {
            assert_eq!(i, j);
            assert_eq!(v, i as u64 * 3);
        }
    }

    #[test]
    fn test_each_item_visited_once() {
        let items = (0..257).collect::<Vec<usize>>();
        let seen = Mutex::new(vec![0; items.len()]);
        parallel_map(&items, NonZeroUsize::new(5).unwrap(), |i, _| {
            seen.lock().unwrap()[i] += 1;
        });
        assert!(seen.into_inner().unwrap().iter().all(|&n| n == 1));
    }

    #[test]
    fn test_empty_and_single_worker() {
        let empty: Vec<i32> = parallel_map(&[], NonZeroUsize::new(4).unwrap(), |_, &x: &i32| x);
        assert!(empty.is_empty());
        let out = parallel_map(&[1, 2], NonZeroUsize::MIN, |_, &x| x + 1);
        assert_eq!(out, vec![2, 3]);
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn test_panic_propagates() {
        parallel_map(&[0, 1, 2, 3], NonZeroUsize::new(2).unwrap(), |_, &x| {
            assert!(x != 2, "boom");
            x
        });
    }
}
