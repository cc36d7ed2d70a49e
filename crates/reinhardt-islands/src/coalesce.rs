//! Request coalescing.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

type Pending<K, V> = Arc<Mutex<HashMap<K, Shared<BoxFuture<'static, V>>>>>;

/// Collapses concurrent calls for the same key into one underlying future.
///
/// The underlying future runs on its own tokio task, so it completes even
/// when every waiter is dropped, and [`Coalescer::run`] must be called inside
/// a tokio runtime. The entry for a key is removed as soon as its future
/// settles (or panics), so a call made after settlement starts a fresh one.
///
/// ```
/// use reinhardt_islands::Coalescer;
///
/// # tokio_test::block_on(async {
/// let coalescer: Coalescer<&str, u32> = Coalescer::new();
/// let first = coalescer.run("k", || async { 1 }).await;
/// // The first call settled, so this one runs its own future.
/// let second = coalescer.run("k", || async { 2 }).await;
/// assert_eq!((first, second), (1, 2));
/// assert_eq!(coalescer.in_flight(), 0);
/// # });
/// ```
pub struct Coalescer<K, V> {
	pending: Pending<K, V>,
}

impl<K, V> Default for Coalescer<K, V> {
	fn default() -> Self {
		Self {
			pending: Arc::new(Mutex::new(HashMap::new())),
		}
	}
}

impl<K, V> fmt::Debug for Coalescer<K, V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Coalescer")
			.field("in_flight", &self.pending.lock().len())
			.finish()
	}
}

impl<K, V> Coalescer<K, V>
where
	K: Eq + Hash + Clone + Send + Sync + 'static,
	V: Clone + Send + Sync + 'static,
{
	/// Creates an empty coalescer.
	pub fn new() -> Self {
		Self::default()
	}

	/// Awaits the in-flight future for `key`, or starts one with `start`.
	///
	/// `start` is only called when nothing is in flight for `key`.
	pub async fn run<F, Fut>(&self, key: K, start: F) -> V
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = V> + Send + 'static,
	{
		let shared = {
			let mut pending = self.pending.lock();
			match pending.get(&key) {
				Some(existing) => existing.clone(),
				None => {
					let work = start();
					let settle = Settle {
						registry: Arc::clone(&self.pending),
						key: Some(key.clone()),
					};
					let task = tokio::spawn(async move {
						let value = work.await;
						drop(settle);
						value
					});
					let shared = async move {
						match task.await {
							Ok(value) => value,
							Err(error) => match error.try_into_panic() {
								Ok(panic) => std::panic::resume_unwind(panic),
								// Tasks are never aborted; only runtime shutdown
								// cancels them, and that drops every waiter too.
								Err(error) => unreachable!("coalesced task cancelled: {error}"),
							},
						}
					}
					.boxed()
					.shared();
					pending.insert(key, shared.clone());
					shared
				}
			}
		};
		shared.await
	}

	/// Number of keys with a future in flight.
	pub fn in_flight(&self) -> usize {
		self.pending.lock().len()
	}
}

/// Removes a key from the registry when its task finishes or unwinds.
struct Settle<K: Eq + Hash, V> {
	registry: Pending<K, V>,
	key: Option<K>,
}

impl<K: Eq + Hash, V> Drop for Settle<K, V> {
	fn drop(&mut self) {
		if let Some(key) = self.key.take() {
			self.registry.lock().remove(&key);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;
	use tokio::sync::oneshot;

	#[rstest]
	#[tokio::test]
	async fn test_concurrent_calls_share_one_future() {
		let coalescer: Coalescer<String, usize> = Coalescer::new();
		let calls = Arc::new(AtomicUsize::new(0));
		let (release, gate) = oneshot::channel::<()>();
		let gate = gate.shared();

		let start = |calls: Arc<AtomicUsize>, gate: Shared<oneshot::Receiver<()>>| {
			move || async move {
				let _ = gate.await;
				calls.fetch_add(1, Ordering::SeqCst)
			}
		};
		let first = coalescer.run("k".into(), start(calls.clone(), gate.clone()));
		let second = coalescer.run("k".into(), start(calls.clone(), gate.clone()));
		let releaser = async {
			tokio::task::yield_now().await;
			assert_eq!(coalescer.in_flight(), 1);
			let _ = release.send(());
		};
		let (a, b, ()) = tokio::join!(first, second, releaser);

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert_eq!(a, b);
		assert_eq!(coalescer.in_flight(), 0);
	}

	#[rstest]
	#[tokio::test]
	async fn test_settled_key_starts_fresh() {
		let coalescer: Coalescer<&'static str, usize> = Coalescer::new();
		let calls = Arc::new(AtomicUsize::new(0));
		for expected in 0..2 {
			let calls = calls.clone();
			let value = coalescer
				.run("k", move || async move { calls.fetch_add(1, Ordering::SeqCst) })
				.await;
			assert_eq!(value, expected);
		}
	}

	#[rstest]
	#[tokio::test]
	async fn test_work_completes_after_waiters_drop() {
		let coalescer: Coalescer<&'static str, ()> = Coalescer::new();
		let done = Arc::new(AtomicUsize::new(0));
		let (release, gate) = oneshot::channel::<()>();

		let counter = done.clone();
		let waiter = coalescer.run("k", move || async move {
			let _ = gate.await;
			counter.fetch_add(1, Ordering::SeqCst);
		});
		assert!(
			tokio::time::timeout(Duration::from_millis(10), waiter)
				.await
				.is_err()
		);
		assert_eq!(coalescer.in_flight(), 1);

		let _ = release.send(());
		tokio::time::timeout(Duration::from_secs(5), async {
			while coalescer.in_flight() > 0 {
				tokio::task::yield_now().await;
			}
		})
		.await
		.unwrap();
		assert_eq!(done.load(Ordering::SeqCst), 1);
	}

	async fn explode() -> u8 {
		panic!("fetch failed")
	}

	#[rstest]
	#[tokio::test]
	async fn test_panicking_work_clears_its_entry() {
		let coalescer = Arc::new(Coalescer::<&'static str, u8>::new());
		let caller = Arc::clone(&coalescer);
		let outcome = tokio::spawn(async move { caller.run("k", explode).await }).await;
		assert!(outcome.unwrap_err().is_panic());
		assert_eq!(coalescer.in_flight(), 0);
		assert_eq!(coalescer.run("k", || async { 7 }).await, 7);
	}

	#[rstest]
	#[tokio::test]
	async fn test_distinct_keys_do_not_share() {
		let coalescer: Coalescer<u8, u8> = Coalescer::new();
		let (a, b) = tokio::join!(
			coalescer.run(1, || async { 10 }),
			coalescer.run(2, || async { 20 })
		);
		assert_eq!((a, b), (10, 20));
	}
}
