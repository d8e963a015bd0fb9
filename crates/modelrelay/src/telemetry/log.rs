use std::sync::Arc;

use parking_lot::Mutex;

/// A shared, late-populated slot for per-request telemetry.
///
/// The request handler stores an initial value, stream translators mutate it
/// as events flow through, and the accounting path takes it once the stream
/// finishes. Mutation is "non atomic" in the sense that independent mutations
/// do not compose into a transaction; each call locks briefly.
pub struct AsyncLog<T>(Arc<Mutex<Option<T>>>);

impl<T> Default for AsyncLog<T> {
	fn default() -> Self {
		AsyncLog(Arc::new(Mutex::new(None)))
	}
}

impl<T> Clone for AsyncLog<T> {
	fn clone(&self) -> Self {
		AsyncLog(self.0.clone())
	}
}

impl<T> AsyncLog<T> {
	pub fn store(&self, v: Option<T>) {
		*self.0.lock() = v;
	}

	/// Mutate the stored value in place. No-op when nothing is stored.
	pub fn non_atomic_mutate(&self, f: impl FnOnce(&mut T)) {
		let mut guard = self.0.lock();
		if let Some(v) = guard.as_mut() {
			f(v);
		}
	}

	pub fn take(&self) -> Option<T> {
		self.0.lock().take()
	}

	pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
		let guard = self.0.lock();
		f(guard.as_ref())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mutate_requires_store() {
		let log: AsyncLog<u64> = AsyncLog::default();
		log.non_atomic_mutate(|v| *v += 1);
		assert_eq!(log.take(), None);

		log.store(Some(1));
		log.non_atomic_mutate(|v| *v += 1);
		assert_eq!(log.take(), Some(2));
		assert_eq!(log.take(), None);
	}
}
