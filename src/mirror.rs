//! MirrorPool: a shuffled, shrinking list of base URLs.
//!
//! The mirrors endpoint returns a flat JSON array with no priority or
//! weight attached, so load-balancing across them is just a uniform
//! shuffle -- no weighted selection needed.

use std::sync::Mutex;

use rand::seq::SliceRandom;
use url::Url;

/// A pool of equivalent HTTPS base URLs. Shared by parallel workers; the
/// mutex is only ever held for O(1) list operations, never across I/O.
#[derive(Debug)]
pub struct MirrorPool {
	mirrors: Mutex<Vec<Url>>,
}

impl MirrorPool {
	/// Build a pool from a freshly-fetched list of base URLs, shuffling
	/// them uniformly.
	pub fn new(mut mirrors: Vec<Url>) -> Self {
		let mut rng = rand::thread_rng();
		mirrors.shuffle(&mut rng);
		Self {
			mirrors: Mutex::new(mirrors),
		}
	}

	/// The currently-preferred mirror (the head of the list), if any
	/// remain.
	pub fn current(&self) -> Option<Url> {
		let mirrors = self.mirrors.lock().expect("mirror pool lock poisoned");
		mirrors.first().cloned()
	}

	/// Evict a specific base URL, unless it's the last one remaining -- the
	/// pool never empties while a retry is still possible.
	pub fn evict(&self, mirror: &Url) {
		let mut mirrors = self.mirrors.lock().expect("mirror pool lock poisoned");
		if mirrors.len() <= 1 {
			return;
		}
		mirrors.retain(|m| m != mirror);
	}

	/// How many mirrors remain.
	pub fn len(&self) -> usize {
		self.mirrors.lock().expect("mirror pool lock poisoned").len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn url(s: &str) -> Url {
		Url::parse(s).unwrap()
	}

	#[test]
	fn current_is_none_when_empty() {
		let pool = MirrorPool::new(vec![]);
		assert_eq!(pool.current(), None);
	}

	#[test]
	fn eviction_never_empties_the_pool() {
		let pool = MirrorPool::new(vec![url("https://a.example/")]);
		let only = pool.current().unwrap();
		pool.evict(&only);
		// Still there -- it was the last one.
		assert_eq!(pool.current(), Some(only));
		assert_eq!(pool.len(), 1);
	}

	#[test]
	fn eviction_removes_when_more_than_one_remain() {
		let pool = MirrorPool::new(vec![url("https://a.example/"), url("https://b.example/")]);
		let first = pool.current().unwrap();
		pool.evict(&first);
		assert_eq!(pool.len(), 1);
		assert_ne!(pool.current().unwrap(), first);
	}

	#[test]
	fn shuffle_contains_all_inputs() {
		let inputs = vec![
			url("https://a.example/"),
			url("https://b.example/"),
			url("https://c.example/"),
		];
		let pool = MirrorPool::new(inputs.clone());
		assert_eq!(pool.len(), inputs.len());
	}
}
