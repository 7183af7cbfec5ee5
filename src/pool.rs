//! A small generic worker-pool trait: spin up N threads, feed them work
//! items over a channel, collect results over another. `PatchExecutor`
//! builds its fetch/patch-apply pipeline on top of a single implementation
//! of this trait (see `pool::action`), since this crate only ever runs one
//! kind of parallel job.

pub mod action;

use std::sync::atomic::{AtomicU32, Ordering};

/// How many worker threads `PatchExecutor` spins up by default. Overridden
/// per run by `Config::worker_count` via `init_workers`.
static WORKERS: AtomicU32 = AtomicU32::new(4);

pub fn workers() -> u32 {
	WORKERS.load(Ordering::Relaxed)
}

/// Set the worker count, defaulting to the logical CPU count (capped at 6,
/// since network-bound fetches see diminishing returns well before that)
/// when `None`.
pub fn init_workers(count: Option<u32>) {
	let n = match count {
		Some(c) => c,
		None => {
			let mut ncpu: u32 = std::thread::available_parallelism()
				.map(|n| n.get())
				.unwrap_or(1)
				.try_into()
				.unwrap_or(1);
			if ncpu > 6 {
				ncpu = 6;
			}
			ncpu
		}
	};
	if n < 1 {
		panic!("{n} worker threads is insane");
	}
	WORKERS.store(n, Ordering::Relaxed);
}

/// The overarching trait that implements pools. Individual users define
/// the associated types and fill in the steps of the process that vary.
pub trait Pool: Sized {
	/// The finalized return value, produced by `finalize()`.
	type PoolResult;

	/// Data needed to build a pool instance; used to construct the
	/// `UnitControl` passed to each worker via `mk_unitcontrol`.
	type Control;

	/// Per-worker data, generally a clone of `Control`.
	type UnitControl: Send;
	fn mk_unitcontrol(ctrl: &Self::Control) -> Self::UnitControl;

	/// A single unit of work and its outcome.
	type WorkRequest: Send + Sync + 'static;
	type WorkResult: Send;
	type WorkErr: Send;

	/// Process one `WorkRequest`. Called once per item, from whichever
	/// worker thread picks it up.
	fn work(ctrl: &Self::UnitControl, req: Self::WorkRequest) -> Result<Self::WorkResult, Self::WorkErr>;

	/// Accumulate one work result as it comes in.
	fn work_result(&mut self, resp: Result<Self::WorkResult, Self::WorkErr>);

	/// Build the final result after every request has been dispatched and
	/// processed.
	fn finalize(self) -> Self::PoolResult;

	/// How many threads to spin up. Defaults to the global worker count.
	fn nthreads(&self) -> u32 {
		workers()
	}

	/// Run the pool to completion over `items`.
	fn run(mut self, ctrl: &Self::Control, items: Vec<Self::WorkRequest>) -> Result<Self::PoolResult, anyhow::Error> {
		std::thread::scope(|s| -> Result<Self::PoolResult, anyhow::Error> {
			use crossbeam::channel;
			let (req_snd, req_rcv) = channel::unbounded();
			let (res_snd, res_rcv) = channel::unbounded();

			let nthr = self.nthreads();
			if nthr == 0 {
				panic!("nthreads {nthr} is insane");
			}
			for _ in 1..=nthr {
				let uctrl = Self::mk_unitcontrol(ctrl);
				let reqs = req_rcv.clone();
				let ress = res_snd.clone();
				s.spawn(move || {
					while let Ok(req) = reqs.recv() {
						let res = Self::work(&uctrl, req);
						ress.send(res).expect("response channel shouldn't be closed");
					}
				});
			}

			drop(req_rcv);
			drop(res_snd);

			for i in items.into_iter() {
				req_snd.send(i)?;
			}
			drop(req_snd);

			while let Ok(resp) = res_rcv.recv() {
				self.work_result(resp);
			}

			Ok(self.finalize())
		})
	}
}
