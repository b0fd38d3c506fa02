use std::sync::{Arc, Mutex};

use tokio::{
	sync::{Mutex as AsyncMutex, mpsc},
	task::JoinHandle,
};

use crate::BoxFuture;

pub type Job = BoxFuture<'static, ()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
	#[error("Revalidation queue is full.")]
	Full,
	#[error("Revalidation queue is closed.")]
	Closed,
}

/// Bounded executor for background cache refreshes.
///
/// Jobs go through a fixed-capacity queue drained by a fixed number of worker tasks. Submission
/// never waits: a full or closed queue rejects the job.
pub struct Revalidator {
	sender: Mutex<Option<mpsc::Sender<Job>>>,
	workers: Mutex<Vec<JoinHandle<()>>>,
}
impl Revalidator {
	/// Spawns the worker tasks on the current Tokio runtime.
	pub fn spawn(cfg: &pantry_config::Revalidation) -> Self {
		let (sender, receiver) = mpsc::channel::<Job>(cfg.queue_capacity.max(1));
		let receiver = Arc::new(AsyncMutex::new(receiver));
		let workers = (0..cfg.workers.max(1))
			.map(|worker| tokio::spawn(run_worker(worker, receiver.clone())))
			.collect();

		Self { sender: Mutex::new(Some(sender)), workers: Mutex::new(workers) }
	}

	pub fn submit(&self, job: Job) -> Result<(), SubmitError> {
		let sender = self.sender.lock().unwrap_or_else(|err| err.into_inner());
		let Some(sender) = sender.as_ref() else {
			return Err(SubmitError::Closed);
		};

		sender.try_send(job).map_err(|err| match err {
			mpsc::error::TrySendError::Full(_) => SubmitError::Full,
			mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
		})
	}

	/// Closes the queue, then waits until every queued job has run.
	pub async fn shutdown(&self) {
		drop(self.sender.lock().unwrap_or_else(|err| err.into_inner()).take());

		let workers = {
			let mut workers = self.workers.lock().unwrap_or_else(|err| err.into_inner());

			std::mem::take(&mut *workers)
		};

		for handle in workers {
			if let Err(err) = handle.await {
				tracing::error!(error = %err, "Revalidation worker stopped abnormally.");
			}
		}
	}
}

async fn run_worker(worker: usize, receiver: Arc<AsyncMutex<mpsc::Receiver<Job>>>) {
	loop {
		let job = receiver.lock().await.recv().await;
		let Some(job) = job else {
			break;
		};

		// A panicking job must not take the worker down with it.
		if let Err(err) = tokio::spawn(job).await {
			tracing::error!(worker, error = %err, "Revalidation job panicked.");
		}
	}

	tracing::debug!(worker, "Revalidation worker exited.");
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	fn config(workers: usize, queue_capacity: usize) -> pantry_config::Revalidation {
		pantry_config::Revalidation { workers, queue_capacity }
	}

	#[tokio::test]
	async fn shutdown_drains_queued_jobs() {
		let revalidator = Revalidator::spawn(&config(2, 8));
		let done = Arc::new(AtomicUsize::new(0));

		for _ in 0..5 {
			let done = done.clone();

			revalidator
				.submit(Box::pin(async move {
					done.fetch_add(1, Ordering::SeqCst);
				}))
				.expect("submit failed");
		}

		revalidator.shutdown().await;

		assert_eq!(done.load(Ordering::SeqCst), 5);
		assert_eq!(revalidator.submit(Box::pin(async {})), Err(SubmitError::Closed));
	}

	#[tokio::test]
	async fn full_queue_rejects_without_blocking() {
		let revalidator = Revalidator::spawn(&config(1, 1));
		let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
		let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

		revalidator
			.submit(Box::pin(async move {
				let _ = started_tx.send(());
				let _ = release_rx.await;
			}))
			.expect("submit failed");
		started_rx.await.expect("first job did not start");
		revalidator.submit(Box::pin(async {})).expect("queue should hold one job");

		assert_eq!(revalidator.submit(Box::pin(async {})), Err(SubmitError::Full));

		let _ = release_tx.send(());

		revalidator.shutdown().await;
	}

	#[tokio::test]
	async fn panicking_job_does_not_stop_the_worker() {
		let revalidator = Revalidator::spawn(&config(1, 4));
		let done = Arc::new(AtomicUsize::new(0));
		let counter = done.clone();

		revalidator
			.submit(Box::pin(async {
				if true {
					panic!("boom");
				}
			}))
			.expect("submit failed");
		revalidator
			.submit(Box::pin(async move {
				counter.fetch_add(1, Ordering::SeqCst);
			}))
			.expect("submit failed");
		revalidator.shutdown().await;

		assert_eq!(done.load(Ordering::SeqCst), 1);
	}
}
