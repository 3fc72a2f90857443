//! Long operations running in the background, with a status that can be polled.

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::task;
use uuid::Uuid;

/// Finished jobs kept around for status queries.
pub const RETENTION: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
	Pending,
	Running,
	Done,
	Failed,
}

impl JobState {
	pub const fn is_finished(self) -> bool {
		matches!(self, Self::Done | Self::Failed)
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
	pub id: Uuid,
	pub kind: String,
	pub state: JobState,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339::option")]
	pub started_at: Option<OffsetDateTime>,
	#[serde(with = "time::serde::rfc3339::option")]
	pub finished_at: Option<OffsetDateTime>,
	pub outcome: Option<serde_json::Value>,
	pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
	jobs: Arc<Mutex<HashMap<Uuid, JobStatus>>>,
}

impl JobRegistry {
	/// Registers a job of the given kind and runs `job` on the runtime.
	pub fn spawn<F, T, E>(&self, kind: &str, job: F) -> Uuid
	where
		F: Future<Output = Result<T, E>> + Send + 'static,
		T: Serialize + Send + 'static,
		E: fmt::Display + Send + 'static,
	{
		let id = Uuid::new_v4();
		self.jobs.lock().insert(
			id,
			JobStatus {
				id,
				kind: kind.to_owned(),
				state: JobState::Pending,
				created_at: OffsetDateTime::now_utc(),
				started_at: None,
				finished_at: None,
				outcome: None,
				error: None,
			},
		);

		let registry = self.clone();
		task::spawn(async move {
			registry.update(id, |status| {
				status.state = JobState::Running;
				status.started_at = Some(OffsetDateTime::now_utc());
			});

			let result = job.await.map_err(|err| err.to_string()).and_then(|outcome| {
				serde_json::to_value(outcome).map_err(|err| format!("could not encode outcome: {err}"))
			});
			registry.finish(id, result);
		});

		tracing::info!(job = %id, kind, "spawned job");
		id
	}

	pub fn get(&self, id: Uuid) -> Option<JobStatus> {
		self.jobs.lock().get(&id).cloned()
	}

	/// Every known job, newest first.
	pub fn list(&self) -> Vec<JobStatus> {
		let mut jobs = self.jobs.lock().values().cloned().collect::<Vec<_>>();
		jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		jobs
	}

	fn update(&self, id: Uuid, apply: impl FnOnce(&mut JobStatus)) {
		if let Some(status) = self.jobs.lock().get_mut(&id) {
			apply(status);
		}
	}

	fn finish(&self, id: Uuid, result: Result<serde_json::Value, String>) {
		match &result {
			Ok(_) => tracing::info!(job = %id, "job done"),
			Err(err) => tracing::error!(job = %id, err = %err, "job failed"),
		}

		let mut jobs = self.jobs.lock();
		if let Some(status) = jobs.get_mut(&id) {
			status.finished_at = Some(OffsetDateTime::now_utc());
			match result {
				Ok(outcome) => {
					status.state = JobState::Done;
					status.outcome = Some(outcome);
				}
				Err(err) => {
					status.state = JobState::Failed;
					status.error = Some(err);
				}
			}
		}

		prune(&mut jobs, RETENTION);
	}
}

/// Drops the oldest finished jobs until at most `keep` finished ones remain.
fn prune(jobs: &mut HashMap<Uuid, JobStatus>, keep: usize) {
	let mut finished = jobs
		.values()
		.filter(|status| status.state.is_finished())
		.map(|status| (status.finished_at, status.id))
		.collect::<Vec<_>>();
	if finished.len() <= keep {
		return;
	}

	finished.sort_unstable();
	let excess = finished.len() - keep;
	for (_, id) in finished.into_iter().take(excess) {
		jobs.remove(&id);
	}
}
