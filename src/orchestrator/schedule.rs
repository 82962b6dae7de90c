//! Wave scheduling
//!
//! Waves run strictly in declared order. Jobs inside a wave fetch together,
//! the wave waits for every fetch (fan-in), then the jobs analyze together.
//! All of them are awaited before the fixed inter-wave pause, which is taken
//! in full even when a wave finishes early.

use crate::config::ScheduleConfig;
use crate::events::{EventKind, EventSink};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaveSchedule {
    waves: Vec<Vec<String>>,
    #[serde(rename = "delay_ms", serialize_with = "as_millis")]
    delay: Duration,
}

fn as_millis<S: serde::Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(delay.as_millis() as u64)
}

/// One job's result. `Err` carries the reason the job task died.
#[derive(Debug)]
pub struct JobRun<T> {
    pub wave: usize,
    pub dashboard: String,
    pub outcome: Result<T, String>,
}

impl WaveSchedule {
    pub fn new(waves: Vec<Vec<String>>, delay: Duration) -> Self {
        let waves = waves.into_iter().filter(|w| !w.is_empty()).collect();
        Self { waves, delay }
    }

    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self::new(config.waves.clone(), Duration::from_millis(config.wave_delay_ms))
    }

    /// Keep only `ids`, preserving wave order and dropping emptied waves.
    pub fn filtered(&self, ids: &[String]) -> Self {
        let waves = self
            .waves
            .iter()
            .map(|wave| wave.iter().filter(|id| ids.contains(id)).cloned().collect())
            .collect();
        Self::new(waves, self.delay)
    }

    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn job_count(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.waves.iter().flatten().any(|job| job == id)
    }

    /// Every job id in execution order.
    pub fn job_ids(&self) -> Vec<String> {
        self.waves.iter().flatten().cloned().collect()
    }

    /// Run every scheduled job in two phases per wave. All `fetch` tasks of
    /// a wave are awaited before any `analyze` task of that wave starts, so
    /// model calls never overlap a sibling's upstream fetches. Each phase runs
    /// as its own task: a panic in either surfaces as an `Err` outcome instead
    /// of taking the run down. Results come back in schedule order.
    pub async fn execute<G, T, F, FFut, A, AFut>(
        &self,
        events: &dyn EventSink,
        mut fetch: F,
        mut analyze: A,
    ) -> Vec<JobRun<T>>
    where
        F: FnMut(usize, &str) -> FFut,
        FFut: Future<Output = G> + Send + 'static,
        G: Send + 'static,
        A: FnMut(usize, &str, G) -> AFut,
        AFut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut runs = Vec::with_capacity(self.job_count());

        for (index, wave) in self.waves.iter().enumerate() {
            if index > 0 {
                events.on_event(
                    EventKind::WavePause,
                    json!({ "before_wave": index, "delay_ms": self.delay.as_millis() as u64 }),
                );
                tokio::time::sleep(self.delay).await;
            }

            events.on_event(
                EventKind::WaveStarted,
                json!({ "wave": index, "jobs": wave }),
            );

            let handles: Vec<_> = wave
                .iter()
                .map(|id| (id.clone(), tokio::spawn(fetch(index, id.as_str()))))
                .collect();
            let fetched = join_phase(handles, "fetching").await;

            events.on_event(
                EventKind::WaveFetched,
                json!({
                    "wave": index,
                    "jobs": wave.len(),
                    "crashed": fetched.iter().filter(|(_, r)| r.is_err()).count(),
                }),
            );

            // Every analyze future is built before any is spawned, so the
            // whole wave has left the fetch phase before a model is called
            let pending: Vec<_> = fetched
                .into_iter()
                .map(|(dashboard, gathered)| {
                    let job = gathered.map(|g| analyze(index, dashboard.as_str(), g));
                    (dashboard, job)
                })
                .collect();
            let handles: Vec<_> = pending
                .into_iter()
                .map(|(dashboard, job)| (dashboard, job.map(tokio::spawn)))
                .collect();

            let mut failed = 0;
            for (dashboard, handle) in handles {
                let outcome = match handle {
                    Ok(handle) => handle
                        .await
                        .map_err(|e| crash_reason(&dashboard, "analyzing", &e)),
                    Err(reason) => Err(reason),
                };
                if outcome.is_err() {
                    failed += 1;
                }
                runs.push(JobRun {
                    wave: index,
                    dashboard,
                    outcome,
                });
            }

            events.on_event(
                EventKind::WaveCompleted,
                json!({ "wave": index, "jobs": wave.len(), "crashed": failed }),
            );
        }

        runs
    }
}

/// Await one phase's tasks in order, turning a dead task into its reason.
async fn join_phase<G>(
    handles: Vec<(String, JoinHandle<G>)>,
    phase: &str,
) -> Vec<(String, Result<G, String>)> {
    let mut joined = Vec::with_capacity(handles.len());
    for (dashboard, handle) in handles {
        let outcome = handle
            .await
            .map_err(|e| crash_reason(&dashboard, phase, &e));
        joined.push((dashboard, outcome));
    }
    joined
}

fn crash_reason(dashboard: &str, phase: &str, error: &JoinError) -> String {
    if error.is_panic() {
        format!("job {} panicked while {}", dashboard, phase)
    } else {
        format!("job {} was cancelled while {}", dashboard, phase)
    }
}
