//! Respawns a scheduling process after a fatal exit.
//!
//! The supervised process is a future built by a factory. A panic or an
//! `Err` exit counts as fatal: after `restart_delay_ms` the factory is called
//! again for the next generation. A process that starts a
//! [`SchedulerRuntime`](crate::scheduler::SchedulerRuntime) therefore takes a
//! fresh manager epoch on every respawn, and chains of the dead generation
//! can never resume.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::SupervisorConfig;
use crate::core::RuntimeError;
use crate::util::panic_message;

/// How a supervision run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorReport {
    /// Respawns performed.
    pub restarts: u32,
}

/// Restart policy around one supervised process.
#[derive(Debug, Clone)]
pub struct Supervisor {
    name: String,
    config: SupervisorConfig,
}

impl Supervisor {
    /// Supervisor named `name` (used in logs).
    pub fn new(name: impl Into<String>, config: SupervisorConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Run `factory(generation)` until a generation exits cleanly.
    ///
    /// Generations are numbered from zero.
    ///
    /// # Errors
    ///
    /// `Fatal` once `max_restarts` respawns have all failed.
    pub async fn run<F, Fut>(&self, mut factory: F) -> Result<SupervisorReport, RuntimeError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(), RuntimeError>> + Send + 'static,
    {
        let delay = Duration::from_millis(self.config.restart_delay_ms);
        let mut restarts = 0u32;
        loop {
            info!(process = %self.name, generation = restarts, "supervised process starting");
            let cause = match tokio::spawn(factory(restarts)).await {
                Ok(Ok(())) => {
                    info!(process = %self.name, restarts, "supervised process exited cleanly");
                    return Ok(SupervisorReport { restarts });
                }
                Ok(Err(e)) => e.to_string(),
                Err(join) if join.is_panic() => {
                    format!("panicked: {}", panic_message(join.into_panic().as_ref()))
                }
                Err(join) => join.to_string(),
            };
            error!(process = %self.name, generation = restarts, cause = %cause, "supervised process died");

            if self.config.max_restarts.is_some_and(|max| restarts >= max) {
                return Err(RuntimeError::Fatal(format!(
                    "{} gave up after {restarts} restarts: {cause}",
                    self.name
                )));
            }
            restarts += 1;
            warn!(process = %self.name, generation = restarts, delay_ms = self.config.restart_delay_ms, "respawning");
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn config(max_restarts: Option<u32>) -> SupervisorConfig {
        SupervisorConfig {
            max_restarts,
            restart_delay_ms: 10,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_respawns_after_error_and_panic() {
        let starts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&starts);
        let report = Supervisor::new("sched", config(None))
            .run(move |generation| {
                counter.fetch_add(1, Ordering::AcqRel);
                async move {
                    match generation {
                        0 => Err(RuntimeError::Fatal("lost store".into())),
                        1 => panic!("boom"),
                        _ => Ok(()),
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(report.restarts, 2);
        assert_eq!(starts.load(Ordering::Acquire), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_restarts() {
        let result = Supervisor::new("sched", config(Some(2)))
            .run(|_| async { Err(RuntimeError::Fatal("always".into())) })
            .await;
        assert!(matches!(result, Err(RuntimeError::Fatal(msg)) if msg.contains("after 2 restarts")));
    }
}
