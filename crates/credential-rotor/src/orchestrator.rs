//! The rotation loop: pick a credential, run the transfer under it, watch
//! its statistics, and rotate when the rule engine says so.

use anyhow::Result;
use rotor_config::{RotorConfig, TimingConfig};
use rotor_core::{CredentialIdentity, RotorError, RuleKind, StatsSnapshot};
use rotor_process::ProcessControl;
use rotor_scheduler::{CredentialPool, RotationState, RuleEngine};
use rotor_stats::StatsSource;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Spawning,
    Monitoring,
    Terminating,
}

/// What one credential's session amounted to.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub credential: CredentialIdentity,
    pub launcher_pid: u32,
    pub ticks: u64,
    pub final_bytes: u64,
    pub fired: Vec<RuleKind>,
}

pub struct Orchestrator<P: ProcessControl, S: StatsSource> {
    pool: CredentialPool,
    engine: RuleEngine,
    process: P,
    stats: S,
    state_path: PathBuf,
    timing: TimingConfig,
    current: Option<CredentialIdentity>,
    phase: Phase,
}

impl<P: ProcessControl, S: StatsSource> Orchestrator<P, S> {
    pub fn new(config: &RotorConfig, pool: CredentialPool, process: P, stats: S) -> Self {
        Self {
            pool,
            engine: RuleEngine::new(config.rules.clone()),
            process,
            stats,
            state_path: config.state_path.clone(),
            timing: config.timing.clone(),
            current: None,
            phase: Phase::Idle,
        }
    }

    /// Rotate forever. Only a fatal error ends the loop; whatever transfer
    /// is still running is killed before the error is returned.
    pub async fn run(&mut self) -> Result<()> {
        self.recover().await?;
        loop {
            if let Err(e) = self.run_session().await {
                error!(error = %e, phase = ?self.phase, "Aborting rotation loop");
                if let Err(cleanup) = self.process.terminate().await {
                    warn!(error = %cleanup, "Cleanup after fatal error failed");
                }
                return Err(e);
            }
        }
    }

    /// Startup recovery from a previous run: kill its transfer if one was
    /// recorded, then line the pool up so the recorded credential is next.
    pub async fn recover(&mut self) -> Result<()> {
        let state = RotationState::load(&self.state_path)?;

        if let Some(pid) = state.last_launcher_pid {
            let killed = self.process.recover_orphan(pid).await?;
            debug!(launcher_pid = pid, killed, "Checked for orphaned transfer");
        }

        if let Some(last) = state.last_credential.as_deref() {
            if self.pool.reorder(last) {
                info!(credential = %last.display(), "Resuming rotation at last credential");
            } else {
                warn!(
                    credential = %last.display(),
                    "Last credential is no longer in the pool; starting from the first file"
                );
            }
        }
        Ok(())
    }

    /// One full Idle → Spawning → Monitoring → Terminating cycle.
    pub async fn run_session(&mut self) -> Result<SessionSummary> {
        self.enter(Phase::Idle);
        let credential = match &self.current {
            None => self.pool.first().clone(),
            Some(current) => self.pool.next(Some(current)).clone(),
        };
        RotationState::record_credential(&self.state_path, credential.path())?;
        self.current = Some(credential.clone());

        self.enter(Phase::Spawning);
        let launcher_pid = self.process.spawn(&credential).await?;
        RotationState::record_launcher_pid(&self.state_path, launcher_pid)?;
        tokio::time::sleep(self.timing.startup_grace()).await;

        self.enter(Phase::Monitoring);
        let (last, fired) = self.monitor().await?;

        self.enter(Phase::Terminating);
        let summary = SessionSummary {
            credential,
            launcher_pid,
            ticks: self.engine.ticks(),
            final_bytes: last.bytes,
            fired,
        };
        info!(
            credential = %summary.credential.label(),
            launcher_pid = summary.launcher_pid,
            ticks = summary.ticks,
            bytes = summary.final_bytes,
            fired = ?summary.fired,
            "Rotating credential"
        );
        // The next spawn must not race a transfer that may still be alive.
        self.process.terminate().await?;
        self.enter(Phase::Idle);
        Ok(summary)
    }

    /// Poll until the rule engine asks for rotation. Returns the deciding
    /// snapshot and the rules that fired on it.
    async fn monitor(&mut self) -> Result<(StatsSnapshot, Vec<RuleKind>)> {
        self.engine.start_session();
        let mut previous: Option<StatsSnapshot> = None;
        let mut failures: u32 = 0;
        let mut exit_reported = false;

        loop {
            if !exit_reported && self.process.has_exited() {
                warn!("Transfer launcher has exited; waiting for statistics to confirm");
                exit_reported = true;
            }

            match self.stats.poll().await {
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    failures += 1;
                    warn!(
                        error = %e,
                        failures,
                        max = self.timing.max_poll_failures,
                        "Statistics poll failed"
                    );
                    if failures >= self.timing.max_poll_failures {
                        if let Err(kill) = self.process.terminate().await {
                            warn!(error = %kill, "Force-kill of lost transfer failed");
                        }
                        return Err(RotorError::TransferLost { attempts: failures }.into());
                    }
                }
                Ok(snapshot) => {
                    failures = 0;
                    let eval = self.engine.evaluate(&snapshot, previous.as_ref());
                    debug!(
                        bytes = snapshot.bytes,
                        speed = snapshot.speed,
                        stalled = self.engine.stalled_ticks(),
                        fired = ?eval.fired,
                        quorum = eval.quorum,
                        "Tick"
                    );
                    if eval.rotate {
                        return Ok((snapshot, eval.fired));
                    }
                    previous = Some(snapshot);
                }
            }
            tokio::time::sleep(self.timing.poll_interval()).await;
        }
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "Phase change");
            self.phase = phase;
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
