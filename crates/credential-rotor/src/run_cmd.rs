use anyhow::Result;
use rotor_config::RotorConfig;
use rotor_lock::acquire_singleton;
use rotor_process::ProcessSupervisor;
use rotor_scheduler::CredentialPool;
use rotor_stats::StatsPoller;
use tracing::info;

use crate::orchestrator::Orchestrator;

/// Validate, take the singleton lock, and hand over to the rotation loop.
/// Returns only on a fatal error.
pub(crate) async fn handle_run(config: RotorConfig) -> Result<()> {
    config.validate()?;
    let _guard = acquire_singleton(&config.lock_path, "rotor run")?;
    info!(lock = %config.lock_path.display(), "Acquired supervisor lock");

    let pool = CredentialPool::load(&config.credentials_dir)?;
    info!(
        count = pool.len(),
        dir = %config.credentials_dir.display(),
        "Credential pool loaded"
    );

    let supervisor = ProcessSupervisor::new(&config)?;
    supervisor.ensure_binary()?;
    let poller = StatsPoller::new(&config.transfer, config.timing.request_timeout())?;
    info!(
        endpoint = %poller.url(),
        rules = ?config.rules.enabled_rules(),
        quorum = config.rules.quorum,
        "Starting rotation loop"
    );

    let mut orchestrator = Orchestrator::new(&config, pool, supervisor, poller);
    orchestrator.run().await
}
