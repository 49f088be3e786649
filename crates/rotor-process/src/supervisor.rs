use crate::command::{RC_PASS_ENV, shell_line, transfer_args};
use crate::inject::{CredentialInjector, injector_for};
use crate::tree::terminate_tree;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rotor_config::{RotorConfig, TransferConfig};
use rotor_core::{CredentialIdentity, RotorError};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Lifecycle operations the orchestrator needs from a transfer process.
#[async_trait]
pub trait ProcessControl: Send {
    /// Start the transfer under `credential`; returns the launcher PID.
    async fn spawn(&mut self, credential: &CredentialIdentity) -> Result<u32>;

    /// Stop the active transfer, if any, and wait out the cooldown.
    /// Returns how many processes were signalled.
    async fn terminate(&mut self) -> Result<usize>;

    /// Kill a transfer left behind by a previous supervisor run.
    async fn recover_orphan(&mut self, launcher_pid: u32) -> Result<usize>;

    /// True when nothing is running, or the launcher has exited.
    fn has_exited(&mut self) -> bool;
}

struct SupervisedProcess {
    child: Child,
    launcher_pid: u32,
    credential: CredentialIdentity,
}

/// Runs the transfer as `sh -c "<binary> <args>"` in its own session.
pub struct ProcessSupervisor {
    transfer: TransferConfig,
    injector: Box<dyn CredentialInjector>,
    cooldown: Duration,
    active: Option<SupervisedProcess>,
}

impl ProcessSupervisor {
    pub fn new(config: &RotorConfig) -> Result<Self> {
        let injector = injector_for(config)?;
        debug!(strategy = %injector.describe(), "Credential injection strategy");
        Ok(Self {
            transfer: config.transfer.clone(),
            injector,
            cooldown: config.timing.cooldown(),
            active: None,
        })
    }

    /// Fail early when the transfer binary cannot be resolved.
    pub fn ensure_binary(&self) -> Result<()> {
        which::which(&self.transfer.binary).map_err(|_| RotorError::BinaryNotFound {
            binary: self.transfer.binary.clone(),
        })?;
        Ok(())
    }

    pub fn launcher_pid(&self) -> Option<u32> {
        self.active.as_ref().map(|p| p.launcher_pid)
    }

    async fn kill_tree(&self, launcher_pid: u32) -> Result<usize> {
        let binary = self.transfer.binary.clone();
        tokio::task::spawn_blocking(move || terminate_tree(launcher_pid, &binary))
            .await
            .context("Process-tree scan panicked")
    }
}

#[async_trait]
impl ProcessControl for ProcessSupervisor {
    async fn spawn(&mut self, credential: &CredentialIdentity) -> Result<u32> {
        let mut args = transfer_args(&self.transfer);
        self.injector.prepare(&mut args, credential)?;
        let line = shell_line(&self.transfer.binary, &args);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&line);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::inherit());
        cmd.kill_on_drop(true);
        if let Some(pass) = &self.transfer.rc_pass {
            cmd.env(RC_PASS_ENV, pass);
        }

        // SAFETY: setsid() is async-signal-safe and we call it before exec,
        // so no Rust runtime state exists in the child yet.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        debug!(command = %line, "Spawning transfer");
        let child = cmd.spawn().map_err(|e| RotorError::SpawnFailed {
            command: line.clone(),
            reason: e.to_string(),
        })?;
        let launcher_pid = child.id().ok_or_else(|| RotorError::SpawnFailed {
            command: line.clone(),
            reason: "process exited before its PID could be read".to_string(),
        })?;

        info!(
            launcher_pid,
            credential = %credential.label(),
            "Transfer started"
        );
        self.active = Some(SupervisedProcess {
            child,
            launcher_pid,
            credential: credential.clone(),
        });
        Ok(launcher_pid)
    }

    async fn terminate(&mut self) -> Result<usize> {
        let Some(mut process) = self.active.take() else {
            return Ok(0);
        };

        let killed = self.kill_tree(process.launcher_pid).await?;
        if killed == 0 {
            warn!(
                launcher_pid = process.launcher_pid,
                binary = %self.transfer.binary,
                "No transfer process found under launcher"
            );
        }

        // The shell may still be alive after its child is gone.
        if let Err(e) = process.child.start_kill() {
            debug!(error = %e, "Launcher already exited");
        }
        let status = process
            .child
            .wait()
            .await
            .context("Failed to reap transfer launcher")?;
        info!(
            launcher_pid = process.launcher_pid,
            credential = %process.credential.label(),
            killed,
            status = %status,
            "Transfer stopped"
        );

        tokio::time::sleep(self.cooldown).await;
        Ok(killed)
    }

    async fn recover_orphan(&mut self, launcher_pid: u32) -> Result<usize> {
        let killed = self.kill_tree(launcher_pid).await?;
        if killed > 0 {
            info!(launcher_pid, killed, "Killed transfer left by previous run");
            tokio::time::sleep(self.cooldown).await;
        } else {
            debug!(launcher_pid, "No orphaned transfer found");
        }
        Ok(killed)
    }

    fn has_exited(&mut self) -> bool {
        match self.active.as_mut() {
            None => true,
            Some(process) => !matches!(process.child.try_wait(), Ok(None)),
        }
    }
}
