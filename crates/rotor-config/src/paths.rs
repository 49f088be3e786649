use std::path::PathBuf;

/// XDG app name used for config, state and runtime paths.
pub const APP_NAME: &str = "credential-rotor";

const CONFIG_FILE: &str = "config.toml";
const STATE_FILE: &str = "state.json";
const LOCK_FILE: &str = "credential-rotor.lock";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

fn effective_uid() -> u32 {
    // SAFETY: `geteuid` has no preconditions and returns caller effective UID.
    unsafe { libc::geteuid() }
}

fn runtime_dir_for(runtime_root: Option<&str>, uid: u32) -> PathBuf {
    if let Some(runtime_root) = runtime_root.filter(|r| !r.is_empty()) {
        return PathBuf::from(runtime_root).join(APP_NAME);
    }
    PathBuf::from("/tmp").join(format!("{APP_NAME}-{uid}"))
}

/// `$XDG_CONFIG_HOME/credential-rotor/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// `$XDG_STATE_HOME/credential-rotor/state.json`, falling back to the local
/// data dir on platforms without a state dir.
pub fn default_state_path() -> PathBuf {
    project_dirs()
        .map(|dirs| {
            dirs.state_dir()
                .unwrap_or_else(|| dirs.data_local_dir())
                .join(STATE_FILE)
        })
        .unwrap_or_else(|| runtime_dir().join(STATE_FILE))
}

/// Lock file lives in the runtime dir so it never outlives a reboot.
pub fn default_lock_path() -> PathBuf {
    runtime_dir().join(LOCK_FILE)
}

pub fn runtime_dir() -> PathBuf {
    let runtime_root = std::env::var("XDG_RUNTIME_DIR").ok();
    runtime_dir_for(runtime_root.as_deref(), effective_uid())
}

/// rclone's own default config location (`~/.config/rclone/rclone.conf`).
pub fn default_rclone_config() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.config_dir().join("rclone").join("rclone.conf"))
        .unwrap_or_else(|| PathBuf::from("rclone.conf"))
}
