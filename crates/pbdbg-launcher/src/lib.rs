//! Debuggee identity and process spawning: CSPRNG pipe ids, the
//! `PB_DEBUGGER_Communication`/`PB_DEBUGGER_Options` environment contract,
//! and a `tokio::process::Command` spawn with async exit monitoring.

use std::path::PathBuf;
use std::time::Duration;

use rand::RngCore;
use tokio::process::{Child, Command};

const PIPE_ID_BYTES: usize = 8;

/// Debuggee flags carried in `PB_DEBUGGER_Options` and, later, `ExeMode`'s
/// `value1` bit flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebuggeeOptions {
    pub unicode: bool,
    pub stop_on_entry: bool,
    pub stop_on_end: bool,
    pub big_endian: bool,
}

impl Default for DebuggeeOptions {
    fn default() -> Self {
        Self {
            unicode: true,
            stop_on_entry: true,
            stop_on_end: false,
            big_endian: false,
        }
    }
}

impl DebuggeeOptions {
    /// Build options from caller-specified overrides, falling back to
    /// [`DebuggeeOptions::default`] (`spec.md` §6: `1;1;0;0`) for anything
    /// left unset. Callers on the request/CLI boundary should route through
    /// here rather than defaulting an unset flag to `false` directly.
    pub fn with_overrides(
        unicode: Option<bool>,
        stop_on_entry: Option<bool>,
        stop_on_end: Option<bool>,
        big_endian: Option<bool>,
    ) -> Self {
        let default = Self::default();
        Self {
            unicode: unicode.unwrap_or(default.unicode),
            stop_on_entry: stop_on_entry.unwrap_or(default.stop_on_entry),
            stop_on_end: stop_on_end.unwrap_or(default.stop_on_end),
            big_endian: big_endian.unwrap_or(default.big_endian),
        }
    }

    /// `unicode;stopOnEntry;stopOnEnd;bigEndian`, each `0` or `1`.
    pub fn to_env_value(self) -> String {
        format!(
            "{};{};{};{}",
            self.unicode as u8, self.stop_on_entry as u8, self.stop_on_end as u8, self.big_endian as u8
        )
    }
}

/// Everything the launcher needs to start a debuggee and hand it a pipe id.
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    pub exe_path: PathBuf,
    pub args: Vec<String>,
    pub env_overrides: Vec<(String, String)>,
    pub options: DebuggeeOptions,
    pub handshake_deadline: Duration,
}

impl LauncherConfig {
    pub fn new(exe_path: impl Into<PathBuf>) -> Self {
        Self {
            exe_path: exe_path.into(),
            args: Vec::new(),
            env_overrides: Vec::new(),
            options: DebuggeeOptions::default(),
            handshake_deadline: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
pub enum LauncherError {
    /// The configured executable does not exist or is not a file.
    ExeNotFound(PathBuf),
    /// `tokio::process::Command::spawn` failed.
    Spawn(std::io::Error),
}

impl std::fmt::Display for LauncherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExeNotFound(path) => write!(f, "debuggee executable not found: {}", path.display()),
            Self::Spawn(e) => write!(f, "failed to spawn debuggee: {e}"),
        }
    }
}

impl std::error::Error for LauncherError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(e) => Some(e),
            Self::ExeNotFound(_) => None,
        }
    }
}

/// Generate a pipe id: CSPRNG bytes, hex-uppercase-encoded, at least 8
/// characters (`spec.md` §6).
pub fn generate_pipe_id() -> String {
    let mut bytes = [0u8; PIPE_ID_BYTES];
    let mut rng = rand::rngs::OsRng;
    rng.fill_bytes(&mut bytes);
    let mut id = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        id.push_str(&format!("{byte:02X}"));
    }
    id
}

/// Compute the value of `PB_DEBUGGER_Communication` for the current
/// platform, given a pipe id already passed to [`pbdbg_transport::prepare`].
#[cfg(windows)]
pub fn communication_env_value(pipe_id: &str) -> String {
    // Bare form: the debuggee derives both pipe names from the fixed
    // `PureBasic_DebuggerPipe{A,B}_` prefix itself.
    pipe_id.to_string()
}

#[cfg(unix)]
pub fn communication_env_value(pipe_id: &str) -> String {
    let (in_path, out_path) = pbdbg_transport::posix_fifo_paths(pipe_id);
    format!("FifoFiles;{};{}", in_path.display(), out_path.display())
}

/// Spawn the debuggee with the pipe id and options wired into its
/// environment. `pipe_id` must already have been passed to
/// [`pbdbg_transport::prepare`] so the pipe nodes exist by the time the
/// child looks for them.
pub fn spawn(config: &LauncherConfig, pipe_id: &str) -> Result<Child, LauncherError> {
    if !config.exe_path.is_file() {
        return Err(LauncherError::ExeNotFound(config.exe_path.clone()));
    }

    let mut command = Command::new(&config.exe_path);
    command
        .args(&config.args)
        .env("PB_DEBUGGER_Communication", communication_env_value(pipe_id))
        .env("PB_DEBUGGER_Options", config.options.to_env_value())
        .kill_on_drop(true);

    for (key, value) in &config.env_overrides {
        command.env(key, value);
    }

    tracing::info!(exe = %config.exe_path.display(), %pipe_id, "spawning debuggee");
    command.spawn().map_err(LauncherError::Spawn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_id_is_at_least_8_uppercase_hex_chars() {
        let id = generate_pipe_id();
        assert!(id.len() >= 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn pipe_ids_are_not_constant() {
        assert_ne!(generate_pipe_id(), generate_pipe_id());
    }

    #[test]
    fn default_options_match_spec_default() {
        assert_eq!(DebuggeeOptions::default().to_env_value(), "1;1;0;0");
    }

    #[test]
    fn options_env_value_encodes_each_flag() {
        let opts = DebuggeeOptions {
            unicode: false,
            stop_on_entry: false,
            stop_on_end: true,
            big_endian: true,
        };
        assert_eq!(opts.to_env_value(), "0;0;1;1");
    }

    #[test]
    fn unset_overrides_fall_back_to_spec_default() {
        let opts = DebuggeeOptions::with_overrides(None, None, None, None);
        assert_eq!(opts, DebuggeeOptions::default());
        assert_eq!(opts.to_env_value(), "1;1;0;0");
    }

    #[test]
    fn overrides_only_replace_the_fields_given() {
        let opts = DebuggeeOptions::with_overrides(Some(false), None, Some(true), None);
        assert_eq!(
            opts,
            DebuggeeOptions {
                unicode: false,
                stop_on_entry: true,
                stop_on_end: true,
                big_endian: false,
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn posix_communication_value_names_both_fifos() {
        let value = communication_env_value("DEADBEEF");
        assert!(value.starts_with("FifoFiles;"));
        assert!(value.contains("pb-debug-in-DEADBEEF"));
        assert!(value.contains("pb-debug-out-DEADBEEF"));
    }

    #[tokio::test]
    async fn spawning_a_missing_executable_is_reported() {
        let config = LauncherConfig::new("/no/such/debuggee-binary");
        let err = spawn(&config, &generate_pipe_id()).unwrap_err();
        assert!(matches!(err, LauncherError::ExeNotFound(_)));
    }
}
