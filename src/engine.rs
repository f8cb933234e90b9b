use std::path::Path;

use crate::broker;
use crate::classify::{classify, Payload};
use crate::error::{ClientError, Result};
use crate::install;
use crate::session::Session;
use crate::types::Vault;

/// Seam between the engine and the subprocess broker. The production
/// implementation spawns real processes; tests substitute a stub that
/// returns canned wire output.
pub(crate) trait Invoke: Send + Sync {
    fn invoke(&self, executable: &Path, argv: &[String], pre_step: Option<&str>) -> String;
}

pub(crate) struct ProcessInvoker {
    timeout_ms: u64,
}

impl Default for ProcessInvoker {
    fn default() -> Self {
        Self {
            timeout_ms: broker::DEFAULT_INVOKE_TIMEOUT_MS,
        }
    }
}

impl Invoke for ProcessInvoker {
    fn invoke(&self, executable: &Path, argv: &[String], pre_step: Option<&str>) -> String {
        broker::invoke_with_timeout(executable, argv, pre_step, self.timeout_ms)
    }
}

/// Per-call options for the engine. Explicit struct with documented
/// defaults; never mutated.
#[derive(Default)]
pub(crate) struct ExecOptions<'a> {
    /// Privileged calls pass the session; the gate is checked before any
    /// process is spawned.
    pub(crate) session: Option<&'a Session>,
    /// Scope the call to one vault (`--vault=<name>`).
    pub(crate) vault: Option<&'a Vault>,
    /// Return the output verbatim instead of parsing it as JSON.
    pub(crate) raw: bool,
    /// Shell fragment whose output is piped into the invocation's stdin.
    pub(crate) pre_step: Option<String>,
    /// Overrides `session.install_dir` for executable resolution.
    pub(crate) install_dir: Option<&'a Path>,
}

/// The single choke point all domain operations flow through: a logical verb
/// plus options becomes one external invocation, classified once.
pub(crate) struct Engine {
    invoker: Box<dyn Invoke>,
    version: String,
}

impl Engine {
    pub(crate) fn new() -> Self {
        Self {
            invoker: Box::new(ProcessInvoker::default()),
            version: install::OP_CLI_VERSION.to_string(),
        }
    }

    pub(crate) fn with_invoker(invoker: Box<dyn Invoke>) -> Self {
        Self {
            invoker,
            version: install::OP_CLI_VERSION.to_string(),
        }
    }

    pub(crate) fn run(&self, verb: &str, options: ExecOptions<'_>) -> Result<Payload> {
        let mut argv: Vec<String> = verb.split_whitespace().map(str::to_string).collect();

        if let Some(session) = options.session {
            // Fail fast on an expired session rather than spending a spawn
            // on a call known to fail.
            if !session.is_valid() {
                return Err(ClientError::session("Session invalid"));
            }
            argv.push(format!("--session={}", session.token));
        }

        if let Some(vault) = options.vault {
            argv.push(format!("--vault={}", vault.name));
        }

        let install_dir = options
            .install_dir
            .or_else(|| options.session.map(|session| session.install_dir.as_path()))
            .ok_or_else(|| ClientError::query("no installation directory available"))?;
        let executable =
            install::ensure_installed(install_dir, &self.version, std::env::consts::OS)?;

        let raw_output = self
            .invoker
            .invoke(&executable, &argv, options.pre_step.as_deref());
        classify(&raw_output, options.raw)
    }
}
