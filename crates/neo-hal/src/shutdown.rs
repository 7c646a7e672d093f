//! Operating-system shutdown

use crate::{HalError, Result};
use std::process::Command;

/// One-shot "begin OS shutdown" action. Implementations must tolerate being
/// called more than once.
pub trait ShutdownTrigger: Send + Sync {
    fn request_shutdown(&self) -> Result<()>;
}

/// Shuts the host down by running `shutdown now`
#[derive(Debug, Clone)]
pub struct SystemShutdown {
    program: String,
    args: Vec<String>,
}

impl SystemShutdown {
    /// Use a custom command instead of `shutdown now`
    pub fn with_command(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Default for SystemShutdown {
    fn default() -> Self {
        Self::with_command("shutdown", vec!["now".into()])
    }
}

impl ShutdownTrigger for SystemShutdown {
    fn request_shutdown(&self) -> Result<()> {
        tracing::info!("Exiting for shutdown");

        // Flush dirty pages first; the HAT may cut power shortly after
        nix::unistd::sync();

        let output = Command::new(&self.program).args(&self.args).output()?;
        if !output.status.success() {
            return Err(HalError::Unsupported(format!(
                "{} failed: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}
