//! Admin actions backed by external commands

use neo_config::AdminConfig;
use neo_core::{AdminAction, AdminActions};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// How often a running command is checked for exit
const WAIT_POLL: Duration = Duration::from_millis(100);

/// Runs the command configured under `[admin.commands]` for each action
pub struct CommandAdmin {
    config: AdminConfig,
}

impl CommandAdmin {
    pub fn new(config: AdminConfig) -> Self {
        Self { config }
    }
}

/// Wait for `child` until `timeout`, killing it once that passes
fn wait_bounded(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if started.elapsed() >= timeout {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(WAIT_POLL.min(timeout));
    }
}

impl AdminActions for CommandAdmin {
    fn execute(&mut self, action: AdminAction) -> bool {
        let Some(argv) = self.config.command_for(action.name()) else {
            warn!("No command configured for {}", action.name());
            return false;
        };

        let child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn();
        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to run {}: {}", argv[0], e);
                return false;
            }
        };

        match wait_bounded(&mut child, self.config.timeout()) {
            Ok(Some(status)) if status.success() => {
                info!("{} finished", action.name());
                true
            }
            Ok(Some(status)) => {
                warn!("{} exited with {}", argv[0], status);
                false
            }
            Ok(None) => {
                warn!(
                    "{} killed after {}s",
                    argv[0],
                    self.config.timeout().as_secs()
                );
                false
            }
            Err(e) => {
                warn!("Waiting for {} failed: {}", argv[0], e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(action: &str, argv: &[&str]) -> CommandAdmin {
        let mut config = AdminConfig::default();
        config
            .commands
            .insert(action.to_string(), argv.iter().map(|a| a.to_string()).collect());
        CommandAdmin::new(config)
    }

    #[test]
    fn test_unconfigured_action_fails() {
        let mut admin = CommandAdmin::new(AdminConfig::default());
        assert!(!admin.execute(AdminAction::CopyFromUsb));
    }

    #[test]
    fn test_command_status_is_reported() {
        let mut admin = configured("erase_folder", &["sh", "-c", "exit 0"]);
        assert!(admin.execute(AdminAction::EraseFolder));

        let mut admin = configured("erase_folder", &["sh", "-c", "exit 3"]);
        assert!(!admin.execute(AdminAction::EraseFolder));
    }

    #[test]
    fn test_missing_program_fails() {
        let mut admin = configured("copy_from_usb", &["/nonexistent/neo-copy"]);
        assert!(!admin.execute(AdminAction::CopyFromUsb));
    }

    #[test]
    fn test_hung_command_is_killed() {
        let mut admin = configured("copy_from_usb", &["sleep", "30"]);
        admin.config.timeout_secs = 1;
        let started = Instant::now();

        assert!(!admin.execute(AdminAction::CopyFromUsb));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
