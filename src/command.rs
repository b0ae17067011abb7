/*!
 * Command Runner
 * Executes a generator command and captures its output as file content
 */

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

/// Runs one manifest entry's generator command.
///
/// The command executes through `sh -c` with the process environment
/// overlaid by the entry's variables plus `ROOT` pointing at the mount
/// point. Standard output is the produced content. A generator that
/// cannot start or exits abnormally degrades to diagnostic text as the
/// content, keeping the mount browsable.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    command: String,
    workdir: PathBuf,
    env: BTreeMap<String, String>,
    mountpoint: PathBuf,
}

impl CommandRunner {
    pub fn new(
        command: String,
        workdir: PathBuf,
        env: BTreeMap<String, String>,
        mountpoint: PathBuf,
    ) -> Self {
        Self {
            command,
            workdir,
            env,
            mountpoint,
        }
    }

    /// Execute the generator and return its content. Never fails.
    pub fn run(&self) -> Vec<u8> {
        debug!(command = %self.command, workdir = %self.workdir.display(), "running generator");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.workdir)
            .envs(&self.env)
            .env("ROOT", &self.mountpoint)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!(command = %self.command, error = %e, "generator could not be started");
                return format!("failed to start generator `{}`: {}\n", self.command, e)
                    .into_bytes();
            }
        };

        if !output.stderr.is_empty() {
            debug!(
                command = %self.command,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "generator stderr"
            );
        }

        if output.status.success() {
            return output.stdout;
        }

        warn!(command = %self.command, status = %output.status, "generator failed");
        let mut diagnostic =
            format!("generator `{}` failed: {}\n", self.command, output.status).into_bytes();
        diagnostic.extend_from_slice(&output.stderr);
        diagnostic
    }
}
