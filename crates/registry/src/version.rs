//! Version command execution.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::VersionError;

/// Runs `command` and returns its trimmed stdout.
///
/// The command is split on whitespace into a program and its arguments; no
/// shell is involved. The child is killed once `timeout` elapses.
pub(crate) async fn run_version_command(command: String, timeout: Duration) -> Result<String, VersionError> {
	let spawn_err = |source| VersionError::Spawn {
		command: command.clone(),
		source,
	};

	let mut words = command.split_whitespace();
	let program = words.next().ok_or(VersionError::Empty)?;
	let child = Command::new(program)
		.args(words)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.kill_on_drop(true)
		.spawn()
		.map_err(spawn_err)?;

	let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
		Ok(output) => output.map_err(spawn_err)?,
		Err(_) => {
			tracing::debug!(command = %command, ?timeout, "killed timed out version command");
			return Err(VersionError::Timeout { command, timeout });
		}
	};

	if !output.status.success() {
		return Err(VersionError::Exit {
			status: output.status.code(),
			stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
			command,
		});
	}
	Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

#[cfg(all(test, unix))]
mod tests {
	use std::time::Instant;

	use super::*;

	const TIMEOUT: Duration = Duration::from_secs(10);

	async fn run(command: &str, timeout: Duration) -> Result<String, VersionError> {
		run_version_command(command.to_owned(), timeout).await
	}

	#[tokio::test]
	async fn trims_stdout() {
		assert_eq!(run("echo  1.2.3 ", TIMEOUT).await.unwrap(), "1.2.3");
	}

	#[tokio::test]
	async fn empty_command() {
		assert!(matches!(run("   ", TIMEOUT).await, Err(VersionError::Empty)));
	}

	#[tokio::test]
	async fn missing_program() {
		let err = run("/definitely/not/a/program", TIMEOUT).await.unwrap_err();
		assert!(matches!(err, VersionError::Spawn { .. }));
	}

	#[tokio::test]
	async fn non_zero_exit() {
		let err = run("false", TIMEOUT).await.unwrap_err();
		assert!(matches!(err, VersionError::Exit { status: Some(1), .. }), "{err}");
	}

	#[tokio::test]
	async fn timeout_kills_child() {
		let started = Instant::now();
		let err = run("sleep 5", Duration::from_millis(200)).await.unwrap_err();
		assert!(matches!(err, VersionError::Timeout { .. }));
		assert!(started.elapsed() < Duration::from_secs(5));
	}
}
