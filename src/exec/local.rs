//! Local transport: the "host" is only a label and every command runs on this
//! machine. Used when the verifier itself runs inside the emulated host's
//! namespace, and by tests.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{
    run_to_completion, spawn_background, ExecError, ExecOutput, RemoteCommand, RemoteExecutor,
    RemoteProcess,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalExecutor;

fn command_for(command: &RemoteCommand) -> Command {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args);
    cmd
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn run(
        &self,
        host: &str,
        command: &RemoteCommand,
        timeout: Duration,
    ) -> Result<ExecOutput, ExecError> {
        run_to_completion(host, command.to_string(), command_for(command), timeout).await
    }

    async fn spawn(&self, host: &str, command: &RemoteCommand) -> Result<RemoteProcess, ExecError> {
        spawn_background(host, command.to_string(), command_for(command))
    }
}
