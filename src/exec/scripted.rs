//! Deterministic in-process executor.
//!
//! Replies are keyed by host and command prefix; background launches run a
//! local `sh -c` script in place of the remote tool. Every call is recorded so
//! orchestration can be asserted without a live network.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{spawn_background, ExecError, ExecOutput, RemoteCommand, RemoteExecutor, RemoteProcess};

/// Matches any host.
pub const ANY_HOST: &str = "*";

#[derive(Debug, Clone)]
enum Reply {
    Output(ExecOutput),
    Unreachable,
    Timeout,
}

#[derive(Debug, Clone)]
struct Rule {
    host: String,
    prefix: String,
    reply: Reply,
}

#[derive(Debug, Clone)]
struct SpawnRule {
    host: String,
    prefix: String,
    script: String,
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub host: String,
    pub command: String,
    pub background: bool,
}

#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    spawns: Mutex<Vec<SpawnRule>>,
    calls: Mutex<Vec<Call>>,
}

fn matches(rule_host: &str, rule_prefix: &str, host: &str, command: &str) -> bool {
    (rule_host == ANY_HOST || rule_host == host) && command.starts_with(rule_prefix)
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, host: &str, prefix: &str, reply: Reply) -> &Self {
        self.rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Rule {
                host: host.to_string(),
                prefix: prefix.to_string(),
                reply,
            });
        self
    }

    /// Successful run printing `stdout`.
    pub fn reply(&self, host: &str, prefix: &str, stdout: &str) -> &Self {
        self.push(
            host,
            prefix,
            Reply::Output(ExecOutput {
                code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
        )
    }

    /// Run exiting with `code` and the given streams.
    pub fn reply_exit(&self, host: &str, prefix: &str, code: i32, stdout: &str, stderr: &str) -> &Self {
        self.push(
            host,
            prefix,
            Reply::Output(ExecOutput {
                code: Some(code),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
        )
    }

    /// Every command on `host` fails as if the host were down.
    pub fn unreachable(&self, host: &str) -> &Self {
        self.push(host, "", Reply::Unreachable)
    }

    /// Runs matching `prefix` on `host` time out.
    pub fn timeout(&self, host: &str, prefix: &str) -> &Self {
        self.push(host, prefix, Reply::Timeout)
    }

    /// Background launches matching `prefix` on `host` run `script` locally.
    pub fn process(&self, host: &str, prefix: &str, script: &str) -> &Self {
        self.spawns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SpawnRule {
                host: host.to_string(),
                prefix: prefix.to_string(),
                script: script.to_string(),
            });
        self
    }

    /// Recorded calls, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Recorded commands on `host` (or [`ANY_HOST`]) starting with `prefix`.
    pub fn calls_to(&self, host: &str, prefix: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches(host, prefix, &c.host, &c.command))
            .collect()
    }

    fn record(&self, host: &str, command: &str, background: bool) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Call {
                host: host.to_string(),
                command: command.to_string(),
                background,
            });
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn run(
        &self,
        host: &str,
        command: &RemoteCommand,
        timeout: Duration,
    ) -> Result<ExecOutput, ExecError> {
        let shown = command.to_string();
        self.record(host, &shown, false);

        // Later rules override earlier ones.
        let reply = self
            .rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|r| matches(&r.host, &r.prefix, host, &shown))
            .map(|r| r.reply.clone());

        match reply {
            Some(Reply::Output(output)) if output.success() => Ok(output),
            Some(Reply::Output(output)) => Err(ExecError::NonZeroExit {
                host: host.to_string(),
                command: shown,
                code: output.code,
                output,
            }),
            Some(Reply::Unreachable) => Err(ExecError::HostUnreachable {
                host: host.to_string(),
                detail: "scripted host is down".to_string(),
            }),
            Some(Reply::Timeout) => Err(ExecError::TimedOut {
                host: host.to_string(),
                command: shown,
                after: timeout,
            }),
            None => Err(ExecError::NonZeroExit {
                host: host.to_string(),
                command: shown,
                code: Some(127),
                output: ExecOutput {
                    code: Some(127),
                    stdout: String::new(),
                    stderr: "no scripted reply".to_string(),
                },
            }),
        }
    }

    async fn spawn(&self, host: &str, command: &RemoteCommand) -> Result<RemoteProcess, ExecError> {
        let shown = command.to_string();
        self.record(host, &shown, true);

        let unreachable = self
            .rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|r| matches!(r.reply, Reply::Unreachable) && r.host == host);
        if unreachable {
            return Err(ExecError::HostUnreachable {
                host: host.to_string(),
                detail: "scripted host is down".to_string(),
            });
        }

        let script = self
            .spawns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|r| matches(&r.host, &r.prefix, host, &shown))
            .map(|r| r.script.clone());

        let Some(script) = script else {
            return Err(ExecError::Spawn {
                command: shown,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no scripted background process",
                ),
            });
        };

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        spawn_background(host, shown, cmd)
    }
}
