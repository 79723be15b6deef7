use crate::{inventory, RemoteHost};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Shells out to the system `scp`/`ssh` clients with a fixed key and user.
pub struct SshRemote {
    user: String,
    private_key: PathBuf,
    timeout: Duration,
}

impl SshRemote {
    pub fn new(user: impl Into<String>, private_key: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            user: user.into(),
            private_key: private_key.into(),
            timeout,
        }
    }

    fn target(&self, host: &str) -> String {
        // Strip CIDR suffix if present (e.g. "1.2.3.4/32" -> "1.2.3.4")
        let clean_host = host.split('/').next().unwrap_or(host);
        format!("{}@{}", self.user, clean_host)
    }

    fn base_command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.arg("-i")
            .arg(&self.private_key)
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("ConnectTimeout=10")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command, what: &str) -> Result<inventory::CommandOutput> {
        let child = cmd
            .spawn()
            .with_context(|| format!("{} spawn failed", what))?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow::anyhow!("{} timed out after {}s", what, self.timeout.as_secs()))?
            .with_context(|| format!("{} wait failed", what))?;

        Ok(inventory::CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn scp(&self, from: &str, to: &str, what: &str) -> Result<()> {
        let mut cmd = self.base_command("scp");
        cmd.arg("-q").arg(from).arg(to);
        let output = self.run(cmd, what).await?;
        if !output.success() {
            return Err(anyhow::anyhow!(
                "{} failed (exit={:?}): {}",
                what,
                output.exit_code,
                tail_str(&output.stderr, 2000)
            ));
        }
        Ok(())
    }
}

fn tail_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[async_trait]
impl RemoteHost for SshRemote {
    async fn download(&self, host: &str, remote_path: &str) -> Result<String> {
        let local = tempfile::NamedTempFile::new().context("failed to create temp file")?;
        let local_path = local.path().to_string_lossy().to_string();
        let remote = format!("{}:{}", self.target(host), remote_path);

        tracing::debug!("[Ssh] scp download {} -> {}", remote, local_path);
        self.scp(&remote, &local_path, &format!("scp download of {}", remote))
            .await?;

        tokio::fs::read_to_string(local.path())
            .await
            .with_context(|| format!("failed to read downloaded {}", remote))
    }

    async fn upload(&self, host: &str, remote_path: &str, content: &str) -> Result<()> {
        let local = tempfile::NamedTempFile::new().context("failed to create temp file")?;
        tokio::fs::write(local.path(), content.as_bytes())
            .await
            .context("failed to write temp file")?;
        let local_path = local.path().to_string_lossy().to_string();
        let remote = format!("{}:{}", self.target(host), remote_path);

        tracing::debug!("[Ssh] scp upload {} -> {}", local_path, remote);
        self.scp(&local_path, &remote, &format!("scp upload to {}", remote))
            .await
    }

    async fn exec(&self, host: &str, command: &str) -> Result<inventory::CommandOutput> {
        let target = self.target(host);
        let mut cmd = self.base_command("ssh");
        cmd.arg(&target).arg(command);
        tracing::debug!("[Ssh] {} $ {}", target, command);
        self.run(cmd, &format!("ssh {}", target)).await
    }
}
