//! # Secure CLI Executor
//!
//! Execute allowlisted CLI commands with parameter substitution, input
//! validation, output limiting, and timeout enforcement.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use crate::core::response::truncate;
use crate::features::plugins::config::ExecutionConfig;
use anyhow::Result;
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Characters that could enable shell injection
const DANGEROUS_CHARS: &[char] = &[
    '|', ';', '&', '$', '`', '(', ')', '{', '}', '<', '>', '\n', '\r', '\0',
];

/// Result of a CLI command execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,

    pub exit_code: Option<i32>,

    /// Standard output (may be truncated)
    pub stdout: String,

    pub stderr: String,

    pub timed_out: bool,
}

impl ExecutionResult {
    /// Best diagnostic to show for a failed run
    pub fn failure_reason(&self) -> String {
        if self.timed_out {
            return self.stderr.clone();
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.exit_code {
            Some(code) => format!("Command exited with status {code}"),
            None => "Command terminated by signal".to_string(),
        }
    }
}

/// Secure CLI command executor
#[derive(Debug, Clone)]
pub struct PluginExecutor {
    allowed_commands: HashSet<String>,
}

impl PluginExecutor {
    /// Create a new executor with the given allowlist
    pub fn new(allowed_commands: Vec<String>) -> Self {
        Self {
            allowed_commands: allowed_commands.into_iter().collect(),
        }
    }

    pub fn is_allowed(&self, command: &str) -> bool {
        self.allowed_commands.contains(command)
    }

    /// Execute a manifest command with full security checks
    pub async fn execute(
        &self,
        config: &ExecutionConfig,
        params: &HashMap<String, String>,
    ) -> Result<ExecutionResult> {
        if !self.is_allowed(&config.command) {
            return Err(anyhow::anyhow!(
                "Command not in allowlist: {}",
                config.command
            ));
        }

        let args = substitute_params(&config.args, params)?;

        info!(
            "⚙️ Executing: {} {:?} (timeout: {}s)",
            config.command, args, config.timeout_seconds
        );

        let mut cmd = Command::new(&config.command);
        cmd.args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = config.working_directory {
            cmd.current_dir(dir);
        }
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let timeout_duration = Duration::from_secs(config.timeout_seconds);
        match timeout(timeout_duration, cmd.output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);

                let stdout = if stdout.len() > config.max_output_bytes {
                    warn!(
                        "Output truncated from {} to {} bytes",
                        stdout.len(),
                        config.max_output_bytes
                    );
                    truncate(&stdout, config.max_output_bytes)
                } else {
                    stdout.into_owned()
                };

                let exit_code = output.status.code();
                let success = output.status.success();
                if success {
                    info!("Command completed, output length: {} bytes", stdout.len());
                } else {
                    warn!("Command failed with exit code: {:?}", exit_code);
                }

                Ok(ExecutionResult {
                    success,
                    exit_code,
                    stdout,
                    stderr: truncate(&stderr, config.max_output_bytes),
                    timed_out: false,
                })
            }
            Ok(Err(e)) => Err(anyhow::anyhow!(
                "Failed to execute {}: {}",
                config.command,
                e
            )),
            Err(_) => {
                warn!("Command timed out after {} seconds", config.timeout_seconds);
                Ok(ExecutionResult {
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("Command timed out after {} seconds", config.timeout_seconds),
                    timed_out: true,
                })
            }
        }
    }
}

/// Substitute ${param} placeholders in arguments.
///
/// Parameters are validated before substitution; the manifest's own
/// arguments are trusted and may contain shell syntax.
pub fn substitute_params(args: &[String], params: &HashMap<String, String>) -> Result<Vec<String>> {
    validate_params(params)?;

    args.iter()
        .map(|arg| {
            let mut result = arg.clone();
            for (key, value) in params {
                result = result.replace(&format!("${{{key}}}"), value);
            }

            if let Some(start) = result.find("${") {
                let placeholder = match result[start..].find('}') {
                    Some(end) => &result[start..start + end + 1],
                    None => &result[start..],
                };
                return Err(anyhow::anyhow!(
                    "Unsubstituted placeholder {}: parameter not provided",
                    placeholder
                ));
            }
            Ok(result)
        })
        .collect()
}

/// Check every user-supplied value before it reaches an argument list
pub fn validate_params(params: &HashMap<String, String>) -> Result<()> {
    for (key, value) in params {
        validate_argument(value)
            .map_err(|e| anyhow::anyhow!("Invalid parameter '{}': {}", key, e))?;
    }
    Ok(())
}

/// Reject values carrying shell metacharacters; `&` is allowed inside URLs
pub fn validate_argument(arg: &str) -> Result<()> {
    let is_url = arg.starts_with("http://") || arg.starts_with("https://");

    for &ch in DANGEROUS_CHARS {
        if ch == '&' && is_url {
            continue;
        }
        if arg.contains(ch) {
            let ch_display = match ch {
                '\n' => "newline".to_string(),
                '\r' => "carriage return".to_string(),
                '\0' => "null byte".to_string(),
                _ => format!("'{}'", ch),
            };
            return Err(anyhow::anyhow!(
                "Argument contains forbidden character {}: {}",
                ch_display,
                arg.chars().take(50).collect::<String>()
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> PluginExecutor {
        PluginExecutor::new(vec!["echo".to_string(), "sh".to_string()])
    }

    fn config(command: &str, args: &[&str]) -> ExecutionConfig {
        ExecutionConfig {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout_seconds: 10,
            working_directory: None,
            max_output_bytes: 1000,
            env: HashMap::new(),
        }
    }

    #[test]
    fn test_allowlist() {
        let executor = executor();
        assert!(executor.is_allowed("echo"));
        assert!(!executor.is_allowed("rm"));
    }

    #[test]
    fn test_substitute_params() {
        let args = vec!["--url".to_string(), "${url}".to_string()];
        let mut params = HashMap::new();
        params.insert("url".to_string(), "https://example.com/?a=1&b=2".to_string());

        let result = substitute_params(&args, &params).unwrap();
        assert_eq!(result, vec!["--url", "https://example.com/?a=1&b=2"]);
    }

    #[test]
    fn test_substitute_params_missing() {
        let err = substitute_params(&["${missing}".to_string()], &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("${missing}"));
    }

    #[test]
    fn test_dangerous_user_input_rejected() {
        let mut params = HashMap::new();
        params.insert("url".to_string(), "https://evil.com; rm -rf /".to_string());
        let err = substitute_params(&["${url}".to_string()], &params).unwrap_err();
        assert!(err.to_string().contains("Invalid parameter"));
    }

    #[test]
    fn test_validate_argument() {
        assert!(validate_argument("safe-argument").is_ok());
        assert!(validate_argument("foo & bar").is_err());
        assert!(validate_argument("$(whoami)").is_err());
        assert!(validate_argument("arg\ninjected").is_err());
    }

    #[test]
    fn test_shell_script_in_manifest_is_trusted() {
        let args = vec!["-c".to_string(), "echo $HOME && true".to_string()];
        let result = substitute_params(&args, &HashMap::new()).unwrap();
        assert_eq!(result[1], "echo $HOME && true");
    }

    #[tokio::test]
    async fn test_execute_not_allowed() {
        let err = executor()
            .execute(&config("rm", &["-rf"]), &HashMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not in allowlist"));
    }

    #[tokio::test]
    async fn test_execute_with_params() {
        let mut params = HashMap::new();
        params.insert("msg".to_string(), "test message".to_string());

        let result = executor()
            .execute(&config("echo", &["Message: ${msg}"]), &params)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "Message: test message");
    }

    #[tokio::test]
    async fn test_execute_failure_reason() {
        let result = executor()
            .execute(&config("sh", &["-c", "echo oops >&2; exit 3"]), &HashMap::new())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.failure_reason(), "oops");
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let mut cfg = config("sh", &["-c", "sleep 5"]);
        cfg.timeout_seconds = 1;
        let result = executor().execute(&cfg, &HashMap::new()).await.unwrap();
        assert!(result.timed_out);
        assert!(result.failure_reason().contains("timed out"));
    }

    #[tokio::test]
    async fn test_output_capped() {
        let mut cfg = config("sh", &["-c", "printf '%0200d' 0"]);
        cfg.max_output_bytes = 50;
        let result = executor().execute(&cfg, &HashMap::new()).await.unwrap();
        assert_eq!(result.stdout.len(), 50);
        assert!(result.stdout.ends_with("..."));
    }
}
