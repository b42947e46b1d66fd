//! WHOIS fetching through the system `whois` tool.
//!
//! The bot does not speak the WHOIS protocol itself. It runs `whois <domain>`
//! either on a remote host over `sshpass`/`ssh` or locally, and hands the
//! captured text to the classifier.
//!
//! Fetching is fail-soft: every outcome, including misconfiguration, a
//! non-zero exit or a timeout, comes back as a [`WhoisRecord`] whose text
//! describes what happened. Nothing here returns an error to the caller.

use crate::types::WhoisRecord;
use crate::utils::is_valid_domain;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{info, warn};

/// Default upper bound on a single lookup, including the SSH handshake.
pub const DEFAULT_WHOIS_TIMEOUT: Duration = Duration::from_secs(20);

/// Anything that can produce WHOIS text for a domain.
#[async_trait]
pub trait WhoisFetcher: Send + Sync {
    /// Fetch the WHOIS record for `domain`. Never fails; failures are text.
    async fn fetch_whois(&self, domain: &str) -> WhoisRecord;
}

/// Where `whois` runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhoisSource {
    /// Run `whois` on a remote host with password authentication
    Remote {
        host: String,
        user: String,
        password: Option<String>,
    },

    /// Run a local `whois`-compatible program
    Local { program: PathBuf },
}

/// WHOIS client that shells out to the `whois` tool.
#[derive(Debug, Clone)]
pub struct WhoisClient {
    source: WhoisSource,
    timeout: Duration,
}

/// Program, arguments and environment for one lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl WhoisClient {
    /// Client that runs `whois` on `user@host` through `sshpass`.
    pub fn remote<H, U>(host: H, user: U, password: Option<String>) -> Self
    where
        H: Into<String>,
        U: Into<String>,
    {
        Self {
            source: WhoisSource::Remote {
                host: host.into(),
                user: user.into(),
                password,
            },
            timeout: DEFAULT_WHOIS_TIMEOUT,
        }
    }

    /// Client that runs the local `whois` binary.
    pub fn local() -> Self {
        Self::local_program("whois")
    }

    /// Client that runs a specific local program as `<program> <domain>`.
    pub fn local_program<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            source: WhoisSource::Local {
                program: program.into(),
            },
            timeout: DEFAULT_WHOIS_TIMEOUT,
        }
    }

    /// Set a custom timeout for lookups.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the invocation, or the error text to return instead.
    fn invocation(&self, domain: &str) -> Result<Invocation, String> {
        match &self.source {
            WhoisSource::Remote {
                host,
                user,
                password,
            } => {
                let password = match password.as_deref() {
                    Some(p) if !p.is_empty() => p,
                    _ => {
                        return Err("Error: Server password is not configured. \
                             Please set the ROOT_PASSWORD environment variable."
                            .to_string())
                    }
                };

                let connect_timeout = self.timeout.as_secs().max(1);
                Ok(Invocation {
                    program: "sshpass".to_string(),
                    args: vec![
                        "-e".to_string(),
                        "ssh".to_string(),
                        "-o".to_string(),
                        "StrictHostKeyChecking=no".to_string(),
                        "-o".to_string(),
                        format!("ConnectTimeout={}", connect_timeout),
                        format!("{}@{}", user, host),
                        format!("whois {}", domain),
                    ],
                    env: vec![("SSHPASS".to_string(), password.to_string())],
                })
            }
            WhoisSource::Local { program } => Ok(Invocation {
                program: program.to_string_lossy().into_owned(),
                args: vec![domain.to_string()],
                env: Vec::new(),
            }),
        }
    }

    async fn execute(&self, domain: &str, invocation: Invocation) -> WhoisRecord {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let result = tokio::time::timeout(self.timeout, command.output()).await;

        match result {
            Ok(Ok(output)) => {
                interpret_output(domain, output.status.success(), &output.stdout, &output.stderr)
            }
            Ok(Err(e)) => WhoisRecord::failure(
                domain,
                format!("Failed to execute WHOIS command: {}", e),
            ),
            Err(_) => WhoisRecord::failure(
                domain,
                format!(
                    "Failed to execute WHOIS command: timed out after {:?}",
                    self.timeout
                ),
            ),
        }
    }
}

/// Turn captured process output into a record.
fn interpret_output(domain: &str, success: bool, stdout: &[u8], stderr: &[u8]) -> WhoisRecord {
    if !success {
        return WhoisRecord::failure(
            domain,
            format!(
                "Error executing WHOIS command: {}",
                String::from_utf8_lossy(stderr)
            ),
        );
    }

    let text = String::from_utf8_lossy(stdout);
    if text.is_empty() {
        WhoisRecord::reply(domain, "No WHOIS information found.")
    } else {
        WhoisRecord::reply(domain, text.into_owned())
    }
}

#[async_trait]
impl WhoisFetcher for WhoisClient {
    async fn fetch_whois(&self, domain: &str) -> WhoisRecord {
        // The domain ends up inside a remote shell command line.
        if !is_valid_domain(domain) {
            warn!(domain = %domain, "Refusing WHOIS lookup for invalid domain");
            return WhoisRecord::failure(
                domain,
                format!("Error: '{}' is not a valid domain name.", domain),
            );
        }

        let invocation = match self.invocation(domain) {
            Ok(invocation) => invocation,
            Err(message) => {
                warn!(domain = %domain, "WHOIS lookup not configured");
                return WhoisRecord::failure(domain, message);
            }
        };

        let start = Instant::now();
        let record = self.execute(domain, invocation).await;
        let elapsed = start.elapsed();

        if record.transport_error {
            warn!(domain = %domain, ?elapsed, error = %record.text.trim(), "WHOIS lookup failed");
        } else {
            info!(domain = %domain, ?elapsed, bytes = record.text.len(), "WHOIS lookup completed");
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_invocation_keeps_password_off_argv() {
        let client = WhoisClient::remote("203.0.113.7", "root", Some("s3cret".to_string()))
            .with_timeout(Duration::from_secs(15));
        let inv = client.invocation("example.com").unwrap();

        assert_eq!(inv.program, "sshpass");
        assert_eq!(
            inv.args,
            vec![
                "-e",
                "ssh",
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "ConnectTimeout=15",
                "root@203.0.113.7",
                "whois example.com",
            ]
        );
        assert!(!inv.args.iter().any(|a| a.contains("s3cret")));
        assert_eq!(inv.env, vec![("SSHPASS".to_string(), "s3cret".to_string())]);
    }

    #[test]
    fn test_local_invocation() {
        let inv = WhoisClient::local().invocation("example.org").unwrap();
        assert_eq!(inv.program, "whois");
        assert_eq!(inv.args, vec!["example.org"]);
        assert!(inv.env.is_empty());
    }

    #[test]
    fn test_interpret_output() {
        let record = interpret_output("a.com", true, b"Domain Name: A.COM\n", b"");
        assert_eq!(record.text, "Domain Name: A.COM\n");
        assert!(!record.transport_error);

        let record = interpret_output("a.com", true, b"", b"");
        assert_eq!(record.text, "No WHOIS information found.");

        let record = interpret_output("a.com", false, b"partial", b"Permission denied");
        assert_eq!(record.text, "Error executing WHOIS command: Permission denied");
        assert!(record.transport_error);
    }

    #[tokio::test]
    async fn test_missing_password_is_text() {
        let client = WhoisClient::remote("203.0.113.7", "root", None);
        let record = client.fetch_whois("example.com").await;
        assert!(record.transport_error);
        assert!(record.text.starts_with("Error: Server password is not configured."));

        let client = WhoisClient::remote("203.0.113.7", "root", Some(String::new()));
        let record = client.fetch_whois("example.com").await;
        assert!(record.text.contains("password is not configured"));
    }

    #[tokio::test]
    async fn test_invalid_domain_never_spawns() {
        let client = WhoisClient::local_program("/definitely/not/here");
        let record = client.fetch_whois("example.com; reboot").await;
        assert!(record.transport_error);
        assert!(record.text.contains("not a valid domain name"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_text() {
        let client = WhoisClient::local_program("/definitely/not/here/whois");
        let record = client.fetch_whois("example.com").await;
        assert!(record.transport_error);
        assert!(record.text.starts_with("Failed to execute WHOIS command:"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_program_output_is_reply() {
        let client = WhoisClient::local_program("echo");
        let record = client.fetch_whois("example.com").await;
        assert!(!record.transport_error);
        assert_eq!(record.text, "example.com\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_lookup_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-whois");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let client = WhoisClient::local_program(&script).with_timeout(Duration::from_millis(100));
        let start = Instant::now();
        let record = client.fetch_whois("example.com").await;

        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(record.transport_error);
        assert_eq!(
            record.text,
            "Failed to execute WHOIS command: timed out after 100ms"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_returns_stderr() {
        // `sh example.com` fails because the script file does not exist.
        let client = WhoisClient::local_program("sh");
        let record = client.fetch_whois("no-such-script-file.example").await;
        assert!(record.transport_error);
        assert!(record.text.starts_with("Error executing WHOIS command:"));
    }
}
