//! Userspace overlay node driven through the daemon and its CLI.
//!
//! # Responsibilities
//! - Spawn the daemon in userspace-networking mode with in-memory state
//! - Authenticate it with the join credential (`up --auth-key=file:`)
//! - Read back the node ID and assigned addresses (`status --json`)
//! - Hand out an HTTP client routed through the node's SOCKS5 proxy
//!
//! # Design Decisions
//! - The daemon is a child with `kill_on_drop`, so an abandoned join cannot
//!   leave a node running
//! - `socks5h` keeps name resolution inside the overlay network
//! - The join secret never appears on a command line; it is handed over in
//!   an owner-only file that is removed once `up` returns

use async_trait::async_trait;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

use crate::config::OverlayConfig;
use crate::credentials::JoinCredential;
use crate::overlay::{JoinedNode, NetworkIdentity, NodeError, OverlayNetwork, OverlayNode};

/// Forces a fresh login even when the state dir holds an old node.
pub const FORCE_LOGIN_ENV: &str = "TSNET_FORCE_LOGIN";

const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(rename = "BackendState")]
    backend_state: String,
    #[serde(rename = "Self")]
    self_status: Option<PeerStatus>,
}

#[derive(Debug, Deserialize)]
struct PeerStatus {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "TailscaleIPs", default)]
    tailscale_ips: Vec<IpAddr>,
}

/// Parse `status --json` output into this node's identity.
pub fn parse_status(raw: &[u8]) -> Result<NetworkIdentity, NodeError> {
    let status: Status = serde_json::from_slice(raw)
        .map_err(|e| NodeError::Status(format!("invalid status JSON: {}", e)))?;

    if status.backend_state != "Running" {
        return Err(NodeError::Status(format!(
            "backend state is {}",
            status.backend_state
        )));
    }

    let own = status
        .self_status
        .ok_or_else(|| NodeError::Status("status has no Self entry".into()))?;
    if own.id.is_empty() {
        return Err(NodeError::Status("node ID is empty".into()));
    }

    Ok(NetworkIdentity::new(own.id, own.tailscale_ips))
}

/// Arguments for `tailscale up`. The secret is referenced by path only.
fn up_args(key_file: &Path, hostname: &str, timeout_secs: u64, force_reauth: bool) -> Vec<String> {
    let mut args = vec![
        format!("--auth-key=file:{}", key_file.display()),
        format!("--hostname={}", hostname),
        format!("--timeout={}s", timeout_secs),
    ];
    if force_reauth {
        args.push("--force-reauth".to_string());
    }
    args
}

/// `OverlayNetwork` backed by a locally spawned daemon.
#[derive(Debug, Clone)]
pub struct TailscaledNetwork {
    config: OverlayConfig,
}

impl TailscaledNetwork {
    pub fn new(config: OverlayConfig) -> Self {
        Self { config }
    }

    fn socket_path(&self) -> PathBuf {
        Path::new(&self.config.state_dir).join("tailscaled.sock")
    }

    fn auth_key_path(&self) -> PathBuf {
        Path::new(&self.config.state_dir).join("auth-key")
    }

    fn socks5_address(&self) -> String {
        format!("127.0.0.1:{}", self.config.socks5_port)
    }

    async fn spawn_daemon(&self) -> Result<Child, NodeError> {
        tokio::fs::create_dir_all(&self.config.state_dir)
            .await
            .map_err(|source| NodeError::StateDir {
                path: self.config.state_dir.clone(),
                source,
            })?;

        tracing::info!(
            binary = %self.config.daemon_binary,
            state_dir = %self.config.state_dir,
            socks5 = %self.socks5_address(),
            "Starting overlay node"
        );

        Command::new(&self.config.daemon_binary)
            .arg("--tun=userspace-networking")
            .arg("--state=mem:")
            .arg(format!("--statedir={}", self.config.state_dir))
            .arg(format!("--socket={}", self.socket_path().display()))
            .arg(format!("--socks5-server={}", self.socks5_address()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| NodeError::Spawn {
                binary: self.config.daemon_binary.clone(),
                source,
            })
    }

    async fn wait_for_socket(&self, daemon: &mut Child) -> Result<(), NodeError> {
        let socket = self.socket_path();
        while !tokio::fs::try_exists(&socket).await.unwrap_or(false) {
            let exited = daemon.try_wait().map_err(|source| NodeError::Spawn {
                binary: self.config.daemon_binary.clone(),
                source,
            })?;
            if let Some(status) = exited {
                return Err(NodeError::Command {
                    command: self.config.daemon_binary.clone(),
                    status: status.to_string(),
                    stderr: "daemon exited before its socket appeared".into(),
                });
            }
            tokio::time::sleep(SOCKET_POLL_INTERVAL).await;
        }
        Ok(())
    }

    /// Write the join secret to an owner-only file for `--auth-key=file:`.
    async fn write_auth_key(&self, secret: &str) -> Result<PathBuf, NodeError> {
        let path = self.auth_key_path();
        let state_dir_error = |source| NodeError::StateDir {
            path: path.display().to_string(),
            source,
        };

        // Mode only applies on create.
        let _ = tokio::fs::remove_file(&path).await;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&path).await.map_err(state_dir_error)?;
        file.write_all(secret.as_bytes()).await.map_err(state_dir_error)?;
        file.flush().await.map_err(state_dir_error)?;
        Ok(path)
    }

    async fn run_cli(&self, command: &str, args: &[String]) -> Result<Vec<u8>, NodeError> {
        let output = Command::new(&self.config.cli_binary)
            .arg(format!("--socket={}", self.socket_path().display()))
            .arg(command)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| NodeError::Spawn {
                binary: self.config.cli_binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(NodeError::Command {
                command: command.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    async fn bring_up(
        &self,
        daemon: &mut Child,
        credential: &JoinCredential,
        hostname: &str,
    ) -> Result<NetworkIdentity, NodeError> {
        self.wait_for_socket(daemon).await?;

        let key_file = self.write_auth_key(&credential.secret).await?;
        let force_reauth = std::env::var(FORCE_LOGIN_ENV).map(|v| v == "1").unwrap_or(true);
        let args = up_args(&key_file, hostname, self.config.join_timeout_secs, force_reauth);

        let up = self.run_cli("up", &args).await;
        let _ = tokio::fs::remove_file(&key_file).await;
        up?;

        let raw = self.run_cli("status", &["--json".to_string()]).await?;
        parse_status(&raw)
    }

    fn transport(&self) -> Result<reqwest::Client, NodeError> {
        let proxy = reqwest::Proxy::all(format!("socks5h://{}", self.socks5_address()))?;
        Ok(reqwest::Client::builder().proxy(proxy).build()?)
    }
}

#[async_trait]
impl OverlayNetwork for TailscaledNetwork {
    async fn join(&self, credential: &JoinCredential, hostname: &str) -> Result<JoinedNode, NodeError> {
        let timeout = self.config.join_timeout();
        let mut daemon = self.spawn_daemon().await?;

        let brought_up = tokio::time::timeout(timeout, self.bring_up(&mut daemon, credential, hostname)).await;
        let identity = match brought_up {
            Ok(Ok(identity)) => identity,
            Ok(Err(e)) => {
                let _ = daemon.kill().await;
                return Err(e);
            }
            Err(_) => {
                let _ = daemon.kill().await;
                return Err(NodeError::Timeout(timeout));
            }
        };

        let transport = match self.transport() {
            Ok(transport) => transport,
            Err(e) => {
                let _ = daemon.kill().await;
                return Err(e);
            }
        };

        tracing::info!(
            hostname = %hostname,
            node_id = %identity.node_id,
            addresses = ?identity.addresses,
            "Joined overlay network"
        );

        Ok(JoinedNode {
            node: Arc::new(TailscaledNode {
                daemon: Mutex::new(Some(daemon)),
            }),
            transport,
            identity,
        })
    }
}

/// Handle on a running daemon.
pub struct TailscaledNode {
    daemon: Mutex<Option<Child>>,
}

#[async_trait]
impl OverlayNode for TailscaledNode {
    async fn close(&self) -> Result<(), NodeError> {
        let daemon = self
            .daemon
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        match daemon {
            Some(mut child) => {
                child.kill().await.map_err(NodeError::Close)?;
                tracing::debug!("Overlay node stopped");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_running_status() {
        let identity = parse_status(
            br#"{"BackendState":"Running","Self":{"ID":"nSELF","HostName":"printworks-abcd1234",
                "TailscaleIPs":["100.64.0.7","fd7a:115c:a1e0::7"]},"Peer":{}}"#,
        )
        .unwrap();

        assert_eq!(identity.node_id, "nSELF");
        assert_eq!(identity.addresses.len(), 2);
    }

    #[test]
    fn test_parse_rejects_non_running() {
        let err = parse_status(br#"{"BackendState":"NeedsLogin","Self":{"ID":"n1"}}"#).unwrap_err();
        assert!(err.to_string().contains("NeedsLogin"));
    }

    #[test]
    fn test_parse_rejects_missing_self() {
        assert!(parse_status(br#"{"BackendState":"Running"}"#).is_err());
        assert!(parse_status(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_join_fails_when_daemon_missing() {
        let network = TailscaledNetwork::new(OverlayConfig {
            daemon_binary: "/nonexistent/tailscaled".into(),
            state_dir: std::env::temp_dir()
                .join(format!("overlay-bridge-test-{}", std::process::id()))
                .display()
                .to_string(),
            ..OverlayConfig::default()
        });
        let credential = JoinCredential {
            secret: "join-secret".into(),
            id: "cred-1".into(),
            expires: None,
            device_tag: "tag:printworks".into(),
            reusable: false,
            ephemeral: true,
        };

        let err = network.join(&credential, "printworks-test").await.unwrap_err();
        assert!(matches!(err, NodeError::Spawn { .. }));
    }

    #[test]
    fn test_up_args_reference_key_file() {
        let args = up_args(Path::new("/tmp/tailscale/auth-key"), "printworks-abcd1234", 10, true);
        assert_eq!(
            args,
            vec![
                "--auth-key=file:/tmp/tailscale/auth-key",
                "--hostname=printworks-abcd1234",
                "--timeout=10s",
                "--force-reauth",
            ]
        );
        assert!(!up_args(Path::new("k"), "h", 10, false).contains(&"--force-reauth".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_auth_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let state_dir = std::env::temp_dir().join(format!("overlay-bridge-key-{}", std::process::id()));
        std::fs::create_dir_all(&state_dir).unwrap();
        let network = TailscaledNetwork::new(OverlayConfig {
            state_dir: state_dir.display().to_string(),
            ..OverlayConfig::default()
        });

        let path = network.write_auth_key("join-secret").await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "join-secret");

        // Rewriting replaces a stale file instead of failing.
        network.write_auth_key("join-secret-2").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "join-secret-2");

        let _ = std::fs::remove_dir_all(&state_dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_daemon_exiting_early_is_command_error() {
        let state_dir = std::env::temp_dir().join(format!("overlay-bridge-exit-{}", std::process::id()));
        let network = TailscaledNetwork::new(OverlayConfig {
            daemon_binary: "false".into(),
            cli_binary: "false".into(),
            state_dir: state_dir.display().to_string(),
            join_timeout_secs: 5,
            ..OverlayConfig::default()
        });
        let credential = JoinCredential {
            secret: "join-secret".into(),
            id: "cred-1".into(),
            expires: None,
            device_tag: "tag:printworks".into(),
            reusable: false,
            ephemeral: true,
        };

        let start = std::time::Instant::now();
        let err = network.join(&credential, "printworks-test").await.unwrap_err();

        assert!(matches!(err, NodeError::Command { .. }), "got {err}");
        assert!(start.elapsed() < Duration::from_secs(2));
        let _ = std::fs::remove_dir_all(&state_dir);
    }

    #[tokio::test]
    async fn test_close_without_daemon_is_noop() {
        let node = TailscaledNode {
            daemon: Mutex::new(None),
        };
        assert!(node.close().await.is_ok());
        assert!(node.close().await.is_ok());
    }
}
