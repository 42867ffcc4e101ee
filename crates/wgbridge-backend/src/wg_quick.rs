//! Backend driving the system `wg-quick` and `wg` tools

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info};
use wgbridge_config::TunnelConfig;
use wgbridge_proto::TunnelState;

use crate::error::BackendError;
use crate::tunnel::{Backend, PeerStatistics, Statistics, Tunnel};

/// Brings tunnels up and down through `wg-quick`, one `{name}.conf` per tunnel
pub struct WgQuickBackend {
    config_dir: PathBuf,
    wg_quick: PathBuf,
    wg: PathBuf,
}

impl WgQuickBackend {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            wg_quick: PathBuf::from("wg-quick"),
            wg: PathBuf::from("wg"),
        }
    }

    /// Use specific `wg-quick` and `wg` executables instead of looking them up on `PATH`
    pub fn with_binaries(mut self, wg_quick: impl Into<PathBuf>, wg: impl Into<PathBuf>) -> Self {
        self.wg_quick = wg_quick.into();
        self.wg = wg.into();
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self, name: &str) -> PathBuf {
        self.config_dir.join(format!("{}.conf", name))
    }

    /// Check that the tools are usable and the config directory exists
    ///
    /// Blocking; meant to run inside the backend factory.
    pub fn probe(&self) -> Result<(), BackendError> {
        std::fs::create_dir_all(&self.config_dir).map_err(|e| {
            BackendError::InitializationFailed(format!(
                "cannot create {}: {}",
                self.config_dir.display(),
                e
            ))
        })?;

        let output = std::process::Command::new(&self.wg)
            .arg("--version")
            .output()
            .map_err(|e| {
                BackendError::InitializationFailed(format!(
                    "cannot run {}: {}",
                    self.wg.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(BackendError::InitializationFailed(format!(
                "{} --version exited with {}",
                self.wg.display(),
                output.status
            )));
        }

        debug!(
            "Using {} ({})",
            self.wg.display(),
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    async fn write_config(&self, name: &str, config: &TunnelConfig) -> Result<PathBuf, BackendError> {
        tokio::fs::create_dir_all(&self.config_dir).await?;
        let path = self.config_path(name);

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&path).await?;
        file.write_all(config.to_wg_quick().as_bytes()).await?;
        file.flush().await?;

        debug!("[{}] Wrote {}", name, path.display());
        Ok(path)
    }

    async fn run(&self, program: &Path, args: &[&str]) -> Result<Output, BackendError> {
        debug!("Running {} {}", program.display(), args.join(" "));
        Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BackendError::CommandFailed(format!("{}: {}", program.display(), e)))
    }

    async fn wg_quick(&self, action: &str, target: &Path) -> Result<(), BackendError> {
        let target = target.to_string_lossy();
        let output = self.run(&self.wg_quick, &[action, &*target]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(BackendError::CommandFailed(stderr_message(&output)))
        }
    }
}

#[async_trait]
impl Backend for WgQuickBackend {
    async fn running_tunnel_names(&self) -> Result<Vec<String>, BackendError> {
        let output = self.run(&self.wg, &["show", "interfaces"]).await?;
        if !output.status.success() {
            return Err(BackendError::CommandFailed(stderr_message(&output)));
        }

        let mut names: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn get_state(&self, name: &str) -> Result<TunnelState, BackendError> {
        let running = self.running_tunnel_names().await?;
        Ok(if running.iter().any(|n| n == name) {
            TunnelState::Up
        } else {
            TunnelState::Down
        })
    }

    async fn set_state(
        &self,
        tunnel: Arc<dyn Tunnel>,
        state: TunnelState,
        config: Option<TunnelConfig>,
    ) -> Result<TunnelState, BackendError> {
        let name = tunnel.name().to_string();

        let target = match state {
            TunnelState::Toggle => match self.get_state(&name).await? {
                TunnelState::Up => TunnelState::Down,
                _ => TunnelState::Up,
            },
            other => other,
        };

        match target {
            TunnelState::Up => {
                let path = match config {
                    Some(config) => self.write_config(&name, &config).await?,
                    None => {
                        let path = self.config_path(&name);
                        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                            return Err(BackendError::MissingConfig);
                        }
                        path
                    }
                };

                self.wg_quick("up", &path).await.map_err(|e| {
                    error!("[{}] wg-quick up failed: {}", name, e);
                    match e {
                        BackendError::CommandFailed(msg) => BackendError::StartFailed(msg),
                        other => other,
                    }
                })?;
                info!("[{}] Interface up", name);
            }
            _ => {
                let path = self.config_path(&name);
                let target_path = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    path
                } else {
                    PathBuf::from(&name)
                };

                self.wg_quick("down", &target_path).await.map_err(|e| {
                    error!("[{}] wg-quick down failed: {}", name, e);
                    e
                })?;
                info!("[{}] Interface down", name);
            }
        }

        // wg-quick returns only after the interface changed, so confirm right away
        tunnel.on_state_change(target);
        Ok(target)
    }

    async fn get_statistics(&self, name: &str) -> Result<Statistics, BackendError> {
        let output = self.run(&self.wg, &["show", name, "transfer"]).await?;
        if !output.status.success() {
            return Err(BackendError::UnknownTunnel(name.to_string()));
        }
        parse_transfer(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse the output of `wg show <interface> transfer`
///
/// Each line is `<public key>\t<received bytes>\t<sent bytes>`.
pub fn parse_transfer(text: &str) -> Result<Statistics, BackendError> {
    let mut peers = Vec::new();

    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [public_key, rx, tx] = fields.as_slice() else {
            return Err(BackendError::CommandFailed(format!(
                "unexpected transfer line: {}",
                line
            )));
        };

        let parse = |value: &str| {
            value.parse::<u64>().map_err(|_| {
                BackendError::CommandFailed(format!("invalid byte count: {}", value))
            })
        };

        peers.push(PeerStatistics {
            public_key: public_key.to_string(),
            rx_bytes: parse(*rx)?,
            tx_bytes: parse(*tx)?,
        });
    }

    Ok(Statistics { peers })
}

fn stderr_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = stderr.trim();
    if message.is_empty() {
        format!("exited with {}", output.status)
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transfer() {
        let text = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=\t1024\t2048\n\
                    TrMvSoP4jYQlY6RIzBgbssQqY3vxI2Pi+y71lOWWXX0=\t1\t2\n";
        let stats = parse_transfer(text).unwrap();
        assert_eq!(stats.peers.len(), 2);
        assert_eq!(stats.total_rx(), 1025);
        assert_eq!(stats.total_tx(), 2050);
        assert_eq!(
            stats.peers[1].public_key,
            "TrMvSoP4jYQlY6RIzBgbssQqY3vxI2Pi+y71lOWWXX0="
        );
    }

    #[test]
    fn test_parse_transfer_empty() {
        assert_eq!(parse_transfer("").unwrap(), Statistics::default());
    }

    #[test]
    fn test_parse_transfer_garbage() {
        assert!(parse_transfer("key\tnot-a-number\t3\n").is_err());
        assert!(parse_transfer("only-one-field\n").is_err());
    }

    #[test]
    fn test_config_path() {
        let backend = WgQuickBackend::new("/run/wgbridge");
        assert_eq!(
            backend.config_path("wg0"),
            PathBuf::from("/run/wgbridge/wg0.conf")
        );
    }

    #[test]
    fn test_probe_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let backend = WgQuickBackend::new(dir.path().join("conf"))
            .with_binaries("/nonexistent/wg-quick", "/nonexistent/wg");
        assert!(matches!(
            backend.probe(),
            Err(BackendError::InitializationFailed(_))
        ));
        assert!(dir.path().join("conf").is_dir());
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tokio::sync::mpsc;

        const CONFIG: &str = "[Interface]\n\
            PrivateKey = yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=\n\
            Address = 10.0.0.2/32\n\
            [Peer]\n\
            PublicKey = xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=\n\
            AllowedIPs = 0.0.0.0/0\n";

        struct Recorder {
            tx: mpsc::UnboundedSender<TunnelState>,
        }

        impl Tunnel for Recorder {
            fn name(&self) -> &str {
                "wg0"
            }

            fn on_state_change(&self, new_state: TunnelState) {
                let _ = self.tx.send(new_state);
            }
        }

        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_up_writes_private_config_and_confirms() {
            let dir = tempfile::tempdir().unwrap();
            let log = dir.path().join("calls.log");
            let wg_quick = script(
                dir.path(),
                "wg-quick",
                &format!("echo \"$1 $2\" >> {}", log.display()),
            );
            let wg = script(
                dir.path(),
                "wg",
                "if [ \"$2\" = interfaces ]; then echo wg0; else printf 'k\\t10\\t20\\n'; fi",
            );

            let conf_dir = dir.path().join("conf");
            let backend = WgQuickBackend::new(&conf_dir).with_binaries(&wg_quick, &wg);
            let (tx, mut rx) = mpsc::unbounded_channel();
            let tunnel: Arc<dyn Tunnel> = Arc::new(Recorder { tx });

            let config = TunnelConfig::parse(CONFIG).unwrap();
            let target = backend
                .set_state(tunnel.clone(), TunnelState::Up, Some(config.clone()))
                .await
                .unwrap();
            assert_eq!(target, TunnelState::Up);
            assert_eq!(rx.recv().await, Some(TunnelState::Up));

            let path = conf_dir.join("wg0.conf");
            let written = std::fs::read_to_string(&path).unwrap();
            assert_eq!(TunnelConfig::parse(&written).unwrap(), config);
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);

            assert_eq!(backend.get_state("wg0").await.unwrap(), TunnelState::Up);
            let stats = backend.get_statistics("wg0").await.unwrap();
            assert_eq!((stats.total_rx(), stats.total_tx()), (10, 20));

            backend
                .set_state(tunnel, TunnelState::Down, None)
                .await
                .unwrap();
            assert_eq!(rx.recv().await, Some(TunnelState::Down));

            let calls = std::fs::read_to_string(&log).unwrap();
            let expected = format!("up {0}\ndown {0}\n", path.display());
            assert_eq!(calls, expected);
        }

        #[tokio::test]
        async fn test_failed_up_reports_start_failure() {
            let dir = tempfile::tempdir().unwrap();
            let wg_quick = script(dir.path(), "wg-quick", "echo 'RTNETLINK: denied' >&2; exit 1");
            let wg = script(dir.path(), "wg", "exit 1");

            let backend =
                WgQuickBackend::new(dir.path().join("conf")).with_binaries(&wg_quick, &wg);
            let (tx, mut rx) = mpsc::unbounded_channel();
            let tunnel: Arc<dyn Tunnel> = Arc::new(Recorder { tx });

            let err = backend
                .set_state(
                    tunnel,
                    TunnelState::Up,
                    Some(TunnelConfig::parse(CONFIG).unwrap()),
                )
                .await
                .unwrap_err();
            assert_eq!(err, BackendError::StartFailed("RTNETLINK: denied".to_string()));
            assert!(rx.try_recv().is_err());

            assert_eq!(
                backend.get_statistics("wg0").await,
                Err(BackendError::UnknownTunnel("wg0".to_string()))
            );
        }
    }
}
