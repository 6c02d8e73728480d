//! Remote attachment store read over SFTP.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ssh2::{CheckResult, ErrorCode, KnownHostFileKind, Session, Sftp};
use tracing::{debug, info, warn};

use crate::config::SftpConfig;

use super::{AttachmentError, RemoteFileStore};

/// `LIBSSH2_FX_NO_SUCH_FILE`
const FX_NO_SUCH_FILE: i32 = 2;
/// `LIBSSH2_FX_NO_SUCH_PATH`
const FX_NO_SUCH_PATH: i32 = 10;

/// Store reached through one SSH session, opened on first use.
///
/// Transfers share the session and run one at a time on the blocking
/// pool. A transfer that fails on the channel drops the session; the next
/// fetch reconnects.
#[derive(Clone)]
pub struct SftpRemoteStore {
    inner: Arc<SftpInner>,
}

struct SftpInner {
    config: SftpConfig,
    base: PathBuf,
    connection: Mutex<Option<SftpConnection>>,
}

struct SftpConnection {
    _session: Session,
    sftp: Sftp,
}

impl SftpRemoteStore {
    /// `base` is the directory on the SSH host holding `<hash>` files.
    pub fn new(config: SftpConfig, base: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(SftpInner {
                config,
                base: base.into(),
                connection: Mutex::new(None),
            }),
        }
    }
}

#[async_trait]
impl RemoteFileStore for SftpRemoteStore {
    fn remote_path(&self, upload_hash: &str) -> PathBuf {
        self.inner.base.join(upload_hash)
    }

    async fn fetch(&self, upload_hash: &str, destination: &Path) -> Result<u64, AttachmentError> {
        let inner = Arc::clone(&self.inner);
        let remote = self.remote_path(upload_hash);
        let task_remote = remote.clone();
        let dest = destination.to_path_buf();

        tokio::task::spawn_blocking(move || inner.fetch_blocking(&task_remote, &dest))
            .await
            .map_err(|e| AttachmentError::RemoteStore {
                path: remote,
                message: e.to_string(),
            })?
    }
}

impl SftpInner {
    fn fetch_blocking(&self, remote: &Path, destination: &Path) -> Result<u64, AttachmentError> {
        let store_error = |message: String| AttachmentError::RemoteStore {
            path: remote.to_path_buf(),
            message,
        };

        let mut slot = self
            .connection
            .lock()
            .map_err(|_| store_error("SFTP session lock poisoned".to_string()))?;
        let connection = match slot.take() {
            Some(connection) => connection,
            None => self.connect().map_err(store_error)?,
        };

        let result = copy_remote(&connection.sftp, remote, destination);
        match &result {
            Ok(_) | Err(AttachmentError::NotFound { .. } | AttachmentError::WriteFailed { .. }) => {
                *slot = Some(connection);
            }
            Err(e) => {
                warn!(host = %self.config.host, error = %e, "Dropping SFTP session after failed transfer");
            }
        }
        result
    }

    fn connect(&self) -> Result<SftpConnection, String> {
        let config = &self.config;
        let timeout = Duration::from_secs(u64::from(config.timeout_secs));

        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| format!("cannot resolve {}: {}", config.host, e))?
            .next()
            .ok_or_else(|| format!("no address for {}", config.host))?;
        let tcp = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| format!("cannot connect to {}: {}", addr, e))?;

        let mut session = Session::new().map_err(|e| e.to_string())?;
        session.set_timeout(config.timeout_secs.saturating_mul(1000));
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| format!("SSH handshake failed: {}", e))?;

        if let Some(known_hosts) = &config.known_hosts {
            self.check_host_key(&session, known_hosts)?;
        }

        let auth = match (&config.private_key, &config.password) {
            (Some(key), passphrase) => {
                session.userauth_pubkey_file(&config.user, None, key, passphrase.as_deref())
            }
            (None, Some(password)) => session.userauth_password(&config.user, password),
            (None, None) => return Err("no SFTP credential configured".to_string()),
        };
        auth.map_err(|e| format!("SSH authentication failed for {}: {}", config.user, e))?;

        let sftp = session
            .sftp()
            .map_err(|e| format!("cannot open SFTP channel: {}", e))?;
        info!(host = %config.host, port = config.port, "Connected to SFTP store");

        Ok(SftpConnection {
            _session: session,
            sftp,
        })
    }

    fn check_host_key(&self, session: &Session, known_hosts: &Path) -> Result<(), String> {
        let config = &self.config;
        let mut known = session.known_hosts().map_err(|e| e.to_string())?;
        known
            .read_file(known_hosts, KnownHostFileKind::OpenSSH)
            .map_err(|e| format!("cannot read {}: {}", known_hosts.display(), e))?;
        let (key, _) = session
            .host_key()
            .ok_or_else(|| "server sent no host key".to_string())?;

        match known.check_port(&config.host, config.port, key) {
            CheckResult::Match => {
                debug!(host = %config.host, "Host key matches known_hosts");
                Ok(())
            }
            CheckResult::Mismatch => Err(format!("host key for {} does not match", config.host)),
            CheckResult::NotFound => Err(format!("{} is not in known_hosts", config.host)),
            CheckResult::Failure => Err("host key check failed".to_string()),
        }
    }
}

/// Copy one remote file to `destination`, removing partial output on failure.
fn copy_remote(sftp: &Sftp, remote: &Path, destination: &Path) -> Result<u64, AttachmentError> {
    let mut source = sftp.open(remote).map_err(|e| {
        if is_missing_file(e.code()) {
            AttachmentError::NotFound {
                path: remote.to_path_buf(),
            }
        } else {
            AttachmentError::RemoteStore {
                path: remote.to_path_buf(),
                message: e.to_string(),
            }
        }
    })?;

    let file = File::create(destination).map_err(|e| AttachmentError::WriteFailed {
        path: destination.to_path_buf(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);
    let copied = io::copy(&mut source, &mut writer).and_then(|n| writer.flush().map(|_| n));

    copied.map_err(|e| {
        let _ = std::fs::remove_file(destination);
        AttachmentError::copy_failed(remote.to_path_buf(), destination.to_path_buf(), e)
    })
}

fn is_missing_file(code: ErrorCode) -> bool {
    matches!(code, ErrorCode::SFTP(c) if c == FX_NO_SUCH_FILE || c == FX_NO_SUCH_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(port: u16) -> SftpConfig {
        SftpConfig {
            host: "127.0.0.1".to_string(),
            port,
            user: "deploy".to_string(),
            password: Some("secret".to_string()),
            private_key: None,
            known_hosts: None,
            timeout_secs: 2,
        }
    }

    #[test]
    fn test_missing_file_status_codes() {
        assert!(is_missing_file(ErrorCode::SFTP(FX_NO_SUCH_FILE)));
        assert!(is_missing_file(ErrorCode::SFTP(FX_NO_SUCH_PATH)));
        // LIBSSH2_FX_PERMISSION_DENIED
        assert!(!is_missing_file(ErrorCode::SFTP(3)));
        assert!(!is_missing_file(ErrorCode::Session(-2)));
    }

    #[test]
    fn test_remote_path() {
        let store = SftpRemoteStore::new(config(22), "/var/www/supportpal/storage/app/ticket");
        assert_eq!(
            store.remote_path("abc123"),
            PathBuf::from("/var/www/supportpal/storage/app/ticket/abc123")
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_attachment_scoped() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let local = TempDir::new().unwrap();
        let dest = local.path().join("screenshot.png");
        let store = SftpRemoteStore::new(config(port), "/srv/uploads");

        let err = store.fetch("abc123", &dest).await.unwrap_err();

        assert!(matches!(err, AttachmentError::RemoteStore { .. }));
        assert!(!err.is_not_found());
        assert!(!err.is_transient());
        assert!(!dest.exists());
        // Nothing cached, so the next fetch tries to connect again.
        assert!(store.inner.connection.lock().unwrap().is_none());
    }
}
