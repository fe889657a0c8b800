use super::{
    DirEntry, ExecChannel, RemoteReader, RemoteWriter, SftpChannel, Transport, TransportSession,
    WriteMode, EXIT_STATUS_RUNNING,
};
use crate::config::{ClientConfig, Credential};
use crate::errors::{Result, SshError};
use crate::models::RawAttributes;
use crate::services::logger::Logger;
use crate::utils::user_paths::expand_local_home;
use base64::Engine;
use ssh2::{
    CheckResult, ErrorCode, FileStat, KnownHostFileKind, OpenFlags, OpenType, Session, Sftp,
};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

// libssh2 session error codes that mean the socket is gone.
const SOCKET_SEND: i32 = -7;
const SOCKET_DISCONNECT: i32 = -13;
const SOCKET_RECV: i32 = -43;
const BAD_SOCKET: i32 = -45;
// ...and ones that only kill the channel they were raised on.
const CHANNEL_CLOSED: i32 = -26;
const CHANNEL_EOF_SENT: i32 = -27;
const SFTP_PROTOCOL: i32 = -31;

const SFTP_NO_SUCH_FILE: i32 = 2;
const SFTP_NO_SUCH_PATH: i32 = 10;

const NEW_FILE_MODE: i32 = 0o644;

fn is_socket_failure(err: &ssh2::Error) -> bool {
    matches!(
        err.code(),
        ErrorCode::Session(SOCKET_SEND | SOCKET_DISCONNECT | SOCKET_RECV | BAD_SOCKET)
    )
}

fn is_channel_failure(err: &ssh2::Error) -> bool {
    is_socket_failure(err)
        || matches!(
            err.code(),
            ErrorCode::Session(CHANNEL_CLOSED | CHANNEL_EOF_SENT | SFTP_PROTOCOL)
        )
}

fn is_missing_path(err: &ssh2::Error) -> bool {
    matches!(
        err.code(),
        ErrorCode::SFTP(SFTP_NO_SUCH_FILE | SFTP_NO_SUCH_PATH)
    )
}

fn lock_io(io: &Mutex<()>) -> MutexGuard<'_, ()> {
    io.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn fingerprint_host_key_sha256(session: &Session) -> Option<String> {
    let hash = session.host_key_hash(ssh2::HashType::Sha256)?;
    let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(hash);
    Some(format!("SHA256:{}", encoded))
}

fn to_raw_attributes(stat: &FileStat) -> RawAttributes {
    RawAttributes {
        size: stat.size,
        uid: stat.uid,
        gid: stat.gid,
        perm: stat.perm,
        atime: stat.atime,
        mtime: stat.mtime,
    }
}

fn resolve_addresses(config: &ClientConfig) -> Result<Vec<SocketAddr>> {
    let address = config.address();
    let addrs: Vec<SocketAddr> = address
        .to_socket_addrs()
        .map_err(|err| SshError::connection(format!("Failed to resolve {}: {}", address, err)))?
        .collect();
    if addrs.is_empty() {
        return Err(SshError::connection(format!("No address found for {}", address)));
    }
    Ok(addrs)
}

// First address that accepts wins; the error is from the last one tried.
fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> io::Result<(TcpStream, SocketAddr)> {
    let mut last_err = io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses to try");
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok((stream, *addr)),
            Err(err) => last_err = err,
        }
    }
    Err(last_err)
}

#[derive(Debug, Clone)]
pub struct Ssh2Transport {
    logger: Logger,
}

impl Ssh2Transport {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: logger.child("libssh2"),
        }
    }

    fn verify_known_host(&self, session: &Session, config: &ClientConfig) -> Result<()> {
        let (key, _) = session
            .host_key()
            .ok_or_else(|| SshError::connection("Server did not present a host key"))?;
        let mut known = session
            .known_hosts()
            .map_err(|err| SshError::wrap("Failed to load known hosts", err))?;
        let file = expand_local_home("~/.ssh/known_hosts");
        known
            .read_file(&file, KnownHostFileKind::OpenSSH)
            .map_err(|err| {
                SshError::connection(format!(
                    "Cannot read {} while StrictHostKeyChecking=yes: {}",
                    file.display(),
                    err
                ))
            })?;
        match known.check_port(&config.host, config.port, key) {
            CheckResult::Match => Ok(()),
            CheckResult::Mismatch => Err(SshError::connection(format!(
                "Host key for {} does not match known_hosts",
                config.host
            ))
            .with_hint("Remove the stale entry from ~/.ssh/known_hosts if the key changed on purpose.")),
            CheckResult::NotFound => Err(SshError::connection(format!(
                "Host key for {} not found in known_hosts",
                config.host
            ))),
            CheckResult::Failure => Err(SshError::connection(format!(
                "Failed to check host key for {}",
                config.host
            ))),
        }
    }

    fn authenticate(&self, session: &Session, config: &ClientConfig) -> Result<()> {
        let outcome = match &config.credential {
            Credential::Password { password } => {
                session.userauth_password(&config.username, password)
            }
            Credential::PrivateKey {
                key_path,
                passphrase,
            } => session.userauth_pubkey_file(
                &config.username,
                None,
                &expand_local_home(key_path),
                passphrase.as_deref(),
            ),
        };
        outcome.map_err(|err| {
            SshError::authentication(format!(
                "SSH authentication failed for {}@{} ({}): {}",
                config.username,
                config.host,
                config.credential.kind(),
                err
            ))
            .with_source(err)
        })?;
        if !session.authenticated() {
            return Err(SshError::authentication(format!(
                "SSH authentication failed for {}@{}",
                config.username, config.host
            )));
        }
        Ok(())
    }
}

impl Transport for Ssh2Transport {
    type Session = Ssh2Session;

    fn connect(&self, config: &ClientConfig) -> Result<Ssh2Session> {
        let addrs = resolve_addresses(config)?;
        let (tcp, addr) = connect_any(&addrs, config.connect_timeout_value()).map_err(|err| {
            SshError::connection(format!(
                "Failed to connect SSH to {}: {}",
                config.address(),
                err
            ))
            .with_source(err)
        })?;

        let mut session = Session::new()
            .map_err(|err| SshError::connection("Failed to create SSH session").with_source(err))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(config.connect_timeout_ms.min(u32::MAX as u64) as u32);
        session.handshake().map_err(|err| {
            SshError::connection(format!("SSH handshake with {} failed: {}", addr, err))
                .with_source(err)
        })?;

        let fingerprint = fingerprint_host_key_sha256(&session);
        if config.strict_host_key_checking() {
            self.verify_known_host(&session, config)?;
        }
        self.authenticate(&session, config)?;

        if config.keep_alive {
            let interval = std::cmp::max(1, config.keep_alive_interval_value().as_secs() as u32);
            session.set_keepalive(true, interval);
        }
        // Handshake timeout only; long transfers must not trip it.
        session.set_timeout(0);

        self.logger.debug(
            "SSH session established",
            Some(&serde_json::json!({
                "host": config.host,
                "port": config.port,
                "username": config.username,
                "host_key": fingerprint,
            })),
        );
        Ok(Ssh2Session {
            session,
            io: Arc::new(Mutex::new(())),
            alive: Arc::new(AtomicBool::new(true)),
        })
    }
}

// The blocking flag is session wide, so every call into libssh2 goes
// through `io`.
#[derive(Clone)]
pub struct Ssh2Session {
    session: Session,
    io: Arc<Mutex<()>>,
    alive: Arc<AtomicBool>,
}

impl Ssh2Session {
    fn fail(&self, context: &str, err: ssh2::Error) -> SshError {
        if is_socket_failure(&err) {
            self.alive.store(false, Ordering::SeqCst);
        }
        SshError::wrap(context, err)
    }
}

impl TransportSession for Ssh2Session {
    type Exec = Ssh2Exec;
    type Sftp = Ssh2Sftp;

    fn open_exec(&self) -> Result<Ssh2Exec> {
        let channel = {
            let _io = lock_io(&self.io);
            self.session.channel_session()
        }
        .map_err(|err| self.fail("Failed to open exec channel", err))?;
        Ok(Ssh2Exec {
            channel,
            session: self.clone(),
            finished: None,
        })
    }

    fn open_sftp(&self) -> Result<Ssh2Sftp> {
        let sftp = {
            let _io = lock_io(&self.io);
            self.session.sftp()
        }
        .map_err(|err| self.fail("Failed to open SFTP channel", err))?;
        Ok(Ssh2Sftp {
            sftp,
            session: self.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    // libssh2 only sends keepalives from inside other calls, so an idle
    // session is pinged here before it is handed out.
    fn send_keepalive(&self) -> Result<()> {
        let outcome = {
            let _io = lock_io(&self.io);
            self.session.keepalive_send()
        };
        outcome
            .map(|_| ())
            .map_err(|err| self.fail("Keepalive failed", err))
    }

    fn disconnect(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            let _io = lock_io(&self.io);
            let _ = self.session.disconnect(None, "client closing", None);
        }
    }
}

pub struct Ssh2Exec {
    channel: ssh2::Channel,
    session: Ssh2Session,
    finished: Option<i32>,
}

impl Ssh2Exec {
    fn read_nonblocking<F>(&mut self, read: F) -> io::Result<usize>
    where
        F: FnOnce(&mut ssh2::Channel) -> io::Result<usize>,
    {
        let _io = lock_io(&self.session.io);
        self.session.session.set_blocking(false);
        let outcome = read(&mut self.channel);
        self.session.session.set_blocking(true);
        outcome
    }
}

impl ExecChannel for Ssh2Exec {
    fn set_env(&mut self, key: &str, value: &str) -> Result<()> {
        let _io = lock_io(&self.session.io);
        // Servers commonly refuse variables outside AcceptEnv.
        let _ = self.channel.setenv(key, value);
        Ok(())
    }

    fn start(&mut self, command: &str) -> Result<()> {
        let outcome = {
            let _io = lock_io(&self.session.io);
            self.channel.exec(command)
        };
        outcome.map_err(|err| self.session.fail("Failed to start remote command", err))
    }

    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_nonblocking(|channel| channel.read(buf))
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_nonblocking(|channel| channel.stderr().read(buf))
    }

    fn exit_status(&mut self) -> Result<i32> {
        if let Some(code) = self.finished {
            return Ok(code);
        }
        let outcome = {
            let _io = lock_io(&self.session.io);
            if !self.channel.eof() {
                return Ok(EXIT_STATUS_RUNNING);
            }
            self.channel
                .wait_close()
                .and_then(|_| self.channel.exit_status())
        };
        let code = outcome.map_err(|err| self.session.fail("Failed to read exit status", err))?;
        self.finished = Some(code);
        Ok(code)
    }

    fn disconnect(&mut self) {
        let _io = lock_io(&self.session.io);
        let _ = self.channel.close();
    }
}

pub struct Ssh2Sftp {
    sftp: Sftp,
    session: Ssh2Session,
    closed: Arc<AtomicBool>,
}

impl Ssh2Sftp {
    fn call<T, F>(&self, context: &str, path: &str, op: F) -> Result<T>
    where
        F: FnOnce(&Sftp) -> std::result::Result<T, ssh2::Error>,
    {
        let outcome = {
            let _io = lock_io(&self.session.io);
            op(&self.sftp)
        };
        outcome.map_err(|err| self.fail(context, path, err))
    }

    fn fail(&self, context: &str, path: &str, err: ssh2::Error) -> SshError {
        if is_channel_failure(&err) {
            self.closed.store(true, Ordering::SeqCst);
        }
        if is_missing_path(&err) {
            return SshError::file_not_found(path).with_source(err);
        }
        self.session
            .fail(&format!("{} '{}'", context, path), err)
            .with_path(path)
    }
}

impl SftpChannel for Ssh2Sftp {
    fn stat(&mut self, path: &str) -> Result<RawAttributes> {
        self.call("SFTP stat failed for", path, |sftp| sftp.stat(Path::new(path)))
            .map(|stat| to_raw_attributes(&stat))
    }

    fn list(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        let entries = self.call("SFTP list failed for", path, |sftp| {
            sftp.readdir(Path::new(path))
        })?;
        Ok(entries
            .into_iter()
            .map(|(entry_path, stat)| DirEntry {
                name: entry_path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| entry_path.to_string_lossy().to_string()),
                attrs: to_raw_attributes(&stat),
                long_name: None,
            })
            .collect())
    }

    fn get(&mut self, path: &str) -> Result<RemoteReader> {
        let file = self.call("SFTP open failed for", path, |sftp| {
            sftp.open(Path::new(path))
        })?;
        Ok(Box::new(Ssh2File {
            file,
            io: self.session.io.clone(),
        }))
    }

    fn put(&mut self, path: &str, mode: WriteMode) -> Result<RemoteWriter> {
        let flags = match mode {
            WriteMode::Overwrite => OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
            WriteMode::Append => OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::APPEND,
        };
        let file = self.call("SFTP create failed for", path, |sftp| {
            sftp.open_mode(Path::new(path), flags, NEW_FILE_MODE, OpenType::File)
        })?;
        Ok(Box::new(Ssh2File {
            file,
            io: self.session.io.clone(),
        }))
    }

    fn realpath(&mut self, path: &str) -> Result<String> {
        self.call("SFTP realpath failed for", path, |sftp| {
            sftp.realpath(Path::new(path))
        })
        .map(|resolved| resolved.to_string_lossy().to_string())
    }

    fn symlink(&mut self, target: &str, link: &str) -> Result<()> {
        self.call("SFTP symlink failed for", link, |sftp| {
            sftp.symlink(Path::new(target), Path::new(link))
        })
    }

    fn readlink(&mut self, path: &str) -> Result<String> {
        self.call("SFTP readlink failed for", path, |sftp| {
            sftp.readlink(Path::new(path))
        })
        .map(|target| target.to_string_lossy().to_string())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || !self.session.is_alive()
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct Ssh2File {
    file: ssh2::File,
    io: Arc<Mutex<()>>,
}

impl Read for Ssh2File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let _io = lock_io(&self.io);
        self.file.read(buf)
    }
}

impl Write for Ssh2File {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _io = lock_io(&self.io);
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let _io = lock_io(&self.io);
        self.file.flush()
    }
}
