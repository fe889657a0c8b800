use crate::config::ClientConfig;
use crate::constants::commands;
use crate::errors::{Result, SshError, SshErrorKind};
use crate::services::executor::{drain_channel, ChannelGuard};
use crate::services::logger::Logger;
use crate::transport::{ExecChannel, SftpChannel, Transport, TransportSession};
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

pub type SessionOf<T> = <T as Transport>::Session;
pub type SftpOf<T> = <SessionOf<T> as TransportSession>::Sftp;
pub type SftpHandle<T> = Arc<Mutex<SftpOf<T>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    Connected,
}

impl SessionPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SessionPhase::Connecting,
            2 => SessionPhase::Connected,
            _ => SessionPhase::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SessionPhase::Disconnected => 0,
            SessionPhase::Connecting => 1,
            SessionPhase::Connected => 2,
        }
    }
}

enum State<T: Transport> {
    Disconnected,
    Connected {
        session: SessionOf<T>,
        sftp: Option<SftpHandle<T>>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub connects: usize,
    pub sftp_channels_opened: usize,
    pub probes_failed: usize,
}

// Lock order: state, then the SFTP channel.
pub struct SessionManager<T: Transport> {
    logger: Logger,
    config: ClientConfig,
    options: Mutex<BTreeMap<String, String>>,
    transport: T,
    state: Mutex<State<T>>,
    phase: AtomicU8,
    generation: AtomicU64,
    connects: AtomicUsize,
    sftp_opened: AtomicUsize,
    probes_failed: AtomicUsize,
}

fn sftp_is_closed<C: SftpChannel>(handle: &Mutex<C>) -> bool {
    match handle.try_lock() {
        Ok(channel) => channel.is_closed(),
        // Somebody is mid-operation on it, so it was usable a moment ago.
        Err(TryLockError::WouldBlock) => false,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().is_closed(),
    }
}

impl<T: Transport> SessionManager<T> {
    pub fn new(config: ClientConfig, transport: T, logger: Logger) -> Self {
        let options = Mutex::new(config.options.clone());
        Self {
            logger: logger.child("session"),
            config,
            options,
            transport,
            state: Mutex::new(State::Disconnected),
            phase: AtomicU8::new(SessionPhase::Disconnected.as_u8()),
            generation: AtomicU64::new(0),
            connects: AtomicUsize::new(0),
            sftp_opened: AtomicUsize::new(0),
            probes_failed: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Changes a protocol option such as `StrictHostKeyChecking`. The live
    /// session keeps the options it was opened with; the change applies from
    /// the next connect or reconnect.
    pub fn set_option(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.logger.debug(
            "Option changed",
            Some(&serde_json::json!({ "key": key, "value": value })),
        );
        self.lock_options().insert(key, value);
    }

    pub fn get_option(&self, key: &str) -> Option<String> {
        self.lock_options().get(key).cloned()
    }

    pub fn options(&self) -> BTreeMap<String, String> {
        self.lock_options().clone()
    }

    fn lock_options(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.options
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // The configured connection with the current option map applied.
    fn connect_config(&self) -> ClientConfig {
        let mut config = self.config.clone();
        config.options = self.options();
        config
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn is_open(&self) -> bool {
        self.phase() == SessionPhase::Connected
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            connects: self.connects.load(Ordering::SeqCst),
            sftp_channels_opened: self.sftp_opened.load(Ordering::SeqCst),
            probes_failed: self.probes_failed.load(Ordering::SeqCst),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State<T>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.phase.store(phase.as_u8(), Ordering::SeqCst);
    }

    pub fn connect(&self) -> Result<()> {
        let mut state = self.lock_state();
        self.reconnect_locked(&mut state).map(|_| ())
    }

    fn teardown(&self, state: &mut State<T>) {
        if let State::Connected { session, sftp } =
            std::mem::replace(state, State::Disconnected)
        {
            if let Some(handle) = sftp {
                let mut channel = handle.lock().unwrap_or_else(|p| p.into_inner());
                channel.close();
            }
            session.disconnect();
        }
        self.set_phase(SessionPhase::Disconnected);
    }

    fn reconnect_locked(&self, state: &mut State<T>) -> Result<SessionOf<T>> {
        let config = self.connect_config();
        config.validate()?;
        self.teardown(state);
        self.set_phase(SessionPhase::Connecting);

        let attempts = config.reconnect_attempts.max(1);
        let mut last_error: Option<SshError> = None;
        for attempt in 1..=attempts {
            match self.transport.connect(&config) {
                Ok(session) => {
                    self.connects.fetch_add(1, Ordering::SeqCst);
                    self.generation.fetch_add(1, Ordering::SeqCst);
                    *state = State::Connected {
                        session: session.clone(),
                        sftp: None,
                    };
                    self.set_phase(SessionPhase::Connected);
                    self.logger.info(
                        "Connected",
                        Some(&serde_json::json!({
                            "host": self.config.host,
                            "port": self.config.port,
                            "attempt": attempt,
                        })),
                    );
                    return Ok(session);
                }
                Err(err) if err.is_kind(SshErrorKind::Authentication) => {
                    self.set_phase(SessionPhase::Disconnected);
                    self.logger.error(
                        "Authentication rejected",
                        Some(&serde_json::json!({ "host": self.config.host, "error": err.message })),
                    );
                    return Err(err);
                }
                Err(err) => {
                    self.logger.warn(
                        "Connect attempt failed",
                        Some(&serde_json::json!({
                            "host": self.config.host,
                            "attempt": attempt,
                            "max_attempts": attempts,
                            "error": err.message,
                        })),
                    );
                    last_error = Some(err);
                    if attempt < attempts {
                        std::thread::sleep(self.config.backoff_for(attempt));
                    }
                }
            }
        }

        self.set_phase(SessionPhase::Disconnected);
        let cause = last_error
            .map(|err| err.message)
            .unwrap_or_else(|| "no attempt made".to_string());
        Err(SshError::connection(format!(
            "Failed to connect to {} after {} attempt(s): {}",
            self.config.address(),
            attempts,
            cause
        ))
        .with_hint("Check host, port and network reachability."))
    }

    fn probe(&self, session: &SessionOf<T>) -> bool {
        let outcome = if !session.is_alive() {
            Err(SshError::connection("Session transport is down"))
        } else if self.config.keep_alive {
            session.send_keepalive().and_then(|_| self.run_probe(session))
        } else {
            self.run_probe(session)
        };
        match outcome {
            Ok(_) => true,
            Err(err) => {
                self.probes_failed.fetch_add(1, Ordering::SeqCst);
                self.logger.warn(
                    "Liveness probe failed, reconnecting",
                    Some(&serde_json::json!({ "error": err.message })),
                );
                false
            }
        }
    }

    fn run_probe(&self, session: &SessionOf<T>) -> Result<i32> {
        let mut channel = ChannelGuard::new(session.open_exec()?);
        channel.start(commands::PROBE)?;
        drain_channel(
            &mut *channel,
            &mut io::sink(),
            &mut io::sink(),
            self.config.poll_interval_value(),
        )
    }

    fn live_session_locked(&self, state: &mut State<T>) -> Result<SessionOf<T>> {
        let current = match state {
            State::Connected { session, .. } => Some(session.clone()),
            State::Disconnected => None,
        };
        match current {
            Some(session) if self.probe(&session) => Ok(session),
            _ => self.reconnect_locked(state),
        }
    }

    pub fn get_live_session(&self) -> Result<SessionOf<T>> {
        let mut state = self.lock_state();
        self.live_session_locked(&mut state)
    }

    fn open_sftp_on(&self, state: &mut State<T>, session: &SessionOf<T>) -> Result<SftpHandle<T>> {
        let channel = session.open_sftp()?;
        self.sftp_opened.fetch_add(1, Ordering::SeqCst);
        let handle = Arc::new(Mutex::new(channel));
        if let State::Connected { sftp, .. } = state {
            *sftp = Some(handle.clone());
        }
        self.logger.debug("SFTP channel opened", None);
        Ok(handle)
    }

    pub fn get_live_sftp_channel(&self) -> Result<SftpHandle<T>> {
        let mut state = self.lock_state();
        let existing = match &*state {
            State::Connected {
                sftp: Some(handle), ..
            } => Some(handle.clone()),
            _ => None,
        };
        let session = match existing {
            Some(handle) if !sftp_is_closed(&handle) => return Ok(handle),
            Some(_) => {
                self.logger.warn("SFTP channel closed, reconnecting", None);
                self.reconnect_locked(&mut state)?
            }
            None => self.live_session_locked(&mut state)?,
        };
        self.open_sftp_on(&mut state, &session)
    }

    pub fn close(&self) {
        let mut state = self.lock_state();
        let was_connected = matches!(&*state, State::Connected { .. });
        self.teardown(&mut state);
        if was_connected {
            self.logger.info("Disconnected", None);
        }
    }
}

impl<T: Transport> Drop for SessionManager<T> {
    fn drop(&mut self) {
        self.close();
    }
}
