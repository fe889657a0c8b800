use crate::constants::network;
use crate::errors::{Result, SshError};
use crate::models::CommandResult;
use crate::services::logger::Logger;
use crate::services::session::SessionManager;
use crate::transport::{ExecChannel, Transport, TransportSession, EXIT_STATUS_RUNNING};
use crate::utils::shell;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

enum Chunk {
    Data(usize),
    Pending,
    Eof,
}

fn read_chunk<F>(read: F, buf: &mut [u8], stream: &str) -> Result<Chunk>
where
    F: FnOnce(&mut [u8]) -> io::Result<usize>,
{
    match read(buf) {
        Ok(0) => Ok(Chunk::Eof),
        Ok(n) => Ok(Chunk::Data(n)),
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(Chunk::Pending),
        Err(err) if err.kind() == io::ErrorKind::Interrupted => Ok(Chunk::Pending),
        Err(err) => Err(SshError::wrap(format!("SSH {} read failed", stream), err)),
    }
}

// Runs until the command has exited and both streams are drained.
pub(crate) fn drain_channel<C: ExecChannel + ?Sized>(
    channel: &mut C,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
    poll: Duration,
) -> Result<i32> {
    let mut buf = vec![0u8; network::READ_CHUNK_BYTES];
    let mut stdout_open = true;
    let mut stderr_open = true;
    loop {
        let mut progressed = false;
        if stdout_open {
            match read_chunk(|b| channel.read_stdout(b), &mut buf, "stdout")? {
                Chunk::Data(n) => {
                    stdout.write_all(&buf[..n])?;
                    progressed = true;
                }
                Chunk::Eof => stdout_open = false,
                Chunk::Pending => {}
            }
        }
        if stderr_open {
            match read_chunk(|b| channel.read_stderr(b), &mut buf, "stderr")? {
                Chunk::Data(n) => {
                    stderr.write_all(&buf[..n])?;
                    progressed = true;
                }
                Chunk::Eof => stderr_open = false,
                Chunk::Pending => {}
            }
        }
        if progressed {
            continue;
        }
        let status = channel.exit_status()?;
        if status != EXIT_STATUS_RUNNING {
            stdout.flush()?;
            stderr.flush()?;
            return Ok(status);
        }
        std::thread::sleep(poll);
    }
}

// Disconnects on drop, including while unwinding out of a caller's sink.
pub(crate) struct ChannelGuard<C: ExecChannel> {
    channel: C,
}

impl<C: ExecChannel> ChannelGuard<C> {
    pub(crate) fn new(channel: C) -> Self {
        Self { channel }
    }
}

impl<C: ExecChannel> Deref for ChannelGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.channel
    }
}

impl<C: ExecChannel> DerefMut for ChannelGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.channel
    }
}

impl<C: ExecChannel> Drop for ChannelGuard<C> {
    fn drop(&mut self) {
        self.channel.disconnect();
    }
}

pub struct CommandExecutor<T: Transport> {
    logger: Logger,
    session: Arc<SessionManager<T>>,
    source_files: Vec<String>,
    poll_interval: Duration,
}

impl<T: Transport> CommandExecutor<T> {
    pub fn new(session: Arc<SessionManager<T>>, logger: Logger) -> Self {
        let config = session.config();
        let source_files = config.source_files.clone();
        let poll_interval = config.poll_interval_value();
        Self {
            logger: logger.child("exec"),
            session,
            source_files,
            poll_interval,
        }
    }

    pub fn source_files(&self) -> &[String] {
        &self.source_files
    }

    pub fn execute<S: AsRef<str>>(&self, commands: &[S]) -> Result<CommandResult> {
        self.execute_with_env(commands, &BTreeMap::new())
    }

    pub fn execute_with_env<S: AsRef<str>>(
        &self,
        commands: &[S],
        env: &BTreeMap<String, String>,
    ) -> Result<CommandResult> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let exit_code = self.execute_streaming(commands, &mut stdout, &mut stderr, env)?;
        Ok(CommandResult::new(stdout, stderr, exit_code))
    }

    pub fn execute_streaming<S: AsRef<str>>(
        &self,
        commands: &[S],
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &BTreeMap<String, String>,
    ) -> Result<i32> {
        let commands: Vec<String> = commands.iter().map(|c| c.as_ref().to_string()).collect();
        let script = shell::compose_script(&self.source_files, &commands);
        self.logger.debug(
            "Executing",
            Some(&serde_json::json!({ "commands": commands, "env": env.keys().collect::<Vec<_>>() })),
        );

        let session = self.session.get_live_session()?;
        let mut channel = session
            .open_exec()
            .map(ChannelGuard::new)
            .map_err(|err| SshError::operation(format!("Failed to execute command: {}", err.message)))?;
        let outcome = self.run_on(&mut *channel, &script, stdout, stderr, env);
        drop(channel);

        match &outcome {
            Ok(code) => self.logger.debug(
                "Command finished",
                Some(&serde_json::json!({ "exit_code": code })),
            ),
            Err(err) => self.logger.warn(
                "Command failed",
                Some(&serde_json::json!({ "error": err.message })),
            ),
        }
        outcome
    }

    fn run_on(
        &self,
        channel: &mut <T::Session as TransportSession>::Exec,
        script: &str,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &BTreeMap<String, String>,
    ) -> Result<i32> {
        for (key, value) in env {
            channel.set_env(key, value)?;
        }
        channel.start(script)?;
        drain_channel(channel, stdout, stderr, self.poll_interval)
    }
}
