#![allow(dead_code)]

use once_cell::sync::Lazy;
use remotefs::config::ClientConfig;
use remotefs::constants::mode::{S_IFDIR, S_IFLNK, S_IFREG};
use remotefs::errors::{Result, SshError};
use remotefs::models::RawAttributes;
use remotefs::services::logger::{LogLevel, Logger};
use remotefs::transport::{
    DirEntry, ExecChannel, RemoteReader, RemoteWriter, SftpChannel, Transport, TransportSession,
    WriteMode,
};
use remotefs::SshClient;
use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Cursor, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

pub static ENV_LOCK: Lazy<AsyncMutex<()>> = Lazy::new(|| AsyncMutex::new(()));

pub const HOME: &str = "/home/tester";
const MTIME: u64 = 1_700_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    File {
        data: Vec<u8>,
        mode: u32,
        uid: u32,
        gid: u32,
    },
    Dir {
        mode: u32,
        uid: u32,
        gid: u32,
    },
    Symlink {
        target: String,
    },
}

impl Node {
    fn dir() -> Self {
        Node::Dir {
            mode: 0o755,
            uid: 1000,
            gid: 1000,
        }
    }

    fn file(data: Vec<u8>) -> Self {
        Node::File {
            data,
            mode: 0o644,
            uid: 1000,
            gid: 1000,
        }
    }

    fn attrs(&self) -> RawAttributes {
        let (perm, size, uid, gid) = match self {
            Node::File {
                data,
                mode,
                uid,
                gid,
            } => (S_IFREG | mode, data.len() as u64, *uid, *gid),
            Node::Dir { mode, uid, gid } => (S_IFDIR | mode, 4096, *uid, *gid),
            Node::Symlink { target } => (S_IFLNK | 0o777, target.len() as u64, 0, 0),
        };
        RawAttributes {
            size: Some(size),
            uid: Some(uid),
            gid: Some(gid),
            perm: Some(perm),
            atime: Some(MTIME),
            mtime: Some(MTIME),
        }
    }
}

#[derive(Default)]
pub struct RemoteState {
    pub nodes: BTreeMap<String, Node>,
    pub users: BTreeMap<u32, String>,
    pub groups: BTreeMap<u32, String>,
    pub scripts: Vec<String>,
    pub env: Vec<(String, String)>,
    pub connect_attempts: usize,
    pub connects: usize,
    pub exec_opened: usize,
    pub exec_closed: usize,
    pub sftp_opened: usize,
    pub fail_connects: usize,
    pub reject_auth: bool,
    pub long_names: bool,
    pub fail_exec_starts: usize,
    pub fail_exec_reads: usize,
    pub keepalives: usize,
    pub fail_keepalives: usize,
    pub host_key_known: bool,
    pub connect_options: Vec<BTreeMap<String, String>>,
    forced_stderr: Vec<(String, String)>,
    session_alive: Option<Arc<AtomicBool>>,
    sftp_flags: Vec<Arc<AtomicBool>>,
}

/// In-memory remote host: a tiny file tree, a shell that understands the
/// handful of commands the client issues, and counters for assertions.
#[derive(Clone)]
pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

pub fn normalize(path: &str) -> String {
    let absolute = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", HOME, path)
    };
    let mut parts: Vec<&str> = Vec::new();
    for part in absolute.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn is_under(path: &str, root: &str) -> bool {
    path == root || path.starts_with(&format!("{}/", root))
}

fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if quoted {
            if c == '\'' {
                quoted = false;
            } else {
                current.push(c);
            }
            continue;
        }
        match c {
            '\'' => {
                quoted = true;
                in_token = true;
            }
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    in_token = true;
                }
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

struct Output {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    code: i32,
}

impl Output {
    fn ok() -> Self {
        Output {
            stdout: Vec::new(),
            stderr: Vec::new(),
            code: 0,
        }
    }

    fn err(code: i32, message: String) -> Self {
        Output {
            stdout: Vec::new(),
            stderr: format!("{}\n", message).into_bytes(),
            code,
        }
    }
}

impl RemoteState {
    fn follow(&self, path: &str) -> Option<String> {
        let mut current = normalize(path);
        for _ in 0..8 {
            match self.nodes.get(&current)? {
                Node::Symlink { target } => {
                    current = if target.starts_with('/') {
                        normalize(target)
                    } else {
                        normalize(&format!("{}/{}", parent_of(&current), target))
                    };
                }
                _ => return Some(current),
            }
        }
        None
    }

    fn is_dir(&self, path: &str) -> bool {
        matches!(self.nodes.get(path), Some(Node::Dir { .. }))
    }

    fn subtree(&self, root: &str) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|key| is_under(key, root))
            .cloned()
            .collect()
    }

    fn mkdir(&mut self, path: &str, parents: bool) -> Output {
        let path = normalize(path);
        if parents {
            let mut current = String::new();
            for part in path.split('/').filter(|p| !p.is_empty()) {
                current = format!("{}/{}", current, part);
                match self.nodes.get(&current) {
                    Some(Node::Dir { .. }) => {}
                    Some(_) => {
                        return Output::err(
                            1,
                            format!("mkdir: cannot create directory '{}': Not a directory", path),
                        )
                    }
                    None => {
                        self.nodes.insert(current.clone(), Node::dir());
                    }
                }
            }
            return Output::ok();
        }
        if self.nodes.contains_key(&path) {
            return Output::err(
                1,
                format!("mkdir: cannot create directory '{}': File exists", path),
            );
        }
        if !self.is_dir(&parent_of(&path)) {
            return Output::err(
                1,
                format!(
                    "mkdir: cannot create directory '{}': No such file or directory",
                    path
                ),
            );
        }
        self.nodes.insert(path, Node::dir());
        Output::ok()
    }

    fn rm(&mut self, flag: &str, path: &str) -> Output {
        let path = normalize(path);
        let recursive = flag.contains('r');
        match self.nodes.get(&path) {
            None => Output::ok(),
            Some(Node::Dir { .. }) if !recursive => Output::err(
                1,
                format!("rm: cannot remove '{}': Is a directory", path),
            ),
            Some(_) => {
                for key in self.subtree(&path) {
                    self.nodes.remove(&key);
                }
                Output::ok()
            }
        }
    }

    fn mv(&mut self, src: &str, dst: &str) -> Output {
        let src = normalize(src);
        let mut dst = normalize(dst);
        if !self.nodes.contains_key(&src) {
            return Output::err(
                1,
                format!("mv: cannot stat '{}': No such file or directory", src),
            );
        }
        if self.is_dir(&dst) {
            let name = src.rsplit('/').next().unwrap_or_default().to_string();
            dst = format!("{}/{}", dst, name);
        }
        for key in self.subtree(&src) {
            if let Some(node) = self.nodes.remove(&key) {
                let moved = format!("{}{}", dst, &key[src.len()..]);
                self.nodes.insert(moved, node);
            }
        }
        Output::ok()
    }

    fn targets(&self, recursive: bool, path: &str) -> Option<Vec<String>> {
        let path = self.follow(path)?;
        if recursive {
            Some(self.subtree(&path))
        } else {
            Some(vec![path])
        }
    }

    fn chown_like(&mut self, program: &str, args: &[String]) -> Output {
        let recursive = args.first().map(|a| a == "-R").unwrap_or(false);
        let args = if recursive { &args[1..] } else { args };
        if args.len() != 2 {
            return Output::err(1, format!("{}: missing operand", program));
        }
        let (value, path) = (&args[0], &args[1]);
        let Some(targets) = self.targets(recursive, path) else {
            return Output::err(
                1,
                format!("{}: cannot access '{}': No such file or directory", program, path),
            );
        };
        match program {
            "chmod" => {
                let Ok(bits) = u32::from_str_radix(value, 8) else {
                    return Output::err(1, format!("chmod: invalid mode: '{}'", value));
                };
                for key in targets {
                    match self.nodes.get_mut(&key) {
                        Some(Node::File { mode, .. }) | Some(Node::Dir { mode, .. }) => {
                            *mode = bits
                        }
                        _ => {}
                    }
                }
            }
            "chown" => {
                let Some(id) = self.users.iter().find(|(_, n)| *n == value).map(|(id, _)| *id)
                else {
                    return Output::err(1, format!("chown: invalid user: '{}'", value));
                };
                for key in targets {
                    match self.nodes.get_mut(&key) {
                        Some(Node::File { uid, .. }) | Some(Node::Dir { uid, .. }) => *uid = id,
                        _ => {}
                    }
                }
            }
            _ => {
                let Some(id) = self.groups.iter().find(|(_, n)| *n == value).map(|(id, _)| *id)
                else {
                    return Output::err(1, format!("chgrp: invalid group: '{}'", value));
                };
                for key in targets {
                    match self.nodes.get_mut(&key) {
                        Some(Node::File { gid, .. }) | Some(Node::Dir { gid, .. }) => *gid = id,
                        _ => {}
                    }
                }
            }
        }
        Output::ok()
    }

    fn getent(&self, database: &str, key: &str) -> Output {
        let id: Option<u32> = key.parse().ok();
        let table = if database == "passwd" {
            &self.users
        } else {
            &self.groups
        };
        match id.and_then(|id| table.get(&id).map(|name| (id, name))) {
            Some((id, name)) => Output {
                stdout: format!("{}:x:{}:{}::/:/bin/sh\n", name, id, id).into_bytes(),
                stderr: Vec::new(),
                code: 0,
            },
            None => Output {
                stdout: Vec::new(),
                stderr: Vec::new(),
                code: 2,
            },
        }
    }

    fn run_line(&mut self, line: &str) -> Output {
        if let Some((_, stderr)) = self
            .forced_stderr
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
        {
            return Output::err(1, stderr.clone());
        }
        let tokens = tokenize(line);
        let Some((program, args)) = tokens.split_first() else {
            return Output::ok();
        };
        match (program.as_str(), args) {
            ("true", _) | ("source", _) => Output::ok(),
            ("echo", rest) => Output {
                stdout: format!("{}\n", rest.join(" ")).into_bytes(),
                stderr: Vec::new(),
                code: 0,
            },
            ("warn", rest) => Output {
                stdout: Vec::new(),
                stderr: format!("{}\n", rest.join(" ")).into_bytes(),
                code: 0,
            },
            ("exit", [code]) => Output {
                stdout: Vec::new(),
                stderr: Vec::new(),
                code: code.parse().unwrap_or(1),
            },
            ("getent", [database, key]) => self.getent(database, key),
            ("mkdir", [flag, path]) if flag == "-p" => self.mkdir(path, true),
            ("mkdir", [path]) => self.mkdir(path, false),
            ("rm", [flag, path]) => self.rm(flag, path),
            ("mv", [src, dst]) => self.mv(src, dst),
            ("chmod", rest) | ("chown", rest) | ("chgrp", rest) => self.chown_like(program, rest),
            (other, _) => Output::err(127, format!("sh: 1: {}: not found", other)),
        }
    }

    fn run_script(&mut self, script: &str) -> Output {
        self.scripts.push(script.to_string());
        let mut total = Output::ok();
        for line in script.lines() {
            let out = self.run_line(line);
            total.stdout.extend(out.stdout);
            total.stderr.extend(out.stderr);
            total.code = out.code;
        }
        total
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        let mut state = RemoteState::default();
        for dir in ["/", "/home", HOME, "/tmp"] {
            state.nodes.insert(dir.to_string(), Node::dir());
        }
        state.users.insert(0, "root".to_string());
        state.users.insert(1000, "tester".to_string());
        state.groups.insert(0, "root".to_string());
        state.groups.insert(1000, "staff".to_string());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn transport(&self) -> FakeTransport {
        FakeTransport {
            remote: self.clone(),
        }
    }

    pub fn add_dir(&self, path: &str) {
        self.state().mkdir(path, true);
    }

    pub fn add_file(&self, path: &str, content: &[u8]) {
        let path = normalize(path);
        let mut state = self.state();
        state.mkdir(&parent_of(&path), true);
        state.nodes.insert(path, Node::file(content.to_vec()));
    }

    pub fn add_symlink(&self, path: &str, target: &str) {
        self.state().nodes.insert(
            normalize(path),
            Node::Symlink {
                target: target.to_string(),
            },
        );
    }

    pub fn node(&self, path: &str) -> Option<Node> {
        self.state().nodes.get(&normalize(path)).cloned()
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.node(path)? {
            Node::File { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.node(path), Some(Node::Dir { .. }))
    }

    /// Kills the current session as a dropped TCP connection would.
    pub fn kill_session(&self) {
        let state = self.state();
        if let Some(alive) = &state.session_alive {
            alive.store(false, Ordering::SeqCst);
        }
    }

    /// Closes every open SFTP channel while leaving the session up.
    pub fn close_sftp_channels(&self) {
        for flag in &self.state().sftp_flags {
            flag.store(true, Ordering::SeqCst);
        }
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.state().fail_connects = count;
    }

    pub fn fail_next_exec_starts(&self, count: usize) {
        self.state().fail_exec_starts = count;
    }

    pub fn fail_next_exec_reads(&self, count: usize) {
        self.state().fail_exec_reads = count;
    }

    pub fn fail_next_keepalives(&self, count: usize) {
        self.state().fail_keepalives = count;
    }

    pub fn force_stderr(&self, prefix: &str, stderr: &str) {
        self.state()
            .forced_stderr
            .push((prefix.to_string(), stderr.to_string()));
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state().scripts.clone()
    }

    /// Script lines, across every executed script, that start with `prefix`.
    pub fn lines_starting_with(&self, prefix: &str) -> Vec<String> {
        self.state()
            .scripts
            .iter()
            .flat_map(|script| script.lines().map(str::to_string).collect::<Vec<_>>())
            .filter(|line| line.starts_with(prefix))
            .collect()
    }
}

#[derive(Clone)]
pub struct FakeTransport {
    remote: FakeRemote,
}

impl Transport for FakeTransport {
    type Session = FakeSession;

    fn connect(&self, config: &ClientConfig) -> Result<FakeSession> {
        let mut state = self.remote.state();
        state.connect_attempts += 1;
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(SshError::connection("Connection refused"));
        }
        if config.strict_host_key_checking() && !state.host_key_known {
            return Err(SshError::connection(format!(
                "Host key for {} not found in known_hosts",
                config.host
            )));
        }
        if state.reject_auth {
            return Err(SshError::authentication("Permission denied (password)"));
        }
        state.connects += 1;
        state.connect_options.push(config.options.clone());
        let alive = Arc::new(AtomicBool::new(true));
        state.session_alive = Some(alive.clone());
        Ok(FakeSession {
            remote: self.remote.clone(),
            alive,
        })
    }
}

#[derive(Clone)]
pub struct FakeSession {
    remote: FakeRemote,
    alive: Arc<AtomicBool>,
}

impl std::fmt::Debug for FakeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeSession").field("alive", &self.alive).finish_non_exhaustive()
    }
}

impl TransportSession for FakeSession {
    type Exec = FakeExec;
    type Sftp = FakeSftp;

    fn open_exec(&self) -> Result<FakeExec> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(SshError::operation("Failed to open exec channel: session is down"));
        }
        self.remote.state().exec_opened += 1;
        Ok(FakeExec {
            remote: self.remote.clone(),
            stdout: VecDeque::new(),
            stderr: VecDeque::new(),
            status: None,
        })
    }

    fn open_sftp(&self) -> Result<FakeSftp> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(SshError::operation("Failed to open SFTP channel: session is down"));
        }
        let closed = Arc::new(AtomicBool::new(false));
        let mut state = self.remote.state();
        state.sftp_opened += 1;
        state.sftp_flags.push(closed.clone());
        Ok(FakeSftp {
            remote: self.remote.clone(),
            closed,
            alive: self.alive.clone(),
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn send_keepalive(&self) -> Result<()> {
        let mut state = self.remote.state();
        state.keepalives += 1;
        if state.fail_keepalives > 0 {
            state.fail_keepalives -= 1;
            self.alive.store(false, Ordering::SeqCst);
            return Err(SshError::connection("Keepalive failed: connection reset"));
        }
        Ok(())
    }

    fn disconnect(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

pub struct FakeExec {
    remote: FakeRemote,
    stdout: VecDeque<u8>,
    stderr: VecDeque<u8>,
    status: Option<i32>,
}

fn drain_into(queue: &mut VecDeque<u8>, buf: &mut [u8]) -> usize {
    let n = queue.len().min(buf.len());
    for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
        *slot = byte;
    }
    n
}

impl ExecChannel for FakeExec {
    fn set_env(&mut self, key: &str, value: &str) -> Result<()> {
        self.remote
            .state()
            .env
            .push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn start(&mut self, command: &str) -> Result<()> {
        let mut state = self.remote.state();
        if state.fail_exec_starts > 0 {
            state.fail_exec_starts -= 1;
            return Err(SshError::operation("Failed to start remote command: channel refused"));
        }
        let out = state.run_script(command);
        drop(state);
        self.stdout.extend(out.stdout);
        self.stderr.extend(out.stderr);
        self.status = Some(out.code);
        Ok(())
    }

    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.status.is_none() {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "not started"));
        }
        {
            let mut state = self.remote.state();
            if state.fail_exec_reads > 0 {
                state.fail_exec_reads -= 1;
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "channel reset"));
            }
        }
        Ok(drain_into(&mut self.stdout, buf))
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.status.is_none() {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "not started"));
        }
        Ok(drain_into(&mut self.stderr, buf))
    }

    fn exit_status(&mut self) -> Result<i32> {
        self.status
            .ok_or_else(|| SshError::operation("exit status requested before start"))
    }

    fn disconnect(&mut self) {
        self.remote.state().exec_closed += 1;
    }
}

pub struct FakeSftp {
    remote: FakeRemote,
    closed: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
}

impl FakeSftp {
    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SshError::operation("SFTP channel is closed"));
        }
        Ok(())
    }
}

struct FakeWriter {
    remote: FakeRemote,
    path: String,
}

impl Write for FakeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.remote.state();
        match state.nodes.get_mut(&self.path) {
            Some(Node::File { data, .. }) => {
                data.extend_from_slice(buf);
                Ok(buf.len())
            }
            _ => Err(io::Error::new(io::ErrorKind::NotFound, "file vanished")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SftpChannel for FakeSftp {
    fn stat(&mut self, path: &str) -> Result<RawAttributes> {
        self.ensure_open()?;
        let state = self.remote.state();
        state
            .follow(path)
            .and_then(|resolved| state.nodes.get(&resolved))
            .map(Node::attrs)
            .ok_or_else(|| SshError::file_not_found(path))
    }

    fn list(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        self.ensure_open()?;
        let state = self.remote.state();
        let dir = state
            .follow(path)
            .filter(|resolved| state.is_dir(resolved))
            .ok_or_else(|| SshError::file_not_found(path))?;
        let mut entries = Vec::new();
        for name in [".", ".."] {
            entries.push(DirEntry {
                name: name.to_string(),
                attrs: Node::dir().attrs(),
                long_name: None,
            });
        }
        for (key, node) in &state.nodes {
            if key == &dir || parent_of(key) != dir {
                continue;
            }
            let name = key.rsplit('/').next().unwrap_or_default().to_string();
            let attrs = node.attrs();
            let long_name = state.long_names.then(|| {
                format!(
                    "-rw-r--r--    1 ls-owner   ls-group   {} Jan  1 00:00 {}",
                    attrs.size.unwrap_or(0),
                    name
                )
            });
            entries.push(DirEntry {
                name,
                attrs,
                long_name,
            });
        }
        Ok(entries)
    }

    fn get(&mut self, path: &str) -> Result<RemoteReader> {
        self.ensure_open()?;
        let state = self.remote.state();
        match state.follow(path).and_then(|p| state.nodes.get(&p)) {
            Some(Node::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(_) => Err(SshError::operation(format!("SFTP open failed for '{}'", path))),
            None => Err(SshError::file_not_found(path)),
        }
    }

    fn put(&mut self, path: &str, mode: WriteMode) -> Result<RemoteWriter> {
        self.ensure_open()?;
        let resolved = normalize(path);
        let mut state = self.remote.state();
        if !state.is_dir(&parent_of(&resolved)) {
            return Err(SshError::file_not_found(path));
        }
        match state.nodes.get_mut(&resolved) {
            Some(Node::File { data, .. }) => {
                if mode == WriteMode::Overwrite {
                    data.clear();
                }
            }
            Some(_) => {
                return Err(SshError::operation(format!(
                    "SFTP create failed for '{}'",
                    path
                )))
            }
            None => {
                state.nodes.insert(resolved.clone(), Node::file(Vec::new()));
            }
        }
        Ok(Box::new(FakeWriter {
            remote: self.remote.clone(),
            path: resolved,
        }))
    }

    fn realpath(&mut self, path: &str) -> Result<String> {
        self.ensure_open()?;
        self.remote
            .state()
            .follow(path)
            .ok_or_else(|| SshError::file_not_found(path))
    }

    fn symlink(&mut self, target: &str, link: &str) -> Result<()> {
        self.ensure_open()?;
        let resolved = normalize(link);
        let mut state = self.remote.state();
        if state.nodes.contains_key(&resolved) || !state.is_dir(&parent_of(&resolved)) {
            return Err(SshError::operation(format!("SFTP symlink failed for '{}'", link)));
        }
        state.nodes.insert(
            resolved,
            Node::Symlink {
                target: target.to_string(),
            },
        );
        Ok(())
    }

    fn readlink(&mut self, path: &str) -> Result<String> {
        self.ensure_open()?;
        match self.remote.state().nodes.get(&normalize(path)) {
            Some(Node::Symlink { target }) => Ok(target.clone()),
            _ => Err(SshError::operation(format!("SFTP readlink failed for '{}'", path))),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || !self.alive.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig::with_password("tester", "fake.host", "secret")
        .poll_interval(Duration::from_millis(1))
        .reconnect_backoff(Duration::from_millis(1))
        .reconnect_attempts(3)
}

pub fn quiet_logger() -> Logger {
    Logger::with_level("test", LogLevel::Off)
}

pub fn client_with(remote: &FakeRemote, config: ClientConfig) -> SshClient<FakeTransport> {
    SshClient::with_transport(config, remote.transport(), quiet_logger()).expect("client")
}

pub fn client(remote: &FakeRemote) -> SshClient<FakeTransport> {
    client_with(remote, test_config())
}

pub fn tmp_dir(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()))
}
