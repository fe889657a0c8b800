pub mod network {
    pub const SSH_DEFAULT_PORT: u16 = 22;
    pub const TIMEOUT_CONNECT_MS: u64 = 10_000;
    pub const KEEPALIVE_INTERVAL_MS: u64 = 30_000;
    pub const EXEC_POLL_INTERVAL_MS: u64 = 100;
    pub const READ_CHUNK_BYTES: usize = 8 * 1024;
    pub const COPY_BUFFER_BYTES: usize = 64 * 1024;
}

pub mod retry {
    pub const MAX_ATTEMPTS: usize = 3;
    pub const BASE_DELAY_MS: u64 = 250;
    pub const MAX_DELAY_MS: u64 = 5_000;
}

pub mod options {
    pub const STRICT_HOST_KEY_CHECKING: &str = "StrictHostKeyChecking";
    pub const SERVER_ALIVE_INTERVAL: &str = "ServerAliveInterval";
    pub const DEFAULT_STRICT_HOST_KEY_CHECKING: &str = "no";
}

pub mod commands {
    pub const PROBE: &str = "true";
}

pub mod mode {
    pub const S_IFMT: u32 = 0o170000;
    pub const S_IFSOCK: u32 = 0o140000;
    pub const S_IFLNK: u32 = 0o120000;
    pub const S_IFREG: u32 = 0o100000;
    pub const S_IFBLK: u32 = 0o060000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFCHR: u32 = 0o020000;
    pub const S_IFIFO: u32 = 0o010000;

    pub const S_ISUID: u32 = 0o4000;
    pub const S_ISGID: u32 = 0o2000;
    pub const S_ISVTX: u32 = 0o1000;
}
