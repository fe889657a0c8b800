use crate::app::SshClient;
use crate::config::ClientConfig;
use crate::errors::{Result, SshError};
use crate::models::{FileEntry, Permission};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "remotefs", version, about = "Remote files and commands over one SSH session")]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct ConnectionArgs {
    #[arg(long, short = 'H')]
    pub host: String,
    #[arg(long, short = 'u')]
    pub user: String,
    #[arg(long, short = 'p', default_value_t = 22)]
    pub port: u16,
    #[arg(long, conflicts_with = "key")]
    pub password: Option<String>,
    #[arg(long, short = 'i')]
    pub key: Option<PathBuf>,
    #[arg(long, requires = "key")]
    pub passphrase: Option<String>,
    /// Protocol option as KEY=VALUE, e.g. StrictHostKeyChecking=yes.
    #[arg(long = "option", short = 'o', value_name = "KEY=VALUE")]
    pub options: Vec<String>,
    /// Script sourced before every command batch.
    #[arg(long = "source", value_name = "FILE")]
    pub source_files: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run commands; stdout and stderr are streamed through.
    Exec {
        #[arg(required = true)]
        commands: Vec<String>,
    },
    Ls {
        #[arg(default_value = ".")]
        path: String,
    },
    Stat {
        path: String,
    },
    Exists {
        path: String,
    },
    Put {
        local: String,
        remote: String,
        #[arg(long)]
        overwrite: bool,
    },
    Get {
        remote: String,
        local: String,
    },
    Mv {
        src: String,
        dst: String,
    },
    Rm {
        path: String,
        #[arg(short = 'r', long)]
        recursive: bool,
    },
    Mkdir {
        path: String,
        #[arg(short = 'p', long)]
        parents: bool,
    },
    Chmod {
        /// Octal mode, e.g. 755.
        mode: String,
        path: String,
        #[arg(short = 'R', long)]
        recursive: bool,
    },
    Chown {
        owner: String,
        path: String,
        #[arg(short = 'R', long)]
        recursive: bool,
    },
    Chgrp {
        group: String,
        path: String,
        #[arg(short = 'R', long)]
        recursive: bool,
    },
    Ln {
        target: String,
        link: String,
    },
    Readlink {
        path: String,
    },
}

pub fn parse_mode(raw: &str) -> Result<Permission> {
    u32::from_str_radix(raw.trim(), 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
        .map(Permission::new)
        .ok_or_else(|| SshError::invalid_argument(format!("Invalid octal mode: {}", raw)))
}

pub fn parse_option(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(SshError::invalid_argument(format!(
            "Option must look like KEY=VALUE: {}",
            raw
        ))),
    }
}

impl ConnectionArgs {
    pub fn to_config(&self) -> Result<ClientConfig> {
        let mut config = match (&self.key, &self.password) {
            (Some(key), _) => {
                let config = ClientConfig::with_private_key(&self.user, &self.host, key.clone());
                match &self.passphrase {
                    Some(passphrase) => config.passphrase(passphrase),
                    None => config,
                }
            }
            (None, Some(password)) => ClientConfig::with_password(&self.user, &self.host, password),
            (None, None) => {
                return Err(SshError::authentication("No credential configured")
                    .with_hint("Pass --password or --key."))
            }
        }
        .port(self.port);
        for raw in &self.options {
            let (key, value) = parse_option(raw)?;
            config = config.option(key, value);
        }
        for file in &self.source_files {
            config = config.source_file(file);
        }
        Ok(config)
    }
}

fn entry_json(entry: &FileEntry) -> Value {
    serde_json::json!({
        "name": entry.name(),
        "path": entry.path(),
        "type": entry.file_type(),
        "mode": entry.mode_string(),
        "octal": entry.permission().octal(),
        "length": entry.length(),
        "owner": entry.owner(),
        "group": entry.group(),
        "modified": entry.last_modified_time().to_rfc3339(),
        "accessed": entry.last_access_time().to_rfc3339(),
    })
}

fn dispatch<T: crate::transport::Transport>(client: &SshClient<T>, command: Command) -> Result<i32> {
    let fs = client.fs();
    let output = match command {
        Command::Exec { commands } => {
            let stdout = std::io::stdout();
            let stderr = std::io::stderr();
            let code = client.executor.execute_streaming(
                &commands,
                &mut stdout.lock(),
                &mut stderr.lock(),
                &Default::default(),
            )?;
            return Ok(code);
        }
        Command::Ls { path } => Value::Array(fs.list_files(&path)?.iter().map(entry_json).collect()),
        Command::Stat { path } => entry_json(&fs.get_file(&path)?),
        Command::Exists { path } => serde_json::json!({ "path": path, "exists": fs.exists(&path) }),
        Command::Put {
            local,
            remote,
            overwrite,
        } => {
            fs.copy_from_local(&local, &remote, overwrite)?;
            serde_json::json!({ "success": true, "src": local, "dst": remote })
        }
        Command::Get { remote, local } => {
            fs.copy_to_local(&remote, &local)?;
            serde_json::json!({ "success": true, "src": remote, "dst": local })
        }
        Command::Mv { src, dst } => {
            fs.move_path(&src, &dst)?;
            serde_json::json!({ "success": true, "src": src, "dst": dst })
        }
        Command::Rm { path, recursive } => {
            fs.delete(&path, recursive)?;
            serde_json::json!({ "success": true, "path": path })
        }
        Command::Mkdir { path, parents } => {
            fs.mkdir(&path, parents)?;
            serde_json::json!({ "success": true, "path": path })
        }
        Command::Chmod {
            mode,
            path,
            recursive,
        } => {
            let permission = parse_mode(&mode)?;
            fs.chmod(&path, permission, recursive)?;
            serde_json::json!({ "success": true, "path": path, "mode": permission.octal() })
        }
        Command::Chown {
            owner,
            path,
            recursive,
        } => {
            fs.chown(&path, &owner, recursive)?;
            serde_json::json!({ "success": true, "path": path, "owner": owner })
        }
        Command::Chgrp {
            group,
            path,
            recursive,
        } => {
            fs.chgrp(&path, &group, recursive)?;
            serde_json::json!({ "success": true, "path": path, "group": group })
        }
        Command::Ln { target, link } => {
            fs.create_symlink(&target, &link)?;
            serde_json::json!({ "success": true, "target": target, "link": link })
        }
        Command::Readlink { path } => {
            serde_json::json!({ "path": path, "target": fs.read_symlink(&path)? })
        }
    };
    let text = serde_json::to_string_pretty(&output)
        .map_err(|err| SshError::wrap("Failed to render output", err))?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", text)?;
    Ok(0)
}

pub async fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = cli.connection.to_config()?;
    let client = SshClient::initialize(config)?;
    let command = cli.command;
    let client = std::sync::Arc::new(client);
    let worker = client.clone();
    let outcome = tokio::task::spawn_blocking(move || dispatch(&*worker, command))
        .await
        .map_err(|err| SshError::operation(format!("Remote task failed: {}", err)))?;
    client.close();
    if let Err(err) = &outcome {
        client.logger.error("Command failed", Some(&err.to_json()));
    }
    outcome
}
