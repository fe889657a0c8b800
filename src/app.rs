use crate::config::ClientConfig;
use crate::errors::{Result, SshError};
use crate::managers::remote::RemoteFileSystem;
use crate::services::executor::CommandExecutor;
use crate::services::logger::Logger;
use crate::services::session::SessionManager;
use crate::services::sftp::SftpOperations;
use crate::transport::{Ssh2Transport, Transport};
use std::sync::Arc;

// Nothing connects until the first operation.
pub struct SshClient<T: Transport = Ssh2Transport> {
    pub logger: Logger,
    pub session: Arc<SessionManager<T>>,
    pub executor: Arc<CommandExecutor<T>>,
    pub sftp: Arc<SftpOperations<T>>,
    pub fs: Arc<RemoteFileSystem<T>>,
}

impl SshClient<Ssh2Transport> {
    pub fn initialize(config: ClientConfig) -> Result<Self> {
        let logger = Logger::new("remotefs");
        let transport = Ssh2Transport::new(logger.clone());
        Self::with_transport(config, transport, logger)
    }
}

impl<T: Transport> SshClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T, logger: Logger) -> Result<Self> {
        config.validate()?;
        logger.debug(
            "Initializing client",
            Some(&serde_json::json!({
                "host": config.host,
                "port": config.port,
                "username": config.username,
                "credential": config.credential.kind(),
            })),
        );
        let session = Arc::new(SessionManager::new(config, transport, logger.clone()));
        let executor = Arc::new(CommandExecutor::new(session.clone(), logger.clone()));
        let sftp = Arc::new(SftpOperations::new(
            session.clone(),
            executor.clone(),
            logger.clone(),
        ));
        let fs = Arc::new(RemoteFileSystem::new(
            executor.clone(),
            sftp.clone(),
            logger.clone(),
        ));
        Ok(Self {
            logger,
            session,
            executor,
            sftp,
            fs,
        })
    }

    pub fn fs(&self) -> &RemoteFileSystem<T> {
        &self.fs
    }

    pub async fn with_fs<F, R>(&self, handler: F) -> Result<R>
    where
        F: FnOnce(&RemoteFileSystem<T>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let fs = self.fs.clone();
        tokio::task::spawn_blocking(move || handler(&fs))
            .await
            .map_err(|err| SshError::operation(format!("Remote task failed: {}", err)))?
    }

    pub fn close(&self) {
        self.session.close();
    }
}
