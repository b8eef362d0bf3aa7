//! Session - runs one client's `run` / `kill` commands
//!
//! Every process started by a session writes through its own [`Limiter`], and
//! the limiter's kill requests are handled exactly like a client's `kill`.
//!
//! A `kill` may name either the process id or the id the client put on its
//! `run` message.

use crate::limiter::Limiter;
use crate::message::{Message, MessageKind};
use crate::supervisor::{Process, Supervisor};
use futures::future::join_all;
use playpen_foundation::{Error, ProcessConfig, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct Session {
    supervisor: Supervisor,
    out: mpsc::Sender<Message>,
    limiter: Limiter,
    working_dir: Option<PathBuf>,

    /// Live processes by id
    processes: HashMap<String, Process>,
    /// Client `run` id -> process id
    aliases: HashMap<String, String>,

    kill_tx: mpsc::UnboundedSender<Message>,
    kill_rx: mpsc::UnboundedReceiver<Message>,
}

impl Session {
    pub fn new(supervisor: Supervisor, out: mpsc::Sender<Message>) -> Self {
        Self::with_config(supervisor, out, &ProcessConfig::default())
    }

    pub fn with_config(
        supervisor: Supervisor,
        out: mpsc::Sender<Message>,
        config: &ProcessConfig,
    ) -> Self {
        let (kill_tx, kill_rx) = mpsc::unbounded_channel();
        Self {
            supervisor,
            out,
            limiter: Limiter::new(config.message_limit).with_capacity(config.channel_capacity),
            working_dir: config.working_dir.clone(),
            processes: HashMap::with_capacity(8),
            aliases: HashMap::new(),
            kill_tx,
            kill_rx,
        }
    }

    /// Ids of processes that have not ended yet
    pub fn running(&self) -> Vec<String> {
        self.processes
            .iter()
            .filter(|(_, p)| !p.is_done())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Handle a single inbound command
    pub async fn handle(&mut self, msg: Message) -> Result<Option<Process>> {
        self.prune();
        match msg.kind {
            MessageKind::Run => self.run(&msg.id, &msg.body).await,
            MessageKind::Kill => {
                self.kill(&msg.id).await;
                Ok(None)
            }
            other => Err(Error::invalid_input(format!(
                "{} is not a command",
                other
            ))),
        }
    }

    /// Start `command_line`, split with shell quoting rules.
    ///
    /// A non-empty `client_id` becomes another name for the new process.
    pub async fn run(&mut self, client_id: &str, command_line: &str) -> Result<Option<Process>> {
        let args = shlex::split(command_line).ok_or_else(|| {
            Error::invalid_input(format!("Cannot parse command line: {}", command_line))
        })?;
        if args.is_empty() {
            return Err(Error::invalid_input("No arguments found"));
        }

        let input = self.limiter.spawn(self.kill_tx.clone(), self.out.clone());
        let process = self
            .supervisor
            .start(self.working_dir.as_deref(), &args, input)
            .await?;

        if let Some(process) = &process {
            info!(
                "Session started process {} (pid {:?}) for {:?}",
                process.id(),
                process.pid(),
                client_id
            );
            if !client_id.is_empty() && client_id != process.id() {
                self.aliases
                    .insert(client_id.to_string(), process.id().to_string());
            }
            self.processes
                .insert(process.id().to_string(), process.clone());
        }
        Ok(process)
    }

    /// Kill process `id` and wait for it to end. `id` is looked up as a
    /// process id first, then as a client `run` id. Unknown ids are ignored.
    pub async fn kill(&mut self, id: &str) {
        let process = match self.processes.remove(id) {
            Some(process) => Some(process),
            None => self
                .aliases
                .remove(id)
                .and_then(|target| self.processes.remove(&target)),
        };
        match process {
            Some(process) => {
                info!("Session killing process {} ({})", process.id(), id);
                process.kill().await;
            }
            None => debug!("Kill for unknown process {}", id),
        }
        self.prune();
    }

    /// Serve commands until `commands` closes, then kill whatever is still running
    pub async fn serve(mut self, mut commands: mpsc::Receiver<Message>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(msg) => {
                        if let Err(e) = self.handle(msg).await {
                            warn!("Ignoring command: {}", e);
                        }
                    }
                    None => break,
                },
                Some(request) = self.kill_rx.recv() => {
                    self.kill(&request.id).await;
                }
            }
        }

        self.shutdown().await;
    }

    /// Kill every live process concurrently
    pub async fn shutdown(&mut self) {
        self.aliases.clear();
        let processes: Vec<Process> = self.processes.drain().map(|(_, p)| p).collect();
        if !processes.is_empty() {
            info!("Session closing, killing {} process(es)", processes.len());
        }
        join_all(processes.iter().map(|p| p.kill())).await;
    }

    fn prune(&mut self) {
        self.processes.retain(|_, p| !p.is_done());
        let processes = &self.processes;
        self.aliases.retain(|_, target| processes.contains_key(target));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playpen_foundation::IdSource;
    use std::sync::Arc;

    fn session() -> (Session, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(16);
        let supervisor = Supervisor::new(Arc::new(IdSource::new()));
        (Session::new(supervisor, tx), rx)
    }

    #[tokio::test]
    async fn test_handle_run_then_kill() {
        let (mut session, mut rx) = session();

        let process = session
            .handle(Message::run("client", "sleep 30"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.running(), vec![process.id().to_string()]);

        session.handle(Message::kill(process.id())).await.unwrap();
        assert!(process.is_done());
        assert!(session.running().is_empty());

        let end = rx.recv().await.unwrap();
        assert!(end.is_end());
        assert_eq!(end.id, process.id());
    }

    #[tokio::test]
    async fn test_kill_by_client_id() {
        let (mut session, mut rx) = session();

        let process = session
            .handle(Message::run("my-sleep", "sleep 30"))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(process.id(), "my-sleep");

        session.handle(Message::kill("my-sleep")).await.unwrap();
        assert!(process.is_done());
        assert!(session.running().is_empty());
        assert!(session.aliases.is_empty());

        let end = rx.recv().await.unwrap();
        assert!(end.is_end());
        assert_eq!(end.id, process.id());
    }

    #[tokio::test]
    async fn test_handle_rejects_output_kinds() {
        let (mut session, _rx) = session();
        let result = session
            .handle(Message::new("1", MessageKind::End, ""))
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_run_rejects_blank_line() {
        let (mut session, _rx) = session();
        assert!(session.run("client", "  ").await.is_err());
        assert!(session.run("client", "echo 'open").await.is_err());
    }
}
