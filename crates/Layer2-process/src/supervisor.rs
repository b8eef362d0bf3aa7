//! Process supervisor - starts child programs and reports their output
//!
//! Features:
//! - stdout/stderr relayed as messages while the child runs
//! - exactly one `end` message per process, always the last one
//! - kill that waits until the `end` message has been sent
//!
//! `start` returns as soon as the child is spawned. A background task owns the
//! OS handle, waits for exit, drains both output relays and then emits `end`.
//!
//! On unix each child leads its own process group and kill signals the whole
//! group, so programs it forked in the background die with it.

use crate::message::{Message, MessageKind};
use crate::relay::MessageWriter;
use crate::state::ProcessState;
use futures::future::join_all;
use playpen_foundation::{Error, IdSource, ProcessConfig, Result};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handle to a started process
///
/// Cheap to clone; every clone refers to the same child.
#[derive(Debug, Clone)]
pub struct Process {
    id: String,
    pid: Option<u32>,
    kill: Arc<Notify>,
    state: watch::Receiver<ProcessState>,
}

impl Process {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// OS process id, if the child had not already been reaped at spawn time
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Wait until the `end` message has been sent
    pub async fn wait(&self) {
        let mut state = self.state.clone();
        // A dropped sender means the wait task is gone, which is as done as it gets.
        let _ = state.wait_for(ProcessState::is_terminal).await;
    }

    /// Kill the child and wait for it to end. Safe to call more than once.
    pub async fn kill(&self) {
        if !self.is_done() {
            self.kill.notify_one();
        }
        self.wait().await;
    }
}

/// Starts and kills child processes
#[derive(Debug, Clone)]
pub struct Supervisor {
    ids: Arc<IdSource>,
    read_buffer_size: usize,
}

impl Supervisor {
    pub fn new(ids: Arc<IdSource>) -> Self {
        Self::with_config(ids, &ProcessConfig::default())
    }

    pub fn with_config(ids: Arc<IdSource>, config: &ProcessConfig) -> Self {
        Self {
            ids,
            read_buffer_size: config.read_buffer_size,
        }
    }

    pub fn ids(&self) -> &Arc<IdSource> {
        &self.ids
    }

    /// Start `args[0]` with the remaining arguments, sending its output to `out`.
    ///
    /// Returns `Err` without spawning anything when `args` is empty. When the
    /// spawn itself fails an `end` message carrying the error is sent, `out`
    /// is dropped and `Ok(None)` is returned.
    pub async fn start(
        &self,
        working_dir: Option<&Path>,
        args: &[String],
        out: mpsc::Sender<Message>,
    ) -> Result<Option<Process>> {
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| Error::invalid_input("No arguments found"))?;

        let id = self.ids.next_id();

        let mut cmd = Command::new(program);
        cmd.args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        debug!("Starting process {}: {:?}", id, args);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to start process {} ({}): {}", id, program, e);
                let _ = out.send(Message::end(id, Some(e.to_string()))).await;
                return Ok(None);
            }
        };

        let pid = child.id();
        let stdout = MessageWriter::new(&id, MessageKind::Stdout, out.clone());
        let stderr = MessageWriter::new(&id, MessageKind::Stderr, out.clone());
        let pumps: Vec<JoinHandle<()>> = [
            self.spawn_pump(child.stdout.take(), stdout),
            self.spawn_pump(child.stderr.take(), stderr),
        ]
        .into_iter()
        .flatten()
        .collect();

        let kill = Arc::new(Notify::new());
        let (state_tx, state_rx) = watch::channel(ProcessState::Running);

        tokio::spawn(wait_for_exit(
            id.clone(),
            child,
            pumps,
            out,
            Arc::clone(&kill),
            state_tx,
        ));

        info!("Started process {} (pid {:?})", id, pid);

        Ok(Some(Process {
            id,
            pid,
            kill,
            state: state_rx,
        }))
    }

    /// Kill `process` and wait for it to end. Does nothing for `None`.
    pub async fn kill(&self, process: Option<&Process>) {
        if let Some(process) = process {
            process.kill().await;
        }
    }

    fn spawn_pump<R>(&self, reader: Option<R>, writer: MessageWriter) -> Option<JoinHandle<()>>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let reader = reader?;
        let buffer_size = self.read_buffer_size;
        Some(tokio::spawn(async move {
            if let Err(e) = writer.pump(reader, buffer_size).await {
                debug!("{} relay stopped: {}", writer.kind(), e);
            }
        }))
    }
}

/// How long relays may keep reading after a killed process has exited
const KILL_DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Owns the child until it exits, then reports the outcome
async fn wait_for_exit(
    id: String,
    mut child: Child,
    pumps: Vec<JoinHandle<()>>,
    out: mpsc::Sender<Message>,
    kill: Arc<Notify>,
    state: watch::Sender<ProcessState>,
) {
    let pgid = child.id();
    let mut killed = false;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            _ = kill.notified() => {
                info!("Killing process {}", id);
                kill_tree(&id, pgid, &mut child);
                killed = true;
            }
        }
    };

    // Output written before exit must reach `out` ahead of `end`. Anything
    // still holding the pipes open (a background grandchild) keeps the relays
    // alive, so a kill is still honored while they drain.
    let aborts: Vec<_> = pumps.iter().map(|pump| pump.abort_handle()).collect();
    let mut drained = std::pin::pin!(join_all(pumps));
    let results = loop {
        if killed {
            match tokio::time::timeout(KILL_DRAIN_GRACE, &mut drained).await {
                Ok(results) => break results,
                Err(_) => {
                    warn!("Output of process {} still open after kill, dropping it", id);
                    aborts.iter().for_each(|abort| abort.abort());
                    break (&mut drained).await;
                }
            }
        }
        tokio::select! {
            results = &mut drained => break results,
            _ = kill.notified() => {
                info!("Killing leftovers of process {}", id);
                kill_tree(&id, pgid, &mut child);
                killed = true;
            }
        }
    };
    for result in results {
        match result {
            Err(e) if !e.is_cancelled() => {
                warn!("Output relay for process {} failed: {}", id, e)
            }
            _ => {}
        }
    }

    let error = match status {
        Ok(status) if status.success() => None,
        Ok(status) => Some(status.to_string()),
        Err(e) => Some(e.to_string()),
    };
    debug!("Process {} ended: {}", id, error.as_deref().unwrap_or("ok"));

    let _ = out.send(Message::end(id, error)).await;
    drop(out);

    state.send_replace(ProcessState::Ended);
}

/// SIGKILL the child's process group
#[cfg(unix)]
fn kill_tree(id: &str, pgid: Option<u32>, child: &mut Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pgid) = pgid {
        match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
            // ESRCH: every member of the group is gone already
            Ok(()) | Err(Errno::ESRCH) => return,
            Err(e) => warn!("Failed to kill process group of {}: {}", id, e),
        }
    }
    if let Err(e) = child.start_kill() {
        debug!("Failed to kill process {}: {}", id, e);
    }
}

#[cfg(not(unix))]
fn kill_tree(id: &str, _pgid: Option<u32>, child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("Failed to kill process {}: {}", id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn collect(mut rx: mpsc::Receiver<Message>) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(msg) = rx.recv().await {
            messages.push(msg);
        }
        messages
    }

    #[tokio::test]
    async fn test_empty_args_rejected() {
        let supervisor = Supervisor::new(Arc::new(IdSource::new()));
        let (tx, mut rx) = mpsc::channel(8);

        let result = supervisor.start(None, &[], tx).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        // no message, no id consumed
        assert!(rx.recv().await.is_none());
        assert_eq!(supervisor.ids().next(), 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_sends_end_and_closes() {
        let supervisor = Supervisor::new(Arc::new(IdSource::new()));
        let (tx, rx) = mpsc::channel(8);

        let process = supervisor
            .start(None, &args(&["./does-not-exist"]), tx)
            .await
            .unwrap();
        assert!(process.is_none());

        let messages = collect(rx).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::End);
        assert_eq!(messages[0].id, "0");
        assert!(!messages[0].body.is_empty());
    }

    #[tokio::test]
    async fn test_exit_status_reported() {
        let supervisor = Supervisor::new(Arc::new(IdSource::new()));
        let (tx, rx) = mpsc::channel(8);

        let process = supervisor
            .start(None, &args(&["sh", "-c", "exit 3"]), tx)
            .await
            .unwrap()
            .unwrap();
        process.wait().await;
        assert_eq!(process.state(), ProcessState::Ended);

        let messages = collect(rx).await;
        let end = messages.last().unwrap();
        assert!(end.is_end());
        assert!(end.body.contains('3'), "unexpected body: {}", end.body);
    }

    #[tokio::test]
    async fn test_kill_none_is_noop() {
        let supervisor = Supervisor::new(Arc::new(IdSource::new()));
        supervisor.kill(None).await;
    }
}
