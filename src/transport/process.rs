//! Local commands spawned inside a PTY

use super::{Control, Input, Output, Signal, Transport};
use crate::result::ExpectError;
use async_trait::async_trait;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Time a hung-up child gets to exit before it is killed.
const KILL_GRACE: Duration = Duration::from_millis(250);
const KILL_POLL: Duration = Duration::from_millis(25);

/// Spawn `argv` inside a fresh PTY of the given size.
///
/// The slave side is released once the child holds it, so the output
/// stream ends when the child exits.
pub fn spawn(argv: &[String], size: PtySize) -> Result<Transport, ExpectError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| ExpectError::SpawnFailed("Empty command".to_string()))?;

    let pty_pair = native_pty_system()
        .openpty(size)
        .map_err(|e| ExpectError::SpawnFailed(format!("PTY: {}", e)))?;

    let mut cmd = CommandBuilder::new(program);
    cmd.args(args);

    let child = pty_pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| ExpectError::SpawnFailed(format!("{}: {}", program, e)))?;
    drop(pty_pair.slave);

    let reader = pty_pair
        .master
        .try_clone_reader()
        .map_err(|e| ExpectError::SpawnFailed(format!("PTY reader: {}", e)))?;
    let writer = pty_pair
        .master
        .take_writer()
        .map_err(|e| ExpectError::SpawnFailed(format!("PTY writer: {}", e)))?;

    let pid = child.process_id();
    debug!(program = %program, ?pid, "spawned process");

    let control = ProcessControl {
        pid,
        killer: Mutex::new(child.clone_killer()),
        child: Arc::new(Mutex::new(child)),
        master: Mutex::new(Some(pty_pair.master)),
    };

    Ok(Transport::new(
        Output::Blocking(reader),
        Input::blocking(writer),
        Arc::new(control),
    ))
}

/// Split a command line on whitespace. Arguments cannot contain spaces.
pub fn split_command_line(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

struct ProcessControl {
    pid: Option<u32>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    child: Arc<Mutex<Box<dyn Child + Send + Sync>>>,
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
}

#[async_trait]
impl Control for ProcessControl {
    async fn signal(&self, signal: Signal) -> Result<(), ExpectError> {
        deliver(self.pid, signal)
    }

    async fn wait(&self) -> Result<(), ExpectError> {
        let child = self.child.clone();
        let status = tokio::task::spawn_blocking(move || {
            let mut child = child
                .lock()
                .map_err(|_| std::io::Error::other("child handle poisoned"))?;
            child.wait()
        })
        .await
        .map_err(|e| ExpectError::read_failed(std::io::Error::other(e)))?
        .map_err(ExpectError::read_failed)?;

        debug!(pid = ?self.pid, code = status.exit_code(), "process exited");
        if status.success() {
            Ok(())
        } else {
            Err(ExpectError::ExitStatus {
                code: status.exit_code(),
            })
        }
    }

    async fn close(&self) -> Result<(), ExpectError> {
        self.hang_up();
        let deadline = Instant::now() + KILL_GRACE;
        while !self.exited() && Instant::now() < deadline {
            tokio::time::sleep(KILL_POLL).await;
        }
        self.kill_survivor();
        Ok(())
    }

    fn close_blocking(&self) {
        self.hang_up();
        let deadline = Instant::now() + KILL_GRACE;
        while !self.exited() && Instant::now() < deadline {
            std::thread::sleep(KILL_POLL);
        }
        self.kill_survivor();
    }
}

impl ProcessControl {
    /// SIGHUP through the PTY layer, then release the master.
    fn hang_up(&self) {
        if let Ok(mut killer) = self.killer.lock() {
            // Fails harmlessly when the child already exited.
            if let Err(e) = killer.kill() {
                debug!(pid = ?self.pid, error = %e, "hangup on close failed");
            }
        }
        if let Ok(mut master) = self.master.lock() {
            master.take();
        }
    }

    /// Whether the child is known to have exited. A handle held by a
    /// pending `wait` counts as still running.
    fn exited(&self) -> bool {
        match self.child.try_lock() {
            Ok(mut child) => matches!(child.try_wait(), Ok(Some(_))),
            Err(_) => false,
        }
    }

    fn kill_survivor(&self) {
        if self.exited() {
            return;
        }
        warn!(pid = ?self.pid, "child ignored hangup, killing");
        if let Err(e) = deliver(self.pid, Signal::Kill) {
            debug!(pid = ?self.pid, error = %e, "kill on close failed");
        }
    }
}

#[cfg(unix)]
fn deliver(pid: Option<u32>, signal: Signal) -> Result<(), ExpectError> {
    let pid = pid.ok_or_else(|| ExpectError::Unsupported("process id unknown".to_string()))?;
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| ExpectError::InvalidArgument(format!("process id {} out of range", pid)))?;

    // SAFETY: kill(2) takes plain integers and reports a bad pid or signal
    // through its return value.
    let result = unsafe { libc::kill(pid, signal.as_raw()) };
    if result != 0 {
        return Err(ExpectError::write_failed(std::io::Error::last_os_error()));
    }
    debug!(pid, %signal, "signal delivered");
    Ok(())
}

#[cfg(not(unix))]
fn deliver(_pid: Option<u32>, signal: Signal) -> Result<(), ExpectError> {
    Err(ExpectError::Unsupported(format!(
        "{} is not deliverable on this platform",
        signal
    )))
}
