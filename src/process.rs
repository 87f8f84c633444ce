//! Child processes that cannot outlive their owner.
//!
//! A `ManagedProcess` asks its child to exit, waits up to a bounded timeout,
//! then kills and reaps it. This runs on `terminate()` and again on drop.

use std::io;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub struct ManagedProcess {
    child: Child,
    program: String,
    kill_timeout: Duration,
    reaped: bool,
}

impl ManagedProcess {
    /// Spawn `cmd` with all stdio detached.
    pub fn spawn(cmd: &mut Command, kill_timeout: Duration) -> io::Result<Self> {
        let program = cmd.get_program().to_string_lossy().into_owned();
        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        debug!(%program, pid = child.id(), "spawned");
        Ok(Self {
            child,
            program,
            kill_timeout,
            reaped: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn has_exited(&mut self) -> bool {
        if self.reaped {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(_)) => {
                self.reaped = true;
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(program = %self.program, error = %e, "cannot query child status");
                false
            }
        }
    }

    /// Stop the child: polite request, bounded wait, then a forced kill.
    pub fn terminate(&mut self) {
        if self.has_exited() {
            return;
        }

        request_exit(&mut self.child);
        if !self.wait_until(Instant::now() + self.kill_timeout) {
            warn!(program = %self.program, pid = self.child.id(), "did not exit in time, killing");
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
        self.reaped = true;
        debug!(program = %self.program, "terminated");
    }

    fn wait_until(&mut self, deadline: Instant) -> bool {
        loop {
            if self.has_exited() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    let status = Command::new("kill")
        .arg("-TERM")
        .arg(child.id().to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = status {
        debug!(error = %e, "kill -TERM unavailable, killing directly");
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    let _ = child.kill();
}
