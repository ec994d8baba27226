// Termination signals for a running batch
use log::{debug, warn};
use tokio::process::Child;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// SIGTERM: let the runner's traps clean up.
    Graceful,
    /// SIGKILL, used on application shutdown.
    Hard,
}

/// Signal the child's whole process group, falling back to the child alone.
///
/// Returns as soon as the signal is delivered; it never waits for exit.
/// On the fallback path grandchildren can outlive the batch.
pub fn terminate(child: &mut Child, pgid: Option<u32>, how: Termination) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, killpg, Signal};
        use nix::unistd::Pid;

        let signal = match how {
            Termination::Graceful => Signal::SIGTERM,
            Termination::Hard => Signal::SIGKILL,
        };

        if let Some(pgid) = pgid {
            match killpg(Pid::from_raw(pgid as i32), signal) {
                Ok(()) => {
                    debug!("Sent {:?} to process group {}", signal, pgid);
                    return;
                }
                Err(e) => warn!("Failed to signal process group {}: {}", pgid, e),
            }
        }

        if let Some(pid) = child.id() {
            if let Err(e) = kill(Pid::from_raw(pid as i32), signal) {
                warn!("Failed to signal process {}: {}", pid, e);
            }
            return;
        }
    }

    #[cfg(not(unix))]
    let _ = (pgid, how);

    if let Err(e) = child.start_kill() {
        warn!("Failed to kill child process: {}", e);
    }
}

/// Exit code of a finished process; signal deaths map to `128 + signal`.
pub fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}
