use super::Error;

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tempfile::TempDir;
use tokio::process;
use tokio::time::timeout;

/// A control master running in the background, and the directory holding its socket and log.
///
/// When the `Session` is dropped, the master is told to exit and any errors are silently
/// ignored. To disconnect and be alerted to errors, use [`close`](Session::close).
#[derive(Debug)]
pub(crate) struct Session {
    ctl: Option<TempDir>,
    ctl_path: Box<Path>,
    addr: Box<str>,
    master_log: Box<Path>,
    ssh: PathBuf,
}

impl Session {
    pub(crate) fn new(ctl: TempDir, addr: &str, ssh: &Path) -> Self {
        let log = ctl.path().join("log").into_boxed_path();
        let ctl_path = ctl.path().join("master").into_boxed_path();

        Self {
            ctl: Some(ctl),
            ctl_path,
            addr: addr.into(),
            master_log: log,
            ssh: ssh.to_path_buf(),
        }
    }

    fn new_std_cmd(&self, args: &[impl AsRef<OsStr>]) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.ssh);
        cmd.stdin(Stdio::null())
            .arg("-S")
            .arg(&*self.ctl_path)
            .arg("-o")
            .arg("BatchMode=yes")
            .args(args)
            .arg(&*self.addr);
        cmd
    }

    fn new_cmd(&self, args: &[impl AsRef<OsStr>]) -> process::Command {
        let mut cmd = process::Command::from(self.new_std_cmd(args));
        cmd.kill_on_drop(true);
        cmd
    }

    /// Ask the master whether it is still alive, giving up after `limit`.
    pub(crate) async fn check(&self, limit: Duration) -> Result<(), Error> {
        let check = match timeout(limit, self.new_cmd(&["-O", "check"]).output()).await {
            Ok(check) => check.map_err(Error::Ssh)?,
            Err(_) => {
                return Err(Error::Timeout {
                    seconds: limit.as_secs(),
                })
            }
        };

        if let Some(255) = check.status.code() {
            if let Some(master_error) = self.discover_master_error() {
                Err(master_error)
            } else {
                Err(Error::Disconnected)
            }
        } else {
            Ok(())
        }
    }

    /// Run `command` over the control socket and collect its output.
    ///
    /// `command` is handed to the remote CLI as a single argument.
    pub(crate) async fn run(&self, command: &str, limit: Duration) -> Result<Output, Error> {
        // NOTE: we pass -p 9 nine here (the "discard" port) to ensure that ssh does not
        // succeed in establishing a _new_ connection if the master connection has failed.
        let mut cmd = self.new_cmd(&["-T", "-p", "9"]);
        cmd.arg("--")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = match timeout(limit, cmd.output()).await {
            Ok(output) => output.map_err(Error::Ssh)?,
            // dropping the future kills the client
            Err(_) => {
                return Err(Error::Timeout {
                    seconds: limit.as_secs(),
                })
            }
        };

        if let Some(255) = output.status.code() {
            if let Some(master_error) = self.discover_master_error() {
                return Err(master_error);
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                return Err(Error::Ssh(Error::interpret_ssh_error(&stderr)));
            }
            return Err(Error::Disconnected);
        }

        Ok(output)
    }

    pub(crate) async fn close(mut self, limit: Duration) -> Result<(), Error> {
        let mut exit_cmd = self.new_cmd(&["-O", "exit"]);

        // Take self.ctl so that drop would do nothing
        let ctl = match self.ctl.take() {
            Some(ctl) => ctl,
            None => return Ok(()),
        };

        match timeout(limit, exit_cmd.output()).await {
            Ok(exit) => {
                let exit = exit.map_err(Error::Ssh)?;
                if !exit.status.success() {
                    // the master may already be gone; we were asked to close, so that is fine
                    let stderr = String::from_utf8_lossy(&exit.stderr);
                    tracing::debug!(
                        stderr = %crate::redact::redact(stderr.trim()),
                        "master did not acknowledge exit"
                    );
                }
            }
            Err(_) => tracing::warn!(seconds = limit.as_secs(), "master did not exit in time"),
        }

        if let Some(master_error) = self.discover_master_error() {
            // whatever the master logged on the way out is not a failure to close
            tracing::debug!(error = %master_error, "master log at close");
        }

        ctl.close().map_err(Error::Cleanup)
    }

    /// Read what the master wrote to its log (`ssh -E`).
    fn master_log(&self) -> io::Result<String> {
        fs::read_to_string(&self.master_log)
    }

    pub(crate) fn discover_master_error(&self) -> Option<Error> {
        let err = match self.master_log() {
            Ok(err) => err,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => return Some(Error::Master(e)),
        };
        let mut stderr = err.trim();

        stderr = stderr.strip_prefix("ssh: ").unwrap_or(stderr);

        if stderr.starts_with("Warning: Permanently added ") {
            // added to hosts file -- let's ignore that message
            stderr = stderr.split_once('\n').map(|x| x.1.trim()).unwrap_or("");
        }

        if stderr.is_empty() {
            return None;
        }

        let kind = if stderr.contains("Connection to") && stderr.contains("closed by remote host") {
            io::ErrorKind::ConnectionAborted
        } else {
            io::ErrorKind::Other
        };

        Some(Error::Master(io::Error::new(
            kind,
            crate::redact::redact(stderr).into_owned(),
        )))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Keep tempdir alive until the master is gone
        let _ctl = match self.ctl.take() {
            Some(ctl) => ctl,
            // return since close must have already been called.
            None => return,
        };

        let _res = self
            .new_std_cmd(&["-O", "exit"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(log: &str) -> (TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        if !log.is_empty() {
            fs::write(dir.path().join("log"), log).unwrap();
        }
        // no control directory, so dropping does not try to reach a master
        let session = Session {
            ctl: None,
            ctl_path: dir.path().join("master").into_boxed_path(),
            addr: "r1".into(),
            master_log: dir.path().join("log").into_boxed_path(),
            ssh: PathBuf::from("ssh"),
        };
        (dir, session)
    }

    #[test]
    fn no_log_is_no_error() {
        let (_dir, s) = session("");
        assert!(s.discover_master_error().is_none());
    }

    #[test]
    fn master_log_is_interpreted() {
        let (_dir, s) = session("Warning: Permanently added 'r1' (ED25519) to the list of known hosts.\nConnection to r1 closed by remote host.\n");
        match s.discover_master_error() {
            Some(Error::Master(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::ConnectionAborted);
                assert_eq!(e.to_string(), "Connection to r1 closed by remote host.");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn multiplexed_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = dir.path().join("master");
        let mut s = Session::new(dir, "r1", Path::new("/usr/bin/ssh"));
        let cmd = s.new_std_cmd(&["-T", "-p", "9"]);
        assert_eq!(cmd.get_program().to_str(), Some("/usr/bin/ssh"));
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(
            args,
            [
                OsStr::new("-S"),
                ctl.as_os_str(),
                OsStr::new("-o"),
                OsStr::new("BatchMode=yes"),
                OsStr::new("-T"),
                OsStr::new("-p"),
                OsStr::new("9"),
                OsStr::new("r1"),
            ]
        );
        drop(s.ctl.take());
    }
}
