use std::io;

use thiserror::Error;

/// Errors that occur when configuring or talking to a Junos device.
///
/// Device-reported command failures (a Junos `error:` line, say) are *not* errors; they come
/// back as a [`CommandResult`](crate::CommandResult) with a nonzero exit status so the caller can
/// inspect the output.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A connection option was missing or out of range.
    #[error("invalid option `{field}`: {reason}")]
    InvalidOption {
        /// Name of the offending option.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A command was refused before being sent to the device.
    #[error("refusing to run command {command:?}: {reason}")]
    UnsafeCommand {
        /// The rejected command text.
        command: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Failed to establish the initial connection to the device.
    #[error("failed to connect to {target}{}", hop(.via))]
    Connect {
        /// `user@host:port` of the device.
        target: String,
        /// The proxy hop, if any.
        via: Option<String>,
        /// What `ssh` reported.
        #[source]
        source: io::Error,
    },

    /// The master connection failed.
    #[error("the master connection failed")]
    Master(#[source] io::Error),

    /// Failed to run the `ssh` command locally.
    #[error("the local ssh command could not be executed")]
    Ssh(#[source] io::Error),

    /// Failed to write the askpass helper.
    #[error("failed to provision the askpass helper")]
    Askpass(#[source] io::Error),

    /// The connection to the device was severed.
    ///
    /// This is a best-effort error: `ssh` exits with status 255 both when the connection drops
    /// and when the remote side itself returns 255.
    #[error("the connection was terminated")]
    Disconnected,

    /// An operation did not finish within the configured timeout.
    #[error("timed out after {seconds}s")]
    Timeout {
        /// The timeout that elapsed.
        seconds: u64,
    },

    /// Failed to remove a temporary directory (control socket or askpass helper).
    #[error("failed to remove temporary ssh session directory")]
    Cleanup(#[source] io::Error),

    /// The operation is not available on Junos devices.
    #[error("{0}")]
    Unsupported(&'static str),
}

fn hop(via: &Option<String>) -> String {
    via.as_ref().map(|v| format!(" via {}", v)).unwrap_or_default()
}

impl Error {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidOption {
            field,
            reason: reason.into(),
        }
    }

    /// Whether this error was raised before any I/O because of bad configuration or command
    /// text.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::InvalidOption { .. } | Error::UnsafeCommand { .. })
    }

    pub(crate) fn interpret_ssh_error(stderr: &str) -> io::Error {
        // ssh only hands us a string, so we guess an ErrorKind from its wording.
        //
        // format is:
        //
        //     ssh: ssh error: io error
        let mut stderr = stderr.trim();
        stderr = stderr.strip_prefix("ssh: ").unwrap_or(stderr);
        if stderr.starts_with("Warning: Permanently added ") {
            // added to hosts file -- let's ignore that message
            stderr = stderr.split_once('\n').map(|x| x.1.trim()).unwrap_or("");
        }
        let mut kind = io::ErrorKind::ConnectionAborted;
        let mut err = stderr.splitn(2, ": ");
        if let Some(ssh_error) = err.next() {
            if ssh_error.starts_with("Could not resolve") {
                kind = io::ErrorKind::Other;
            }

            if let Some(io_error) = err.next() {
                match io_error {
                    "Network is unreachable" => {
                        kind = io::ErrorKind::Other;
                    }
                    "Connection refused" => {
                        kind = io::ErrorKind::ConnectionRefused;
                    }
                    e if ssh_error.starts_with("connect to host")
                        && (e == "Connection timed out" || e == "Operation timed out") =>
                    {
                        kind = io::ErrorKind::TimedOut;
                    }
                    e if ssh_error.starts_with("connect to host") && e == "Permission denied" => {
                        // macOS wording for "network is unreachable"
                        kind = io::ErrorKind::Other;
                    }
                    e if e.contains("Permission denied (") => {
                        kind = io::ErrorKind::PermissionDenied;
                    }
                    _ => {}
                }
            }
        }

        if stderr.contains("kex_exchange_identification") || stderr.contains("ProxyCommand") {
            kind = io::ErrorKind::BrokenPipe;
        }

        io::Error::new(kind, crate::redact::redact(stderr).into_owned())
    }
}
