use super::builder::SessionBuilder;
use super::canned::CannedResponses;
use super::exec::{self, CommandResult};
use super::path::{self, PathHandle};
use super::platform::{self, Observations, PlatformInfo};
use super::proxy::ProxyConfigurator;
use super::session::Session;
use super::{ConnectionOptions, Error};

use std::path::Path;

/// Run once a master is up to check that the CLI answers.
pub(crate) const CONNECTIVITY_PROBE: &str = "show system uptime";

/// Make the CLI friendly to automation: no paging, no wrapping, no completion on space.
pub(crate) const CLI_TUNING: &[&str] = &[
    "set cli screen-length 0",
    "set cli screen-width 0",
    "set cli complete-on-space off",
];

const NO_FILE_TRANSFER: &str =
    "file transfer is not supported on Junos devices; use command execution instead";

/// Where a [`Connection`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No master is running.
    Unconnected,
    /// A master is being started.
    Connecting,
    /// The master is up; the CLI has not been tuned yet.
    Connected,
    /// The master is up and the CLI answered the probe.
    Configured,
}

#[derive(Debug)]
enum Backend {
    Live(Option<Session>),
    Canned(CannedResponses),
}

/// A connection to one Junos device.
///
/// Commands go through a single OpenSSH control master, started on [`connect`] (or on first use
/// for a [deferred](Connection::deferred) connection) and stopped on [`close`] or drop. In mock
/// mode every command is answered from a [`CannedResponses`] catalog and no process is ever
/// spawned.
///
/// All operations take `&mut self`: commands on one connection run one after another.
///
///   [`connect`]: Connection::connect
///   [`close`]: Connection::close
#[derive(Debug)]
pub struct Connection {
    options: ConnectionOptions,
    proxy: ProxyConfigurator,
    backend: Backend,
    state: SessionState,
}

impl Connection {
    /// Connect right away.
    ///
    /// In mock mode this never fails.
    pub async fn open(options: ConnectionOptions) -> Result<Self, Error> {
        let mut connection = Self::deferred(options);
        connection.connect().await?;
        Ok(connection)
    }

    /// A connection that starts its master on first use.
    pub fn deferred(options: ConnectionOptions) -> Self {
        Self::with_proxy(options, ProxyConfigurator::default())
    }

    /// Like [`deferred`](Self::deferred), with an explicit bastion strategy instead of the
    /// detected one.
    pub fn with_proxy(options: ConnectionOptions, proxy: ProxyConfigurator) -> Self {
        let backend = if options.is_mock() {
            Backend::Canned(CannedResponses::junos_default())
        } else {
            Backend::Live(None)
        };

        Self {
            options,
            proxy,
            backend,
            state: SessionState::Unconnected,
        }
    }

    /// A mock connection answering from `responses`.
    pub fn with_responses(options: ConnectionOptions, responses: CannedResponses) -> Self {
        Self {
            options,
            proxy: ProxyConfigurator::default(),
            backend: Backend::Canned(responses),
            state: SessionState::Unconnected,
        }
    }

    /// The options this connection was built with.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether commands are answered from canned responses.
    pub fn is_mock(&self) -> bool {
        matches!(self.backend, Backend::Canned(_))
    }

    /// Start the master and tune the CLI.
    ///
    /// Does nothing if already connected. Tuning failures are logged, not returned.
    pub async fn connect(&mut self) -> Result<(), Error> {
        if matches!(
            self.state,
            SessionState::Connected | SessionState::Configured
        ) {
            return Ok(());
        }

        if let Backend::Canned(_) = self.backend {
            self.state = SessionState::Connected;
            self.test_and_configure_session().await;
            return Ok(());
        }

        self.state = SessionState::Connecting;
        let started = SessionBuilder::new(&self.options, &self.proxy)
            .just_connect()
            .await;

        match started {
            Ok(session) => {
                self.backend = Backend::Live(Some(session));
                self.state = SessionState::Connected;
                self.test_and_configure_session().await;
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Unconnected;
                tracing::warn!(device = %self.options.target(), error = %err, "connect failed");
                Err(err)
            }
        }
    }

    /// Probe the CLI, then turn off paging, wrapping and completion on space.
    ///
    /// Returns whether every step succeeded. Failures are logged at `warn` and never drop the
    /// connection; running this again is harmless. Without a prior [`connect`](Self::connect)
    /// nothing is sent and `false` is returned.
    pub async fn test_and_configure_session(&mut self) -> bool {
        if !matches!(
            self.state,
            SessionState::Connected | SessionState::Configured
        ) {
            tracing::debug!(state = ?self.state, "not connected; skipping CLI configuration");
            return false;
        }

        let probe = match self.dispatch(CONNECTIVITY_PROBE).await {
            Ok(probe) => probe,
            Err(err) => {
                tracing::warn!(error = %err, "session probe failed");
                return false;
            }
        };
        if !probe.success() {
            tracing::warn!(
                status = probe.exit_status,
                output = %crate::redact::redact(&probe.stdout),
                "session probe was rejected"
            );
            return false;
        }

        let mut tuned = true;
        for command in CLI_TUNING {
            match self.dispatch(command).await {
                Ok(result) if result.success() => {}
                Ok(result) => {
                    tuned = false;
                    tracing::warn!(command, status = result.exit_status, "CLI tuning rejected");
                }
                Err(err) => {
                    tuned = false;
                    tracing::warn!(command, error = %err, "CLI tuning failed");
                }
            }
        }

        self.state = SessionState::Configured;
        tuned
    }

    /// Run one CLI command.
    ///
    /// The command is vetted by [`sanitize_command`](crate::sanitize_command) first and only a
    /// rejection there is an error. Device-side failures, lost connections and timeouts come back
    /// as a [`CommandResult`] with a nonzero exit status.
    pub async fn execute(&mut self, command: &str) -> Result<CommandResult, Error> {
        let command = exec::sanitize_command(command)?;
        Ok(self.run_trusted(command).await)
    }

    /// Read a pseudo path. See [`PathHandle`].
    pub async fn open_path(&mut self, path: &str) -> PathHandle {
        let command = path::command_for(path);
        let result = match exec::sanitize_command(&command) {
            Ok(vetted) => Ok(self.run_trusted(vetted).await),
            Err(err) => Err(err),
        };
        PathHandle::new(path, command, result)
    }

    /// Always fails: Junos devices are driven through the CLI only.
    pub fn upload(&self, _local: impl AsRef<Path>, _remote: &str) -> Result<(), Error> {
        Err(Error::Unsupported(NO_FILE_TRANSFER))
    }

    /// Always fails: Junos devices are driven through the CLI only.
    pub fn download(&self, _remote: &str, _local: impl AsRef<Path>) -> Result<(), Error> {
        Err(Error::Unsupported(NO_FILE_TRANSFER))
    }

    /// Identify the device.
    ///
    /// Only asks the device when a master is already running; otherwise, and in mock mode,
    /// the configured host and this crate's version are reported.
    pub async fn identity(&mut self) -> PlatformInfo {
        let live = matches!(self.backend, Backend::Live(Some(_)));
        if !live {
            return PlatformInfo::fallback(self.options.host());
        }

        let mut obs = Observations {
            version_xml: self.observe(platform::SHOW_VERSION_XML).await,
            chassis_xml: self.observe(platform::SHOW_CHASSIS_XML).await,
            ..Default::default()
        };
        if obs.version_xml.is_none() {
            obs.version_text = self.observe(platform::SHOW_VERSION).await;
        }
        if obs.chassis_xml.is_none() {
            obs.chassis_text = self.observe(platform::SHOW_CHASSIS).await;
        }

        let info = PlatformInfo::from_observations(&obs, self.options.host());
        tracing::debug!(
            hostname = %info.hostname,
            model = info.model.as_deref().unwrap_or("-"),
            version = %info.version,
            "identified device"
        );
        info
    }

    /// `juniper://user@host:port`, with `?via=user@bastion:port` when a bastion is used.
    pub fn uri(&self) -> String {
        let mut uri = format!("{}://{}", platform::PLATFORM_NAME, self.options.target());
        if let Some(bastion) = self.options.bastion() {
            uri.push_str(&format!(
                "?via={}@{}:{}",
                bastion.user(),
                bastion.host(),
                bastion.port()
            ));
        }
        uri
    }

    /// Whether the master is alive. Never fails: any problem reads as "not connected", and a
    /// dead master is discarded so the next command reconnects.
    pub async fn is_connected(&mut self) -> bool {
        let alive = match self.backend {
            Backend::Canned(_) => return self.state != SessionState::Unconnected,
            Backend::Live(None) => false,
            Backend::Live(Some(ref session)) => {
                match session.check(self.options.timeout()).await {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::debug!(error = %err, "control master check failed");
                        false
                    }
                }
            }
        };

        if !alive {
            self.discard_session();
        }
        alive
    }

    /// Stop the master and remove its control directory.
    pub async fn close(&mut self) -> Result<(), Error> {
        self.state = SessionState::Unconnected;
        match self.backend {
            Backend::Live(ref mut slot) => match slot.take() {
                Some(session) => session.close(self.options.timeout()).await,
                None => Ok(()),
            },
            Backend::Canned(_) => Ok(()),
        }
    }

    fn discard_session(&mut self) {
        if let Backend::Live(ref mut slot) = self.backend {
            *slot = None;
        }
        self.state = SessionState::Unconnected;
    }

    /// Run a command the crate built itself, connecting first if needed.
    async fn run_trusted(&mut self, command: &str) -> CommandResult {
        if let Err(err) = self.connect().await {
            return CommandResult::from_error(&err);
        }

        match self.dispatch(command).await {
            Ok(result) => {
                tracing::debug!(
                    command = %crate::redact::redact(command),
                    status = result.exit_status,
                    "command finished"
                );
                result
            }
            Err(err) => {
                tracing::warn!(
                    command = %crate::redact::redact(command),
                    error = %err,
                    "command failed"
                );
                if matches!(err, Error::Disconnected | Error::Master(_)) {
                    self.discard_session();
                }
                CommandResult::from_error(&err)
            }
        }
    }

    /// Send one command to whatever backs this connection, without connecting.
    async fn dispatch(&mut self, command: &str) -> Result<CommandResult, Error> {
        match self.backend {
            Backend::Canned(ref canned) => Ok(canned.respond(command)),
            Backend::Live(None) => Err(Error::Disconnected),
            Backend::Live(Some(ref session)) => {
                let output = session.run(command, self.options.timeout()).await?;
                Ok(CommandResult::from_output(
                    command,
                    &output.stdout,
                    &output.stderr,
                ))
            }
        }
    }

    async fn observe(&mut self, command: &str) -> Option<String> {
        match self.dispatch(command).await {
            Ok(result) if result.success() && !result.stdout.trim().is_empty() => {
                Some(result.stdout)
            }
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(command, error = %err, "detection command failed");
                None
            }
        }
    }
}
