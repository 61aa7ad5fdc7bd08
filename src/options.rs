use super::{Error, KnownHosts};

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Prefix of the environment variables consulted by [`OptionsBuilder::from_env`].
pub const ENV_PREFIX: &str = "JUNIPER_";

const DEFAULT_PORT: u16 = 22;
const DEFAULT_TIMEOUT: u64 = 30;
const DEFAULT_KEEPALIVE_INTERVAL: u64 = 60;

/// A password that never shows up in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// The raw secret.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Secret(s)
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Secret(s.to_owned())
    }
}

/// The jump host used to reach the device.
#[derive(Debug, Clone)]
pub struct Bastion {
    host: String,
    user: String,
    port: u16,
    password: Option<Secret>,
}

impl Bastion {
    /// Bastion host name.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// User on the bastion. Defaults to the device user.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// SSH port on the bastion.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bastion password. Defaults to the device password.
    pub fn password(&self) -> Option<&Secret> {
        self.password.as_ref()
    }

    /// `user@host[:port]`, with the port left out when it is 22.
    pub fn address(&self) -> String {
        if self.port == DEFAULT_PORT {
            format!("{}@{}", self.user, self.host)
        } else {
            format!("{}@{}:{}", self.user, self.host, self.port)
        }
    }
}

/// Validated options for a [`Connection`](crate::Connection).
///
/// Built with [`ConnectionOptions::builder`]; immutable afterwards.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    host: String,
    user: String,
    password: Option<Secret>,
    port: u16,
    timeout: Duration,
    key_files: Vec<PathBuf>,
    keepalive: bool,
    keepalive_interval: Duration,
    bastion: Option<Bastion>,
    proxy_command: Option<String>,
    mock: bool,
    known_hosts: KnownHosts,
    control_dir: Option<PathBuf>,
    config_file: Option<PathBuf>,
    ssh_binary: PathBuf,
}

impl ConnectionOptions {
    /// Start building options.
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Device host name or address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Login user on the device.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Device password, if password authentication is used.
    pub fn password(&self) -> Option<&Secret> {
        self.password.as_ref()
    }

    /// Device SSH port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bound on connecting and on each command.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Identity files, passed as `-i`.
    pub fn key_files(&self) -> &[PathBuf] {
        &self.key_files
    }

    /// Interval for `ServerAliveInterval`, or `None` when keepalives are disabled.
    pub fn keepalive(&self) -> Option<Duration> {
        if self.keepalive {
            Some(self.keepalive_interval)
        } else {
            None
        }
    }

    /// The bastion, if the device is reached through one.
    pub fn bastion(&self) -> Option<&Bastion> {
        self.bastion.as_ref()
    }

    /// Raw `ProxyCommand` string, if one was configured.
    pub fn proxy_command(&self) -> Option<&str> {
        self.proxy_command.as_deref()
    }

    /// Whether commands are answered from the canned-response catalog.
    pub fn is_mock(&self) -> bool {
        self.mock
    }

    /// Host key policy.
    pub fn known_hosts(&self) -> &KnownHosts {
        &self.known_hosts
    }

    /// Directory in which per-connection temporary directories are created.
    ///
    /// Defaults to the user's runtime directory, then the cache directory, then the system
    /// temporary directory.
    pub fn control_dir(&self) -> PathBuf {
        self.control_dir
            .clone()
            .or_else(dirs::runtime_dir)
            .or_else(dirs::cache_dir)
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Alternative ssh configuration file (`ssh -F`).
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// The ssh client binary.
    pub fn ssh_binary(&self) -> &Path {
        &self.ssh_binary
    }

    /// `user@host:port` of the device, as used in diagnostics.
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Builder for [`ConnectionOptions`].
///
/// Numeric setters take anything that formats as a number, so both `port(2222)` and
/// `port("2222")` work; the value is parsed and range-checked by [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct OptionsBuilder {
    host: Option<String>,
    user: Option<String>,
    password: Option<Secret>,
    port: Option<String>,
    timeout: Option<String>,
    key_files: Vec<PathBuf>,
    keepalive: Option<bool>,
    keepalive_interval: Option<String>,
    bastion_host: Option<String>,
    bastion_user: Option<String>,
    bastion_port: Option<String>,
    bastion_password: Option<Secret>,
    proxy_command: Option<String>,
    mock: bool,
    known_hosts: Option<KnownHosts>,
    control_dir: Option<PathBuf>,
    config_file: Option<PathBuf>,
    ssh_binary: Option<PathBuf>,
}

impl OptionsBuilder {
    /// A builder seeded from `JUNIPER_*` environment variables.
    pub fn from_env() -> Self {
        let mut b = Self::default();
        b.env_defaults(|name| std::env::var(name).ok());
        b
    }

    /// Fill every option that has not been set explicitly from `lookup`.
    ///
    /// `lookup` receives full variable names (`JUNIPER_HOST`, ...). Empty values count as unset.
    pub fn env_defaults<F>(&mut self, lookup: F) -> &mut Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, key)).filter(|value| !value.is_empty())
        };

        fill(&mut self.host, || get("HOST"));
        fill(&mut self.user, || get("USER"));
        fill(&mut self.password, || get("PASSWORD").map(Secret));
        fill(&mut self.port, || get("PORT"));
        fill(&mut self.timeout, || get("TIMEOUT"));
        fill(&mut self.bastion_host, || get("BASTION_HOST"));
        fill(&mut self.bastion_user, || get("BASTION_USER"));
        fill(&mut self.bastion_port, || get("BASTION_PORT"));
        fill(&mut self.bastion_password, || get("BASTION_PASSWORD").map(Secret));
        fill(&mut self.proxy_command, || get("PROXY_COMMAND"));
        self
    }

    /// Device host name or address. Required.
    pub fn host(&mut self, host: impl Into<String>) -> &mut Self {
        self.host = Some(host.into());
        self
    }

    /// Login user. Required.
    pub fn user(&mut self, user: impl Into<String>) -> &mut Self {
        self.user = Some(user.into());
        self
    }

    /// Device password.
    pub fn password(&mut self, password: impl Into<Secret>) -> &mut Self {
        self.password = Some(password.into());
        self
    }

    /// Device SSH port (`ssh -p`).
    ///
    /// Defaults to 22.
    pub fn port(&mut self, port: impl ToString) -> &mut Self {
        self.port = Some(port.to_string());
        self
    }

    /// Connection and per-command timeout, in seconds.
    ///
    /// Defaults to 30.
    pub fn timeout(&mut self, seconds: impl ToString) -> &mut Self {
        self.timeout = Some(seconds.to_string());
        self
    }

    /// Add an identity file (`ssh -i`). May be called repeatedly.
    pub fn key_file(&mut self, p: impl AsRef<Path>) -> &mut Self {
        self.key_files.push(p.as_ref().to_path_buf());
        self
    }

    /// Enable or disable keepalives (`ssh -o ServerAliveInterval`).
    ///
    /// Defaults to enabled.
    pub fn keepalive(&mut self, enabled: bool) -> &mut Self {
        self.keepalive = Some(enabled);
        self
    }

    /// Keepalive interval, in seconds.
    ///
    /// Defaults to 60.
    pub fn keepalive_interval(&mut self, seconds: impl ToString) -> &mut Self {
        self.keepalive_interval = Some(seconds.to_string());
        self
    }

    /// Reach the device through this jump host.
    pub fn bastion_host(&mut self, host: impl Into<String>) -> &mut Self {
        self.bastion_host = Some(host.into());
        self
    }

    /// User on the jump host. Defaults to the device user.
    pub fn bastion_user(&mut self, user: impl Into<String>) -> &mut Self {
        self.bastion_user = Some(user.into());
        self
    }

    /// SSH port of the jump host. Defaults to 22.
    pub fn bastion_port(&mut self, port: impl ToString) -> &mut Self {
        self.bastion_port = Some(port.to_string());
        self
    }

    /// Password on the jump host. Defaults to the device password.
    pub fn bastion_password(&mut self, password: impl Into<Secret>) -> &mut Self {
        self.bastion_password = Some(password.into());
        self
    }

    /// A raw `ProxyCommand`, e.g. `ssh jump -W %h:%p`.
    ///
    /// The string is handed to ssh unchanged. It cannot be combined with
    /// [`bastion_host`](Self::bastion_host).
    pub fn proxy_command(&mut self, command: impl Into<String>) -> &mut Self {
        self.proxy_command = Some(command.into());
        self
    }

    /// Answer commands from the canned-response catalog instead of a device.
    pub fn mock(&mut self, mock: bool) -> &mut Self {
        self.mock = mock;
        self
    }

    /// See [`KnownHosts`].
    ///
    /// Default `KnownHosts::Add`.
    pub fn known_hosts_check(&mut self, k: KnownHosts) -> &mut Self {
        self.known_hosts = Some(k);
        self
    }

    /// Set the directory in which the temporary directories holding the control socket and
    /// askpass helpers are created.
    pub fn control_directory(&mut self, p: impl AsRef<Path>) -> &mut Self {
        self.control_dir = Some(p.as_ref().to_path_buf());
        self
    }

    /// Set an alternative per-user configuration file (`ssh -F`).
    pub fn config_file(&mut self, p: impl AsRef<Path>) -> &mut Self {
        self.config_file = Some(p.as_ref().to_path_buf());
        self
    }

    /// Use a different ssh client binary. Defaults to `ssh` on the `PATH`.
    pub fn ssh_binary(&mut self, p: impl AsRef<Path>) -> &mut Self {
        self.ssh_binary = Some(p.as_ref().to_path_buf());
        self
    }

    /// Validate and normalize.
    ///
    /// No process is spawned and no file is touched; every failure is an
    /// [`Error::InvalidOption`] naming the offending field.
    pub fn build(&self) -> Result<ConnectionOptions, Error> {
        if self.bastion_host.is_some() && self.proxy_command.is_some() {
            return Err(Error::invalid(
                "proxy_command",
                "cannot be combined with bastion_host; pick one way to reach the device",
            ));
        }

        let host = required("host", &self.host)?;
        let user = required("user", &self.user)?;

        let port = parse_port("port", self.port.as_deref())?;
        let timeout = positive("timeout", self.timeout.as_deref(), DEFAULT_TIMEOUT)?;
        let keepalive_interval = positive(
            "keepalive_interval",
            self.keepalive_interval.as_deref(),
            DEFAULT_KEEPALIVE_INTERVAL,
        )?;

        let bastion = match self.bastion_host.as_deref().map(str::trim) {
            None => {
                // still reject garbage so a typo does not go unnoticed
                parse_port("bastion_port", self.bastion_port.as_deref())?;
                None
            }
            Some("") => return Err(Error::invalid("bastion_host", "must not be empty")),
            Some(bastion_host) => {
                let bastion_user = match self.bastion_user.as_deref().map(str::trim) {
                    Some("") => return Err(Error::invalid("bastion_user", "must not be empty")),
                    Some(u) => u.to_owned(),
                    None => user.clone(),
                };
                Some(Bastion {
                    host: bastion_host.to_owned(),
                    user: bastion_user,
                    port: parse_port("bastion_port", self.bastion_port.as_deref())?,
                    password: self
                        .bastion_password
                        .clone()
                        .or_else(|| self.password.clone()),
                })
            }
        };

        let proxy_command = match self.proxy_command.as_deref().map(str::trim) {
            Some("") => return Err(Error::invalid("proxy_command", "must not be empty")),
            other => other.map(str::to_owned),
        };

        Ok(ConnectionOptions {
            host,
            user,
            password: self.password.clone(),
            port,
            timeout: Duration::from_secs(timeout),
            key_files: self.key_files.clone(),
            keepalive: self.keepalive.unwrap_or(true),
            keepalive_interval: Duration::from_secs(keepalive_interval),
            bastion,
            proxy_command,
            mock: self.mock,
            known_hosts: self.known_hosts.clone().unwrap_or(KnownHosts::Add),
            control_dir: self.control_dir.clone(),
            config_file: self.config_file.clone(),
            ssh_binary: self.ssh_binary.clone().unwrap_or_else(|| PathBuf::from("ssh")),
        })
    }
}

fn fill<T>(slot: &mut Option<T>, f: impl FnOnce() -> Option<T>) {
    if slot.is_none() {
        *slot = f();
    }
}

fn required(field: &'static str, value: &Option<String>) -> Result<String, Error> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_owned()),
        Some(_) => Err(Error::invalid(field, "must not be empty")),
        None => Err(Error::invalid(field, "is required")),
    }
}

fn number<T: FromStr>(field: &'static str, raw: &str) -> Result<T, Error> {
    raw.trim()
        .parse()
        .map_err(|_| Error::invalid(field, format!("{:?} is not a number", raw)))
}

fn parse_port(field: &'static str, raw: Option<&str>) -> Result<u16, Error> {
    let raw = match raw {
        Some(raw) => raw,
        None => return Ok(DEFAULT_PORT),
    };
    let value: i64 = number(field, raw)?;
    if (1..=65535).contains(&value) {
        Ok(value as u16)
    } else {
        Err(Error::invalid(
            field,
            format!("{} is not between 1 and 65535", value),
        ))
    }
}

fn positive(field: &'static str, raw: Option<&str>, default: u64) -> Result<u64, Error> {
    let raw = match raw {
        Some(raw) => raw,
        None => return Ok(default),
    };
    let value: i64 = number(field, raw)?;
    if value > 0 {
        Ok(value as u64)
    } else {
        Err(Error::invalid(field, format!("{} must be positive", value)))
    }
}
