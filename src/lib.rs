//! Query Juniper Junos devices through OpenSSH.
//!
//! This crate wraps the OpenSSH remote login client (`ssh` on most machines) and runs Junos CLI
//! commands on a device, either directly or through a bastion host. Since all commands go
//! through the `ssh` binary, your existing configuration (e.g., in `.ssh/config`) keeps working.
//!
//! Each [`Connection`] owns one ssh [`ControlMaster`]. Authentication happens once, when the
//! master starts, and every command after that is multiplexed over its control socket. Once the
//! master is up the CLI is probed with `show system uptime` and tuned for automation (no paging,
//! no line wrapping, no completion on space).
//!
//! # Authentication
//!
//! Keys are passed with `-i` and ssh is told to use only those. Passwords are handed to ssh
//! through a short-lived askpass helper: a script holding one secret, written to a private
//! temporary directory, named in `SSH_ASKPASS` on the ssh process alone, and deleted as soon as
//! the master has authenticated. Passwords never appear on a command line or in a log.
//!
//! # Bastions
//!
//! With [`OptionsBuilder::bastion_host`] the device is reached through a jump host. Without
//! secrets this is plain `ssh -J`; with a bastion password or key files the hop becomes an
//! explicit `ProxyCommand` running a nested `ssh -W` with its own askpass helper. On Windows
//! hosts with PuTTY's `plink` on the `PATH` the hop runs through `plink` instead (see
//! [`BastionStrategy`]). A raw [`proxy_command`](OptionsBuilder::proxy_command) is passed to ssh
//! untouched.
//!
//! # Errors
//!
//! Bad options and unsafe command text are rejected with an [`Error`] before any process is
//! spawned. Everything that happens after that is reported in the [`CommandResult`]: a Junos
//! `error:` line gives exit status 1, a lost connection gives 1 with the reason in `stderr`, and
//! a timeout gives [`TIMEOUT_STATUS`].
//!
//! # Mock mode
//!
//! With [`OptionsBuilder::mock`] no process is ever spawned and commands are answered from a
//! [`CannedResponses`] catalog, which is handy for tests.
//!
//! # Examples
//!
//! ```rust,no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), junos_ssh::Error> {
//! use junos_ssh::{Connection, ConnectionOptions};
//!
//! let options = ConnectionOptions::builder()
//!     .host("r1.lab.example.net")
//!     .user("netops")
//!     .bastion_host("jump.example.net")
//!     .build()?;
//!
//! let mut device = Connection::open(options).await?;
//! let version = device.execute("show version").await?;
//! assert!(version.success());
//! eprintln!("{}", version.stdout);
//!
//! let identity = device.identity().await;
//! eprintln!("{} runs Junos {}", identity.hostname, identity.version);
//!
//! device.close().await?;
//! # Ok(()) }
//! ```
//!
//!   [`ControlMaster`]: https://en.wikibooks.org/wiki/OpenSSH/Cookbook/Multiplexing

#![warn(
    missing_docs,
    missing_debug_implementations,
    rustdoc::broken_intra_doc_links,
    rust_2018_idioms,
    unreachable_pub
)]

mod askpass;
mod builder;
mod escape;
mod session;

mod error;
pub use error::Error;

mod options;
pub use options::{Bastion, ConnectionOptions, OptionsBuilder, Secret, ENV_PREFIX};

pub use builder::KnownHosts;

mod proxy;
pub use proxy::{BastionStrategy, ProxyConfigurator};

mod exec;
pub use exec::{classify, clean_output, sanitize_command, CommandResult, TIMEOUT_STATUS};

mod platform;
pub use platform::{
    architecture_for, parse_version, PlatformInfo, DEFAULT_ARCHITECTURE, PLATFORM_FAMILIES,
    PLATFORM_NAME,
};

mod redact;
pub use redact::redact;

mod canned;
pub use canned::CannedResponses;

mod path;
pub use path::PathHandle;

mod connection;
pub use connection::{Connection, SessionState};
