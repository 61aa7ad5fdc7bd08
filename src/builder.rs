use super::askpass::Askpass;
use super::proxy::{ProxyConfigurator, ProxyPlan};
use super::session::Session;
use super::{ConnectionOptions, Error};

use std::fs;
use std::io;
use std::path::Path;
use std::process::Stdio;

use tempfile::{Builder, TempDir};
use tokio::process;
use tokio::time::timeout;

/// Keepalive probes the server may miss before the master gives up.
const SERVER_ALIVE_COUNT_MAX: u32 = 3;

/// Starts the control master for one [`ConnectionOptions`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionBuilder<'a> {
    options: &'a ConnectionOptions,
    proxy: &'a ProxyConfigurator,
}

impl<'a> SessionBuilder<'a> {
    pub(crate) fn new(options: &'a ConnectionOptions, proxy: &'a ProxyConfigurator) -> Self {
        Self { options, proxy }
    }

    fn build_tempdir(&self) -> Result<TempDir, Error> {
        let socketdir = self.options.control_dir();
        fs::create_dir_all(&socketdir).map_err(Error::Master)?;

        Builder::new()
            .prefix(".ssh-connection")
            .tempdir_in(socketdir)
            .map_err(Error::Master)
    }

    /// The `ssh -M` invocation that starts the master.
    pub(crate) fn master_command(
        &self,
        dir: &Path,
        plan: &ProxyPlan,
        askpass: Option<&Askpass>,
    ) -> process::Command {
        let options = self.options;
        let mut init = process::Command::new(options.ssh_binary());

        init.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .arg("-E")
            .arg(dir.join("log"))
            .arg("-S")
            .arg(dir.join("master"))
            .arg("-M")
            .arg("-f")
            .arg("-N")
            .arg("-o")
            .arg("ControlPersist=yes")
            .arg("-o")
            .arg(options.known_hosts().as_option())
            .arg("-o")
            .arg(format!("ConnectTimeout={}", options.timeout().as_secs()));

        if askpass.is_some() {
            // ssh never consults askpass in batch mode
            init.arg("-o")
                .arg("BatchMode=no")
                .arg("-o")
                .arg("NumberOfPasswordPrompts=1");
        } else {
            init.arg("-o").arg("BatchMode=yes");
        }

        if let Some(interval) = options.keepalive() {
            init.arg("-o")
                .arg(format!("ServerAliveInterval={}", interval.as_secs()))
                .arg("-o")
                .arg(format!("ServerAliveCountMax={}", SERVER_ALIVE_COUNT_MAX));
        }

        init.arg("-p").arg(options.port().to_string());
        init.arg("-l").arg(options.user());

        if !options.key_files().is_empty() {
            // if the user gives keyfiles, _only_ use those
            init.arg("-o").arg("IdentitiesOnly=yes");
        }
        for k in options.key_files() {
            init.arg("-i").arg(k);
        }

        if let Some(config_file) = options.config_file() {
            init.arg("-F").arg(config_file);
        }

        plan.apply(&mut init, options, askpass.is_some());

        if let Some(askpass) = askpass {
            askpass.apply(&mut init);
        }

        init.arg(options.host());
        init
    }

    pub(crate) async fn just_connect(&self) -> Result<Session, Error> {
        let options = self.options;
        let dir = self.build_tempdir()?;

        let plan = self.proxy.configure(options, dir.path())?;
        let askpass = match options.password() {
            Some(password) => Some(Askpass::provision(password, dir.path())?),
            None => None,
        };

        let via = plan.via();
        let failed = |source: io::Error| Error::Connect {
            target: options.target(),
            via: via.clone(),
            source,
        };

        let mut init = self.master_command(dir.path(), &plan, askpass.as_ref());
        tracing::debug!(
            device = %options.target(),
            via = via.as_deref().unwrap_or("-"),
            password = askpass.is_some(),
            "starting control master"
        );

        // we spawn and immediately wait, because the process is supposed to fork once it has
        // authenticated.
        let mut child = init.spawn().map_err(Error::Ssh)?;
        let status = match timeout(options.timeout(), child.wait()).await {
            Ok(status) => status.map_err(&failed)?,
            Err(_) => {
                let _ = child.start_kill();
                return Err(failed(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "no session within {}s",
                        options.timeout().as_secs()
                    ),
                )));
            }
        };

        if !status.success() {
            let err = fs::read_to_string(dir.path().join("log")).unwrap_or_default();
            let err = if err.trim().is_empty() {
                format!("ssh exited with {}", status)
            } else {
                err
            };
            return Err(failed(Error::interpret_ssh_error(&err)));
        }

        // authentication is over; the helpers are no longer needed
        drop(plan);
        if let Some(askpass) = askpass {
            if let Err(err) = askpass.close() {
                tracing::warn!(error = %err, "could not remove askpass helper");
            }
        }

        tracing::info!(device = %options.target(), via = via.as_deref().unwrap_or("-"), "connected");
        Ok(Session::new(dir, options.host(), options.ssh_binary()))
    }
}

/// Specifies how the host's key fingerprint should be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnownHosts {
    /// The host's fingerprint must match what is in the known hosts file.
    ///
    /// If the host is not in the known hosts file, the connection is rejected.
    ///
    /// This corresponds to `ssh -o StrictHostKeyChecking=yes`.
    Strict,
    /// Strict, but if the host is not already in the known hosts file, it will be added.
    ///
    /// This corresponds to `ssh -o StrictHostKeyChecking=accept-new`.
    Add,
    /// Accept whatever key the server provides and add it to the known hosts file.
    ///
    /// This corresponds to `ssh -o StrictHostKeyChecking=no`.
    Accept,
}

impl KnownHosts {
    pub(crate) fn as_option(&self) -> &'static str {
        match *self {
            KnownHosts::Strict => "StrictHostKeyChecking=yes",
            KnownHosts::Add => "StrictHostKeyChecking=accept-new",
            KnownHosts::Accept => "StrictHostKeyChecking=no",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::BastionStrategy;
    use crate::OptionsBuilder;

    fn master_args(f: impl FnOnce(&mut OptionsBuilder)) -> (Vec<String>, Vec<String>) {
        let tmp = tempfile::tempdir().unwrap();
        let mut b = ConnectionOptions::builder();
        b.host("r1").user("admin").control_directory(tmp.path());
        f(&mut b);
        let options = b.build().unwrap();
        let proxy = ProxyConfigurator::new(BastionStrategy::Askpass);
        let builder = SessionBuilder::new(&options, &proxy);

        let plan = proxy.configure(&options, tmp.path()).unwrap();
        let askpass = options
            .password()
            .map(|p| Askpass::provision(p, tmp.path()).unwrap());
        let cmd = builder.master_command(tmp.path(), &plan, askpass.as_ref());

        let args = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let envs = cmd
            .as_std()
            .get_envs()
            .map(|(k, _)| k.to_string_lossy().into_owned())
            .collect();
        (args, envs)
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn key_only_stays_in_batch_mode() {
        let (args, envs) = master_args(|b| {
            b.key_file("/keys/id_ed25519").port(2222);
        });
        assert!(has_pair(&args, "-o", "BatchMode=yes"));
        assert!(has_pair(&args, "-o", "IdentitiesOnly=yes"));
        assert!(has_pair(&args, "-i", "/keys/id_ed25519"));
        assert!(has_pair(&args, "-p", "2222"));
        assert!(has_pair(&args, "-l", "admin"));
        assert!(has_pair(&args, "-o", "StrictHostKeyChecking=accept-new"));
        assert!(has_pair(&args, "-o", "ConnectTimeout=30"));
        assert!(has_pair(&args, "-o", "ServerAliveInterval=60"));
        assert!(has_pair(&args, "-o", "ServerAliveCountMax=3"));
        assert_eq!(args.last().map(String::as_str), Some("r1"));
        assert!(envs.is_empty());
    }

    #[test]
    fn password_uses_askpass() {
        let (args, envs) = master_args(|b| {
            b.password("s3cr3t").keepalive(false);
        });
        assert!(has_pair(&args, "-o", "BatchMode=no"));
        assert!(has_pair(&args, "-o", "NumberOfPasswordPrompts=1"));
        assert!(!args.iter().any(|a| a.contains("ServerAlive")));
        assert!(!args.iter().any(|a| a.contains("s3cr3t")));
        assert!(envs.iter().any(|k| k == "SSH_ASKPASS"));
        assert!(envs.iter().any(|k| k == "SSH_ASKPASS_REQUIRE"));
    }

    #[test]
    fn jump_and_config_file() {
        let (args, _) = master_args(|b| {
            b.bastion_host("jump")
                .config_file("/etc/junos/ssh_config")
                .known_hosts_check(KnownHosts::Strict);
        });
        assert!(has_pair(&args, "-J", "admin@jump"));
        assert!(has_pair(&args, "-F", "/etc/junos/ssh_config"));
        assert!(has_pair(&args, "-o", "StrictHostKeyChecking=yes"));
    }

    #[tokio::test]
    async fn missing_client_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let options = ConnectionOptions::builder()
            .host("r1")
            .user("admin")
            .control_directory(tmp.path())
            .ssh_binary(tmp.path().join("no-such-ssh"))
            .build()
            .unwrap();
        let proxy = ProxyConfigurator::new(BastionStrategy::Askpass);

        let err = SessionBuilder::new(&options, &proxy)
            .just_connect()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Ssh(_)), "{:?}", err);
        // the control directory was cleaned up
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
