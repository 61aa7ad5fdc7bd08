//! Reaching the device through a bastion or a user-supplied proxy command.

use super::askpass::Askpass;
use super::{escape, ConnectionOptions, Error};

use std::borrow::Cow;
use std::env;
use std::path::{Path, PathBuf};

use tokio::process;

/// How a password-protected bastion hop is authenticated.
///
/// Chosen once per [`Connection`](crate::Connection), usually with [`BastionStrategy::detect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BastionStrategy {
    /// A nested `ssh -W` process fed by its own askpass helper.
    Askpass,
    /// The PuTTY command-line client at the given path, which takes the password as an
    /// argument (`plink -pw`).
    NativeClient(PathBuf),
}

impl BastionStrategy {
    /// Use the native client on Windows hosts that have `plink` on the `PATH`, and askpass
    /// everywhere else.
    pub fn detect() -> Self {
        if cfg!(windows) {
            if let Some(plink) = find_program("plink") {
                tracing::debug!(plink = %plink.display(), "using native client for bastion hops");
                return BastionStrategy::NativeClient(plink);
            }
        }
        BastionStrategy::Askpass
    }
}

impl Default for BastionStrategy {
    fn default() -> Self {
        Self::detect()
    }
}

fn find_program(name: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .flat_map(|dir| {
            let plain = dir.join(name);
            let exe = dir.join(format!("{}.exe", name));
            [plain, exe]
        })
        .find(|candidate| candidate.is_file())
}

/// The bastion hop of a [`ProxyPlan::Jump`].
#[derive(Debug)]
pub(crate) struct JumpHost {
    address: String,
    host: String,
    user: String,
    port: u16,
    key_files: Vec<PathBuf>,
    askpass: Option<Askpass>,
}

impl JumpHost {
    /// The `ssh -W` command that carries the session through the bastion.
    fn proxy_command(&self, options: &ConnectionOptions) -> String {
        let mut parts: Vec<String> = Vec::new();

        if cfg!(unix) {
            if let Some(ref askpass) = self.askpass {
                parts.push(askpass.shell_prefix().replace('%', "%%"));
            }
        }

        parts.push(token(&options.ssh_binary().to_string_lossy()).into_owned());
        parts.push("-W %h:%p".to_owned());
        parts.push(format!("-l {}", token(&self.user)));
        parts.push(format!("-p {}", self.port));
        parts.push(format!("-o {}", options.known_hosts().as_option()));

        if self.askpass.is_some() {
            parts.push("-o NumberOfPasswordPrompts=1".to_owned());
        } else {
            parts.push("-o BatchMode=yes".to_owned());
        }

        if !self.key_files.is_empty() {
            parts.push("-o IdentitiesOnly=yes".to_owned());
        }
        for key in &self.key_files {
            parts.push(format!("-i {}", token(&key.to_string_lossy())));
        }

        parts.push(token(&self.host).into_owned());
        parts.join(" ")
    }
}

/// How the master connection reaches the device.
///
/// Derived afresh for every connection attempt and dropped once the master is up, which also
/// removes any askpass helper it holds.
#[derive(Debug)]
pub(crate) enum ProxyPlan {
    Direct,
    Jump(JumpHost),
    Command(String),
}

impl ProxyPlan {
    /// The hop, as reported in errors and logs. Never carries a credential.
    pub(crate) fn via(&self) -> Option<String> {
        match self {
            ProxyPlan::Direct => None,
            ProxyPlan::Jump(jump) => Some(jump.address.clone()),
            ProxyPlan::Command(command) => Some(crate::redact::redact(command).into_owned()),
        }
    }

    /// Add the proxy arguments (and, where needed, environment) to the master invocation.
    ///
    /// `target_askpass` tells whether the master already authenticates through a helper of its
    /// own.
    pub(crate) fn apply(
        &self,
        cmd: &mut process::Command,
        options: &ConnectionOptions,
        target_askpass: bool,
    ) {
        match self {
            ProxyPlan::Direct => {}
            ProxyPlan::Jump(jump) if jump.askpass.is_none() && jump.key_files.is_empty() => {
                cmd.arg("-J").arg(&jump.address);
            }
            ProxyPlan::Jump(jump) => {
                if !cfg!(unix) && !target_askpass {
                    // the hop inherits the master's environment
                    if let Some(ref askpass) = jump.askpass {
                        askpass.apply(cmd);
                    }
                }
                cmd.arg("-o")
                    .arg(format!("ProxyCommand={}", jump.proxy_command(options)));
            }
            ProxyPlan::Command(command) => {
                cmd.arg("-o").arg(format!("ProxyCommand={}", command));
            }
        }
    }
}

/// Turns [`ConnectionOptions`] into a [`ProxyPlan`].
#[derive(Debug, Clone, Default)]
pub struct ProxyConfigurator {
    strategy: BastionStrategy,
}

impl ProxyConfigurator {
    /// A configurator using the given bastion strategy.
    pub fn new(strategy: BastionStrategy) -> Self {
        Self { strategy }
    }

    /// The strategy in use.
    pub fn strategy(&self) -> &BastionStrategy {
        &self.strategy
    }

    /// Derive the plan for one connection attempt.
    ///
    /// Askpass helpers for the bastion are provisioned under `askpass_dir`.
    pub(crate) fn configure(
        &self,
        options: &ConnectionOptions,
        askpass_dir: &Path,
    ) -> Result<ProxyPlan, Error> {
        if let Some(raw) = options.proxy_command() {
            tracing::debug!(
                proxy = %crate::redact::redact(raw),
                "using configured proxy command"
            );
            return Ok(ProxyPlan::Command(raw.to_owned()));
        }

        let bastion = match options.bastion() {
            Some(bastion) => bastion,
            None => return Ok(ProxyPlan::Direct),
        };

        if let (Some(password), BastionStrategy::NativeClient(plink)) =
            (bastion.password(), &self.strategy)
        {
            let mut command = format!(
                "{} -batch -ssh -pw {} -P {}",
                token(&plink.to_string_lossy()),
                token(password.expose()),
                bastion.port()
            );
            for key in options.key_files() {
                command.push_str(" -i ");
                command.push_str(&token(&key.to_string_lossy()));
            }
            command.push_str(&format!(
                " {}@{} -nc %h:%p",
                token(bastion.user()),
                token(bastion.host())
            ));

            let scrubbed = crate::redact::scrub(&command, password.expose());
            let shown = crate::redact::redact(&scrubbed);
            tracing::debug!(proxy = %shown, "bastion hop through native client");
            return Ok(ProxyPlan::Command(command));
        }

        let askpass = match bastion.password() {
            Some(password) => {
                if !cfg!(unix) && options.password().map_or(false, |p| p != password) {
                    tracing::warn!(
                        bastion = %bastion.address(),
                        "bastion and device passwords differ but only one askpass helper can \
                         be used without plink; the device password is offered to both"
                    );
                }
                Some(Askpass::provision(password, askpass_dir)?)
            }
            None => None,
        };

        tracing::debug!(
            bastion = %bastion.address(),
            askpass = askpass.is_some(),
            "bastion hop through ssh"
        );

        Ok(ProxyPlan::Jump(JumpHost {
            address: bastion.address(),
            host: bastion.host().to_owned(),
            user: bastion.user().to_owned(),
            port: bastion.port(),
            key_files: options.key_files().to_vec(),
            askpass,
        }))
    }
}

/// Quote one word of a `ProxyCommand` for the platform shell and protect it from ssh's own
/// `%` token expansion.
fn token(s: &str) -> Cow<'_, str> {
    let quoted = if cfg!(unix) {
        escape::posix(s)
    } else {
        escape::windows(s)
    };
    if quoted.contains('%') {
        Cow::Owned(quoted.replace('%', "%%"))
    } else {
        quoted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(cmd: &process::Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn options(f: impl FnOnce(&mut crate::OptionsBuilder)) -> ConnectionOptions {
        let mut b = ConnectionOptions::builder();
        b.host("r1").user("admin");
        f(&mut b);
        b.build().unwrap()
    }

    #[test]
    fn direct() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = ProxyConfigurator::new(BastionStrategy::Askpass)
            .configure(&options(|_| {}), tmp.path())
            .unwrap();
        assert!(matches!(plan, ProxyPlan::Direct));
        assert_eq!(plan.via(), None);
    }

    #[test]
    fn raw_proxy_command_passes_through() {
        let tmp = tempfile::tempdir().unwrap();
        let opts = options(|b| {
            b.proxy_command("ssh jump -W %h:%p").key_file("/keys/id_device");
        });
        let plan = ProxyConfigurator::new(BastionStrategy::Askpass)
            .configure(&opts, tmp.path())
            .unwrap();

        let mut cmd = process::Command::new("ssh");
        plan.apply(&mut cmd, &opts, false);
        assert_eq!(args(&cmd), ["-o", "ProxyCommand=ssh jump -W %h:%p"]);
    }

    #[test]
    fn jump_without_secrets_uses_dash_j() {
        let tmp = tempfile::tempdir().unwrap();
        let opts = options(|b| {
            b.bastion_host("jump").bastion_user("ops").bastion_port(2200);
        });
        let plan = ProxyConfigurator::new(BastionStrategy::Askpass)
            .configure(&opts, tmp.path())
            .unwrap();
        assert_eq!(plan.via().as_deref(), Some("ops@jump:2200"));

        let mut cmd = process::Command::new("ssh");
        plan.apply(&mut cmd, &opts, false);
        assert_eq!(args(&cmd), ["-J", "ops@jump:2200"]);
    }

    #[test]
    fn jump_with_keys_uses_explicit_hop() {
        let tmp = tempfile::tempdir().unwrap();
        let opts = options(|b| {
            b.bastion_host("jump").key_file("/keys/id_ed25519");
        });
        let plan = ProxyConfigurator::new(BastionStrategy::Askpass)
            .configure(&opts, tmp.path())
            .unwrap();
        assert_eq!(plan.via().as_deref(), Some("admin@jump"));

        let mut cmd = process::Command::new("ssh");
        plan.apply(&mut cmd, &opts, false);
        let args = args(&cmd);
        assert_eq!(args[0], "-o");
        assert!(args[1].starts_with("ProxyCommand=ssh -W %h:%p -l admin -p 22"));
        assert!(args[1].contains("-o BatchMode=yes"));
        assert!(args[1].contains("-i /keys/id_ed25519"));
        assert!(args[1].ends_with(" jump"));
    }

    #[cfg(unix)]
    #[test]
    fn bastion_secret_is_scoped_to_the_hop() {
        let tmp = tempfile::tempdir().unwrap();
        let opts = options(|b| {
            b.password("device-pw")
                .bastion_host("jump")
                .bastion_password("bastion-pw");
        });
        let plan = ProxyConfigurator::new(BastionStrategy::Askpass)
            .configure(&opts, tmp.path())
            .unwrap();

        let mut cmd = process::Command::new("ssh");
        plan.apply(&mut cmd, &opts, true);
        let args = args(&cmd);
        assert!(args[1].starts_with("ProxyCommand=env SSH_ASKPASS="));
        assert!(args[1].contains("-o NumberOfPasswordPrompts=1"));
        assert!(!args[1].contains("bastion-pw"));
        assert!(!args[1].contains("device-pw"));
        // nothing leaks into the master's own environment
        assert_eq!(cmd.as_std().get_envs().count(), 0);

        match plan {
            ProxyPlan::Jump(jump) => assert!(jump.askpass.is_some()),
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn native_client_embeds_escaped_password() {
        let tmp = tempfile::tempdir().unwrap();
        let opts = options(|b| {
            b.bastion_host("jump")
                .bastion_user("ops")
                .bastion_password("p@ss word");
        });
        let plan = ProxyConfigurator::new(BastionStrategy::NativeClient("plink".into()))
            .configure(&opts, tmp.path())
            .unwrap();

        let command = match plan {
            ProxyPlan::Command(ref c) => c.clone(),
            ref other => panic!("unexpected plan {:?}", other),
        };
        assert!(command.starts_with("plink -batch -ssh -pw "));
        assert!(command.contains(&*token("p@ss word")));
        assert!(command.ends_with("-P 22 ops@jump -nc %h:%p"));

        let via = plan.via().unwrap();
        assert!(!via.contains("p@ss"));
    }

    #[cfg(unix)]
    #[test]
    fn percent_in_askpass_path_survives_token_expansion() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("50%off");
        std::fs::create_dir(&dir).unwrap();
        let opts = options(|b| {
            b.bastion_host("jump").bastion_password("bastion-pw");
        });
        let plan = ProxyConfigurator::new(BastionStrategy::Askpass)
            .configure(&opts, &dir)
            .unwrap();

        let mut cmd = process::Command::new("ssh");
        plan.apply(&mut cmd, &opts, false);
        let args = args(&cmd);
        assert!(args[1].contains("50%%off"), "{}", args[1]);
        assert!(!args[1].contains("50%off"), "{}", args[1]);
        assert!(args[1].contains("-W %h:%p"));
    }

    #[test]
    fn native_client_passes_key_files_before_the_hop() {
        let tmp = tempfile::tempdir().unwrap();
        let opts = options(|b| {
            b.bastion_host("jump")
                .bastion_user("ops")
                .bastion_password("pw")
                .key_file("/keys/id_ed25519")
                .key_file("/keys/id_rsa");
        });
        let plan = ProxyConfigurator::new(BastionStrategy::NativeClient("plink".into()))
            .configure(&opts, tmp.path())
            .unwrap();

        match plan {
            ProxyPlan::Command(ref command) => assert_eq!(
                command,
                "plink -batch -ssh -pw pw -P 22 -i /keys/id_ed25519 -i /keys/id_rsa ops@jump -nc %h:%p"
            ),
            ref other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn native_client_without_password_falls_back_to_ssh() {
        let tmp = tempfile::tempdir().unwrap();
        let opts = options(|b| {
            b.bastion_host("jump");
        });
        let plan = ProxyConfigurator::new(BastionStrategy::NativeClient("plink".into()))
            .configure(&opts, tmp.path())
            .unwrap();
        assert!(matches!(plan, ProxyPlan::Jump(_)));
    }

    #[test]
    fn percent_is_doubled() {
        assert_eq!(token("50%off"), if cfg!(unix) { "'50%%off'" } else { "50%%off" });
        assert_eq!(token("plain"), "plain");
    }
}
