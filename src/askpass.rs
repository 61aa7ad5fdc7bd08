//! Askpass helpers.
//!
//! `ssh` never reads a password from a pipe. When a password is configured we write a tiny
//! program that prints it, and point the client at it with `SSH_ASKPASS`. The helper lives in
//! its own temporary directory and holds exactly one secret.
//!
//! The variables are set on the spawned `ssh` process only, never on our own environment, so
//! concurrent connections cannot see each other's helpers.

use super::{escape, Error, Secret};

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempDir};
use tokio::process;

#[derive(Debug)]
pub(crate) struct Askpass {
    dir: TempDir,
    program: PathBuf,
}

impl Askpass {
    /// Write a helper printing `secret` into a fresh directory under `in_dir`.
    pub(crate) fn provision(secret: &Secret, in_dir: &Path) -> Result<Self, Error> {
        fs::create_dir_all(in_dir).map_err(Error::Askpass)?;
        let dir = Builder::new()
            .prefix(".junos-askpass")
            .tempdir_in(in_dir)
            .map_err(Error::Askpass)?;

        let program = write_helper(dir.path(), secret.expose()).map_err(Error::Askpass)?;
        tracing::debug!(program = %program.display(), "provisioned askpass helper");

        Ok(Self { dir, program })
    }

    /// The path the ssh client should run.
    pub(crate) fn program(&self) -> &Path {
        &self.program
    }

    /// Environment for a process that should authenticate through this helper.
    ///
    /// Clients older than 8.4 ignore `SSH_ASKPASS_REQUIRE` and only consult the helper when
    /// `DISPLAY` is set, so a placeholder is added if the caller has none.
    pub(crate) fn envs(&self) -> Vec<(&'static str, OsString)> {
        let mut envs = vec![
            ("SSH_ASKPASS", self.program().as_os_str().to_owned()),
            ("SSH_ASKPASS_REQUIRE", OsString::from("force")),
        ];
        if std::env::var_os("DISPLAY").is_none() {
            envs.push(("DISPLAY", OsString::from("none")));
        }
        envs
    }

    pub(crate) fn apply(&self, cmd: &mut process::Command) {
        cmd.envs(self.envs());
    }

    /// The same environment as [`envs`](Self::envs), rendered as `env` arguments for a
    /// POSIX shell command line.
    pub(crate) fn shell_prefix(&self) -> String {
        let mut prefix = String::from("env");
        for (key, value) in self.envs() {
            let value = value.to_string_lossy();
            prefix.push(' ');
            prefix.push_str(key);
            prefix.push('=');
            prefix.push_str(&escape::posix(&value));
        }
        prefix
    }

    /// Remove the helper, reporting any error.
    pub(crate) fn close(self) -> Result<(), Error> {
        self.dir.close().map_err(Error::Cleanup)
    }
}

fn posix_script(secret: &str) -> String {
    format!("#!/bin/sh\nprintf '%s\\n' {}\n", escape::posix(secret))
}

#[cfg_attr(not(windows), allow(dead_code))]
fn powershell_script(secret: &str) -> String {
    format!("Write-Output {}\r\n", escape::powershell(secret))
}

#[cfg_attr(not(windows), allow(dead_code))]
fn batch_trampoline(script: &Path) -> String {
    format!(
        "@echo off\r\npowershell.exe -NoProfile -NonInteractive -ExecutionPolicy Bypass -File \"{}\"\r\n",
        script.display()
    )
}

fn create(path: &Path, contents: &str) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

#[cfg(unix)]
fn write_helper(dir: &Path, secret: &str) -> io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("askpass.sh");
    create(&path, &posix_script(secret))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o700))?;
    Ok(path)
}

#[cfg(not(unix))]
fn write_helper(dir: &Path, secret: &str) -> io::Result<PathBuf> {
    let script = dir.join("askpass.ps1");
    create(&script, &powershell_script(secret))?;

    let trampoline = dir.join("askpass.bat");
    create(&trampoline, &batch_trampoline(&script))?;
    Ok(trampoline)
}
