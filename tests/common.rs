#![allow(dead_code)]

use junos_ssh::{ConnectionOptions, KnownHosts};

use once_cell::sync::Lazy;
use regex::Regex;

pub fn addr() -> String {
    std::env::var("TEST_HOST").unwrap_or("ssh://netops@127.0.0.1:2222".to_string())
}

#[derive(Default, Debug, PartialEq, Eq)]
pub struct UserHostPort<'a> {
    pub user: Option<&'a str>,
    pub host: &'a str,
    pub port: Option<&'a str>,
}

pub fn parse_user_host_port(s: &str) -> Option<UserHostPort<'_>> {
    static SSH_REGEX: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?x)^([[:alpha:]]+://)?((?P<user>.*?)@)?(?P<host>.*?)(:(?P<port>\d+))?$")
            .unwrap()
    });
    SSH_REGEX.captures(s).map(|cap| UserHostPort {
        user: cap.name("user").map(|m| m.as_str()),
        host: cap.name("host").map(|m| m.as_str()).unwrap_or(""),
        port: cap.name("port").map(|m| m.as_str()),
    })
}

/// Options for the device named by `TEST_HOST`, authenticating with `TEST_PASSWORD` when set.
pub fn device() -> ConnectionOptions {
    let addr = addr();
    let target = parse_user_host_port(&addr).unwrap();

    let mut b = ConnectionOptions::builder();
    b.host(target.host)
        .user(target.user.unwrap_or("netops"))
        .port(target.port.unwrap_or("22"))
        .timeout(15)
        .known_hosts_check(KnownHosts::Accept);
    if let Ok(password) = std::env::var("TEST_PASSWORD") {
        b.password(password);
    }
    b.build().unwrap()
}

pub fn mock() -> ConnectionOptions {
    ConnectionOptions::builder()
        .host("r1")
        .user("admin")
        .password("x")
        .mock(true)
        .build()
        .unwrap()
}
