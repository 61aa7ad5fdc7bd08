use super::CommandResult;

use std::collections::HashMap;

const SHOW_VERSION: &str = "\
Hostname: r1
Model: mx204
Junos: 21.4R3-S3.4
JUNOS OS Kernel 64-bit  [20230314.1d5c0c6_builder_stable_12_214]
JUNOS OS libs [20230314.1d5c0c6_builder_stable_12_214]
JUNOS OS runtime [20230314.1d5c0c6_builder_stable_12_214]
JUNOS py base [20230401.015112_builder_junos_214_r3_s3]
JUNOS Routing Engine Software Suite [21.4R3-S3.4]";

const SHOW_CHASSIS_HARDWARE: &str = "\
Hardware inventory:
Item             Version  Part number  Serial number     Description
Chassis                                JN11F4A9DAFA      MX204
Midplane         REV 25   750-070866   ACRB9054          MX204
Routing Engine 0          BUILTIN      BUILTIN           RE-S-1600x8
FPC 0                     BUILTIN      BUILTIN           MPC
  PIC 0                   BUILTIN      BUILTIN           4XQSFP28 PIC
Power Supply 0   REV 01   740-073765   1EDN9230165       AC AFO 650W PSU
Fan Tray 0       REV 03   760-093456   ACBD1235          Fan Tray, Front to Back Airflow - AFO";

const SHOW_INTERFACES_TERSE: &str = "\
Interface               Admin Link Proto    Local                 Remote
et-0/0/0                up    up
et-0/0/0.0              up    up   inet     10.0.0.1/31
                                   inet6    fe80::5668:a3ff:fe1e:3c00/64
et-0/0/1                up    down
xe-0/1/0                up    up
xe-0/1/0.0              up    up   inet     192.0.2.1/24
fxp0                    up    up
fxp0.0                  up    up   inet     198.51.100.10/24
lo0                     up    up
lo0.0                   up    up   inet     10.255.0.1          --> 0/0
                                   inet6    fe80::5668:a30f:fc1e:3c00";

const SHOW_CONFIGURATION: &str = "\
## Last commit: 2024-01-15 09:12:44 UTC by admin
version 21.4R3-S3.4;
system {
    host-name r1;
    services {
        ssh {
            root-login deny;
        }
        netconf {
            ssh;
        }
    }
    syslog {
        file messages {
            any notice;
        }
    }
}
interfaces {
    et-0/0/0 {
        unit 0 {
            family inet {
                address 10.0.0.1/31;
            }
        }
    }
    lo0 {
        unit 0 {
            family inet {
                address 10.255.0.1/32;
            }
        }
    }
}";

const SHOW_SYSTEM_UPTIME: &str = "\
Current time: 2024-01-15 10:00:00 UTC
Time Source:  NTP CLOCK
System booted: 2024-01-01 08:30:12 UTC (2w0d 01:29 ago)
Protocols started: 2024-01-01 08:32:40 UTC (2w0d 01:27 ago)
Last configured: 2024-01-15 09:12:44 UTC (00:47:16 ago) by admin
10:00AM  up 14 days,  1:30, 1 user, load averages: 0.31, 0.29, 0.27";

/// Recorded device output, used instead of a live session in mock mode.
///
/// Commands are matched after collapsing runs of whitespace. A command without an entry gets
/// the error Junos prints for an unknown command.
#[derive(Debug, Clone, Default)]
pub struct CannedResponses {
    responses: HashMap<String, String>,
}

impl CannedResponses {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Output recorded from an MX204 running Junos 21.4.
    pub fn junos_default() -> Self {
        let mut canned = Self::new();
        canned
            .insert("show version", SHOW_VERSION)
            .insert("show chassis hardware", SHOW_CHASSIS_HARDWARE)
            .insert("show interfaces terse", SHOW_INTERFACES_TERSE)
            .insert("show configuration", SHOW_CONFIGURATION)
            .insert("show system uptime", SHOW_SYSTEM_UPTIME);
        for tuning in crate::connection::CLI_TUNING {
            canned.insert(*tuning, "");
        }
        canned
    }

    /// Record `output` for `command`, replacing any earlier entry.
    pub fn insert(&mut self, command: impl AsRef<str>, output: impl Into<String>) -> &mut Self {
        self.responses.insert(normalize(command.as_ref()), output.into());
        self
    }

    /// The recorded output for `command`, if any.
    pub fn get(&self, command: &str) -> Option<&str> {
        self.responses.get(&normalize(command)).map(String::as_str)
    }

    pub(crate) fn respond(&self, command: &str) -> CommandResult {
        match self.get(command) {
            Some(output) => CommandResult::from_output(command, output.as_bytes(), b""),
            None => {
                let output = format!("error: syntax error, unknown command: {}", command.trim());
                CommandResult::from_output(command, output.as_bytes(), b"")
            }
        }
    }
}

fn normalize(command: &str) -> String {
    command.split_whitespace().collect::<Vec<_>>().join(" ")
}
