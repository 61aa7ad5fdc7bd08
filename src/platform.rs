//! Working out what kind of Junos device is on the other end.
//!
//! Everything here is best-effort: a field that cannot be parsed falls back to what the
//! connection was configured with, and nothing raises.

use once_cell::sync::Lazy;
use regex::Regex;

/// Name under which this adapter registers.
pub const PLATFORM_NAME: &str = "juniper";

/// Platform families this adapter belongs to.
pub const PLATFORM_FAMILIES: &[&str] = &["network"];

/// Architecture reported when the model is unknown.
pub const DEFAULT_ARCHITECTURE: &str = "x86_64";

pub(crate) const SHOW_VERSION_XML: &str = "show version | display xml";
pub(crate) const SHOW_VERSION: &str = "show version";
pub(crate) const SHOW_CHASSIS_XML: &str = "show chassis hardware | display xml";
pub(crate) const SHOW_CHASSIS: &str = "show chassis hardware";

const ARCHITECTURES: &[(&str, &str)] = &[
    ("VSRX", "x86_64"),
    ("VMX", "x86_64"),
    ("SRX", "x86_64"),
    ("QFX", "x86_64"),
    ("PTX", "x86_64"),
    ("MX", "x86_64"),
    ("ACX", "arm64"),
    ("EX", "arm64"),
];

/// Identity of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    /// Host name the device reports, or the configured host.
    pub hostname: String,
    /// Hardware model, e.g. `mx204`.
    pub model: Option<String>,
    /// Junos release, or this crate's version when the device was not asked.
    pub version: String,
    /// Chassis serial number.
    pub serial_number: Option<String>,
    /// Processor family derived from the model.
    pub architecture: String,
    /// A stable identifier: the serial number when known, otherwise the configured host.
    pub identifier: String,
}

impl PlatformInfo {
    /// What we report without asking the device.
    pub(crate) fn fallback(host: &str) -> Self {
        Self {
            hostname: host.to_owned(),
            model: None,
            version: env!("CARGO_PKG_VERSION").to_owned(),
            serial_number: None,
            architecture: DEFAULT_ARCHITECTURE.to_owned(),
            identifier: host.to_owned(),
        }
    }

    pub(crate) fn from_observations(obs: &Observations, host: &str) -> Self {
        let mut info = Self::fallback(host);

        let version_xml = obs.version_xml.as_deref();
        let version_text = obs.version_text.as_deref();

        if let Some(hostname) = version_xml
            .and_then(|xml| xml_field(xml, "host-name"))
            .or_else(|| version_text.and_then(|t| labelled(&HOSTNAME, t)))
        {
            info.hostname = hostname;
        }

        info.model = version_xml
            .and_then(|xml| xml_field(xml, "product-model"))
            .or_else(|| version_text.and_then(|t| labelled(&MODEL, t)));

        if let Some(version) = version_xml
            .and_then(|xml| xml_field(xml, "junos-version"))
            .or_else(|| version_xml.and_then(parse_version))
            .or_else(|| version_text.and_then(parse_version))
        {
            info.version = version;
        }

        info.serial_number = obs
            .chassis_xml
            .as_deref()
            .and_then(|xml| xml_field(xml, "serial-number"))
            .or_else(|| obs.chassis_text.as_deref().and_then(|t| labelled(&CHASSIS, t)));

        if let Some(ref model) = info.model {
            info.architecture = architecture_for(model).to_owned();
        }
        if let Some(ref serial) = info.serial_number {
            info.identifier = serial.clone();
        }
        info
    }
}

/// Raw command output collected for detection. `None` when the command failed.
#[derive(Debug, Default)]
pub(crate) struct Observations {
    pub(crate) version_xml: Option<String>,
    pub(crate) version_text: Option<String>,
    pub(crate) chassis_xml: Option<String>,
    pub(crate) chassis_text: Option<String>,
}

static HOSTNAME: Lazy<Regex> = Lazy::new(|| label("Hostname:"));
static MODEL: Lazy<Regex> = Lazy::new(|| label("Model:"));
static CHASSIS: Lazy<Regex> = Lazy::new(|| label("Chassis"));

fn label(name: &str) -> Regex {
    Regex::new(&format!(r"(?m)^\s*{}\s+(\S+)", regex::escape(name))).expect("label pattern")
}

fn labelled(regex: &Regex, text: &str) -> Option<String> {
    regex.captures(text).map(|c| c[1].to_owned())
}

static VERSIONS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"Software Release \[([^\]\s]+)\]",
        r"(?im)^\s*(?:Junos|JUNOS OS):\s*(\S+)",
        r"\b(\d+\.\d+[\w.\-]*)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("version pattern"))
    .collect()
});

/// Pull a Junos release out of `show version` output.
///
/// Patterns are tried in order and the first hit wins: the bracketed `Software Release [..]`
/// form, then a `Junos:` / `JUNOS OS:` line, then any dotted number.
pub fn parse_version(text: &str) -> Option<String> {
    VERSIONS
        .iter()
        .find_map(|regex| regex.captures(text))
        .map(|c| c[1].to_owned())
}

/// Processor family for a model name. Unknown models map to [`DEFAULT_ARCHITECTURE`].
pub fn architecture_for(model: &str) -> &'static str {
    let model = model.trim().to_ascii_uppercase();
    ARCHITECTURES
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, arch)| *arch)
        .unwrap_or(DEFAULT_ARCHITECTURE)
}

/// Text of the first non-empty `<tag>` element.
fn xml_field(xml: &str, tag: &str) -> Option<String> {
    let tag = regex::escape(tag);
    let regex = Regex::new(&format!(r"<{0}(?:\s[^>]*)?>\s*([^<]*?)\s*</{0}>", tag)).ok()?;
    let found = regex
        .captures_iter(xml)
        .map(|c| c[1].to_owned())
        .find(|value| !value.is_empty());
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const VERSION_XML: &str = r#"<rpc-reply xmlns:junos="http://xml.juniper.net/junos/21.4R0/junos">
    <software-information>
        <host-name>r1-lab</host-name>
        <product-model>mx204</product-model>
        <product-name>mx204</product-name>
        <junos-version>21.4R3-S3.4</junos-version>
        <package-information>
            <name>junos</name>
            <comment>JUNOS Base OS boot [21.4R3-S3.4]</comment>
        </package-information>
    </software-information>
</rpc-reply>"#;

    const CHASSIS_XML: &str = r#"<rpc-reply>
    <chassis-inventory xmlns="http://xml.juniper.net/junos/21.4R0/junos-chassis">
        <chassis junos:style="inventory">
            <name>Chassis</name>
            <serial-number>JN11F4A9DAFA</serial-number>
            <description>MX204</description>
            <chassis-module>
                <name>Midplane</name>
                <serial-number>ACRB9054</serial-number>
            </chassis-module>
        </chassis>
    </chassis-inventory>
</rpc-reply>"#;

    #[test]
    fn version_precedence() {
        assert_eq!(
            parse_version("JUNOS Software Release [12.3R12.4]\nJunos: 21.4R3").as_deref(),
            Some("12.3R12.4")
        );
        assert_eq!(
            parse_version("Hostname: r1\nModel: mx204\nJunos: 21.4R3-S3.4\n").as_deref(),
            Some("21.4R3-S3.4")
        );
        assert_eq!(
            parse_version("JUNOS OS: 20.2R1.10").as_deref(),
            Some("20.2R1.10")
        );
        assert_eq!(parse_version("kernel 18.4R2-S5 built").as_deref(), Some("18.4R2-S5"));
        assert_eq!(parse_version("no numbers here"), None);
    }

    #[test]
    fn architectures() {
        assert_eq!(architecture_for("mx204"), "x86_64");
        assert_eq!(architecture_for("vSRX"), "x86_64");
        assert_eq!(architecture_for("qfx5120-48y"), "x86_64");
        assert_eq!(architecture_for("ex4300-48t"), "arm64");
        assert_eq!(architecture_for("acx710"), "arm64");
        assert_eq!(architecture_for("nfx250"), DEFAULT_ARCHITECTURE);
        assert_eq!(architecture_for(""), DEFAULT_ARCHITECTURE);
    }

    #[test]
    fn xml_fields() {
        assert_eq!(xml_field(VERSION_XML, "host-name").as_deref(), Some("r1-lab"));
        assert_eq!(xml_field(VERSION_XML, "product-model").as_deref(), Some("mx204"));
        assert_eq!(xml_field(CHASSIS_XML, "serial-number").as_deref(), Some("JN11F4A9DAFA"));
        assert_eq!(xml_field(CHASSIS_XML, "junos-version"), None);
    }

    #[test]
    fn from_xml() {
        let obs = Observations {
            version_xml: Some(VERSION_XML.into()),
            chassis_xml: Some(CHASSIS_XML.into()),
            ..Default::default()
        };
        let info = PlatformInfo::from_observations(&obs, "192.0.2.10");
        assert_eq!(
            info,
            PlatformInfo {
                hostname: "r1-lab".into(),
                model: Some("mx204".into()),
                version: "21.4R3-S3.4".into(),
                serial_number: Some("JN11F4A9DAFA".into()),
                architecture: "x86_64".into(),
                identifier: "JN11F4A9DAFA".into(),
            }
        );
    }

    #[test]
    fn from_text() {
        let obs = Observations {
            version_text: Some("Hostname: sw1\nModel: ex4300-48t\nJunos: 20.4R3.8\n".into()),
            chassis_text: Some(
                "Hardware inventory:\nItem             Version  Part number  Serial number     Description\nChassis                                PE3716290012      EX4300-48T\n".into(),
            ),
            ..Default::default()
        };
        let info = PlatformInfo::from_observations(&obs, "sw1.example.net");
        assert_eq!(info.hostname, "sw1");
        assert_eq!(info.model.as_deref(), Some("ex4300-48t"));
        assert_eq!(info.version, "20.4R3.8");
        assert_eq!(info.serial_number.as_deref(), Some("PE3716290012"));
        assert_eq!(info.architecture, "arm64");
        assert_eq!(info.identifier, "PE3716290012");
    }

    #[test]
    fn nothing_observed() {
        let info = PlatformInfo::from_observations(&Observations::default(), "r9");
        assert_eq!(info, PlatformInfo::fallback("r9"));
        assert_eq!(info.identifier, "r9");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    }
}
