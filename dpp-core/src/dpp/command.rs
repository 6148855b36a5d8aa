//! Daemon command builders. Each family has named fields and renders the
//! exact control-interface grammar through `Display`; `build()` validates
//! first.

use crate::dpp::profile::ConfiguratorProfile;
use crate::{Error, Result};
use std::fmt;

pub trait CommandBuilder: fmt::Display {
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn build(&self) -> Result<String> {
        self.validate()?;
        Ok(self.to_string())
    }
}

/// Rejects values that would split into extra tokens on the daemon side.
fn single_token(value: &str, what: &str) -> Result<()> {
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return Err(Error::Protocol(format!("invalid {} '{}'", what, value)));
    }
    Ok(())
}

fn uri_token(uri: &str) -> Result<()> {
    if !uri.starts_with("DPP:") || uri.contains(['\n', '\r']) {
        return Err(Error::Protocol(format!("malformed bootstrap URI '{}'", uri)));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapType {
    QrCode,
    NfcUri,
    Pkex,
}

pub struct BootstrapGen<'a> {
    pub kind: BootstrapType,
    pub curve: &'a str,
    pub chan: Option<&'a str>,
    pub mac: Option<&'a str>,
}

impl fmt::Display for BootstrapGen<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            BootstrapType::QrCode => "qrcode",
            BootstrapType::NfcUri => "nfc-uri",
            BootstrapType::Pkex => "pkex",
        };
        write!(f, "DPP_BOOTSTRAP_GEN type={} curve={}", kind, self.curve)?;
        if let Some(chan) = self.chan {
            write!(f, " chan={}", chan)?;
        }
        if let Some(mac) = self.mac {
            write!(f, " mac={}", mac)?;
        }
        Ok(())
    }
}

impl CommandBuilder for BootstrapGen<'_> {
    fn validate(&self) -> Result<()> {
        single_token(self.curve, "curve")?;
        if let Some(chan) = self.chan {
            single_token(chan, "channel list")?;
        }
        if let Some(mac) = self.mac {
            if mac.len() != 12 || !mac.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(Error::Protocol(format!("invalid MAC address '{}'", mac)));
            }
        }
        Ok(())
    }
}

pub struct BootstrapGetUri(pub u32);

impl fmt::Display for BootstrapGetUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DPP_BOOTSTRAP_GET_URI {}", self.0)
    }
}

impl CommandBuilder for BootstrapGetUri {}

/// Commands that hand the peer's bootstrap URI to the daemon.
pub enum PeerUri<'a> {
    QrCode(&'a str),
    NfcUri(&'a str),
    HandoverReq { own: u32, uri: &'a str },
    HandoverSel { own: u32, uri: &'a str },
}

impl fmt::Display for PeerUri<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerUri::QrCode(uri) => write!(f, "DPP_QR_CODE {}", uri),
            PeerUri::NfcUri(uri) => write!(f, "DPP_NFC_URI {}", uri),
            PeerUri::HandoverReq { own, uri } => write!(f, "DPP_NFC_HANDOVER_REQ own={} uri={}", own, uri),
            PeerUri::HandoverSel { own, uri } => write!(f, "DPP_NFC_HANDOVER_SEL own={} uri={}", own, uri),
        }
    }
}

impl CommandBuilder for PeerUri<'_> {
    fn validate(&self) -> Result<()> {
        match self {
            PeerUri::QrCode(uri)
            | PeerUri::NfcUri(uri)
            | PeerUri::HandoverReq { uri, .. }
            | PeerUri::HandoverSel { uri, .. } => uri_token(uri),
        }
    }
}

pub struct ConfiguratorAdd<'a> {
    pub curve: &'a str,
}

impl fmt::Display for ConfiguratorAdd<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DPP_CONFIGURATOR_ADD curve={}", self.curve)
    }
}

impl CommandBuilder for ConfiguratorAdd<'_> {
    fn validate(&self) -> Result<()> {
        single_token(self.curve, "curve")
    }
}

/// The configuration-object fragment shared by several commands:
/// `conf=sta-dpp ssid=<hex> ... configurator=<id>`.
pub struct ConfObject<'a> {
    pub profile: &'a ConfiguratorProfile,
    pub configurator: u32,
    pub conn_status: bool,
}

impl fmt::Display for ConfObject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.profile;
        write!(f, "conf={} ssid={}", p.role, p.ssid_hex)?;
        if let Some(pass) = &p.pass_hex {
            write!(f, " pass={}", pass)?;
        }
        if let Some(psk) = &p.psk_hex {
            write!(f, " psk={}", psk)?;
        }
        if let Some(group) = &p.group_id {
            write!(f, " group_id={}", group)?;
        }
        if let Some(csr) = &p.csrattrs {
            write!(f, " csrattrs={}", csr)?;
        }
        if let Some(second) = &p.second {
            write!(f, " conf2={} ssid2={}", second.role, second.ssid_hex)?;
            if let Some(pass) = &second.pass_hex {
                write!(f, " pass2={}", pass)?;
            }
            if let Some(psk) = &second.psk_hex {
                write!(f, " psk2={}", psk)?;
            }
        }
        write!(f, " configurator={}", self.configurator)?;
        if self.conn_status {
            f.write_str(" conn_status=1")?;
        }
        Ok(())
    }
}

impl CommandBuilder for ConfObject<'_> {
    fn validate(&self) -> Result<()> {
        let p = self.profile;
        single_token(&p.role, "configuration role")?;
        single_token(&p.ssid_hex, "SSID")?;
        if let Some(group) = &p.group_id {
            single_token(group, "group id")?;
        }
        if let Some(csr) = &p.csrattrs {
            single_token(csr, "CSR attributes")?;
        }
        Ok(())
    }
}

pub struct AuthInit<'a> {
    pub peer: u32,
    pub own: Option<u32>,
    pub role: &'a str,
    pub neg_freq: Option<u32>,
    pub conf: Option<&'a ConfObject<'a>>,
}

impl fmt::Display for AuthInit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DPP_AUTH_INIT peer={}", self.peer)?;
        if let Some(own) = self.own {
            write!(f, " own={}", own)?;
        }
        write!(f, " role={}", self.role)?;
        if let Some(freq) = self.neg_freq {
            write!(f, " neg_freq={}", freq)?;
        }
        if let Some(conf) = self.conf {
            write!(f, " {}", conf)?;
        }
        Ok(())
    }
}

impl CommandBuilder for AuthInit<'_> {
    fn validate(&self) -> Result<()> {
        self.conf.map_or(Ok(()), |c| c.validate())
    }
}

pub struct PkexAdd<'a> {
    pub own: u32,
    pub init: bool,
    pub role: &'a str,
    pub conf: Option<&'a ConfObject<'a>>,
    pub identifier: Option<&'a str>,
    pub code: &'a str,
}

impl fmt::Display for PkexAdd<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DPP_PKEX_ADD own={}", self.own)?;
        if self.init {
            f.write_str(" init=1")?;
        }
        write!(f, " role={}", self.role)?;
        if let Some(conf) = self.conf {
            write!(f, " {}", conf)?;
        }
        if let Some(id) = self.identifier {
            write!(f, " identifier={}", id)?;
        }
        // The code runs to end of line and must come last.
        write!(f, " code={}", self.code)
    }
}

impl CommandBuilder for PkexAdd<'_> {
    fn validate(&self) -> Result<()> {
        if self.code.is_empty() {
            return Err(Error::Missing("DPPPKEXCode"));
        }
        if let Some(id) = self.identifier {
            single_token(id, "PKEX identifier")?;
        }
        self.conf.map_or(Ok(()), |c| c.validate())
    }
}

pub struct Listen<'a> {
    pub freq: u32,
    pub role: &'a str,
    pub mutual: bool,
}

impl fmt::Display for Listen<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DPP_LISTEN {} role={}", self.freq, self.role)?;
        if self.mutual {
            f.write_str(" qr=mutual")?;
        }
        Ok(())
    }
}

impl CommandBuilder for Listen<'_> {}

pub struct Chirp {
    pub own: u32,
    pub listen: u32,
}

impl fmt::Display for Chirp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DPP_CHIRP own={} listen={}", self.own, self.listen)
    }
}

impl CommandBuilder for Chirp {}

pub struct ConfiguratorParams<'a>(pub &'a ConfObject<'a>);

impl fmt::Display for ConfiguratorParams<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SET dpp_configurator_params {}", self.0)
    }
}

impl CommandBuilder for ConfiguratorParams<'_> {
    fn validate(&self) -> Result<()> {
        self.0.validate()
    }
}

pub struct ConfiguratorSign<'a>(pub &'a ConfObject<'a>);

impl fmt::Display for ConfiguratorSign<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DPP_CONFIGURATOR_SIGN {}", self.0)
    }
}

impl CommandBuilder for ConfiguratorSign<'_> {
    fn validate(&self) -> Result<()> {
        self.0.validate()
    }
}

pub struct SetTest(pub u32);

impl fmt::Display for SetTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SET dpp_test {}", self.0)
    }
}

impl CommandBuilder for SetTest {}

pub struct Reconfig(pub u32);

impl fmt::Display for Reconfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DPP_RECONFIG {}", self.0)
    }
}

impl CommandBuilder for Reconfig {}

pub struct CaSet<'a> {
    pub peer: u32,
    pub name: &'a str,
    pub value: &'a str,
}

impl fmt::Display for CaSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DPP_CA_SET peer={} name={} value={}", self.peer, self.name, self.value)
    }
}

impl CommandBuilder for CaSet<'_> {
    fn validate(&self) -> Result<()> {
        single_token(self.name, "CA attribute name")?;
        single_token(self.value, "CA attribute value")
    }
}

/// `SET <key> <value>` against the AP's running configuration, plus the
/// bare `DISABLE`/`ENABLE` cycle.
pub enum ApCommand<'a> {
    Set(&'a str, &'a str),
    Disable,
    Enable,
}

impl fmt::Display for ApCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApCommand::Set(key, value) => write!(f, "SET {} {}", key, value),
            ApCommand::Disable => f.write_str("DISABLE"),
            ApCommand::Enable => f.write_str("ENABLE"),
        }
    }
}

impl CommandBuilder for ApCommand<'_> {
    fn validate(&self) -> Result<()> {
        match self {
            ApCommand::Set(key, value) if value.contains(['\n', '\r']) => {
                Err(Error::Protocol(format!("invalid value for {}", key)))
            }
            ApCommand::Set(key, _) => single_token(key, "AP parameter"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dpp::profile::SecondNetwork;

    fn dpp_profile() -> ConfiguratorProfile {
        ConfiguratorProfile {
            role: "sta-dpp".into(),
            ssid_hex: "4450504e45543031".into(),
            pass_hex: None,
            psk_hex: None,
            group_id: None,
            csrattrs: None,
            second: None,
        }
    }

    #[test]
    fn bootstrap_gen_grammar() {
        let cmd = BootstrapGen {
            kind: BootstrapType::QrCode,
            curve: "P-256",
            chan: Some("81/11"),
            mac: Some("020000000001"),
        };
        assert_eq!(
            cmd.build().unwrap(),
            "DPP_BOOTSTRAP_GEN type=qrcode curve=P-256 chan=81/11 mac=020000000001"
        );
        let pkex = BootstrapGen { kind: BootstrapType::Pkex, curve: "P-384", chan: None, mac: None };
        assert_eq!(pkex.build().unwrap(), "DPP_BOOTSTRAP_GEN type=pkex curve=P-384");

        let bad = BootstrapGen { kind: BootstrapType::NfcUri, curve: "P-256", chan: None, mac: Some("02:00") };
        assert!(bad.build().is_err());
    }

    #[test]
    fn auth_init_with_configuration() {
        let profile = dpp_profile();
        let conf = ConfObject { profile: &profile, configurator: 1, conn_status: true };
        let cmd = AuthInit { peer: 2, own: Some(1), role: "configurator", neg_freq: Some(2437), conf: Some(&conf) };
        assert_eq!(
            cmd.build().unwrap(),
            "DPP_AUTH_INIT peer=2 own=1 role=configurator neg_freq=2437 conf=sta-dpp ssid=4450504e45543031 configurator=1 conn_status=1"
        );
        let plain = AuthInit { peer: 3, own: None, role: "enrollee", neg_freq: None, conf: None };
        assert_eq!(plain.build().unwrap(), "DPP_AUTH_INIT peer=3 role=enrollee");
    }

    #[test]
    fn second_network_fragments() {
        let mut profile = dpp_profile();
        profile.second = Some(SecondNetwork {
            role: "sta-psk".into(),
            ssid_hex: "4450504e45543032".into(),
            pass_hex: None,
            psk_hex: Some("abcd".into()),
        });
        let conf = ConfObject { profile: &profile, configurator: 4, conn_status: false };
        assert_eq!(
            ConfiguratorParams(&conf).build().unwrap(),
            "SET dpp_configurator_params conf=sta-dpp ssid=4450504e45543031 conf2=sta-psk ssid2=4450504e45543032 psk2=abcd configurator=4"
        );
    }

    #[test]
    fn pkex_code_goes_last() {
        let cmd = PkexAdd { own: 5, init: true, role: "enrollee", conf: None, identifier: Some("joe"), code: "thisis secret" };
        assert_eq!(cmd.build().unwrap(), "DPP_PKEX_ADD own=5 init=1 role=enrollee identifier=joe code=thisis secret");
        let bad_id = PkexAdd { own: 5, init: false, role: "enrollee", conf: None, identifier: Some("a b"), code: "x" };
        assert!(bad_id.build().is_err());
        let no_code = PkexAdd { own: 5, init: false, role: "enrollee", conf: None, identifier: None, code: "" };
        assert_eq!(no_code.build().unwrap_err().to_response(), "errorCode,Missing DPPPKEXCode");
    }

    #[test]
    fn peer_uri_commands_validate_the_uri() {
        assert_eq!(PeerUri::QrCode("DPP:K:abc;;").build().unwrap(), "DPP_QR_CODE DPP:K:abc;;");
        assert_eq!(
            PeerUri::HandoverSel { own: 1, uri: "DPP:K:abc;;" }.build().unwrap(),
            "DPP_NFC_HANDOVER_SEL own=1 uri=DPP:K:abc;;"
        );
        assert!(PeerUri::NfcUri("http://x").build().is_err());
    }

    #[test]
    fn small_commands() {
        assert_eq!(Listen { freq: 2462, role: "enrollee", mutual: false }.build().unwrap(), "DPP_LISTEN 2462 role=enrollee");
        assert_eq!(Chirp { own: 1, listen: 2437 }.build().unwrap(), "DPP_CHIRP own=1 listen=2437");
        assert_eq!(SetTest(13).build().unwrap(), "SET dpp_test 13");
        assert_eq!(Reconfig(0).build().unwrap(), "DPP_RECONFIG 0");
        assert_eq!(
            CaSet { peer: 2, name: "certBag", value: "MIIB" }.build().unwrap(),
            "DPP_CA_SET peer=2 name=certBag value=MIIB"
        );
        assert_eq!(ApCommand::Set("wpa_key_mgmt", "DPP SAE").build().unwrap(), "SET wpa_key_mgmt DPP SAE");
        assert_eq!(ApCommand::Enable.build().unwrap(), "ENABLE");
    }
}
