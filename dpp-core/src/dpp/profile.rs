use crate::backends::utils::ascii_to_hex;
use crate::dpp::Ctx;
use crate::dpp::command::ConfiguratorAdd;
use crate::dpp::request::EnrolleeKind;
use crate::dpp::session::Session;
use crate::{Error, Result};
use std::path::Path;

const DEFAULT_CSRATTRS: &str = "MAsGCSqGSIb3DQEJBw==";

#[derive(Debug, Clone, Copy)]
pub enum Credential {
    None,
    Passphrase(&'static str),
    Psk(&'static str),
}

#[derive(Debug)]
pub struct Network {
    pub akm: &'static str,
    pub ssid: &'static str,
    pub credential: Credential,
}

/// One hardcoded configuration preset, selected by `DPPConfIndex`.
#[derive(Debug)]
pub struct Preset {
    pub index: u8,
    pub primary: Network,
    pub group_id: Option<&'static str>,
    /// Certificate enrollment: the profile carries CSR attributes.
    pub csr: bool,
    pub second: Option<Network>,
}

const PASSPHRASE: &str = "ThisIsDppPassphrase";
const PSK: &str = "10506e102ad1e7f95112f6b127675bb8344dacacea60403f3fa4055aec85b0fc";

const fn net(akm: &'static str, ssid: &'static str, credential: Credential) -> Network {
    Network { akm, ssid, credential }
}

pub static PRESETS: [Preset; 11] = [
    Preset { index: 1, primary: net("dpp", "DPPNET01", Credential::None), group_id: None, csr: false, second: None },
    Preset { index: 2, primary: net("psk", "DPPNET01", Credential::Psk(PSK)), group_id: None, csr: false, second: None },
    Preset { index: 3, primary: net("psk", "DPPNET01", Credential::Passphrase(PASSPHRASE)), group_id: None, csr: false, second: None },
    Preset {
        index: 4,
        primary: net("dpp", "DPPNET01", Credential::None),
        group_id: Some("DPPGROUP_DPP_INFRA2"),
        csr: false,
        second: None,
    },
    Preset { index: 5, primary: net("sae", "DPPNET01", Credential::Passphrase(PASSPHRASE)), group_id: None, csr: false, second: None },
    Preset { index: 6, primary: net("psk-sae", "DPPNET01", Credential::Passphrase(PASSPHRASE)), group_id: None, csr: false, second: None },
    Preset { index: 7, primary: net("dpp-psk-sae", "DPPNET01", Credential::Passphrase(PASSPHRASE)), group_id: None, csr: false, second: None },
    Preset { index: 8, primary: net("dpp-sae", "DPPNET01", Credential::Passphrase(PASSPHRASE)), group_id: None, csr: false, second: None },
    Preset {
        index: 9,
        primary: net("dpp", "DPPNET01", Credential::None),
        group_id: None,
        csr: false,
        second: Some(net("psk-sae", "DPPNET02", Credential::Passphrase(PASSPHRASE))),
    },
    Preset {
        index: 10,
        primary: net("dpp", "DPPNET01", Credential::None),
        group_id: None,
        csr: false,
        second: Some(net("psk", "DPPNET02", Credential::Psk(PSK))),
    },
    Preset { index: 11, primary: net("dot1x", "DPPNET01", Credential::None), group_id: None, csr: true, second: None },
];

pub fn preset(index: u8) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.index == index)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondNetwork {
    pub role: String,
    pub ssid_hex: String,
    pub pass_hex: Option<String>,
    pub psk_hex: Option<String>,
}

/// A preset made concrete for one enrollee type: role strings prefixed with
/// `sta-`/`ap-`, SSID and passphrase hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguratorProfile {
    pub role: String,
    pub ssid_hex: String,
    pub pass_hex: Option<String>,
    pub psk_hex: Option<String>,
    pub group_id: Option<String>,
    pub csrattrs: Option<String>,
    pub second: Option<SecondNetwork>,
}

fn credential_fields(c: Credential) -> (Option<String>, Option<String>) {
    match c {
        Credential::None => (None, None),
        Credential::Passphrase(p) => (Some(ascii_to_hex(p)), None),
        Credential::Psk(psk) => (None, Some(psk.to_string())),
    }
}

impl ConfiguratorProfile {
    pub async fn resolve(index: u8, kind: EnrolleeKind, csrattrs_path: &Path) -> Result<Self> {
        let preset = preset(index).ok_or(Error::Unsupported("DPPConfIndex"))?;
        let (pass_hex, psk_hex) = credential_fields(preset.primary.credential);
        let csrattrs = if preset.csr {
            Some(read_csrattrs(csrattrs_path).await)
        } else {
            None
        };
        let second = preset.second.as_ref().map(|n| {
            let (pass_hex, psk_hex) = credential_fields(n.credential);
            SecondNetwork {
                role: format!("{}-{}", kind.prefix(), n.akm),
                ssid_hex: ascii_to_hex(n.ssid),
                pass_hex,
                psk_hex,
            }
        });
        Ok(ConfiguratorProfile {
            role: format!("{}-{}", kind.prefix(), preset.primary.akm),
            ssid_hex: ascii_to_hex(preset.primary.ssid),
            pass_hex,
            psk_hex,
            group_id: preset.group_id.map(str::to_string),
            csrattrs,
            second,
        })
    }
}

async fn read_csrattrs(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
        Ok(_) | Err(_) => {
            tracing::debug!(path = %path.display(), "No CSR attributes file, using default");
            DEFAULT_CSRATTRS.to_string()
        }
    }
}

/// Returns the Configurator identity, creating it on first use. The id is
/// kept for the life of the process.
pub(crate) async fn ensure_configurator(ctx: &Ctx<'_>, session: &mut Session, curve: &str) -> Result<u32> {
    if let Some(id) = session.configurator_id {
        return Ok(id);
    }
    let reply = ctx.send_recv(&ConfiguratorAdd { curve }).await?;
    let id = parse_id(&reply, "DPP_CONFIGURATOR_ADD")?;
    tracing::info!(id, curve, "Configurator created");
    session.configurator_id = Some(id);
    Ok(id)
}

/// Parses the integer id most DPP commands reply with.
pub(crate) fn parse_id(reply: &str, cmd: &str) -> Result<u32> {
    reply
        .trim()
        .parse()
        .map_err(|_| Error::Protocol(format!("unexpected {} reply '{}'", cmd, reply.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_index_has_a_preset() {
        for i in 1..=11 {
            assert_eq!(preset(i).map(|p| p.index), Some(i));
        }
        assert!(preset(0).is_none());
        assert!(preset(99).is_none());
    }

    #[tokio::test]
    async fn presets_resolve_with_role_prefix_and_hex() {
        let p = ConfiguratorProfile::resolve(1, EnrolleeKind::Sta, Path::new("/nonexistent")).await.unwrap();
        assert_eq!(p.role, "sta-dpp");
        assert_eq!(p.ssid_hex, "4450504e45543031");
        assert_eq!(p.pass_hex, None);

        let p = ConfiguratorProfile::resolve(6, EnrolleeKind::Ap, Path::new("/nonexistent")).await.unwrap();
        assert_eq!(p.role, "ap-psk-sae");
        assert_eq!(p.pass_hex.as_deref(), Some("54686973497344707050617373706872617365"));

        let p = ConfiguratorProfile::resolve(2, EnrolleeKind::Sta, Path::new("/nonexistent")).await.unwrap();
        assert_eq!(p.psk_hex.as_deref(), Some(PSK));

        let p = ConfiguratorProfile::resolve(4, EnrolleeKind::Sta, Path::new("/nonexistent")).await.unwrap();
        assert_eq!(p.group_id.as_deref(), Some("DPPGROUP_DPP_INFRA2"));
    }

    #[tokio::test]
    async fn multi_network_presets_carry_a_second_network() {
        let p = ConfiguratorProfile::resolve(9, EnrolleeKind::Sta, Path::new("/nonexistent")).await.unwrap();
        let second = p.second.unwrap();
        assert_eq!(second.role, "sta-psk-sae");
        assert_eq!(second.ssid_hex, "4450504e45543032");
        assert!(second.pass_hex.is_some());

        let p = ConfiguratorProfile::resolve(10, EnrolleeKind::Sta, Path::new("/nonexistent")).await.unwrap();
        assert_eq!(p.second.unwrap().psk_hex.as_deref(), Some(PSK));
    }

    #[tokio::test]
    async fn csr_profile_falls_back_to_default_attributes() {
        let p = ConfiguratorProfile::resolve(11, EnrolleeKind::Sta, Path::new("/nonexistent/csrattrs")).await.unwrap();
        assert_eq!(p.role, "sta-dot1x");
        assert_eq!(p.csrattrs.as_deref(), Some(DEFAULT_CSRATTRS));
    }

    #[tokio::test]
    async fn csr_profile_reads_attributes_file() {
        let path = std::env::temp_dir().join(format!("dpp-csrattrs-{}", std::process::id()));
        tokio::fs::write(&path, "MBEGCSqGSIb3DQEJBzEE\n").await.unwrap();
        let p = ConfiguratorProfile::resolve(11, EnrolleeKind::Sta, &path).await.unwrap();
        assert_eq!(p.csrattrs.as_deref(), Some("MBEGCSqGSIb3DQEJBzEE"));
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[test]
    fn ids_are_parsed_or_rejected() {
        assert_eq!(parse_id("3\n", "X").unwrap(), 3);
        assert!(parse_id("OK", "X").is_err());
    }
}
