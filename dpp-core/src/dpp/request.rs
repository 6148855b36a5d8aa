use crate::backends::utils::MAX_WAIT;
use crate::dpp::fault::{self, FaultPlan};
use crate::dpp::profile;
use crate::{Error, Result};
use std::time::Duration;

/// Parameters of one inbound command. Keys are matched case-insensitively,
/// the way the test station sends them.
#[derive(Debug, Clone, Default)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the `k1,v1,k2,v2,...` tail of a CAPI command line.
    pub fn from_capi(tail: &str) -> Self {
        let mut out = Vec::new();
        let mut it = tail.split(',').map(str::trim);
        while let Some(k) = it.next() {
            if k.is_empty() {
                continue;
            }
            let v = it.next().unwrap_or("");
            out.push((k.to_string(), v.to_string()));
        }
        Self(out)
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.push((key.to_string(), value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, key: &'static str) -> Result<&str> {
        self.get(key).ok_or(Error::Missing(key))
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| {
            v.eq_ignore_ascii_case("yes") || v.eq_ignore_ascii_case("true") || v == "1"
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    GetLocalBootstrap,
    SetPeerBootstrap,
    Automatic,
    Manual,
    Reconfigure,
}

impl ActionType {
    fn parse(v: &str) -> Result<Self> {
        let action = if v.eq_ignore_ascii_case("GetLocalBootstrap") {
            ActionType::GetLocalBootstrap
        } else if v.eq_ignore_ascii_case("SetPeerBootstrap") {
            ActionType::SetPeerBootstrap
        } else if v.eq_ignore_ascii_case("AutomaticDPP") {
            ActionType::Automatic
        } else if v.eq_ignore_ascii_case("ManualDPP") {
            ActionType::Manual
        } else if v.eq_ignore_ascii_case("DPPReconfigure") {
            ActionType::Reconfigure
        } else {
            return Err(Error::Unsupported("DPPActionType"));
        };
        Ok(action)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Qr,
    Pkex,
    NfcStatic,
    NfcNegotiated,
}

impl Transport {
    fn parse(bs: &str, handover: Option<&str>) -> Result<Self> {
        if bs.eq_ignore_ascii_case("QR") {
            Ok(Transport::Qr)
        } else if bs.eq_ignore_ascii_case("PKEX") {
            Ok(Transport::Pkex)
        } else if bs.eq_ignore_ascii_case("NFC") {
            match handover {
                Some(h) if h.eq_ignore_ascii_case("Negotiated") => Ok(Transport::NfcNegotiated),
                None => Ok(Transport::NfcStatic),
                Some(h) if h.eq_ignore_ascii_case("Static") => Ok(Transport::NfcStatic),
                Some(_) => Err(Error::Unsupported("DPPNFCHandover")),
            }
        } else {
            Err(Error::Unsupported("DPPBS"))
        }
    }

    pub fn is_nfc(self) -> bool {
        matches!(self, Transport::NfcStatic | Transport::NfcNegotiated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRole {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvRole {
    Enrollee,
    Configurator,
    Both,
}

impl ProvRole {
    /// Role keyword used in `role=` arguments.
    pub fn as_arg(self) -> &'static str {
        match self {
            ProvRole::Enrollee => "enrollee",
            ProvRole::Configurator => "configurator",
            ProvRole::Both => "either",
        }
    }

    pub fn may_configure(self) -> bool {
        self != ProvRole::Enrollee
    }

    pub fn may_enroll(self) -> bool {
        self != ProvRole::Configurator
    }
}

/// Which kind of device the Configurator provisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrolleeKind {
    Sta,
    Ap,
}

impl EnrolleeKind {
    pub fn prefix(self) -> &'static str {
        match self {
            EnrolleeKind::Sta => "sta",
            EnrolleeKind::Ap => "ap",
        }
    }
}

/// One parsed DPP invocation. All parameter validation happens here, so a
/// bad request never reaches the daemon.
#[derive(Debug, Clone)]
pub struct ProvisioningRequest {
    pub action: ActionType,
    /// Absent only for reconfiguration.
    pub transport: Option<Transport>,
    pub auth_role: Option<AuthRole>,
    pub prov_role: Option<ProvRole>,
    pub enrollee_kind: EnrolleeKind,
    pub conf_index: Option<u8>,
    pub curve: String,
    pub signing_curve: String,
    pub pkex_code: Option<String>,
    pub pkex_identifier: Option<String>,
    pub mutual: bool,
    pub chirp: bool,
    pub delay_qr_response: Option<Duration>,
    pub listen_channel: Option<u8>,
    pub subsequent_channel: Option<String>,
    pub channel_list: Option<String>,
    pub fault: Option<FaultPlan>,
    pub timeout: Option<Duration>,
    pub self_configure: bool,
    pub wait_for_connect: bool,
    pub status_query: bool,
    /// Hex-encoded peer URI supplied inline (SetPeerBootstrap, ManualDPP).
    pub peer_bootstrap: Option<String>,
}

impl ProvisioningRequest {
    pub fn parse(p: &Params) -> Result<Self> {
        let action = ActionType::parse(p.require("DPPActionType")?)?;

        let transport = match action {
            ActionType::Reconfigure => p
                .get("DPPBS")
                .map(|bs| Transport::parse(bs, p.get("DPPNFCHandover")))
                .transpose()?,
            _ => Some(Transport::parse(p.require("DPPBS")?, p.get("DPPNFCHandover"))?),
        };

        let auth_role = match p.get("DPPAuthRole") {
            None => None,
            Some(v) if v.eq_ignore_ascii_case("Initiator") => Some(AuthRole::Initiator),
            Some(v) if v.eq_ignore_ascii_case("Responder") => Some(AuthRole::Responder),
            Some(_) => return Err(Error::Unsupported("DPPAuthRole")),
        };

        let prov_role = match p.get("DPPProvisioningRole") {
            None => None,
            Some(v) if v.eq_ignore_ascii_case("Enrollee") => Some(ProvRole::Enrollee),
            Some(v) if v.eq_ignore_ascii_case("Configurator") => Some(ProvRole::Configurator),
            Some(v) if v.eq_ignore_ascii_case("Both") => Some(ProvRole::Both),
            Some(_) => return Err(Error::Unsupported("DPPProvisioningRole")),
        };

        let enrollee_kind = match p.get("DPPConfEnrolleeRole") {
            None => EnrolleeKind::Sta,
            Some(v) if v.eq_ignore_ascii_case("STA") => EnrolleeKind::Sta,
            Some(v) if v.eq_ignore_ascii_case("AP") => EnrolleeKind::Ap,
            Some(_) => return Err(Error::Unsupported("DPPConfEnrolleeRole")),
        };

        let conf_index = p
            .get("DPPConfIndex")
            .map(|v| {
                v.trim()
                    .parse::<u8>()
                    .ok()
                    .filter(|i| profile::preset(*i).is_some())
                    .ok_or(Error::Unsupported("DPPConfIndex"))
            })
            .transpose()?;

        let curve = parse_curve(p.get("DPPCryptoIdentifier"), "DPPCryptoIdentifier")?;
        let signing_curve = parse_curve(p.get("DPPSigningKeyECC"), "DPPSigningKeyECC")?;

        let pkex_identifier = p
            .get("DPPPKEXCodeIdentifier")
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let pkex_code = match transport {
            Some(Transport::Pkex) if action_runs_flow(action) => {
                Some(p.require("DPPPKEXCode")?.to_string())
            }
            _ => p.get("DPPPKEXCode").map(str::to_string),
        };

        let mutual = match p.get("DPPAuthDirection") {
            None => false,
            Some(v) if v.eq_ignore_ascii_case("Mutual") => true,
            Some(v) if v.eq_ignore_ascii_case("Single") => false,
            Some(_) => return Err(Error::Unsupported("DPPAuthDirection")),
        };

        let delay_qr_response = p
            .get("DPPDelayQRResponse")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs).min(MAX_WAIT));

        let listen_channel = p
            .get("DPPListenChannel")
            .map(|v| v.trim().parse::<u8>().map_err(|_| Error::Unsupported("DPPListenChannel")))
            .transpose()?;

        // A zero or unparsable timeout keeps the default.
        let timeout = p
            .get("DPPTimeout")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs).min(MAX_WAIT));

        let fault = FaultSelector::from_params(p)?.map(FaultSelector::resolve).transpose()?;

        let peer_bootstrap = p.get("DPPBootstrappingdata").map(str::to_string);

        let req = ProvisioningRequest {
            action,
            transport,
            auth_role,
            prov_role,
            enrollee_kind,
            conf_index,
            curve,
            signing_curve,
            pkex_code,
            pkex_identifier,
            mutual,
            chirp: p.flag("DPPChirp"),
            delay_qr_response,
            listen_channel,
            subsequent_channel: p.get("DPPSubsequentChannel").map(str::to_string),
            channel_list: p.get("DPPChannelList").map(str::to_string),
            fault,
            timeout,
            self_configure: p.flag("DPPSelfConfigure"),
            wait_for_connect: p.flag("DPPWaitForConnect"),
            status_query: p.flag("DPPStatusQuery"),
            peer_bootstrap,
        };
        req.check_action_requirements()?;
        Ok(req)
    }

    fn check_action_requirements(&self) -> Result<()> {
        match self.action {
            ActionType::GetLocalBootstrap => {
                if self.transport == Some(Transport::Pkex) {
                    return Err(Error::Unsupported("DPPBS"));
                }
            }
            ActionType::SetPeerBootstrap => {
                if self.peer_bootstrap.is_none() {
                    return Err(Error::Missing("DPPBootstrappingdata"));
                }
            }
            ActionType::Automatic | ActionType::Manual => {
                if self.auth_role.is_none() {
                    return Err(Error::Missing("DPPAuthRole"));
                }
                let Some(role) = self.prov_role else {
                    return Err(Error::Missing("DPPProvisioningRole"));
                };
                if self.action == ActionType::Manual
                    && self.transport != Some(Transport::Pkex)
                    && self.peer_bootstrap.is_none()
                {
                    return Err(Error::Missing("DPPBootstrappingdata"));
                }
                if (role.may_configure() || self.self_configure) && self.conf_index.is_none() {
                    return Err(Error::Missing("DPPConfIndex"));
                }
            }
            ActionType::Reconfigure => {
                let Some(role) = self.prov_role else {
                    return Err(Error::Missing("DPPProvisioningRole"));
                };
                if role == ProvRole::Both {
                    return Err(Error::Unsupported("DPPProvisioningRole"));
                }
                if role == ProvRole::Configurator && self.conf_index.is_none() {
                    return Err(Error::Missing("DPPConfIndex"));
                }
            }
        }
        Ok(())
    }

    pub fn transport(&self) -> Result<Transport> {
        self.transport.ok_or(Error::Missing("DPPBS"))
    }

    /// Whether this invocation needs a Configurator identity and profile.
    pub fn needs_configurator(&self) -> bool {
        self.self_configure || self.prov_role.is_some_and(ProvRole::may_configure)
    }
}

fn action_runs_flow(action: ActionType) -> bool {
    matches!(action, ActionType::Automatic | ActionType::Manual)
}

/// Maps a curve parameter to the daemon's curve name.
fn parse_curve(v: Option<&str>, key: &'static str) -> Result<String> {
    let Some(v) = v else {
        return Ok("P-256".to_string());
    };
    let name = match v.to_ascii_uppercase().as_str() {
        "P-256" => "P-256",
        "P-384" => "P-384",
        "P-521" => "P-521",
        "BP-256R1" | "BP-256" => "BP-256",
        "BP-384R1" | "BP-384" => "BP-384",
        "BP-512R1" | "BP-512" => "BP-512",
        _ => return Err(Error::Unsupported(key)),
    };
    Ok(name.to_string())
}

/// The raw negative-test selector as sent by the test station.
struct FaultSelector<'a> {
    step: &'a str,
    frame: &'a str,
    attribute: Option<&'a str>,
}

impl<'a> FaultSelector<'a> {
    fn from_params(p: &'a Params) -> Result<Option<Self>> {
        let Some(step) = p.get("DPPStep") else {
            return Ok(None);
        };
        Ok(Some(FaultSelector {
            step,
            frame: p.require("DPPFrameType")?,
            attribute: p.get("DPPIEAttribute"),
        }))
    }

    fn resolve(self) -> Result<FaultPlan> {
        fault::plan(self.step, self.frame, self.attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auto() -> Params {
        Params::new()
            .with("DPPActionType", "AutomaticDPP")
            .with("DPPBS", "QR")
    }

    #[test]
    fn capi_tail_is_split_into_pairs() {
        let p = Params::from_capi("program,DPP,DPPActionType,AutomaticDPP,DPPBS,QR");
        assert_eq!(p.get("program"), Some("DPP"));
        assert_eq!(p.get("dppactiontype"), Some("AutomaticDPP"));
        assert_eq!(p.get("DPPBS"), Some("QR"));
        assert_eq!(p.get("DPPAuthRole"), None);
    }

    #[test]
    fn missing_and_unsupported_keys() {
        let err = ProvisioningRequest::parse(&Params::new()).unwrap_err();
        assert_eq!(err.to_response(), "errorCode,Missing DPPActionType");

        let err = ProvisioningRequest::parse(&Params::new().with("DPPActionType", "Dance")).unwrap_err();
        assert_eq!(err.to_response(), "errorCode,Unsupported DPPActionType");

        let err = ProvisioningRequest::parse(&auto()).unwrap_err();
        assert_eq!(err.to_response(), "errorCode,Missing DPPAuthRole");

        let err = ProvisioningRequest::parse(&auto().with("DPPAuthRole", "Initiator")).unwrap_err();
        assert_eq!(err.to_response(), "errorCode,Missing DPPProvisioningRole");

        let err = ProvisioningRequest::parse(
            &Params::new().with("DPPActionType", "AutomaticDPP").with("DPPBS", "BLE"),
        )
        .unwrap_err();
        assert_eq!(err.to_response(), "errorCode,Unsupported DPPBS");
    }

    #[test]
    fn configurator_needs_a_known_profile() {
        let base = auto()
            .with("DPPAuthRole", "Initiator")
            .with("DPPProvisioningRole", "Configurator");
        let err = ProvisioningRequest::parse(&base).unwrap_err();
        assert_eq!(err.to_response(), "errorCode,Missing DPPConfIndex");

        let err = ProvisioningRequest::parse(&base.clone().with("DPPConfIndex", "99")).unwrap_err();
        assert_eq!(err.to_response(), "errorCode,Unsupported DPPConfIndex");

        let req = ProvisioningRequest::parse(&base.with("DPPConfIndex", "1")).unwrap();
        assert_eq!(req.conf_index, Some(1));
        assert!(req.needs_configurator());
    }

    #[test]
    fn options_are_parsed() {
        let req = ProvisioningRequest::parse(
            &auto()
                .with("DPPAuthRole", "Responder")
                .with("DPPProvisioningRole", "Enrollee")
                .with("DPPAuthDirection", "Mutual")
                .with("DPPCryptoIdentifier", "BP-384R1")
                .with("DPPTimeout", "30")
                .with("DPPWaitForConnect", "Yes")
                .with("DPPDelayQRResponse", "5"),
        )
        .unwrap();
        assert_eq!(req.transport, Some(Transport::Qr));
        assert_eq!(req.auth_role, Some(AuthRole::Responder));
        assert!(req.mutual);
        assert_eq!(req.curve, "BP-384");
        assert_eq!(req.signing_curve, "P-256");
        assert_eq!(req.timeout, Some(Duration::from_secs(30)));
        assert_eq!(req.delay_qr_response, Some(Duration::from_secs(5)));
        assert!(req.wait_for_connect);
        assert!(!req.needs_configurator());
    }

    #[test]
    fn zero_timeout_keeps_default() {
        let req = ProvisioningRequest::parse(
            &auto()
                .with("DPPAuthRole", "Initiator")
                .with("DPPProvisioningRole", "Enrollee")
                .with("DPPTimeout", "0"),
        )
        .unwrap();
        assert_eq!(req.timeout, None);
    }

    #[test]
    fn oversized_timeouts_are_capped() {
        let req = ProvisioningRequest::parse(
            &auto()
                .with("DPPAuthRole", "Initiator")
                .with("DPPProvisioningRole", "Enrollee")
                .with("DPPTimeout", "18446744073709551615")
                .with("DPPDelayQRResponse", "18446744073709551615"),
        )
        .unwrap();
        assert_eq!(req.timeout, Some(MAX_WAIT));
        assert_eq!(req.delay_qr_response, Some(MAX_WAIT));
    }

    #[test]
    fn pkex_requires_code_and_nfc_handover_is_selected() {
        let err = ProvisioningRequest::parse(
            &Params::new()
                .with("DPPActionType", "AutomaticDPP")
                .with("DPPBS", "PKEX")
                .with("DPPAuthRole", "Initiator")
                .with("DPPProvisioningRole", "Enrollee"),
        )
        .unwrap_err();
        assert_eq!(err.to_response(), "errorCode,Missing DPPPKEXCode");

        let req = ProvisioningRequest::parse(
            &Params::new()
                .with("DPPActionType", "GetLocalBootstrap")
                .with("DPPBS", "NFC")
                .with("DPPNFCHandover", "Negotiated"),
        )
        .unwrap();
        assert_eq!(req.transport, Some(Transport::NfcNegotiated));
    }

    #[test]
    fn fault_selector_is_resolved_at_parse_time() {
        let base = auto()
            .with("DPPAuthRole", "Initiator")
            .with("DPPProvisioningRole", "Enrollee");
        let req = ProvisioningRequest::parse(
            &base
                .clone()
                .with("DPPStep", "MissingAttribute")
                .with("DPPFrameType", "AuthenticationRequest")
                .with("DPPIEAttribute", "InitNonce"),
        )
        .unwrap();
        assert_eq!(req.fault.map(|f| f.code), Some(13));

        let err = ProvisioningRequest::parse(
            &base
                .with("DPPStep", "MissingAttribute")
                .with("DPPFrameType", "AuthenticationRequest")
                .with("DPPIEAttribute", "Nonsense"),
        )
        .unwrap_err();
        assert_eq!(err.to_response(), "errorCode,Unsupported DPPIEAttribute");
    }

    #[test]
    fn reconfigure_does_not_need_bootstrap() {
        let req = ProvisioningRequest::parse(
            &Params::new()
                .with("DPPActionType", "DPPReconfigure")
                .with("DPPProvisioningRole", "Enrollee"),
        )
        .unwrap();
        assert_eq!(req.transport, None);
        assert!(req.transport().is_err());
    }
}
