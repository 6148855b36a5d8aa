//! Negative-test fault injection.
//!
//! A (step, frame, attribute) selector maps to the integer the daemon takes
//! in `SET dpp_test <n>`. The daemon then corrupts or drops the named
//! attribute (or stops answering) at that frame, and the flow watches the
//! air for the frame instead of running the exchange to completion.

use crate::dpp::Invocation;
use crate::dpp::result::{Phase, PhaseStatus};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use crate::backends::utils::deadline_after;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultStep {
    InvalidValue,
    MissingAttribute,
    Timeout,
}

impl FaultStep {
    fn parse(v: &str) -> Option<Self> {
        [
            ("InvalidValue", FaultStep::InvalidValue),
            ("MissingAttribute", FaultStep::MissingAttribute),
            ("Timeout", FaultStep::Timeout),
        ]
        .into_iter()
        .find(|(name, _)| v.eq_ignore_ascii_case(name))
        .map(|(_, step)| step)
    }
}

/// DPP frames that can be targeted. Public action frames carry their
/// on-air type code in `DPP-TX`/`DPP-RX` events; configuration frames ride
/// on GAS and have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    AuthenticationRequest,
    AuthenticationResponse,
    AuthenticationConfirm,
    PeerDiscoveryRequest,
    PeerDiscoveryResponse,
    PkexExchangeRequest,
    PkexExchangeResponse,
    PkexCrRequest,
    PkexCrResponse,
    ConfigurationRequest,
    ConfigurationResponse,
}

const FRAME_NAMES: &[(&str, FrameType)] = &[
    ("AuthenticationRequest", FrameType::AuthenticationRequest),
    ("AuthenticationResponse", FrameType::AuthenticationResponse),
    ("AuthenticationConfirm", FrameType::AuthenticationConfirm),
    ("PeerDiscoveryRequest", FrameType::PeerDiscoveryRequest),
    ("PeerDiscoveryResponse", FrameType::PeerDiscoveryResponse),
    ("PKEXExchangeRequest", FrameType::PkexExchangeRequest),
    ("PKEXExchangeResponse", FrameType::PkexExchangeResponse),
    ("PKEXCRRequest", FrameType::PkexCrRequest),
    ("PKEXCRResponse", FrameType::PkexCrResponse),
    ("ConfigurationRequest", FrameType::ConfigurationRequest),
    ("ConfigurationResponse", FrameType::ConfigurationResponse),
];

impl FrameType {
    pub fn from_name(v: &str) -> Option<Self> {
        FRAME_NAMES
            .iter()
            .find(|(name, _)| v.eq_ignore_ascii_case(name))
            .map(|(_, f)| *f)
    }

    /// DPP public action frame type, as reported in `type=<n>`.
    pub fn code(self) -> Option<u8> {
        match self {
            FrameType::AuthenticationRequest => Some(0),
            FrameType::AuthenticationResponse => Some(1),
            FrameType::AuthenticationConfirm => Some(2),
            FrameType::PeerDiscoveryRequest => Some(5),
            FrameType::PeerDiscoveryResponse => Some(6),
            FrameType::PkexExchangeRequest => Some(7),
            FrameType::PkexExchangeResponse => Some(8),
            FrameType::PkexCrRequest => Some(9),
            FrameType::PkexCrResponse => Some(10),
            FrameType::ConfigurationRequest | FrameType::ConfigurationResponse => None,
        }
    }

    /// The result field a fault on this frame is reported in.
    pub fn phase(self) -> Phase {
        match self {
            FrameType::PkexExchangeRequest
            | FrameType::PkexExchangeResponse
            | FrameType::PkexCrRequest
            | FrameType::PkexCrResponse => Phase::Bootstrap,
            FrameType::AuthenticationRequest
            | FrameType::AuthenticationResponse
            | FrameType::AuthenticationConfirm => Phase::Auth,
            FrameType::ConfigurationRequest | FrameType::ConfigurationResponse => Phase::Conf,
            FrameType::PeerDiscoveryRequest | FrameType::PeerDiscoveryResponse => {
                Phase::NetworkIntro
            }
        }
    }
}

pub struct FaultEntry {
    pub step: FaultStep,
    pub frame: FrameType,
    /// Empty for `Timeout` steps, which stop at a frame rather than damage it.
    pub attribute: &'static str,
    pub code: u32,
}

const fn iv(frame: FrameType, attribute: &'static str, code: u32) -> FaultEntry {
    FaultEntry { step: FaultStep::InvalidValue, frame, attribute, code }
}

const fn ma(frame: FrameType, attribute: &'static str, code: u32) -> FaultEntry {
    FaultEntry { step: FaultStep::MissingAttribute, frame, attribute, code }
}

const fn stop(frame: FrameType, code: u32) -> FaultEntry {
    FaultEntry { step: FaultStep::Timeout, frame, attribute: "", code }
}

use FrameType::*;

pub static FAULT_TABLE: &[FaultEntry] = &[
    iv(AuthenticationRequest, "WrappedData", 1),
    iv(AuthenticationResponse, "WrappedData", 2),
    iv(AuthenticationResponse, "PrimaryWrappedData", 2),
    iv(AuthenticationConfirm, "WrappedData", 3),
    iv(PkexCrRequest, "WrappedData", 4),
    iv(PkexCrResponse, "WrappedData", 5),
    iv(ConfigurationRequest, "WrappedData", 6),
    iv(ConfigurationResponse, "WrappedData", 7),
    iv(AuthenticationRequest, "InitCapabilities", 8),
    ma(AuthenticationRequest, "RespBSKeyHash", 10),
    ma(AuthenticationRequest, "InitBSKeyHash", 11),
    ma(AuthenticationRequest, "InitProtocolKey", 12),
    ma(AuthenticationRequest, "InitNonce", 13),
    ma(AuthenticationRequest, "InitCapabilities", 14),
    ma(AuthenticationRequest, "WrappedData", 15),
    ma(AuthenticationResponse, "DPPStatus", 16),
    ma(AuthenticationResponse, "RespBSKeyHash", 17),
    ma(AuthenticationResponse, "InitBSKeyHash", 18),
    ma(AuthenticationResponse, "RespProtocolKey", 19),
    ma(AuthenticationResponse, "RespNonce", 20),
    ma(AuthenticationResponse, "InitNonce", 21),
    ma(AuthenticationResponse, "RespCapabilities", 22),
    ma(AuthenticationResponse, "RespAuthTag", 23),
    ma(AuthenticationResponse, "WrappedData", 24),
    ma(AuthenticationResponse, "PrimaryWrappedData", 24),
    ma(AuthenticationConfirm, "DPPStatus", 25),
    ma(AuthenticationConfirm, "RespBSKeyHash", 26),
    ma(AuthenticationConfirm, "InitBSKeyHash", 27),
    ma(AuthenticationConfirm, "InitAuthTag", 28),
    ma(AuthenticationConfirm, "WrappedData", 29),
    iv(AuthenticationResponse, "InitNonce", 30),
    iv(AuthenticationResponse, "RespCapabilities", 31),
    iv(AuthenticationResponse, "RespAuthTag", 32),
    iv(AuthenticationConfirm, "InitAuthTag", 33),
    ma(PkexExchangeRequest, "FiniteCyclicGroup", 34),
    ma(PkexExchangeRequest, "EncryptedKey", 35),
    ma(PkexExchangeResponse, "DPPStatus", 36),
    ma(PkexExchangeResponse, "EncryptedKey", 37),
    ma(PkexCrRequest, "BSKey", 38),
    ma(PkexCrRequest, "InitAuthTag", 39),
    ma(PkexCrRequest, "WrappedData", 40),
    ma(PkexCrResponse, "BSKey", 41),
    ma(PkexCrResponse, "RespAuthTag", 42),
    ma(PkexCrResponse, "WrappedData", 43),
    iv(PkexExchangeRequest, "EncryptedKey", 44),
    iv(PkexExchangeResponse, "EncryptedKey", 45),
    iv(PkexExchangeResponse, "DPPStatus", 46),
    iv(PkexCrRequest, "BSKey", 47),
    iv(PkexCrResponse, "BSKey", 48),
    iv(PkexCrRequest, "InitAuthTag", 49),
    iv(PkexCrResponse, "RespAuthTag", 50),
    ma(ConfigurationRequest, "EnrolleeNonce", 51),
    ma(ConfigurationRequest, "ConfigAttr", 52),
    ma(ConfigurationRequest, "WrappedData", 53),
    ma(ConfigurationResponse, "EnrolleeNonce", 54),
    ma(ConfigurationResponse, "ConfigObj", 55),
    ma(ConfigurationResponse, "DPPStatus", 56),
    ma(ConfigurationResponse, "WrappedData", 57),
    iv(ConfigurationResponse, "DPPStatus", 58),
    iv(ConfigurationResponse, "EnrolleeNonce", 59),
    iv(AuthenticationResponse, "DPPStatus", 60),
    iv(AuthenticationConfirm, "DPPStatus", 61),
    ma(PeerDiscoveryRequest, "TransactionID", 62),
    ma(PeerDiscoveryRequest, "Connector", 63),
    ma(PeerDiscoveryResponse, "TransactionID", 64),
    ma(PeerDiscoveryResponse, "Connector", 65),
    iv(AuthenticationRequest, "InitProtocolKey", 66),
    iv(AuthenticationResponse, "RespProtocolKey", 67),
    iv(AuthenticationRequest, "RespBSKeyHash", 68),
    iv(AuthenticationRequest, "InitBSKeyHash", 69),
    iv(AuthenticationResponse, "RespBSKeyHash", 70),
    iv(AuthenticationResponse, "InitBSKeyHash", 71),
    iv(AuthenticationConfirm, "RespBSKeyHash", 72),
    iv(AuthenticationConfirm, "InitBSKeyHash", 73),
    iv(PeerDiscoveryResponse, "DPPStatus", 74),
    ma(PeerDiscoveryResponse, "DPPStatus", 75),
    iv(PeerDiscoveryRequest, "Connector", 76),
    iv(PeerDiscoveryResponse, "Connector", 77),
    stop(PkexExchangeResponse, 84),
    stop(PkexCrRequest, 85),
    stop(PkexCrResponse, 86),
    stop(AuthenticationRequest, 87),
    stop(AuthenticationResponse, 88),
    stop(AuthenticationConfirm, 89),
    stop(ConfigurationRequest, 90),
];

type FaultKey = (FaultStep, FrameType, String);

static FAULT_INDEX: Lazy<HashMap<FaultKey, u32>> = Lazy::new(|| {
    FAULT_TABLE
        .iter()
        .map(|f| ((f.step, f.frame, f.attribute.to_ascii_lowercase()), f.code))
        .collect()
});

/// Exact table lookup. The attribute is ignored for `Timeout` steps.
pub fn lookup(step: FaultStep, frame: FrameType, attribute: &str) -> Option<u32> {
    let attribute = match step {
        FaultStep::Timeout => String::new(),
        _ => attribute.to_ascii_lowercase(),
    };
    FAULT_INDEX.get(&(step, frame, attribute)).copied()
}

/// A resolved fault for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultPlan {
    pub step: FaultStep,
    pub frame: FrameType,
    pub code: u32,
}

/// Resolves the test station's selector, naming the first key that does not
/// resolve.
pub fn plan(step: &str, frame: &str, attribute: Option<&str>) -> Result<FaultPlan> {
    let step = FaultStep::parse(step).ok_or(Error::Unsupported("DPPStep"))?;
    let frame = FrameType::from_name(frame).ok_or(Error::Unsupported("DPPFrameType"))?;
    let code = match step {
        FaultStep::Timeout => lookup(step, frame, "").ok_or(Error::Unsupported("DPPFrameType"))?,
        _ => {
            let attribute = attribute.ok_or(Error::Missing("DPPIEAttribute"))?;
            lookup(step, frame, attribute).ok_or(Error::Unsupported("DPPIEAttribute"))?
        }
    };
    Ok(FaultPlan { step, frame, code })
}

impl FaultPlan {
    /// Event names that show the targeted frame on the air.
    fn watch_events(&self) -> &'static [&'static str] {
        match (self.frame, self.step) {
            (FrameType::ConfigurationRequest, _) => &["GAS-QUERY-START", "DPP-CONF-REQ-RX"],
            (FrameType::ConfigurationResponse, _) => &["DPP-CONF-REQ-RX", "DPP-CONF-SENT"],
            // A stop step processes the frame on reception and goes no further.
            (_, FaultStep::Timeout) => &["DPP-RX"],
            // DPP-TX-STATUS first: it shares the DPP-TX prefix.
            _ => &["DPP-TX-STATUS", "DPP-TX"],
        }
    }

    /// A damaged Action frame counts once its transmission is confirmed.
    fn needs_tx_status(&self) -> bool {
        self.step != FaultStep::Timeout && self.frame.code().is_some()
    }

    fn observed_in(&self, ev: &crate::traits::Event) -> bool {
        if ev.name == "DPP-TX-STATUS" {
            return false;
        }
        match self.frame.code() {
            Some(code) => ev.field("type").and_then(|t| t.parse::<u8>().ok()) == Some(code),
            None => true,
        }
    }
}

/// Watches for the faulted frame until the invocation budget runs out.
/// Seeing it means the damaged frame went out (or the peer retried). A
/// transmitted frame is `Errorsent` only if the TX status that follows it
/// is not `result=FAILED`.
pub(crate) async fn observe(inv: &mut Invocation<'_>, plan: &FaultPlan) -> Result<PhaseStatus> {
    tracing::info!(frame = ?plan.frame, step = ?plan.step, code = plan.code, "Watching for faulted frame");
    let deadline = deadline_after(inv.timeout);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(PhaseStatus::Timeout);
        }
        match inv.wait_within(plan.watch_events(), remaining).await? {
            None => return Ok(PhaseStatus::Timeout),
            Some(ev) if plan.observed_in(&ev) => {
                tracing::info!(event = %ev.line, "Faulted frame observed");
                break;
            }
            Some(_) => continue,
        }
    }
    if !plan.needs_tx_status() {
        return Ok(PhaseStatus::Errorsent);
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    match inv.wait_within(&["DPP-TX-STATUS"], remaining).await? {
        Some(ev) if ev.field("result") != Some("FAILED") => Ok(PhaseStatus::Errorsent),
        Some(ev) => {
            tracing::warn!(event = %ev.line, "Faulted frame was not delivered");
            Ok(PhaseStatus::Timeout)
        }
        None => Ok(PhaseStatus::Timeout),
    }
}
