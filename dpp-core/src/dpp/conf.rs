use crate::backends::utils::hex_to_ascii;
use crate::dpp::Invocation;
use crate::dpp::command::{ApCommand, CaSet, ConfObject, ConfiguratorSign};
use crate::dpp::profile::ConfiguratorProfile;
use crate::dpp::request::EnrolleeKind;
use crate::dpp::result::{Phase, PhaseStatus};
use crate::traits::Event;
use crate::{Error, Result};
use std::ops::ControlFlow;

const CONF_EVENTS: &[&str] = &[
    "DPP-CONF-RECEIVED",
    "DPP-CONF-SENT",
    "DPP-CONF-FAILED",
    "DPP-MUD-URL",
    "DPP-CSR",
];

/// hostapd `wpa_key_mgmt` for each AKM string a configuration object can carry.
const AP_KEY_MGMT: &[(&str, &str)] = &[
    ("dpp", "DPP"),
    ("psk", "WPA-PSK"),
    ("sae", "SAE"),
    ("psk+sae", "WPA-PSK SAE"),
    ("dpp+sae", "DPP SAE"),
    ("dpp+psk+sae", "DPP SAE WPA-PSK"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfDirection {
    /// This device was the Configurator.
    Sent,
    /// This device was the Enrollee.
    Received,
}

/// Waits for the configuration exchange and records the Conf field.
/// `csr` enables certificate enrollment handling on the Configurator.
pub(crate) async fn run(inv: &mut Invocation<'_>, csr: bool) -> Result<ControlFlow<(), ConfDirection>> {
    if inv.run_fault(Phase::Conf).await?.is_some() {
        return Ok(ControlFlow::Break(()));
    }

    let names = if csr { CONF_EVENTS } else { &CONF_EVENTS[..4] };
    let direction = loop {
        let Some(ev) = inv.wait(names).await? else {
            inv.conclude(Phase::Conf, PhaseStatus::Timeout);
            return Ok(ControlFlow::Break(()));
        };
        match ev.name.as_str() {
            "DPP-MUD-URL" => {
                tracing::info!(url = ev.payload(), "MUD URL received");
                inv.results.set_mud_url(ev.payload());
            }
            "DPP-CSR" => handle_csr(inv, &ev).await?,
            "DPP-CONF-FAILED" => {
                tracing::warn!(event = %ev.line, "Configuration exchange failed");
                inv.conclude(Phase::Conf, PhaseStatus::Failed);
                return Ok(ControlFlow::Break(()));
            }
            "DPP-CONF-SENT" => break ConfDirection::Sent,
            _ => break ConfDirection::Received,
        }
    };

    let status = if direction == ConfDirection::Received && inv.ctx.config.is_ap() {
        apply_ap_config(inv).await?
    } else {
        PhaseStatus::Ok
    };
    Ok(match inv.record(Phase::Conf, status) {
        ControlFlow::Continue(()) => ControlFlow::Continue(direction),
        ControlFlow::Break(()) => ControlFlow::Break(()),
    })
}

/// Configurator side: connection status reported back by the Enrollee.
pub(crate) async fn await_status(inv: &mut Invocation<'_>) -> Result<()> {
    let Some(ev) = inv.wait(&["DPP-CONN-STATUS-RESULT"]).await? else {
        inv.conclude(Phase::Status, PhaseStatus::Timeout);
        return Ok(());
    };
    let code = ev
        .field("result")
        .and_then(|r| r.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("malformed status result '{}'", ev.line)))?;
    inv.conclude(Phase::Status, PhaseStatus::Code(code));
    Ok(())
}

/// Signs a configuration object for this device itself. An AP applies it to
/// its running configuration immediately.
pub(crate) async fn self_configure(inv: &mut Invocation<'_>, index: u8, configurator: u32) -> Result<()> {
    let config = inv.ctx.config;
    let kind = if config.is_ap() { EnrolleeKind::Ap } else { EnrolleeKind::Sta };
    let profile = ConfiguratorProfile::resolve(index, kind, &config.csrattrs_path).await?;
    let conf = ConfObject {
        profile: &profile,
        configurator,
        conn_status: false,
    };
    inv.ctx.send(&ConfiguratorSign(&conf)).await?;
    if config.is_ap() {
        let status = apply_ap_config(inv).await?;
        if !status.is_ok() {
            return Err(Error::Protocol(format!("Self-configuration failed: {}", status)));
        }
    }
    tracing::info!(role = %profile.role, "Self-configuration applied");
    Ok(())
}

async fn handle_csr(inv: &mut Invocation<'_>, ev: &Event) -> Result<()> {
    let peer = ev
        .field("peer")
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("malformed CSR event '{}'", ev.line)))?;
    let csr = ev
        .field("csr")
        .ok_or_else(|| Error::Protocol(format!("malformed CSR event '{}'", ev.line)))?;
    tracing::info!(peer, "Signing enrollee CSR");
    let bag = inv.ca.sign_csr(csr).await?;
    inv.ctx
        .send(&CaSet {
            peer,
            name: "certBag",
            value: &bag,
        })
        .await
}

fn ap_key_mgmt(akm: &str) -> Option<&'static str> {
    AP_KEY_MGMT
        .iter()
        .find(|(name, _)| *name == akm)
        .map(|(_, mgmt)| *mgmt)
}

/// Splits `<value>[ <expiry>]` as carried by key events.
fn value_and_expiry(payload: &str) -> (String, Option<String>) {
    match payload.split_once(' ') {
        Some((v, exp)) if !exp.trim().is_empty() => (v.to_string(), Some(exp.trim().to_string())),
        _ => (payload.trim().to_string(), None),
    }
}

/// Reads the configuration object events that follow `DPP-CONF-RECEIVED` on
/// an AP and rewrites the running BSS with them.
///
/// A missing object event is `FAILED`, as is any rejected `SET`. A missing
/// `AP-ENABLED` after the restart is `Timeout`.
async fn apply_ap_config(inv: &mut Invocation<'_>) -> Result<PhaseStatus> {
    let Some(akm) = inv.wait(&["DPP-CONFOBJ-AKM"]).await? else {
        tracing::warn!("No AKM in received configuration object");
        return Ok(PhaseStatus::Failed);
    };
    let akm = akm.payload().to_string();
    let Some(key_mgmt) = ap_key_mgmt(&akm) else {
        tracing::warn!(%akm, "Unsupported AKM for AP configuration");
        return Ok(PhaseStatus::Failed);
    };
    let Some(ssid) = inv.wait(&["DPP-CONFOBJ-SSID"]).await? else {
        tracing::warn!("No SSID in received configuration object");
        return Ok(PhaseStatus::Failed);
    };

    let mut sets: Vec<(&str, String)> = vec![
        ("wpa", "2".into()),
        ("wpa_key_mgmt", key_mgmt.into()),
        ("rsn_pairwise", "CCMP".into()),
        ("ssid", ssid.payload().to_string()),
    ];

    let tokens: Vec<&str> = akm.split('+').collect();
    if tokens.contains(&"dpp") {
        let mut keys = Vec::new();
        for name in ["DPP-CONNECTOR", "DPP-C-SIGN-KEY", "DPP-NET-ACCESS-KEY"] {
            match inv.wait(&[name]).await? {
                Some(ev) => keys.push(ev.payload().to_string()),
                None => {
                    tracing::warn!(event = name, "Configuration object incomplete");
                    return Ok(PhaseStatus::Failed);
                }
            }
        }
        sets.push(("dpp_connector", keys[0].clone()));
        let (csign, csign_expiry) = value_and_expiry(&keys[1]);
        sets.push(("dpp_csign", csign));
        if let Some(exp) = csign_expiry {
            sets.push(("dpp_csign_expiry", exp));
        }
        let (nak, nak_expiry) = value_and_expiry(&keys[2]);
        sets.push(("dpp_netaccesskey", nak));
        if let Some(exp) = nak_expiry {
            sets.push(("dpp_netaccesskey_expiry", exp));
        }
    }
    if tokens.contains(&"psk") || tokens.contains(&"sae") {
        let Some(cred) = inv.wait(&["DPP-CONFOBJ-PASS", "DPP-CONFOBJ-PSK"]).await? else {
            tracing::warn!("No passphrase or PSK in configuration object");
            return Ok(PhaseStatus::Failed);
        };
        if cred.name == "DPP-CONFOBJ-PASS" {
            match hex_to_ascii(cred.payload()) {
                Ok(pass) => sets.push(("wpa_passphrase", pass)),
                Err(e) => {
                    tracing::warn!("Bad passphrase encoding: {}", e);
                    return Ok(PhaseStatus::Failed);
                }
            }
        } else {
            sets.push(("wpa_psk", cred.payload().to_string()));
        }
    }
    sets.push(("start_disabled", "0".into()));

    let mut cmds: Vec<ApCommand<'_>> = sets.iter().map(|(k, v)| ApCommand::Set(*k, v.as_str())).collect();
    cmds.push(ApCommand::Disable);
    cmds.push(ApCommand::Enable);
    for cmd in &cmds {
        if let Err(e) = inv.ctx.send(cmd).await {
            tracing::error!(cmd = %cmd, "AP configuration update failed: {}", e);
            return Ok(PhaseStatus::Failed);
        }
    }

    match inv.wait(&["AP-ENABLED"]).await? {
        Some(_) => {
            tracing::info!(%akm, "AP restarted with received configuration");
            Ok(PhaseStatus::Ok)
        }
        None => Ok(PhaseStatus::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn akm_maps_to_hostapd_key_mgmt() {
        assert_eq!(ap_key_mgmt("dpp"), Some("DPP"));
        assert_eq!(ap_key_mgmt("psk+sae"), Some("WPA-PSK SAE"));
        assert_eq!(ap_key_mgmt("dpp+psk+sae"), Some("DPP SAE WPA-PSK"));
        assert_eq!(ap_key_mgmt("dot1x"), None);
    }

    #[test]
    fn key_events_split_expiry() {
        assert_eq!(value_and_expiry("3059301306"), ("3059301306".to_string(), None));
        assert_eq!(
            value_and_expiry("3059301306 1735689600"),
            ("3059301306".to_string(), Some("1735689600".to_string()))
        );
    }
}
