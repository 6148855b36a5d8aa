use crate::dpp::Invocation;
use crate::dpp::result::{Phase, PhaseStatus};
use crate::dpp::session::Session;
use crate::Result;
use crate::traits::Event;
use std::time::Duration;

const NETWORK_EVENTS: &[&str] = &[
    "DPP-CONFOBJ-AKM",
    "DPP-NETWORK-ID",
    "PMKSA-CACHE-ADDED",
    "CTRL-EVENT-CONNECTED",
    "CTRL-EVENT-ASSOC-REJECT",
];

/// How long a station waits for the network id when it does not follow
/// the connection. The daemon reports it right after the configuration.
const NETWORK_ID_WAIT: Duration = Duration::from_secs(5);

/// Station Enrollee that does not wait for the connection: stores the new
/// network id so a later reconfiguration can name it.
pub(crate) async fn pick_up_network_id(inv: &mut Invocation<'_>, session: &mut Session) -> Result<()> {
    let budget = inv.timeout.min(NETWORK_ID_WAIT);
    match inv.wait_within(&["DPP-NETWORK-ID"], budget).await? {
        Some(ev) => store_network_id(session, &ev),
        None => tracing::warn!("No network id reported for the received configuration"),
    }
    Ok(())
}

fn store_network_id(session: &mut Session, ev: &Event) {
    match ev.payload().trim().parse() {
        Ok(id) => {
            tracing::info!(network_id = id, "Provisioned network added");
            session.network_id = Some(id);
        }
        Err(_) => tracing::warn!(event = %ev.line, "Unparsable network id"),
    }
}

/// Station Enrollee after configuration: picks up the new network id, then
/// follows the connection. A DPP AKM runs network introduction first, which
/// shows up as a PMKSA cache entry before the connection event. PSK/SAE
/// networks connect directly and report no introduction field.
pub(crate) async fn run(inv: &mut Invocation<'_>, session: &mut Session) -> Result<()> {
    if inv.run_fault(Phase::NetworkIntro).await?.is_some() {
        return Ok(());
    }

    // None until the configuration object's AKM is seen.
    let mut intro_expected: Option<bool> = None;
    let mut intro_done = false;

    loop {
        let Some(ev) = inv.wait(NETWORK_EVENTS).await? else {
            let phase = if !intro_done && intro_expected != Some(false) {
                Phase::NetworkIntro
            } else {
                Phase::NetworkConnect
            };
            inv.conclude(phase, PhaseStatus::Timeout);
            return Ok(());
        };
        match ev.name.as_str() {
            "DPP-CONFOBJ-AKM" => {
                intro_expected = Some(ev.payload().split('+').any(|a| a == "dpp"));
            }
            "DPP-NETWORK-ID" => store_network_id(session, &ev),
            "PMKSA-CACHE-ADDED" => {
                if !intro_done && intro_expected != Some(false) {
                    intro_done = true;
                    if inv.record(Phase::NetworkIntro, PhaseStatus::Ok).is_break() {
                        return Ok(());
                    }
                }
            }
            "CTRL-EVENT-CONNECTED" => {
                inv.conclude(Phase::NetworkConnect, PhaseStatus::Ok);
                return Ok(());
            }
            _ => {
                tracing::warn!(event = %ev.line, "Association rejected");
                inv.conclude(Phase::NetworkConnect, PhaseStatus::Failed);
                return Ok(());
            }
        }
    }
}
