use crate::dpp::command::{ConfObject, ConfiguratorParams, Listen, Reconfig};
use crate::dpp::conf;
use crate::dpp::network;
use crate::dpp::profile::{self, ConfiguratorProfile};
use crate::dpp::request::{ProvRole, ProvisioningRequest};
use crate::dpp::result::{Phase, PhaseStatus};
use crate::dpp::session::Session;
use crate::dpp::Invocation;
use crate::backends::utils::channel_to_frequency;
use crate::{Error, Result};

/// Credential reconfiguration for an already provisioned network. The
/// result line reports `ReconfigAuthResult` in the Auth slot.
pub(crate) async fn run(mut inv: Invocation<'_>, session: &mut Session, req: &ProvisioningRequest) -> Result<String> {
    match req.prov_role {
        Some(ProvRole::Configurator) => configurator(&mut inv, session, req).await?,
        Some(ProvRole::Enrollee) => enrollee(&mut inv, session, req).await?,
        Some(ProvRole::Both) => return Err(Error::Unsupported("DPPProvisioningRole")),
        None => return Err(Error::Missing("DPPProvisioningRole")),
    }
    Ok(inv.finish())
}

async fn configurator(inv: &mut Invocation<'_>, session: &mut Session, req: &ProvisioningRequest) -> Result<()> {
    let index = req.conf_index.ok_or(Error::Missing("DPPConfIndex"))?;
    let profile = ConfiguratorProfile::resolve(index, req.enrollee_kind, &inv.ctx.config.csrattrs_path).await?;
    let configurator = profile::ensure_configurator(&inv.ctx, session, &req.signing_curve).await?;
    let conf = ConfObject {
        profile: &profile,
        configurator,
        conn_status: req.status_query,
    };
    inv.ctx.send(&ConfiguratorParams(&conf)).await?;

    if let Some(chan) = req.listen_channel {
        let freq = channel_to_frequency(chan).ok_or(Error::Unsupported("DPPListenChannel"))?;
        inv.ctx
            .send(&Listen {
                freq,
                role: ProvRole::Configurator.as_arg(),
                mutual: false,
            })
            .await?;
    }

    let status = match inv.wait(&["DPP-CONF-REQ-RX"]).await? {
        Some(_) => PhaseStatus::Ok,
        None => PhaseStatus::Timeout,
    };
    if inv.record(Phase::ReconfigAuth, status).is_break() {
        return Ok(());
    }

    let Some(ev) = inv.wait(&["DPP-CONF-SENT", "DPP-CONF-FAILED"]).await? else {
        inv.conclude(Phase::Conf, PhaseStatus::Timeout);
        return Ok(());
    };
    let status = if ev.name == "DPP-CONF-SENT" { PhaseStatus::Ok } else { PhaseStatus::Failed };
    if inv.record(Phase::Conf, status).is_continue() && req.status_query {
        conf::await_status(inv).await?;
    }
    Ok(())
}

async fn enrollee(inv: &mut Invocation<'_>, session: &mut Session, req: &ProvisioningRequest) -> Result<()> {
    let network_id = session
        .network_id
        .ok_or_else(|| Error::Protocol("No DPP network to reconfigure".into()))?;
    inv.ctx.send(&Reconfig(network_id)).await?;

    let status = match inv.wait(&["GAS-QUERY-START"]).await? {
        Some(_) => PhaseStatus::Ok,
        None => PhaseStatus::Timeout,
    };
    if inv.record(Phase::ReconfigAuth, status).is_break() {
        return Ok(());
    }

    let Some(ev) = inv.wait(&["DPP-CONF-RECEIVED", "DPP-CONF-FAILED"]).await? else {
        inv.conclude(Phase::Conf, PhaseStatus::Timeout);
        return Ok(());
    };
    let status = if ev.name == "DPP-CONF-RECEIVED" { PhaseStatus::Ok } else { PhaseStatus::Failed };
    if inv.record(Phase::Conf, status).is_break() {
        return Ok(());
    }

    if req.wait_for_connect {
        // The network phase picks up the replacement network id on its way.
        network::run(inv, session).await
    } else {
        network::pick_up_network_id(inv, session).await
    }
}
