use crate::backends::utils::{channel_to_frequency, op_class_channel_to_frequency};
use crate::config::AgentConfig;
use crate::dpp::Invocation;
use crate::dpp::bootstrap;
use crate::dpp::command::{AuthInit, Chirp, ConfObject, ConfiguratorParams, Listen, PkexAdd};
use crate::dpp::request::{AuthRole, ProvisioningRequest, Transport};
use crate::dpp::result::{Phase, PhaseStatus};
use crate::dpp::session::Session;
use crate::{Error, Result};
use std::ops::ControlFlow;

const AUTH_EVENTS: &[&str] = &[
    "DPP-AUTH-SUCCESS",
    "DPP-NOT-COMPATIBLE",
    "DPP-RESPONSE-PENDING",
    "DPP-SCAN-PEER-QR-CODE",
    "DPP-AUTH-INIT-FAILED",
    "DPP-AUTH-DIRECTION",
];

/// Default listen frequency (channel 11).
const LISTEN_FREQ: u32 = 2462;
/// PKEX always runs on channel 6.
const PKEX_FREQ: u32 = 2437;

/// Issues the commands that start authentication: the Initiator's init
/// command or the Responder's listen/chirp.
pub(crate) async fn start(
    inv: &mut Invocation<'_>,
    session: &mut Session,
    req: &ProvisioningRequest,
    transport: Transport,
    conf: Option<&ConfObject<'_>>,
    own_pkex: Option<u32>,
) -> Result<()> {
    let role = req.prov_role.ok_or(Error::Missing("DPPProvisioningRole"))?;
    let auth_role = req.auth_role.ok_or(Error::Missing("DPPAuthRole"))?;

    let pkex_code = || req.pkex_code.as_deref().ok_or(Error::Missing("DPPPKEXCode"));
    let pkex_own = || own_pkex.ok_or_else(|| Error::Protocol("No PKEX bootstrap available".into()));

    match auth_role {
        AuthRole::Initiator => {
            let neg_freq = req
                .subsequent_channel
                .as_deref()
                .map(|c| op_class_channel_to_frequency(c).ok_or(Error::Unsupported("DPPSubsequentChannel")))
                .transpose()?;

            if transport == Transport::Pkex {
                let cmd = PkexAdd {
                    own: pkex_own()?,
                    init: true,
                    role: role.as_arg(),
                    conf,
                    identifier: req.pkex_identifier.as_deref(),
                    code: pkex_code()?,
                };
                return inv.ctx.send(&cmd).await;
            }

            let peer = bootstrap::resolve_peer(&inv.ctx, session, transport, auth_role).await?;
            let own = if req.mutual {
                Some(
                    session
                        .local_handle()
                        .ok_or_else(|| Error::Protocol("No local bootstrap for mutual authentication".into()))?,
                )
            } else {
                None
            };
            inv.ctx
                .send(&AuthInit {
                    peer,
                    own,
                    role: role.as_arg(),
                    neg_freq,
                    conf,
                })
                .await
        }
        AuthRole::Responder => {
            let parse_now = transport != Transport::Pkex
                && req.delay_qr_response.is_none()
                && (req.mutual || transport == Transport::NfcNegotiated);
            if parse_now {
                bootstrap::resolve_peer(&inv.ctx, session, transport, auth_role).await?;
            }

            if role.may_configure() {
                if let Some(conf) = conf {
                    inv.ctx.send(&ConfiguratorParams(conf)).await?;
                }
            }

            if transport == Transport::Pkex {
                inv.ctx
                    .send(&PkexAdd {
                        own: pkex_own()?,
                        init: false,
                        role: role.as_arg(),
                        conf: None,
                        identifier: req.pkex_identifier.as_deref(),
                        code: pkex_code()?,
                    })
                    .await?;
            }

            let freq = listen_freq(req, transport, inv.ctx.config)?;
            if req.chirp {
                let own = session
                    .local_handle()
                    .ok_or_else(|| Error::Protocol("No local bootstrap to chirp".into()))?;
                inv.ctx.send(&Chirp { own, listen: freq }).await
            } else if inv.ctx.config.is_ap() {
                // hostapd answers on its operating channel without a listen command.
                Ok(())
            } else {
                inv.ctx
                    .send(&Listen {
                        freq,
                        role: role.as_arg(),
                        mutual: req.mutual,
                    })
                    .await
            }
        }
    }
}

fn listen_freq(req: &ProvisioningRequest, transport: Transport, config: &AgentConfig) -> Result<u32> {
    if let Some(chan) = req.listen_channel {
        return channel_to_frequency(chan).ok_or(Error::Unsupported("DPPListenChannel"));
    }
    if transport == Transport::Pkex {
        return Ok(PKEX_FREQ);
    }
    if config.is_ap() {
        return Ok(channel_to_frequency(config.ap_channel).unwrap_or(LISTEN_FREQ));
    }
    Ok(LISTEN_FREQ)
}

/// Records the Bootstrap and Auth fields.
pub(crate) async fn await_outcome(
    inv: &mut Invocation<'_>,
    session: &mut Session,
    req: &ProvisioningRequest,
    transport: Transport,
) -> Result<ControlFlow<()>> {
    if let Some(flow) = inv.run_fault(Phase::Bootstrap).await? {
        return Ok(flow);
    }
    if inv.record(Phase::Bootstrap, PhaseStatus::Ok).is_break() {
        return Ok(ControlFlow::Break(()));
    }
    if let Some(flow) = inv.run_fault(Phase::Auth).await? {
        return Ok(flow);
    }

    let auth_role = req.auth_role.ok_or(Error::Missing("DPPAuthRole"))?;
    let mut mutual_seen: Option<bool> = None;
    let mut rescanned = false;

    loop {
        let Some(ev) = inv.wait(AUTH_EVENTS).await? else {
            return Ok(inv.record(Phase::Auth, PhaseStatus::Timeout));
        };
        match ev.name.as_str() {
            "DPP-AUTH-DIRECTION" => {
                mutual_seen = Some(ev.field("mutual") == Some("1"));
            }
            "DPP-RESPONSE-PENDING" | "DPP-SCAN-PEER-QR-CODE" => {
                if rescanned {
                    tracing::warn!(event = %ev.line, "Peer asked for the bootstrap code twice");
                    return Ok(inv.record(Phase::Auth, PhaseStatus::Failed));
                }
                rescanned = true;
                if let Some(delay) = req.delay_qr_response {
                    tracing::info!(secs = delay.as_secs(), "Delaying peer QR code");
                    tokio::time::sleep(delay).await;
                }
                bootstrap::resolve_peer(&inv.ctx, session, transport, auth_role).await?;
            }
            "DPP-NOT-COMPATIBLE" => {
                tracing::warn!(event = %ev.line, "Peer roles not compatible");
                return Ok(inv.record(Phase::Auth, PhaseStatus::RolesNotCompatible));
            }
            "DPP-AUTH-INIT-FAILED" => {
                tracing::warn!(event = %ev.line, "Authentication failed");
                return Ok(inv.record(Phase::Auth, PhaseStatus::Failed));
            }
            _ => {
                if req.mutual && mutual_seen != Some(true) {
                    return Err(Error::Protocol("Peer did not use mutual authentication".into()));
                }
                return Ok(inv.record(Phase::Auth, PhaseStatus::Ok));
            }
        }
    }
}
