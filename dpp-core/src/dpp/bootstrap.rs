use crate::backends::utils::{ascii_to_hex, hex_to_ascii, parse_status_field};
use crate::dpp::Ctx;
use crate::dpp::command::{BootstrapGen, BootstrapGetUri, BootstrapType, PeerUri};
use crate::dpp::profile::parse_id;
use crate::dpp::request::{AuthRole, ProvisioningRequest, Transport};
use crate::dpp::session::{BootstrapIdentity, Session};
use crate::{Error, Result};

/// Generates the local QR/NFC bootstrap key and returns its URI hex-encoded.
pub(crate) async fn generate_local(ctx: Ctx<'_>, session: &mut Session, req: &ProvisioningRequest) -> Result<String> {
    let transport = req.transport()?;
    let kind = match transport {
        Transport::Qr => BootstrapType::QrCode,
        Transport::NfcStatic | Transport::NfcNegotiated => BootstrapType::NfcUri,
        Transport::Pkex => return Err(Error::Unsupported("DPPBS")),
    };

    let mac = own_mac(&ctx).await?;
    let chan = match &req.channel_list {
        Some(list) => list.clone(),
        None if ctx.config.is_ap() => format!("81/{}", ctx.config.ap_channel),
        None => "81/11".to_string(),
    };

    let reply = ctx
        .send_recv(&BootstrapGen {
            kind,
            curve: &req.curve,
            chan: Some(&chan),
            mac: Some(&mac),
        })
        .await?;
    let handle = parse_id(&reply, "DPP_BOOTSTRAP_GEN")?;

    let uri = ctx.send_recv(&BootstrapGetUri(handle)).await?.trim().to_string();
    if !uri.starts_with("DPP:") {
        return Err(Error::Protocol(format!("unexpected bootstrap URI '{}'", uri)));
    }
    tracing::info!(handle, %uri, "Local bootstrap generated");

    session.local = Some(BootstrapIdentity {
        handle: Some(handle),
        curve: req.curve.clone(),
        transport,
        uri: uri.clone(),
    });
    Ok(ascii_to_hex(&uri))
}

/// Generates the PKEX bootstrap key used for one flow.
pub(crate) async fn generate_pkex(ctx: &Ctx<'_>, curve: &str) -> Result<u32> {
    let reply = ctx
        .send_recv(&BootstrapGen {
            kind: BootstrapType::Pkex,
            curve,
            chan: None,
            mac: None,
        })
        .await?;
    parse_id(&reply, "DPP_BOOTSTRAP_GEN")
}

/// Stores the peer URI; it is handed to the daemon only when a flow needs it.
pub(crate) fn set_peer(session: &mut Session, hex: &str) -> Result<()> {
    let uri = hex_to_ascii(hex)?;
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(Error::Missing("DPPBootstrappingdata"));
    }
    tracing::info!(%uri, "Peer bootstrap set");
    session.set_peer(uri.to_string());
    Ok(())
}

/// Returns the daemon handle for the stored peer URI, parsing it on first
/// use.
pub(crate) async fn resolve_peer(
    ctx: &Ctx<'_>,
    session: &mut Session,
    transport: Transport,
    role: AuthRole,
) -> Result<u32> {
    let own = session.local_handle();
    let peer = session.peer.as_mut().ok_or(Error::Missing("DPPBootstrappingdata"))?;
    if let Some(handle) = peer.handle {
        return Ok(handle);
    }

    let uri = peer.uri.as_str();
    let cmd = match transport {
        Transport::Qr | Transport::Pkex => PeerUri::QrCode(uri),
        Transport::NfcStatic => PeerUri::NfcUri(uri),
        Transport::NfcNegotiated => {
            let own = own.ok_or_else(|| Error::Protocol("No local bootstrap for NFC handover".into()))?;
            match role {
                AuthRole::Initiator => PeerUri::HandoverReq { own, uri },
                AuthRole::Responder => PeerUri::HandoverSel { own, uri },
            }
        }
    };
    let reply = ctx.send_recv(&cmd).await?;
    let handle = parse_id(&reply, "peer bootstrap")?;
    tracing::debug!(handle, "Peer bootstrap parsed");
    peer.handle = Some(handle);
    peer.transport = transport;
    Ok(handle)
}

async fn own_mac(ctx: &Ctx<'_>) -> Result<String> {
    let mac = if ctx.config.is_ap() {
        let path = ctx.config.sysfs_net_dir.join(ctx.ifname()).join("address");
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::Daemon(format!("cannot read MAC address from {}: {}", path.display(), e))
        })?
    } else {
        let status = ctx.query("STATUS").await?;
        parse_status_field(&status, "address")
            .ok_or_else(|| Error::Daemon("STATUS reply has no address".into()))?
            .to_string()
    };
    Ok(mac.trim().replace(':', "").to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::MockDaemon;
    use crate::config::{AgentConfig, DeviceType};
    use crate::dpp::request::Params;

    fn request(p: Params) -> ProvisioningRequest {
        ProvisioningRequest::parse(&p).unwrap()
    }

    #[tokio::test]
    async fn station_bootstrap_uses_status_address() {
        let mock = MockDaemon::new();
        mock.reply("STATUS", "wpa_state=DISCONNECTED\naddress=02:00:00:00:00:01\n")
            .reply("DPP_BOOTSTRAP_GEN", "1")
            .reply("DPP_BOOTSTRAP_GET_URI", "DPP:C:81/11;M:020000000001;K:MDkw;;\n");
        let config = AgentConfig::default();
        let ctx = Ctx { client: &mock, config: &config };
        let mut session = Session::new();

        let req = request(
            Params::new()
                .with("DPPActionType", "GetLocalBootstrap")
                .with("DPPBS", "QR")
                .with("DPPCryptoIdentifier", "P-384"),
        );
        let hex = generate_local(ctx, &mut session, &req).await.unwrap();
        assert_eq!(hex_to_ascii(&hex).unwrap(), "DPP:C:81/11;M:020000000001;K:MDkw;;");
        assert_eq!(
            mock.sent(),
            vec![
                "STATUS",
                "DPP_BOOTSTRAP_GEN type=qrcode curve=P-384 chan=81/11 mac=020000000001",
                "DPP_BOOTSTRAP_GET_URI 1",
            ]
        );
        assert_eq!(session.local_handle(), Some(1));
    }

    #[tokio::test]
    async fn ap_bootstrap_reads_sysfs_and_operating_channel() {
        let dir = std::env::temp_dir().join(format!("dpp-sysfs-{}", std::process::id()));
        tokio::fs::create_dir_all(dir.join("wlan1")).await.unwrap();
        tokio::fs::write(dir.join("wlan1/address"), "02:00:00:00:01:00\n").await.unwrap();

        let mock = MockDaemon::new();
        mock.reply("DPP_BOOTSTRAP_GEN", "2")
            .reply("DPP_BOOTSTRAP_GET_URI", "DPP:K:abc;;");
        let config = AgentConfig {
            device_type: DeviceType::Ap,
            hostapd_ifname: "wlan1".into(),
            sysfs_net_dir: dir.clone(),
            ap_channel: 6,
            ..AgentConfig::default()
        };
        let ctx = Ctx { client: &mock, config: &config };
        let mut session = Session::new();

        let req = request(Params::new().with("DPPActionType", "GetLocalBootstrap").with("DPPBS", "NFC"));
        generate_local(ctx, &mut session, &req).await.unwrap();
        assert_eq!(mock.sent()[0], "DPP_BOOTSTRAP_GEN type=nfc-uri curve=P-256 chan=81/6 mac=020000000100");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn peer_is_parsed_once_and_reused() {
        let mock = MockDaemon::new();
        mock.reply("DPP_QR_CODE", "7");
        let config = AgentConfig::default();
        let ctx = Ctx { client: &mock, config: &config };
        let mut session = Session::new();

        set_peer(&mut session, &ascii_to_hex("DPP:K:peer;;")).unwrap();
        assert!(mock.sent().is_empty());
        assert_eq!(resolve_peer(&ctx, &mut session, Transport::Qr, AuthRole::Initiator).await.unwrap(), 7);
        assert_eq!(resolve_peer(&ctx, &mut session, Transport::Qr, AuthRole::Initiator).await.unwrap(), 7);
        assert_eq!(mock.sent(), vec!["DPP_QR_CODE DPP:K:peer;;"]);
    }

    #[tokio::test]
    async fn negotiated_handover_needs_local_bootstrap() {
        let mock = MockDaemon::new();
        let config = AgentConfig::default();
        let ctx = Ctx { client: &mock, config: &config };
        let mut session = Session::new();
        set_peer(&mut session, &ascii_to_hex("DPP:K:peer;;")).unwrap();
        assert!(resolve_peer(&ctx, &mut session, Transport::NfcNegotiated, AuthRole::Responder).await.is_err());

        mock.reply("DPP_NFC_HANDOVER_SEL", "3");
        session.local = Some(BootstrapIdentity {
            handle: Some(1),
            curve: "P-256".into(),
            transport: Transport::NfcNegotiated,
            uri: "DPP:K:own;;".into(),
        });
        let handle = resolve_peer(&ctx, &mut session, Transport::NfcNegotiated, AuthRole::Responder).await.unwrap();
        assert_eq!(handle, 3);
        assert_eq!(mock.sent(), vec!["DPP_NFC_HANDOVER_SEL own=1 uri=DPP:K:peer;;"]);
    }

    #[test]
    fn bad_hex_is_rejected() {
        let mut session = Session::new();
        assert!(set_peer(&mut session, "not hex").is_err());
        assert!(session.peer.is_none());
    }
}
