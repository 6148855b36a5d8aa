use dpp_core::dpp::{DppEngine, Params};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const UNKNOWN_COMMAND: &str = "status,INVALID,errorCode,Unknown command";

/// One parsed CAPI line: `<command>,<k1>,<v1>,...`.
#[derive(Debug)]
pub struct CapiCommand {
    pub name: String,
    pub params: Params,
}

impl CapiCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (name, tail) = line.split_once(',').unwrap_or((line, ""));
        Some(CapiCommand {
            name: name.trim().to_ascii_lowercase(),
            params: Params::from_capi(tail),
        })
    }

    /// Only DPP actions are handled by this agent.
    pub fn is_dpp_action(&self) -> bool {
        self.name == "dev_exec_action"
            && self
                .params
                .get("program")
                .is_some_and(|p| p.eq_ignore_ascii_case("DPP"))
    }
}

/// Accepts test station connections and serves them one line at a time.
/// Connections run concurrently; DPP commands are serialized by the engine.
pub async fn run_agent_server(engine: Arc<DppEngine>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("📡 Control agent listening on {}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!(%peer, "Test station connected");
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(engine, stream).await {
                tracing::warn!(%peer, "Connection ended with error: {}", e);
            }
            tracing::info!(%peer, "Test station disconnected");
        });
    }
}

async fn serve_connection(engine: Arc<DppEngine>, stream: TcpStream) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let Some(cmd) = CapiCommand::parse(&line) else {
            continue;
        };
        tracing::debug!(command = %cmd.name, "CAPI command received");
        if !cmd.is_dpp_action() {
            writer.write_all(format!("{}\r\n", UNKNOWN_COMMAND).as_bytes()).await?;
            continue;
        }

        writer.write_all(b"status,RUNNING\r\n").await?;
        let response = engine.execute(&cmd.params).await;
        tracing::info!(%response, "CAPI response");
        writer.write_all(format!("{}\r\n", response).as_bytes()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpp_core::backends::mock::{MockCa, MockDaemon};
    use dpp_core::config::AgentConfig;

    #[test]
    fn capi_lines_are_split_into_command_and_params() {
        let cmd = CapiCommand::parse("dev_exec_action,program,DPP,DPPActionType,GetLocalBootstrap,DPPBS,QR\r\n")
            .unwrap();
        assert_eq!(cmd.name, "dev_exec_action");
        assert!(cmd.is_dpp_action());
        assert_eq!(cmd.params.get("dppactiontype"), Some("GetLocalBootstrap"));
        assert_eq!(cmd.params.get("DPPBS"), Some("QR"));
    }

    #[test]
    fn other_commands_are_not_routed() {
        assert!(CapiCommand::parse("   ").is_none());
        assert!(!CapiCommand::parse("ca_get_version").unwrap().is_dpp_action());
        assert!(!CapiCommand::parse("dev_exec_action,program,WPA3").unwrap().is_dpp_action());
    }

    #[tokio::test]
    async fn session_replies_running_then_result() {
        let mock = MockDaemon::new();
        let engine = Arc::new(DppEngine::new(
            Arc::new(AgentConfig::default()),
            Arc::new(mock.clone()),
            Arc::new(MockCa::new("bag")),
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_connection(engine, stream).await.unwrap();
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer.write_all(b"ca_get_version\r\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), UNKNOWN_COMMAND);

        writer
            .write_all(b"dev_exec_action,program,DPP,DPPActionType,AutomaticDPP,DPPBS,QR\r\n")
            .await
            .unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "status,RUNNING");
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "status,ERROR,errorCode,Missing DPPAuthRole"
        );
        assert!(mock.sent().is_empty());
    }
}
