use crate::config::AgentConfig;
use crate::traits::DaemonClient;
use std::sync::Arc;

#[cfg(not(any(feature = "backend_wpa_ctrl", feature = "backend_mock")))]
compile_error!("Select a daemon backend feature: backend_wpa_ctrl or backend_mock.");

/// Creates the daemon client chosen at compile time.
/// `backend_mock` wins when both backend features are enabled.
pub fn create_client(config: &AgentConfig) -> Arc<dyn DaemonClient> {
    #[cfg(feature = "backend_mock")]
    {
        let _ = config;
        tracing::info!("💿 Backend: scripted mock daemon selected (no hardware)");
        Arc::new(crate::backends::mock::MockDaemon::new())
    }
    #[cfg(all(feature = "backend_wpa_ctrl", not(feature = "backend_mock")))]
    {
        tracing::info!(
            ctrl_dir = %config.ctrl_dir().display(),
            ifname = config.ifname(),
            "📦 Backend: wpa_ctrl control socket selected"
        );
        Arc::new(crate::backends::wpa_ctrl::WpaCtrlClient::new(
            config.ctrl_dir(),
            &config.client_socket_dir,
            config.reply_timeout,
        ))
    }
}
