use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Whether the device under test runs as a station or as an AP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Station,
    Ap,
}

/// Agent runtime configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub device_type: DeviceType,

    // === 网络接口 ===
    pub station_ifname: String,
    pub hostapd_ifname: String,
    pub sysfs_net_dir: PathBuf,
    /// Operating channel of the AP, used for bootstrap and listen defaults.
    pub ap_channel: u8,

    // === 控制套接字 ===
    pub wpa_ctrl_dir: PathBuf,
    pub hapd_ctrl_dir: PathBuf,
    pub client_socket_dir: PathBuf,
    pub reply_timeout: Duration,

    /// Process-wide event wait budget; `DPPTimeout` overrides it per command.
    pub default_timeout: Duration,

    pub listen_addr: SocketAddr,

    // === dot1x 注册 ===
    pub csrattrs_path: PathBuf,
    pub ca_cert_dir: PathBuf,
    pub ca_program: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            device_type: DeviceType::Station,
            station_ifname: "wlan0".into(),
            hostapd_ifname: "wlan0".into(),
            sysfs_net_dir: PathBuf::from("/sys/class/net"),
            ap_channel: 11,
            wpa_ctrl_dir: PathBuf::from("/var/run/wpa_supplicant"),
            hapd_ctrl_dir: PathBuf::from("/var/run/hostapd"),
            client_socket_dir: PathBuf::from("/tmp"),
            reply_timeout: Duration::from_secs(10),
            default_timeout: Duration::from_secs(120),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            csrattrs_path: PathBuf::from("/etc/dpp-agent/dpp-csrattrs"),
            ca_cert_dir: PathBuf::from("/etc/dpp-agent"),
            ca_program: "dpp-ca.py".into(),
        }
    }
}

impl AgentConfig {
    /// The interface DPP commands are addressed to.
    pub fn ifname(&self) -> &str {
        match self.device_type {
            DeviceType::Station => &self.station_ifname,
            DeviceType::Ap => &self.hostapd_ifname,
        }
    }

    /// Control socket directory of the daemon serving `ifname()`.
    pub fn ctrl_dir(&self) -> &Path {
        match self.device_type {
            DeviceType::Station => &self.wpa_ctrl_dir,
            DeviceType::Ap => &self.hapd_ctrl_dir,
        }
    }

    pub fn is_ap(&self) -> bool {
        self.device_type == DeviceType::Ap
    }
}

/// 用于解析 TOML 的临时结构，所有字段均可省略
#[derive(Deserialize, Default)]
#[serde(default)]
struct AgentConfigToml {
    device_type: Option<String>,
    station_ifname: Option<String>,
    hostapd_ifname: Option<String>,
    sysfs_net_dir: Option<PathBuf>,
    ap_channel: Option<u8>,
    wpa_ctrl_dir: Option<PathBuf>,
    hapd_ctrl_dir: Option<PathBuf>,
    client_socket_dir: Option<PathBuf>,
    reply_timeout_secs: Option<u64>,
    default_timeout_secs: Option<u64>,
    listen_addr: Option<String>,
    csrattrs_path: Option<PathBuf>,
    ca_cert_dir: Option<PathBuf>,
    ca_program: Option<String>,
}

impl TryFrom<AgentConfigToml> for AgentConfig {
    type Error = crate::Error;

    fn try_from(t: AgentConfigToml) -> crate::Result<Self> {
        let d = AgentConfig::default();

        let device_type = match t.device_type.as_deref() {
            None => d.device_type,
            Some(v) if v.eq_ignore_ascii_case("station") || v.eq_ignore_ascii_case("sta") => {
                DeviceType::Station
            }
            Some(v) if v.eq_ignore_ascii_case("ap") => DeviceType::Ap,
            Some(v) => {
                return Err(crate::Error::Config(format!("unknown device_type '{}'", v)));
            }
        };

        let listen_addr = match t.listen_addr {
            Some(s) => SocketAddr::from_str(&s)
                .map_err(|e| crate::Error::Config(format!("invalid listen_addr '{}': {}", s, e)))?,
            None => d.listen_addr,
        };

        if t.default_timeout_secs == Some(0) {
            return Err(crate::Error::Config("default_timeout_secs must be non-zero".into()));
        }

        Ok(AgentConfig {
            device_type,
            station_ifname: t.station_ifname.unwrap_or(d.station_ifname),
            hostapd_ifname: t.hostapd_ifname.unwrap_or(d.hostapd_ifname),
            sysfs_net_dir: t.sysfs_net_dir.unwrap_or(d.sysfs_net_dir),
            ap_channel: t.ap_channel.unwrap_or(d.ap_channel),
            wpa_ctrl_dir: t.wpa_ctrl_dir.unwrap_or(d.wpa_ctrl_dir),
            hapd_ctrl_dir: t.hapd_ctrl_dir.unwrap_or(d.hapd_ctrl_dir),
            client_socket_dir: t.client_socket_dir.unwrap_or(d.client_socket_dir),
            reply_timeout: t
                .reply_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(d.reply_timeout),
            default_timeout: t
                .default_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(d.default_timeout),
            listen_addr,
            csrattrs_path: t.csrattrs_path.unwrap_or(d.csrattrs_path),
            ca_cert_dir: t.ca_cert_dir.unwrap_or(d.ca_cert_dir),
            ca_program: t.ca_program.unwrap_or(d.ca_program),
        })
    }
}

/// 从 TOML 字符串加载应用配置
pub fn load_config_from_toml_str(s: &str) -> crate::Result<AgentConfig> {
    let parsed: AgentConfigToml = toml::from_str(s)?;
    AgentConfig::try_from(parsed)
}

/// Loads the configuration file, falling back to defaults when it is absent.
pub async fn load_config(path: Option<&Path>) -> crate::Result<AgentConfig> {
    let Some(path) = path else {
        tracing::info!("No configuration file given, using defaults");
        return Ok(AgentConfig::default());
    };
    match tokio::fs::read_to_string(path).await {
        Ok(s) => {
            tracing::info!(path = %path.display(), "Loaded agent configuration");
            load_config_from_toml_str(&s)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "Configuration file not found, using defaults");
            Ok(AgentConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = load_config_from_toml_str("").unwrap();
        assert_eq!(cfg.device_type, DeviceType::Station);
        assert_eq!(cfg.default_timeout, Duration::from_secs(120));
        assert_eq!(cfg.ifname(), "wlan0");
        assert_eq!(cfg.ctrl_dir(), Path::new("/var/run/wpa_supplicant"));
    }

    #[test]
    fn ap_config_selects_hostapd_interface() {
        let cfg = load_config_from_toml_str(
            r#"
            device_type = "AP"
            hostapd_ifname = "wlan1"
            default_timeout_secs = 30
            listen_addr = "127.0.0.1:9100"
            "#,
        )
        .unwrap();
        assert!(cfg.is_ap());
        assert_eq!(cfg.ifname(), "wlan1");
        assert_eq!(cfg.ctrl_dir(), Path::new("/var/run/hostapd"));
        assert_eq!(cfg.default_timeout, Duration::from_secs(30));
        assert_eq!(cfg.listen_addr.port(), 9100);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(load_config_from_toml_str("device_type = \"mesh\"").is_err());
        assert!(load_config_from_toml_str("listen_addr = \"nowhere\"").is_err());
        assert!(load_config_from_toml_str("default_timeout_secs = 0").is_err());
    }
}
