// 后端：wpa_ctrl（通过 wpa_ctrl crate 访问 wpa_supplicant / hostapd 的控制套接字）
//
// wpa_ctrl 是阻塞 I/O，所有请求和事件读取都在 spawn_blocking 中运行。

use crate::backends::utils::{deadline_after, match_event};
use crate::traits::{DaemonClient, Event, EventMonitor};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use ::wpa_ctrl::{WpaControlReq, WpaController, WpaControllerBuilder};

/// Prefix of the client sockets the wpa_ctrl crate binds.
const CLIENT_SOCKET_PREFIX: &str = "wpa_ctrl_";

/// Control-socket client for one daemon (all interfaces under `ctrl_dir`).
/// One command controller is kept open per interface.
#[derive(Clone)]
pub struct WpaCtrlClient {
    ctrl_dir: PathBuf,
    reply_timeout: Duration,
    cmd_ctrl: Arc<Mutex<HashMap<String, WpaController>>>,
}

impl WpaCtrlClient {
    pub fn new(ctrl_dir: impl Into<PathBuf>, client_dir: impl AsRef<Path>, reply_timeout: Duration) -> Self {
        cleanup_stale_client_sockets(client_dir.as_ref());
        Self {
            ctrl_dir: ctrl_dir.into(),
            reply_timeout,
            cmd_ctrl: Arc::default(),
        }
    }

    /// 发送一个命令并获取回复（阻塞 I/O，在 spawn_blocking 中运行）
    async fn send_cmd(&self, ifname: &str, cmd: &str) -> Result<String> {
        let cmd_ctrl = self.cmd_ctrl.clone();
        let ctrl_dir = self.ctrl_dir.clone();
        let ifname = ifname.to_string();
        let cmd = cmd.to_string();
        let deadline = deadline_after(self.reply_timeout);

        tokio::task::spawn_blocking(move || {
            let mut ctrls = cmd_ctrl
                .lock()
                .map_err(|_| Error::Daemon("control socket table poisoned".into()))?;
            if !ctrls.contains_key(&ifname) {
                let ctrl = open_controller(&ctrl_dir, &ifname)?;
                ctrls.insert(ifname.clone(), ctrl);
            }
            let Some(ctrl) = ctrls.get_mut(&ifname) else {
                return Err(Error::Daemon(format!("WpaController for {} not available", ifname)));
            };

            tracing::debug!(ifname = %ifname, cmd = %cmd, "WPA_CMD_SEND");
            let result = request(ctrl, &cmd, deadline);
            // 套接字级错误后重新打开，FAIL 回复不影响连接
            if matches!(result, Err(Error::Daemon(_))) {
                ctrls.remove(&ifname);
            }
            result
        })
        .await
        .map_err(|e| Error::Daemon(format!("spawn_blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl DaemonClient for WpaCtrlClient {
    async fn send(&self, ifname: &str, cmd: &str) -> Result<()> {
        self.send_cmd(ifname, cmd).await.map(|_| ())
    }

    async fn send_recv(&self, ifname: &str, cmd: &str) -> Result<String> {
        self.send_cmd(ifname, cmd).await
    }

    async fn monitor(&self, ifname: &str) -> Result<Box<dyn EventMonitor>> {
        let ctrl_dir = self.ctrl_dir.clone();
        let name = ifname.to_string();
        let deadline = deadline_after(self.reply_timeout);

        let ctrl = tokio::task::spawn_blocking(move || {
            let mut ctrl = open_controller(&ctrl_dir, &name)?;
            let reply = request(&mut ctrl, "ATTACH", deadline)?;
            if !reply.starts_with("OK") {
                return Err(Error::Daemon(format!("ATTACH to {} rejected: {}", name, reply.trim_end())));
            }
            Ok(ctrl)
        })
        .await
        .map_err(|e| Error::Daemon(format!("spawn_blocking task failed: {}", e)))??;

        tracing::debug!(ifname, "Event monitor attached");
        Ok(Box::new(WpaMonitor {
            ifname: ifname.to_string(),
            ctrl: Some(ctrl),
        }))
    }
}

fn open_controller(ctrl_dir: &Path, ifname: &str) -> Result<WpaController> {
    let folder = ctrl_dir
        .to_str()
        .ok_or_else(|| Error::Config(format!("control directory {} is not UTF-8", ctrl_dir.display())))?;
    WpaControllerBuilder::new().set_root(folder).open(ifname).map_err(|e| {
        Error::Daemon(format!(
            "cannot reach daemon at {}: {}",
            ctrl_dir.join(ifname).display(),
            e
        ))
    })
}

/// Sends one request and reads until the solicited reply arrives,
/// discarding unsolicited messages on the way.
fn request(ctrl: &mut WpaController, cmd: &str, deadline: Instant) -> Result<String> {
    ctrl.request(WpaControlReq::raw(cmd))
        .map_err(|e| Error::Daemon(format!("wpa_ctrl request failed: {}", e)))?;
    loop {
        match ctrl.recv() {
            Ok(Some(msg)) => {
                if msg.is_unsolicited() {
                    tracing::debug!("WPA_CMD_RECV (unsolicited): {}", msg.raw);
                    continue;
                }
                if msg.as_fail().is_some() {
                    tracing::error!(cmd, "WPA_CMD_RECV (FAIL): {}", msg.raw.trim_end());
                    return Err(Error::CommandFailed(format!("{}: {}", cmd, msg.raw.trim_end())));
                }
                tracing::debug!("WPA_CMD_RECV (OK/DATA): {}", msg.raw.trim_end());
                return Ok(msg.raw.to_string());
            }
            Ok(None) if Instant::now() < deadline => continue,
            Ok(None) => return Err(Error::Daemon(format!("no reply to '{}'", cmd))),
            Err(e) => return Err(Error::Daemon(format!("recv failed: {}", e))),
        }
    }
}

/// Reads messages until one matches `names` or the deadline passes.
fn next_event(ctrl: &mut WpaController, names: &[String], deadline: Instant) -> Result<Option<Event>> {
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    while Instant::now() < deadline {
        match ctrl.recv() {
            Ok(Some(msg)) => {
                if let Some(ev) = match_event(msg.raw, &names) {
                    return Ok(Some(ev));
                }
            }
            Ok(None) => {}
            Err(e) => return Err(Error::Daemon(format!("recv failed: {}", e))),
        }
    }
    Ok(None)
}

/// 清理上一次退出留下的 wpa_ctrl 客户端套接字
fn cleanup_stale_client_sockets(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(CLIENT_SOCKET_PREFIX) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(_) => tracing::debug!("Removed stale wpa_ctrl socket: {:?}", entry.path()),
            Err(e) => tracing::warn!("Failed to remove {:?}: {}", entry.path(), e),
        }
    }
}

/// An attached controller. The blocking controller moves into each wait
/// task and comes back when the wait ends.
struct WpaMonitor {
    ifname: String,
    ctrl: Option<WpaController>,
}

#[async_trait]
impl EventMonitor for WpaMonitor {
    async fn await_event(&mut self, names: &[&str], wait: Duration) -> Result<Option<Event>> {
        for name in names {
            tracing::debug!(ifname = %self.ifname, "Waiting for wpa_cli event: {}", name);
        }
        let mut ctrl = self
            .ctrl
            .take()
            .ok_or_else(|| Error::Daemon(format!("event monitor on {} lost its socket", self.ifname)))?;
        let owned: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let deadline = deadline_after(wait);

        let (ctrl, result) = tokio::task::spawn_blocking(move || {
            let result = next_event(&mut ctrl, &owned, deadline);
            (ctrl, result)
        })
        .await
        .map_err(|e| Error::Daemon(format!("spawn_blocking task failed: {}", e)))?;
        self.ctrl = Some(ctrl);

        match result? {
            Some(ev) => {
                tracing::debug!(ifname = %self.ifname, event = %ev.line, "Event received");
                Ok(Some(ev))
            }
            None => {
                tracing::info!(ifname = %self.ifname, "Timeout on waiting for events");
                Ok(None)
            }
        }
    }
}

impl Drop for WpaMonitor {
    fn drop(&mut self) {
        // 尽力而为
        if let Some(mut ctrl) = self.ctrl.take() {
            let _ = ctrl.request(WpaControlReq::raw("DETACH"));
        }
        tracing::debug!(ifname = %self.ifname, "Event monitor detached");
    }
}
