use async_trait::async_trait;
use std::time::Duration;

// 在这里定义守护进程客户端与外部 CA 的 trait，所有后端都实现它们。

/// One asynchronous event line received from the daemon, e.g.
/// `<3>DPP-AUTH-SUCCESS init=1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The subscribed name that matched (`DPP-AUTH-SUCCESS`).
    pub name: String,
    /// The line with the `<level>` prefix stripped.
    pub line: String,
}

impl Event {
    /// Text after the event name, without the separating space.
    pub fn payload(&self) -> &str {
        self.line[self.name.len()..].trim_start()
    }

    /// Looks up `key=value` inside the payload.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.payload().split(' ').find_map(|tok| {
            tok.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }
}

/// An attached event subscription on one interface.
/// Dropping the monitor detaches it.
#[async_trait]
pub trait EventMonitor: Send {
    /// Blocks until a line matching one of `names` arrives (first match wins)
    /// or `timeout` elapses. `Ok(None)` is a timeout.
    async fn await_event(&mut self, names: &[&str], timeout: Duration) -> crate::Result<Option<Event>>;
}

/// Request/response and event access to the Wi-Fi control daemon
/// (wpa_supplicant for stations, hostapd for APs).
#[async_trait]
pub trait DaemonClient: Send + Sync {
    /// Fire-and-forget command. Fails on an unreachable daemon or a `FAIL` reply.
    async fn send(&self, ifname: &str, cmd: &str) -> crate::Result<()>;

    /// Sends a command and returns its textual reply.
    async fn send_recv(&self, ifname: &str, cmd: &str) -> crate::Result<String>;

    /// Opens an event subscription on `ifname`.
    async fn monitor(&self, ifname: &str) -> crate::Result<Box<dyn EventMonitor>>;
}

/// External certificate authority used for dot1x enrollment.
#[async_trait]
pub trait CaDelegate: Send + Sync {
    /// Signs a base64 CSR and returns the base64 PKCS#7 certificate bag.
    async fn sign_csr(&self, csr_b64: &str) -> crate::Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_fields_are_read_from_payload() {
        let ev = Event {
            name: "DPP-TX".into(),
            line: "DPP-TX dst=02:00:00:00:01:00 freq=2437 type=7".into(),
        };
        assert_eq!(ev.payload(), "dst=02:00:00:00:01:00 freq=2437 type=7");
        assert_eq!(ev.field("type"), Some("7"));
        assert_eq!(ev.field("freq"), Some("2437"));
        assert_eq!(ev.field("result"), None);
    }
}
