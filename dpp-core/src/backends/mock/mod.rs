use crate::backends::utils::match_event;
use crate::traits::{CaDelegate, DaemonClient, Event, EventMonitor};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A scripted daemon for tests and hardware-less demo runs.
///
/// Replies are chosen by command prefix (latest registration wins, default
/// `OK`). Events are served from a FIFO queue: a wait consumes lines until
/// one matches, and reports a timeout once the queue is drained.
#[derive(Debug, Clone, Default)]
pub struct MockDaemon {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    replies: Vec<(String, Option<String>)>,
    events: VecDeque<String>,
    sent: Vec<String>,
    waits: Vec<(Vec<String>, Duration)>,
    monitors_open: usize,
    unreachable: bool,
}

impl MockDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    /// Replies `text` to any command starting with `prefix`.
    pub fn reply(&self, prefix: &str, text: &str) -> &Self {
        self.lock()
            .replies
            .push((prefix.to_string(), Some(text.to_string())));
        self
    }

    /// Replies `FAIL` to any command starting with `prefix`.
    pub fn fail(&self, prefix: &str) -> &Self {
        self.lock().replies.push((prefix.to_string(), None));
        self
    }

    /// Queues an event line, e.g. `<3>DPP-AUTH-SUCCESS init=1`.
    pub fn push_event(&self, line: &str) -> &Self {
        self.lock().events.push_back(line.to_string());
        self
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Every command sent so far, in order.
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    /// Every event wait so far: subscribed names and budget.
    pub fn waits(&self) -> Vec<(Vec<String>, Duration)> {
        self.lock().waits.clone()
    }

    /// Monitors currently attached (not yet dropped).
    pub fn monitors_open(&self) -> usize {
        self.lock().monitors_open
    }

    pub fn clear_log(&self) {
        let mut st = self.lock();
        st.sent.clear();
        st.waits.clear();
    }

    fn answer(&self, ifname: &str, cmd: &str) -> Result<String> {
        let mut st = self.lock();
        if st.unreachable {
            return Err(Error::Daemon(format!("cannot reach daemon for {}", ifname)));
        }
        st.sent.push(cmd.to_string());
        tracing::debug!(ifname, cmd, "MOCK_CMD");
        let reply = st
            .replies
            .iter()
            .rev()
            .find(|(prefix, _)| cmd.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Some("OK".to_string()));
        reply.ok_or_else(|| Error::CommandFailed(format!("{}: FAIL", cmd)))
    }
}

#[async_trait]
impl DaemonClient for MockDaemon {
    async fn send(&self, ifname: &str, cmd: &str) -> Result<()> {
        self.answer(ifname, cmd).map(|_| ())
    }

    async fn send_recv(&self, ifname: &str, cmd: &str) -> Result<String> {
        self.answer(ifname, cmd)
    }

    async fn monitor(&self, ifname: &str) -> Result<Box<dyn EventMonitor>> {
        let mut st = self.lock();
        if st.unreachable {
            return Err(Error::Daemon(format!("cannot reach daemon for {}", ifname)));
        }
        st.monitors_open += 1;
        Ok(Box::new(MockMonitor {
            state: self.state.clone(),
        }))
    }
}

struct MockMonitor {
    state: Arc<Mutex<MockState>>,
}

impl MockMonitor {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }
}

// Poisoned state stays readable.
fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl EventMonitor for MockMonitor {
    async fn await_event(&mut self, names: &[&str], timeout: Duration) -> Result<Option<Event>> {
        let mut st = self.lock();
        st.waits
            .push((names.iter().map(|n| n.to_string()).collect(), timeout));
        while let Some(line) = st.events.pop_front() {
            if let Some(ev) = match_event(&line, names) {
                return Ok(Some(ev));
            }
        }
        Ok(None)
    }
}

impl Drop for MockMonitor {
    fn drop(&mut self) {
        if let Ok(mut st) = self.state.lock() {
            st.monitors_open = st.monitors_open.saturating_sub(1);
        }
    }
}

/// A certificate authority that answers every CSR with a fixed bag.
#[derive(Debug, Clone)]
pub struct MockCa {
    pub certbag: String,
    seen: Arc<Mutex<Vec<String>>>,
}

impl MockCa {
    pub fn new(certbag: &str) -> Self {
        Self {
            certbag: certbag.to_string(),
            seen: Arc::default(),
        }
    }

    /// CSRs received so far.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl CaDelegate for MockCa {
    async fn sign_csr(&self, csr_b64: &str) -> Result<String> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).push(csr_b64.to_string());
        Ok(self.certbag.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_by_prefix_latest_wins() {
        let mock = MockDaemon::new();
        mock.reply("DPP_BOOTSTRAP_GEN", "1").reply("DPP_BOOTSTRAP_GEN type=pkex", "7");
        mock.fail("DPP_QR_CODE");

        assert_eq!(mock.send_recv("wlan0", "DPP_BOOTSTRAP_GEN type=qrcode").await.unwrap(), "1");
        assert_eq!(mock.send_recv("wlan0", "DPP_BOOTSTRAP_GEN type=pkex").await.unwrap(), "7");
        assert_eq!(mock.send_recv("wlan0", "SET foo bar").await.unwrap(), "OK");
        assert!(mock.send("wlan0", "DPP_QR_CODE DPP:xyz").await.is_err());
        assert_eq!(mock.sent().len(), 4);
    }

    #[tokio::test]
    async fn monitor_skips_unrelated_lines_and_times_out_when_drained() {
        let mock = MockDaemon::new();
        mock.push_event("<3>CTRL-EVENT-SCAN-STARTED")
            .push_event("<3>DPP-CONF-SENT");
        let mut mon = mock.monitor("wlan0").await.unwrap();
        assert_eq!(mock.monitors_open(), 1);

        let ev = mon
            .await_event(&["DPP-CONF-SENT", "DPP-CONF-FAILED"], Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ev.name, "DPP-CONF-SENT");
        assert!(mon.await_event(&["DPP-CONF-SENT"], Duration::from_secs(5)).await.unwrap().is_none());

        drop(mon);
        assert_eq!(mock.monitors_open(), 0);
        assert_eq!(mock.waits()[0].1, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn unreachable_daemon_is_an_error() {
        let mock = MockDaemon::new();
        mock.set_unreachable(true);
        assert!(mock.send("wlan0", "PING").await.is_err());
        assert!(mock.monitor("wlan0").await.is_err());
    }
}
