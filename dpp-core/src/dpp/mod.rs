//! DPP (Wi-Fi Easy Connect) orchestration.
//!
//! One inbound `dev_exec_action` is parsed into a [`ProvisioningRequest`]
//! and run as one of four operations: local bootstrap generation, peer
//! bootstrap registration, a full provisioning flow, or reconfiguration.
//! A flow opens one event subscription for its whole lifetime, walks the
//! phase drivers in order, and renders the accumulated result line.

pub mod auth;
pub mod bootstrap;
pub mod ca;
pub mod command;
pub mod conf;
pub mod fault;
pub mod network;
pub mod profile;
pub mod reconfig;
pub mod request;
pub mod result;
pub mod session;

use crate::config::AgentConfig;
use crate::dpp::command::{CommandBuilder, ConfObject, SetTest};
use crate::dpp::conf::ConfDirection;
use crate::dpp::fault::FaultPlan;
use crate::dpp::profile::ConfiguratorProfile;
use crate::dpp::request::{ActionType, ProvRole, Transport};
use crate::dpp::result::{Phase, PhaseStatus, ResultAccumulator};
use crate::dpp::session::Session;
use crate::traits::{CaDelegate, DaemonClient, Event, EventMonitor};
use crate::{Error, Result};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub use request::{Params, ProvisioningRequest};

/// Daemon access for one command, addressed to the configured interface.
#[derive(Clone, Copy)]
pub(crate) struct Ctx<'a> {
    pub client: &'a dyn DaemonClient,
    pub config: &'a AgentConfig,
}

impl<'a> Ctx<'a> {
    pub fn ifname(&self) -> &'a str {
        self.config.ifname()
    }

    pub async fn send<C: CommandBuilder + Sync>(&self, cmd: &C) -> Result<()> {
        let line = cmd.build()?;
        tracing::debug!(ifname = self.ifname(), cmd = %line, "DPP command");
        self.client.send(self.ifname(), &line).await
    }

    pub async fn send_recv<C: CommandBuilder + Sync>(&self, cmd: &C) -> Result<String> {
        let line = cmd.build()?;
        tracing::debug!(ifname = self.ifname(), cmd = %line, "DPP command");
        self.client.send_recv(self.ifname(), &line).await
    }

    /// Plain query with no arguments, such as `STATUS`.
    pub async fn query(&self, cmd: &str) -> Result<String> {
        self.client.send_recv(self.ifname(), cmd).await
    }
}

/// Per-invocation flow state. The event subscription and the effective
/// timeout live here and nowhere else, so both end with the invocation on
/// every exit path.
pub(crate) struct Invocation<'a> {
    pub ctx: Ctx<'a>,
    pub ca: &'a dyn CaDelegate,
    pub timeout: Duration,
    pub fault: Option<FaultPlan>,
    pub results: ResultAccumulator,
    monitor: Box<dyn EventMonitor>,
}

impl<'a> Invocation<'a> {
    /// Subscribes to events and sets the daemon's test mode for this
    /// invocation. `dpp_test` persists in the daemon between commands; a
    /// run without a fault resets it to 0.
    async fn open(ctx: Ctx<'a>, ca: &'a dyn CaDelegate, timeout: Duration, fault: Option<FaultPlan>) -> Result<Self> {
        let monitor = ctx.client.monitor(ctx.ifname()).await?;
        match fault {
            Some(plan) => {
                tracing::info!(code = plan.code, "Injecting DPP test fault");
                ctx.send(&SetTest(plan.code)).await?;
            }
            None => {
                if let Err(e) = ctx.send(&SetTest(0)).await {
                    tracing::warn!("Failed to clear DPP test mode: {}", e);
                }
            }
        }
        Ok(Self {
            ctx,
            ca,
            timeout,
            fault,
            results: ResultAccumulator::new(),
            monitor,
        })
    }

    /// Waits with the full invocation budget.
    pub async fn wait(&mut self, names: &[&str]) -> Result<Option<Event>> {
        let budget = self.timeout;
        self.wait_within(names, budget).await
    }

    pub async fn wait_within(&mut self, names: &[&str], budget: Duration) -> Result<Option<Event>> {
        self.monitor.await_event(names, budget).await
    }

    pub fn record(&mut self, phase: Phase, status: PhaseStatus) -> ControlFlow<()> {
        self.results.record(phase, status)
    }

    /// Records the last field a flow produces.
    pub fn conclude(&mut self, phase: Phase, status: PhaseStatus) {
        if self.record(phase, status).is_break() && status.is_ok() {
            tracing::debug!(field = phase.field(), "Result line was already closed");
        }
    }

    /// The injected fault, if it targets a frame of `phase`.
    pub fn fault_in(&self, phase: Phase) -> Option<FaultPlan> {
        self.fault.filter(|f| f.frame.phase() == phase)
    }

    /// Reports a phase that carries an injected fault. Returns `None` when
    /// the fault belongs to a different phase.
    pub async fn run_fault(&mut self, phase: Phase) -> Result<Option<ControlFlow<()>>> {
        let Some(plan) = self.fault_in(phase) else {
            return Ok(None);
        };
        let status = fault::observe(self, &plan).await?;
        Ok(Some(self.record(phase, status)))
    }

    pub fn finish(self) -> String {
        self.results.render()
    }
}

/// Outcome of one inbound command, rendered as the CAPI status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Complete(Option<String>),
    Error(String),
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Complete(None) => f.write_str("status,COMPLETE"),
            Response::Complete(Some(r)) => write!(f, "status,COMPLETE,{}", r),
            Response::Error(e) => write!(f, "status,ERROR,{}", e),
        }
    }
}

/// Runs DPP commands against one daemon. Commands are serialized: the
/// session lock is held for the whole of each command.
pub struct DppEngine {
    config: Arc<AgentConfig>,
    client: Arc<dyn DaemonClient>,
    ca: Arc<dyn CaDelegate>,
    session: Mutex<Session>,
}

impl DppEngine {
    pub fn new(config: Arc<AgentConfig>, client: Arc<dyn DaemonClient>, ca: Arc<dyn CaDelegate>) -> Self {
        Self {
            config,
            client,
            ca,
            session: Mutex::new(Session::new()),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub async fn execute(&self, params: &Params) -> Response {
        match self.dev_exec_action(params).await {
            Ok(result) => Response::Complete(result),
            Err(e) => {
                match &e {
                    Error::Missing(_) | Error::Unsupported(_) => tracing::warn!("DPP request rejected: {}", e),
                    _ => tracing::error!("DPP command failed: {}", e),
                }
                Response::Error(e.to_response())
            }
        }
    }

    pub async fn dev_exec_action(&self, params: &Params) -> Result<Option<String>> {
        let req = ProvisioningRequest::parse(params)?;
        let mut session = self.session.lock().await;
        let ctx = Ctx {
            client: self.client.as_ref(),
            config: &self.config,
        };
        tracing::info!(action = ?req.action, ifname = ctx.ifname(), "DPP action");

        match req.action {
            ActionType::GetLocalBootstrap => {
                let uri = bootstrap::generate_local(ctx, &mut session, &req).await?;
                Ok(Some(format!("BootstrappingData,{}", uri)))
            }
            ActionType::SetPeerBootstrap => {
                let hex = req.peer_bootstrap.as_deref().ok_or(Error::Missing("DPPBootstrappingdata"))?;
                bootstrap::set_peer(&mut session, hex)?;
                Ok(None)
            }
            ActionType::Automatic | ActionType::Manual => {
                self.provision(ctx, &mut session, &req).await.map(Some)
            }
            ActionType::Reconfigure => {
                let timeout = self.invocation_timeout(&req);
                let inv = Invocation::open(ctx, self.ca.as_ref(), timeout, None).await?;
                reconfig::run(inv, &mut session, &req).await.map(Some)
            }
        }
    }

    /// The wait budget for one invocation. The process default is never
    /// modified, so an override cannot outlive its command.
    fn invocation_timeout(&self, req: &ProvisioningRequest) -> Duration {
        match req.timeout {
            Some(t) => {
                tracing::debug!(secs = t.as_secs(), "DPP timeout override");
                t
            }
            None => self.config.default_timeout,
        }
    }

    async fn provision(&self, ctx: Ctx<'_>, session: &mut Session, req: &ProvisioningRequest) -> Result<String> {
        if req.action == ActionType::Manual {
            if let Some(hex) = req.peer_bootstrap.as_deref() {
                bootstrap::set_peer(session, hex)?;
            }
        }
        let transport = req.transport()?;
        let timeout = self.invocation_timeout(req);

        let profile = match (req.needs_configurator(), req.conf_index) {
            (true, Some(index)) => Some(
                ConfiguratorProfile::resolve(index, req.enrollee_kind, &self.config.csrattrs_path).await?,
            ),
            (true, None) => return Err(Error::Missing("DPPConfIndex")),
            (false, _) => None,
        };
        let configurator = match profile {
            Some(_) => Some(profile::ensure_configurator(&ctx, session, &req.signing_curve).await?),
            None => None,
        };
        let own_pkex = match transport {
            Transport::Pkex => Some(bootstrap::generate_pkex(&ctx, &req.curve).await?),
            _ => None,
        };

        let mut inv = Invocation::open(ctx, self.ca.as_ref(), timeout, req.fault).await?;

        if let (true, Some(index), Some(id)) = (req.self_configure, req.conf_index, configurator) {
            conf::self_configure(&mut inv, index, id).await?;
        }

        let configures_peer = req.prov_role.is_some_and(ProvRole::may_configure);
        let conf_obj = match (&profile, configurator) {
            (Some(p), Some(id)) if configures_peer => Some(ConfObject {
                profile: p,
                configurator: id,
                conn_status: req.status_query,
            }),
            _ => None,
        };

        auth::start(&mut inv, session, req, transport, conf_obj.as_ref(), own_pkex).await?;
        if auth::await_outcome(&mut inv, session, req, transport).await?.is_break() {
            return Ok(inv.finish());
        }

        let csr = profile.as_ref().is_some_and(|p| p.csrattrs.is_some());
        let direction = match conf::run(&mut inv, csr).await? {
            ControlFlow::Continue(d) => d,
            ControlFlow::Break(()) => return Ok(inv.finish()),
        };

        match direction {
            ConfDirection::Received if !self.config.is_ap() => {
                if req.wait_for_connect {
                    network::run(&mut inv, session).await?;
                } else {
                    network::pick_up_network_id(&mut inv, session).await?;
                }
            }
            ConfDirection::Sent if req.status_query => {
                conf::await_status(&mut inv).await?;
            }
            _ => {}
        }
        Ok(inv.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses_render_capi_status_lines() {
        assert_eq!(Response::Complete(None).to_string(), "status,COMPLETE");
        assert_eq!(
            Response::Complete(Some("BootstrapResult,OK".into())).to_string(),
            "status,COMPLETE,BootstrapResult,OK"
        );
        assert_eq!(
            Response::Error("errorCode,Missing DPPBS".into()).to_string(),
            "status,ERROR,errorCode,Missing DPPBS"
        );
    }
}
