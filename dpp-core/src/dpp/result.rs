use std::fmt;
use std::ops::ControlFlow;

/// Result fields, in the only order they may be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Bootstrap,
    Auth,
    /// Takes the Auth slot in credential reconfiguration.
    ReconfigAuth,
    Conf,
    NetworkIntro,
    NetworkConnect,
    Status,
}

impl Phase {
    fn rank(self) -> u8 {
        match self {
            Phase::Bootstrap => 0,
            Phase::Auth | Phase::ReconfigAuth => 1,
            Phase::Conf => 2,
            Phase::NetworkIntro => 3,
            Phase::NetworkConnect => 4,
            Phase::Status => 5,
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            Phase::Bootstrap => "BootstrapResult",
            Phase::Auth => "AuthResult",
            Phase::ReconfigAuth => "ReconfigAuthResult",
            Phase::Conf => "ConfResult",
            Phase::NetworkIntro => "NetworkIntroResult",
            Phase::NetworkConnect => "NetworkConnectResult",
            Phase::Status => "StatusResult",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    Ok,
    Timeout,
    /// A deliberately corrupted frame was seen on the air.
    Errorsent,
    Failed,
    RolesNotCompatible,
    /// Numeric status reported by the peer (connection status result).
    Code(u32),
}

impl PhaseStatus {
    pub fn is_ok(self) -> bool {
        self == PhaseStatus::Ok
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Ok => f.write_str("OK"),
            PhaseStatus::Timeout => f.write_str("Timeout"),
            PhaseStatus::Errorsent => f.write_str("Errorsent"),
            PhaseStatus::Failed => f.write_str("FAILED"),
            PhaseStatus::RolesNotCompatible => f.write_str("ROLES_NOT_COMPATIBLE"),
            PhaseStatus::Code(n) => write!(f, "{}", n),
        }
    }
}

/// Builds the comma-delimited result line as phases complete.
///
/// Fields are accepted only in phase order, and nothing is accepted after a
/// non-OK field. A phase that does not apply to the flow is simply never
/// recorded.
#[derive(Debug, Default, Clone)]
pub struct ResultAccumulator {
    entries: Vec<(Phase, PhaseStatus)>,
    mud_url: Option<String>,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a phase result. `Break` means the flow must stop here,
    /// either because this status is terminal or because the line is
    /// already closed.
    pub fn record(&mut self, phase: Phase, status: PhaseStatus) -> ControlFlow<()> {
        if self.is_closed() {
            tracing::warn!(field = phase.field(), %status, "Result already closed, dropping field");
            return ControlFlow::Break(());
        }
        if let Some((last, _)) = self.entries.last() {
            if phase.rank() <= last.rank() {
                tracing::warn!(field = phase.field(), after = last.field(), "Out of order result field dropped");
                return ControlFlow::Break(());
            }
        }
        tracing::info!(field = phase.field(), %status, "DPP phase result");
        self.entries.push((phase, status));
        if status.is_ok() {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    }

    /// True once a non-OK field has been recorded.
    pub fn is_closed(&self) -> bool {
        self.entries.last().is_some_and(|(_, s)| !s.is_ok())
    }

    pub fn status_of(&self, phase: Phase) -> Option<PhaseStatus> {
        self.entries.iter().find(|(p, _)| *p == phase).map(|(_, s)| *s)
    }

    pub fn set_mud_url(&mut self, url: &str) {
        self.mud_url = Some(url.to_string());
    }

    pub fn render(&self) -> String {
        let mut out = self
            .entries
            .iter()
            .map(|(p, s)| format!("{},{}", p.field(), s))
            .collect::<Vec<_>>()
            .join(",");
        if let Some(url) = &self.mud_url {
            if !out.is_empty() {
                out.push(',');
            }
            out.push_str("MUDURL,");
            out.push_str(url);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_fields_in_order() {
        let mut acc = ResultAccumulator::new();
        assert!(acc.record(Phase::Bootstrap, PhaseStatus::Ok).is_continue());
        assert!(acc.record(Phase::Auth, PhaseStatus::Ok).is_continue());
        assert!(acc.record(Phase::Conf, PhaseStatus::Ok).is_continue());
        assert_eq!(acc.render(), "BootstrapResult,OK,AuthResult,OK,ConfResult,OK");
    }

    #[test]
    fn non_ok_status_closes_the_line() {
        let mut acc = ResultAccumulator::new();
        acc.record(Phase::Bootstrap, PhaseStatus::Ok);
        assert!(acc.record(Phase::Auth, PhaseStatus::RolesNotCompatible).is_break());
        assert!(acc.is_closed());
        assert!(acc.record(Phase::Conf, PhaseStatus::Ok).is_break());
        assert_eq!(acc.render(), "BootstrapResult,OK,AuthResult,ROLES_NOT_COMPATIBLE");
    }

    #[test]
    fn earlier_phase_after_later_is_rejected() {
        let mut acc = ResultAccumulator::new();
        acc.record(Phase::Bootstrap, PhaseStatus::Ok);
        acc.record(Phase::Conf, PhaseStatus::Ok);
        assert!(acc.record(Phase::Auth, PhaseStatus::Ok).is_break());
        assert_eq!(acc.status_of(Phase::Auth), None);
        assert_eq!(acc.render(), "BootstrapResult,OK,ConfResult,OK");
    }

    #[test]
    fn skipped_phase_is_allowed_and_mud_url_is_appended() {
        let mut acc = ResultAccumulator::new();
        acc.record(Phase::Bootstrap, PhaseStatus::Ok);
        acc.record(Phase::Auth, PhaseStatus::Ok);
        acc.record(Phase::Conf, PhaseStatus::Ok);
        acc.record(Phase::NetworkConnect, PhaseStatus::Ok);
        acc.set_mud_url("https://example.com/mud");
        assert_eq!(
            acc.render(),
            "BootstrapResult,OK,AuthResult,OK,ConfResult,OK,NetworkConnectResult,OK,MUDURL,https://example.com/mud"
        );
    }

    #[test]
    fn status_codes_render_numerically() {
        let mut acc = ResultAccumulator::new();
        acc.record(Phase::ReconfigAuth, PhaseStatus::Ok);
        acc.record(Phase::Conf, PhaseStatus::Ok);
        acc.record(Phase::Status, PhaseStatus::Code(0));
        assert_eq!(acc.render(), "ReconfigAuthResult,OK,ConfResult,OK,StatusResult,0");
    }
}
