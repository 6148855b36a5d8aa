use crate::traits::CaDelegate;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

const CSR_FILE: &str = "dpp-ca-csr";
const CERTBAG_FILE: &str = "dpp-ca-certbag";

/// Signs enrollee CSRs with an external CA helper program.
///
/// The CSR is written to `<dir>/dpp-ca-csr`, the helper is run as
/// `<program> <dir>`, and the PKCS#7 bag is read back from
/// `<dir>/dpp-ca-certbag`.
#[derive(Debug, Clone)]
pub struct ScriptCa {
    program: String,
    dir: PathBuf,
}

impl ScriptCa {
    pub fn new(program: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            dir: dir.into(),
        }
    }
}

#[async_trait]
impl CaDelegate for ScriptCa {
    async fn sign_csr(&self, csr_b64: &str) -> Result<String> {
        let csr_path = self.dir.join(CSR_FILE);
        let bag_path = self.dir.join(CERTBAG_FILE);
        tokio::fs::write(&csr_path, csr_b64).await?;
        let _ = tokio::fs::remove_file(&bag_path).await;

        tracing::info!(program = %self.program, dir = %self.dir.display(), "Running CA helper");
        let output = Command::new(&self.program).arg(&self.dir).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(status = %output.status, "CA helper failed: {}", stderr.trim());
            return Err(Error::CommandFailed(format!("{} exited with {}", self.program, output.status)));
        }

        let bag = tokio::fs::read_to_string(&bag_path).await?;
        let bag: String = bag.split_whitespace().collect();
        if bag.is_empty() {
            return Err(Error::Protocol("CA helper produced an empty certBag".into()));
        }
        Ok(bag)
    }
}
