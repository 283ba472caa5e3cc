//! Recent journal lines of a systemd unit

use async_trait::async_trait;

use crate::model::LogTailConfig;

use super::{CheckError, CheckOutcome, CheckStrategy, ensure_safe_unit_name};

pub struct LogTailCheck {
    unit: String,
    config: LogTailConfig,
}

impl LogTailCheck {
    pub fn new(unit: impl Into<String>, config: LogTailConfig) -> Self {
        Self {
            unit: unit.into(),
            config,
        }
    }
}

#[async_trait]
impl CheckStrategy for LogTailCheck {
    fn command(&self) -> Result<String, CheckError> {
        ensure_safe_unit_name(&self.unit)?;
        if !self.config.operator.is_containment() {
            return Err(CheckError::Validation(format!(
                "operator `{}` cannot be applied to log output",
                self.config.operator
            )));
        }
        Ok(format!("journalctl -u {} | tail", self.unit))
    }

    fn evaluate(&self, output: &str) -> Result<CheckOutcome, CheckError> {
        let active = self
            .config
            .operator
            .evaluate(&self.config.desired_response, output);
        Ok(CheckOutcome::reached(active, None))
    }
}
