//! systemd unit status via `systemctl status`

use async_trait::async_trait;

use super::{CheckError, CheckOutcome, CheckStrategy, ensure_safe_unit_name};

const ACTIVE_MARKER: &str = "Active: active";

pub struct ProcessStatusCheck {
    unit: String,
}

impl ProcessStatusCheck {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }
}

#[async_trait]
impl CheckStrategy for ProcessStatusCheck {
    fn command(&self) -> Result<String, CheckError> {
        ensure_safe_unit_name(&self.unit)?;
        Ok(format!("systemctl status {}", self.unit))
    }

    fn evaluate(&self, output: &str) -> Result<CheckOutcome, CheckError> {
        Ok(CheckOutcome::reached(output.contains(ACTIVE_MARKER), None))
    }
}
