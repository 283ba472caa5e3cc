//! HTTP probe executed on the monitored host with `curl`

use async_trait::async_trait;

use crate::model::{HttpMethod, OnlineConfig, Target};

use super::{CheckError, CheckOutcome, CheckStrategy};

const CURL: &str = "curl -s -w '\\nStatus Code: %{http_code}\\nResponse Time: %{time_total}s\\n' -o /dev/stdout";

const STATUS_PREFIX: &str = "Status Code:";
const TIME_PREFIX: &str = "Response Time:";

const DEFAULT_POST_BODY: &str = "{}";

/// Status code, body and total time of one probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResponse {
    pub status_code: String,
    pub content: String,
    pub elapsed_secs: f64,
}

/// Split curl's output into body and the two trailing `-w` lines
pub fn parse_probe_output(output: &str) -> Result<ProbeResponse, CheckError> {
    let lines: Vec<&str> = output.lines().collect();
    let [content @ .., status_line, time_line] = lines.as_slice() else {
        return Err(CheckError::Parse(format!(
            "expected status and timing lines, got {} line(s)",
            lines.len()
        )));
    };

    let status_code = status_line
        .trim()
        .strip_prefix(STATUS_PREFIX)
        .ok_or_else(|| CheckError::Parse(format!("no status line in {status_line:?}")))?
        .trim()
        .to_string();

    let elapsed = time_line
        .trim()
        .strip_prefix(TIME_PREFIX)
        .ok_or_else(|| CheckError::Parse(format!("no timing line in {time_line:?}")))?
        .trim();
    let elapsed_secs = elapsed
        .strip_suffix('s')
        .unwrap_or(elapsed)
        .parse::<f64>()
        .map_err(|e| CheckError::Parse(format!("invalid response time {elapsed:?}: {e}")))?;

    Ok(ProbeResponse {
        status_code,
        content: content.join("\n"),
        elapsed_secs,
    })
}

pub struct OnlineCheck {
    config: OnlineConfig,
}

impl OnlineCheck {
    pub fn new(config: OnlineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CheckStrategy for OnlineCheck {
    fn command(&self) -> Result<String, CheckError> {
        let url = self.config.url.trim();
        if url.is_empty() {
            return Err(CheckError::Validation("online check has no url".to_string()));
        }

        let mut command = String::from(CURL);
        if self.config.method == HttpMethod::Post {
            let body = self.config.body.as_deref().unwrap_or(DEFAULT_POST_BODY);
            command.push_str(" -X POST -H 'accept: application/json' -H 'Content-Type: application/json' -d ");
            command.push_str(&shell_words::quote(body));
        }
        command.push(' ');
        command.push_str(&shell_words::quote(url));

        Ok(command)
    }

    fn evaluate(&self, output: &str) -> Result<CheckOutcome, CheckError> {
        let response = parse_probe_output(output)?;

        let actual = match self.config.target {
            Target::StatusCode => response.status_code.as_str(),
            Target::Content => response.content.as_str(),
        };
        let active = self
            .config
            .operator
            .evaluate(&self.config.desired_response, actual);

        Ok(CheckOutcome::reached(active, Some(response.elapsed_secs)))
    }
}
