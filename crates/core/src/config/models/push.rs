use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl PushConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(anyhow::anyhow!("推送网关地址无效: {}", self.endpoint));
        }

        if self.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("推送超时时间必须大于0"));
        }

        Ok(())
    }
}
