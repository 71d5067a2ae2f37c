use serde::{Deserialize, Serialize};

/// 拒单缓存使用的Redis配置，禁用时退化为进程内缓存
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub enabled: bool,
    pub url: String,
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "redis://localhost:6379".to_string(),
            key_prefix: "dispatch".to_string(),
        }
    }
}

impl RedisConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(anyhow::anyhow!("无效的Redis URL: {}", self.url));
        }

        if self.key_prefix.contains(char::is_whitespace) {
            return Err(anyhow::anyhow!("Redis键前缀不能包含空白字符"));
        }

        Ok(())
    }
}
