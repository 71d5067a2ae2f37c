use std::time::Duration;

use async_trait::async_trait;
use dispatch_core::{DispatchError, DispatchResult, JobOffer, PushConfig, PushNotifier};
use serde_json::json;
use tracing::{debug, error};

/// 通过HTTP推送网关发送派单通知
pub struct HttpPushNotifier {
    endpoint: String,
    auth_token: Option<String>,
    http_client: reqwest::Client,
}

impl HttpPushNotifier {
    pub fn new(config: &PushConfig) -> DispatchResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| DispatchError::Configuration(format!("创建推送客户端失败: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            auth_token: config.auth_token.clone(),
            http_client,
        })
    }

    fn notification_body(courier_id: &str, offer: &JobOffer) -> serde_json::Value {
        json!({
            "courier_id": courier_id,
            "title": "新的配送订单",
            "body": format!(
                "{} → {}，配送费 {:.2}",
                offer.payload.pickup_address, offer.payload.dropoff_address, offer.payload.delivery_fee
            ),
            "data": offer,
        })
    }
}

#[async_trait]
impl PushNotifier for HttpPushNotifier {
    async fn push_offer(&self, courier_id: &str, offer: &JobOffer) -> DispatchResult<()> {
        let mut request = self
            .http_client
            .post(&self.endpoint)
            .json(&Self::notification_body(courier_id, offer));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            error!("推送网关连接失败: {}", e);
            DispatchError::Notification(format!("推送网关连接失败: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Notification(format!(
                "推送失败: HTTP {status} - {body}"
            )));
        }

        debug!("订单 {} 的推送已发送给骑手 {}", offer.order_id, courier_id);
        Ok(())
    }
}

/// 推送关闭时使用
#[derive(Debug, Default)]
pub struct NoopPushNotifier;

#[async_trait]
impl PushNotifier for NoopPushNotifier {
    async fn push_offer(&self, courier_id: &str, offer: &JobOffer) -> DispatchResult<()> {
        debug!("推送已关闭，跳过订单 {} -> 骑手 {}", offer.order_id, courier_id);
        Ok(())
    }
}
