use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{AppError, AppResult};
use crate::models::RaffleEvent;
use crate::services::notifier::RaffleNotifier;

/// 把开奖 / 取消事件以 JSON POST 到外部投递服务（聊天机器人等）
#[derive(Clone)]
pub struct WebhookNotifier {
    http: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent("raffle-backend/webhook")
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RaffleNotifier for WebhookNotifier {
    async fn notify(&self, event: &RaffleEvent) -> AppResult<()> {
        let resp = self.http.post(&self.url).json(event).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::ExternalApiError(format!(
                "Webhook delivery failed: HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        log::debug!(
            "Delivered {} event for activity {} to webhook",
            event.kind(),
            event.activity().id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_keeps_url() {
        let notifier = WebhookNotifier::new("http://localhost:9000/hook", 3).unwrap();
        assert_eq!(notifier.url(), "http://localhost:9000/hook");
    }
}
