//! Webhook通知转发模块
//!
//! 把通知总线上的消息转发给外部系统，支持：
//! - 按受众订阅
//! - SHA-256 签名
//! - 并发投递与投递结果记录

use anyhow::Result;
use chrono::{DateTime, Utc};
use samu_dispatch::{Audience, Notification, Subscription};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Webhook订阅配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub url: String,
    pub audiences: Vec<Audience>,
    pub secret: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub failure_count: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

impl WebhookSubscription {
    pub fn new(url: String, audiences: Vec<Audience>, secret: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            audiences,
            secret,
            active: true,
            created_at: Utc::now(),
            failure_count: 0,
            last_success: None,
            last_failure: None,
        }
    }

    /// 检查是否对指定通知感兴趣
    pub fn is_interested_in(&self, notification: &Notification) -> bool {
        self.active && self.audiences.iter().any(|a| notification.is_for(*a))
    }

    /// 生成签名
    pub fn generate_signature(&self, payload: &str) -> Option<String> {
        use sha2::{Digest, Sha256};

        self.secret.as_ref().map(|secret| {
            let mut hasher = Sha256::new();
            hasher.update(payload);
            hasher.update(secret);
            format!("sha256={:x}", hasher.finalize())
        })
    }
}

/// Webhook订阅请求
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSubscriptionRequest {
    pub url: String,
    pub audiences: Vec<Audience>,
    pub secret: Option<String>,
}

/// Webhook管理器
#[derive(Debug)]
pub struct WebhookManager {
    subscriptions: RwLock<HashMap<Uuid, WebhookSubscription>>,
    client: reqwest::Client,
}

impl WebhookManager {
    /// 创建新的Webhook管理器
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            client: reqwest::Client::new(),
        }
    }

    /// 订阅
    pub async fn subscribe(&self, request: WebhookSubscriptionRequest) -> Result<Uuid> {
        if request.audiences.is_empty() {
            return Err(anyhow::anyhow!("No audiences specified for {}", request.url));
        }
        if !request.url.starts_with("http://") && !request.url.starts_with("https://") {
            return Err(anyhow::anyhow!("Invalid webhook url: {}", request.url));
        }

        let subscription = WebhookSubscription::new(request.url, request.audiences, request.secret);
        let subscription_id = subscription.id;
        self.subscriptions
            .write()
            .await
            .insert(subscription_id, subscription);

        info!("Created webhook subscription: {}", subscription_id);
        Ok(subscription_id)
    }

    /// 取消订阅
    pub async fn unsubscribe(&self, subscription_id: Uuid) -> Result<()> {
        let mut subscriptions = self.subscriptions.write().await;
        if subscriptions.remove(&subscription_id).is_some() {
            info!("Removed webhook subscription: {}", subscription_id);
            Ok(())
        } else {
            Err(anyhow::anyhow!("Subscription not found: {}", subscription_id))
        }
    }

    /// 列出所有订阅
    pub async fn list_subscriptions(&self) -> Vec<WebhookSubscription> {
        self.subscriptions.read().await.values().cloned().collect()
    }

    /// 发送通知到所有感兴趣的订阅者，返回成功投递数
    pub async fn emit(&self, notification: &Notification) -> Result<usize> {
        let interested: Vec<WebhookSubscription> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|sub| sub.is_interested_in(notification))
            .cloned()
            .collect();

        if interested.is_empty() {
            debug!("No webhook interested in notification: {}", notification.kind);
            return Ok(0);
        }

        let payload = serde_json::to_string(notification)?;

        // 并发发送到所有订阅者
        let mut handles = Vec::new();
        for subscription in interested {
            let payload = payload.clone();
            let kind = notification.kind.clone();
            let client = self.client.clone();

            handles.push(tokio::spawn(async move {
                let outcome = Self::send_webhook(&client, &subscription, &kind, &payload).await;
                (subscription.id, outcome.is_ok())
            }));
        }

        let mut delivered = 0;
        for handle in handles {
            match handle.await {
                Ok((subscription_id, success)) => {
                    if success {
                        delivered += 1;
                    }
                    self.record_outcome(subscription_id, success).await;
                }
                Err(e) => error!("Webhook send task failed: {}", e),
            }
        }

        Ok(delivered)
    }

    /// 持续转发订阅到的通知，直到总线关闭
    pub async fn forward(self: Arc<Self>, mut subscription: Subscription) {
        info!("Webhook forwarder started");
        while let Some(notification) = subscription.recv().await {
            if let Err(e) = self.emit(&notification).await {
                warn!("Failed to forward notification {}: {}", notification.id, e);
            }
        }
        info!("Webhook forwarder stopped: notification bus closed");
    }

    async fn record_outcome(&self, subscription_id: Uuid, success: bool) {
        let mut subscriptions = self.subscriptions.write().await;
        if let Some(subscription) = subscriptions.get_mut(&subscription_id) {
            if success {
                subscription.failure_count = 0;
                subscription.last_success = Some(Utc::now());
            } else {
                subscription.failure_count += 1;
                subscription.last_failure = Some(Utc::now());
            }
        }
    }

    /// 发送单个Webhook
    async fn send_webhook(
        client: &reqwest::Client,
        subscription: &WebhookSubscription,
        kind: &str,
        payload: &str,
    ) -> Result<()> {
        let mut request = client
            .post(&subscription.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", "SAMU-Webhook/1.0")
            .header("X-SAMU-Event", kind)
            .body(payload.to_string());

        // 添加签名头
        if let Some(signature) = subscription.generate_signature(payload) {
            request = request.header("X-SAMU-Signature", signature);
        }

        match request.send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent webhook to: {}", subscription.url);
                    Ok(())
                } else {
                    let status = response.status();
                    error!("Webhook failed with status {}: {}", status, subscription.url);
                    Err(anyhow::anyhow!("Webhook failed with status: {}", status))
                }
            }
            Err(e) => {
                error!("Failed to send webhook to {}: {}", subscription.url, e);
                Err(anyhow::anyhow!("Failed to send webhook: {}", e))
            }
        }
    }
}

impl Default for WebhookManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_webhook_subscription() {
        let manager = WebhookManager::new();

        let request = WebhookSubscriptionRequest {
            url: "https://example.com/webhook".to_string(),
            audiences: vec![Audience::Dispatch, Audience::Alerts],
            secret: Some("test-secret".to_string()),
        };

        let subscription_id = manager.subscribe(request).await.unwrap();
        assert_eq!(manager.list_subscriptions().await.len(), 1);

        manager.unsubscribe(subscription_id).await.unwrap();
        assert!(manager.list_subscriptions().await.is_empty());
        assert!(manager.unsubscribe(subscription_id).await.is_err());
    }

    #[tokio::test]
    async fn test_subscription_validation() {
        let manager = WebhookManager::new();

        assert!(manager
            .subscribe(WebhookSubscriptionRequest {
                url: "https://example.com/webhook".to_string(),
                audiences: vec![],
                secret: None,
            })
            .await
            .is_err());
        assert!(manager
            .subscribe(WebhookSubscriptionRequest {
                url: "ftp://example.com".to_string(),
                audiences: vec![Audience::Fleet],
                secret: None,
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_emit_without_interested_subscribers() {
        let manager = WebhookManager::new();
        manager
            .subscribe(WebhookSubscriptionRequest {
                url: "https://example.com/fleet".to_string(),
                audiences: vec![Audience::Fleet],
                secret: None,
            })
            .await
            .unwrap();

        let alert = Notification::alert("low-availability", serde_json::json!({}));
        assert_eq!(manager.emit(&alert).await.unwrap(), 0);
    }

    #[test]
    fn test_interest_by_audience() {
        let subscription = WebhookSubscription::new(
            "https://example.com/webhook".to_string(),
            vec![Audience::Alerts],
            None,
        );

        let alert = Notification::alert("vehicle-overdue", serde_json::json!({}));
        assert!(subscription.is_interested_in(&alert));

        let mut inactive = subscription.clone();
        inactive.active = false;
        assert!(!inactive.is_interested_in(&alert));
    }

    #[test]
    fn test_webhook_signature() {
        let subscription = WebhookSubscription::new(
            "https://example.com/webhook".to_string(),
            vec![Audience::Dispatch],
            Some("test-secret".to_string()),
        );

        let payload = r#"{"kind": "creation"}"#;
        let signature = subscription.generate_signature(payload).unwrap();
        assert!(signature.starts_with("sha256="));
        assert_eq!(signature.len(), "sha256=".len() + 64);
        assert_eq!(subscription.generate_signature(payload), Some(signature));

        let unsigned = WebhookSubscription::new(
            "https://example.com/webhook".to_string(),
            vec![Audience::Dispatch],
            None,
        );
        assert!(unsigned.generate_signature(payload).is_none());
    }
}
