//! 发送前的人工审批关卡
//!
//! 每条生成的回复调用一次 [`DeliveryGate::approve`]。被拒绝的回复直接丢弃，
//! 不重试；对应的对话记录在此之前已经写入历史，不受审批结果影响。

use crate::human_loop::{AutoApproveProvider, HumanLoopProvider, HumanLoopRequest};
use crate::error::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub struct DeliveryGate {
    provider: Arc<dyn HumanLoopProvider>,
    /// 这些频道跳过审批
    bypass_channels: HashSet<String>,
}

impl DeliveryGate {
    pub fn new(provider: Arc<dyn HumanLoopProvider>) -> Self {
        Self {
            provider,
            bypass_channels: HashSet::new(),
        }
    }

    /// 所有回复一律放行
    pub fn auto_approve() -> Self {
        Self::new(Arc::new(AutoApproveProvider))
    }

    pub fn with_bypass_channels(mut self, channels: impl IntoIterator<Item = String>) -> Self {
        self.bypass_channels.extend(channels);
        self
    }

    pub fn is_bypassed(&self, channel_id: &str) -> bool {
        self.bypass_channels.contains(channel_id)
    }

    /// 返回 `true` 表示可以发送；拒绝和超时都视为不发送
    pub async fn approve(&self, original: &str, candidate: &str, channel_id: &str) -> Result<bool> {
        if self.is_bypassed(channel_id) {
            debug!(channel = %channel_id, "频道在免审名单中，直接放行");
            return Ok(true);
        }
        let response = self
            .provider
            .request(HumanLoopRequest::approval(original, candidate, channel_id))
            .await?;
        info!(channel = %channel_id, decision = ?response, "审批结果");
        Ok(response.is_approved())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockApprover;

    #[tokio::test]
    async fn test_gate_follows_provider() {
        let approver = Arc::new(MockApprover::new().with_approval(false).with_approval(true));
        let gate = DeliveryGate::new(approver.clone());

        assert!(!gate.approve("hi", "hello", "general").await.unwrap());
        assert!(gate.approve("hi", "hello", "general").await.unwrap());
        assert_eq!(approver.call_count(), 2);
        assert_eq!(approver.requests()[0].candidate, "hello");
    }

    #[tokio::test]
    async fn test_bypass_channel_skips_provider() {
        let approver = Arc::new(MockApprover::new().with_approval(false));
        let gate = DeliveryGate::new(approver.clone()).with_bypass_channels(["dev".to_string()]);

        assert!(gate.approve("hi", "hello", "dev").await.unwrap());
        assert_eq!(approver.call_count(), 0, "免审频道不应询问审批人");
    }

    #[tokio::test]
    async fn test_timeout_means_not_sent() {
        let approver = Arc::new(MockApprover::new().with_timeout());
        let gate = DeliveryGate::new(approver);
        assert!(!gate.approve("hi", "hello", "general").await.unwrap());
    }

    #[tokio::test]
    async fn test_auto_approve() {
        assert!(DeliveryGate::auto_approve().approve("a", "b", "c").await.unwrap());
    }
}
