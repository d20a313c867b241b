//! HTTP 审批：把审核卡片 POST 给外部服务，对端像控制台一样回答 y/n。
//!
//! 请求体：
//! ```json
//! {
//!   "channel_id": "1294309997194383442",
//!   "msg": "hey alizey",
//!   "response": "heyy whats up",
//!   "question": "send? [y/n]"
//! }
//! ```
//!
//! 响应体 `{"answer": "y"}`，判定规则与控制台相同。
//! 对端返回 408 / 504，或者在超时内没有给出响应，都按超时处理（不发送）；
//! 连不上服务或其他非 2xx 状态码才是审批通道错误。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{HumanLoopProvider, HumanLoopRequest, HumanLoopResponse, parse_answer};
use crate::error::{ChatError, Result};

pub struct WebhookHumanLoopProvider {
    client: Client,
    url: String,
    /// 等人作答的最长时间
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ReviewCard<'a> {
    channel_id: &'a str,
    msg: &'a str,
    response: &'a str,
    question: String,
}

impl<'a> ReviewCard<'a> {
    fn from_request(req: &'a HumanLoopRequest) -> Self {
        Self {
            channel_id: &req.channel_id,
            msg: &req.original,
            response: &req.candidate,
            question: format!("{} [y/n]", req.prompt),
        }
    }
}

#[derive(Deserialize)]
struct Verdict {
    answer: String,
}

impl WebhookHumanLoopProvider {
    /// 默认等待 5 分钟
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl HumanLoopProvider for WebhookHumanLoopProvider {
    async fn request(&self, req: HumanLoopRequest) -> Result<HumanLoopResponse> {
        let card = ReviewCard::from_request(&req);

        let resp = match self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&card)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                warn!(channel = %req.channel_id, "⏳ 审批服务未在时限内作答，本条不发送");
                return Ok(HumanLoopResponse::Timeout);
            }
            Err(e) => return Err(ChatError::Approval(format!("审批服务不可达: {e}"))),
        };

        match resp.status() {
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                warn!(channel = %req.channel_id, status = %resp.status(), "⏳ 审批服务报告超时");
                return Ok(HumanLoopResponse::Timeout);
            }
            status if !status.is_success() => {
                return Err(ChatError::Approval(format!("审批服务返回 {status}")));
            }
            _ => {}
        }

        let verdict: Verdict = resp
            .json()
            .await
            .map_err(|e| ChatError::Approval(format!("无法解析审批结果: {e}")))?;
        debug!(channel = %req.channel_id, answer = %verdict.answer, "审批服务作答");
        Ok(parse_answer(&verdict.answer))
    }
}
