use crate::error::{ChatError, Result};
use crate::human_loop::{HumanLoopProvider, HumanLoopRequest, HumanLoopResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// 可脚本化的审批 Mock。
///
/// 按顺序返回预设结果；队列耗尽后返回 [`default`](MockApprover::with_default) 指定的结果
/// （默认拒绝）。
pub struct MockApprover {
    script: Arc<Mutex<VecDeque<HumanLoopResponse>>>,
    default: HumanLoopResponse,
    fail: bool,
    requests: Arc<Mutex<Vec<HumanLoopRequest>>>,
}

impl Default for MockApprover {
    fn default() -> Self {
        Self::new()
    }
}

impl MockApprover {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            default: HumanLoopResponse::Rejected { reason: None },
            fail: false,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 总是通过
    pub fn approving() -> Self {
        Self::new().with_default(HumanLoopResponse::Approved)
    }

    /// 总是拒绝
    pub fn rejecting() -> Self {
        Self::new()
    }

    /// 审批通道本身出错
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn with_approval(self, approved: bool) -> Self {
        let response = if approved {
            HumanLoopResponse::Approved
        } else {
            HumanLoopResponse::Rejected { reason: None }
        };
        self.script.lock().unwrap().push_back(response);
        self
    }

    pub fn with_timeout(self) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(HumanLoopResponse::Timeout);
        self
    }

    pub fn with_default(mut self, response: HumanLoopResponse) -> Self {
        self.default = response;
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HumanLoopRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HumanLoopProvider for MockApprover {
    async fn request(&self, req: HumanLoopRequest) -> Result<HumanLoopResponse> {
        self.requests.lock().unwrap().push(req);
        if self.fail {
            return Err(ChatError::Approval("mock approver failure".to_string()));
        }
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.default.clone()))
    }
}
