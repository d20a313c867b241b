use crate::channel::MessageSink;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// 记录所有发出消息的 Sink
#[derive(Default, Clone)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(channel_id, text)`，按发送顺序
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, channel_id: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), text.to_string()));
        Ok(())
    }
}
