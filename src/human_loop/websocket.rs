//! WebSocket 审批台
//!
//! 在本地起一个 WebSocket 服务，每个连上来的客户端就是一个审批台。
//! 每条待发送的回复被推送成一张审核卡片；后连上的审批台会补收所有尚未处理的卡片。
//! 任意一个审批台作答后，其余审批台收到 `resolved` 通知，卡片随之关闭。
//! 没有审批台在线时请求照常等待，超时按不发送处理。
//!
//! 服务端推送：
//! ```json
//! {"type": "review", "id": "uuid", "channel_id": "...", "msg": "...", "response": "...", "question": "send? [y/n]"}
//! {"type": "resolved", "id": "uuid", "sent": true}
//! ```
//!
//! 审批台作答：
//! ```json
//! {"id": "uuid", "answer": "y"}
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{HumanLoopProvider, HumanLoopRequest, HumanLoopResponse, parse_answer};
use crate::error::{ChatError, Result};

#[derive(Debug, Clone, Serialize)]
struct ReviewCard {
    id: String,
    channel_id: String,
    msg: String,
    response: String,
    question: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DeskEvent<'a> {
    Review(&'a ReviewCard),
    Resolved { id: &'a str, sent: bool },
}

#[derive(Deserialize)]
struct DeskAnswer {
    id: String,
    answer: String,
}

struct PendingReview {
    card: ReviewCard,
    reply: oneshot::Sender<HumanLoopResponse>,
}

/// 待审卡片（按提交顺序）与在线审批台，同一把锁保护
#[derive(Default)]
struct DeskState {
    pending: Vec<PendingReview>,
    desks: Vec<mpsc::UnboundedSender<String>>,
}

impl DeskState {
    /// 推送给所有在线审批台，顺带清理已断开的，返回仍在线的数量
    fn broadcast(&mut self, event: &DeskEvent<'_>) -> usize {
        match serde_json::to_string(event) {
            Ok(text) => self.desks.retain(|tx| tx.send(text.clone()).is_ok()),
            Err(e) => warn!("审批台消息序列化失败: {e}"),
        }
        self.desks.len()
    }

    fn take(&mut self, id: &str) -> Option<PendingReview> {
        let idx = self.pending.iter().position(|p| p.card.id == id)?;
        Some(self.pending.remove(idx))
    }
}

type SharedDesk = Arc<Mutex<DeskState>>;

pub struct WebSocketHumanLoopProvider {
    state: SharedDesk,
    timeout: Duration,
    local_addr: SocketAddr,
}

impl WebSocketHumanLoopProvider {
    /// 绑定 `127.0.0.1:port`，每张卡片最多等 5 分钟
    pub async fn bind(port: u16) -> std::io::Result<Self> {
        Self::bind_with_timeout(port, Duration::from_secs(300)).await
    }

    /// `port = 0` 时由系统分配端口，见 [`local_addr`](Self::local_addr)
    pub async fn bind_with_timeout(port: u16, timeout: Duration) -> std::io::Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).await?;
        let local_addr = listener.local_addr()?;
        let state = SharedDesk::default();
        tokio::spawn(serve(listener, state.clone()));
        info!("🖥️ WebSocket 审批台已启动: ws://{local_addr}");
        Ok(Self {
            state,
            timeout,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 当前在线的审批台数量
    pub async fn desk_count(&self) -> usize {
        let mut state = self.state.lock().await;
        state.desks.retain(|tx| !tx.is_closed());
        state.desks.len()
    }

    /// 尚未处理的卡片数量
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}

async fn serve(listener: TcpListener, state: SharedDesk) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(attend(stream, addr, state.clone()));
            }
            Err(e) => error!("审批台 accept 失败: {e}"),
        }
    }
}

/// 一个审批台连接：先补发积压的卡片，再持续接收作答
async fn attend(stream: TcpStream, addr: SocketAddr, state: SharedDesk) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(desk = %addr, "WebSocket 握手失败: {e}");
            return;
        }
    };
    let (mut write, mut read) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    {
        let mut desk = state.lock().await;
        for review in &desk.pending {
            match serde_json::to_string(&DeskEvent::Review(&review.card)) {
                Ok(text) => {
                    let _ = tx.send(text);
                }
                Err(e) => warn!("审核卡片序列化失败: {e}"),
            }
        }
        info!(desk = %addr, backlog = desk.pending.len(), "审批台已连接");
        desk.desks.push(tx);
    }

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = write.send(Message::Text(text)).await {
                debug!(desk = %addr, "推送失败: {e}");
                break;
            }
        }
    });

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<DeskAnswer>(&text) {
                Ok(answer) => settle(&state, answer).await,
                Err(e) => warn!(desk = %addr, "无法识别的审批台消息: {e}"),
            },
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    writer.abort();
    info!(desk = %addr, "审批台断开");
}

async fn settle(state: &SharedDesk, answer: DeskAnswer) {
    let decision = parse_answer(&answer.answer);
    let mut desk = state.lock().await;
    let Some(review) = desk.take(&answer.id) else {
        debug!(id = %answer.id, "卡片已被处理或已过期");
        return;
    };
    let sent = decision.is_approved();
    let _ = review.reply.send(decision);
    desk.broadcast(&DeskEvent::Resolved {
        id: &answer.id,
        sent,
    });
}

#[async_trait]
impl HumanLoopProvider for WebSocketHumanLoopProvider {
    async fn request(&self, req: HumanLoopRequest) -> Result<HumanLoopResponse> {
        let card = ReviewCard {
            id: Uuid::new_v4().to_string(),
            channel_id: req.channel_id,
            msg: req.original,
            response: req.candidate,
            question: format!("{} [y/n]", req.prompt),
        };
        let id = card.id.clone();
        let (tx, rx) = oneshot::channel();

        {
            let mut desk = self.state.lock().await;
            if desk.broadcast(&DeskEvent::Review(&card)) == 0 {
                warn!(channel = %card.channel_id, "暂无在线审批台，卡片等待中");
            }
            desk.pending.push(PendingReview { card, reply: tx });
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(decision)) => Ok(decision),
            Ok(Err(_)) => Err(ChatError::Approval("审批结果通道意外关闭".to_string())),
            Err(_) => {
                let mut desk = self.state.lock().await;
                if desk.take(&id).is_some() {
                    desk.broadcast(&DeskEvent::Resolved {
                        id: &id,
                        sent: false,
                    });
                }
                Ok(HumanLoopResponse::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

    type Desk = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn open_desk(provider: &WebSocketHumanLoopProvider) -> Desk {
        let (ws, _) = connect_async(format!("ws://{}", provider.local_addr()))
            .await
            .unwrap();
        for _ in 0..50 {
            if provider.desk_count().await > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        ws
    }

    async fn next_event(ws: &mut Desk) -> serde_json::Value {
        loop {
            if let Message::Text(text) = ws.next().await.unwrap().unwrap() {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    fn answer(id: &serde_json::Value, answer: &str) -> Message {
        Message::Text(serde_json::json!({"id": id, "answer": answer}).to_string())
    }

    #[tokio::test]
    async fn test_no_desk_times_out() {
        let provider =
            WebSocketHumanLoopProvider::bind_with_timeout(0, Duration::from_millis(100))
                .await
                .unwrap();
        let response = provider
            .request(HumanLoopRequest::approval("hi", "hello", "c1"))
            .await
            .unwrap();
        assert_eq!(response, HumanLoopResponse::Timeout);
        assert_eq!(provider.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_desk_approves_and_others_see_resolution() {
        let provider = Arc::new(WebSocketHumanLoopProvider::bind(0).await.unwrap());
        let mut first = open_desk(&provider).await;
        let mut second = open_desk(&provider).await;
        for _ in 0..50 {
            if provider.desk_count().await == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let p = provider.clone();
        let pending = tokio::spawn(async move {
            p.request(HumanLoopRequest::approval("hey alizey", "heyy", "c1"))
                .await
        });

        let card = next_event(&mut first).await;
        assert_eq!(card["type"], "review");
        assert_eq!(card["msg"], "hey alizey");
        assert_eq!(card["response"], "heyy");
        assert_eq!(card["question"], "send? [y/n]");
        assert_eq!(next_event(&mut second).await["id"], card["id"]);

        first.send(answer(&card["id"], "y")).await.unwrap();
        assert_eq!(pending.await.unwrap().unwrap(), HumanLoopResponse::Approved);

        let resolved = next_event(&mut second).await;
        assert_eq!(resolved["type"], "resolved");
        assert_eq!(resolved["id"], card["id"]);
        assert_eq!(resolved["sent"], true);
        assert_eq!(provider.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_late_desk_receives_backlog() {
        let provider = Arc::new(WebSocketHumanLoopProvider::bind(0).await.unwrap());

        let p = provider.clone();
        let pending = tokio::spawn(async move {
            p.request(HumanLoopRequest::approval("hi", "hello", "c1")).await
        });
        for _ in 0..50 {
            if provider.pending_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let mut desk = open_desk(&provider).await;
        let card = next_event(&mut desk).await;
        assert_eq!(card["type"], "review");
        assert_eq!(card["channel_id"], "c1");

        desk.send(answer(&card["id"], "n")).await.unwrap();
        assert_eq!(
            pending.await.unwrap().unwrap(),
            HumanLoopResponse::Rejected { reason: None }
        );
    }
}
