use std::io::Write as _;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;

use super::{HumanLoopProvider, HumanLoopRequest, HumanLoopResponse, parse_answer};
use crate::error::Result;

const HEADER: &str = "\x1b[95m";
const MSG: &str = "\x1b[96m";
const RESP: &str = "\x1b[92m";
const ENDC: &str = "\x1b[0m";

/// 基于命令行 stdin 的审批 Provider（异步，不阻塞 tokio 工作线程）。
///
/// 同一时间只会有一个审批提示占用终端，多个待审批回复排队依次询问。
pub struct ConsoleHumanLoopProvider<R = BufReader<Stdin>> {
    input: Mutex<R>,
}

impl ConsoleHumanLoopProvider {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

impl Default for ConsoleHumanLoopProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ConsoleHumanLoopProvider<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// 从任意输入源读取审批结果
    pub fn with_reader(reader: R) -> Self {
        Self {
            input: Mutex::new(reader),
        }
    }
}

#[async_trait]
impl<R> HumanLoopProvider for ConsoleHumanLoopProvider<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn request(&self, req: HumanLoopRequest) -> Result<HumanLoopResponse> {
        let mut input = self.input.lock().await;

        println!(
            "{HEADER}msg: {ENDC}{MSG}{}{ENDC}\n{HEADER}response: {ENDC}{RESP}{}{ENDC}\n{} [y/n]",
            req.original, req.candidate, req.prompt
        );
        print!(">>>");
        let _ = std::io::stdout().flush();

        let mut buf = String::new();
        input.read_line(&mut buf).await?;
        Ok(parse_answer(&buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_answers_in_order() {
        let provider = ConsoleHumanLoopProvider::with_reader(BufReader::new(&b"y\nn\n"[..]));

        let first = provider
            .request(HumanLoopRequest::approval("hi", "hello", "c1"))
            .await
            .unwrap();
        let second = provider
            .request(HumanLoopRequest::approval("hi", "hello", "c1"))
            .await
            .unwrap();

        assert_eq!(first, HumanLoopResponse::Approved);
        assert_eq!(second, HumanLoopResponse::Rejected { reason: None });
    }
}
