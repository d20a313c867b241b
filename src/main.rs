//! 控制台频道：每行输入当作一条 @ 了机器人的消息

use clap::Parser;
use mass_chatbot::channel::{ConsoleSink, InboundMessage};
use mass_chatbot::config::{ApprovalMode, Config};
use mass_chatbot::error::{ChatError, ConfigError};
use mass_chatbot::gate::DeliveryGate;
use mass_chatbot::human_loop::{
    AutoApproveProvider, ConsoleHumanLoopProvider, HumanLoopProvider, WebSocketHumanLoopProvider,
    WebhookHumanLoopProvider,
};
use mass_chatbot::llm::OpenAiCompatClient;
use mass_chatbot::llm::config::ModelRegistry;
use mass_chatbot::memory::FileHistoryStore;
use mass_chatbot::persona::{Personalities, PersonalityTemplate};
use mass_chatbot::session::{Session, SessionConfig, TurnOutcome};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "mass-chatbot")]
#[command(about = "带持久记忆的人设聊天机器人（控制台频道）")]
#[command(version)]
struct Args {
    /// 配置文件（.json 或 .yaml）
    #[arg(short, long, default_value = "config.json", env = "CHATBOT_CONFIG")]
    config: String,

    /// 覆盖配置中的记忆文件路径
    #[arg(short, long)]
    memory: Option<String>,

    /// 控制台用户的 id
    #[arg(long, default_value = "console")]
    user_id: String,

    /// 控制台用户的显示名
    #[arg(long, default_value = "you")]
    user_name: String,

    /// 频道 id
    #[arg(long, default_value = "console")]
    channel: String,

    /// 不读取也不使用历史
    #[arg(long)]
    no_memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mass_chatbot=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    dotenv::dotenv().ok();
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    println!(">>> mass-chatbot {} <<<", config.version);

    let session = build_session(&config, &args).await?;
    info!(
        persona = %session.persona().name(),
        bot = %session.bot().display_name,
        "🤖 机器人已就绪"
    );

    let mut editor = DefaultEditor::new().map_err(|e| ChatError::Channel(e.to_string()))?;
    loop {
        let line = match editor.readline(&format!("{}> ", args.user_name)) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                error!("读取输入失败: {e}");
                break;
            }
        };
        let content = line.trim();
        if content.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(content);

        let msg = InboundMessage::new(
            args.user_id.as_str(),
            args.user_name.as_str(),
            content,
            args.channel.as_str(),
        );
        let outcome = if args.no_memory {
            session.respond(&msg, false).await
        } else {
            session.on_message(&msg).await
        };
        match outcome {
            Ok(TurnOutcome::Suppressed) => warn!("回复被拒绝，未发送"),
            Ok(_) => {}
            Err(e) => error!("❌ 本轮处理失败: {e}"),
        }
    }

    info!("👋 再见");
    Ok(())
}

async fn build_session(config: &Config, args: &Args) -> mass_chatbot::error::Result<Session> {
    let persona = match &config.persona_file {
        Some(path) => PersonalityTemplate::from_file(path)?,
        None => Personalities::builtin().get(&config.persona)?,
    };

    let memory_path = args.memory.as_deref().unwrap_or(&config.memory_path);
    let store = Arc::new(FileHistoryStore::new(memory_path, config.decode_policy)?);

    let registry = ModelRegistry::from_env()?;
    let model = registry.get_model(&config.model)?;
    let llm = OpenAiCompatClient::new(Arc::new(reqwest::Client::new()), model)
        .with_timeout(Duration::from_secs(config.request_timeout_secs));

    let provider: Arc<dyn HumanLoopProvider> = match config.approval {
        ApprovalMode::Console => Arc::new(ConsoleHumanLoopProvider::new()),
        ApprovalMode::Webhook => {
            let url = config.approval_url.clone().ok_or_else(|| {
                ConfigError::MissingConfig("approval_url".to_string(), "webhook".to_string())
            })?;
            Arc::new(WebhookHumanLoopProvider::new(url))
        }
        ApprovalMode::Websocket => {
            Arc::new(WebSocketHumanLoopProvider::bind(config.approval_port).await?)
        }
        ApprovalMode::Auto => Arc::new(AutoApproveProvider),
    };
    let gate = DeliveryGate::new(provider).with_bypass_channels(config.auto_approve_channels.clone());

    Ok(Session::new(
        SessionConfig::from_config(config),
        persona,
        store,
        Arc::new(llm),
        gate,
        Arc::new(ConsoleSink),
    ))
}
