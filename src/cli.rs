//! 命令行界面
//!
//! `tcm <问题>` 单次提问，`tcm` 不带参数进入交互循环（斜杠命令见 SLASH_COMMANDS）。
//! 进度事件写到 stderr，回答正文流式写到 stdout。认证失败时提示并可当场录入新 Key 后重试一次。

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::agent::{self, AgentEvent, Answer, ResearchAgent, Session, StepStatus};
use crate::config::{default_config_path, load_config, load_file, mask_key, AppConfig, LANGUAGES};
use crate::core::AgentError;
use crate::llm::{ModelCatalog, Provider};
use crate::tools::{builtin_registry, ToolRegistry};

#[derive(Parser, Debug)]
#[command(
    name = "tcm",
    version,
    about = "Research assistant for Traditional Chinese Medicine",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// 额外的配置文件（覆盖 ~/.tcm/config.toml）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 显示每个步骤的执行情况
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,

    /// 研究问题；省略时进入交互模式
    #[arg(trailing_var_arg = true)]
    pub query: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask a single research question
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        query: Vec<String>,
    },
    /// List available tools
    Tools {
        #[arg(long)]
        category: Option<String>,
    },
    /// List known models
    Models {
        #[arg(long)]
        provider: Option<Provider>,
    },
    /// Run readiness diagnostics
    Doctor,
    /// Show, change or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Manage provider API keys
    #[command(subcommand)]
    Keys(KeysCommand),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    Show,
    Set { key: String, value: String },
    Validate,
}

#[derive(Subcommand, Debug)]
pub enum KeysCommand {
    Show,
    Set(KeysSet),
}

#[derive(Args, Debug)]
pub struct KeysSet {
    pub provider: Provider,
    /// 省略时从标准输入读取
    pub key: Option<String>,
    /// 同时把 llm.provider 设为该服务商
    #[arg(long)]
    pub make_default: bool,
}

pub const SLASH_COMMANDS: &[(&str, &str)] = &[
    ("/help", "Show command reference"),
    ("/tools", "List all tools with health status"),
    ("/model", "Show models or switch: /model <id|number>"),
    ("/lang", "Set response language: en | zh | bi"),
    ("/usage", "Show session token/cost usage"),
    ("/health", "Show degraded or suppressed tools"),
    ("/doctor", "Run readiness diagnostics"),
    ("/config", "Show active runtime configuration"),
    ("/clear", "Clear the screen"),
    ("/exit", "Exit the terminal"),
];

/// 交互模式中的斜杠命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slash {
    Help,
    Tools,
    Model(Option<String>),
    Lang(Option<String>),
    Usage,
    Health,
    Doctor,
    Config,
    Clear,
    Exit,
    Unknown(String),
}

/// 非斜杠开头的输入返回 None（视为研究问题）
pub fn parse_slash(line: &str) -> Option<Slash> {
    let line = line.trim();
    if !line.starts_with('/') {
        return None;
    }
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, Some(rest.trim().to_string()).filter(|s| !s.is_empty())),
        None => (line, None),
    };
    Some(match cmd.to_lowercase().as_str() {
        "/help" => Slash::Help,
        "/tools" => Slash::Tools,
        "/model" => Slash::Model(arg),
        "/lang" => Slash::Lang(arg),
        "/usage" => Slash::Usage,
        "/health" => Slash::Health,
        "/doctor" => Slash::Doctor,
        "/config" => Slash::Config,
        "/clear" => Slash::Clear,
        "/exit" | "/quit" => Slash::Exit,
        other => Slash::Unknown(other.to_string()),
    })
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.clone()).context("Failed to load configuration")?;
    let catalog = Arc::new(ModelCatalog::builtin());
    let registry = Arc::new(builtin_registry());

    match cli.command {
        Some(Command::Ask { query }) => {
            let mut agent = ResearchAgent::new(Session::new(config, catalog), registry);
            run_single_query(&mut agent, &query.join(" "), cli.verbose, cli.config.as_deref()).await
        }
        Some(Command::Tools { category }) => {
            print_tools(&registry, category.as_deref(), None);
            Ok(())
        }
        Some(Command::Models { provider }) => {
            print_models(&catalog, provider, &config.llm.model);
            Ok(())
        }
        Some(Command::Doctor) => {
            let checks = agent::run_checks(&config, &registry, &catalog);
            for check in &checks {
                println!("  {check}");
            }
            if agent::has_errors(&checks) {
                anyhow::bail!("doctor found problems");
            }
            Ok(())
        }
        Some(Command::Config(cmd)) => run_config(cmd, &config, &catalog, cli.config),
        Some(Command::Keys(cmd)) => run_keys(cmd, &config, &catalog, cli.config),
        None if !cli.query.is_empty() => {
            let mut agent = ResearchAgent::new(Session::new(config, catalog), registry);
            run_single_query(&mut agent, &cli.query.join(" "), cli.verbose, cli.config.as_deref()).await
        }
        None => {
            let agent = ResearchAgent::new(Session::new(config, catalog), registry);
            run_interactive(agent, cli.verbose, cli.config.as_deref()).await
        }
    }
}

/// 修改后写回的文件：显式 --config 或 ~/.tcm/config.toml
fn save_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    explicit
        .or_else(default_config_path)
        .context("Cannot determine config path (HOME is not set), pass --config")
}

fn run_config(
    cmd: ConfigCommand,
    config: &AppConfig,
    catalog: &ModelCatalog,
    explicit: Option<PathBuf>,
) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show => print!("{}", config.masked().to_toml()?),
        ConfigCommand::Set { key, value } => {
            let path = save_path(explicit)?;
            let mut persisted = load_file(&path)?;
            persisted.set(&key, &value, catalog)?;
            persisted.save_to(&path)?;
            println!("  Set {key} = {value} ({})", path.display());
        }
        ConfigCommand::Validate => {
            let issues = config.validate();
            if issues.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Found {} issue(s):", issues.len());
                for issue in &issues {
                    println!("  - {issue}");
                }
                anyhow::bail!("invalid configuration");
            }
        }
    }
    Ok(())
}

fn run_keys(
    cmd: KeysCommand,
    config: &AppConfig,
    catalog: &ModelCatalog,
    explicit: Option<PathBuf>,
) -> anyhow::Result<()> {
    match cmd {
        KeysCommand::Show => {
            for provider in Provider::ALL {
                let status = match config.llm_api_key(provider) {
                    Some(key) => mask_key(&key),
                    None => format!("not set ({})", provider.api_key_env()),
                };
                println!("  {:<18} {status}", provider.label());
            }
        }
        KeysCommand::Set(args) => {
            let key = match args.key {
                Some(key) => key,
                None => prompt_line(&format!("Enter your {} API key", args.provider.label()))?,
            };
            if key.trim().is_empty() {
                anyhow::bail!("empty API key, nothing saved");
            }
            let path = save_path(explicit)?;
            let mut persisted = load_file(&path)?;
            persisted.set_api_key(args.provider, &key);
            if args.make_default {
                persisted.set("llm.provider", args.provider.as_str(), catalog)?;
            }
            persisted.save_to(&path)?;
            println!(
                "  Saved key for provider {}: {}",
                args.provider,
                mask_key(key.trim())
            );
        }
    }
    Ok(())
}

/// 读取一行用户输入（标准输入，不隐藏回显）
fn prompt_line(label: &str) -> anyhow::Result<String> {
    print!("  {label}: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

async fn run_single_query(
    agent: &mut ResearchAgent,
    query: &str,
    verbose: bool,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let answered = ask_with_repair(agent, query, verbose, config_path).await?;
    if answered.is_none() {
        anyhow::bail!("authentication failed");
    }
    eprintln!("\n  {}", agent.session().usage_summary());
    Ok(())
}

/// 提问并把事件渲染到终端；认证失败时尝试修复凭据并重试一次。
/// 返回 Ok(None) 表示认证问题未解决。
async fn ask_with_repair(
    agent: &mut ResearchAgent,
    query: &str,
    verbose: bool,
    config_path: Option<&Path>,
) -> anyhow::Result<Option<Answer>> {
    match ask_printing(agent, query, verbose).await {
        Ok(answer) => Ok(Some(answer)),
        Err(e) if e.is_authentication() => {
            if !repair_credentials(agent.session_mut(), true, config_path)? {
                return Ok(None);
            }
            match ask_printing(agent, query, verbose).await {
                Ok(answer) => Ok(Some(answer)),
                Err(e) if e.is_authentication() => {
                    repair_credentials(agent.session_mut(), false, config_path)?;
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

async fn ask_printing(agent: &ResearchAgent, query: &str, verbose: bool) -> Result<Answer, AgentError> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            render_event(&event, verbose);
        }
    });
    let result = agent.ask_with_events(query, None, Some(&tx)).await;
    drop(tx);
    let _ = printer.await;
    result
}

fn render_event(event: &AgentEvent, verbose: bool) {
    match event {
        AgentEvent::Planning => eprintln!("  Planning..."),
        AgentEvent::PlanReady { steps, .. } if *steps > 0 => eprintln!("  Plan: {steps} step(s)"),
        AgentEvent::StepStarted { step, tool, purpose } if verbose => {
            eprintln!("  Step {step}: {tool} ({purpose})")
        }
        AgentEvent::StepRetry { tool, attempt, error, .. } if verbose => {
            eprintln!("    {tool} attempt {attempt} failed: {error}, retrying")
        }
        AgentEvent::StepFinished { status, .. } if verbose => match status {
            StepStatus::Success => eprintln!("    ✓ success"),
            StepStatus::Error => eprintln!("    ✗ error"),
        },
        AgentEvent::Synthesizing => eprintln!(),
        AgentEvent::AnswerChunk { text } => {
            print!("{text}");
            let _ = io::stdout().flush();
        }
        AgentEvent::AnswerDone => println!(),
        _ => {}
    }
}

/// 认证失败提示；prompt 为 true 时询问是否当场录入新 Key，
/// 新 Key 立即用于本会话并写回配置文件（--config 指定的文件优先）
fn repair_credentials(
    session: &mut Session,
    prompt: bool,
    config_path: Option<&Path>,
) -> anyhow::Result<bool> {
    let provider = session.config().provider()?;
    eprintln!();
    eprintln!("  Authentication failed for provider {provider}.");
    eprintln!("  Your API key is missing or invalid.");

    if prompt {
        let choice = prompt_line("Enter a new API key now? [y/N]")?.to_lowercase();
        if choice == "y" || choice == "yes" {
            let key = prompt_line(&format!("Enter your {} API key", provider.label()))?;
            if !key.is_empty() {
                session.set_api_key(provider, &key);
                match save_path(config_path.map(Path::to_path_buf)) {
                    Ok(path) => {
                        persist_api_key(&path, provider, &key)?;
                        eprintln!("  API key saved to {}.", path.display());
                    }
                    Err(_) => eprintln!("  API key set for this session only."),
                }
                return Ok(true);
            }
        }
    }

    eprintln!("{}", credential_hint(provider));
    Ok(false)
}

/// 只改动目标文件中的对应 Key，其余内容保持原样
fn persist_api_key(path: &Path, provider: Provider, key: &str) -> anyhow::Result<()> {
    let mut persisted = load_file(path)?;
    persisted.set_api_key(provider, key);
    persisted.save_to(path)?;
    Ok(())
}

pub fn credential_hint(provider: Provider) -> String {
    format!(
        "  To fix, run:\n    tcm keys set {provider} YOUR_KEY\n  or export {}=YOUR_KEY",
        provider.api_key_env()
    )
}

async fn run_interactive(
    mut agent: ResearchAgent,
    verbose: bool,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    println!(
        "  TCM CLI v{} | model: {} | tools: {}",
        env!("CARGO_PKG_VERSION"),
        agent.session().current_model(),
        agent.registry().len()
    );
    println!("  Type your research question, /help for commands, /exit to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\ntcm> ");
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_slash(line) {
            Some(Slash::Exit) => break,
            Some(slash) => handle_slash(&mut agent, slash)?,
            None => {
                if let Err(e) = ask_with_repair(&mut agent, line, verbose, config_path).await {
                    eprintln!("  Error: {e:#}");
                }
            }
        }
    }
    eprintln!("  {}", agent.session().usage_summary());
    Ok(())
}

fn handle_slash(agent: &mut ResearchAgent, slash: Slash) -> anyhow::Result<()> {
    match slash {
        Slash::Help => {
            println!("  Available commands:");
            for (cmd, desc) in SLASH_COMMANDS {
                println!("    {cmd:<10} {desc}");
            }
        }
        Slash::Tools => {
            let suppressed = agent.session().tool_health_suppressed_tools();
            print_tools(agent.registry(), None, Some(&suppressed));
        }
        Slash::Model(None) => {
            let catalog = agent.session().catalog().clone();
            print_models(&catalog, None, &agent.session().current_model());
        }
        Slash::Model(Some(choice)) => match apply_model_choice(agent.session_mut(), &choice) {
            Ok(message) => println!("  {message}"),
            Err(message) => println!("  {message}"),
        },
        Slash::Lang(None) => println!(
            "  Language: {} (set with /lang {})",
            agent.session().config().ui.language,
            LANGUAGES.join("|")
        ),
        Slash::Lang(Some(lang)) => match agent.session_mut().set_language(&lang) {
            Ok(()) => println!("  Language set to {}", agent.session().config().ui.language),
            Err(e) => println!("  {e}"),
        },
        Slash::Usage => println!("  {}", agent.session().usage_summary()),
        Slash::Health => {
            let report = agent.session().tool_health_report();
            if report.is_empty() {
                println!("  All tools healthy.");
            }
            for (tool, health) in report {
                println!("  {tool:<32} {health}");
            }
        }
        Slash::Doctor => {
            let session = agent.session();
            for check in agent::run_checks(session.config(), agent.registry(), session.catalog()) {
                println!("  {check}");
            }
        }
        Slash::Config => print!("{}", agent.session().config().masked().to_toml()?),
        Slash::Clear => {
            print!("\x1B[2J\x1B[1;1H");
            io::stdout().flush()?;
        }
        Slash::Exit => {}
        Slash::Unknown(cmd) => {
            println!("  Unknown command: {cmd}");
            println!("  Type /help for available commands.");
        }
    }
    Ok(())
}

/// `/model <编号|模型 ID>`；编号对应 print_models 的列表顺序
pub fn apply_model_choice(session: &mut Session, choice: &str) -> Result<String, String> {
    let choice = choice.trim();
    let catalog = session.catalog().clone();
    if let Ok(n) = choice.parse::<usize>() {
        let models = catalog.list(None);
        let Some(selected) = n.checked_sub(1).and_then(|i| models.get(i)) else {
            return Err(format!("Invalid number. Choose 1-{}.", models.len()));
        };
        session
            .set_model(&selected.id, Some(selected.provider))
            .map_err(|e| e.to_string())?;
        return Ok(format!("Switched to {} ({})", selected.id, selected.provider));
    }

    let Some(provider) = catalog.resolve_provider(choice) else {
        return Err(format!(
            "Unknown model '{choice}'. Use a model ID from the list or a name with a recognized prefix (claude-*, gpt-*)."
        ));
    };
    session.set_model(choice, None).map_err(|e| e.to_string())?;
    let note = if catalog.contains(choice) {
        provider.to_string()
    } else {
        format!("{provider}, not in catalog")
    };
    Ok(format!("Switched to {choice} ({note})"))
}

fn print_tools(
    registry: &ToolRegistry,
    category: Option<&str>,
    suppressed: Option<&std::collections::BTreeSet<String>>,
) {
    let tools = registry.list(category);
    if tools.is_empty() {
        println!("  No tools found.");
        return;
    }
    let mut current = String::new();
    for tool in tools {
        if tool.category() != current {
            current = tool.category().to_string();
            println!("  [{current}]");
        }
        let marker = match suppressed {
            Some(s) if s.contains(tool.name()) => " (suppressed)",
            _ => "",
        };
        println!("    {:<32} {}{marker}", tool.name(), tool.description());
    }
}

fn print_models(catalog: &ModelCatalog, provider: Option<Provider>, current: &str) {
    let mut last: Option<Provider> = None;
    for (i, model) in catalog.list(provider).iter().enumerate() {
        if last != Some(model.provider) {
            println!("  {}", model.provider.label());
            last = Some(model.provider);
        }
        let marker = if model.id == current { "●" } else { " " };
        println!(
            "    {:>2} {marker} {:<36} {:>5}k  {}",
            i + 1,
            model.id,
            model.context_window / 1000,
            model.description
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MockClock;

    #[test]
    fn test_parse_slash() {
        assert_eq!(parse_slash("黄芪的功效"), None);
        assert_eq!(parse_slash("/help"), Some(Slash::Help));
        assert_eq!(parse_slash("  /MODEL  gpt-4o "), Some(Slash::Model(Some("gpt-4o".into()))));
        assert_eq!(parse_slash("/model"), Some(Slash::Model(None)));
        assert_eq!(parse_slash("/lang zh"), Some(Slash::Lang(Some("zh".into()))));
        assert_eq!(parse_slash("/quit"), Some(Slash::Exit));
        assert_eq!(parse_slash("/copy"), Some(Slash::Unknown("/copy".into())));
    }

    #[test]
    fn test_cli_parses_query_and_subcommands() {
        let cli = Cli::try_parse_from(["tcm", "what", "is", "黄芪"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.query.join(" "), "what is 黄芪");

        let cli = Cli::try_parse_from(["tcm", "keys", "set", "openai", "sk-x", "--make-default"]).unwrap();
        match cli.command {
            Some(Command::Keys(KeysCommand::Set(args))) => {
                assert_eq!(args.provider, Provider::OpenAi);
                assert_eq!(args.key.as_deref(), Some("sk-x"));
                assert!(args.make_default);
            }
            other => panic!("unexpected {other:?}"),
        }

        let cli = Cli::try_parse_from(["tcm", "models", "--provider", "google"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Models { provider: Some(Provider::Google) })
        ));
    }

    #[test]
    fn test_apply_model_choice() {
        let mut session = Session::with_clock(
            AppConfig::default(),
            Arc::new(ModelCatalog::builtin()),
            Arc::new(MockClock::new()),
        );
        let msg = apply_model_choice(&mut session, "gpt-4o").unwrap();
        assert_eq!(msg, "Switched to gpt-4o (openai)");

        let msg = apply_model_choice(&mut session, "claude-future-9").unwrap();
        assert!(msg.ends_with("(anthropic, not in catalog)"));

        let msg = apply_model_choice(&mut session, "1").unwrap();
        assert!(msg.starts_with("Switched to "));
        assert!(apply_model_choice(&mut session, "999").is_err());
        assert!(apply_model_choice(&mut session, "llama3").is_err());
    }

    #[test]
    fn test_repaired_key_goes_to_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.toml");
        std::fs::write(&path, "[llm]\nprovider = \"openai\"\nmodel = \"gpt-4o\"\n").unwrap();

        let target = save_path(Some(path.clone())).unwrap();
        assert_eq!(target, path);
        persist_api_key(&target, Provider::OpenAi, "sk-proj-new-key-1234").unwrap();

        let saved = load_file(&path).unwrap();
        assert_eq!(saved.llm.provider, "openai");
        assert_eq!(saved.llm.model, "gpt-4o");
        assert_eq!(
            saved.llm.api_keys.get("openai").map(String::as_str),
            Some("sk-proj-new-key-1234")
        );
    }

    #[test]
    fn test_credential_hint_names_command_and_env() {
        let hint = credential_hint(Provider::DeepSeek);
        assert!(hint.contains("tcm keys set deepseek"));
        assert!(hint.contains("DEEPSEEK_API_KEY"));
    }
}
