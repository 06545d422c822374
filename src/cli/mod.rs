//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod auth;
pub mod chat;
pub mod history;
pub mod say;
pub mod server_config;


use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::{MemoryTokenStore, TokenStore};
use crate::cli::auth::{run_login, run_logout, run_session};
use crate::cli::chat::run_chat;
use crate::cli::history::run_history;
use crate::cli::say::run_say;
use crate::cli::server_config::run_server_config;
use crate::core::chat_service::{ChatError, ChatService};
use crate::core::config::keys::CONFIG_KEYS;
use crate::core::config::{Config, ConfigError};
use crate::http::{HttpClient, RequestError};
use crate::utils::logging::init_tracing;

/// Exit status used when the backend rejected the access token.
pub const EXIT_UNAUTHORIZED: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "chatweb")]
#[command(about = "A streaming terminal client for chatgpt-web style chat backends")]
#[command(
    long_about = "chatweb talks to a chatgpt-web compatible proxy: it streams replies as they \
arrive, keeps conversation history on disk, and threads follow-up questions onto the \
previous answer.\n\n\
Authentication:\n\
  Use 'chatweb login <token>' when the backend requires a secret key. Tokens are kept in\n\
  memory unless 'token-storage' is set to 'keyring'.\n\n\
Environment Variables:\n\
  CHATWEB_API_BASE_URL  API base URL (defaults to http://127.0.0.1:3002/api)\n\
  CHATWEB_TOKEN         Access token for this invocation only\n\
  CHATWEB_LOG           Log filter, e.g. 'chatweb=debug'\n\n\
Chat commands:\n\
  /new              Start a new conversation\n\
  /retry            Regenerate the last reply\n\
  /quit             Leave the chat\n\
  Ctrl+C            Cancel the reply being streamed"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// API base URL that endpoint paths are joined onto
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Access token to use for this invocation instead of the stored one
    #[arg(long, global = true, env = "CHATWEB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Log request and stream diagnostics to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a single question and print the streamed answer
    Say {
        /// Prompt text; multiple words are joined with spaces
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Start an interactive chat (default)
    Chat,
    /// Verify an access token with the backend and store it
    Login {
        /// Secret key configured on the backend
        #[arg(value_name = "TOKEN")]
        secret: String,
    },
    /// Forget the stored access token
    Logout,
    /// Show whether the backend requires a token and which model it serves
    Session,
    /// Show the backend's configuration and usage
    Config,
    /// Inspect or edit saved conversations
    History {
        #[command(subcommand)]
        action: Option<HistoryCommand>,
    },
    /// Set configuration values, or show them all when no key is given
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key (multiple words are joined)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Reset a configuration value to its default
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum HistoryCommand {
    /// List conversations, newest first (default)
    List,
    /// Print the messages of a conversation
    Show {
        /// Position from `history list`; defaults to the active conversation
        index: Option<usize>,
    },
    /// Make a conversation the one `chat` continues
    Use { index: usize },
    /// Rename a conversation
    Rename {
        index: usize,
        #[arg(trailing_var_arg = true, required = true)]
        title: Vec<String>,
    },
    /// Delete one conversation
    Delete { index: usize },
    /// Delete every conversation
    Clear,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let runtime = tokio::runtime::Runtime::new()?;
    if let Err(err) = runtime.block_on(async_main(args)) {
        eprintln!("❌ {err}");
        let code = exit_code(err.as_ref());
        if code == EXIT_UNAUTHORIZED {
            eprintln!("💡 Run 'chatweb login <token>' with the backend's secret key.");
        }
        std::process::exit(code);
    }
    Ok(())
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let Args {
        command,
        base_url,
        token,
        ..
    } = args;
    let connect = || -> Result<(Config, HttpClient), ConfigError> {
        let config = Config::load()?;
        let client = build_client(base_url.as_deref(), token.as_deref(), &config);
        Ok((config, client))
    };

    match command.unwrap_or(Commands::Chat) {
        Commands::Say { prompt } => {
            let (config, client) = connect()?;
            run_say(&ChatService::new(client, &config), prompt.join(" ")).await
        }
        Commands::Chat => {
            let (config, client) = connect()?;
            run_chat(&ChatService::new(client, &config)).await
        }
        Commands::Login { secret } => {
            let (config, client) = connect()?;
            run_login(&client, &secret, config.token_storage, token.is_some()).await
        }
        Commands::Logout => {
            let (config, client) = connect()?;
            run_logout(&client, config.token_storage)
        }
        Commands::Session => {
            let (_, client) = connect()?;
            run_session(&client).await
        }
        Commands::Config => {
            let (_, client) = connect()?;
            run_server_config(&client).await
        }
        Commands::History { action } => run_history(action.unwrap_or(HistoryCommand::List)),
        Commands::Set { key, value } => {
            let mut config = Config::load()?;
            match key {
                Some(key) if !value.is_empty() => {
                    let value = value.join(" ");
                    config.set_key(&key, &value)?;
                    config.save()?;
                    println!("✅ Set {key} to: {value}");
                }
                Some(key) => {
                    eprintln!("⚠️  Missing value for '{key}'.");
                    eprintln!("Example: chatweb set {key} <value>");
                    std::process::exit(1);
                }
                None => {
                    config.print_all();
                    println!();
                    println!("Keys: {}", CONFIG_KEYS.join(", "));
                }
            }
            Ok(())
        }
        Commands::Unset { key } => {
            let mut config = Config::load()?;
            config.unset_key(&key)?;
            config.save()?;
            println!("✅ Unset {key}");
            Ok(())
        }
    }
}

/// Client for the resolved base URL. An explicit `--token` lives in memory
/// only and never touches the configured token storage.
pub fn build_client(base_url: Option<&str>, token: Option<&str>, config: &Config) -> HttpClient {
    let explicit = token.map(str::trim).filter(|token| !token.is_empty());
    let tokens: Arc<dyn TokenStore> = match explicit {
        Some(token) => Arc::new(MemoryTokenStore::with_token(token)),
        None => config.token_storage.open(),
    };
    HttpClient::new(config.effective_base_url(base_url), tokens).with_timeout(config.timeout())
}

/// Process exit status for an error that ended a command.
pub fn exit_code(err: &(dyn Error + 'static)) -> i32 {
    let unauthorized = err
        .downcast_ref::<RequestError>()
        .is_some_and(RequestError::is_unauthorized)
        || err
            .downcast_ref::<ChatError>()
            .is_some_and(ChatError::is_unauthorized);
    if unauthorized {
        EXIT_UNAUTHORIZED
    } else {
        1
    }
}

/// Cancellation token fired by the next Ctrl-C. Abort the handle once the
/// guarded request is over.
pub(crate) fn cancel_on_ctrl_c() -> (CancellationToken, JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    (cancel, watcher)
}
