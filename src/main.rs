use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use voicebot::credentials::{self, ApiService};
use voicebot::settings::{self, AppSettings};

/// Voice chatbot: speak, get a short answer, hear it read back.
#[derive(Parser)]
#[command(name = "voicebot", version, about)]
struct Cli {
    /// Path to a JSON settings file (defaults to the user config directory).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start a voice conversation (default).
    Chat,

    /// Capture one utterance and print the transcript.
    Dictate {
        /// Give up after this many seconds without a result.
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },

    /// Read text aloud.
    Speak {
        text: Vec<String>,

        /// BCP-47 language tag (defaults to the configured synthesis language).
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Manage API keys stored in the system keyring.
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },

    /// Inspect or create the settings file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum KeysAction {
    /// Store a key (read from the first line of stdin).
    Set { service: ApiService },
    /// Delete a stored key.
    Clear { service: ApiService },
    /// Show which keys are configured.
    Show,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings.
    Show,
    /// Write the default settings file if none exists.
    Init,
}

fn config_path(cli_path: Option<PathBuf>) -> Result<PathBuf, String> {
    match cli_path {
        Some(path) => Ok(path),
        None => settings::settings_path(),
    }
}

fn load(cli_path: Option<PathBuf>) -> AppSettings {
    match cli_path {
        Some(path) => settings::load_settings_from(&path),
        None => settings::load_settings(),
    }
}

fn read_key_from_stdin(service: ApiService) -> Result<String, String> {
    eprintln!("Paste the {} API key and press Enter:", service.label());
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| format!("Failed to read key: {}", e))?;
    let key = line.trim().to_string();
    if key.is_empty() {
        return Err("No key entered".to_string());
    }
    Ok(key)
}

fn show_keys() {
    for service in [ApiService::Completion, ApiService::Translation] {
        match credentials::get_api_key(service) {
            Some(key) => println!("{:<12} {}", service.label(), credentials::mask_key(&key)),
            None => println!("{:<12} not configured ({})", service.label(), service.env_var()),
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => voicebot::console::run_chat(&load(cli.config)).await,
        Command::Dictate { timeout_secs } => {
            voicebot::console::run_dictation(&load(cli.config), Duration::from_secs(timeout_secs.max(1)))
                .await
        }
        Command::Speak { text, language } => {
            voicebot::console::run_speak(&load(cli.config), &text.join(" "), language.as_deref())
                .await
        }
        Command::Keys { action } => match action {
            KeysAction::Set { service } => {
                let key = read_key_from_stdin(service)?;
                credentials::set_api_key(service, Some(&key))?;
                println!("Stored {} key {}", service.label(), credentials::mask_key(&key));
                Ok(())
            }
            KeysAction::Clear { service } => {
                credentials::set_api_key(service, None)?;
                println!("Cleared {} key", service.label());
                Ok(())
            }
            KeysAction::Show => {
                show_keys();
                Ok(())
            }
        },
        Command::Config { action } => match action {
            ConfigAction::Show => {
                let path = config_path(cli.config.clone())?;
                let settings = load(cli.config);
                println!("# {}", path.display());
                let json = serde_json::to_string_pretty(&settings)
                    .map_err(|e| format!("Serialize settings: {}", e))?;
                println!("{}", json);
                for problem in settings.problems() {
                    eprintln!("warning: {}", problem);
                }
                Ok(())
            }
            ConfigAction::Init => {
                let path = config_path(cli.config)?;
                if path.exists() {
                    return Err(format!("{} already exists", path.display()));
                }
                settings::save_settings_to(&path, &AppSettings::default())?;
                println!("Wrote {}", path.display());
                Ok(())
            }
        },
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (for development convenience)
    // Silently ignore if not found - production uses system env vars
    let _ = dotenvy::dotenv();
    voicebot::init_logging();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        log::error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
