// crates/mig-cli/src/main.rs
// ============================================================================
// Module: MIG CLI Entry Point
// Description: Command dispatcher for key management and action workflows.
// Purpose: Create, sign, dispatch, follow, and inspect actions from a shell.
// Dependencies: clap, mig-auth, mig-client, mig-config, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! The `mig` binary loads `mig.toml` (or `--config`, or `MIG_CONFIG`), builds
//! the signing key and API client it describes, and drives the action
//! lifecycle through [`Orchestrator`]. Diagnostics go to stderr through
//! `tracing`; command output goes to stdout through explicit writers.
//!
//! Security posture: input files are size-bounded, sealed keys are unlocked
//! from the configured environment variable or an echo-free prompt, and
//! tokens are never logged.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use dialoguer::Password;
use mig_auth::EnvPassphrase;
use mig_auth::KeyFile;
use mig_auth::NoPassphrase;
use mig_auth::PassphraseCache;
use mig_auth::PassphraseSource;
use mig_auth::SchemeId;
use mig_auth::SchemeRegistry;
use mig_auth::SealParams;
use mig_auth::SignatureScheme;
use mig_auth::standard_schemes;
use mig_cli::inputs::build_module;
use mig_cli::inputs::parse_targets;
use mig_cli::inputs::read_json_file;
use mig_cli::prompt::FallbackPassphrase;
use mig_cli::prompt::TerminalPassphrase;
use mig_cli::render::ResultSummary;
use mig_cli::render::render_event;
use mig_cli::render::render_outcome;
use mig_cli::render::render_results;
use mig_cli::render::summarize;
use mig_client::ActionCatalog;
use mig_client::Authenticator;
use mig_client::CommandSearch;
use mig_client::FollowCancel;
use mig_client::HttpMigApi;
use mig_client::Orchestrator;
use mig_client::SignedTokenAuthenticator;
use mig_config::MigConfig;
use mig_core::ActionId;
use mig_core::Clock;
use mig_core::Command;
use mig_core::Fingerprint;
use mig_core::SystemClock;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::Duration;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default action lifetime in seconds.
const DEFAULT_EXPIRE_AFTER_SECS: i64 = 300;
/// Longest accepted action lifetime in seconds.
const MAX_EXPIRE_AFTER_SECS: i64 = 30 * 24 * 60 * 60;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "mig", version, about = "Sign, dispatch, and follow MIG actions")]
struct Cli {
    /// Config file path (defaults to `MIG_CONFIG`, then mig.toml).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Log at debug level regardless of `RUST_LOG`.
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a signing key pair.
    Keygen(KeygenCommand),
    /// Print a signed API authorization header.
    Token,
    /// Action workflows.
    Action {
        /// Selected action subcommand.
        #[command(subcommand)]
        command: ActionCommand,
    },
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Action subcommands.
#[derive(Subcommand, Debug)]
enum ActionCommand {
    /// Create, sign, and dispatch an action, then follow it.
    Run(ActionRunCommand),
    /// Follow a dispatched action until it stops.
    Follow(ActionFollowCommand),
    /// Print the commands of an action.
    Results(ActionResultsCommand),
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the config file.
    Validate,
}

/// Arguments for key generation.
#[derive(Args, Debug)]
struct KeygenCommand {
    /// Scheme identifier, e.g. auth-scheme-ed25519.
    #[arg(long, value_name = "SCHEME", default_value = "auth-scheme-ed25519")]
    scheme: String,
    /// Key file to write.
    #[arg(long, value_name = "PATH")]
    output: PathBuf,
    /// Also write a public-only copy here.
    #[arg(long, value_name = "PATH")]
    public_output: Option<PathBuf>,
    /// Seal the private key under a passphrase read from the terminal.
    #[arg(long)]
    seal: bool,
}

/// Arguments for `action run`.
#[derive(Args, Debug)]
struct ActionRunCommand {
    /// Module to run on each agent.
    #[arg(long, value_name = "NAME")]
    module: String,
    /// JSON file with the module parameters (defaults to `{}`).
    #[arg(long, value_name = "PATH")]
    params: Option<PathBuf>,
    /// JSON file with one target query or an array of them.
    #[arg(long, value_name = "PATH")]
    target: PathBuf,
    /// Action lifetime in seconds.
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_EXPIRE_AFTER_SECS)]
    expire_after: i64,
    /// Compress operation parameters before signing.
    #[arg(long)]
    compress: bool,
    /// Return after dispatch without following.
    #[arg(long)]
    no_follow: bool,
    /// Result output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

/// Arguments for `action follow`.
#[derive(Args, Debug)]
struct ActionFollowCommand {
    /// Authority-assigned action ID.
    #[arg(long, value_name = "ID")]
    id: u64,
    /// Result output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

/// Arguments for `action results`.
#[derive(Args, Debug)]
struct ActionResultsCommand {
    /// Authority-assigned action ID.
    #[arg(long, value_name = "ID")]
    id: u64,
    /// Only list commands whose modules found something.
    #[arg(long)]
    found_only: bool,
    /// Result output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

/// Output formats for result listings.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    /// One line per command plus a summary.
    Text,
    /// A JSON document with the commands and a summary.
    Json,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli).await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Installs the stderr log subscriber.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Executes the CLI command dispatcher.
async fn run(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Commands::Keygen(command) => command_keygen(&command),
        Commands::Token => command_token(cli.config.as_deref()),
        Commands::Action {
            command,
        } => command_action(command, cli.config.as_deref()).await,
        Commands::Config {
            command: ConfigCommand::Validate,
        } => command_config_validate(cli.config.as_deref()),
    }
}

// ============================================================================
// SECTION: Key Commands
// ============================================================================

/// Executes `keygen`.
fn command_keygen(command: &KeygenCommand) -> CliResult<ExitCode> {
    let scheme_id: SchemeId =
        command.scheme.parse().map_err(|err| CliError::new(format!("keygen failed: {err}")))?;
    let registry = scheme_registry(Arc::new(NoPassphrase));
    let scheme =
        registry.get(scheme_id).map_err(|err| CliError::new(format!("keygen failed: {err}")))?;

    let passphrase = if command.seal { Some(read_new_passphrase()?) } else { None };
    let key = scheme
        .generate(passphrase.as_ref().map(|passphrase| passphrase.as_str()))
        .map_err(|err| CliError::new(format!("keygen failed: {err}")))?;
    key.save(&command.output).map_err(|err| CliError::new(format!("keygen failed: {err}")))?;
    if let Some(path) = &command.public_output {
        key.public_only().save(path).map_err(|err| CliError::new(format!("keygen failed: {err}")))?;
    }
    info!(
        scheme = %scheme_id,
        fingerprint = %key.fingerprint,
        sealed = command.seal,
        "key generated"
    );
    write_stdout_line(key.fingerprint.as_str())?;
    Ok(ExitCode::SUCCESS)
}

/// Prompts twice for a new passphrase.
fn read_new_passphrase() -> CliResult<Zeroizing<String>> {
    let passphrase = Password::new()
        .with_prompt("New key passphrase")
        .with_confirmation("Repeat passphrase", "passphrases do not match")
        .interact()
        .map_err(|err| CliError::new(format!("passphrase prompt failed: {err}")))?;
    Ok(Zeroizing::new(passphrase))
}

/// Executes `token`.
fn command_token(config_path: Option<&Path>) -> CliResult<ExitCode> {
    let config = load_config(config_path)?;
    let signer = load_signer(&config)?;
    let header = signer
        .authenticator()
        .authenticate()
        .map_err(|err| CliError::new(format!("token signing failed: {err}")))?;
    write_stdout_line(&format!("{}: {}", header.name, header.value))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Signing Setup
// ============================================================================

/// Signing key resolved from configuration.
struct Signer {
    /// Provider holding the private key.
    scheme: Arc<dyn SignatureScheme>,
    /// Fingerprint of the key.
    fingerprint: Fingerprint,
}

impl Signer {
    /// Builds a request authenticator for this key.
    fn authenticator(&self) -> SignedTokenAuthenticator {
        SignedTokenAuthenticator::new(Arc::clone(&self.scheme), self.fingerprint.clone(), clock())
    }
}

/// Builds the scheme registry with a shared passphrase cache.
fn scheme_registry(source: Arc<dyn PassphraseSource>) -> SchemeRegistry {
    standard_schemes(Arc::new(PassphraseCache::new()), source, SealParams::default())
}

/// Loads the configured signing key.
fn load_signer(config: &MigConfig) -> CliResult<Signer> {
    let signing = &config.signing;
    let primary: Arc<dyn PassphraseSource> = match &signing.passphrase_env {
        Some(var) => Arc::new(EnvPassphrase::new(var.clone())),
        None => Arc::new(NoPassphrase),
    };
    let source = Arc::new(FallbackPassphrase::new(primary, Arc::new(TerminalPassphrase)));
    let registry = scheme_registry(source);

    let path = signing.key_file_path().map_err(|err| CliError::new(err.to_string()))?;
    let key = KeyFile::load(&path)
        .map_err(|err| CliError::new(format!("signing key load failed: {err}")))?;
    if let Some(expected) = signing.scheme
        && expected != key.scheme
    {
        return Err(CliError::new(format!(
            "signing key {} uses {}, config expects {expected}",
            path.display(),
            key.scheme
        )));
    }
    let scheme = registry.get(key.scheme).map_err(|err| CliError::new(err.to_string()))?;
    let fingerprint = scheme
        .import_key_file(&key)
        .map_err(|err| CliError::new(format!("signing key load failed: {err}")))?;
    if let Some(expected) = &signing.fingerprint
        && expected != &fingerprint
    {
        return Err(CliError::new(format!(
            "signing key fingerprint {fingerprint} does not match configured {expected}"
        )));
    }
    if !scheme.has_private_key(&fingerprint) {
        return Err(CliError::new(format!("key file {} holds no private key", path.display())));
    }
    Ok(Signer {
        scheme,
        fingerprint,
    })
}

/// Returns the process clock.
fn clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

// ============================================================================
// SECTION: Action Commands
// ============================================================================

/// Dispatches action subcommands.
async fn command_action(command: ActionCommand, config_path: Option<&Path>) -> CliResult<ExitCode> {
    let config = load_config(config_path)?;
    let signer = load_signer(&config)?;
    let api = HttpMigApi::from_config(&config.api).map_err(|err| CliError::new(err.to_string()))?;
    let clock = clock();
    let orchestrator =
        Orchestrator::new(Arc::new(api), Arc::new(ActionCatalog::new(Arc::clone(&clock))), clock)
            .with_follow_config(config.follow.clone())
            .with_search_config(config.search.clone());
    let auth = signer.authenticator();

    match command {
        ActionCommand::Run(command) => {
            command_action_run(&orchestrator, &signer, &auth, &command).await
        }
        ActionCommand::Follow(command) => {
            let action_id = ActionId::new(command.id);
            follow_and_report(&orchestrator, &auth, action_id, command.format).await
        }
        ActionCommand::Results(command) => {
            let action_id = ActionId::new(command.id);
            let commands = if command.found_only {
                let search = CommandSearch::for_action(action_id, config.search.page_size)
                    .with_found_anything(true);
                orchestrator.search(search, &auth).await
            } else {
                orchestrator.results(action_id, &auth).await
            }
            .map_err(|err| CliError::new(format!("result search failed: {err}")))?;
            write_results(&commands, command.format)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Executes `action run`.
async fn command_action_run(
    orchestrator: &Orchestrator,
    signer: &Signer,
    auth: &dyn Authenticator,
    command: &ActionRunCommand,
) -> CliResult<ExitCode> {
    if !(1 ..= MAX_EXPIRE_AFTER_SECS).contains(&command.expire_after) {
        return Err(CliError::new(format!(
            "--expire-after must be between 1 and {MAX_EXPIRE_AFTER_SECS}"
        )));
    }
    let targets =
        read_json_file(&command.target).map_err(|err| CliError::new(err.to_string()))?;
    let queries =
        parse_targets(&targets).map_err(|err| CliError::new(format!("invalid target: {err}")))?;
    let parameters = match &command.params {
        Some(path) => read_json_file(path).map_err(|err| CliError::new(err.to_string()))?,
        None => Value::Object(serde_json::Map::new()),
    };
    let module = build_module(&command.module, parameters)
        .map_err(|err| CliError::new(err.to_string()))?;

    let expire_after = Duration::seconds(command.expire_after);
    let local_id =
        tokio::task::block_in_place(|| orchestrator.create(module.as_ref(), &queries, expire_after))
            .map_err(|err| CliError::new(format!("action creation failed: {err}")))?;
    if command.compress {
        orchestrator
            .catalog()
            .request_compression(&local_id)
            .map_err(|err| CliError::new(format!("action creation failed: {err}")))?;
    }
    orchestrator
        .sign(&local_id, signer.scheme.as_ref(), &signer.fingerprint)
        .map_err(|err| CliError::new(format!("signing failed: {err}")))?;
    let accepted = orchestrator
        .dispatch(&local_id, auth)
        .await
        .map_err(|err| CliError::new(format!("dispatch failed: {err}")))?;
    let action_id =
        accepted.id.ok_or_else(|| CliError::new("dispatch returned no action id".to_string()))?;
    write_stdout_line(&format!("action {action_id} dispatched (local {local_id})"))?;

    if command.no_follow {
        return Ok(ExitCode::SUCCESS);
    }
    follow_and_report(orchestrator, auth, action_id, command.format).await
}

/// Follows an action, then prints its commands.
async fn follow_and_report(
    orchestrator: &Orchestrator,
    auth: &dyn Authenticator,
    action_id: ActionId,
    format: OutputFormat,
) -> CliResult<ExitCode> {
    let (sender, cancel) = FollowCancel::channel();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(action_id = %action_id, "interrupted; the action keeps running remotely");
            let _ = sender.send(true);
        }
    });
    let outcome = orchestrator
        .follow(action_id, auth, cancel, |event| {
            let _ = write_stderr_line(&render_event(&event));
        })
        .await;
    interrupt.abort();
    let outcome = outcome.map_err(|err| CliError::new(format!("follow failed: {err}")))?;
    write_stderr_line(&render_outcome(&outcome))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;

    let commands = orchestrator
        .results(action_id, auth)
        .await
        .map_err(|err| CliError::new(format!("result search failed: {err}")))?;
    write_results(&commands, format)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Executes `config validate`.
fn command_config_validate(config_path: Option<&Path>) -> CliResult<ExitCode> {
    let config = load_config(config_path)?;
    let source =
        config.source_path.as_ref().map_or_else(String::new, |path| path.display().to_string());
    write_stdout_line(&format!("config ok: {source}"))?;
    Ok(ExitCode::SUCCESS)
}

/// Loads and validates configuration.
fn load_config(path: Option<&Path>) -> CliResult<MigConfig> {
    MigConfig::load(path).map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// JSON result document.
#[derive(Serialize)]
struct ResultsOutput<'a> {
    /// Every command.
    commands: &'a [Command],
    /// Aggregate counts.
    summary: ResultSummary,
}

/// Writes command results in the requested format.
fn write_results(commands: &[Command], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Text => write_stdout_line(&render_results(commands)),
        OutputFormat::Json => {
            let output = ResultsOutput {
                commands,
                summary: summarize(commands),
            };
            let text = serde_json::to_string_pretty(&output)
                .map_err(|err| CliError::new(format!("failed to encode results: {err}")))?;
            write_stdout_line(&text)
        }
    }
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}").map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(&format!("mig: {message}"));
    ExitCode::FAILURE
}
