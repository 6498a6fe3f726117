use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use securepilot_core::{OutputFormat, PilotConfig, ScanRequest};
use securepilot_scan::context::ScanContext;
use securepilot_scan::pipeline::ScanPipeline;

const CONFIG_FILE: &str = ".securepilot.toml";

#[derive(Parser)]
#[command(
    name = "securepilot",
    version,
    about = "LLM-assisted security scanning for GitHub pull requests",
    long_about = "SecurePilot scans the changed files of a GitHub pull request for security\n\
                   issues using an LLM, one file (and patch chunk) at a time.\n\n\
                   Examples:\n  \
                     securepilot scan octo/app#42              Scan a pull request\n  \
                     securepilot scan octo/app 42 --format md  Same, as markdown\n  \
                     securepilot scan octo/app#42 --fail-on-issues  Fail CI on findings\n  \
                     securepilot init                          Create .securepilot.toml\n  \
                     securepilot doctor                        Check setup and environment"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .securepilot.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summary (default)\n  \
                         json      Machine-readable JSON\n  \
                         markdown  GitHub-flavored Markdown\n  \
                         sarif     SARIF v2.1.0 (scan subcommand only)"
    )]
    format: OutputFormat,

    /// Enable debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a GitHub pull request for security issues
    #[command(long_about = "Scan a GitHub pull request for security issues.\n\n\
        Lists the PR's changed files, keeps source files with a reviewable patch,\n\
        splits large patches into chunks, and analyzes them concurrently.\n\
        Files that fail analysis are reported with an error instead of aborting\n\
        the scan. Requires an LLM API key; GITHUB_TOKEN is needed for private\n\
        repositories.")]
    Scan {
        /// Pull request: owner/repo#123, a PR URL, or owner/repo followed by the number
        reference: String,
        /// PR number, when the reference is just owner/repo
        pr: Option<u64>,
        /// Maximum analysis calls in flight
        #[arg(long)]
        concurrency: Option<usize>,
        /// Overall scan deadline in seconds
        #[arg(long)]
        deadline: Option<u64>,
        /// Timeout for a single analysis call in seconds
        #[arg(long)]
        call_timeout: Option<u64>,
        /// Largest patch chunk sent in one analysis call, in bytes
        #[arg(long)]
        max_chunk_bytes: Option<usize>,
        /// File extension to scan (repeatable; replaces the default allowlist)
        #[arg(long = "extension", value_name = "EXT")]
        extensions: Vec<String>,
        /// Additional glob patterns to skip (e.g. "tests/**")
        #[arg(long)]
        skip_pattern: Vec<String>,
        /// List files that were skipped, with reasons
        #[arg(long)]
        show_skipped: bool,
        /// Exit with status 1 if any issue is found
        #[arg(
            long,
            long_help = "Exit with status 1 if any file has issues.\n\n\
                Useful in CI pipelines to fail builds on security findings.\n\
                Files that could not be analyzed do not trigger this."
        )]
        fail_on_issues: bool,
    },
    /// Create a default .securepilot.toml configuration file
    #[command(long_about = "Create a default .securepilot.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .securepilot.toml already exists.")]
    Init,
    /// Check your SecurePilot setup and environment
    #[command(long_about = "Check your SecurePilot setup and environment.\n\n\
        Reports the config file, GitHub token, LLM provider and API key, and the\n\
        effective scan limits. Use --format json for machine-readable output.")]
    Doctor,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

struct ScanOverrides {
    concurrency: Option<usize>,
    deadline: Option<u64>,
    call_timeout: Option<u64>,
    max_chunk_bytes: Option<usize>,
    extensions: Vec<String>,
    skip_patterns: Vec<String>,
}

impl ScanOverrides {
    fn apply(self, config: &mut PilotConfig) {
        let scan = &mut config.scan;
        if let Some(n) = self.concurrency {
            scan.max_concurrency = n;
        }
        if let Some(secs) = self.deadline {
            scan.deadline_secs = secs;
        }
        if let Some(secs) = self.call_timeout {
            scan.call_timeout_secs = secs;
        }
        if let Some(bytes) = self.max_chunk_bytes {
            scan.max_chunk_bytes = bytes;
        }
        if !self.extensions.is_empty() {
            scan.extensions = self.extensions;
        }
        scan.skip_patterns.extend(self.skip_patterns);
    }
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1m\x1b[31m\u{1f6e1}\x1b[0m \x1b[1msecurepilot\x1b[0m v{version} — security scanning for pull requests\n");

        println!("Quick start:");
        println!("  \x1b[36msecurepilot init\x1b[0m                Create a .securepilot.toml config file");
        println!("  \x1b[36msecurepilot scan owner/repo#1\x1b[0m   Scan a GitHub pull request\n");

        println!("All commands:");
        println!("  \x1b[32mscan\x1b[0m      Scan a pull request for security issues");
        println!("  \x1b[32mdoctor\x1b[0m    Check your setup and environment");
        println!("  \x1b[32minit\x1b[0m      Create default configuration\n");
    } else {
        println!("securepilot v{version} — security scanning for pull requests\n");

        println!("Quick start:");
        println!("  securepilot init                Create a .securepilot.toml config file");
        println!("  securepilot scan owner/repo#1   Scan a GitHub pull request\n");

        println!("All commands:");
        println!("  scan      Scan a pull request for security issues");
        println!("  doctor    Check your setup and environment");
        println!("  init      Create default configuration\n");
    }

    println!("Run 'securepilot <command> --help' for details.");
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("securepilot=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("securepilot=warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal()),
        )
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PilotConfig> {
    let mut config = match path {
        Some(path) => PilotConfig::from_file(path)?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                PilotConfig::from_file(default_path)?
            } else {
                PilotConfig::default()
            }
        }
    };

    // Environment beats the config file; CLI flags are applied afterwards.
    if let Some(token) = env_var("GITHUB_TOKEN").or_else(|| env_var("GH_TOKEN")) {
        config.github.token = Some(token);
    }
    if let Some(key) = env_var(securepilot_scan::llm::api_key_env(&config.llm.provider)) {
        config.llm.api_key = Some(key);
    }

    tracing::debug!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        api_url = %config.github.api_url,
        "configuration loaded"
    );
    Ok(config)
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self.status {
            "pass" => "\u{2713}",
            "fail" => "\u{2717}",
            _ => "~",
        }
    }

    fn colored_symbol(&self) -> String {
        match self.status {
            "pass" => "\x1b[32m\u{2713}\x1b[0m".into(),
            "fail" => "\x1b[31m\u{2717}\x1b[0m".into(),
            _ => "\x1b[33m~\x1b[0m".into(),
        }
    }
}

fn run_doctor(
    config: &PilotConfig,
    config_path: Option<&Path>,
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    // 1. Config file
    let path = config_path.unwrap_or(Path::new(CONFIG_FILE));
    if path.exists() {
        checks.push(CheckResult::pass(
            "config_file",
            format!("{} found", path.display()),
        ));
    } else {
        checks.push(CheckResult::info(
            "config_file",
            format!("{} not found, using defaults", path.display()),
        ));
    }
    match config.validate() {
        Ok(()) => checks.push(CheckResult::pass("config_valid", "limits are usable")),
        Err(e) => checks.push(CheckResult::fail(
            "config_valid",
            e.to_string(),
            format!("fix the value in {}", path.display()),
        )),
    }

    // 2. GitHub
    if config.github.token.is_some() {
        checks.push(CheckResult::pass("github_token", "token configured"));
    } else {
        checks.push(CheckResult::fail(
            "github_token",
            "GITHUB_TOKEN not set",
            "export GITHUB_TOKEN=... (required for private repositories)",
        ));
    }
    checks.push(CheckResult::info("github_api", config.github.api_url.clone()));

    // 3. LLM provider + API key
    let llm_env_var = securepilot_scan::llm::api_key_env(&config.llm.provider);
    checks.push(CheckResult::pass(
        "llm_provider",
        format!("{} (model: {})", config.llm.provider, config.llm.model),
    ));
    if config.llm.api_key.is_some() {
        checks.push(CheckResult::pass("llm_api_key", "API key configured"));
    } else {
        checks.push(CheckResult::fail(
            "llm_api_key",
            format!("{llm_env_var} not set"),
            format!("export {llm_env_var}=... or set api_key in {CONFIG_FILE}"),
        ));
    }

    // 4. Effective limits
    let scan = &config.scan;
    checks.push(CheckResult::info(
        "scan_limits",
        format!(
            "concurrency {}, chunk {} bytes, patch {} bytes, call timeout {}s, deadline {}s",
            scan.max_concurrency,
            scan.max_chunk_bytes,
            scan.max_patch_bytes,
            scan.call_timeout_secs,
            scan.deadline_secs,
        ),
    ));
    checks.push(CheckResult::info(
        "extensions",
        scan.extensions.join(" "),
    ));

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            let version = env!("CARGO_PKG_VERSION");
            println!("SecurePilot v{version} — Environment Check\n");

            for check in &checks {
                let sym = if use_color {
                    check.colored_symbol()
                } else {
                    check.symbol().to_string()
                };
                let label = check.name.replace('_', " ");
                println!("  {sym} {label:<16} {}", check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# SecurePilot Configuration

[github]
# token = "ghp_..."                 # or set GITHUB_TOKEN / GH_TOKEN
# api_url = "https://api.github.com"
# per_page = 100

[llm]
# provider = "openai"
# model = "gpt-4o"
# api_key = "sk-..."                # or set OPENAI_API_KEY
# base_url = "https://api.openai.com"

[scan]
# extensions = ["py", "js", "ts", "go", "java", "rs"]
# skip_patterns = ["tests/**", "*.spec.ts"]
# max_patch_bytes = 100000
# max_chunk_bytes = 12000
# max_concurrency = 4
# call_timeout_secs = 60
# deadline_secs = 300

[retry.host]
# max_retries = 3
# base_delay_ms = 500
# factor = 2.0
# max_delay_ms = 30000
# jitter_ms = 250

[retry.analysis]
# max_retries = 2
# base_delay_ms = 1000
# factor = 2.0
# max_delay_ms = 30000
# jitter_ms = 250
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => {
            print_welcome(use_color);
        }
        Some(Command::Scan {
            ref reference,
            pr,
            concurrency,
            deadline,
            call_timeout,
            max_chunk_bytes,
            ref extensions,
            ref skip_pattern,
            show_skipped,
            fail_on_issues,
        }) => {
            let request = match pr {
                Some(number) => ScanRequest::new(reference.as_str(), number)?,
                None => securepilot_scan::github::parse_pr_reference(reference)?,
            };

            let mut config = load_config(cli.config.as_deref())?;
            ScanOverrides {
                concurrency,
                deadline,
                call_timeout,
                max_chunk_bytes,
                extensions: extensions.clone(),
                skip_patterns: skip_pattern.clone(),
            }
            .apply(&mut config);

            if config.llm.api_key.is_none() && config.llm.base_url.is_none() {
                let env_var = securepilot_scan::llm::api_key_env(&config.llm.provider);
                miette::bail!(
                    help = format!("Set {env_var} or add api_key under [llm] in {CONFIG_FILE}"),
                    "No API key configured for LLM provider '{}'",
                    config.llm.provider
                );
            }

            let pipeline = ScanPipeline::from_config(&config)?;
            let ctx = ScanContext::with_deadline(config.scan.deadline());

            let interrupt = ctx.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    interrupt.cancel();
                }
            });

            let is_tty = std::io::stderr().is_terminal();
            let spinner = if is_tty && !cli.verbose {
                let pb = indicatif::ProgressBar::new_spinner();
                if let Ok(style) =
                    indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
                {
                    pb.set_style(style);
                }
                pb.set_message(format!("Scanning {request}..."));
                pb.enable_steady_tick(std::time::Duration::from_millis(120));
                Some(pb)
            } else {
                None
            };

            let result = pipeline
                .scan_with_context(&request, &ctx)
                .await
                .inspect_err(|_e| {
                    if let Some(pb) = &spinner {
                        pb.finish_and_clear();
                    }
                })?;

            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
                }
                OutputFormat::Markdown => {
                    print!(
                        "{}",
                        securepilot_scan::report::render_markdown(&request, &result, show_skipped)
                    );
                }
                OutputFormat::Sarif => {
                    let sarif = securepilot_scan::sarif::to_sarif(&result);
                    println!("{}", serde_json::to_string_pretty(&sarif).into_diagnostic()?);
                }
                OutputFormat::Text => {
                    print!(
                        "{}",
                        securepilot_scan::report::render_text(&request, &result, show_skipped)
                    );
                }
            }

            if fail_on_issues && result.issue_count() > 0 {
                std::process::exit(1);
            }
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Doctor) => {
            if cli.format == OutputFormat::Sarif {
                miette::bail!("SARIF output is only supported for the scan subcommand.");
            }
            let config = load_config(cli.config.as_deref())?;
            run_doctor(&config, cli.config.as_deref(), cli.format, use_color)?;
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "securepilot", &mut std::io::stdout());
        }
    }

    Ok(())
}
