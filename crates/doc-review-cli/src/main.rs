use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use doc_review_core::report::{render_comparison, render_rulesets};
use doc_review_core::{
    comment_body, render_report, AnalysisResult, AppConfig, DocumentType, OutputFormat,
    PostReceipt, ProviderKind, ProviderOutcome,
};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod app;
mod server;

use app::AppState;

#[derive(Parser, Debug)]
#[command(
    name = "doc-review",
    author,
    version,
    about = "Review proposals, kickoff decks and call transcripts with an LLM"
)]
struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory holding <document_type>.json rulesets
    #[arg(long = "rulesets-dir", value_name = "DIR", global = true)]
    rulesets_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a Google Doc, Google Slides deck or local text file
    Analyze {
        /// Google Docs/Slides URL or path to a text file
        source: String,
        /// openai, openrouter, anthropic, google or noop
        #[arg(long)]
        provider: Option<ProviderKind>,
        /// Override the inferred document type
        #[arg(long = "type", value_name = "TYPE")]
        doc_type: Option<DocumentType>,
        /// Post the result to Slack
        #[arg(long)]
        slack: bool,
        /// Add the issue list as a comment on the document
        #[arg(long)]
        comment: bool,
        /// Emit the analysis as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the same document through every supported provider
    Compare {
        source: String,
        #[arg(long = "type", value_name = "TYPE")]
        doc_type: Option<DocumentType>,
        #[arg(long)]
        json: bool,
    },
    /// Analyze a call transcript from a file, stdin (`-`) or Fathom
    Transcript {
        /// Transcript file, or `-` to read stdin
        #[arg(required_unless_present = "fathom", conflicts_with = "fathom")]
        input: Option<String>,
        /// Score the call against BANNT instead of client-call review
        #[arg(long)]
        sales: bool,
        #[arg(long)]
        provider: Option<ProviderKind>,
        /// Fetch the transcript of this Fathom recording
        #[arg(long, value_name = "RECORDING_ID")]
        fathom: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        slack: bool,
        #[arg(long)]
        json: bool,
    },
    /// List the active rulesets
    Rulesets {
        #[arg(long, value_enum, default_value_t = RulesetFormat::Human)]
        format: RulesetFormat,
        /// Shorthand for `--format json`
        #[arg(long, conflicts_with = "format")]
        json: bool,
    },
    /// Print a stored analysis
    History {
        id: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Run the HTTP server
    Serve {
        /// Listen address, defaults to server.addr from the config
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RulesetFormat {
    Human,
    Json,
    Yaml,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    let state = AppState::from_config(config, cli.rulesets_dir)?;

    match cli.command {
        Commands::Analyze {
            source,
            provider,
            doc_type,
            slack,
            comment,
            json,
        } => analyze(&state, &source, provider, doc_type, slack, comment, json).await,
        Commands::Compare {
            source,
            doc_type,
            json,
        } => compare(&state, &source, doc_type, json).await,
        Commands::Transcript {
            input,
            sales,
            provider,
            fathom,
            title,
            slack,
            json,
        } => {
            let request = TranscriptRequest {
                input,
                sales,
                provider,
                fathom,
                title,
                slack,
                json,
            };
            transcript(&state, request).await
        }
        Commands::Rulesets { format, json } => {
            let format = if json { RulesetFormat::Json } else { format };
            list_rulesets(&state, format).await
        }
        Commands::History { id, json } => show_history(&state, id, json).await,
        Commands::Serve { addr } => {
            let addr = match addr {
                Some(addr) => addr,
                None => state
                    .config
                    .server
                    .addr
                    .parse()
                    .with_context(|| format!("invalid server.addr `{}`", state.config.server.addr))?,
            };
            server::serve(state, addr).await
        }
    }
}

async fn analyze(
    state: &AppState,
    source: &str,
    provider: Option<ProviderKind>,
    doc_type: Option<DocumentType>,
    slack: bool,
    comment: bool,
    json: bool,
) -> Result<()> {
    let analyzer = state.analyzer(provider)?;
    let document = state
        .source
        .fetch(source)
        .await
        .with_context(|| format!("failed to fetch {source}"))?;
    info!(title = %document.title, words = document.word_count(), "document extracted");

    let result = analyzer.analyze_document(&document, doc_type).await?;
    let history_id = state.history.save(&result).await?;
    print_result(&result, json)?;
    if !json {
        println!("{}", format!("History id: {history_id}").dimmed());
    }

    if slack {
        let receipt = state.notifier.post_analysis(&result).await?;
        print_receipt(&receipt, json);
    }
    if comment {
        let receipt = state
            .source
            .add_comment(&document.source, &comment_body(&result))
            .await?;
        if !json {
            println!(
                "{}",
                format!("Comment added to {} ({})", receipt.document_id, receipt.comment_id).green()
            );
        }
    }
    Ok(())
}

async fn compare(
    state: &AppState,
    source: &str,
    doc_type: Option<DocumentType>,
    json: bool,
) -> Result<()> {
    let document = state
        .source
        .fetch(source)
        .await
        .with_context(|| format!("failed to fetch {source}"))?;

    let mut outcomes = Vec::new();
    for provider in ProviderKind::COMPARED {
        let outcome = match state.analyzer(Some(provider)) {
            Ok(analyzer) => match analyzer.analyze_document(&document, doc_type).await {
                Ok(result) => ProviderOutcome::succeeded(provider.as_str(), result),
                Err(err) => ProviderOutcome::failed(provider.as_str(), format!("{err:#}")),
            },
            Err(err) => ProviderOutcome::failed(provider.as_str(), format!("{err:#}")),
        };
        if let Some(error) = &outcome.error {
            warn!(%provider, %error, "provider failed during comparison");
        }
        outcomes.push(outcome);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        print!("{}", render_comparison(&document.title, &outcomes)?);
    }
    if outcomes.iter().all(|outcome| outcome.result.is_none()) {
        bail!("every provider failed");
    }
    Ok(())
}

struct TranscriptRequest {
    input: Option<String>,
    sales: bool,
    provider: Option<ProviderKind>,
    fathom: Option<String>,
    title: Option<String>,
    slack: bool,
    json: bool,
}

async fn transcript(state: &AppState, request: TranscriptRequest) -> Result<()> {
    let analyzer = state.analyzer(request.provider)?;
    let (text, default_title, link) = match (&request.fathom, request.input.as_deref()) {
        (Some(recording_id), _) => {
            let recording = state.fathom()?.get_transcript(recording_id).await?;
            let link = recording.link();
            (recording.full_text(), recording.title, Some(link))
        }
        (None, Some("-")) => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("failed to read transcript from stdin")?;
            (text, "stdin".to_string(), None)
        }
        (None, Some(path)) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read transcript at {path}"))?;
            let title = Path::new(path)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string());
            (text, title, None)
        }
        (None, None) => bail!("pass a transcript file, `-` for stdin, or --fathom <recording-id>"),
    };
    if text.trim().is_empty() {
        bail!("transcript is empty");
    }

    let title = request.title.unwrap_or(default_title);
    let mut result = analyzer
        .analyze_transcript(text.trim(), request.sales, &title)
        .await?;
    if let Some(link) = link {
        result.document_url = link;
    }
    let history_id = state.history.save(&result).await?;
    print_result(&result, request.json)?;
    if !request.json {
        println!("{}", format!("History id: {history_id}").dimmed());
    }
    if request.slack {
        let receipt = state.notifier.post_analysis(&result).await?;
        print_receipt(&receipt, request.json);
    }
    Ok(())
}

async fn list_rulesets(state: &AppState, format: RulesetFormat) -> Result<()> {
    let mut rulesets = state
        .rulesets
        .load_all()
        .await
        .context("failed to load rulesets")?;
    rulesets.sort_by_key(|ruleset| ruleset.document_type);
    match format {
        RulesetFormat::Json => println!("{}", serde_json::to_string_pretty(&rulesets)?),
        RulesetFormat::Yaml => print!("{}", serde_yaml::to_string(&rulesets)?),
        RulesetFormat::Human => {
            println!("{} ruleset(s) loaded", rulesets.len());
            print!("{}", render_rulesets(&rulesets)?);
        }
    }
    Ok(())
}

async fn show_history(state: &AppState, id: Uuid, json: bool) -> Result<()> {
    match state.history.get(id).await? {
        Some(result) => print_result(&result, json),
        None => bail!("no stored analysis with id {id}"),
    }
}

fn print_result(result: &AnalysisResult, json: bool) -> Result<()> {
    if json {
        println!("{}", render_report(result, OutputFormat::Json)?);
        return Ok(());
    }
    print!("{}", render_report(result, OutputFormat::Human)?);
    if let Some(overall) = result.overall_score() {
        let label = format!("Overall: {overall}/100");
        let label = match overall {
            80.. => label.green(),
            60..=79 => label.yellow(),
            _ => label.red(),
        };
        println!("\n{}", label.bold());
    }
    if let Some(bannt) = &result.bannt_score {
        let label = format!("Qualified on {} of 5 BANNT elements", bannt.score());
        let label = match bannt.score() {
            4.. => label.green(),
            2..=3 => label.yellow(),
            _ => label.red(),
        };
        println!("\n{}", label.bold());
    }
    Ok(())
}

fn print_receipt(receipt: &PostReceipt, json: bool) {
    if json {
        return;
    }
    if receipt.dry_run {
        println!(
            "{}",
            format!(
                "Slack dry run (no bot token): message for #{} not sent",
                receipt.channel
            )
            .yellow()
        );
        return;
    }
    let location = receipt
        .url
        .clone()
        .or_else(|| receipt.ts.clone())
        .unwrap_or_default();
    println!(
        "{}",
        format!("Posted to Slack #{} {location}", receipt.channel).green()
    );
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tokio=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
