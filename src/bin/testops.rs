//! Terminal front end for the TestOps pipeline.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use testops::{
    view::{paint, should_colorize, RunView},
    Client, Config, Generated, PipelineBackend, PollPolicy, RunId, RunRef, RunRegistry,
    RunRequest, Synchronizer, DEFAULT_BASE_URL,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "testops", version, about = "Run and follow TestOps generation pipelines")]
struct Cli {
    /// API root, including the `/api` prefix
    #[arg(long, env = "TESTOPS_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    base_url: String,

    /// Delay between two fetches of an unsettled run
    #[arg(long, env = "TESTOPS_POLL_INTERVAL_MS", default_value_t = 1500, global = true)]
    poll_interval_ms: u64,

    /// Per-request timeout
    #[arg(long, env = "TESTOPS_TIMEOUT_SECS", default_value_t = 60, global = true)]
    timeout_secs: u64,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List available models
    Models,
    /// List known runs, most recent first
    Runs,
    /// Submit a pipeline run
    Run(RunArgs),
    /// Show the step cards of a run
    Show {
        run_id: String,
        /// Keep refreshing until every step settles
        #[arg(long, short)]
        watch: bool,
    },
    /// List a run's files, or print one of them
    Files {
        run_id: String,
        /// File to print
        #[arg(long)]
        name: Option<String>,
    },
    /// One-shot test generation
    Generate {
        #[arg(value_enum)]
        kind: GenerateKind,
        #[command(flatten)]
        input: TextInput,
    },
    /// Check test code against the standards
    Validate {
        #[command(flatten)]
        input: TextInput,
    },
    /// Print the artifact download link of a run
    DownloadUrl { run_id: String },
    /// Check that the backend is up
    Health,
}

#[derive(Args)]
struct RunArgs {
    /// Requirements text
    #[arg(long, conflicts_with = "requirements_file")]
    requirements: Option<String>,
    /// Read requirements from a file
    #[arg(long)]
    requirements_file: Option<PathBuf>,
    /// OpenAPI document text
    #[arg(long, conflicts_with = "openapi_file")]
    openapi: Option<String>,
    /// Read the OpenAPI document from a file
    #[arg(long)]
    openapi_file: Option<PathBuf>,
    /// Model to route the run to (defaults to the first listed)
    #[arg(long, env = "TESTOPS_MODEL")]
    model: Option<String>,
    /// Keep refreshing until every step settles
    #[arg(long, short)]
    watch: bool,
}

#[derive(Args)]
struct TextInput {
    /// Input text
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,
    /// Read the input from a file
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum GenerateKind {
    ManualUi,
    ManualApi,
    AutotestsUi,
    AutotestsApi,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let client = Client::new(Config {
        base_url: Some(cli.base_url.clone()),
        timeout: Some(Duration::from_secs(cli.timeout_secs)),
        ..Default::default()
    })
    .context("failed to configure client")?;
    let policy = PollPolicy::with_interval(Duration::from_millis(cli.poll_interval_ms.max(1)));
    let color = should_colorize();

    match cli.command {
        Command::Models => {
            for model in client.models().list().await? {
                println!("{model}");
            }
        }
        Command::Runs => {
            let registry = RunRegistry::new();
            registry.refresh(&client).await;
            for entry in registry.entries() {
                match entry {
                    RunRef::Bare(id) => println!("{id}"),
                    RunRef::Detailed { id, files } => println!("{id}  ({} files)", files.len()),
                }
            }
        }
        Command::Run(args) => run(client, policy, args, color).await?,
        Command::Show { run_id, watch } => {
            let sync = Synchronizer::new(Arc::new(client), policy);
            let state = sync.observe(RunId::new(run_id)).await;
            if state.run.is_none() {
                bail!("run has no snapshot yet");
            }
            render(&sync, color, watch).await;
        }
        Command::Files { run_id, name } => {
            let artifacts = client.runs().files(&RunId::new(run_id)).await?;
            if let Some(err) = artifacts.background_error() {
                eprintln!("{}", paint(&format!("pipeline error: {}", err.trim()), 204, color));
            }
            match name {
                Some(name) => match artifacts.files.get(&name) {
                    Some(text) => println!("{text}"),
                    None => bail!("no file named {name}"),
                },
                None => {
                    for (path, text) in &artifacts.files {
                        println!("{path}  ({} bytes)", text.len());
                    }
                }
            }
        }
        Command::Generate { kind, input } => {
            let text = input.read()?;
            let generate = client.generate();
            let out = match kind {
                GenerateKind::ManualUi => generate.manual_ui(&text).await?,
                GenerateKind::ManualApi => generate.manual_api(&text).await?,
                GenerateKind::AutotestsUi => generate.autotests_ui(&text).await?,
                GenerateKind::AutotestsApi => generate.autotests_api(&text).await?,
            };
            print_generated(&out);
        }
        Command::Validate { input } => {
            let out = client.generate().validate(&input.read()?).await?;
            print_generated(&out);
        }
        Command::DownloadUrl { run_id } => {
            println!("{}", client.runs().download_url(&RunId::new(run_id))?);
        }
        Command::Health => {
            if !client.health().await? {
                bail!("backend is not healthy");
            }
            println!("ok");
        }
    }
    Ok(())
}

async fn run(client: Client, policy: PollPolicy, args: RunArgs, color: bool) -> Result<()> {
    let requirements = read_either(args.requirements, args.requirements_file)?;
    let openapi = read_either(args.openapi, args.openapi_file)?;
    if requirements.trim().is_empty() && openapi.trim().is_empty() {
        bail!("provide requirements, an OpenAPI document, or both");
    }

    let model = match args.model.filter(|m| !m.trim().is_empty()) {
        Some(model) => Some(model),
        None => client
            .list_models()
            .await
            .ok()
            .and_then(|models| models.into_iter().next())
            .map(String::from),
    };
    let mut request = RunRequest::new(requirements, openapi);
    if let Some(model) = model {
        request = request.with_model(model);
    }

    let sync = Synchronizer::new(Arc::new(client), policy);
    let id = sync.submit(&request).await.map_err(|err| anyhow::anyhow!(err.message))?;
    eprintln!("submitted {id}");
    render(&sync, color, args.watch).await;
    Ok(())
}

/// Print the observed run, then again on every new snapshot while watching.
async fn render(sync: &Synchronizer<Client>, color: bool, watch: bool) {
    let mut rx = sync.subscribe();
    let mut last = None;
    loop {
        let state = rx.borrow_and_update().clone();
        if state.run != last {
            let url = state
                .observed
                .as_ref()
                .and_then(|id| sync.backend().download_url(id));
            print!("{}", RunView::derive(state.run.as_ref(), url).render(color));
            last = state.run.clone();
        }
        if !watch || state.is_settled() {
            break;
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}

fn print_generated(out: &Generated) {
    println!("{}", out.text);
    if let Some(id) = &out.run_id {
        eprintln!("run {id}");
    }
}

impl TextInput {
    fn read(self) -> Result<String> {
        let text = read_either(self.text, self.file)?;
        if text.trim().is_empty() {
            bail!("input is empty; pass --text or --file");
        }
        Ok(text)
    }
}

fn read_either(text: Option<String>, file: Option<PathBuf>) -> Result<String> {
    match (text, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display())),
        (None, None) => Ok(String::new()),
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "testops=debug",
        _ => "trace",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
