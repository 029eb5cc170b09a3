/// CLI glue: argument parsing, wiring of the HTTP collaborators and output.
///
/// All document processing lives in the library modules; this module only
/// builds the concrete clients from an [`AppConfig`] and prints results.
use crate::cache::FileCache;
use crate::contract::{ContentFetcher, KeyValueStore};
use crate::load_config::{load_config, AppConfig};
use crate::pipeline::{build_full_context, load_document};
use crate::providers::{HttpFetcher, OpenAiClient, OpenAiConfig, WhisperTranscriber, GROQ_BASE_URL};
use crate::questions::{answer_questions, parse_questions};
use crate::resolve::AttachmentResolver;
use crate::verify::{HttpVerifier, TaskAnswer, Verifier};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI for aidevs-context: turn an article into LLM-ready context and answer questions about it.
#[derive(Parser)]
#[clap(
    name = "aidevs-context",
    version,
    about = "Build LLM context from markdown documents with described images and transcribed audio"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the configured document and print its full context
    Context {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Build the context, answer the configured questions and submit the answers
    Arxiv {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Print the answers without submitting them
        #[clap(long)]
        dry_run: bool,
    },
}

struct Clients {
    fetcher: HttpFetcher,
    openai: OpenAiClient,
    transcriber: WhisperTranscriber,
    cache: Option<FileCache>,
}

impl Clients {
    fn from_config(config: &AppConfig) -> Result<Self> {
        let openai = OpenAiClient::new(OpenAiConfig {
            base_url: config.secrets.openai_base_url.clone(),
            api_key: config.secrets.openai_api_key.clone(),
            completion_model: config.models.completion.clone(),
            vision_model: config.models.vision.clone(),
            timeout_secs: None,
        })
        .context("Failed to construct chat completions client")?;
        let transcriber = WhisperTranscriber::new(
            GROQ_BASE_URL,
            config.secrets.groq_api_key.clone(),
            config.models.transcription.clone(),
        )
        .context("Failed to construct transcription client")?;
        let cache = config
            .cache
            .as_ref()
            .map(|cache| FileCache::new(&cache.dir, cache.key))
            .transpose()
            .context("Failed to open cache directory")?;
        Ok(Self {
            fetcher: HttpFetcher::new(),
            openai,
            transcriber,
            cache,
        })
    }

    fn resolver(&self, config: &AppConfig) -> AttachmentResolver<'_> {
        let resolver = AttachmentResolver::new(
            &self.fetcher,
            &self.transcriber,
            &self.openai,
            config.pipeline.base_url.clone(),
        );
        match &self.cache {
            Some(cache) => resolver.with_cache(cache as &dyn KeyValueStore),
            None => resolver,
        }
    }
}

async fn context_for(config: &AppConfig, clients: &Clients) -> Result<String> {
    let document = load_document(&clients.fetcher, &config.document_url).await?;
    let resolver = clients.resolver(config);
    Ok(build_full_context(&document, &config.pipeline, &resolver).await?)
}

async fn fetch_text(fetcher: &dyn ContentFetcher, url: &str) -> Result<String> {
    let bytes = fetcher.fetch(url).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

async fn run_arxiv(config: &AppConfig, dry_run: bool) -> Result<()> {
    let questions_url = config
        .questions_url
        .as_deref()
        .context("questions_url must be set in the config for the arxiv command")?;

    let clients = Clients::from_config(config)?;
    let full_context = context_for(config, &clients).await?;
    let questions = parse_questions(&fetch_text(&clients.fetcher, questions_url).await?)?;
    tracing::info!(command = "arxiv", questions = questions.len(), "Fetched questions");

    let answers = answer_questions(&full_context, &questions, &clients.openai).await?;
    println!("{}", serde_json::to_string_pretty(&answers)?);

    match (&config.task, &config.secrets.task_key) {
        (Some(task), Some(apikey)) if !dry_run => {
            let verifier = HttpVerifier::new(task.verify_url.clone());
            let response = verifier
                .send_answer(&TaskAnswer {
                    task: task.name.clone(),
                    apikey: apikey.clone(),
                    answer: serde_json::to_value(&answers)?,
                })
                .await?;
            tracing::info!(command = "arxiv", code = response.code, "Answer submitted");
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        _ => tracing::info!(command = "arxiv", dry_run, "Skipping answer submission"),
    }
    Ok(())
}

/// Async CLI entrypoint used by `main` and by integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Context { config } => {
            let config = load_config(config)?;
            tracing::info!(command = "context", document_url = %config.document_url, "Building context");
            let clients = Clients::from_config(&config)?;
            let full_context = context_for(&config, &clients).await?;
            println!("{full_context}");
            Ok(())
        }
        Commands::Arxiv { config, dry_run } => {
            let config = load_config(config)?;
            tracing::info!(command = "arxiv", dry_run, "Solving arxiv task");
            run_arxiv(&config, dry_run).await
        }
    }
}
