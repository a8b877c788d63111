mod cli;
mod output;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use ats_rag::ollama::{self, OllamaCompletionProvider, OllamaEmbeddingProvider};
use ats_rag::openai::{OPENAI_BASE_URL, OpenAIChatProvider, OpenAIEmbeddingProvider};
use ats_rag::pdf::is_pdf;
use ats_rag::{
    CompletionProvider, EmbeddingProvider, RatingError, RatingPipeline, Requirement,
    ResumeDocument, SourceMetadata,
};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, OutputFormat, Provider, ProviderArgs};

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "rating failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.tuning.to_config().context("invalid rating configuration")?;
    let (embedder, model) = providers(&cli.provider)?;

    let document = read_resume(&cli.resume)?;
    let requirements = read_requirements(&cli.requirements)?;
    info!(
        resume = %cli.resume.display(),
        requirement_count = requirements.len(),
        provider = ?cli.provider.provider,
        "rating résumé"
    );

    let pipeline = RatingPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .completion_provider(model)
        .build()?;

    let report = tokio::select! {
        report = pipeline.rate_document(&document, &requirements) => report?,
        Ok(()) = tokio::signal::ctrl_c() => return Err(RatingError::Cancelled.into()),
    };

    let rendered = match cli.format {
        OutputFormat::Json => serde_json::to_string_pretty(&report)?,
        OutputFormat::Text => output::render_text(&report),
    };
    println!("{rendered}");
    Ok(())
}

type Providers = (Arc<dyn EmbeddingProvider>, Arc<dyn CompletionProvider>);

fn providers(args: &ProviderArgs) -> Result<Providers> {
    match args.provider {
        Provider::Ollama => {
            let host = args.base_url.clone().unwrap_or_else(|| {
                std::env::var("OLLAMA_HOST").unwrap_or_else(|_| ollama::DEFAULT_HOST.to_string())
            });
            let mut embedder = OllamaEmbeddingProvider::new(host.clone());
            if let Some(model) = &args.embedding_model {
                let dimensions = args
                    .embedding_dimensions
                    .context("--embedding-dimensions is required with --embedding-model")?;
                embedder = embedder.with_model(model.clone(), dimensions);
            }
            let mut chat = OllamaCompletionProvider::new(host);
            if let Some(model) = &args.model {
                chat = chat.with_model(model.clone());
            }
            let embedder: Arc<dyn EmbeddingProvider> = Arc::new(embedder);
            let chat: Arc<dyn CompletionProvider> = Arc::new(chat);
            Ok((embedder, chat))
        }
        Provider::Openai => {
            let base_url = args.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string());
            if base_url == OPENAI_BASE_URL && args.api_key.is_none() {
                anyhow::bail!("OPENAI_API_KEY or --api-key is required for {OPENAI_BASE_URL}");
            }
            let mut embedder = OpenAIEmbeddingProvider::compatible(&base_url, args.api_key.clone());
            if let Some(model) = &args.embedding_model {
                let dimensions = args
                    .embedding_dimensions
                    .context("--embedding-dimensions is required with --embedding-model")?;
                embedder = embedder.with_model(model.clone(), dimensions);
            }
            let mut chat = OpenAIChatProvider::compatible(base_url, args.api_key.clone());
            if let Some(model) = &args.model {
                chat = chat.with_model(model.clone());
            }
            let embedder: Arc<dyn EmbeddingProvider> = Arc::new(embedder);
            let chat: Arc<dyn CompletionProvider> = Arc::new(chat);
            Ok((embedder, chat))
        }
    }
}

/// Load a résumé as PDF when the extension or header says so, else as UTF-8 text.
fn read_resume(path: &Path) -> Result<ResumeDocument> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read résumé {}", path.display()))?;
    let filename = path.file_name().map(|name| name.to_string_lossy().into_owned());
    let has_pdf_extension =
        path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    if has_pdf_extension || is_pdf(&bytes) {
        return Ok(ResumeDocument::from_pdf(&bytes, filename)?);
    }

    let text = String::from_utf8(bytes)
        .with_context(|| format!("résumé {} is neither PDF nor UTF-8 text", path.display()))?;
    Ok(ResumeDocument::with_source(text, SourceMetadata { filename, uploaded_at: Utc::now() }))
}

fn read_requirements(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read requirements {}", path.display()))?;
    Ok(Requirement::parse_bullets(&text))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
