use std::path::PathBuf;
use std::time::Duration;

use ats_rag::{FailurePolicy, RatingConfig, ScoreWeights};
use clap::{Args, Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "ats-rate",
    version,
    about = "Rate a résumé against job requirements with retrieval-grounded LLM judgments"
)]
pub struct Cli {
    /// Résumé file: PDF, or plain UTF-8 text.
    #[arg(long)]
    pub resume: PathBuf,

    /// Requirements, one per line; bullets and numbering are stripped.
    #[arg(long)]
    pub requirements: PathBuf,

    #[command(flatten)]
    pub provider: ProviderArgs,

    #[command(flatten)]
    pub tuning: TuningArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct ProviderArgs {
    #[arg(long, value_enum, env = "ATS_PROVIDER", default_value_t = Provider::Ollama)]
    pub provider: Provider,

    /// Server address. Defaults to OLLAMA_HOST or the provider's public endpoint.
    #[arg(long, env = "ATS_BASE_URL")]
    pub base_url: Option<String>,

    /// Chat model used for judgments.
    #[arg(long, env = "ATS_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "ATS_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Output size of the embedding model; required with --embedding-model.
    #[arg(long, env = "ATS_EMBEDDING_DIMENSIONS", requires = "embedding_model")]
    pub embedding_dimensions: Option<usize>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct TuningArgs {
    #[arg(long, env = "ATS_CHUNK_SIZE")]
    pub chunk_size: Option<usize>,

    #[arg(long, env = "ATS_CHUNK_OVERLAP")]
    pub chunk_overlap: Option<usize>,

    #[arg(long, env = "ATS_TOP_K")]
    pub top_k: Option<usize>,

    #[arg(long, env = "ATS_TEMPERATURE")]
    pub temperature: Option<f32>,

    #[arg(long, env = "ATS_MAX_TOKENS")]
    pub max_tokens: Option<u32>,

    #[arg(long, env = "ATS_MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,

    #[arg(long, env = "ATS_EMBEDDING_TIMEOUT_SECS")]
    pub embedding_timeout_secs: Option<u64>,

    #[arg(long, env = "ATS_COMPLETION_TIMEOUT_SECS")]
    pub completion_timeout_secs: Option<u64>,

    #[arg(long, env = "ATS_WEIGHT_STRONG")]
    pub weight_strong: Option<f64>,

    #[arg(long, env = "ATS_WEIGHT_PARTIAL")]
    pub weight_partial: Option<f64>,

    #[arg(long, env = "ATS_WEIGHT_NONE")]
    pub weight_none: Option<f64>,

    #[arg(long, value_enum, env = "ATS_FAILURE_POLICY")]
    pub failure_policy: Option<FailurePolicyArg>,

    /// Language the rationales are written in.
    #[arg(long, env = "ATS_RESPONSE_LANGUAGE")]
    pub response_language: Option<String>,
}

impl TuningArgs {
    /// Overlay the given flags on the default configuration.
    pub fn to_config(&self) -> ats_rag::Result<RatingConfig> {
        let defaults = RatingConfig::default();
        let weights = ScoreWeights {
            strong: self.weight_strong.unwrap_or(defaults.weights.strong),
            partial: self.weight_partial.unwrap_or(defaults.weights.partial),
            none: self.weight_none.unwrap_or(defaults.weights.none),
        };

        let mut builder = RatingConfig::builder().weights(weights);
        if let Some(size) = self.chunk_size {
            builder = builder.chunk_size(size);
        }
        if let Some(overlap) = self.chunk_overlap {
            builder = builder.chunk_overlap(overlap);
        }
        if let Some(k) = self.top_k {
            builder = builder.top_k(k);
        }
        if let Some(temperature) = self.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        if let Some(n) = self.max_concurrency {
            builder = builder.max_concurrency(n);
        }
        if let Some(secs) = self.embedding_timeout_secs {
            builder = builder.embedding_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.completion_timeout_secs {
            builder = builder.completion_timeout(Duration::from_secs(secs));
        }
        if let Some(policy) = self.failure_policy {
            builder = builder.failure_policy(policy.into());
        }
        if let Some(language) = &self.response_language {
            builder = builder.response_language(language.clone());
        }
        builder.build()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Provider {
    Ollama,
    Openai,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum FailurePolicyArg {
    FailReport,
    MarkUnknown,
}

impl From<FailurePolicyArg> for FailurePolicy {
    fn from(arg: FailurePolicyArg) -> Self {
        match arg {
            FailurePolicyArg::FailReport => Self::FailReport,
            FailurePolicyArg::MarkUnknown => Self::MarkUnknown,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["ats-rate", "--resume", "cv.txt", "--requirements", "reqs.txt"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_overlay_defaults() {
        let cli = parse(&["--top-k", "6", "--weight-partial", "0.25", "--failure-policy", "mark-unknown"]);
        let config = cli.tuning.to_config().unwrap();

        assert_eq!(config.top_k, 6);
        assert_eq!(config.weights.partial, 0.25);
        assert_eq!(config.failure_policy, FailurePolicy::MarkUnknown);
        assert_eq!(config.chunk_size, RatingConfig::default().chunk_size);
    }

    #[test]
    fn invalid_tuning_is_a_config_error() {
        let cli = parse(&["--chunk-size", "50", "--chunk-overlap", "50"]);
        assert!(matches!(cli.tuning.to_config(), Err(ats_rag::RatingError::Config(_))));
    }

    #[test]
    fn embedding_dimensions_require_a_model() {
        let argv = [
            "ats-rate",
            "--resume",
            "cv.txt",
            "--requirements",
            "reqs.txt",
            "--embedding-dimensions",
            "384",
        ];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn format_defaults_to_text() {
        assert_eq!(parse(&[]).format, OutputFormat::Text);
        assert_eq!(parse(&["--format", "json"]).format, OutputFormat::Json);
    }
}
