pub mod ask;
pub mod batch;
pub mod config;
pub mod segment;

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use tracing::info;

use crate::audit::{AuditSink, JsonFileSink, NullSink};
use crate::config::RlmConfig;
use crate::llm::LlmClient;
use crate::rlm::RlmEngine;
use crate::source::{DocType, ReferenceSource};

/// Where to read the reference text from. Exactly one of the three.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Text file to read (`-` for stdin)
    #[arg(long, value_name = "PATH")]
    pub file: Option<String>,

    /// Web page to fetch; HTML is converted to text
    #[arg(long)]
    pub url: Option<String>,

    /// GitHub repository to flatten
    #[arg(long)]
    pub github: Option<String>,

    /// Which repository files to include (with --github)
    #[arg(long, value_enum, default_value_t = DocType::Standard)]
    pub doc_type: DocType,
}

impl SourceArgs {
    pub fn resolve(&self) -> Result<ReferenceSource> {
        match (&self.file, &self.url, &self.github) {
            (Some(path), None, None) => Ok(ReferenceSource::from_path_arg(path)),
            (None, Some(url), None) => Ok(ReferenceSource::Url(url.clone())),
            (None, None, Some(url)) => Ok(ReferenceSource::Github {
                url: url.clone(),
                doc_type: self.doc_type,
            }),
            (None, None, None) => bail!("Provide a reference text with --file, --url or --github"),
            _ => bail!("Use only one of --file, --url and --github"),
        }
    }
}

/// Wire the LLM client into all three oracle roles.
pub fn build_engine(config: RlmConfig) -> Result<RlmEngine> {
    let llm = Arc::new(LlmClient::from_env()?);
    let (boss, reader, judge) = llm.models();
    info!(boss, reader, judge, "LLM client initialized");

    let audit: Arc<dyn AuditSink> = if config.log_to_file {
        info!(dir = %config.log_dir.display(), "Writing session logs");
        Arc::new(JsonFileSink::new(config.log_dir.clone()))
    } else {
        Arc::new(NullSink)
    };

    Ok(RlmEngine::new(llm.clone(), llm.clone(), llm, audit, config))
}
