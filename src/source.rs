use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ValueEnum;
use tokio::io::AsyncReadExt;
use tracing::info;

/// Which files of a repository end up in the reference text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DocType {
    /// Source files only.
    Code,
    Minimal,
    #[default]
    Standard,
}

impl DocType {
    fn preset(self) -> githem_core::FilterPreset {
        match self {
            DocType::Code => githem_core::FilterPreset::CodeOnly,
            DocType::Minimal => githem_core::FilterPreset::Minimal,
            DocType::Standard => githem_core::FilterPreset::Standard,
        }
    }
}

/// Where the reference text comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceSource {
    File(PathBuf),
    Stdin,
    Url(String),
    Github { url: String, doc_type: DocType },
}

impl ReferenceSource {
    /// `-` means stdin, anything else is a path.
    pub fn from_path_arg(arg: &str) -> Self {
        if arg == "-" {
            ReferenceSource::Stdin
        } else {
            ReferenceSource::File(PathBuf::from(arg))
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ReferenceSource::File(p) => format!("file:{}", p.display()),
            ReferenceSource::Stdin => "stdin".to_string(),
            ReferenceSource::Url(u) => format!("url:{u}"),
            ReferenceSource::Github { url, .. } => format!("github:{}", repo_name(url)),
        }
    }

    pub async fn load(&self) -> Result<String> {
        let text = match self {
            ReferenceSource::File(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
            ReferenceSource::Stdin => {
                let mut buf = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut buf)
                    .await
                    .context("Failed to read stdin")?;
                buf
            }
            ReferenceSource::Url(url) => fetch_url(url).await?,
            ReferenceSource::Github { url, doc_type } => flatten_github_repo(url, *doc_type).await?,
        };
        info!(source = %self.describe(), size = text.len(), "Reference text loaded");
        Ok(text)
    }
}

/// `owner/repo` from a repository URL.
fn repo_name(url: &str) -> String {
    url.trim_end_matches('/')
        .trim_end_matches(".git")
        .rsplit('/')
        .take(2)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join("/")
}

/// Flatten a GitHub repository into `=== path ===` delimited text.
async fn flatten_github_repo(url: &str, doc_type: DocType) -> Result<String> {
    let _parsed = githem_core::parse_github_url(url).context("Invalid GitHub URL")?;
    let opts = githem_core::IngestOptions::with_preset(doc_type.preset());

    // Clone and ingest are blocking I/O.
    let url_owned = url.to_string();
    let output = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let ingester = githem_core::Ingester::from_url_cached(&url_owned, opts)?;
        let mut output = Vec::new();
        ingester.ingest(&mut output)?;
        Ok(output)
    })
    .await
    .context("spawn_blocking join failed")??;

    let text = String::from_utf8_lossy(&output).into_owned();
    info!(repo = %repo_name(url), file_count = text.matches("=== ").count(), "GitHub repo flattened");
    Ok(text)
}

async fn fetch_url(url: &str) -> Result<String> {
    let resp = reqwest::get(url).await.context("Failed to fetch URL")?;

    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = resp.bytes().await.context("Failed to read response body")?;

    Ok(if content_type.contains("html") {
        html2text::from_read(&body[..], 120)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned())
    } else {
        String::from_utf8_lossy(&body).into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_path_arg() {
        assert_eq!(ReferenceSource::from_path_arg("-"), ReferenceSource::Stdin);
        assert_eq!(
            ReferenceSource::from_path_arg("notes.txt"),
            ReferenceSource::File(PathBuf::from("notes.txt"))
        );
    }

    #[test]
    fn test_repo_name() {
        assert_eq!(repo_name("https://github.com/tokio-rs/tokio/"), "tokio-rs/tokio");
        assert_eq!(repo_name("https://github.com/serde-rs/json.git"), "serde-rs/json");
    }

    #[tokio::test]
    async fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "=== Intro\n\nHello").unwrap();
        let text = ReferenceSource::File(file.path().to_path_buf()).load().await.unwrap();
        assert_eq!(text, "=== Intro\n\nHello");
    }

    #[tokio::test]
    async fn test_missing_file_has_context() {
        let err = ReferenceSource::File(PathBuf::from("/definitely/not/here.txt"))
            .load()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
