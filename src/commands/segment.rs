use anyhow::Result;
use clap::Args;

use super::SourceArgs;
use crate::config::RlmConfig;
use crate::rlm::segment::{segment, Segment, SegmentBounds};

/// Show how a reference text would be segmented
#[derive(Debug, Args)]
pub struct SegmentArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Target segment size in characters
    #[arg(long)]
    pub target: Option<usize>,

    /// Maximum segment size in characters
    #[arg(long)]
    pub max: Option<usize>,

    /// Minimum segment size in characters
    #[arg(long)]
    pub min: Option<usize>,
}

impl SegmentArgs {
    fn bounds(&self, config: &RlmConfig) -> Result<SegmentBounds> {
        let mut config = config.clone();
        if let Some(t) = self.target {
            config.segment_target_size = t;
        }
        if let Some(m) = self.max {
            config.segment_max_size = m;
        }
        if let Some(m) = self.min {
            config.segment_min_size = m;
        }
        config.validate()?;
        Ok(config.segment_bounds())
    }
}

/// First line of a segment, shortened for display.
fn preview(seg: &Segment) -> String {
    let first = seg.text.lines().next().unwrap_or("");
    let mut out: String = first.chars().take(60).collect();
    if first.chars().count() > 60 {
        out.push('…');
    }
    out
}

pub async fn run(args: SegmentArgs, config: RlmConfig) -> Result<()> {
    let bounds = args.bounds(&config)?;
    let text = args.source.resolve()?.load().await?;
    let segments = segment(&text, &bounds);

    println!(
        "{} segments (target {}, max {}, min {}) from {} chars",
        segments.len(),
        bounds.target,
        bounds.max,
        bounds.min,
        text.chars().count()
    );
    for seg in &segments {
        println!("  [{:>3}] {:>6} chars  {}", seg.index, seg.len, preview(seg));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::DocType;

    fn args(target: Option<usize>, max: Option<usize>, min: Option<usize>) -> SegmentArgs {
        SegmentArgs {
            source: SourceArgs {
                file: Some("-".into()),
                url: None,
                github: None,
                doc_type: DocType::Standard,
            },
            target,
            max,
            min,
        }
    }

    #[test]
    fn test_bounds_override_config() {
        let b = args(Some(100), Some(200), Some(10)).bounds(&RlmConfig::default()).unwrap();
        assert_eq!(b, SegmentBounds { target: 100, max: 200, min: 10 });
        assert!(args(Some(100), None, None).bounds(&RlmConfig::default()).is_err());
    }

    #[test]
    fn test_preview_truncates() {
        let seg = Segment {
            index: 0,
            text: format!("{}\nrest", "a".repeat(80)),
            len: 85,
        };
        assert_eq!(preview(&seg).chars().count(), 61);
    }
}
