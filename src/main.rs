use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use themalyzer::analysis::{AnalysisService, OllamaService};
use themalyzer::config::SegmentationConfig;
use themalyzer::pipeline::{PipelineOutcome, SegmentationRuntime};
use themalyzer::report::{format_duration, write_report, SegmentationReport};
use themalyzer::transcription::load_transcript;

/// Themalyzer - thematic segmentation of interview transcripts
///
/// Splits a timed transcript into chunks, asks a local language model for themes and cut
/// points, and writes one contiguous list of titled segments.
#[derive(Parser, Debug)]
#[command(name = "themalyzer")]
#[command(version = "0.1.0")]
#[command(about = "Thematic segmentation of timed transcripts", long_about = None)]
struct Args {
    /// Transcript JSON produced by the transcriber
    #[arg(value_name = "TRANSCRIPT_JSON")]
    transcript: PathBuf,

    /// Where the segment report is written
    #[arg(value_name = "OUTPUT_JSON")]
    output: PathBuf,

    /// Path to a JSON configuration document
    #[arg(long, value_name = "PATH", conflicts_with = "config_json")]
    config_file: Option<PathBuf>,

    /// Inline JSON configuration document
    #[arg(long, value_name = "JSON", conflicts_with = "config_file")]
    config_json: Option<String>,

    /// Analysis model identifier
    #[arg(long)]
    model: Option<String>,

    /// Base URL of the analysis service
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Token budget per chunk
    #[arg(long)]
    token_budget: Option<usize>,

    /// Cut points closer than this many seconds are merged
    #[arg(long)]
    epsilon: Option<f64>,

    /// Minimum segment duration in seconds
    #[arg(long)]
    min_duration: Option<f64>,

    /// Maximum number of segments
    #[arg(long)]
    max_segments: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Retries per chunk after the first attempt
    #[arg(long)]
    retries: Option<u32>,

    /// Concurrent chunk requests
    #[arg(long)]
    concurrency: Option<usize>,

    /// Embed the transcript in the report for preview alignment
    #[arg(long)]
    include_transcript: bool,

    /// Do not check for the model or pull it when missing
    #[arg(long)]
    skip_model_check: bool,
}

impl Args {
    fn validate(&self) -> Result<()> {
        if !self.transcript.exists() {
            bail!("Transcript file does not exist: {:?}", self.transcript);
        }
        if !self.transcript.is_file() {
            bail!("Transcript path is not a file: {:?}", self.transcript);
        }
        if self.output.is_dir() {
            bail!("Output path must be a file: {:?}", self.output);
        }
        Ok(())
    }

    fn config(&self) -> Result<SegmentationConfig> {
        let mut config =
            SegmentationConfig::load(self.config_file.as_deref(), self.config_json.as_deref())?;
        if let Some(model) = &self.model {
            config.analysis.model = model.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.analysis.endpoint = endpoint.clone();
        }
        if let Some(budget) = self.token_budget {
            config.chunking.token_budget = budget;
        }
        if let Some(epsilon) = self.epsilon {
            config.merge.epsilon = epsilon;
        }
        if let Some(min_duration) = self.min_duration {
            config.normalize.min_segment_duration = min_duration;
        }
        if let Some(max_segments) = self.max_segments {
            config.normalize.max_segments = max_segments;
        }
        if let Some(timeout) = self.timeout {
            config.analysis.timeout_secs = timeout;
        }
        if let Some(retries) = self.retries {
            config.analysis.retries = retries;
        }
        if let Some(concurrency) = self.concurrency {
            config.analysis.max_in_flight = concurrency;
        }
        Ok(config)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    args.validate()
        .context("Failed to validate command-line arguments")?;

    let config = args.config().context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    println!("Themalyzer v0.1.0 - Thematic transcript segmentation");
    println!("Transcript: {:?}", args.transcript);
    println!("Output:     {:?}", args.output);
    println!(
        "Model: {} at {}",
        config.analysis.model, config.analysis.endpoint
    );

    println!("\n1. Loading transcript...");
    let transcript = load_transcript(&args.transcript)?;
    println!(
        "   {} segments, {} of speech",
        transcript.segments.len(),
        format_duration(transcript.duration)
    );

    let service = OllamaService::new(&config.analysis)
        .context("Failed to create analysis service client")?;
    if !args.skip_model_check && !service.ensure_model_loaded() {
        warn!(
            model = %service.model(),
            "model unavailable; chunks may fall back to duration-based cuts"
        );
    }

    println!("\n2. Segmenting...");
    let service: Arc<dyn AnalysisService> = Arc::new(service);
    let runtime = SegmentationRuntime::spawn(transcript.clone(), config, service)?;
    while let Some(event) = runtime.recv() {
        println!("   [{:>3}%] {}", event.percent, event.message);
        for warning in &event.warnings {
            eprintln!("   warning: {}", warning.message);
        }
    }
    let report = match runtime.wait()? {
        PipelineOutcome::Completed(report) => report,
        PipelineOutcome::Cancelled => bail!("Segmentation was cancelled"),
    };
    let report = if args.include_transcript {
        report.with_transcript(transcript)
    } else {
        report
    };

    println!("\n3. Writing report...");
    write_report(&args.output, &report)?;
    print_summary(&report);
    println!("\n✓ Wrote {} segment(s) to {:?}", report.segments.len(), args.output);
    Ok(())
}

fn print_summary(report: &SegmentationReport) {
    println!();
    for segment in &report.segments {
        let flag = if segment.needs_review { "  [review]" } else { "" };
        println!(
            "   {:>3}. {:>7}  {}{}",
            segment.ordinal,
            format_duration(segment.duration()),
            segment.title,
            flag
        );
    }
    if !report.flagged_ordinals.is_empty() {
        println!(
            "   {} segment(s) border a fallback cut and need review",
            report.flagged_ordinals.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["themalyzer", "in.json", "out.json"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn flags_override_config() {
        let args = args(&[
            "--config-json",
            r#"{"merge": {"epsilon": 2.0}, "normalize": {"max_segments": 5}}"#,
            "--max-segments",
            "8",
            "--retries",
            "0",
            "--concurrency",
            "3",
        ]);
        let config = args.config().unwrap();
        assert_eq!(config.merge.epsilon, 2.0);
        assert_eq!(config.normalize.max_segments, 8);
        assert_eq!(config.analysis.retries, 0);
        assert_eq!(config.analysis.max_in_flight, 3);
    }

    #[test]
    fn config_sources_conflict() {
        let result = Args::try_parse_from([
            "themalyzer",
            "in.json",
            "out.json",
            "--config-file",
            "a.json",
            "--config-json",
            "{}",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn missing_transcript_fails_validation() {
        let args = args(&[]);
        assert!(args.validate().is_err());
    }
}
