//! signal-pipeline: batch driver for the news signal stages.
//!
//! Usage:
//!   signal-pipeline link [--limit 800] [--link-days-back 7]
//!   signal-pipeline rollup [--days-back 7] [--window-days 7] [--overwrite]
//!                          [--industry-to-company weight|equal|off] [--include-industry]
//!   signal-pipeline score-rollup [--lookback-hours 168] [--apply-overall]
//!   signal-pipeline recommend [--as-of 2025-06-02] [--benchmark SPY] [--save-top 200]
//!                            [--rs-windows 21,63,126] [--rs-weights 0.2,0.3,0.5]
//!                            [--news-alpha 0.2] [--news-k 1.0]
//!   signal-pipeline run      # link, rollup, score-rollup, recommend

mod config;
mod stages;
#[cfg(test)]
mod stages_tests;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use embedding_client::EmbeddingClient;
use signal_core::VectorIndex;
use signal_store::SignalDb;
use std::sync::Arc;
use tracing::info;
use vector_index::{PgVectorIndex, TableName};

use config::{arg_value, PipelineConfig};
use stages::{PipelineContext, StageReport};

const USAGE: &str = "usage: signal-pipeline <link|rollup|score-rollup|recommend|run> [options]";

fn init_tracing() {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "signal_pipeline=info,signal_rollup=info".into())
    };
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        bail!("{USAGE}");
    };
    if matches!(command, "-h" | "--help") {
        println!("{USAGE}");
        return Ok(());
    }

    let mut config = PipelineConfig::from_env()?;
    config.apply_args(&args)?;
    config.validate()?;

    let now = Utc::now();
    let as_of_date = arg_value::<NaiveDate>(&args, "--as-of")?.unwrap_or_else(|| now.date_naive());

    let db = SignalDb::new(&config.database_url)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;

    let needs_index = matches!(command, "link" | "rollup" | "run");
    let index: Option<Arc<dyn VectorIndex>> = match (&config.vector_database_url, needs_index) {
        (Some(url), true) => {
            let table = TableName::new(config.vector_schema.clone(), config.vector_table.clone())?;
            Some(Arc::new(PgVectorIndex::connect(url, table).await?))
        }
        _ => None,
    };
    let embedder = Arc::new(EmbeddingClient::new(config.embedding.clone())?);

    let ctx = PipelineContext {
        config,
        db,
        index,
        embedder,
    };

    let reports: Vec<StageReport> = match command {
        "link" => vec![stages::link(&ctx, now).await?],
        "rollup" => vec![stages::rollup(&ctx, now).await?],
        "score-rollup" => vec![stages::score_rollup(&ctx, now).await?],
        "recommend" => vec![stages::recommend(&ctx, now, as_of_date).await?],
        "run" => {
            let mut reports = Vec::with_capacity(4);
            reports.push(stages::link(&ctx, now).await?);
            reports.push(stages::rollup(&ctx, now).await?);
            reports.push(stages::score_rollup(&ctx, now).await?);
            reports.push(stages::recommend(&ctx, now, as_of_date).await?);
            reports
        }
        other => bail!("unknown command '{other}'\n{USAGE}"),
    };

    for report in &reports {
        info!(
            stage = report.stage,
            written = report.written,
            processed = report.stats.processed,
            skipped = report.stats.skipped,
            "Stage complete"
        );
        if !report.stats.skip_reasons.is_empty() {
            info!("{} skip reasons: {}", report.stage, serde_json::to_string(&report.stats.skip_reasons)?);
        }
    }

    Ok(())
}
