use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use crd_core::{ArticleFilter, ArticleSort, ArticleStatus, ListQuery, Pagination, SortDirection};
use crd_reports::{
    daily_trend, duplicate_search_keys, pipeline_status, usage_report_markdown, UsageSummary,
};
use crd_storage::{open_store, ArticleExporter, DashboardStore, DbConfig, MAX_SCAN_ROWS};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "crd-cli")]
#[command(about = "Contractor review dashboard command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the web dashboard (default).
    Serve,
    /// Print row counts and pipeline progress.
    Status,
    /// Print a markdown report of AI usage.
    Report {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// List city searches that were run more than once.
    Duplicates,
    /// Write articles as markdown into CRD_OUTPUT_DIR with a manifest.
    ExportArticles {
        /// draft, published or archived.
        #[arg(long, default_value = "published")]
        status: String,
        /// Export every article regardless of status.
        #[arg(long)]
        all: bool,
    },
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

async fn store_from_env() -> Result<Arc<dyn DashboardStore>> {
    open_store(&DbConfig::from_env())
        .await
        .context("opening dashboard store")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing().ok();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => crd_web::serve_from_env().await?,
        Commands::Status => {
            let store = store_from_env().await?;
            let counts = store.table_counts().await?;
            for stage in pipeline_status(&counts) {
                println!(
                    "{:<9} {:>6} {:<12} {:>3}%  {}",
                    stage.label, stage.count, stage.unit, stage.progress_pct, stage.detail
                );
            }
            println!("usage log rows: {}", counts.usage_logs);
        }
        Commands::Report { days } => {
            let store = store_from_env().await?;
            let now = Utc::now();
            let logs = store
                .usage_logs_since(now - Duration::days(i64::from(days.max(1))), MAX_SCAN_ROWS)
                .await?;
            let summary = UsageSummary::from_logs(&logs);
            let trend = daily_trend(&logs, days, now.date_naive());
            print!("{}", usage_report_markdown(&summary, &trend));
        }
        Commands::Duplicates => {
            let store = store_from_env().await?;
            let rows = store.all_searched_cities(MAX_SCAN_ROWS).await?;
            let duplicates = duplicate_search_keys(&rows);
            if duplicates.is_empty() {
                println!("no repeated searches in {} rows", rows.len());
            }
            for d in duplicates {
                println!(
                    "{:>3}x  {}, {}  \"{}\"  last {}",
                    d.count,
                    d.city,
                    d.state,
                    d.search_term,
                    d.last_searched_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Commands::ExportArticles { status, all } => {
            let status = if all {
                None
            } else {
                Some(
                    ArticleStatus::parse(&status)
                        .ok_or_else(|| anyhow!("unknown article status `{status}`"))?,
                )
            };
            let store = store_from_env().await?;
            export_articles(store.as_ref(), &ArticleExporter::from_env(), status).await?;
        }
    }

    Ok(())
}

async fn export_articles(
    store: &dyn DashboardStore,
    exporter: &ArticleExporter,
    status: Option<ArticleStatus>,
) -> Result<()> {
    let filter = ArticleFilter {
        status,
        ..ArticleFilter::default()
    };
    let mut page_no = 1;
    let mut exported = Vec::new();
    loop {
        let query = ListQuery::new(
            Pagination::new(page_no, 100),
            ArticleSort::GeneratedAt,
            SortDirection::Desc,
        );
        let page = store.list_articles(&filter, query).await?;
        let ids = page.items.iter().map(|a| a.contractor_id).collect::<Vec<_>>();
        let names = store.contractor_names(&ids).await?;
        for article in &page.items {
            let contractor = names.get(&article.contractor_id).map(String::as_str);
            let file = exporter
                .export(article, contractor)
                .await
                .with_context(|| format!("exporting article {}", article.id))?;
            info!(
                slug = %file.slug,
                path = %file.relative_path.display(),
                unchanged = file.unchanged,
                "exported article"
            );
            exported.push(file);
        }
        if !page.has_next() {
            break;
        }
        page_no += 1;
    }
    let manifest = exporter.read_manifest().await?;
    let written = exported.iter().filter(|e| !e.unchanged).count();
    println!(
        "export complete: articles={} written={} unchanged={} manifest={} ({} files)",
        exported.len(),
        written,
        exported.len() - written,
        exporter.manifest_path().display(),
        manifest.files.len()
    );
    Ok(())
}
