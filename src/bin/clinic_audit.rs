use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use clinic_audit::{
    db,
    domain::models::{AuditType, ViewportProfile, ViewportProfiles},
    lifecycle::init_logging,
    repository::{AuditStore, MemoryAuditStore, SqliteAuditStore},
    service::{inspector::chromium::ChromiumDriver, HttpResourceFetcher},
    AuditCancel, AuditConfig, AuditRequest, AuditService,
};

#[derive(Debug, Parser)]
#[command(name = "clinic-audit")]
#[command(about = "Audit a clinic's pages and print the resulting record as JSON")]
struct Cli {
    /// Clinic the pages belong to
    #[arg(long = "clinic")]
    clinic_id: String,

    /// basic, comprehensive, performance or seo
    #[arg(long = "type", default_value = "comprehensive")]
    audit_type: AuditType,

    /// Viewport profile; repeat for both (defaults to desktop and mobile)
    #[arg(long = "profile")]
    profiles: Vec<ViewportProfile>,

    /// SQLite URL for persisted records, e.g. sqlite://audits.db?mode=rwc
    #[arg(long)]
    database: Option<String>,

    /// Pages to audit
    #[arg(required = true)]
    urls: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = AuditConfig::from_env()?;

    let store: Arc<dyn AuditStore> = match cli.database.or_else(|| config.database_url.clone()) {
        Some(url) => Arc::new(SqliteAuditStore::new(db::init_pool(&url).await?)),
        None => Arc::new(MemoryAuditStore::new()),
    };
    let fetcher = Arc::new(HttpResourceFetcher::new(
        &config.user_agent,
        config.resource_timeout(),
    )?);
    let driver = Arc::new(
        ChromiumDriver::launch(&config.user_agent, config.navigation_timeout()).await?,
    );

    let viewport_profiles = if cli.profiles.is_empty() {
        ViewportProfiles::both()
    } else {
        cli.profiles.into_iter().collect()
    };
    let request = AuditRequest {
        clinic_id: cli.clinic_id,
        urls: cli.urls,
        audit_type: cli.audit_type,
        viewport_profiles,
    };

    // First Ctrl-C keeps finished pages, the second discards the run
    let cancel = AuditCancel::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("[RUN] Interrupted; finishing with completed pages");
            signal.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel_and_discard();
        }
    });

    let service = AuditService::new(config, driver.clone(), fetcher, store)?;
    let outcome = service.run_audit(request, &cancel).await;
    drop(service);

    if let Ok(driver) = Arc::try_unwrap(driver) {
        if let Err(e) = driver.shutdown().await {
            log::warn!("[CHROMIUM] Shutdown failed: {:#}", e);
        }
    }

    let record = outcome?;
    let json = serde_json::to_string_pretty(&record).context("Failed to encode record")?;
    println!("{json}");
    Ok(())
}
