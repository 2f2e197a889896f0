use std::sync::Arc;

use lifecompass::config::AppConfig;
use lifecompass::onboarding::{OnboardingManager, OnboardingRouteState, onboarding_routes};
use lifecompass::store::{Database, LibSqlBackend};
use lifecompass::wizard::Wizard;
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env()?;

    eprintln!("🧭 LifeCompass v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .map_err(|e| {
                format!(
                    "Failed to open database at {}: {}",
                    config.db_path.display(),
                    e
                )
            })?,
    );

    let manager = Arc::new(
        OnboardingManager::load(Arc::clone(&db), config.user_id.clone(), &config.default_language)
            .await,
    );

    // ── HTTP mode ────────────────────────────────────────────────────────
    if let Some(port) = config.http_port {
        let app = onboarding_routes(OnboardingRouteState {
            manager: Arc::clone(&manager),
        });
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        eprintln!("   API: http://0.0.0.0:{}/api/onboarding/status", port);
        tracing::info!(port, "Onboarding server listening");
        axum::serve(listener, app).await?;
        return Ok(());
    }

    // ── Terminal mode ────────────────────────────────────────────────────
    if manager.status().await?.onboarding_completed {
        eprintln!("   Onboarding already completed for user '{}'.", config.user_id);
        return Ok(());
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let report = Wizard::new(&manager).run(stdin, &mut stdout).await?;
    tracing::info!(
        goal_id = %report.goal_id,
        projects = report.project_ids.len(),
        tasks = report.task_ids.len(),
        verified = report.verified,
        "Onboarding finished"
    );

    Ok(())
}
