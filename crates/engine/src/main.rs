//! Treeline engine - applies one batch read from stdin.
//!
//! ```bash
//! treeline-engine product-tags < batch.json
//! ```

use std::process::ExitCode;

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use treeline_engine::infrastructure::ports::HierarchyTable;
use treeline_engine::infrastructure::settings::EngineSettings;
use treeline_engine::App;
use treeline_shared::{BatchErrorResponse, BatchRequest, BatchResponse, ErrorCode};

const USAGE: &str = "usage: treeline-engine <product-tags|user-groups> < batch.json";

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load environment from repo root.
    load_dotenv_from_repo_root();

    // Logs go to stderr; stdout carries the JSON response.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "treeline_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let name = std::env::args().nth(1).context(USAGE)?;
    let table = HierarchyTable::from_name(&name)
        .with_context(|| format!("unknown hierarchy '{name}'; {USAGE}"))?;

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("reading batch from stdin")?;
    let request: BatchRequest =
        serde_json::from_str(&input).context("parsing batch request JSON")?;

    let settings = EngineSettings::from_env();
    tracing::info!(hierarchy = %table, items = request.items.len(), "Starting Treeline engine");
    let app = App::connect(&settings).await?;
    let module = app
        .hierarchy(table)
        .with_context(|| format!("hierarchy '{table}' is not wired"))?;

    let (kind, forms) = match request.into_forms() {
        Ok(converted) => converted,
        Err(e) => {
            tracing::info!(error = %e, index = e.index(), "Batch request rejected");
            let response =
                BatchErrorResponse::new(ErrorCode::BadRequest, "invalid_form", e.to_string());
            println!("{}", serde_json::to_string_pretty(&response)?);
            return Ok(ExitCode::FAILURE);
        }
    };

    match module.apply_batch.execute(kind, &forms).await {
        Ok(outcome) => {
            let response =
                BatchResponse::from_outcomes(outcome.batch_id.to_string(), &outcome.items);
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.to_response())?);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
