use anyhow::Result;

use ctxmem::config::CtxmemConfig;
use ctxmem::router::{RouteOptions, Router};

/// Show the records most relevant to a task, with scores and reasons.
pub async fn route(config: &CtxmemConfig, task: &str, options: &RouteOptions, json: bool) -> Result<()> {
    let store = super::open_store(config, config.router.semantic > 0.0)?;
    let router = Router::with_weights(&store, config.router.weights());
    let scored = router.route_with_scores(task, options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&scored)?);
        return Ok(());
    }
    if scored.is_empty() {
        println!("No relevant records.");
        return Ok(());
    }

    for candidate in &scored {
        super::print_record_line(
            &candidate.record,
            Some(format!("score: {:.3}; {}", candidate.score, candidate.reason)),
        );
    }
    Ok(())
}
