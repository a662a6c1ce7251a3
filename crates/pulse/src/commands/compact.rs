use std::sync::Arc;

use clap::ArgMatches;
use tracing::{error, info};

use pulse_core::Engine;

use super::helpers;
use crate::http::ReqwestTransport;

type FailedOperation = (String, String);

pub(crate) fn handle_compact_command(
    matches: &ArgMatches,
) -> Result<(), Box<dyn std::error::Error>> {
    let buckets: Vec<String> = matches
        .get_many::<String>("bucket")
        .ok_or("At least one bucket is required")?
        .cloned()
        .collect();

    let config = helpers::resolve_config(matches)?;
    let transport = ReqwestTransport::new(&config.http).map_err(|e| {
        eprintln!("❌ Failed to build HTTP client: {}", e);
        e
    })?;

    info!(event = "cli.compact.start_started", buckets = buckets.len());

    let failed = helpers::runtime()?.block_on(async move {
        let engine = Engine::from_config(&config, Arc::new(transport));
        let mut failed: Vec<FailedOperation> = Vec::new();

        for bucket in &buckets {
            let url = compaction_url(bucket);
            let name = bucket.clone();
            let rollback = move || {
                info!(event = "cli.compact.cooldown_expired", bucket = %name);
            };

            match engine
                .actions()
                .register_triggered_and_submit(engine.client(), &url, rollback)
                .await
            {
                Ok(Some(_)) => {
                    println!("✅ Compaction started for '{}'", bucket);
                    info!(event = "cli.compact.submitted", bucket = %bucket);
                }
                Ok(None) => {
                    println!("⏳ Compaction for '{}' was just triggered, skipping", bucket);
                    info!(event = "cli.compact.suppressed", bucket = %bucket);
                }
                Err(e) => {
                    eprintln!("❌ Failed to compact '{}': {}", bucket, e);
                    error!(event = "cli.compact.failed", bucket = %bucket, error = %e);
                    failed.push((bucket.clone(), e.to_string()));
                }
            }
        }

        engine.shutdown();
        failed
    });

    if failed.is_empty() {
        info!(event = "cli.compact.completed");
        Ok(())
    } else {
        Err(format!("{} compaction request(s) failed", failed.len()).into())
    }
}

fn compaction_url(bucket: &str) -> String {
    format!("/pools/default/buckets/{}/controller/compactBucket", bucket)
}
