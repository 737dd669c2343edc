//! Submit a job to a running `reel-api` and wait for it to finish.
//!
//! Usage: `reel-submit <video_generation|image_preview|audio-preview> <payload.json>`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reel_firestore::FirestoreJobStatusStore;
use reel_models::{JobId, JobPhase, JobSubmission, WebhookEnvelope, WebhookType};
use reel_worker::{CompletionPoller, StatusReporter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [event_type, payload_path] = args.as_slice() else {
        anyhow::bail!("usage: reel-submit <video_generation|image_preview|audio-preview> <payload.json>");
    };

    let webhook_type = WebhookType::parse(event_type)
        .ok_or_else(|| anyhow::anyhow!("unknown job type {}", event_type))?;
    let kind = webhook_type.job_kind();

    let raw = tokio::fs::read(payload_path)
        .await
        .with_context(|| format!("reading {}", payload_path))?;
    let mut payload: JobSubmission =
        serde_json::from_slice(&raw).with_context(|| format!("parsing {}", payload_path))?;

    let job_id = match payload.parsed_job_id() {
        Some(id) => id,
        None => {
            let id = JobId::new();
            payload.job_id = Some(id.to_string());
            id
        }
    };

    let api_url = std::env::var("REEL_API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let max_polls = env_parse("POLL_MAX_ATTEMPTS").unwrap_or(60);
    let interval = Duration::from_secs(env_parse("POLL_INTERVAL_SECS").unwrap_or(5));

    let statuses = Arc::new(FirestoreJobStatusStore::from_env().await?);
    let reporter = StatusReporter::new(statuses.clone(), None);
    reporter.mark_queued(job_id, kind).await;
    println!("reel-submit: queued {} job {}", kind, job_id);

    // Fire and forget; the server may hold the request for the whole render.
    let envelope = WebhookEnvelope::new(kind, payload);
    let endpoint = format!("{}/webhook", api_url.trim_end_matches('/'));
    let http = reqwest::Client::new();
    tokio::spawn(async move {
        match http.post(&endpoint).json(&envelope).send().await {
            Ok(response) if !response.status().is_success() => {
                eprintln!("reel-submit: webhook answered {}", response.status());
            }
            Ok(_) => {}
            Err(e) => eprintln!("reel-submit: webhook request failed: {}", e),
        }
    });

    let record = CompletionPoller::new(statuses, max_polls, interval)
        .wait(&job_id)
        .await?;

    match record.phase {
        JobPhase::Completed => {
            println!(
                "reel-submit: completed {}",
                record.artifact_url.as_deref().unwrap_or("(no artifact url)")
            );
            Ok(())
        }
        _ => anyhow::bail!(
            "job {} failed: {}",
            job_id,
            record.error_message.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
