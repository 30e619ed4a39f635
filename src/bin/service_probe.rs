//! Service probe: sends one image file to the analysis service and
//! prints the parsed response. Checks connectivity and response shape
//! without needing a camera.
//!
//! Usage: service_probe <image> <pose_name> [endpoint]

use anyhow::{bail, Context, Result};

use asana_coach::client::{AnalysisClient, Snapshot, SnapshotFormat};
use asana_coach::config::Config;
use asana_coach::hud::format_score;

const CONFIG_PATH: &str = "coach.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        bail!("usage: service_probe <image> <pose_name> [endpoint]");
    }
    let image_path = &args[1];
    let pose_name = &args[2];

    let config = Config::load_or_default(CONFIG_PATH);
    let endpoint = args
        .get(3)
        .cloned()
        .unwrap_or_else(|| config.service.endpoint.clone());

    let data =
        std::fs::read(image_path).with_context(|| format!("failed to read {}", image_path))?;
    let format = SnapshotFormat::from_path(image_path).unwrap_or(SnapshotFormat::Jpeg);

    println!(
        "POST {}/process_image/?pose_name={}",
        endpoint.trim_end_matches('/'),
        pose_name
    );
    println!("  {} ({} bytes, {})", image_path, data.len(), format.mime());

    let client = AnalysisClient::new(&endpoint, pose_name, config.service.timeout())?;
    let analysis = client.exchange(Snapshot::new(data, format)).await?;

    match analysis.score {
        Some(score) => println!("score: {}  status: {}", format_score(score), analysis.status),
        None => println!("score: (none)  status: {}", analysis.status),
    }
    for item in &analysis.feedback {
        println!("feedback: {}", item.message);
    }

    let incorrect: Vec<String> = analysis
        .keypoints
        .iter()
        .filter(|kp| !kp.correct)
        .map(|kp| match kp.part {
            Some(part) => part.part_name().to_string(),
            None => "(unindexed)".to_string(),
        })
        .collect();
    println!(
        "keypoints: {} total, {} incorrect",
        analysis.keypoints.len(),
        incorrect.len()
    );
    if !incorrect.is_empty() {
        println!("  incorrect: {}", incorrect.join(", "));
    }

    Ok(())
}
