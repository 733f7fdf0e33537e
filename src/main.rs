use std::sync::Arc;
use uplink::config::Config;
use uplink::upload::{HttpChunkTransport, UploadConfig, UploadCoordinator, UploadEvent};
use uplink::utils::{format_bytes, format_speed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load("config.toml")?;
    let file_path = config
        .file_path
        .clone()
        .ok_or_else(|| anyhow::anyhow!("config.toml is missing 'file_path'"))?;

    let transport = Arc::new(HttpChunkTransport::new(&config.upload_endpoint, &config.token));
    let upload_config = UploadConfig {
        chunk_size: config.chunk_size,
        state_file: config.state_file.clone(),
        ..UploadConfig::default()
    };

    let handle = UploadCoordinator::new(transport, upload_config);
    let coordinator = handle.coordinator.clone();

    let mut events = coordinator.subscribe_events();
    let upload_id = coordinator.start_upload(file_path).await?;
    tracing::info!("Upload started: {}", upload_id);

    loop {
        match events.recv().await {
            Ok(UploadEvent::Progress { progress, .. }) => {
                println!(
                    "{}/{} chunks, {} / {} ({:.1}%), {}",
                    progress.current_chunk,
                    progress.total_chunks,
                    format_bytes(progress.uploaded_bytes),
                    format_bytes(progress.total_bytes),
                    progress.overall_percent,
                    format_speed(progress.speed_bps),
                );
            }
            Ok(UploadEvent::StageChanged { from, to, .. }) => {
                println!("Stage: {:?} -> {:?}", from, to);
            }
            Ok(UploadEvent::Completed { .. }) => {
                println!("Upload and processing complete");
                break;
            }
            Ok(UploadEvent::Failed { error, .. }) => {
                eprintln!("Upload failed: {}", error);
                break;
            }
            Err(err) => {
                tracing::warn!("Event stream closed: {}", err);
                break;
            }
        }
    }

    drop(coordinator);
    handle.shutdown().await?;
    Ok(())
}
