use live_failover::{FailoverController, FailoverEvent, PlaybackStatus};

/// Simulates a player that fails its primary stream, then plays a backup.
#[tokio::main]
async fn main() {
    env_logger::init();

    let controller = FailoverController::new();
    controller
        .set_streams(
            "https://cdn-a.example.com/live.m3u8",
            &[
                "https://cdn-b.example.com/live.m3u8".to_string(),
                "https://cdn-c.example.com/live.m3u8".to_string(),
            ],
        )
        .await;

    // the primary errors out, the first backup comes up
    controller.on_playback_error().await;
    controller.on_playback_status(PlaybackStatus::Playing).await;

    while let Some(event) = controller.recv().await {
        match &event {
            FailoverEvent::StreamSelected { url, .. } => println!("selected {}", url),
            FailoverEvent::SwitchingBackup { url, backup_index } => {
                println!("switching to backup {} ({})", backup_index, url)
            }
            FailoverEvent::Playing { on_backup } => {
                println!("playing (on backup: {})", on_backup);
                break;
            }
            FailoverEvent::Buffering => println!("buffering"),
            FailoverEvent::Failed { reason } => {
                println!("failed: {:?}", reason);
                break;
            }
        }
    }

    if let Some(message) = controller.status_message().await {
        println!("status: {}", message);
    }
}
