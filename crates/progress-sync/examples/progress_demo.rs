// crates/progress-sync/examples/progress_demo.rs
//! Two devices sharing one viewer's progress
//!
//! Run with `RUST_LOG=debug` to see the coordinator's log output.

use std::sync::Arc;
use std::time::Duration;
use streamsync_progress::{
    DeviceType, MemoryTransport, PlaybackPosition, ProgressConfig, ProgressCoordinator,
    ProgressEvent, ProgressEventKind, ProgressMessage, ProgressResult, ProgressTrackingState,
    SceneContext, SessionInfo,
};

#[tokio::main]
async fn main() -> ProgressResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("StreamSync Progress Demo");
    println!("========================\n");

    let laptop_link = Arc::new(MemoryTransport::new());
    let tv_link = Arc::new(MemoryTransport::new());

    let config = ProgressConfig::default().with_sync_interval(Duration::from_millis(200));
    let laptop = Arc::new(ProgressCoordinator::with_transport(
        config.clone(),
        laptop_link.clone(),
    )?);
    let tv = Arc::new(ProgressCoordinator::with_transport(config, tv_link.clone())?);
    tv.attach()?;

    let scenes = vec![
        SceneContext::new("cold-open", "Cold Open", 0.0, 180.0),
        SceneContext::new("heist", "The Heist", 180.0, 1800.0)
            .with_description("Crew breaks into the vault"),
        SceneContext::new("escape", "Escape", 1800.0, 3000.0),
        SceneContext::new("credits", "Credits", 3000.0, 3200.0),
    ];
    laptop.set_scenes("heist-movie", scenes.clone())?;
    tv.set_scenes("heist-movie", scenes)?;

    demo_local_updates(&laptop)?;
    println!();
    demo_handoff(&laptop, &laptop_link, &tv, &tv_link)?;
    println!();
    demo_scheduler(&laptop).await?;

    laptop.shutdown()?;
    tv.shutdown()?;
    Ok(())
}

fn demo_local_updates(laptop: &ProgressCoordinator) -> ProgressResult<()> {
    println!("1. Watching on the laptop");
    println!("-------------------------");

    laptop.on(ProgressEventKind::SceneChanged, |event| {
        if let ProgressEvent::SceneChanged { scene, .. } = event {
            println!("  > now in scene '{}'", scene.title);
        }
    })?;

    let session = SessionInfo::new("laptop-1", DeviceType::Desktop).with_device_name("Laptop");
    for position in [30.0, 200.0, 950.0] {
        let state = laptop.update_progress(
            "player",
            "heist-movie",
            "viewer-1",
            PlaybackPosition::new(position, 3200.0, true),
            session.clone(),
            ProgressTrackingState::Active,
        )?;
        println!(
            "  at {:>6.1}s: {:.1}% ({})",
            position, state.position.progress, state.state
        );
    }
    Ok(())
}

/// Relays everything one side sent to the other side's subscribers
fn relay(from: &MemoryTransport, to: &MemoryTransport) -> ProgressResult<usize> {
    let mut delivered = 0;
    for message in from.take_sent() {
        delivered += to.deliver_message(&message)?;
    }
    Ok(delivered)
}

fn demo_handoff(
    laptop: &ProgressCoordinator,
    laptop_link: &MemoryTransport,
    tv: &ProgressCoordinator,
    tv_link: &MemoryTransport,
) -> ProgressResult<()> {
    println!("2. Moving to the TV");
    println!("-------------------");

    relay(laptop_link, tv_link)?;
    if let Some(state) = tv.get_progress_state("heist-movie", "viewer-1")? {
        println!(
            "  TV received {:.1}s from {}",
            state.position.position, state.session.device_id
        );
    }

    tv.request_progress("player", "heist-movie", "viewer-1", "tv-1")?;
    for message in tv_link.take_sent() {
        println!("  TV sent {}", message.message_type());
    }

    if let Some(answer) = laptop.sync_progress("player", "heist-movie", "viewer-1")? {
        println!("  laptop answers, resume = {}", answer.is_resume);
        for scene in answer.next_scenes.iter().flatten() {
            println!("    next: {} at {:.0}s", scene.title, scene.start_time);
        }
        tv.handle_message(ProgressMessage::ProgressSync(answer))?;
    }

    if let Some(context) = tv.resume_context("heist-movie", "viewer-1")? {
        let scene = context
            .scene
            .map(|s| s.title)
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "  TV offers: resume at {:.1}s in '{}' ({})",
            context.position.position, scene, context.state
        );
    }
    Ok(())
}

async fn demo_scheduler(laptop: &ProgressCoordinator) -> ProgressResult<()> {
    println!("3. Recurring sync check");
    println!("-----------------------");

    laptop.on(ProgressEventKind::SyncRequired, |event| {
        let (video_id, user_id) = event.target();
        println!("  > {}/{} needs a sync", video_id, user_id);
    })?;

    if laptop.start()? {
        tokio::time::sleep(Duration::from_millis(450)).await;
        laptop.stop();
    }
    println!("  scheduler running: {}", laptop.is_syncing());
    Ok(())
}
