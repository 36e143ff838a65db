use anyhow::Result;
use slbridge_core::{Frame, ShmBridge};
use std::time::Duration;

/// Poll the controller's commands `count` times (forever when `None`)
///
/// `on_frame` sees every received frame; missed locks are only counted by
/// the bridge. Returns the number of frames received.
pub fn watch_commands<F>(
    bridge: &ShmBridge,
    interval: Duration,
    count: Option<u64>,
    mut on_frame: F,
) -> Result<u64>
where
    F: FnMut(&Frame),
{
    let mut received = 0u64;
    let mut polls = 0u64;

    while count.map_or(true, |n| polls < n) {
        if let Some(frame) = bridge.receive_commands()? {
            received += 1;
            on_frame(&frame);
        }
        polls += 1;
        if count.map_or(true, |n| polls < n) {
            std::thread::sleep(interval);
        }
    }

    tracing::debug!(
        "Watched {} polls, {} frames, {} errors",
        polls,
        received,
        bridge.errors()
    );
    Ok(received)
}
