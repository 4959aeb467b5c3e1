//! Framing loop
//!
//! Traces the session's bounding box at low power until stopped. Motion-off
//! is always sent when the loop exits, whatever ended it.

use super::engine::RunContext;
use super::FramingConfig;
use grblink_core::{BoundingBox, DeviceEvent, ErrorEvent, ErrorSource, Result, StreamEvent};

pub(crate) async fn run_framing(mut ctx: RunContext, framing: FramingConfig) {
    let Some(bounds) = ctx.session.bounds() else {
        ctx.finish();
        return;
    };
    tracing::info!(
        "Framing {:.3} x {:.3} at S{}",
        bounds.width(),
        bounds.height(),
        framing.power
    );
    ctx.publish(StreamEvent::FramingStarted { bounds });

    let mut laps = 0;
    if let Err(e) = trace_frame(&ctx, &framing, bounds, &mut laps).await {
        tracing::warn!("Framing aborted: {}", e);
        ctx.connection
            .events()
            .publish(DeviceEvent::Error(ErrorEvent::new(
                ErrorSource::Stream,
                e.to_string(),
            )));
    }

    if let Err(e) = ctx.connection.send(&ctx.config.motion_off_command) {
        tracing::error!("Motion off after framing failed: {}", e);
    }

    ctx.finish();
    tracing::info!("Framing stopped after {} laps", laps);
    ctx.publish(StreamEvent::FramingStopped { laps });
}

fn move_to(x: f64, y: f64, feed_rate: f64) -> String {
    format!("G1 X{:.3} Y{:.3} F{}", x, y, feed_rate)
}

fn laser_on(framing: &FramingConfig) -> String {
    format!("M3 S{}", framing.power)
}

async fn trace_frame(
    ctx: &RunContext,
    framing: &FramingConfig,
    initial: BoundingBox,
    laps: &mut usize,
) -> Result<()> {
    let conn = &ctx.connection;
    let session = &ctx.session;

    conn.send("G90")?;
    conn.send(&format!("G0 X{:.3} Y{:.3}", initial.min_x, initial.min_y))?;
    conn.send(&laser_on(framing))?;

    let mut traced = initial;
    loop {
        let bounds = session.bounds().unwrap_or(traced);
        let corners = bounds.corners();
        // New bounds start from their own origin corner
        let first = if bounds != traced { 0 } else { 1 };
        traced = bounds;

        for &(x, y) in &corners[first..] {
            if !session.wait_for_gate().await || session.should_stop() {
                return Ok(());
            }
            if session.take_resumed() {
                conn.send(&laser_on(framing))?;
            }
            conn.send(&move_to(x, y, framing.feed_rate))?;
            if !session.sleep(framing.corner_delay).await {
                return Ok(());
            }
        }
        *laps += 1;
        tokio::task::yield_now().await;
    }
}
