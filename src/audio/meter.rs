use ringbuf::traits::Consumer;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::kernel::event::SessionEvent;

/// Wall-clock duration of one RMS frame.
pub const FRAME_MS: u64 = 50;

/// Root-mean-square amplitude of a sample frame, 0.0 for an empty one.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sq_sum: f32 = samples.iter().map(|&x| x * x).sum();
    (sq_sum / samples.len() as f32).sqrt()
}

/// Blocking consumer loop: pops fixed-duration frames off the capture
/// ring and reduces each to one level event. Runs on a dedicated thread;
/// exits when the token cancels or the session channel closes.
pub struct LevelMeter<C>
where
    C: Consumer<Item = f32> + Send,
{
    consumer: C,
    tx: mpsc::Sender<SessionEvent>,
    samples_per_frame: usize,
    cancel: CancellationToken,
}

impl<C> LevelMeter<C>
where
    C: Consumer<Item = f32> + Send,
{
    pub fn new(
        consumer: C,
        tx: mpsc::Sender<SessionEvent>,
        sample_rate: u32,
        channels: u16,
        cancel: CancellationToken,
    ) -> Self {
        // Interleaved frames: one wall-clock frame spans every channel.
        let samples_per_frame =
            (sample_rate as usize * channels.max(1) as usize * FRAME_MS as usize) / 1000;
        Self {
            consumer,
            tx,
            samples_per_frame: samples_per_frame.max(1),
            cancel,
        }
    }

    pub fn run(mut self) {
        info!(samples_per_frame = self.samples_per_frame, "level meter started");
        let mut frame = vec![0.0f32; self.samples_per_frame];

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            if self.consumer.occupied_len() < self.samples_per_frame {
                std::thread::sleep(std::time::Duration::from_millis(10));
                continue;
            }

            let _ = self.consumer.pop_slice(&mut frame);
            let level = rms(&frame);

            if self.tx.blocking_send(SessionEvent::Level(level)).is_err() {
                debug!("session channel closed, meter exiting");
                break;
            }
        }

        info!("level meter stopped");
    }
}
