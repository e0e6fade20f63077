//! Offline harness: replays a WAV recording through the session kernel at
//! simulated time, printing every trigger it would have fired live.
//!
//! Usage: `replay_wav <recording.wav>`

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tandem::audio::meter::{rms, FRAME_MS};
use tandem::kernel::event::{SessionEvent, SideEffect};
use tandem::kernel::session::{CoachSession, SessionConfig};

fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => bail!("usage: replay_wav <recording.wav>"),
    };

    let mut reader = hound::WavReader::open(&path)
        .with_context(|| format!("opening {}", path))?;
    let spec = reader.spec();
    tracing::info!(
        rate = spec.sample_rate,
        channels = spec.channels,
        bits = spec.bits_per_sample,
        "replaying {}",
        path
    );

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .context("reading float samples")?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .context("reading int samples")?
        }
    };

    let frame_len =
        (spec.sample_rate as usize * spec.channels as usize * FRAME_MS as usize / 1000).max(1);

    let mut session = CoachSession::new(SessionConfig::default());
    let start = Instant::now();
    session.start(start);

    let mut triggers = Vec::new();
    for (i, frame) in samples.chunks(frame_len).enumerate() {
        // One tick per frame, clocked by audio position rather than wall time.
        let now = start + Duration::from_millis(FRAME_MS * (i as u64 + 1));
        let at = FRAME_MS as f64 * (i as f64 + 1.0) / 1000.0;
        let mut queue: VecDeque<SideEffect> =
            session.tick_step(vec![SessionEvent::Level(rms(frame))], now).into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                SideEffect::RequestSuggestion(request) => {
                    println!("[{:7.2}s] trigger: {:?}", at, request.trigger_reason);
                    triggers.push(request);
                    // No generator offline, resolve immediately so later
                    // triggers are not starved by the busy guard. The
                    // resolution tick can report effects of its own.
                    queue.extend(session.tick_step(vec![SessionEvent::SuggestionResolved], now));
                }
                SideEffect::BatteryCritical(value) => {
                    println!("[{:7.2}s] battery critical: {:.1}", at, value);
                }
            }
        }
    }

    let elapsed = samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);
    let stats = session.stats(start + Duration::from_secs_f64(elapsed));
    println!("{}", serde_json::to_string_pretty(&stats)?);
    println!("{} trigger(s) over {:.1}s of audio", triggers.len(), elapsed);

    Ok(())
}
