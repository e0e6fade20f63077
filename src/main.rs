use std::time::{Duration, Instant};

use anyhow::Context;
use ringbuf::traits::Split;
use ringbuf::HeapRb;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tandem::audio::capture::AudioCapture;
use tandem::audio::meter::LevelMeter;
use tandem::kernel::event::{SessionEvent, SideEffect};
use tandem::kernel::session::{CoachSession, SessionConfig};
use tandem::kernel::transcript::TranscriptSegment;
use tandem::services::suggest::SuggestClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    tracing::info!("tandem live session starting");

    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(256);
    let (effect_tx, mut effect_rx) = mpsc::channel::<SideEffect>(32);
    let cancel = CancellationToken::new();

    // Audio path: capture callback -> ring -> meter thread -> events.
    // Half a second of headroom at 16kHz mono; more at higher rates is
    // still fine because the meter drains far faster than it fills.
    let ring = HeapRb::<f32>::new(16384);
    let (producer, consumer) = ring.split();

    let capture = AudioCapture::new(producer).context("microphone acquisition failed")?;
    tracing::info!(rate = capture.sample_rate, "audio capture live");

    let meter = LevelMeter::new(
        consumer,
        event_tx.clone(),
        capture.sample_rate,
        capture.channels,
        cancel.clone(),
    );
    let meter_thread = std::thread::spawn(move || meter.run());

    // Side-effect consumer. With TANDEM_COACH_URL set, suggestion
    // requests go to the real generator; otherwise they resolve locally
    // so the engine's busy guard still cycles.
    let coach_url = std::env::var("TANDEM_COACH_URL").ok();
    if coach_url.is_none() {
        tracing::warn!("TANDEM_COACH_URL unset, suggestions will be placeholders");
    }
    let resolve_tx = event_tx.clone();
    let effects_task = tokio::spawn(async move {
        let client = coach_url.map(SuggestClient::new);
        while let Some(effect) = effect_rx.recv().await {
            match effect {
                SideEffect::RequestSuggestion(request) => {
                    tracing::info!(reason = ?request.trigger_reason, "suggestion requested");
                    match &client {
                        Some(client) => {
                            let outcome = tokio::time::timeout(
                                Duration::from_secs(12),
                                client.generate_suggestion(&request),
                            )
                            .await;
                            match outcome {
                                Ok(Ok(text)) => println!("\n[coach] {}\n", text),
                                Ok(Err(e)) => tracing::warn!("suggestion failed: {}", e),
                                Err(_) => tracing::warn!("suggestion timed out"),
                            }
                        }
                        None => {
                            println!(
                                "\n[coach] ({:?}) take a beat and ask them something\n",
                                request.trigger_reason
                            );
                        }
                    }
                    // Success or failure, the engine must be released.
                    let _ = resolve_tx.send(SessionEvent::SuggestionResolved).await;
                }
                SideEffect::BatteryCritical(value) => {
                    tracing::warn!(value, "social battery critical");
                }
            }
        }
    });

    // Stdin stands in for the far-end transcript feed: each line arrives
    // as one partner utterance with speaking pulses around it.
    let stdin_tx = event_tx.clone();
    let stdin_cancel = cancel.clone();
    let session_origin = Instant::now();
    let stdin_task = tokio::spawn(async move {
        let stdin = tokio::io::stdin();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        println!("Speak into the microphone; type a line to inject partner speech. Ctrl+C exits.");

        while let Ok(Some(line)) = lines.next_line().await {
            if stdin_cancel.is_cancelled() {
                break;
            }
            let text = line.trim().to_string();
            if text.is_empty() {
                continue;
            }
            let end = session_origin.elapsed().as_secs_f64();
            let start = (end - 2.0).max(0.0);
            let segment = TranscriptSegment::partner(text, start, end);
            let _ = stdin_tx.send(SessionEvent::PartnerSpeaking(true)).await;
            let _ = stdin_tx.send(SessionEvent::Segment(segment)).await;
            let _ = stdin_tx.send(SessionEvent::PartnerSpeaking(false)).await;
        }
    });

    let ctrlc_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            ctrlc_cancel.cancel();
        }
    });

    let mut session = CoachSession::new(SessionConfig::default());
    session.run(event_rx, effect_tx, cancel.clone()).await;

    let stats = session.stats(Instant::now());
    println!("{}", serde_json::to_string_pretty(&stats)?);

    stdin_task.abort();
    effects_task.abort();
    drop(capture);
    let _ = meter_thread.join();

    tracing::info!("tandem live session ended");
    Ok(())
}
