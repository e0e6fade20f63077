use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tandem::kernel::battery::BatteryMode;
use tandem::kernel::event::{SessionEvent, SideEffect, SuggestionRequest};
use tandem::kernel::session::{CoachSession, SessionConfig};
use tandem::kernel::transcript::{words_from_text, TranscriptSegment};
use tandem::kernel::trigger::{TriggerConfig, TriggerReason};

fn at(t0: Instant, ms: u64) -> Instant {
    t0 + Duration::from_millis(ms)
}

/// Drive the session with one metered level per tick from `from_ms` to
/// `to_ms` inclusive, collecting every side effect.
fn run_level(
    session: &mut CoachSession,
    t0: Instant,
    from_ms: u64,
    to_ms: u64,
    level: f32,
) -> Vec<SideEffect> {
    let mut effects = Vec::new();
    let mut ms = from_ms;
    while ms <= to_ms {
        effects.extend(session.tick_step(vec![SessionEvent::Level(level)], at(t0, ms)));
        ms += 100;
    }
    effects
}

fn requests(effects: &[SideEffect]) -> Vec<&SuggestionRequest> {
    effects
        .iter()
        .filter_map(|e| match e {
            SideEffect::RequestSuggestion(req) => Some(req),
            _ => None,
        })
        .collect()
}

#[test]
fn test_long_silence_fires_after_five_seconds() {
    let t0 = Instant::now();
    let mut session = CoachSession::new(SessionConfig::default());
    session.start(t0);

    // Three seconds of room tone: silence is real but too short.
    let effects = run_level(&mut session, t0, 100, 3000, 0.001);
    assert!(requests(&effects).is_empty(), "3s of silence must not trigger");

    // The comparison is strict, so the 5.0s poll stays quiet and the
    // 5.5s poll fires.
    let effects = run_level(&mut session, t0, 3100, 6000, 0.001);
    let fired = requests(&effects);
    assert_eq!(fired.len(), 1, "Exactly one suggestion over the silent span");
    assert_eq!(fired[0].trigger_reason, TriggerReason::LongSilence);
    assert_eq!(fired[0].event_type, "networking");
    assert_eq!(fired[0].user_role, "professional");
    assert_eq!(fired[0].recent_transcript, "", "Nothing was said yet");
}

#[test]
fn test_low_battery_outranks_long_silence() {
    let t0 = Instant::now();
    // Drain fast enough that the battery hits 50 before silence hits 5s.
    let mut config = SessionConfig::default();
    config.battery.drain_rate_per_sec = 40.0;
    let mut session = CoachSession::new(config);
    session.start(t0);

    let effects = run_level(&mut session, t0, 100, 4000, 0.001);
    let fired = requests(&effects);
    assert_eq!(fired.len(), 1);
    assert_eq!(
        fired[0].trigger_reason,
        TriggerReason::LowBattery,
        "Battery crossed 50 with ~3.5s silence: low battery wins"
    );

    // The collapse continues into critical territory.
    let critical: Vec<f32> = effects
        .iter()
        .filter_map(|e| match e {
            SideEffect::BatteryCritical(v) => Some(*v),
            _ => None,
        })
        .collect();
    assert_eq!(critical.len(), 1, "Critical edge fires once");
    assert!(critical[0] < 25.0);
}

#[test]
fn test_speech_recharges_and_blocks_triggers() {
    let t0 = Instant::now();
    let mut session = CoachSession::new(SessionConfig::default());
    session.start(t0);

    // Seven seconds of steady speech: no silence, no drain, no triggers.
    let effects = run_level(&mut session, t0, 100, 7000, 0.05);
    assert!(effects.is_empty(), "Speaking user produces no side effects");
    assert_eq!(session.battery().value(), 100.0, "Full battery stays full");
    assert_eq!(session.battery().mode(), BatteryMode::Recharging);

    let stats = session.stats(at(t0, 7000));
    assert!(stats.user_speaking);
    assert_eq!(stats.silence_secs, 0.0);
    assert_eq!(stats.suggestion_count, 0);
}

#[test]
fn test_filler_penalty_drains_battery() {
    let t0 = Instant::now();
    let mut session = CoachSession::new(SessionConfig::default());
    session.start(t0);

    // Partner holds the floor, so the battery sits idle: any loss below
    // comes from the filler penalty alone.
    session.tick_step(
        vec![
            SessionEvent::Level(0.001),
            SessionEvent::PartnerSpeaking(true),
        ],
        at(t0, 100),
    );

    // 12 fillers in-window -> 12/min -> high band, 2 pts/s.
    let text = "um um um um um um um um um um um um";
    let words = words_from_text(text, 0.0, 3.0, 0.95);
    let segment = TranscriptSegment::user(text, words, 0.0, 3.0, 0.95);
    session.tick_step(
        vec![SessionEvent::Level(0.001), SessionEvent::Segment(segment)],
        at(t0, 200),
    );

    let effects = run_level(&mut session, t0, 300, 5200, 0.001);
    assert!(requests(&effects).is_empty(), "Partner speech blocks triggers");

    // 51 penalty ticks at 0.2 pts each = 10.2 points.
    let raw = session.battery().raw_value();
    assert!(
        (raw - 89.8).abs() < 0.05,
        "Expected ~89.8 raw after 5.1s of high-band penalty, got {}",
        raw
    );
    assert_eq!(session.battery().mode(), BatteryMode::Idle, "No drain, no recharge");

    let stats = session.stats(at(t0, 5200));
    assert_eq!(stats.filler_count, 12);
    assert!((stats.filler_rate_per_min - 12.0).abs() < 1e-3);
    assert_eq!(stats.filler_breakdown.get("um"), Some(&12));
}

#[test]
fn test_partner_speech_pauses_drain_and_triggers() {
    let t0 = Instant::now();
    let mut session = CoachSession::new(SessionConfig::default());
    session.start(t0);

    session.tick_step(
        vec![
            SessionEvent::Level(0.001),
            SessionEvent::PartnerSpeaking(true),
        ],
        at(t0, 100),
    );
    let effects = run_level(&mut session, t0, 200, 7000, 0.001);

    // Seven silent seconds would normally fire long_silence and drain
    // 20+ points; a speaking partner suspends both.
    assert!(effects.is_empty());
    assert_eq!(session.battery().value(), 100.0);
    assert_eq!(session.battery().mode(), BatteryMode::Idle);
}

#[test]
fn test_cooldown_cycle_with_resolution() {
    let t0 = Instant::now();
    // Short cooldown to keep the test span reasonable.
    let mut config = SessionConfig::default();
    config.trigger = TriggerConfig {
        cooldown_secs: 3.0,
        ..TriggerConfig::default()
    };
    let mut session = CoachSession::new(config);
    session.start(t0);

    let effects = run_level(&mut session, t0, 100, 5500, 0.001);
    assert_eq!(requests(&effects).len(), 1, "First fire at the 5.5s poll");

    // The generator comes back; the busy guard clears but the cooldown
    // (until 8.5s) keeps running.
    session.tick_step(
        vec![
            SessionEvent::Level(0.001),
            SessionEvent::SuggestionResolved,
        ],
        at(t0, 5600),
    );

    let effects = run_level(&mut session, t0, 5700, 8400, 0.001);
    assert!(requests(&effects).is_empty(), "Cooldown holds through 8.4s");

    let effects = run_level(&mut session, t0, 8500, 8500, 0.001);
    assert_eq!(requests(&effects).len(), 1, "Cooldown expiry releases the next fire");
    assert_eq!(session.trigger().suggestion_count(), 2);
}

#[test]
fn test_resolution_tick_still_reports_critical() {
    let t0 = Instant::now();
    let mut config = SessionConfig::default();
    config.battery.drain_rate_per_sec = 40.0;
    let mut session = CoachSession::new(config);
    session.start(t0);

    // The collapse fires low_battery at the 3.5s poll, but the smoothed
    // value is still a hair above 25 at 3.7s.
    let effects = run_level(&mut session, t0, 100, 3700, 0.001);
    assert_eq!(requests(&effects).len(), 1);
    assert!(
        !effects.iter().any(|e| matches!(e, SideEffect::BatteryCritical(_))),
        "Smoothed value held above critical through 3.7s"
    );

    // The generator resolves on the next tick; that tick also crosses
    // the critical threshold and must still surface the edge.
    let effects = session.tick_step(vec![SessionEvent::SuggestionResolved], at(t0, 3800));
    assert_eq!(effects.len(), 1, "Resolution tick carries the critical edge");
    match &effects[0] {
        SideEffect::BatteryCritical(value) => {
            assert!(
                (value - 21.33).abs() < 0.05,
                "Expected ~21.33 at the crossing, got {}",
                value
            );
        }
        other => panic!("Expected a critical edge, got {:?}", other),
    }
}

#[test]
fn test_incoherence_fires_dedicated_trigger() {
    let t0 = Instant::now();
    let mut session = CoachSession::new(SessionConfig::default());
    session.start(t0);

    let mut effects = run_level(&mut session, t0, 100, 2000, 0.001);

    // A sub-floor coherence score arrives between polls.
    effects.extend(session.tick_step(
        vec![SessionEvent::Level(0.001), SessionEvent::Coherence(0.2)],
        at(t0, 2100),
    ));
    effects.extend(run_level(&mut session, t0, 2200, 4000, 0.001));

    let fired = requests(&effects);
    assert_eq!(fired.len(), 1, "One incoherence attempt, no re-fire");
    assert_eq!(
        fired[0].trigger_reason,
        TriggerReason::Incoherent,
        "Neither silence nor battery thresholds were met at the 2.5s poll"
    );
}

#[test]
fn test_weak_coherence_penalizes_without_trigger() {
    let t0 = Instant::now();
    let mut session = CoachSession::new(SessionConfig::default());
    session.start(t0);

    run_level(&mut session, t0, 100, 2000, 0.001);
    // 0.5 is weak but above the 0.35 floor: mild penalty, no trigger.
    let mut effects = session.tick_step(
        vec![SessionEvent::Level(0.001), SessionEvent::Coherence(0.5)],
        at(t0, 2100),
    );
    effects.extend(run_level(&mut session, t0, 2200, 4000, 0.001));

    assert!(
        requests(&effects).is_empty(),
        "Weak-but-coherent speech must not request a suggestion"
    );
}

#[test]
fn test_each_coherence_score_in_batch_penalizes() {
    let t0 = Instant::now();
    let mut session = CoachSession::new(SessionConfig::default());
    session.start(t0);

    // Partner holds the floor, so the battery sits idle and any loss
    // below comes from coherence penalties alone.
    session.tick_step(
        vec![
            SessionEvent::Level(0.001),
            SessionEvent::PartnerSpeaking(true),
        ],
        at(t0, 100),
    );

    // Two scores land in one tick: sub-floor (high tier, 0.2 pts) and
    // weak (mild tier, 0.1 pts). Both count.
    session.tick_step(
        vec![
            SessionEvent::Level(0.001),
            SessionEvent::Coherence(0.2),
            SessionEvent::Coherence(0.5),
        ],
        at(t0, 200),
    );

    let raw = session.battery().raw_value();
    assert!(
        (raw - 99.7).abs() < 1e-3,
        "Expected both scores to penalize (100 - 0.2 - 0.1), got {}",
        raw
    );
    assert_eq!(session.battery().mode(), BatteryMode::Idle);
}

#[test]
fn test_suggestion_payload_carries_context() {
    let t0 = Instant::now();
    let mut session = CoachSession::new(SessionConfig::default());
    session.start(t0);

    let partner = TranscriptSegment::partner("So what do you do for work?", 0.0, 1.5);
    session.tick_step(
        vec![SessionEvent::Level(0.001), SessionEvent::Segment(partner)],
        at(t0, 100),
    );

    let text = "I um work in you know data science";
    let words = words_from_text(text, 0.5, 2.5, 0.95);
    let user = TranscriptSegment::user(text, words, 0.5, 2.5, 0.95);
    session.tick_step(
        vec![SessionEvent::Level(0.001), SessionEvent::Segment(user)],
        at(t0, 300),
    );

    let effects = run_level(&mut session, t0, 400, 6000, 0.001);
    let fired = requests(&effects);
    assert_eq!(fired.len(), 1);
    assert_eq!(
        fired[0].recent_transcript,
        "So what do you do for work? I um work in you know data science"
    );
    assert_eq!(fired[0].last_partner_utterance, "So what do you do for work?");

    let stats = session.stats(at(t0, 6000));
    assert_eq!(stats.filler_count, 2, "um + you know");
    assert_eq!(stats.filler_breakdown.get("you know"), Some(&1));
}

#[test]
fn test_stop_preserves_stats_reset_clears_them() {
    let t0 = Instant::now();
    let mut session = CoachSession::new(SessionConfig::default());
    session.start(t0);
    run_level(&mut session, t0, 100, 3000, 0.001);

    session.stop();
    let stats = session.stats(at(t0, 3100));
    assert!(!stats.listening);
    assert_eq!(stats.silence_secs, 0.0, "Detector returns to neutral on stop");
    assert!(
        stats.battery_value < 100.0 && stats.battery_value > 90.0,
        "Drained score survives stop, got {}",
        stats.battery_value
    );
    assert!(
        (stats.session_secs - 3.1).abs() < 1e-6,
        "Timeline origin survives stop"
    );

    // Stopped sessions ignore input entirely.
    let effects = session.tick_step(vec![SessionEvent::Level(0.9)], at(t0, 3200));
    assert!(effects.is_empty());
    assert!(!session.stats(at(t0, 3200)).user_speaking);

    session.reset();
    let stats = session.stats(at(t0, 3300));
    assert_eq!(stats.battery_value, 100.0);
    assert_eq!(stats.session_secs, 0.0);
    assert_eq!(stats.filler_count, 0);
    assert_eq!(stats.suggestion_count, 0);
}

#[test]
fn test_restart_keeps_timeline_origin() {
    let t0 = Instant::now();
    let mut session = CoachSession::new(SessionConfig::default());
    session.start(t0);
    run_level(&mut session, t0, 100, 1000, 0.001);
    session.stop();

    session.start(at(t0, 5000));
    assert!(session.is_listening());
    let stats = session.stats(at(t0, 5000));
    assert!(
        (stats.session_secs - 5.0).abs() < 1e-6,
        "Restart must not rebase the timeline, got {}",
        stats.session_secs
    );
}

#[test]
fn test_restart_does_not_bill_stopped_gap() {
    let t0 = Instant::now();
    let mut session = CoachSession::new(SessionConfig::default());
    session.start(t0);

    // 2.4s of billable silence: raw lands at 90.4, still draining.
    run_level(&mut session, t0, 100, 4000, 0.001);
    let raw_at_stop = session.battery().raw_value();
    assert!((raw_at_stop - 90.4).abs() < 0.05);
    session.stop();

    // Restart a minute later. The stopped gap is not silence the user
    // sat through, so the first tick must not drain it.
    session.start(at(t0, 64_000));
    assert_eq!(session.battery().mode(), BatteryMode::Idle);

    let effects = session.tick_step(vec![SessionEvent::Level(0.001)], at(t0, 64_100));
    assert!(effects.is_empty());
    let raw = session.battery().raw_value();
    assert!(
        (raw - raw_at_stop).abs() < 1e-3,
        "First tick after restart must not bill the gap, got {} from {}",
        raw,
        raw_at_stop
    );
    assert!(
        session.battery().in_grace_period(at(t0, 64_100)),
        "Fresh silence after restart re-arms the grace window"
    );

    // Drain resumes on the restarted clock once the new window expires.
    run_level(&mut session, t0, 64_200, 66_600, 0.001);
    let raw = session.battery().raw_value();
    assert!(
        (raw - 86.4).abs() < 0.05,
        "Expected 90.4 - 4.0 after 1s past the new grace window, got {}",
        raw
    );
}

#[tokio::test]
async fn test_run_loop_stops_on_cancel() {
    let (_event_tx, event_rx) = mpsc::channel(16);
    let (effect_tx, _effect_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let mut session = CoachSession::new(SessionConfig::default());
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        session.run(event_rx, effect_tx, run_cancel).await;
        session
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();

    let session = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("session loop should stop promptly after cancel")
        .expect("session task should not panic");
    assert!(!session.is_listening(), "run() stops the session on exit");
}
