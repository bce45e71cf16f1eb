//! End-to-end turn tests against deterministic fakes.
//!
//! Every test runs on a paused clock, so playback and polling delays cost
//! nothing and timings are exact.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{FakeProvider, HarnessBuilder, ScriptedGenerator, Step, Voice, position, states};
use nanna::audio::AudioHandle;
use nanna::config::AnimationMode;
use nanna::error::{CaptureError, GenerationError, SynthesisError};
use nanna::pipeline::orchestrator::TEST_PHRASE;
use nanna::stt::CaptureEvent;
use nanna::tts::{PollPolicy, ProviderKind};
use nanna::viseme::{Expression, estimate_speaking_duration, plan_duration, text_plan};
use nanna::{RuntimeEvent, TurnRejected, TurnState};
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn second_turn_is_rejected_while_one_is_in_flight() {
    let generator = ScriptedGenerator::new([Step::Hang, Step::Reply("ok".into())]);
    let h = HarnessBuilder::new(generator.clone()).build();
    let orch = &h.orchestrator;

    let first = orch.submit_text("hello nanna").unwrap();
    settle().await;

    assert_eq!(orch.state(), TurnState::Thinking);
    assert_eq!(
        orch.start_capture(),
        Err(TurnRejected::Busy(TurnState::Thinking))
    );
    assert_eq!(
        orch.submit_text("again"),
        Err(TurnRejected::Busy(TurnState::Thinking))
    );
    assert_eq!(
        orch.speak_test_phrase(),
        Err(TurnRejected::Busy(TurnState::Thinking))
    );
    assert_eq!(orch.current_turn().unwrap().id, first);
    assert_eq!(generator.call_count(), 1);

    orch.interrupt();
    assert_eq!(orch.state(), TurnState::Idle);
    assert!(orch.submit_text("now?").is_ok());
}

#[tokio::test(start_paused = true)]
async fn blank_submission_is_rejected() {
    let generator = ScriptedGenerator::replying(&[]);
    let h = HarnessBuilder::new(generator.clone()).build();

    assert_eq!(
        h.orchestrator.submit_text("   "),
        Err(TurnRejected::EmptyInput)
    );
    assert_eq!(h.orchestrator.state(), TurnState::Idle);
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn history_keeps_only_the_most_recent_turns() {
    let generator = ScriptedGenerator::replying(&["a1", "a2", "a3", "a4", "a5"]);
    let mut h = HarnessBuilder::new(generator.clone())
        .config(|c| {
            c.conversation.max_turns = 3;
            c.conversation.auto_speak = false;
        })
        .build();

    for i in 1..=5 {
        let turn = h.orchestrator.submit_text(&format!("q{i}")).unwrap();
        h.run_to_idle(turn).await;
    }

    let history = h.orchestrator.history();
    let users: Vec<_> = history.iter().map(|e| e.user_text.as_str()).collect();
    let replies: Vec<_> = history
        .iter()
        .map(|e| e.reply_text.as_deref().unwrap())
        .collect();
    assert_eq!(users, ["q3", "q4", "q5"]);
    assert_eq!(replies, ["a3", "a4", "a5"]);

    // The last call saw the three exchanges before it, never itself.
    let (context, user_text) = generator.calls().pop().unwrap();
    assert_eq!(user_text, "q5");
    let texts: Vec<_> = context.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["q2", "a2", "q3", "a3", "q4", "a4"]);
}

#[tokio::test(start_paused = true)]
async fn credential_failure_falls_back_to_the_system_voice_once() {
    let eleven = FakeProvider::new(
        ProviderKind::ElevenLabs,
        Voice::Fail(SynthesisError::MissingCredentials {
            provider: ProviderKind::ElevenLabs,
            what: "API key",
        }),
    );
    let system = FakeProvider::new(ProviderKind::System, Voice::Audio);
    let mut h = HarnessBuilder::new(ScriptedGenerator::replying(&["Vinara, Chinna."]))
        .config(|c| c.tts.provider = ProviderKind::ElevenLabs)
        .provider(eleven.clone())
        .provider(system.clone())
        .build();

    let turn = h.orchestrator.submit_text("teach me").unwrap();
    let events = h.run_to_idle(turn).await;

    assert!(events.contains(&RuntimeEvent::SynthesisStarted {
        turn,
        provider: ProviderKind::ElevenLabs,
    }));
    assert!(events.iter().any(|e| matches!(
        e,
        RuntimeEvent::ProviderFallback {
            from: ProviderKind::ElevenLabs,
            to: ProviderKind::System,
            reason: SynthesisError::MissingCredentials { .. },
            ..
        }
    )));
    assert!(events.contains(&RuntimeEvent::SynthesisEnded {
        turn,
        provider: ProviderKind::System,
    }));
    assert!(!events.iter().any(|e| matches!(e, RuntimeEvent::Apology { .. })));
    assert_eq!(eleven.calls(), 1);
    assert_eq!(system.calls(), 1);
    assert_eq!(h.playback.plays().len(), 1);
    assert_eq!(
        states(&events),
        [TurnState::Thinking, TurnState::Speaking, TurnState::Idle]
    );
}

#[tokio::test(start_paused = true)]
async fn failing_default_ends_the_turn_without_further_fallback() {
    let eleven = FakeProvider::new(
        ProviderKind::ElevenLabs,
        Voice::Fail(SynthesisError::Network {
            provider: ProviderKind::ElevenLabs,
            message: "connection refused".into(),
        }),
    );
    let system = FakeProvider::new(
        ProviderKind::System,
        Voice::Fail(SynthesisError::Playback("no voices installed".into())),
    );
    let mut h = HarnessBuilder::new(ScriptedGenerator::replying(&["Ardam ayyinda?"]))
        .config(|c| c.tts.provider = ProviderKind::ElevenLabs)
        .provider(eleven.clone())
        .provider(system.clone())
        .build();

    let turn = h.orchestrator.submit_text("hi").unwrap();
    let events = h.run_to_idle(turn).await;

    assert_eq!(eleven.calls(), 1);
    assert_eq!(system.calls(), 1);
    assert!(events.iter().any(|e| matches!(
        e,
        RuntimeEvent::SynthesisFailed {
            error: SynthesisError::Playback(_),
            ..
        }
    )));
    let apologies: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, RuntimeEvent::Apology { .. }))
        .collect();
    assert_eq!(apologies.len(), 1);

    // Animation never started but is still stopped before idle.
    assert!(position(&events, |e| matches!(e, RuntimeEvent::AnimationStarted { .. })).is_none());
    assert!(position(&events, |e| matches!(e, RuntimeEvent::AnimationStopped { .. })).is_some());
    assert_eq!(
        states(&events),
        [
            TurnState::Thinking,
            TurnState::Speaking,
            TurnState::Error,
            TurnState::Idle
        ]
    );
    assert_eq!(h.orchestrator.animator().current(), Expression::Neutral);
}

#[tokio::test(start_paused = true)]
async fn pending_job_is_polled_a_bounded_number_of_times() {
    let resemble = FakeProvider::new(ProviderKind::Resemble, Voice::PendingForever);
    let mut h = HarnessBuilder::new(ScriptedGenerator::replying(&["Baaga cheppav!"]))
        .config(|c| c.tts.provider = ProviderKind::Resemble)
        .provider(resemble.clone())
        .poll(PollPolicy {
            interval: Duration::from_millis(500),
            max_attempts: 4,
        })
        .build();

    let turn = h.orchestrator.submit_text("hello").unwrap();
    let events = h.run_to_idle(turn).await;

    assert_eq!(resemble.calls(), 1);
    assert_eq!(resemble.polls(), 4);
    assert!(events.iter().any(|e| matches!(
        e,
        RuntimeEvent::ProviderFallback {
            from: ProviderKind::Resemble,
            reason: SynthesisError::PollTimeout { attempts: 4, .. },
            ..
        }
    )));
    assert!(events.contains(&RuntimeEvent::SynthesisEnded {
        turn,
        provider: ProviderKind::System,
    }));
}

#[tokio::test(start_paused = true)]
async fn animation_runs_in_lock_step_with_playback() {
    let mut h = HarnessBuilder::new(ScriptedGenerator::replying(&["Money market ante emiti?"]))
        .playback(Duration::from_secs(2))
        .build();

    let turn = h.orchestrator.submit_text("explain").unwrap();
    let events = h.run_to_idle(turn).await;

    let at = |pred: &dyn Fn(&RuntimeEvent) -> bool| position(&events, pred).unwrap();
    let synth_started = at(&|e| matches!(e, RuntimeEvent::SynthesisStarted { .. }));
    let playing = at(&|e| matches!(e, RuntimeEvent::PlaybackStarted { .. }));
    let anim_started = at(&|e| matches!(e, RuntimeEvent::AnimationStarted { .. }));
    let synth_ended = at(&|e| matches!(e, RuntimeEvent::SynthesisEnded { .. }));
    let anim_stopped = at(&|e| matches!(e, RuntimeEvent::AnimationStopped { .. }));
    let idle = at(&|e| {
        matches!(
            e,
            RuntimeEvent::StateChanged {
                state: TurnState::Idle,
                ..
            }
        )
    });

    assert!(synth_started < playing);
    assert!(playing < anim_started);
    assert!(anim_started < synth_ended);
    assert!(synth_ended < anim_stopped);
    assert!(anim_stopped < idle);

    settle().await;
    assert!(!h.orchestrator.animator().is_running());
    assert_eq!(h.orchestrator.animator().current(), Expression::Neutral);
}

#[tokio::test(start_paused = true)]
async fn empty_transcript_never_reaches_generation() {
    let generator = ScriptedGenerator::replying(&["unused"]);
    let mut h = HarnessBuilder::new(generator.clone()).build();

    let turn = h.orchestrator.start_capture().unwrap();
    assert!(h.feed.send(CaptureEvent::Final("  ".into())));
    let events = h.run_to_idle(turn).await;

    assert_eq!(generator.call_count(), 0);
    assert!(events.contains(&RuntimeEvent::CaptureFailed {
        turn,
        error: CaptureError::NoSpeech,
    }));
    assert!(h.orchestrator.history().is_empty());
    assert_eq!(
        states(&events),
        [TurnState::Listening, TurnState::Error, TurnState::Idle]
    );
}

#[tokio::test(start_paused = true)]
async fn empty_reply_still_completes_the_turn() {
    let mut h = HarnessBuilder::new(ScriptedGenerator::replying(&[""])).build();

    let turn = h.orchestrator.submit_text("say nothing").unwrap();
    let events = h.run_to_idle(turn).await;

    assert!(events.contains(&RuntimeEvent::Reply {
        turn,
        text: String::new(),
    }));
    assert!(events.contains(&RuntimeEvent::SynthesisEnded {
        turn,
        provider: ProviderKind::System,
    }));
    assert!(!events.iter().any(|e| matches!(e, RuntimeEvent::Apology { .. })));
    assert_eq!(
        states(&events),
        [TurnState::Thinking, TurnState::Speaking, TurnState::Idle]
    );
    assert_eq!(h.orchestrator.history()[0].reply_text.as_deref(), Some(""));
    assert_eq!(h.orchestrator.animator().current(), Expression::Neutral);
}

#[tokio::test(start_paused = true)]
async fn spoken_question_about_insurance() {
    let reply = "Insurance is about risk transfer...";
    let estimate = estimate_speaking_duration(reply, 90);
    let mut h = HarnessBuilder::new(ScriptedGenerator::replying(&[reply]))
        .playback(estimate)
        .build();

    let turn = h.orchestrator.start_capture().unwrap();
    assert!(h.feed.send(CaptureEvent::Interim("learn about".into())));
    assert!(h.feed.send(CaptureEvent::Final("learn about insurance".into())));
    let events = h.run_to_idle(turn).await;

    assert!(events.contains(&RuntimeEvent::Interim {
        turn,
        text: "learn about".into(),
    }));
    assert!(events.contains(&RuntimeEvent::Transcript {
        turn,
        text: "learn about insurance".into(),
    }));
    assert!(events.contains(&RuntimeEvent::Reply {
        turn,
        text: reply.into(),
    }));
    assert!(events.contains(&RuntimeEvent::AnimationStarted { turn }));
    assert!(events.contains(&RuntimeEvent::SynthesisEnded {
        turn,
        provider: ProviderKind::System,
    }));
    assert_eq!(
        states(&events),
        [
            TurnState::Listening,
            TurnState::Thinking,
            TurnState::Speaking,
            TurnState::Idle
        ]
    );

    let plan = text_plan(reply, estimate, Duration::from_millis(80));
    assert_eq!(plan_duration(&plan), estimate);
    assert_eq!(estimate, Duration::from_millis(90 * reply.len() as u64));
    assert!(matches!(h.playback.plays()[0], AudioHandle::Url(_)));
}

#[tokio::test(start_paused = true)]
async fn interrupt_while_speaking_stops_everything() {
    let mut h = HarnessBuilder::new(ScriptedGenerator::replying(&["A long story, Chinna"]))
        .playback(Duration::from_secs(30))
        .build();

    let turn = h.orchestrator.submit_text("tell me a story").unwrap();
    loop {
        if let RuntimeEvent::AnimationStarted { .. } = h.events.recv().await.unwrap() {
            break;
        }
    }
    assert_eq!(h.orchestrator.state(), TurnState::Speaking);
    assert!(h.orchestrator.animator().is_running());

    h.orchestrator.interrupt();
    assert_eq!(h.orchestrator.state(), TurnState::Idle);
    let events = h.run_to_idle(turn).await;
    assert!(events.contains(&RuntimeEvent::AnimationStopped { turn }));
    assert!(events.contains(&RuntimeEvent::Interrupted { turn }));

    // Nothing from the abandoned turn arrives later.
    tokio::time::sleep(Duration::from_secs(60)).await;
    while let Ok(event) = h.events.try_recv() {
        assert!(
            !matches!(
                event,
                RuntimeEvent::SynthesisEnded { .. } | RuntimeEvent::SynthesisFailed { .. }
            ),
            "late event {event:?}"
        );
    }
    assert!(!h.orchestrator.animator().is_running());
    assert_eq!(h.orchestrator.animator().current(), Expression::Neutral);
}

#[tokio::test(start_paused = true)]
async fn interrupt_while_thinking_discards_the_reply() {
    let generator = ScriptedGenerator::new([Step::Hang, Step::Reply("second".into())]);
    let mut h = HarnessBuilder::new(generator.clone())
        .config(|c| c.conversation.auto_speak = false)
        .build();

    let first = h.orchestrator.submit_text("first").unwrap();
    settle().await;
    h.orchestrator.interrupt();
    let events = h.run_to_idle(first).await;
    assert!(events.contains(&RuntimeEvent::Interrupted { turn: first }));

    let second = h.orchestrator.submit_text("second question").unwrap();
    h.run_to_idle(second).await;

    let history = h.orchestrator.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].reply_text, None);
    assert_eq!(history[1].reply_text.as_deref(), Some("second"));
}

#[tokio::test(start_paused = true)]
async fn replies_are_only_displayed_when_auto_speak_is_off() {
    let mut h = HarnessBuilder::new(ScriptedGenerator::replying(&["Quiet answer"]))
        .config(|c| c.conversation.auto_speak = false)
        .build();

    let turn = h.orchestrator.submit_text("psst").unwrap();
    let events = h.run_to_idle(turn).await;

    assert!(events.contains(&RuntimeEvent::Reply {
        turn,
        text: "Quiet answer".into(),
    }));
    assert!(!events.iter().any(|e| matches!(e, RuntimeEvent::SynthesisStarted { .. })));
    assert!(h.playback.plays().is_empty());
    assert_eq!(states(&events), [TurnState::Thinking, TurnState::Idle]);
}

#[tokio::test(start_paused = true)]
async fn generation_failure_apologises() {
    let generator = ScriptedGenerator::new([Step::Fail(GenerationError::MissingCredentials {
        provider: "gemini".into(),
    })]);
    let mut h = HarnessBuilder::new(generator).build();

    let turn = h.orchestrator.submit_text("hello").unwrap();
    let events = h.run_to_idle(turn).await;

    assert!(events.contains(&RuntimeEvent::Apology {
        turn,
        text: "Chinna, something went wrong ra. gemini API key not set".into(),
    }));
    assert!(h.playback.plays().is_empty());
    assert_eq!(
        states(&events),
        [TurnState::Thinking, TurnState::Error, TurnState::Idle]
    );
    assert_eq!(h.orchestrator.history()[0].reply_text, None);
}

#[tokio::test(start_paused = true)]
async fn slow_generation_times_out() {
    let generator = ScriptedGenerator::new([Step::Hang]);
    let mut h = HarnessBuilder::new(generator)
        .config(|c| c.llm.timeout_secs = 5)
        .build();

    let turn = h.orchestrator.submit_text("are you there").unwrap();
    let events = h.run_to_idle(turn).await;

    assert!(events.contains(&RuntimeEvent::GenerationFailed {
        turn,
        error: GenerationError::Timeout { secs: 5 },
    }));
    assert_eq!(h.orchestrator.state(), TurnState::Idle);
}

#[tokio::test(start_paused = true)]
async fn capture_errors_end_the_turn() {
    let generator = ScriptedGenerator::replying(&[]);
    let mut h = HarnessBuilder::new(generator.clone()).build();

    let turn = h.orchestrator.start_capture().unwrap();
    assert!(h.feed.send(CaptureEvent::Error(CaptureError::PermissionDenied)));
    let events = h.run_to_idle(turn).await;

    assert!(events.contains(&RuntimeEvent::CaptureFailed {
        turn,
        error: CaptureError::PermissionDenied,
    }));
    assert_eq!(generator.call_count(), 0);
    assert_eq!(
        states(&events),
        [TurnState::Listening, TurnState::Error, TurnState::Idle]
    );
}

#[tokio::test(start_paused = true)]
async fn releasing_push_to_talk_without_speech_returns_to_idle() {
    let generator = ScriptedGenerator::replying(&[]);
    let mut h = HarnessBuilder::new(generator.clone()).build();

    let turn = h.orchestrator.start_capture().unwrap();
    h.orchestrator.stop_capture();
    let events = h.run_to_idle(turn).await;

    assert!(!h.feed.is_listening());
    assert_eq!(generator.call_count(), 0);
    assert_eq!(states(&events), [TurnState::Listening, TurnState::Idle]);
}

#[tokio::test(start_paused = true)]
async fn provider_change_applies_to_the_next_reply() {
    let eleven = FakeProvider::new(ProviderKind::ElevenLabs, Voice::Audio);
    let mut h = HarnessBuilder::new(ScriptedGenerator::replying(&["one", "two"]))
        .provider(eleven.clone())
        .build();

    let first = h.orchestrator.submit_text("q1").unwrap();
    let events = h.run_to_idle(first).await;
    assert!(events.contains(&RuntimeEvent::SynthesisEnded {
        turn: first,
        provider: ProviderKind::System,
    }));

    h.settings
        .update(|tts| tts.provider = ProviderKind::ElevenLabs);
    let second = h.orchestrator.submit_text("q2").unwrap();
    let events = h.run_to_idle(second).await;
    assert!(events.contains(&RuntimeEvent::SynthesisEnded {
        turn: second,
        provider: ProviderKind::ElevenLabs,
    }));
    assert_eq!(eleven.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_phrase_is_spoken_outside_history() {
    let generator = ScriptedGenerator::replying(&[]);
    let mut h = HarnessBuilder::new(generator.clone()).build();

    let turn = h.orchestrator.speak_test_phrase().unwrap();
    let events = h.run_to_idle(turn).await;

    assert_eq!(states(&events), [TurnState::Speaking, TurnState::Idle]);
    assert_eq!(generator.call_count(), 0);
    assert!(h.orchestrator.history().is_empty());
    assert_eq!(
        h.playback.plays(),
        [AudioHandle::Url(format!(
            "mem://system/{}",
            TEST_PHRASE.chars().count()
        ))]
    );
}

#[tokio::test(start_paused = true)]
async fn clearing_history_forgets_context() {
    let generator = ScriptedGenerator::replying(&["a1", "a2"]);
    let mut h = HarnessBuilder::new(generator.clone())
        .config(|c| c.conversation.auto_speak = false)
        .build();

    let turn = h.orchestrator.submit_text("q1").unwrap();
    h.run_to_idle(turn).await;
    h.orchestrator.clear_history();
    assert_eq!(h.events.recv().await.unwrap(), RuntimeEvent::HistoryCleared);

    let turn = h.orchestrator.submit_text("q2").unwrap();
    h.run_to_idle(turn).await;
    let (context, _) = generator.calls().pop().unwrap();
    assert!(context.is_empty());
}

#[tokio::test(start_paused = true)]
async fn silent_capture_times_out() {
    let generator = ScriptedGenerator::replying(&["later"]);
    let mut h = HarnessBuilder::new(generator.clone())
        .config(|c| c.capture.timeout_secs = 10)
        .build();

    let start = tokio::time::Instant::now();
    let turn = h.orchestrator.start_capture().unwrap();
    assert!(h.feed.send(CaptureEvent::Interim("umm".into())));
    let events = h.run_to_idle(turn).await;

    assert_eq!(start.elapsed(), Duration::from_secs(10));
    assert!(events.contains(&RuntimeEvent::CaptureFailed {
        turn,
        error: CaptureError::Timeout { secs: 10 },
    }));
    assert_eq!(
        states(&events),
        [TurnState::Listening, TurnState::Error, TurnState::Idle]
    );
    assert!(!h.feed.is_listening());
    assert_eq!(generator.call_count(), 0);
    assert!(h.orchestrator.submit_text("still there?").is_ok());
}

#[tokio::test(start_paused = true)]
async fn amplitude_animation_follows_playback_levels() {
    let mut h = HarnessBuilder::new(ScriptedGenerator::replying(&["Vinara, ippudu cheptha"]))
        .config(|c| c.animation.mode = AnimationMode::Amplitude)
        .playback(Duration::from_secs(2))
        .build();

    let shown = Arc::new(Mutex::new(Vec::new()));
    let mut frames = h.orchestrator.animator().subscribe();
    let recorder = {
        let shown = Arc::clone(&shown);
        tokio::spawn(async move {
            while frames.changed().await.is_ok() {
                let expression = *frames.borrow_and_update();
                let mut shown = shown.lock().unwrap();
                if shown.last() != Some(&expression) {
                    shown.push(expression);
                }
            }
        })
    };

    let turn = h.orchestrator.submit_text("go on").unwrap();
    let mut before_playback = Vec::new();
    loop {
        let event = h.events.recv().await.unwrap();
        if matches!(event, RuntimeEvent::PlaybackStarted { .. }) {
            break;
        }
        before_playback.push(h.orchestrator.animator().current());
    }
    assert!(before_playback.iter().all(|e| *e == Expression::Neutral));

    let events = h.run_to_idle(turn).await;
    recorder.abort();

    let at = |pred: &dyn Fn(&RuntimeEvent) -> bool| position(&events, pred).unwrap();
    let anim_started = at(&|e| matches!(e, RuntimeEvent::AnimationStarted { .. }));
    let synth_ended = at(&|e| matches!(e, RuntimeEvent::SynthesisEnded { .. }));
    let anim_stopped = at(&|e| matches!(e, RuntimeEvent::AnimationStopped { .. }));
    assert!(anim_started < synth_ended);
    assert!(synth_ended < anim_stopped);

    // Level 0.5 is above the top threshold: mouth fully open, then back to neutral.
    let shown: Vec<_> = shown
        .lock()
        .unwrap()
        .iter()
        .copied()
        .skip_while(|e| *e == Expression::Neutral)
        .collect();
    assert_eq!(shown, [Expression::MouthOpen, Expression::Neutral]);

    settle().await;
    assert_eq!(h.orchestrator.animator().current(), Expression::Neutral);
    assert!(!h.orchestrator.animator().is_running());
}
