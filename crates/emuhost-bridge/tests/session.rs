use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use emuhost_bridge::{Bridge, BridgeConfig, EXIT_GUEST_PANICKED, EXIT_RETURNED_ZERO};
use emuhost_engine::demo::{DemoEngine, EXIT_FRAME_LIMIT, SAMPLE_FRAMES_PER_FRAME};
use emuhost_engine::{OutputChannel, ScriptResult};
use pretty_assertions::assert_eq;

type Lines = Arc<Mutex<Vec<(OutputChannel, Vec<u8>)>>>;

fn bridge_with_sink() -> (Bridge, Lines) {
    let bridge = Bridge::new(DemoEngine::new());
    let lines: Lines = Arc::default();
    let sink = lines.clone();
    bridge.set_log_sink(move |channel, payload| {
        sink.lock().unwrap().push((channel, payload.to_vec()))
    });
    (bridge, lines)
}

fn errors(lines: &Lines) -> Vec<String> {
    lines
        .lock()
        .unwrap()
        .iter()
        .filter(|(channel, _)| *channel == OutputChannel::Error)
        .map(|(_, payload)| String::from_utf8_lossy(payload).into_owned())
        .collect()
}

#[test]
fn resume_advances_exactly_one_frame() {
    let (mut bridge, _) = bridge_with_sink();
    assert_eq!(bridge.launch(["emuhost"]), 0);
    assert_eq!(bridge.read_byte(0), 0);

    for n in 1..=40u32 {
        bridge.resume();
        assert_eq!(bridge.read_byte(0), n as u8);
        assert_eq!(bridge.get_script_long("return frame"), i64::from(n));
    }
}

#[test]
fn accessors_do_not_advance_the_guest() {
    let (mut bridge, _) = bridge_with_sink();
    bridge.launch(["emuhost"]);
    bridge.resume();
    for _ in 0..5 {
        bridge.get_script_int("return frame");
        bridge.video_dimensions();
        bridge.enumerate_persistent_filenames(|_| {});
    }
    assert_eq!(bridge.read_byte(0), 1);
}

#[test]
fn early_exit_is_reported_and_sticky() {
    let (mut bridge, lines) = bridge_with_sink();
    assert_eq!(bridge.launch(["emuhost", "-fail-init", "5"]), 5);
    assert_eq!(bridge.exit_code(), Some(5));

    for _ in 0..3 {
        bridge.resume();
        assert_eq!(bridge.exit_code(), Some(5));
    }
    assert_eq!(bridge.read_byte(0), 0);

    let errors = errors(&lines);
    assert!(errors.iter().any(|e| e.contains("exit code 5")), "{errors:?}");
    assert!(errors.iter().any(|e| e.contains("not suspended")), "{errors:?}");
}

#[test]
fn zero_exit_code_is_remapped() {
    let (mut bridge, _) = bridge_with_sink();
    assert_eq!(bridge.launch(["emuhost", "-fail-init", "0"]), EXIT_RETURNED_ZERO);
}

#[test]
fn engine_panic_is_contained() {
    let (mut bridge, _) = bridge_with_sink();
    assert_eq!(bridge.launch(["emuhost", "-panic-init"]), EXIT_GUEST_PANICKED);
    assert!(bridge.resume());
}

#[test]
fn frame_limit_terminates_after_last_frame() {
    let (mut bridge, _) = bridge_with_sink();
    assert_eq!(bridge.launch(["emuhost", "-frames", "2"]), 0);
    bridge.resume();
    bridge.resume();
    assert_eq!(bridge.exit_code(), None);
    bridge.resume();
    assert_eq!(bridge.exit_code(), Some(EXIT_FRAME_LIMIT));
}

#[test]
fn termination_during_resume_is_reported_once() {
    let (mut bridge, lines) = bridge_with_sink();
    assert_eq!(bridge.launch(["emuhost", "-frames", "1"]), 0);
    assert!(!bridge.resume());
    assert_eq!(bridge.exit_code(), None);
    assert!(errors(&lines).is_empty());

    for _ in 0..3 {
        assert!(bridge.resume());
        assert_eq!(bridge.exit_code(), Some(EXIT_FRAME_LIMIT));
    }
    assert_eq!(
        errors(&lines),
        vec![format!(
            "[emuhost] guest terminated abnormally with exit code {EXIT_FRAME_LIMIT}\n"
        )]
    );
}

#[test]
fn callbacks_run_on_the_guest_thread() {
    let (mut bridge, _) = bridge_with_sink();
    let polled_on: Arc<Mutex<Vec<thread::ThreadId>>> = Arc::default();
    let record = polled_on.clone();
    bridge.set_input_poll_notifier(move || record.lock().unwrap().push(thread::current().id()));

    bridge.launch(["emuhost"]);
    bridge.resume();
    bridge.resume();

    let host = thread::current().id();
    let polled_on = polled_on.lock().unwrap();
    assert_eq!(polled_on.len(), 2);
    assert!(polled_on.iter().all(|id| *id != host));
    assert_eq!(polled_on[0], polled_on[1]);
}

#[test]
fn typed_script_accessors() {
    let (mut bridge, lines) = bridge_with_sink();
    bridge.launch(["emuhost"]);

    assert_eq!(bridge.get_script_int("return 5"), 5);
    assert_eq!(bridge.get_script_long("return 1 << 40"), 1 << 40);
    assert_eq!(bridge.get_script_double("return 0.5"), 0.5);
    assert_eq!(bridge.get_script_double("return 3"), 3.0);
    assert_eq!(bridge.get_script_int("return 7.9"), 7);
    assert!(bridge.get_script_bool("return 1 < 2"));
    assert!(errors(&lines).is_empty());

    assert_eq!(bridge.get_script_int("return 'x'"), 0);
    assert_eq!(
        errors(&lines),
        vec!["[emuhost] return type mismatch: expected integer, got text\n"]
    );
}

#[test]
fn script_failures_yield_defaults() {
    let (mut bridge, lines) = bridge_with_sink();
    bridge.launch(["emuhost"]);

    assert_eq!(bridge.run_script("this is not lua"), ScriptResult::Nothing);
    assert!(!bridge.get_script_bool("error('nope')"));
    assert_eq!(bridge.get_script_double("return {}"), 0.0);

    let errors = errors(&lines);
    assert_eq!(errors.len(), 3);
    assert!(errors[0].contains("compile error"));
    assert!(errors[1].contains("runtime error") && errors[1].contains("nope"));
    assert!(errors[2].contains("unsupported result type: table"));
}

#[test]
fn string_buffers_are_owned_until_released() {
    let (mut bridge, lines) = bridge_with_sink();
    bridge.launch(["emuhost"]);

    let handle = bridge.get_script_string("return 'ab\\0cd'").unwrap();
    assert_eq!(bridge.buffer(handle), Some(&b"ab\0cd"[..]));
    assert_eq!(bridge.live_buffers(), 1);

    assert!(bridge.release_string(handle));
    assert!(!bridge.release_string(handle));
    assert_eq!(bridge.live_buffers(), 0);
    assert!(errors(&lines)[0].contains("no matching handle"));

    assert_eq!(bridge.get_script_string("return ''"), None);
    assert_eq!(bridge.get_script_string("return 1"), None);
    assert_eq!(bridge.live_buffers(), 0);
}

#[test]
fn log_sink_preserves_embedded_zeros() {
    let (mut bridge, lines) = bridge_with_sink();
    bridge.launch(["emuhost"]);
    bridge.run_script("print('x\\0y\\0')");

    let lines = lines.lock().unwrap();
    let printed = lines
        .iter()
        .find(|(channel, _)| *channel == OutputChannel::Info)
        .unwrap();
    assert_eq!(printed.1, b"x\0y\0\n".to_vec());
    assert_eq!(printed.1.len(), 5);
}

#[test]
fn lag_flag_follows_input_polls() {
    let (mut bridge, _) = bridge_with_sink();
    let polls = Arc::new(AtomicUsize::new(0));
    let counter = polls.clone();
    bridge.set_input_poll_notifier(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    bridge.launch(["emuhost", "-poll-every", "2"]);
    let lag: Vec<bool> = (0..6).map(|_| bridge.resume()).collect();
    assert_eq!(lag, vec![true, false, true, false, true, false]);
    assert_eq!(polls.load(Ordering::SeqCst), 3);
}

#[test]
fn base_time_is_injectable() {
    let (mut bridge, _) = bridge_with_sink();
    bridge.set_base_time_provider(|| 0x0102_0304);
    bridge.launch(["emuhost"]);
    let epoch: Vec<u8> = (0..8).map(|i| bridge.read_byte(0xA000 + i)).collect();
    assert_eq!(epoch, 0x0102_0304i64.to_le_bytes().to_vec());

    let (mut unset, _) = bridge_with_sink();
    unset.launch(["emuhost"]);
    assert_eq!(unset.read_byte(0xA000), 0);
}

#[test]
fn media_extraction() {
    let (mut bridge, _) = bridge_with_sink();
    let sounds = Arc::new(AtomicUsize::new(0));
    let counter = sounds.clone();
    bridge.set_sound_notifier(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    bridge.launch(["emuhost"]);
    bridge.resume();
    assert_eq!(sounds.load(Ordering::SeqCst), 1);

    let mut samples = vec![0i16; SAMPLE_FRAMES_PER_FRAME * 2];
    assert_eq!(bridge.get_samples(&mut samples), SAMPLE_FRAMES_PER_FRAME);
    assert_eq!(samples[0], -samples[1]);

    assert_eq!(bridge.video_dimensions(), (64, 48));
    let mut pixels = vec![0u32; 64 * 48];
    assert_eq!(bridge.get_pixels(&mut pixels), 64 * 48);
    assert_eq!(pixels[0], 0xFF00_0001);
}

#[test]
fn custom_main_cpu_that_does_not_exist() {
    let config = BridgeConfig {
        main_cpu: ":audiocpu".to_string(),
        ..BridgeConfig::default()
    };
    let mut bridge = Bridge::with_config(DemoEngine::new(), config);
    let lines: Lines = Arc::default();
    let sink = lines.clone();
    bridge.set_log_sink(move |channel, payload| {
        sink.lock().unwrap().push((channel, payload.to_vec()))
    });

    bridge.launch(["emuhost"]);
    assert_eq!(bridge.read_byte(0), 0);
    assert_eq!(errors(&lines), vec!["[emuhost] no device at :audiocpu\n"]);
}

#[test]
fn dropping_a_suspended_session_is_clean() {
    for _ in 0..4 {
        let (mut bridge, _) = bridge_with_sink();
        bridge.launch(["emuhost", "-cart", "tetris"]);
        bridge.resume();
        drop(bridge);
    }
}
