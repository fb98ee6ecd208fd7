use std::sync::{Arc, Mutex};

use emuhost_engine::demo::{DemoEngine, EXIT_FRAME_LIMIT, EXIT_USAGE};
use emuhost_engine::{Engine, Guest, Machine, OutputChannel, OutputSink, ScriptResult};
use pretty_assertions::assert_eq;

type Lines = Arc<Mutex<Vec<(OutputChannel, Vec<u8>)>>>;

/// Runs the engine synchronously, recording what it reports at each yield point.
#[derive(Default)]
struct Recorder {
    lines: Lines,
    boots: u32,
    frames: Vec<u8>,
    polls: Mutex<u32>,
    script_at_boot: Option<&'static str>,
    script_results: Vec<ScriptResult>,
}

impl Guest for Recorder {
    fn boot(&mut self, machine: &mut (dyn Machine + 'static)) {
        self.boots += 1;
        if let Some(code) = self.script_at_boot {
            let result = machine.script_host().execute("=test", code).unwrap();
            self.script_results.push(result);
        }
    }

    fn frame(&mut self, machine: &mut (dyn Machine + 'static)) {
        let ram = machine.address_space(":maincpu").unwrap();
        self.frames.push(ram.read_byte(0));
    }

    fn output(&self) -> OutputSink {
        let lines = self.lines.clone();
        OutputSink::new(move |channel, bytes| lines.lock().unwrap().push((channel, bytes.to_vec())))
    }

    fn base_time(&self) -> i64 {
        86_400
    }

    fn input_polled(&self) {
        *self.polls.lock().unwrap() += 1;
    }

    fn sound_ready(&self) {}
}

fn args(list: &[&str]) -> Vec<String> {
    std::iter::once("emuhost")
        .chain(list.iter().copied())
        .map(str::to_string)
        .collect()
}

#[test]
fn frame_limit_ends_the_run() {
    let mut guest = Recorder::default();
    let code = Box::new(DemoEngine::new())
        .run(args(&["-frames", "4", "-poll-every", "2"]), &mut guest);

    assert_eq!(code, EXIT_FRAME_LIMIT);
    assert_eq!(guest.boots, 1);
    assert_eq!(guest.frames, vec![1, 2, 3, 4]);
    assert_eq!(*guest.polls.lock().unwrap(), 2);
}

#[test]
fn bad_arguments_are_reported_on_error_channel() {
    let mut guest = Recorder::default();
    let code = Box::new(DemoEngine::new()).run(args(&["-bogus"]), &mut guest);

    assert_eq!(code, EXIT_USAGE);
    assert_eq!(guest.boots, 0);
    let lines = guest.lines.lock().unwrap();
    assert_eq!(lines[0].0, OutputChannel::Error);
    assert_eq!(lines[0].1, b"unknown option -bogus\n".to_vec());
}

#[test]
fn fail_init_returns_before_boot() {
    let mut guest = Recorder::default();
    let code = Box::new(DemoEngine::new()).run(args(&["-fail-init", "9"]), &mut guest);
    assert_eq!(code, 9);
    assert_eq!(guest.boots, 0);
}

#[test]
fn scripts_run_against_booted_machine() {
    let mut guest = Recorder {
        script_at_boot: Some("print('hi\\0there') return frame"),
        ..Recorder::default()
    };
    Box::new(DemoEngine::new()).run(args(&["-frames", "0"]), &mut guest);

    // `frame` is only published once the first frame ran.
    assert_eq!(guest.script_results, vec![ScriptResult::Nothing]);
    let lines = guest.lines.lock().unwrap();
    assert!(lines.contains(&(OutputChannel::Info, b"hi\0there\n".to_vec())));
}
