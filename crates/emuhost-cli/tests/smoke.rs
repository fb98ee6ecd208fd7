use std::process::{Command, Output};

fn emuhost(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_emuhost"))
        .args(args)
        .env_remove("EMUHOST_NVRAM_DIR")
        .env_remove("EMUHOST_STACK_SIZE")
        .env_remove("EMUHOST_MAIN_CPU")
        .env("EMUHOST_LOG", "warn")
        .output()
        .expect("failed to run emuhost")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn runs_frames_and_evaluates_scripts() {
    let output = emuhost(&[
        "--frames",
        "5",
        "--eval",
        "return frame",
        "--peek",
        "0x0000",
        "--",
        "-poll-every",
        "5",
    ]);
    assert!(output.status.success(), "{output:?}");

    let out = stdout(&output);
    assert!(out.contains("frames=5 lagged=4"), "{out}");
    assert!(out.contains("0x0000 = 0x05"), "{out}");
    assert!(out.contains("return frame = 5"), "{out}");
}

#[test]
fn saves_and_restores_nvram() {
    let dir = tempfile::tempdir().unwrap();
    let nvram_dir = dir.path().to_str().unwrap();

    let output = emuhost(&[
        "--frames", "3", "--save-nvram", "--nvram-dir", nvram_dir, "--", "-cart", "tetris",
    ]);
    assert!(output.status.success(), "{output:?}");
    assert!(dir.path().join("tetris").join("cart_sram").is_file());
    assert!(dir.path().join("nvram").is_file());

    // The play-time counter at 0x8004 keeps counting across runs.
    let output = emuhost(&[
        "--frames", "2", "--load-nvram", "--nvram-dir", nvram_dir, "--peek", "8004", "--",
        "-cart", "tetris",
    ]);
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("0x8004 = 0x05"), "{}", stdout(&output));
}

#[test]
fn startup_failure_is_an_error() {
    let output = emuhost(&["--", "-fail-init", "7"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("code 7"), "{stderr}");
}
