#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::Parser;
use emuhost_bridge::{Bridge, BridgeConfig};
use emuhost_engine::demo::DemoEngine;
use emuhost_engine::ScriptResult;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "emuhost",
    version,
    about = "Drive the demo engine frame by frame through the host bridge"
)]
struct Args {
    /// Number of frames to run after boot.
    #[arg(long, default_value_t = 60)]
    frames: u64,

    /// Directory holding persistent device state.
    ///
    /// Environment variable: `EMUHOST_NVRAM_DIR`.
    #[arg(long, env = "EMUHOST_NVRAM_DIR", default_value = "nvram")]
    nvram_dir: PathBuf,

    /// Restore NVRAM right after boot.
    #[arg(long)]
    load_nvram: bool,

    /// Save NVRAM after the last frame.
    #[arg(long)]
    save_nvram: bool,

    /// Guest stack size in bytes.
    ///
    /// Environment variable: `EMUHOST_STACK_SIZE`.
    #[arg(long, env = "EMUHOST_STACK_SIZE")]
    stack_size: Option<usize>,

    /// Device whose program space `--peek` reads.
    ///
    /// Environment variable: `EMUHOST_MAIN_CPU`.
    #[arg(long, env = "EMUHOST_MAIN_CPU", default_value = ":maincpu")]
    main_cpu: String,

    /// Seconds since the Unix epoch handed to the engine clock (defaults to now).
    #[arg(long)]
    base_time: Option<i64>,

    /// Lua chunk to evaluate after the last frame; may be repeated.
    #[arg(long = "eval", value_name = "CODE")]
    evals: Vec<String>,

    /// Main CPU address (hex) to print after the last frame; may be repeated.
    #[arg(long = "peek", value_name = "ADDR", value_parser = parse_hex)]
    peeks: Vec<u32>,

    /// Log filter (tracing-subscriber EnvFilter syntax).
    ///
    /// Environment variable: `EMUHOST_LOG`.
    #[arg(long, env = "EMUHOST_LOG", default_value = "info")]
    log_level: String,

    /// Arguments passed to the engine after `--`.
    #[arg(last = true)]
    engine_args: Vec<String>,
}

fn parse_hex(raw: &str) -> Result<u32, String> {
    let digits = raw.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|err| format!("invalid address {raw:?}: {err}"))
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

fn describe(result: &ScriptResult) -> String {
    match result {
        ScriptResult::Nothing => "nil".to_string(),
        ScriptResult::Integer(i) => i.to_string(),
        ScriptResult::Real(r) => r.to_string(),
        ScriptResult::Boolean(b) => b.to_string(),
        ScriptResult::Text(bytes) => format!("{:?}", String::from_utf8_lossy(bytes)),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = BridgeConfig {
        nvram_dir: args.nvram_dir.clone(),
        main_cpu: args.main_cpu.clone(),
        ..BridgeConfig::default()
    };
    if let Some(stack_size) = args.stack_size {
        config.guest_stack_size = stack_size;
    }

    let mut bridge = Bridge::with_config(DemoEngine::new(), config);
    let base_time = args.base_time.unwrap_or_else(now);
    bridge.set_base_time_provider(move || base_time);

    let engine_args =
        std::iter::once("emuhost".to_string()).chain(args.engine_args.iter().cloned());
    let code = bridge.launch(engine_args);
    if code != 0 {
        bail!("engine exited during startup with code {code}");
    }

    if args.load_nvram {
        let report = bridge.load_persistent_state();
        tracing::info!(
            restored = report.completed.len(),
            reset = report.reset.len(),
            failed = report.failed.len(),
            "loaded nvram"
        );
    }

    let mut lagged = 0u64;
    let mut ran = 0u64;
    for _ in 0..args.frames {
        let lag = bridge.resume();
        if let Some(code) = bridge.exit_code() {
            tracing::warn!(exit_code = code, "engine stopped");
            break;
        }
        ran += 1;
        lagged += u64::from(lag);
    }
    println!("frames={ran} lagged={lagged}");

    for address in &args.peeks {
        println!("{address:#06x} = {:#04x}", bridge.read_byte(*address));
    }
    for code in &args.evals {
        let result = bridge.run_script(code);
        println!("{code} = {}", describe(&result));
    }

    if args.save_nvram {
        let report = bridge.save_persistent_state();
        if !report.is_clean() {
            let first = report
                .failed
                .first()
                .map(ToString::to_string)
                .unwrap_or_default();
            return Err(anyhow::anyhow!(first))
                .with_context(|| format!("failed to save {} nvram file(s)", report.failed.len()));
        }
        for key in &report.completed {
            println!("saved {}", args.nvram_dir.join(key).display());
        }
    }

    if let Some(code) = bridge.exit_code() {
        bail!("engine exited with code {code}");
    }
    Ok(())
}
