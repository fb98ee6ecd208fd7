//! A small deterministic engine for exercising a host without a real emulator.
//!
//! Arguments follow the usual emulator command line: `argv[0]`, an optional system name, then
//! flags.
//!
//! | flag               | effect                                                    |
//! |--------------------|-----------------------------------------------------------|
//! | `-bios N`          | select BIOS `N` (1-based, `0` = unspecified; default is 1) |
//! | `-cart NAME`       | mount software `NAME` in `:cart`, adds `:cart:sram`        |
//! | `-frames N`        | return [`EXIT_FRAME_LIMIT`] after `N` frames                |
//! | `-fail-init CODE`  | return `CODE` before booting                              |
//! | `-poll-every N`    | sample input every `N` frames (`0` = never; default 1)    |
//! | `-panic-init`      | panic before booting                                      |

mod machine;

pub use self::machine::{
    BackedRam, DemoMachine, MainBus, RtcClock, DEFAULT_BIOS, NVRAM_BASE, NVRAM_SIZE, RAM_SIZE,
    RTC_BASE, SAMPLE_FRAMES_PER_FRAME, SCREEN_HEIGHT, SCREEN_WIDTH, SRAM_BASE,
};

use crate::engine::{Engine, Guest};
use crate::output::OutputChannel;

/// Exit code for an unusable command line.
pub const EXIT_USAGE: i32 = 2;
/// Exit code once the `-frames` limit is reached.
pub const EXIT_FRAME_LIMIT: i32 = 3;
/// Exit code when the machine could not be constructed.
pub const EXIT_INIT_FAILED: i32 = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemoOptions {
    pub system: String,
    pub bios: u32,
    pub cart: Option<String>,
    pub frame_limit: Option<u64>,
    pub fail_init: Option<i32>,
    pub poll_every: u64,
    pub panic_init: bool,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            system: "demo".to_string(),
            bios: 0,
            cart: None,
            frame_limit: None,
            fail_init: None,
            poll_every: 1,
            panic_init: false,
        }
    }
}

impl DemoOptions {
    /// Parses the arguments following `argv[0]`.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        fn value<'a>(
            flag: &str,
            iter: &mut impl Iterator<Item = &'a String>,
        ) -> Result<&'a String, String> {
            iter.next().ok_or_else(|| format!("missing value for {flag}"))
        }

        fn number<T: std::str::FromStr>(flag: &str, raw: &str) -> Result<T, String> {
            raw.parse()
                .map_err(|_| format!("invalid value for {flag}: {raw:?}"))
        }

        let mut options = Self::default();
        let mut system = None;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-bios" => options.bios = number("-bios", value("-bios", &mut iter)?)?,
                "-cart" => options.cart = Some(value("-cart", &mut iter)?.clone()),
                "-frames" => {
                    options.frame_limit = Some(number("-frames", value("-frames", &mut iter)?)?)
                }
                "-fail-init" => {
                    options.fail_init = Some(number("-fail-init", value("-fail-init", &mut iter)?)?)
                }
                "-poll-every" => {
                    options.poll_every = number("-poll-every", value("-poll-every", &mut iter)?)?
                }
                "-panic-init" => options.panic_init = true,
                flag if flag.starts_with('-') => return Err(format!("unknown option {flag}")),
                name => {
                    if system.replace(name.to_string()).is_some() {
                        return Err(format!("unexpected argument {name}"));
                    }
                }
            }
        }
        if let Some(system) = system {
            options.system = system;
        }
        Ok(options)
    }
}

/// Engine entry point for the demo machine.
#[derive(Clone, Copy, Debug, Default)]
pub struct DemoEngine;

impl DemoEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for DemoEngine {
    fn run(self: Box<Self>, args: Vec<String>, guest: &mut dyn Guest) -> i32 {
        let output = guest.output();
        let options = match DemoOptions::parse(args.get(1..).unwrap_or_default()) {
            Ok(options) => options,
            Err(msg) => {
                output.error(&format!("{msg}\n"));
                return EXIT_USAGE;
            }
        };

        if options.panic_init {
            panic!("demo engine asked to panic during initialization");
        }
        if let Some(code) = options.fail_init {
            output.error(&format!("initialization failed with code {code}\n"));
            return code;
        }

        let base_time = guest.base_time();
        let mut machine = match DemoMachine::new(&options, base_time, output.clone()) {
            Ok(machine) => machine,
            Err(err) => {
                output.error(&format!("failed to start scripting: {err}\n"));
                return EXIT_INIT_FAILED;
            }
        };
        output.write(
            OutputChannel::Verbose,
            format!(
                "{} booted, bios {}, base time {base_time}\n",
                machine.system(),
                options.bios
            )
            .as_bytes(),
        );

        guest.boot(&mut machine);
        loop {
            if options
                .frame_limit
                .is_some_and(|limit| machine.frame() >= limit)
            {
                output.info(&format!("stopping after {} frames\n", machine.frame()));
                return EXIT_FRAME_LIMIT;
            }
            machine.run_frame(&*guest);
            guest.frame(&mut machine);
        }
    }
}
