use std::io::{self, Read, Write};

use crate::engine::Guest;
use crate::lua::LuaScriptHost;
use crate::machine::{AddressSpace, BiosSelection, DeviceInfo, Machine, Nvram, VideoFrame};
use crate::output::OutputSink;
use crate::script::ScriptHost;

use super::DemoOptions;

pub const DEFAULT_BIOS: u32 = 1;

pub const SAMPLE_FRAMES_PER_FRAME: usize = 800;
pub const SCREEN_WIDTH: u32 = 64;
pub const SCREEN_HEIGHT: u32 = 48;

pub const RAM_SIZE: usize = 0x8000;
pub const NVRAM_BASE: u32 = 0x8000;
pub const SRAM_BASE: u32 = 0x9000;
pub const RTC_BASE: u32 = 0xA000;
pub const NVRAM_SIZE: usize = 0x100;

const OPEN_BUS: u8 = 0xFF;

/// Plain battery-backed RAM.
#[derive(Clone, Debug)]
pub struct BackedRam {
    data: Vec<u8>,
    fill: u8,
}

impl BackedRam {
    fn new(fill: u8) -> Self {
        Self {
            data: vec![fill; NVRAM_SIZE],
            fill,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Nvram for BackedRam {
    fn save(&mut self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(&self.data)
    }

    fn load(&mut self, input: &mut dyn Read) -> io::Result<()> {
        input.read_exact(&mut self.data)
    }

    fn reset(&mut self) {
        self.data.fill(self.fill);
    }
}

/// Real-time clock seeded from the host's base time. Its saved epoch is never restored.
#[derive(Clone, Debug)]
pub struct RtcClock {
    base_time: i64,
    epoch: i64,
}

impl RtcClock {
    fn new(base_time: i64) -> Self {
        Self {
            base_time,
            epoch: base_time,
        }
    }

    pub fn epoch(&self) -> i64 {
        self.epoch
    }
}

impl Nvram for RtcClock {
    fn backup_enabled(&self) -> bool {
        false
    }

    fn save(&mut self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(&self.epoch.to_le_bytes())
    }

    fn load(&mut self, input: &mut dyn Read) -> io::Result<()> {
        let mut buf = [0u8; 8];
        input.read_exact(&mut buf)?;
        self.epoch = i64::from_le_bytes(buf);
        Ok(())
    }

    fn reset(&mut self) {
        self.epoch = self.base_time;
    }
}

/// Program space of `:maincpu`.
///
/// | range           | contents                          |
/// |-----------------|-----------------------------------|
/// | `0x0000-0x7FFF` | work RAM, frame counter (u64 LE) at 0 |
/// | `0x8000-0x80FF` | `:nvram`                          |
/// | `0x9000-0x90FF` | `:cart:sram` (open bus without a cart) |
/// | `0xA000-0xA007` | `:rtc` epoch (i64 LE)             |
#[derive(Clone, Debug)]
pub struct MainBus {
    ram: Vec<u8>,
    nvram: BackedRam,
    sram: Option<BackedRam>,
    rtc: RtcClock,
}

fn window(base: u32, len: usize, address: u32) -> Option<usize> {
    let offset = address.checked_sub(base)? as usize;
    (offset < len).then_some(offset)
}

impl AddressSpace for MainBus {
    fn read_byte(&mut self, address: u32) -> u8 {
        if let Some(offset) = window(0, RAM_SIZE, address) {
            return self.ram[offset];
        }
        if let Some(offset) = window(NVRAM_BASE, NVRAM_SIZE, address) {
            return self.nvram.data[offset];
        }
        if let Some(offset) = window(SRAM_BASE, NVRAM_SIZE, address) {
            return self.sram.as_ref().map_or(OPEN_BUS, |sram| sram.data[offset]);
        }
        if let Some(offset) = window(RTC_BASE, 8, address) {
            return self.rtc.epoch.to_le_bytes()[offset];
        }
        OPEN_BUS
    }
}

pub struct DemoMachine {
    system: String,
    cart: Option<String>,
    bios: BiosSelection,
    poll_every: u64,
    frame: u64,
    bus: MainBus,
    audio: Vec<i16>,
    video: Vec<u32>,
    lua: LuaScriptHost,
}

impl DemoMachine {
    pub fn new(options: &DemoOptions, base_time: i64, output: OutputSink) -> mlua::Result<Self> {
        let bus = MainBus {
            ram: vec![0; RAM_SIZE],
            nvram: BackedRam::new(0x00),
            sram: options.cart.as_ref().map(|_| BackedRam::new(0xFF)),
            rtc: RtcClock::new(base_time),
        };

        Ok(Self {
            system: options.system.clone(),
            cart: options.cart.clone(),
            bios: BiosSelection {
                selected: options.bios,
                default: DEFAULT_BIOS,
            },
            poll_every: options.poll_every,
            frame: 0,
            bus,
            audio: vec![0; SAMPLE_FRAMES_PER_FRAME * 2],
            video: vec![0; (SCREEN_WIDTH * SCREEN_HEIGHT) as usize],
            lua: LuaScriptHost::new(output)?,
        })
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn bus(&self) -> &MainBus {
        &self.bus
    }

    /// Emulates one frame: memory updates, input, audio and video.
    pub fn run_frame(&mut self, guest: &dyn Guest) {
        self.frame += 1;
        let frame = self.frame;

        self.bus.ram[..8].copy_from_slice(&frame.to_le_bytes());
        // Play-time counter survives power cycles through :nvram.
        let played = u32::from_le_bytes([
            self.bus.nvram.data[4],
            self.bus.nvram.data[5],
            self.bus.nvram.data[6],
            self.bus.nvram.data[7],
        ])
        .wrapping_add(1);
        self.bus.nvram.data[4..8].copy_from_slice(&played.to_le_bytes());
        if let Some(sram) = self.bus.sram.as_mut() {
            sram.data[(frame % NVRAM_SIZE as u64) as usize] = frame as u8;
        }

        if self.poll_every != 0 && frame % self.poll_every == 0 {
            guest.input_polled();
        }

        self.render_audio();
        guest.sound_ready();
        self.render_video();
        self.lua.set_frame(frame);
    }

    fn render_audio(&mut self) {
        let start = self.frame * SAMPLE_FRAMES_PER_FRAME as u64;
        for (i, pair) in self.audio.chunks_exact_mut(2).enumerate() {
            let level = if (start + i as u64) / 50 % 2 == 0 { 4000 } else { -4000 };
            pair[0] = level;
            pair[1] = -level;
        }
    }

    fn render_video(&mut self) {
        let shade = (self.frame & 0xFF) as u32;
        for y in 0..SCREEN_HEIGHT {
            for x in 0..SCREEN_WIDTH {
                self.video[(y * SCREEN_WIDTH + x) as usize] =
                    0xFF00_0000 | ((x * 4) << 16) | ((y * 5) << 8) | shade;
            }
        }
    }
}

impl Machine for DemoMachine {
    fn device(&self, tag: &str) -> Option<DeviceInfo> {
        let info = match tag {
            ":" => DeviceInfo::new(":", None),
            ":maincpu" | ":nvram" | ":rtc" => DeviceInfo::new(tag, Some(":")),
            ":cart" => {
                let info = DeviceInfo::new(tag, Some(":"));
                match &self.cart {
                    Some(name) => info.with_software(name.clone()),
                    None => info,
                }
            }
            ":cart:sram" if self.cart.is_some() => DeviceInfo::new(tag, Some(":cart")),
            _ => return None,
        };
        Some(info)
    }

    fn address_space(&mut self, tag: &str) -> Option<&mut dyn AddressSpace> {
        match tag {
            ":maincpu" => Some(&mut self.bus),
            _ => None,
        }
    }

    fn bios(&self) -> BiosSelection {
        self.bios
    }

    fn nvram_tags(&self) -> Vec<String> {
        let mut tags = vec![":nvram".to_string(), ":rtc".to_string()];
        if self.bus.sram.is_some() {
            tags.push(":cart:sram".to_string());
        }
        tags
    }

    fn nvram(&mut self, tag: &str) -> Option<&mut dyn Nvram> {
        match tag {
            ":nvram" => Some(&mut self.bus.nvram),
            ":rtc" => Some(&mut self.bus.rtc),
            ":cart:sram" => self.bus.sram.as_mut().map(|sram| sram as &mut dyn Nvram),
            _ => None,
        }
    }

    fn audio_samples(&self) -> &[i16] {
        &self.audio
    }

    fn video_frame(&self) -> VideoFrame<'_> {
        VideoFrame {
            width: SCREEN_WIDTH,
            height: SCREEN_HEIGHT,
            pixels: &self.video,
        }
    }

    fn script_host(&mut self) -> &mut dyn ScriptHost {
        &mut self.lua
    }
}
