use std::io::{self, Read, Write};

use crate::script::ScriptHost;

/// A byte-addressable memory space of a device.
pub trait AddressSpace {
    /// Reads one byte. Unmapped addresses read as open bus, whatever the device defines that as.
    fn read_byte(&mut self, address: u32) -> u8;
}

/// Identity of a device in the machine's device tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Absolute tag path, e.g. `:cart:sram`.
    pub tag: String,
    /// Tag of the owning device; `None` for the root.
    pub owner: Option<String>,
    /// Name of the software image mounted in this device, if it is an image device.
    pub software: Option<String>,
}

impl DeviceInfo {
    pub fn new(tag: impl Into<String>, owner: Option<&str>) -> Self {
        Self {
            tag: tag.into(),
            owner: owner.map(str::to_owned),
            software: None,
        }
    }

    pub fn with_software(mut self, software: impl Into<String>) -> Self {
        self.software = Some(software.into());
        self
    }
}

/// Active and default BIOS selection of the running system.
///
/// Selections are 1-based; `0` means "unspecified".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BiosSelection {
    pub selected: u32,
    pub default: u32,
}

/// Battery-backed storage owned by a device.
pub trait Nvram {
    /// Whether the device currently holds state worth saving.
    fn can_save(&self) -> bool {
        true
    }

    /// Whether saved state should be restored on load. When `false` the device is reset instead.
    fn backup_enabled(&self) -> bool {
        true
    }

    fn save(&mut self, out: &mut dyn Write) -> io::Result<()>;

    fn load(&mut self, input: &mut dyn Read) -> io::Result<()>;

    /// Restores power-on defaults.
    fn reset(&mut self);
}

/// The most recently rendered frame, 32-bit ARGB, row-major.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u32],
}

/// The running machine as seen from the host while the engine is suspended.
pub trait Machine {
    fn device(&self, tag: &str) -> Option<DeviceInfo>;

    /// Program address space of the device at `tag`, if it has one.
    fn address_space(&mut self, tag: &str) -> Option<&mut dyn AddressSpace>;

    fn bios(&self) -> BiosSelection;

    /// Tags of every device implementing [`Nvram`], in device-tree order.
    fn nvram_tags(&self) -> Vec<String>;

    fn nvram(&mut self, tag: &str) -> Option<&mut dyn Nvram>;

    /// Latest audio frame, interleaved stereo (left, right, left, ...).
    fn audio_samples(&self) -> &[i16];

    fn video_frame(&self) -> VideoFrame<'_>;

    fn script_host(&mut self) -> &mut dyn ScriptHost;
}
