//! Copies of the engine's latest audio and video output.

use emuhost_engine::Machine;

/// Owned copy of the latest video frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VideoSnapshot {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

pub(crate) fn snapshot_samples(machine: &dyn Machine) -> Vec<i16> {
    machine.audio_samples().to_vec()
}

pub(crate) fn snapshot_video(machine: &dyn Machine) -> VideoSnapshot {
    let frame = machine.video_frame();
    VideoSnapshot {
        width: frame.width,
        height: frame.height,
        pixels: frame.pixels.to_vec(),
    }
}

/// Copies whole interleaved stereo sample frames into `out`. Returns the number of sample frames
/// written.
pub fn copy_samples(samples: &[i16], out: &mut [i16]) -> usize {
    let frames = samples.len().min(out.len()) / 2;
    out[..frames * 2].copy_from_slice(&samples[..frames * 2]);
    frames
}

/// Copies as many pixels as fit into `out`. Returns the number of pixels written.
pub fn copy_pixels(pixels: &[u32], out: &mut [u32]) -> usize {
    let n = pixels.len().min(out.len());
    out[..n].copy_from_slice(&pixels[..n]);
    n
}
