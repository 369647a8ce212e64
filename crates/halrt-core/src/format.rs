//! Stream formats, value ranges, and channel descriptions.

use std::fmt;

use crate::property::Scope;

/// Four-character format id for linear PCM.
pub const FORMAT_LINEAR_PCM: u32 = u32::from_be_bytes(*b"lpcm");

/// Format flag: samples are IEEE floats.
pub const FORMAT_FLAG_IS_FLOAT: u32 = 1 << 0;
/// Format flag: samples are big-endian.
pub const FORMAT_FLAG_IS_BIG_ENDIAN: u32 = 1 << 1;
/// Format flag: samples are signed integers.
pub const FORMAT_FLAG_IS_SIGNED_INTEGER: u32 = 1 << 2;
/// Format flag: sample bits occupy the whole channel.
pub const FORMAT_FLAG_IS_PACKED: u32 = 1 << 3;

/// Channel label of the first (left) channel.
pub const CHANNEL_LABEL_LEFT: u32 = 1;

/// Direction of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Clients read from the device.
    Input,
    /// Clients write to the device.
    #[default]
    Output,
}

impl Direction {
    /// Property scope matching this direction.
    pub const fn scope(self) -> Scope {
        match self {
            Direction::Input => Scope::Input,
            Direction::Output => Scope::Output,
        }
    }

    /// Wire value of the stream direction property (1 = input).
    pub const fn raw(self) -> u32 {
        match self {
            Direction::Input => 1,
            Direction::Output => 0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Closed range of values, used for sample rates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    /// Lower bound.
    pub minimum: f64,
    /// Upper bound.
    pub maximum: f64,
}

impl ValueRange {
    /// Range covering a single value.
    pub const fn exact(value: f64) -> Self {
        Self {
            minimum: value,
            maximum: value,
        }
    }

    /// Range between two bounds.
    pub const fn new(minimum: f64, maximum: f64) -> Self {
        Self { minimum, maximum }
    }

    /// Whether `value` lies within the range.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.minimum && value <= self.maximum
    }
}

/// Description of a PCM sample layout.
///
/// Equality is field-wise over every field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamFormat {
    /// Frames per second.
    pub sample_rate: f64,
    /// Four-character format id.
    pub format_id: u32,
    /// Format flags (`FORMAT_FLAG_*`).
    pub format_flags: u32,
    /// Bits per sample.
    pub bits_per_channel: u32,
    /// Channels in each frame.
    pub channels_per_frame: u32,
    /// Bytes in each frame.
    pub bytes_per_frame: u32,
    /// Frames in each packet.
    pub frames_per_packet: u32,
    /// Bytes in each packet.
    pub bytes_per_packet: u32,
}

impl Default for StreamFormat {
    /// 44.1 kHz, 16-bit signed integer, stereo, packed.
    fn default() -> Self {
        Self::pcm_i16(44100.0, 2)
    }
}

impl StreamFormat {
    /// Packed signed 16-bit PCM.
    pub fn pcm_i16(sample_rate: f64, channels: u32) -> Self {
        Self::packed(
            sample_rate,
            FORMAT_FLAG_IS_SIGNED_INTEGER | FORMAT_FLAG_IS_PACKED,
            16,
            channels,
        )
    }

    /// Packed 32-bit float PCM.
    pub fn pcm_f32(sample_rate: f64, channels: u32) -> Self {
        Self::packed(
            sample_rate,
            FORMAT_FLAG_IS_FLOAT | FORMAT_FLAG_IS_PACKED,
            32,
            channels,
        )
    }

    fn packed(sample_rate: f64, format_flags: u32, bits_per_channel: u32, channels: u32) -> Self {
        let bytes_per_frame = channels * (bits_per_channel / 8);
        Self {
            sample_rate,
            format_id: FORMAT_LINEAR_PCM,
            format_flags,
            bits_per_channel,
            channels_per_frame: channels,
            bytes_per_frame,
            frames_per_packet: 1,
            bytes_per_packet: bytes_per_frame,
        }
    }

    /// Same layout with a different channel count.
    pub fn with_channels(mut self, channels: u32) -> Self {
        self.channels_per_frame = channels;
        self.bytes_per_frame = channels * (self.bits_per_channel / 8);
        self.bytes_per_packet = self.bytes_per_frame * self.frames_per_packet;
        self
    }

    /// Same layout at a different sample rate.
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }
}

/// A format together with the sample rates it supports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangedFormat {
    /// The format.
    pub format: StreamFormat,
    /// Supported sample rates.
    pub sample_rate_range: ValueRange,
}

impl RangedFormat {
    /// Format supported only at its own sample rate.
    pub fn exact(format: StreamFormat) -> Self {
        Self {
            format,
            sample_rate_range: ValueRange::exact(format.sample_rate),
        }
    }
}

/// Role and position of a channel.
///
/// Equality compares label, flags, and all three coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelDescription {
    /// Channel label.
    pub label: u32,
    /// Channel flags.
    pub flags: u32,
    /// Speaker position.
    pub coordinates: [f32; 3],
}

impl ChannelDescription {
    /// Description with a label and no position.
    pub const fn labeled(label: u32) -> Self {
        Self {
            label,
            flags: 0,
            coordinates: [0.0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_format_is_stereo_i16() {
        let format = StreamFormat::default();
        assert_eq!(format.sample_rate, 44100.0);
        assert_eq!(format.format_id, FORMAT_LINEAR_PCM);
        assert_eq!(format.bits_per_channel, 16);
        assert_eq!(format.channels_per_frame, 2);
        assert_eq!(format.bytes_per_frame, 4);
        assert_eq!(format.frames_per_packet, 1);
        assert_eq!(format.bytes_per_packet, 4);
    }

    #[test]
    fn with_channels_recomputes_sizes() {
        let format = StreamFormat::pcm_f32(48000.0, 2).with_channels(6);
        assert_eq!(format.bytes_per_frame, 24);
        assert_eq!(format.bytes_per_packet, 24);
    }

    #[test]
    fn format_equality_is_field_wise() {
        let a = StreamFormat::default();
        let mut b = a;
        assert_eq!(a, b);
        b.bytes_per_packet = 8;
        assert_ne!(a, b);
    }

    #[test]
    fn channel_equality_checks_every_coordinate() {
        let a = ChannelDescription {
            label: 1,
            flags: 0,
            coordinates: [1.0, 2.0, 3.0],
        };
        for axis in 0..3 {
            let mut b = a;
            b.coordinates[axis] = -1.0;
            assert_ne!(a, b, "coordinate {axis} ignored");
        }
        assert_eq!(a, a);
    }

    #[test]
    fn range_contains_bounds() {
        let range = ValueRange::new(44100.0, 96000.0);
        assert!(range.contains(44100.0));
        assert!(range.contains(96000.0));
        assert!(!range.contains(22050.0));
        assert!(ValueRange::exact(48000.0).contains(48000.0));
    }

    #[test]
    fn direction_scope() {
        assert_eq!(Direction::Input.scope(), Scope::Input);
        assert_eq!(Direction::Output.scope(), Scope::Output);
        assert_eq!(Direction::default(), Direction::Output);
    }
}
