//! Output encoding for the MCP4821 12 bit SPI DAC (and the activity LED
//! that follows the output).

use crate::AudioSample;

/// DAC code for silence
pub const DAC_ZERO: u16 = 0x8000;

// MCP4821 command word bits
const BIT_DAC_B: u16 = 1 << 15;
const BIT_GAIN_1X: u16 = 1 << 13;
const BIT_ACTIVE: u16 = 1 << 12;

/// Select DAC unit A or B (the MCP4822 has both, the MCP4821 only A)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DacUnit {
    /// Unit A
    A,
    /// Unit B
    B,
}

/// Convert a signed sample to an unsigned DAC code, with silence at
/// [DAC_ZERO]
#[inline]
pub fn sample_to_dac(sample: AudioSample) -> u16 {
    (sample as i32 + DAC_ZERO as i32) as u16
}

/// The 16 bit SPI command that outputs the top 12 bits of `data`.  Gain is
/// always 1x: 2x can't be reached from a 3.3V supply.
#[inline]
pub fn mcp4821_command(data: u16, unit: DacUnit) -> u16 {
    let unit = match unit {
        DacUnit::A => 0,
        DacUnit::B => BIT_DAC_B,
    };
    unit | BIT_GAIN_1X | BIT_ACTIVE | (data >> 4)
}

/// Brightness for an LED that shows the output level, as a duty for a PWM
/// counter that wraps at `u16::MAX`.  Squared so it looks roughly linear,
/// and dark below mid scale.
#[inline]
pub fn led_level(data: u16) -> u16 {
    let reduced = data >> 8;
    (reduced * reduced).saturating_sub(0x8000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_conversion() {
        assert_eq!(sample_to_dac(0), DAC_ZERO);
        assert_eq!(sample_to_dac(i16::MIN), 0);
        assert_eq!(sample_to_dac(i16::MAX), u16::MAX);
        assert_eq!(sample_to_dac(-1), 0x7fff);
    }

    #[test]
    fn command_words() {
        assert_eq!(mcp4821_command(0, DacUnit::A), 0x3000);
        assert_eq!(mcp4821_command(0xffff, DacUnit::A), 0x3fff);
        assert_eq!(mcp4821_command(DAC_ZERO, DacUnit::A), 0x3800);
        assert_eq!(mcp4821_command(0x1234, DacUnit::B), 0xb123);
    }

    #[test]
    fn led_is_dark_below_mid_scale() {
        assert_eq!(led_level(0), 0);
        assert_eq!(led_level(DAC_ZERO), 0);
        assert_eq!(led_level(0xffff), 255 * 255 - 0x8000);
        assert!(led_level(0xc000) > led_level(0xa000));
        // 0xb6 is the first step whose square is past 0x8000
        assert_eq!(led_level(0xb5ff), 0);
        assert_eq!(led_level(0xb600), 0xb6 * 0xb6 - 0x8000);
        assert_eq!(led_level(0xc000), 0x1000);
    }

    #[test]
    fn led_follows_the_output() {
        let quiet = led_level(sample_to_dac(1000));
        let loud = led_level(sample_to_dac(30000));
        assert_eq!(quiet, 0);
        assert!(loud > 0x4000, "{loud:#x}");
    }
}
