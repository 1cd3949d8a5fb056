//! 12-bit ADC front end shared by the drivers.
//!
//! Raw readings are unsigned 12-bit codes against a 3.3 V reference. The
//! microphone sits on a DC bias, so a sample is the raw code minus the code
//! of the bias voltage.

use std::ops::RangeInclusive;

use super::{MicrophoneConfig, SampleReader};
use crate::error::{MicError, Result};

/// ADC reference voltage.
pub const ADC_VREF_VOLTS: f32 = 3.3;
/// Largest 12-bit code.
pub const ADC_MAX_RAW: u16 = 0x0fff;
/// GPIOs wired to ADC inputs 0..=2.
pub const ADC_GPIO_PINS: RangeInclusive<u8> = 26..=28;

/// Validated conversion parameters for one microphone configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcFrontend {
    bias: i16,
}

impl AdcFrontend {
    /// # Errors
    /// Returns `MicError::InvalidConfig` for a non-ADC GPIO, a bias outside
    /// `0.0..=3.3` V, or a zero sample rate / buffer size.
    pub fn new(config: &MicrophoneConfig) -> Result<Self> {
        if !ADC_GPIO_PINS.contains(&config.gpio) {
            return Err(MicError::InvalidConfig(format!(
                "gpio {} is not ADC capable (expected {}..={})",
                config.gpio,
                ADC_GPIO_PINS.start(),
                ADC_GPIO_PINS.end()
            )));
        }
        if !config.bias_voltage.is_finite()
            || !(0.0..=ADC_VREF_VOLTS).contains(&config.bias_voltage)
        {
            return Err(MicError::InvalidConfig(format!(
                "bias voltage {} V outside 0..={} V",
                config.bias_voltage, ADC_VREF_VOLTS
            )));
        }
        if config.sample_rate_hz == 0 {
            return Err(MicError::InvalidConfig("sample rate must be non-zero".into()));
        }
        if config.sample_buffer_size == 0 {
            return Err(MicError::InvalidConfig(
                "sample buffer size must be non-zero".into(),
            ));
        }

        let bias = (config.bias_voltage * ADC_MAX_RAW as f32 / ADC_VREF_VOLTS) as i16;
        Ok(Self { bias })
    }

    /// Raw code corresponding to the configured bias voltage.
    pub fn bias(&self) -> i16 {
        self.bias
    }

    /// Convert one raw reading to a signed sample.
    pub fn convert(&self, raw: u16) -> i16 {
        (raw & ADC_MAX_RAW) as i16 - self.bias
    }

    /// Largest swing around the bias that fits on both sides of the 12-bit
    /// range.
    pub fn half_scale(&self) -> i16 {
        self.bias.min(ADC_MAX_RAW as i16 - self.bias)
    }

    /// Map a normalised level in `[-1.0, 1.0]` onto a raw code around the bias.
    ///
    /// Full scale is [`half_scale`](Self::half_scale) in both directions, so
    /// positive and negative peaks clip at the same magnitude.
    pub fn quantize(&self, level: f32) -> u16 {
        let half_scale = f32::from(self.half_scale());
        let code = f32::from(self.bias) + level.clamp(-1.0, 1.0) * half_scale;
        code.round().clamp(0.0, f32::from(ADC_MAX_RAW)) as u16
    }
}

/// Serves `read_samples` from one filled buffer of raw readings.
pub struct RawBatchReader<'a> {
    raw: &'a [u16],
    frontend: AdcFrontend,
    position: usize,
}

impl<'a> RawBatchReader<'a> {
    pub fn new(raw: &'a [u16], frontend: AdcFrontend) -> Self {
        Self {
            raw,
            frontend,
            position: 0,
        }
    }
}

impl SampleReader for RawBatchReader<'_> {
    fn read_samples(&mut self, out: &mut [i16]) -> usize {
        let remaining = &self.raw[self.position..];
        let n = out.len().min(remaining.len());
        for (dst, &raw) in out.iter_mut().zip(&remaining[..n]) {
            *dst = self.frontend.convert(raw);
        }
        self.position += n;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(f: impl FnOnce(&mut MicrophoneConfig)) -> MicrophoneConfig {
        let mut config = MicrophoneConfig::default();
        f(&mut config);
        config
    }

    #[test]
    fn bias_code_for_default_microphone() {
        let frontend = AdcFrontend::new(&MicrophoneConfig::default()).expect("valid config");
        // 1.63 V * 4095 / 3.3 V = 2022.68
        assert_eq!(frontend.bias(), 2022);
    }

    #[test]
    fn convert_subtracts_bias_and_masks_to_twelve_bits() {
        let frontend = AdcFrontend::new(&MicrophoneConfig::default()).expect("valid config");
        assert_eq!(frontend.convert(2022), 0);
        assert_eq!(frontend.convert(0), -2022);
        assert_eq!(frontend.convert(4095), 4095 - 2022);
        assert_eq!(frontend.convert(0xf000 | 2030), 8);
    }

    #[test]
    fn quantize_centres_on_bias_and_clamps() {
        let frontend = AdcFrontend::new(&MicrophoneConfig::default()).expect("valid config");
        assert_eq!(frontend.quantize(0.0), 2022);
        assert_eq!(frontend.quantize(1.0), 4044);
        assert_eq!(frontend.quantize(5.0), frontend.quantize(1.0));
        assert_eq!(frontend.quantize(-1.0), 0);
        assert_eq!(frontend.quantize(-5.0), frontend.quantize(-1.0));

        let up = frontend.convert(frontend.quantize(0.25)) as f32;
        assert!((up - 0.25 * 2022.0).abs() <= 1.0, "up={up}");
    }

    #[test]
    fn full_scale_peaks_are_symmetric_around_bias() {
        let frontend = AdcFrontend::new(&MicrophoneConfig::default()).expect("valid config");
        // 1.63 V leaves 2022 codes below the bias and 2073 above it.
        assert_eq!(frontend.half_scale(), 2022);
        assert_eq!(frontend.convert(frontend.quantize(1.0)), 2022);
        assert_eq!(frontend.convert(frontend.quantize(-1.0)), -2022);

        let high_bias = AdcFrontend::new(&config_with(|c| c.bias_voltage = 2.5))
            .expect("valid config");
        // 2.5 V -> code 3102; only 993 codes of headroom above it.
        assert_eq!(high_bias.half_scale(), 993);
        assert_eq!(high_bias.quantize(1.0), ADC_MAX_RAW);
        assert_eq!(high_bias.convert(high_bias.quantize(-1.0)), -993);
    }

    #[test]
    fn rejects_non_adc_gpio() {
        let err = AdcFrontend::new(&config_with(|c| c.gpio = 25)).unwrap_err();
        assert!(matches!(err, MicError::InvalidConfig(_)));
        assert!(AdcFrontend::new(&config_with(|c| c.gpio = 29)).is_err());
        assert!(AdcFrontend::new(&config_with(|c| c.gpio = 28)).is_ok());
    }

    #[test]
    fn rejects_bias_outside_reference_range() {
        assert!(AdcFrontend::new(&config_with(|c| c.bias_voltage = -0.1)).is_err());
        assert!(AdcFrontend::new(&config_with(|c| c.bias_voltage = 3.4)).is_err());
        assert!(AdcFrontend::new(&config_with(|c| c.bias_voltage = f32::NAN)).is_err());
    }

    #[test]
    fn rejects_zero_rate_and_zero_buffer() {
        assert!(AdcFrontend::new(&config_with(|c| c.sample_rate_hz = 0)).is_err());
        assert!(AdcFrontend::new(&config_with(|c| c.sample_buffer_size = 0)).is_err());
    }

    #[test]
    fn raw_reader_copies_at_most_the_available_samples() {
        let frontend = AdcFrontend::new(&MicrophoneConfig::default()).expect("valid config");
        let raw = [2022u16, 2023, 2021];
        let mut reader = RawBatchReader::new(&raw, frontend);

        let mut out = [0i16; 2];
        assert_eq!(reader.read_samples(&mut out), 2);
        assert_eq!(out, [0, 1]);

        let mut rest = [0i16; 8];
        assert_eq!(reader.read_samples(&mut rest), 1);
        assert_eq!(rest[0], -1);
        assert_eq!(reader.read_samples(&mut rest), 0);
    }
}
