//! Sample-rate conversion between the capture device's native rate and the
//! 16kHz rate the wake-word and STT models expect.
//!
//! The grounding crate's own `resampler.rs` reaches for `samplerate`
//! (libsamplerate) but that crate is not actually declared in any manifest
//! in the codebase; `rubato` is, so the conversion below is built on it
//! instead, keeping the same sinc-interpolated quality bar.

use super::AudioError;
use dasp_sample::Sample as DaspSample;
use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

pub struct Resampler {
    input_rate: u32,
    output_rate: u32,
    inner: Option<SincFixedIn<f64>>,
}

impl Resampler {
    /// A resampler for `input_rate` -> `output_rate`. Pass-through (no inner
    /// resampler constructed) when the rates already match.
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self, AudioError> {
        if input_rate == output_rate {
            return Ok(Self {
                input_rate,
                output_rate,
                inner: None,
            });
        }

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let ratio = output_rate as f64 / input_rate as f64;
        let inner = SincFixedIn::<f64>::new(ratio, 2.0, params, 1024, 1)
            .map_err(|e| AudioError::Resample(e.to_string()))?;

        Ok(Self {
            input_rate,
            output_rate,
            inner: Some(inner),
        })
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Resample a whole mono s16 buffer in one call, processing in the
    /// chunk sizes rubato requires and concatenating the output.
    pub fn resample(&mut self, input: &[i16]) -> Result<Vec<i16>, AudioError> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(input.to_vec());
        };

        let mut input_f64: Vec<f64> = input.iter().map(|&s| s.to_sample::<f64>()).collect();
        let mut output_i16 = Vec::with_capacity((input.len() as f64 * (self.output_rate as f64 / self.input_rate as f64)) as usize);

        loop {
            let needed = resampler.input_frames_next();
            if input_f64.len() < needed {
                break;
            }
            let chunk: Vec<f64> = input_f64.drain(..needed).collect();
            let waves_in = vec![chunk];
            let waves_out = resampler
                .process(&waves_in, None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;
            output_i16.extend(waves_out[0].iter().map(|&s| s.to_sample::<i16>()));
        }

        // Flush the trailing partial frame through a padded final call so
        // short recordings (most commands) aren't silently truncated.
        if !input_f64.is_empty() {
            let needed = resampler.input_frames_next();
            let mut chunk = input_f64;
            chunk.resize(needed, 0.0);
            let waves_in = vec![chunk];
            if let Ok(waves_out) = resampler.process(&waves_in, None) {
                let expected_extra =
                    ((needed as f64 - 0.0) * (self.output_rate as f64 / self.input_rate as f64)) as usize;
                output_i16.extend(
                    waves_out[0]
                        .iter()
                        .take(expected_extra.min(waves_out[0].len()))
                        .map(|&s| s.to_sample::<i16>()),
                );
            }
        }

        Ok(output_i16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_through_when_rates_match() {
        let mut r = Resampler::new(16000, 16000).unwrap();
        let input: Vec<i16> = vec![100, -200, 300, -400];
        assert_eq!(r.resample(&input).unwrap(), input);
    }

    #[test]
    fn downsamples_roughly_to_expected_ratio() {
        let mut r = Resampler::new(48000, 16000).unwrap();
        let input = vec![0i16; 4096];
        let output = r.resample(&input).unwrap();
        assert!(!output.is_empty());
        assert!(output.len() < input.len());
    }
}
