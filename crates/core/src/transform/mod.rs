use std::{fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{AnalysisConfig, Result, TapError};

/// Forward real-to-complex transform sized to one block, plus every buffer it
/// touches. Created once and reused for every block.
pub struct TransformContext {
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl TransformContext {
    fn new(len: usize) -> Result<Self> {
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(len);
        if plan.len() != len {
            return Err(TapError::TransformContext(format!(
                "planner produced a {}-point transform for {len} samples",
                plan.len()
            )));
        }

        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        if spectrum.len() < len / 2 {
            return Err(TapError::TransformContext(format!(
                "spectrum holds {} bins, need {}",
                spectrum.len(),
                len / 2
            )));
        }

        Ok(Self {
            plan,
            input,
            spectrum,
            scratch,
        })
    }

    pub fn len(&self) -> usize {
        self.plan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plan.len() == 0
    }
}

impl fmt::Debug for TransformContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformContext")
            .field("len", &self.len())
            .finish()
    }
}

/// Turns a block of raw samples into a magnitude spectrum of `len / 2` bins.
#[derive(Debug)]
pub struct TransformEngine {
    config: AnalysisConfig,
    context: TransformContext,
    magnitudes: Vec<f32>,
    /// `2 / sum(window)`, so a sinusoid of amplitude `A` peaks near `A`.
    scale: f32,
}

impl TransformEngine {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let len = config.block_length().get();
        if config.window().len() != len {
            return Err(TapError::TransformContext(format!(
                "window has {} coefficients for a {len}-sample block",
                config.window().len()
            )));
        }

        let context = TransformContext::new(len)?;
        let window_sum: f32 = config.window().iter().sum();
        let scale = if window_sum > f32::EPSILON {
            2.0 / window_sum
        } else {
            0.0
        };

        Ok(Self {
            magnitudes: vec![0.0; config.block_length().bins()],
            config,
            context,
            scale,
        })
    }

    pub fn block_length(&self) -> usize {
        self.context.len()
    }

    /// Windows `samples`, runs the forward transform and returns the magnitudes
    /// of the lower half of the spectrum. `samples` must hold exactly one block.
    pub fn magnitudes(&mut self, samples: &[f32]) -> Result<&[f32]> {
        let context = &mut self.context;
        if samples.len() != context.input.len() {
            return Err(TapError::msg(format!(
                "expected {} samples, got {}",
                context.input.len(),
                samples.len()
            )));
        }

        for ((slot, sample), weight) in context
            .input
            .iter_mut()
            .zip(samples)
            .zip(self.config.window().iter())
        {
            *slot = sample * weight;
        }

        context.plan.process_with_scratch(
            &mut context.input,
            &mut context.spectrum,
            &mut context.scratch,
        )?;

        for (magnitude, bin) in self.magnitudes.iter_mut().zip(&context.spectrum) {
            let value = bin.norm() * self.scale;
            *magnitude = if value.is_nan() { 0.0 } else { value };
        }

        Ok(&self.magnitudes)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{BandTable, BlockLength};

    fn engine(len: usize) -> TransformEngine {
        let config = AnalysisConfig::new(BlockLength::new(len).unwrap(), BandTable::STANDARD);
        TransformEngine::new(config).unwrap()
    }

    fn sine(len: usize, bin: f32, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|n| amplitude * (2.0 * PI * bin * n as f32 / len as f32).sin())
            .collect()
    }

    #[test]
    fn silence_yields_zero_spectrum() {
        let mut engine = engine(1024);
        let spectrum = engine.magnitudes(&[0.0; 1024]).unwrap();
        assert_eq!(spectrum.len(), 512);
        assert!(spectrum.iter().all(|m| *m == 0.0));
    }

    #[test]
    fn bin_centred_sine_peaks_at_its_bin() {
        let mut engine = engine(1024);
        let spectrum = engine.magnitudes(&sine(1024, 64.0, 0.5)).unwrap();

        let (peak, _) = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert_eq!(peak, 64);
        assert_abs_diff_eq!(spectrum[64], 0.5, epsilon = 0.02);
    }

    #[test]
    fn magnitudes_are_non_negative_and_deterministic() {
        let input: Vec<f32> = (0..256).map(|n| ((n * 37) % 11) as f32 / 11.0 - 0.5).collect();
        let mut a = engine(256);
        let mut b = engine(256);

        let first = a.magnitudes(&input).unwrap().to_vec();
        let second = b.magnitudes(&input).unwrap().to_vec();
        let again = a.magnitudes(&input).unwrap().to_vec();

        assert!(first.iter().all(|m| *m >= 0.0 && m.is_finite()));
        assert_eq!(first, second);
        assert_eq!(first, again);
    }

    #[test]
    fn rejects_wrong_block_size() {
        let mut engine = engine(64);
        assert!(engine.magnitudes(&[0.0; 32]).is_err());
    }
}
