//! Sample format conversion to the recognizer's mono i16 layout.

/// Average interleaved channels down to mono.
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Resample mono audio by linear interpolation.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as f64 / ratio).floor() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let src = i as f64 * ratio;
            let idx0 = (src.floor() as usize).min(last);
            let idx1 = (idx0 + 1).min(last);
            let frac = (src - idx0 as f64) as f32;
            samples[idx0] * (1.0 - frac) + samples[idx1] * frac
        })
        .collect()
}

/// Linear-interpolation resampler for audio arriving in blocks.
///
/// The read position and the last input sample carry over between blocks, so
/// block boundaries neither lose fractional samples nor introduce steps.
pub struct StreamResampler {
    /// Input samples advanced per output sample
    step: f64,
    /// Next read position; index 0 is the carried sample when there is one
    position: f64,
    carry: Option<f32>,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        let step = if from_rate == 0 || to_rate == 0 {
            1.0
        } else {
            from_rate as f64 / to_rate as f64
        };
        Self {
            step,
            position: 0.0,
            carry: None,
        }
    }

    pub fn process(&mut self, block: &[f32]) -> Vec<f32> {
        if self.step == 1.0 {
            return block.to_vec();
        }

        let mut buf = Vec::with_capacity(block.len() + 1);
        buf.extend(self.carry);
        buf.extend_from_slice(block);
        if buf.len() < 2 {
            self.carry = buf.last().copied();
            return Vec::new();
        }

        let last = (buf.len() - 1) as f64;
        let mut out = Vec::with_capacity((block.len() as f64 / self.step) as usize + 1);
        while self.position < last {
            let idx0 = self.position.floor() as usize;
            let frac = (self.position - idx0 as f64) as f32;
            out.push(buf[idx0] * (1.0 - frac) + buf[idx0 + 1] * frac);
            self.position += self.step;
        }

        self.position -= last;
        self.carry = buf.last().copied();
        out
    }
}

pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Convert a whole interleaved recording at any rate to mono i16 at
/// `target_rate`. Streams should use [`StreamResampler`] instead.
pub fn to_mono_i16(samples: &[f32], channels: u16, device_rate: u32, target_rate: u32) -> Vec<i16> {
    let mono = downmix_to_mono(samples, channels);
    f32_to_i16(&resample_linear(&mono, device_rate, target_rate))
}

/// Root-mean-square level of normalized samples.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}
