use serde::{Deserialize, Serialize};

use crate::{Result, TapError};

/// Number of perceptual bands reported per analysis result.
pub const BAND_COUNT: usize = 6;

/// Added to band energy before the logarithm so silence maps to a finite value.
pub const ENERGY_EPSILON: f32 = 1e-6;

/// Decibel value mapped to 0.0.
pub const DB_FLOOR: f32 = -60.0;

/// Decibel value mapped to 1.0.
pub const DB_CEILING: f32 = 0.0;

/// Half-open frequency range in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub low_hz: f32,
    pub high_hz: f32,
}

impl FrequencyBand {
    pub const fn new(low_hz: f32, high_hz: f32) -> Self {
        Self { low_hz, high_hz }
    }

    /// Maps the band onto the bin range `[low, high)` of a spectrum with
    /// `block_length / 2` bins.
    pub fn bin_range(&self, sample_rate: f32, block_length: usize) -> BinRange {
        BinRange {
            low: frequency_to_bin(self.low_hz, sample_rate, block_length),
            high: frequency_to_bin(self.high_hz, sample_rate, block_length),
        }
    }
}

/// Ordered, non-overlapping set of bands. Output values follow this order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FrequencyBand>", into = "Vec<FrequencyBand>")]
pub struct BandTable {
    bands: [FrequencyBand; BAND_COUNT],
}

impl BandTable {
    /// Sub bass, bass, low mids, mids, upper mids and highs.
    pub const STANDARD: BandTable = BandTable {
        bands: [
            FrequencyBand::new(20.0, 60.0),
            FrequencyBand::new(60.0, 250.0),
            FrequencyBand::new(250.0, 500.0),
            FrequencyBand::new(500.0, 2000.0),
            FrequencyBand::new(2000.0, 4000.0),
            FrequencyBand::new(4000.0, 20000.0),
        ],
    };

    /// Validates and wraps a band table. Bands must be finite, non-negative,
    /// have `low < high` and appear in ascending, non-overlapping order.
    pub fn new(bands: [FrequencyBand; BAND_COUNT]) -> Result<Self> {
        let mut previous_high = 0.0_f32;
        for (index, band) in bands.iter().enumerate() {
            if !band.low_hz.is_finite() || !band.high_hz.is_finite() || band.low_hz < 0.0 {
                return Err(TapError::InvalidBandTable(format!(
                    "band {index} has a non-finite or negative edge"
                )));
            }
            if band.low_hz >= band.high_hz {
                return Err(TapError::InvalidBandTable(format!(
                    "band {index} is empty ({} Hz >= {} Hz)",
                    band.low_hz, band.high_hz
                )));
            }
            if band.low_hz < previous_high {
                return Err(TapError::InvalidBandTable(format!(
                    "band {index} overlaps the previous band"
                )));
            }
            previous_high = band.high_hz;
        }

        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[FrequencyBand; BAND_COUNT] {
        &self.bands
    }

    /// Bin ranges for every band at the given stream sample rate.
    pub fn bin_ranges(&self, sample_rate: f32, block_length: usize) -> [BinRange; BAND_COUNT] {
        self.bands.map(|band| band.bin_range(sample_rate, block_length))
    }
}

impl Default for BandTable {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl TryFrom<Vec<FrequencyBand>> for BandTable {
    type Error = TapError;

    fn try_from(value: Vec<FrequencyBand>) -> Result<Self> {
        let count = value.len();
        let bands: [FrequencyBand; BAND_COUNT] = value.try_into().map_err(|_| {
            TapError::InvalidBandTable(format!("expected {BAND_COUNT} bands, got {count}"))
        })?;
        Self::new(bands)
    }
}

impl From<BandTable> for Vec<FrequencyBand> {
    fn from(value: BandTable) -> Self {
        value.bands.to_vec()
    }
}

/// Half-open range of spectrum bins `[low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BinRange {
    pub low: usize,
    pub high: usize,
}

impl BinRange {
    pub fn is_empty(&self) -> bool {
        self.high <= self.low
    }
}

/// `round(hz / bin_width)`, clamped to `[0, block_length / 2)`.
pub fn frequency_to_bin(frequency_hz: f32, sample_rate: f32, block_length: usize) -> usize {
    let bins = block_length / 2;
    if bins == 0 || sample_rate.is_nan() || sample_rate <= 0.0 || !frequency_hz.is_finite() {
        return 0;
    }

    let bin_width = sample_rate / block_length as f32;
    let bin = (frequency_hz / bin_width).round().max(0.0);
    (bin as usize).min(bins - 1)
}

/// Reduces a magnitude spectrum to one normalised value per band.
///
/// Stateless: the output depends only on the spectrum and the bin ranges.
#[derive(Debug, Default, Clone, Copy)]
pub struct BandAggregator;

impl BandAggregator {
    pub fn aggregate(
        spectrum: &[f32],
        ranges: &[BinRange; BAND_COUNT],
        out: &mut [f32; BAND_COUNT],
    ) {
        for (value, range) in out.iter_mut().zip(ranges) {
            *value = normalize_energy(band_energy(spectrum, *range));
        }
    }
}

/// Mean magnitude over the band's bins, or 0 when the range is empty or falls
/// outside the spectrum.
pub fn band_energy(spectrum: &[f32], range: BinRange) -> f32 {
    let high = range.high.min(spectrum.len());
    if high <= range.low {
        return 0.0;
    }

    let bins = &spectrum[range.low..high];
    bins.iter().sum::<f32>() / bins.len() as f32
}

/// Converts band energy to decibels and maps `[DB_FLOOR, DB_CEILING]` onto
/// `[0, 1]`.
pub fn normalize_energy(energy: f32) -> f32 {
    if energy.is_nan() {
        return 0.0;
    }

    let db = 20.0 * (energy.max(0.0) + ENERGY_EPSILON).log10();
    let normalized = (db - DB_FLOOR) / (DB_CEILING - DB_FLOOR);
    if normalized.is_nan() {
        0.0
    } else {
        normalized.clamp(0.0, 1.0)
    }
}
