use std::{f32::consts::PI, fmt, fs, path::Path, sync::Arc};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{BandTable, Result, TapError};

static STANDARD_CONFIG: Lazy<AnalysisConfig> = Lazy::new(|| AnalysisConfig {
    block_length: BlockLength::DEFAULT,
    window: hann_window(BlockLength::DEFAULT.get()),
    bands: BandTable::STANDARD,
});

/// Number of samples per analysis block. Always a power of two, at least 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct BlockLength(usize);

impl BlockLength {
    pub const DEFAULT: BlockLength = BlockLength(1024);

    pub fn new(len: usize) -> Result<Self> {
        if len < 2 || !len.is_power_of_two() {
            return Err(TapError::InvalidBlockLength(len));
        }
        Ok(Self(len))
    }

    pub fn get(self) -> usize {
        self.0
    }

    /// Number of magnitude bins produced for a block of this length.
    pub fn bins(self) -> usize {
        self.0 / 2
    }
}

impl Default for BlockLength {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<usize> for BlockLength {
    type Error = TapError;

    fn try_from(value: usize) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BlockLength> for usize {
    fn from(value: BlockLength) -> Self {
        value.0
    }
}

/// Immutable analysis configuration: block length, window and band table.
///
/// Cloning is cheap and shares the window coefficients, so any number of taps
/// analysing concurrent streams can be built from one configuration.
#[derive(Clone)]
pub struct AnalysisConfig {
    block_length: BlockLength,
    window: Arc<[f32]>,
    bands: BandTable,
}

impl AnalysisConfig {
    /// Derives the window for `block_length`. A different block length always
    /// needs a fresh configuration.
    pub fn new(block_length: BlockLength, bands: BandTable) -> Self {
        if block_length == BlockLength::DEFAULT {
            return Self {
                bands,
                ..STANDARD_CONFIG.clone()
            };
        }

        Self {
            block_length,
            window: hann_window(block_length.get()),
            bands,
        }
    }

    /// 1024-sample blocks with the standard six band table. Every call shares
    /// the same window allocation.
    pub fn standard() -> Self {
        STANDARD_CONFIG.clone()
    }

    pub fn block_length(&self) -> BlockLength {
        self.block_length
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    pub fn bands(&self) -> &BandTable {
        &self.bands
    }

    /// Returns `true` when both configurations point at the same window
    /// allocation.
    pub fn shares_window_with(&self, other: &AnalysisConfig) -> bool {
        Arc::ptr_eq(&self.window, &other.window)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("block_length", &self.block_length)
            .field("window", &self.window.len())
            .field("bands", &self.bands)
            .finish()
    }
}

/// User-facing settings, usually read from a JSON file by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TapSettings {
    pub block_length: BlockLength,
    pub bands: BandTable,
    /// Capacity of the ring buffer between the audio thread and the consumer.
    pub sink_capacity: usize,
}

impl Default for TapSettings {
    fn default() -> Self {
        Self {
            block_length: BlockLength::DEFAULT,
            bands: BandTable::STANDARD,
            sink_capacity: 256,
        }
    }
}

impl TapSettings {
    /// Reads settings from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let settings: TapSettings = serde_json::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sink_capacity == 0 {
            return Err(TapError::msg("sink capacity must be at least 1"));
        }
        Ok(())
    }

    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig::new(self.block_length, self.bands)
    }
}

/// Symmetric Hann window of `len` coefficients.
pub fn hann_window(len: usize) -> Arc<[f32]> {
    (0..len).map(|index| hann_value(index, len)).collect()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::FrequencyBand;

    #[test]
    fn block_length_must_be_power_of_two() {
        assert!(BlockLength::new(1024).is_ok());
        assert!(BlockLength::new(2).is_ok());
        assert!(matches!(
            BlockLength::new(1000),
            Err(TapError::InvalidBlockLength(1000))
        ));
        assert!(BlockLength::new(0).is_err());
        assert!(BlockLength::new(1).is_err());
    }

    #[test]
    fn hann_window_tapers_to_zero() {
        let window = hann_window(1024);
        assert_eq!(window.len(), 1024);
        assert_abs_diff_eq!(window[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(window[1023], 0.0, epsilon = 1e-6);
        assert!(window.iter().all(|w| (0.0..=1.0).contains(w)));
        assert!(window[511] > 0.99);
    }

    #[test]
    fn standard_configs_share_window() {
        let a = AnalysisConfig::standard();
        let b = AnalysisConfig::new(BlockLength::DEFAULT, BandTable::STANDARD);
        assert!(a.shares_window_with(&b));
        assert_eq!(a.window().len(), 1024);
    }

    #[test]
    fn new_block_length_rederives_window() {
        let config = AnalysisConfig::new(BlockLength::new(256).unwrap(), BandTable::STANDARD);
        assert_eq!(config.window().len(), 256);
        assert!(!config.shares_window_with(&AnalysisConfig::standard()));
    }

    #[test]
    fn settings_fill_missing_fields_with_defaults() {
        let settings: TapSettings = serde_json::from_str(r#"{"block_length": 2048}"#).unwrap();
        assert_eq!(settings.block_length.get(), 2048);
        assert_eq!(settings.bands, BandTable::STANDARD);
        assert_eq!(settings.sink_capacity, 256);
    }

    #[test]
    fn settings_reject_bad_block_length() {
        let parsed: std::result::Result<TapSettings, _> =
            serde_json::from_str(r#"{"block_length": 1000}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn settings_round_trip_custom_bands() {
        let mut bands = *BandTable::STANDARD.bands();
        bands[5] = FrequencyBand::new(4000.0, 16000.0);
        let settings = TapSettings {
            bands: BandTable::new(bands).unwrap(),
            ..TapSettings::default()
        };

        let json = serde_json::to_string(&settings).unwrap();
        let parsed: TapSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.bands.bands()[5].high_hz, 16000.0);
    }

    #[test]
    fn loads_settings_from_disk() {
        let path =
            std::env::temp_dir().join(format!("audio-tap-settings-{}.json", std::process::id()));
        fs::write(&path, r#"{"sink_capacity": 8}"#).unwrap();

        let settings = TapSettings::load(&path).unwrap();
        assert_eq!(settings.sink_capacity, 8);
        assert_eq!(settings.analysis_config().block_length(), BlockLength::DEFAULT);

        fs::write(&path, r#"{"sink_capacity": 0}"#).unwrap();
        assert!(TapSettings::load(&path).is_err());
        let _ = fs::remove_file(&path);
    }
}
