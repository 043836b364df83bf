//! Real-time spectral analysis tap.
//!
//! An [`AnalysisTap`] is inserted into a host audio graph. For every render
//! block it copies the first channel, measures RMS loudness, runs a windowed
//! forward FFT and reduces the spectrum to six perceptual bands. The result is
//! handed to a [`ResultSink`] before `process` returns. Everything the hot path
//! touches is allocated up front, so steady-state processing neither allocates
//! nor blocks.

pub mod analysis;
pub mod bands;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod sink;
pub mod tap;
pub mod transform;

pub use analysis::{compute_rms, AnalysisEvent, AudioAnalysisResult, AUDIO_TAP_EVENT};
pub use bands::{normalize_energy, BandAggregator, BandTable, BinRange, FrequencyBand, BAND_COUNT};
pub use config::{AnalysisConfig, BlockLength, TapSettings};
pub use diagnostics::{
    DiagnosticEntry, DiagnosticLog, DiagnosticSink, LifecycleEvent, NoopDiagnostics,
    TracingDiagnostics,
};
pub use error::{Result, TapError};
pub use sink::{channel, AnalysisReceiver, ResultSink, RingBufferSink};
pub use tap::{AnalysisTap, AudioTap, StreamFormat, TapState};
pub use transform::{TransformContext, TransformEngine};
