use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    compute_rms, AnalysisConfig, AudioAnalysisResult, BandAggregator, BinRange, DiagnosticSink,
    LifecycleEvent, NoopDiagnostics, Result, ResultSink, TapError, TransformEngine, BAND_COUNT,
};

/// Format of the stream a tap is prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channel_count: usize,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, channel_count: usize) -> Self {
        Self {
            sample_rate,
            channel_count,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(TapError::InvalidStreamFormat(
                "sample rate must be positive".to_string(),
            ));
        }
        if self.channel_count == 0 {
            return Err(TapError::InvalidStreamFormat(
                "stream must carry at least one channel".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lifecycle position of a tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TapState {
    Uninitialized,
    Initialized,
    Prepared,
    /// Inside a `process` call.
    Processing,
    /// Prepared once and since released; accepts the same calls as
    /// `Initialized`.
    Unprepared,
    Finalized,
}

impl TapState {
    /// `true` when the transform context exists but no stream is attached.
    pub fn is_initialized(self) -> bool {
        matches!(self, TapState::Initialized | TapState::Unprepared)
    }
}

/// Hooks a host audio graph invokes on an inserted tap. The host serialises
/// every call; `process` runs on the real-time render thread.
pub trait AudioTap {
    fn initialize(&mut self) -> Result<()>;
    fn prepare(&mut self, format: StreamFormat) -> Result<()>;
    /// Consumes one render block. `channels` holds one sample slice per
    /// channel; only the first is analysed. Never fails.
    fn process(&mut self, frame_count: usize, channels: &[&[f32]]);
    fn unprepare(&mut self) -> Result<()>;
    fn finalize(&mut self) -> Result<()>;
}

/// Spectral analysis tap: one [`AudioAnalysisResult`] per processed block,
/// handed synchronously to the sink.
///
/// All buffers are allocated by `initialize` and `prepare`; `process` neither
/// allocates nor locks.
pub struct AnalysisTap<S, D = NoopDiagnostics> {
    index: usize,
    config: AnalysisConfig,
    state: TapState,
    engine: Option<TransformEngine>,
    scratch: Vec<f32>,
    format: Option<StreamFormat>,
    bin_ranges: [BinRange; BAND_COUNT],
    sink: S,
    diagnostics: D,
}

impl<S: ResultSink> AnalysisTap<S> {
    pub fn new(config: AnalysisConfig, sink: S) -> Self {
        Self::with_diagnostics(0, config, sink, NoopDiagnostics)
    }
}

impl<S: ResultSink, D: DiagnosticSink> AnalysisTap<S, D> {
    /// Creates a tap that reports its lifecycle to `diagnostics`, tagged with
    /// `index`.
    pub fn with_diagnostics(
        index: usize,
        config: AnalysisConfig,
        sink: S,
        diagnostics: D,
    ) -> Self {
        Self {
            index,
            config,
            state: TapState::Uninitialized,
            engine: None,
            scratch: Vec::new(),
            format: None,
            bin_ranges: [BinRange::default(); BAND_COUNT],
            sink,
            diagnostics,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> TapState {
        self.state
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn diagnostics(&self) -> &D {
        &self.diagnostics
    }

    pub fn into_parts(self) -> (S, D) {
        (self.sink, self.diagnostics)
    }

    fn check_transition(&self, operation: &'static str, allowed: bool) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(TapError::InvalidTransition {
                from: self.state,
                operation,
            })
        }
    }

    fn analyze(&mut self, frame_count: usize, channels: &[&[f32]]) -> AudioAnalysisResult {
        let Some(engine) = self.engine.as_mut() else {
            return AudioAnalysisResult::ZERO;
        };
        let channel = match channels.first() {
            Some(channel) if !channel.is_empty() => *channel,
            _ => return AudioAnalysisResult::ZERO,
        };

        let copied = frame_count.min(self.scratch.len()).min(channel.len());
        if copied == 0 {
            return AudioAnalysisResult::ZERO;
        }

        // The host reuses its buffers as soon as we return, so always copy.
        for (slot, sample) in self.scratch.iter_mut().zip(&channel[..copied]) {
            *slot = if sample.is_finite() { *sample } else { 0.0 };
        }
        self.scratch[copied..].fill(0.0);

        let amplitude = compute_rms(&self.scratch[..copied]);
        let mut eq_bands = [0.0; BAND_COUNT];
        match engine.magnitudes(&self.scratch) {
            Ok(spectrum) => BandAggregator::aggregate(spectrum, &self.bin_ranges, &mut eq_bands),
            Err(_) => return AudioAnalysisResult::ZERO,
        }

        AudioAnalysisResult {
            amplitude,
            eq_bands,
        }
    }
}

impl<S: ResultSink, D: DiagnosticSink> AudioTap for AnalysisTap<S, D> {
    fn initialize(&mut self) -> Result<()> {
        self.check_transition("initialize", self.state == TapState::Uninitialized)?;
        self.diagnostics.record(self.index, LifecycleEvent::Initialize);

        let engine = TransformEngine::new(self.config.clone()).map_err(|err| {
            tracing::warn!(tap = self.index, error = %err, "transform context creation failed");
            err
        })?;
        self.scratch = vec![0.0; engine.block_length()];
        self.engine = Some(engine);
        self.state = TapState::Initialized;

        tracing::debug!(
            tap = self.index,
            block_length = self.config.block_length().get(),
            "audio tap initialized"
        );
        Ok(())
    }

    fn prepare(&mut self, format: StreamFormat) -> Result<()> {
        self.check_transition("prepare", self.state.is_initialized())?;
        self.diagnostics.record(self.index, LifecycleEvent::Prepare);
        format.validate()?;

        let block_length = self.config.block_length().get();
        self.bin_ranges = self
            .config
            .bands()
            .bin_ranges(format.sample_rate as f32, block_length);
        for (band, range) in self.config.bands().bands().iter().zip(&self.bin_ranges) {
            if range.is_empty() {
                tracing::warn!(
                    tap = self.index,
                    low_hz = band.low_hz,
                    high_hz = band.high_hz,
                    sample_rate = format.sample_rate,
                    "band covers no spectrum bins and will always report zero"
                );
            }
        }

        self.format = Some(format);
        self.state = TapState::Prepared;
        tracing::debug!(
            tap = self.index,
            sample_rate = format.sample_rate,
            channels = format.channel_count,
            "audio tap prepared"
        );
        Ok(())
    }

    fn process(&mut self, frame_count: usize, channels: &[&[f32]]) {
        self.diagnostics.record(self.index, LifecycleEvent::Process);
        debug_assert_eq!(
            self.state,
            TapState::Prepared,
            "process called on an audio tap that is not prepared"
        );

        let result = if self.state == TapState::Prepared {
            self.state = TapState::Processing;
            let result = self.analyze(frame_count, channels);
            self.state = TapState::Prepared;
            result
        } else {
            AudioAnalysisResult::ZERO
        };

        self.sink.emit(result);
    }

    fn unprepare(&mut self) -> Result<()> {
        self.check_transition("unprepare", self.state == TapState::Prepared)?;
        self.diagnostics.record(self.index, LifecycleEvent::Unprepare);

        self.format = None;
        self.bin_ranges = [BinRange::default(); BAND_COUNT];
        self.state = TapState::Unprepared;
        tracing::debug!(tap = self.index, "audio tap unprepared");
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.check_transition("finalize", self.state.is_initialized())?;
        self.diagnostics.record(self.index, LifecycleEvent::Finalize);

        self.engine = None;
        self.scratch = Vec::new();
        self.state = TapState::Finalized;
        tracing::debug!(tap = self.index, "audio tap finalized");
        Ok(())
    }
}

impl<S, D> fmt::Debug for AnalysisTap<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisTap")
            .field("index", &self.index)
            .field("state", &self.state)
            .field("config", &self.config)
            .field("format", &self.format)
            .finish()
    }
}
