use std::{
    f32::consts::PI,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use audio_tap_core::{
    channel, AnalysisConfig, AnalysisReceiver, AnalysisTap, AudioAnalysisResult, AudioTap,
    StreamFormat, TapError, TapSettings, TracingDiagnostics, BAND_COUNT,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> audio_tap_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            config,
            json,
        } => run_analyze(&input, config.as_deref(), json),
        Commands::Tone {
            frequency,
            amplitude,
            sample_rate,
        } => run_tone(frequency, amplitude, sample_rate),
    }
}

fn run_analyze(input: &Path, config: Option<&Path>, json: bool) -> audio_tap_core::Result<()> {
    let settings = match config {
        Some(path) => TapSettings::load(path)?,
        None => TapSettings::default(),
    };
    let (sample_rate, samples) = read_first_channel(input)?;
    tracing::info!(
        ?input,
        sample_rate,
        frames = samples.len(),
        block_length = settings.block_length.get(),
        "analysing file"
    );

    let (summary, dropped) = analyze_samples(&settings, sample_rate, &samples, json)?;
    if dropped > 0 {
        tracing::warn!(dropped, "consumer fell behind, results were dropped");
    }
    summary.log();
    Ok(())
}

/// Feeds `samples` through a tap block by block and collects every result on a
/// consumer thread. Offline input has no deadline, so the producer waits for
/// ring space instead of dropping results.
fn analyze_samples(
    settings: &TapSettings,
    sample_rate: u32,
    samples: &[f32],
    json: bool,
) -> audio_tap_core::Result<(Summary, u64)> {
    let (sink, receiver) = channel(settings.sink_capacity);
    let consumer = thread::spawn(move || consume(receiver, json));

    let mut tap = AnalysisTap::with_diagnostics(
        0,
        settings.analysis_config(),
        sink,
        TracingDiagnostics,
    );
    tap.initialize()?;
    tap.prepare(StreamFormat::new(sample_rate, 1))?;
    for block in samples.chunks(settings.block_length.get()) {
        while tap.sink().is_full() {
            if consumer.is_finished() {
                break;
            }
            thread::yield_now();
        }
        tap.process(block.len(), &[block]);
    }
    tap.unprepare()?;
    tap.finalize()?;

    let dropped = tap.sink().dropped();
    // Dropping the tap disconnects the ring so the consumer can finish.
    drop(tap);

    let summary = consumer
        .join()
        .map_err(|_| TapError::msg("result consumer panicked"))??;
    Ok((summary, dropped))
}

fn run_tone(frequency: f32, amplitude: f32, sample_rate: u32) -> audio_tap_core::Result<()> {
    let config = AnalysisConfig::standard();
    let len = config.block_length().get();
    let block: Vec<f32> = (0..len)
        .map(|n| amplitude * (2.0 * PI * frequency * n as f32 / sample_rate as f32).sin())
        .collect();

    let mut latest = None;
    {
        let mut tap = AnalysisTap::new(config, |result: AudioAnalysisResult| {
            latest = Some(result)
        });
        tap.initialize()?;
        tap.prepare(StreamFormat::new(sample_rate, 1))?;
        tap.process(block.len(), &[&block]);
        tap.unprepare()?;
        tap.finalize()?;
    }

    let result = latest.ok_or_else(|| TapError::msg("tap emitted no result"))?;
    println!("{}", result.to_event().to_json()?);
    Ok(())
}

/// Drains results until the producing tap goes away.
fn consume(mut receiver: AnalysisReceiver, json: bool) -> audio_tap_core::Result<Summary> {
    let mut summary = Summary::default();
    loop {
        let disconnected = receiver.is_disconnected();
        for result in receiver.drain() {
            if json {
                println!("{}", result.to_event().to_json()?);
            }
            summary.add(&result);
        }
        if disconnected {
            return Ok(summary);
        }
        thread::sleep(Duration::from_millis(1));
    }
}

#[derive(Debug, Default)]
struct Summary {
    blocks: usize,
    peak_amplitude: f32,
    band_sums: [f32; BAND_COUNT],
}

impl Summary {
    fn add(&mut self, result: &AudioAnalysisResult) {
        self.blocks += 1;
        self.peak_amplitude = self.peak_amplitude.max(result.amplitude);
        for (sum, band) in self.band_sums.iter_mut().zip(result.eq_bands) {
            *sum += band;
        }
    }

    fn log(&self) {
        let mean_bands = self
            .band_sums
            .map(|sum| if self.blocks == 0 { 0.0 } else { sum / self.blocks as f32 });
        tracing::info!(
            blocks = self.blocks,
            peak_amplitude = self.peak_amplitude,
            ?mean_bands,
            "analysis complete"
        );
    }
}

/// Decodes a WAV file and returns its sample rate and first channel as `f32`.
fn read_first_channel(path: &Path) -> audio_tap_core::Result<(u32, Vec<f32>)> {
    let reader = hound::WavReader::open(path)
        .map_err(|err| TapError::msg(format!("{}: {err}", path.display())))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>(),
        hound::SampleFormat::Int => {
            let max_value = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / max_value))
                .collect::<std::result::Result<_, _>>()
        }
    }
    .map_err(|err| TapError::msg(format!("{}: {err}", path.display())))?;

    let first = interleaved.iter().step_by(channels).copied().collect();
    Ok((spec.sample_rate, first))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Spectral analysis tap driver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a WAV file through the analysis tap block by block.
    Analyze {
        /// Path to the WAV file to analyse.
        input: PathBuf,
        /// Optional JSON settings file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print one JSON event per block on stdout.
        #[arg(long)]
        json: bool,
    },
    /// Analyse a single block of a synthesised sine tone.
    Tone {
        #[arg(short, long, default_value_t = 1000.0)]
        frequency: f32,
        #[arg(short, long, default_value_t = 0.5)]
        amplitude: f32,
        #[arg(short, long, default_value_t = 44_100)]
        sample_rate: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tone_defaults() {
        let cli = Cli::try_parse_from(["audio-tap", "tone"]).unwrap();
        match cli.command {
            Commands::Tone {
                frequency,
                amplitude,
                sample_rate,
            } => {
                assert_eq!(frequency, 1000.0);
                assert_eq!(amplitude, 0.5);
                assert_eq!(sample_rate, 44_100);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn summary_averages_bands() {
        let mut summary = Summary::default();
        let mut result = AudioAnalysisResult::ZERO;
        result.amplitude = 0.4;
        result.eq_bands[3] = 1.0;
        summary.add(&result);
        summary.add(&AudioAnalysisResult::ZERO);

        assert_eq!(summary.blocks, 2);
        assert_eq!(summary.peak_amplitude, 0.4);
        assert_eq!(summary.band_sums[3], 1.0);
    }

    #[test]
    fn offline_analysis_keeps_every_block() {
        let settings = TapSettings {
            block_length: audio_tap_core::BlockLength::new(64).unwrap(),
            sink_capacity: 4,
            ..TapSettings::default()
        };
        let samples: Vec<f32> = (0..64 * 500 + 10)
            .map(|n| 0.5 * (2.0 * PI * 1000.0 * n as f32 / 8_000.0).sin())
            .collect();

        let (summary, dropped) = analyze_samples(&settings, 8_000, &samples, false).unwrap();

        assert_eq!(dropped, 0);
        assert_eq!(summary.blocks, samples.chunks(64).count());
        assert!(summary.peak_amplitude > 0.3);
    }

    #[test]
    fn reads_first_channel_of_wav() {
        let path = std::env::temp_dir().join(format!("audio-tap-{}.wav", std::process::id()));
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..4 {
            writer.write_sample(16_384_i16).unwrap();
            writer.write_sample(-16_384_i16).unwrap();
        }
        writer.finalize().unwrap();

        let (sample_rate, samples) = read_first_channel(&path).unwrap();
        assert_eq!(sample_rate, 8_000);
        assert_eq!(samples, vec![0.5; 4]);
        let _ = std::fs::remove_file(&path);
    }
}
