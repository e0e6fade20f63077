use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::Producer;
use thiserror::Error;
use tracing::{error, info};

/// Why microphone acquisition failed. Surfaced once to the caller; no
/// retry loop sits behind it, and a failed acquisition leaves nothing
/// running.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device available")]
    NoInputDevice,
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to read default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("failed to build input stream: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("failed to start input stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
}

/// Holds the live input stream; capture stops when this drops.
pub struct AudioCapture {
    _stream: cpal::Stream,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioCapture {
    /// Open the default input device and start pushing interleaved f32
    /// samples into `producer`. Lossy when the ring is full: the audio
    /// callback sheds samples rather than block.
    pub fn new<P>(mut producer: P) -> Result<Self, CaptureError>
    where
        P: Producer<Item = f32> + Send + 'static,
    {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoInputDevice)?;
        info!("audio input device: {}", device.name().unwrap_or_default());

        let config = device.default_input_config()?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        info!(sample_rate, channels, "audio capture config selected");

        let err_fn = |err| error!("input stream error: {}", err);

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &_| push_f32(data, &mut producer),
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config.into(),
                move |data: &[i16], _: &_| push_i16(data, &mut producer),
                err_fn,
                None,
            )?,
            other => return Err(CaptureError::UnsupportedFormat(format!("{:?}", other))),
        };

        stream.play()?;

        Ok(Self {
            _stream: stream,
            sample_rate,
            channels,
        })
    }
}

fn push_f32<P>(input: &[f32], producer: &mut P)
where
    P: Producer<Item = f32>,
{
    producer.push_slice(input);
}

fn push_i16<P>(input: &[i16], producer: &mut P)
where
    P: Producer<Item = f32>,
{
    for &sample in input {
        let _ = producer.try_push(sample as f32 / i16::MAX as f32);
    }
}
