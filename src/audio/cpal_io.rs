//! cpal-backed implementation of the `AudioIo` trait.

use super::{AudioDeviceInfo, AudioError, AudioIo};
use crate::types::AudioFrame;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Host, Sample, SampleFormat, SizedSample, Stream};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// ~20ms of audio at the capture rate, matching the WakewordListener's
/// frame size contract.
const FRAME_MS: u32 = 20;

pub fn list_input_devices() -> Result<Vec<AudioDeviceInfo>, AudioError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| AudioError::Device(e.to_string()))?;
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok());

    let mut out = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            let is_default = default_name.as_deref() == Some(name.as_str());
            out.push(AudioDeviceInfo { name, is_default });
        }
    }
    Ok(out)
}

pub struct CpalAudioIo {
    _host: Host,
    device: Device,
    stream: Stream,
    output_device: Device,
    buffer: Arc<Mutex<VecDeque<i16>>>,
    capture_rate: u32,
    frame_len: usize,
}

impl CpalAudioIo {
    pub fn new(device_name: Option<&str>) -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            host.input_devices()
                .map_err(|e| AudioError::Device(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| AudioError::Device(format!("device '{name}' not found")))?
        } else {
            host.default_input_device()
                .ok_or_else(|| AudioError::Device("no default input device".to_string()))?
        };

        let output_device = host
            .default_output_device()
            .ok_or_else(|| AudioError::Device("no default output device".to_string()))?;

        let supported = device
            .default_input_config()
            .map_err(|e| AudioError::Device(e.to_string()))?;
        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.into();
        let capture_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels as usize;
        let frame_len = (capture_rate * FRAME_MS / 1000) as usize;

        let buffer = Arc::new(Mutex::new(VecDeque::new()));
        let buffer_cb = Arc::clone(&buffer);

        let err_fn = |err| log::error!("capture stream error: {err}");

        let stream = match sample_format {
            SampleFormat::I16 => Self::build_stream::<i16>(
                &device,
                &stream_config,
                channels,
                buffer_cb,
                err_fn,
            )?,
            SampleFormat::F32 => Self::build_stream::<f32>(
                &device,
                &stream_config,
                channels,
                buffer_cb,
                err_fn,
            )?,
            other => {
                return Err(AudioError::Device(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        Ok(Self {
            _host: host,
            device,
            stream,
            output_device,
            buffer,
            capture_rate,
            frame_len,
        })
    }

    fn build_stream<T>(
        device: &Device,
        config: &cpal::StreamConfig,
        channels: usize,
        buffer: Arc<Mutex<VecDeque<i16>>>,
        err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
    ) -> Result<Stream, AudioError>
    where
        T: Sample + SizedSample + Send + 'static,
        i16: FromSample<T>,
    {
        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    let mut buf = buffer.lock().unwrap();
                    for frame in data.chunks(channels) {
                        if let Some(&sample) = frame.first() {
                            buf.push_back(i16::from_sample(sample));
                        }
                    }
                    // Guard against unbounded growth if a downstream reader stalls.
                    if buf.len() > 16 * 48_000 {
                        let excess = buf.len() - 8 * 48_000;
                        buf.drain(..excess);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))
    }
}

impl AudioIo for CpalAudioIo {
    fn read_frame(&mut self) -> Result<AudioFrame, AudioError> {
        loop {
            {
                let mut buf = self.buffer.lock().unwrap();
                if buf.len() >= self.frame_len {
                    let samples: Vec<i16> = buf.drain(..self.frame_len).collect();
                    return Ok(AudioFrame::new(samples, self.capture_rate));
                }
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn capture_rate(&self) -> u32 {
        self.capture_rate
    }

    /// Fire-and-forget (spec §4.1 step 2: "without blocking"): the stream is
    /// built and played on a helper thread, which sleeps out the beep's
    /// duration before tearing the stream down, so the capture/command-cycle
    /// thread never waits on it.
    fn play_beep(&self, freq_hz: f32, duration_ms: u32) -> Result<(), AudioError> {
        let sample_rate = 48_000u32;
        let n = (sample_rate as f32 * duration_ms as f32 / 1000.0) as usize;
        let samples: Vec<i16> = (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                let envelope = 1.0 - (i as f32 / n as f32);
                (f32::sin(2.0 * std::f32::consts::PI * freq_hz * t) * 8000.0 * envelope) as i16
            })
            .collect();

        let device = self.output_device.clone();
        std::thread::spawn(move || {
            if let Err(e) = play_pcm_blocking(&device, &samples, sample_rate) {
                log::warn!("beep playback failed: {e}");
            }
        });
        Ok(())
    }

    fn play_pcm(&self, samples: &[i16], sample_rate: u32) -> Result<(), AudioError> {
        play_pcm_blocking(&self.output_device, samples, sample_rate)
    }
}

/// Builds an output stream for `samples`, plays it, and blocks until
/// playback has finished before tearing the stream down.
fn play_pcm_blocking(device: &Device, samples: &[i16], sample_rate: u32) -> Result<(), AudioError> {
    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::Device(e.to_string()))?;
    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let _ = supported;

    let samples = Arc::new(samples.to_vec());
    let position = Arc::new(Mutex::new(0usize));
    let done = Arc::new(Mutex::new(false));

    let samples_cb = Arc::clone(&samples);
    let position_cb = Arc::clone(&position);
    let done_cb = Arc::clone(&done);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                let mut pos = position_cb.lock().unwrap();
                for out in data.iter_mut() {
                    *out = samples_cb.get(*pos).copied().unwrap_or(0);
                    *pos += 1;
                }
                if *pos >= samples_cb.len() {
                    *done_cb.lock().unwrap() = true;
                }
            },
            |err| log::error!("playback stream error: {err}"),
            None,
        )
        .map_err(|e| AudioError::Stream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::Stream(e.to_string()))?;

    let expected = Duration::from_secs_f32(samples.len() as f32 / sample_rate as f32);
    std::thread::sleep(expected + Duration::from_millis(20));
    Ok(())
}

impl std::fmt::Debug for CpalAudioIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalAudioIo")
            .field("device", &self.device.name().unwrap_or_default())
            .field("capture_rate", &self.capture_rate)
            .finish()
    }
}
