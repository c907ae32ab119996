use super::time_source::*;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::*;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One stereo sample pair as produced by the APU.
pub type AudioFrame = (f32, f32);

/// State shared between the emulation thread and the device callback: the
/// frames waiting to be played and a running count of device frames that
/// have gone out.
struct Shared {
    queue: VecDeque<AudioFrame>,
    frames_played: u64,
}

/// Paces emulation off the audio hardware itself. Time is how many frames
/// the device has consumed so far, whether or not the queue could supply
/// them, so an underrun stalls the sound but not the clock.
pub struct AudioDriverTimeSource {
    shared: Arc<Mutex<Shared>>,
    device_rate: u32,
}

impl TimeSource for AudioDriverTimeSource {
    fn time_ns(&self) -> u64 {
        let shared = self.shared.lock().unwrap();
        shared.frames_played * 1_000_000_000 / self.device_rate as u64
    }
}

/// Producer half handed to the emulation loop.
pub struct AudioDriverSink {
    shared: Arc<Mutex<Shared>>,
    max_queued: usize,
}

impl AudioDriverSink {
    /// Appends a batch of stereo frames. If the emulation has run further
    /// ahead than the latency budget allows, the oldest queued audio is
    /// dropped to keep output near real time.
    pub fn append(&mut self, frames: &[AudioFrame]) {
        let mut shared = self.shared.lock().unwrap();
        shared.queue.extend(frames.iter().copied());
        let excess = shared.queue.len().saturating_sub(self.max_queued);
        if excess > 0 {
            warn!("Audio queue over budget; dropping {} frames.", excess);
            shared.queue.drain(..excess);
        }
    }
}

/// Owns the host output stream. Frames go in at the emulated sample rate
/// through `sink()`; the device callback drains them at the device's own
/// rate, interpolating across the rate mismatch.
pub struct AudioDriver {
    shared: Arc<Mutex<Shared>>,
    device_rate: u32,
    max_queued: usize,
    _stream: cpal::Stream,
}

impl AudioDriver {
    pub fn new(sample_rate: u32, latency_ms: u32) -> Self {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .expect("No audio output device available.");
        let default_config = device
            .default_output_config()
            .expect("No default output config for device.");

        let device_rate = default_config.sample_rate().0;
        let channels = default_config.channels() as usize;
        let sample_format = default_config.sample_format();
        let config = default_config.config();

        info!("Sound:");
        info!("\t Device: {:?}", device.name().unwrap_or_default());
        info!("\t Device sample format: {:?}", sample_format);
        info!("\t Device sample rate: {}", device_rate);
        info!("\t Device channels: {}", channels);

        let max_queued = (sample_rate * latency_ms / 1000) as usize;
        let shared = Arc::new(Mutex::new(Shared {
            queue: VecDeque::with_capacity(max_queued),
            frames_played: 0,
        }));

        // How far the emulated stream advances per device frame.
        let step = sample_rate as f64 / device_rate as f64;

        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &config, channels, step, shared.clone())
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &config, channels, step, shared.clone())
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &config, channels, step, shared.clone())
            }
        };

        stream.play().unwrap();

        AudioDriver {
            shared,
            device_rate,
            max_queued,
            _stream: stream,
        }
    }

    pub fn sink(&self) -> AudioDriverSink {
        AudioDriverSink {
            shared: self.shared.clone(),
            max_queued: self.max_queued,
        }
    }

    pub fn time_source(&self) -> Box<dyn TimeSource> {
        Box::new(AudioDriverTimeSource {
            shared: self.shared.clone(),
            device_rate: self.device_rate,
        })
    }
}

/// Builds the output stream for one device sample format.
///
/// Each device frame advances a phase accumulator by the rate ratio and pops
/// a queued frame for every whole source sample crossed; the fractional
/// remainder linearly interpolates between the two frames around the read
/// position, so the same loop upsamples and downsamples. On underrun the
/// last frame is held rather than snapping to zero.
fn build_stream<T: cpal::Sample>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    step: f64,
    shared: Arc<Mutex<Shared>>,
) -> cpal::Stream {
    let err_fn = |err| error!("An error occurred on the output audio stream: {}", err);

    let mut phase = 0.0f64;
    let mut previous: AudioFrame = (0.0, 0.0);
    let mut current: AudioFrame = (0.0, 0.0);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut shared = shared.lock().unwrap();
                for frame in data.chunks_mut(channels) {
                    phase += step;
                    while phase >= 1.0 {
                        phase -= 1.0;
                        previous = current;
                        current = shared.queue.pop_front().unwrap_or(current);
                    }

                    let t = phase as f32;
                    let left = previous.0 + (current.0 - previous.0) * t;
                    let right = previous.1 + (current.1 - previous.1) * t;

                    // Stereo pair spread across however many channels the
                    // device exposes.
                    for (i, sample) in frame.iter_mut().enumerate() {
                        *sample = cpal::Sample::from(if i % 2 == 0 { &left } else { &right });
                    }
                    shared.frames_played += 1;
                }
            },
            err_fn,
        )
        .unwrap()
}
