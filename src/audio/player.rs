//! Local audio output for the playback session.

use crate::audio::wav;
use crate::error::{FacelinkError, Result};
use crate::playback::StartSignal;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Plays one WAV clip.
///
/// Implementations decode and open their output before waiting on `start`,
/// since waiting is what tells the session this channel is ready. They
/// then block until playback ends.
pub trait AudioPlayer: Send + Sync {
    fn play(&self, audio: &[u8], start: &StartSignal) -> Result<()>;

    fn name(&self) -> &str;
}

impl<T: AudioPlayer + ?Sized> AudioPlayer for Arc<T> {
    fn play(&self, audio: &[u8], start: &StartSignal) -> Result<()> {
        (**self).play(audio, start)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Keeps time without a device: waits for the clip duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAudioPlayer;

impl AudioPlayer for NullAudioPlayer {
    fn play(&self, audio: &[u8], start: &StartSignal) -> Result<()> {
        let decoded = wav::decode(audio)?;
        start.wait();
        std::thread::sleep(decoded.duration());
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Event recorded by [`MockAudioPlayer`].
#[derive(Debug, Clone)]
pub struct PlayEvent {
    pub first_byte: Option<u8>,
    pub started: Instant,
    pub finished: Instant,
}

/// Mock audio player for testing
#[derive(Debug, Clone)]
pub struct MockAudioPlayer {
    setup: Duration,
    duration: Duration,
    should_fail: bool,
    events: Arc<Mutex<Vec<PlayEvent>>>,
}

impl MockAudioPlayer {
    pub fn new() -> Self {
        Self {
            setup: Duration::ZERO,
            duration: Duration::ZERO,
            should_fail: false,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Pretend each clip lasts `duration`.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Spend `setup` preparing before reporting ready.
    pub fn with_setup(mut self, setup: Duration) -> Self {
        self.setup = setup;
        self
    }

    /// Configure the mock to fail after the start signal
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    pub fn events(&self) -> Arc<Mutex<Vec<PlayEvent>>> {
        self.events.clone()
    }
}

impl Default for MockAudioPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioPlayer for MockAudioPlayer {
    fn play(&self, audio: &[u8], start: &StartSignal) -> Result<()> {
        std::thread::sleep(self.setup);
        start.wait();
        let started = Instant::now();
        if self.should_fail {
            return Err(FacelinkError::AudioPlayback {
                message: "mock audio device failure".to_string(),
            });
        }
        std::thread::sleep(self.duration);
        if let Ok(mut events) = self.events.lock() {
            events.push(PlayEvent {
                first_byte: audio.first().copied(),
                started,
                finished: Instant::now(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(feature = "cpal-audio")]
pub use self::cpal_output::{CpalAudioPlayer, list_output_devices};

#[cfg(feature = "cpal-audio")]
mod cpal_output {
    use super::AudioPlayer;
    use crate::audio::wav;
    use crate::error::{FacelinkError, Result};
    use crate::playback::StartSignal;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use crossbeam_channel::bounded;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// List output device names.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| FacelinkError::AudioPlayback {
                message: format!("Failed to enumerate devices: {}", e),
            })?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn find_device(name: Option<&str>) -> Result<cpal::Device> {
        let host = cpal::default_host();
        match name {
            Some(name) => {
                let devices = host
                    .output_devices()
                    .map_err(|e| FacelinkError::AudioPlayback {
                        message: format!("Failed to enumerate devices: {}", e),
                    })?;
                for dev in devices {
                    if let Ok(dev_name) = dev.name()
                        && dev_name == name
                    {
                        return Ok(dev);
                    }
                }
                Err(FacelinkError::AudioDeviceNotFound {
                    device: name.to_string(),
                })
            }
            None => host
                .default_output_device()
                .ok_or_else(|| FacelinkError::AudioDeviceNotFound {
                    device: "default".to_string(),
                }),
        }
    }

    /// Plays clips on a cpal output device.
    ///
    /// The device is looked up per clip: a stream is opened, fed from a
    /// pre-converted buffer, and torn down when the callback drains it.
    #[derive(Debug, Clone, Default)]
    pub struct CpalAudioPlayer {
        device: Option<String>,
    }

    impl CpalAudioPlayer {
        /// `device` of `None` selects the host default.
        pub fn new(device: Option<&str>) -> Result<Self> {
            find_device(device)?;
            Ok(Self {
                device: device.map(str::to_string),
            })
        }
    }

    struct Playback {
        samples: Vec<f32>,
        position: usize,
    }

    impl AudioPlayer for CpalAudioPlayer {
        fn play(&self, audio: &[u8], start: &StartSignal) -> Result<()> {
            let decoded = wav::decode(audio)
                .inspect_err(|e| tracing::warn!("unsupported audio clip: {}", e))?;

            let device = find_device(self.device.as_deref())?;
            let default_config =
                device
                    .default_output_config()
                    .map_err(|e| FacelinkError::AudioPlayback {
                        message: format!("Failed to query default output config: {}", e),
                    })?;
            let rate = default_config.sample_rate().0;
            let channels = default_config.channels();
            let stream_config: cpal::StreamConfig = default_config.clone().into();

            let samples = decoded.convert(rate, channels);
            let expected = Duration::from_secs_f64(
                samples.len() as f64 / (rate as f64 * channels.max(1) as f64),
            );
            let state = Arc::new(Mutex::new(Playback {
                samples,
                position: 0,
            }));
            let (done_tx, done_rx) = bounded::<()>(1);

            let err_callback = |err| tracing::error!("Audio stream error: {}", err);

            let fill = move |out: &mut dyn FnMut(usize, f32), len: usize| {
                if let Ok(mut playback) = state.lock() {
                    for i in 0..len {
                        let value = playback.samples.get(playback.position).copied();
                        match value {
                            Some(v) => {
                                out(i, v);
                                playback.position += 1;
                            }
                            None => out(i, 0.0),
                        }
                    }
                    if playback.position >= playback.samples.len() {
                        done_tx.try_send(()).ok();
                    }
                }
            };

            let stream = match default_config.sample_format() {
                cpal::SampleFormat::F32 => device.build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let len = data.len();
                        fill(&mut |i, v| data[i] = v, len);
                    },
                    err_callback,
                    None,
                ),
                cpal::SampleFormat::I16 => device.build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        let len = data.len();
                        fill(
                            &mut |i, v| data[i] = (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16,
                            len,
                        );
                    },
                    err_callback,
                    None,
                ),
                other => {
                    return Err(FacelinkError::AudioPlayback {
                        message: format!("Unsupported output sample format {:?}", other),
                    });
                }
            }
            .map_err(|e| FacelinkError::AudioPlayback {
                message: format!("Failed to build output stream: {}", e),
            })?;

            start.wait();
            stream.play().map_err(|e| FacelinkError::AudioPlayback {
                message: format!("Failed to start output stream: {}", e),
            })?;

            // Generous bound in case the device stops calling back
            let limit = expected + Duration::from_secs(2);
            if done_rx.recv_timeout(limit).is_err() {
                tracing::warn!("audio playback did not complete within {:?}", limit);
            }
            drop(stream);
            Ok(())
        }

        fn name(&self) -> &str {
            "cpal"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_player_waits_for_clip_duration() {
        let audio = wav::encode_pcm16(1000, &[0i16; 50]).unwrap();
        let started = Instant::now();
        NullAudioPlayer
            .play(&audio, &StartSignal::released())
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn null_player_rejects_bad_audio_without_waiting() {
        let (_trigger, signal) = StartSignal::pair();
        // Would block forever if it waited on the unfired signal
        assert!(NullAudioPlayer.play(b"not audio", &signal).is_err());
    }

    #[test]
    fn mock_player_records_after_start() {
        let player = MockAudioPlayer::new().with_duration(Duration::from_millis(5));
        let events = player.events();
        let (trigger, signal) = StartSignal::pair();

        let handle = std::thread::spawn(move || player.play(&[9, 1], &signal));
        std::thread::sleep(Duration::from_millis(10));
        assert!(events.lock().unwrap().is_empty());

        trigger.fire();
        handle.join().unwrap().unwrap();
        let log = events.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].first_byte, Some(9));
    }

    #[test]
    fn mock_player_failure() {
        let player = MockAudioPlayer::new().with_failure();
        assert!(matches!(
            player.play(&[], &StartSignal::released()),
            Err(FacelinkError::AudioPlayback { .. })
        ));
    }

    #[test]
    fn test_audio_player_trait_is_object_safe() {
        let player: Box<dyn AudioPlayer> = Box::new(MockAudioPlayer::new());
        assert_eq!(player.name(), "mock");
        assert!(player.play(&[1], &StartSignal::released()).is_ok());
    }
}
