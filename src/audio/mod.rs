pub mod player;
pub mod wav;

#[cfg(feature = "cpal-audio")]
pub use player::{CpalAudioPlayer, list_output_devices};
pub use player::{AudioPlayer, MockAudioPlayer, NullAudioPlayer, PlayEvent};

use crate::config::AudioConfig;
use crate::error::Result;
use std::sync::Arc;

/// Pick the audio output for the configured device.
///
/// Disabled audio, or a build without a sound backend, keeps time with
/// [`NullAudioPlayer`] so animation pacing is unchanged.
pub fn build_player(config: &AudioConfig) -> Result<Arc<dyn AudioPlayer>> {
    if !config.enabled {
        tracing::debug!("audio output disabled");
        return Ok(Arc::new(NullAudioPlayer));
    }

    #[cfg(feature = "cpal-audio")]
    {
        let player = CpalAudioPlayer::new(config.device.as_deref())?;
        Ok(Arc::new(player))
    }

    #[cfg(not(feature = "cpal-audio"))]
    {
        tracing::warn!("built without cpal-audio, audio output disabled");
        Ok(Arc::new(NullAudioPlayer))
    }
}
