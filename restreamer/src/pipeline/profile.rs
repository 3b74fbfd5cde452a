//! Static encoding profile table.
//!
//! The profile is a pure function of the destination's orientation and framing
//! policy. None of these numbers are tuned at runtime.

use serde::Serialize;

use crate::domain::VerticalMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScalingBehavior {
    Default,
    StretchToOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoProfile {
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub codec: &'static str,
    pub profile: &'static str,
    pub rate_control: &'static str,
    pub framerate: u32,
    pub gop_seconds: u32,
    pub b_frames: u32,
    pub scaling: ScalingBehavior,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioProfile {
    pub codec: &'static str,
    pub bitrate: u32,
    pub sample_rate: u32,
}

/// RTMP push behaviour of the channel output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputProfile {
    pub connection_retry_interval_secs: u32,
    pub num_retries: u32,
    pub restart_delay_secs: u32,
    pub cache_length_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodingProfile {
    pub video: VideoProfile,
    pub audio: AudioProfile,
    pub output: OutputProfile,
}

const AUDIO: AudioProfile = AudioProfile {
    codec: "AAC",
    bitrate: 128_000,
    sample_rate: 48_000,
};

const OUTPUT: OutputProfile = OutputProfile {
    connection_retry_interval_secs: 2,
    num_retries: 10,
    restart_delay_secs: 15,
    cache_length_secs: 30,
};

fn video(width: u32, height: u32, bitrate: u32, scaling: ScalingBehavior) -> VideoProfile {
    VideoProfile {
        width,
        height,
        bitrate,
        codec: "H264",
        profile: "HIGH",
        rate_control: "CBR",
        framerate: 30,
        gop_seconds: 2,
        b_frames: 2,
        scaling,
    }
}

/// Select the encoding profile for a destination.
pub fn select(is_vertical: bool, vertical_mode: VerticalMode) -> EncodingProfile {
    let video = if is_vertical {
        let scaling = match vertical_mode {
            VerticalMode::Crop => ScalingBehavior::Default,
            VerticalMode::Letterbox => ScalingBehavior::StretchToOutput,
        };
        video(1080, 1920, 4_000_000, scaling)
    } else {
        video(1920, 1080, 5_000_000, ScalingBehavior::Default)
    };

    EncodingProfile {
        video,
        audio: AUDIO,
        output: OUTPUT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horizontal_ignores_vertical_mode() {
        let crop = select(false, VerticalMode::Crop);
        let letterbox = select(false, VerticalMode::Letterbox);
        assert_eq!(crop, letterbox);
        assert_eq!((crop.video.width, crop.video.height), (1920, 1080));
        assert_eq!(crop.video.bitrate, 5_000_000);
    }

    #[test]
    fn test_vertical_profiles() {
        let crop = select(true, VerticalMode::Crop);
        assert_eq!((crop.video.width, crop.video.height), (1080, 1920));
        assert_eq!(crop.video.bitrate, 4_000_000);
        assert_eq!(crop.video.scaling, ScalingBehavior::Default);

        let letterbox = select(true, VerticalMode::Letterbox);
        assert_eq!(letterbox.video.scaling, ScalingBehavior::StretchToOutput);
    }

    #[test]
    fn test_shared_parameters() {
        let profile = select(true, VerticalMode::Crop);
        assert_eq!(profile.video.gop_seconds, 2);
        assert_eq!(profile.video.b_frames, 2);
        assert_eq!(profile.audio.sample_rate, 48_000);
        assert_eq!(profile.output.num_retries, 10);

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["video"]["scaling"], "DEFAULT");
    }
}
