//! Destination entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DestinationStatus;
use crate::Error;

/// Target platform of a destination.
///
/// The platform decides the encoding profile (vertical or horizontal framing)
/// and the default ingest endpoint offered to operators.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Platform {
    Youtube,
    Facebook,
    Twitch,
    Tiktok,
    Instagram,
    Rumble,
    Linkedin,
    Custom,
}

impl Platform {
    /// Platforms that only accept 9:16 video.
    pub fn is_vertical(&self) -> bool {
        matches!(self, Self::Tiktok | Self::Instagram)
    }

    /// Well-known ingest endpoint for the platform, if it has a fixed one.
    pub fn default_ingest_url(&self) -> Option<&'static str> {
        match self {
            Self::Youtube => Some("rtmp://a.rtmp.youtube.com/live2"),
            Self::Facebook => Some("rtmps://live-api-s.facebook.com:443/rtmp/"),
            Self::Twitch => Some("rtmp://live.twitch.tv/app"),
            Self::Tiktok => Some("rtmp://push.tiktok.com/live"),
            Self::Instagram => Some("rtmps://live-upload.instagram.com:443/rtmp/"),
            Self::Rumble => Some("rtmp://stream.rumble.com/live"),
            Self::Linkedin => Some("rtmps://live-upload.linkedin.com:443/live"),
            Self::Custom => None,
        }
    }
}

/// Framing policy used when a horizontal source is sent to a vertical platform.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum VerticalMode {
    /// Fill the frame, cutting the sides.
    #[default]
    Crop,
    /// Fit the whole picture inside the frame.
    Letterbox,
}

/// Opaque stream key credential.
///
/// `Debug` never prints the key, so a destination can be logged safely.
#[derive(Clone, PartialEq, Eq)]
pub struct StreamKey(String);

impl StreamKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Raw key, only for handing to the pipeline service.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Masked form safe for API responses.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 4 {
            return "****".to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{tail}")
    }
}

impl std::fmt::Debug for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamKey(***)")
    }
}

/// A configured re-broadcast target.
#[derive(Debug, Clone)]
pub struct Destination {
    pub id: String,
    pub platform: Platform,
    pub name: String,
    pub ingest_url: String,
    pub stream_key: StreamKey,
    pub enabled: bool,
    pub vertical_mode: VerticalMode,
    pub status: DestinationStatus,
    pub pipeline_channel_ref: Option<String>,
    pub pipeline_input_ref: Option<String>,
    /// The last start attempt failed; polls retry it while the source is LIVE.
    pub start_retry: bool,
    /// Ingest settings changed after the pipeline was provisioned.
    pub pipeline_stale: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Destination {
    /// Create a new, inactive destination with no pipeline attached.
    pub fn new(
        platform: Platform,
        name: impl Into<String>,
        ingest_url: impl Into<String>,
        stream_key: StreamKey,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            platform,
            name: name.into(),
            ingest_url: ingest_url.into(),
            stream_key,
            enabled: true,
            vertical_mode: VerticalMode::default(),
            status: DestinationStatus::Inactive,
            pipeline_channel_ref: None,
            pipeline_input_ref: None,
            start_retry: false,
            pipeline_stale: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_vertical_mode(mut self, mode: VerticalMode) -> Self {
        self.vertical_mode = mode;
        self
    }

    /// Short id prefix used in external resource names.
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(8)
            .map(|(idx, _)| idx)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }

    pub fn has_pipeline(&self) -> bool {
        self.pipeline_channel_ref.is_some()
    }

    /// Whether an automatic LIVE edge should start this destination.
    pub fn is_startable(&self) -> bool {
        self.enabled && self.status != DestinationStatus::Active
    }

    /// Move to a new status, enforcing the transition table and the pipeline invariant.
    pub fn transition_to(&mut self, target: DestinationStatus) -> Result<(), Error> {
        let next = self.status.transition_to(target)?;
        if next.requires_pipeline() && self.pipeline_channel_ref.is_none() {
            return Err(Error::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: format!("{} without a pipeline channel", next.as_str()),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record freshly provisioned pipeline resources and enter `starting`.
    pub fn attach_pipeline(&mut self, channel_ref: String, input_ref: String) -> Result<(), Error> {
        self.pipeline_channel_ref = Some(channel_ref);
        self.pipeline_input_ref = Some(input_ref);
        self.pipeline_stale = false;
        self.transition_to(DestinationStatus::Starting)
    }
}

/// Operator-editable fields. `None` leaves the stored value untouched.
///
/// Status and pipeline references are owned by the reconciler and cannot be set here.
#[derive(Debug, Clone, Default)]
pub struct DestinationUpdate {
    pub name: Option<String>,
    pub ingest_url: Option<String>,
    pub stream_key: Option<StreamKey>,
    pub enabled: Option<bool>,
    pub vertical_mode: Option<VerticalMode>,
}

impl DestinationUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.ingest_url.is_none()
            && self.stream_key.is_none()
            && self.enabled.is_none()
            && self.vertical_mode.is_none()
    }

    /// Whether applying this update changes what the pipeline pushes or how it encodes.
    ///
    /// The framing policy only matters on vertical platforms.
    pub fn reshapes_pipeline(&self, dest: &Destination) -> bool {
        self.ingest_url
            .as_ref()
            .is_some_and(|url| *url != dest.ingest_url)
            || self
                .stream_key
                .as_ref()
                .is_some_and(|key| *key != dest.stream_key)
            || (dest.platform.is_vertical()
                && self.vertical_mode.is_some_and(|mode| mode != dest.vertical_mode))
    }

    /// Apply the present fields to an in-memory destination, marking an attached
    /// pipeline stale when the update reshapes it.
    pub fn apply_to(&self, dest: &mut Destination) {
        if dest.has_pipeline() && self.reshapes_pipeline(dest) {
            dest.pipeline_stale = true;
        }
        if let Some(name) = &self.name {
            dest.name = name.clone();
        }
        if let Some(url) = &self.ingest_url {
            dest.ingest_url = url.clone();
        }
        if let Some(key) = &self.stream_key {
            dest.stream_key = key.clone();
        }
        if let Some(enabled) = self.enabled {
            dest.enabled = enabled;
        }
        if let Some(mode) = self.vertical_mode {
            dest.vertical_mode = mode;
        }
        dest.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn destination(platform: Platform) -> Destination {
        Destination::new(
            platform,
            "Main",
            "rtmp://a.rtmp.youtube.com/live2",
            StreamKey::new("abcd-efgh-1234"),
        )
    }

    #[test]
    fn test_new_destination_defaults() {
        let dest = destination(Platform::Youtube);
        assert!(dest.enabled);
        assert_eq!(dest.status, DestinationStatus::Inactive);
        assert_eq!(dest.vertical_mode, VerticalMode::Crop);
        assert!(!dest.has_pipeline());
        assert_eq!(dest.short_id().len(), 8);
    }

    #[test]
    fn test_platform_parsing_and_orientation() {
        assert_eq!(Platform::from_str("TikTok").unwrap(), Platform::Tiktok);
        assert_eq!(Platform::Youtube.to_string(), "youtube");
        assert!(Platform::Instagram.is_vertical());
        assert!(!Platform::Twitch.is_vertical());
        assert!(Platform::Custom.default_ingest_url().is_none());
        assert!(Platform::from_str("myspace").is_err());
    }

    #[test]
    fn test_stream_key_never_debug_printed() {
        let dest = destination(Platform::Youtube);
        let printed = format!("{dest:?}");
        assert!(!printed.contains("abcd-efgh-1234"));
        assert_eq!(dest.stream_key.masked(), "****1234");
        assert_eq!(StreamKey::new("abc").masked(), "****");
    }

    #[test]
    fn test_active_requires_pipeline() {
        let mut dest = destination(Platform::Twitch);
        assert!(dest.transition_to(DestinationStatus::Starting).is_err());

        dest.attach_pipeline("ch-1".into(), "in-1".into()).unwrap();
        assert_eq!(dest.status, DestinationStatus::Starting);
        dest.transition_to(DestinationStatus::Active).unwrap();
        assert!(!dest.is_startable());

        dest.transition_to(DestinationStatus::Inactive).unwrap();
        assert_eq!(dest.pipeline_channel_ref.as_deref(), Some("ch-1"));
    }

    #[test]
    fn test_update_leaves_status_alone() {
        let mut dest = destination(Platform::Youtube);
        let update = DestinationUpdate {
            enabled: Some(false),
            name: Some("Backup".into()),
            ..Default::default()
        };
        assert!(!update.is_empty());
        update.apply_to(&mut dest);
        assert!(!dest.enabled);
        assert_eq!(dest.name, "Backup");
        assert_eq!(dest.status, DestinationStatus::Inactive);
        assert!(DestinationUpdate::default().is_empty());
    }

    #[test]
    fn test_ingest_changes_mark_pipeline_stale() {
        let mut dest = destination(Platform::Tiktok);
        dest.attach_pipeline("ch-1".into(), "in-1".into()).unwrap();

        let rename = DestinationUpdate {
            name: Some("Other".into()),
            stream_key: Some(StreamKey::new("abcd-efgh-1234")),
            ..Default::default()
        };
        assert!(!rename.reshapes_pipeline(&dest));
        rename.apply_to(&mut dest);
        assert!(!dest.pipeline_stale);

        let reframe = DestinationUpdate {
            vertical_mode: Some(VerticalMode::Letterbox),
            ..Default::default()
        };
        reframe.apply_to(&mut dest);
        assert!(dest.pipeline_stale);

        dest.transition_to(DestinationStatus::Inactive).unwrap();
        dest.attach_pipeline("ch-2".into(), "in-2".into()).unwrap();
        assert!(!dest.pipeline_stale);
    }

    #[test]
    fn test_framing_change_is_ignored_on_horizontal_platforms() {
        let dest = destination(Platform::Youtube);
        let update = DestinationUpdate {
            vertical_mode: Some(VerticalMode::Letterbox),
            ..Default::default()
        };
        assert!(!update.reshapes_pipeline(&dest));

        let key = DestinationUpdate {
            stream_key: Some(StreamKey::new("rotated")),
            ..Default::default()
        };
        assert!(key.reshapes_pipeline(&dest));
    }

    #[test]
    fn test_disabled_is_not_startable() {
        let dest = destination(Platform::Youtube).with_enabled(false);
        assert!(!dest.is_startable());
    }
}
