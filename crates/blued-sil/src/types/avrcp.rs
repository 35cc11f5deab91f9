use serde::{Deserialize, Serialize};

/// AVRCP pass-through key code.
///
/// `Unknown` captures any string outside the closed set; handlers
/// surface it as `keyCodeInvalidValueParam`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum PassThroughKeyCode {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    FastForward,
    Rewind,
    VolumeUp,
    VolumeDown,
    Mute,
    Power,
    Unknown,
}

impl PassThroughKeyCode {
    /// Wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Next => "next",
            Self::Previous => "previous",
            Self::FastForward => "fastForward",
            Self::Rewind => "rewind",
            Self::VolumeUp => "volumeUp",
            Self::VolumeDown => "volumeDown",
            Self::Mute => "mute",
            Self::Power => "power",
            Self::Unknown => "unknown",
        }
    }

    /// Parses the wire representation, yielding `Unknown` for anything
    /// outside the closed set.
    pub fn parse(value: &str) -> Self {
        match value {
            "play" => Self::Play,
            "pause" => Self::Pause,
            "stop" => Self::Stop,
            "next" => Self::Next,
            "previous" => Self::Previous,
            "fastForward" => Self::FastForward,
            "rewind" => Self::Rewind,
            "volumeUp" => Self::VolumeUp,
            "volumeDown" => Self::VolumeDown,
            "mute" => Self::Mute,
            "power" => Self::Power,
            _ => Self::Unknown,
        }
    }
}

/// AVRCP pass-through key state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum PassThroughKeyStatus {
    Pressed,
    Released,
    Unknown,
}

impl PassThroughKeyStatus {
    /// Wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pressed => "pressed",
            Self::Released => "released",
            Self::Unknown => "unknown",
        }
    }

    /// Parses the wire representation.
    pub fn parse(value: &str) -> Self {
        match value {
            "pressed" => Self::Pressed,
            "released" => Self::Released,
            _ => Self::Unknown,
        }
    }
}

/// Player equalizer setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Equalizer {
    Off,
    On,
    Unknown,
}

impl Equalizer {
    /// Wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::On => "on",
            Self::Unknown => "unknown",
        }
    }

    /// Parses the wire representation.
    pub fn parse(value: &str) -> Self {
        match value {
            "off" => Self::Off,
            "on" => Self::On,
            _ => Self::Unknown,
        }
    }
}

/// Player repeat mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Repeat {
    Off,
    SingleTrack,
    AllTracks,
    Group,
    Unknown,
}

impl Repeat {
    /// Wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::SingleTrack => "singleTrack",
            Self::AllTracks => "allTracks",
            Self::Group => "group",
            Self::Unknown => "unknown",
        }
    }

    /// Parses the wire representation.
    pub fn parse(value: &str) -> Self {
        match value {
            "off" => Self::Off,
            "singleTrack" => Self::SingleTrack,
            "allTracks" => Self::AllTracks,
            "group" => Self::Group,
            _ => Self::Unknown,
        }
    }
}

/// Player shuffle mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Shuffle {
    Off,
    AllTracks,
    Group,
    Unknown,
}

impl Shuffle {
    /// Wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::AllTracks => "allTracks",
            Self::Group => "group",
            Self::Unknown => "unknown",
        }
    }

    /// Parses the wire representation.
    pub fn parse(value: &str) -> Self {
        match value {
            "off" => Self::Off,
            "allTracks" => Self::AllTracks,
            "group" => Self::Group,
            _ => Self::Unknown,
        }
    }
}

/// Player scan mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Scan {
    Off,
    AllTracks,
    Group,
    Unknown,
}

impl Scan {
    /// Wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::AllTracks => "allTracks",
            Self::Group => "group",
            Self::Unknown => "unknown",
        }
    }

    /// Parses the wire representation.
    pub fn parse(value: &str) -> Self {
        match value {
            "off" => Self::Off,
            "allTracks" => Self::AllTracks,
            "group" => Self::Group,
            _ => Self::Unknown,
        }
    }
}

/// One player application setting delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum PlayerApplicationSetting {
    Equalizer(Equalizer),
    Repeat(Repeat),
    Shuffle(Shuffle),
    Scan(Scan),
}

/// Media playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum PlayStatus {
    Stopped,
    Playing,
    Paused,
    FwdSeek,
    RevSeek,
    Error,
}

impl PlayStatus {
    /// Wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::FwdSeek => "fwd_seek",
            Self::RevSeek => "rev_seek",
            Self::Error => "error",
        }
    }
}

/// Media metadata exchanged with the remote controller.
///
/// `mediaNumber` and `totalMediaCount` are accepted as aliases on input
/// for compatibility with older clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaMetaData {
    /// Track title.
    pub title: String,
    /// Performing artist.
    pub artist: String,
    /// Album name.
    pub album: String,
    /// Genre name.
    pub genre: String,
    /// Track number within the album.
    #[serde(alias = "mediaNumber")]
    pub track_number: u64,
    /// Number of tracks in the album.
    #[serde(alias = "totalMediaCount")]
    pub track_count: u64,
    /// Track duration in milliseconds.
    pub duration: u64,
}

/// Play status exchanged with the remote controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPlayStatus {
    /// Track duration in milliseconds.
    #[serde(default)]
    pub duration: u64,
    /// Playback position in milliseconds.
    #[serde(default)]
    pub position: u64,
    /// Playback state.
    pub status: PlayStatus,
}

/// Media player type advertised by the remote target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum PlayerType {
    Audio,
    Video,
    AudioBroadcasting,
    VideoBroadcasting,
    Unknown,
}

impl PlayerType {
    /// Wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::AudioBroadcasting => "audioBroadcasting",
            Self::VideoBroadcasting => "videoBroadcasting",
            Self::Unknown => "unknown",
        }
    }
}

/// One media player reported by the remote target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    /// Display name of the player.
    pub name: String,
    /// Kind of content the player handles.
    #[serde(rename = "type")]
    pub player_type: PlayerType,
    /// Whether this player is the addressed player.
    #[serde(default)]
    pub addressed: bool,
    /// Whether the player supports browsing.
    #[serde(default)]
    pub browsable: bool,
    /// Whether the player supports searching.
    #[serde(default)]
    pub searchable: bool,
    /// Browse path of the player's playlist folder.
    #[serde(default)]
    pub playlist_path: String,
}

/// Kind of entry in a browse folder listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum FolderItemType {
    Folder,
    Media,
    Unknown,
}

impl FolderItemType {
    /// Wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Media => "media",
            Self::Unknown => "unknown",
        }
    }
}

/// One entry of a browse folder listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderItem {
    /// Display name.
    pub name: String,
    /// Browse path used to address the item.
    pub path: String,
    /// Entry kind.
    #[serde(rename = "itemType")]
    pub item_type: FolderItemType,
    /// Whether the item can be played directly.
    #[serde(default)]
    pub playable: bool,
}

/// AVRCP role of the local end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AvrcpRole {
    /// Controller (CT).
    Controller,
    /// Target (TG).
    Target,
}

impl AvrcpRole {
    /// Wire representation (`CT` / `TG`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Controller => "CT",
            Self::Target => "TG",
        }
    }
}

/// Feature category reported for the remote end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RemoteFeatures {
    None,
    MetaData,
    AbsoluteVolume,
    Browse,
}

impl RemoteFeatures {
    /// Wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::MetaData => "metaData",
            Self::AbsoluteVolume => "absoluteVolume",
            Self::Browse => "browse",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_code_round_trip() {
        for code in [
            PassThroughKeyCode::Play,
            PassThroughKeyCode::Pause,
            PassThroughKeyCode::Stop,
            PassThroughKeyCode::Next,
            PassThroughKeyCode::Previous,
            PassThroughKeyCode::FastForward,
            PassThroughKeyCode::Rewind,
            PassThroughKeyCode::VolumeUp,
            PassThroughKeyCode::VolumeDown,
            PassThroughKeyCode::Mute,
            PassThroughKeyCode::Power,
        ] {
            assert_eq!(PassThroughKeyCode::parse(code.as_str()), code);
        }
        assert_eq!(
            PassThroughKeyCode::parse("eject"),
            PassThroughKeyCode::Unknown
        );
    }

    #[test]
    fn settings_aliases_parse() {
        assert_eq!(Repeat::parse("singleTrack"), Repeat::SingleTrack);
        assert_eq!(Repeat::parse("single"), Repeat::Unknown);
        assert_eq!(Shuffle::parse("allTracks"), Shuffle::AllTracks);
        assert_eq!(Scan::parse("group"), Scan::Group);
        assert_eq!(Equalizer::parse("on"), Equalizer::On);
    }

    #[test]
    fn metadata_accepts_legacy_field_names() {
        let data: MediaMetaData = serde_json::from_value(serde_json::json!({
            "title": "t",
            "mediaNumber": 3,
            "totalMediaCount": 12,
            "duration": 1000,
        }))
        .expect("metadata");
        assert_eq!(data.track_number, 3);
        assert_eq!(data.track_count, 12);
        assert_eq!(data.duration, 1000);
    }

    #[test]
    fn play_status_strings_use_snake_case() {
        let status: PlayStatus = serde_json::from_value(serde_json::json!("fwd_seek"))
            .expect("status");
        assert_eq!(status, PlayStatus::FwdSeek);
        assert_eq!(PlayStatus::RevSeek.as_str(), "rev_seek");
    }
}
