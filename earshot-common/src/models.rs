//! Episode and catalog record models
//!
//! `Episode` is the immutable value the player works with. `SearchHit` and
//! `DirectoryEpisode` are the wire shapes returned by the search and directory
//! services; both convert into an `Episode`.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Stable episode identity.
///
/// The player compares episodes by this value, never by stream URL, so that
/// re-selecting the same episode at a new offset is not mistaken for a switch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeId(#[serde(deserialize_with = "string_or_number")] String);

impl EpisodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EpisodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One playable unit. Replaced, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: EpisodeId,
    pub title: String,
    /// Audio stream URL; `None` disables the play affordance
    #[serde(default)]
    pub stream_url: Option<String>,
    /// Declared total duration, used when the media cannot report one
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default)]
    pub podcast_title: Option<String>,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Episode {
    /// Minimal episode with a stream URL and declared duration
    pub fn new(
        id: impl Into<EpisodeId>,
        title: impl Into<String>,
        stream_url: impl Into<String>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            stream_url: Some(stream_url.into()),
            duration_seconds,
            podcast_title: None,
            artwork_url: None,
            description: None,
        }
    }

    /// Stream URL, treating empty or blank values as missing
    pub fn stream_url(&self) -> Option<&str> {
        non_blank(self.stream_url.as_deref())
    }

    /// True when the episode has something to play
    pub fn is_playable(&self) -> bool {
        self.stream_url().is_some()
    }

    /// Declared duration, if it is a usable positive number
    pub fn declared_duration(&self) -> Option<f64> {
        (self.duration_seconds.is_finite() && self.duration_seconds > 0.0)
            .then_some(self.duration_seconds)
    }
}

impl From<String> for EpisodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Ranked search result: a question/answer moment inside an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: EpisodeId,
    pub title: String,
    #[serde(default)]
    pub podcast_title: String,
    #[serde(default)]
    pub episode_description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub date_published: String,
    /// Declared episode duration in seconds
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub enclosure_url: String,
    /// Start of the matching moment, milliseconds into the episode
    #[serde(default)]
    pub start: Option<f64>,
    /// End of the matching moment, milliseconds into the episode
    #[serde(default)]
    pub end: Option<f64>,
    #[serde(default)]
    pub episode_image: Option<String>,
    #[serde(default)]
    pub podcast_url: Option<String>,
    /// Vector distance reported by the search service (lower is closer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl SearchHit {
    /// Start offset usable as an initial seek target
    pub fn start_offset_ms(&self) -> Option<f64> {
        self.start.filter(|ms| ms.is_finite() && *ms >= 0.0)
    }

    pub fn to_episode(&self) -> Episode {
        Episode {
            id: self.id.clone(),
            title: self.title.clone(),
            stream_url: non_blank(Some(&self.enclosure_url)).map(str::to_string),
            duration_seconds: self.duration,
            podcast_title: non_blank(Some(&self.podcast_title)).map(str::to_string),
            artwork_url: self.episode_image.clone(),
            description: non_blank(Some(&self.episode_description)).map(str::to_string),
        }
    }
}

/// Episode record returned by the directory listing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEpisode {
    pub id: EpisodeId,
    #[serde(default)]
    pub podcast_id: Option<serde_json::Value>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub podcast_url: Option<String>,
    #[serde(default)]
    pub podcast_image: Option<String>,
    #[serde(default)]
    pub episode_image: Option<String>,
    #[serde(default)]
    pub enclosure_url: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub date_published: Option<serde_json::Value>,
}

impl DirectoryEpisode {
    pub fn to_episode(&self) -> Episode {
        Episode {
            id: self.id.clone(),
            title: self.title.clone(),
            stream_url: non_blank(self.enclosure_url.as_deref()).map(str::to_string),
            duration_seconds: self.duration.unwrap_or(0.0),
            podcast_title: None,
            artwork_url: self
                .episode_image
                .clone()
                .or_else(|| self.podcast_image.clone()),
            description: self.description.clone(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

/// Accept ids encoded as either JSON strings or numbers
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
        RawId::Float(n) => n.to_string(),
    })
}
