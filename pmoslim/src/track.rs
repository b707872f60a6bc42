//! Pistes et playlists du service de résolution

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
}

/// Piste telle que décrite par le service de résolution
///
/// Immuable une fois placée dans une file de lecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub video_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub album: Option<Album>,
    /// `M:SS` ou `H:MM:SS`
    #[serde(default)]
    pub duration: Option<String>,
}

impl Track {
    /// Durée en secondes, si elle est connue et lisible.
    ///
    /// Sans durée, la fin de piste n'est pas détectée : la lecture continue
    /// jusqu'à une commande explicite (suivant, reset...).
    pub fn duration_secs(&self) -> Option<u64> {
        self.duration.as_deref().and_then(parse_duration)
    }

    /// Texte affiché pendant la lecture : `titre from album by artiste`
    pub fn now_playing_text(&self) -> String {
        let mut text = self.title.clone();
        if let Some(album) = self.album.as_ref().filter(|a| !a.name.is_empty()) {
            text.push_str(" from ");
            text.push_str(&album.name);
        }
        if let Some(artist) = self.artists.first().filter(|a| !a.name.is_empty()) {
            text.push_str(" by ");
            text.push_str(&artist.name);
        }
        text
    }
}

/// Playlist renvoyée par `GET /api/playlist/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Playlist {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

/// Convertit `M:SS` ou `H:MM:SS` en secondes.
///
/// ```
/// # use pmoslim::track::parse_duration;
/// assert_eq!(parse_duration("3:25"), Some(205));
/// assert_eq!(parse_duration("1:02:03"), Some(3723));
/// assert_eq!(parse_duration("n/a"), None);
/// ```
pub fn parse_duration(input: &str) -> Option<u64> {
    let parts: Vec<&str> = input.trim().split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }
    let mut total = 0u64;
    for (i, part) in parts.iter().enumerate() {
        let value: u64 = part.parse().ok()?;
        if i > 0 && value >= 60 {
            return None;
        }
        total = total * 60 + value;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("0:05"), Some(5));
        assert_eq!(parse_duration("12:00"), Some(720));
        assert_eq!(parse_duration("2:00:01"), Some(7201));
        assert_eq!(parse_duration("42"), None);
        assert_eq!(parse_duration("1:75"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_track_from_resolver_json() {
        let json = r#"{
            "videoId": "abc123",
            "title": "Everything In Its Right Place",
            "artists": [{"name": "Radiohead", "id": "x"}],
            "album": {"name": "Kid A", "id": "y"},
            "duration": "4:11",
            "likeStatus": "INDIFFERENT"
        }"#;
        let track: Track = serde_json::from_str(json).unwrap();
        assert_eq!(track.video_id, "abc123");
        assert_eq!(track.duration_secs(), Some(251));
        assert_eq!(
            track.now_playing_text(),
            "Everything In Its Right Place from Kid A by Radiohead"
        );
    }

    #[test]
    fn test_now_playing_without_album() {
        let track: Track =
            serde_json::from_str(r#"{"videoId": "v", "title": "Live", "album": null}"#).unwrap();
        assert_eq!(track.now_playing_text(), "Live");
        assert_eq!(track.duration_secs(), None);
    }
}
