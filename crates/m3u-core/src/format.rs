//! Format resolution
//!
//! A stream locator rarely says what container sits behind it. IPTV
//! providers hand out extensionless urls, tokenized redirects and
//! mislabelled manifests, so the session guesses: it walks an ordered list
//! of container hypotheses and moves to the next one each time the engine
//! rejects the container or manifest.
//!
//! [`FormatResolutionIterator`] is the pure part of that search. It holds the
//! attempt order for one locator and maps a hypothesis to its successor.
//! Within one order a hypothesis appears at most once, so a walk from
//! [`FormatHypothesis::Unspecified`] reaches [`FormatHypothesis::Exhausted`]
//! after at most `order.len() + 1` steps.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Container / manifest types the engine can be told to expect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MimeType {
    SmoothStreaming,
    Hls,
    Dash,
    Rtsp,
    Progressive,
}

/// Default attempt order when nothing better is known
pub const DEFAULT_PRIORITY: [MimeType; 4] = [
    MimeType::SmoothStreaming,
    MimeType::Hls,
    MimeType::Dash,
    MimeType::Rtsp,
];

impl MimeType {
    /// MIME string handed to the engine
    pub fn as_str(&self) -> &'static str {
        match self {
            MimeType::SmoothStreaming => "application/vnd.ms-sstr+xml",
            MimeType::Hls => "application/x-mpegURL",
            MimeType::Dash => "application/dash+xml",
            MimeType::Rtsp => "application/x-rtsp",
            MimeType::Progressive => "video/mp4",
        }
    }

    /// Parse a MIME string, case-insensitively
    pub fn from_mime(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "application/vnd.ms-sstr+xml" => Some(MimeType::SmoothStreaming),
            "application/x-mpegurl" | "application/vnd.apple.mpegurl" | "audio/mpegurl" => {
                Some(MimeType::Hls)
            }
            "application/dash+xml" => Some(MimeType::Dash),
            "application/x-rtsp" => Some(MimeType::Rtsp),
            "video/mp4" | "video/mp2t" | "video/x-matroska" | "video/webm" => {
                Some(MimeType::Progressive)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for MimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of the format search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum FormatHypothesis {
    /// No guess made yet for this locator
    Unspecified(String),
    /// Attempting a known container type
    Trying(MimeType),
    /// Every hypothesis was rejected
    Exhausted,
}

impl FormatHypothesis {
    /// MIME type under test, if any
    pub fn mime_type(&self) -> Option<MimeType> {
        match self {
            FormatHypothesis::Trying(mime) => Some(*mime),
            _ => None,
        }
    }
}

impl std::fmt::Display for FormatHypothesis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatHypothesis::Unspecified(_) => write!(f, "unspecified"),
            FormatHypothesis::Trying(mime) => write!(f, "trying({})", mime),
            FormatHypothesis::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Ordered hypothesis search for a single locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatResolutionIterator {
    order: Vec<MimeType>,
}

impl FormatResolutionIterator {
    /// Iterator over a fixed priority list. Duplicates keep their first position.
    pub fn new(priority: &[MimeType]) -> Self {
        Self::with_guess(None, priority)
    }

    /// Iterator for `url`, optionally trying a guess inferred from the url first
    pub fn for_url(url: &str, priority: &[MimeType], pre_guess: bool) -> Self {
        let guess = if pre_guess { guess_from_url(url) } else { None };
        Self::with_guess(guess, priority)
    }

    fn with_guess(guess: Option<MimeType>, priority: &[MimeType]) -> Self {
        let mut order = Vec::with_capacity(priority.len() + 1);
        for mime in guess.into_iter().chain(priority.iter().copied()) {
            if !order.contains(&mime) {
                order.push(mime);
            }
        }
        Self { order }
    }

    /// Attempt order, guess first
    pub fn order(&self) -> &[MimeType] {
        &self.order
    }

    /// Index of `mime` in the attempt order
    pub fn position(&self, mime: MimeType) -> Option<usize> {
        self.order.iter().position(|m| *m == mime)
    }

    /// Successor of `current`.
    ///
    /// Advancing an exhausted search, or a hypothesis this iterator never
    /// proposed, is a caller bug and fails with `PreconditionViolation`.
    pub fn next(&self, current: &FormatHypothesis) -> Result<FormatHypothesis> {
        match current {
            FormatHypothesis::Unspecified(_) => Ok(self
                .order
                .first()
                .map(|mime| FormatHypothesis::Trying(*mime))
                .unwrap_or(FormatHypothesis::Exhausted)),
            FormatHypothesis::Trying(mime) => {
                let index = self.position(*mime).ok_or_else(|| {
                    Error::precondition(format!("{} is not in the attempt order", mime))
                })?;
                Ok(self
                    .order
                    .get(index + 1)
                    .map(|next| FormatHypothesis::Trying(*next))
                    .unwrap_or(FormatHypothesis::Exhausted))
            }
            FormatHypothesis::Exhausted => Err(Error::precondition(
                "cannot advance an exhausted format search",
            )),
        }
    }

    /// True unless the search is exhausted
    pub fn has_next(&self, current: &FormatHypothesis) -> bool {
        !matches!(current, FormatHypothesis::Exhausted)
    }
}

impl Default for FormatResolutionIterator {
    fn default() -> Self {
        Self::new(&DEFAULT_PRIORITY)
    }
}

const PROGRESSIVE_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mkv", "webm", "ts", "mov", "avi", "flv", "mp3", "aac", "m4a", "ogg",
];

/// Best single guess for a locator, from its scheme and path extension
pub fn guess_from_url(url: &str) -> Option<MimeType> {
    let (scheme, path) = match Url::parse(url) {
        Ok(parsed) => (parsed.scheme().to_ascii_lowercase(), parsed.path().to_ascii_lowercase()),
        Err(_) => {
            let raw = url.split(['?', '#']).next().unwrap_or_default();
            (String::new(), raw.to_ascii_lowercase())
        }
    };

    if scheme == "rtsp" || scheme == "rtsps" {
        return Some(MimeType::Rtsp);
    }

    if path.ends_with(".m3u8") || path.ends_with(".m3u") {
        return Some(MimeType::Hls);
    }
    if path.ends_with(".mpd") {
        return Some(MimeType::Dash);
    }
    if path.ends_with(".ism")
        || path.ends_with(".isml")
        || path.contains(".ism/")
        || path.contains(".isml/")
    {
        return Some(MimeType::SmoothStreaming);
    }

    let extension = path.rsplit_once('.').map(|(_, ext)| ext)?;
    if extension.contains('/') {
        return None;
    }
    PROGRESSIVE_EXTENSIONS
        .contains(&extension)
        .then_some(MimeType::Progressive)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(iter: &FormatResolutionIterator, url: &str) -> Vec<FormatHypothesis> {
        let mut seen = Vec::new();
        let mut current = FormatHypothesis::Unspecified(url.to_string());
        while iter.has_next(&current) {
            current = iter.next(&current).unwrap();
            seen.push(current.clone());
        }
        seen
    }

    #[test]
    fn test_default_order() {
        let iter = FormatResolutionIterator::default();
        let seen = walk(&iter, "http://example.com/live/1");
        assert_eq!(
            seen,
            vec![
                FormatHypothesis::Trying(MimeType::SmoothStreaming),
                FormatHypothesis::Trying(MimeType::Hls),
                FormatHypothesis::Trying(MimeType::Dash),
                FormatHypothesis::Trying(MimeType::Rtsp),
                FormatHypothesis::Exhausted,
            ]
        );
    }

    #[test]
    fn test_terminates_within_bound_without_repeats() {
        let urls = [
            "http://example.com/live/1",
            "http://example.com/master.m3u8?token=abc",
            "rtsp://camera.local/stream",
            "http://example.com/movie.mkv",
            "not a url at all",
        ];
        for url in urls {
            let iter = FormatResolutionIterator::for_url(url, &DEFAULT_PRIORITY, true);
            let seen = walk(&iter, url);
            assert!(seen.len() <= DEFAULT_PRIORITY.len() + 2, "{url}");
            assert_eq!(seen.last(), Some(&FormatHypothesis::Exhausted));

            let positions: Vec<usize> = seen
                .iter()
                .filter_map(|h| h.mime_type())
                .map(|m| iter.position(m).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]), "{url}");
        }
    }

    #[test]
    fn test_guess_goes_first_and_is_not_repeated() {
        let iter = FormatResolutionIterator::for_url(
            "http://example.com/index.m3u8",
            &DEFAULT_PRIORITY,
            true,
        );
        assert_eq!(
            iter.order(),
            &[
                MimeType::Hls,
                MimeType::SmoothStreaming,
                MimeType::Dash,
                MimeType::Rtsp
            ]
        );
    }

    #[test]
    fn test_guess_outside_priority_list_extends_order() {
        let iter =
            FormatResolutionIterator::for_url("http://vod.example.com/a.mp4", &DEFAULT_PRIORITY, true);
        assert_eq!(iter.order().len(), DEFAULT_PRIORITY.len() + 1);
        assert_eq!(iter.order()[0], MimeType::Progressive);
    }

    #[test]
    fn test_pre_guess_disabled() {
        let iter = FormatResolutionIterator::for_url(
            "http://example.com/index.m3u8",
            &DEFAULT_PRIORITY,
            false,
        );
        assert_eq!(iter.order(), &DEFAULT_PRIORITY);
    }

    #[test]
    fn test_exhausted_is_a_precondition_violation() {
        let iter = FormatResolutionIterator::default();
        let err = iter.next(&FormatHypothesis::Exhausted).unwrap_err();
        assert!(matches!(err, Error::PreconditionViolation(_)));
        assert!(!iter.has_next(&FormatHypothesis::Exhausted));
    }

    #[test]
    fn test_unknown_hypothesis_is_rejected() {
        let iter = FormatResolutionIterator::default();
        assert!(iter.next(&FormatHypothesis::Trying(MimeType::Progressive)).is_err());
    }

    #[test]
    fn test_empty_priority_exhausts_immediately() {
        let iter = FormatResolutionIterator::new(&[]);
        let next = iter
            .next(&FormatHypothesis::Unspecified("http://x".into()))
            .unwrap();
        assert_eq!(next, FormatHypothesis::Exhausted);
    }

    #[test]
    fn test_guess_from_url() {
        assert_eq!(guess_from_url("http://a.com/x/playlist.M3U8"), Some(MimeType::Hls));
        assert_eq!(guess_from_url("https://a.com/manifest.mpd?t=1"), Some(MimeType::Dash));
        assert_eq!(
            guess_from_url("http://a.com/Big.ism/Manifest"),
            Some(MimeType::SmoothStreaming)
        );
        assert_eq!(guess_from_url("rtsp://192.168.1.2:554/ch1"), Some(MimeType::Rtsp));
        assert_eq!(guess_from_url("http://a.com/movie/1/2/99.mkv"), Some(MimeType::Progressive));
        assert_eq!(guess_from_url("http://a.com:8080/live/u/p/1234"), None);
        assert_eq!(guess_from_url("http://a.com/v1.2/stream"), None);
    }

    #[test]
    fn test_mime_round_trip_strings() {
        assert_eq!(MimeType::from_mime("application/vnd.apple.mpegurl"), Some(MimeType::Hls));
        assert_eq!(MimeType::from_mime(MimeType::Dash.as_str()), Some(MimeType::Dash));
        assert_eq!(MimeType::from_mime("text/html"), None);
    }
}
