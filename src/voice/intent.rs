//! Mapping recognized speech to a command intent.

use crate::gate::TaskKind;

/// The classified meaning of a recognized voice command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Image,
    Video,
    LiveCapture,
    Exit,
    /// No keyword matched; carries the recognized text verbatim.
    Unrecognized(String),
}

impl Intent {
    /// The task this intent starts, if it is an action intent.
    pub fn task_kind(&self) -> Option<TaskKind> {
        match self {
            Self::Image => Some(TaskKind::Image),
            Self::Video => Some(TaskKind::Video),
            Self::LiveCapture => Some(TaskKind::LiveCapture),
            Self::Exit | Self::Unrecognized(_) => None,
        }
    }
}

/// Pure, synchronous text-to-intent classification.
pub trait CommandClassifier: Send + Sync {
    fn classify(&self, raw: &str) -> Intent;
}

/// Keywords checked in order; the first intent with a matching keyword wins.
///
/// Image is checked before video, video before live capture, and exit
/// last, so "拍照生成圖像" resolves to `Image`.
pub const DEFAULT_KEYWORDS: &[(Intent, &[&str])] = &[
    (Intent::Image, &["生成圖像", "圖像", "圖片", "image", "picture"]),
    (Intent::Video, &["生成影片", "影片", "video"]),
    (Intent::LiveCapture, &["即時拍照", "拍照", "live", "camera"]),
    (Intent::Exit, &["結束", "離開", "掰掰", "exit", "quit"]),
];

/// Case-insensitive substring matcher over an ordered keyword table.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    table: Vec<(Intent, Vec<String>)>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_KEYWORDS
                .iter()
                .map(|(intent, words)| {
                    (
                        intent.clone(),
                        words.iter().map(|w| (*w).to_owned()).collect(),
                    )
                })
                .collect(),
        )
    }
}

impl KeywordClassifier {
    /// Build from an ordered table. Keywords are lowercased once here.
    pub fn new(table: Vec<(Intent, Vec<String>)>) -> Self {
        let table = table
            .into_iter()
            .map(|(intent, words)| {
                let words = words
                    .into_iter()
                    .map(|w| w.trim().to_lowercase())
                    .filter(|w| !w.is_empty())
                    .collect();
                (intent, words)
            })
            .collect();
        Self { table }
    }
}

impl CommandClassifier for KeywordClassifier {
    fn classify(&self, raw: &str) -> Intent {
        let text = raw.trim();
        let lowered = text.to_lowercase();
        self.table
            .iter()
            .find(|(_, words)| words.iter().any(|w| lowered.contains(w.as_str())))
            .map(|(intent, _)| intent.clone())
            .unwrap_or_else(|| Intent::Unrecognized(text.to_owned()))
    }
}
