//! Transcripts, replies and the keyword reply table.

use crate::command::CommandToken;
use crate::error::{AgentError, AgentResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a listen produced no usable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureErrorKind {
    /// Nothing was said before the listen timeout.
    Timeout,
    /// Speech was heard but could not be turned into text.
    Unintelligible,
    /// The recognition backend failed or could not be reached.
    ServiceUnavailable,
}

impl fmt::Display for CaptureErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaptureErrorKind::Timeout => "タイムアウトしました。音声が検出されませんでした。",
            CaptureErrorKind::Unintelligible => "音声を認識できませんでした",
            CaptureErrorKind::ServiceUnavailable => "認識サービスに接続できませんでした",
        };
        f.write_str(s)
    }
}

/// Outcome of one listen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: Option<String>,
    pub recognized: bool,
    pub error: Option<CaptureErrorKind>,
}

impl Transcript {
    pub fn recognized(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            recognized: true,
            error: None,
        }
    }

    pub fn failed(kind: CaptureErrorKind) -> Self {
        Self {
            text: None,
            recognized: false,
            error: Some(kind),
        }
    }

    /// Classify the outcome of a capture port call.
    pub fn from_capture(result: AgentResult<String>) -> Self {
        match result {
            Ok(text) if !text.trim().is_empty() => Self::recognized(text.trim()),
            Ok(_) | Err(AgentError::CaptureUnintelligible) => Self::failed(CaptureErrorKind::Unintelligible),
            Err(AgentError::CaptureTimeout) => Self::failed(CaptureErrorKind::Timeout),
            Err(_) => Self::failed(CaptureErrorKind::ServiceUnavailable),
        }
    }

    /// Recognized, non-blank text.
    pub fn utterance(&self) -> Option<&str> {
        if !self.recognized {
            return None;
        }
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// What the agent says back, with the commands found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub commands: Vec<CommandToken>,
}

/// Maps recognized text to reply text.
pub trait IntentClassifier: Send + Sync {
    /// Reply to a recognized utterance.
    fn classify(&self, utterance: &str) -> String;

    /// Reply when the listen failed. Never consults the keyword rules.
    fn fallback(&self, kind: CaptureErrorKind) -> String;
}

/// Reply text for `transcript`, routing failures to [`IntentClassifier::fallback`].
pub fn reply_text(classifier: &dyn IntentClassifier, transcript: &Transcript) -> String {
    match transcript.utterance() {
        Some(text) => classifier.classify(text),
        None => classifier.fallback(transcript.error.unwrap_or(CaptureErrorKind::Unintelligible)),
    }
}

/// First rule whose keyword appears in the utterance wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRule {
    pub keywords: Vec<String>,
    pub reply: String,
}

impl ReplyRule {
    fn new(keywords: &[&str], reply: &str) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            reply: reply.to_string(),
        }
    }

    fn matches(&self, utterance: &str) -> bool {
        self.keywords.iter().any(|k| !k.is_empty() && utterance.contains(k.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyTable {
    pub rules: Vec<ReplyRule>,
    /// Used when no rule matches; `{text}` is replaced with the utterance.
    pub echo_template: String,
    /// Nothing heard, or nothing understood.
    pub unheard: String,
    /// The recognition service failed.
    pub recognition_error: String,
}

impl Default for ReplyTable {
    fn default() -> Self {
        Self {
            rules: vec![
                ReplyRule::new(&["こんにちは"], "こんにちは！何かお手伝いしましょうか？"),
                ReplyRule::new(&["ありがとう", "どうも"], "どういたしまして！"),
                ReplyRule::new(&["天気"], "今日の天気はどうでしょうか？外を見てみてくださいね！"),
                ReplyRule::new(
                    &["名前"],
                    "私はVOICEVOXの連携するAIアシスタントで、声はつむぎが担当しています。",
                ),
                ReplyRule::new(
                    &["何ができる"],
                    "簡単な日常会話や、特定の質問に答えることができますよ。",
                ),
                ReplyRule::new(&["大きく"], "ウィンドウを大きくしますね。"),
                ReplyRule::new(&["小さく"], "ウィンドウを小さくしますね。"),
                ReplyRule::new(&["スライドショー開始", "動画開始"], "スライドショーを開始しますね。"),
                ReplyRule::new(&["スライドショー停止", "動画停止"], "スライドショーを停止しますね。"),
                ReplyRule::new(&["次のスライド", "次の動画"], "次のスライドに切り替えます。"),
                ReplyRule::new(&["さようなら", "バイバイ"], "はい、さようなら。またお話ししましょう。"),
            ],
            echo_template: "「{text}」ですね、承知しました。".to_string(),
            unheard: "すみません、うまく聞き取れませんでした。もう一度お願いします。".to_string(),
            recognition_error: "すみません、音声の認識で問題がありました。".to_string(),
        }
    }
}

/// [`IntentClassifier`] backed by a [`ReplyTable`].
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    table: ReplyTable,
}

impl KeywordClassifier {
    pub fn new(table: ReplyTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ReplyTable {
        &self.table
    }
}

impl IntentClassifier for KeywordClassifier {
    fn classify(&self, utterance: &str) -> String {
        self.table
            .rules
            .iter()
            .find(|rule| rule.matches(utterance))
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| self.table.echo_template.replace("{text}", utterance))
    }

    fn fallback(&self, kind: CaptureErrorKind) -> String {
        match kind {
            CaptureErrorKind::ServiceUnavailable => self.table.recognition_error.clone(),
            CaptureErrorKind::Timeout | CaptureErrorKind::Unintelligible => self.table.unheard.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> KeywordClassifier {
        KeywordClassifier::default()
    }

    #[test]
    fn greeting_and_thanks() {
        let c = classifier();
        assert_eq!(c.classify("こんにちは"), "こんにちは！何かお手伝いしましょうか？");
        assert_eq!(c.classify("どうもどうも"), "どういたしまして！");
    }

    #[test]
    fn earlier_rules_win() {
        // Greeting is checked before the farewell rule.
        let c = classifier();
        assert_eq!(
            c.classify("こんにちは、さようなら"),
            "こんにちは！何かお手伝いしましょうか？"
        );
    }

    #[test]
    fn unmatched_text_is_echoed() {
        assert_eq!(classifier().classify("りんご"), "「りんご」ですね、承知しました。");
    }

    #[test]
    fn failures_use_fallbacks() {
        let c = classifier();
        let timeout = Transcript::failed(CaptureErrorKind::Timeout);
        assert_eq!(
            reply_text(&c, &timeout),
            "すみません、うまく聞き取れませんでした。もう一度お願いします。"
        );
        let service = Transcript::failed(CaptureErrorKind::ServiceUnavailable);
        assert_eq!(reply_text(&c, &service), "すみません、音声の認識で問題がありました。");
    }

    #[test]
    fn blank_recognition_counts_as_unheard() {
        let c = classifier();
        let blank = Transcript::recognized("   ");
        assert_eq!(blank.utterance(), None);
        assert_eq!(reply_text(&c, &blank), c.table().unheard);
    }

    #[test]
    fn capture_errors_map_to_kinds() {
        assert_eq!(
            Transcript::from_capture(Ok(" 天気は？ ".to_string())),
            Transcript::recognized("天気は？")
        );
        assert_eq!(
            Transcript::from_capture(Err(AgentError::CaptureTimeout)).error,
            Some(CaptureErrorKind::Timeout)
        );
        assert_eq!(
            Transcript::from_capture(Ok(String::new())).error,
            Some(CaptureErrorKind::Unintelligible)
        );
        let service = Transcript::from_capture(Err(AgentError::RecognitionService("503".into())));
        assert!(!service.recognized);
        assert_eq!(service.error, Some(CaptureErrorKind::ServiceUnavailable));
    }

    #[test]
    fn video_aliases_map_to_slideshow_replies() {
        let c = classifier();
        assert_eq!(c.classify("動画開始して"), "スライドショーを開始しますね。");
        assert_eq!(c.classify("次の動画"), "次のスライドに切り替えます。");
    }
}
