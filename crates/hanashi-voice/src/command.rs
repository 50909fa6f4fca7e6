//! Command tokens embedded in reply text.
//!
//! A reply such as 「ウィンドウを大きくしますね。」 carries a side effect. The
//! dispatcher finds these by substring match against a [`TriggerTable`], one pass,
//! at most one token per category.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResizeDirection {
    Larger,
    Smaller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandToken {
    Resize(ResizeDirection),
    SlideshowStart,
    SlideshowStop,
    SlideshowNext,
    Farewell,
}

/// Phrase lists per command. Matching is case-sensitive substring search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerTable {
    pub larger: Vec<String>,
    pub smaller: Vec<String>,
    pub slideshow_start: Vec<String>,
    pub slideshow_stop: Vec<String>,
    pub slideshow_next: Vec<String>,
    pub farewell: Vec<String>,
}

fn phrases(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for TriggerTable {
    fn default() -> Self {
        Self {
            larger: phrases(&["大きく"]),
            smaller: phrases(&["小さく"]),
            slideshow_start: phrases(&["スライドショーを開始", "スライドショー開始", "動画を開始"]),
            slideshow_stop: phrases(&["スライドショーを停止", "スライドショー停止", "動画を停止"]),
            slideshow_next: phrases(&["次のスライド", "次の動画"]),
            farewell: phrases(&["さようなら", "バイバイ"]),
        }
    }
}

/// Extracts [`CommandToken`]s from reply text.
#[derive(Debug, Clone, Default)]
pub struct CommandDispatcher {
    triggers: TriggerTable,
}

impl CommandDispatcher {
    pub fn new(triggers: TriggerTable) -> Self {
        Self { triggers }
    }

    /// Tokens in category order: resize, slideshow, farewell.
    ///
    /// Within a category the first matching entry wins (Larger before Smaller;
    /// Start, Stop, Next), regardless of where the phrase sits in the text.
    pub fn extract(&self, reply: &str) -> Vec<CommandToken> {
        let t = &self.triggers;
        let mut tokens = Vec::new();
        tokens.extend(first_hit(
            reply,
            &[
                (&t.larger, CommandToken::Resize(ResizeDirection::Larger)),
                (&t.smaller, CommandToken::Resize(ResizeDirection::Smaller)),
            ],
        ));
        tokens.extend(first_hit(
            reply,
            &[
                (&t.slideshow_start, CommandToken::SlideshowStart),
                (&t.slideshow_stop, CommandToken::SlideshowStop),
                (&t.slideshow_next, CommandToken::SlideshowNext),
            ],
        ));
        tokens.extend(first_hit(reply, &[(&t.farewell, CommandToken::Farewell)]));
        tokens
    }
}

fn first_hit(reply: &str, entries: &[(&Vec<String>, CommandToken)]) -> Option<CommandToken> {
    entries
        .iter()
        .find(|(list, _)| list.iter().any(|p| !p.is_empty() && reply.contains(p.as_str())))
        .map(|(_, token)| *token)
}
