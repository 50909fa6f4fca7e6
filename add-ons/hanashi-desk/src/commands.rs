//! Console input: `:`-prefixed lines are button presses, anything else is chat.

use hanashi_voice::Geometry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    ForceStop,
    SlidesPlay,
    SlidesPause,
    SlidesNext,
    Resize(Geometry),
    Help,
    Quit,
    Say(String),
    Unknown(String),
}

pub const HELP: &str = "\
:start              会話開始
:stop               会話終了
:force              強制終了
:slides play|pause|next
:resize W H         ウィンドウサイズ変更
:quit               終了
それ以外の入力はチャットとして送信されます。";

impl ConsoleCommand {
    /// `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix(':') else {
            return Some(ConsoleCommand::Say(line.to_string()));
        };

        let mut words = rest.split_whitespace();
        let command = match (words.next(), words.next(), words.next()) {
            (Some("start"), None, _) => ConsoleCommand::Start,
            (Some("stop"), None, _) => ConsoleCommand::Stop,
            (Some("force"), None, _) => ConsoleCommand::ForceStop,
            (Some("slides"), Some("play"), None) => ConsoleCommand::SlidesPlay,
            (Some("slides"), Some("pause"), None) => ConsoleCommand::SlidesPause,
            (Some("slides"), Some("next"), None) => ConsoleCommand::SlidesNext,
            (Some("resize"), Some(w), Some(h)) => match (w.parse::<u32>(), h.parse::<u32>()) {
                (Ok(w), Ok(h)) if w > 0 && h > 0 => ConsoleCommand::Resize(Geometry::new(w, h)),
                _ => ConsoleCommand::Unknown(line.to_string()),
            },
            (Some("help"), None, _) => ConsoleCommand::Help,
            (Some("quit") | Some("exit"), None, _) => ConsoleCommand::Quit,
            _ => ConsoleCommand::Unknown(line.to_string()),
        };
        Some(command)
    }
}
