use std::time::Instant;

use crate::session::FeedbackItem;
use crate::speech::voice::Speak;

/// 同一メッセージを連続で読み上げる上限
pub const MAX_REPEATS: u8 = 2;

/// 読み上げ済みメッセージの追跡状態
///
/// 遷移は先頭メッセージの一致判定だけで決まる。
/// Idle → Speaking(count) → Suppressed、メッセージが変われば
/// Speaking(1) へ戻る。
#[derive(Debug, Clone, PartialEq)]
pub enum SpokenTracker {
    /// まだ何も読み上げていない
    Idle,
    /// message を count 回読み上げた
    Speaking {
        message: String,
        count: u8,
        last_spoken: Instant,
    },
    /// 同じ message が上限まで続いたので黙っている
    Suppressed { message: String },
}

/// 1 回の観測で取った行動
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationOutcome {
    /// 対象なし (空リスト・空メッセージ・完璧メッセージ)
    Skipped,
    /// 読み上げた (通算 count 回目)
    Spoke(u8),
    /// 繰り返し上限に達して黙った
    Suppressed,
}

/// tree_pose → "Tree Pose"
pub fn title_case(pose_name: &str) -> String {
    pose_name
        .split('_')
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// そのポーズの「完璧」メッセージ。これだけは読み上げない
pub fn perfect_alignment_message(pose_name: &str) -> String {
    format!("✅ {}: Perfect alignment!", title_case(pose_name))
}

/// コーチングナレーター
///
/// 適用されたフィードバックの先頭メッセージを読み上げ、同じ指摘が
/// 続く場合は MAX_REPEATS 回で黙る。発話は常に前の発話を打ち切って
/// から始める (同時発話なし)。
pub struct Narrator<S: Speak> {
    tracker: SpokenTracker,
    perfect_message: String,
    voice: S,
}

impl<S: Speak> Narrator<S> {
    pub fn new(pose_name: &str, voice: S) -> Self {
        Self {
            tracker: SpokenTracker::Idle,
            perfect_message: perfect_alignment_message(pose_name),
            voice,
        }
    }

    pub fn tracker(&self) -> &SpokenTracker {
        &self.tracker
    }

    /// 適用された 1 レスポンス分のフィードバックを観測する
    pub fn observe(&mut self, feedback: &[FeedbackItem]) -> NarrationOutcome {
        let Some(first) = feedback.first() else {
            return NarrationOutcome::Skipped;
        };
        let message = first.message.as_str();
        if message.is_empty() || message == self.perfect_message {
            return NarrationOutcome::Skipped;
        }

        let next_count = match &self.tracker {
            SpokenTracker::Speaking { message: m, count, .. } if m == message => {
                if *count >= MAX_REPEATS {
                    self.tracker = SpokenTracker::Suppressed {
                        message: message.to_string(),
                    };
                    return NarrationOutcome::Suppressed;
                }
                count + 1
            }
            SpokenTracker::Suppressed { message: m } if m == message => {
                return NarrationOutcome::Suppressed;
            }
            // 新しい指摘、または初回。カウントを 1 から取り直す
            _ => 1,
        };

        self.tracker = SpokenTracker::Speaking {
            message: message.to_string(),
            count: next_count,
            last_spoken: Instant::now(),
        };

        self.voice.cancel();
        if let Err(err) = self.voice.speak(message) {
            eprintln!("[narrator] speech failed: {err:#}");
        }
        NarrationOutcome::Spoke(next_count)
    }

    /// 再生中の発話を打ち切る (teardown 用)
    pub fn silence(&mut self) {
        self.voice.cancel();
    }
}
