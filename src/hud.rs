use crate::session::SessionState;

/// 褒めメッセージ。フィードバックにこれが含まれるときだけ
/// 称賛インジケーターを表示する
pub const PRAISE_MESSAGE: &str = "Good posture! Keep it up.";

/// ポーズ名の表示形。アンダースコアを空白にするだけで大小は触らない
pub fn display_pose_name(pose_name: &str) -> String {
    pose_name.replace('_', " ")
}

/// スコアは小数 1 桁
pub fn format_score(score: f64) -> String {
    format!("{score:.1}")
}

/// ウィンドウに重ねる HUD の全行
///
/// SessionState からの導出のみで独自状態は持たない。praise は
/// 行とは別に目立つ表示をするためのフラグ。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Hud {
    pub lines: Vec<String>,
    pub praise: bool,
}

pub fn build_hud(state: &SessionState) -> Hud {
    let mut lines = Vec::new();

    if !state.pose_name.is_empty() {
        lines.push(format!("Pose: {}", display_pose_name(&state.pose_name)));
    }

    // Status and score ride together and appear only once a score exists
    if let Some(score) = state.score {
        lines.push(format!("Status: {}", state.status));
        lines.push(format!("Score: {}", format_score(score)));
    }

    for item in &state.feedback {
        lines.push(item.message.clone());
    }

    let praise = state.feedback.iter().any(|f| f.message == PRAISE_MESSAGE);

    Hud { lines, praise }
}
