use std::sync::{Arc, Mutex};

use serde::Deserialize;

use crate::landmark::Landmark;

/// 表示用に統合されたキーポイント
///
/// 解析レスポンスの生配列に部位名とフィードバック文を
/// インデックスで突き合わせたもの。レスポンスごとに全件作り直す。
#[derive(Debug, Clone, PartialEq)]
pub struct Keypoint {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0)
    pub y: f32,
    /// 固定テーブルで引いた部位。配列がテーブルより長い場合は None
    pub part: Option<Landmark>,
    pub correct: bool,
    /// keypoint_index で紐付いたフィードバック文
    pub feedback: Option<String>,
}

/// 解析サービスが返す 1 件の修正指示
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedbackItem {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub keypoint_index: Option<usize>,
    #[serde(default)]
    pub from_part: Option<String>,
    #[serde(default)]
    pub to_part: Option<String>,
}

impl FeedbackItem {
    /// from_part / to_part の両方を固定テーブルで解決する
    pub fn segment(&self) -> Option<(Landmark, Landmark)> {
        let from = Landmark::from_part(self.from_part.as_deref()?)?;
        let to = Landmark::from_part(self.to_part.as_deref()?)?;
        Some((from, to))
    }
}

/// 1 レスポンス分の解析結果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Analysis {
    pub keypoints: Vec<Keypoint>,
    /// message 重複除去済み (初出優先・順序保持)
    pub feedback: Vec<FeedbackItem>,
    pub score: Option<f64>,
    pub status: String,
}

/// セッション全体の共有状態
///
/// 書き込みは交換完了ハンドラの 1 箇所のみ。描画・HUD・ナレーターは
/// ロック越しに読むだけで、ポーズ名はセッション中変化しない。
#[derive(Debug, Clone)]
pub struct SessionState {
    pub pose_name: String,
    pub score: Option<f64>,
    pub status: String,
    pub feedback: Vec<FeedbackItem>,
    pub keypoints: Vec<Keypoint>,
}

pub type SharedSession = Arc<Mutex<SessionState>>;

impl SessionState {
    pub fn new(pose_name: impl Into<String>) -> Self {
        Self {
            pose_name: pose_name.into(),
            score: None,
            status: String::new(),
            feedback: Vec::new(),
            keypoints: Vec::new(),
        }
    }

    pub fn shared(pose_name: impl Into<String>) -> SharedSession {
        Arc::new(Mutex::new(Self::new(pose_name)))
    }

    /// 解析結果を丸ごと差し替える
    pub fn apply(&mut self, analysis: Analysis) {
        self.keypoints = analysis.keypoints;
        self.feedback = analysis.feedback;
        self.score = analysis.score;
        self.status = analysis.status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_feedback(message: &str) -> FeedbackItem {
        FeedbackItem {
            message: message.to_string(),
            keypoint_index: None,
            from_part: None,
            to_part: None,
        }
    }

    #[test]
    fn test_apply_replaces_everything_but_pose_name() {
        let mut state = SessionState::new("tree_pose");
        state.apply(Analysis {
            keypoints: vec![Keypoint {
                x: 0.1,
                y: 0.2,
                part: Some(Landmark::Nose),
                correct: false,
                feedback: None,
            }],
            feedback: vec![make_feedback("Straighten your back")],
            score: Some(71.5),
            status: "Needs Improvement".to_string(),
        });

        assert_eq!(state.pose_name, "tree_pose");
        assert_eq!(state.keypoints.len(), 1);
        assert_eq!(state.feedback[0].message, "Straighten your back");
        assert_eq!(state.score, Some(71.5));
        assert_eq!(state.status, "Needs Improvement");

        // A later empty analysis wipes the previous one
        state.apply(Analysis::default());
        assert_eq!(state.pose_name, "tree_pose");
        assert!(state.keypoints.is_empty());
        assert!(state.feedback.is_empty());
        assert_eq!(state.score, None);
        assert_eq!(state.status, "");
    }

    #[test]
    fn test_feedback_segment_resolution() {
        let mut item = make_feedback("Align hip over knee");
        assert_eq!(item.segment(), None);

        item.from_part = Some("left_hip".to_string());
        assert_eq!(item.segment(), None);

        item.to_part = Some("left_knee".to_string());
        assert_eq!(item.segment(), Some((Landmark::LeftHip, Landmark::LeftKnee)));

        item.to_part = Some("left_kneee".to_string());
        assert_eq!(item.segment(), None);
    }

    #[test]
    fn test_feedback_item_wire_defaults() {
        // Only the message present
        let item: FeedbackItem = serde_json::from_str(r#"{"message":"Lift your chin"}"#).unwrap();
        assert_eq!(item.message, "Lift your chin");
        assert_eq!(item.keypoint_index, None);
        assert_eq!(item.from_part, None);

        // Nothing present at all
        let item: FeedbackItem = serde_json::from_str("{}").unwrap();
        assert_eq!(item.message, "");
    }
}
