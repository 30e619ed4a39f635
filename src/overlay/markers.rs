use crate::overlay::canvas::OverlayCanvas;
use crate::session::{FeedbackItem, Keypoint};

/// 不正姿勢マーカーの色 (赤)
pub const MARKER_COLOR: u32 = 0xFF0000;
/// 矯正セグメントの色 (オレンジ)
pub const CONNECTOR_COLOR: u32 = 0xFFA500;

/// 横チックの片側長さ
pub const TICK_HALF_LEN: i32 = 10;
/// 塗りつぶし円の半径
pub const CIRCLE_RADIUS: i32 = 6;
/// 囲み矩形の中心からの張り出し
pub const BOX_HALF_EXTENT: i32 = 12;
/// チックと矩形の線幅
pub const STROKE_WIDTH: u32 = 2;

/// セグメント線の幅と破線パターン
pub const CONNECTOR_WIDTH: u32 = 3;
pub const DASH_ON: u32 = 6;
pub const DASH_OFF: u32 = 4;

/// 描画先の矩形。通常はサーフェス全体、ウェブカメラ表示が
/// PiP に縮んでいる間だけ小さくなる
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewRect {
    pub x: i32,
    pub y: i32,
    pub width: usize,
    pub height: usize,
}

impl ViewRect {
    pub fn full(width: usize, height: usize) -> Self {
        Self { x: 0, y: 0, width, height }
    }

    /// 正規化座標 (0.0〜1.0) をこの矩形内のピクセル座標へ
    pub fn to_pixel(&self, nx: f32, ny: f32) -> (i32, i32) {
        let px = self.x + (nx * self.width as f32) as i32;
        let py = self.y + (ny * self.height as f32) as i32;
        (px, py)
    }
}

/// キーポイントとフィードバックだけを入力に、毎回まっさらな状態から
/// 描き直す。状態は一切持たない。
///
/// - correct でないキーポイント: 横チック + 塗りつぶし円 + 囲み矩形
/// - from_part / to_part が両方解決できたフィードバック: 破線セグメント
pub fn draw_markers(
    canvas: &mut OverlayCanvas,
    rect: ViewRect,
    keypoints: &[Keypoint],
    feedback: &[FeedbackItem],
) {
    for kp in keypoints {
        if kp.correct {
            continue;
        }
        let (cx, cy) = rect.to_pixel(kp.x, kp.y);
        canvas.draw_line(
            cx - TICK_HALF_LEN,
            cy,
            cx + TICK_HALF_LEN,
            cy,
            MARKER_COLOR,
            STROKE_WIDTH,
        );
        canvas.draw_circle(cx, cy, CIRCLE_RADIUS, MARKER_COLOR);
        canvas.draw_rect(
            cx - BOX_HALF_EXTENT,
            cy - BOX_HALF_EXTENT,
            BOX_HALF_EXTENT * 2,
            BOX_HALF_EXTENT * 2,
            MARKER_COLOR,
            STROKE_WIDTH,
        );
    }

    // セグメントはマーカーの上に重ねる
    for item in feedback {
        let Some((from, to)) = item.segment() else {
            continue;
        };
        let (Some(from_kp), Some(to_kp)) =
            (keypoints.get(from as usize), keypoints.get(to as usize))
        else {
            continue;
        };
        let (x1, y1) = rect.to_pixel(from_kp.x, from_kp.y);
        let (x2, y2) = rect.to_pixel(to_kp.x, to_kp.y);
        canvas.draw_dashed_line(
            x1,
            y1,
            x2,
            y2,
            CONNECTOR_COLOR,
            CONNECTOR_WIDTH,
            DASH_ON,
            DASH_OFF,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::Landmark;

    fn kp(x: f32, y: f32, correct: bool) -> Keypoint {
        Keypoint { x, y, part: None, correct, feedback: None }
    }

    fn segment_feedback(from: &str, to: &str) -> FeedbackItem {
        FeedbackItem {
            message: "Align the segment".to_string(),
            keypoint_index: None,
            from_part: Some(from.to_string()),
            to_part: Some(to.to_string()),
        }
    }

    #[test]
    fn test_view_rect_maps_normalized_to_pixels() {
        let rect = ViewRect::full(400, 300);
        assert_eq!(rect.to_pixel(0.5, 0.5), (200, 150));
        assert_eq!(rect.to_pixel(0.0, 0.0), (0, 0));
        assert_eq!(rect.to_pixel(1.0, 1.0), (400, 300));

        let inset = ViewRect { x: 10, y: 20, width: 100, height: 50 };
        assert_eq!(inset.to_pixel(0.5, 0.5), (60, 45));
    }

    #[test]
    fn test_incorrect_marker_centered_at_pixel() {
        let mut canvas = OverlayCanvas::new(400, 300);
        let keypoints = vec![kp(0.5, 0.5, false)];
        draw_markers(&mut canvas, ViewRect::full(400, 300), &keypoints, &[]);

        // Circle center and tick ends, all at the mapped position (200, 150)
        assert_eq!(canvas.pixel(200, 150), Some(MARKER_COLOR));
        assert_eq!(canvas.pixel(190, 150), Some(MARKER_COLOR));
        assert_eq!(canvas.pixel(210, 150), Some(MARKER_COLOR));
        // Box outline corner: (200-12, 150-12)
        assert_eq!(canvas.pixel(188, 138), Some(MARKER_COLOR));
        // Between circle edge and box outline nothing is painted
        assert_eq!(canvas.pixel(200, 160), Some(0));
    }

    #[test]
    fn test_correct_keypoints_draw_nothing() {
        let mut canvas = OverlayCanvas::new(100, 100);
        let keypoints = vec![kp(0.3, 0.3, true), kp(0.7, 0.7, true)];
        draw_markers(&mut canvas, ViewRect::full(100, 100), &keypoints, &[]);
        assert!(canvas.buffer().iter().all(|&p| p == 0));
    }

    #[test]
    fn test_connector_dash_pattern_between_parts() {
        let mut canvas = OverlayCanvas::new(100, 100);

        // Keypoint list long enough for left_hip (23) and left_knee (25)
        let mut keypoints = vec![kp(0.0, 0.0, true); Landmark::COUNT];
        keypoints[Landmark::LeftHip as usize] = kp(0.1, 0.5, true);
        keypoints[Landmark::LeftKnee as usize] = kp(0.9, 0.5, true);

        let feedback = vec![segment_feedback("left_hip", "left_knee")];
        draw_markers(&mut canvas, ViewRect::full(100, 100), &keypoints, &feedback);

        // Horizontal run from (10,50) to (90,50): 6 on, 4 off
        assert_eq!(canvas.pixel(10, 50), Some(CONNECTOR_COLOR));
        assert_eq!(canvas.pixel(15, 50), Some(CONNECTOR_COLOR));
        assert_eq!(canvas.pixel(17, 50), Some(0));
        assert_eq!(canvas.pixel(21, 50), Some(CONNECTOR_COLOR));
        // 80 steps in, the pattern is back at an "on" phase
        assert_eq!(canvas.pixel(90, 50), Some(CONNECTOR_COLOR));
        // 3px wide
        assert_eq!(canvas.pixel(12, 49), Some(CONNECTOR_COLOR));
        assert_eq!(canvas.pixel(12, 51), Some(CONNECTOR_COLOR));
        assert_eq!(canvas.pixel(12, 47), Some(0));
    }

    #[test]
    fn test_connector_skipped_when_unresolvable() {
        let mut canvas = OverlayCanvas::new(100, 100);

        // Parts resolve in the table but the keypoint list is too short
        let keypoints = vec![kp(0.2, 0.2, true); 5];
        let feedback = vec![
            segment_feedback("left_hip", "left_knee"),
            segment_feedback("nose", "left_kneecap"),
        ];
        draw_markers(&mut canvas, ViewRect::full(100, 100), &keypoints, &feedback);
        assert!(canvas.buffer().iter().all(|&p| p == 0));
    }

    #[test]
    fn test_markers_follow_inset_rect() {
        let mut canvas = OverlayCanvas::new(200, 200);
        let keypoints = vec![kp(0.5, 0.5, false)];
        let inset = ViewRect { x: 100, y: 100, width: 80, height: 60 };
        draw_markers(&mut canvas, inset, &keypoints, &[]);

        // (0.5, 0.5) inside the inset lands at (140, 130)
        assert_eq!(canvas.pixel(140, 130), Some(MARKER_COLOR));
        assert_eq!(canvas.pixel(100, 100), Some(0));
    }
}
