use anyhow::{Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use std::path::Path;

/// インストラクター動画をループ再生するリーダー
///
/// 1 tick につき 1 フレームだけデコードする。終端に達したら
/// 先頭に巻き戻して続ける。
pub struct VideoLooper {
    capture: VideoCapture,
}

impl VideoLooper {
    pub fn open(path: &Path) -> Result<Self> {
        let path_str = path.to_str().context("Video path is not valid UTF-8")?;
        let capture = VideoCapture::from_file(path_str, VideoCaptureAPIs::CAP_ANY as i32)
            .with_context(|| format!("Failed to open video {}", path.display()))?;

        if !capture.is_opened()? {
            anyhow::bail!("Video {} is not available", path.display());
        }

        Ok(Self { capture })
    }

    /// 次のフレームを返す。終端なら巻き戻して先頭フレームを返す
    pub fn next_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        let got = self.capture.read(&mut frame).unwrap_or(false);

        if !got || frame.empty() {
            self.capture.set(videoio::CAP_PROP_POS_FRAMES, 0.0)?;
            self.capture
                .read(&mut frame)
                .context("Failed to read video frame")?;
            if frame.empty() {
                anyhow::bail!("Video has no decodable frames");
            }
        }

        Ok(frame)
    }
}
