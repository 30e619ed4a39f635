use anyhow::{Context, Result};
use opencv::{
    core::{Mat, Vector},
    imgcodecs, imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::client::{Snapshot, SnapshotFormat};

/// OpenCVを使用したウェブカメラキャプチャ
pub struct CoachCamera {
    capture: VideoCapture,
    width: u32,
    height: u32,
}

impl CoachCamera {
    /// 解像度を指定してカメラを開く。実際の解像度はデバイス依存
    pub fn open(index: i32, width: i32, height: i32) -> Result<Self> {
        let mut capture = VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32)
            .context("Failed to open camera")?;

        if !capture.is_opened()? {
            anyhow::bail!("Camera {} is not available", index);
        }

        capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64)?;
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        let actual_width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let actual_height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;

        Ok(Self {
            capture,
            width: actual_width,
            height: actual_height,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// フレームを読み込む（BGR形式）
    pub fn read_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .context("Failed to read frame")?;

        if frame.empty() {
            anyhow::bail!("Empty frame received");
        }

        Ok(frame)
    }
}

/// 別スレッドでキャプチャを回し、最新フレームだけを保持する
///
/// 描画ループはカメラ I/O を待たずに newest を読む。running が
/// 落ちたらスレッドは自然に抜ける。
pub struct ThreadedCamera {
    latest: Arc<Mutex<Option<Mat>>>,
    frame_id: Arc<AtomicU64>,
    width: u32,
    height: u32,
    _handle: thread::JoinHandle<()>,
}

impl ThreadedCamera {
    pub fn start(index: i32, width: i32, height: i32, running: Arc<AtomicBool>) -> Result<Self> {
        let mut camera = CoachCamera::open(index, width, height)?;
        let (w, h) = camera.resolution();
        let latest = Arc::new(Mutex::new(None::<Mat>));
        let latest_ref = latest.clone();
        let frame_id = Arc::new(AtomicU64::new(0));
        let frame_id_ref = frame_id.clone();

        let handle = thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                match camera.read_frame() {
                    Ok(frame) => {
                        *latest_ref.lock().unwrap() = Some(frame);
                        frame_id_ref.fetch_add(1, Ordering::Release);
                    }
                    Err(err) => {
                        eprintln!("[camera] read error: {err:#}");
                        thread::sleep(std::time::Duration::from_millis(100));
                    }
                }
            }
        });

        Ok(Self {
            latest,
            frame_id,
            width: w,
            height: h,
            _handle: handle,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 到着フレーム数。新フレームごとにインクリメントされる
    pub fn frame_id(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }

    /// 最新フレームを取得。初回フレーム到着前のみ None
    pub fn get_frame(&self) -> Option<Mat> {
        let guard = self.latest.lock().unwrap();
        guard.clone()
    }

    /// 最新フレームをアップロード用にエンコードする
    pub fn snapshot(&self, format: SnapshotFormat, quality: i32) -> Result<Option<Snapshot>> {
        let Some(frame) = self.get_frame() else {
            return Ok(None);
        };
        Ok(Some(encode_snapshot(&frame, format, quality)?))
    }
}

/// BGR フレームを 1 枚のスナップショットに圧縮する
pub fn encode_snapshot(frame: &Mat, format: SnapshotFormat, quality: i32) -> Result<Snapshot> {
    let quality_flag = match format {
        SnapshotFormat::WebP => imgcodecs::IMWRITE_WEBP_QUALITY,
        SnapshotFormat::Jpeg => imgcodecs::IMWRITE_JPEG_QUALITY,
    };
    let params = Vector::from_iter([quality_flag, quality]);
    let mut buf: Vector<u8> = Vector::new();

    // imencode expects BGR 8UC3; convert BGRA if needed
    let mat = if frame.channels() == 4 {
        let mut bgr = Mat::default();
        imgproc::cvt_color_def(frame, &mut bgr, imgproc::COLOR_BGRA2BGR)?;
        bgr
    } else {
        frame.clone()
    };

    imgcodecs::imencode(format.encode_ext(), &mat, &mut buf, &params)?;
    Ok(Snapshot::new(buf.to_vec(), format))
}
