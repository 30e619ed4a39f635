use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::client::SnapshotFormat;
use crate::speech::ProcessVoice;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub instructor: InstructorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    /// 解析サービスのベースURL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// リクエストタイムアウト（ミリ秒）
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionConfig {
    /// 練習するポーズ名。CLI引数があればそちらが優先
    #[serde(default)]
    pub pose_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// デバイスインデックス
    #[serde(default = "default_camera_index")]
    pub index: i32,
    /// 要求解像度（4:3）。実際の解像度はデバイス依存
    #[serde(default = "default_camera_width")]
    pub width: i32,
    #[serde(default = "default_camera_height")]
    pub height: i32,
    /// アップロード画像の形式 ("webp" / "jpeg")
    #[serde(default = "default_snapshot_format")]
    pub format: String,
    /// エンコード品質 (0〜100)
    #[serde(default = "default_snapshot_quality")]
    pub quality: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 描画ループの目標フレームレート
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_enabled")]
    pub enabled: bool,
    /// 音声合成コマンド。空ならOS標準を使う
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct InstructorConfig {
    /// 参考動画ファイルのパス。空なら無効
    #[serde(default)]
    pub video: String,
}

fn default_endpoint() -> String { "http://127.0.0.1:8001".to_string() }
fn default_timeout_ms() -> u64 { 10_000 }
fn default_camera_index() -> i32 { 0 }
fn default_camera_width() -> i32 { 640 }
fn default_camera_height() -> i32 { 480 }
fn default_snapshot_format() -> String { "webp".to_string() }
fn default_snapshot_quality() -> i32 { 40 }
fn default_target_fps() -> u32 { 30 }
fn default_speech_enabled() -> bool { true }

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: default_camera_index(),
            width: default_camera_width(),
            height: default_camera_height(),
            format: default_snapshot_format(),
            quality: default_snapshot_quality(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: default_speech_enabled(),
            program: String::new(),
            extra_args: Vec::new(),
        }
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl CameraConfig {
    /// 設定文字列を形式に。未知の値は WebP に倒す
    pub fn snapshot_format(&self) -> SnapshotFormat {
        SnapshotFormat::from_name(&self.format).unwrap_or_else(|| {
            eprintln!("[config] unknown snapshot format '{}', using webp", self.format);
            SnapshotFormat::WebP
        })
    }
}

impl SpeechConfig {
    /// 設定から合成バックエンドを組み立てる
    pub fn voice(&self) -> ProcessVoice {
        if self.program.is_empty() {
            let args = if self.extra_args.is_empty() {
                ProcessVoice::default_args()
            } else {
                self.extra_args.clone()
            };
            ProcessVoice::new(ProcessVoice::default_program(), &args)
        } else {
            ProcessVoice::new(&self.program, &self.extra_args)
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 読めなければ既定値で続行する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!(
                    "[config] could not read {} ({err:#}); using defaults",
                    path.as_ref().display()
                );
                Self::default()
            }
        }
    }
}
