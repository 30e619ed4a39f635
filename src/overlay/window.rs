use anyhow::Result;
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use crate::overlay::canvas::OverlayCanvas;

/// minifb ウィンドウの薄いラッパー
pub struct CoachWindow {
    window: Window,
}

impl CoachWindow {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;
        Ok(Self { window })
    }

    /// ウィンドウが開いているか (ESC でも閉じる)
    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    /// I キーでウェブカメラ / インストラクターの大小を入れ替える
    pub fn layout_toggle_pressed(&self) -> bool {
        self.window.is_key_pressed(Key::I, KeyRepeat::No)
    }

    /// 合成済みバッファをウィンドウへ
    pub fn present(&mut self, canvas: &OverlayCanvas) -> Result<()> {
        self.window
            .update_with_buffer(canvas.buffer(), canvas.width(), canvas.height())?;
        Ok(())
    }
}
