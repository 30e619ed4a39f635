use anyhow::Result;
use opencv::core::Mat;
use opencv::prelude::*;

/// 描画サーフェス。0RGB 形式の u32 ピクセルバッファ
///
/// カメラフレームの転送とマーカー描画をここで合成し、完成した
/// バッファをウィンドウへ渡す。ウィンドウ側の知識は持たない。
pub struct OverlayCanvas {
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl OverlayCanvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            buffer: vec![0u32; width * height],
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn buffer(&self) -> &[u32] {
        &self.buffer
    }

    /// 境界外は None
    pub fn pixel(&self, x: i32, y: i32) -> Option<u32> {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            Some(self.buffer[y as usize * self.width + x as usize])
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0);
    }

    /// BGR Mat をバッファ全体の左上へコピー
    pub fn blit_bgr(&mut self, frame: &Mat) -> Result<()> {
        self.blit_bgr_at(frame, 0, 0)
    }

    /// BGR Mat を指定オフセットへコピー。はみ出す分はクロップ
    pub fn blit_bgr_at(&mut self, frame: &Mat, x_off: usize, y_off: usize) -> Result<()> {
        let frame_width = frame.cols() as usize;
        let frame_height = frame.rows() as usize;

        let max_y = frame_height.min(self.height.saturating_sub(y_off));
        let max_x = frame_width.min(self.width.saturating_sub(x_off));

        for y in 0..max_y {
            for x in 0..max_x {
                let pixel = frame.at_2d::<opencv::core::Vec3b>(y as i32, x as i32)?;
                // BGR -> RGB -> u32
                let r = pixel[2] as u32;
                let g = pixel[1] as u32;
                let b = pixel[0] as u32;
                self.buffer[(y + y_off) * self.width + (x + x_off)] = (r << 16) | (g << 8) | b;
            }
        }

        Ok(())
    }

    /// ピクセルをセット（境界チェック付き）
    pub fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.buffer[y as usize * self.width + x as usize] = color;
        }
    }

    /// thickness x thickness の矩形ブラシ
    fn stamp(&mut self, x: i32, y: i32, color: u32, thickness: u32) {
        let lo = -((thickness as i32 - 1) / 2);
        let hi = lo + thickness as i32 - 1;
        for dy in lo..=hi {
            for dx in lo..=hi {
                self.set_pixel(x + dx, y + dy, color);
            }
        }
    }

    /// Bresenhamのアルゴリズムで線を描画
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32, thickness: u32) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            self.stamp(x, y, color, thickness);

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// 破線。dash_on ピクセル描いて dash_off ピクセル空ける
    pub fn draw_dashed_line(
        &mut self,
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        color: u32,
        thickness: u32,
        dash_on: u32,
        dash_off: u32,
    ) {
        let period = dash_on + dash_off;
        if period == 0 {
            return self.draw_line(x0, y0, x1, y1, color, thickness);
        }

        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;
        let mut step: u32 = 0;

        loop {
            if step % period < dash_on {
                self.stamp(x, y, color, thickness);
            }
            step += 1;

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// 円を描画（塗りつぶし）
    pub fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// 矩形の輪郭線
    pub fn draw_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: u32, thickness: u32) {
        if w <= 0 || h <= 0 {
            return;
        }
        let right = x + w - 1;
        let bottom = y + h - 1;
        self.draw_line(x, y, right, y, color, thickness);
        self.draw_line(x, bottom, right, bottom, color, thickness);
        self.draw_line(x, y, x, bottom, color, thickness);
        self.draw_line(right, y, right, bottom, color, thickness);
    }
}
