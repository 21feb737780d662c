use std::path::Path;
use std::rc::Rc;

use tokenmenu::{NodeKind, Rect, SceneNode, Vec2};

use crate::bootstrap::DemoError;

const CLEAR_COLOR: [u8; 4] = [24, 26, 30, 255];
const SPRITE_COLOR: [u8; 4] = [150, 150, 160, 255];
const TEXT_COLOR: [u8; 4] = [230, 230, 230, 255];

/// RGBA8 frame the scene graph is rasterised into.
pub(crate) struct Frame {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) pixels: Vec<u8>,
}

impl Frame {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        let mut pixels = vec![0; width as usize * height as usize * 4];
        for pixel in pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&CLEAR_COLOR);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    fn blend_pixel(&mut self, x: usize, y: usize, color: [u8; 4]) {
        let offset = (y * self.width as usize + x) * 4;
        let Some(dst) = self.pixels.get_mut(offset..offset + 4) else {
            return;
        };
        let alpha = u16::from(color[3]);
        for channel in 0..3 {
            let blended =
                (u16::from(color[channel]) * alpha + u16::from(dst[channel]) * (255 - alpha)) / 255;
            dst[channel] = blended as u8;
        }
        dst[3] = 255;
    }

    fn fill_rect(&mut self, x: i32, y: i32, rect_width: i32, rect_height: i32, color: [u8; 4]) {
        let start_x = x.max(0);
        let start_y = y.max(0);
        let end_x = (x + rect_width).min(self.width as i32);
        let end_y = (y + rect_height).min(self.height as i32);
        if end_x <= start_x || end_y <= start_y {
            return;
        }
        for py in start_y..end_y {
            for px in start_x..end_x {
                self.blend_pixel(px as usize, py as usize, color);
            }
        }
    }

    fn rect_outline(&mut self, x: i32, y: i32, rect_width: i32, rect_height: i32, color: [u8; 4]) {
        if rect_width <= 1 || rect_height <= 1 {
            return;
        }
        self.fill_rect(x, y, rect_width, 1, color);
        self.fill_rect(x, y + rect_height - 1, rect_width, 1, color);
        self.fill_rect(x, y, 1, rect_height, color);
        self.fill_rect(x + rect_width - 1, y, 1, rect_height, color);
    }
}

fn rgba(color: u32, alpha: f32) -> [u8; 4] {
    [
        ((color >> 16) & 0xff) as u8,
        ((color >> 8) & 0xff) as u8,
        (color & 0xff) as u8,
        (alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
    ]
}

fn own_shape_global(node: &SceneNode, width: f32, height: f32) -> Rect {
    let top_left = node.to_global(Vec2::ZERO);
    let bottom_right = node.to_global(Vec2::new(width, height));
    Rect::new(
        top_left.x,
        top_left.y,
        bottom_right.x - top_left.x,
        bottom_right.y - top_left.y,
    )
}

/// Painter's order: parents before children, siblings in insertion order.
pub(crate) fn rasterize(root: &Rc<SceneNode>, viewport: Rect, width: u32, height: u32) -> Frame {
    let mut frame = Frame::new(width, height);
    let scale_x = width as f32 / viewport.width.max(1.0);
    let scale_y = height as f32 / viewport.height.max(1.0);
    let to_frame = |rect: Rect| -> (i32, i32, i32, i32) {
        (
            ((rect.x - viewport.x) * scale_x).round() as i32,
            ((rect.y - viewport.y) * scale_y).round() as i32,
            (rect.width * scale_x).round().max(1.0) as i32,
            (rect.height * scale_y).round().max(1.0) as i32,
        )
    };

    let mut stack = vec![Rc::clone(root)];
    while let Some(node) = stack.pop() {
        match node.kind() {
            NodeKind::Container => {}
            NodeKind::RoundedRect {
                width: shape_width,
                height: shape_height,
                fill,
                alpha,
                stroke,
                ..
            } => {
                let (x, y, w, h) = to_frame(own_shape_global(&node, shape_width, shape_height));
                frame.fill_rect(x, y, w, h, rgba(fill, alpha));
                if let Some(stroke) = stroke {
                    frame.rect_outline(x, y, w, h, rgba(stroke, 1.0));
                }
            }
            NodeKind::Sprite {
                width: shape_width,
                height: shape_height,
                ..
            } => {
                let (x, y, w, h) = to_frame(own_shape_global(&node, shape_width, shape_height));
                frame.rect_outline(x, y, w, h, SPRITE_COLOR);
            }
            NodeKind::Text { .. } => {
                if let Some(bounds) = node.global_bounds() {
                    let (x, y, w, h) = to_frame(bounds);
                    frame.fill_rect(x, y + h / 2, w, 1, TEXT_COLOR);
                }
            }
        }
        for child in node.children().into_iter().rev() {
            stack.push(child);
        }
    }
    frame
}

pub(crate) fn save_png(frame: &Frame, path: &Path) -> Result<(), DemoError> {
    image::save_buffer(
        path,
        &frame.pixels,
        frame.width,
        frame.height,
        image::ExtendedColorType::Rgba8,
    )
    .map_err(|source| DemoError::Snapshot {
        path: path.to_path_buf(),
        source,
    })
}
