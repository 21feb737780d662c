use std::cell::RefCell;

use crate::geometry::Vec2;
use crate::host::{EventEmitter, EventTarget, KeyEmitter};

const DEFAULT_CHAR_WIDTH_PX: f32 = 7.0;
const DEFAULT_LINE_HEIGHT_PX: f32 = 18.0;
const DEFAULT_BOX_PADDING_PX: f32 = 8.0;
const BLOCK_BREAKS: [&str; 6] = ["<br>", "<br/>", "</div>", "</li>", "</header>", "</p>"];

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayElement {
    pub id: String,
    pub html: String,
    pub z_index: i32,
    pub left: f32,
    pub top: f32,
    pub size: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    pub char_width: f32,
    pub line_height: f32,
    pub padding: f32,
}

impl Default for TextMetrics {
    fn default() -> Self {
        Self {
            char_width: DEFAULT_CHAR_WIDTH_PX,
            line_height: DEFAULT_LINE_HEIGHT_PX,
            padding: DEFAULT_BOX_PADDING_PX,
        }
    }
}

/// DOM overlay model: elements appended to the document body, positioned in
/// viewport (client) pixels, plus the document-level mouse and key streams.
#[derive(Debug)]
pub struct Document {
    viewport: Vec2,
    body: RefCell<Vec<OverlayElement>>,
    pointer: EventEmitter,
    keys: KeyEmitter,
    metrics: TextMetrics,
}

impl EventTarget for Document {
    fn events(&self) -> &EventEmitter {
        &self.pointer
    }
}

impl Document {
    pub fn new(viewport: Vec2) -> Self {
        Self::with_metrics(viewport, TextMetrics::default())
    }

    pub fn with_metrics(viewport: Vec2, metrics: TextMetrics) -> Self {
        Self {
            viewport,
            body: RefCell::new(Vec::new()),
            pointer: EventEmitter::default(),
            keys: KeyEmitter::default(),
            metrics,
        }
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    pub fn keys(&self) -> &KeyEmitter {
        &self.keys
    }

    /// Appends to the body; an element with the same id is replaced since ids are unique.
    pub fn append(&self, element: OverlayElement) {
        let mut body = self.body.borrow_mut();
        body.retain(|existing| existing.id != element.id);
        body.push(element);
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut body = self.body.borrow_mut();
        let before = body.len();
        body.retain(|existing| existing.id != id);
        body.len() != before
    }

    pub fn element(&self, id: &str) -> Option<OverlayElement> {
        self.body
            .borrow()
            .iter()
            .find(|element| element.id == id)
            .cloned()
    }

    pub fn set_element_position(&self, id: &str, left: f32, top: f32) -> bool {
        let mut body = self.body.borrow_mut();
        let Some(element) = body.iter_mut().find(|element| element.id == id) else {
            return false;
        };
        element.left = left;
        element.top = top;
        true
    }

    pub fn element_count(&self) -> usize {
        self.body.borrow().len()
    }

    pub fn measure(&self, html: &str) -> Vec2 {
        let lines = visible_lines(html);
        let longest = lines
            .iter()
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0);
        Vec2::new(
            longest as f32 * self.metrics.char_width + self.metrics.padding * 2.0,
            lines.len().max(1) as f32 * self.metrics.line_height + self.metrics.padding * 2.0,
        )
    }
}

fn visible_lines(html: &str) -> Vec<String> {
    let mut text = html.to_string();
    for token in BLOCK_BREAKS {
        text = text.replace(token, "\n");
    }

    let mut stripped = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }

    stripped
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(id: &str) -> OverlayElement {
        OverlayElement {
            id: id.to_string(),
            html: String::new(),
            z_index: 1,
            left: 0.0,
            top: 0.0,
            size: Vec2::ZERO,
        }
    }

    #[test]
    fn append_replaces_element_with_same_id() {
        let document = Document::new(Vec2::new(800.0, 600.0));
        document.append(element("tip"));
        document.append(element("tip"));
        document.append(element("other"));
        assert_eq!(document.element_count(), 2);
        assert!(document.remove("tip"));
        assert!(!document.remove("tip"));
    }

    #[test]
    fn measure_counts_block_lines_and_ignores_markup() {
        let document = Document::new(Vec2::new(800.0, 600.0));
        let size = document.measure("<div><strong>Sword</strong></div><div>Damage: Str+d8</div>");
        assert_eq!(size.x, 14.0 * 7.0 + 16.0);
        assert_eq!(size.y, 2.0 * 18.0 + 16.0);
    }
}
