use crate::types::{Pt, Size};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Non-rendered metadata used for per-page reporting. Ignored by the PDF encoder.
    Meta {
        key: String,
        value: String,
    },
    SetFontSize(Pt),
    // Document coordinates (bottom-left origin).
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
}

/// A transparent page-sized surface: only the commands drawn on it, no
/// background. Composition puts it on top of a template page.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub page_size: Size,
    pub commands: Vec<Command>,
}

impl Overlay {
    pub fn drawn_strings(&self) -> impl Iterator<Item = (Pt, Pt, &str)> {
        self.commands.iter().filter_map(|cmd| match cmd {
            Command::DrawString { x, y, text } => Some((*x, *y, text.as_str())),
            _ => None,
        })
    }

    pub fn meta_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.commands.iter().filter_map(move |cmd| match cmd {
            Command::Meta { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }
}

pub struct Canvas {
    page_size: Size,
    commands: Vec<Command>,
    // None until the first size is emitted; the encoder has no implicit size.
    font_size: Option<Pt>,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            commands: Vec::new(),
            font_size: None,
        }
    }

    pub fn set_font_size(&mut self, size: Pt) {
        if self.font_size != Some(size) {
            self.font_size = Some(size);
            self.commands.push(Command::SetFontSize(size));
        }
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        self.commands.push(Command::DrawString {
            x,
            y,
            text: text.into(),
        });
    }

    pub fn meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.commands.push(Command::Meta {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn finish(self) -> Overlay {
        Overlay {
            page_size: self.page_size,
            commands: self.commands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_size_is_emitted_once_until_changed() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.set_font_size(Pt::from_f32(10.0));
        canvas.set_font_size(Pt::from_f32(10.0));
        canvas.set_font_size(Pt::from_f32(12.0));
        let overlay = canvas.finish();
        let sizes: Vec<&Command> = overlay
            .commands
            .iter()
            .filter(|c| matches!(c, Command::SetFontSize(_)))
            .collect();
        assert_eq!(sizes.len(), 2);
    }

    #[test]
    fn first_font_size_is_always_emitted() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.set_font_size(Pt::from_f32(10.0));
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "x");
        let overlay = canvas.finish();
        assert_eq!(overlay.commands[0], Command::SetFontSize(Pt::from_f32(10.0)));
        assert_eq!(overlay.commands.len(), 2);
    }

    #[test]
    fn meta_values_filter_by_key() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.meta("row", "0");
        canvas.meta("other", "x");
        canvas.meta("row", "1");
        let overlay = canvas.finish();
        assert_eq!(overlay.meta_values("row").collect::<Vec<_>>(), vec!["0", "1"]);
        assert_eq!(overlay.drawn_strings().count(), 0);
    }
}
