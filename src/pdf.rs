use crate::canvas::{Command, Overlay};
use crate::types::Pt;
use lopdf::{Dictionary as LoDictionary, dictionary};

/// Resource name every overlay uses for its text font.
pub const OVERLAY_FONT_RESOURCE: &str = "F1";

pub(crate) fn overlay_font_dictionary() -> LoDictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeStats {
    pub strings: usize,
    /// Characters outside WinAnsi, drawn as `?`.
    pub replaced_chars: usize,
    /// Length of the encoded content stream.
    pub bytes: usize,
}

pub fn encode_overlay(overlay: &Overlay) -> Vec<u8> {
    encode_overlay_with_stats(overlay).0
}

pub fn encode_overlay_with_stats(overlay: &Overlay) -> (Vec<u8>, EncodeStats) {
    let mut out = String::new();
    let mut stats = EncodeStats::default();
    let mut font_size = Pt::from_f32(10.0);

    for command in &overlay.commands {
        match command {
            Command::Meta { .. } => {}
            Command::SetFontSize(size) => font_size = *size,
            Command::DrawString { x, y, text } => {
                let encoded = encode_winansi_pdf_string(text);
                stats.strings += 1;
                stats.replaced_chars += encoded.replaced;
                out.push_str(&format!(
                    "BT /{} {} Tf {} {} Td ({}) Tj ET\n",
                    OVERLAY_FONT_RESOURCE,
                    fmt_pt(font_size),
                    fmt_pt(*x),
                    fmt_pt(*y),
                    encoded.text
                ));
            }
        }
    }

    stats.bytes = out.len();
    (out.into_bytes(), stats)
}

struct WinAnsiEncoded {
    text: String,
    replaced: usize,
}

fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = match ch {
            // ASCII
            '\u{0000}'..='\u{007F}' => ch as u8,
            // Latin-1
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            // WinAnsi extensions (cp1252)
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => {
                replaced += 1;
                b'?'
            }
        };

        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if b < 0x20 || b >= 0x7f => out.push_str(&format!("\\{:03o}", b)),
            b => out.push(b as char),
        }
    }

    WinAnsiEncoded {
        text: out,
        replaced,
    }
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}
