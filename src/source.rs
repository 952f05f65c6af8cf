//! Source loading: newline normalization, surface directives, line table.

use std::fs;
use std::path::Path;

use crate::error::{DaisyError, DaisyResult};
use crate::span::FileId;

/// Which concrete grammar a line is locked to, when a directive says so.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    English,
    Korean,
}

const DIRECTIVE_ENGLISH: &str = "영어:";
const DIRECTIVE_KOREAN: &str = "한국어:";

/// One non-blank source line after directive stripping.
#[derive(Debug, Clone)]
pub struct Line {
    /// Leading spaces (block depth is `indent / 2`).
    pub indent: usize,
    /// Line content after indentation and any surface directive.
    pub text: String,
    /// 1-based line number in the original file.
    pub line: u32,
    /// Byte offset of `text` within the normalized source.
    pub offset: usize,
    /// 1-based character column where `text` starts in the original line.
    pub column_base: u32,
    pub surface: Option<Surface>,
}

/// A loaded `.dsy` file with its byte-addressed line table.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub file: FileId,
    pub name: String,
    /// Normalized source (all line endings are `\n`).
    pub text: String,
    pub lines: Vec<Line>,
}

impl SourceFile {
    pub fn read(file: FileId, path: &Path) -> DaisyResult<SourceFile> {
        let raw = fs::read_to_string(path).map_err(DaisyError::Io)?;
        Ok(Self::new(file, path.display().to_string(), &raw))
    }

    pub fn new(file: FileId, name: String, raw: &str) -> SourceFile {
        let text = normalize_newlines(raw);
        let lines = split_lines(&text);
        SourceFile { file, name, text, lines }
    }

    /// The full original line (including indentation) for diagnostics.
    pub fn line_text(&self, line: u32) -> &str {
        let idx = line.saturating_sub(1) as usize;
        self.text.split('\n').nth(idx).unwrap_or("")
    }
}

fn normalize_newlines(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            _ => out.push(c),
        }
    }
    out
}

fn split_lines(text: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut offset = 0usize;
    for (idx, raw_line) in text.split('\n').enumerate() {
        let line_no = idx as u32 + 1;
        if raw_line.trim().is_empty() {
            offset += raw_line.len() + 1;
            continue;
        }
        let indent = raw_line.len() - raw_line.trim_start_matches(' ').len();
        let mut content = &raw_line[indent..];
        let mut surface = None;
        let mut directive_len = 0usize;
        if let Some(rest) = content.strip_prefix(DIRECTIVE_ENGLISH) {
            surface = Some(Surface::English);
            directive_len = DIRECTIVE_ENGLISH.len() + leading_spaces(rest);
            content = rest.trim_start_matches(' ');
        } else if let Some(rest) = content.strip_prefix(DIRECTIVE_KOREAN) {
            surface = Some(Surface::Korean);
            directive_len = DIRECTIVE_KOREAN.len() + leading_spaces(rest);
            content = rest.trim_start_matches(' ');
        }
        let column_base = raw_line[..indent + directive_len].chars().count() as u32 + 1;
        lines.push(Line {
            indent,
            text: content.to_string(),
            line: line_no,
            offset: offset + indent + directive_len,
            column_base,
            surface,
        });
        offset += raw_line.len() + 1;
    }
    lines
}

fn leading_spaces(s: &str) -> usize {
    s.len() - s.trim_start_matches(' ').len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_crlf() {
        let sf = SourceFile::new(0, "t.dsy".into(), "module m\r\nreturn 0\r\n");
        assert_eq!(sf.text, "module m\nreturn 0\n");
        assert_eq!(sf.lines.len(), 2);
        assert_eq!(sf.lines[1].line, 2);
    }

    #[test]
    fn skips_blank_lines_but_keeps_numbers() {
        let sf = SourceFile::new(0, "t.dsy".into(), "module m\n\n  print 1\n");
        assert_eq!(sf.lines.len(), 2);
        assert_eq!(sf.lines[1].line, 3);
        assert_eq!(sf.lines[1].indent, 2);
    }

    #[test]
    fn strips_surface_directives() {
        let sf = SourceFile::new(0, "t.dsy".into(), "한국어: 0을 반환한다\n영어: return 0\n");
        assert_eq!(sf.lines[0].surface, Some(Surface::Korean));
        assert_eq!(sf.lines[0].text, "0을 반환한다");
        assert_eq!(sf.lines[1].surface, Some(Surface::English));
        assert_eq!(sf.lines[1].text, "return 0");
    }

    #[test]
    fn line_offsets_address_bytes() {
        let sf = SourceFile::new(0, "t.dsy".into(), "module m\n  print 1\n");
        let line = &sf.lines[1];
        assert_eq!(&sf.text[line.offset..line.offset + line.text.len()], "print 1");
    }
}
