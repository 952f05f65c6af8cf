//! DAISY lexer: logos tokens + particle splitting + INDENT/DEDENT layout.
//!
//! Both surfaces share one token stream. Korean grammatical particles are
//! split off identifier tails and emitted as standalone tokens so parser
//! rules can match `NAME 를 ...` uniformly.

use logos::Logos;

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{DaisyError, DaisyResult};
use crate::source::SourceFile;
use crate::span::Span;

/// Longest-first; a suffix match against an identifier splits the particle off.
pub const KOREAN_PARTICLES: &[&str] = &[
    "부터", "까지", "을", "를", "에", "의", "은", "는", "이", "가", "으로", "로",
];

/// Korean words that happen to end in a particle syllable but are grammar
/// words of their own.
const NO_SPLIT: &[&str] = &["정의", "영어", "한국어"];

/// English-surface keywords. Korean grammar words stay `Ident` and are
/// matched by lexeme in the parser.
pub const KEYWORDS: &[&str] = &[
    "module", "import", "use", "as", "export", "public", "private", "extern",
    "fn", "struct", "enum", "trait", "impl", "for", "case", "if", "elif",
    "else", "match", "repeat", "while", "break", "continue", "return",
    "print", "let", "set", "add", "to", "unsafe", "release", "move", "copy",
    "borrow", "mut", "try", "and", "or", "true", "false",
];

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
#[logos(skip r"#[^\n]*")]
enum RawToken {
    #[token("->")]
    Arrow,

    #[token("..")]
    DotDot,

    #[token("==")]
    #[token("!=")]
    #[token(">=")]
    #[token("<=")]
    #[token("&&")]
    #[token("||")]
    #[token("=")]
    #[token("<")]
    #[token(">")]
    #[token("+")]
    #[token("-")]
    #[token("*")]
    #[token("/")]
    Op,

    #[token("(")]
    #[token(")")]
    #[token("[")]
    #[token("]")]
    #[token(":")]
    #[token(",")]
    #[token(".")]
    Punct,

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        Some(unescape(&s[1..s.len() - 1]))
    })]
    Str(String),

    #[regex(r"[A-Za-z_가-힣][A-Za-z0-9_가-힣]*")]
    Word,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword,
    Ident,
    Int(i64),
    Str(String),
    Particle,
    Op,
    Punct,
    Arrow,
    DotDot,
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, span: Span) -> Self {
        Self { kind, lexeme: lexeme.into(), span }
    }

    /// True for a keyword or identifier with exactly this lexeme.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self.kind, TokenKind::Keyword | TokenKind::Ident) && self.lexeme == word
    }

    pub fn is_particle(&self, particle: &str) -> bool {
        self.kind == TokenKind::Particle && self.lexeme == particle
    }

    pub fn is_value(&self, lexeme: &str) -> bool {
        self.lexeme == lexeme
            && !matches!(self.kind, TokenKind::Str(_) | TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent)
    }
}

pub struct Lexer<'a> {
    source: &'a SourceFile,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a SourceFile) -> Self {
        Self { source }
    }

    pub fn tokenize(&self) -> DaisyResult<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut errors: Vec<Diagnostic> = Vec::new();
        let mut indent_stack: Vec<usize> = vec![0];
        let mut last_span = Span::dummy();

        for line in &self.source.lines {
            let line_start = Span::new(self.source.file, line.offset, line.offset, line.line, 1);
            let line_tokens = match self.lex_line(line) {
                Ok(line_tokens) => line_tokens,
                Err(diag) => {
                    // resynchronize at the next line
                    errors.push(diag);
                    continue;
                }
            };
            // comment-only lines carry no layout
            if line_tokens.is_empty() {
                continue;
            }
            if line.indent % 2 != 0 {
                errors.push(Diagnostic::new(
                    DiagnosticKind::LexicalError,
                    format!("indentation must be a multiple of 2 spaces, found {}", line.indent),
                    Some(line_start),
                ));
                continue;
            }
            if line.indent > *indent_stack.last().unwrap() {
                indent_stack.push(line.indent);
                tokens.push(Token::new(TokenKind::Indent, "", line_start));
            }
            while line.indent < *indent_stack.last().unwrap() {
                indent_stack.pop();
                tokens.push(Token::new(TokenKind::Dedent, "", line_start));
            }
            last_span = line_tokens.last().map(|t| t.span).unwrap_or(line_start);
            tokens.extend(line_tokens);
            tokens.push(Token::new(TokenKind::Newline, "", last_span));
        }

        while indent_stack.len() > 1 {
            indent_stack.pop();
            tokens.push(Token::new(TokenKind::Dedent, "", last_span));
        }
        tokens.push(Token::new(TokenKind::Eof, "", last_span));

        if errors.is_empty() {
            Ok(tokens)
        } else {
            Err(DaisyError::Diagnostics(errors))
        }
    }

    fn lex_line(&self, line: &crate::source::Line) -> Result<Vec<Token>, Diagnostic> {
        let mut out = Vec::new();
        let mut lex = RawToken::lexer(&line.text);
        while let Some(result) = lex.next() {
            let range = lex.span();
            let span = self.span_for(line, range.start, range.end);
            match result {
                Ok(RawToken::Arrow) => out.push(Token::new(TokenKind::Arrow, "->", span)),
                Ok(RawToken::DotDot) => out.push(Token::new(TokenKind::DotDot, "..", span)),
                Ok(RawToken::Op) => out.push(Token::new(TokenKind::Op, lex.slice(), span)),
                Ok(RawToken::Punct) => out.push(Token::new(TokenKind::Punct, lex.slice(), span)),
                Ok(RawToken::Int(value)) => out.push(Token::new(TokenKind::Int(value), lex.slice(), span)),
                Ok(RawToken::Str(value)) => {
                    out.push(Token::new(TokenKind::Str(value.clone()), lex.slice(), span))
                }
                Ok(RawToken::Word) => out.extend(split_particle(lex.slice(), span)),
                Err(()) => {
                    return Err(Diagnostic::new(
                        DiagnosticKind::LexicalError,
                        format!("unexpected character: '{}'", lex.slice()),
                        Some(span),
                    ));
                }
            }
        }
        Ok(out)
    }

    fn span_for(&self, line: &crate::source::Line, start: usize, end: usize) -> Span {
        let column = line.column_base + line.text[..start].chars().count() as u32 - 1;
        Span::new(self.source.file, line.offset + start, line.offset + end, line.line, column + 1)
    }
}

/// Splits one trailing particle off an identifier, if any.
fn split_particle(word: &str, span: Span) -> Vec<Token> {
    let classify = |w: &str, s: Span| {
        let kind = if KEYWORDS.contains(&w) { TokenKind::Keyword } else { TokenKind::Ident };
        Token::new(kind, w, s)
    };
    if NO_SPLIT.contains(&word) {
        return vec![classify(word, span)];
    }
    for particle in KOREAN_PARTICLES {
        if let Some(stem) = word.strip_suffix(particle) {
            if stem.is_empty() {
                continue;
            }
            let split_at = span.start + stem.len();
            let stem_span = Span::new(span.file, span.start, split_at, span.line, span.column);
            let particle_span = Span::new(
                span.file,
                split_at,
                span.end,
                span.line,
                span.column + stem.chars().count() as u32,
            );
            return vec![
                classify(stem, stem_span),
                Token::new(TokenKind::Particle, *particle, particle_span),
            ];
        }
    }
    vec![classify(word, span)]
}

fn unescape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('"') => result.push('"'),
                Some('\\') => result.push('\\'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceFile;

    fn lex(src: &str) -> Vec<Token> {
        let sf = SourceFile::new(0, "test.dsy".into(), src);
        Lexer::new(&sf).tokenize().unwrap()
    }

    #[test]
    fn basic_english_tokens() {
        let tokens = lex("fn main() -> int:\n  return 0\n");
        assert_eq!(tokens[0].kind, TokenKind::Keyword);
        assert_eq!(tokens[0].lexeme, "fn");
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Arrow));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Indent));
        assert!(tokens.iter().any(|t| matches!(t.kind, TokenKind::Int(0))));
    }

    #[test]
    fn particles_are_standalone_tokens() {
        let tokens = lex("버퍼를 8바이트로 생성한다\n");
        let words: Vec<_> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert!(words.contains(&"버퍼"));
        assert!(tokens.iter().any(|t| t.is_particle("를")));
        assert!(tokens.iter().any(|t| t.is_particle("로")));
        assert!(tokens.iter().any(|t| t.lexeme == "바이트"));
    }

    #[test]
    fn function_definition_word_is_not_split() {
        let tokens = lex("함수 main 정의:\n  0을 반환한다\n");
        assert!(tokens.iter().any(|t| t.is_word("정의")));
        assert!(tokens.iter().any(|t| t.is_particle("을")));
        assert!(tokens.iter().any(|t| t.is_word("반환한다")));
    }

    #[test]
    fn dedents_close_at_eof() {
        let tokens = lex("fn f() -> int:\n  if true:\n    return 1\n");
        let dedents = tokens.iter().filter(|t| t.kind == TokenKind::Dedent).count();
        assert_eq!(dedents, 2);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn odd_indentation_is_a_lexical_error() {
        let sf = SourceFile::new(0, "test.dsy".into(), "fn f() -> int:\n   return 1\n");
        let err = Lexer::new(&sf).tokenize().unwrap_err();
        match err {
            DaisyError::Diagnostics(diags) => {
                assert_eq!(diags[0].kind, DiagnosticKind::LexicalError);
            }
            other => panic!("expected diagnostics, got {other:?}"),
        }
    }

    #[test]
    fn string_escapes() {
        let tokens = lex("print \"a\\n\\\"b\\\"\"\n");
        let s = tokens.iter().find_map(|t| match &t.kind {
            TokenKind::Str(v) => Some(v.clone()),
            _ => None,
        });
        assert_eq!(s.as_deref(), Some("a\n\"b\""));
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let tokens = lex("return 0 # the answer\n");
        assert!(!tokens.iter().any(|t| t.lexeme.contains("answer")));
    }

    #[test]
    fn range_brackets_for_borrows() {
        let tokens = lex("let v = borrow mut r[0..8]\n");
        assert!(tokens.iter().any(|t| t.kind == TokenKind::DotDot));
        assert!(tokens.iter().any(|t| t.lexeme == "["));
        assert!(tokens.iter().any(|t| t.is_word("mut")));
    }
}
