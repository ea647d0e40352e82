/*

 ▄▄▄▄    ██▓    ▄▄▄       ▄████▄   ██ ▄█▀ ██▀███   █    ██   ██████  ██░ ██
▓█████▄ ▓██▒   ▒████▄    ▒██▀ ▀█   ██▄█▒ ▓██ ▒ ██▒ ██  ▓██▒▒██    ▒ ▓██░ ██▒
▒██▒ ▄██▒██░   ▒██  ▀█▄  ▒▓█    ▄ ▓███▄░ ▓██ ░▄█ ▒▓██  ▒██░░ ▓██▄   ▒██▀▀██░
▒██░█▀  ▒██░   ░██▄▄▄▄██ ▒▓▓▄ ▄██▒▓██ █▄ ▒██▀▀█▄  ▓▓█  ░██░  ▒   ██▒░▓█ ░██
░▓█  ▀█▓░██████▒▓█   ▓██▒▒ ▓███▀ ░▒██▒ █▄░██▓ ▒██▒▒▒█████▓ ▒██████▒▒░▓█▒░██▓
░▒▓███▀▒░ ▒░▓  ░▒▒   ▓▒█░░ ░▒ ▒  ░▒ ▒▒ ▓▒░ ▒▓ ░▒▓░░▒▓▒ ▒ ▒ ▒ ▒▓▒ ▒ ░ ▒ ░░▒░▒
▒░▒   ░ ░ ░ ▒  ░ ▒   ▒▒ ░  ░  ▒   ░ ░▒ ▒░  ░▒ ░ ▒░░░▒░ ░ ░ ░ ░▒  ░ ░ ▒ ░▒░ ░
 ░    ░   ░ ░    ░   ▒   ░        ░ ░░ ░   ░░   ░  ░░░ ░ ░ ░  ░  ░   ░  ░░ ░
 ░          ░  ░     ░  ░░ ░      ░  ░      ░        ░           ░   ░  ░  ░
      ░                  ░
Copyright (C) 2026, Blackrush LLC, All Rights Reserved
Created by Erik Olson, Tarpon Springs, Florida
For more information, visit BlackrushDrive.com

MIT License

Copyright (c) 2026 Erik Lee Olson for Blackrush, LLC

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.

*/
//! Lexer for BaZic (span + line/column tracked tokens, newline separators)
//!
//! `tokenize` is a free function and every call builds its own cursor, so two
//! concurrent parses never share lexer state. Malformed input never raises:
//! unrecognized characters are emitted as `TokenKind::Undefined` tokens and
//! left for the parser to diagnose.
use std::collections::HashMap;

use bazic_common::Span;
use once_cell::sync::Lazy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Single-char
    LParen, RParen, LBracket, RBracket, Comma, Dot,
    Plus, Minus, Star, Slash, Percent,
    Equal,                 // '=' (assignment or equality, parser decides)
    Lt, Gt,
    // Two-char
    LtEq, GtEq,
    // Literals / identifiers
    Identifier, Integer, Double, String,
    // Keywords
    Variable, Function, Extern, Async, Event, Bind,
    Return, Throw, Break, Breakpoint,
    If, Then, Else, End,
    Do, Loop, While,
    Try, Catch, Exception,
    New, Await, Not, And, Or,
    True, False, Null,
    // Separators (statement boundaries, never whitespace)
    NewLine, Comment,
    // Anything the lexer cannot classify
    Undefined,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    /// Cooked string value for `String` tokens (escapes resolved).
    pub value: Option<String>,
    pub span: Span,
    pub line: u32,     // 1-based
    pub column: u32,   // 1-based
}

impl Token {
    pub fn offset(&self) -> u32 { self.span.start }
    pub fn len(&self) -> u32 { self.span.len() }
    pub fn is_separator(&self) -> bool { matches!(self.kind, TokenKind::NewLine | TokenKind::Comment) }
}

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    use TokenKind::*;
    HashMap::from([
        ("VARIABLE", Variable), ("FUNCTION", Function), ("EXTERN", Extern),
        ("ASYNC", Async), ("EVENT", Event), ("BIND", Bind),
        ("RETURN", Return), ("THROW", Throw), ("BREAK", Break), ("BREAKPOINT", Breakpoint),
        ("IF", If), ("THEN", Then), ("ELSE", Else), ("END", End),
        ("DO", Do), ("LOOP", Loop), ("WHILE", While),
        ("TRY", Try), ("CATCH", Catch), ("EXCEPTION", Exception),
        ("NEW", New), ("AWAIT", Await), ("NOT", Not), ("AND", And), ("OR", Or),
        ("TRUE", True), ("FALSE", False), ("NULL", Null),
    ])
});

/// Tokenize one source text. The returned stream always ends with `Eof`.
pub fn tokenize(src: &str) -> Vec<Token> {
    let mut cur = Cursor::new(src);
    let mut out = Vec::new();
    loop {
        let t = cur.next_token();
        let eof = t.kind == TokenKind::Eof;
        out.push(t);
        if eof { break; }
    }
    out
}

struct Cursor<'a> {
    src:   &'a str,
    chars: std::str::Chars<'a>,
    cur:   Option<char>,
    pos:   usize, // byte offset *after* `cur`
    start: usize, // byte offset start of current token
    line:  u32,
    col:   u32,   // 1-based column of `cur`
    tok_line: u32,
    tok_col:  u32,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        let mut c = Self {
            src,
            chars: src.chars(),
            cur: None,
            pos: 0,
            start: 0,
            line: 1,
            col: 0,
            tok_line: 1,
            tok_col: 1,
        };
        c.advance(); // prime `cur` and `pos`
        c
    }

    fn next_token(&mut self) -> Token {
        self.skip_blanks();

        self.tok_line = self.line;
        self.tok_col = self.col;

        let ch = match self.cur {
            Some(c) => c,
            None => return self.make_with_span(TokenKind::Eof, self.pos, self.pos),
        };

        // `start` points at the beginning of the current character
        let clen = ch.len_utf8();
        self.start = self.pos - clen;

        match ch {
            '\n' => { let t = self.make(TokenKind::NewLine); self.advance(); t }
            '#' => self.comment(),
            '(' => { let t = self.make(TokenKind::LParen);   self.advance(); t }
            ')' => { let t = self.make(TokenKind::RParen);   self.advance(); t }
            '[' => { let t = self.make(TokenKind::LBracket); self.advance(); t }
            ']' => { let t = self.make(TokenKind::RBracket); self.advance(); t }
            ',' => { let t = self.make(TokenKind::Comma);    self.advance(); t }
            '.' => { let t = self.make(TokenKind::Dot);      self.advance(); t }
            '+' => { let t = self.make(TokenKind::Plus);     self.advance(); t }
            '-' => { let t = self.make(TokenKind::Minus);    self.advance(); t }
            '*' => { let t = self.make(TokenKind::Star);     self.advance(); t }
            '/' => { let t = self.make(TokenKind::Slash);    self.advance(); t }
            '%' => { let t = self.make(TokenKind::Percent);  self.advance(); t }
            '=' => { let t = self.make(TokenKind::Equal);    self.advance(); t }
            '<' => {
                self.advance();
                let kind = if self.match_char('=') { TokenKind::LtEq } else { TokenKind::Lt };
                self.make_with_span(kind, self.start, self.pos_of_cur())
            }
            '>' => {
                self.advance();
                let kind = if self.match_char('=') { TokenKind::GtEq } else { TokenKind::Gt };
                self.make_with_span(kind, self.start, self.pos_of_cur())
            }
            '"' => self.string(),
            c if c.is_ascii_digit() => self.number(),
            c if is_ident_start(c)  => self.ident_or_kw(),
            _ => self.undefined(),
        }
    }

    // Whitespace is skipped; newlines are NOT whitespace here, they are tokens.
    fn skip_blanks(&mut self) {
        while matches!(self.cur, Some(c) if c != '\n' && c.is_whitespace()) {
            self.advance();
        }
    }

    fn comment(&mut self) -> Token {
        let start = self.start;
        while let Some(ch) = self.cur {
            if ch == '\n' { break; }
            self.advance();
        }
        self.make_with_span(TokenKind::Comment, start, self.pos_of_cur())
    }

    fn string(&mut self) -> Token {
        let outer_start = self.start;
        self.advance(); // step past opening quote
        let mut cooked = String::new();
        loop {
            match self.cur {
                None | Some('\n') => {
                    // Unterminated: hand back what we saw as Undefined, the
                    // parser reports it.
                    return self.make_with_span(TokenKind::Undefined, outer_start, self.pos_of_cur());
                }
                Some('"') => { self.advance(); break; }
                Some('\\') => {
                    self.advance();
                    match self.cur {
                        Some('n') => { cooked.push('\n'); self.advance(); }
                        Some('t') => { cooked.push('\t'); self.advance(); }
                        Some('r') => { cooked.push('\r'); self.advance(); }
                        Some(c) => { cooked.push(c); self.advance(); }
                        None => {}
                    }
                }
                Some(c) => { cooked.push(c); self.advance(); }
            }
        }
        let mut tok = self.make_with_span(TokenKind::String, outer_start, self.pos_of_cur());
        tok.value = Some(cooked);
        tok
    }

    fn number(&mut self) -> Token {
        let start = self.start;
        let mut end = self.pos; // after the first digit
        let mut is_double = false;

        while matches!(self.cur, Some(c) if c.is_ascii_digit()) {
            end = self.pos;
            self.advance();
        }
        if self.cur == Some('.') && matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            is_double = true;
            end = self.pos; // includes the dot
            self.advance();
            while matches!(self.cur, Some(c) if c.is_ascii_digit()) {
                end = self.pos;
                self.advance();
            }
        }
        let kind = if is_double { TokenKind::Double } else { TokenKind::Integer };
        self.make_with_span(kind, start, end)
    }

    fn ident_or_kw(&mut self) -> Token {
        let start = self.start;
        let mut end = self.pos;
        loop {
            match self.cur {
                Some(c) if is_ident_continue(c) => { end = self.pos; self.advance(); }
                _ => break,
            }
        }
        let lex = &self.src[start..end];
        let kind = KEYWORDS
            .get(lex.to_ascii_uppercase().as_str())
            .copied()
            .unwrap_or(TokenKind::Identifier);
        self.make_with_span(kind, start, end)
    }

    // A run of characters nothing else claims becomes one Undefined token.
    fn undefined(&mut self) -> Token {
        let start = self.start;
        let mut end = self.pos;
        loop {
            match self.cur {
                None => break,
                Some(c) if c.is_whitespace() || c == '"' || c.is_ascii_alphanumeric()
                    || "()[],.+-*/%=<>#_".contains(c) => break,
                Some(_) => { end = self.pos; self.advance(); }
            }
        }
        self.make_with_span(TokenKind::Undefined, start, end)
    }

    fn make(&self, kind: TokenKind) -> Token {
        self.make_with_span(kind, self.start, self.pos)
    }
    fn make_with_span(&self, kind: TokenKind, start: usize, end: usize) -> Token {
        Token {
            kind,
            lexeme: self.src[start..end].to_string(),
            value: None,
            span: Span::new(start, end),
            line: self.tok_line,
            column: self.tok_col,
        }
    }

    // Byte offset of the character currently under the cursor.
    fn pos_of_cur(&self) -> usize {
        match self.cur {
            Some(c) => self.pos - c.len_utf8(),
            None => self.src.len(),
        }
    }

    fn advance(&mut self) {
        if self.cur == Some('\n') {
            self.line += 1;
            self.col = 0;
        }
        self.cur = self.chars.next();
        if let Some(c) = self.cur {
            self.pos += c.len_utf8();
            self.col += 1;
        } else {
            self.pos = self.src.len();
            self.col += 1;
        }
    }

    fn match_char(&mut self, want: char) -> bool {
        if self.cur == Some(want) { self.advance(); true } else { false }
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }
}

fn is_ident_start(c: char) -> bool { c.is_ascii_alphabetic() || c == '_' }
fn is_ident_continue(c: char) -> bool { c.is_ascii_alphanumeric() || c == '_' }
