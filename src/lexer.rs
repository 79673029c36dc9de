//! Code scanner for expression text.
//!
//! Walks JavaScript/JSX expression source with an explicit state machine so
//! that operators inside strings, template literals, comments, regex literals
//! and embedded markup are never mistaken for structural operators. Every
//! structural token carries the bracket depth it was found at; depth zero is
//! "top level".

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenKind {
    /// `?` of a ternary.
    Question,
    Colon,
    AndAnd,
    OrOr,
    /// `??`
    Nullish,
    /// `=>`
    Arrow,
    Comma,
    /// `.map` or `?.map` followed by `(`. The span covers the accessor only.
    MapCall,
    /// A complete JSX element or fragment.
    Markup,
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    /// Bracket depth outside the token. Matching `Open`/`Close` share a depth.
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    InString(u8),
    InTemplate,
    LineComment,
    BlockComment,
}

/// What the last significant token was; decides whether `<` or `/` starts
/// an operand (markup, regex) or is an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prev {
    Start,
    Operator,
    Value,
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str())
}

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    state: ScanState,
    depth: usize,
    template_stack: Vec<usize>,
    prev: Prev,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self::starting_at(src, 0)
    }

    pub fn starting_at(src: &'a str, pos: usize) -> Self {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos,
            state: ScanState::Normal,
            depth: 0,
            template_stack: Vec::new(),
            prev: Prev::Start,
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn token(&mut self, kind: TokenKind, len: usize) -> Token {
        let start = self.pos;
        self.pos += len;
        self.prev = Prev::Operator;
        Token {
            kind,
            start,
            end: self.pos,
            depth: self.depth,
        }
    }

    fn markup_allowed(&self) -> bool {
        self.prev != Prev::Value
    }

    fn skip_regex(&mut self) {
        // pos is on the opening '/'
        self.pos += 1;
        let mut in_class = false;
        while let Some(b) = self.peek(0) {
            match b {
                b'\\' => self.pos += 2,
                b'[' => {
                    in_class = true;
                    self.pos += 1;
                }
                b']' => {
                    in_class = false;
                    self.pos += 1;
                }
                b'/' if !in_class => {
                    self.pos += 1;
                    break;
                }
                b'\n' => break,
                _ => self.pos += 1,
            }
        }
        while self.peek(0).is_some_and(|b| b.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        self.prev = Prev::Value;
    }

    fn read_word(&mut self) {
        let start = self.pos;
        while self
            .peek(0)
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80)
        {
            self.pos += 1;
        }
        let word = &self.src[start..self.pos];
        self.prev = match word {
            "return" | "yield" | "await" | "case" | "typeof" | "void" | "in" | "of" | "new"
            | "delete" | "else" | "do" => Prev::Operator,
            _ => Prev::Value,
        };
    }

    fn at_map_call(&self, from: usize) -> bool {
        let rest = &self.bytes[from..];
        if !rest.starts_with(b"map") {
            return false;
        }
        let after = &rest[3..];
        if after
            .first()
            .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'$')
        {
            return false;
        }
        after
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .is_some_and(|b| *b == b'(')
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            match self.state {
                ScanState::LineComment => {
                    if b == b'\n' {
                        self.state = ScanState::Normal;
                    }
                    self.pos += 1;
                }
                ScanState::BlockComment => {
                    if b == b'*' && self.peek(1) == Some(b'/') {
                        self.state = ScanState::Normal;
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                    }
                }
                ScanState::InString(q) => {
                    if b == b'\\' {
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                        if b == q || b == b'\n' {
                            self.state = ScanState::Normal;
                            self.prev = Prev::Value;
                        }
                    }
                }
                ScanState::InTemplate => {
                    if b == b'\\' {
                        self.pos += 2;
                    } else if b == b'`' {
                        self.pos += 1;
                        self.state = ScanState::Normal;
                        self.prev = Prev::Value;
                    } else if b == b'$' && self.peek(1) == Some(b'{') {
                        self.template_stack.push(self.depth);
                        self.depth += 1;
                        self.pos += 2;
                        self.state = ScanState::Normal;
                        self.prev = Prev::Start;
                    } else {
                        self.pos += 1;
                    }
                }
                ScanState::Normal => match b {
                    b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                    b'/' if self.peek(1) == Some(b'/') => {
                        self.state = ScanState::LineComment;
                        self.pos += 2;
                    }
                    b'/' if self.peek(1) == Some(b'*') => {
                        self.state = ScanState::BlockComment;
                        self.pos += 2;
                    }
                    b'/' if self.prev != Prev::Value => self.skip_regex(),
                    b'"' | b'\'' => {
                        self.state = ScanState::InString(b);
                        self.pos += 1;
                    }
                    b'`' => {
                        self.state = ScanState::InTemplate;
                        self.pos += 1;
                    }
                    b'(' | b'[' | b'{' => {
                        let tok = self.token(TokenKind::Open, 1);
                        self.depth += 1;
                        self.prev = Prev::Start;
                        return Some(tok);
                    }
                    b')' | b']' | b'}' => {
                        if b == b'}' && self.template_stack.last() == Some(&(self.depth.saturating_sub(1))) {
                            self.template_stack.pop();
                            self.depth -= 1;
                            self.pos += 1;
                            self.state = ScanState::InTemplate;
                            continue;
                        }
                        self.depth = self.depth.saturating_sub(1);
                        let tok = self.token(TokenKind::Close, 1);
                        self.prev = Prev::Value;
                        return Some(tok);
                    }
                    b'?' => {
                        if self.peek(1) == Some(b'?') {
                            let len = if self.peek(2) == Some(b'=') { 3 } else { 2 };
                            return Some(self.token(TokenKind::Nullish, len));
                        }
                        if self.peek(1) == Some(b'.') && !self.peek(2).is_some_and(|c| c.is_ascii_digit()) {
                            if self.at_map_call(self.pos + 2) {
                                return Some(self.token(TokenKind::MapCall, 5));
                            }
                            self.pos += 2;
                            self.prev = Prev::Operator;
                            continue;
                        }
                        return Some(self.token(TokenKind::Question, 1));
                    }
                    b'.' => {
                        if self.at_map_call(self.pos + 1) {
                            return Some(self.token(TokenKind::MapCall, 4));
                        }
                        if self.prev == Prev::Value && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
                            self.pos += 1;
                        } else {
                            self.pos += 1;
                            self.prev = Prev::Operator;
                        }
                    }
                    b':' => return Some(self.token(TokenKind::Colon, 1)),
                    b',' => return Some(self.token(TokenKind::Comma, 1)),
                    b'&' if self.peek(1) == Some(b'&') => {
                        let len = if self.peek(2) == Some(b'=') { 3 } else { 2 };
                        return Some(self.token(TokenKind::AndAnd, len));
                    }
                    b'|' if self.peek(1) == Some(b'|') => {
                        let len = if self.peek(2) == Some(b'=') { 3 } else { 2 };
                        return Some(self.token(TokenKind::OrOr, len));
                    }
                    b'=' if self.peek(1) == Some(b'>') => {
                        return Some(self.token(TokenKind::Arrow, 2));
                    }
                    b'<' if self.markup_allowed()
                        && self
                            .peek(1)
                            .is_some_and(|c| c.is_ascii_alphabetic() || c == b'>') =>
                    {
                        let start = self.pos;
                        let end = scan_markup(self.src, start).unwrap_or(self.bytes.len());
                        self.pos = end;
                        self.prev = Prev::Value;
                        return Some(Token {
                            kind: TokenKind::Markup,
                            start,
                            end,
                            depth: self.depth,
                        });
                    }
                    c if c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c >= 0x80 => {
                        self.read_word()
                    }
                    _ => {
                        self.pos += 1;
                        self.prev = Prev::Operator;
                    }
                },
            }
        }
        None
    }
}

/// All structural tokens of `src`, in order.
pub fn scan(src: &str) -> Vec<Token> {
    Lexer::new(src).collect()
}

/// Tokens at bracket depth zero.
pub fn top_level(src: &str) -> Vec<Token> {
    Lexer::new(src).filter(|t| t.depth == 0).collect()
}

/// True when `src` contains a JSX element outside strings and comments.
pub fn contains_markup(src: &str) -> bool {
    Lexer::new(src).any(|t| t.kind == TokenKind::Markup)
}

/// Index of the bracket closing the one at `open`.
pub fn find_matching(src: &str, open: usize) -> Option<usize> {
    let mut lexer = Lexer::starting_at(src, open);
    let first = lexer.next()?;
    if first.kind != TokenKind::Open || first.start != open {
        return None;
    }
    lexer
        .find(|t| t.kind == TokenKind::Close && t.depth == first.depth)
        .map(|t| t.start)
}

/// End (exclusive) of the JSX element or fragment starting at `start`.
///
/// Attribute values in quotes and `{...}` code are skipped as units, so a `>`
/// or `<` inside them never opens or closes a tag. Void HTML elements close
/// themselves even without `/>`.
pub fn scan_markup(src: &str, start: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth = 0usize;
    let mut i = start;

    while i < bytes.len() {
        match bytes[i] {
            b'<' if bytes.get(i + 1) == Some(&b'/') => {
                let close = i + src[i..].find('>')?;
                i = close + 1;
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            b'<' if bytes
                .get(i + 1)
                .is_some_and(|c| c.is_ascii_alphabetic() || *c == b'>') =>
            {
                i += 1;
                let name_start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'.' | b'-' | b'_' | b':'))
                {
                    i += 1;
                }
                let name = &src[name_start..i];
                let mut self_closing = false;
                loop {
                    match bytes.get(i)? {
                        b'"' | b'\'' => {
                            let q = bytes[i];
                            i += 1;
                            while *bytes.get(i)? != q {
                                i += 1;
                            }
                            i += 1;
                        }
                        b'{' => i = find_matching(src, i)? + 1,
                        b'/' if bytes.get(i + 1) == Some(&b'>') => {
                            i += 2;
                            self_closing = true;
                            break;
                        }
                        b'>' => {
                            i += 1;
                            break;
                        }
                        _ => i += 1,
                    }
                }
                if !self_closing && !is_void_element(name) {
                    depth += 1;
                } else if depth == 0 {
                    return Some(i);
                }
            }
            b'{' => i = find_matching(src, i)? + 1,
            _ => i += 1,
        }
    }
    None
}
