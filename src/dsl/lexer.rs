use super::ast::HttpVerb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Data,
    Do,
    Route,
    Migration,
    Import,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Self> {
        match word {
            "data" => Some(Keyword::Data),
            "do" => Some(Keyword::Do),
            "route" => Some(Keyword::Route),
            "migration" => Some(Keyword::Migration),
            "import" => Some(Keyword::Import),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Keyword),
    Verb(HttpVerb),
    Ident,
    /// Double-quoted string; `text` holds the unescaped contents.
    Str,
    /// Raw numeric text, interpreted by the parser.
    Number,
    /// A string that hit a newline or end of input before its closing quote.
    Unterminated,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Pipe,
    Question,
    FatArrow, // =>

    Eof,
}

impl TokenKind {
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Keyword(_) => "keyword",
            TokenKind::Verb(_) => "HTTP verb",
            TokenKind::Ident => "identifier",
            TokenKind::Str => "string",
            TokenKind::Number => "number",
            TokenKind::Unterminated => "unterminated string",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Pipe => "'|'",
            TokenKind::Question => "'?'",
            TokenKind::FatArrow => "'=>'",
            TokenKind::Eof => "end of input",
        }
    }

    /// Keywords, verbs and identifiers can all be used where a name is expected.
    pub fn is_word(self) -> bool {
        matches!(self, TokenKind::Ident | TokenKind::Keyword(_) | TokenKind::Verb(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
    /// Byte offset of the token's first character.
    pub offset: usize,
}

/// Split DSL source into tokens. Never fails: characters the DSL has no use
/// for (operators inside action bodies, stray punctuation) are skipped, and
/// the stream always ends with an `Eof` token.
pub fn tokenize(source: &str) -> Vec<Token> {
    tokenize_from(source, 0, 1, 1)
}

/// Tokenize `source` from byte `offset` onwards, where `offset` sits at the
/// given 1-based line and byte column. Positions stay absolute, so the result
/// can be spliced into an earlier token stream.
pub fn tokenize_from(source: &str, offset: usize, line: usize, column: usize) -> Vec<Token> {
    let mut lexer = Lexer::new(source);
    lexer.pos = offset.min(source.len());
    lexer.line = line;
    lexer.line_start = lexer.pos.saturating_sub(column.saturating_sub(1));
    lexer.run();
    lexer.tokens
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    line_start: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
            tokens: Vec::new(),
        }
    }

    fn run(&mut self) {
        while let Some(ch) = self.peek() {
            let start = self.pos;
            match ch {
                b'\n' => {
                    self.pos += 1;
                    self.newline();
                }
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'/' if self.peek_at(1) == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek_at(1) == Some(b'*') => self.skip_block_comment(),
                b'(' => self.single(TokenKind::LParen, start),
                b')' => self.single(TokenKind::RParen, start),
                b'{' => self.single(TokenKind::LBrace, start),
                b'}' => self.single(TokenKind::RBrace, start),
                b'[' => self.single(TokenKind::LBracket, start),
                b']' => self.single(TokenKind::RBracket, start),
                b',' => self.single(TokenKind::Comma, start),
                b':' => self.single(TokenKind::Colon, start),
                b'|' => self.single(TokenKind::Pipe, start),
                b'?' => self.single(TokenKind::Question, start),
                b'=' if self.peek_at(1) == Some(b'>') => {
                    self.pos += 2;
                    self.push(TokenKind::FatArrow, "=>".to_string(), start);
                }
                b'"' => self.lex_string(start),
                b'0'..=b'9' => self.lex_number(start),
                b'-' if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => self.lex_number(start),
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_word(start),
                _ => self.pos += 1,
            }
        }

        let (line, column) = (self.line, self.column(self.pos));
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            line,
            column,
            offset: self.pos,
        });
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn newline(&mut self) {
        self.line += 1;
        self.line_start = self.pos;
    }

    fn column(&self, offset: usize) -> usize {
        offset - self.line_start + 1
    }

    fn single(&mut self, kind: TokenKind, start: usize) {
        self.pos += 1;
        let text = self.slice(start, self.pos).to_string();
        self.push(kind, text, start);
    }

    fn push(&mut self, kind: TokenKind, text: String, start: usize) {
        let column = self.column(start);
        self.tokens.push(Token {
            kind,
            text,
            line: self.line,
            column,
            offset: start,
        });
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        self.source.get(start..end).unwrap_or_default()
    }

    fn skip_line_comment(&mut self) {
        while self.peek().is_some_and(|b| b != b'\n') {
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        while let Some(b) = self.peek() {
            if b == b'*' && self.peek_at(1) == Some(b'/') {
                self.pos += 2;
                return;
            }
            self.pos += 1;
            if b == b'\n' {
                self.newline();
            }
        }
    }

    /// Strings stop at the closing quote, a newline, or end of input; the
    /// last two produce an `Unterminated` token instead of failing here.
    fn lex_string(&mut self, start: usize) {
        self.pos += 1;
        let mut value = String::new();
        let mut chunk_start = self.pos;
        loop {
            match self.peek() {
                Some(b'"') => {
                    value.push_str(self.slice(chunk_start, self.pos));
                    self.pos += 1;
                    self.push(TokenKind::Str, value, start);
                    return;
                }
                Some(b'\\') => {
                    value.push_str(self.slice(chunk_start, self.pos));
                    let escaped_start = self.pos + 1;
                    let escaped = self.source.get(escaped_start..).and_then(|rest| rest.chars().next());
                    match escaped {
                        Some('\n') | None => {
                            self.pos = escaped_start;
                            break;
                        }
                        Some(c) => {
                            value.push(match c {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                other => other,
                            });
                            self.pos = escaped_start + c.len_utf8();
                            chunk_start = self.pos;
                        }
                    }
                }
                Some(b'\n') | None => {
                    value.push_str(self.slice(chunk_start, self.pos));
                    break;
                }
                Some(_) => self.pos += 1,
            }
        }
        self.push(TokenKind::Unterminated, value, start);
    }

    fn lex_number(&mut self, start: usize) {
        self.pos += 1;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = self.slice(start, self.pos).to_string();
        self.push(TokenKind::Number, text, start);
    }

    fn lex_word(&mut self, start: usize) {
        while self.peek().is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        let word = self.slice(start, self.pos);
        let kind = if let Some(kw) = Keyword::from_word(word) {
            TokenKind::Keyword(kw)
        } else if let Some(verb) = HttpVerb::from_word(word) {
            TokenKind::Verb(verb)
        } else {
            TokenKind::Ident
        };
        self.push(kind, word.to_string(), start);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn kinds(s: &str) -> Vec<TokenKind> {
        tokenize(s).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_verbs_and_identifiers() {
        assert_eq!(
            kinds("data do route migration import GET POST PUT DELETE PATCH user Get"),
            vec![
                TokenKind::Keyword(Keyword::Data),
                TokenKind::Keyword(Keyword::Do),
                TokenKind::Keyword(Keyword::Route),
                TokenKind::Keyword(Keyword::Migration),
                TokenKind::Keyword(Keyword::Import),
                TokenKind::Verb(HttpVerb::Get),
                TokenKind::Verb(HttpVerb::Post),
                TokenKind::Verb(HttpVerb::Put),
                TokenKind::Verb(HttpVerb::Delete),
                TokenKind::Verb(HttpVerb::Patch),
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn punctuation() {
        assert_eq!(
            kinds("( ) { } [ ] , : | ? =>"),
            vec![
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::Comma,
                TokenKind::Colon,
                TokenKind::Pipe,
                TokenKind::Question,
                TokenKind::FatArrow,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unknown_characters_are_skipped() {
        assert_eq!(
            kinds("x = a + b; y.z @ # ! é"),
            vec![
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_discarded() {
        let tokens = tokenize("a // line { comment\n/* block\n } */ b");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "a");
        assert_eq!(tokens[1].text, "b");
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn numbers_keep_raw_text() {
        let tokens = tokenize("3 2.50 -10 1.");
        assert_eq!(tokens[0].text, "3");
        assert_eq!(tokens[1].text, "2.50");
        assert_eq!(tokens[2].text, "-10");
        assert_eq!(tokens[3].text, "1");
        assert!(tokens[..4].iter().all(|t| t.kind == TokenKind::Number));
    }

    #[test]
    fn strings_unescape() {
        let tokens = tokenize(r#""a\"b\\c\n" "/users/:id""#);
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].text, "a\"b\\c\n");
        assert_eq!(tokens[1].text, "/users/:id");
    }

    #[test]
    fn unterminated_string_stops_at_newline() {
        let tokens = tokenize("\"abc\n}");
        assert_eq!(tokens[0].kind, TokenKind::Unterminated);
        assert_eq!(tokens[0].text, "abc");
        assert_eq!(tokens[1].kind, TokenKind::RBrace);
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn positions_are_tracked() {
        let tokens = tokenize("data User {\n  name: String\n}");
        let name = &tokens[3];
        assert_eq!(name.text, "name");
        assert_eq!((name.line, name.column), (2, 3));
        assert_eq!(name.offset, 14);
        let close = &tokens[6];
        assert_eq!(close.kind, TokenKind::RBrace);
        assert_eq!((close.line, close.column), (3, 1));
    }

    #[test]
    fn tokenizing_from_an_offset_keeps_absolute_positions() {
        let src = "do f() { '\"' }\ndata A {}";
        let start = src.find('}').unwrap() + 1;
        let tokens = tokenize_from(src, start, 1, start + 1);
        let data = &tokens[0];
        assert_eq!(data.kind, TokenKind::Keyword(Keyword::Data));
        assert_eq!((data.line, data.column, data.offset), (2, 1, src.find("data").unwrap()));
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokenize_from(src, 0, 1, 1), tokenize(src));
    }

    #[test]
    fn lone_equals_is_not_an_arrow() {
        assert_eq!(kinds("= >"), vec![TokenKind::Eof]);
    }
}
