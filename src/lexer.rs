use crate::error::{FableError, LexErrorKind, Span};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Colon,
    Slash,
    Star,

    // One or two character tokens
    Bang,
    BangEqual,
    Assign,
    Equal,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Layout
    Newline,
    Indent,
    Dedent,

    // Literals
    Identifier,
    Number,
    Str,

    // Keywords. BDD keywords are capitalized in source, ordinary language
    // keywords are lowercase; the distinction is load-bearing.
    Function,
    True,
    False,
    If,
    Else,
    Return,
    While,
    For,
    In,
    When,
    Then,
    And,
    Given,
    Story,
    Print,
    Scenario,
    LogicalAnd,
    LogicalOr,

    // Special
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub literal: Option<Literal>,
    pub line: usize,
    /// One-based column of the first byte of the lexeme.
    pub column: usize,
    pub span: Span,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        lexeme: String,
        literal: Option<Literal>,
        line: usize,
        column: usize,
        span: Span,
    ) -> Self {
        Self {
            kind,
            lexeme,
            literal,
            line,
            column,
            span,
        }
    }
}

pub struct Lexer {
    source: String,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: usize,
    line_start: usize,
    // Indentation columns currently open; the bottom entry is always 0 and
    // the stack is strictly increasing.
    indent_stack: Vec<usize>,
    // Established per file on first indent: every level must be a multiple
    // of this width using this symbol.
    indent_width: usize,
    indent_symbol: u8,
    keywords: HashMap<&'static str, TokenKind>,
}

impl Lexer {
    pub fn new(source: String) -> Self {
        let mut keywords = HashMap::new();
        keywords.insert("fn", TokenKind::Function);
        keywords.insert("true", TokenKind::True);
        keywords.insert("false", TokenKind::False);
        keywords.insert("if", TokenKind::If);
        keywords.insert("else", TokenKind::Else);
        keywords.insert("return", TokenKind::Return);
        keywords.insert("While", TokenKind::While);
        keywords.insert("For", TokenKind::For);
        keywords.insert("in", TokenKind::In);
        keywords.insert("When", TokenKind::When);
        keywords.insert("Then", TokenKind::Then);
        keywords.insert("And", TokenKind::And);
        keywords.insert("Given", TokenKind::Given);
        keywords.insert("Story", TokenKind::Story);
        keywords.insert("print", TokenKind::Print);
        keywords.insert("Scenario", TokenKind::Scenario);
        keywords.insert("and", TokenKind::LogicalAnd);
        keywords.insert("or", TokenKind::LogicalOr);

        Self {
            source,
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            line_start: 0,
            indent_stack: vec![0],
            indent_width: 0,
            indent_symbol: 0,
            keywords,
        }
    }

    /// Scans the whole source. On success the stream is terminated by
    /// exactly one EOF token.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, FableError> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()?;
        }

        self.tokens.push(Token::new(
            TokenKind::Eof,
            String::new(),
            None,
            self.line,
            self.current.saturating_sub(self.line_start) + 1,
            Span::single(self.current),
        ));

        Ok(std::mem::take(&mut self.tokens))
    }

    fn scan_token(&mut self) -> Result<(), FableError> {
        let c = self.advance();

        match c {
            b'(' => self.add_token(TokenKind::LeftParen),
            b')' => self.add_token(TokenKind::RightParen),
            b'{' => self.add_token(TokenKind::LeftBrace),
            b'}' => self.add_token(TokenKind::RightBrace),
            b',' => self.add_token(TokenKind::Comma),
            b'.' => self.add_token(TokenKind::Dot),
            b'-' => self.add_token(TokenKind::Minus),
            b'+' => self.add_token(TokenKind::Plus),
            b';' => self.add_token(TokenKind::Semicolon),
            b':' => self.add_token(TokenKind::Colon),
            b'*' => self.add_token(TokenKind::Star),
            b'!' => {
                let kind = if self.match_byte(b'=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                };
                self.add_token(kind);
            }
            b'=' => {
                let kind = if self.match_byte(b'=') {
                    TokenKind::Equal
                } else {
                    TokenKind::Assign
                };
                self.add_token(kind);
            }
            b'<' => {
                let kind = if self.match_byte(b'=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                };
                self.add_token(kind);
            }
            b'>' => {
                let kind = if self.match_byte(b'=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                self.add_token(kind);
            }
            b'/' => {
                if self.match_byte(b'/') {
                    // Comment goes until end of line
                    while self.peek() != Some(b'\n') && !self.is_at_end() {
                        self.advance();
                    }
                } else {
                    self.add_token(TokenKind::Slash);
                }
            }
            b'\n' | b'\r' => self.newline()?,
            b' ' | b'\t' => {
                // Interior whitespace; leading whitespace is handled by
                // `newline`.
            }
            b'"' => self.string()?,
            c if c.is_ascii_digit() => self.number()?,
            c if is_identifier_start(c) => self.identifier(),
            c => {
                return Err(self.error(
                    LexErrorKind::UnexpectedCharacter,
                    format!("Unexpected character '{}'", c as char),
                ));
            }
        }

        Ok(())
    }

    /// Emits a NEWLINE (collapsing runs of blank lines to one) and then
    /// translates the next line's leading whitespace into INDENT/DEDENT
    /// tokens against the indentation stack.
    fn newline(&mut self) -> Result<(), FableError> {
        self.line += 1;
        if self
            .tokens
            .last()
            .map_or(false, |t| t.kind != TokenKind::Newline)
        {
            self.add_token(TokenKind::Newline);
        }
        self.line_start = self.current;

        match self.peek() {
            // Comment-only and blank lines leave the indentation level
            // untouched.
            Some(b'/') if self.peek_next() == Some(b'/') => {}
            Some(b'\n') | Some(b'\r') => {}
            Some(b' ') | Some(b'\t') => self.process_indentation()?,
            // Content at column 0 closes every open block.
            Some(_) => {
                while self.indent_stack.len() > 1 {
                    self.add_synthetic(TokenKind::Dedent);
                    self.indent_stack.pop();
                }
            }
            None => {}
        }

        Ok(())
    }

    fn process_indentation(&mut self) -> Result<(), FableError> {
        let mut count = 0;
        let mut symbol = 0u8;
        while let Some(c) = self.peek() {
            if c != b' ' && c != b'\t' {
                break;
            }
            if symbol == 0 {
                symbol = c;
            }
            self.advance();
            // A whitespace-only line does not open or close blocks.
            if matches!(self.peek(), Some(b'\n') | Some(b'\r') | None) {
                return Ok(());
            }
            count += 1;
        }

        let top = *self.indent_stack.last().unwrap_or(&0);
        if count > top {
            if self.indent_width == 0 {
                self.indent_width = count;
            }
            if self.indent_symbol == 0 {
                self.indent_symbol = symbol;
            }
            let expected = top + self.indent_width;
            if count != expected || symbol != self.indent_symbol {
                return Err(self.inconsistent_indentation());
            }
            self.indent_stack.push(count);
            self.add_synthetic(TokenKind::Indent);
        } else if count < top {
            while self.indent_stack.len() > 1 && count < *self.indent_stack.last().unwrap_or(&0) {
                self.add_synthetic(TokenKind::Dedent);
                self.indent_stack.pop();
            }
            let landed = *self.indent_stack.last().unwrap_or(&0);
            if landed != count || symbol != self.indent_symbol {
                return Err(self.inconsistent_indentation());
            }
        }
        // Equal counts emit nothing.

        Ok(())
    }

    fn inconsistent_indentation(&self) -> FableError {
        self.error(
            LexErrorKind::InconsistentIndentation,
            "inconsistent indentation detected".to_string(),
        )
        .with_help(
            "Every block level must be indented by the same amount with the same \
             whitespace symbol as the first indented line."
                .to_string(),
        )
    }

    fn string(&mut self) -> Result<(), FableError> {
        while self.peek() != Some(b'"') && !self.is_at_end() {
            if self.peek() == Some(b'\n') {
                return Err(self.error(
                    LexErrorKind::UnterminatedString,
                    "String did not terminate before encountering newline".to_string(),
                ));
            }
            self.advance();
        }

        if self.is_at_end() {
            return Err(self.error(
                LexErrorKind::UnterminatedString,
                "String does not terminate".to_string(),
            ));
        }

        // Consume the closing quote.
        self.advance();

        // No escape processing: the value is the raw text between the quotes.
        let value = self.source[self.start + 1..self.current - 1].to_string();
        self.add_token_with_literal(TokenKind::Str, Some(Literal::Str(value)));
        Ok(())
    }

    fn number(&mut self) -> Result<(), FableError> {
        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }

        // A decimal point belongs to the literal only when a digit follows,
        // which keeps a trailing dot available for member access.
        if self.peek() == Some(b'.') && self.peek_next().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let slice = &self.source[self.start..self.current];
        match slice.parse::<f64>() {
            Ok(n) => {
                self.add_token_with_literal(TokenKind::Number, Some(Literal::Number(n)));
                Ok(())
            }
            Err(_) => Err(self.error(
                LexErrorKind::NumberParseFailure,
                format!("Error parsing value {}", slice),
            )),
        }
    }

    fn identifier(&mut self) {
        while self.peek().map_or(false, is_identifier_continue) {
            self.advance();
        }

        let text = &self.source[self.start..self.current];
        let kind = self
            .keywords
            .get(text)
            .copied()
            .unwrap_or(TokenKind::Identifier);
        self.add_token(kind);
    }

    fn advance(&mut self) -> u8 {
        let c = self.source.as_bytes()[self.current];
        self.current += 1;
        c
    }

    fn match_byte(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current + 1).copied()
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn add_token(&mut self, kind: TokenKind) {
        self.add_token_with_literal(kind, None);
    }

    fn add_token_with_literal(&mut self, kind: TokenKind, literal: Option<Literal>) {
        let lexeme = self.source[self.start..self.current].to_string();
        self.tokens.push(Token::new(
            kind,
            lexeme,
            literal,
            self.line,
            self.start.saturating_sub(self.line_start) + 1,
            Span::new(self.start, self.current),
        ));
    }

    /// INDENT/DEDENT carry no source text of their own.
    fn add_synthetic(&mut self, kind: TokenKind) {
        self.tokens.push(Token::new(
            kind,
            String::new(),
            None,
            self.line,
            self.current.saturating_sub(self.line_start) + 1,
            Span::single(self.current),
        ));
    }

    fn error(&self, kind: LexErrorKind, message: String) -> FableError {
        let column = self.start.saturating_sub(self.line_start) + 1;
        FableError::lex(
            kind,
            Span::new(self.start, self.current.max(self.start + 1)),
            self.line,
            column,
            message,
        )
    }
}

fn is_identifier_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_identifier_continue(c: u8) -> bool {
    is_identifier_start(c) || c.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, LexErrorKind};

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source.to_string())
            .tokenize()
            .expect("lexing should succeed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn simple_expression() {
        let tokens = Lexer::new("=+(){},;".to_string()).tokenize().unwrap();
        let expected = [
            (TokenKind::Assign, "="),
            (TokenKind::Plus, "+"),
            (TokenKind::LeftParen, "("),
            (TokenKind::RightParen, ")"),
            (TokenKind::LeftBrace, "{"),
            (TokenKind::RightBrace, "}"),
            (TokenKind::Comma, ","),
            (TokenKind::Semicolon, ";"),
            (TokenKind::Eof, ""),
        ];
        assert_eq!(tokens.len(), expected.len());
        for (token, (kind, lexeme)) in tokens.iter().zip(expected) {
            assert_eq!(token.kind, kind);
            assert_eq!(token.lexeme, lexeme);
        }
    }

    #[test]
    fn compound_operators() {
        assert_eq!(
            kinds("==!=<><=>=!"),
            vec![
                TokenKind::Equal,
                TokenKind::BangEqual,
                TokenKind::Less,
                TokenKind::Greater,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::Bang,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert_eq!(
            kinds("Given When Then And Scenario Story print and or"),
            vec![
                TokenKind::Given,
                TokenKind::When,
                TokenKind::Then,
                TokenKind::And,
                TokenKind::Scenario,
                TokenKind::Story,
                TokenKind::Print,
                TokenKind::LogicalAnd,
                TokenKind::LogicalOr,
                TokenKind::Eof,
            ]
        );
        // Lowercase BDD words are plain identifiers.
        assert_eq!(
            kinds("given when then scenario"),
            vec![
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn number_and_string_literals() {
        let tokens = Lexer::new("12.5 \"hello\" 7".to_string())
            .tokenize()
            .unwrap();
        assert_eq!(tokens[0].literal, Some(Literal::Number(12.5)));
        assert_eq!(tokens[1].literal, Some(Literal::Str("hello".to_string())));
        assert_eq!(tokens[1].lexeme, "\"hello\"");
        assert_eq!(tokens[2].literal, Some(Literal::Number(7.0)));
    }

    #[test]
    fn trailing_dot_is_not_part_of_number() {
        assert_eq!(
            kinds("42."),
            vec![TokenKind::Number, TokenKind::Dot, TokenKind::Eof]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("1 // the rest vanishes\n2"),
            vec![
                TokenKind::Number,
                TokenKind::Newline,
                TokenKind::Number,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn blank_lines_collapse_to_one_newline() {
        assert_eq!(
            kinds("1\n\n\n2"),
            vec![
                TokenKind::Number,
                TokenKind::Newline,
                TokenKind::Number,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn indentation_emits_balanced_tokens() {
        let source = "When:\n    a\n    b\nc\n";
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::When,
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Identifier,
                TokenKind::Newline,
            ]
            .into_iter()
            .chain([TokenKind::Eof])
            .collect::<Vec<_>>()
        );
    }

    #[test]
    fn nested_indentation_unwinds_level_by_level() {
        let source = "a:\n    b:\n        c\nd\n";
        let stream = kinds(source);
        let indents = stream.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = stream.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(indents, 2);
        assert_eq!(dedents, 2);
    }

    #[test]
    fn inconsistent_indentation_is_fatal() {
        let err = Lexer::new("a:\n  b\n   c\n".to_string())
            .tokenize()
            .unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Lex(LexErrorKind::InconsistentIndentation)
        );
    }

    #[test]
    fn mixed_whitespace_symbols_are_fatal() {
        let err = Lexer::new("a:\n  b:\n\t\t\t\tc\n".to_string())
            .tokenize()
            .unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Lex(LexErrorKind::InconsistentIndentation)
        );
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let err = Lexer::new("\"abc".to_string()).tokenize().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lex(LexErrorKind::UnterminatedString));

        let err = Lexer::new("\"abc\ndef\"".to_string()).tokenize().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lex(LexErrorKind::UnterminatedString));
    }

    #[test]
    fn unexpected_character_reports_position() {
        let err = Lexer::new("a\n  @".to_string()).tokenize().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lex(LexErrorKind::UnexpectedCharacter));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn lexemes_round_trip_significant_text() {
        let source = "Given a = 1\nprint a + 2\n";
        let tokens = Lexer::new(source.to_string()).tokenize().unwrap();
        let rebuilt: String = tokens
            .iter()
            .map(|t| t.lexeme.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        for word in ["Given", "a", "=", "1", "print", "+", "2"] {
            assert!(rebuilt.contains(word));
        }
    }

    #[test]
    fn trailing_spaces_do_not_change_the_stream() {
        let plain = kinds("Given a = 1\nprint a\n");
        let padded = kinds("Given a = 1   \nprint a  \n");
        assert_eq!(plain, padded);
    }
}
