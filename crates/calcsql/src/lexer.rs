/// Lexer/Tokenizer for calculation expressions
///
/// Converts macro-expanded calculation text into a stream of tokens for parsing.
use std::fmt;

/// Token types in calculation expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    /// Number kept as source text, e.g. 0.5 or 1e-37
    Number(String),
    String(String),
    Identifier(String),

    // Keywords
    And,
    Or,
    Not,
    Case,
    When,
    Then,
    Else,
    End,
    Null,
    Is,

    // Operators
    Plus,  // +
    Minus, // -
    Star,  // *
    Slash, // /
    Eq,    // =
    NotEq, // <> or !=
    Gt,    // >
    Gte,   // >=
    Lt,    // <
    Lte,   // <=

    // Delimiters
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    Dot,      // .
    Comma,    // ,

    // Special
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "'{}'", s),
            Token::Identifier(id) => write!(f, "{}", id),
            Token::And => write!(f, "AND"),
            Token::Or => write!(f, "OR"),
            Token::Not => write!(f, "NOT"),
            Token::Case => write!(f, "CASE"),
            Token::When => write!(f, "WHEN"),
            Token::Then => write!(f, "THEN"),
            Token::Else => write!(f, "ELSE"),
            Token::End => write!(f, "END"),
            Token::Null => write!(f, "NULL"),
            Token::Is => write!(f, "IS"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Eq => write!(f, "="),
            Token::NotEq => write!(f, "<>"),
            Token::Gt => write!(f, ">"),
            Token::Gte => write!(f, ">="),
            Token::Lt => write!(f, "<"),
            Token::Lte => write!(f, "<="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Dot => write!(f, "."),
            Token::Comma => write!(f, ","),
            Token::Eof => write!(f, "EOF"),
        }
    }
}

/// Lexer for calculation expressions
pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    /// Create a new lexer from input string
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace();

        if self.is_eof() {
            return Ok(Token::Eof);
        }

        let ch = self.current_char();

        match ch {
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '[' => self.single(Token::LBracket),
            ']' => self.single(Token::RBracket),
            ',' => self.single(Token::Comma),
            '+' => self.single(Token::Plus),
            '-' => self.single(Token::Minus),
            '*' => self.single(Token::Star),
            '/' => self.single(Token::Slash),
            '=' => self.single(Token::Eq),
            '.' if self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) => self.read_number(),
            '.' => self.single(Token::Dot),
            '!' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    Ok(Token::NotEq)
                } else {
                    Err(LexerError::UnexpectedCharacter(ch, self.position - 1))
                }
            }
            '>' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    Ok(Token::Gte)
                } else {
                    Ok(Token::Gt)
                }
            }
            '<' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    Ok(Token::Lte)
                } else if self.current_char() == '>' {
                    self.advance();
                    Ok(Token::NotEq)
                } else {
                    Ok(Token::Lt)
                }
            }
            '\'' => self.read_string(),
            _ if ch.is_ascii_digit() => self.read_number(),
            _ if ch.is_alphabetic() || ch == '_' => self.read_identifier(),
            _ => Err(LexerError::UnexpectedCharacter(ch, self.position)),
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            if token == Token::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn single(&mut self, token: Token) -> Result<Token, LexerError> {
        self.advance();
        Ok(token)
    }

    fn current_char(&self) -> char {
        if self.is_eof() {
            '\0'
        } else {
            self.input[self.position]
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn is_eof(&self) -> bool {
        self.position >= self.input.len()
    }

    fn skip_whitespace(&mut self) {
        while !self.is_eof() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    /// Single-quoted SQL string, '' is an escaped quote
    fn read_string(&mut self) -> Result<Token, LexerError> {
        let start_pos = self.position;
        self.advance(); // skip opening quote

        let mut value = String::new();

        loop {
            if self.is_eof() {
                return Err(LexerError::UnterminatedString(start_pos));
            }
            let c = self.current_char();
            self.advance();
            if c == '\'' {
                if self.current_char() == '\'' {
                    value.push('\'');
                    self.advance();
                    continue;
                }
                break;
            }
            value.push(c);
        }

        Ok(Token::String(value))
    }

    fn read_number(&mut self) -> Result<Token, LexerError> {
        let start_pos = self.position;
        let mut num_str = String::new();

        self.read_digits(&mut num_str);

        if self.current_char() == '.' {
            num_str.push('.');
            self.advance();
            self.read_digits(&mut num_str);
        }

        // Exponent: e-37, E+5
        if matches!(self.current_char(), 'e' | 'E') {
            let sign = self.peek();
            let has_sign = matches!(sign, Some('+') | Some('-'));
            let digit_at = if has_sign {
                self.input.get(self.position + 2).copied()
            } else {
                sign
            };
            if digit_at.map(|c| c.is_ascii_digit()).unwrap_or(false) {
                num_str.push(self.current_char());
                self.advance();
                if has_sign {
                    num_str.push(self.current_char());
                    self.advance();
                }
                self.read_digits(&mut num_str);
            }
        }

        // number immediately followed by a letter, e.g. 12abc
        if self.current_char().is_alphabetic() || self.current_char() == '_' {
            return Err(LexerError::InvalidNumber(num_str, start_pos));
        }

        num_str
            .parse::<f64>()
            .map(|_| Token::Number(num_str.clone()))
            .map_err(|_| LexerError::InvalidNumber(num_str.clone(), start_pos))
    }

    fn read_digits(&mut self, out: &mut String) {
        while !self.is_eof() && self.current_char().is_ascii_digit() {
            out.push(self.current_char());
            self.advance();
        }
    }

    fn read_identifier(&mut self) -> Result<Token, LexerError> {
        let mut ident = String::new();

        while !self.is_eof()
            && (self.current_char().is_alphanumeric() || self.current_char() == '_')
        {
            ident.push(self.current_char());
            self.advance();
        }

        // Check for keywords
        let token = match ident.to_ascii_uppercase().as_str() {
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "CASE" => Token::Case,
            "WHEN" => Token::When,
            "THEN" => Token::Then,
            "ELSE" => Token::Else,
            "END" => Token::End,
            "NULL" => Token::Null,
            "IS" => Token::Is,
            _ => Token::Identifier(ident),
        };

        Ok(token)
    }
}

/// Lexer errors
#[derive(Debug, Clone)]
pub enum LexerError {
    UnexpectedCharacter(char, usize),
    UnterminatedString(usize),
    InvalidNumber(String, usize),
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexerError::UnexpectedCharacter(ch, pos) => {
                write!(f, "Unexpected character '{}' at position {}", ch, pos)
            }
            LexerError::UnterminatedString(pos) => {
                write!(f, "Unterminated string starting at position {}", pos)
            }
            LexerError::InvalidNumber(num, pos) => {
                write!(f, "Invalid number '{}' at position {}", num, pos)
            }
        }
    }
}

impl std::error::Error for LexerError {}
