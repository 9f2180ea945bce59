/// Parser for calculation expressions
///
/// Converts a stream of tokens into an Abstract Syntax Tree (AST).
/// Operator precedence follows SQL, lowest first: OR, AND, NOT,
/// comparison and IS NULL, + and -, * and /, unary minus.
use super::ast::*;
use super::lexer::{Lexer, LexerError, Token};
use crate::error::CalcError;
use std::fmt;

/// Prefix of model parameter references: param.Name
const PARAM_PREFIX: &str = "param";

/// Parser for calculation expressions
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    /// Create a new parser from calculation text
    pub fn new(input: &str) -> Result<Self, ParserError> {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.tokenize().map_err(ParserError::LexerError)?;
        Ok(Self {
            tokens,
            position: 0,
        })
    }

    /// Parse the whole calculation expression
    pub fn parse(&mut self) -> Result<Expr, ParserError> {
        if self.current_token() == &Token::Eof {
            return Err(ParserError::EmptyExpression);
        }

        let expr = self.parse_expr()?;

        // Ensure we're at EOF
        if self.current_token() != &Token::Eof {
            return Err(ParserError::UnexpectedToken(
                self.current_token().clone(),
                "expected end of expression".to_string(),
            ));
        }
        Ok(expr)
    }

    fn parse_expr(&mut self) -> Result<Expr, ParserError> {
        self.parse_or_expr()
    }

    /// Parse OR expression (lowest precedence)
    fn parse_or_expr(&mut self) -> Result<Expr, ParserError> {
        let mut left = self.parse_and_expr()?;

        while self.current_token() == &Token::Or {
            self.advance();
            let right = self.parse_and_expr()?;
            left = binary(left, BinaryOperator::Or, right);
        }

        Ok(left)
    }

    /// Parse AND expression (higher precedence than OR)
    fn parse_and_expr(&mut self) -> Result<Expr, ParserError> {
        let mut left = self.parse_not_expr()?;

        while self.current_token() == &Token::And {
            self.advance();
            let right = self.parse_not_expr()?;
            left = binary(left, BinaryOperator::And, right);
        }

        Ok(left)
    }

    fn parse_not_expr(&mut self) -> Result<Expr, ParserError> {
        if self.current_token() == &Token::Not {
            self.advance();
            let expr = self.parse_not_expr()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_comparison_expr()
    }

    /// Parse comparison: a < b, a IS NULL, a IS NOT NULL
    fn parse_comparison_expr(&mut self) -> Result<Expr, ParserError> {
        let left = self.parse_additive_expr()?;

        if self.current_token() == &Token::Is {
            self.advance();
            let negated = if self.current_token() == &Token::Not {
                self.advance();
                true
            } else {
                false
            };
            self.expect_token(Token::Null)?;
            return Ok(Expr::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        let op = match self.current_token() {
            Token::Eq => BinaryOperator::Eq,
            Token::NotEq => BinaryOperator::NotEq,
            Token::Gt => BinaryOperator::Gt,
            Token::Gte => BinaryOperator::Gte,
            Token::Lt => BinaryOperator::Lt,
            Token::Lte => BinaryOperator::Lte,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive_expr()?;
        Ok(binary(left, op, right))
    }

    fn parse_additive_expr(&mut self) -> Result<Expr, ParserError> {
        let mut left = self.parse_multiplicative_expr()?;

        loop {
            let op = match self.current_token() {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative_expr()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_multiplicative_expr(&mut self) -> Result<Expr, ParserError> {
        let mut left = self.parse_unary_expr()?;

        loop {
            let op = match self.current_token() {
                Token::Star => BinaryOperator::Mul,
                Token::Slash => BinaryOperator::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary_expr()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<Expr, ParserError> {
        let op = match self.current_token() {
            Token::Minus => UnaryOperator::Minus,
            Token::Plus => UnaryOperator::Plus,
            _ => return self.parse_primary_expr(),
        };
        self.advance();
        let expr = self.parse_unary_expr()?;
        Ok(Expr::UnaryOp {
            op,
            expr: Box::new(expr),
        })
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, ParserError> {
        match self.current_token().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expr::String(s))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Null)
            }
            Token::Case => self.parse_case_expr(),
            Token::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect_token(Token::RParen)?;
                Ok(Expr::Nested(Box::new(expr)))
            }
            Token::Identifier(name) => {
                self.advance();
                if self.current_token() == &Token::LParen {
                    return self.parse_call(&name);
                }
                if name.eq_ignore_ascii_case(PARAM_PREFIX) && self.current_token() == &Token::Dot {
                    self.advance();
                    let param_name = self.expect_identifier()?;
                    let form = self.parse_ref_form()?;
                    return Ok(Expr::Parameter(Reference::new(param_name, form)));
                }
                let form = self.parse_ref_form()?;
                Ok(Expr::Attribute(Reference::new(name, form)))
            }
            token => Err(ParserError::UnexpectedToken(
                token,
                "expected number, attribute, parameter, function or (".to_string(),
            )),
        }
    }

    /// Parse CASE WHEN cond THEN value ... [ELSE other] END
    fn parse_case_expr(&mut self) -> Result<Expr, ParserError> {
        self.expect_token(Token::Case)?;

        let mut branches = Vec::new();
        while self.current_token() == &Token::When {
            self.advance();
            let cond = self.parse_expr()?;
            self.expect_token(Token::Then)?;
            let value = self.parse_expr()?;
            branches.push((cond, value));
        }
        if branches.is_empty() {
            return Err(ParserError::UnexpectedToken(
                self.current_token().clone(),
                "expected WHEN after CASE".to_string(),
            ));
        }

        let else_expr = if self.current_token() == &Token::Else {
            self.advance();
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_token(Token::End)?;

        Ok(Expr::Case {
            branches,
            else_expr,
        })
    }

    /// Parse function call arguments, current token is (
    fn parse_call(&mut self, name: &str) -> Result<Expr, ParserError> {
        let func =
            Function::from_name(name).ok_or_else(|| ParserError::UnknownFunction(name.to_string()))?;
        self.expect_token(Token::LParen)?;

        let mut args = Vec::new();
        if self.current_token() == &Token::RParen {
            self.advance();
            return Ok(Expr::Call { func, args });
        }
        loop {
            args.push(self.parse_expr()?);

            match self.current_token() {
                Token::Comma => {
                    self.advance();
                }
                Token::RParen => {
                    self.advance();
                    break;
                }
                _ => {
                    return Err(ParserError::UnexpectedToken(
                        self.current_token().clone(),
                        format!("expected ',' or ')' in {} arguments", name),
                    ))
                }
            }
        }
        Ok(Expr::Call { func, args })
    }

    /// Parse optional [base] or [variant] suffix
    fn parse_ref_form(&mut self) -> Result<RefForm, ParserError> {
        if self.current_token() != &Token::LBracket {
            return Ok(RefForm::Simple);
        }
        self.advance();
        let suffix = self.expect_identifier()?;
        let form = if suffix.eq_ignore_ascii_case("base") {
            RefForm::Base
        } else if suffix.eq_ignore_ascii_case("variant") {
            RefForm::Variant
        } else {
            return Err(ParserError::InvalidReferenceForm(suffix));
        };
        self.expect_token(Token::RBracket)?;
        Ok(form)
    }

    // Helper methods

    fn current_token(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn expect_token(&mut self, expected: Token) -> Result<(), ParserError> {
        if self.current_token() == &expected {
            self.advance();
            Ok(())
        } else {
            Err(ParserError::UnexpectedToken(
                self.current_token().clone(),
                format!("expected {}", expected),
            ))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, ParserError> {
        match self.current_token() {
            Token::Identifier(id) => {
                let result = id.clone();
                self.advance();
                Ok(result)
            }
            _ => Err(ParserError::UnexpectedToken(
                self.current_token().clone(),
                "expected identifier".to_string(),
            )),
        }
    }
}

fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

/// Parser errors
#[derive(Debug)]
pub enum ParserError {
    LexerError(LexerError),
    UnexpectedToken(Token, String),
    UnknownFunction(String),
    InvalidReferenceForm(String),
    EmptyExpression,
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParserError::LexerError(e) => write!(f, "Lexer error: {}", e),
            ParserError::UnexpectedToken(token, expected) => {
                write!(f, "Unexpected token {}, {}", token, expected)
            }
            ParserError::UnknownFunction(name) => write!(f, "Unknown function: {}", name),
            ParserError::InvalidReferenceForm(s) => {
                write!(f, "Invalid reference form [{}], expected [base] or [variant]", s)
            }
            ParserError::EmptyExpression => write!(f, "Empty expression"),
        }
    }
}

impl std::error::Error for ParserError {}

impl From<ParserError> for CalcError {
    fn from(e: ParserError) -> Self {
        CalcError::MalformedExpression(e.to_string())
    }
}

/// Parse calculation text into an AST
pub fn parse(input: &str) -> Result<Expr, ParserError> {
    let mut parser = Parser::new(input)?;
    parser.parse()
}
