// Formula parser - converts expression text into an AST and back
// Supports: numbers, cell refs (A1), unary +/-, binary + - * /, parentheses

use std::fmt;

use crate::address::Address;
use crate::error::FormulaSyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Cell reference. Out-of-grid references are kept (possibly as
    /// `Address::NONE`) and evaluate to `#REF!`.
    CellRef(Address),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BinaryOp {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// Longest expression accepted, in characters.
pub const MAX_EXPRESSION_LEN: usize = 8192;
/// Deepest parenthesis nesting accepted.
pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

/// Parse an expression (the text after the leading `=`).
pub fn parse(expression: &str) -> Result<Expr, FormulaSyntaxError> {
    let len = expression.chars().count();
    if len > MAX_EXPRESSION_LEN {
        return Err(FormulaSyntaxError::TooLong(len));
    }
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(FormulaSyntaxError::Empty);
    }

    let (expr, pos) = parse_add_sub(&tokens, 0)?;
    match tokens.get(pos) {
        None => Ok(expr),
        Some(Token::RParen) => Err(FormulaSyntaxError::UnbalancedParens),
        Some(token) => Err(FormulaSyntaxError::UnexpectedToken(token.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    CellRef(Address),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::CellRef(addr) if addr.is_valid() => write!(f, "{}", addr),
            Token::CellRef(_) => f.write_str("#REF!"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, FormulaSyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    let mut depth = 0usize;

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            ' ' | '\t' => { chars.next(); }
            '+' => { tokens.push(Token::Plus); chars.next(); }
            '-' => { tokens.push(Token::Minus); chars.next(); }
            '*' => { tokens.push(Token::Star); chars.next(); }
            '/' => { tokens.push(Token::Slash); chars.next(); }
            '(' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(FormulaSyntaxError::TooDeep(MAX_NESTING));
                }
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                depth = depth.saturating_sub(1);
                tokens.push(Token::RParen);
                chars.next();
            }
            'A'..='Z' | 'a'..='z' => {
                // Cell reference: uppercase letters then digits
                let mut ident = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_ascii_alphanumeric() {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::CellRef(parse_cell_ref(&ident)?));
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }

                // Exponent: e/E, optional sign, at least one digit
                if let Some(&(_, 'e' | 'E')) = chars.peek() {
                    let mut lookahead = chars.clone();
                    let mut exponent = String::new();
                    if let Some((_, e)) = lookahead.next() {
                        exponent.push(e);
                    }
                    if let Some(&(_, sign @ ('+' | '-'))) = lookahead.peek() {
                        exponent.push(sign);
                        lookahead.next();
                    }
                    let mut has_digits = false;
                    while let Some(&(_, d)) = lookahead.peek() {
                        if d.is_ascii_digit() {
                            exponent.push(d);
                            lookahead.next();
                            has_digits = true;
                        } else {
                            break;
                        }
                    }
                    if has_digits {
                        num_str.push_str(&exponent);
                        chars = lookahead;
                    }
                }

                let num: f64 = num_str
                    .parse()
                    .map_err(|_| FormulaSyntaxError::InvalidNumber(num_str.clone()))?;
                if !num.is_finite() {
                    return Err(FormulaSyntaxError::InvalidNumber(num_str));
                }
                tokens.push(Token::Number(num));
            }
            _ => return Err(FormulaSyntaxError::UnexpectedChar { ch: c, offset }),
        }
    }

    Ok(tokens)
}

/// Interpret an identifier as a cell reference.
///
/// Anything shaped like `LETTERS DIGITS` in uppercase is a reference, even
/// when it points outside the grid; those become `#REF!` at evaluation.
fn parse_cell_ref(ident: &str) -> Result<Address, FormulaSyntaxError> {
    let split = ident
        .find(|c: char| !c.is_ascii_uppercase())
        .unwrap_or(ident.len());
    let (letters, digits) = ident.split_at(split);

    if letters.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FormulaSyntaxError::InvalidReference(ident.to_string()));
    }

    Ok(ident.parse::<Address>().unwrap_or(Address::NONE))
}

fn parse_add_sub(tokens: &[Token], pos: usize) -> Result<(Expr, usize), FormulaSyntaxError> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize) -> Result<(Expr, usize), FormulaSyntaxError> {
    let (mut left, mut pos) = parse_unary(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => Op::Mul,
            Token::Slash => Op::Div,
            _ => break,
        };
        let (right, new_pos) = parse_unary(tokens, pos + 1)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_unary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), FormulaSyntaxError> {
    let op = match tokens.get(pos) {
        Some(Token::Plus) => UnaryOp::Plus,
        Some(Token::Minus) => UnaryOp::Minus,
        _ => return parse_primary(tokens, pos),
    };
    let (operand, pos) = parse_unary(tokens, pos + 1)?;
    Ok((
        Expr::Unary {
            op,
            operand: Box::new(operand),
        },
        pos,
    ))
}

fn parse_primary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), FormulaSyntaxError> {
    let Some(token) = tokens.get(pos) else {
        return Err(FormulaSyntaxError::UnexpectedEnd);
    };

    match token {
        Token::Number(n) => Ok((Expr::Number(*n), pos + 1)),
        Token::CellRef(addr) => Ok((Expr::CellRef(*addr), pos + 1)),
        Token::LParen => {
            let (inner, pos) = parse_add_sub(tokens, pos + 1)?;
            match tokens.get(pos) {
                Some(Token::RParen) => Ok((inner, pos + 1)),
                None => Err(FormulaSyntaxError::UnbalancedParens),
                Some(other) => Err(FormulaSyntaxError::UnexpectedToken(other.to_string())),
            }
        }
        Token::RParen => Err(FormulaSyntaxError::UnbalancedParens),
        other => Err(FormulaSyntaxError::UnexpectedToken(other.to_string())),
    }
}

// =========================================================================
// Canonical printing
// =========================================================================

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::BinaryOp { op: Op::Add | Op::Sub, .. } => 1,
            Expr::BinaryOp { op: Op::Mul | Op::Div, .. } => 2,
            Expr::Unary { .. } => 3,
            Expr::Number(_) | Expr::CellRef(_) => 4,
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

impl fmt::Display for Expr {
    /// Prints without whitespace and with the fewest parentheses that keep
    /// the value of the expression.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::CellRef(addr) if addr.is_valid() => write!(f, "{}", addr),
            Expr::CellRef(_) => f.write_str("#REF!"),
            Expr::Unary { op, operand } => {
                f.write_str(match op {
                    UnaryOp::Plus => "+",
                    UnaryOp::Minus => "-",
                })?;
                write_operand(f, operand, operand.precedence() <= 2)
            }
            Expr::BinaryOp { op, left, right } => {
                let (left_parens, right_parens, symbol) = match op {
                    Op::Add => (false, false, '+'),
                    Op::Sub => (false, right.precedence() == 1, '-'),
                    Op::Mul => (left.precedence() == 1, right.precedence() == 1, '*'),
                    Op::Div => (left.precedence() == 1, right.precedence() <= 2, '/'),
                };
                write_operand(f, left, left_parens)?;
                write!(f, "{}", symbol)?;
                write_operand(f, right, right_parens)
            }
        }
    }
}
