// Formula parser - converts formula text into an AST
// Supports: numbers (1, 2.5, .5, 1e3), cell variables (A1), + - * /, parentheses, unary minus

use crate::name::NameRules;

/// Deepest allowed nesting of parentheses and unary minus.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Normalized cell name
    Var(String),
    Neg(Box<Expr>),
    /// Operators of one precedence level applied left to right:
    /// `first op1 e1 op2 e2 ...`. Never built with an empty `rest`.
    Chain {
        first: Box<Expr>,
        rest: Vec<(Op, Expr)>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Var(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl Token {
    /// Canonical spelling, used to rebuild the normalized formula text.
    pub(crate) fn canonical(&self) -> String {
        match self {
            Token::Number(n) => format_number(*n),
            Token::Var(name) => name.clone(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        }
    }
}

/// Collapse `-0.0` so equal values always print the same way.
pub fn canonical_number(n: f64) -> f64 {
    if n == 0.0 {
        0.0
    } else {
        n
    }
}

/// Shortest text that parses back to the same `f64`.
pub fn format_number(n: f64) -> String {
    format!("{}", canonical_number(n))
}

/// Parse formula text (without the leading `=`) into tokens and an AST.
///
/// Variables are normalized and validated with `rules`; a variable that is
/// not a valid cell name is a parse error.
pub(crate) fn parse(input: &str, rules: &NameRules) -> Result<(Vec<Token>, Expr), String> {
    let tokens = tokenize(input, rules)?;
    if tokens.is_empty() {
        return Err("Empty formula".to_string());
    }
    let (expr, pos) = parse_add_sub(&tokens, 0, 0)?;
    if pos < tokens.len() {
        return Err(format!("Unexpected token: {}", tokens[pos].canonical()));
    }
    Ok((tokens, expr))
}

fn tokenize(input: &str, rules: &NameRules) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => { chars.next(); }
            '+' => { tokens.push(Token::Plus); chars.next(); }
            '-' => { tokens.push(Token::Minus); chars.next(); }
            '*' => { tokens.push(Token::Star); chars.next(); }
            '/' => { tokens.push(Token::Slash); chars.next(); }
            '(' => { tokens.push(Token::LParen); chars.next(); }
            ')' => { tokens.push(Token::RParen); chars.next(); }
            'A'..='Z' | 'a'..='z' | '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match rules.resolve(&ident) {
                    Some(name) => tokens.push(Token::Var(name)),
                    None => return Err(format!("Invalid cell reference: {}", ident)),
                }
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // Optional exponent: e, E, then optional sign, then digits
                if matches!(chars.peek(), Some('e') | Some('E')) {
                    let mut lookahead = chars.clone();
                    let mut exponent = String::new();
                    exponent.push(lookahead.next().unwrap_or('e'));
                    if let Some(&sign) = lookahead.peek() {
                        if sign == '+' || sign == '-' {
                            exponent.push(sign);
                            lookahead.next();
                        }
                    }
                    let mut digits = 0;
                    while let Some(&d) = lookahead.peek() {
                        if d.is_ascii_digit() {
                            exponent.push(d);
                            lookahead.next();
                            digits += 1;
                        } else {
                            break;
                        }
                    }
                    if digits > 0 {
                        num_str.push_str(&exponent);
                        chars = lookahead;
                    }
                }
                let num: f64 = num_str.parse().map_err(|_| format!("Invalid number: {}", num_str))?;
                tokens.push(Token::Number(canonical_number(num)));
            }
            _ => return Err(format!("Unexpected character: {}", c)),
        }
    }

    Ok(tokens)
}

fn parse_add_sub(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    let (first, mut pos) = parse_mul_div(tokens, pos, depth)?;
    let mut rest = Vec::new();

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1, depth)?;
        rest.push((op, right));
        pos = new_pos;
    }

    Ok((chain(first, rest), pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    let (first, mut pos) = parse_unary(tokens, pos, depth)?;
    let mut rest = Vec::new();

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => Op::Mul,
            Token::Slash => Op::Div,
            _ => break,
        };
        let (right, new_pos) = parse_unary(tokens, pos + 1, depth)?;
        rest.push((op, right));
        pos = new_pos;
    }

    Ok((chain(first, rest), pos))
}

fn chain(first: Expr, rest: Vec<(Op, Expr)>) -> Expr {
    if rest.is_empty() {
        first
    } else {
        Expr::Chain { first: Box::new(first), rest }
    }
}

fn nested(depth: usize) -> Result<usize, String> {
    if depth >= MAX_DEPTH {
        Err("Formula nested too deeply".to_string())
    } else {
        Ok(depth + 1)
    }
}

fn parse_unary(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    match tokens.get(pos) {
        Some(Token::Minus) => {
            let (inner, pos) = parse_unary(tokens, pos + 1, nested(depth)?)?;
            Ok((Expr::Neg(Box::new(inner)), pos))
        }
        _ => parse_primary(tokens, pos, depth),
    }
}

fn parse_primary(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    match tokens.get(pos) {
        None => Err("Unexpected end of formula".to_string()),
        Some(Token::Number(n)) => Ok((Expr::Number(*n), pos + 1)),
        Some(Token::Var(name)) => Ok((Expr::Var(name.clone()), pos + 1)),
        Some(Token::LParen) => {
            let (expr, pos) = parse_add_sub(tokens, pos + 1, nested(depth)?)?;
            match tokens.get(pos) {
                Some(Token::RParen) => Ok((expr, pos + 1)),
                _ => Err("Missing closing parenthesis".to_string()),
            }
        }
        Some(tok) => Err(format!("Unexpected token: {}", tok.canonical())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(input: &str) -> Expr {
        parse(input, &NameRules::default()).unwrap().1
    }

    fn err(input: &str) -> String {
        parse(input, &NameRules::default()).unwrap_err()
    }

    fn num(n: f64) -> Box<Expr> {
        Box::new(Expr::Number(n))
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(expr("42"), Expr::Number(42.0));
        assert_eq!(expr(".5"), Expr::Number(0.5));
        assert_eq!(expr("2.5e3"), Expr::Number(2500.0));
        assert_eq!(expr("1E-2"), Expr::Number(0.01));
    }

    #[test]
    fn test_parse_var() {
        assert_eq!(expr("A1"), Expr::Var("A1".to_string()));
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 => 1 + (2 * 3)
        assert_eq!(
            expr("1 + 2 * 3"),
            Expr::Chain {
                first: num(1.0),
                rest: vec![(Op::Add, Expr::Chain { first: num(2.0), rest: vec![(Op::Mul, Expr::Number(3.0))] })],
            }
        );
    }

    #[test]
    fn test_chain_keeps_order() {
        // 8 - 2 - 1 => (8 - 2) - 1, one flat chain
        assert_eq!(
            expr("8-2-1"),
            Expr::Chain {
                first: num(8.0),
                rest: vec![(Op::Sub, Expr::Number(2.0)), (Op::Sub, Expr::Number(1.0))],
            }
        );
    }

    #[test]
    fn test_parentheses() {
        assert_eq!(
            expr("(1+2)*3"),
            Expr::Chain {
                first: Box::new(Expr::Chain { first: num(1.0), rest: vec![(Op::Add, Expr::Number(2.0))] }),
                rest: vec![(Op::Mul, Expr::Number(3.0))],
            }
        );
    }

    #[test]
    fn test_unary_minus() {
        assert_eq!(expr("-A1"), Expr::Neg(Box::new(Expr::Var("A1".to_string()))));
        assert_eq!(
            expr("2*-3"),
            Expr::Chain { first: num(2.0), rest: vec![(Op::Mul, Expr::Neg(num(3.0)))] }
        );
    }

    #[test]
    fn test_long_chain_is_flat() {
        let input = vec!["1"; 50_000].join("+");
        match expr(&input) {
            Expr::Chain { first, rest } => {
                assert_eq!(*first, Expr::Number(1.0));
                assert_eq!(rest.len(), 49_999);
            }
            other => panic!("expected a chain, got {:?}", other),
        }
    }

    #[test]
    fn test_nesting_limit() {
        let ok = format!("{}1{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(expr(&ok), Expr::Number(1.0));

        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert_eq!(err(&deep), "Formula nested too deeply");
        assert_eq!(err(&format!("{}1", "-".repeat(MAX_DEPTH + 1))), "Formula nested too deeply");
        assert_eq!(err(&"(".repeat(200_000)), "Formula nested too deeply");
    }

    #[test]
    fn test_exponent_needs_digits() {
        // "2e" is the number 2 followed by an identifier that is not a cell name
        assert!(err("2e").contains("Invalid cell reference"));
    }

    #[test]
    fn test_errors() {
        assert_eq!(err(""), "Empty formula");
        assert_eq!(err("   "), "Empty formula");
        assert_eq!(err("1 +"), "Unexpected end of formula");
        assert_eq!(err("(1 + 2"), "Missing closing parenthesis");
        assert_eq!(err("1 2"), "Unexpected token: 2");
        assert_eq!(err("1 + )"), "Unexpected token: )");
        assert_eq!(err("1 % 2"), "Unexpected character: %");
        assert_eq!(err("SUM"), "Invalid cell reference: SUM");
        assert_eq!(err("1..2"), "Invalid number: 1..2");
    }

    #[test]
    fn test_variables_use_rules() {
        let rules = NameRules::uppercase();
        let (tokens, expr) = parse("a1 + b2", &rules).unwrap();
        assert_eq!(tokens[0], Token::Var("A1".to_string()));
        assert!(matches!(expr, Expr::Chain { .. }));

        let strict = NameRules::new(|s| s.to_string(), |s| s.starts_with('A'));
        assert!(parse("B1", &strict).is_err());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(2.50), "2.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
    }
}
