//! Hand-rolled tokenizer and recursive-descent parser for the filter DSL:
//! identifiers, parenthesized groups, quoted strings, `/regex/` literals,
//! numeric/boolean atoms, and `not > and > or` precedence.

use std::sync::LazyLock;

use regex::Regex;

use super::{DateSpec, Expr, Field, FilterError, Predicate, RegexOptions};

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    RegexLit(String, String), // pattern, flags
    Number(String),
    Bool(bool),
    LParen,
    RParen,
    Comma,
    And,
    Or,
    Not,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                i += 1;
                let mut s = String::new();
                let mut closed = false;
                while i < chars.len() {
                    let ch = chars[i];
                    if ch == '\\' && i + 1 < chars.len() {
                        s.push(chars[i + 1]);
                        i += 2;
                        continue;
                    }
                    if ch == quote {
                        closed = true;
                        i += 1;
                        break;
                    }
                    s.push(ch);
                    i += 1;
                }
                if !closed {
                    return Err(FilterError::InvalidExpression(format!(
                        "unterminated string literal in: {input}"
                    )));
                }
                tokens.push(Token::Str(s));
            }
            '/' => {
                i += 1;
                let mut pattern = String::new();
                let mut closed = false;
                while i < chars.len() {
                    let ch = chars[i];
                    if ch == '\\' && i + 1 < chars.len() {
                        pattern.push(ch);
                        pattern.push(chars[i + 1]);
                        i += 2;
                        continue;
                    }
                    if ch == '/' {
                        closed = true;
                        i += 1;
                        break;
                    }
                    pattern.push(ch);
                    i += 1;
                }
                if !closed {
                    return Err(FilterError::InvalidExpression(format!(
                        "unterminated regex literal in: {input}"
                    )));
                }
                let mut flags = String::new();
                while i < chars.len() && chars[i].is_ascii_alphabetic() {
                    flags.push(chars[i]);
                    i += 1;
                }
                tokens.push(Token::RegexLit(pattern, flags));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.' || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' || c == ':' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == ':' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.to_ascii_lowercase().as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "not" => tokens.push(Token::Not),
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            other => {
                return Err(FilterError::InvalidExpression(format!(
                    "unexpected character '{other}' in: {input}"
                )))
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, token: &Token) -> Result<(), FilterError> {
        match self.advance() {
            Some(t) if t == *token => Ok(()),
            other => Err(FilterError::InvalidExpression(format!(
                "expected {token:?}, found {other:?}"
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let right = self.parse_and()?;
            left = match left {
                Expr::Or(mut children) => {
                    children.push(right);
                    Expr::Or(children)
                }
                other => Expr::Or(vec![other, right]),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_not()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let right = self.parse_not()?;
            left = match left {
                Expr::And(mut children) => {
                    children.push(right);
                    Expr::And(children)
                }
                other => Expr::And(vec![other, right]),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, FilterError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, FilterError> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.parse_predicate_call(&name),
            other => Err(FilterError::InvalidExpression(format!(
                "expected predicate or '(', found {other:?}"
            ))),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Arg>, FilterError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Token::RParen)) {
            loop {
                args.push(self.parse_arg()?);
                if matches!(self.peek(), Some(Token::Comma)) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    fn parse_arg(&mut self) -> Result<Arg, FilterError> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(Arg::Str(s)),
            Some(Token::Ident(s)) => Ok(Arg::Str(s)),
            Some(Token::Number(n)) => Ok(Arg::Str(n)),
            Some(Token::Bool(b)) => Ok(Arg::Bool(b)),
            Some(Token::RegexLit(pattern, flags)) => Ok(Arg::Regex(pattern, flags)),
            other => Err(FilterError::InvalidExpression(format!(
                "expected argument, found {other:?}"
            ))),
        }
    }

    fn parse_predicate_call(&mut self, name: &str) -> Result<Expr, FilterError> {
        let args = self.parse_args()?;
        let predicate = build_predicate(name, args)?;
        Ok(Expr::Leaf(predicate))
    }
}

enum Arg {
    Str(String),
    Bool(bool),
    Regex(String, String),
}

impl Arg {
    fn into_string(self) -> Result<String, FilterError> {
        match self {
            Arg::Str(s) => Ok(s),
            Arg::Bool(b) => Ok(b.to_string()),
            Arg::Regex(p, _) => Ok(p),
        }
    }

    fn into_bool(self) -> Result<bool, FilterError> {
        match self {
            Arg::Bool(b) => Ok(b),
            Arg::Str(s) => s
                .parse()
                .map_err(|_| FilterError::InvalidExpression(format!("expected boolean, found {s}"))),
            Arg::Regex(..) => Err(FilterError::InvalidExpression("expected boolean, found regex".into())),
        }
    }
}

fn regex_options_from_flags(flags: &str) -> RegexOptions {
    RegexOptions {
        case_insensitive: flags.contains('i'),
        dot_matches_newline: flags.contains('s'),
        extended: flags.contains('x'),
    }
}

fn build_predicate(name: &str, mut args: Vec<Arg>) -> Result<Predicate, FilterError> {
    match name {
        "regex" => {
            if args.len() < 2 {
                return Err(FilterError::InvalidExpression("regex() requires field, pattern".into()));
            }
            let field = Field::parse(&args.remove(0).into_string()?)?;
            let (pattern, flags) = match args.remove(0) {
                Arg::Regex(p, f) => (p, f),
                Arg::Str(s) => (s, String::new()),
                Arg::Bool(b) => (b.to_string(), String::new()),
            };
            Predicate::regex(field, &pattern, regex_options_from_flags(&flags))
        }
        "contains" => {
            if args.len() < 2 {
                return Err(FilterError::InvalidExpression("contains() requires field, text".into()));
            }
            let field = Field::parse(&args.remove(0).into_string()?)?;
            let text = args.remove(0).into_string()?;
            let case_sensitive = args.pop().map(Arg::into_bool).transpose()?.unwrap_or(false);
            Ok(Predicate::Contains { field, text, case_sensitive })
        }
        "has_attachment" => Ok(Predicate::HasAttachment),
        "attachment_mime" => {
            let patterns = args.into_iter().map(Arg::into_string).collect::<Result<Vec<_>, _>>()?;
            Predicate::attachment_mime(&patterns)
        }
        "folder_exact" => Ok(Predicate::FolderExact(args.remove(0).into_string()?)),
        "folder_prefix" => Ok(Predicate::FolderPrefix(args.remove(0).into_string()?)),
        "folder_regex" => Predicate::folder_regex(&args.remove(0).into_string()?),
        "vip" => Ok(Predicate::Vip(args.remove(0).into_bool()?)),
        "list_unsubscribe" => Ok(Predicate::ListUnsubscribe(args.remove(0).into_bool()?)),
        "date_range" => {
            let start = DateSpec::parse(&args.remove(0).into_string()?)?;
            let end = if args.is_empty() {
                None
            } else {
                Some(DateSpec::parse(&args.remove(0).into_string()?)?)
            };
            Ok(Predicate::DateRange { start, end })
        }
        "date_between" => {
            if args.len() < 2 {
                return Err(FilterError::InvalidExpression("date_between() requires start, end".into()));
            }
            let start = DateSpec::parse(&args.remove(0).into_string()?)?;
            let end = DateSpec::parse(&args.remove(0).into_string()?)?;
            Ok(Predicate::DateBetween { start, end })
        }
        "date_before" => Ok(Predicate::DateBefore(DateSpec::parse(&args.remove(0).into_string()?)?)),
        "date_after" => Ok(Predicate::DateAfter(DateSpec::parse(&args.remove(0).into_string()?)?)),
        "date_on_or_before" => Ok(Predicate::DateOnOrBefore(DateSpec::parse(&args.remove(0).into_string()?)?)),
        "date_on_or_after" => Ok(Predicate::DateOnOrAfter(DateSpec::parse(&args.remove(0).into_string()?)?)),
        other => Err(FilterError::UnknownPredicate(other.to_string())),
    }
}

static IN_LAST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)date\s+in\s+last\s+(\d+)([a-zA-Z]+)").unwrap());
static BETWEEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)date\s+between\s+(\S+)\s+and\s+(\S+)").unwrap());
static GE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"date\s*>=\s*(\S+)").unwrap());
static LE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"date\s*<=\s*(\S+)").unwrap());
static GT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"date\s*>\s*(\S+)").unwrap());
static LT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"date\s*<\s*(\S+)").unwrap());

/// Rewrites natural-language shortcuts (`date in last 7d`, `date between X
/// and Y`, `date >= X`) into predicate-call syntax before tokenizing.
fn normalize_natural_language(input: &str) -> String {
    let text = IN_LAST.replace_all(input, "date_after(-$1$2)");
    let text = BETWEEN.replace_all(&text, "date_between($1,$2)");
    let text = GE.replace_all(&text, "date_on_or_after($1)");
    let text = LE.replace_all(&text, "date_on_or_before($1)");
    let text = GT.replace_all(&text, "date_after($1)");
    let text = LT.replace_all(&text, "date_before($1)");
    text.into_owned()
}

pub fn parse(input: &str) -> Result<Expr, FilterError> {
    let normalized = normalize_natural_language(input);
    let tokens = tokenize(&normalized)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(FilterError::InvalidExpression(format!(
            "trailing tokens after expression: {input}"
        )));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::MessageContext;
    use chrono::Utc;

    fn ctx() -> MessageContext {
        MessageContext {
            subject: "Quarterly Invoice".to_string(),
            folder: "Inbox".to_string(),
            now: Utc::now(),
            ..Default::default()
        }
    }

    #[test]
    fn parses_and_or_not_precedence() {
        let expr = parse("not folder_exact(\"Spam\") and contains(subject, \"invoice\")").unwrap();
        assert!(expr.evaluate(&ctx()));
    }

    #[test]
    fn parses_regex_literal_with_flags() {
        let expr = parse("regex(subject, /invoice/i)").unwrap();
        assert!(expr.evaluate(&ctx()));
    }

    #[test]
    fn natural_language_in_last_rewrites_to_date_after() {
        let mut message = ctx();
        message.date = Some(Utc::now());
        let expr = parse("date in last 7d").unwrap();
        assert!(expr.evaluate(&message));
    }

    #[test]
    fn natural_language_comparison_operator_rewrites() {
        let mut message = ctx();
        message.date = Some(Utc::now());
        let expr = parse("date >= -1d").unwrap();
        assert!(expr.evaluate(&message));
    }

    #[test]
    fn rejects_unknown_predicate() {
        let err = parse("bogus(subject)").unwrap_err();
        assert!(matches!(err, FilterError::UnknownPredicate(_)));
    }
}
