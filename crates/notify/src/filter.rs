//! Event filter expressions.
//!
//! Notifier configs gate delivery with a predicate over build fields, e.g.
//!
//! ```text
//! build.status in [Build.Status.SUCCESS, Build.Status.FAILURE] && build.substitutions["_NAMESPACE"] != "dev"
//! ```
//!
//! Supported fields: `build.id`, `build.project_id`, `build.status`,
//! `build.substitutions["KEY"]` (or `build.substitutions.KEY`). Literals are
//! strings or `Build.Status.NAME`. Operators: `==`, `!=`, `in [...]`, `!`, `&&`,
//! `||` and parentheses, with `&&` binding tighter than `||`.

use std::fmt;

use thiserror::Error;

use crate::events::{BuildEvent, BuildStatus};

const STATUS_PREFIX: &str = "Build.Status.";
const SUBSTITUTIONS: &str = "build.substitutions";

/// Predicate deciding whether an event should produce a notification.
pub trait EventFilter: Send + Sync {
    fn apply(&self, event: &BuildEvent) -> bool;
}

/// Errors from compiling a filter expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),

    #[error("expected {expected}, found {found}")]
    Unexpected {
        expected: &'static str,
        found: String,
    },

    #[error("unknown field {0:?}")]
    UnknownField(String),

    #[error("unknown build status {0:?}")]
    UnknownStatus(String),
}

/// A build field a filter can compare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Id,
    ProjectId,
    Status,
    Substitution(String),
}

impl Field {
    fn value<'a>(&self, event: &'a BuildEvent) -> &'a str {
        match self {
            Self::Id => &event.id,
            Self::ProjectId => &event.project_id,
            Self::Status => event.status.as_str(),
            Self::Substitution(key) => event.substitutions.get(key).map_or("", String::as_str),
        }
    }
}

/// Compiled filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    /// Matches every event
    Always,
    Eq(Field, String),
    Ne(Field, String),
    In(Field, Vec<String>),
    Not(Box<FilterExpr>),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
}

impl FilterExpr {
    /// Compile an expression. Blank input matches everything.
    pub fn parse(source: &str) -> Result<Self, FilterError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Ok(Self::Always);
        }

        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        match parser.next() {
            None => Ok(expr),
            Some(token) => Err(FilterError::Unexpected {
                expected: "end of expression",
                found: token.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn matches(&self, event: &BuildEvent) -> bool {
        match self {
            Self::Always => true,
            Self::Eq(field, literal) => field.value(event) == literal,
            Self::Ne(field, literal) => field.value(event) != literal,
            Self::In(field, literals) => {
                let value = field.value(event);
                literals.iter().any(|literal| literal == value)
            }
            Self::Not(inner) => !inner.matches(event),
            Self::And(left, right) => left.matches(event) && right.matches(event),
            Self::Or(left, right) => left.matches(event) || right.matches(event),
        }
    }
}

impl EventFilter for FilterExpr {
    fn apply(&self, event: &BuildEvent) -> bool {
        self.matches(event)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Bang,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(name) => write!(f, "`{name}`"),
            Self::Str(value) => write!(f, "{value:?}"),
            Self::LParen => f.write_str("`(`"),
            Self::RParen => f.write_str("`)`"),
            Self::LBracket => f.write_str("`[`"),
            Self::RBracket => f.write_str("`]`"),
            Self::Comma => f.write_str("`,`"),
            Self::EqEq => f.write_str("`==`"),
            Self::NotEq => f.write_str("`!=`"),
            Self::AndAnd => f.write_str("`&&`"),
            Self::OrOr => f.write_str("`||`"),
            Self::Bang => f.write_str("`!`"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, FilterError> {
    let mut tokens = vec![];
    let mut chars = source.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        let token = match ch {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '=' if chars.next_if(|&(_, c)| c == '=').is_some() => Token::EqEq,
            '!' if chars.next_if(|&(_, c)| c == '=').is_some() => Token::NotEq,
            '!' => Token::Bang,
            '&' if chars.next_if(|&(_, c)| c == '&').is_some() => Token::AndAnd,
            '|' if chars.next_if(|&(_, c)| c == '|').is_some() => Token::OrOr,
            '"' | '\'' => {
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        c if c == ch => {
                            closed = true;
                            break;
                        }
                        c => value.push(c),
                    }
                }
                if !closed {
                    return Err(FilterError::UnterminatedString(offset));
                }
                Token::Str(value)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::from(c);
                while let Some((_, c)) =
                    chars.next_if(|&(_, c)| c.is_ascii_alphanumeric() || c == '_' || c == '.')
                {
                    name.push(c);
                }
                Token::Ident(name)
            }
            ch => return Err(FilterError::UnexpectedChar { ch, offset }),
        };
        tokens.push(token);
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

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &'static str) -> Result<(), FilterError> {
        match self.next() {
            Some(token) if token == *expected => Ok(()),
            other => Err(unexpected(what, other)),
        }
    }

    fn parse_or(&mut self) -> Result<FilterExpr, FilterError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.parse_and()?;
            left = FilterExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<FilterExpr, FilterError> {
        let mut left = self.parse_unary()?;
        while self.eat(&Token::AndAnd) {
            let right = self.parse_unary()?;
            left = FilterExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<FilterExpr, FilterError> {
        if self.eat(&Token::Bang) {
            return Ok(FilterExpr::Not(Box::new(self.parse_unary()?)));
        }
        if self.eat(&Token::LParen) {
            let inner = self.parse_or()?;
            self.expect(&Token::RParen, "`)`")?;
            return Ok(inner);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<FilterExpr, FilterError> {
        let field = self.parse_field()?;
        match self.next() {
            Some(Token::EqEq) => Ok(FilterExpr::Eq(field, self.parse_literal()?)),
            Some(Token::NotEq) => Ok(FilterExpr::Ne(field, self.parse_literal()?)),
            Some(Token::Ident(op)) if op == "in" => {
                self.expect(&Token::LBracket, "`[`")?;
                let mut literals = vec![];
                if !self.eat(&Token::RBracket) {
                    loop {
                        literals.push(self.parse_literal()?);
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        self.expect(&Token::Comma, "`,` or `]`")?;
                    }
                }
                Ok(FilterExpr::In(field, literals))
            }
            other => Err(unexpected("`==`, `!=` or `in`", other)),
        }
    }

    fn parse_field(&mut self) -> Result<Field, FilterError> {
        let path = match self.next() {
            Some(Token::Ident(path)) => path,
            other => return Err(unexpected("a build field", other)),
        };

        match path.as_str() {
            "build.id" => Ok(Field::Id),
            "build.project_id" => Ok(Field::ProjectId),
            "build.status" => Ok(Field::Status),
            SUBSTITUTIONS => {
                self.expect(&Token::LBracket, "`[`")?;
                let key = match self.next() {
                    Some(Token::Str(key)) => key,
                    other => return Err(unexpected("a substitution key string", other)),
                };
                self.expect(&Token::RBracket, "`]`")?;
                Ok(Field::Substitution(key))
            }
            _ => match path
                .strip_prefix(SUBSTITUTIONS)
                .and_then(|rest| rest.strip_prefix('.'))
            {
                Some(key) if !key.is_empty() && !key.contains('.') => {
                    Ok(Field::Substitution(key.to_string()))
                }
                _ => Err(FilterError::UnknownField(path)),
            },
        }
    }

    fn parse_literal(&mut self) -> Result<String, FilterError> {
        match self.next() {
            Some(Token::Str(value)) => Ok(value),
            Some(Token::Ident(path)) if path.starts_with(STATUS_PREFIX) => {
                let name = &path[STATUS_PREFIX.len()..];
                BuildStatus::from_name(name)
                    .map(|status| status.as_str().to_string())
                    .ok_or_else(|| FilterError::UnknownStatus(name.to_string()))
            }
            other => Err(unexpected("a string or `Build.Status.*` literal", other)),
        }
    }
}

fn unexpected(expected: &'static str, found: Option<Token>) -> FilterError {
    FilterError::Unexpected {
        expected,
        found: found.map_or_else(|| "end of expression".to_string(), |t| t.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(status: BuildStatus, namespace: &str) -> BuildEvent {
        let mut event = BuildEvent {
            id: "177e4613".to_string(),
            project_id: "draftboard-368620".to_string(),
            status,
            ..BuildEvent::default()
        };
        event
            .substitutions
            .insert("_NAMESPACE".to_string(), namespace.to_string());
        event
    }

    #[test]
    fn test_blank_matches_everything() {
        let filter = FilterExpr::parse("   ").unwrap();
        assert_eq!(filter, FilterExpr::Always);
        assert!(filter.apply(&BuildEvent::default()));
    }

    #[test]
    fn test_status_equality() {
        let filter = FilterExpr::parse("build.status == Build.Status.SUCCESS").unwrap();
        assert!(filter.apply(&event(BuildStatus::Success, "dev")));
        assert!(!filter.apply(&event(BuildStatus::Working, "dev")));
    }

    #[test]
    fn test_status_in_list() {
        let filter = FilterExpr::parse(
            "build.status in [Build.Status.SUCCESS, Build.Status.FAILURE, Build.Status.TIMEOUT]",
        )
        .unwrap();
        assert!(filter.apply(&event(BuildStatus::Timeout, "dev")));
        assert!(!filter.apply(&event(BuildStatus::Queued, "dev")));
    }

    #[test]
    fn test_precedence_and_grouping() {
        let filter = FilterExpr::parse(
            r#"build.status == Build.Status.WORKING || build.status == Build.Status.SUCCESS && build.substitutions["_NAMESPACE"] == "s-prod""#,
        )
        .unwrap();
        assert!(filter.apply(&event(BuildStatus::Working, "dev")));
        assert!(filter.apply(&event(BuildStatus::Success, "s-prod")));
        assert!(!filter.apply(&event(BuildStatus::Success, "dev")));

        let grouped = FilterExpr::parse(
            "(build.status == Build.Status.WORKING || build.status == Build.Status.SUCCESS) && build.substitutions._NAMESPACE != 'dev'",
        )
        .unwrap();
        assert!(!grouped.apply(&event(BuildStatus::Working, "dev")));
        assert!(grouped.apply(&event(BuildStatus::Working, "s-prod")));
    }

    #[test]
    fn test_negation_and_project() {
        let filter =
            FilterExpr::parse(r#"!(build.project_id == "other") && build.id != """#).unwrap();
        assert!(filter.apply(&event(BuildStatus::Queued, "dev")));
    }

    #[test]
    fn test_missing_substitution_compares_as_empty() {
        let filter = FilterExpr::parse(r#"build.substitutions["_CLUSTER"] == """#).unwrap();
        assert!(filter.apply(&event(BuildStatus::Queued, "dev")));
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(
            FilterExpr::parse("build.status == Build.Status.DONE"),
            Err(FilterError::UnknownStatus("DONE".to_string()))
        );
        assert_eq!(
            FilterExpr::parse("build.branch == \"main\""),
            Err(FilterError::UnknownField("build.branch".to_string()))
        );
        assert_eq!(
            FilterExpr::parse("build.id == \"x"),
            Err(FilterError::UnterminatedString(12))
        );
        assert!(matches!(
            FilterExpr::parse("build.id = \"x\""),
            Err(FilterError::UnexpectedChar { ch: '=', offset: 9 })
        ));
        assert!(matches!(
            FilterExpr::parse("build.status in [Build.Status.SUCCESS"),
            Err(FilterError::Unexpected { .. })
        ));
        assert!(matches!(
            FilterExpr::parse("build.id == \"a\" build.id"),
            Err(FilterError::Unexpected {
                expected: "end of expression",
                ..
            })
        ));
    }
}
