//! The custom-rule mini-language.
//!
//! Triggers and actions arrive as strings in the configuration and are
//! parsed into a tagged AST evaluated by pattern-match; nothing is ever
//! executed as code.
//!
//! Trigger grammar:
//! ```text
//! trigger   := and_expr ( OR and_expr )*
//! and_expr  := primary ( AND primary )*
//! primary   := '(' trigger ')' | predicate
//! predicate := has_label(name) | has_dependency(name)
//!            | strength <op> number | hops <op> number
//!            | type == "label" | type == "dependency"
//! ```
//! Actions are a `;`-separated list of
//! `multiply_strength(f) | add_strength(x) | set_strength(x) | multiply_decay(f)`.

use super::AttrKind;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    fn apply(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    HasLabel(String),
    HasDependency(String),
    Strength(CmpOp, f64),
    Hops(CmpOp, f64),
    TypeIs(AttrKind),
    And(Box<Trigger>, Box<Trigger>),
    Or(Box<Trigger>, Box<Trigger>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    MultiplyStrength(f64),
    AddStrength(f64),
    SetStrength(f64),
    MultiplyDecay(f64),
}

/// Everything a trigger can observe about a state entry.
pub struct EvalContext<'a> {
    pub strength: f64,
    pub hops: u32,
    pub kind: AttrKind,
    pub labels: &'a HashSet<String>,
    pub dependencies: &'a HashSet<String>,
}

impl Trigger {
    pub fn matches(&self, ctx: &EvalContext<'_>) -> bool {
        match self {
            Self::HasLabel(name) => ctx.labels.contains(name),
            Self::HasDependency(name) => ctx.dependencies.contains(name),
            Self::Strength(op, value) => op.apply(ctx.strength, *value),
            Self::Hops(op, value) => op.apply(f64::from(ctx.hops), *value),
            Self::TypeIs(kind) => ctx.kind == *kind,
            Self::And(a, b) => a.matches(ctx) && b.matches(ctx),
            Self::Or(a, b) => a.matches(ctx) || b.matches(ctx),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    LParen,
    RParen,
    Semi,
    Cmp(CmpOp),
    And,
    Or,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semi);
                i += 1;
            }
            '"' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != '"' {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err("unterminated string literal".to_string());
                }
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '<' | '>' | '=' | '!' => {
                let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
                let (op, len) = match two.as_str() {
                    "<=" => (CmpOp::Le, 2),
                    ">=" => (CmpOp::Ge, 2),
                    "==" => (CmpOp::Eq, 2),
                    "!=" => (CmpOp::Ne, 2),
                    _ if c == '<' => (CmpOp::Lt, 1),
                    _ if c == '>' => (CmpOp::Gt, 1),
                    _ => return Err(format!("unexpected character '{c}'")),
                };
                tokens.push(Token::Cmp(op));
                i += len;
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{text}'"))?;
                tokens.push(Token::Number(value));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.to_ascii_uppercase().as_str() {
                    "AND" => tokens.push(Token::And),
                    "OR" => tokens.push(Token::Or),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            _ => return Err(format!("unexpected character '{c}'")),
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

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            other => Err(format!("expected {expected:?}, found {other:?}")),
        }
    }

    fn or_expr(&mut self) -> Result<Trigger, String> {
        let mut left = self.and_expr()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.next();
            let right = self.and_expr()?;
            left = Trigger::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Trigger, String> {
        let mut left = self.primary()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.next();
            let right = self.primary()?;
            left = Trigger::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Trigger, String> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.predicate(&name),
            other => Err(format!("expected predicate, found {other:?}")),
        }
    }

    fn predicate(&mut self, name: &str) -> Result<Trigger, String> {
        match name {
            "has_label" | "has_dependency" => {
                self.expect(&Token::LParen)?;
                let arg = match self.next() {
                    Some(Token::Ident(arg)) => arg,
                    Some(Token::Str(arg)) => arg,
                    other => return Err(format!("expected name argument, found {other:?}")),
                };
                self.expect(&Token::RParen)?;
                if name == "has_label" {
                    Ok(Trigger::HasLabel(arg))
                } else {
                    Ok(Trigger::HasDependency(arg))
                }
            }
            "strength" | "hops" => {
                let op = match self.next() {
                    Some(Token::Cmp(op)) => op,
                    other => return Err(format!("expected comparison, found {other:?}")),
                };
                let value = match self.next() {
                    Some(Token::Number(value)) => value,
                    other => return Err(format!("expected number, found {other:?}")),
                };
                if name == "strength" {
                    Ok(Trigger::Strength(op, value))
                } else {
                    Ok(Trigger::Hops(op, value))
                }
            }
            "type" => {
                match self.next() {
                    Some(Token::Cmp(CmpOp::Eq)) => {}
                    other => return Err(format!("expected '==', found {other:?}")),
                }
                let value = match self.next() {
                    Some(Token::Str(value)) => value,
                    Some(Token::Ident(value)) => value,
                    other => return Err(format!("expected type name, found {other:?}")),
                };
                match value.as_str() {
                    "label" => Ok(Trigger::TypeIs(AttrKind::Label)),
                    "dependency" => Ok(Trigger::TypeIs(AttrKind::Dependency)),
                    other => Err(format!("unknown type '{other}'")),
                }
            }
            other => Err(format!("unknown predicate '{other}'")),
        }
    }

    fn actions(&mut self) -> Result<Vec<Action>, String> {
        let mut actions = Vec::new();
        loop {
            let name = match self.next() {
                Some(Token::Ident(name)) => name,
                other => return Err(format!("expected action name, found {other:?}")),
            };
            self.expect(&Token::LParen)?;
            let value = match self.next() {
                Some(Token::Number(value)) => value,
                other => return Err(format!("expected number argument, found {other:?}")),
            };
            self.expect(&Token::RParen)?;

            let action = match name.as_str() {
                "multiply_strength" => Action::MultiplyStrength(value),
                "add_strength" => Action::AddStrength(value),
                "set_strength" => Action::SetStrength(value),
                "multiply_decay" => Action::MultiplyDecay(value),
                other => return Err(format!("unknown action '{other}'")),
            };
            actions.push(action);

            match self.peek() {
                Some(Token::Semi) => {
                    self.next();
                }
                None => break,
                other => return Err(format!("expected ';' or end, found {other:?}")),
            }
        }
        Ok(actions)
    }
}

pub fn parse_trigger(input: &str) -> Result<Trigger, String> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let trigger = parser.or_expr()?;
    if parser.peek().is_some() {
        return Err(format!("trailing tokens after trigger: {:?}", parser.peek()));
    }
    Ok(trigger)
}

pub fn parse_actions(input: &str) -> Result<Vec<Action>, String> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.actions()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(
        strength: f64,
        hops: u32,
        kind: AttrKind,
        labels: &'a HashSet<String>,
        dependencies: &'a HashSet<String>,
    ) -> EvalContext<'a> {
        EvalContext {
            strength,
            hops,
            kind,
            labels,
            dependencies,
        }
    }

    #[test]
    fn test_parse_predicates() {
        assert_eq!(
            parse_trigger("has_label(critical)").unwrap(),
            Trigger::HasLabel("critical".to_string())
        );
        assert_eq!(
            parse_trigger("has_dependency(database-call)").unwrap(),
            Trigger::HasDependency("database-call".to_string())
        );
        assert_eq!(
            parse_trigger("strength > 0.5").unwrap(),
            Trigger::Strength(CmpOp::Gt, 0.5)
        );
        assert_eq!(
            parse_trigger("hops <= 3").unwrap(),
            Trigger::Hops(CmpOp::Le, 3.0)
        );
        assert_eq!(
            parse_trigger("type == \"label\"").unwrap(),
            Trigger::TypeIs(AttrKind::Label)
        );
    }

    #[test]
    fn test_parse_combinations() {
        let trigger =
            parse_trigger("has_label(critical) AND strength > 0.5 OR hops == 0").unwrap();
        // AND binds tighter than OR.
        match trigger {
            Trigger::Or(left, right) => {
                assert!(matches!(*left, Trigger::And(_, _)));
                assert!(matches!(*right, Trigger::Hops(CmpOp::Eq, _)));
            }
            other => panic!("expected Or at top level, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_parentheses() {
        let trigger =
            parse_trigger("has_label(critical) AND (strength > 0.5 OR hops == 0)").unwrap();
        match trigger {
            Trigger::And(_, right) => assert!(matches!(*right, Trigger::Or(_, _))),
            other => panic!("expected And at top level, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_trigger("has_label(").is_err());
        assert!(parse_trigger("strength >").is_err());
        assert!(parse_trigger("type == \"banana\"").is_err());
        assert!(parse_trigger("explode(1)").is_err());
        assert!(parse_trigger("has_label(a) garbage").is_err());
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!(
            parse_actions("multiply_strength(1.5)").unwrap(),
            vec![Action::MultiplyStrength(1.5)]
        );
        assert_eq!(
            parse_actions("set_strength(0.9); multiply_decay(0.8)").unwrap(),
            vec![Action::SetStrength(0.9), Action::MultiplyDecay(0.8)]
        );
        assert!(parse_actions("noop()").is_err());
        assert!(parse_actions("frobnicate(1)").is_err());
    }

    #[test]
    fn test_trigger_evaluation() {
        let labels: HashSet<String> = ["critical".to_string()].into();
        let deps: HashSet<String> = HashSet::new();

        let trigger = parse_trigger("has_label(critical) AND strength >= 0.5").unwrap();
        assert!(trigger.matches(&ctx(0.7, 1, AttrKind::Label, &labels, &deps)));
        assert!(!trigger.matches(&ctx(0.3, 1, AttrKind::Label, &labels, &deps)));

        let trigger = parse_trigger("type == \"dependency\" OR hops < 1").unwrap();
        assert!(trigger.matches(&ctx(0.0, 0, AttrKind::Label, &labels, &deps)));
        assert!(trigger.matches(&ctx(0.0, 5, AttrKind::Dependency, &labels, &deps)));
        assert!(!trigger.matches(&ctx(0.0, 5, AttrKind::Label, &labels, &deps)));
    }
}
