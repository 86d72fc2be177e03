// SPDX-License-Identifier: MIT OR Apache-2.0

//! A minimal, deterministic expression interpreter for tests.
//!
//! The language covers the constructs statement rules actually use against
//! the [`StatementContext`] contract:
//!
//! ```text
//! true
//! attr['a1'] != null
//! attrs['a1'] == null || eattr['a2'] != null
//! groupName == '/A/B' && entityId != null
//! eattrs contains 'a2'
//! groups contains '/A'
//! !(idsByType['x500'] == null)
//! ```
//!
//! Value expressions evaluate to string lists: `'literal'` produces one
//! value, `attrs['a1']` all values of `a1`, `attr['a1']` just the first.

use crate::evaluator::{ExpressionError, ExpressionEvaluator, StatementContext};

const MAX_DEPTH: usize = 32;

/// Reference [`ExpressionEvaluator`] implementation backing the test
/// suites.
#[derive(Clone, Copy, Debug, Default)]
pub struct TestEvaluator;

impl ExpressionEvaluator for TestEvaluator {
    fn validate(&self, expression: &str) -> Result<(), ExpressionError> {
        parse(expression).map(|_| ())
    }

    fn evaluate_condition(
        &self,
        expression: &str,
        context: &StatementContext<'_>,
    ) -> Result<bool, ExpressionError> {
        let parsed = parse(expression)?;
        match eval(&parsed, context) {
            Value::Bool(value) => Ok(value),
            other => Err(ExpressionError::Evaluation {
                expression: expression.to_string(),
                reason: format!("condition evaluated to {other:?}, expected a boolean"),
            }),
        }
    }

    fn evaluate_value(
        &self,
        expression: &str,
        context: &StatementContext<'_>,
    ) -> Result<Option<Vec<String>>, ExpressionError> {
        let parsed = parse(expression)?;
        Ok(match eval(&parsed, context) {
            Value::Null => None,
            Value::Bool(value) => Some(vec![value.to_string()]),
            Value::Str(value) => Some(vec![value]),
            Value::List(values) => Some(values),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    Attr,
    Attrs,
    Eattr,
    Eattrs,
    IdsByType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Var {
    GroupName,
    EntityId,
    Groups,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Expr {
    True,
    False,
    Null,
    Literal(String),
    Lookup { source: Source, key: String },
    Var(Var),
    Contains { source: ContainsSource, needle: String },
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

/// Left side of a `contains`: either one of the map sources or the group
/// chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ContainsSource {
    Source(Source),
    Groups,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Value {
    Null,
    Bool(bool),
    Str(String),
    List(Vec<String>),
}

fn eval(expr: &Expr, context: &StatementContext<'_>) -> Value {
    match expr {
        Expr::True => Value::Bool(true),
        Expr::False => Value::Bool(false),
        Expr::Null => Value::Null,
        Expr::Literal(value) => Value::Str(value.clone()),
        Expr::Lookup { source, key } => lookup(*source, key, context),
        Expr::Var(Var::GroupName) => Value::Str(context.group_name.to_string()),
        Expr::Var(Var::EntityId) => Value::Str(context.entity_id.to_string()),
        Expr::Var(Var::Groups) => Value::List(
            context
                .groups
                .iter()
                .map(|group| group.to_string())
                .collect(),
        ),
        Expr::Contains { source, needle } => Value::Bool(match source {
            ContainsSource::Groups => context
                .groups
                .iter()
                .any(|group| group.as_str() == needle),
            ContainsSource::Source(Source::Attr) => context.attr.contains_key(needle),
            ContainsSource::Source(Source::Attrs) => context.attrs.contains_key(needle),
            ContainsSource::Source(Source::Eattr) => context
                .eattr
                .as_ref()
                .is_some_and(|map| map.contains_key(needle)),
            ContainsSource::Source(Source::Eattrs) => context
                .eattrs
                .as_ref()
                .is_some_and(|map| map.contains_key(needle)),
            ContainsSource::Source(Source::IdsByType) => context.ids_by_type.contains_key(needle),
        }),
        Expr::Eq(left, right) => Value::Bool(equal(&eval(left, context), &eval(right, context))),
        Expr::Ne(left, right) => Value::Bool(!equal(&eval(left, context), &eval(right, context))),
        Expr::And(left, right) => {
            Value::Bool(truthy(&eval(left, context)) && truthy(&eval(right, context)))
        }
        Expr::Or(left, right) => {
            Value::Bool(truthy(&eval(left, context)) || truthy(&eval(right, context)))
        }
        Expr::Not(inner) => Value::Bool(!truthy(&eval(inner, context))),
    }
}

fn lookup(source: Source, key: &str, context: &StatementContext<'_>) -> Value {
    match source {
        Source::Attr => context
            .attr
            .get(key)
            .map(|value| Value::Str(value.clone()))
            .unwrap_or(Value::Null),
        Source::Attrs => context
            .attrs
            .get(key)
            .map(|values| Value::List(values.clone()))
            .unwrap_or(Value::Null),
        Source::Eattr => context
            .eattr
            .as_ref()
            .and_then(|map| map.get(key))
            .map(|value| Value::Str(value.clone()))
            .unwrap_or(Value::Null),
        Source::Eattrs => context
            .eattrs
            .as_ref()
            .and_then(|map| map.get(key))
            .map(|values| Value::List(values.clone()))
            .unwrap_or(Value::Null),
        Source::IdsByType => context
            .ids_by_type
            .get(key)
            .map(|values| Value::List(values.clone()))
            .unwrap_or(Value::Null),
    }
}

fn equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) => a == b,
        _ => false,
    }
}

fn truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Eq,
    Ne,
    And,
    Or,
    Not,
}

fn syntax_error(expression: &str, reason: impl Into<String>) -> ExpressionError {
    ExpressionError::Syntax {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

fn tokenize(expression: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '\'' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => value.push(c),
                        None => return Err(syntax_error(expression, "unterminated string")),
                    }
                }
                tokens.push(Token::Str(value));
            }
            '=' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err(syntax_error(expression, "expected '=='"));
                }
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '&' => {
                chars.next();
                if chars.next() != Some('&') {
                    return Err(syntax_error(expression, "expected '&&'"));
                }
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                if chars.next() != Some('|') {
                    return Err(syntax_error(expression, "expected '||'"));
                }
                tokens.push(Token::Or);
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(syntax_error(
                    expression,
                    format!("unexpected character '{other}'"),
                ));
            }
        }
    }

    Ok(tokens)
}

struct Parser<'e> {
    expression: &'e str,
    tokens: Vec<Token>,
    position: usize,
}

fn parse(expression: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(syntax_error(expression, "empty expression"));
    }
    let mut parser = Parser {
        expression,
        tokens,
        position: 0,
    };
    let expr = parser.or_expr(0)?;
    if parser.position != parser.tokens.len() {
        return Err(syntax_error(expression, "trailing tokens"));
    }
    Ok(expr)
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), ExpressionError> {
        if self.next() == Some(token) {
            Ok(())
        } else {
            Err(syntax_error(self.expression, format!("expected {what}")))
        }
    }

    fn guard(&self, depth: usize) -> Result<(), ExpressionError> {
        if depth > MAX_DEPTH {
            Err(syntax_error(self.expression, "expression nested too deeply"))
        } else {
            Ok(())
        }
    }

    fn or_expr(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        self.guard(depth)?;
        let mut left = self.and_expr(depth + 1)?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.and_expr(depth + 1)?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        self.guard(depth)?;
        let mut left = self.comparison(depth + 1)?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.comparison(depth + 1)?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn comparison(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        self.guard(depth)?;
        let left = self.unary(depth + 1)?;
        match self.peek() {
            Some(Token::Eq) => {
                self.next();
                let right = self.unary(depth + 1)?;
                Ok(Expr::Eq(Box::new(left), Box::new(right)))
            }
            Some(Token::Ne) => {
                self.next();
                let right = self.unary(depth + 1)?;
                Ok(Expr::Ne(Box::new(left), Box::new(right)))
            }
            _ => Ok(left),
        }
    }

    fn unary(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        self.guard(depth)?;
        if self.peek() == Some(&Token::Not) {
            self.next();
            let inner = self.unary(depth + 1)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.primary(depth + 1)
    }

    fn primary(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        self.guard(depth)?;
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.or_expr(depth + 1)?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::Str(value)) => Ok(Expr::Literal(value)),
            Some(Token::Ident(ident)) => self.ident_expr(&ident),
            _ => Err(syntax_error(self.expression, "expected an operand")),
        }
    }

    fn ident_expr(&mut self, ident: &str) -> Result<Expr, ExpressionError> {
        match ident {
            "true" => return Ok(Expr::True),
            "false" => return Ok(Expr::False),
            "null" => return Ok(Expr::Null),
            "groupName" => return Ok(Expr::Var(Var::GroupName)),
            "entityId" => return Ok(Expr::Var(Var::EntityId)),
            _ => {}
        }

        let source = match ident {
            "attr" => Some(Source::Attr),
            "attrs" => Some(Source::Attrs),
            "eattr" => Some(Source::Eattr),
            "eattrs" => Some(Source::Eattrs),
            "idsByType" => Some(Source::IdsByType),
            _ => None,
        };

        // `groups` on its own is the group chain; with `contains` it is a
        // membership test like the map sources.
        if ident == "groups" {
            if self.peek() == Some(&Token::Ident("contains".to_string())) {
                self.next();
                let needle = self.string_operand()?;
                return Ok(Expr::Contains {
                    source: ContainsSource::Groups,
                    needle,
                });
            }
            return Ok(Expr::Var(Var::Groups));
        }

        let Some(source) = source else {
            return Err(syntax_error(
                self.expression,
                format!("unknown identifier '{ident}'"),
            ));
        };

        match self.peek() {
            Some(Token::LBracket) => {
                self.next();
                let key = self.string_operand()?;
                self.expect(Token::RBracket, "']'")?;
                Ok(Expr::Lookup { source, key })
            }
            Some(Token::Ident(word)) if word == "contains" => {
                self.next();
                let needle = self.string_operand()?;
                Ok(Expr::Contains {
                    source: ContainsSource::Source(source),
                    needle,
                })
            }
            _ => Err(syntax_error(
                self.expression,
                format!("'{ident}' needs a ['key'] lookup or 'contains'"),
            )),
        }
    }

    fn string_operand(&mut self) -> Result<String, ExpressionError> {
        match self.next() {
            Some(Token::Str(value)) => Ok(value),
            _ => Err(syntax_error(self.expression, "expected a string literal")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use idhive_core::{EntityId, GroupPath};

    use crate::evaluator::{ExpressionEvaluator, StatementContext};

    use super::TestEvaluator;

    fn context<'a>(
        group: &'a GroupPath,
        chain: &'a [GroupPath],
        ids: &'a BTreeMap<String, Vec<String>>,
    ) -> StatementContext<'a> {
        let mut attr = BTreeMap::new();
        let mut attrs = BTreeMap::new();
        attr.insert("a1".to_string(), "v1".to_string());
        attrs.insert("a1".to_string(), vec!["v1".to_string(), "v2".to_string()]);

        StatementContext {
            entity_id: EntityId(7),
            group_name: group,
            groups: chain,
            ids_by_type: ids,
            attr,
            attrs,
            eattr: None,
            eattrs: None,
        }
    }

    #[test]
    fn conditions_over_attributes() {
        let group = GroupPath::parse("/A/B").unwrap();
        let chain = group.ancestors();
        let ids = BTreeMap::from([("x500".to_string(), vec!["cn=test".to_string()])]);
        let context = context(&group, &chain, &ids);
        let evaluator = TestEvaluator;

        assert!(evaluator.evaluate_condition("true", &context).unwrap());
        assert!(
            evaluator
                .evaluate_condition("attr['a1'] != null", &context)
                .unwrap()
        );
        assert!(
            evaluator
                .evaluate_condition("attr['a1'] == 'v1'", &context)
                .unwrap()
        );
        assert!(
            !evaluator
                .evaluate_condition("attrs['missing'] != null", &context)
                .unwrap()
        );
        assert!(
            evaluator
                .evaluate_condition(
                    "groupName == '/A/B' && idsByType['x500'] != null && entityId != null",
                    &context
                )
                .unwrap()
        );
        assert!(
            evaluator
                .evaluate_condition("groups contains '/A'", &context)
                .unwrap()
        );
        assert!(
            evaluator
                .evaluate_condition("!(attr['a1'] == null) || false", &context)
                .unwrap()
        );
    }

    #[test]
    fn extra_group_lookups_without_extra_context_are_null() {
        let group = GroupPath::parse("/A").unwrap();
        let chain = group.ancestors();
        let ids = BTreeMap::new();
        let context = context(&group, &chain, &ids);
        let evaluator = TestEvaluator;

        assert!(
            !evaluator
                .evaluate_condition("eattr['a1'] != null", &context)
                .unwrap()
        );
        assert!(
            !evaluator
                .evaluate_condition("eattrs contains 'a1'", &context)
                .unwrap()
        );
    }

    #[test]
    fn value_expressions() {
        let group = GroupPath::parse("/A").unwrap();
        let chain = group.ancestors();
        let ids = BTreeMap::new();
        let context = context(&group, &chain, &ids);
        let evaluator = TestEvaluator;

        assert_eq!(
            evaluator.evaluate_value("'fixed'", &context).unwrap(),
            Some(vec!["fixed".to_string()])
        );
        assert_eq!(
            evaluator.evaluate_value("attr['a1']", &context).unwrap(),
            Some(vec!["v1".to_string()])
        );
        assert_eq!(
            evaluator.evaluate_value("attrs['a1']", &context).unwrap(),
            Some(vec!["v1".to_string(), "v2".to_string()])
        );
        assert_eq!(
            evaluator.evaluate_value("attr['missing']", &context).unwrap(),
            None
        );
    }

    #[test]
    fn syntax_errors_are_reported() {
        let evaluator = TestEvaluator;
        assert!(evaluator.validate("attr['a1'] != null").is_ok());
        assert!(evaluator.validate("").is_err());
        assert!(evaluator.validate("attr[").is_err());
        assert!(evaluator.validate("bogus").is_err());
        assert!(evaluator.validate("attr['a1'] &").is_err());
    }
}
