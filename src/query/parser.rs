//! Client-side parsing of free-form `where` expressions
//!
//! Only the subset a record can be checked against locally is accepted: a
//! conjunction of comparisons between a column and a literal. Anything else
//! is reported as unsupported so callers can surface it instead of silently
//! ignoring the condition.

use sqlparser::ast::{BinaryOperator, Expr, SetExpr, Statement, UnaryOperator, Value as SqlValue};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::data::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub operator: FilterOperator,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    NotLike,
    IsNull,
    IsNotNull,
}

/// Parse a `where` expression into a conjunction of filters
pub fn parse_where(expression: &str) -> Result<Vec<Filter>, ParseError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyExpression);
    }

    // Parse as the WHERE clause of a throwaway SELECT
    let sql = format!("SELECT * FROM spans WHERE {}", trimmed);
    let statements = Parser::parse_sql(&GenericDialect {}, &sql)?;

    if statements.len() != 1 {
        return Err(ParseError::MultipleStatements);
    }

    let Statement::Query(query) = &statements[0] else {
        return Err(ParseError::UnsupportedExpression("not a filter expression".into()));
    };
    if !query.order_by.is_empty() || query.limit.is_some() {
        return Err(ParseError::UnsupportedExpression("ORDER BY / LIMIT".into()));
    }
    let SetExpr::Select(select) = &*query.body else {
        return Err(ParseError::UnsupportedExpression("set operation".into()));
    };
    let Some(selection) = &select.selection else {
        return Err(ParseError::EmptyExpression);
    };

    parse_filter_expr(selection)
}

fn parse_filter_expr(expr: &Expr) -> Result<Vec<Filter>, ParseError> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And => {
                let mut filters = parse_filter_expr(left)?;
                filters.extend(parse_filter_expr(right)?);
                Ok(filters)
            }
            BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq => {
                let column = extract_column_name(left)?;
                let value = extract_value(right)?;
                let operator = match op {
                    BinaryOperator::Eq => FilterOperator::Eq,
                    BinaryOperator::NotEq => FilterOperator::NotEq,
                    BinaryOperator::Lt => FilterOperator::Lt,
                    BinaryOperator::LtEq => FilterOperator::LtEq,
                    BinaryOperator::Gt => FilterOperator::Gt,
                    _ => FilterOperator::GtEq,
                };

                Ok(vec![Filter {
                    column,
                    operator,
                    value,
                }])
            }
            _ => Err(ParseError::UnsupportedOperator(op.to_string())),
        },
        Expr::Like {
            negated,
            expr,
            pattern,
            escape_char,
        } => {
            if escape_char.is_some() {
                return Err(ParseError::UnsupportedExpression("LIKE ... ESCAPE".into()));
            }
            let column = extract_column_name(expr)?;
            let value = extract_value(pattern)?;
            Ok(vec![Filter {
                column,
                operator: if *negated {
                    FilterOperator::NotLike
                } else {
                    FilterOperator::Like
                },
                value,
            }])
        }
        Expr::IsNull(inner) => Ok(vec![Filter {
            column: extract_column_name(inner)?,
            operator: FilterOperator::IsNull,
            value: Value::Null,
        }]),
        Expr::IsNotNull(inner) => Ok(vec![Filter {
            column: extract_column_name(inner)?,
            operator: FilterOperator::IsNotNull,
            value: Value::Null,
        }]),
        Expr::Nested(inner) => parse_filter_expr(inner),
        other => Err(ParseError::UnsupportedExpression(other.to_string())),
    }
}

fn extract_column_name(expr: &Expr) -> Result<String, ParseError> {
    match expr {
        Expr::Identifier(ident) => Ok(ident.value.clone()),
        Expr::CompoundIdentifier(idents) => {
            Ok(idents.iter().map(|i| i.value.clone()).collect::<Vec<_>>().join("."))
        }
        _ => Err(ParseError::ExpectedColumnName(expr.to_string())),
    }
}

fn extract_value(expr: &Expr) -> Result<Value, ParseError> {
    match expr {
        Expr::Value(v) => sql_value_to_value(v),
        Expr::UnaryOp { op, expr } => {
            // Negative numbers
            if matches!(op, UnaryOperator::Minus) {
                if let Expr::Value(SqlValue::Number(n, _)) = expr.as_ref() {
                    let negated = format!("-{}", n);
                    if let Ok(i) = negated.parse::<i64>() {
                        return Ok(Value::Int(i));
                    }
                    if let Ok(f) = negated.parse::<f64>() {
                        return Ok(Value::Float(f));
                    }
                }
            }
            Err(ParseError::ExpectedValue(expr.to_string()))
        }
        _ => Err(ParseError::ExpectedValue(expr.to_string())),
    }
}

fn sql_value_to_value(v: &SqlValue) -> Result<Value, ParseError> {
    match v {
        SqlValue::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Value::Int(i))
            } else if let Ok(f) = n.parse::<f64>() {
                Ok(Value::Float(f))
            } else {
                Err(ParseError::InvalidNumber(n.clone()))
            }
        }
        SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => {
            Ok(Value::String(s.clone()))
        }
        SqlValue::Boolean(b) => Ok(Value::Bool(*b)),
        SqlValue::Null => Ok(Value::Null),
        other => Err(ParseError::UnsupportedValue(other.to_string())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("SQL parse error: {0}")]
    SqlParser(#[from] sqlparser::parser::ParserError),

    #[error("Empty expression")]
    EmptyExpression,

    #[error("Multiple statements not supported")]
    MultipleStatements,

    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Expected column name, found {0}")]
    ExpectedColumnName(String),

    #[error("Expected literal value, found {0}")]
    ExpectedValue(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Unsupported value type: {0}")]
    UnsupportedValue(String),
}
