//! Command templates of pipeline steps.
//!
//! Loop commands are rendered in two passes. The first replaces every positional placeholder
//! (`{}`, `{0}`, `{:03d}`) with the loop index, `{{` and `}}` become literal braces. The second
//! evaluates every remaining `{expression}` as integer arithmetic, so `{{{}*10}}` renders
//! `20` for index 2.

use crate::PipelineError;
use std::collections::BTreeMap;

const PARAMETER_OPEN: &str = "$[";

/// Replace every `$[key]` with its global parameter
pub fn substitute_parameters(
    command: &str,
    parameters: &BTreeMap<String, String>,
) -> Result<String, PipelineError> {
    let mut rendered = String::with_capacity(command.len());
    let mut rest = command;

    while let Some(start) = rest.find(PARAMETER_OPEN) {
        rendered.push_str(&rest[..start]);

        let reference = &rest[start + PARAMETER_OPEN.len()..];
        let end = reference
            .find(']')
            .ok_or_else(|| malformed(command, "unterminated parameter reference"))?;
        let key = &reference[..end];
        let value = parameters
            .get(key)
            .ok_or_else(|| PipelineError::UndefinedParameter(key.to_string()))?;

        rendered.push_str(value);
        rest = &reference[end + 1..];
    }
    rendered.push_str(rest);

    Ok(rendered)
}

/// Insert a loop index into a command and evaluate the expressions it produced
pub fn format_loop_command(command: &str, index: i64) -> Result<String, PipelineError> {
    let positional = replace_fields(command, |field| {
        let (name, spec) = split_field(field);
        if !name.chars().all(|c| c.is_ascii_digit()) {
            return Err(malformed(
                command,
                &format!("'{{{field}}}' is not a positional placeholder"),
            ));
        }

        format_integer(index, spec).map_err(|reason| malformed(command, &reason))
    })?;

    replace_fields(&positional, |field| {
        let (expression, spec) = split_field(field);
        let value = evaluate(expression)?;

        format_integer(value, spec).map_err(|reason| malformed(command, &reason))
    })
}

fn malformed(template: &str, reason: &str) -> PipelineError {
    PipelineError::MalformedTemplate {
        template: template.to_string(),
        reason: reason.to_string(),
    }
}

fn split_field(field: &str) -> (&str, &str) {
    field.split_once(':').unwrap_or((field, ""))
}

/// Replace every `{field}` through `render`, doubled braces are escapes
fn replace_fields(
    template: &str,
    mut render: impl FnMut(&str) -> Result<String, PipelineError>,
) -> Result<String, PipelineError> {
    let mut rendered = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                rendered.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                rendered.push('}');
            }
            '{' => {
                let field_start = position + 1;
                let field_end = loop {
                    match chars.next() {
                        Some((end, '}')) => break end,
                        Some((_, '{')) => {
                            return Err(malformed(template, "nested '{' in placeholder"))
                        }
                        Some(_) => {}
                        None => return Err(malformed(template, "unterminated '{'")),
                    }
                };

                rendered.push_str(&render(&template[field_start..field_end])?);
            }
            '}' => return Err(malformed(template, "single '}' encountered")),
            c => rendered.push(c),
        }
    }

    Ok(rendered)
}

/// Format an integer with a `[[fill]align][sign][0][width][d]` specification
pub fn format_integer(value: i64, spec: &str) -> Result<String, String> {
    let chars = spec.chars().collect::<Vec<_>>();
    let mut position = 0;
    let is_align = |c: &char| matches!(c, '<' | '>' | '^' | '=');

    let mut fill = ' ';
    let mut align = None;
    if chars.len() >= 2 && is_align(&chars[1]) {
        fill = chars[0];
        align = Some(chars[1]);
        position = 2;
    } else if chars.first().is_some_and(is_align) {
        align = Some(chars[0]);
        position = 1;
    }

    let mut sign = '-';
    if let Some(&c @ ('+' | '-' | ' ')) = chars.get(position) {
        sign = c;
        position += 1;
    }

    if chars.get(position) == Some(&'0') {
        if align.is_none() {
            fill = '0';
            align = Some('=');
        }
        position += 1;
    }

    let width_start = position;
    while chars.get(position).is_some_and(char::is_ascii_digit) {
        position += 1;
    }
    let width = if position > width_start {
        chars[width_start..position]
            .iter()
            .collect::<String>()
            .parse::<usize>()
            .map_err(|e| format!("invalid width in '{spec}': {e}"))?
    } else {
        0
    };

    if chars.get(position) == Some(&'d') {
        position += 1;
    }
    if position != chars.len() {
        return Err(format!("unsupported format specification '{spec}'"));
    }

    let prefix = match (value < 0, sign) {
        (true, _) => "-",
        (false, '+') => "+",
        (false, ' ') => " ",
        _ => "",
    };
    let digits = value.unsigned_abs().to_string();
    let len = prefix.len() + digits.len();
    let padding = width.saturating_sub(len);
    let pad = |n: usize| fill.to_string().repeat(n);

    Ok(match align.unwrap_or('>') {
        '<' => format!("{prefix}{digits}{}", pad(padding)),
        '^' => format!(
            "{}{prefix}{digits}{}",
            pad(padding / 2),
            pad(padding - padding / 2)
        ),
        '=' => format!("{prefix}{}{digits}", pad(padding)),
        _ => format!("{}{prefix}{digits}", pad(padding)),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Number(i64),
    Plus,
    Minus,
    Star,
    Power,
    Slash,
    Percent,
    Open,
    Close,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(c) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '0'..='9' => {
                let mut number = c.to_string();
                while let Some(&digit @ ('0'..='9' | '_')) = chars.peek() {
                    if digit != '_' {
                        number.push(digit);
                    }
                    chars.next();
                }
                Token::Number(
                    number
                        .parse()
                        .map_err(|e| format!("invalid number {number}: {e}"))?,
                )
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                Token::Power
            }
            '*' => Token::Star,
            '/' => {
                if chars.peek() == Some(&'/') {
                    chars.next();
                }
                Token::Slash
            }
            '%' => Token::Percent,
            '(' => Token::Open,
            ')' => Token::Close,
            other => return Err(format!("unexpected character '{other}'")),
        };
        tokens.push(token);
    }

    Ok(tokens)
}

/// Recursive descent over `+ - * / // % **` and parentheses with Python's precedence
struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.position).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.position += 1;
        token
    }

    fn sum(&mut self) -> Result<i64, String> {
        let mut value = self.product()?;

        while let Some(operator @ (Token::Plus | Token::Minus)) = self.peek() {
            self.position += 1;
            let rhs = self.product()?;
            let result = match operator {
                Token::Plus => value.checked_add(rhs),
                _ => value.checked_sub(rhs),
            };
            value = result.ok_or("overflow")?;
        }

        Ok(value)
    }

    fn product(&mut self) -> Result<i64, String> {
        let mut value = self.unary()?;

        while let Some(operator @ (Token::Star | Token::Slash | Token::Percent)) = self.peek() {
            self.position += 1;
            let rhs = self.unary()?;
            value = match operator {
                Token::Star => value.checked_mul(rhs).ok_or("overflow")?,
                _ if rhs == 0 => return Err("division by zero".to_string()),
                Token::Slash => floor_div(value, rhs).ok_or("overflow")?,
                _ => floor_mod(value, rhs).ok_or("overflow")?,
            };
        }

        Ok(value)
    }

    fn unary(&mut self) -> Result<i64, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.position += 1;
                Ok(self.unary()?.checked_neg().ok_or("overflow")?)
            }
            Some(Token::Plus) => {
                self.position += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<i64, String> {
        let base = self.atom()?;
        if self.peek() != Some(Token::Power) {
            return Ok(base);
        }

        self.position += 1;
        let exponent = self.unary()?;
        let exponent = u32::try_from(exponent).map_err(|_| "negative exponent")?;

        Ok(base.checked_pow(exponent).ok_or("overflow")?)
    }

    fn atom(&mut self) -> Result<i64, String> {
        match self.next() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::Open) => {
                let value = self.sum()?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    _ => Err("missing ')'".to_string()),
                }
            }
            Some(token) => Err(format!("unexpected {token:?}")),
            None => Err("unexpected end".to_string()),
        }
    }
}

fn floor_div(lhs: i64, rhs: i64) -> Option<i64> {
    let quotient = lhs.checked_div(rhs)?;

    if lhs % rhs != 0 && (lhs < 0) != (rhs < 0) {
        quotient.checked_sub(1)
    } else {
        Some(quotient)
    }
}

fn floor_mod(lhs: i64, rhs: i64) -> Option<i64> {
    let remainder = lhs.checked_rem(rhs)?;

    if remainder != 0 && (remainder < 0) != (rhs < 0) {
        Some(remainder + rhs)
    } else {
        Some(remainder)
    }
}

/// Evaluate an integer expression, `/` floors like `//`
pub fn evaluate(expression: &str) -> Result<i64, PipelineError> {
    let invalid = |reason: String| PipelineError::InvalidExpression {
        expression: expression.to_string(),
        reason,
    };

    let mut parser = Parser {
        tokens: tokenize(expression).map_err(invalid)?,
        position: 0,
    };
    let value = parser.sum().map_err(invalid)?;

    match parser.peek() {
        None => Ok(value),
        Some(token) => Err(invalid(format!("unexpected {token:?}"))),
    }
}
