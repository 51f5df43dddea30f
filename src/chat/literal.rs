//! Parser for the list-of-tuples text a SQL chain returns, e.g.
//! `[(1, 'Ann', Decimal('12.50')), (2, None, datetime.date(2024, 1, 2))]`.

use crate::db::values::Scalar;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct LiteralError {
    pub message: String,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Seq(Vec<Literal>),
    Value(Scalar),
}

/// Parses `text` as a list of rows. When the whole text is not a literal,
/// the first balanced `[...]` inside it is tried instead.
pub fn parse_rows(text: &str) -> Result<Vec<Vec<Scalar>>, LiteralError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    match parse_document(trimmed) {
        Ok(rows) => Ok(rows),
        Err(first) => match first_bracketed(trimmed) {
            Some(inner) if inner.len() < trimmed.len() => parse_document(inner),
            _ => Err(first),
        },
    }
}

fn parse_document(text: &str) -> Result<Vec<Vec<Scalar>>, LiteralError> {
    let mut parser = Parser::new(text);
    let value = parser.value()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("trailing characters"));
    }

    let items = match value {
        Literal::Seq(items) => items,
        Literal::Value(_) => return Err(LiteralError {
            message: "expected a list of rows".to_string(),
            offset: 0,
        }),
    };

    items
        .into_iter()
        .map(|item| match item {
            Literal::Seq(cells) => cells
                .into_iter()
                .map(|cell| match cell {
                    Literal::Value(v) => Ok(v),
                    Literal::Seq(_) => Err(LiteralError {
                        message: "nested sequence inside a row".to_string(),
                        offset: 0,
                    }),
                })
                .collect(),
            Literal::Value(v) => Ok(vec![v]),
        })
        .collect()
}

/// First `[` up to its matching `]`, ignoring brackets inside quoted strings.
fn first_bracketed(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn error(&self, message: &str) -> LiteralError {
        LiteralError {
            message: message.to_string(),
            offset: self.pos,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, want: char) -> Result<(), LiteralError> {
        self.skip_ws();
        match self.bump() {
            Some(c) if c == want => Ok(()),
            _ => Err(self.error(&format!("expected '{}'", want))),
        }
    }

    fn value(&mut self) -> Result<Literal, LiteralError> {
        self.skip_ws();
        match self.peek() {
            Some('[') => self.sequence('[', ']'),
            Some('(') => self.sequence('(', ')'),
            Some('\'') | Some('"') => Ok(Literal::Value(Scalar::Text(self.string()?))),
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() || c == '.' => {
                Ok(Literal::Value(self.number()?))
            }
            Some(c) if c.is_alphabetic() || c == '_' => Ok(Literal::Value(self.named()?)),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn sequence(&mut self, open: char, close: char) -> Result<Literal, LiteralError> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(Literal::Seq(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => return Ok(Literal::Seq(items)),
                _ => return Err(self.error(&format!("expected ',' or '{}'", close))),
            }
        }
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some(c @ ('\\' | '\'' | '"')) => out.push(c),
                    Some(c) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<Scalar, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.bump();
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' | 'e' | 'E' => is_float = true,
                '-' | '+' if matches!(self.src[..self.pos].chars().last(), Some('e' | 'E')) => {}
                _ => break,
            }
            self.bump();
        }

        let text: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();
        if !is_float {
            if let Ok(v) = text.parse::<i64>() {
                return Ok(Scalar::Int(v));
            }
        }
        text.parse::<f64>()
            .map(Scalar::Float)
            .map_err(|_| LiteralError {
                message: format!("invalid number '{}'", text),
                offset: start,
            })
    }

    fn identifier(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.')
        {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn named(&mut self) -> Result<Scalar, LiteralError> {
        let start = self.pos;
        let name = self.identifier();
        match name {
            "None" => Ok(Scalar::Null),
            "True" => Ok(Scalar::Bool(true)),
            "False" => Ok(Scalar::Bool(false)),
            "Decimal" => {
                self.expect('(')?;
                self.skip_ws();
                let value = match self.peek() {
                    Some('\'') | Some('"') => {
                        let raw = self.string()?;
                        raw.trim().parse::<f64>().map(Scalar::Float).map_err(|_| LiteralError {
                            message: format!("invalid decimal '{}'", raw),
                            offset: start,
                        })?
                    }
                    _ => match self.number()? {
                        Scalar::Int(v) => Scalar::Float(v as f64),
                        other => other,
                    },
                };
                self.expect(')')?;
                Ok(value)
            }
            "datetime.date" | "datetime.datetime" => {
                let parts = self.int_args()?;
                to_datetime(&parts).ok_or_else(|| LiteralError {
                    message: format!("invalid {} arguments", name),
                    offset: start,
                })
            }
            _ => Err(LiteralError {
                message: format!("unknown name '{}'", name),
                offset: start,
            }),
        }
    }

    fn int_args(&mut self) -> Result<Vec<i64>, LiteralError> {
        let Literal::Seq(items) = self.sequence('(', ')')? else {
            return Err(self.error("expected arguments"));
        };
        items
            .into_iter()
            .map(|item| match item {
                Literal::Value(Scalar::Int(v)) => Ok(v),
                _ => Err(self.error("expected integer argument")),
            })
            .collect()
    }
}

fn to_datetime(parts: &[i64]) -> Option<Scalar> {
    let field = |i: usize| parts.get(i).copied().unwrap_or(0);
    let date = NaiveDate::from_ymd_opt(
        i32::try_from(*parts.first()?).ok()?,
        u32::try_from(*parts.get(1)?).ok()?,
        u32::try_from(*parts.get(2)?).ok()?,
    )?;
    if parts.len() == 3 {
        return Some(Scalar::Date(date));
    }
    let ts = date.and_hms_micro_opt(
        u32::try_from(field(3)).ok()?,
        u32::try_from(field(4)).ok()?,
        u32::try_from(field(5)).ok()?,
        u32::try_from(field(6)).ok()?,
    )?;
    Some(Scalar::Timestamp(ts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tuples_with_dates_and_decimals() {
        let rows = parse_rows(
            "[(1, 'Ann', 12.5), (2, None, Decimal('3.10')), (3, \"O'Neil\", True)]",
        )
        .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec![Scalar::Int(1), Scalar::Text("Ann".into()), Scalar::Float(12.5)]);
        assert_eq!(rows[1][1], Scalar::Null);
        assert_eq!(rows[1][2], Scalar::Float(3.1));
        assert_eq!(rows[2][1], Scalar::Text("O'Neil".into()));
        assert_eq!(rows[2][2], Scalar::Bool(true));
    }

    #[test]
    fn parses_dates_and_escapes() {
        let rows = parse_rows(
            r"[('it\'s', datetime.date(2024, 3, 9), datetime.datetime(2024, 3, 9, 14, 5))]",
        )
        .unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(rows[0][0], Scalar::Text("it's".into()));
        assert_eq!(rows[0][1], Scalar::Date(date));
        assert_eq!(rows[0][2], Scalar::Timestamp(date.and_hms_opt(14, 5, 0).unwrap()));
    }

    #[test]
    fn bare_scalars_become_single_column_rows() {
        let rows = parse_rows("[42, -1.5e3]").unwrap();
        assert_eq!(rows, vec![vec![Scalar::Int(42)], vec![Scalar::Float(-1500.0)]]);
    }

    #[test]
    fn extracts_list_from_surrounding_text() {
        let rows = parse_rows("Result: [('a]b', 1)] done").unwrap();
        assert_eq!(rows, vec![vec![Scalar::Text("a]b".into()), Scalar::Int(1)]]);
    }

    #[test]
    fn empty_result_is_zero_rows() {
        assert!(parse_rows("").unwrap().is_empty());
        assert!(parse_rows("[]").unwrap().is_empty());
    }

    #[test]
    fn rejects_non_literals() {
        assert!(parse_rows("I could not answer that").is_err());
        assert!(parse_rows("[(1, 2)").is_err());
        assert!(parse_rows("[(os.system('x'),)]").is_err());
    }
}
