//! Text kernel (KPL) parsing and the kernel variable pool.
//!
//! Only the data sections, between `\begindata` and `\begintext`, are read.
//! Supported syntax: `NAME = value`, `NAME += value`, parenthesised lists
//! spanning lines, numbers with `D` or `E` exponents, single-quoted strings
//! with `''` escapes, and `@` dates (kept as text).

use std::collections::HashMap;

use thiserror::Error;

/// Syntax error in a text kernel.
#[derive(Debug, Error, PartialEq)]
#[error("line {line}: {message}")]
pub struct TextKernelError {
    pub line: usize,
    pub message: String,
}

/// A value in the kernel pool.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolValue {
    Number(f64),
    Text(String),
}

/// One `NAME = ...` or `NAME += ...` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub append: bool,
    pub values: Vec<PoolValue>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Assign,
    Append,
    Open,
    Close,
    Value(PoolValue),
}

/// Parse the data sections of a text kernel.
///
/// # Examples
///
/// ```
/// use kernel_inventory::toolkit::{parse_text_kernel, PoolValue};
///
/// let text = "KPL/LSK\n\\begindata\nDELTET/K = 1.657D-3\n\\begintext\n";
/// let parsed = parse_text_kernel(text).unwrap();
/// assert_eq!(parsed[0].name, "DELTET/K");
/// assert_eq!(parsed[0].values, vec![PoolValue::Number(1.657e-3)]);
/// ```
pub fn parse_text_kernel(text: &str) -> Result<Vec<Assignment>, TextKernelError> {
    let tokens = tokenize(text)?;
    let mut assignments = Vec::new();
    let mut iter = tokens.into_iter();

    while let Some((line, token)) = iter.next() {
        let Token::Name(name) = token else {
            return Err(syntax(line, "expected a variable name"));
        };
        let append = match iter.next() {
            Some((_, Token::Assign)) => false,
            Some((_, Token::Append)) => true,
            _ => return Err(syntax(line, format!("expected '=' or '+=' after {}", name))),
        };

        let mut values = Vec::new();
        match iter.next() {
            Some((_, Token::Value(v))) => values.push(v),
            Some((open_line, Token::Open)) => loop {
                match iter.next() {
                    Some((_, Token::Value(v))) => values.push(v),
                    Some((_, Token::Close)) => break,
                    _ => return Err(syntax(open_line, format!("unterminated list for {}", name))),
                }
            },
            _ => return Err(syntax(line, format!("missing value for {}", name))),
        }

        assignments.push(Assignment {
            name,
            append,
            values,
        });
    }

    Ok(assignments)
}

fn syntax(line: usize, message: impl Into<String>) -> TextKernelError {
    TextKernelError {
        line,
        message: message.into(),
    }
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>, TextKernelError> {
    let mut tokens = Vec::new();
    let mut in_data = false;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();
        if trimmed.starts_with("\\begindata") {
            in_data = true;
            continue;
        }
        if trimmed.starts_with("\\begintext") {
            in_data = false;
            continue;
        }
        if in_data {
            tokenize_line(raw, line_no, &mut tokens)?;
        }
    }

    Ok(tokens)
}

fn tokenize_line(
    line: &str,
    line_no: usize,
    tokens: &mut Vec<(usize, Token)>,
) -> Result<(), TextKernelError> {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() || c == ',' => i += 1,
            '(' => {
                tokens.push((line_no, Token::Open));
                i += 1;
            }
            ')' => {
                tokens.push((line_no, Token::Close));
                i += 1;
            }
            '=' => {
                tokens.push((line_no, Token::Assign));
                i += 1;
            }
            '+' if chars.get(i + 1) == Some(&'=') => {
                tokens.push((line_no, Token::Append));
                i += 2;
            }
            '\'' => {
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            value.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            value.push(ch);
                            i += 1;
                        }
                        None => return Err(syntax(line_no, "unterminated string")),
                    }
                }
                tokens.push((line_no, Token::Value(PoolValue::Text(value))));
            }
            '@' => {
                let start = i + 1;
                i = scan_word(&chars, start);
                let date: String = chars[start..i].iter().collect();
                tokens.push((line_no, Token::Value(PoolValue::Text(date))));
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                let start = i;
                i = scan_word(&chars, start);
                let word: String = chars[start..i].iter().collect();
                let number = word
                    .replace(['D', 'd'], "E")
                    .parse::<f64>()
                    .map_err(|_| syntax(line_no, format!("invalid number '{}'", word)))?;
                tokens.push((line_no, Token::Value(PoolValue::Number(number))));
            }
            _ => {
                let start = i;
                while i < chars.len()
                    && !chars[i].is_whitespace()
                    && chars[i] != '='
                    && chars[i] != '('
                    && !(chars[i] == '+' && chars.get(i + 1) == Some(&'='))
                {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                tokens.push((line_no, Token::Name(name)));
            }
        }
    }

    Ok(())
}

fn scan_word(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && !chars[i].is_whitespace() && chars[i] != ',' && chars[i] != ')' {
        i += 1;
    }
    i
}

/// Kernel variables loaded from text kernels.
#[derive(Debug, Clone, Default)]
pub struct KernelPool {
    vars: HashMap<String, Vec<PoolValue>>,
}

impl KernelPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply assignments in order: `=` replaces, `+=` appends.
    pub fn apply(&mut self, assignments: Vec<Assignment>) {
        for assignment in assignments {
            if assignment.append {
                self.vars
                    .entry(assignment.name)
                    .or_default()
                    .extend(assignment.values);
            } else {
                self.vars.insert(assignment.name, assignment.values);
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Numeric values of `name`; `None` when absent or not all numeric.
    pub fn numbers(&self, name: &str) -> Option<Vec<f64>> {
        self.vars
            .get(name)?
            .iter()
            .map(|v| match v {
                PoolValue::Number(n) => Some(*n),
                PoolValue::Text(_) => None,
            })
            .collect()
    }

    /// First numeric value of `name`.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.numbers(name)?.first().copied()
    }

    /// String values of `name`; `None` when absent or not all strings.
    pub fn strings(&self, name: &str) -> Option<Vec<String>> {
        self.vars
            .get(name)?
            .iter()
            .map(|v| match v {
                PoolValue::Text(s) => Some(s.clone()),
                PoolValue::Number(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCLK: &str = r"KPL/SCLK

Comment text outside data is ignored = (1 2 3)

\begindata
SCLK_KERNEL_ID           = ( @2009-06-18/00:00:00 )
SCLK_DATA_TYPE_85        = ( 1 )
SCLK01_TIME_SYSTEM_85    = ( 2 )
SCLK01_MODULI_85         = ( 4294967296 65536 )
SCLK01_COEFFICIENTS_85   = (
    0.0000000000000E+00  -3.1557583816000D+08  1.0000000000000E+00
    6.5536000000000E+08  -3.1557582816000D+08  1.0000000000000E+00 )
\begintext
trailing comment
";

    #[test]
    fn test_parse_sclk_kernel() {
        let parsed = parse_text_kernel(SCLK).unwrap();
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[0].name, "SCLK_KERNEL_ID");
        assert_eq!(
            parsed[0].values,
            vec![PoolValue::Text("2009-06-18/00:00:00".to_string())]
        );
        assert_eq!(parsed[4].values.len(), 6);
        assert_eq!(parsed[4].values[1], PoolValue::Number(-3.1557583816e8));
    }

    #[test]
    fn test_strings_and_append() {
        let text = "\\begindata\nPATH_VALUES = ( '/data' )\nKERNELS_TO_LOAD = ( '$A/x.tls',\n 'it''s.tf' )\nKERNELS_TO_LOAD += 'y.tsc'\n";
        let mut pool = KernelPool::new();
        pool.apply(parse_text_kernel(text).unwrap());

        assert_eq!(
            pool.strings("KERNELS_TO_LOAD").unwrap(),
            vec!["$A/x.tls", "it's.tf", "y.tsc"]
        );
        assert_eq!(pool.strings("PATH_VALUES").unwrap(), vec!["/data"]);
        assert!(pool.numbers("PATH_VALUES").is_none());
    }

    #[test]
    fn test_assign_replaces() {
        let text = "\\begindata\nA = 1\nA = ( 2, 3 )\nB+= 4\n";
        let mut pool = KernelPool::new();
        pool.apply(parse_text_kernel(text).unwrap());
        assert_eq!(pool.numbers("A").unwrap(), vec![2.0, 3.0]);
        assert_eq!(pool.number("B"), Some(4.0));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_text_kernel("\\begindata\nA = 'open\n").is_err());
        assert!(parse_text_kernel("\\begindata\nA = ( 1 2\n").is_err());
        assert!(parse_text_kernel("\\begindata\nA = 1.2.3\n").is_err());
        assert!(parse_text_kernel("\\begindata\nA B\n").is_err());
    }

    #[test]
    fn test_no_data_section() {
        assert!(parse_text_kernel("KPL/FK\nonly comments here\n")
            .unwrap()
            .is_empty());
    }
}
