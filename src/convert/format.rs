//! Computed fields rendered from a printf-style template.
//!
//! Supported placeholders: `%s`, `%d`, `%f` and `%%`, each optionally with an
//! explicit `N$` argument position, `-` (left align) and `0` (zero pad) flags,
//! a width and a `.P` precision.
//!
//! Text read by `%d` and `%f` contributes its leading numeric part, so `"12abc"`
//! renders as `12`. `%s` prints floats with 14 significant digits, so
//! `0.1 + 0.2` renders as `0.3`.

use std::fmt::Write;

use crate::convert::RecordStage;
use crate::error::{Error, Result};
use crate::value::{Identity, Record, Value};

const DEFAULT_FLOAT_PRECISION: usize = 6;
/// Significant digits of a float rendered by `%s`
const DISPLAY_FLOAT_DIGITS: i32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    Str,
    Int,
    Float,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder {
    /// Zero-based index into the source values
    arg: usize,
    left: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: Conversion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Placeholder(Placeholder),
}

/// A parsed format template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    pieces: Vec<Piece>,
}

impl Template {
    /// Parse a template
    pub fn parse(source: &str) -> Result<Self> {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut next_arg = 0;
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            if chars.peek() == Some(&'%') {
                chars.next();
                literal.push('%');
                continue;
            }

            let mut directive = String::new();
            let conversion = loop {
                match chars.next() {
                    Some('s') => break Conversion::Str,
                    Some('d') => break Conversion::Int,
                    Some('f' | 'F') => break Conversion::Float,
                    Some(c @ ('0'..='9' | '$' | '.' | '-')) => directive.push(c),
                    Some(other) => {
                        return Err(Error::InvalidConfig(format!(
                            "unsupported conversion '%{directive}{other}' in template '{source}'"
                        )));
                    }
                    None => {
                        return Err(Error::InvalidConfig(format!(
                            "unterminated placeholder in template '{source}'"
                        )));
                    }
                }
            };

            if !literal.is_empty() {
                pieces.push(Piece::Literal(std::mem::take(&mut literal)));
            }
            let placeholder = parse_directive(&directive, conversion, &mut next_arg)
                .ok_or_else(|| {
                    Error::InvalidConfig(format!("malformed placeholder '%{directive}' in template '{source}'"))
                })?;
            pieces.push(Piece::Placeholder(placeholder));
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            pieces,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Number of source values the template consumes
    #[must_use]
    pub fn arity(&self) -> usize {
        self.pieces
            .iter()
            .filter_map(|piece| match piece {
                Piece::Placeholder(p) => Some(p.arg + 1),
                Piece::Literal(_) => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Render the template with positional values.
    ///
    /// Callers guarantee `values.len() >= self.arity()`; missing values render
    /// as empty.
    #[must_use]
    pub fn render(&self, values: &[&Value]) -> String {
        let null = Value::Null;
        let mut out = String::with_capacity(self.source.len());
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Placeholder(p) => {
                    let value = values.get(p.arg).copied().unwrap_or(&null);
                    render_placeholder(&mut out, p, value);
                }
            }
        }
        out
    }
}

/// `[N$][-][0][width][.precision]`
fn parse_directive(directive: &str, conversion: Conversion, next_arg: &mut usize) -> Option<Placeholder> {
    let (arg, rest) = match directive.split_once('$') {
        Some((position, rest)) => {
            let position: usize = position.parse().ok()?;
            (position.checked_sub(1)?, rest)
        }
        None => {
            let arg = *next_arg;
            *next_arg += 1;
            (arg, directive)
        }
    };

    let mut rest = rest;
    let mut left = false;
    let mut zero = false;
    loop {
        if let Some(stripped) = rest.strip_prefix('-') {
            left = true;
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('0') {
            zero = true;
            rest = stripped;
        } else {
            break;
        }
    }

    let (width, precision) = match rest.split_once('.') {
        Some((width, precision)) => (width, Some(precision.parse().ok()?)),
        None => (rest, None),
    };
    let width = if width.is_empty() {
        None
    } else {
        Some(width.parse().ok()?)
    };

    Some(Placeholder {
        arg,
        left,
        zero,
        width,
        precision,
        conversion,
    })
}

/// Longest leading part of `s` that reads as a number: sign, digits, fraction
/// and exponent. Leading whitespace is skipped; empty when nothing numeric leads.
fn numeric_prefix(s: &str) -> &str {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let digits = |from: usize| {
        bytes
            .get(from..)
            .map_or(0, |rest| rest.iter().take_while(|b| b.is_ascii_digit()).count())
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_digits = digits(end);
    end += int_digits;
    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = digits(end + 1);
        if int_digits + frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits + frac_digits == 0 {
        return "";
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_digits = digits(exp);
        if exp_digits > 0 {
            end = exp + exp_digits;
        }
    }
    &s[..end]
}

#[allow(clippy::cast_possible_truncation)]
fn as_int(value: &Value) -> i64 {
    match value {
        Value::Int(i) => *i,
        Value::Bool(b) => i64::from(*b),
        Value::Float(x) => *x as i64,
        Value::Text(s) => {
            let number = numeric_prefix(s);
            number
                .parse()
                .ok()
                .or_else(|| number.parse::<f64>().ok().map(|x| x as i64))
                .unwrap_or(0)
        }
        Value::Ref(r) => match r.id {
            Identity::Int(i) => i,
            Identity::Text(_) => 0,
        },
        Value::Null | Value::Date(_) | Value::Timestamp(_) => 0,
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_float(value: &Value) -> f64 {
    match value {
        Value::Float(x) => *x,
        Value::Text(s) => numeric_prefix(s).parse().unwrap_or(0.0),
        other => as_int(other) as f64,
    }
}

/// Float text for `%s`: 14 significant digits without trailing zeros, switching
/// to `1.0E+20` notation for very large or small magnitudes
fn display_float(x: f64) -> String {
    if x.is_nan() {
        return "NAN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let digits = (DISPLAY_FLOAT_DIGITS - 1).unsigned_abs() as usize;
    let scientific = format!("{x:.digits$e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= DISPLAY_FLOAT_DIGITS {
        let mantissa = trim_fraction(mantissa);
        let mantissa = if mantissa.contains('.') {
            mantissa.to_string()
        } else {
            format!("{mantissa}.0")
        };
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}E{sign}{}", exponent.unsigned_abs())
    } else {
        let decimals = (DISPLAY_FLOAT_DIGITS - 1 - exponent).max(0).unsigned_abs() as usize;
        trim_fraction(&format!("{x:.decimals$}")).to_string()
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

fn render_placeholder(out: &mut String, p: &Placeholder, value: &Value) {
    let width = p.width.unwrap_or(0);
    let numeric_zero_pad = p.zero && !p.left;
    let _ = match p.conversion {
        Conversion::Int if numeric_zero_pad => write!(out, "{:0width$}", as_int(value)),
        Conversion::Float if numeric_zero_pad => {
            let precision = p.precision.unwrap_or(DEFAULT_FLOAT_PRECISION);
            write!(out, "{:0width$.precision$}", as_float(value))
        }
        Conversion::Int => pad(out, &as_int(value).to_string(), width, p.left),
        Conversion::Float => {
            let precision = p.precision.unwrap_or(DEFAULT_FLOAT_PRECISION);
            pad(out, &format!("{:.precision$}", as_float(value)), width, p.left)
        }
        Conversion::Str => {
            let text = match value {
                Value::Float(x) => display_float(*x),
                other => other.to_string(),
            };
            let text = match p.precision {
                Some(max) => text.chars().take(max).collect(),
                None => text,
            };
            if p.zero && !p.left {
                write!(out, "{text:0>width$}")
            } else {
                pad(out, &text, width, p.left)
            }
        }
    };
}

fn pad(out: &mut String, text: &str, width: usize, left: bool) -> std::fmt::Result {
    if left {
        write!(out, "{text:<width$}")
    } else {
        write!(out, "{text:>width$}")
    }
}

/// Pipeline stage computing one field from a template and other fields
#[derive(Debug, Clone)]
pub struct FormatField {
    target: String,
    template: Template,
    sources: Vec<String>,
}

impl FormatField {
    /// Build the stage, validating the template against the source list
    pub fn new<S: Into<String>>(
        target: impl Into<String>,
        template: &str,
        sources: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        let template = Template::parse(template)?;
        let sources: Vec<String> = sources.into_iter().map(Into::into).collect();
        if template.arity() > sources.len() {
            return Err(Error::InvalidConfig(format!(
                "template '{}' uses {} values but only {} source fields are configured",
                template.as_str(),
                template.arity(),
                sources.len()
            )));
        }
        Ok(Self {
            target: target.into(),
            template,
            sources,
        })
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Compute the target value, or `None` when the record already holds one
    pub fn compute(&self, record: &Record) -> Result<Option<String>> {
        if record.get(&self.target).is_some_and(|value| !value.is_empty()) {
            return Ok(None);
        }
        let values = self
            .sources
            .iter()
            .map(|source| {
                record
                    .get(source)
                    .filter(|value| !value.is_null())
                    .ok_or_else(|| Error::missing_field(source.as_str()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(self.template.render(&values)))
    }
}

impl RecordStage for FormatField {
    fn name(&self) -> &str {
        "format"
    }

    fn apply(&self, mut record: Record) -> Result<Record> {
        if let Some(value) = self.compute(&record)? {
            record.insert(self.target.as_str(), value);
        }
        Ok(record)
    }
}
