//! Prepare-style placeholder substitution: `%d`, `%f` and `%s` in a template are replaced,
//! positionally, by escaped literals. `%%` is a literal percent sign.
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::one_of,
    combinator::map,
    multi::many0,
    sequence::preceded,
    IResult,
};
use std::fmt;

/// An argument bound to a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for SqlArg {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for SqlArg {
    fn from(i: i32) -> Self {
        Self::Int(i.into())
    }
}

impl From<bool> for SqlArg {
    fn from(b: bool) -> Self {
        Self::Int(b as i64)
    }
}

impl From<f64> for SqlArg {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for SqlArg {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for SqlArg {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Substitutes arguments into a parameterized predicate. Implemented by the persistence layer,
/// which knows how its database quotes values.
pub trait Prepare {
    type Error: std::error::Error + Clone + Send + Sync + 'static;

    fn prepare(&self, template: &str, args: &[SqlArg]) -> Result<String, Self::Error>;
}

/// Why a template couldn't be prepared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareError {
    pub template: String,
    pub reason: String,
}

impl fmt::Display for PrepareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "couldn't prepare `{}`: {}", self.template, self.reason)
    }
}

impl std::error::Error for PrepareError {}

/// MySQL-flavoured preparer: strings are single-quoted with backslash escapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlPrepare;

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Literal(&'a str),
    Percent,
    Placeholder(char),
}

fn token(input: &str) -> IResult<&str, Token<'_>> {
    alt((
        map(tag("%%"), |_| Token::Percent),
        map(preceded(tag("%"), one_of("dfs")), Token::Placeholder),
        map(is_not("%"), Token::Literal),
    ))(input)
}

fn tokenize(template: &str) -> Result<Vec<Token<'_>>, String> {
    match many0(token)(template) {
        Ok(("", tokens)) => Ok(tokens),
        Ok((rest, _)) => Err(format!("unsupported placeholder at `{}`", rest)),
        Err(e) => Err(format!("{:?}", e)),
    }
}

impl Prepare for SqlPrepare {
    type Error = PrepareError;

    fn prepare(&self, template: &str, args: &[SqlArg]) -> Result<String, PrepareError> {
        let fail = |reason: String| PrepareError {
            template: template.to_owned(),
            reason,
        };
        let tokens = tokenize(template).map_err(fail)?;
        let mut args = args.iter();
        let mut out = String::with_capacity(template.len());
        for token in tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Percent => out.push('%'),
                Token::Placeholder(kind) => {
                    let arg = args
                        .next()
                        .ok_or_else(|| fail("not enough arguments".to_owned()))?;
                    out.push_str(&format_arg(kind, arg).map_err(fail)?);
                }
            }
        }
        if args.next().is_some() {
            return Err(fail("too many arguments".to_owned()));
        }
        Ok(out)
    }
}

fn format_arg(kind: char, arg: &SqlArg) -> Result<String, String> {
    match (kind, arg) {
        ('d', SqlArg::Int(i)) => Ok(i.to_string()),
        ('d', SqlArg::Float(f)) => Ok((f.trunc() as i64).to_string()),
        ('d', SqlArg::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(|i| i.to_string())
            .map_err(|_| format!("`{}` is not an integer", s)),
        ('f', SqlArg::Int(i)) => Ok((*i as f64).to_string()),
        ('f', SqlArg::Float(f)) if f.is_finite() => Ok(f.to_string()),
        ('f', SqlArg::Float(f)) => Err(format!("{} is not a finite number", f)),
        ('f', SqlArg::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(|f| f.to_string())
            .map_err(|_| format!("`{}` is not a number", s)),
        (_, SqlArg::Int(i)) => Ok(quote(&i.to_string())),
        (_, SqlArg::Float(f)) => Ok(quote(&f.to_string())),
        (_, SqlArg::Text(s)) => Ok(quote(s)),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepare(template: &str, args: &[SqlArg]) -> Result<String, PrepareError> {
        SqlPrepare.prepare(template, args)
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("a = %d AND b LIKE '%%x'").unwrap(),
            vec![
                Token::Literal("a = "),
                Token::Placeholder('d'),
                Token::Literal(" AND b LIKE '"),
                Token::Percent,
                Token::Literal("x'"),
            ]
        );
        assert!(tokenize("100%").is_err());
        assert!(tokenize("%q").is_err());
    }

    #[test]
    fn test_positional_substitution() {
        let sql = prepare(
            "`ht`.`hid` IN (%d, %d) AND `author` = %s",
            &[3.into(), "7".into(), "o'neil".into()],
        )
        .unwrap();
        assert_eq!(sql, "`ht`.`hid` IN (3, 7) AND `author` = 'o\\'neil'");
    }

    #[test]
    fn test_no_placeholders() {
        assert_eq!(prepare("x IS NULL", &[]).unwrap(), "x IS NULL");
    }

    #[test]
    fn test_floats_and_flags() {
        assert_eq!(prepare("%f", &[1.5.into()]).unwrap(), "1.5");
        assert_eq!(prepare("%d", &[true.into()]).unwrap(), "1");
        assert_eq!(prepare("%d", &[2.9.into()]).unwrap(), "2");
        assert!(prepare("%f", &[f64::NAN.into()]).is_err());
    }

    #[test]
    fn test_argument_count_must_match() {
        let err = prepare("%d = %d", &[1.into()]).unwrap_err();
        assert_eq!(err.reason, "not enough arguments");
        let err = prepare("%d", &[1.into(), 2.into()]).unwrap_err();
        assert_eq!(err.reason, "too many arguments");
        assert!(prepare("%d", &["seven".into()]).is_err());
    }
}
