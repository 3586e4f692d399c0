//! Helper filters and functions registered on every template environment.
//!
//! These complement the minijinja built-ins (`upper`, `lower`, `replace`,
//! `join`, `default`, `tojson`, `indent`, ...) with string, list, math,
//! encoding and date helpers used to build file paths and shell commands.

use std::fmt::Write as _;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, SecondsFormat, Utc};
use heck::{ToKebabCase, ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};
use minijinja::{Environment, Error, ErrorKind, Value};
use regex::Regex;
use sha2::{Digest, Sha256};

pub(crate) fn register(env: &mut Environment<'static>) {
    // strings
    env.add_filter("trim_prefix", trim_prefix);
    env.add_filter("trim_suffix", trim_suffix);
    env.add_filter("contains", contains);
    env.add_filter("has_prefix", has_prefix);
    env.add_filter("has_suffix", has_suffix);
    env.add_filter("repeat", repeat);
    env.add_filter("quote", quote);
    env.add_filter("squote", squote);
    env.add_filter("shell_quote", shell_quote);
    env.add_filter("nindent", nindent);
    env.add_filter("regex_replace", regex_replace);
    env.add_filter("regex_match", regex_match);
    env.add_filter("snake_case", snake_case);
    env.add_filter("kebab_case", kebab_case);
    env.add_filter("camel_case", camel_case);
    env.add_filter("pascal_case", pascal_case);
    env.add_filter("split", split);

    // lists
    env.add_filter("compact", compact);
    env.add_filter("has", has);

    // encoding
    env.add_filter("b64enc", b64enc);
    env.add_filter("b64dec", b64dec);
    env.add_filter("sha256sum", sha256sum);

    // math
    env.add_function("add", add);
    env.add_function("sub", sub);
    env.add_function("mul", mul);
    env.add_function("div", div);
    env.add_function("mod", modulo);
    env.add_function("max", max);
    env.add_function("min", min);

    // dates and environment
    env.add_function("now", now);
    env.add_function("unix_epoch", unix_epoch);
    env.add_function("date", date);
    env.add_function("env", env_var);
}

fn trim_prefix(value: &str, prefix: &str) -> String {
    value.strip_prefix(prefix).unwrap_or(value).to_string()
}

fn trim_suffix(value: &str, suffix: &str) -> String {
    value.strip_suffix(suffix).unwrap_or(value).to_string()
}

fn contains(value: &str, needle: &str) -> bool {
    value.contains(needle)
}

fn has_prefix(value: &str, prefix: &str) -> bool {
    value.starts_with(prefix)
}

fn has_suffix(value: &str, suffix: &str) -> bool {
    value.ends_with(suffix)
}

/// Upper bound on the text a single `repeat` or `nindent` call may produce.
const MAX_REPEAT_BYTES: usize = 16 * 1024 * 1024;

fn repeated(op: &str, value: &str, count: usize) -> Result<String, Error> {
    match value.len().checked_mul(count) {
        Some(len) if len <= MAX_REPEAT_BYTES => Ok(value.repeat(count)),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("{op}: {count} copies exceed {MAX_REPEAT_BYTES} bytes"),
        )),
    }
}

fn repeat(value: &str, count: usize) -> Result<String, Error> {
    repeated("repeat", value, count)
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn squote(value: &str) -> String {
    format!("'{value}'")
}

/// POSIX single-quote escaping, leaving plain words untouched.
fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn nindent(value: &str, width: usize) -> Result<String, Error> {
    let pad = repeated("nindent", " ", width)?;
    let mut out = String::with_capacity(value.len() + width + 1);
    for line in value.lines() {
        out.push('\n');
        if !line.is_empty() {
            out.push_str(&pad);
        }
        out.push_str(line);
    }
    Ok(out)
}

fn compile_regex(pattern: &str) -> Result<Regex, Error> {
    Regex::new(pattern).map_err(|err| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid regex {pattern:?}"),
        )
        .with_source(err)
    })
}

fn regex_replace(value: &str, pattern: &str, replacement: &str) -> Result<String, Error> {
    let re = compile_regex(pattern)?;
    Ok(re.replace_all(value, replacement).into_owned())
}

fn regex_match(value: &str, pattern: &str) -> Result<bool, Error> {
    Ok(compile_regex(pattern)?.is_match(value))
}

fn snake_case(value: &str) -> String {
    value.to_snake_case()
}

fn kebab_case(value: &str) -> String {
    value.to_kebab_case()
}

fn camel_case(value: &str) -> String {
    value.to_lower_camel_case()
}

fn pascal_case(value: &str) -> String {
    value.to_upper_camel_case()
}

/// Split on `sep`, or on whitespace when no separator is given.
fn split(value: &str, sep: Option<&str>) -> Vec<String> {
    match sep {
        Some(sep) if !sep.is_empty() => value.split(sep).map(str::to_string).collect(),
        _ => value.split_whitespace().map(str::to_string).collect(),
    }
}

fn compact(value: Value) -> Result<Value, Error> {
    let items: Vec<Value> = value.try_iter()?.filter(Value::is_true).collect();
    Ok(Value::from(items))
}

fn has(value: Value, needle: Value) -> Result<bool, Error> {
    Ok(value.try_iter()?.any(|item| item == needle))
}

fn b64enc(value: &str) -> String {
    BASE64.encode(value.as_bytes())
}

fn b64dec(value: &str) -> Result<String, Error> {
    let bytes = BASE64.decode(value.trim()).map_err(|err| {
        Error::new(ErrorKind::InvalidOperation, "invalid base64 input").with_source(err)
    })?;
    String::from_utf8(bytes).map_err(|err| {
        Error::new(ErrorKind::InvalidOperation, "base64 input is not utf-8").with_source(err)
    })
}

fn sha256sum(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

fn number(op: &str, value: &Value) -> Result<f64, Error> {
    f64::try_from(value.clone()).map_err(|_| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("{op}: expected a number, got {value}"),
        )
    })
}

fn integer(value: &Value) -> Option<i64> {
    i64::try_from(value.clone()).ok()
}

fn arithmetic(
    op: &str,
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, Error> {
    if let (Some(x), Some(y)) = (integer(a), integer(b)) {
        if let Some(result) = int_op(x, y) {
            return Ok(Value::from(result));
        }
    }
    Ok(Value::from(float_op(number(op, a)?, number(op, b)?)))
}

fn ensure_nonzero(op: &str, divisor: &Value) -> Result<(), Error> {
    if number(op, divisor)? == 0.0 {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("{op}: division by zero"),
        ));
    }
    Ok(())
}

fn add(a: Value, b: Value) -> Result<Value, Error> {
    arithmetic("add", &a, &b, i64::checked_add, |x, y| x + y)
}

fn sub(a: Value, b: Value) -> Result<Value, Error> {
    arithmetic("sub", &a, &b, i64::checked_sub, |x, y| x - y)
}

fn mul(a: Value, b: Value) -> Result<Value, Error> {
    arithmetic("mul", &a, &b, i64::checked_mul, |x, y| x * y)
}

fn div(a: Value, b: Value) -> Result<Value, Error> {
    ensure_nonzero("div", &b)?;
    arithmetic("div", &a, &b, i64::checked_div, |x, y| x / y)
}

fn modulo(a: Value, b: Value) -> Result<Value, Error> {
    ensure_nonzero("mod", &b)?;
    arithmetic("mod", &a, &b, i64::checked_rem, |x, y| x % y)
}

fn max(a: Value, b: Value) -> Result<Value, Error> {
    Ok(if number("max", &b)? > number("max", &a)? { b } else { a })
}

fn min(a: Value, b: Value) -> Result<Value, Error> {
    Ok(if number("min", &b)? < number("min", &a)? { b } else { a })
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn unix_epoch() -> i64 {
    Utc::now().timestamp()
}

/// Format a timestamp with a strftime pattern. Accepts unix seconds or
/// RFC 3339 text; defaults to the current time.
fn date(format: &str, value: Option<Value>) -> Result<String, Error> {
    let moment = match value {
        None => Utc::now(),
        Some(value) => parse_moment(&value)?,
    };
    let mut out = String::new();
    write!(out, "{}", moment.format(format)).map_err(|_| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid date format {format:?}"),
        )
    })?;
    Ok(out)
}

fn parse_moment(value: &Value) -> Result<DateTime<Utc>, Error> {
    if let Some(text) = value.as_str() {
        return DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|err| {
                Error::new(ErrorKind::InvalidOperation, format!("invalid date {text:?}"))
                    .with_source(err)
            });
    }
    let secs = integer(value).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("date: expected unix seconds or RFC 3339 text, got {value}"),
        )
    })?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("date: timestamp {secs} out of range"),
        )
    })
}

fn env_var(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    fn render(source: &str) -> String {
        let mut env = Environment::new();
        register(&mut env);
        env.render_str(source, context! { name => "My Service", items => vec!["a", "", "b"] })
            .expect("render")
    }

    #[test]
    fn string_helpers() {
        assert_eq!(render("{{ name | kebab_case }}"), "my-service");
        assert_eq!(render("{{ name | snake_case }}"), "my_service");
        assert_eq!(render("{{ name | pascal_case }}"), "MyService");
        assert_eq!(render("{{ 'v1.2' | trim_prefix('v') }}"), "1.2");
        assert_eq!(render("{{ 'app.tar.gz' | trim_suffix('.gz') }}"), "app.tar");
        assert_eq!(render("{{ name | shell_quote }}"), "'My Service'");
        assert_eq!(render("{{ 'plain-word' | shell_quote }}"), "plain-word");
        assert_eq!(render("{{ \"it's\" | shell_quote }}"), "'it'\\''s'");
        assert_eq!(render("{{ 'a-b-c' | regex_replace('-', '_') }}"), "a_b_c");
        assert_eq!(render("{{ 'a,b' | split(',') | join('|') }}"), "a|b");
    }

    #[test]
    fn list_helpers() {
        assert_eq!(render("{{ items | compact | join(',') }}"), "a,b");
        assert_eq!(render("{{ items | has('b') }}"), "true");
    }

    #[test]
    fn math_helpers_keep_integers() {
        assert_eq!(render("{{ add(1, 2) }}"), "3");
        assert_eq!(render("{{ sub(5, 7) }}"), "-2");
        assert_eq!(render("{{ mul(2, 1.5) }}"), "3.0");
        assert_eq!(render("{{ div(7, 2) }}"), "3");
        assert_eq!(render("{{ mod(7, 3) }}"), "1");
        assert_eq!(render("{{ max(2, 9) }}/{{ min(2, 9) }}"), "9/2");
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut env = Environment::new();
        register(&mut env);
        let err = env.render_str("{{ div(1, 0) }}", ()).expect_err("div by zero");
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn oversized_repeat_is_an_error() {
        let mut env = Environment::new();
        register(&mut env);
        let err = env
            .render_str("{{ 'ab' | repeat(9223372036854775807) }}", ())
            .expect_err("too large");
        assert!(err.to_string().contains("repeat: "), "{err}");
        let err = env
            .render_str("{{ 'x' | nindent(9223372036854775807) }}", ())
            .expect_err("too large");
        assert!(err.to_string().contains("nindent: "), "{err}");
        assert_eq!(render("{{ 'ab' | repeat(3) }}"), "ababab");
    }

    #[test]
    fn encoding_helpers() {
        assert_eq!(render("{{ 'hi' | b64enc }}"), "aGk=");
        assert_eq!(render("{{ 'aGk=' | b64dec }}"), "hi");
        assert_eq!(
            render("{{ 'abc' | sha256sum }}"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn date_helpers() {
        assert_eq!(render("{{ date('%Y-%m-%d', 0) }}"), "1970-01-01");
        assert_eq!(
            render("{{ date('%H:%M', '2024-05-06T07:08:09Z') }}"),
            "07:08"
        );
        assert!(render("{{ now() }}").ends_with('Z'));
    }
}
