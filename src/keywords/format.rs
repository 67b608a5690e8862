//! The `format` keyword.
//!
//! Always annotates the format name. Asserts only when the options require
//! format validation or the dialect enables a format-assertion vocabulary.
//! Unknown formats and non-string instances pass.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use super::{expect_string, shape, vocab, Simple};
use crate::compiler::CompileContext;
use crate::error::CompileError;
use crate::keyword::{Keyword, KeywordConstraint};

pub fn format(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_string(payload)?;
    Ok(Simple::boxed("format", payload, build_format))
}

fn build_format(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let name = shape(ctx, "format", expect_string(payload))?.to_string();
    let asserting = vocab::FORMAT_ASSERTION
        .iter()
        .any(|id| ctx.vocabulary_active(id));
    let check = checker(&name);
    Ok(KeywordConstraint::new("format", move |eval| {
        let enforce = asserting || eval.options().require_format_validation;
        if let (true, Some(check), Some(text)) = (enforce, check, eval.instance().as_str()) {
            if !check(text) {
                return eval.fail("format", [("format", Value::String(name.clone()))]);
            }
        }
        eval.annotate(Value::String(name.clone()));
    }))
}

/// The checker for a known format name.
pub fn checker(name: &str) -> Option<fn(&str) -> bool> {
    let check: fn(&str) -> bool = match name {
        "date-time" => is_date_time,
        "date" => is_date,
        "time" => is_time,
        "duration" => is_duration,
        "email" => is_email,
        "hostname" => is_hostname,
        "ipv4" => is_ipv4,
        "ipv6" => is_ipv6,
        "uri" => is_uri,
        "uri-reference" => is_uri_reference,
        "uuid" => is_uuid,
        "regex" => is_regex,
        "json-pointer" => is_json_pointer,
        _ => return None,
    };
    Some(check)
}

fn is_date_time(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
}

fn is_date(s: &str) -> bool {
    s.len() == 10
        && s.bytes()
            .enumerate()
            .all(|(i, b)| if i == 4 || i == 7 { b == b'-' } else { b.is_ascii_digit() })
        && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// RFC 3339 `full-time`; the offset is required.
fn is_time(s: &str) -> bool {
    s.is_ascii() && DateTime::parse_from_rfc3339(&format!("1970-01-01T{s}")).is_ok()
}

/// ISO 8601 duration as profiled by RFC 3339 appendix A: `P1Y2M3DT4H5M6S`
/// or `P2W`. Weeks do not combine with other units.
fn is_duration(s: &str) -> bool {
    let Some(rest) = s.strip_prefix('P') else {
        return false;
    };
    if rest.is_empty() {
        return false;
    }
    let (date, time) = match rest.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };
    if time == Some("") {
        return false;
    }
    if date.ends_with('W') {
        return time.is_none() && units(date, &['W']);
    }
    units(date, &['Y', 'M', 'D']) && time.map_or(true, |time| units(time, &['H', 'M', 'S']))
}

/// `<digits><unit>` pairs with units in the given order, each at most once.
fn units(mut s: &str, allowed: &[char]) -> bool {
    let mut next = 0;
    while !s.is_empty() {
        let digits = s.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return false;
        }
        let Some(unit) = s[digits..].chars().next() else {
            return false;
        };
        match allowed[next..].iter().position(|u| *u == unit) {
            Some(offset) => next += offset + 1,
            None => return false,
        }
        s = &s[digits + unit.len_utf8()..];
    }
    true
}

fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.rsplit_once('@') else {
        return false;
    };
    let local_ok = !local.is_empty()
        && local.len() <= 64
        && !local.starts_with('.')
        && !local.ends_with('.')
        && !local.contains("..")
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~.".contains(c));
    let domain_ok = match domain.strip_prefix('[').and_then(|d| d.strip_suffix(']')) {
        Some(literal) => match literal.strip_prefix("IPv6:") {
            Some(v6) => is_ipv6(v6),
            None => is_ipv4(literal),
        },
        None => is_hostname(domain),
    };
    local_ok && domain_ok
}

fn is_hostname(s: &str) -> bool {
    let s = s.strip_suffix('.').unwrap_or(s);
    !s.is_empty()
        && s.len() <= 253
        && s.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

fn is_ipv4(s: &str) -> bool {
    Ipv4Addr::from_str(s).is_ok()
}

fn is_ipv6(s: &str) -> bool {
    Ipv6Addr::from_str(s).is_ok()
}

/// The URL parser escapes what it does not accept, so reject the characters
/// it would otherwise quietly fix up.
fn plain_uri_text(s: &str) -> bool {
    s.chars()
        .all(|c| !c.is_whitespace() && !c.is_control() && !matches!(c, '\\' | '"' | '<' | '>' | '{' | '}' | '^' | '`' | '|'))
}

fn is_uri(s: &str) -> bool {
    plain_uri_text(s) && Url::parse(s).is_ok()
}

fn is_uri_reference(s: &str) -> bool {
    if !plain_uri_text(s) {
        return false;
    }
    Url::parse("https://uri-reference.invalid/")
        .map(|base| base.join(s).is_ok())
        .unwrap_or(false)
}

/// Hyphenated form only.
fn is_uuid(s: &str) -> bool {
    s.len() == 36 && Uuid::parse_str(s).is_ok()
}

fn is_regex(s: &str) -> bool {
    Regex::new(s).is_ok()
}

fn is_json_pointer(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }
    if !s.starts_with('/') {
        return false;
    }
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '~' && !matches!(chars.next(), Some('0' | '1')) {
            return false;
        }
    }
    true
}
