//! Proxy string form.
//!
//! ```text
//! identity [-f facet] [-t|-o|-O|-d|-D] [-s] [-e X.Y] [-p X.Y] [:endpoint[:endpoint...] | @ adapter]
//! ```
//!
//! Tokens containing whitespace, `:`, `@`, `"` or `\` are written in double
//! quotes, with `"` and `\` escaped by a backslash.

use super::{
    Addressing, Endpoint, Identity, InvocationMode, ProtocolVersion, Reference,
    ReferenceDefaults, ReferenceError,
};
use std::fmt::{self, Write};
use std::str::FromStr;

/// Splits `input` on whitespace, keeping double-quoted sections together.
///
/// Inside quotes `\"` and `\\` stand for `"` and `\`; other backslashes are kept.
pub(crate) fn tokenize(input: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut quoted = false;

    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' if quoted => match chars.next() {
                Some(escaped @ ('"' | '\\')) => current.push(escaped),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => return Err("unterminated quote".into()),
            },
            '"' => {
                quoted = !quoted;
                started = true;
            }
            c if c.is_whitespace() && !quoted => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }

    if quoted {
        return Err("unterminated quote".into());
    }
    if started {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Takes the argument following `option`.
pub(crate) fn option_value(
    tokens: &mut impl Iterator<Item = String>,
    option: &str,
) -> Result<String, String> {
    tokens
        .next()
        .ok_or_else(|| format!("missing argument for `{option}`"))
}

pub(crate) fn needs_quotes(value: &str) -> bool {
    value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, ':' | '@' | '"' | '\\'))
}

/// Writes `value` in double quotes, escaping `"` and `\`.
pub(crate) fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in value.chars() {
        if c == '"' || c == '\\' {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    f.write_char('"')
}

/// Position of the first of `targets` that is not inside double quotes.
fn find_unquoted(input: &str, targets: &[char]) -> Option<(usize, char)> {
    let mut quoted = false;
    let mut chars = input.char_indices();
    while let Some((index, c)) = chars.next() {
        if quoted && c == '\\' {
            chars.next();
        } else if c == '"' {
            quoted = !quoted;
        } else if !quoted && targets.contains(&c) {
            return Some((index, c));
        }
    }
    None
}

fn split_unquoted(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = input;
    while let Some((index, _)) = find_unquoted(rest, &[separator]) {
        parts.push(&rest[..index]);
        rest = &rest[index + separator.len_utf8()..];
    }
    parts.push(rest);
    parts
}

/// Parses a proxy string, taking unspecified settings from `defaults`.
pub fn parse_reference(
    input: &str,
    defaults: &ReferenceDefaults,
) -> Result<Reference, ReferenceError> {
    let trimmed = input.trim();
    let malformed = |reason: String| ReferenceError::MalformedProxy {
        input: trimmed.to_owned(),
        reason,
    };

    if trimmed.is_empty() {
        return Err(malformed("empty proxy string".into()));
    }

    let (head, address) = match find_unquoted(trimmed, &[':', '@']) {
        Some((index, separator)) => (&trimmed[..index], Some((separator, &trimmed[index + 1..]))),
        None => (trimmed, None),
    };

    let mut tokens = tokenize(head).map_err(malformed)?.into_iter();
    let identity: Identity = tokens
        .next()
        .ok_or_else(|| malformed("missing identity".into()))?
        .parse()?;

    let mut facet = String::new();
    let mut mode = InvocationMode::Twoway;
    let mut secure = false;
    let mut encoding = defaults.encoding;
    let mut protocol = ProtocolVersion::default();

    while let Some(option) = tokens.next() {
        if let Some(flag) = InvocationMode::from_flag(&option) {
            mode = flag;
            continue;
        }
        match option.as_str() {
            "-f" => facet = option_value(&mut tokens, "-f").map_err(malformed)?,
            "-s" => secure = true,
            "-e" => encoding = option_value(&mut tokens, "-e").map_err(malformed)?.parse()?,
            "-p" => protocol = option_value(&mut tokens, "-p").map_err(malformed)?.parse()?,
            other => return Err(malformed(format!("unknown option `{other}`"))),
        }
    }

    let addressing = match address {
        None => Addressing::Indirect(String::new()),
        Some((':', endpoints)) => {
            let endpoints = split_unquoted(endpoints, ':')
                .into_iter()
                .filter(|part| !part.trim().is_empty())
                .map(Endpoint::from_str)
                .collect::<Result<Vec<_>, _>>()?;
            if endpoints.is_empty() {
                return Err(malformed("missing endpoints after `:`".into()));
            }
            Addressing::Direct(endpoints)
        }
        Some((_, adapter)) => {
            let mut adapter = tokenize(adapter).map_err(malformed)?;
            if adapter.len() != 1 || adapter[0].is_empty() {
                return Err(malformed("expected a single adapter id after `@`".into()));
            }
            Addressing::Indirect(adapter.remove(0))
        }
    };

    let mut reference = Reference::with_defaults(identity, addressing, defaults)?;
    reference.facet = facet;
    reference.mode = mode;
    reference.secure = secure;
    reference.encoding = encoding;
    reference.protocol = protocol;
    Ok(reference)
}

fn write_token(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    if needs_quotes(value) || value.starts_with('-') {
        write_quoted(f, value)
    } else {
        write!(f, "{value}")
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_token(f, &self.identity.to_string())?;
        if !self.facet.is_empty() {
            write!(f, " -f ")?;
            write_token(f, &self.facet)?;
        }
        write!(f, " {}", self.mode.flag())?;
        if self.secure {
            write!(f, " -s")?;
        }
        write!(f, " -e {}", self.encoding)?;
        if self.protocol != ProtocolVersion::default() {
            write!(f, " -p {}", self.protocol)?;
        }
        match &self.addressing {
            Addressing::Direct(endpoints) => {
                for endpoint in endpoints {
                    write!(f, ":{endpoint}")?;
                }
            }
            Addressing::Indirect(adapter_id) if !adapter_id.is_empty() => {
                write!(f, " @ ")?;
                write_token(f, adapter_id)?;
            }
            // Well-known and fixed references have no address part.
            Addressing::Indirect(_) | Addressing::Fixed(_) => {}
        }
        Ok(())
    }
}

impl FromStr for Reference {
    type Err = ReferenceError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse_reference(input, &ReferenceDefaults::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{ENCODING_1_0, ENCODING_1_1};

    #[test]
    fn test_tokenize_quotes() {
        assert_eq!(
            tokenize(r#"a "b c"  d"#).unwrap(),
            vec!["a".to_string(), "b c".into(), "d".into()]
        );
        assert_eq!(tokenize(r#""""#).unwrap(), vec![String::new()]);
        assert!(tokenize(r#"a "b"#).is_err());
    }

    #[test]
    fn test_parse_direct() {
        let reference: Reference = "hello -o:tcp -h h1 -p 1:tcp -h h2 -p 2".parse().unwrap();
        assert_eq!(reference.identity(), &Identity::named("hello"));
        assert_eq!(reference.mode(), InvocationMode::Oneway);
        assert_eq!(reference.endpoints().len(), 2);
        assert_eq!(reference.endpoints()[1], Endpoint::tcp("h2", 2));
        assert_eq!(reference.adapter_id(), "");
    }

    #[test]
    fn test_parse_indirect_and_well_known() {
        let indirect: Reference = "users/alice -f admin -s -e 1.0 @ UserAdapter".parse().unwrap();
        assert_eq!(indirect.adapter_id(), "UserAdapter");
        assert_eq!(indirect.facet(), "admin");
        assert!(indirect.is_secure());
        assert_eq!(indirect.encoding(), ENCODING_1_0);

        let well_known: Reference = "hello".parse().unwrap();
        assert!(well_known.is_well_known());
        assert_eq!(well_known.encoding(), ENCODING_1_1);
    }

    #[test]
    fn test_quoted_endpoint_host() {
        let reference: Reference = r#"hello:tcp -h "::1" -p 10000"#.parse().unwrap();
        assert_eq!(reference.endpoints(), &[Endpoint::tcp("::1", 10000)]);
    }

    #[test]
    fn test_display_round_trip() {
        for text in [
            "hello -t -e 1.1 @ HelloAdapter",
            "cat/obj -f \"my facet\" -O -s -e 1.0:tcp -h localhost -p 4061 -t 500",
            "hello -d -e 1.1 -p 1.1",
        ] {
            let reference: Reference = text.parse().unwrap();
            assert_eq!(reference.to_string(), text);
            assert_eq!(reference.to_string().parse::<Reference>().unwrap(), reference);
        }
    }

    #[test]
    fn test_tokenize_escapes_inside_quotes() {
        assert_eq!(
            tokenize(r#""a\"b" "c\\d" "e\f" g\h"#).unwrap(),
            vec![r#"a"b"#.to_string(), r"c\d".into(), r"e\f".into(), r"g\h".into()]
        );
        assert!(tokenize(r#""a\"#).is_err());
    }

    #[test]
    fn test_quotes_and_backslashes_round_trip() {
        let base: std::sync::Arc<Reference> = std::sync::Arc::new("hello @ A".parse().unwrap());
        let reference = base
            .with_identity(Identity::new("odd\"cat", r"back\slash"))
            .unwrap()
            .with_facet(r#"say "hi""#)
            .with_adapter_id(r#"a"b"#)
            .unwrap();
        let parsed: Reference = reference.to_string().parse().unwrap();
        assert_eq!(parsed, *reference);
        assert_eq!(parsed.facet(), r#"say "hi""#);
        assert_eq!(parsed.adapter_id(), r#"a"b"#);

        let direct = reference
            .with_endpoints(vec![Endpoint::tcp(r#"we"ird"#, 1), Endpoint::tcp("h", 2)])
            .unwrap();
        let parsed: Reference = direct.to_string().parse().unwrap();
        assert_eq!(parsed.endpoints(), direct.endpoints());
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("".parse::<Reference>().is_err());
        assert!("hello -x".parse::<Reference>().is_err());
        assert!("hello @".parse::<Reference>().is_err());
        assert!("hello @ a b".parse::<Reference>().is_err());
        assert!("hello:".parse::<Reference>().is_err());
        assert!("hello -f".parse::<Reference>().is_err());
        assert!(":tcp -p 1".parse::<Reference>().is_err());
    }
}
