//! Object identities.

use super::ReferenceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The identity of a remote object: an optional category (namespace) and a name.
///
/// The string form is `name` or `category/name`. A `/` or `\` that is part of
/// the category or the name is escaped with a backslash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    pub category: String,
    pub name: String,
}

impl Identity {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
        }
    }

    /// Identity without a category.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new("", name)
    }

    /// An identity with an empty name cannot address an object.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for c in value.chars() {
        if c == '/' || c == '\\' {
            write!(f, "\\")?;
        }
        write!(f, "{c}")?;
    }
    Ok(())
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.category.is_empty() {
            write_escaped(f, &self.category)?;
            write!(f, "/")?;
        }
        write_escaped(f, &self.name)
    }
}

impl FromStr for Identity {
    type Err = ReferenceError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let malformed = || ReferenceError::MalformedIdentity(input.to_owned());

        let mut parts: Vec<String> = vec![String::new()];
        let mut chars = input.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    let escaped = chars.next().ok_or_else(malformed)?;
                    parts.last_mut().ok_or_else(malformed)?.push(escaped);
                }
                '/' => parts.push(String::new()),
                c => parts.last_mut().ok_or_else(malformed)?.push(c),
            }
        }

        let identity = match parts.len() {
            1 => Identity::named(parts.remove(0)),
            2 => {
                let name = parts.remove(1);
                Identity::new(parts.remove(0), name)
            }
            _ => return Err(malformed()),
        };

        if identity.name.is_empty() {
            return Err(malformed());
        }
        Ok(identity)
    }
}
