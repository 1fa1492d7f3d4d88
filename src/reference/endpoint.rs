//! Network endpoints in their `transport -h host -p port` text form.

use super::parse::{needs_quotes, option_value, tokenize, write_quoted};
use super::ReferenceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A physical network address a connection can be established to.
///
/// Endpoints are opaque to this crate apart from their text form; the
/// transport layer interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    pub transport: String,
    pub host: String,
    pub port: u16,
    /// Connection timeout in milliseconds; `None` leaves it to the transport.
    pub timeout_ms: Option<u32>,
    pub compress: bool,
}

impl Endpoint {
    pub fn new(transport: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            transport: transport.into(),
            host: host.into(),
            port,
            timeout_ms: None,
            compress: false,
        }
    }

    /// Shorthand for a TCP endpoint.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new("tcp", host, port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.transport)?;
        if !self.host.is_empty() {
            if needs_quotes(&self.host) {
                write!(f, " -h ")?;
                write_quoted(f, &self.host)?;
            } else {
                write!(f, " -h {}", self.host)?;
            }
        }
        if self.port != 0 {
            write!(f, " -p {}", self.port)?;
        }
        if let Some(timeout) = self.timeout_ms {
            write!(f, " -t {timeout}")?;
        }
        if self.compress {
            write!(f, " -z")?;
        }
        Ok(())
    }
}

impl FromStr for Endpoint {
    type Err = ReferenceError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: String| ReferenceError::MalformedEndpoint {
            input: input.trim().to_owned(),
            reason,
        };

        let mut tokens = tokenize(input).map_err(malformed)?.into_iter();
        let transport = tokens
            .next()
            .ok_or_else(|| malformed("missing transport".into()))?;
        if !transport.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(malformed(format!("invalid transport `{transport}`")));
        }

        let mut endpoint = Endpoint::new(transport, "", 0);
        while let Some(option) = tokens.next() {
            match option.as_str() {
                "-h" => endpoint.host = option_value(&mut tokens, "-h").map_err(malformed)?,
                "-p" => {
                    let port = option_value(&mut tokens, "-p").map_err(malformed)?;
                    endpoint.port = port
                        .parse()
                        .map_err(|_| malformed(format!("invalid port `{port}`")))?;
                }
                "-t" => {
                    let timeout = option_value(&mut tokens, "-t").map_err(malformed)?;
                    endpoint.timeout_ms = if timeout == "infinite" {
                        None
                    } else {
                        Some(
                            timeout
                                .parse()
                                .map_err(|_| malformed(format!("invalid timeout `{timeout}`")))?,
                        )
                    };
                }
                "-z" => endpoint.compress = true,
                other => return Err(malformed(format!("unknown option `{other}`"))),
            }
        }
        Ok(endpoint)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_endpoint() {
        let endpoint: Endpoint = "tcp -h example.com -p 4061 -t 5000 -z".parse().unwrap();
        assert_eq!(endpoint.transport, "tcp");
        assert_eq!(endpoint.host, "example.com");
        assert_eq!(endpoint.port, 4061);
        assert_eq!(endpoint.timeout_ms, Some(5000));
        assert!(endpoint.compress);
        assert_eq!(endpoint.to_string(), "tcp -h example.com -p 4061 -t 5000 -z");
    }

    #[test]
    fn test_ipv6_host_is_quoted() {
        let endpoint = Endpoint::tcp("::1", 10000);
        assert_eq!(endpoint.to_string(), "tcp -h \"::1\" -p 10000");
        assert_eq!(endpoint.to_string().parse::<Endpoint>().unwrap(), endpoint);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!("".parse::<Endpoint>().is_err());
        assert!("tcp -p notaport".parse::<Endpoint>().is_err());
        assert!("tcp -h".parse::<Endpoint>().is_err());
        assert!("tcp -x 1".parse::<Endpoint>().is_err());
    }
}
