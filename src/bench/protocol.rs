//! Reporting wire format.
//!
//! One sample per line: `<client> <reads> <writes>\n`, with the counts as
//! whole operations per second over the client's reporting interval.

use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// One client's throughput for one reporting interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub client: String,
    pub reads: u64,
    pub writes: u64,
}

impl Sample {
    pub fn new(client: impl Into<String>, reads: u64, writes: u64) -> Self {
        Self {
            client: client.into(),
            reads,
            writes,
        }
    }

    /// Newline-terminated wire line
    pub fn encode(&self) -> String {
        format!("{}\n", self)
    }

    /// Decode one line, with or without its line terminator
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut fields = line.split_whitespace();

        let client = fields.next().ok_or(ProtocolError::MissingField("client"))?;
        let reads = parse_count(fields.next(), "reads")?;
        let writes = parse_count(fields.next(), "writes")?;

        let rest: Vec<&str> = fields.collect();
        if !rest.is_empty() {
            return Err(ProtocolError::TrailingData(rest.join(" ")));
        }

        Ok(Self::new(client, reads, writes))
    }
}

fn parse_count(field: Option<&str>, name: &'static str) -> Result<u64, ProtocolError> {
    let value = field.ok_or(ProtocolError::MissingField(name))?;
    value.parse().map_err(|_| ProtocolError::InvalidCount {
        field: name,
        value: value.to_string(),
    })
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.client, self.reads, self.writes)
    }
}

impl FromStr for Sample {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        let sample = Sample::new("node-1", 1200, 340);
        assert_eq!(sample.encode(), "node-1 1200 340\n");
    }

    #[test]
    fn test_parse_valid_line() {
        let sample: Sample = "node-1 1200 340\n".parse().unwrap();
        assert_eq!(sample, Sample::new("node-1", 1200, 340));

        let sample = Sample::parse("host\t5  6\r\n").unwrap();
        assert_eq!(sample, Sample::new("host", 5, 6));
    }

    #[test]
    fn test_parse_missing_fields() {
        assert_eq!(
            Sample::parse("").unwrap_err(),
            ProtocolError::MissingField("client")
        );
        assert_eq!(
            Sample::parse("host").unwrap_err(),
            ProtocolError::MissingField("reads")
        );
        assert_eq!(
            Sample::parse("host 1").unwrap_err(),
            ProtocolError::MissingField("writes")
        );
    }

    #[test]
    fn test_parse_invalid_counts() {
        assert_eq!(
            Sample::parse("host abc 1").unwrap_err(),
            ProtocolError::InvalidCount {
                field: "reads",
                value: "abc".to_string()
            }
        );
        assert!(matches!(
            Sample::parse("host 1 -4"),
            Err(ProtocolError::InvalidCount { field: "writes", .. })
        ));
    }

    #[test]
    fn test_parse_trailing_data() {
        assert_eq!(
            Sample::parse("host 1 2 3").unwrap_err(),
            ProtocolError::TrailingData("3".to_string())
        );
    }
}
