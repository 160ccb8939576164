//! REVIEW command
//!
//! Review text does not fit one datagram, so AniDB splits it into numbered
//! parts that are requested one at a time.

use crate::protocol::error::{ProtocolError, Result};
use crate::protocol::messages::{AniDBCommand, AniDBResponse, RawResponse};

const PARAM_SEPARATOR_STR: &str = "|";

#[derive(Debug, Clone)]
pub struct ReviewCommand {
    pub review_id: u64,
    /// Zero-based part to fetch
    pub part: u32,
}

impl AniDBCommand for ReviewCommand {
    fn name(&self) -> &'static str {
        "REVIEW"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![
            ("rid", self.review_id.to_string()),
            ("part", self.part.to_string()),
        ]
    }
}

/// Response to REVIEW; 234 REVIEW or 334 NO SUCH REVIEW
///
/// Field order: part|part count|text
#[derive(Debug, Clone, Default)]
pub struct ReviewResponse {
    pub code: u16,
    pub message: String,
    pub part: u32,
    pub part_count: u32,
    pub text: String,
}

impl ReviewResponse {
    pub fn parse(raw: &RawResponse) -> Result<Self> {
        let mut response = Self {
            code: raw.code,
            message: raw.message.clone(),
            ..Default::default()
        };
        if raw.code == 234 {
            let f = raw.fields();
            let number = |idx: usize, name: &str| {
                f.get(idx)
                    .and_then(|v| v.parse::<u32>().ok())
                    .ok_or_else(|| ProtocolError::malformed(format!("missing or invalid field '{name}'")))
            };
            response.part = number(0, "part")?;
            response.part_count = number(1, "part count")?;
            // The text itself may contain the separator
            response.text = f
                .get(2..)
                .map(|rest| rest.join(PARAM_SEPARATOR_STR))
                .unwrap_or_default();
        }
        Ok(response)
    }

    /// Whether another part follows this one
    pub fn has_more(&self) -> bool {
        self.part + 1 < self.part_count
    }
}

impl AniDBResponse for ReviewResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_parts() {
        let cmd = ReviewCommand {
            review_id: 55,
            part: 1,
        };
        assert_eq!(cmd.encode(), "REVIEW rid=55&part=1");

        let first = ReviewResponse::parse(
            &RawResponse::parse("234 REVIEW\n0|2|Great show, a|b testing").unwrap(),
        )
        .unwrap();
        assert_eq!(first.part_count, 2);
        assert_eq!(first.text, "Great show, a|b testing");
        assert!(first.has_more());

        let last = ReviewResponse::parse(&RawResponse::parse("234 REVIEW\n1|2| end").unwrap()).unwrap();
        assert!(!last.has_more());
    }

    #[test]
    fn test_review_without_counts_is_malformed() {
        let raw = RawResponse::parse("234 REVIEW\nabc").unwrap();
        assert!(ReviewResponse::parse(&raw).is_err());
        let missing = ReviewResponse::parse(&RawResponse::parse("334 NO SUCH REVIEW").unwrap()).unwrap();
        assert!(!missing.has_more());
    }
}
