//! Client-to-proxy messages.

use crate::error::{ErrorKind, Result};
use dexsprite_variant::{Subject, VariantList};
use exn::ResultExt;
use serde::{Deserialize, Serialize};

/// Messages a client can post to the proxy, e.g.
/// `{"type":"PREFETCH_SPRITE_VARIANTS","data":{"variants":["","a"],"cacheKey":"25"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    /// Variants are already known; only warm their images.
    #[serde(rename = "PREFETCH_SPRITE_VARIANTS")]
    PrefetchSpriteVariants(PrefetchSpriteVariants),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefetchSpriteVariants {
    pub variants: Vec<String>,
    pub cache_key: String,
}

impl ClientMessage {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).or_raise(|| ErrorKind::InvalidMessage("not a known message".to_string()))
    }

    pub fn prefetch(subject: &Subject, variants: &VariantList) -> Self {
        Self::PrefetchSpriteVariants(PrefetchSpriteVariants {
            variants: variants.to_vec(),
            cache_key: subject.key(),
        })
    }
}

impl PrefetchSpriteVariants {
    /// Validated subject and variant list.
    pub fn parse(&self) -> Result<(Subject, VariantList)> {
        let subject = self
            .cache_key
            .parse::<Subject>()
            .or_raise(|| ErrorKind::InvalidMessage(format!("malformed cacheKey {:?}", self.cache_key)))?;
        let variants = VariantList::from_suffixes(self.variants.iter().cloned())
            .or_raise(|| ErrorKind::InvalidMessage("variants are not a contiguous list".to_string()))?;
        Ok((subject, variants))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_wire_shape() {
        let message = ClientMessage::prefetch(&Subject::fusion(1, 2), &VariantList::with_len(2));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "PREFETCH_SPRITE_VARIANTS",
                "data": { "variants": ["", "a"], "cacheKey": "1.2" }
            })
        );
        let back = ClientMessage::from_json(&json.to_string()).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn test_parse_valid() {
        let ClientMessage::PrefetchSpriteVariants(data) = ClientMessage::from_json(
            r#"{"type":"PREFETCH_SPRITE_VARIANTS","data":{"variants":["","a","b"],"cacheKey":"25"}}"#,
        )
        .unwrap();
        let (subject, variants) = data.parse().unwrap();
        assert_eq!(subject, Subject::single(25));
        assert_eq!(variants.len(), 3);
    }

    #[rstest]
    #[case::unknown_type(r#"{"type":"SOMETHING_ELSE","data":{}}"#)]
    #[case::missing_data(r#"{"type":"PREFETCH_SPRITE_VARIANTS"}"#)]
    #[case::not_json("PREFETCH_SPRITE_VARIANTS")]
    fn test_rejects_unknown(#[case] json: &str) {
        let err = ClientMessage::from_json(json).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidMessage(_)));
    }

    #[rstest]
    #[case::bad_key(&["", "a"], "pikachu")]
    #[case::gap(&["", "b"], "25")]
    #[case::no_default(&["a"], "25")]
    fn test_parse_rejects(#[case] variants: &[&str], #[case] key: &str) {
        let data = PrefetchSpriteVariants {
            variants: variants.iter().map(|s| s.to_string()).collect(),
            cache_key: key.to_string(),
        };
        assert!(data.parse().is_err());
    }
}
