//! Safe-ish conversions between rust and sql types.

use super::*;

pub fn i32_to_u32(i: i32) -> Result<u32> {
    u32::try_from(i).map_err(|_| anyhow!("i32 value {i} is negative and cannot be converted to u32"))
}
pub fn u32_to_i32(i: u32) -> Result<i32> {
    i32::try_from(i).map_err(|_| anyhow!("u32 value {i} exceeds i32::MAX"))
}

pub fn i64_to_u64(i: i64) -> Result<u64> {
    u64::try_from(i).map_err(|_| anyhow!("i64 value {i} is negative and cannot be converted to u64"))
}
pub fn u64_to_i64(i: u64) -> Result<i64> {
    i64::try_from(i).map_err(|_| anyhow!("u64 value {i} exceeds i64::MAX"))
}

pub fn serialize_tokenizer(i: TokenizerKind) -> String {
    i.as_str().to_string()
}
pub fn deserialize_tokenizer(i: &str) -> Result<TokenizerKind> {
    i.parse::<TokenizerKind>().map_err(|e| anyhow!(e))
}

pub fn serialize_review(i: ReviewRating) -> i32 {
    i.value()
}
pub fn deserialize_review(i: i32) -> Result<ReviewRating> {
    ReviewRating::try_from(i).map_err(|e| anyhow!(e))
}

pub fn serialize_matches(i: Vec<TokenMatch>) -> Result<Value> {
    serde_json::to_value(i).map_err(|e| anyhow!(e))
}
pub fn deserialize_matches(i: Value) -> Result<Vec<TokenMatch>> {
    serde_json::from_value(i).map_err(|e| anyhow!(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn test_id_conversions_reject_out_of_range() {
        assert_eq!(i32_to_u32(7).unwrap(), 7);
        assert!(i32_to_u32(-1).is_err());
        assert!(u32_to_i32(u32::MAX).is_err());
        assert!(i64_to_u64(-5).is_err());
        assert!(u64_to_i64(u64::MAX).is_err());
    }

    #[test_log::test]
    fn test_unknown_tokenizer_and_review_are_errors() {
        assert_eq!(deserialize_tokenizer("python").unwrap(), TokenizerKind::Python);
        assert!(deserialize_tokenizer("cobol").is_err());
        assert!(deserialize_review(3).is_err());
    }

    #[test_log::test]
    fn test_matches_json_shape() {
        let tiles = vec![TokenMatch {
            a_start: 1,
            b_start: 2,
            length: 3,
        }];
        let value = serialize_matches(tiles.clone()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{ "a_start": 1, "b_start": 2, "length": 3 }])
        );
        assert_eq!(deserialize_matches(value).unwrap(), tiles);
    }
}
