use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Rating left by a participant once the game is over.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_and_comment_are_bounded() {
        let ok = FeedbackRequest {
            rating: 5,
            comment: Some("great".into()),
        };
        assert!(ok.validate().is_ok());

        let zero = FeedbackRequest {
            rating: 0,
            comment: None,
        };
        assert!(zero.validate().is_err());

        let long = FeedbackRequest {
            rating: 3,
            comment: Some("x".repeat(501)),
        };
        assert!(long.validate().is_err());
    }
}
