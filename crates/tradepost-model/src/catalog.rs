// SPDX-License-Identifier: Apache-2.0

use crate::ids::{ParseError, ProductSlug};
use crate::money::Currency;
use serde::{Deserialize, Serialize};

pub const NAME_MAX_LEN: usize = 200;
pub const DESCRIPTION_MAX_LEN: usize = 5000;
pub const PRICE_MAX_CENTS: i64 = 10_000_000;

/// A catalog row. `position` orders the storefront listing; archived
/// products keep their row (orders snapshot against it) but drop out of
/// the public listing via `active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Product {
    pub slug: ProductSlug,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub currency: Currency,
    pub image_url: Option<String>,
    pub active: bool,
    pub position: i64,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Product {
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.name.is_empty() {
            return Err(ParseError::Empty("name"));
        }
        if self.name.trim() != self.name {
            return Err(ParseError::Trimmed("name"));
        }
        if self.name.len() > NAME_MAX_LEN {
            return Err(ParseError::TooLong("name", NAME_MAX_LEN));
        }
        if self.description.len() > DESCRIPTION_MAX_LEN {
            return Err(ParseError::TooLong("description", DESCRIPTION_MAX_LEN));
        }
        if self.price_cents < 0 || self.price_cents > PRICE_MAX_CENTS {
            return Err(ParseError::InvalidFormat(
                "price_cents must be between 0 and the catalog ceiling",
            ));
        }
        if let Some(url) = &self.image_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ParseError::InvalidFormat(
                    "image_url must be an http(s) url",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Product {
        Product {
            slug: ProductSlug::parse("enamel-mug").unwrap(),
            name: "Enamel Mug".to_string(),
            description: "A 12oz mug.".to_string(),
            price_cents: 1800,
            currency: Currency::Usd,
            image_url: Some("https://cdn.example.com/mug.jpg".to_string()),
            active: true,
            position: 1,
            created_at_ms: 1_700_000_000_000,
            updated_at_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn valid_product_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn rejects_empty_and_padded_names() {
        let mut p = sample();
        p.name = String::new();
        assert_eq!(p.validate(), Err(ParseError::Empty("name")));
        p.name = " Mug ".to_string();
        assert_eq!(p.validate(), Err(ParseError::Trimmed("name")));
    }

    #[test]
    fn rejects_price_out_of_range() {
        let mut p = sample();
        p.price_cents = -1;
        assert!(p.validate().is_err());
        p.price_cents = PRICE_MAX_CENTS + 1;
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_non_http_image_url() {
        let mut p = sample();
        p.image_url = Some("ftp://cdn.example.com/mug.jpg".to_string());
        assert!(p.validate().is_err());
    }
}
