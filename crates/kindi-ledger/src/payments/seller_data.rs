//! The `userId:<id>,quantity:<n>` payload carried through the payment provider.

use std::fmt;
use std::str::FromStr;

use kindi_core::config::PurchaseConfig;

use super::PaymentError;

const USER_ID_KEY: &str = "userId";
const QUANTITY_KEY: &str = "quantity";

/// Who bought how many coins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellerData {
    pub user_id: String,
    pub quantity: u32,
}

impl SellerData {
    /// Build the payload for a new purchase, checking the quantity bounds.
    pub fn for_purchase(
        user_id: &str,
        quantity: u32,
        bounds: &PurchaseConfig,
    ) -> Result<Self, PaymentError> {
        if user_id.is_empty() {
            return Err(PaymentError::MalformedPayload("empty userId".into()));
        }
        if quantity < bounds.min_quantity || quantity > bounds.max_quantity {
            return Err(PaymentError::InvalidQuantity {
                quantity,
                min: bounds.min_quantity,
                max: bounds.max_quantity,
            });
        }

        Ok(Self {
            user_id: user_id.to_string(),
            quantity,
        })
    }
}

impl fmt::Display for SellerData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{USER_ID_KEY}:{},{QUANTITY_KEY}:{}", self.user_id, self.quantity)
    }
}

impl FromStr for SellerData {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| PaymentError::MalformedPayload(reason.to_string());

        let fields: Vec<&str> = s.split(',').collect();
        if fields.len() != 2 {
            return Err(malformed("expected exactly two fields"));
        }

        let mut user_id = None;
        let mut quantity = None;
        for field in fields {
            let (key, value) = field
                .split_once(':')
                .ok_or_else(|| malformed("field without ':'"))?;
            match key {
                USER_ID_KEY if user_id.is_none() => user_id = Some(value),
                QUANTITY_KEY if quantity.is_none() => {
                    let n = value
                        .parse::<u32>()
                        .map_err(|_| malformed("quantity is not a positive integer"))?;
                    quantity = Some(n);
                }
                USER_ID_KEY | QUANTITY_KEY => return Err(malformed("duplicated key")),
                _ => return Err(malformed("unknown key")),
            }
        }

        let user_id = user_id.ok_or_else(|| malformed("missing userId"))?;
        let quantity = quantity.ok_or_else(|| malformed("missing quantity"))?;
        if user_id.is_empty() {
            return Err(malformed("empty userId"));
        }
        if quantity == 0 {
            return Err(malformed("quantity must be positive"));
        }

        Ok(Self {
            user_id: user_id.to_string(),
            quantity,
        })
    }
}
