//! Enumerations shared by the catalog, account and payment tables.
//!
//! Every enum is stored as text in PostgreSQL (`AsRefStr` on the way in, `FromStr` on the
//! way out). The French identifiers used by the storefront are accepted as aliases.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString, ToSchema,
)]
pub enum Role {
    #[serde(rename = "buyer", alias = "acheteur")]
    #[strum(to_string = "buyer", serialize = "acheteur")]
    Buyer,
    #[serde(rename = "supplier", alias = "fournisseur")]
    #[strum(to_string = "supplier", serialize = "fournisseur")]
    Supplier,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString, ToSchema,
)]
pub enum ProductType {
    #[serde(rename = "fruit", alias = "fruits")]
    #[strum(to_string = "fruit", serialize = "fruits")]
    Fruit,
    #[serde(rename = "vegetable", alias = "legumes")]
    #[strum(to_string = "vegetable", serialize = "legumes")]
    Vegetable,
}

/// Fixed product categories; each belongs to exactly one [`ProductType`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Category {
    #[serde(rename = "ananas")]
    #[strum(to_string = "ananas")]
    Pineapple,
    #[serde(rename = "mangue")]
    #[strum(to_string = "mangue")]
    Mango,
    #[serde(rename = "banane")]
    #[strum(to_string = "banane")]
    Banana,
    #[serde(rename = "canne")]
    #[strum(to_string = "canne")]
    SugarCane,
    Orange,
    #[serde(rename = "papaye")]
    #[strum(to_string = "papaye")]
    Papaya,
    #[serde(rename = "tomate")]
    #[strum(to_string = "tomate")]
    Tomato,
    #[serde(rename = "oignon")]
    #[strum(to_string = "oignon")]
    Onion,
    #[serde(rename = "gombo")]
    #[strum(to_string = "gombo")]
    Okra,
    #[serde(rename = "aubergine")]
    #[strum(to_string = "aubergine")]
    Eggplant,
    #[serde(rename = "piment")]
    #[strum(to_string = "piment")]
    ChiliPepper,
    #[serde(rename = "concombre")]
    #[strum(to_string = "concombre")]
    Cucumber,
}

impl Category {
    pub fn product_type(self) -> ProductType {
        match self {
            Category::Pineapple
            | Category::Mango
            | Category::Banana
            | Category::SugarCane
            | Category::Orange
            | Category::Papaya => ProductType::Fruit,
            Category::Tomato
            | Category::Onion
            | Category::Okra
            | Category::Eggplant
            | Category::ChiliPepper
            | Category::Cucumber => ProductType::Vegetable,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    ToSchema,
)]
pub enum Unit {
    #[default]
    #[serde(rename = "kg")]
    #[strum(to_string = "kg")]
    Kg,
    #[serde(rename = "piece", alias = "pièce")]
    #[strum(to_string = "piece", serialize = "pièce")]
    Piece,
    #[serde(rename = "tas")]
    #[strum(to_string = "tas")]
    Heap,
    #[serde(rename = "botte")]
    #[strum(to_string = "botte")]
    Bunch,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString, ToSchema,
)]
pub enum PaymentMethod {
    #[serde(rename = "mtn")]
    #[strum(to_string = "mtn")]
    Mtn,
    #[serde(rename = "moov")]
    #[strum(to_string = "moov")]
    Moov,
    #[serde(rename = "card", alias = "cartes")]
    #[strum(to_string = "card", serialize = "cartes")]
    Card,
    #[serde(rename = "cash", alias = "especes")]
    #[strum(to_string = "cash", serialize = "especes")]
    Cash,
}

impl PaymentMethod {
    /// Whether the payer confirms on their handset after a push from the gateway.
    pub fn is_mobile_money(self) -> bool {
        matches!(self, PaymentMethod::Mtn | PaymentMethod::Moov)
    }

    /// Whether this method goes through the payment gateway at all.
    pub fn uses_gateway(self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString, ToSchema,
)]
pub enum PaymentStatus {
    #[serde(rename = "pending", alias = "en_attente")]
    #[strum(to_string = "pending", serialize = "en_attente")]
    Pending,
    #[serde(rename = "succeeded", alias = "reussi")]
    #[strum(to_string = "succeeded", serialize = "reussi")]
    Succeeded,
    #[serde(rename = "failed", alias = "echoue")]
    #[strum(to_string = "failed", serialize = "echoue")]
    Failed,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn french_aliases_parse_to_the_same_variant() {
        assert_eq!(Role::from_str("acheteur").unwrap(), Role::Buyer);
        assert_eq!(Role::from_str("supplier").unwrap(), Role::Supplier);
        assert_eq!(PaymentMethod::from_str("especes").unwrap(), PaymentMethod::Cash);
        assert_eq!(PaymentStatus::from_str("reussi").unwrap(), PaymentStatus::Succeeded);
        assert_eq!(Unit::from_str("pièce").unwrap(), Unit::Piece);
    }

    #[test]
    fn stored_text_is_the_canonical_name() {
        assert_eq!(Role::Supplier.as_ref(), "supplier");
        assert_eq!(PaymentMethod::Card.as_ref(), "card");
        assert_eq!(Category::SugarCane.as_ref(), "canne");
        assert_eq!(Category::Orange.as_ref(), "orange");
        assert_eq!(PaymentStatus::Succeeded.to_string(), "succeeded");
    }

    #[test]
    fn categories_belong_to_one_product_type() {
        assert_eq!(Category::Mango.product_type(), ProductType::Fruit);
        assert_eq!(Category::Okra.product_type(), ProductType::Vegetable);
        assert_eq!(
            serde_json::from_str::<ProductType>("\"legumes\"").unwrap(),
            ProductType::Vegetable
        );
    }

    #[test]
    fn only_cash_bypasses_the_gateway() {
        assert!(PaymentMethod::Mtn.is_mobile_money());
        assert!(!PaymentMethod::Card.is_mobile_money());
        assert!(PaymentMethod::Card.uses_gateway());
        assert!(!PaymentMethod::Cash.uses_gateway());
    }
}
