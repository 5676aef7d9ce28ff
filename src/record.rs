//! Typed view of the invoice record.
//!
//! The pipeline itself returns the model's JSON object untouched. This module
//! offers an optional, lenient typed reading of that object for callers that
//! want Rust types: `null` and missing fields become defaults, unknown fields
//! are ignored. It never feeds back into the pipeline result.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

/// Structured receipt/invoice data.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoiceRecord {
    #[serde(deserialize_with = "nullable")]
    pub store_info: StoreInfo,
    #[serde(deserialize_with = "nullable")]
    pub customer_info: CustomerInfo,
    #[serde(deserialize_with = "nullable")]
    pub line_items: Vec<LineItem>,
    #[serde(deserialize_with = "nullable")]
    pub payment_info: PaymentInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreInfo {
    #[serde(deserialize_with = "nullable")]
    pub title: String,
    #[serde(deserialize_with = "nullable")]
    pub address: String,
    #[serde(deserialize_with = "nullable")]
    pub receipt_number: String,
    #[serde(deserialize_with = "nullable")]
    pub date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomerInfo {
    #[serde(deserialize_with = "nullable")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LineItem {
    #[serde(deserialize_with = "nullable")]
    pub product_name: String,
    #[serde(deserialize_with = "nullable")]
    pub product_code: String,
    #[serde(deserialize_with = "nullable")]
    pub quantity: i64,
    #[serde(deserialize_with = "nullable")]
    pub unit_price: Decimal,
    #[serde(deserialize_with = "nullable")]
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentInfo {
    #[serde(deserialize_with = "nullable")]
    pub subtotal: Decimal,
    #[serde(deserialize_with = "nullable")]
    pub tax_rate: Decimal,
    #[serde(deserialize_with = "nullable")]
    pub tax_amount: Decimal,
    #[serde(deserialize_with = "nullable")]
    pub rounding: Decimal,
    #[serde(deserialize_with = "nullable")]
    pub grand_total: Decimal,
    #[serde(deserialize_with = "nullable")]
    pub amount_paid: Decimal,
    #[serde(deserialize_with = "nullable")]
    pub change: Decimal,
}

impl InvoiceRecord {
    /// Read a typed record from the extracted JSON object.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }
}

/// `null` reads as the type's default.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
