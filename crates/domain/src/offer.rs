//! Normalized internet offer
//!
//! Every provider adapter translates its upstream payload into this one
//! schema. Offers are identified by a content hash over all
//! product-identifying fields; two offers are equal iff their hashes are
//! equal, which is what the dedup and supersession logic in the pipeline
//! relies on.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::hash;

/// Connection technology reported by a provider.
///
/// Known values are DSL, CABLE, FIBER and MOBILE. Provider strings are
/// normalized to upper case; unknown values pass through opaquely so a
/// new upstream technology does not break parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionType(String);

impl ConnectionType {
    pub const DSL: &'static str = "DSL";
    pub const CABLE: &'static str = "CABLE";
    pub const FIBER: &'static str = "FIBER";
    pub const MOBILE: &'static str = "MOBILE";

    /// All connection types WebWunder answers for, in request order.
    pub const ALL: [&'static str; 4] = [Self::DSL, Self::CABLE, Self::FIBER, Self::MOBILE];

    /// Normalize a provider-reported connection type.
    pub fn from_provider(value: &str) -> Self {
        Self(value.to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionType {
    fn from(value: &str) -> Self {
        Self::from_provider(value)
    }
}

/// Discriminates how a voucher value is applied to the monthly cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoucherKind {
    Absolute,
    Percentage,
}

impl VoucherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absolute => "ABSOLUTE",
            Self::Percentage => "PERCENTAGE",
        }
    }

    /// Parse a provider-reported voucher type, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_uppercase().as_str() {
            "ABSOLUTE" => Some(Self::Absolute),
            "PERCENTAGE" => Some(Self::Percentage),
            _ => None,
        }
    }
}

/// Voucher attached to an offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherDetails {
    #[serde(rename = "type")]
    pub kind: VoucherKind,
    pub value: i64,
    #[serde(default)]
    pub description: String,
}

impl VoucherDetails {
    /// Sub-hash folded into the offer hash.
    ///
    /// Only kind and value identify the voucher; the description is
    /// display text and excluded on purpose.
    fn subhash(&self) -> String {
        let data = format!("{}{}", self.kind.as_str(), self.value);
        hash::hash_url_encoded(data.as_bytes())
    }
}

/// A single internet product quote from one provider.
///
/// `offer_hash` and `is_preliminary` are helper fields: the hash is
/// derived from the product fields, and the preliminary flag marks offers
/// replayed from the address cache while a live fetch is still running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
    pub product_name: String,
    pub speed: i64,
    pub contract_duration_in_months: i64,
    pub connection_type: ConnectionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_in_gb: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_person: Option<i64>,
    pub monthly_cost_in_cent: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_two_years_monthly_cost: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_cost_in_cent_with_voucher: Option<i64>,
    pub installation_service: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voucher_details: Option<VoucherDetails>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_properties: BTreeMap<String, String>,

    // helper fields
    #[serde(default)]
    pub offer_hash: String,
    #[serde(default)]
    pub is_preliminary: bool,
}

impl Default for Offer {
    fn default() -> Self {
        Self {
            provider: String::new(),
            product_id: None,
            product_name: String::new(),
            speed: 0,
            contract_duration_in_months: 0,
            connection_type: ConnectionType::default(),
            tv: None,
            limit_in_gb: None,
            max_age_person: None,
            monthly_cost_in_cent: 0,
            after_two_years_monthly_cost: None,
            monthly_cost_in_cent_with_voucher: None,
            installation_service: false,
            voucher_details: None,
            extra_properties: BTreeMap::new(),
            offer_hash: String::new(),
            is_preliminary: false,
        }
    }
}

impl Offer {
    /// Compute the content hash over every product-identifying field.
    ///
    /// Absent optionals contribute their zero value so the hash is
    /// identical no matter which adapter filled the offer. The voucher is
    /// folded in as a sub-hash, and `extra_properties` iterates in key
    /// order (`BTreeMap`), keeping the hash stable across serialization
    /// round trips.
    pub fn compute_hash(&self) -> String {
        let mut data = String::new();
        let _ = write!(
            data,
            "{}{}{}{}{}{}{}{}{}{}{}{}{}",
            self.provider,
            self.product_id.unwrap_or(0),
            self.product_name,
            self.speed,
            self.contract_duration_in_months,
            self.connection_type,
            self.tv.as_deref().unwrap_or(""),
            self.limit_in_gb.unwrap_or(0),
            self.max_age_person.unwrap_or(0),
            self.monthly_cost_in_cent,
            self.after_two_years_monthly_cost.unwrap_or(0),
            self.monthly_cost_in_cent_with_voucher.unwrap_or(0),
            self.installation_service,
        );
        if let Some(voucher) = &self.voucher_details {
            data.push_str(&voucher.subhash());
        }
        for (key, value) in &self.extra_properties {
            let _ = write!(data, "{key}={value};");
        }
        hash::hash_url_encoded(data.as_bytes())
    }

    /// Compute and store the content hash in `offer_hash`.
    pub fn seal(&mut self) {
        self.offer_hash = self.compute_hash();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_offer() -> Offer {
        Offer {
            provider: "WebWunder".into(),
            product_id: Some(12),
            product_name: "WebWunder Home 100".into(),
            speed: 100,
            contract_duration_in_months: 24,
            connection_type: ConnectionType::from_provider("dsl"),
            monthly_cost_in_cent: 2999,
            after_two_years_monthly_cost: Some(3499),
            installation_service: true,
            ..Offer::default()
        }
    }

    #[test]
    fn hash_is_deterministic_across_recompute() {
        let mut offer = sample_offer();
        offer.seal();
        let first = offer.offer_hash.clone();
        offer.seal();
        assert_eq!(first, offer.offer_hash);
    }

    #[test]
    fn hash_survives_serde_round_trip() {
        let mut offer = sample_offer();
        offer.extra_properties.insert("router".into(), "included".into());
        offer.seal();

        let json = serde_json::to_string(&offer).unwrap();
        let restored: Offer = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.compute_hash(), offer.offer_hash);
    }

    #[test]
    fn extra_property_insertion_order_does_not_matter() {
        let mut a = sample_offer();
        a.extra_properties.insert("alpha".into(), "1".into());
        a.extra_properties.insert("beta".into(), "2".into());

        let mut b = sample_offer();
        b.extra_properties.insert("beta".into(), "2".into());
        b.extra_properties.insert("alpha".into(), "1".into());

        assert_eq!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn product_fields_change_the_hash() {
        let base = sample_offer();
        let mut faster = sample_offer();
        faster.speed = 250;
        assert_ne!(base.compute_hash(), faster.compute_hash());
    }

    #[test]
    fn preliminary_flag_does_not_change_the_hash() {
        let base = sample_offer();
        let mut preliminary = sample_offer();
        preliminary.is_preliminary = true;
        assert_eq!(base.compute_hash(), preliminary.compute_hash());
    }

    #[test]
    fn voucher_contributes_via_subhash() {
        let base = sample_offer();

        let mut with_voucher = sample_offer();
        with_voucher.voucher_details = Some(VoucherDetails {
            kind: VoucherKind::Percentage,
            value: 10,
            description: "Rabatt von 10%".into(),
        });
        assert_ne!(base.compute_hash(), with_voucher.compute_hash());

        // The description is display text and must not affect the hash.
        let mut other_description = with_voucher.clone();
        other_description.voucher_details.as_mut().unwrap().description = String::new();
        assert_eq!(with_voucher.compute_hash(), other_description.compute_hash());
    }

    #[test]
    fn connection_type_normalizes_known_values() {
        assert_eq!(ConnectionType::from_provider("Cable").as_str(), "CABLE");
        assert_eq!(ConnectionType::from_provider("fiber").as_str(), "FIBER");
        // unknown values pass through, upper-cased
        assert_eq!(ConnectionType::from_provider("Satellite").as_str(), "SATELLITE");
    }

    #[test]
    fn voucher_kind_serializes_screaming_case() {
        let voucher = VoucherDetails {
            kind: VoucherKind::Absolute,
            value: 500,
            description: String::new(),
        };
        let json = serde_json::to_value(&voucher).unwrap();
        assert_eq!(json["type"], "ABSOLUTE");
        assert_eq!(json["value"], 500);
    }

    #[test]
    fn optional_fields_are_omitted_from_json() {
        let offer = sample_offer();
        let json = serde_json::to_value(&offer).unwrap();
        assert!(json.get("tv").is_none());
        assert!(json.get("limitInGb").is_none());
        assert!(json.get("voucherDetails").is_none());
        assert!(json.get("extraProperties").is_none());
        // helper fields always serialize
        assert!(json.get("offerHash").is_some());
        assert_eq!(json["isPreliminary"], false);
    }
}
