//! Postal address of the queried household

use serde::{Deserialize, Serialize};

use crate::hash;

/// A German postal address, as entered by the user.
///
/// All fields are required; validation happens at the API boundary.
/// The struct is treated as immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub house_number: String,
    pub city: String,
    pub zip_code: String,
}

impl Address {
    pub fn new(
        street: impl Into<String>,
        house_number: impl Into<String>,
        city: impl Into<String>,
        zip_code: impl Into<String>,
    ) -> Self {
        Self {
            street: street.into(),
            house_number: house_number.into(),
            city: city.into(),
            zip_code: zip_code.into(),
        }
    }

    /// Content hash of the address, used as the address-cache key.
    ///
    /// The concatenation order (street, house number, zip code, city) is
    /// part of the cache contract and must not change.
    pub fn hash(&self) -> String {
        let mut data = String::with_capacity(
            self.street.len() + self.house_number.len() + self.zip_code.len() + self.city.len(),
        );
        data.push_str(&self.street);
        data.push_str(&self.house_number);
        data.push_str(&self.zip_code);
        data.push_str(&self.city);
        hash::hash_url_encoded(data.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_depends_on_field_order() {
        let a = Address::new("Teststr", "1", "Berlin", "10115");
        // street and city swapped must yield a different key
        let b = Address::new("Berlin", "1", "Teststr", "10115");
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn hash_is_deterministic() {
        let a = Address::new("Teststr", "1", "Berlin", "10115");
        let b = Address::new("Teststr", "1", "Berlin", "10115");
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn serializes_with_camel_case_names() {
        let a = Address::new("Teststr", "1", "Berlin", "10115");
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["street"], "Teststr");
        assert_eq!(json["houseNumber"], "1");
        assert_eq!(json["zipCode"], "10115");
    }
}
