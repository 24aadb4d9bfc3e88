//! Server-side offer filter
//!
//! The client filters its view locally; the share flow re-applies the
//! same predicate server-side so a share link reproduces exactly the
//! offers the user saw. The filter also feeds the share-id hash, so its
//! digest must be deterministic.

use std::fmt::Write as _;

use serde::Deserialize;

use offerd_domain::{hash, ConnectionType, Offer};

/// Optional filter constraints from query parameters. Absent or empty
/// values mean "no constraint".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterParams {
    pub provider: Option<String>,
    pub installation: Option<bool>,
    pub speed_min: Option<i64>,
    pub age: Option<i64>,
    pub cost_max: Option<i64>,
    pub connection_type: Option<String>,
}

impl FilterParams {
    /// Whether no constraint is set at all.
    pub fn is_empty(&self) -> bool {
        self.provider.as_deref().is_none_or_empty()
            && self.installation.is_none()
            && self.speed_min.is_none()
            && self.age.is_none()
            && self.cost_max.is_none()
            && self.connection_type.as_deref().is_none_or_empty()
    }

    /// The filter predicate.
    ///
    /// Offers without a `maxAgePerson` count as age 0 and are excluded
    /// by any age constraint.
    pub fn matches(&self, offer: &Offer) -> bool {
        if let Some(provider) = non_empty(self.provider.as_deref()) {
            if offer.provider != provider {
                return false;
            }
        }
        if let Some(installation) = self.installation {
            if offer.installation_service != installation {
                return false;
            }
        }
        if let Some(speed_min) = self.speed_min {
            if offer.speed < speed_min {
                return false;
            }
        }
        if let Some(age) = self.age {
            if offer.max_age_person.unwrap_or(0) < age {
                return false;
            }
        }
        if let Some(cost_max) = self.cost_max {
            if offer.monthly_cost_in_cent > cost_max {
                return false;
            }
        }
        if let Some(connection_type) = non_empty(self.connection_type.as_deref()) {
            let normalized = ConnectionType::from_provider(connection_type);
            if offer.connection_type != normalized {
                return false;
            }
        }
        true
    }

    /// Raw SHA-256 over the set constraints, folded into the share id.
    pub fn digest(&self) -> [u8; 32] {
        let mut agg = String::new();
        if let Some(provider) = &self.provider {
            agg.push_str(provider);
        }
        if let Some(installation) = self.installation {
            let _ = write!(agg, "{installation}");
        }
        if let Some(speed_min) = self.speed_min {
            let _ = write!(agg, "{speed_min}");
        }
        if let Some(age) = self.age {
            let _ = write!(agg, "{age}");
        }
        if let Some(cost_max) = self.cost_max {
            let _ = write!(agg, "{cost_max}");
        }
        if let Some(connection_type) = &self.connection_type {
            agg.push_str(ConnectionType::from_provider(connection_type).as_str());
        }
        hash::sha256(agg.as_bytes())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

trait OptionStrExt {
    fn is_none_or_empty(&self) -> bool;
}

impl OptionStrExt for Option<&str> {
    fn is_none_or_empty(&self) -> bool {
        self.map_or(true, str::is_empty)
    }
}
