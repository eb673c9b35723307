//! Offers and aggregate resource consumption.

use serde::{Deserialize, Serialize};

use crate::resource::Resource;

/// Opaque offer identifier minted by the external cluster resource manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferId(String);

impl OfferId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OfferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OfferId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A bundle of resources published for potential task placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub resources: Vec<Resource>,
}

impl Offer {
    pub fn new(id: impl Into<OfferId>, resources: Vec<Resource>) -> Self {
        Self {
            id: id.into(),
            resources,
        }
    }

    /// Returns the offer left after `consumed` resources are taken out.
    ///
    /// Each consumed entry is matched against the first remaining resource
    /// with the same (name, role); fully consumed entries are dropped.
    /// Consumed entries with no counterpart in the offer take nothing.
    /// The operation commutes over the order of the consumed list.
    pub fn after_consuming<'a, I>(&self, consumed: I) -> Offer
    where
        I: IntoIterator<Item = &'a Resource>,
    {
        let mut remaining = self.resources.clone();

        for used in consumed {
            if let Some(pos) = remaining.iter().position(|r| r.matches(used)) {
                match remaining[pos].subtract(used) {
                    Some(rest) => remaining[pos] = rest,
                    None => {
                        remaining.remove(pos);
                    }
                }
            }
        }

        Offer {
            id: self.id.clone(),
            resources: remaining,
        }
    }
}

impl From<String> for OfferId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
