//! The add/drop diff a swap request carries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::PairingKey;

/// A swap: drop these held pairings, pick up those.
///
/// Keys are kept sorted and deduplicated so two transitions built from the
/// same sets compare and hash equal. This is what makes it usable as the
/// "have we already proposed this" key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Transition {
    add_keys: Vec<PairingKey>,
    drop_keys: Vec<PairingKey>,
}

impl Transition {
    pub fn new(
        add_keys: impl IntoIterator<Item = PairingKey>,
        drop_keys: impl IntoIterator<Item = PairingKey>,
    ) -> Self {
        Self {
            add_keys: normalize(add_keys),
            drop_keys: normalize(drop_keys),
        }
    }

    pub fn add_keys(&self) -> &[PairingKey] {
        &self.add_keys
    }

    pub fn drop_keys(&self) -> &[PairingKey] {
        &self.drop_keys
    }

    pub fn is_empty(&self) -> bool {
        self.add_keys.is_empty() && self.drop_keys.is_empty()
    }
}

fn normalize(keys: impl IntoIterator<Item = PairingKey>) -> Vec<PairingKey> {
    let mut keys: Vec<PairingKey> = keys.into_iter().collect();
    keys.sort();
    keys.dedup();
    keys
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |keys: &[PairingKey]| {
            keys.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(
            f,
            "Drop [{}]; Add [{}]",
            join(&self.drop_keys),
            join(&self.add_keys)
        )
    }
}
