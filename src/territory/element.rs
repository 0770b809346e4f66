//! Elements and the fixed advantage table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Damage multiplier when the attacker's element beats the defender's.
pub const ADVANTAGE_MULTIPLIER: f64 = 1.5;

/// Damage multiplier when the defender's element beats the attacker's.
pub const DISADVANTAGE_MULTIPLIER: f64 = 0.75;

/// Damage multiplier for unrelated elements.
pub const NEUTRAL_MULTIPLIER: f64 = 1.0;

/// Elemental affinity of a creature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ElementType {
    /// Fire beats earth.
    Fire = 0,
    /// Water beats fire.
    Water = 1,
    /// Earth beats air.
    Earth = 2,
    /// Air beats water.
    Air = 3,
    /// Light beats dark.
    Light = 4,
    /// Dark beats light.
    Dark = 5,
}

/// `ADVANTAGES[e as usize]` is the element that `e` deals bonus damage to.
const ADVANTAGES: [ElementType; 6] = [
    ElementType::Earth,
    ElementType::Fire,
    ElementType::Air,
    ElementType::Water,
    ElementType::Dark,
    ElementType::Light,
];

impl ElementType {
    /// Every element, in discriminant order.
    pub const ALL: [ElementType; 6] = [
        ElementType::Fire,
        ElementType::Water,
        ElementType::Earth,
        ElementType::Air,
        ElementType::Light,
        ElementType::Dark,
    ];

    /// The element this one deals bonus damage to.
    #[must_use]
    pub const fn beats(self) -> ElementType {
        ADVANTAGES[self as usize]
    }

    /// Check whether this element has the advantage over `other`.
    #[must_use]
    pub const fn has_advantage_over(self, other: ElementType) -> bool {
        self.beats() as u8 == other as u8
    }

    /// Lowercase name used on the wire.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ElementType::Fire => "fire",
            ElementType::Water => "water",
            ElementType::Earth => "earth",
            ElementType::Air => "air",
            ElementType::Light => "light",
            ElementType::Dark => "dark",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Damage multiplier applied when `attacker` hits `defender`.
///
/// 1.5 when the attacker beats the defender, 0.75 for the reverse pairing,
/// 1.0 otherwise. Light and dark beat each other, so the advantage check
/// runs first.
#[must_use]
pub const fn element_multiplier(attacker: ElementType, defender: ElementType) -> f64 {
    if attacker.has_advantage_over(defender) {
        ADVANTAGE_MULTIPLIER
    } else if defender.has_advantage_over(attacker) {
        DISADVANTAGE_MULTIPLIER
    } else {
        NEUTRAL_MULTIPLIER
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_advantage_table_matches_cycle() {
        assert_eq!(ElementType::Fire.beats(), ElementType::Earth);
        assert_eq!(ElementType::Water.beats(), ElementType::Fire);
        assert_eq!(ElementType::Earth.beats(), ElementType::Air);
        assert_eq!(ElementType::Air.beats(), ElementType::Water);
        assert_eq!(ElementType::Light.beats(), ElementType::Dark);
        assert_eq!(ElementType::Dark.beats(), ElementType::Light);
    }

    #[test]
    fn test_all_36_pairs() {
        for attacker in ElementType::ALL {
            for defender in ElementType::ALL {
                let expected = if attacker.beats() == defender {
                    1.5
                } else if defender.beats() == attacker {
                    0.75
                } else {
                    1.0
                };
                assert_eq!(
                    element_multiplier(attacker, defender),
                    expected,
                    "{attacker} vs {defender}"
                );
            }
        }
    }

    #[test]
    fn test_light_dark_mutual_advantage() {
        // Mutual pairs resolve to the attacker's advantage.
        assert_eq!(element_multiplier(ElementType::Light, ElementType::Dark), 1.5);
        assert_eq!(element_multiplier(ElementType::Dark, ElementType::Light), 1.5);
    }

    #[test]
    fn test_same_element_is_neutral() {
        for element in ElementType::ALL {
            assert_eq!(element_multiplier(element, element), 1.0);
        }
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&ElementType::Fire).unwrap();
        assert_eq!(json, "\"fire\"");
        let parsed: ElementType = serde_json::from_str("\"dark\"").unwrap();
        assert_eq!(parsed, ElementType::Dark);
    }
}
