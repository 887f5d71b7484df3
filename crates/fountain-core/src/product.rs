//! Product catalogue for the supported fountains.
//!
//! The model is identified by the sixth byte of the advertisement service
//! data, which the host discovery layer hands over together with the device
//! handle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Vendor device type shared by every fountain in the catalogue.
pub const FOUNTAIN_DEVICE_TYPE: u8 = 14;

/// Substrings of the advertised name that identify a fountain.
pub const ADVERTISED_NAME_MARKERS: [&str; 3] = ["W4", "W5", "CTW2"];

/// Known fountain models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductModel {
    /// Eversweet Mini, W5C revision.
    W5c,
    /// Eversweet Mini.
    W5,
    /// Eversweet Mini, W5N revision.
    W5n,
    /// Eversweet 3 Pro.
    W4x,
    /// Eversweet Solo 2.
    Ctw2,
    /// Eversweet 3 Pro with UV-C lamp.
    W4xUvc,
}

impl ProductModel {
    /// All catalogue entries.
    pub const ALL: [Self; 6] = [
        Self::W5c,
        Self::W5,
        Self::W5n,
        Self::W4x,
        Self::Ctw2,
        Self::W4xUvc,
    ];

    /// Looks up a model from the advertisement identifier byte.
    pub fn from_identifier(identifier: u8) -> Option<Self> {
        match identifier {
            205 => Some(Self::W5c),
            206 => Some(Self::W5),
            213 => Some(Self::W5n),
            214 => Some(Self::W4x),
            217 => Some(Self::Ctw2),
            228 => Some(Self::W4xUvc),
            _ => None,
        }
    }

    /// Looks up a model from raw advertisement service data.
    pub fn from_service_data(service_data: &[u8]) -> Option<Self> {
        service_data.get(5).copied().and_then(Self::from_identifier)
    }

    /// Advertisement identifier byte.
    pub fn identifier(self) -> u8 {
        match self {
            Self::W5c => 205,
            Self::W5 => 206,
            Self::W5n => 213,
            Self::W4x => 214,
            Self::Ctw2 => 217,
            Self::W4xUvc => 228,
        }
    }

    /// Short vendor alias. Both W4X variants share the same alias.
    pub fn alias(self) -> &'static str {
        match self {
            Self::W5c => "W5C",
            Self::W5 => "W5",
            Self::W5n => "W5N",
            Self::W4x | Self::W4xUvc => "W4X",
            Self::Ctw2 => "CTW2",
        }
    }

    /// Vendor device name (`Petkit_<alias>`).
    pub fn device_name(self) -> &'static str {
        match self {
            Self::W5c => "Petkit_W5C",
            Self::W5 => "Petkit_W5",
            Self::W5n => "Petkit_W5N",
            Self::W4x => "Petkit_W4X",
            Self::Ctw2 => "Petkit_CTW2",
            Self::W4xUvc => "Petkit_W4XUVC",
        }
    }

    /// Marketing name.
    pub fn product_name(self) -> &'static str {
        match self {
            Self::W5c | Self::W5 | Self::W5n => "Eversweet Mini",
            Self::W4x => "Eversweet 3 Pro",
            Self::Ctw2 => "Eversweet Solo 2",
            Self::W4xUvc => "Eversweet 3 Pro (UVC)",
        }
    }

    /// Vendor type code within the fountain device type.
    pub fn type_code(self) -> u8 {
        match self {
            Self::W5c => 2,
            Self::W5 => 1,
            Self::W5n => 3,
            Self::W4x => 4,
            Self::Ctw2 => 5,
            Self::W4xUvc => 6,
        }
    }
}

impl fmt::Display for ProductModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.product_name(), self.alias())
    }
}

/// Returns true when an advertised BLE name looks like a supported fountain.
pub fn is_fountain_name(name: &str) -> bool {
    ADVERTISED_NAME_MARKERS
        .iter()
        .any(|marker| name.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_roundtrip() {
        for model in ProductModel::ALL {
            assert_eq!(ProductModel::from_identifier(model.identifier()), Some(model));
        }
        assert_eq!(ProductModel::from_identifier(0), None);
    }

    #[test]
    fn service_data_lookup() {
        let data = [0x00, 0x01, 0x02, 0x03, 0x04, 214, 0x09];
        assert_eq!(ProductModel::from_service_data(&data), Some(ProductModel::W4x));
        assert_eq!(ProductModel::from_service_data(&data[..5]), None);
    }

    #[test]
    fn uvc_shares_alias() {
        assert_eq!(ProductModel::W4xUvc.alias(), "W4X");
        assert_eq!(ProductModel::W4xUvc.device_name(), "Petkit_W4XUVC");
        assert_eq!(ProductModel::W4xUvc.type_code(), 6);
    }

    #[test]
    fn advertised_names() {
        assert!(is_fountain_name("Petkit_W5"));
        assert!(is_fountain_name("Petkit_CTW2"));
        assert!(!is_fountain_name("Aranet4 12345"));
    }
}
