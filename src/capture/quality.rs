use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Network class as reported by the platform's connection API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectiveConnectionType {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
}

impl FromStr for EffectiveConnectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slow-2g" => Ok(Self::Slow2g),
            "2g" => Ok(Self::TwoG),
            "3g" => Ok(Self::ThreeG),
            "4g" => Ok(Self::FourG),
            other => Err(format!("unknown effective connection type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Default,
    Reduced,
    Minimal,
}

/// Capture constraints handed to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityPreset {
    pub tier: QualityTier,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub video_bits_per_second: u32,
}

impl QualityPreset {
    pub const DEFAULT: Self = Self {
        tier: QualityTier::Default,
        width: 1280,
        height: 720,
        frame_rate: 30,
        video_bits_per_second: 2_500_000,
    };

    pub const REDUCED: Self = Self {
        tier: QualityTier::Reduced,
        width: 640,
        height: 480,
        frame_rate: 24,
        video_bits_per_second: 1_000_000,
    };

    pub const MINIMAL: Self = Self {
        tier: QualityTier::Minimal,
        width: 320,
        height: 240,
        frame_rate: 15,
        video_bits_per_second: 250_000,
    };

    /// "1280x720"
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Pick capture quality from the reported connection. 2G or worse gets the
/// lowest preset; an unknown connection keeps the default.
pub fn select_preset(effective: Option<EffectiveConnectionType>) -> QualityPreset {
    match effective {
        Some(EffectiveConnectionType::Slow2g | EffectiveConnectionType::TwoG) => QualityPreset::MINIMAL,
        Some(EffectiveConnectionType::ThreeG) => QualityPreset::REDUCED,
        Some(EffectiveConnectionType::FourG) | None => QualityPreset::DEFAULT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slow_networks_get_minimal_preset() {
        assert_eq!(select_preset(Some(EffectiveConnectionType::Slow2g)).tier, QualityTier::Minimal);
        assert_eq!(select_preset(Some(EffectiveConnectionType::TwoG)).tier, QualityTier::Minimal);
        assert_eq!(select_preset(Some(EffectiveConnectionType::ThreeG)).tier, QualityTier::Reduced);
        assert_eq!(select_preset(Some(EffectiveConnectionType::FourG)).tier, QualityTier::Default);
        assert_eq!(select_preset(None).tier, QualityTier::Default);
    }

    #[test]
    fn test_parse_effective_type() {
        assert_eq!("slow-2g".parse(), Ok(EffectiveConnectionType::Slow2g));
        assert_eq!("4G".parse(), Ok(EffectiveConnectionType::FourG));
        assert!("5g".parse::<EffectiveConnectionType>().is_err());
    }
}
