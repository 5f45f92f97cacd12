//! Network-quality sampling and the prefetch pacing policy derived from it.
//!
//! Where the quality signal comes from is pluggable ([`ConnectionSignal`]);
//! the thresholds in [`NetworkAdvisor`] are fixed.

mod signal;

pub use self::signal::{ConnectionSignal, MeasuredSignal, SharedSignal, SignalHandle, StaticSignal, UnknownSignal};
use crate::error::{Error, ErrorKind, Result};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Coarse connection quality, from worst to best.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EffectiveType {
    #[display("slow-2g")]
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[display("2g")]
    #[serde(rename = "2g")]
    TwoG,
    #[display("3g")]
    #[serde(rename = "3g")]
    ThreeG,
    #[display("4g")]
    #[serde(rename = "4g")]
    FourG,
}

impl FromStr for EffectiveType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow-2g" => Ok(Self::Slow2g),
            "2g" => Ok(Self::TwoG),
            "3g" => Ok(Self::ThreeG),
            "4g" => Ok(Self::FourG),
            _ => exn::bail!(ErrorKind::UnknownEffectiveType(s.to_string())),
        }
    }
}

/// Point-in-time connection quality. Sampled on demand, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    pub effective_type: EffectiveType,
    pub downlink_mbps: f64,
    pub save_data: bool,
}
impl NetworkProfile {
    pub fn new(effective_type: EffectiveType) -> Self {
        Self { effective_type, ..Self::default() }
    }

    pub fn with_downlink(mut self, mbps: f64) -> Self {
        self.downlink_mbps = mbps;
        self
    }

    pub fn with_save_data(mut self, save_data: bool) -> Self {
        self.save_data = save_data;
        self
    }
}

/// Assumed when nothing better is known: `4g`, data saver off.
impl Default for NetworkProfile {
    fn default() -> Self {
        Self { effective_type: EffectiveType::FourG, downlink_mbps: 10.0, save_data: false }
    }
}

/// Turns connection-quality samples into prefetch batch size and pacing.
#[derive(Clone)]
pub struct NetworkAdvisor {
    signal: SignalHandle,
}

impl NetworkAdvisor {
    pub fn new(signal: SignalHandle) -> Self {
        Self { signal }
    }

    /// Advisor that always reports the default profile.
    pub fn unknown() -> Self {
        Self::new(Arc::new(UnknownSignal))
    }

    /// Current profile, or the conservative default when the signal has
    /// nothing to say.
    pub fn sample(&self) -> NetworkProfile {
        self.signal.sample().unwrap_or_default()
    }

    pub fn batch_size(profile: &NetworkProfile) -> usize {
        if profile.save_data {
            return 3;
        }
        match profile.effective_type {
            EffectiveType::Slow2g | EffectiveType::TwoG => 3,
            EffectiveType::ThreeG => 8,
            EffectiveType::FourG => 15,
        }
    }

    pub fn inter_batch_delay(profile: &NetworkProfile) -> Duration {
        let millis = if profile.save_data {
            2_000
        } else {
            match profile.effective_type {
                EffectiveType::Slow2g | EffectiveType::TwoG => 1_500,
                EffectiveType::ThreeG => 800,
                EffectiveType::FourG => 300,
            }
        };
        Duration::from_millis(millis)
    }

    /// Hard stop for background prefetching, checked before every batch.
    pub fn should_continue(profile: &NetworkProfile) -> bool {
        !profile.save_data && profile.effective_type != EffectiveType::Slow2g
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(EffectiveType::Slow2g, false, 3, 1_500, false)]
    #[case(EffectiveType::TwoG, false, 3, 1_500, true)]
    #[case(EffectiveType::ThreeG, false, 8, 800, true)]
    #[case(EffectiveType::FourG, false, 15, 300, true)]
    #[case(EffectiveType::Slow2g, true, 3, 2_000, false)]
    #[case(EffectiveType::ThreeG, true, 3, 2_000, false)]
    #[case(EffectiveType::FourG, true, 3, 2_000, false)]
    fn test_policy(
        #[case] effective_type: EffectiveType,
        #[case] save_data: bool,
        #[case] batch: usize,
        #[case] delay_ms: u64,
        #[case] proceed: bool,
    ) {
        let profile = NetworkProfile::new(effective_type).with_save_data(save_data);
        assert_eq!(NetworkAdvisor::batch_size(&profile), batch);
        assert_eq!(NetworkAdvisor::inter_batch_delay(&profile), Duration::from_millis(delay_ms));
        assert_eq!(NetworkAdvisor::should_continue(&profile), proceed);
    }

    #[test]
    fn test_unknown_signal_gives_default() {
        let profile = NetworkAdvisor::unknown().sample();
        assert_eq!(profile.effective_type, EffectiveType::FourG);
        assert!(!profile.save_data);
        assert!(NetworkAdvisor::should_continue(&profile));
    }

    #[rstest]
    #[case("slow-2g", EffectiveType::Slow2g)]
    #[case("2g", EffectiveType::TwoG)]
    #[case("3G", EffectiveType::ThreeG)]
    #[case(" 4g ", EffectiveType::FourG)]
    fn test_effective_type_parse(#[case] input: &str, #[case] expected: EffectiveType) {
        assert_eq!(input.parse::<EffectiveType>().unwrap(), expected);
        assert_eq!(expected.to_string().parse::<EffectiveType>().unwrap(), expected);
    }

    #[test]
    fn test_effective_type_rejects_unknown() {
        let err = "5g".parse::<EffectiveType>().unwrap_err();
        assert_eq!(*err, ErrorKind::UnknownEffectiveType("5g".to_string()));
    }

    #[test]
    fn test_profile_serde() {
        let profile = NetworkProfile::new(EffectiveType::Slow2g).with_downlink(0.05);
        let json = serde_json::to_value(profile).unwrap();
        assert_eq!(json["effectiveType"], "slow-2g");
        assert_eq!(json["saveData"], false);
    }
}
