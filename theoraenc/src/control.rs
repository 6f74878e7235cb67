//! Encoder control requests.
//!
//! Requests arrive either as a typed [`Control`] or as a numeric id plus a
//! loosely typed payload, which [`Control::from_request`] checks.

use crate::error::{Result, TheoraError};
use crate::quant::QuantInfo;

/// Replace the quantization parameters (`None` restores the defaults).
pub const CTL_SET_QUANT_PARAMS: u32 = 2;
/// Restore the VP3-compatible quantization parameters.
pub const CTL_SET_VP3_COMPATIBLE: u32 = 10;
/// Query the highest speed level.
pub const CTL_GET_SPEED_LEVEL_MAX: u32 = 12;
/// Select a speed level.
pub const CTL_SET_SPEED_LEVEL: u32 = 14;

/// Speed/quality tradeoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeedLevel {
    /// Motion compensation with full mode decisions.
    #[default]
    Full = 0,
    /// Motion compensation with quick mode decisions.
    Quick = 1,
    /// No motion compensation, quick mode decisions.
    NoMotion = 2,
}

impl SpeedLevel {
    /// Highest level accepted by [`CTL_SET_SPEED_LEVEL`].
    pub const MAX: i32 = 2;

    /// Whether motion search is enabled.
    pub fn motion_compensation(self) -> bool {
        !matches!(self, SpeedLevel::NoMotion)
    }

    /// Whether quick mode decisions are enabled.
    pub fn quick(self) -> bool {
        !matches!(self, SpeedLevel::Full)
    }
}

impl TryFrom<i32> for SpeedLevel {
    type Error = TheoraError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::Full),
            1 => Ok(Self::Quick),
            2 => Ok(Self::NoMotion),
            _ => Err(TheoraError::InvalidArgument(format!(
                "speed level {} outside 0..={}",
                value,
                Self::MAX
            ))),
        }
    }
}

/// Untyped payload accompanying a numeric request.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlPayload {
    /// No payload.
    None,
    /// An integer argument.
    Int(i32),
    /// A quantization parameter set, or `None` for the defaults.
    QuantParams(Option<Box<QuantInfo>>),
}

/// A typed control request.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    /// Replace the quantization parameters; `None` restores the defaults.
    SetQuantParams(Option<Box<QuantInfo>>),
    /// Restore the VP3-compatible quantization parameters.
    SetVp3Compatible,
    /// Ask for the highest speed level.
    GetSpeedLevelMax,
    /// Select a speed level.
    SetSpeedLevel(SpeedLevel),
}

impl Control {
    /// Decode a numeric request.
    pub fn from_request(id: u32, payload: ControlPayload) -> Result<Self> {
        match (id, payload) {
            (CTL_SET_QUANT_PARAMS, ControlPayload::QuantParams(info)) => Ok(Control::SetQuantParams(info)),
            (CTL_SET_QUANT_PARAMS, ControlPayload::None) => Ok(Control::SetQuantParams(None)),
            (CTL_SET_VP3_COMPATIBLE, ControlPayload::None | ControlPayload::Int(_)) => {
                Ok(Control::SetVp3Compatible)
            }
            (CTL_GET_SPEED_LEVEL_MAX, _) => Ok(Control::GetSpeedLevelMax),
            (CTL_SET_SPEED_LEVEL, ControlPayload::Int(level)) => {
                Ok(Control::SetSpeedLevel(SpeedLevel::try_from(level)?))
            }
            (CTL_SET_QUANT_PARAMS | CTL_SET_VP3_COMPATIBLE | CTL_SET_SPEED_LEVEL, payload) => {
                Err(TheoraError::InvalidArgument(format!(
                    "payload {:?} does not fit request {}",
                    payload, id
                )))
            }
            (id, _) => Err(TheoraError::UnsupportedControl(id)),
        }
    }

    /// Numeric id of the request.
    pub fn id(&self) -> u32 {
        match self {
            Control::SetQuantParams(_) => CTL_SET_QUANT_PARAMS,
            Control::SetVp3Compatible => CTL_SET_VP3_COMPATIBLE,
            Control::GetSpeedLevelMax => CTL_GET_SPEED_LEVEL_MAX,
            Control::SetSpeedLevel(_) => CTL_SET_SPEED_LEVEL,
        }
    }

    /// Whether the request changes the setup header contents.
    pub fn changes_setup(&self) -> bool {
        matches!(self, Control::SetQuantParams(_) | Control::SetVp3Compatible)
    }
}

/// Result of a control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlResponse {
    /// Applied.
    Done,
    /// Answer to [`Control::GetSpeedLevelMax`].
    SpeedLevelMax(i32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_level_flags() {
        assert!(SpeedLevel::Full.motion_compensation());
        assert!(!SpeedLevel::Full.quick());
        assert!(SpeedLevel::Quick.motion_compensation());
        assert!(SpeedLevel::Quick.quick());
        assert!(!SpeedLevel::NoMotion.motion_compensation());
        assert!(SpeedLevel::NoMotion.quick());
    }

    #[test]
    fn test_from_request() {
        assert_eq!(
            Control::from_request(14, ControlPayload::Int(1)).unwrap(),
            Control::SetSpeedLevel(SpeedLevel::Quick)
        );
        assert_eq!(
            Control::from_request(12, ControlPayload::None).unwrap(),
            Control::GetSpeedLevelMax
        );
        assert_eq!(
            Control::from_request(2, ControlPayload::None).unwrap(),
            Control::SetQuantParams(None)
        );
        let info = Box::new(QuantInfo::vp31());
        assert_eq!(
            Control::from_request(2, ControlPayload::QuantParams(Some(info.clone()))).unwrap(),
            Control::SetQuantParams(Some(info))
        );
    }

    #[test]
    fn test_from_request_errors() {
        assert!(matches!(
            Control::from_request(14, ControlPayload::Int(3)),
            Err(TheoraError::InvalidArgument(_))
        ));
        assert!(matches!(
            Control::from_request(14, ControlPayload::Int(-1)),
            Err(TheoraError::InvalidArgument(_))
        ));
        assert!(matches!(
            Control::from_request(14, ControlPayload::None),
            Err(TheoraError::InvalidArgument(_))
        ));
        assert!(matches!(
            Control::from_request(99, ControlPayload::None),
            Err(TheoraError::UnsupportedControl(99))
        ));
    }

    #[test]
    fn test_ids() {
        for id in [2, 10, 12] {
            assert_eq!(Control::from_request(id, ControlPayload::None).unwrap().id(), id);
        }
        assert!(Control::SetVp3Compatible.changes_setup());
        assert!(!Control::GetSpeedLevelMax.changes_setup());
    }
}
