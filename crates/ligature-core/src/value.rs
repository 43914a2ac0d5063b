//! Representations a parameter's merged value can be read as.
//!
//! DSP code asks a [`Parameter`](crate::Parameter) for its value in the shape
//! it needs. Each shape implements [`InternalValue`], which states which
//! scales it is valid for and how to project the per-channel state into it.
//!
//! | Representation    | Valid scales           |
//! |-------------------|------------------------|
//! | `f32`             | continuous, mono       |
//! | `[f32; 2]`        | continuous             |
//! | `bool`            | toggle                 |
//! | `usize`           | toggle, indexed        |
//! | [`IndexedOption`] | indexed                |

use serde::{Deserialize, Serialize};

use crate::details::ParameterDetails;

/// Maximum number of channels a parameter tracks.
pub const MAX_CHANNELS: usize = 2;

/// One value per channel. Mono parameters mirror channel 0 into channel 1.
pub type ChannelValues = [f32; MAX_CHANNELS];

/// Clamps a UI, host, or snapshot write into `[0, 1]`. Non-finite writes
/// yield `None` and are dropped by the caller.
#[inline]
pub(crate) fn unit_value(value: f32) -> Option<f32> {
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

/// Position of an indexed parameter's value inside its option groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IndexedOption {
    /// Option group index.
    pub option: usize,
    /// Entry within the group.
    pub sub_index: usize,
}

/// A shape a parameter's value can be projected into.
pub trait InternalValue: Sized {
    /// Name used in error messages.
    const NAME: &'static str;

    /// Whether this representation is meaningful for `details`.
    fn supports(details: &ParameterDetails) -> bool;

    /// Projects per-channel values into this representation.
    ///
    /// Total for every input; callers check [`supports`](Self::supports)
    /// first to catch misuse.
    fn project(values: &ChannelValues, details: &ParameterDetails) -> Self;
}

impl InternalValue for f32 {
    const NAME: &'static str = "f32";

    fn supports(details: &ParameterDetails) -> bool {
        !details.scale.is_discrete() && !details.is_stereo()
    }

    fn project(values: &ChannelValues, _details: &ParameterDetails) -> Self {
        values[0]
    }
}

impl InternalValue for ChannelValues {
    const NAME: &'static str = "[f32; 2]";

    fn supports(details: &ParameterDetails) -> bool {
        !details.scale.is_discrete()
    }

    fn project(values: &ChannelValues, _details: &ParameterDetails) -> Self {
        *values
    }
}

impl InternalValue for bool {
    const NAME: &'static str = "bool";

    fn supports(details: &ParameterDetails) -> bool {
        matches!(details.scale, crate::ParamScale::Toggle)
    }

    fn project(values: &ChannelValues, _details: &ParameterDetails) -> Self {
        values[0] >= 0.5
    }
}

impl InternalValue for usize {
    const NAME: &'static str = "usize";

    fn supports(details: &ParameterDetails) -> bool {
        details.scale.is_discrete()
    }

    fn project(values: &ChannelValues, _details: &ParameterDetails) -> Self {
        libm::roundf(values[0]).max(0.0) as usize
    }
}

impl InternalValue for IndexedOption {
    const NAME: &'static str = "IndexedOption";

    fn supports(details: &ParameterDetails) -> bool {
        matches!(details.scale, crate::ParamScale::Indexed)
    }

    fn project(values: &ChannelValues, details: &ParameterDetails) -> Self {
        details
            .locate_option(usize::project(values, details))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OptionGroup, ParamFlags, ParamId};

    #[test]
    fn continuous_representations() {
        let mono = ParameterDetails::continuous(ParamId(1), "Gain", 0.0, 1.0, 0.5);
        assert!(f32::supports(&mono));
        assert!(ChannelValues::supports(&mono));
        assert!(!bool::supports(&mono));
        assert!(!usize::supports(&mono));

        let stereo = mono.with_flags(ParamFlags::STEREO);
        assert!(!f32::supports(&stereo));
        assert_eq!(ChannelValues::project(&[0.1, 0.9], &stereo), [0.1, 0.9]);
    }

    #[test]
    fn discrete_representations() {
        let toggle = ParameterDetails::toggle(ParamId(2), "On", false);
        assert!(bool::supports(&toggle));
        assert!(usize::supports(&toggle));
        assert!(!IndexedOption::supports(&toggle));
        assert!(bool::project(&[1.0, 1.0], &toggle));

        let indexed = ParameterDetails::indexed(
            ParamId(3),
            "Mode",
            vec![
                OptionGroup::with_entries("A", ["a1", "a2"]),
                OptionGroup::single("B"),
            ],
            0,
        );
        assert!(IndexedOption::supports(&indexed));
        assert!(!f32::supports(&indexed));
        assert_eq!(
            IndexedOption::project(&[1.0, 1.0], &indexed),
            IndexedOption { option: 0, sub_index: 1 }
        );
        assert_eq!(usize::project(&[2.0, 2.0], &indexed), 2);
    }
}
