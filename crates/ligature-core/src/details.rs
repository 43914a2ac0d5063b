//! Parameter descriptions: identity, range, scaling curve, display.
//!
//! A [`ParameterDetails`] is the immutable-per-update description a
//! [`Parameter`](crate::Parameter) carries. It owns the mapping between the
//! normalized `[0, 1]` value that UI controls and hosts exchange, and the
//! scaled ("internal") value DSP code reads.
//!
//! # Scaling Formulas
//!
//! - **Linear**: `min + n * (max - min)`
//! - **Logarithmic**: `min * (max / min)^n` (requires `min > 0`)
//! - **Power(exp)**: `min + n^exp * (max - min)`
//! - **Frequency**: logarithmic with `max` clamped to `0.49 * sample_rate`
//! - **Toggle**: `0.0` below `0.5`, `1.0` at or above
//! - **Indexed**: `round(n * (option_count - 1))`
//!
//! # Example
//!
//! ```rust
//! use ligature_core::{ParamId, ParameterDetails};
//!
//! let cutoff = ParameterDetails::frequency(ParamId(10), "Cutoff", 20.0, 20_000.0, 1_000.0);
//! let n = cutoff.to_normalized(1_000.0, 48_000.0);
//! assert!((cutoff.to_internal(n, 48_000.0) - 1_000.0).abs() < 0.5);
//! assert_eq!(cutoff.format_value(n, 48_000.0), "1000.0 Hz");
//! ```

use serde::{Deserialize, Serialize};

use crate::value::IndexedOption;

/// Fraction of the sample rate a frequency-scaled parameter may reach.
pub const NYQUIST_GUARD: f32 = 0.49;

/// Scaling curve between normalized and internal values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ParamScale {
    /// Equal resolution across the range.
    #[default]
    Linear,
    /// More resolution at low values. Requires `min > 0`.
    Logarithmic,
    /// Power curve; exponent > 1 gives more resolution at the low end of the knob.
    Power(f32),
    /// Logarithmic, upper bound limited by the sample rate.
    Frequency,
    /// Two-state switch.
    Toggle,
    /// One of the entries of the parameter's option groups.
    Indexed,
}

impl ParamScale {
    /// Whether values snap to discrete steps.
    pub const fn is_discrete(self) -> bool {
        matches!(self, Self::Toggle | Self::Indexed)
    }

    /// Whether the scaled value depends on the sample rate.
    pub const fn depends_on_sample_rate(self) -> bool {
        matches!(self, Self::Frequency)
    }
}

/// Stable parameter identifier for automation and preset persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ParamId(pub u32);

/// Capability flags.
///
/// ```rust
/// use ligature_core::ParamFlags;
///
/// let flags = ParamFlags::AUTOMATABLE.union(ParamFlags::STEREO);
/// assert!(flags.contains(ParamFlags::STEREO));
/// assert!(!flags.contains(ParamFlags::HIDDEN));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamFlags(u8);

impl ParamFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Host can automate this parameter.
    pub const AUTOMATABLE: Self = Self(1 << 0);
    /// One value per channel instead of one shared value.
    pub const STEREO: Self = Self(1 << 1);
    /// Hidden from generic host UI.
    pub const HIDDEN: Self = Self(1 << 2);
    /// Display only.
    pub const READ_ONLY: Self = Self(1 << 3);
    /// Accepts modulator contributions.
    pub const MODULATABLE: Self = Self(1 << 4);

    /// Returns `true` if all bits in `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of two flag sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl Default for ParamFlags {
    fn default() -> Self {
        Self::AUTOMATABLE.union(Self::MODULATABLE)
    }
}

/// Unit type for display and text parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParamUnit {
    /// Decibels.
    Decibels,
    /// Hertz.
    Hertz,
    /// Milliseconds.
    Milliseconds,
    /// Percentage.
    Percent,
    /// Ratio (n:1).
    Ratio,
    /// Dimensionless.
    #[default]
    None,
}

impl ParamUnit {
    /// Suffix appended to formatted values.
    ///
    /// ```rust
    /// use ligature_core::ParamUnit;
    ///
    /// assert_eq!(ParamUnit::Decibels.suffix(), " dB");
    /// assert_eq!(ParamUnit::Percent.suffix(), "%");
    /// ```
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Decibels => " dB",
            Self::Hertz => " Hz",
            Self::Milliseconds => " ms",
            Self::Percent => "%",
            Self::Ratio => ":1",
            Self::None => "",
        }
    }

    /// Unit label reported to hosts (suffix without padding).
    pub fn label(self) -> &'static str {
        self.suffix().trim_start()
    }

    /// Decimal places used when formatting.
    pub const fn precision(self) -> usize {
        match self {
            Self::Percent => 0,
            Self::None => 2,
            _ => 1,
        }
    }
}

/// Named group of options for an indexed parameter.
///
/// A group without entries counts as a single option named after the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionGroup {
    /// Group name.
    pub name: String,
    /// Entry names within the group.
    #[serde(default)]
    pub entries: Vec<String>,
}

impl OptionGroup {
    /// Group with no sub-entries.
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Group with named sub-entries.
    pub fn with_entries<I, S>(name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    fn len(&self) -> usize {
        self.entries.len().max(1)
    }

    fn entry_name(&self, sub_index: usize) -> &str {
        self.entries.get(sub_index).map_or(self.name.as_str(), String::as_str)
    }
}

/// Full description of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDetails {
    /// Stable identifier.
    pub id: ParamId,
    /// Display name.
    pub name: String,
    /// Abbreviated name for narrow displays.
    #[serde(default)]
    pub short_name: String,
    /// Display unit.
    #[serde(default)]
    pub unit: ParamUnit,
    /// Lower bound of the internal value.
    pub min: f32,
    /// Upper bound of the internal value.
    pub max: f32,
    /// Default position in `[0, 1]`.
    pub default_normalized: f32,
    /// Scaling curve.
    #[serde(default)]
    pub scale: ParamScale,
    /// Capability flags.
    #[serde(default)]
    pub flags: ParamFlags,
    /// Options for [`ParamScale::Indexed`].
    #[serde(default)]
    pub options: Vec<OptionGroup>,
}

impl ParameterDetails {
    /// Linear parameter; `default` is given in internal units.
    pub fn continuous(id: ParamId, name: &str, min: f32, max: f32, default: f32) -> Self {
        let mut details = Self {
            id,
            name: name.to_owned(),
            short_name: name.to_owned(),
            unit: ParamUnit::None,
            min,
            max,
            default_normalized: 0.0,
            scale: ParamScale::Linear,
            flags: ParamFlags::default(),
            options: Vec::new(),
        };
        details.default_normalized = details.to_normalized(default, 0.0);
        details
    }

    /// Frequency parameter in Hz with Nyquist-limited logarithmic scaling.
    pub fn frequency(id: ParamId, name: &str, min: f32, max: f32, default: f32) -> Self {
        let mut details = Self::continuous(id, name, min, max, min).with_unit(ParamUnit::Hertz);
        details.scale = ParamScale::Frequency;
        details.default_normalized = details.to_normalized(default, 0.0);
        details
    }

    /// On/off switch.
    pub fn toggle(id: ParamId, name: &str, default: bool) -> Self {
        Self {
            scale: ParamScale::Toggle,
            default_normalized: if default { 1.0 } else { 0.0 },
            ..Self::continuous(id, name, 0.0, 1.0, 0.0)
        }
    }

    /// Enumerated parameter; `default_index` is a flat option index.
    pub fn indexed(id: ParamId, name: &str, options: Vec<OptionGroup>, default_index: usize) -> Self {
        let count: usize = options.iter().map(OptionGroup::len).sum();
        let mut details = Self {
            scale: ParamScale::Indexed,
            options,
            ..Self::continuous(id, name, 0.0, count.saturating_sub(1) as f32, 0.0)
        };
        details.default_normalized = details.to_normalized(default_index as f32, 0.0);
        details
    }

    /// Sets the short display name.
    pub fn with_short_name(mut self, short_name: &str) -> Self {
        self.short_name = short_name.to_owned();
        self
    }

    /// Sets the display unit.
    pub fn with_unit(mut self, unit: ParamUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Sets the scaling curve.
    pub fn with_scale(mut self, scale: ParamScale) -> Self {
        self.scale = scale;
        self
    }

    /// Sets the capability flags.
    pub fn with_flags(mut self, flags: ParamFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the default normalized position.
    pub fn with_default_normalized(mut self, default_normalized: f32) -> Self {
        self.default_normalized = default_normalized.clamp(0.0, 1.0);
        self
    }

    /// Whether this parameter carries one value per channel.
    pub fn is_stereo(&self) -> bool {
        self.flags.contains(ParamFlags::STEREO)
    }

    /// Number of independent channels (1 or 2).
    pub fn channel_count(&self) -> usize {
        if self.is_stereo() { 2 } else { 1 }
    }

    /// Number of steps between the lowest and highest value; 0 when continuous.
    pub fn step_count(&self) -> usize {
        match self.scale {
            ParamScale::Toggle => 1,
            ParamScale::Indexed => self.option_count().saturating_sub(1),
            _ => 0,
        }
    }

    /// Total number of selectable options across all groups.
    pub fn option_count(&self) -> usize {
        self.options.iter().map(OptionGroup::len).sum()
    }

    /// Maps a flat option index to its group and position inside the group.
    pub fn locate_option(&self, flat: usize) -> Option<IndexedOption> {
        let mut remaining = flat;
        for (option, group) in self.options.iter().enumerate() {
            if remaining < group.len() {
                return Some(IndexedOption {
                    option,
                    sub_index: remaining,
                });
            }
            remaining -= group.len();
        }
        None
    }

    /// Display name of a flat option index.
    pub fn option_name(&self, flat: usize) -> Option<&str> {
        let located = self.locate_option(flat)?;
        Some(self.options[located.option].entry_name(located.sub_index))
    }

    /// Upper bound actually reachable at `sample_rate`.
    ///
    /// A non-positive sample rate leaves the bound unclamped.
    pub fn effective_max(&self, sample_rate: f32) -> f32 {
        if self.scale.depends_on_sample_rate() && sample_rate > 0.0 {
            self.max.min(NYQUIST_GUARD * sample_rate).max(self.min)
        } else {
            self.max
        }
    }

    /// Clamps an internal value to the range.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min.min(self.max), self.max.max(self.min))
    }

    /// Maps a normalized value to the internal value.
    #[inline]
    pub fn to_internal(&self, normalized: f32, sample_rate: f32) -> f32 {
        let n = normalized.clamp(0.0, 1.0);
        let range = self.max - self.min;
        match self.scale {
            ParamScale::Linear => self.min + n * range,
            ParamScale::Power(exp) => self.min + libm::powf(n, exp) * range,
            ParamScale::Logarithmic => log_curve(self.min, self.max, n),
            ParamScale::Frequency => log_curve(self.min, self.effective_max(sample_rate), n),
            ParamScale::Toggle => {
                if n >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            ParamScale::Indexed => libm::roundf(n * self.step_count() as f32),
        }
    }

    /// Maps an internal value to its normalized position.
    pub fn to_normalized(&self, value: f32, sample_rate: f32) -> f32 {
        let range = self.max - self.min;
        let n = match self.scale {
            ParamScale::Linear if range != 0.0 => (value - self.min) / range,
            ParamScale::Power(exp) if range != 0.0 && exp != 0.0 => {
                libm::powf(((value - self.min) / range).clamp(0.0, 1.0), 1.0 / exp)
            }
            ParamScale::Logarithmic => log_position(self.min, self.max, value),
            ParamScale::Frequency => log_position(self.min, self.effective_max(sample_rate), value),
            ParamScale::Toggle => {
                if value >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            ParamScale::Indexed => {
                let steps = self.step_count();
                if steps == 0 {
                    0.0
                } else {
                    libm::roundf(value).clamp(0.0, steps as f32) / steps as f32
                }
            }
            _ => 0.0,
        };
        n.clamp(0.0, 1.0)
    }

    /// Formats a normalized value for display.
    ///
    /// ```rust
    /// use ligature_core::{ParamId, ParamUnit, ParameterDetails};
    ///
    /// let gain = ParameterDetails::continuous(ParamId(1), "Gain", -60.0, 12.0, 0.0)
    ///     .with_unit(ParamUnit::Decibels);
    /// assert_eq!(gain.format_value(1.0, 48_000.0), "12.0 dB");
    /// ```
    pub fn format_value(&self, normalized: f32, sample_rate: f32) -> String {
        let internal = self.to_internal(normalized, sample_rate);
        match self.scale {
            ParamScale::Toggle => String::from(if internal >= 0.5 { "On" } else { "Off" }),
            ParamScale::Indexed => self
                .option_name(internal as usize)
                .map_or_else(|| format!("{}", internal as usize), str::to_owned),
            _ => format!(
                "{:.*}{}",
                self.unit.precision(),
                internal,
                self.unit.suffix()
            ),
        }
    }

    /// Parses display text back to a normalized value.
    ///
    /// Accepts numbers with or without the unit suffix, option names
    /// (case-insensitive), flat option indices, and on/off/true/false.
    pub fn parse_value(&self, text: &str, sample_rate: f32) -> Option<f32> {
        let text = text.trim();
        match self.scale {
            ParamScale::Toggle => match text.to_ascii_lowercase().as_str() {
                "on" | "true" | "yes" | "1" => Some(1.0),
                "off" | "false" | "no" | "0" => Some(0.0),
                _ => None,
            },
            ParamScale::Indexed => {
                let flat = (0..self.option_count())
                    .find(|&i| {
                        self.option_name(i)
                            .is_some_and(|name| name.eq_ignore_ascii_case(text))
                    })
                    .or_else(|| text.parse::<usize>().ok())
                    .filter(|&i| i < self.option_count())?;
                Some(self.to_normalized(flat as f32, sample_rate))
            }
            _ => {
                let label = self.unit.label();
                let number = if label.is_empty() {
                    text
                } else {
                    text.strip_suffix(label).unwrap_or(text).trim_end()
                };
                let value = number.parse::<f32>().ok().filter(|v| v.is_finite())?;
                Some(self.to_normalized(self.clamp(value), sample_rate))
            }
        }
    }
}

fn log_curve(min: f32, max: f32, n: f32) -> f32 {
    if min <= 0.0 || max <= 0.0 {
        return min + n * (max - min);
    }
    min * libm::powf(max / min, n)
}

fn log_position(min: f32, max: f32, value: f32) -> f32 {
    if min <= 0.0 || max <= 0.0 {
        let range = max - min;
        return if range == 0.0 { 0.0 } else { (value - min) / range };
    }
    if max == min || value <= 0.0 {
        return 0.0;
    }
    libm::logf(value / min) / libm::logf(max / min)
}
