use serde::{Deserialize, Serialize};

/// Size of one signal element; governs byte-order conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ElementSize {
    #[default]
    One,
    Two,
    Four,
    Eight,
}

impl ElementSize {
    pub fn bytes(self) -> usize {
        match self {
            ElementSize::One => 1,
            ElementSize::Two => 2,
            ElementSize::Four => 4,
            ElementSize::Eight => 8,
        }
    }
}

impl TryFrom<u8> for ElementSize {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ElementSize::One),
            2 => Ok(ElementSize::Two),
            4 => Ok(ElementSize::Four),
            8 => Ok(ElementSize::Eight),
            other => Err(format!("element size must be 1, 2, 4 or 8 (got {other})")),
        }
    }
}

impl From<ElementSize> for u8 {
    fn from(size: ElementSize) -> Self {
        size.bytes() as u8
    }
}

/// Where a signal sits in its stream sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum SignalPlacement {
    /// DISCRETE, ANALOG and NAD: a constant byte offset.
    Fixed { byte_offset: usize },
    /// VNAD: emission order within the sample.
    Vnad { position: usize },
}

/// Static description of one signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalConfig {
    pub name: String,
    #[serde(default)]
    pub element_size: ElementSize,
    /// Number of elements. For VNAD signals this is the maximum.
    #[serde(default = "default_element_count")]
    pub element_count: usize,
    #[serde(flatten)]
    pub placement: SignalPlacement,
}

fn default_element_count() -> usize {
    1
}

impl SignalConfig {
    /// A signal at a fixed byte offset.
    pub fn fixed(
        name: impl Into<String>,
        element_size: ElementSize,
        element_count: usize,
        byte_offset: usize,
    ) -> Self {
        Self {
            name: name.into(),
            element_size,
            element_count,
            placement: SignalPlacement::Fixed { byte_offset },
        }
    }

    /// A variable-length signal emitted at `position`.
    pub fn vnad(
        name: impl Into<String>,
        element_size: ElementSize,
        max_element_count: usize,
        position: usize,
    ) -> Self {
        Self {
            name: name.into(),
            element_size,
            element_count: max_element_count,
            placement: SignalPlacement::Vnad { position },
        }
    }

    /// Size in bytes (maximum size for VNAD signals). Saturates at
    /// `usize::MAX` for counts no sample could hold.
    pub fn byte_size(&self) -> usize {
        self.element_size.bytes().saturating_mul(self.element_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_signal() {
        let signal: SignalConfig = serde_json::from_str(
            r#"{"name":"altitude","element_size":4,"element_count":2,"layout":"fixed","byte_offset":8}"#,
        )
        .unwrap();
        assert_eq!(signal, SignalConfig::fixed("altitude", ElementSize::Four, 2, 8));
        assert_eq!(signal.byte_size(), 8);
    }

    #[test]
    fn parses_vnad_signal_with_defaults() {
        let signal: SignalConfig =
            serde_json::from_str(r#"{"name":"label","layout":"vnad","position":3}"#).unwrap();
        assert_eq!(signal, SignalConfig::vnad("label", ElementSize::One, 1, 3));
    }

    #[test]
    fn rejects_odd_element_size() {
        let err = serde_json::from_str::<SignalConfig>(
            r#"{"name":"x","element_size":3,"layout":"fixed","byte_offset":0}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("element size"));
    }
}
