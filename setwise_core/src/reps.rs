//! Rep specification parsing.
//!
//! A rep spec is either a bare count (`"10"`) or an inclusive range
//! (`"8-12"`). Anything else is malformed and yields no options, which is
//! kept distinct from "zero reps" at the type level.

/// The rep counts a user may choose from for one set
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RepOptions {
    /// Non-empty list of selectable rep counts, ascending
    Choices(Vec<u32>),
    /// The spec could not be parsed; carries the raw text
    Malformed(String),
}

impl RepOptions {
    /// Parse a rep spec into its option list
    pub fn parse(spec: &str) -> Self {
        match parse_choices(spec) {
            Some(choices) => RepOptions::Choices(choices),
            None => {
                tracing::warn!("Unparseable rep spec {:?}, no options available", spec);
                RepOptions::Malformed(spec.to_string())
            }
        }
    }

    /// Selectable rep counts; empty when malformed
    pub fn as_slice(&self) -> &[u32] {
        match self {
            RepOptions::Choices(choices) => choices,
            RepOptions::Malformed(_) => &[],
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, RepOptions::Malformed(_))
    }

    pub fn contains(&self, reps: u32) -> bool {
        self.as_slice().contains(&reps)
    }

    /// Highest selectable count, if any
    pub fn max(&self) -> Option<u32> {
        self.as_slice().last().copied()
    }
}

fn parse_choices(spec: &str) -> Option<Vec<u32>> {
    let spec = spec.trim();
    if spec.is_empty() {
        return None;
    }

    if let Some((low, high)) = spec.split_once('-') {
        let low: u32 = low.trim().parse().ok()?;
        let high: u32 = high.trim().parse().ok()?;
        if low > high {
            return None;
        }
        return Some((low..=high).collect());
    }

    spec.parse::<u32>().ok().map(|n| vec![n])
}
