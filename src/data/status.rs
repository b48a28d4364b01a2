//! Measured-versus-target status classification.

/// How a measured temperature compares to a drink's target.
///
/// Derived on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// Colder than the target.
    Below,
    /// Exactly at the target.
    AtTarget,
    /// Hotter than the target.
    Above,
    /// No target, or the measurement is not a number.
    #[default]
    Unknown,
}

impl Status {
    /// Indicator color used by the cup display.
    pub fn color(&self) -> &'static str {
        match self {
            Self::Below => "dodgerblue",
            Self::AtTarget => "green",
            Self::Above => "red",
            Self::Unknown => "gray",
        }
    }

    /// Whether the comparison produced a definite answer.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Below => write!(f, "Below target"),
            Self::AtTarget => write!(f, "At target"),
            Self::Above => write!(f, "Above target"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Classify `measured` against `target`.
///
/// Comparison is exact; there is no tolerance band, so `60.0` vs `60.0` is
/// `AtTarget` but `60.01` vs `60.0` is `Above`.
///
/// # Example
///
/// ```
/// use splashcup_link::{classify, Status};
///
/// assert_eq!(classify(65.0, Some(60.0)), Status::Above);
/// assert_eq!(classify(60.0, None), Status::Unknown);
/// ```
pub fn classify(measured: f64, target: Option<f64>) -> Status {
    let Some(target) = target else {
        return Status::Unknown;
    };

    if measured.is_nan() || target.is_nan() {
        return Status::Unknown;
    }

    match measured.partial_cmp(&target) {
        Some(std::cmp::Ordering::Greater) => Status::Above,
        Some(std::cmp::Ordering::Less) => Status::Below,
        Some(std::cmp::Ordering::Equal) => Status::AtTarget,
        None => Status::Unknown,
    }
}
