use chrono::Duration;

/// Alert threshold bands for an active SLA policy metric, ordered by
/// urgency. Bands are half-open `(lower, upper]`; a deadline already in the
/// past classifies as `Breached`. Nothing fires above three hours.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SlaUrgency {
    ThreeHours,
    TwoHours,
    OneHour,
    ThirtyMinutes,
    FifteenMinutes,
    Breached,
}

impl SlaUrgency {
    /// Classify the time remaining until breach. Returns `None` when the
    /// deadline is too far out to warrant an alert.
    pub fn classify(remaining: Duration) -> Option<Self> {
        if remaining < Duration::zero() {
            return Some(Self::Breached);
        }

        let minutes = Duration::minutes;
        let hours = Duration::hours;
        match remaining {
            t if t <= minutes(15) => Some(Self::FifteenMinutes),
            t if t <= minutes(30) => Some(Self::ThirtyMinutes),
            t if t <= hours(1) => Some(Self::OneHour),
            t if t <= hours(2) => Some(Self::TwoHours),
            t if t <= hours(3) => Some(Self::ThreeHours),
            _ => None,
        }
    }

    /// Human label used in chat alerts and the alert log.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Breached => "SLA Breached",
            Self::ThreeHours => "Less than 3 hours remaining",
            Self::TwoHours => "Less than 2 hours remaining",
            Self::OneHour => "Less than 1 hour remaining",
            Self::ThirtyMinutes => "Less than 30 minutes remaining",
            Self::FifteenMinutes => "Less than 15 minutes remaining",
        }
    }
}

impl std::fmt::Display for SlaUrgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
