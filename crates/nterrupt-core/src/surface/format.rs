//! Text shown on a blocking surface.

use serde::{Deserialize, Serialize};

const FIVE_MINUTES_MS: u64 = 5 * 60 * 1000;
const ONE_MINUTE_MS: u64 = 60 * 1000;
const TEN_SECONDS_MS: u64 = 10 * 1000;

/// Format remaining time as `mm:ss`. Minutes are not capped at 59.
pub fn format_remaining(remaining_ms: u64) -> String {
    let total_secs = remaining_ms / 1000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

pub fn surface_title(display_name: &str) -> String {
    format!("{display_name} is Blocked")
}

/// Advisory message band, chosen by remaining time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryBand {
    /// More than five minutes left.
    Distant,
    /// More than one minute left.
    Close,
    /// More than ten seconds left.
    Imminent,
    Final,
}

impl AdvisoryBand {
    pub fn for_remaining(remaining_ms: u64) -> Self {
        if remaining_ms > FIVE_MINUTES_MS {
            AdvisoryBand::Distant
        } else if remaining_ms > ONE_MINUTE_MS {
            AdvisoryBand::Close
        } else if remaining_ms > TEN_SECONDS_MS {
            AdvisoryBand::Imminent
        } else {
            AdvisoryBand::Final
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AdvisoryBand::Distant => "This app will be available again in:",
            AdvisoryBand::Close => "Almost there! Just a little longer...",
            AdvisoryBand::Imminent => "Getting ready to unlock...",
            AdvisoryBand::Final => "Unlocking now...",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_is_zero_padded() {
        assert_eq!(format_remaining(0), "00:00");
        assert_eq!(format_remaining(999), "00:00");
        assert_eq!(format_remaining(61_000), "01:01");
        assert_eq!(format_remaining(300_000), "05:00");
        assert_eq!(format_remaining(2 * 60 * 60 * 1000), "120:00");
    }

    #[test]
    fn bands_use_strict_thresholds() {
        assert_eq!(AdvisoryBand::for_remaining(300_001), AdvisoryBand::Distant);
        assert_eq!(AdvisoryBand::for_remaining(300_000), AdvisoryBand::Close);
        assert_eq!(AdvisoryBand::for_remaining(60_000), AdvisoryBand::Imminent);
        assert_eq!(AdvisoryBand::for_remaining(10_001), AdvisoryBand::Imminent);
        assert_eq!(AdvisoryBand::for_remaining(10_000), AdvisoryBand::Final);
        assert_eq!(AdvisoryBand::for_remaining(0), AdvisoryBand::Final);
    }

    #[test]
    fn title_names_the_entity() {
        assert_eq!(surface_title("Social"), "Social is Blocked");
    }
}
