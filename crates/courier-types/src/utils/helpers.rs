//! Time helpers.

/// Current unix time in seconds, 0 if the clock is before the epoch.
pub fn current_timestamp() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}

/// Seconds elapsed between `earlier` and `now`, saturating at zero.
pub fn seconds_since(earlier: u64, now: u64) -> u64 {
	now.saturating_sub(earlier)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_seconds_since_saturates() {
		assert_eq!(seconds_since(100, 160), 60);
		assert_eq!(seconds_since(200, 100), 0);
	}
}
