use time::{OffsetDateTime, UtcOffset};

/// Whole calendar months elapsed from `from` to `to`, both taken in UTC.
/// A month only counts once the day and time of `from` have been reached
/// again, so Jan 31 -> Feb 28 is zero months.
pub fn months_between(from: OffsetDateTime, to: OffsetDateTime) -> i32 {
    let a = from.to_offset(UtcOffset::UTC);
    let b = to.to_offset(UtcOffset::UTC);
    let mut months = (b.year() - a.year()) * 12 + (b.month() as i32 - a.month() as i32);
    if (b.day(), b.time()) < (a.day(), a.time()) {
        months -= 1;
    }
    months
}

/// `retention_months == 0` keeps archives forever.
pub fn is_expired(archived: OffsetDateTime, now: OffsetDateTime, retention_months: u32) -> bool {
    retention_months > 0 && months_between(archived, now) >= retention_months as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use time::macros::datetime;

    #[test]
    fn counts_whole_months() {
        assert_eq!(
            months_between(datetime!(2024-01-15 12:00 UTC), datetime!(2024-03-15 12:00 UTC)),
            2
        );
        assert_eq!(
            months_between(datetime!(2024-01-15 12:00 UTC), datetime!(2024-03-15 11:59 UTC)),
            1
        );
        assert_eq!(
            months_between(datetime!(2023-11-30 0:00 UTC), datetime!(2024-02-01 0:00 UTC)),
            2
        );
    }

    #[test]
    fn short_month_end_is_not_a_month() {
        assert_eq!(
            months_between(datetime!(2024-01-31 8:00 UTC), datetime!(2024-02-29 8:00 UTC)),
            0
        );
    }

    #[test]
    fn offsets_are_normalized() {
        // 2024-02-01 01:00 +02:00 is still January in UTC.
        assert_eq!(
            months_between(datetime!(2024-01-31 23:00 UTC), datetime!(2024-02-01 01:00 +2)),
            0
        );
    }

    #[test]
    fn expiry_threshold() {
        let now = datetime!(2024-06-20 10:00 UTC);
        assert!(is_expired(now - Duration::days(62), now, 1));
        assert!(!is_expired(now - Duration::days(10), now, 1));
        assert!(!is_expired(now - Duration::days(4000), now, 0));
    }
}
