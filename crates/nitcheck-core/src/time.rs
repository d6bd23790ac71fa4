use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Current UTC timestamp.
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Current UTC timestamp as an RFC 3339 string, used for consent stamping
/// and analytics events.
pub fn now_rfc3339() -> String {
    now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_parses_back() {
        let stamp = now_rfc3339();
        OffsetDateTime::parse(&stamp, &Rfc3339).unwrap();
    }
}
