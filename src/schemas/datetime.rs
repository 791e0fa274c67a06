use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};

pub(crate) fn parse_flexible(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    // datetime-local inputs arrive without an offset; those are read as UTC.
    if let Ok(value) =
        PrimitiveDateTime::parse(raw, &format_description!("[year]-[month]-[day]T[hour]:[minute]"))
    {
        return Some(value.assume_utc());
    }
    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(value.assume_utc());
    }

    None
}

pub(crate) fn deserialize_optional<'de, D>(
    deserializer: D,
) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_flexible(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
            .map(Some),
        None => Ok(None),
    }
}

/// PATCH semantics: a missing key stays `None`, an explicit `null` becomes `Some(None)`.
pub(crate) fn deserialize_patch<'de, D>(
    deserializer: D,
) -> Result<Option<Option<OffsetDateTime>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_optional(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use time::macros::datetime;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "deserialize_patch")]
        ends_at: Option<Option<OffsetDateTime>>,
    }

    #[test]
    fn accepts_rfc3339_and_local_forms() {
        assert_eq!(
            parse_flexible("2025-03-01T10:00:00+03:00"),
            Some(datetime!(2025-03-01 07:00 UTC))
        );
        assert_eq!(parse_flexible("2025-03-01T10:00"), Some(datetime!(2025-03-01 10:00 UTC)));
        assert_eq!(parse_flexible("2025-03-01T10:00:30"), Some(datetime!(2025-03-01 10:00:30 UTC)));
        assert_eq!(parse_flexible("yesterday"), None);
    }

    #[test]
    fn patch_distinguishes_missing_from_null() {
        let missing: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.ends_at, None);

        let cleared: Patch = serde_json::from_str(r#"{"ends_at": null}"#).unwrap();
        assert_eq!(cleared.ends_at, Some(None));

        let set: Patch = serde_json::from_str(r#"{"ends_at": "2025-03-01T10:00:00Z"}"#).unwrap();
        assert_eq!(set.ends_at, Some(Some(datetime!(2025-03-01 10:00 UTC))));
    }
}
