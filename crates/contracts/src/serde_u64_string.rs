//! Seeds ride through JSON as strings so the full 64-bit range survives
//! clients that parse numbers as doubles. Either form is accepted on the
//! way in.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};

pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(value)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrInt;

    impl<'de> Visitor<'de> for StringOrInt {
        type Value = u64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a u64 or its decimal string form")
        }

        fn visit_u64<E>(self, value: u64) -> Result<u64, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_str<E>(self, value: &str) -> Result<u64, E>
        where
            E: de::Error,
        {
            value.parse::<u64>().map_err(de::Error::custom)
        }
    }

    deserializer.deserialize_any(StringOrInt)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Seeded {
        #[serde(with = "super")]
        seed: u64,
    }

    #[test]
    fn seed_serializes_as_string() {
        let json = serde_json::to_string(&Seeded { seed: u64::MAX }).expect("serialize");
        assert_eq!(json, r#"{"seed":"18446744073709551615"}"#);
    }

    #[test]
    fn seed_parses_from_string_or_number() {
        let from_string: Seeded = serde_json::from_str(r#"{"seed":"7"}"#).expect("string form");
        let from_number: Seeded = serde_json::from_str(r#"{"seed":7}"#).expect("number form");
        assert_eq!(from_string, from_number);
    }

    #[test]
    fn garbage_seed_is_rejected() {
        assert!(serde_json::from_str::<Seeded>(r#"{"seed":"not-a-number"}"#).is_err());
    }
}
