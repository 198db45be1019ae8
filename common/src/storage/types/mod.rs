use serde::{Deserialize, Serialize};
pub mod book;
pub mod extracted_metadata;
pub mod extraction_job;
pub mod stored_file;

pub trait StoredObject: Serialize + for<'de> Deserialize<'de> {
    fn table_name() -> &'static str;
    fn get_id(&self) -> &str;
}

/// Serde adapters between plain Rust values and SurrealDB's record ids and
/// datetimes. Used through `#[serde(with = ...)]` on stored records.
pub mod surreal_serde {
    use chrono::{DateTime, Utc};
    use serde::{
        de::{self, Visitor},
        Deserialize, Deserializer, Serialize, Serializer,
    };
    use std::fmt;
    use surrealdb::sql::{Datetime, Thing};

    /// Accepts a record id either as a bare string or as a `Thing`.
    pub mod record_id {
        use super::{de, fmt, Deserialize, Deserializer, Serializer, Thing, Visitor};

        struct RecordIdVisitor;

        impl<'de> Visitor<'de> for RecordIdVisitor {
            type Value = String;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or a record id")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                Ok(value.to_string())
            }

            fn visit_string<E: de::Error>(self, value: String) -> Result<Self::Value, E> {
                Ok(value)
            }

            fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let thing = Thing::deserialize(de::value::MapAccessDeserializer::new(map))?;
                Ok(thing.id.to_raw())
            }
        }

        pub fn serialize<S: Serializer>(id: &str, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(id)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
            deserializer.deserialize_any(RecordIdVisitor)
        }
    }

    pub mod datetime {
        use super::{DateTime, Datetime, Deserialize, Deserializer, Serialize, Serializer, Utc};

        pub fn serialize<S: Serializer>(
            date: &DateTime<Utc>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            Datetime::from(*date).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<DateTime<Utc>, D::Error> {
            Ok(DateTime::<Utc>::from(Datetime::deserialize(deserializer)?))
        }
    }

    pub mod option_datetime {
        use super::{DateTime, Datetime, Deserialize, Deserializer, Serializer, Utc};

        pub fn serialize<S: Serializer>(
            date: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match date {
                Some(date) => serializer.serialize_some(&Datetime::from(*date)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let value = Option::<Datetime>::deserialize(deserializer)?;
            Ok(value.map(DateTime::<Utc>::from))
        }
    }
}

/// Declares a SurrealDB record struct with `id`, `created_at` and
/// `updated_at` plus the given fields, and implements [`StoredObject`] for it.
/// Only usable inside this crate, since the serde paths are crate-relative.
#[macro_export]
macro_rules! stored_object {
    ($name:ident, $table:expr, {$($(#[$attr:meta])* $field:ident: $ty:ty),*}) => {
        use serde::{Deserialize, Serialize};
        use chrono::{DateTime, Utc};
        use $crate::storage::types::StoredObject;

        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
        pub struct $name {
            #[serde(with = "crate::storage::types::surreal_serde::record_id")]
            pub id: String,
            #[serde(with = "crate::storage::types::surreal_serde::datetime", default)]
            pub created_at: DateTime<Utc>,
            #[serde(with = "crate::storage::types::surreal_serde::datetime", default)]
            pub updated_at: DateTime<Utc>,
            $( $(#[$attr])* pub $field: $ty),*
        }

        impl StoredObject for $name {
            fn table_name() -> &'static str {
                $table
            }

            fn get_id(&self) -> &str {
                &self.id
            }
        }
    };
}
