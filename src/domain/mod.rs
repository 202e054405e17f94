//! Domain types, DTOs and business rules for the marketplace.

/// Declares a string-backed enum stored as TEXT in Postgres and serialized
/// as its snake_case value.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(#[serde(rename = $value)] $variant),+
        }

        impl $name {
            #[allow(dead_code)]
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    other => Err(format!("invalid {} '{}'", stringify!($name), other)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <str as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> sqlx::encode::IsNull {
                <&str as sqlx::Encode<'q, sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let raw = <&str as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)?;
                Ok(raw.parse::<$name>()?)
            }
        }
    };
}

pub mod accounts;
pub mod analytics;
pub mod auth;
pub mod collaborations;
pub mod community;
pub mod listings;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod reviews;

#[cfg(test)]
mod tests {
    text_enum! {
        enum Shade {
            Light => "light",
            DarkGrey => "dark_grey",
        }
    }

    #[test]
    fn text_enum_round_trips_through_str_and_serde() {
        assert_eq!(Shade::DarkGrey.as_str(), "dark_grey");
        assert_eq!("light".parse::<Shade>(), Ok(Shade::Light));
        assert!("Light".parse::<Shade>().is_err());
        assert_eq!(serde_json::to_string(&Shade::DarkGrey).unwrap(), "\"dark_grey\"");
        assert_eq!(Shade::ALL.len(), 2);
        assert_eq!(Shade::Light.to_string(), "light");
    }
}
