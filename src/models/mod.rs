//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request/response bodies exchanged with API clients.

/// Declares a closed set of values stored as `TEXT` in Postgres.
///
/// The generated enum serializes as its snake_case text in JSON and binds
/// and decodes as a plain string column in sqlx. Unknown text is rejected
/// with `AppError::InvalidRequest`.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(crate::error::AppError::InvalidRequest(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<'q, sqlx::Postgres>>::encode(self.as_str(), buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let text = <&str as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)?;
                Ok(text.parse::<$name>()?)
            }
        }
    };
}

/// AI assist settings and proposed actions
pub mod ai;
/// API key authentication model
pub mod api_key;
/// Automation rules: triggers, conditions and actions
pub mod automation;
/// Canned (reusable) replies
pub mod canned_response;
/// Companies and contacts (CRM-lite)
pub mod contact;
/// Knowledge base articles
pub mod kb;
/// Admin configuration: channels, SLA policies, banners, installed apps
pub mod settings;
/// Tickets, messages and tags
pub mod ticket;
/// Webhook endpoints and event payloads
pub mod webhook;
/// Workspaces (tenants) and agent users
pub mod workspace;

/// Pagination parameters shared by list endpoints.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    /// Clamped `(limit, offset)` suitable for binding into `LIMIT/OFFSET`.
    pub fn bounds(&self) -> (i64, i64) {
        let limit = self
            .limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

/// Treat an optional string as absent when it is blank.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Require a trimmed, non-empty string field.
pub fn required(field: &str, value: &str) -> Result<String, crate::error::AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(crate::error::AppError::InvalidRequest(format!(
            "{field} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

/// Distinguishes an absent JSON field from an explicit `null`.
///
/// Use with `#[serde(default, deserialize_with = "double_option")]` on an
/// `Option<Option<T>>` field: absent → `None`, `null` → `Some(None)`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds_clamp_limit_and_offset() {
        assert_eq!(Page { limit: None, offset: None }.bounds(), (50, 0));
        assert_eq!(Page { limit: Some(1000), offset: Some(-4) }.bounds(), (200, 0));
        assert_eq!(Page { limit: Some(0), offset: Some(20) }.bounds(), (1, 20));
    }

    #[test]
    fn required_trims_and_rejects_blank() {
        assert_eq!(required("subject", "  Printer on fire ").unwrap(), "Printer on fire");
        assert!(required("subject", "   ").is_err());
    }

    #[test]
    fn text_enums_share_one_spelling() {
        use ticket::TicketStatus;

        let status: TicketStatus = "pending".parse().unwrap();
        assert_eq!(status, TicketStatus::Pending);
        assert_eq!(status.to_string(), "pending");
        assert_eq!(serde_json::to_value(status).unwrap(), "pending");
        assert!(matches!(
            "archived".parse::<TicketStatus>(),
            Err(crate::error::AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn double_option_separates_null_from_absent() {
        #[derive(serde::Deserialize)]
        struct Patch {
            #[serde(default, deserialize_with = "double_option")]
            assignee_id: Option<Option<uuid::Uuid>>,
        }

        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert!(absent.assignee_id.is_none());

        let cleared: Patch = serde_json::from_str(r#"{"assignee_id": null}"#).unwrap();
        assert_eq!(cleared.assignee_id, Some(None));
    }
}
