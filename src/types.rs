use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fuzzy::FuzzyOptions;

/// Template uuid the external tool assigns to login items. The only template
/// with a specialized mapping; everything else degrades to `Item::Other`.
pub const LOGIN_TEMPLATE_UUID: &str = "001";

pub const DEFAULT_USER_AVATAR_URL: &str =
    "https://a.1password.com/app/images/avatar-person-default.png";
pub const DEFAULT_VAULT_AVATAR_URL: &str =
    "https://a.1password.com/app/images/avatar-vault-default.png";

// ---------------------------------------------------------------------------
// Stable entities returned to callers.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Account {
    pub uuid: String,
    pub name: String,
    pub avatar_url: String,
    /// Account-scoped base URL other avatar paths are resolved against.
    pub base_avatar_url: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct User {
    pub uuid: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserDetails {
    pub uuid: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub avatar_url: String,
    pub language: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_auth_at: Option<DateTime<Utc>>,
}

/// Schema identifier classifying an item's field layout. The catalog is
/// fetched once per session and reused to label items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    pub uuid: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vault {
    pub uuid: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VaultDetails {
    pub uuid: String,
    pub name: String,
    pub description: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BaseItem {
    pub uuid: String,
    pub vault: VaultDetails,
    pub template: Template,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoginItem {
    #[serde(flatten)]
    pub base: BaseItem,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// An item specialized by its template. Only the login template currently
/// carries extra fields; unknown templates pass through unspecialized.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Item {
    Login(LoginItem),
    Other(BaseItem),
}

impl Item {
    pub fn uuid(&self) -> &str {
        match self {
            Item::Login(item) => &item.base.uuid,
            Item::Other(item) => &item.uuid,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Item::Login(item) => &item.base.title,
            Item::Other(item) => &item.title,
        }
    }
}

/// Query-time filters for item listing. Never mutated; pass `default()` for
/// an unfiltered listing.
#[derive(Debug, Clone, Default)]
pub struct ItemsOptions {
    /// Scope the listing to one vault (`--vault=<name>`).
    pub vault: Option<Vault>,
    /// Keep only items of this template.
    pub template: Option<Template>,
    /// Free-text query applied fuzzily over the raw records before mapping.
    pub query: Option<String>,
    /// Tuning for the fuzzy match; ignored when `query` is `None`.
    pub fuzzy: FuzzyOptions,
}

// ---------------------------------------------------------------------------
// Wire records: lenient mirrors of the external tool's JSON. Instants arrive
// either as RFC 3339 strings or epoch numbers depending on the record, so
// they stay `serde_json::Value` until normalization.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawAccount {
    #[serde(default)]
    pub(crate) uuid: String,
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) avatar: String,
    #[serde(default, rename = "baseAvatarURL")]
    pub(crate) base_avatar_url: String,
    #[serde(default, rename = "createdAt")]
    pub(crate) created_at: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawUser {
    #[serde(default)]
    pub(crate) uuid: String,
    #[serde(default, rename = "firstName")]
    pub(crate) first_name: String,
    #[serde(default, rename = "lastName")]
    pub(crate) last_name: String,
    #[serde(default)]
    pub(crate) email: String,
    #[serde(default)]
    pub(crate) avatar: String,
    #[serde(default)]
    pub(crate) language: String,
    #[serde(default, rename = "createdAt")]
    pub(crate) created_at: serde_json::Value,
    #[serde(default, rename = "updatedAt")]
    pub(crate) updated_at: serde_json::Value,
    #[serde(default, rename = "lastAuthAt")]
    pub(crate) last_auth_at: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawVault {
    #[serde(default)]
    pub(crate) uuid: String,
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) desc: String,
    /// `"P"` personal, `"E"` everyone, anything else is an ordinary vault.
    #[serde(default, rename = "type")]
    pub(crate) vault_type: String,
    #[serde(default)]
    pub(crate) avatar: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawItemOverview {
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) ainfo: String,
    #[serde(default)]
    pub(crate) url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawItemField {
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) designation: Option<String>,
    #[serde(default)]
    pub(crate) value: Option<String>,
    #[serde(default, rename = "type")]
    pub(crate) field_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawItemDetails {
    #[serde(default)]
    pub(crate) fields: Vec<RawItemField>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawItem {
    #[serde(default)]
    pub(crate) uuid: String,
    #[serde(default, rename = "vaultUuid")]
    pub(crate) vault_uuid: String,
    #[serde(default, rename = "templateUuid")]
    pub(crate) template_uuid: String,
    #[serde(default)]
    pub(crate) overview: RawItemOverview,
    #[serde(default)]
    pub(crate) details: Option<RawItemDetails>,
}
