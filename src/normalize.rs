use chrono::{DateTime, TimeZone, Utc};

use crate::types::{
    Account, BaseItem, Item, LoginItem, RawAccount, RawItem, RawItemField, RawUser, Template, User,
    UserDetails, VaultDetails, DEFAULT_USER_AVATAR_URL, LOGIN_TEMPLATE_UUID,
};

/// Instants arrive from the tool either as RFC 3339 strings or as epoch
/// seconds depending on the record.
pub(crate) fn instant_from_value(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc)),
        serde_json::Value::Number(number) => number
            .as_i64()
            .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single()),
        _ => None,
    }
}

/// Uniform avatar derivation: a non-empty path resolves against the base,
/// absence falls back to the entity-specific default asset.
pub(crate) fn avatar_or_default(base: &str, path: &str, default_asset: &str) -> String {
    if path.is_empty() {
        default_asset.to_string()
    } else {
        format!("{base}/{path}")
    }
}

pub(crate) fn map_account(raw: RawAccount) -> Account {
    Account {
        avatar_url: format!("{}{}/{}", raw.base_avatar_url, raw.uuid, raw.avatar),
        base_avatar_url: format!("{}{}", raw.base_avatar_url, raw.uuid),
        created_at: instant_from_value(&raw.created_at),
        uuid: raw.uuid,
        name: raw.name,
    }
}

fn user_avatar_url(raw: &RawUser, account: &Account) -> String {
    avatar_or_default(&account.base_avatar_url, &raw.avatar, DEFAULT_USER_AVATAR_URL)
}

pub(crate) fn map_user(raw: RawUser, account: &Account) -> User {
    User {
        avatar_url: user_avatar_url(&raw, account),
        uuid: raw.uuid,
        first_name: raw.first_name,
        last_name: raw.last_name,
        email: raw.email,
    }
}

pub(crate) fn map_user_details(raw: RawUser, account: &Account) -> UserDetails {
    UserDetails {
        avatar_url: user_avatar_url(&raw, account),
        created_at: instant_from_value(&raw.created_at),
        updated_at: instant_from_value(&raw.updated_at),
        last_auth_at: instant_from_value(&raw.last_auth_at),
        uuid: raw.uuid,
        first_name: raw.first_name,
        last_name: raw.last_name,
        email: raw.email,
        language: raw.language,
    }
}

fn is_password_field(field: &RawItemField, by: fn(&RawItemField) -> Option<&str>) -> bool {
    field.field_type == "P" && by(field).is_some_and(|tag| tag.eq_ignore_ascii_case("password"))
}

/// Extract a login item's password: the field *named* "password" wins over
/// the field *designated* "password" when both exist; either must be of
/// password type.
fn extract_password(raw: &RawItem) -> Option<String> {
    let fields = &raw.details.as_ref()?.fields;
    let by_name = fields
        .iter()
        .find(|field| is_password_field(field, |f| f.name.as_deref()));
    let by_designation = fields
        .iter()
        .find(|field| is_password_field(field, |f| f.designation.as_deref()));
    by_name.or(by_designation).and_then(|field| field.value.clone())
}

/// Apply the template-keyed mapper to one raw record whose vault and
/// template have already been resolved. Unknown templates pass through
/// unspecialized.
pub(crate) fn map_item(raw: &RawItem, vault: VaultDetails, template: Template) -> Item {
    let base = BaseItem {
        uuid: raw.uuid.clone(),
        vault,
        template,
        title: raw.overview.title.clone(),
    };
    match base.template.uuid.as_str() {
        LOGIN_TEMPLATE_UUID => Item::Login(LoginItem {
            username: raw.overview.ainfo.clone(),
            password: extract_password(raw),
            base,
        }),
        _ => Item::Other(base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawItemDetails, RawItemOverview};

    fn login_template() -> Template {
        Template {
            uuid: LOGIN_TEMPLATE_UUID.to_string(),
            name: "Login".to_string(),
        }
    }

    fn home_vault() -> VaultDetails {
        VaultDetails {
            uuid: "v1".to_string(),
            name: "Home".to_string(),
            description: String::new(),
            avatar_url: String::new(),
        }
    }

    fn field(
        name: Option<&str>,
        designation: Option<&str>,
        value: &str,
        field_type: &str,
    ) -> RawItemField {
        RawItemField {
            name: name.map(str::to_string),
            designation: designation.map(str::to_string),
            value: Some(value.to_string()),
            field_type: field_type.to_string(),
        }
    }

    fn login_raw(fields: Vec<RawItemField>) -> RawItem {
        RawItem {
            uuid: "i1".to_string(),
            vault_uuid: "v1".to_string(),
            template_uuid: LOGIN_TEMPLATE_UUID.to_string(),
            overview: RawItemOverview {
                title: "Example".to_string(),
                ainfo: "bob".to_string(),
                url: String::new(),
            },
            details: Some(RawItemDetails { fields }),
        }
    }

    #[test]
    fn avatar_falls_back_to_default_asset() {
        assert_eq!(
            avatar_or_default("https://cdn.example.com/a1", "", DEFAULT_USER_AVATAR_URL),
            DEFAULT_USER_AVATAR_URL
        );
        assert_eq!(
            avatar_or_default("https://cdn.example.com/a1", "me.png", DEFAULT_USER_AVATAR_URL),
            "https://cdn.example.com/a1/me.png"
        );
    }

    #[test]
    fn account_avatar_is_concatenated() {
        let account = map_account(RawAccount {
            uuid: "a1".to_string(),
            name: "Acme".to_string(),
            avatar: "logo.png".to_string(),
            base_avatar_url: "https://cdn.example.com/".to_string(),
            created_at: serde_json::json!("2020-01-02T03:04:05Z"),
        });
        assert_eq!(account.avatar_url, "https://cdn.example.com/a1/logo.png");
        assert_eq!(account.base_avatar_url, "https://cdn.example.com/a1");
        assert!(account.created_at.is_some());
    }

    #[test]
    fn instants_parse_from_strings_and_epochs() {
        assert!(instant_from_value(&serde_json::json!("2020-01-02T03:04:05Z")).is_some());
        assert!(instant_from_value(&serde_json::json!(1_577_934_245)).is_some());
        assert!(instant_from_value(&serde_json::json!(null)).is_none());
        assert!(instant_from_value(&serde_json::json!("yesterday")).is_none());
    }

    #[test]
    fn login_mapping_prefers_name_over_designation() {
        let raw = login_raw(vec![
            field(None, Some("password"), "from-designation", "P"),
            field(Some("password"), None, "from-name", "P"),
        ]);
        let item = map_item(&raw, home_vault(), login_template());
        match item {
            Item::Login(login) => assert_eq!(login.password.as_deref(), Some("from-name")),
            other => panic!("expected login item, got {other:?}"),
        }
    }

    #[test]
    fn login_mapping_requires_password_type() {
        let raw = login_raw(vec![field(Some("password"), None, "plain-text", "T")]);
        let item = map_item(&raw, home_vault(), login_template());
        match item {
            Item::Login(login) => {
                assert!(login.password.is_none());
                assert_eq!(login.username, "bob");
            }
            other => panic!("expected login item, got {other:?}"),
        }
    }

    #[test]
    fn missing_details_still_maps_username() {
        let mut raw = login_raw(Vec::new());
        raw.details = None;
        match map_item(&raw, home_vault(), login_template()) {
            Item::Login(login) => {
                assert_eq!(login.username, "bob");
                assert!(login.password.is_none());
            }
            other => panic!("expected login item, got {other:?}"),
        }
    }

    #[test]
    fn unknown_template_stays_unspecialized() {
        let mut raw = login_raw(Vec::new());
        raw.template_uuid = "005".to_string();
        let template = Template {
            uuid: "005".to_string(),
            name: "Password".to_string(),
        };
        match map_item(&raw, home_vault(), template) {
            Item::Other(base) => assert_eq!(base.title, "Example"),
            other => panic!("expected unspecialized item, got {other:?}"),
        }
    }
}
