use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;

use crate::broker::shell_quote;
use crate::cache::{call_signature, QueryCache, QUERY_CACHE_TTL_MS};
use crate::engine::{Engine, ExecOptions};
use crate::error::{ClientError, Result};
use crate::fuzzy;
use crate::install;
use crate::normalize::{map_account, map_item, map_user, map_user_details};
use crate::session::{token_expiration, Credentials, Session};
use crate::types::{
    Account, Item, ItemsOptions, RawAccount, RawItem, RawUser, RawVault, Template, User,
    UserDetails, Vault, VaultDetails, DEFAULT_VAULT_AVATAR_URL,
};

fn shape_error(what: &str, err: serde_json::Error) -> ClientError {
    ClientError::query(format!("unexpected {what} payload: {err}"))
}

/// Typed facade over the external password-manager CLI. Owns the query
/// engine and the memoization cache; safe to share across threads. All
/// state is in-memory for the client's lifetime, nothing is persisted.
pub struct OpClient {
    engine: Engine,
    cache: QueryCache,
}

impl Default for OpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OpClient {
    pub fn new() -> Self {
        Self {
            engine: Engine::new(),
            cache: QueryCache::new(Duration::from_millis(QUERY_CACHE_TTL_MS)),
        }
    }

    pub(crate) fn with_engine(engine: Engine) -> Self {
        Self {
            engine,
            cache: QueryCache::new(Duration::from_millis(QUERY_CACHE_TTL_MS)),
        }
    }

    /// Download the executable for this platform if it is not already
    /// installed under `install_dir`.
    pub fn setup(&self, install_dir: &Path) -> Result<PathBuf> {
        install::ensure_installed(install_dir, install::OP_CLI_VERSION, std::env::consts::OS)
    }

    /// Exchange credentials for a session token. The master password is fed
    /// through the pre-step pipeline channel so it never appears in argv.
    pub fn signin(&self, credentials: &Credentials, install_dir: &Path) -> Result<Session> {
        let verb = format!(
            "signin {} {} {} --output=raw",
            credentials.domain, credentials.email, credentials.secret_key
        );
        let pre_step = format!("echo {}", shell_quote(&credentials.master_password));
        let payload = self.engine.run(
            &verb,
            ExecOptions {
                raw: true,
                pre_step: Some(pre_step),
                install_dir: Some(install_dir),
                ..Default::default()
            },
        )?;

        Ok(Session {
            token: payload.into_raw(),
            email: credentials.email.clone(),
            expires_at: token_expiration(Utc::now()),
            install_dir: install_dir.to_path_buf(),
        })
    }

    /// One memoized privileged query: cache hit inside the TTL window short
    /// circuits, otherwise the engine spawns the external tool. Failed
    /// queries are not cached and retry on the next call.
    fn query(
        &self,
        session: &Session,
        verb: &str,
        args: serde_json::Value,
        vault: Option<&Vault>,
    ) -> Result<serde_json::Value> {
        let key = call_signature(&session.token, verb, &args);
        self.cache.get_or_fetch(&key, || {
            self.engine
                .run(
                    verb,
                    ExecOptions {
                        session: Some(session),
                        vault,
                        ..Default::default()
                    },
                )?
                .into_json()
        })
    }

    pub fn get_account(&self, session: &Session) -> Result<Account> {
        let value = self.query(session, "get account", serde_json::json!(null), None)?;
        let raw: RawAccount =
            serde_json::from_value(value).map_err(|err| shape_error("account", err))?;
        Ok(map_account(raw))
    }

    pub fn get_users(&self, session: &Session) -> Result<Vec<User>> {
        let value = self.query(session, "list users", serde_json::json!(null), None)?;
        let raws: Vec<RawUser> =
            serde_json::from_value(value).map_err(|err| shape_error("users", err))?;
        let account = self.get_account(session)?;
        Ok(raws
            .into_iter()
            .map(|raw| map_user(raw, &account))
            .collect())
    }

    pub fn get_user(&self, session: &Session, id: &str) -> Result<UserDetails> {
        let verb = format!("get user {id}");
        let value = self.query(session, &verb, serde_json::json!([id]), None)?;
        let raw: RawUser = serde_json::from_value(value).map_err(|err| shape_error("user", err))?;
        let account = self.get_account(session)?;
        Ok(map_user_details(raw, &account))
    }

    pub fn get_templates(&self, session: &Session) -> Result<Vec<Template>> {
        let value = self.query(session, "list templates", serde_json::json!(null), None)?;
        serde_json::from_value(value).map_err(|err| shape_error("templates", err))
    }

    pub fn get_vaults(&self, session: &Session) -> Result<Vec<Vault>> {
        let value = self.query(session, "list vaults", serde_json::json!(null), None)?;
        serde_json::from_value(value).map_err(|err| shape_error("vaults", err))
    }

    pub fn get_vault(&self, session: &Session, id: &str) -> Result<VaultDetails> {
        let verb = format!("get vault {id}");
        let value = self.query(session, &verb, serde_json::json!([id]), None)?;
        let raw: RawVault =
            serde_json::from_value(value).map_err(|err| shape_error("vault", err))?;
        let account = self.get_account(session)?;

        // Personal vaults borrow the requesting user's avatar, everyone
        // vaults the account's; an explicit path overrides, else default.
        let avatar_url = match raw.vault_type.as_str() {
            "P" => self.get_user(session, &session.email)?.avatar_url,
            "E" => account.avatar_url,
            _ if !raw.avatar.is_empty() => {
                format!("{}/{}", account.base_avatar_url, raw.avatar)
            }
            _ => DEFAULT_VAULT_AVATAR_URL.to_string(),
        };

        Ok(VaultDetails {
            uuid: raw.uuid,
            name: raw.name,
            description: raw.desc,
            avatar_url,
        })
    }

    /// List items, optionally scoped to a vault, narrowed by fuzzy text
    /// match over the raw records, then filtered by template, all before
    /// normalization. Output order follows the tool's listing order.
    pub fn get_items(&self, session: &Session, options: &ItemsOptions) -> Result<Vec<Item>> {
        let args = serde_json::json!({
            "vault": options.vault.as_ref().map(|vault| vault.uuid.as_str()),
            "template": options.template.as_ref().map(|template| template.uuid.as_str()),
            "query": options.query,
            "threshold": options.fuzzy.threshold,
            "location": options.fuzzy.location,
            "distance": options.fuzzy.distance,
            "minMatchCharLength": options.fuzzy.min_match_char_length,
            "keys": options.fuzzy.keys,
        });
        let value = self.query(session, "list items", args, options.vault.as_ref())?;
        let raws: Vec<RawItem> =
            serde_json::from_value(value).map_err(|err| shape_error("items", err))?;

        let raws = match &options.query {
            Some(query) => fuzzy::search(&raws, query, &options.fuzzy),
            None => raws,
        };

        raws.iter()
            .filter(|raw| {
                options
                    .template
                    .as_ref()
                    .is_none_or(|template| raw.template_uuid == template.uuid)
            })
            .map(|raw| self.resolve_item(session, raw))
            .collect()
    }

    pub fn get_item(&self, session: &Session, id: &str) -> Result<Item> {
        let verb = format!("get item {id}");
        let value = self.query(session, &verb, serde_json::json!([id]), None)?;
        let raw: RawItem = serde_json::from_value(value).map_err(|err| shape_error("item", err))?;
        self.resolve_item(session, &raw)
    }

    /// Resolve one raw record's vault and template through the cached fetch
    /// paths, then apply the template-keyed mapper. An item whose template
    /// is missing from the catalog degrades to an unspecialized entry with
    /// the uuid preserved.
    fn resolve_item(&self, session: &Session, raw: &RawItem) -> Result<Item> {
        let vault = self.get_vault(session, &raw.vault_uuid)?;
        let template = self
            .get_templates(session)?
            .into_iter()
            .find(|template| template.uuid == raw.template_uuid)
            .unwrap_or_else(|| Template {
                uuid: raw.template_uuid.clone(),
                name: String::new(),
            });
        Ok(map_item(raw, vault, template))
    }
}
