//! Typed client facade over the 1Password `op` command-line tool.
//!
//! Authenticates, lists and fetches vaults, users, templates and items, and
//! normalizes the tool's heterogeneous nested JSON into stable shapes, while
//! managing the executable's lifecycle (download, locate, invoke) and
//! short-lived authentication sessions. Every privileged call flows through
//! one choke point: session gate → subprocess broker → result classifier →
//! normalization, with a short-TTL memoization cache keyed by call signature
//! in front.

mod broker;
mod cache;
mod classify;
mod client;
mod engine;
mod error;
mod fuzzy;
mod install;
mod normalize;
mod session;
mod types;

pub use broker::{invoke, Invocation, BIN_ERROR_SENTINEL};
pub use classify::{classify, Payload};
pub use client::OpClient;
pub use error::{ClientError, Result};
pub use fuzzy::FuzzyOptions;
pub use install::{ensure_installed, executable_path, is_installed, OP_CLI_VERSION};
pub use session::{Credentials, Session, SESSION_TTL_MINUTES};
pub use types::{
    Account, BaseItem, Item, ItemsOptions, LoginItem, Template, User, UserDetails, Vault,
    VaultDetails, DEFAULT_USER_AVATAR_URL, DEFAULT_VAULT_AVATAR_URL, LOGIN_TEMPLATE_UUID,
};
