use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;

use op_client::{
    Credentials, FuzzyOptions, ItemsOptions, OpClient, Session, Template, Vault,
};

#[derive(Parser)]
#[command(name = "op-client")]
#[command(about = "Typed client for the 1Password `op` command-line tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Installation prefix for the op executable (a versioned directory is
    /// created next to it).
    #[arg(long, default_value = "./bin/op")]
    install_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download the op executable for this platform if missing.
    Setup,

    /// Exchange credentials for a session token and print it.
    Signin,

    /// Show the signed-in account.
    Account,

    /// List the account's users.
    Users,

    /// Show one user with details.
    User { id: String },

    /// List the item template catalog.
    Templates,

    /// List vaults.
    Vaults,

    /// Show one vault with details.
    Vault { id: String },

    /// List items, optionally scoped and filtered.
    Items {
        /// Vault uuid or name to scope the listing to.
        #[arg(long)]
        vault: Option<String>,
        /// Template uuid or name to keep.
        #[arg(long)]
        template: Option<String>,
        /// Fuzzy text query over uuid, vault uuid, title, info and URL.
        #[arg(long)]
        query: Option<String>,
    },

    /// Show one item.
    Item { id: String },
}

fn env_required(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    let value = std::env::var(name).unwrap_or_default();
    if value.trim().is_empty() {
        return Err(
            io::Error::new(io::ErrorKind::InvalidInput, format!("Missing {name}")).into(),
        );
    }
    Ok(value)
}

fn env_optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Credentials come from OP_DOMAIN / OP_EMAIL / OP_SECRET_KEY; the master
/// password from OP_MASTER_PASSWORD or, failing that, a stderr-prompted
/// line read from stdin.
fn load_credentials() -> Result<Credentials, Box<dyn std::error::Error>> {
    let domain = env_required("OP_DOMAIN")?;
    let email = env_required("OP_EMAIL")?;
    let secret_key = env_required("OP_SECRET_KEY")?;
    let master_password = match env_optional("OP_MASTER_PASSWORD") {
        Some(value) => value,
        None => {
            eprint!("Master password: ");
            io::stderr().flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\n', '\r']).to_string()
        }
    };
    Ok(Credentials {
        domain,
        email,
        secret_key,
        master_password,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn signin(client: &OpClient, install_dir: &PathBuf) -> Result<Session, Box<dyn std::error::Error>> {
    let credentials = load_credentials()?;
    Ok(client.signin(&credentials, install_dir)?)
}

fn resolve_vault(
    client: &OpClient,
    session: &Session,
    wanted: &str,
) -> Result<Vault, Box<dyn std::error::Error>> {
    let vaults = client.get_vaults(session)?;
    vaults
        .into_iter()
        .find(|vault| vault.uuid == wanted || vault.name.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| format!("no vault matching '{wanted}'").into())
}

fn resolve_template(
    client: &OpClient,
    session: &Session,
    wanted: &str,
) -> Result<Template, Box<dyn std::error::Error>> {
    let templates = client.get_templates(session)?;
    templates
        .into_iter()
        .find(|template| template.uuid == wanted || template.name.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| format!("no template matching '{wanted}'").into())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = OpClient::new();

    match cli.command {
        Command::Setup => {
            let path = client.setup(&cli.install_dir)?;
            println!("Installed {}", path.display());
            Ok(())
        }

        Command::Signin => {
            let session = signin(&client, &cli.install_dir)?;
            print_json(&serde_json::json!({
                "token": session.token,
                "email": session.email,
                "expires_at": session.expires_at,
            }))
        }

        Command::Account => {
            let session = signin(&client, &cli.install_dir)?;
            print_json(&client.get_account(&session)?)
        }

        Command::Users => {
            let session = signin(&client, &cli.install_dir)?;
            print_json(&client.get_users(&session)?)
        }

        Command::User { id } => {
            let session = signin(&client, &cli.install_dir)?;
            print_json(&client.get_user(&session, &id)?)
        }

        Command::Templates => {
            let session = signin(&client, &cli.install_dir)?;
            print_json(&client.get_templates(&session)?)
        }

        Command::Vaults => {
            let session = signin(&client, &cli.install_dir)?;
            print_json(&client.get_vaults(&session)?)
        }

        Command::Vault { id } => {
            let session = signin(&client, &cli.install_dir)?;
            print_json(&client.get_vault(&session, &id)?)
        }

        Command::Items {
            vault,
            template,
            query,
        } => {
            let session = signin(&client, &cli.install_dir)?;
            let options = ItemsOptions {
                vault: vault
                    .map(|wanted| resolve_vault(&client, &session, &wanted))
                    .transpose()?,
                template: template
                    .map(|wanted| resolve_template(&client, &session, &wanted))
                    .transpose()?,
                query,
                fuzzy: FuzzyOptions::default(),
            };
            print_json(&client.get_items(&session, &options)?)
        }

        Command::Item { id } => {
            let session = signin(&client, &cli.install_dir)?;
            print_json(&client.get_item(&session, &id)?)
        }
    }
}
