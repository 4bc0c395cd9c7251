use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use s_curve_authz::authz::codegen::{AccessPolicyGenerator, CypherRenderer, SqlRenderer};
use s_curve_authz::authz::{Action, Permission, Privileges, Session};
use s_curve_authz::{models, policies, AuthzConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "s-curve authorization tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the row-level security statements for every resource
    DumpAccessPolicies {
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show how a permission resolves for a set of roles
    Explain {
        #[arg(long)]
        resource: String,
        #[arg(long)]
        action: String,
        #[arg(long)]
        prop: Option<String>,
        /// Scoped roles, e.g. `admin` or `project:member`
        #[arg(long = "role")]
        roles: Vec<String>,
        #[arg(long)]
        user: Option<Uuid>,
    },
    /// List the powers granted to a set of roles
    Powers {
        #[arg(long = "role")]
        roles: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    // Try to load env from CWD, then fall back to the crate-local `.env`.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AuthzConfig::from_env();
    let resources = models::resources().context("invalid resource catalogue")?;
    let privileges = s_curve_authz::initialize(resources, &policies::registry(), config)
        .context("failed to compile authorization policies")?;

    match cli.command {
        Commands::DumpAccessPolicies { out } => dump_access_policies(&privileges, out)?,
        Commands::Explain {
            resource,
            action,
            prop,
            roles,
            user,
        } => {
            let action = Action::parse(&action)
                .with_context(|| format!("unknown action `{action}` (read, edit, create, delete)"))?;
            let session = session(user, &roles);
            explain(&privileges, &session, &resource, action, prop.as_deref())?;
        }
        Commands::Powers { roles } => {
            let session = session(None, &roles);
            let powers = privileges.executor().powers_for(&session)?;
            if powers.is_empty() {
                println!("(no powers)");
            }
            for power in powers {
                println!("{power}");
            }
        }
    }

    Ok(())
}

fn session(user: Option<Uuid>, roles: &[String]) -> Session {
    Session::new(user.unwrap_or_else(Uuid::new_v4)).with_roles(roles)
}

fn dump_access_policies(privileges: &Privileges, out: Option<PathBuf>) -> anyhow::Result<()> {
    let generator = AccessPolicyGenerator::new(privileges.executor(), privileges.config());
    let statements = generator
        .all_statements()
        .context("failed to generate access policies")?;

    let mut sql = String::from("-- generated by `cli dump-access-policies`; do not edit\n");
    for statement in &statements {
        sql.push_str(&statement.sql());
        sql.push('\n');
    }

    match out {
        Some(path) => {
            fs::write(&path, sql)
                .with_context(|| format!("failed to write access policies to {}", path.display()))?;
            println!("Wrote {} statements to {}", statements.len(), path.display());
        }
        None => print!("{sql}"),
    }
    Ok(())
}

fn explain(
    privileges: &Privileges,
    session: &Session,
    resource: &str,
    action: Action,
    prop: Option<&str>,
) -> anyhow::Result<()> {
    let permission = privileges.resolve(action, session, resource, prop, true)?;
    println!("permission: {permission}");

    let Permission::When(condition) = &permission else {
        return Ok(());
    };
    let enhanced = privileges.executor().resources().get(resource)?;

    let cypher = CypherRenderer::new("node").render(condition, session);
    println!("cypher:     {}", cypher.text);
    if !cypher.params.is_empty() {
        println!("params:     {}", serde_json::Value::Object(cypher.params));
    }

    let sql = SqlRenderer::new("t", enhanced.db.clone()).render(condition, session);
    println!("sql:        {}", sql.sql());
    Ok(())
}
