use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser};
use portaria::app_state::{AppState, SharedAppState};
use portaria::init_telemetry;
use portaria::services::authorization::{AuthorizationSession, SessionManager};
use portaria::stop_flag;
use portaria_types::{GuardState, Identity, Module, Permission};
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(name = "portaria")]
#[command(about = "Authorization core of the clinic administration app")]
#[clap(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
enum Commands {
    /// Show current configuration and exit
    Config,
    /// Evaluate an access guard for an identity
    Check(CheckCommand),
    /// List the permissions an identity holds per module
    Permissions(IdentityArgs),
    /// Grant a permission within a module to an identity
    Grant(GrantCommand),
    /// Revoke a permission within a module from an identity
    Revoke(GrantCommand),
    /// Keep a session open and print its permissions whenever they change
    Watch(IdentityArgs),
}

#[derive(Args, Debug)]
struct IdentityArgs {
    /// Identity id to evaluate
    #[arg(long)]
    identity: String,

    /// Role label of the identity
    #[arg(long, default_value = "")]
    role: String,

    /// Print JSON instead of text
    #[arg(long, default_value = "false")]
    json: bool,
}

#[derive(Args, Debug)]
struct CheckCommand {
    #[command(flatten)]
    identity: IdentityArgs,

    /// Module machine name, e.g. "pacientes"
    #[arg(long)]
    module: String,

    /// Permission machine name, e.g. "edit"
    #[arg(long)]
    permission: String,
}

#[derive(Args, Debug)]
struct GrantCommand {
    /// Identity id of the administrator performing the change
    #[arg(long = "as", env = "PORTARIA_ACTING_IDENTITY")]
    acting_identity: String,

    /// Identity receiving or losing the permission
    #[arg(long)]
    identity: String,

    /// Module machine name
    #[arg(long)]
    module: String,

    /// Permission machine name
    #[arg(long)]
    permission: String,
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    identity: &'a str,
    module: &'a str,
    permission: &'a str,
    state: GuardState,
}

#[derive(Serialize)]
struct ModulePermissions {
    module: String,
    display_name: String,
    permissions: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let app_state = AppState::new().await?;

    if let Commands::Config = cli.command {
        println!("{:#?}", &app_state.settings);
        return Ok(());
    }

    init_telemetry::init_tracing(app_state.settings.debug)?;

    match cli.command {
        Commands::Config => Ok(()),
        Commands::Check(cmd) => check(app_state, cmd).await,
        Commands::Permissions(args) => permissions(app_state, args).await,
        Commands::Grant(cmd) => grant(app_state, cmd).await,
        Commands::Revoke(cmd) => revoke(app_state, cmd).await,
        Commands::Watch(args) => watch(app_state, args).await,
    }
}

async fn open_session(
    app_state: &SharedAppState,
    args: &IdentityArgs,
) -> Result<(SessionManager, Arc<AuthorizationSession>)> {
    app_state
        .identity
        .sign_in(Identity::new(args.identity.as_str(), args.role.as_str()));
    let manager = app_state.session_manager();
    let session = manager
        .sync()
        .await
        .context("No authorization session after sign-in")?;
    Ok((manager, session))
}

async fn check(app_state: SharedAppState, cmd: CheckCommand) -> Result<()> {
    let (manager, session) = open_session(&app_state, &cmd.identity).await?;
    let state = session.guard(&cmd.module, &cmd.permission).resolve().await;
    manager.shutdown().await;

    if cmd.identity.json {
        let output = CheckOutput {
            identity: &cmd.identity.identity,
            module: &cmd.module,
            permission: &cmd.permission,
            state,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "{} -> {}/{}: {}",
            cmd.identity.identity, cmd.module, cmd.permission, state
        );
    }

    if state != GuardState::Allowed {
        std::process::exit(1);
    }
    Ok(())
}

fn collect_permissions(session: &AuthorizationSession) -> Vec<ModulePermissions> {
    let store = session.store();
    let snapshot = store.snapshot();
    snapshot
        .modules()
        .iter()
        .map(|module| ModulePermissions {
            module: module.name.clone(),
            display_name: module.display_name.clone(),
            permissions: snapshot.module_permissions(&module.name).into_iter().collect(),
        })
        .filter(|entry| !entry.permissions.is_empty())
        .collect()
}

fn print_permissions(session: &AuthorizationSession, json: bool) -> Result<()> {
    let entries = collect_permissions(session);
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if session.identity().is_super_admin() {
        println!(
            "{} has the super-admin role and is allowed everywhere",
            session.identity().id
        );
    }
    if entries.is_empty() {
        println!("{} holds no grants", session.identity().id);
    }
    for entry in entries {
        println!(
            "{} ({}): {}",
            entry.module,
            entry.display_name,
            entry.permissions.join(", ")
        );
    }
    Ok(())
}

async fn permissions(app_state: SharedAppState, args: IdentityArgs) -> Result<()> {
    let (manager, session) = open_session(&app_state, &args).await?;
    session.store().wait_until_settled().await;
    let result = print_permissions(&session, args.json);
    manager.shutdown().await;
    result
}

async fn resolve_catalog(
    app_state: &SharedAppState,
    module: &str,
    permission: &str,
) -> Result<(Module, Permission)> {
    let module = app_state
        .backend
        .module_by_name(module)
        .await
        .with_context(|| format!("Unknown module '{module}'"))?;
    let permission = app_state
        .backend
        .permission_by_name(permission)
        .await
        .with_context(|| format!("Unknown permission '{permission}'"))?;
    Ok((module, permission))
}

async fn grant(app_state: SharedAppState, cmd: GrantCommand) -> Result<()> {
    let (module, permission) = resolve_catalog(&app_state, &cmd.module, &cmd.permission).await?;
    app_state
        .identity
        .sign_in(Identity::new(cmd.acting_identity.as_str(), "admin"));

    let grant = app_state
        .grant_service()
        .grant(&cmd.identity.as_str().into(), &module.id, &permission.id)
        .await
        .with_context(|| {
            format!(
                "Failed to grant {}/{} to {}",
                cmd.module, cmd.permission, cmd.identity
            )
        })?;

    println!(
        "Granted {}/{} to {} (grant {})",
        cmd.module, cmd.permission, cmd.identity, grant.id
    );
    Ok(())
}

async fn revoke(app_state: SharedAppState, cmd: GrantCommand) -> Result<()> {
    let (module, permission) = resolve_catalog(&app_state, &cmd.module, &cmd.permission).await?;
    app_state
        .identity
        .sign_in(Identity::new(cmd.acting_identity.as_str(), "admin"));

    let removed = app_state
        .grant_service()
        .revoke(&cmd.identity.as_str().into(), &module.id, &permission.id)
        .await
        .with_context(|| {
            format!(
                "Failed to revoke {}/{} from {}",
                cmd.module, cmd.permission, cmd.identity
            )
        })?;

    if removed == 0 {
        println!(
            "{} did not hold {}/{}, nothing to revoke",
            cmd.identity, cmd.module, cmd.permission
        );
    } else {
        println!(
            "Revoked {}/{} from {}",
            cmd.module, cmd.permission, cmd.identity
        );
    }
    Ok(())
}

async fn watch(app_state: SharedAppState, args: IdentityArgs) -> Result<()> {
    stop_flag::register_signal_handler(&app_state.stop_flag);

    let (manager, session) = open_session(&app_state, &args).await?;
    let manager = Arc::new(manager);
    let runner = {
        let manager = manager.clone();
        let stop_flag = app_state.stop_flag.clone();
        tokio::spawn(async move { manager.run(stop_flag).await })
    };

    let result = follow_permissions(&session, args.json, &app_state.stop_flag).await;

    // Stop the session manager before reporting, whatever ended the loop.
    app_state.stop_flag.stop();
    runner.await?;
    result
}

/// Print the session's permissions after the first load and after every
/// completed reload until the stop flag is raised.
async fn follow_permissions(
    session: &AuthorizationSession,
    json: bool,
    stop_flag: &stop_flag::StopFlag,
) -> Result<()> {
    let mut status = session.store().watch_status();
    session.store().wait_until_settled().await;
    status.mark_unchanged();
    print_permissions(session, json)?;

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *status.borrow_and_update();
                if current.settled && !current.loading {
                    info!("Permissions at revision {}", current.revision);
                    print_permissions(session, json)?;
                }
            }
            _ = stop_flag.wait() => return Ok(()),
        }
    }
}
