//! tunnelman CLI - manage Cloudflare tunnels, their public hostnames and local runners

mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tunnelman_lib::{
    ApiConfig, CancellationToken, CloudflareApi, DnsOutcome, HostnameChange, ProcessSupervisor,
    PublicHostname, RunnerConfig, RunnerConfigStore, SupervisorConfig, TunnelManager,
    TunnelRunner, TunnelStatus, DEFAULT_SERVICE,
};

use config::{ConfigManager, TunnelmanConfig, SETTING_KEYS};

/// tunnelman - manage Cloudflare tunnels from the command line
#[derive(Parser, Debug)]
#[command(name = "tunnelman")]
#[command(about = "Manage Cloudflare tunnels, public hostnames and local runners", long_about = None)]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Cloudflare API token
    #[arg(long, global = true, env = "CLOUDFLARE_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Cloudflare account id (looked up from the token when omitted)
    #[arg(long, global = true, env = "CLOUDFLARE_ACCOUNT_ID")]
    account_id: Option<String>,

    /// Domain whose zone receives hostname DNS records
    #[arg(long, global = true, env = "TUNNELMAN_DOMAIN")]
    domain: Option<String>,

    /// Path to the cloudflared binary
    #[arg(long, global = true, env = "CLOUDFLARED_PATH")]
    runner: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create, list and delete tunnels
    Tunnels {
        #[command(subcommand)]
        command: TunnelCommands,
    },
    /// Public hostnames routed through a tunnel
    Hostnames {
        #[command(subcommand)]
        command: HostnameCommands,
    },
    /// DNS domains visible to the API token
    Domains {
        #[command(subcommand)]
        command: DomainCommands,
    },
    /// Run a tunnel locally until Ctrl+C
    Run {
        /// Ask runner processes this CLI did not start to exit first
        #[arg(long)]
        kill_orphans: bool,

        #[command(subcommand)]
        command: RunCommands,
    },
    /// Check the runner binary and the API credentials
    Doctor,
    /// Persistent settings (~/.tunnelman/config.json)
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum TunnelCommands {
    /// List tunnels of the account
    List,
    /// Create a named tunnel
    Create { name: String },
    /// Delete a tunnel and its local runner config
    Delete { name: String },
    /// Show whether a tunnel has live connections
    Status {
        /// Tunnel name or id
        tunnel: String,
    },
}

#[derive(Subcommand, Debug)]
enum HostnameCommands {
    /// List public hostnames of a tunnel
    List {
        /// Tunnel name or id
        tunnel: String,
    },
    /// Route a hostname to a local service and create its DNS record
    Add {
        tunnel: String,
        hostname: String,
        /// Path to match; empty or * matches every path
        #[arg(long, default_value = "")]
        path: String,
        /// Backend service URL
        #[arg(long, default_value = DEFAULT_SERVICE)]
        service: String,
    },
    /// Change the first rule of a hostname; DNS follows a rename
    Update {
        tunnel: String,
        hostname: String,
        /// New hostname (defaults to the current one)
        #[arg(long)]
        new_hostname: Option<String>,
        /// New path (defaults to the current one)
        #[arg(long)]
        path: Option<String>,
        /// New backend service URL (defaults to the current one)
        #[arg(long)]
        service: Option<String>,
    },
    /// Remove a hostname rule and, when unused, its DNS records
    Remove {
        tunnel: String,
        hostname: String,
        #[arg(long, default_value = "")]
        path: String,
    },
    /// Let cloudflared create the DNS route itself
    Route { tunnel: String, hostname: String },
}

#[derive(Subcommand, Debug)]
enum DomainCommands {
    /// List domains available to the API token
    List,
    /// Select and remember the domain used for DNS records
    Select { domain: String },
}

#[derive(Subcommand, Debug)]
enum RunCommands {
    /// Run a named tunnel from its local runner config
    Managed {
        /// Tunnel name; its config is ~/.cloudflared/<name>.yml
        name: String,
        /// Tunnel id (resolved from the name when omitted)
        #[arg(long)]
        tunnel_id: Option<String>,
        /// Route this hostname instead of using the stored config
        #[arg(long)]
        hostname: Option<String>,
        /// Service for --hostname
        #[arg(long, default_value = DEFAULT_SERVICE)]
        service: String,
        /// Validate the ingress rules with cloudflared before starting
        #[arg(long)]
        validate: bool,
    },
    /// Run a quick tunnel in front of a local URL
    Quick {
        /// Local URL, e.g. http://localhost:3000
        url: String,
        #[arg(long, default_value = "quick")]
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the stored settings (token redacted)
    Show,
    /// Change one setting; an empty value clears it
    Set { key: String, value: String },
    /// Print the settings file path
    Path,
}

/// Everything a command needs once credentials are resolved
struct App {
    settings: TunnelmanConfig,
    manager: TunnelManager,
    runner: TunnelRunner,
    domain: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new()?;
    let settings = config_manager.load()?;

    let log_level = cli.log_level.as_deref().unwrap_or(&settings.log_level);
    init_logging(log_level)?;

    match cli.command {
        Commands::Config { ref command } => handle_config_command(&config_manager, command),
        Commands::Doctor => handle_doctor(&build_app(&cli, settings)?).await,
        Commands::Tunnels { ref command } => {
            handle_tunnel_command(&build_app(&cli, settings)?, command).await
        }
        Commands::Hostnames { ref command } => {
            handle_hostname_command(&build_app(&cli, settings)?, command).await
        }
        Commands::Domains { ref command } => {
            handle_domain_command(&build_app(&cli, settings)?, &config_manager, command).await
        }
        Commands::Run {
            kill_orphans,
            ref command,
        } => handle_run_command(&build_app(&cli, settings)?, kill_orphans, command).await,
    }
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn build_app(cli: &Cli, settings: TunnelmanConfig) -> Result<App> {
    let token = cli
        .api_token
        .clone()
        .or_else(|| settings.api_token.clone())
        .context(
            "No API token configured. Set CLOUDFLARE_API_TOKEN or run: tunnelman config set api-token <TOKEN>",
        )?;

    let mut api_config = ApiConfig::new(token);
    if let Some(account_id) = cli.account_id.clone().or_else(|| settings.account_id.clone()) {
        api_config = api_config.with_account_id(account_id);
    }
    let api = CloudflareApi::new(api_config).context("Failed to create API client")?;

    let runner = cli
        .runner
        .clone()
        .map(TunnelRunner::with_program)
        .unwrap_or_default();

    let config_dir = match &settings.runner_config_dir {
        Some(dir) => dir.clone(),
        None => RunnerConfigStore::default_dir()?,
    };
    let supervisor = ProcessSupervisor::new(
        SupervisorConfig::new(config_dir).with_program(runner.program()),
    );

    let manager = TunnelManager::new(api, Arc::new(runner.clone()), supervisor);
    let domain = cli
        .domain
        .clone()
        .or_else(|| settings.selected_domain.clone());

    Ok(App {
        settings,
        manager,
        runner,
        domain,
    })
}

/// Accept either a tunnel id or a tunnel name
async fn resolve_tunnel_id(app: &App, tunnel: &str) -> Result<String> {
    if looks_like_tunnel_id(tunnel) {
        return Ok(tunnel.to_string());
    }
    app.runner
        .tunnel_id_for_name(tunnel)
        .await
        .with_context(|| format!("Failed to resolve tunnel {}", tunnel))
}

/// Path and service for `hostnames update`; omitted flags keep the rule's current values
fn update_target(
    current: &[PublicHostname],
    hostname: &str,
    path: Option<&str>,
    service: Option<&str>,
) -> Result<(String, String)> {
    let rule = current
        .iter()
        .find(|rule| rule.hostname == hostname)
        .with_context(|| format!("Hostname {} not found", hostname))?;
    Ok((
        path.unwrap_or(&rule.path).to_string(),
        service.unwrap_or(&rule.service).to_string(),
    ))
}

fn looks_like_tunnel_id(value: &str) -> bool {
    let groups: Vec<&str> = value.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(group, len)| group.len() == len && group.chars().all(|c| c.is_ascii_hexdigit()))
}

async fn select_domain(app: &App) -> Result<()> {
    let Some(domain) = &app.domain else {
        bail!("No domain selected. Pass --domain or run: tunnelman domains select <DOMAIN>");
    };
    app.manager.select_domain(domain).await?;
    Ok(())
}

async fn handle_tunnel_command(app: &App, command: &TunnelCommands) -> Result<()> {
    match command {
        TunnelCommands::List => {
            let tunnels = app.manager.list_tunnels().await?;
            if tunnels.is_empty() {
                println!("No tunnels found");
                println!("Create one with: tunnelman tunnels create <name>");
                return Ok(());
            }

            let processes = app.manager.managed_processes().await;
            println!("Tunnels ({})", tunnels.len());
            println!();
            for tunnel in tunnels {
                println!("  {} ({})", tunnel.name, tunnel.id);
                println!("    Connections: {}", tunnel.connections.len());
                if let Some(created_at) = tunnel.created_at {
                    println!("    Created: {}", created_at.to_rfc3339());
                }
                if let Some(process) = processes.get(&tunnel.name) {
                    println!("    Local runner: {} (PID {})", process.status, process.pid);
                }
            }
            Ok(())
        }
        TunnelCommands::Create { name } => {
            let tunnel = app.manager.create_tunnel(name).await?;
            println!("Created tunnel {} ({})", tunnel.name, tunnel.id);
            Ok(())
        }
        TunnelCommands::Delete { name } => {
            app.manager.delete_tunnel(name).await?;
            println!("Deleted tunnel {}", name);
            Ok(())
        }
        TunnelCommands::Status { tunnel } => {
            let resolved = app.manager.tunnel_status(tunnel).await;
            println!("{}: {}", tunnel, resolved.status);
            if let Some(error) = resolved.error {
                println!("  {}", error);
            }
            Ok(())
        }
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "*"
    } else {
        path
    }
}

fn print_change(verb: &str, change: &HostnameChange) {
    let hostname = &change.hostname;
    println!(
        "{} {}{} -> {}",
        verb,
        hostname.hostname,
        if hostname.path.is_empty() {
            String::new()
        } else {
            format!(" (path {})", hostname.path)
        },
        hostname.service
    );

    match &change.dns {
        DnsOutcome::Created(record) => println!("  DNS: {} -> {}", record.name, record.content),
        DnsOutcome::Deleted(count) => println!("  DNS: deleted {} record(s)", count),
        DnsOutcome::Moved { deleted, created } => println!(
            "  DNS: deleted {} record(s), created {} -> {}",
            deleted, created.name, created.content
        ),
        DnsOutcome::Unchanged => {}
        DnsOutcome::Failed(e) => {
            warn!(hostname = %hostname.hostname, error = %e, "DNS out of sync");
            eprintln!("  Ingress updated, but DNS was not: {}", e);
        }
    }
}

async fn handle_hostname_command(app: &App, command: &HostnameCommands) -> Result<()> {
    match command {
        HostnameCommands::List { tunnel } => {
            let tunnel_id = resolve_tunnel_id(app, tunnel).await?;
            let hostnames = app.manager.public_hostnames(&tunnel_id).await?;
            if hostnames.is_empty() {
                println!("No public hostnames configured");
                return Ok(());
            }
            for hostname in hostnames {
                println!(
                    "  [{}] {} {} -> {}",
                    hostname.id,
                    hostname.hostname,
                    display_path(&hostname.path),
                    hostname.service
                );
            }
            Ok(())
        }
        HostnameCommands::Add {
            tunnel,
            hostname,
            path,
            service,
        } => {
            select_domain(app).await?;
            let tunnel_id = resolve_tunnel_id(app, tunnel).await?;
            let change = app
                .manager
                .add_hostname(&tunnel_id, hostname, path, service)
                .await?;
            print_change("Added", &change);
            Ok(())
        }
        HostnameCommands::Update {
            tunnel,
            hostname,
            new_hostname,
            path,
            service,
        } => {
            select_domain(app).await?;
            let tunnel_id = resolve_tunnel_id(app, tunnel).await?;
            let new_hostname = new_hostname.as_deref().unwrap_or(hostname);
            let current = app.manager.public_hostnames(&tunnel_id).await?;
            let (path, service) =
                update_target(&current, hostname, path.as_deref(), service.as_deref())?;
            let change = app
                .manager
                .update_hostname(&tunnel_id, hostname, new_hostname, &path, &service)
                .await?;
            print_change("Updated", &change);
            Ok(())
        }
        HostnameCommands::Remove {
            tunnel,
            hostname,
            path,
        } => {
            select_domain(app).await?;
            let tunnel_id = resolve_tunnel_id(app, tunnel).await?;
            let change = app
                .manager
                .remove_hostname(&tunnel_id, hostname, path)
                .await?;
            print_change("Removed", &change);
            Ok(())
        }
        HostnameCommands::Route { tunnel, hostname } => {
            app.runner.route_dns(tunnel, hostname).await?;
            println!("Routed {} to tunnel {}", hostname, tunnel);
            Ok(())
        }
    }
}

async fn handle_domain_command(
    app: &App,
    config_manager: &ConfigManager,
    command: &DomainCommands,
) -> Result<()> {
    match command {
        DomainCommands::List => {
            let domains = app.manager.available_domains().await?;
            if domains.is_empty() {
                println!("No domains available to this API token");
                return Ok(());
            }
            for domain in domains {
                let marker = if app.domain.as_deref() == Some(domain.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("  {} {}", marker, domain);
            }
            Ok(())
        }
        DomainCommands::Select { domain } => {
            let zone = app.manager.select_domain(domain).await?;
            config_manager.set("domain", domain)?;
            println!("Selected {} (zone {})", zone.name, zone.id);
            Ok(())
        }
    }
}

async fn handle_run_command(app: &App, kill_orphans: bool, command: &RunCommands) -> Result<()> {
    if kill_orphans {
        let signalled = app.manager.reconcile_orphans().await;
        if signalled > 0 {
            info!(signalled, "Asked orphaned runners to exit");
        }
    }

    let cancel = CancellationToken::new();
    let name = match command {
        RunCommands::Managed {
            name,
            tunnel_id,
            hostname,
            service,
            validate,
        } => {
            let store = app.manager.supervisor().config_store();
            let config = match (hostname, store.load(name)) {
                (None, Ok(config)) => config,
                (hostname, _) => {
                    let tunnel_id = match tunnel_id {
                        Some(id) => id.clone(),
                        None => resolve_tunnel_id(app, name).await?,
                    };
                    match hostname {
                        Some(hostname) => {
                            RunnerConfig::single_service(&tunnel_id, store.dir(), hostname, service)
                        }
                        None => RunnerConfig::catch_all_only(&tunnel_id, store.dir()),
                    }
                }
            };

            if *validate {
                let path = store.save(name, &config)?;
                app.runner
                    .validate_ingress(Some(&path))
                    .await
                    .context("Ingress validation failed")?;
            }

            let process = app.manager.start_managed(name, config, &cancel).await?;
            println!("Started {} (PID {})", name, process.pid);
            name
        }
        RunCommands::Quick { url, name } => {
            let process = app.manager.start_quick(name, url, &cancel).await?;
            println!("Started quick tunnel for {} (PID {})", url, process.pid);
            name
        }
    };

    println!("Press Ctrl+C to stop");
    let result = watch_runner(app, name).await;

    info!("Shutting down runners...");
    app.manager.shutdown().await?;
    result
}

/// Poll the runner until Ctrl+C or until it stops on its own
async fn watch_runner(app: &App, name: &str) -> Result<()> {
    let interval = Duration::from_secs(app.settings.refresh_interval_secs.max(1));
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = ticker.tick() => {
                let status = app.manager.supervisor().status(name).await;
                if status != TunnelStatus::Active {
                    bail!("Runner {} is no longer running ({})", name, status);
                }
            }
        }
    }
}

async fn handle_doctor(app: &App) -> Result<()> {
    let mut healthy = true;

    match app.runner.version().await {
        Ok(version) => println!("cloudflared: {}", version),
        Err(e) => {
            healthy = false;
            println!("cloudflared: not usable ({})", e);
        }
    }

    match app.manager.verify_credentials().await {
        Ok(()) => println!("API token: valid"),
        Err(e) if e.is_authentication() => {
            healthy = false;
            println!("API token: rejected ({})", e);
        }
        Err(e) => {
            healthy = false;
            println!("API token: could not verify ({})", e);
        }
    }

    match &app.domain {
        Some(domain) => match app.manager.select_domain(domain).await {
            Ok(zone) => println!("Domain: {} (zone {})", zone.name, zone.id),
            Err(e) => {
                healthy = false;
                println!("Domain: {} ({})", domain, e);
            }
        },
        None => println!("Domain: none selected"),
    }

    if !healthy {
        bail!("Some checks failed");
    }
    Ok(())
}

fn handle_config_command(config_manager: &ConfigManager, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let settings = config_manager.load()?;
            let unset = || "(not set)".to_string();
            println!("api-token:         {}", settings.redacted_token().unwrap_or_else(unset));
            println!("account-id:        {}", settings.account_id.unwrap_or_else(unset));
            println!("domain:            {}", settings.selected_domain.unwrap_or_else(unset));
            println!(
                "runner-config-dir: {}",
                settings
                    .runner_config_dir
                    .map(|dir| dir.display().to_string())
                    .unwrap_or_else(unset)
            );
            println!("refresh-interval:  {}s", settings.refresh_interval_secs);
            println!("log-level:         {}", settings.log_level);
            Ok(())
        }
        ConfigCommands::Set { key, value } => {
            config_manager.set(key, value)?;
            println!("Saved {} to {}", key, config_manager.path().display());
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", config_manager.path().display());
            println!("Settings: {}", SETTING_KEYS.join(", "));
            Ok(())
        }
    }
}
