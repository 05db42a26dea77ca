mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use cli::{Cli, Commands};
use mv_core::config::Config;
use mv_core::VideoAsset;
use mv_db::pool::{get_conn, init_pool, DbPool, PooledConnection};
use mv_db::queries::{auth, entitlements, users, videos};
use rand::RngCore;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults based on the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mixvault=trace,mv_server=trace,mv_export=trace,mv_db=debug,tower_http=debug".to_string()
        } else {
            "mixvault=info,mv_server=info,mv_export=info,mv_db=info,tower_http=info".to_string()
        }
    });

    // Logs go to stderr so command output (tokens, ids) stays pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Start { host, port } => {
            let mut config = Config::load_or_default(config_path);
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            tracing::info!("Starting mixvault {}", env!("CARGO_PKG_VERSION"));
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(mv_server::start(config))?;
            Ok(())
        }
        Commands::Validate {
            config: validate_path,
        } => validate_config(validate_path.as_deref().or(config_path)),
        Commands::Version => {
            println!("mixvault {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Sweep => sweep(config_path),
        Commands::CreateUser { username, role } => {
            let db = open_db(config_path)?;
            let conn = get_conn(&db)?;
            let user = users::create_user(&conn, &username, &role)?;
            println!("{}", user.id);
            Ok(())
        }
        Commands::Grant {
            username,
            limit,
            membership,
            days,
            reset,
        } => {
            let db = open_db(config_path)?;
            let conn = get_conn(&db)?;
            let user = find_user(&conn, &username)?;
            let end = days.map(|d| Utc::now() + Duration::days(d));
            let ent =
                entitlements::grant_membership(&conn, user.id, membership.as_deref(), end, limit)?;
            if reset {
                entitlements::reset_usage(&conn, user.id)?;
            }
            println!(
                "{}: limit {}, used {}, membership {}",
                username,
                ent.download_limit,
                if reset { 0 } else { ent.downloads_used },
                ent.membership_id.as_deref().unwrap_or("none")
            );
            Ok(())
        }
        Commands::IssueToken { username } => {
            let config = Config::load_or_default(config_path);
            let db = open_db(config_path)?;
            let conn = get_conn(&db)?;
            let user = find_user(&conn, &username)?;

            let mut bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut bytes);
            let token = hex::encode(bytes);
            let hours = i64::try_from(config.auth.token_ttl_hours).unwrap_or(i64::MAX / 3600);
            let expires_at = (Utc::now() + Duration::hours(hours)).to_rfc3339();
            auth::create_token(&conn, user.id, &token, &expires_at)?;
            println!("{token}");
            Ok(())
        }
        Commands::ImportVideos { file } => import_videos(config_path, &file),
    }
}

fn open_db(config_path: Option<&Path>) -> Result<DbPool> {
    let config = Config::load_or_default(config_path);
    let db_path = &config.server.db_path;
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    Ok(init_pool(&db_path.to_string_lossy())?)
}

fn find_user(conn: &PooledConnection, username: &str) -> Result<mv_db::models::User> {
    users::get_user_by_username(conn, username)?
        .with_context(|| format!("no such user: {username}"))
}

fn import_videos(config_path: Option<&Path>, file: &Path) -> Result<()> {
    let contents =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let assets: Vec<VideoAsset> = serde_json::from_str(&contents)
        .with_context(|| format!("parsing {}", file.display()))?;

    let db = open_db(config_path)?;
    let conn = get_conn(&db)?;
    for asset in &assets {
        videos::upsert_video(&conn, asset)?;
    }
    println!("Imported {} videos", assets.len());
    Ok(())
}

fn sweep(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let store = mv_export::ExportStore::new(
        config.export.temp_dir.clone(),
        std::time::Duration::from_secs(config.export.artifact_ttl_secs),
    );
    let rt = tokio::runtime::Runtime::new()?;
    let stats = rt.block_on(store.sweep_expired(std::time::SystemTime::now()))?;
    println!(
        "Removed {} artifacts and {} partial files",
        stats.artifacts_removed, stats.partials_removed
    );
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents =
                std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            print_summary(&config);
            for warning in config.validate() {
                println!("  warning: {warning}");
            }
        }
        None => {
            println!("No config file specified, using defaults");
            print_summary(&Config::default());
        }
    }
    Ok(())
}

fn print_summary(config: &Config) {
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Database: {}", config.server.db_path.display());
    println!("  Storage backend: {:?}", config.storage.backend);
    println!("  Export dir: {}", config.export.temp_dir.display());
    println!("  Artifact TTL: {}s", config.export.artifact_ttl_secs);
}
