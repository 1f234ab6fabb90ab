pub mod audio;
pub mod console;
pub mod cues;
pub mod db;
pub mod identity;
pub mod ledger;
pub mod models;
pub mod plans;
pub mod recorder;
pub mod settings;
pub mod timer;
mod utils;

use std::{env, fs, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use log::info;

use audio::default_sink;
use console::Console;
use cues::CueEngine;
use db::Database;
use identity::{IdentityProvider, Role, StaticIdentity};
use ledger::LocalCompletionLedger;
use plans::PlanCatalog;
use recorder::SessionRecorder;
use settings::{ProfileSettings, SettingsStore};
use timer::{PlaybackServices, TimerController};

pub const DATA_DIR_ENV: &str = "BOLITA_DATA_DIR";
pub const DEBUG_ENV: &str = "BOLITA_DEBUG";

/// guided cardiac-rehabilitation sessions in the terminal
#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct Cli {
    /// plan to play: a catalog slug or a path to a plan JSON file
    #[clap(short, long)]
    plan: Option<String>,

    /// list the built-in plans and exit
    #[clap(long)]
    list_plans: bool,

    /// where settings, the session database and the completion ledger live
    #[clap(long)]
    data_dir: Option<PathBuf>,

    /// sign in as this user id (remembered in settings)
    #[clap(short, long, conflicts_with = "anonymous")]
    user: Option<String>,

    /// email stored with --user
    #[clap(long, requires = "user")]
    email: Option<String>,

    /// role stored with --user
    #[clap(long, value_enum, requires = "user")]
    role: Option<Role>,

    /// play without a user; nothing is stored in the session database
    #[clap(long)]
    anonymous: bool,

    /// no cue tones
    #[clap(long)]
    mute: bool,
}

fn init_logging() {
    let debug_mode = env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let default_level = if debug_mode { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn resolve_data_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    flag.or_else(|| env::var_os(DATA_DIR_ENV).map(PathBuf::from))
        .or_else(|| {
            ProjectDirs::from("org", "bolita", "bolita")
                .map(|dirs| dirs.data_local_dir().to_path_buf())
        })
        .ok_or_else(|| anyhow!("no data directory; pass --data-dir or set {DATA_DIR_ENV}"))
}

fn resolve_identity(cli: &Cli, settings: &SettingsStore) -> Result<StaticIdentity> {
    if cli.anonymous {
        return Ok(StaticIdentity::anonymous());
    }

    if let Some(user_id) = &cli.user {
        let profile = ProfileSettings {
            user_id: user_id.clone(),
            email: cli.email.clone().unwrap_or_default(),
            role: cli.role,
        };
        settings.update_profile(Some(profile.clone()))?;
        return Ok(StaticIdentity::from_profile(&profile));
    }

    Ok(settings
        .profile()
        .map(|profile| StaticIdentity::from_profile(&profile))
        .unwrap_or_else(StaticIdentity::anonymous))
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let catalog = PlanCatalog::builtin()?;
    if cli.list_plans {
        for plan in catalog.plans() {
            println!("{:<14} {} ({} phases)", plan.id, plan.name, plan.phases.len());
        }
        return Ok(());
    }

    let plan = match &cli.plan {
        Some(selector) => catalog.resolve(selector)?,
        None => catalog
            .plans()
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("plan catalog is empty"))?,
    };

    let data_dir = resolve_data_dir(cli.data_dir.clone())?;
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    info!("Bolita starting with data in {}", data_dir.display());

    let settings = SettingsStore::new(data_dir.join("settings.json"))?;
    let identity: Arc<dyn IdentityProvider> = Arc::new(resolve_identity(&cli, &settings)?);
    let database = Database::new(data_dir.join("bolita.sqlite3"))?;
    let ledger = Arc::new(LocalCompletionLedger::open(
        data_dir.join("completed-days.json"),
    )?);

    let cue_settings = settings.cues();
    let services = PlaybackServices {
        cues: CueEngine::new(
            default_sink(cue_settings.volume),
            cue_settings.enabled && !cli.mute,
        ),
        recorder: SessionRecorder::spawn(Arc::new(database.clone())),
        identity: identity.clone(),
        ledger: Some(ledger.clone()),
    };
    let controller = TimerController::new(plan, services, settings.tick_interval())?;

    Console::new(controller, database, identity, ledger)
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_rejects_user_with_anonymous() {
        assert!(Cli::try_parse_from(["bolita", "--user", "u1", "--anonymous"]).is_err());
        assert!(Cli::try_parse_from(["bolita", "--role", "admin"]).is_err());
        let cli = Cli::try_parse_from(["bolita", "-u", "u1", "--role", "admin"]).unwrap();
        assert_eq!(cli.role, Some(Role::Admin));
    }

    #[test]
    fn command_line_user_is_remembered() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingsStore::new(dir.path().join("settings.json")).unwrap();

        let cli = Cli::try_parse_from(["bolita", "--user", "u9", "--email", "eva@example.com"]).unwrap();
        let identity = resolve_identity(&cli, &settings).unwrap();
        assert_eq!(identity.current_user().map(|u| u.id).as_deref(), Some("u9"));

        let cli = Cli::try_parse_from(["bolita"]).unwrap();
        let identity = resolve_identity(&cli, &settings).unwrap();
        assert_eq!(identity.current_user().map(|u| u.email).as_deref(), Some("eva@example.com"));

        let cli = Cli::try_parse_from(["bolita", "--anonymous"]).unwrap();
        assert!(resolve_identity(&cli, &settings).unwrap().current_user().is_none());
    }

    #[test]
    fn data_dir_flag_wins() {
        let dir = resolve_data_dir(Some(PathBuf::from("/tmp/bolita-test"))).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/bolita-test"));
    }
}
