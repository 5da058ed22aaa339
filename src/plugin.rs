use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{ArgMatches, Command, CommandFactory as _, FromArgMatches as _, Parser, Subcommand};
use log::{info, warn};

use crate::hooks::HookRegistry;
use crate::manager::CheckLoop;
use crate::ports::{Broadcaster, Clock, DeviceStore};
use crate::scanner::TimeoutScanner;
use crate::timeout::TimeoutStore;

#[derive(Debug, Clone)]
pub struct PluginMetadata {
    pub name: String,
    /// Installation directory; plugin-owned files live here.
    pub dir: PathBuf,
}

/// What the host hands a plugin at startup.
#[derive(Clone)]
pub struct HostContext {
    pub devices: Arc<dyn DeviceStore>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub hooks: Arc<HookRegistry>,
    pub clock: Arc<dyn Clock>,
}

/// Lifecycle the host drives: load, register CLI, startup, shutdown.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> &PluginMetadata;

    fn on_load(&self) {}

    async fn on_startup(&mut self, _ctx: &HostContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_shutdown(&mut self) {}

    fn on_register_cli(&self, cli: Command) -> Command {
        cli
    }

    /// Returns `Ok(false)` when `subcommand` belongs to someone else.
    fn handle_cli(&self, _subcommand: &str, _matches: &ArgMatches) -> anyhow::Result<bool> {
        Ok(false)
    }
}

pub const CLI_NAME: &str = "auto-status";

#[derive(Parser, Debug)]
#[command(name = CLI_NAME, about = "Configure auto device status")]
struct AutoStatusCli {
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Action {
    /// Set offline timeout in minutes
    SetTimeout {
        /// Minutes
        #[arg(value_parser = clap::value_parser!(i64).range(1..))]
        minutes: i64,
    },
    /// Show current timeout
    GetTimeout,
}

/// Flips idle reserved devices back to offline.
pub struct AutoStatusPlugin {
    metadata: PluginMetadata,
    timeouts: Arc<TimeoutStore>,
    check_loop: Option<CheckLoop>,
}

impl AutoStatusPlugin {
    pub fn new(metadata: PluginMetadata) -> Self {
        let timeouts = Arc::new(TimeoutStore::new(&metadata.dir));
        AutoStatusPlugin {
            metadata,
            timeouts,
            check_loop: None,
        }
    }

    fn execute(&self, action: &Action) -> anyhow::Result<String> {
        match action {
            Action::SetTimeout { minutes } => {
                self.timeouts.save(*minutes)?;
                Ok(format!("Timeout set to {} minutes.", minutes))
            }
            Action::GetTimeout => Ok(format!("Current timeout: {} minutes", self.timeouts.load())),
        }
    }
}

#[async_trait]
impl Plugin for AutoStatusPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn on_load(&self) {
        info!(
            "{} loaded. Timeout config: {} min ({}).",
            self.metadata.name,
            self.timeouts.cached(),
            self.timeouts.path().display()
        );
    }

    async fn on_startup(&mut self, ctx: &HostContext) -> anyhow::Result<()> {
        if self.check_loop.is_some() {
            warn!("{} already running", self.metadata.name);
            return Ok(());
        }
        info!("{} starting background check loop...", self.metadata.name);
        let scanner = TimeoutScanner::new(
            ctx.devices.clone(),
            ctx.broadcaster.clone(),
            ctx.hooks.clone(),
            ctx.clock.clone(),
        );
        self.check_loop = Some(CheckLoop::spawn(Arc::new(scanner), self.timeouts.clone()));
        Ok(())
    }

    async fn on_shutdown(&mut self) {
        if let Some(check_loop) = self.check_loop.take() {
            check_loop.stop().await;
            info!("{} background task stopped.", self.metadata.name);
        }
    }

    fn on_register_cli(&self, cli: Command) -> Command {
        cli.subcommand(AutoStatusCli::command())
    }

    fn handle_cli(&self, subcommand: &str, matches: &ArgMatches) -> anyhow::Result<bool> {
        if subcommand != CLI_NAME {
            return Ok(false);
        }
        let cli = AutoStatusCli::from_arg_matches(matches)?;
        println!("{}", self.execute(&cli.action)?);
        Ok(true)
    }
}
