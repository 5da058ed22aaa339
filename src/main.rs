use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Command, CommandFactory as _, FromArgMatches as _, Parser};
use log::{error, info};
use tokio::sync::watch;

mod broadcast;
mod config;
mod hooks;
mod manager;
mod messages;
mod mqtt;
mod plugin;
mod ports;
mod scanner;
mod store;
mod timeout;

#[cfg(test)]
mod testing;

use plugin::{AutoStatusPlugin, HostContext, Plugin, PluginMetadata};
use ports::Broadcaster;

const PLUGIN_DIR_ENV: &str = "DEVICE_HOST_PLUGIN_DIR";

#[derive(Parser, Debug)]
#[command(name = "device-host", version, about = "Runs device plugins and their commands")]
struct Cli {
    /// Host configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,
}

fn build_cli(plugins: &[Box<dyn Plugin>]) -> Command {
    let cli = Cli::command()
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(Command::new("run").about("Start all plugins and run until interrupted"));
    plugins
        .iter()
        .fold(cli, |cli, plugin| plugin.on_register_cli(cli))
}

/// Plugins live next to the executable unless told otherwise.
fn plugin_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(PLUGIN_DIR_ENV) {
        return PathBuf::from(dir);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn init_logging() {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let mut plugins: Vec<Box<dyn Plugin>> = vec![Box::new(AutoStatusPlugin::new(PluginMetadata {
        name: "Auto Status".to_string(),
        dir: plugin_dir(),
    }))];
    for plugin in &plugins {
        plugin.on_load();
    }

    let matches = build_cli(&plugins).get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    match matches.subcommand() {
        Some(("run", _)) => run(&cli, &mut plugins).await,
        Some((name, sub_matches)) => {
            for plugin in &plugins {
                if plugin.handle_cli(name, sub_matches)? {
                    return Ok(());
                }
            }
            anyhow::bail!("no plugin handles `{}`", name)
        }
        None => anyhow::bail!("no command given"),
    }
}

async fn run(cli: &Cli, plugins: &mut [Box<dyn Plugin>]) -> anyhow::Result<()> {
    let config = config::AppConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let mut mqtt_session = None;
    let broadcaster: Arc<dyn Broadcaster> = match &config.mqtt {
        Some(mqtt_config) => {
            let (client, mut eventloop) = mqtt::MqttClient::new(mqtt_config);
            let (stop_tx, stop_rx) = watch::channel(false);
            let handle = tokio::spawn(async move {
                mqtt::MqttClient::event_loop(&mut eventloop, stop_rx).await;
            });
            mqtt_session = Some((client.clone(), stop_tx, handle));
            Arc::new(client)
        }
        None => {
            info!("No [mqtt] section, device events go to the log only");
            Arc::new(broadcast::LogBroadcaster)
        }
    };

    let mut hooks = hooks::HookRegistry::new();
    hooks.register(messages::DEVICE_ACTIVITY_HOOK, Arc::new(hooks::AuditLogHook));

    let ctx = HostContext {
        devices: Arc::new(store::JsonDeviceStore::new(&config.store.devices_path)),
        broadcaster,
        hooks: Arc::new(hooks),
        clock: Arc::new(ports::SystemClock),
    };

    for plugin in plugins.iter_mut() {
        let name = plugin.metadata().name.clone();
        plugin
            .on_startup(&ctx)
            .await
            .with_context(|| format!("starting {}", name))?;
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    for plugin in plugins.iter_mut() {
        plugin.on_shutdown().await;
    }

    if let Some((client, stop_tx, handle)) = mqtt_session {
        if let Err(err) = client.disconnect().await {
            error!("Error disconnecting MQTT client: {:?}", err);
        }
        let _ = stop_tx.send(true);
        let _ = handle.await;
    }

    Ok(())
}
