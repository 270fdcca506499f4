use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};
use std::sync::Arc;
use tabled::{Table, Tabled};

use oekoboiler::client::{DEFAULT_API_HOST, DEFAULT_AUTH_HOST};
use oekoboiler::config::{self, Config};
use oekoboiler::types::DEFAULT_APP_ID;
use oekoboiler::{AylaService, Credentials, Oekoboiler, PropertyCode};

#[derive(Parser)]
#[command(name = "oekoboiler")]
#[command(about = "A CLI for controlling Oekoboiler water heaters through the Ayla cloud")]
#[command(version)]
struct Cli {
    /// Email address of your Ayla account
    #[arg(long, env = "AYLA_EMAIL")]
    email: Option<String>,

    /// Password of your Ayla account (optional, will prompt if not provided)
    #[arg(long, env = "AYLA_PW", hide_env_values = true)]
    password: Option<String>,

    /// Application secret of the Oekoboiler app
    #[arg(long, env = "AYLA_APP_SECRET", hide_env_values = true)]
    app_secret: Option<String>,

    /// Serial number (DSN) of the water heater (optional if only one device)
    #[arg(long, env = "OEKOBOILER_SN")]
    serial: Option<String>,

    #[arg(long, env = "AYLA_AUTH_HOST", hide = true)]
    auth_host: Option<String>,

    #[arg(long, env = "AYLA_API_HOST", hide = true)]
    api_host: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Login and store account settings for future use
    Login,
    /// Remove stored account settings
    Logout,
    /// List all devices registered to the account
    Devices,
    /// Show temperatures and power state of the water heater
    Status,
    /// List every property the water heater reports
    Properties,
    /// Set the target water temperature
    SetTemp {
        /// Target temperature in °C
        value: i64,
    },
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Tabled)]
struct PropertyRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Login => login(&cli).await,
        Commands::Logout => {
            config::clear_config()?;
            println!("Logged out successfully.");
            Ok(())
        }
        Commands::Devices => {
            let (service, _) = connect(&cli)?;
            print_devices(&service).await
        }
        Commands::Status => {
            let boiler = open_boiler(&cli).await?;
            print_status(&boiler).await;
            Ok(())
        }
        Commands::Properties => {
            let boiler = open_boiler(&cli).await?;
            print_properties(&boiler).await;
            Ok(())
        }
        Commands::SetTemp { value } => {
            let boiler = open_boiler(&cli).await?;
            info!("Setting target temperature to {}", value);
            if boiler.set_target_temp(value).await? {
                println!(
                    "Target temperature of {} set to {}°C.",
                    boiler.device_id(),
                    value
                );
                Ok(())
            } else {
                Err(anyhow::anyhow!(
                    "The cloud rejected the new target temperature."
                ))
            }
        }
    }
}

async fn login(cli: &Cli) -> Result<()> {
    let email = cli.email.clone().ok_or_else(|| {
        anyhow::anyhow!("Email is required. Provide via --email or AYLA_EMAIL environment variable.")
    })?;
    let app_secret = cli.app_secret.clone().ok_or_else(|| {
        anyhow::anyhow!(
            "App secret is required. Provide via --app-secret or AYLA_APP_SECRET environment variable."
        )
    })?;

    let config = Config {
        email,
        app_secret,
        app_id: None,
        device_serial: cli.serial.clone(),
        auth_host: cli.auth_host.clone(),
        api_host: cli.api_host.clone(),
    };

    let (service, _) = service_for(cli, &config)?;
    info!("Signing in to the Ayla cloud...");
    service
        .login()
        .await
        .context("Failed to sign in to the Ayla cloud")?;

    config::save_config(&config)?;
    println!("Logged in as {}.", config.email);
    Ok(())
}

/// Builds a session from the command line, the environment and the stored
/// config, in that order of precedence.
fn connect(cli: &Cli) -> Result<(AylaService, Option<String>)> {
    let stored = config::load_config()?.unwrap_or_default();

    let config = Config {
        email: cli.email.clone().unwrap_or(stored.email),
        app_secret: cli.app_secret.clone().unwrap_or(stored.app_secret),
        app_id: stored.app_id,
        device_serial: cli.serial.clone().or(stored.device_serial),
        auth_host: cli.auth_host.clone().or(stored.auth_host),
        api_host: cli.api_host.clone().or(stored.api_host),
    };

    if config.email.is_empty() || config.app_secret.is_empty() {
        return Err(anyhow::anyhow!(
            "Not logged in. Run 'oekoboiler login' or set AYLA_EMAIL and AYLA_APP_SECRET."
        ));
    }

    service_for(cli, &config)
}

fn service_for(cli: &Cli, config: &Config) -> Result<(AylaService, Option<String>)> {
    let password = match &cli.password {
        Some(password) => password.clone(),
        None => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };

    let credentials = Credentials::with_app_id(
        &config.email,
        &password,
        &config.app_secret,
        config.app_id.as_deref().unwrap_or(DEFAULT_APP_ID),
    );

    let service = AylaService::new_with_hosts(
        credentials,
        config
            .auth_host
            .clone()
            .unwrap_or_else(|| DEFAULT_AUTH_HOST.to_string()),
        config
            .api_host
            .clone()
            .unwrap_or_else(|| DEFAULT_API_HOST.to_string()),
    );

    Ok((service, config.device_serial.clone()))
}

async fn open_boiler(cli: &Cli) -> Result<Oekoboiler> {
    let (service, serial) = connect(cli)?;

    let serial = match serial {
        Some(serial) => serial,
        None => {
            let devices = device_rows(&service.get_devices().await?);
            if devices.is_empty() {
                return Err(anyhow::anyhow!("No devices found for this account."));
            }
            if devices.len() > 1 {
                return Err(anyhow::anyhow!(
                    "Multiple devices found. Please specify --serial."
                ));
            }
            devices[0].serial.clone()
        }
    };

    debug!("Using device {}", serial);
    let boiler = Oekoboiler::new(Arc::new(service), &serial);
    boiler
        .async_update()
        .await
        .with_context(|| format!("Failed to fetch properties of {}", serial))?;
    Ok(boiler)
}

/// Device entries come back as `[{"device": {...}}]`.
fn device_rows(devices: &serde_json::Value) -> Vec<DeviceRow> {
    let field = |device: &serde_json::Value, name: &str| {
        device
            .get(name)
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string()
    };

    devices
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("device"))
                .map(|device| DeviceRow {
                    serial: field(device, "dsn"),
                    product: field(device, "product_name"),
                    status: field(device, "connection_status"),
                })
                .collect()
        })
        .unwrap_or_default()
}

async fn print_devices(service: &AylaService) -> Result<()> {
    info!("Fetching device list...");
    let rows = device_rows(&service.get_devices().await?);

    if rows.is_empty() {
        println!("No devices found for this account.");
        return Ok(());
    }

    println!("{}", Table::new(&rows));
    Ok(())
}

async fn print_status(boiler: &Oekoboiler) {
    let show = |value: oekoboiler::Result<i64>, unit: &str| match value {
        Ok(v) => format!("{}{}", v, unit),
        Err(_) => "Unknown".to_string(),
    };

    println!("Device: {}", boiler.device_id());
    println!(
        "  {}: {}",
        PropertyCode::CurrentTemp.label(),
        show(boiler.current_temp().await, "°C")
    );
    println!(
        "  {}: {}",
        PropertyCode::TargetTemp.label(),
        show(boiler.target_temp().await, "°C")
    );
    println!(
        "  {}: {}",
        PropertyCode::TempDelta.label(),
        show(boiler.temp_delta().await, "K")
    );
    let power = match boiler.is_on().await {
        Ok(true) => "On",
        Ok(false) => "Off",
        Err(_) => "Unknown",
    };
    println!("  {}: {}", PropertyCode::OnState.label(), power);
}

async fn print_properties(boiler: &Oekoboiler) {
    let rows: Vec<PropertyRow> = boiler
        .properties()
        .await
        .into_iter()
        .map(|property| PropertyRow {
            name: property.name,
            value: property.value,
            key: property.key,
            updated: property
                .data_updated_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    println!("{}", Table::new(&rows));
}
