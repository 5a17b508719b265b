//! CanoKey console CLI
//!
//! Device information, admin applet control and OATH credential management
//! for CanoKey tokens attached over USB.

use std::path::PathBuf;
use std::sync::Arc;

use canokey_console::adapters::usb::{UsbConnector, UsbControlChannel};
use canokey_console::{
    parse_otpauth, AdminPin, ApduHistory, ConfigFeature, ConfigManager, ConsoleError,
    DeviceSession, KeyEncoding, KeyMaterial, MutationReport, NewOathEntry, OathAlgorithm,
    OathEntry, OathPassphrase, OathProperties, OathType, ResettableApplet, SelectOutcome,
};
use canokey_console::{ConsoleConfiguration, DeviceManager};
use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::{Context, Result};

#[derive(Parser)]
#[command(name = "canokey-console")]
#[command(about = "Manage CanoKey tokens: admin applet and OATH credentials")]
#[command(long_about = "
CanoKey Console - host-side management for CanoKey tokens

EXAMPLES:
    # Show firmware, model and serial number
    canokey-console info

    # Turn the LED off (PIN from CANOKEY_PIN)
    canokey-console admin led off

    # List OATH credentials
    canokey-console oath list

    # Import a credential from an otpauth link
    canokey-console oath import 'otpauth://totp/Example:alice?secret=JBSWY3DPEHPK3PXP'

    # Print the current TOTP code
    canokey-console oath calculate Example:alice

ENVIRONMENT VARIABLES:
    CANOKEY_PIN               Admin PIN
    CANOKEY_OATH_PASSPHRASE   OATH applet passphrase, if one is set
    RUST_LOG                  Logging level (trace shows raw APDUs)
")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the APDU history after the command
    #[arg(long, global = true)]
    history: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show firmware version, model, serial number and chip id
    Info,

    /// Admin applet operations
    #[command(subcommand)]
    Admin(AdminCommands),

    /// OATH credential management
    #[command(subcommand)]
    Oath(OathCommands),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args)]
struct PinArg {
    /// Admin PIN
    #[arg(long, env = "CANOKEY_PIN", hide_env_values = true)]
    pin: Option<String>,
}

#[derive(Args)]
struct PassphraseArg {
    /// OATH applet passphrase
    #[arg(long, env = "CANOKEY_OATH_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Verify the admin PIN and show flash usage
    VerifyPin {
        #[command(flatten)]
        pin: PinArg,
    },

    /// Turn the LED on or off
    Led {
        state: Switch,
        #[command(flatten)]
        pin: PinArg,
    },

    /// Turn HOTP-on-touch on or off
    HotpTouch {
        state: Switch,
        #[command(flatten)]
        pin: PinArg,
    },

    /// Wipe an applet (openpgp, piv, oath)
    Reset {
        applet: ResettableApplet,
        /// Required: the applet's data is destroyed
        #[arg(long)]
        confirm: bool,
        #[command(flatten)]
        pin: PinArg,
    },

    /// Reboot into the firmware updater
    Dfu {
        #[command(flatten)]
        pin: PinArg,
    },
}

#[derive(Subcommand)]
enum OathCommands {
    /// List credentials
    List {
        #[command(flatten)]
        passphrase: PassphraseArg,
    },

    /// Add a credential
    Add {
        /// Credential name
        name: String,
        /// Secret key
        #[arg(long, env = "CANOKEY_OATH_KEY", hide_env_values = true)]
        key: String,
        /// Key encoding (utf-8, hex, base32)
        #[arg(long, default_value = "base32")]
        encoding: KeyEncoding,
        /// Credential type (totp, hotp)
        #[arg(long = "type", default_value = "totp")]
        oath_type: OathType,
        /// HMAC algorithm (sha1, sha256)
        #[arg(long, default_value = "sha1")]
        algorithm: OathAlgorithm,
        #[command(flatten)]
        properties: PropertyArgs,
        #[command(flatten)]
        passphrase: PassphraseArg,
    },

    /// Add a credential from an otpauth:// link
    Import {
        uri: String,
        #[command(flatten)]
        properties: PropertyArgs,
        #[command(flatten)]
        passphrase: PassphraseArg,
    },

    /// Delete a credential
    Delete {
        name: String,
        #[command(flatten)]
        passphrase: PassphraseArg,
    },

    /// Make a HOTP credential the touch default
    SetDefault {
        name: String,
        #[command(flatten)]
        passphrase: PassphraseArg,
    },

    /// Print the current TOTP code
    Calculate {
        name: String,
        #[command(flatten)]
        passphrase: PassphraseArg,
    },
}

#[derive(Args)]
struct PropertyArgs {
    /// Reject HOTP counters that move backwards
    #[arg(long)]
    increasing_only: bool,
    /// Require a touch before each code
    #[arg(long)]
    require_touch: bool,
}

impl From<PropertyArgs> for OathProperties {
    fn from(args: PropertyArgs) -> Self {
        OathProperties {
            increasing_only: args.increasing_only,
            require_touch: args.require_touch,
        }
    }
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Create default configuration file
    Init,

    /// Print the configuration file path
    Path,

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },
}

#[derive(ValueEnum, Clone, Copy)]
enum Switch {
    On,
    Off,
}

impl Switch {
    fn enabled(self) -> bool {
        matches!(self, Switch::On)
    }
}

type Session = DeviceSession<UsbControlChannel>;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config_manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };

    let command = match cli.command {
        Commands::Config(config_cmd) => return handle_config_command(&config_manager, config_cmd),
        other => other,
    };

    let config = config_manager
        .load_or_default()
        .context("Failed to load configuration")?;
    let history = Arc::new(ApduHistory::new(config.apdu_history_limit));
    let mut manager = DeviceManager::new(UsbConnector::new(config.transport.clone()), &config)
        .with_log(history.clone());

    let result = run_device_command(&mut manager, command).await;
    manager.disconnect();

    if cli.history || config.verbose {
        print_history(&history);
    }
    result
}

async fn run_device_command(
    manager: &mut DeviceManager<UsbConnector>,
    command: Commands,
) -> Result<()> {
    let session = manager
        .session()
        .context("Failed to connect to CanoKey")?;

    match command {
        Commands::Info => handle_info_command(session).await,
        Commands::Admin(admin_cmd) => handle_admin_command(session, admin_cmd).await,
        Commands::Oath(oath_cmd) => handle_oath_command(session, oath_cmd).await,
        Commands::Config(_) => Ok(()),
    }
}

async fn handle_info_command(session: &mut Session) -> Result<()> {
    let info = session.admin().device_info().await?;
    let unknown = || "unknown".to_string();

    println!("CanoKey");
    println!(
        "  Firmware version: {}",
        info.firmware_version.unwrap_or_else(unknown)
    );
    println!("  Model: {}", info.model.unwrap_or_else(unknown));
    println!(
        "  Serial number: {}",
        info.serial_number.unwrap_or_else(unknown)
    );
    println!("  Chip id: {}", info.chip_id.unwrap_or_else(unknown));
    if let Some(protocol) = session.protocol() {
        println!("  OATH protocol: {protocol}");
    }
    Ok(())
}

async fn verify_pin(session: &mut Session, pin: PinArg, required: bool) -> Result<()> {
    match pin.pin {
        Some(pin) => {
            let pin = AdminPin::new(pin)?;
            if let Some(space) = session.admin().verify_pin(pin).await? {
                println!("Flash: {space}");
            }
            Ok(())
        }
        None if required => Err(ConsoleError::NotAuthenticated(
            "Set CANOKEY_PIN or pass --pin".to_string(),
        )
        .into()),
        None => Ok(()),
    }
}

async fn handle_admin_command(session: &mut Session, admin_cmd: AdminCommands) -> Result<()> {
    match admin_cmd {
        AdminCommands::VerifyPin { pin } => {
            verify_pin(session, pin, true).await?;
            println!("PIN verified");
        }

        AdminCommands::Led { state, pin } => {
            verify_pin(session, pin, false).await?;
            session
                .admin()
                .set_config(ConfigFeature::Led, state.enabled())
                .await
                .context("Set LED status failed")?;
            println!("LED is {}", if state.enabled() { "on" } else { "off" });
        }

        AdminCommands::HotpTouch { state, pin } => {
            verify_pin(session, pin, false).await?;
            session
                .admin()
                .set_config(ConfigFeature::HotpTouch, state.enabled())
                .await
                .context("Set HOTP status failed")?;
            println!(
                "HOTP on touch is {}",
                if state.enabled() { "on" } else { "off" }
            );
        }

        AdminCommands::Reset {
            applet,
            confirm,
            pin,
        } => {
            if !confirm {
                return Err(ConsoleError::InvalidInput(format!(
                    "Resetting {applet} destroys its data; pass --confirm"
                ))
                .into());
            }
            verify_pin(session, pin, false).await?;
            session
                .admin()
                .reset_applet(applet)
                .await
                .with_context(|| format!("Reset {applet} failed"))?;
            println!("Reset {applet} done");
        }

        AdminCommands::Dfu { pin } => {
            verify_pin(session, pin, true).await?;
            session.admin().enter_dfu().await?;
            println!("Device is entering DFU mode");
        }
    }
    Ok(())
}

/// Select the OATH applet and answer its challenge if it has one.
async fn unlock_oath(session: &mut Session, passphrase: PassphraseArg) -> Result<()> {
    if session.oath().select().await? == SelectOutcome::Unlocked {
        return Ok(());
    }
    let passphrase = passphrase
        .passphrase
        .ok_or(ConsoleError::PassphraseRequired)?;
    session
        .oath()
        .authenticate(OathPassphrase::new(passphrase)?)
        .await?;
    Ok(())
}

fn print_entries(entries: &[OathEntry]) {
    if entries.is_empty() {
        println!("No OATH credentials");
        return;
    }
    for entry in entries {
        println!(
            "  {:<7}  {:<11}  {}",
            entry.oath_type.to_string(),
            entry.algorithm.to_string(),
            entry.name
        );
    }
}

fn finish_mutation(report: MutationReport, done: &str) -> Result<()> {
    let MutationReport { outcome, entries } = report;
    match &entries {
        Ok(entries) => print_entries(entries),
        Err(e) => log::warn!("Could not refresh the credential list: {e}"),
    }
    outcome?;
    println!("{done}");
    Ok(())
}

async fn handle_oath_command(session: &mut Session, oath_cmd: OathCommands) -> Result<()> {
    match oath_cmd {
        OathCommands::List { passphrase } => {
            unlock_oath(session, passphrase).await?;
            let entries = session.oath().list().await?;
            print_entries(&entries);
        }

        OathCommands::Add {
            name,
            key,
            encoding,
            oath_type,
            algorithm,
            properties,
            passphrase,
        } => {
            unlock_oath(session, passphrase).await?;
            let entry = NewOathEntry {
                name,
                oath_type,
                algorithm,
                key: KeyMaterial::new(encoding, key),
                properties: properties.into(),
            };
            let report = session.oath().add(entry).await?;
            finish_mutation(report, "Add OATH credential success")?;
        }

        OathCommands::Import {
            uri,
            properties,
            passphrase,
        } => {
            let import = parse_otpauth(&uri)?;
            unlock_oath(session, passphrase).await?;
            let report = session
                .oath()
                .add(import.into_new_entry(properties.into()))
                .await?;
            finish_mutation(report, "Import OATH credential success")?;
        }

        OathCommands::Delete { name, passphrase } => {
            unlock_oath(session, passphrase).await?;
            let report = session.oath().delete(&name).await?;
            finish_mutation(report, "Delete OATH credential success")?;
        }

        OathCommands::SetDefault { name, passphrase } => {
            unlock_oath(session, passphrase).await?;
            let entries = session.oath().list().await?;
            let entry = entries
                .iter()
                .find(|entry| entry.name == name)
                .ok_or_else(|| ConsoleError::InvalidInput(format!("No credential named '{name}'")))?;
            session.oath().set_default(entry).await?;
            println!("'{name}' is now the default credential");
        }

        OathCommands::Calculate { name, passphrase } => {
            unlock_oath(session, passphrase).await?;
            let code = session.oath().calculate(&name).await?;
            println!("{code}");
        }
    }
    Ok(())
}

fn handle_config_command(config_manager: &ConfigManager, config_cmd: ConfigCommands) -> Result<()> {
    match config_cmd {
        ConfigCommands::Show => {
            let config: ConsoleConfiguration = config_manager.load_or_default()?;
            let transport = &config.transport;
            println!("Current Configuration:");
            println!("  Interface number: {}", transport.interface_number);
            println!("  Interface class: 0x{:02X}", transport.interface_class);
            println!("  USB timeout: {} ms", transport.usb_timeout_ms);
            println!("  Poll interval: {} ms", transport.poll_interval_ms);
            match transport.max_poll_attempts {
                Some(max) => println!("  Max poll attempts: {max}"),
                None => println!("  Max poll attempts: unbounded"),
            }
            println!("  Response buffer: {} bytes", transport.response_buffer_size);
            println!("  TOTP period: {} s", config.oath.totp_period_secs);
            println!("  APDU history: {} entries", config.apdu_history_limit);
            println!(
                "  Configuration file: {}",
                config_manager.config_path().display()
            );
        }

        ConfigCommands::Init => {
            let _config = config_manager.load_or_create_default()?;
            println!(
                "Configuration initialized: {}",
                config_manager.config_path().display()
            );
        }

        ConfigCommands::Path => {
            println!("{}", config_manager.config_path().display());
        }

        ConfigCommands::Set { key, value } => {
            config_manager.update_value(&key, &value)?;
            println!("Configuration updated: {key} = {value}");
        }
    }
    Ok(())
}

fn print_history(history: &ApduHistory) {
    println!("APDU history:");
    for entry in history.entries() {
        println!("  >> {}", entry.command);
        if entry.response.is_empty() {
            println!("  << (no response)");
        } else {
            println!("  << {}", entry.response);
        }
    }
}
