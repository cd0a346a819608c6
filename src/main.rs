//! Cardsmith - guided greeting card builder.
//!
//! Drives a card session from command-line flags, talks to the image model,
//! and manages the API key.

#![allow(clippy::single_match_else)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cardsmith::card::{
    FontFamily, FontSize, FrameId, ReferenceImage, Resolution, TextField, COLOR_OPTIONS,
};
use cardsmith::credentials::CredentialStore;
use cardsmith::session::{validate_for_generation, validate_holiday};
use cardsmith::{
    prompt, Artifact, CardField, CardSpec, Config, EnvCredentialSource, FormSession,
    GenerationGateway, HolidayId, KeyState, KeyStateMachine, KeyringStore, MemoryStore, StyleMode,
};

/// Guided greeting card builder
#[derive(Parser)]
#[command(name = "cardsmith")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a card and write it to disk
    Create {
        #[command(flatten)]
        spec: SpecArgs,

        /// Refinement round to run after the first card (repeatable)
        #[arg(long = "refine", value_name = "INSTRUCTION")]
        refine: Vec<String>,

        /// Output file or directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the compiled generation request without calling the model
    Compile {
        #[command(flatten)]
        spec: SpecArgs,
    },

    /// List holidays, frames, fonts, colors and resolutions
    Options,

    /// Manage the API key
    Key {
        #[command(subcommand)]
        operation: KeyOperation,
    },

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,

        /// Write a default config file if none exists
        #[arg(long, conflicts_with = "path")]
        init: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum KeyOperation {
    /// Show the current key state
    Status,

    /// Verify a key against the model service
    Test {
        /// API key to verify
        key: String,

        /// Save the key to the system keychain once verified
        #[arg(long)]
        persist: bool,
    },

    /// Remove the saved key
    Forget,

    /// Use the key from the environment instead of a saved one
    Ambient,
}

/// Card description flags shared by `create` and `compile`.
#[derive(Args, Debug, Default)]
struct SpecArgs {
    /// Holiday (new_year, lunar_new_year, daeboreum, chuseok, christmas, custom)
    #[arg(long)]
    holiday: Option<String>,

    /// Occasion name for a custom holiday
    #[arg(long = "custom-name")]
    custom_name: Option<String>,

    /// Reference image to style the card after
    #[arg(long, value_name = "FILE")]
    reference: Option<PathBuf>,

    /// Keep the reference image's look unchanged
    #[arg(long)]
    strict: bool,

    /// Frame (none, simple, ornate, floral, festive, polaroid)
    #[arg(long)]
    frame: Option<String>,

    /// Output resolution (1K, 2K, 4K)
    #[arg(long)]
    resolution: Option<String>,

    /// Let the model pick fonts and colors
    #[arg(long = "auto-style")]
    auto_style: bool,

    /// Sender name
    #[arg(long)]
    sender: Option<String>,

    /// Recipient name
    #[arg(long)]
    recipient: Option<String>,

    /// Card message (defaults to the holiday greeting)
    #[arg(long)]
    message: Option<String>,

    /// Extra field assignment, e.g. sender.color=Gold (repeatable)
    #[arg(long = "set", value_name = "PATH=VALUE")]
    set: Vec<String>,
}

impl SpecArgs {
    /// Assignments for the holiday step.
    fn holiday_fields(&self) -> Result<Vec<CardField>> {
        let mut fields = Vec::new();
        if let Some(holiday) = &self.holiday {
            fields.push(CardField::parse("holiday", holiday)?);
        }
        if let Some(name) = &self.custom_name {
            fields.push(CardField::CustomHolidayName(name.clone()));
        }
        Ok(fields)
    }

    /// Assignments for the style step.
    fn style_fields(&self) -> Result<Vec<CardField>> {
        let mut fields = Vec::new();
        if let Some(path) = &self.reference {
            fields.push(CardField::Style(StyleMode::Reference));
            fields.push(CardField::ReferenceImage(Some(load_reference(path)?)));
        }
        if self.strict {
            fields.push(CardField::StrictReference(true));
        }
        if let Some(frame) = &self.frame {
            fields.push(CardField::parse("frame", frame)?);
        }
        if let Some(resolution) = &self.resolution {
            fields.push(CardField::parse("resolution", resolution)?);
        }
        Ok(fields)
    }

    /// Assignments for the message step, `--set` entries last.
    fn message_fields(&self) -> Result<Vec<CardField>> {
        let mut fields = Vec::new();
        if self.auto_style {
            fields.push(CardField::AutoTextStyle(true));
        }
        for (target, value) in [
            (TextField::Sender, &self.sender),
            (TextField::Recipient, &self.recipient),
            (TextField::Message, &self.message),
        ] {
            if let Some(value) = value {
                fields.push(CardField::Text(target, value.clone()));
            }
        }
        for assignment in &self.set {
            fields.push(
                CardField::parse_assignment(assignment)
                    .with_context(|| format!("Invalid --set '{assignment}'"))?,
            );
        }
        Ok(fields)
    }

    /// Build the spec directly, without a session.
    fn to_spec(&self) -> Result<CardSpec> {
        let spec = [self.holiday_fields()?, self.style_fields()?, self.message_fields()?]
            .into_iter()
            .flatten()
            .fold(CardSpec::default(), |spec, field| spec.with_field(field));
        Ok(spec)
    }
}

/// Read a reference image, guessing its MIME type from the extension.
fn load_reference(path: &Path) -> Result<ReferenceImage> {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_() != mime_guess::mime::IMAGE {
        anyhow::bail!("{} does not look like an image ({})", path.display(), mime);
    }

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read reference image {}", path.display()))?;
    tracing::debug!(path = %path.display(), mime = %mime, bytes = bytes.len(), "Loaded reference image");
    Ok(ReferenceImage::new(mime.essence_str(), bytes))
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("cardsmith=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cardsmith=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Some(Commands::Create { spec, refine, output }) => cmd_create(&spec, &refine, output),
        Some(Commands::Compile { spec }) => cmd_compile(&spec),
        Some(Commands::Options) => {
            cmd_options();
            Ok(())
        }
        Some(Commands::Key { operation }) => cmd_key(operation),
        Some(Commands::Config { path, init }) => cmd_config(path, init),
        Some(Commands::Completions { shell }) => {
            cmd_completions(shell);
            Ok(())
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

/// Credential store selected by configuration.
fn credential_store(config: &Config) -> Arc<dyn CredentialStore> {
    if config.credentials.use_keyring {
        Arc::new(KeyringStore::with_service(config.credentials.service.clone()))
    } else {
        Arc::new(MemoryStore::new())
    }
}

#[cfg(feature = "gemini")]
fn gateway(config: &Config) -> Result<Arc<dyn GenerationGateway>> {
    let gateway = cardsmith::GeminiGateway::new(&config.gateway)
        .context("Failed to create the Gemini client")?;
    Ok(Arc::new(gateway))
}

#[cfg(not(feature = "gemini"))]
fn gateway(_config: &Config) -> Result<Arc<dyn GenerationGateway>> {
    anyhow::bail!("Image generation is not available. Rebuild with the 'gemini' feature.")
}

/// Key state machine restored from the store and environment.
async fn key_state(config: &Config) -> Arc<KeyStateMachine> {
    let keys = KeyStateMachine::new(
        credential_store(config),
        Arc::new(EnvCredentialSource::new(config.gateway.api_key_env.clone())),
    );
    keys.initialize().await;
    Arc::new(keys)
}

/// Generate a card from flags, run any refinement rounds, and save it.
fn cmd_create(args: &SpecArgs, refinements: &[String], output: Option<PathBuf>) -> Result<()> {
    let config = Config::load()?;
    let holiday_fields = args.holiday_fields()?;
    let style_fields = args.style_fields()?;
    let message_fields = args.message_fields()?;

    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let keys = key_state(&config).await;
        if !keys.is_ready() {
            anyhow::bail!(
                "No API key available.\n\n\
                 Verify and save one with: cardsmith key test <KEY> --persist\n\
                 Or set one of: {}",
                config.gateway.api_key_env.join(", ")
            );
        }

        let session = FormSession::start(gateway(&config)?, keys);

        for fields in [holiday_fields, style_fields] {
            for field in fields {
                session.set_field(field)?;
            }
            session.advance()?;
        }
        for field in message_fields {
            session.set_field(field)?;
        }

        println!("Generating card...");
        let mut artifact = session.finalize().await.map_err(|e| {
            if e.needs_credential_setup() {
                anyhow::anyhow!("{e}\n\nCheck your key with: cardsmith key status")
            } else {
                anyhow::Error::new(e)
            }
        })?;

        if let Some(controller) = session.refinement() {
            for (round, instruction) in refinements.iter().enumerate() {
                println!("Refining ({}/{}): {instruction}", round + 1, refinements.len());
                controller.set_field(CardField::RefinementInstruction(instruction.clone()))?;
                match controller.refine_working().await {
                    Ok(refined) => artifact = refined,
                    Err(e) => {
                        eprintln!("Refinement failed, keeping the previous card: {e}");
                        break;
                    }
                }
            }
        }

        let path = write_artifact(&artifact, output.as_deref(), &config)?;
        println!("Saved {} ({} bytes)", path.display(), artifact.bytes.len());
        Ok(())
    })
}

/// Write the card to `output`, or to the configured directory.
fn write_artifact(artifact: &Artifact, output: Option<&Path>, config: &Config) -> Result<PathBuf> {
    let path = match output {
        Some(path) if path.is_dir() => path.join(artifact.suggested_file_name()),
        Some(path) => path.to_path_buf(),
        None => config.output_dir().join(artifact.suggested_file_name()),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, &artifact.bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!(path = %path.display(), sha256 = %artifact.fingerprint(), "Card written");
    Ok(path)
}

/// Print the request the model would receive.
fn cmd_compile(args: &SpecArgs) -> Result<()> {
    let spec = args.to_spec()?;
    validate_holiday(&spec)?;
    validate_for_generation(&spec)?;

    let request = prompt::compile(&spec, None);
    println!("{}", serde_json::to_string_pretty(&request.to_inspection_json())?);
    Ok(())
}

/// Handle key commands.
fn cmd_key(operation: KeyOperation) -> Result<()> {
    let config = Config::load()?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let keys = key_state(&config).await;

        match operation {
            KeyOperation::Status => {
                println!("Key state:    {}", keys.state());
                println!("Saved key:    {}", if keys.persist_enabled() { "yes" } else { "no" });
                println!("Ready:        {}", if keys.is_ready() { "yes" } else { "no" });
                println!("Environment:  {}", config.gateway.api_key_env.join(", "));
                if keys.setup_requested() {
                    println!("\nNo key configured. Run: cardsmith key test <KEY> --persist");
                }
            }
            KeyOperation::Test { key, persist } => {
                keys.set_manual_key(&key);
                if persist {
                    keys.set_persist(true)?;
                }

                println!("Testing API key...");
                let gateway = gateway(&config)?;
                let state = keys.test(gateway.as_ref()).await?;
                if state != KeyState::Manual(cardsmith::ManualStatus::Verified) {
                    anyhow::bail!("Connection failed. Check your API key.");
                }

                println!("Connection successful.");
                if persist {
                    println!("Key saved to the system keychain.");
                }
            }
            KeyOperation::Forget => {
                keys.set_persist(false)?;
                println!("Saved API key removed.");
            }
            KeyOperation::Ambient => {
                let state = keys.select_ambient().await.with_context(|| {
                    format!("No key found in {}", config.gateway.api_key_env.join(", "))
                })?;
                println!("Using the environment API key ({state}).");
            }
        }

        Ok(())
    })
}

/// Show configuration.
fn cmd_config(show_path: bool, init: bool) -> Result<()> {
    if init {
        let path =
            Config::config_path().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        if path.exists() {
            anyhow::bail!("Config already exists at {}", path.display());
        }
        Config::default().save()?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    if show_path {
        if let Some(path) = Config::config_path() {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let config = Config::load()?;
    let toml = toml::to_string_pretty(&config)?;
    println!("{toml}");

    Ok(())
}

/// Print the option catalogs accepted by the card flags.
fn cmd_options() {
    println!("Holidays (--holiday):");
    for holiday in HolidayId::ALL {
        println!("  {:<16} {} / {}", holiday.id(), holiday.display_name(), holiday.sub_name());
    }

    println!("\nFrames (--frame):");
    for frame in FrameId::ALL {
        println!("  {:<16} {}: {}", frame.id(), frame.display_name(), frame.description());
    }

    println!("\nFonts (--set <field>.font=...):");
    for font in FontFamily::ALL {
        println!("  {:<16} {}", font.id(), font.display_name());
    }

    let sizes: Vec<&str> = FontSize::ALL.iter().map(|size| size.id()).collect();
    println!("\nSizes (--set <field>.size=...):\n  {}", sizes.join(", "));

    println!("\nColors (--set <field>.color=...):");
    for (label, value) in COLOR_OPTIONS {
        println!("  {label:<16} {value}");
    }

    println!("\nResolutions (--resolution):");
    for resolution in Resolution::ALL {
        println!("  {:<16} {}", resolution.id(), resolution.description());
    }
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "cardsmith", &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_spec_args_build_spec_in_step_order() {
        let args = SpecArgs {
            holiday: Some("chuseok".to_string()),
            sender: Some("Mina".to_string()),
            message: Some("Happy harvest".to_string()),
            set: vec!["sender.color=Silver".to_string()],
            ..Default::default()
        };

        let spec = args.to_spec().unwrap();
        assert_eq!(spec.holiday, cardsmith::HolidayId::Chuseok);
        assert_eq!(spec.message, "Happy harvest");
        assert_eq!(spec.sender_style.color, "Silver");
    }

    #[test]
    fn test_spec_args_reject_bad_assignment() {
        let args = SpecArgs { set: vec!["sender.colour=Gold".to_string()], ..Default::default() };
        assert!(args.to_spec().is_err());
    }

    #[test]
    fn test_load_reference_rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();
        assert!(load_reference(&path).is_err());

        let png = dir.path().join("ref.png");
        std::fs::write(&png, [0x89, b'P', b'N', b'G']).unwrap();
        let image = load_reference(&png).unwrap();
        assert_eq!(image.mime_type, "image/png");
    }
}
