use anyhow::{bail, Context, Error};
use clap::Parser;
use clap_verbosity_flag::Level as VerbosityLevel;
use clap_verbosity_flag::Verbosity;
use openspool_dto as dto;
use openspool_dto::client::{ClientConfig, Error as ClientError, SpoolmanClient};
use openspool_dto::params::SpoolListParams;
use openspool_dto::records::{find_descriptor_with, ScanOutcome};
use openspool_dto::validate::Validator;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tag::{ScanSession, TagDevice, TagError, TagRead};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::fmt::Subscriber;

mod tag;

const LOAD_ERROR: &str = "Failed to load spools. Please check your connection to Spoolman.";
const LOOKUP_ERROR: &str = "Could not find this spool ID in your Spoolman instance.";
const UNLINKED_TAG: &str = "This tag doesn't have a linked Spoolman ID.";

#[derive(Debug, Parser)]
#[command(version, about)]
struct Opts {
    #[command(subcommand)]
    pub command: Command,

    /// Spoolman instance to query, e.g. http://192.168.1.100:7912.
    /// Leave empty to go through the default proxy.
    #[clap(
        long,
        global = true,
        env = "SPOOLMAN_URL",
        default_value = "",
        hide_env_values = true
    )]
    pub spoolman_url: String,

    /// Tag image standing in for the NFC reader. Without one, tag commands
    /// report NFC as unsupported.
    #[clap(long, global = true, env = "OPENSPOOL_TAG")]
    pub tag: Option<PathBuf>,

    /// Output pretty formatted JSON (no colors).
    #[clap(long, global = true, env = "OPENSPOOL_PRETTY", hide_env_values = true)]
    pub pretty: bool,

    #[command(flatten)]
    pub verbose: Verbosity,
}

#[derive(Debug, Parser)]
enum Command {
    /// Spool commands.
    Spools(SpoolOpts),

    /// Filament commands.
    Filaments(FilamentOpts),

    /// Vendor commands.
    Vendors(VendorOpts),

    /// Print the tag descriptor of a spool without writing it.
    Encode(SpoolIdOpts),

    /// Write the descriptor of a spool to the tag.
    Write(SpoolIdOpts),

    /// Scan a tag and print its descriptor.
    Read(ReadOpts),

    /// Validate descriptor JSON from a file, or stdin.
    Validate(ValidateOpts),

    /// Print the JSON schema of the tag descriptor.
    Schema,
}

#[derive(Debug, Parser)]
pub struct SpoolOpts {
    #[command(subcommand)]
    pub command: SpoolCommand,
}

#[derive(Debug, Parser)]
pub enum SpoolCommand {
    /// List spools. Archived spools are hidden unless `--all` is given.
    List(SpoolListParams),

    /// Get a spool's details.
    Get(SpoolIdOpts),
}

#[derive(Debug, Parser)]
pub struct FilamentOpts {
    #[command(subcommand)]
    pub command: ListCommand,
}

#[derive(Debug, Parser)]
pub struct VendorOpts {
    #[command(subcommand)]
    pub command: ListCommand,
}

#[derive(Debug, Parser)]
pub enum ListCommand {
    /// List everything.
    List,
}

#[derive(Debug, Parser)]
pub struct SpoolIdOpts {
    /// The Spoolman spool id.
    id: i64,
}

#[derive(Debug, Parser)]
pub struct ReadOpts {
    /// Look up the spool the tag points to.
    #[clap(long)]
    lookup: bool,

    /// Reject descriptors with unknown keys.
    #[clap(long)]
    strict: bool,
}

#[derive(Debug, Parser)]
pub struct ValidateOpts {
    /// JSON file to validate. Reads stdin when absent or `-`.
    file: Option<PathBuf>,

    /// Reject descriptors with unknown keys.
    #[clap(long)]
    strict: bool,
}

#[derive(Debug, Serialize)]
struct ReadOutput {
    serial_number: String,
    descriptor: dto::TagDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    spool: Option<dto::Spool>,
}

fn output_json<J: Serialize>(value: J, opts: &Opts) -> Result<(), anyhow::Error> {
    println!(
        "{}",
        if opts.pretty {
            serde_json::to_string_pretty(&value)?
        } else {
            serde_json::to_string(&value)?
        }
    );
    Ok(())
}

fn validator(strict: bool) -> Validator {
    if strict {
        Validator::strict()
    } else {
        Validator::permissive()
    }
}

fn spoolman(opts: &Opts) -> Result<SpoolmanClient, Error> {
    let config = ClientConfig::new()
        .with_url(&opts.spoolman_url)
        .with_context(|| format!("Invalid Spoolman URL {:?}", opts.spoolman_url))?;
    debug!(base_url = %config.base_url()?, "using Spoolman");
    Ok(SpoolmanClient::new(config)?)
}

async fn fetch_spool(client: &SpoolmanClient, id: i64) -> Result<dto::Spool, Error> {
    match client.spools_details(id).await {
        Ok(spool) => Ok(spool),
        Err(ClientError::NotFound(_)) => bail!("Spool {id} was not found in Spoolman."),
        Err(e) => Err(Error::new(e).context(LOAD_ERROR)),
    }
}

/// Runs one scan. Ctrl-C cancels it.
async fn scan<D: TagDevice>(device: &D, session: &mut ScanSession) -> Result<TagRead, TagError> {
    let signal = session.start();

    tokio::select! {
        read = device.scan(signal) => read,
        _ = tokio::signal::ctrl_c() => {
            session.cancel();
            Err(TagError::Cancelled)
        }
    }
}

async fn spools(opts: &Opts, spool_opts: &SpoolOpts) -> Result<(), Error> {
    let client = spoolman(opts)?;

    match &spool_opts.command {
        SpoolCommand::List(params) => {
            let all = client.spools().await.context(LOAD_ERROR)?;
            let total = all.len();
            let spools = params.apply(all);
            debug!(total, shown = spools.len(), "listing spools");

            if spools.is_empty() {
                warn!("No spools found matching your search.");
            }
            output_json(spools, opts)
        }
        SpoolCommand::Get(SpoolIdOpts { id }) => {
            let spool = fetch_spool(&client, *id).await?;
            output_json(spool, opts)
        }
    }
}

async fn filaments(opts: &Opts, filament_opts: &FilamentOpts) -> Result<(), Error> {
    match filament_opts.command {
        ListCommand::List => {
            let filaments = spoolman(opts)?.filaments().await.context(LOAD_ERROR)?;
            output_json(filaments, opts)
        }
    }
}

async fn vendors(opts: &Opts, vendor_opts: &VendorOpts) -> Result<(), Error> {
    match vendor_opts.command {
        ListCommand::List => {
            let vendors = spoolman(opts)?.vendors().await.context(LOAD_ERROR)?;
            output_json(vendors, opts)
        }
    }
}

async fn encode(opts: &Opts, SpoolIdOpts { id }: &SpoolIdOpts) -> Result<(), Error> {
    let spool = fetch_spool(&spoolman(opts)?, *id).await?;
    output_json(dto::map_spool(&spool), opts)
}

async fn write(opts: &Opts, SpoolIdOpts { id }: &SpoolIdOpts) -> Result<(), Error> {
    // Check for a reader before touching the network.
    let device = tag::open_device(opts.tag.as_deref())?;

    let spool = fetch_spool(&spoolman(opts)?, *id).await?;
    let descriptor = dto::map_spool(&spool);

    info!(spool_id = spool.id, "hold the tag near the reader to write");
    device.write(&descriptor).await?;
    info!("Data successfully written to the NFC tag.");

    output_json(descriptor, opts)
}

async fn read(opts: &Opts, read_opts: &ReadOpts) -> Result<(), Error> {
    let device = tag::open_device(opts.tag.as_deref())?;
    let mut session = ScanSession::new();

    let TagRead {
        serial_number,
        records,
    } = scan(&device, &mut session).await?;

    let outcome = find_descriptor_with(&records, &validator(read_opts.strict));
    let descriptor = match &outcome {
        ScanOutcome::Found(descriptor) => descriptor.clone(),
        ScanOutcome::NotFound { last_error } => {
            if let Some(e) = last_error {
                debug!(%e, "no valid descriptor on tag");
            }
            bail!(outcome.user_message());
        }
    };
    info!(%serial_number, "Tag read successfully.");

    let spool = match (read_opts.lookup, descriptor.spool_id) {
        (true, Some(id)) => {
            let client = spoolman(opts)?;
            match client.spools_details(id).await {
                Ok(spool) => Some(spool),
                Err(e) => {
                    debug!(%e, "spool lookup failed");
                    bail!(LOOKUP_ERROR);
                }
            }
        }
        (true, None) => {
            warn!("{UNLINKED_TAG}");
            None
        }
        (false, _) => None,
    };

    output_json(
        ReadOutput {
            serial_number,
            descriptor,
            spool,
        },
        opts,
    )
}

fn read_input(file: Option<&Path>) -> Result<String, Error> {
    let mut text = String::new();
    match file {
        Some(path) if path != Path::new("-") => {
            text = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read {}", path.display()))?;
        }
        _ => {
            std::io::stdin().read_to_string(&mut text)?;
        }
    }
    Ok(text)
}

fn validate(opts: &Opts, validate_opts: &ValidateOpts) -> Result<(), Error> {
    let text = read_input(validate_opts.file.as_deref())?;

    match validator(validate_opts.strict).validate_str(&text) {
        Ok(descriptor) => output_json(descriptor, opts),
        Err(e) => {
            output_json(&e.issues, opts)?;
            if e.is_unrecognized() {
                bail!("No OpenSpool data found.")
            } else {
                bail!("Malformed OpenSpool data.")
            }
        }
    }
}

fn schema(opts: &Opts) -> Result<(), Error> {
    output_json(schemars::schema_for!(dto::TagDescriptor), opts)
}

#[tokio::main]
async fn main() {
    let opts = Opts::parse();

    // Initialize tracing.
    let subscriber = Subscriber::builder();
    let subscriber = match opts.verbose.log_level() {
        Some(VerbosityLevel::Error) => subscriber.with_max_level(Level::ERROR),
        Some(VerbosityLevel::Warn) => subscriber.with_max_level(Level::WARN),
        Some(VerbosityLevel::Info) => subscriber.with_max_level(Level::INFO),
        Some(VerbosityLevel::Debug) => subscriber.with_max_level(Level::DEBUG),
        None | Some(VerbosityLevel::Trace) => subscriber.with_max_level(Level::TRACE),
    };
    subscriber
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .init();
    debug!(?opts);

    let result = match &opts.command {
        Command::Spools(spool_opts) => spools(&opts, spool_opts).await,
        Command::Filaments(filament_opts) => filaments(&opts, filament_opts).await,
        Command::Vendors(vendor_opts) => vendors(&opts, vendor_opts).await,
        Command::Encode(id_opts) => encode(&opts, id_opts).await,
        Command::Write(id_opts) => write(&opts, id_opts).await,
        Command::Read(read_opts) => read(&opts, read_opts).await,
        Command::Validate(validate_opts) => validate(&opts, validate_opts),
        Command::Schema => schema(&opts),
    };

    match result {
        Ok(()) => {}
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    }
}
