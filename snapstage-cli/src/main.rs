use clap::{Parser, Subcommand};
use snapstage::{Config, IngestArchiveJobBuilder, UploadEvent};
use url::Url;

mod progress;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Operation to perform
    #[clap(subcommand)]
    command: Command,

    #[clap(flatten)]
    globals: Globals,
}

/// Arguments that apply regardless of command
#[derive(Parser, Debug)]
struct Globals {
    /// Enable verbose log output
    #[clap(short = 'v', long, conflicts_with = "quiet", global = true)]
    verbose: bool,

    /// Be quiet, suppress almost all output (except errors)
    #[clap(short = 'q', long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[clap(flatten)]
    config: Config,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a photo archive from object storage.
    Ingest {
        /// S3 URL of the archive object to ingest.
        ///
        /// The URL must specify the bucket and the complete object key, and the key must follow
        /// the `{prefix}/{tenant}/{user}/{job}/{file}` upload convention, for example:
        ///
        /// s3://photo-uploads/uploads/acme/1042/b2f41c/batch.zip
        #[clap(value_parser, value_name = "URL")]
        source: Url,
    },

    /// Ingest the photo archive described by a storage notification event.
    ///
    /// Reads a JSON document of the form
    /// `{"containerName": "...", "objectKey": "...", "size": 123}` from stdin, exactly as the
    /// storage platform delivers it, and runs the ingestion job it describes.
    Event,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    init_logging(&args.globals);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(args))
}

async fn run(args: Args) -> color_eyre::Result<()> {
    let event = match &args.command {
        Command::Ingest { source } => event_from_url(source)?,
        Command::Event => serde_json::from_reader(std::io::stdin().lock())?,
    };

    let job = IngestArchiveJobBuilder::from_event(args.globals.config.clone(), &event)
        .await?
        .build()
        .await?;

    let result = progress::run_ingest_job(&args.globals, job).await?;

    if !args.globals.quiet {
        println!("Ingestion complete: {result}");

        for key in &result.staged_keys {
            println!("  staged {key}");
        }

        if result.degraded() {
            eprintln!(
                "warning: {} entries failed and were not staged; see the log for details",
                result.failed
            );
        }
    }

    Ok(())
}

/// Translate an `s3://bucket/key` URL into the equivalent storage notification event.
fn event_from_url(url: &Url) -> color_eyre::Result<UploadEvent> {
    if url.scheme() != "s3" {
        color_eyre::eyre::bail!("unsupported URL scheme '{}'; expected s3://", url.scheme());
    }

    let container_name = url
        .host_str()
        .ok_or_else(|| color_eyre::eyre::eyre!("the URL '{url}' is missing the bucket name"))?
        .to_string();

    let object_key = url.path().trim_start_matches('/').to_string();
    if object_key.is_empty() {
        color_eyre::eyre::bail!("the URL '{url}' is missing the object key of the archive");
    }

    Ok(UploadEvent {
        container_name,
        object_key,
        size: 0,
    })
}

fn init_logging(globals: &Globals) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if globals.verbose {
        "debug,h2=warn,hyper=info,rustls=info,aws_config=info"
    } else if globals.quiet {
        "error"
    } else {
        "info,aws_config=warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap();

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
