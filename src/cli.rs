use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use receipt_guard::commands::Command;
use receipt_guard::commands::check::Checker;
use receipt_guard::commands::hash::Fingerprinter;
use receipt_guard::commands::import::Importer;
use receipt_guard::commands::list::Lister;
use receipt_guard::error::Result;
use receipt_guard::services::detector::{DEFAULT_MAX_HAMMING_DISTANCE, Submission};
use receipt_guard::services::record::Provenance;

use crate::logger;

const DEFAULT_STORE_FILENAME: &str = "receipt-hashes.json";

#[derive(Parser)]
#[command(name = "rguard")]
#[command(author, version, about = "Detect re-submitted payment receipt images", long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Hash store file
    #[arg(long, env = "RGUARD_STORE", default_value = DEFAULT_STORE_FILENAME, global = true)]
    pub store: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Optional identifiers recorded with a new receipt.
#[derive(Args, Debug, Default)]
pub struct ProvenanceArgs {
    /// Transaction the receipt belongs to
    #[arg(long)]
    pub transaction_id: Option<String>,

    /// Payment reference quoted by the sender
    #[arg(long)]
    pub payment_reference: Option<String>,

    /// User who sent the receipt
    #[arg(long)]
    pub user_id: Option<String>,

    /// Message the receipt was attached to
    #[arg(long)]
    pub message_id: Option<String>,
}

impl From<ProvenanceArgs> for Provenance {
    fn from(args: ProvenanceArgs) -> Self {
        Provenance {
            transaction_id: args.transaction_id,
            payment_reference: args.payment_reference,
            user_id: args.user_id,
            message_id: args.message_id,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check a receipt image and record it if it is new
    Check {
        /// Image file to check
        image: PathBuf,

        /// Largest perceptual distance still reported as a duplicate
        #[arg(short = 'd', long, default_value_t = DEFAULT_MAX_HAMMING_DISTANCE)]
        max_distance: u32,

        /// Location of the stored original, kept for audit
        #[arg(long)]
        image_url: Option<String>,

        #[command(flatten)]
        provenance: ProvenanceArgs,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the cryptographic and perceptual hashes of an image
    Hash {
        /// Image file to hash
        image: PathBuf,

        /// Print the hashes as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check every image in a directory, seeding the store
    Import {
        /// Directory of receipt images
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Only import images directly inside the directory
        #[arg(long)]
        no_recursive: bool,

        /// Include hidden files (starting with '.')
        #[arg(long)]
        include_hidden: bool,

        /// Largest perceptual distance still reported as a duplicate
        #[arg(short = 'd', long, default_value_t = DEFAULT_MAX_HAMMING_DISTANCE)]
        max_distance: u32,
    },

    /// List stored receipt records
    List {
        /// Print the records as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    logger::init(cli.verbose, cli.quiet);

    let command: Box<dyn Command + Send + Sync> = match cli.command {
        Commands::Check {
            image,
            max_distance,
            image_url,
            provenance,
            json,
        } => {
            let mut submission = Submission::new()
                .with_provenance(provenance.into())
                .with_max_hamming_distance(max_distance);
            submission.image_url = image_url;
            Box::new(Checker::new(image, cli.store, submission, json, cli.quiet))
        }
        Commands::Hash { image, json } => Box::new(Fingerprinter::new(image, json)),
        Commands::Import {
            path,
            no_recursive,
            include_hidden,
            max_distance,
        } => Box::new(Importer::new(
            path,
            cli.store,
            !no_recursive,
            include_hidden,
            max_distance,
            cli.quiet,
        )),
        Commands::List { json } => Box::new(Lister::new(cli.store, json)),
    };

    command.execute().await
}
