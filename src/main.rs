//! aknn CLI - approximate nearest-neighbor search
//!
//! Command-line interface over a document store kept in a JSON snapshot.

use aknn::cache::{ModelLoader, StoreModelLoader};
use aknn::{
    AknnError, Aknn, Config, CreateModelRequest, CreateOutcome, DocLocation, DocSearchRequest,
    IndexDocument, IndexRequest, MemoryStore, ModelBasis, ModelKey, RescoreMode, Result,
    SearchParams, SearchRequest, SortOrder,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use log::{error, info};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "aknn")]
#[command(author = "aknn Contributors")]
#[command(version)]
#[command(about = "Approximate nearest-neighbor search", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Store snapshot file (created on first write)
    #[arg(short, long, global = true, default_value = "aknn-store.json")]
    store: PathBuf,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an LSH model
    Create {
        /// Model location (index/type/id)
        #[arg(short, long)]
        model: ModelKey,

        /// Number of hash tables
        #[arg(short = 't', long)]
        tables: usize,

        /// Hyperplanes per table (at most 63)
        #[arg(short, long)]
        bits: usize,

        /// Vector dimensionality; omit to fix it on first index
        #[arg(short, long)]
        dimensions: Option<usize>,

        /// Random seed for reproducible bases
        #[arg(long)]
        seed: Option<i64>,

        /// JSON file with tables * bits hyperplane rows, used instead of random bases
        #[arg(long, conflicts_with_all = ["dimensions", "seed"])]
        sample: Option<PathBuf>,

        /// Free-text description
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Index documents from a JSON-lines file of {"_id": ..., "_source": {...}}
    Index {
        /// Model that hashes the vectors
        #[arg(short, long)]
        model: ModelKey,

        /// Target index
        #[arg(short, long)]
        index: String,

        /// Target document type
        #[arg(short = 'T', long = "type")]
        doc_type: String,

        /// Input file
        #[arg(long)]
        input: PathBuf,

        /// Documents per bulk request
        #[arg(long, default_value = "1000")]
        batch_size: usize,
    },

    /// Search with an explicit vector
    Search {
        /// Model that hashes the vector
        #[arg(short, long)]
        model: ModelKey,

        /// Index to search
        #[arg(short, long)]
        index: String,

        /// Document type to search
        #[arg(short = 'T', long = "type")]
        doc_type: String,

        /// Query vector, comma separated
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        vector: Vec<f64>,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Search using an indexed document as the query
    SearchDoc {
        /// Query document (index/type/id)
        #[arg(short, long)]
        doc: DocLocation,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Show store contents, or one model's details
    Info {
        /// Model to describe
        #[arg(short, long)]
        model: Option<ModelKey>,
    },
}

/// Overrides of the configured query defaults.
#[derive(Args)]
struct ParamArgs {
    /// Candidate pool size
    #[arg(long)]
    k1: Option<usize>,

    /// Number of results
    #[arg(short = 'k', long)]
    k2: Option<usize>,

    /// Table codes a candidate must share with the query
    #[arg(long)]
    minimum_should_match: Option<usize>,

    /// Rescoring mode (cosine, none)
    #[arg(long)]
    rescore: Option<RescoreMode>,

    /// Result order (desc, asc)
    #[arg(long)]
    order: Option<SortOrder>,

    /// Store filter as JSON, e.g. '{"term": {"color": "red"}}'
    #[arg(long)]
    filter: Option<String>,

    /// Keep vectors and hashes in the returned documents
    #[arg(long)]
    debug: bool,
}

impl ParamArgs {
    fn into_params(self, defaults: SearchParams) -> Result<SearchParams> {
        let filter = match self.filter {
            Some(text) => Some(serde_json::from_str(&text)?),
            None => None,
        };
        Ok(SearchParams {
            k1: self.k1.unwrap_or(defaults.k1),
            k2: self.k2.unwrap_or(defaults.k2),
            minimum_should_match: self
                .minimum_should_match
                .unwrap_or(defaults.minimum_should_match),
            rescore: self.rescore.unwrap_or(defaults.rescore),
            order: self.order.unwrap_or(defaults.order),
            filter,
            debug: self.debug,
        })
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    if let Err(e) = run(cli) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    let store = Arc::new(open_store(&cli.store)?);
    let aknn = Aknn::new(store.clone(), config)?;

    match cli.command {
        Commands::Create {
            model,
            tables,
            bits,
            dimensions,
            seed,
            sample,
            description,
        } => {
            let basis = match sample {
                Some(path) => ModelBasis::Sample {
                    vectors: serde_json::from_reader(BufReader::new(File::open(path)?))?,
                },
                None => ModelBasis::Random {
                    nb_dimensions: dimensions,
                    seed,
                },
            };
            let outcome = aknn.create_model(CreateModelRequest {
                location: model.clone(),
                nb_tables: tables,
                nb_bits_per_table: bits,
                description,
                basis,
            })?;
            match outcome {
                CreateOutcome::Created => println!("Created model {}", model),
                CreateOutcome::AlreadyExists => println!("Model {} already exists", model),
            }
            store.save_snapshot(&cli.store)
        }

        Commands::Index {
            model,
            index,
            doc_type,
            input,
            batch_size,
        } => {
            index_file(&aknn, model, index, doc_type, &input, batch_size)?;
            store.save_snapshot(&cli.store)
        }

        Commands::Search {
            model,
            index,
            doc_type,
            vector,
            params,
        } => {
            let response = aknn.search(SearchRequest {
                model,
                index,
                doc_type,
                vector,
                params: params.into_params(aknn.default_params())?,
            })?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }

        Commands::SearchDoc { doc, params } => {
            let response = aknn.search_by_id(DocSearchRequest {
                location: doc,
                params: params.into_params(aknn.default_params())?,
            })?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }

        Commands::Info { model } => show_info(&store, &cli.store, model),
    }
}

fn open_store(path: &Path) -> Result<MemoryStore> {
    if path.exists() {
        info!("Loading store snapshot {}", path.display());
        MemoryStore::load_snapshot(path)
    } else {
        info!("Store snapshot {} not found, starting empty", path.display());
        Ok(MemoryStore::new())
    }
}

fn index_file(
    aknn: &Aknn,
    model: ModelKey,
    index: String,
    doc_type: String,
    input: &Path,
    batch_size: usize,
) -> Result<()> {
    if batch_size == 0 {
        return Err(AknnError::Validation("batch size must be at least 1".into()));
    }
    let start_time = Instant::now();

    let reader = BufReader::new(File::open(input)?);
    let mut docs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: IndexDocument = serde_json::from_str(&line)?;
        docs.push(doc);
    }

    let bar_style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) ETA: {eta}")
        .map_err(|e| AknnError::Config(e.to_string()))?
        .progress_chars("█▓▒░  ");
    let pb = ProgressBar::new(docs.len() as u64);
    pb.set_style(bar_style);

    let total = docs.len();
    let mut took_ms = 0;
    for batch in docs.chunks(batch_size) {
        let response = aknn.index(IndexRequest {
            model: model.clone(),
            index: index.clone(),
            doc_type: doc_type.clone(),
            docs: batch.to_vec(),
        })?;
        took_ms += response.took_ms;
        pb.inc(response.size as u64);
    }
    pb.finish_and_clear();

    println!(
        "✓ Indexed {} documents into {}/{} in {} ({} ms in bulk requests)",
        total,
        index,
        doc_type,
        HumanDuration(start_time.elapsed()),
        took_ms
    );
    Ok(())
}

fn show_info(store: &Arc<MemoryStore>, path: &Path, model: Option<ModelKey>) -> Result<()> {
    match model {
        Some(key) => {
            let model = StoreModelLoader::new(store.clone()).load(&key)?;
            println!("Model: {}", key);
            println!("  Tables: {}", model.nb_tables());
            println!("  Bits per table: {}", model.nb_bits_per_table());
            match model.nb_dimensions() {
                Some(dims) => println!("  Dimensions: {}", dims),
                None => println!("  Dimensions: not fixed yet"),
            }
            println!("  Has bases: {}", model.has_bases());
            println!("  Seed: {}", model.bases_seed());
            println!("  Estimated size: {} bytes", model.estimate_bytes_usage());
            if !model.description().is_empty() {
                println!("  Description: {}", model.description());
            }
        }
        None => {
            println!("Store: {:?}", path);
            for (index, doc_type, count) in store.collections() {
                println!("  {}/{}: {} documents", index, doc_type, count);
            }
        }
    }
    Ok(())
}
