use anyhow::Result;
use clap::{Parser, Subcommand};
use complaint_rag::commands::{
    build_index, compare_products, configure, list_products, query_index, show_status,
};
use complaint_rag::config::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "complaint-rag")]
#[command(about = "Semantic retrieval over customer complaint narratives")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the vector store (default: ~/.complaint-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed and index a complaint file
    Build {
        /// JSON array or JSON-lines file of complaint records
        #[arg(long)]
        data: PathBuf,
        /// Rebuild even if a compatible index already exists
        #[arg(long)]
        force: bool,
    },
    /// Retrieve the complaints most relevant to a question
    Query {
        question: String,
        /// Only return complaints about this product
        #[arg(long)]
        product: Option<String>,
        /// Number of results
        #[arg(short, long)]
        k: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Retrieve complaints for each of several products
    Compare {
        question: String,
        /// Product to compare; repeat for each product
        #[arg(long = "product", required = true)]
        products: Vec<String>,
        /// Number of results per product
        #[arg(short, long)]
        k: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the products present in the index
    Products,
    /// Show the state of the persisted index
    Status,
    /// Create, update or show the configuration
    Config {
        /// Show current configuration without writing anything
        #[arg(long, conflicts_with = "set")]
        show: bool,
        /// Change a setting, e.g. `--set retrieval.default_top_k=8`; repeatable
        #[arg(long, value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => Config::default_base_dir()?,
    };
    let config = Config::load(&config_dir)?;

    match cli.command {
        Commands::Build { data, force } => {
            build_index(&config, &data, force).await?;
        }
        Commands::Query {
            question,
            product,
            k,
            json,
        } => {
            query_index(&config, &question, product.as_deref(), k, json).await?;
        }
        Commands::Compare {
            question,
            products,
            k,
            json,
        } => {
            compare_products(&config, &question, &products, k, json).await?;
        }
        Commands::Products => {
            list_products(&config).await?;
        }
        Commands::Status => {
            show_status(&config)?;
        }
        Commands::Config { show, set } => {
            configure(&config, show, &set)?;
        }
    }

    Ok(())
}
