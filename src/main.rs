use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use heapstore::common::{DEFAULT_PAGE_SIZE, DEFAULT_POOL_SIZE};
use heapstore::config::StorageConfig;
use heapstore::database::Database;
use heapstore::executors::Executor;
use heapstore::storage::heap::encoder::encode_rows;
use heapstore::tuple::schema::{Schema, TypeId};
use log::info;

#[derive(Parser)]
#[command(about = "Creates and scans heap files")]
struct Cli {
    #[arg(long, global = true, help = "Log every page fetch and eviction")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Converts comma separated text rows into a heap file
    Convert {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,

        #[arg(long, value_delimiter = ',', help = "Field types, e.g. int,int,string")]
        types: Vec<TypeId>,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },
    /// Prints every tuple of a table listed in a catalog file
    Scan {
        #[arg(long, help = "Catalog file with one `name (field type [pk], ...)` per line")]
        catalog: PathBuf,

        #[arg(long)]
        table: String,

        #[arg(long, default_value_t = DEFAULT_POOL_SIZE, help = "Size of buffer pool")]
        pool_size: usize,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },
}

fn convert(input: PathBuf, output: PathBuf, types: Vec<TypeId>, page_size: usize) -> Result<()> {
    let reader = BufReader::new(
        File::open(&input).with_context(|| format!("Failed to open {}", input.display()))?,
    );
    let count = encode_rows(reader, &output, Schema::from_types(&types), page_size)
        .with_context(|| format!("Failed to convert {}", input.display()))?;
    println!("Wrote {count} tuples to {}", output.display());
    Ok(())
}

fn scan(catalog: PathBuf, table: &str, config: StorageConfig) -> Result<()> {
    config.validate()?;
    let db = Database::new(config);
    db.load_schema(&catalog)
        .with_context(|| format!("Failed to load catalog {}", catalog.display()))?;
    let table_id = db.catalog().table_id(table)?;

    let tx = db.begin();
    let mut scan = db.open_scan(tx, table_id)?;
    let mut writer = BufWriter::new(io::stdout().lock());

    let field_names = scan
        .schema()?
        .fields()
        .iter()
        .map(|field| field.name().unwrap_or("null").to_owned())
        .collect::<Vec<_>>();
    writeln!(writer, "{}", field_names.join("\t"))?;

    let mut count = 0;
    while scan.has_next()? {
        writeln!(writer, "{}", scan.next()?)?;
        count += 1;
    }
    writer.flush()?;
    scan.close();
    db.commit(tx)?;
    info!("Scanned {} tuples of {}", count, table);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Command::Convert {
            input,
            output,
            types,
            page_size,
        } => convert(input, output, types, page_size),
        Command::Scan {
            catalog,
            table,
            pool_size,
            page_size,
        } => {
            let config = StorageConfig::default()
                .with_pool_size(pool_size)
                .with_page_size(page_size);
            scan(catalog, &table, config)
        }
    }
}
