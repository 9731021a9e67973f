use clap::{Parser, Subcommand};
use nearstore_core::{config, Catalog, CatalogEntry, Error, FilterClause, Result};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nearstore", about = "Inspect and query a nearstore storage root")]
struct Args {
    /// Storage root holding saved indices and collections
    #[arg(long, env = config::DATA_DIR_ENV, default_value = config::DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List saved indices and collections
    List,
    /// Print the schema of an index or collection
    Inspect { name: String },
    /// Nearest-neighbor query; repeat --vector for a batch
    Query {
        name: String,
        /// Comma-separated components, e.g. "0.1,0.2,0.3"
        #[arg(long = "vector", required = true)]
        vectors: Vec<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = config::DEFAULT_EF_SEARCH)]
        ef_search: usize,
        #[arg(long, default_value_t = 1)]
        threads: usize,
        /// Metadata filter as JSON (collections only)
        #[arg(long = "where")]
        filter: Option<String>,
    },
    /// List collection documents whose metadata matches a filter
    Filter {
        name: String,
        /// Metadata filter as JSON, e.g. '{"lang": "en"}'
        #[arg(long = "where", default_value = "{}")]
        filter: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete an index or collection
    Delete {
        name: String,
        /// Keep the saved directory on disk
        #[arg(long, default_value_t = false)]
        keep_files: bool,
    },
    /// Delete every index and collection under the storage root
    Reset {
        /// Required confirmation
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nearstore_core=info,nearstore=info")),
        )
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(kind = e.kind(), error = %e, "command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<Value> {
    if args.data_dir.exists() && !args.data_dir.is_dir() {
        return Err(Error::Configuration(format!(
            "data_dir {:?} exists but is not a directory",
            args.data_dir
        )));
    }
    let catalog = Catalog::open(&args.data_dir)?;

    match &args.command {
        Command::List => Ok(json!({
            "root": catalog.root().display().to_string(),
            "indices": catalog.list_indices(),
            "collections": catalog.list_collections(),
        })),
        Command::Inspect { name } => {
            let entry = lookup(&catalog, name)?;
            serde_json::to_value(entry.schema()).map_err(|e| Error::Io(std::io::Error::other(e)))
        }
        Command::Query {
            name,
            vectors,
            limit,
            ef_search,
            threads,
            filter,
        } => {
            let queries = vectors
                .iter()
                .map(|v| parse_vector(v))
                .collect::<Result<Vec<_>>>()?;
            match lookup(&catalog, name)? {
                CatalogEntry::Index(index) => {
                    if filter.is_some() {
                        return Err(Error::Validation(
                            "--where applies to collections only".to_string(),
                        ));
                    }
                    let results = index.batch_query(&queries, *limit, *ef_search, *threads)?;
                    Ok(json!({ "results": results }))
                }
                CatalogEntry::Collection(collection) => {
                    let results = match filter {
                        Some(raw) => collection.batch_query_filtered(
                            &queries,
                            &parse_filter(raw)?,
                            *limit,
                            *ef_search,
                            *threads,
                        )?,
                        None => collection.batch_query(&queries, *limit, *ef_search, *threads)?,
                    };
                    let rendered: Vec<Vec<Value>> = results
                        .iter()
                        .map(|hits| hits.iter().map(|h| h.to_json()).collect())
                        .collect();
                    Ok(json!({ "results": rendered }))
                }
            }
        }
        Command::Filter {
            name,
            filter,
            limit,
        } => {
            let collection = catalog.get_collection(name)?;
            let docs = collection.filter_query(&parse_filter(filter)?, *limit);
            let rendered: Vec<Value> = docs.iter().map(|d| d.to_json()).collect();
            Ok(json!({ "documents": rendered }))
        }
        Command::Delete { name, keep_files } => {
            match lookup(&catalog, name)? {
                CatalogEntry::Index(_) => catalog.delete_index(name, !keep_files)?,
                CatalogEntry::Collection(_) => catalog.delete_collection(name, !keep_files)?,
            }
            Ok(json!({ "deleted": name }))
        }
        Command::Reset { yes } => {
            if !yes {
                return Err(Error::Validation(
                    "reset deletes every saved handle; pass --yes to confirm".to_string(),
                ));
            }
            let removed = catalog.reset()?;
            Ok(json!({ "removed": removed }))
        }
    }
}

fn lookup(catalog: &Catalog, name: &str) -> Result<CatalogEntry> {
    catalog
        .get(name)
        .ok_or_else(|| Error::NotFound(format!("no index or collection named '{name}'")))
}

fn parse_vector(raw: &str) -> Result<Vec<f32>> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| Error::Validation(format!("bad vector component '{part}': {e}")))
        })
        .collect()
}

fn parse_filter(raw: &str) -> Result<FilterClause> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| Error::Validation(format!("--where is not valid JSON: {e}")))?;
    FilterClause::from_json(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearstore_core::{Document, IndexParams};
    use tempfile::TempDir;

    fn args(root: &TempDir, command: Command) -> Args {
        Args {
            data_dir: root.path().to_path_buf(),
            command,
        }
    }

    fn seed(root: &TempDir) {
        let catalog = Catalog::open(root.path()).unwrap();
        let coll = catalog
            .create_collection("coll", IndexParams::default(), None)
            .unwrap();
        coll.insert(vec![
            Document::new(1, "first", vec![0.1, 0.2, 0.3]),
            Document::new(2, "second", vec![0.4, 0.5, 0.6]),
        ])
        .unwrap();
        catalog.save_collection("coll").unwrap();
    }

    #[test]
    fn test_parse_vector() {
        assert_eq!(parse_vector("0.1, 0.2,3").unwrap(), vec![0.1, 0.2, 3.0]);
        assert!(matches!(parse_vector("1,,2"), Err(Error::Validation(_))));
    }

    #[test]
    fn test_list_and_query_saved_collection() {
        let root = TempDir::new().unwrap();
        seed(&root);

        let listed = run(&args(&root, Command::List)).unwrap();
        assert_eq!(listed["collections"], json!(["coll"]));

        let out = run(&args(
            &root,
            Command::Query {
                name: "coll".into(),
                vectors: vec!["0.1,0.2,0.3".into()],
                limit: 2,
                ef_search: 10,
                threads: 1,
                filter: None,
            },
        ))
        .unwrap();
        assert_eq!(out["results"][0][0]["id"], json!(1));
        assert_eq!(out["results"][0][0]["text"], json!("first"));
    }

    #[test]
    fn test_reset_requires_confirmation() {
        let root = TempDir::new().unwrap();
        seed(&root);
        assert!(run(&args(&root, Command::Reset { yes: false })).is_err());
        let out = run(&args(&root, Command::Reset { yes: true })).unwrap();
        assert_eq!(out["removed"], json!(1));
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let root = TempDir::new().unwrap();
        let err = run(&args(&root, Command::Inspect { name: "nope".into() })).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
