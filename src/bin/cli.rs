use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use serde_json::Value;

use blocksmith::codegen::statements::{lower_statements, SortSpec};
use blocksmith::codegen::Dialect;
use blocksmith::describe::describe_tree;
use blocksmith::error::BuildError;
use blocksmith::project::{build_project, check_sample, compile_project};
use blocksmith::settings::{self, ProjectConfig};
use blocksmith::logging;

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "blocksmith-cli", about = "Compile data/do/route blocks into a static server module", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root (where blocksmith.json lives)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Entry file override, relative to the root
    #[arg(long, global = true)]
    entry: Option<PathBuf>,

    /// SQL dialect override
    #[arg(long, global = true, value_enum)]
    dialect: Option<Dialect>,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the project and write the generated artifacts
    Build {
        /// Output directory override, relative to the root
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Compile without writing; optionally validate JSON samples
    Check {
        /// Schema and sample file, e.g. `User=fixtures/user.json` (repeatable)
        #[arg(long = "sample", value_name = "SCHEMA=FILE")]
        samples: Vec<String>,
    },
    /// Print a summary of the merged project
    Inspect,
    /// Print the SQL templates of one schema
    Statements {
        schema: String,
        /// Filter column for the list query (repeatable)
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// Sort for the list query, e.g. `title:desc`
        #[arg(long)]
        sort: Option<String>,
    },
    /// Print the JSON Schema of blocksmith.json
    ConfigSchema,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        process::exit(e.exit_code());
    }
}

fn load_config(cli: &Cli) -> Result<ProjectConfig, BuildError> {
    let mut config = settings::load_config(&cli.root)?;
    if let Some(entry) = &cli.entry {
        config.entry.clone_from(entry);
    }
    if let Some(dialect) = cli.dialect {
        config.dialect = dialect;
    }
    Ok(config)
}

fn run(cli: &Cli) -> Result<(), BuildError> {
    match &cli.command {
        Commands::Build { out_dir } => {
            let mut config = load_config(cli)?;
            if let Some(out_dir) = out_dir {
                config.out_dir.clone_from(out_dir);
            }
            let report = build_project(&cli.root, &config)?;
            if cli.json {
                print_json(&serde_json::to_value(&report).unwrap_or(Value::Null));
            } else {
                println!(
                    "Built {} schemas, {} actions, {} routes, {} migrations",
                    report.schemas, report.actions, report.routes, report.migrations
                );
                for path in &report.files_written {
                    println!("  {}", path.display());
                }
            }
        }
        Commands::Check { samples } => {
            let config = load_config(cli)?;
            let (tree, _) = compile_project(&cli.root, &config)?;
            for sample in samples {
                let Some((schema, file)) = sample.split_once('=') else {
                    return Err(BuildError::Sample {
                        path: PathBuf::from(sample),
                        message: "expected SCHEMA=FILE".to_string(),
                    });
                };
                let record = check_sample(&tree, schema, &cli.root.join(file))?;
                if cli.json {
                    print_json(&Value::Object(record));
                } else {
                    println!("{schema} <- {file}: ok");
                }
            }
            if !cli.json {
                println!("OK");
            }
        }
        Commands::Inspect => {
            let config = load_config(cli)?;
            let (tree, _) = compile_project(&cli.root, &config)?;
            if cli.json {
                print_json(&serde_json::to_value(&tree).unwrap_or(Value::Null));
            } else {
                println!("{}", describe_tree(&tree));
            }
        }
        Commands::Statements { schema, filters, sort } => {
            let config = load_config(cli)?;
            let (tree, _) = compile_project(&cli.root, &config)?;
            let decl = tree
                .schema(schema)
                .ok_or_else(|| BuildError::UnknownSchema(schema.clone()))?;
            let set = lower_statements(decl, config.dialect);
            let sort = sort.as_deref().map(SortSpec::parse);
            let filters: Vec<&str> = filters.iter().map(String::as_str).collect();
            let list = set.list.render(&filters, sort.as_ref())?;
            if cli.json {
                let mut value = serde_json::to_value(&set).unwrap_or(Value::Null);
                if let Value::Object(map) = &mut value {
                    map.insert("list".to_string(), Value::String(list));
                }
                print_json(&value);
            } else {
                println!("insert:      {}", set.insert);
                println!("update:      {}", set.update.as_deref().unwrap_or("(no writable columns)"));
                println!("delete:      {}", set.delete);
                println!("findByKey:   {}", set.find_by_key);
                println!("createTable: {}", set.create_table);
                println!("list:        {list}");
            }
        }
        Commands::ConfigSchema => {
            print_json(&serde_json::to_value(settings::config_schema()).unwrap_or(Value::Null));
        }
    }
    Ok(())
}

// ── Output formatting ────────────────────────────────────────────

fn print_json(value: &Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}
