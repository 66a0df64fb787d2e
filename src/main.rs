//! Schematron CLI - compile schemas and validate documents.

use anyhow::{bail, Context, Result};
use schematron::config::SchematronConfig;
use schematron::pipeline::select_steps;
use schematron::prelude::*;
use std::path::PathBuf;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        return;
    }

    let outcome = match args[1].as_str() {
        "compile" => parse_options(&args[2..]).and_then(|opts| compile(&opts)).map(|_| true),
        "validate" => parse_options(&args[2..]).and_then(|opts| validate(&opts)),
        "dialect" => parse_options(&args[2..]).and_then(|opts| dialect(&opts)).map(|_| true),
        "stages" => {
            init_logging(None);
            list_stages();
            Ok(true)
        }
        "help" | "--help" | "-h" => {
            print_usage(&args[0]);
            Ok(true)
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_usage(&args[0]);
            std::process::exit(2);
        }
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn print_usage(program: &str) {
    println!("Schematron v{}", schematron::VERSION);
    println!();
    println!("Usage: {} <command> [options]", program);
    println!();
    println!("Commands:");
    println!("  compile <schema>               Print the compiled validation program");
    println!("  validate <schema> <input>...   Validate documents, directories or glob patterns");
    println!("  dialect <schema>               Show the detected dialect and its stages");
    println!("  stages                         List registered stages");
    println!("  help                           Show this help message");
    println!();
    println!("Options:");
    println!("  --phase <id>        Validation phase (default: the schema's defaultPhase)");
    println!("  --param <k=v>       Compiler option, also visible to rules as $k (repeatable)");
    println!("  --config <file>     TOML configuration file");
    println!("  --json              Print validation results as JSON");
    println!();
    println!("Exit status: 0 when every document is valid, 1 otherwise, 2 on errors.");
}

/// Parsed command-line options.
#[derive(Debug, Default)]
struct Options {
    phase: Option<String>,
    params: Parameters,
    config: Option<PathBuf>,
    json: bool,
    positional: Vec<String>,
}

fn parse_options(args: &[String]) -> Result<Options> {
    let mut opts = Options::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--phase" if i + 1 < args.len() => {
                opts.phase = Some(args[i + 1].clone());
                i += 2;
            }
            "--param" if i + 1 < args.len() => {
                let (name, value) = args[i + 1]
                    .split_once('=')
                    .with_context(|| format!("Expected name=value, got '{}'", args[i + 1]))?;
                opts.params.insert(name, Value::parse_lenient(value));
                i += 2;
            }
            "--config" if i + 1 < args.len() => {
                opts.config = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--json" => {
                opts.json = true;
                i += 1;
            }
            flag if flag.starts_with("--") => bail!("Unknown or incomplete option: {}", flag),
            _ => {
                opts.positional.push(args[i].clone());
                i += 1;
            }
        }
    }
    Ok(opts)
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(config: Option<&SchematronConfig>) {
    let level = config
        .and_then(|c| c.logging.level.clone())
        .unwrap_or_else(|| "warn".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(opts: &Options) -> Result<Option<SchematronConfig>> {
    opts.config
        .as_ref()
        .map(|path| SchematronConfig::load(path).with_context(|| format!("Loading {}", path.display())))
        .transpose()
}

fn build(opts: &Options, config: Option<&SchematronConfig>) -> Result<Schematron> {
    let Some(schema) = opts.positional.first() else {
        bail!("Please specify a schema");
    };

    let mut builder = Schematron::builder().schema(Source::from_path(schema));
    if let Some(config) = config {
        builder = config.apply(builder);
    }
    builder = builder.options(&opts.params);
    if let Some(phase) = &opts.phase {
        builder = builder.phase(phase.as_str());
    }
    builder.build().with_context(|| format!("Compiling {}", schema))
}

fn compile(opts: &Options) -> Result<()> {
    let config = load_config(opts)?;
    init_logging(config.as_ref());
    let compiled = build(opts, config.as_ref())?;
    println!("{}", compiled.validation_stylesheet().to_xml());
    Ok(())
}

fn validate(opts: &Options) -> Result<bool> {
    let config = load_config(opts)?;
    init_logging(config.as_ref());
    if opts.positional.len() < 2 {
        bail!("Please specify a schema and at least one document");
    }

    let compiled = build(opts, config.as_ref())?;
    let validator = compiled.create_validator()?;
    let sources = DocumentDiscovery::new().sources(&opts.positional[1..])?;
    let results = validator.validate_all(&sources, Some(&opts.params));

    let mut all_valid = true;
    let mut json = Vec::new();
    for (source, result) in sources.iter().zip(results) {
        let name = source.system_id().unwrap_or("<input>");
        match result {
            Ok(result) => {
                all_valid &= result.is_valid();
                if opts.json {
                    json.push(serde_json::to_value(&result)?);
                    continue;
                }
                println!("{}: {}", name, result.summary());
                for finding in result.validation_messages() {
                    println!("  [{:?}] {} {}", finding.kind, finding.location, finding.message);
                }
            }
            Err(e) => {
                all_valid = false;
                if opts.json {
                    json.push(serde_json::json!({ "document": name, "error": e.to_string() }));
                } else {
                    eprintln!("{}: {}", name, e);
                }
            }
        }
    }

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&json)?);
    }
    Ok(all_valid)
}

fn dialect(opts: &Options) -> Result<()> {
    init_logging(None);
    let Some(schema) = opts.positional.first() else {
        bail!("Please specify a schema");
    };
    let document = Source::from_path(schema)
        .load()
        .with_context(|| format!("Loading {}", schema))?;
    let (dialect, steps) = select_steps(&document)?;

    println!("Dialect: {:?} ({})", dialect, dialect);
    for (index, step) in steps.iter().enumerate() {
        println!("  {}. {}", index + 1, step);
    }
    Ok(())
}

fn list_stages() {
    let registry = StageRegistry::with_builtins();
    println!("Registered stages ({} total):", registry.len());
    for (id, entry) in registry.entries() {
        let state = if entry.enabled { "" } else { " (disabled)" };
        println!("  {} - {}{}", id, entry.description, state);
    }
}
