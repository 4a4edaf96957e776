use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use phpantom_meta::annotations::{AnnotationReader, CachedReader, FileCache, Reader};
use phpantom_meta::config::Config;
use phpantom_meta::proxy::{
    AutoGenerate, ProxyFileStatus, ProxyGenerator, SimpleClassMetadata, ensure_proxy_file,
    resolve_file,
};
use phpantom_meta::source::SourceIndex;
use phpantom_meta::types::ClassLikeKind;
use phpantom_meta::{Annotation, AnnotationRegistry};

#[derive(Debug, Parser)]
#[command(name = "phpantom-meta", version, about)]
struct Cli {
    /// Log more (repeat for trace output).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Configuration file (defaults to .phpantom-meta.toml in the working
    /// directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the annotations of indexed classes and their members.
    Annotations {
        /// PHP files or directories to index.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Only this class.
        #[arg(long)]
        class: Option<String>,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Write proxy classes for indexed classes.
    GenerateProxies {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        proxy_dir: Option<PathBuf>,
        #[arg(long)]
        namespace: Option<String>,
        /// Identifier field (repeatable, defaults to `id`).
        #[arg(long = "id")]
        identifiers: Vec<String>,
        /// Only these classes (repeatable).
        #[arg(long = "class")]
        classes: Vec<String>,
        /// When to (re)write proxy files (defaults to the configured mode).
        #[arg(long, value_enum)]
        auto_generate: Option<AutoGenerate>,
    },
    /// Print the file a proxy class is loaded from.
    Resolve {
        proxy_class: String,
        #[arg(long)]
        proxy_dir: Option<PathBuf>,
        #[arg(long)]
        namespace: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{}", message);
            eprintln!("error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config, String> {
    let config = match path {
        Some(path) => Config::load(path),
        None => {
            let cwd = std::env::current_dir().map_err(|e| e.to_string())?;
            Config::discover(&cwd)
        }
    };
    config.map_err(|e| e.to_string())
}

fn run(cli: Cli) -> Result<(), String> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Annotations { paths, class, json } => {
            let index = build_index(&paths);
            print_annotations(&config, &index, class.as_deref(), json)
        }
        Command::GenerateProxies {
            paths,
            proxy_dir,
            namespace,
            identifiers,
            classes,
            auto_generate,
        } => {
            let index = Arc::new(build_index(&paths));
            let directory = proxy_dir.unwrap_or_else(|| config.proxy.directory.clone());
            let namespace = namespace.unwrap_or_else(|| config.proxy.namespace.clone());
            let identifiers = if identifiers.is_empty() {
                vec!["id".to_string()]
            } else {
                identifiers
            };
            let mode = auto_generate.unwrap_or(config.proxy.auto_generate);
            generate_proxies(index, directory, namespace, mode, &identifiers, &classes)
        }
        Command::Resolve {
            proxy_class,
            proxy_dir,
            namespace,
        } => {
            let directory = proxy_dir.unwrap_or(config.proxy.directory);
            let namespace = namespace.unwrap_or(config.proxy.namespace);
            let file = resolve_file(&directory, &namespace, &proxy_class).map_err(|e| e.to_string())?;
            println!("{}", file.display());
            Ok(())
        }
    }
}

fn build_index(paths: &[PathBuf]) -> SourceIndex {
    let mut index = SourceIndex::new();
    for path in paths {
        if path.is_dir() {
            index.add_directory(path);
        } else if let Err(e) = index.add_file(path) {
            warn!("skipping {}: {}", path.display(), e);
        }
    }
    info!("indexed {} classes", index.len());
    index
}

fn build_registry(index: &SourceIndex) -> AnnotationRegistry {
    let mut registry = AnnotationRegistry::new();
    for class in index.classes() {
        if let Some(reflected) = index.reflect(class.name()) {
            registry.register_reflection(&reflected);
        }
    }
    registry
}

fn print_annotations(
    config: &Config,
    index: &SourceIndex,
    only: Option<&str>,
    json: bool,
) -> Result<(), String> {
    let registry = Arc::new(build_registry(index));
    let reader = AnnotationReader::new(registry, config.reader_config());
    let reader: Box<dyn Reader> = if config.cache.enabled {
        let directory = config.cache_directory().map_err(|e| e.to_string())?;
        let cache = FileCache::new(directory).map_err(|e| e.to_string())?;
        Box::new(CachedReader::new(reader, cache, config.cache.debug))
    } else {
        Box::new(reader)
    };

    let names: Vec<String> = match only {
        Some(name) if index.contains(name) => vec![name.trim_start_matches('\\').to_string()],
        Some(name) => return Err(format!("class {} was not found", name)),
        None => index.classes().iter().map(|c| c.name().to_string()).collect(),
    };

    let mut output = serde_json::Map::new();
    for name in names {
        let Some(class) = index.reflect(&name) else {
            continue;
        };
        let class_annotations = reader.class_annotations(&class).map_err(|e| e.to_string())?;

        let mut methods = serde_json::Map::new();
        for method in &class.methods {
            let found = reader.method_annotations(method).map_err(|e| e.to_string())?;
            if !found.is_empty() {
                methods.insert(method.name.clone(), annotations_json(&found));
            }
        }
        let mut properties = serde_json::Map::new();
        for property in &class.properties {
            let found = reader.property_annotations(property).map_err(|e| e.to_string())?;
            if !found.is_empty() {
                properties.insert(property.name.clone(), annotations_json(&found));
            }
        }

        if class_annotations.is_empty() && methods.is_empty() && properties.is_empty() {
            continue;
        }

        if json {
            output.insert(
                name,
                serde_json::json!({
                    "class": annotations_json(&class_annotations),
                    "methods": methods,
                    "properties": properties,
                }),
            );
        } else {
            println!("{}", name);
            for annotation in &class_annotations {
                println!("  {}", annotation.to_json());
            }
            for (method, found) in &methods {
                println!("  {}(): {}", method, found);
            }
            for (property, found) in &properties {
                println!("  ${}: {}", property, found);
            }
        }
    }

    if json {
        let rendered = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
        println!("{}", rendered);
    }
    Ok(())
}

fn annotations_json(annotations: &[Annotation]) -> serde_json::Value {
    serde_json::Value::Array(annotations.iter().map(Annotation::to_json).collect())
}

fn generate_proxies(
    index: Arc<SourceIndex>,
    directory: PathBuf,
    namespace: String,
    mode: AutoGenerate,
    identifiers: &[String],
    only: &[String],
) -> Result<(), String> {
    let generator = ProxyGenerator::new(directory, namespace)
        .map_err(|e| e.to_string())?
        .with_class_lookup(index.clone());

    let names: Vec<String> = if only.is_empty() {
        index
            .classes()
            .iter()
            .filter(|c| c.kind == ClassLikeKind::Class && !c.is_abstract && !c.is_final)
            .map(|c| c.name().to_string())
            .collect()
    } else {
        only.iter().map(|n| n.trim_start_matches('\\').to_string()).collect()
    };

    for name in names {
        let class = index
            .reflect(&name)
            .ok_or_else(|| format!("class {} was not found", name))?;
        let metadata = SimpleClassMetadata::from_reflection(class, identifiers);
        let status = ensure_proxy_file(&generator, mode, &metadata).map_err(|e| e.to_string())?;
        let proxy = generator.proxy_class_name(&name);
        let file = generator.proxy_file_name(&name);
        match status {
            ProxyFileStatus::Written => println!("{} -> {}", proxy, file.display()),
            ProxyFileStatus::Kept => println!("{} (kept {})", proxy, file.display()),
            ProxyFileStatus::InMemory => println!("{} (not written)", proxy),
        }
    }
    Ok(())
}
