use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use classfile_decompiler::{
    decompile_named, decompile_to_string, ClassFile, DecompileEngine, DecompilerConfig, DirectoryLoader, JarLoader,
};

/// Decompile JVM class files back to Java source.
#[derive(Parser, Debug)]
#[command(name = "jdecompile", version)]
struct Cli {
    /// A `.class` file, a JAR, or a classpath directory.
    #[arg(value_name = "PATH")]
    path: PathBuf,
    /// Class to decompile from a JAR or directory, e.g. `com/example/Main`
    /// or `com.example.Main`. Every top-level class of a JAR when omitted.
    #[arg(long, value_name = "NAME")]
    class: Option<String>,
    /// JSON file with decompiler options.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long)]
    line_numbers: bool,
    #[arg(long)]
    realign: bool,
    #[arg(long)]
    escape_unicode: bool,
    #[arg(long)]
    omit_this: bool,
    #[arg(long)]
    default_constructor: bool,
    #[arg(long)]
    no_metadata: bool,
    /// Skip control flow recovery.
    #[arg(long)]
    linear: bool,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .parse_default_env()
        .try_init();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    if !cli.path.exists() {
        bail!("input not found: {}", cli.path.display());
    }
    let config = build_config(&cli)?;
    let mut writer = output_writer(cli.output.as_deref())?;
    let class = cli.class.as_deref().map(|c| c.replace('.', "/"));

    if cli.path.is_dir() {
        let Some(class) = class else {
            bail!("--class is required when decompiling from a directory");
        };
        let loader = DirectoryLoader::new(&cli.path);
        let source = decompile_named(&class, &loader, &config)
            .with_context(|| format!("failed to load {class} from {}", cli.path.display()))?;
        writer.write_all(source.as_bytes())?;
    } else if cli.path.extension().map_or(false, |e| e.eq_ignore_ascii_case("jar")) {
        let loader = JarLoader::open(&cli.path).with_context(|| format!("failed to read {}", cli.path.display()))?;
        let names: Vec<String> = match class {
            Some(class) => vec![class],
            None => loader
                .class_names()
                .filter(|n| is_top_level(n))
                .map(str::to_string)
                .collect(),
        };
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                writer.write_all(b"\n")?;
            }
            let source = decompile_named(name, &loader, &config)
                .with_context(|| format!("failed to load {name} from {}", cli.path.display()))?;
            writer.write_all(source.as_bytes())?;
        }
    } else {
        let bytes = std::fs::read(&cli.path).with_context(|| format!("failed to read {}", cli.path.display()))?;
        let loader = DirectoryLoader::new(classpath_root(&cli.path, &bytes));
        let location = cli.path.display().to_string();
        let source = decompile_to_string(&bytes, &loader, &config, Some(&location))
            .with_context(|| format!("failed to decompile {location}"))?;
        writer.write_all(source.as_bytes())?;
    }
    writer.flush().context("failed to write output")?;
    Ok(())
}

fn build_config(cli: &Cli) -> Result<DecompilerConfig> {
    let mut config = match &cli.config {
        Some(path) => DecompilerConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => DecompilerConfig::default(),
    };
    config.show_line_numbers |= cli.line_numbers;
    config.realign_line_numbers |= cli.realign;
    config.escape_unicode_characters |= cli.escape_unicode;
    config.omit_this_prefix |= cli.omit_this;
    config.write_default_constructor |= cli.default_constructor;
    if cli.no_metadata {
        config.write_metadata = false;
    }
    if cli.linear {
        config.decompile_engine = DecompileEngine::Linear;
    }
    Ok(config)
}

/// Member classes are decompiled as part of their outer class.
fn is_top_level(internal_name: &str) -> bool {
    let simple = internal_name.rsplit('/').next().unwrap_or(internal_name);
    !simple.contains('$') && simple != "module-info" && simple != "package-info"
}

/// The directory a lone class file's package hierarchy starts at, so its
/// member classes next to it can be loaded.
fn classpath_root(path: &Path, bytes: &[u8]) -> PathBuf {
    let parent = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let Ok(class) = ClassFile::parse(bytes) else {
        return parent;
    };
    let Ok(name) = class.this_class_name() else {
        return parent;
    };
    let mut root = parent.clone();
    for _ in 0..name.matches('/').count() {
        match root.parent() {
            Some(p) => root = p.to_path_buf(),
            None => return parent,
        }
    }
    root
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}
