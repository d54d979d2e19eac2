use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tsincr_diagnostic::render::render_report;
use tsincr_diagnostic::StructuredError;

use tsincr_driver::{compile, CompileOutput, CompileRequest, LoaderOptions, ModuleResolver, Registry};

#[derive(Parser)]
#[command(
    name = "tsincr",
    version,
    about = "Incremental TypeScript compilation engine",
    long_about = "Compiles TypeScript files one build step at a time, tracking\nthe files they depend on and reporting diagnostics per file."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile files and write their JavaScript
    Build {
        /// Input TypeScript files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print the JavaScript instead of writing it
        #[arg(long)]
        stdout: bool,

        #[command(flatten)]
        loader: LoaderArgs,
    },

    /// Report diagnostics without writing output
    Check {
        /// Input TypeScript files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print errors as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        loader: LoaderArgs,
    },

    /// Show the files a file depends on
    Graph {
        /// Input TypeScript file
        file: PathBuf,

        #[command(flatten)]
        loader: LoaderArgs,
    },
}

#[derive(Args, Clone)]
struct LoaderArgs {
    /// Loader options as JSON, e.g. '{"ignoreDiagnostics":[2451]}'
    #[arg(long, value_name = "JSON")]
    options: Option<String>,

    /// Instance name
    #[arg(long)]
    instance: Option<String>,

    /// Config file name or path
    #[arg(long, value_name = "FILE")]
    config: Option<String>,

    /// ECMAScript target (es5, es2015, ..., esnext)
    #[arg(long)]
    target: Option<String>,

    /// Module kind (commonjs, es2015, esnext, ...)
    #[arg(long)]
    module: Option<String>,

    /// Emit source maps
    #[arg(long)]
    source_map: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

impl LoaderArgs {
    fn loader_options(&self) -> Result<LoaderOptions, String> {
        let mut options = match &self.options {
            Some(json) => serde_json::from_str::<LoaderOptions>(json)
                .map_err(|e| format!("invalid --options: {e}"))?,
            None => LoaderOptions::default(),
        };
        if let Some(instance) = &self.instance {
            options.instance = instance.clone();
        }
        if let Some(config) = &self.config {
            options.config_file_name = config.clone();
        }
        if self.target.is_some() {
            options.target = self.target.clone();
        }
        if self.module.is_some() {
            options.module = self.module.clone();
        }
        if self.source_map {
            options.source_map = Some(true);
        }
        if self.no_color {
            options.colors = false;
        }
        Ok(options)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let context = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error reading current directory: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Build { files, stdout, loader } => build_command(&context, files, stdout, &loader).await,
        Commands::Check { files, json, loader } => check_command(&context, files, json, &loader).await,
        Commands::Graph { file, loader } => graph_command(&context, file, &loader).await,
    }
}

/// Compile every file in one instance, stopping at the first engine error.
async fn compile_all(
    registry: &Registry,
    context: &Path,
    files: &[PathBuf],
    options: &LoaderOptions,
) -> Result<Vec<(PathBuf, CompileOutput)>, String> {
    let resolver = ModuleResolver::new(context);
    let mut outputs = Vec::with_capacity(files.len());
    for file in files {
        let path = if file.is_absolute() { file.clone() } else { context.join(file) };
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("Error reading {}: {}", path.display(), e))?;
        let request = CompileRequest {
            request: Some(file.to_string_lossy().into_owned()),
            ..CompileRequest::new(path.clone(), text, context)
        };
        let output = compile(registry, options, &resolver, &request).await.map_err(|e| {
            let structured = e.to_structured_error(context);
            render_report(&structured, None, options.colors)
        })?;
        outputs.push((path, output));
    }
    Ok(outputs)
}

async fn build_command(context: &Path, files: Vec<PathBuf>, stdout: bool, loader: &LoaderArgs) -> ExitCode {
    let options = match loader.loader_options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let registry = Registry::new();
    let outputs = match compile_all(&registry, context, &files, &options).await {
        Ok(outputs) => outputs,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut failed = false;
    for (path, output) in &outputs {
        failed |= report_errors(&output.errors, &options).await;
        for warning in &output.warnings {
            eprintln!("warning: {}", warning);
        }
        if stdout {
            print!("{}", output.output);
            continue;
        }
        if let Err(e) = write_output(&registry, &options, path, output).await {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn write_output(
    registry: &Registry,
    options: &LoaderOptions,
    path: &Path,
    output: &CompileOutput,
) -> Result<(), String> {
    let Some(shared) = registry.get(&options.instance) else {
        return Ok(());
    };
    let destination = {
        let instance = shared.lock().await;
        instance.compiler_options().output_path(path, instance.current_dir())
    };
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("Error creating {}: {}", parent.display(), e))?;
    }

    let mut text = output.output.clone();
    if let Some(map) = &output.source_map {
        let json = map.to_json().map_err(|e| format!("Error serializing source map: {}", e))?;
        let mut map_path = destination.clone().into_os_string();
        map_path.push(".map");
        let map_path = PathBuf::from(map_path);
        tokio::fs::write(&map_path, json)
            .await
            .map_err(|e| format!("Error writing {}: {}", map_path.display(), e))?;
        if let Some(name) = map_path.file_name() {
            text.push_str(&format!("\n//# sourceMappingURL={}", name.to_string_lossy()));
        }
    }
    tokio::fs::write(&destination, text)
        .await
        .map_err(|e| format!("Error writing {}: {}", destination.display(), e))?;
    tracing::info!(output = %destination.display(), "wrote");
    Ok(())
}

async fn check_command(context: &Path, files: Vec<PathBuf>, json: bool, loader: &LoaderArgs) -> ExitCode {
    let options = match loader.loader_options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let registry = Registry::new();
    let outputs = match compile_all(&registry, context, &files, &options).await {
        Ok(outputs) => outputs,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let errors: Vec<&StructuredError> = outputs.iter().flat_map(|(_, output)| &output.errors).collect();
    if json {
        match serde_json::to_string_pretty(&errors) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing errors: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        for (_, output) in &outputs {
            report_errors(&output.errors, &options).await;
        }
        println!("{} error(s) in {} file(s)", errors.len(), files.len());
    }

    if errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn graph_command(context: &Path, file: PathBuf, loader: &LoaderArgs) -> ExitCode {
    let options = match loader.loader_options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let registry = Registry::new();
    let outputs = match compile_all(&registry, context, std::slice::from_ref(&file), &options).await {
        Ok(outputs) => outputs,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let Some(shared) = registry.get(&options.instance) else {
        return ExitCode::FAILURE;
    };
    let instance = shared.lock().await;
    let graph = instance.graph();

    for (path, _) in &outputs {
        println!("{}", path.display());
        for edge in graph.dependencies(path) {
            println!("  {} -> {}", edge.original, edge.resolved.display());
        }
        let all = graph.transitive_dependencies(path);
        println!("\n{} file(s) reachable", all.len());
    }
    if let Some(cycle) = graph.find_cycle() {
        let names: Vec<String> = cycle.iter().map(|p| p.display().to_string()).collect();
        println!("cycle: {}", names.join(" -> "));
    }
    ExitCode::SUCCESS
}

/// Print errors with their source excerpt. Returns whether there were any.
async fn report_errors(errors: &[StructuredError], options: &LoaderOptions) -> bool {
    for error in errors {
        let source = match &error.file {
            Some(file) => tokio::fs::read_to_string(file).await.ok(),
            None => None,
        };
        eprintln!("{}", render_report(error, source.as_deref(), options.colors));
    }
    !errors.is_empty()
}
