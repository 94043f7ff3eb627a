//! End-to-end compilation pipeline.
//!
//! Ties the stages together: load the config, invoke the compiler, lay out
//! the artifacts, generate the wrapper header and the toolfile. The flow is
//! strictly linear and nothing is retained across invocations.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::compile::{compile_model, AotCompiler, CommandCompiler, DEFAULT_COMPILER};
use crate::config::AotConfig;
use crate::error::Result;
use crate::toolfile::{create_toolfile, ToolVars};
use crate::wrapper::{create_wrapper, DEFAULT_INCLUDE_GUARD};

/// Options controlling a pipeline run.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Path to the AOT configuration file.
    pub config_file: PathBuf,

    /// Output directory for all produced files.
    pub output_dir: PathBuf,

    /// Tool name override; defaults to `tfaot-model-<model-name>`.
    pub tool_name: Option<String>,

    /// Tool base override; defaults to a `@TOOL_BASE@` marker, or to the
    /// output directory in dev mode.
    pub tool_base: Option<String>,

    /// Development workflow: artifacts are laid out like an installed tool
    /// (`include/<tool>/`, `lib/`) and paths resolve against `$CMSSW_BASE`.
    pub dev: bool,

    /// AOT compiler executable override.
    pub compiler: Option<PathBuf>,

    /// Additional flags passed verbatim to the compiler invocation.
    pub additional_flags: Vec<String>,
}

impl CompileOptions {
    /// Create options for a config file and output directory, with all
    /// overrides unset.
    pub fn new(config_file: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            output_dir: output_dir.into(),
            tool_name: None,
            tool_base: None,
            dev: false,
            compiler: None,
            additional_flags: Vec::new(),
        }
    }
}

/// Everything a pipeline run produced.
#[derive(Debug, Clone)]
pub struct CompilationResult {
    /// Output directory, absolute.
    pub output_dir: PathBuf,

    /// Directory containing the headers.
    pub header_dir: PathBuf,

    /// Header files relative to the output directory.
    pub header_files: Vec<PathBuf>,

    /// Generated wrapper header.
    pub wrapper_file: PathBuf,

    /// Directory containing the object files.
    pub object_dir: PathBuf,

    /// Object files relative to the output directory.
    pub object_files: Vec<PathBuf>,

    /// Generated toolfile.
    pub tool_file: PathBuf,

    /// Tool name the toolfile declares.
    pub tool_name: String,

    /// Namespace-qualified model class exposed by the wrapper.
    pub model_class: String,

    /// Batch sizes the model was compiled for.
    pub batch_sizes: Vec<usize>,
}

/// Run the full pipeline with the compiler resolved from options and config.
///
/// The compiler executable is taken from the options, then from the config,
/// then falls back to the default; flags from both sources are combined.
pub fn tfaot_compile(options: &CompileOptions) -> Result<CompilationResult> {
    let config = AotConfig::load(&options.config_file)?;

    let program = options
        .compiler
        .clone()
        .or_else(|| config.compilation.compiler.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_COMPILER));
    let mut flags = config.compilation.flags.clone();
    flags.extend(options.additional_flags.iter().cloned());
    let compiler = CommandCompiler::new(program).with_flags(flags);

    tfaot_compile_with(options, &config, &compiler)
}

/// Run the full pipeline with an explicit compiler instance.
pub fn tfaot_compile_with(
    options: &CompileOptions,
    config: &AotConfig,
    compiler: &dyn AotCompiler,
) -> Result<CompilationResult> {
    let output_dir = absolutize(&options.output_dir)?;
    fs::create_dir_all(&output_dir)?;

    let tool_name = options.tool_name.clone().unwrap_or_else(|| {
        format!("tfaot-model-{}", config.model.name.replace('_', "-"))
    });
    let tool_base = options.tool_base.clone().unwrap_or_else(|| {
        if options.dev {
            cmssw_rel_path(&output_dir)
        } else {
            "@TOOL_BASE@".to_string()
        }
    });

    let artifacts = compile_model(config, &output_dir, compiler)?;
    info!(
        headers = artifacts.header_files.len(),
        objects = artifacts.object_files.len(),
        "collected compilation artifacts"
    );

    // in dev mode the output directory mimics an installed tool
    let mut header_dir = output_dir.clone();
    let mut object_dir = output_dir.clone();
    let mut header_files = artifacts.header_files;
    let mut object_files = artifacts.object_files;
    if options.dev {
        header_dir = output_dir.join("include").join(&tool_name);
        recreate_dir(&header_dir)?;
        for name in &header_files {
            fs::rename(output_dir.join(name), header_dir.join(name))?;
        }
        header_files = header_files
            .iter()
            .map(|name| Path::new("include").join(&tool_name).join(name))
            .collect();

        object_dir = output_dir.join("lib");
        recreate_dir(&object_dir)?;
        for name in &object_files {
            fs::rename(output_dir.join(name), object_dir.join(name))?;
        }
        object_files = object_files
            .iter()
            .map(|name| Path::new("lib").join(name))
            .collect();
    }

    let header_paths: Vec<PathBuf> = header_files
        .iter()
        .map(|name| output_dir.join(name))
        .collect();
    let wrapper_file = create_wrapper(
        &header_dir.join(format!("{}.h", config.model.name)),
        &header_paths,
        &config.model.saved_model,
        DEFAULT_INCLUDE_GUARD,
    )?;
    info!(wrapper = %wrapper_file.display(), "generated wrapper header");

    link_model_header(&wrapper_file, &header_dir)?;

    let mut tool_vars = ToolVars::new(tool_name.as_str())?;
    tool_vars.tool_version = config.model.version.clone();
    tool_vars.tool_base = tool_base;
    tool_vars.ld_flags = object_files
        .iter()
        .filter_map(|name| name.file_name())
        .filter_map(|name| name.to_str())
        .map(str::to_string)
        .collect();
    let tool_file = create_toolfile(&output_dir.join(format!("{}.xml", tool_name)), &tool_vars)?;
    info!(toolfile = %tool_file.display(), "generated toolfile");

    Ok(CompilationResult {
        output_dir,
        header_dir,
        header_files,
        wrapper_file,
        object_dir,
        object_files,
        tool_file,
        tool_name,
        model_class: format!("{}::{}", config.compilation.namespace, config.model.name),
        batch_sizes: config.compilation.batch_sizes.clone(),
    })
}

/// Rewrite a path relative to `$CMSSW_BASE` when it lies inside it.
pub fn cmssw_rel_path(path: &Path) -> String {
    if let Ok(base) = env::var("CMSSW_BASE") {
        if !base.is_empty() {
            if let Ok(rel) = path.strip_prefix(&base) {
                return format!("$CMSSW_BASE/{}", rel.display());
            }
        }
    }
    path.display().to_string()
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

fn recreate_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

/// Place a stable `model.h` entry point next to the wrapper header.
fn link_model_header(wrapper_file: &Path, header_dir: &Path) -> Result<()> {
    let link = header_dir.join("model.h");
    if fs::symlink_metadata(&link).is_ok() {
        fs::remove_file(&link)?;
    }

    let target = wrapper_file
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| wrapper_file.to_path_buf());

    #[cfg(unix)]
    std::os::unix::fs::symlink(target, &link)?;
    #[cfg(not(unix))]
    fs::copy(header_dir.join(target), &link).map(|_| ())?;

    Ok(())
}
