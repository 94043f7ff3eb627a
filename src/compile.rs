//! Invocation of the external AOT graph compiler.
//!
//! The actual graph lowering and XLA codegen is delegated to an external
//! command line tool. It is called once per configuration with all batch
//! sizes and is expected to leave one header and one object file per batch
//! size in an `aot/` directory below the requested output path:
//!
//! ```text
//! <compiler> <saved_model> <output_dir> \
//!     --batch-sizes <csv> \
//!     --input-serving-key <key> \
//!     --aot <prefix> <class> \
//!     [additional flags]
//! ```
//!
//! The compiler sits behind the [`AotCompiler`] trait so the rest of the
//! pipeline can be exercised without a TensorFlow installation.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::config::AotConfig;
use crate::error::{Result, TfaotError};

/// Default AOT compiler executable.
pub const DEFAULT_COMPILER: &str = "cmsml_compile_tf_graph";

static HEADER_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*_bs(\d+)\.h$").expect("valid pattern"));

static OBJECT_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*_bs(\d+)\.o$").expect("valid pattern"));

/// A single compilation request passed to the compiler.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    /// Saved model directory to compile.
    pub saved_model: PathBuf,

    /// Directory the compiler writes into; artifacts are expected below
    /// `<output_dir>/aot`.
    pub output_dir: PathBuf,

    /// Batch sizes to compile, one function per entry.
    pub batch_sizes: Vec<usize>,

    /// Serving signature key to compile.
    pub serving_key: String,

    /// File name prefix pattern with a `{}` batch size placeholder.
    pub prefix: String,

    /// Namespace-qualified class name pattern with a `{}` batch size
    /// placeholder.
    pub class_name: String,
}

/// Interface to the external AOT compiler.
pub trait AotCompiler {
    /// Compile all batch sizes of a request.
    fn compile(&self, request: &CompileRequest) -> Result<()>;
}

/// Shells out to the AOT graph compiler command.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: PathBuf,
    flags: Vec<String>,
}

impl CommandCompiler {
    /// Create a compiler invoking the given executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            flags: Vec::new(),
        }
    }

    /// Append flags passed verbatim to every invocation.
    pub fn with_flags(mut self, flags: impl IntoIterator<Item = String>) -> Self {
        self.flags.extend(flags);
        self
    }

    /// The executable this compiler invokes.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for CommandCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_COMPILER)
    }
}

impl AotCompiler for CommandCompiler {
    fn compile(&self, request: &CompileRequest) -> Result<()> {
        let batch_sizes = request
            .batch_sizes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let mut command = Command::new(&self.program);
        command
            .arg(&request.saved_model)
            .arg(&request.output_dir)
            .args(["--batch-sizes", &batch_sizes])
            .args(["--input-serving-key", &request.serving_key])
            .arg("--aot")
            .arg(&request.prefix)
            .arg(&request.class_name)
            .args(&self.flags);

        debug!(program = %self.program.display(), "invoking AOT compiler");
        let output = command.output().map_err(|err| {
            TfaotError::compiler(format!(
                "failed to run {}: {}",
                self.program.display(),
                err
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TfaotError::compiler(format!(
                "{} exited with {}:\n{}",
                self.program.display(),
                output.status,
                stderr.trim_end()
            )));
        }

        Ok(())
    }
}

/// The header and object files produced by a compilation, as file names
/// relative to the output directory, sorted by batch size.
#[derive(Debug, Clone)]
pub struct CompiledArtifacts {
    /// Generated header files, one per batch size.
    pub header_files: Vec<PathBuf>,

    /// Compiled object files, one per batch size.
    pub object_files: Vec<PathBuf>,
}

/// Compile the configured model and collect its artifacts into `output_dir`.
///
/// Compilation is staged in a temporary directory; only the per-batch-size
/// header and object files are copied out. Exactly one header and one object
/// file per configured batch size must be produced.
pub fn compile_model(
    config: &AotConfig,
    output_dir: &Path,
    compiler: &dyn AotCompiler,
) -> Result<CompiledArtifacts> {
    let tmp_dir = tempfile::tempdir()?;

    // the compiled classes live in the configured namespace
    let class_name = if config.compilation.namespace.is_empty() {
        config.compilation.class_name.clone()
    } else {
        format!(
            "{}::{}",
            config.compilation.namespace, config.compilation.class_name
        )
    };

    let request = CompileRequest {
        saved_model: config.model.saved_model.clone(),
        output_dir: tmp_dir.path().to_path_buf(),
        batch_sizes: config.compilation.batch_sizes.clone(),
        serving_key: config.model.serving_key.clone(),
        prefix: format!("{}_bs{{}}", config.model.name),
        class_name,
    };

    info!(
        model = %config.model.name,
        batch_sizes = ?config.compilation.batch_sizes,
        "compiling model"
    );
    compiler.compile(&request)?;

    let aot_dir = tmp_dir.path().join("aot");
    if !aot_dir.is_dir() {
        return Err(TfaotError::compiler(format!(
            "compiler did not produce an 'aot' directory below {}",
            tmp_dir.path().display()
        )));
    }

    // copy only the per-batch-size artifacts
    fs::create_dir_all(output_dir)?;
    let mut header_files: Vec<(usize, PathBuf)> = Vec::new();
    let mut object_files: Vec<(usize, PathBuf)> = Vec::new();
    for entry in fs::read_dir(&aot_dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = match file_name.to_str() {
            Some(name) => name,
            None => continue,
        };

        if let Some(caps) = HEADER_FILE_RE.captures(name) {
            header_files.push((file_batch_size(&caps, name)?, PathBuf::from(name)));
        } else if let Some(caps) = OBJECT_FILE_RE.captures(name) {
            object_files.push((file_batch_size(&caps, name)?, PathBuf::from(name)));
        } else {
            continue;
        }

        fs::copy(entry.path(), output_dir.join(name))?;
    }
    header_files.sort();
    object_files.sort();

    let expected = config.compilation.batch_sizes.len();
    if header_files.len() != expected {
        return Err(TfaotError::compiler(format!(
            "expected {} header files, got {}",
            expected,
            header_files.len()
        )));
    }
    if object_files.len() != expected {
        return Err(TfaotError::compiler(format!(
            "expected {} object files, got {}",
            expected,
            object_files.len()
        )));
    }

    Ok(CompiledArtifacts {
        header_files: header_files.into_iter().map(|(_, name)| name).collect(),
        object_files: object_files.into_iter().map(|(_, name)| name).collect(),
    })
}

fn file_batch_size(caps: &regex::Captures<'_>, name: &str) -> Result<usize> {
    caps[1]
        .parse()
        .map_err(|_| TfaotError::compiler(format!("invalid batch size in file name {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompilationConfig, ModelConfig};
    use tempfile::TempDir;

    fn test_config(saved_model: PathBuf, batch_sizes: Vec<usize>) -> AotConfig {
        AotConfig {
            model: ModelConfig {
                name: "test".to_string(),
                version: "1.0.0".to_string(),
                saved_model,
                serving_key: "serving_default".to_string(),
            },
            compilation: CompilationConfig {
                batch_sizes,
                namespace: "tfaot_model".to_string(),
                class_name: "test_bs{}".to_string(),
                compiler: None,
                flags: Vec::new(),
            },
        }
    }

    /// Writes one header/object pair per batch size, like the real compiler.
    struct ScriptedCompiler {
        skip_objects: bool,
    }

    impl AotCompiler for ScriptedCompiler {
        fn compile(&self, request: &CompileRequest) -> Result<()> {
            let aot_dir = request.output_dir.join("aot");
            fs::create_dir_all(&aot_dir)?;
            for &batch_size in &request.batch_sizes {
                let prefix = request.prefix.replace("{}", &batch_size.to_string());
                fs::write(aot_dir.join(format!("{}.h", prefix)), "header")?;
                if !self.skip_objects {
                    fs::write(aot_dir.join(format!("{}.o", prefix)), "object")?;
                }
            }
            // unrelated files must not be collected
            fs::write(aot_dir.join("graph.pb"), "graph")?;
            Ok(())
        }
    }

    #[test]
    fn test_compile_model_collects_artifacts() {
        let dir = TempDir::new().unwrap();
        let output_dir = dir.path().join("out");
        let config = test_config(dir.path().to_path_buf(), vec![2, 1]);

        let compiler = ScriptedCompiler { skip_objects: false };
        let artifacts = compile_model(&config, &output_dir, &compiler).unwrap();

        assert_eq!(
            artifacts.header_files,
            vec![PathBuf::from("test_bs1.h"), PathBuf::from("test_bs2.h")]
        );
        assert_eq!(
            artifacts.object_files,
            vec![PathBuf::from("test_bs1.o"), PathBuf::from("test_bs2.o")]
        );
        for name in artifacts.header_files.iter().chain(&artifacts.object_files) {
            assert!(output_dir.join(name).exists(), "missing {:?}", name);
        }
        assert!(!output_dir.join("graph.pb").exists());
    }

    #[test]
    fn test_compile_model_checks_file_counts() {
        let dir = TempDir::new().unwrap();
        let output_dir = dir.path().join("out");
        let config = test_config(dir.path().to_path_buf(), vec![1, 2]);

        let compiler = ScriptedCompiler { skip_objects: true };
        let err = compile_model(&config, &output_dir, &compiler).unwrap_err();
        assert!(err.to_string().contains("object files"), "{}", err);
    }

    #[test]
    fn test_command_compiler_reports_missing_program() {
        let request = CompileRequest {
            saved_model: PathBuf::from("/nonexistent/saved_model"),
            output_dir: PathBuf::from("/nonexistent/out"),
            batch_sizes: vec![1],
            serving_key: "serving_default".to_string(),
            prefix: "m_bs{}".to_string(),
            class_name: "ns::m_bs{}".to_string(),
        };

        let compiler = CommandCompiler::new("definitely-not-a-real-compiler");
        let err = compiler.compile(&request).unwrap_err();
        assert!(err.to_string().contains("failed to run"), "{}", err);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_compiler_runs_program() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("fake-compiler");
        fs::write(
            &script,
            "#!/bin/sh\nset -e\noutdir=\"$2/aot\"\nmkdir -p \"$outdir\"\nIFS=','\nfor bs in $4; do\n  echo header > \"$outdir/demo_bs${bs}.h\"\n  echo object > \"$outdir/demo_bs${bs}.o\"\ndone\n",
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let out = dir.path().join("out");
        let request = CompileRequest {
            saved_model: dir.path().to_path_buf(),
            output_dir: out.clone(),
            batch_sizes: vec![1, 4],
            serving_key: "serving_default".to_string(),
            prefix: "demo_bs{}".to_string(),
            class_name: "ns::demo_bs{}".to_string(),
        };

        let compiler = CommandCompiler::new(&script);
        compiler.compile(&request).unwrap();
        assert!(out.join("aot/demo_bs1.h").exists());
        assert!(out.join("aot/demo_bs4.o").exists());
    }
}
