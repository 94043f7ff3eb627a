//! tfaot-compile: package XLA AOT-compiled TensorFlow models for deployment.
//!
//! This crate orchestrates the ahead-of-time compilation of a TensorFlow
//! saved model into deployable C++ artifacts. The actual graph lowering is
//! delegated to an external compiler; this tool drives it and packages the
//! results:
//!
//! 1. load and normalize a YAML (or JSON) configuration describing the model
//!    and the batch sizes to compile,
//! 2. invoke the external AOT compiler and collect the per-batch-size header
//!    and object files,
//! 3. parse the generated headers to recover argument and result metadata,
//! 4. merge everything into a single templated wrapper header,
//! 5. emit a toolfile registering the artifacts with the build system.
//!
//! # Example
//!
//! ```ignore
//! use tfaot_compile::pipeline::{tfaot_compile, CompileOptions};
//!
//! let options = CompileOptions::new("model/aot_config.yaml", "build/tfaot");
//! let result = tfaot_compile(&options)?;
//! println!("wrapper header at {}", result.wrapper_file.display());
//! ```

pub mod cli;
pub mod compile;
pub mod config;
pub mod error;
pub mod header;
pub mod pipeline;
pub mod toolfile;
pub mod wrapper;

// Re-export commonly used types
pub use compile::{compile_model, AotCompiler, CommandCompiler, CompileRequest, CompiledArtifacts};
pub use config::AotConfig;
pub use error::{Result, TfaotError};
pub use header::{parse_header, HeaderData};
pub use pipeline::{tfaot_compile, CompilationResult, CompileOptions};
pub use toolfile::{create_toolfile, ToolVars};
pub use wrapper::{create_wrapper, Substituter, TemplateValue};
