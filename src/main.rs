//! CLI entry point for tfaot-compile.

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use tfaot_compile::cli::Cli;
use tfaot_compile::pipeline::{cmssw_rel_path, tfaot_compile, CompilationResult, CompileOptions};

fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let cli = Cli::parse_args();

    let additional_flags: Vec<String> = cli
        .additional_flags
        .as_deref()
        .map(|flags| flags.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    if cli.dev {
        check_target_triple(&additional_flags);
    }

    let options = CompileOptions {
        config_file: cli.aot_config.clone(),
        output_dir: cli.output_directory,
        tool_name: cli.tool_name,
        tool_base: cli.tool_base,
        dev: cli.dev,
        compiler: cli.compiler,
        additional_flags,
    };

    let result = tfaot_compile(&options)
        .with_context(|| format!("compilation from {} failed", cli.aot_config.display()))?;

    if cli.dev {
        print_compilation_info(&result);
    }

    Ok(())
}

/// Warn when the compilation target does not match the platform architecture.
///
/// The compiled objects only run on the architecture they were built for, so
/// a mismatch between the machine and the `--target_triple` flag (or its
/// x86_64 default) usually means the deployment will misbehave.
fn check_target_triple(additional_flags: &[String]) {
    let flags = additional_flags.join(" ");
    let triple_arch = Regex::new(r"--target_triple(\s+|=)([^-\s]+)-")
        .expect("valid pattern")
        .captures(&flags)
        .map(|caps| caps[2].to_string());

    let arch = std::env::consts::ARCH;
    let configured = triple_arch.as_deref().unwrap_or("x86_64");
    if configured != arch {
        if triple_arch.is_some() {
            warn!(
                "platform architecture '{}' does not match the configured --target_triple of '{}'; \
                 the compiled model may misbehave",
                arch, configured
            );
        } else {
            warn!(
                "platform architecture is '{}' but the default compilation target is 'x86_64'; \
                 set the correct target via --additional-flags=\"--target_triple=<arch>-unknown-linux\"",
                arch
            );
        }
    }
}

/// Print the follow-up steps after a successful dev-mode compilation.
fn print_compilation_info(result: &CompilationResult) {
    let batch_sizes = result
        .batch_sizes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");

    println!("\n{}", "-".repeat(80));
    println!(
        "\nsuccessfully AOT compiled model '{}' for batch sizes: {}",
        result.model_class, batch_sizes
    );
    println!("\n  1. register it to scram:");
    println!("     > scram setup {}", cmssw_rel_path(&result.tool_file));
    println!("\n  2. 'use' the tool in your BuildFile.xml:");
    println!("     <use name=\"{}.xml\"/>", result.tool_name);
    println!("\n  3. include the following header in your code:");
    println!("     #include \"{}/model.h\"", result.tool_name);
    println!("\n  4. create an AOT model instance via:");
    println!("     auto model = tfaot::Model<{}>();\n", result.model_class);
}
