//! Wrapper header generation.
//!
//! The per-batch-size headers emitted by the compiler are merged into a
//! single C++ header through a line-oriented template. Placeholders have the
//! form `${NAME}`. A line of the form `// foreach=MODEL lines=<n>` repeats
//! the following `<n>` template lines once per compiled batch size, with that
//! batch size's variables in scope.

use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{Result, TfaotError};
use crate::header::{parse_header, HeaderData};

/// Embedded template for the unified model header.
const WRAPPER_TEMPLATE: &str = include_str!("../templates/wrapper.h.in");

/// Default include guard of generated wrapper headers.
pub const DEFAULT_INCLUDE_GUARD: &str = "tfaot_model";

static VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z0-9_]+)\}").expect("valid pattern"));

static FOREACH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^//\s+foreach=(\S+)\s+lines=(\d+)$").expect("valid pattern"));

/// A value that can be substituted into a template.
#[derive(Debug, Clone)]
pub enum TemplateValue {
    /// Plain text, also registered upper-cased under `<NAME>_UC`.
    Text(String),
    /// A single number.
    Number(usize),
    /// A list of numbers, also registered comma-joined under `<NAME>_CSV`.
    List(Vec<usize>),
}

impl TemplateValue {
    fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Number(number) => number.to_string(),
            Self::List(items) => join_csv(items),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<usize> for TemplateValue {
    fn from(value: usize) -> Self {
        Self::Number(value)
    }
}

impl From<Vec<usize>> for TemplateValue {
    fn from(value: Vec<usize>) -> Self {
        Self::List(value)
    }
}

impl From<&[usize]> for TemplateValue {
    fn from(value: &[usize]) -> Self {
        Self::List(value.to_vec())
    }
}

fn join_csv(items: &[usize]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Replaces `${NAME}` placeholders in template lines.
///
/// Keys are upper-cased on insertion. Text values additionally register an
/// upper-cased `<NAME>_UC` variant, list values a comma-joined `<NAME>_CSV`
/// variant. Unresolved placeholders are an error.
#[derive(Debug, Clone)]
pub struct Substituter {
    vars: BTreeMap<String, String>,
}

impl Substituter {
    /// Build a substituter from named values.
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<TemplateValue>,
    {
        let mut vars = BTreeMap::new();
        for (key, value) in values {
            let key = key.as_ref().to_uppercase();
            let value = value.into();
            match &value {
                TemplateValue::Text(text) if !key.ends_with("_UC") => {
                    vars.insert(format!("{}_UC", key), text.to_uppercase());
                }
                TemplateValue::List(items) if !key.ends_with("_CSV") => {
                    vars.insert(format!("{}_CSV", key), join_csv(items));
                }
                _ => {}
            }
            vars.insert(key, value.render());
        }
        Self { vars }
    }

    /// Substitute all placeholders in a single line.
    pub fn apply(&self, line: &str) -> Result<String> {
        let mut out = String::with_capacity(line.len());
        let mut last = 0;
        for caps in VAR_RE.captures_iter(line) {
            let placeholder = caps.get(0).expect("group 0 always present");
            let key = &caps[1];
            let value = self.vars.get(key).ok_or_else(|| {
                TfaotError::template(format!("template contains unknown variable {}", key))
            })?;
            out.push_str(&line[last..placeholder.start()]);
            out.push_str(value);
            last = placeholder.end();
        }
        out.push_str(&line[last..]);
        Ok(out)
    }
}

/// Render a line-oriented template.
///
/// Common lines are substituted with `common`; blocks behind a
/// `// foreach=MODEL lines=<n>` marker are repeated once per entry of
/// `models`, in key order.
pub fn render_template(
    template: &str,
    common: &Substituter,
    models: &BTreeMap<usize, Substituter>,
) -> Result<String> {
    let lines: Vec<&str> = template.lines().collect();
    let mut output = Vec::new();

    let mut index = 0;
    while index < lines.len() {
        let line = lines[index];

        if let Some(caps) = FOREACH_RE.captures(line.trim()) {
            let target = caps[1].to_string();
            if target != "MODEL" {
                return Err(TfaotError::template(format!(
                    "unknown loop target '{}'",
                    target
                )));
            }
            let count: usize = caps[2]
                .parse()
                .map_err(|_| TfaotError::template("loop line count out of range".to_string()))?;

            let end = (index + 1 + count).min(lines.len());
            for substituter in models.values() {
                for block_line in &lines[index + 1..end] {
                    output.push(substituter.apply(block_line)?);
                }
            }
            index = end;
            continue;
        }

        output.push(common.apply(line)?);
        index += 1;
    }

    Ok(output.join("\n") + "\n")
}

/// Generate the unified wrapper header from per-batch-size headers.
///
/// All headers must describe the same model: the batch-size-independent
/// fields have to agree across files. The output file's parent directories
/// are created as needed.
pub fn create_wrapper(
    output_file: &Path,
    header_files: &[PathBuf],
    model_dir: &Path,
    include_guard: &str,
) -> Result<PathBuf> {
    // parse and key by batch size
    let mut headers: BTreeMap<usize, HeaderData> = BTreeMap::new();
    for path in header_files {
        let data = parse_header(path)?;
        if headers.insert(data.batch_size, data).is_some() {
            return Err(TfaotError::wrapper(format!(
                "duplicate batch size among headers, second one in {}",
                path.display()
            )));
        }
    }

    let first = headers
        .values()
        .next()
        .ok_or_else(|| TfaotError::wrapper("no header files provided".to_string()))?;

    // the batch-size-independent fields must agree across all headers
    check_common(&headers, "prefix", |data| data.prefix.clone())?;
    check_common(&headers, "namespace", |data| data.namespace.clone())?;
    check_common(&headers, "class name", |data| data.class_name.clone())?;
    check_common(&headers, "argument count", |data| data.n_args.to_string())?;
    check_common(&headers, "result count", |data| data.n_res.to_string())?;
    check_common(&headers, "argument shape", |data| {
        join_csv(&data.arg_counts_no_batch)
    })?;
    check_common(&headers, "result shape", |data| {
        join_csv(&data.res_counts_no_batch)
    })?;

    let batch_sizes: Vec<usize> = headers.keys().copied().collect();

    let common_vars: Vec<(&str, TemplateValue)> = vec![
        ("model_path", model_dir.display().to_string().into()),
        ("batch_sizes", batch_sizes.clone().into()),
        ("include_guard", include_guard.into()),
        ("prefix", first.prefix.as_str().into()),
        ("namespace", first.namespace.as_str().into()),
        ("class_name", first.class_name.as_str().into()),
        ("n_args", first.n_args.into()),
        ("n_res", first.n_res.into()),
        ("arg_counts_no_batch", first.arg_counts_no_batch.clone().into()),
        ("res_counts_no_batch", first.res_counts_no_batch.clone().into()),
    ];
    let common = Substituter::new(common_vars.clone());

    let models: BTreeMap<usize, Substituter> = headers
        .values()
        .map(|data| {
            let mut vars = common_vars.clone();
            vars.push(("batch_size", data.batch_size.into()));
            vars.push(("arg_counts", data.arg_counts.clone().into()));
            vars.push(("res_counts", data.res_counts.clone().into()));
            (data.batch_size, Substituter::new(vars))
        })
        .collect();

    let rendered = render_template(WRAPPER_TEMPLATE, &common, &models)?;

    if let Some(parent) = output_file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_file, rendered)?;

    Ok(output_file.to_path_buf())
}

fn check_common<F>(headers: &BTreeMap<usize, HeaderData>, name: &str, field: F) -> Result<()>
where
    F: Fn(&HeaderData) -> String,
{
    let mut values: Vec<String> = headers.values().map(field).collect();
    values.sort();
    values.dedup();
    if values.len() > 1 {
        return Err(TfaotError::wrapper(format!(
            "found more than one possible {} value: {}",
            name,
            values.join(", ")
        )));
    }
    Ok(())
}
