//! Parsing of AOT-generated C++ header files.
//!
//! The external compiler emits one header per batch size. Each header
//! declares a class derived from `tensorflow::XlaCompiledCpuFunction` whose
//! `argN_count()` / `resultN_count()` accessors return the flat element
//! counts of the function's buffers. This module recovers that metadata with
//! a single line-oriented scan so the wrapper generator never has to touch
//! compiler internals.

use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use crate::error::{Result, TfaotError};

static NAMESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^namespace\s+(\S+)\s*\{$").expect("valid pattern"));

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^class\s+(\S+)_bs(\d+)\s+final\s+:\s+public\s+tensorflow::XlaCompiledCpuFunction\b")
        .expect("valid pattern")
});

static COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^int\s+(arg|result)(\d+)_count\(\)").expect("valid pattern"));

static RETURN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^return\s+(\d+)\s*;").expect("valid pattern"));

/// Metadata extracted from a single AOT-generated header file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderData {
    /// Batch size the contained function was compiled for.
    pub batch_size: usize,

    /// File name prefix shared by the header and object file.
    pub prefix: String,

    /// Namespace of the generated class.
    pub namespace: String,

    /// Class name without the batch size suffix.
    pub class_name: String,

    /// Number of argument buffers.
    pub n_args: usize,

    /// Flat element count per argument, including the batch dimension.
    pub arg_counts: Vec<usize>,

    /// Element count per argument for a single batch item.
    pub arg_counts_no_batch: Vec<usize>,

    /// Number of result buffers.
    pub n_res: usize,

    /// Flat element count per result, including the batch dimension.
    pub res_counts: Vec<usize>,

    /// Element count per result for a single batch item.
    pub res_counts_no_batch: Vec<usize>,
}

/// Parse an AOT-generated header file.
pub fn parse_header(path: impl AsRef<Path>) -> Result<HeaderData> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(TfaotError::FileNotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;

    // all non-empty lines, stripped
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut namespace = None;
    let mut class_name = None;
    let mut batch_size = None;
    let mut arg_counts: BTreeMap<usize, usize> = BTreeMap::new();
    let mut res_counts: BTreeMap<usize, usize> = BTreeMap::new();

    let mut iter = lines.iter();
    while let Some(line) = iter.next() {
        if let Some(caps) = NAMESPACE_RE.captures(line) {
            namespace = Some(caps[1].to_string());
            continue;
        }

        if let Some(caps) = CLASS_RE.captures(line) {
            class_name = Some(caps[1].to_string());
            batch_size = Some(parse_number(&caps[2], path)?);
            continue;
        }

        if let Some(caps) = COUNT_RE.captures(line) {
            let kind = caps[1].to_string();
            let index = parse_number(&caps[2], path)?;

            // the count is the literal return value on the next line
            let count = iter
                .next()
                .and_then(|next| RETURN_RE.captures(next))
                .map(|caps| parse_number(&caps[1], path))
                .transpose()?
                .ok_or_else(|| {
                    TfaotError::header(format!("corrupted header file {}", path.display()))
                })?;

            let counts = if kind == "arg" {
                &mut arg_counts
            } else {
                &mut res_counts
            };
            counts.insert(index, count);
        }
    }

    let namespace = namespace.ok_or_else(|| {
        TfaotError::header(format!("no namespace found in {}", path.display()))
    })?;
    let class_name = class_name.ok_or_else(|| {
        TfaotError::header(format!(
            "no XlaCompiledCpuFunction subclass found in {}",
            path.display()
        ))
    })?;
    let batch_size = batch_size.ok_or_else(|| {
        TfaotError::header(format!("no batch size found in {}", path.display()))
    })?;

    let arg_counts = flatten(arg_counts, "argument", path)?;
    let res_counts = flatten(res_counts, "result", path)?;
    let arg_counts_no_batch = no_batch(&arg_counts, batch_size, "argument", path)?;
    let res_counts_no_batch = no_batch(&res_counts, batch_size, "result", path)?;

    // the file name carries the prefix shared with the object file
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    let postfix = format!("_bs{}.h", batch_size);
    let prefix = file_name.strip_suffix(&postfix).ok_or_else(|| {
        TfaotError::header(format!(
            "header '{}' does not end with expected postfix '{}'",
            path.display(),
            postfix
        ))
    })?;

    Ok(HeaderData {
        batch_size,
        prefix: prefix.to_string(),
        namespace,
        class_name,
        n_args: arg_counts.len(),
        n_res: res_counts.len(),
        arg_counts,
        arg_counts_no_batch,
        res_counts,
        res_counts_no_batch,
    })
}

fn parse_number(digits: &str, path: &Path) -> Result<usize> {
    digits.parse().map_err(|_| {
        TfaotError::header(format!(
            "numeric value '{}' out of range in {}",
            digits,
            path.display()
        ))
    })
}

/// Flatten indexed counts to a list, requiring contiguous indices from zero.
fn flatten(counts: BTreeMap<usize, usize>, name: &str, path: &Path) -> Result<Vec<usize>> {
    if counts.keys().enumerate().any(|(i, &index)| i != index) {
        let indices = counts
            .keys()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        return Err(TfaotError::header(format!(
            "non-contiguous indices in {} counts of {}: {}",
            name,
            path.display(),
            indices
        )));
    }
    Ok(counts.into_values().collect())
}

/// Divide each count by the batch size, requiring integer division.
fn no_batch(counts: &[usize], batch_size: usize, name: &str, path: &Path) -> Result<Vec<usize>> {
    counts
        .iter()
        .enumerate()
        .map(|(index, &count)| {
            if count % batch_size != 0 {
                return Err(TfaotError::header(format!(
                    "{} count of {} at index {} in {} is not dividable by batch size {}",
                    name,
                    count,
                    index,
                    path.display(),
                    batch_size
                )));
            }
            Ok(count / batch_size)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn generated_header(
        namespace: &str,
        class_base: &str,
        batch_size: usize,
        arg_counts: &[usize],
        res_counts: &[usize],
    ) -> String {
        let mut out = String::new();
        out.push_str("// Generated by tfcompile, the XLA ahead-of-time compiler.\n\n");
        out.push_str("#include \"tensorflow/compiler/tf2xla/xla_compiled_cpu_function.h\"\n\n");
        out.push_str(&format!("namespace {} {{\n\n", namespace));
        out.push_str(&format!(
            "class {}_bs{} final : public tensorflow::XlaCompiledCpuFunction {{\n",
            class_base, batch_size
        ));
        out.push_str(" public:\n");
        for (index, count) in arg_counts.iter().enumerate() {
            out.push_str(&format!(
                "  int arg{}_count() const {{\n    return {};\n  }}\n\n",
                index, count
            ));
        }
        for (index, count) in res_counts.iter().enumerate() {
            out.push_str(&format!(
                "  int result{}_count() const {{\n    return {};\n  }}\n\n",
                index, count
            ));
        }
        out.push_str("};\n\n");
        out.push_str(&format!("}}  // namespace {}\n", namespace));
        out
    }

    fn write_header(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_generated_header() {
        let dir = TempDir::new().unwrap();
        let content = generated_header("tfaot_model", "test", 2, &[8, 8], &[4, 4]);
        let path = write_header(&dir, "test_bs2.h", &content);

        let data = parse_header(&path).unwrap();
        assert_eq!(data.batch_size, 2);
        assert_eq!(data.prefix, "test");
        assert_eq!(data.namespace, "tfaot_model");
        assert_eq!(data.class_name, "test");
        assert_eq!(data.n_args, 2);
        assert_eq!(data.arg_counts, vec![8, 8]);
        assert_eq!(data.arg_counts_no_batch, vec![4, 4]);
        assert_eq!(data.n_res, 2);
        assert_eq!(data.res_counts, vec![4, 4]);
        assert_eq!(data.res_counts_no_batch, vec![2, 2]);
    }

    #[test]
    fn test_count_without_return_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let content = "namespace ns {\n\
                       class m_bs1 final : public tensorflow::XlaCompiledCpuFunction {\n\
                       int arg0_count() const {\n\
                       int arg1_count() const {\n\
                       return 4;\n\
                       }\n\
                       };\n\
                       }\n";
        let path = write_header(&dir, "m_bs1.h", content);

        let err = parse_header(&path).unwrap_err();
        assert!(err.to_string().contains("corrupted"), "{}", err);
    }

    #[test]
    fn test_non_contiguous_indices() {
        let dir = TempDir::new().unwrap();
        let content = "namespace ns {\n\
                       class m_bs1 final : public tensorflow::XlaCompiledCpuFunction {\n\
                       int arg0_count() const {\n\
                       return 4;\n\
                       }\n\
                       int arg2_count() const {\n\
                       return 4;\n\
                       }\n\
                       };\n\
                       }\n";
        let path = write_header(&dir, "m_bs1.h", content);

        let err = parse_header(&path).unwrap_err();
        assert!(err.to_string().contains("non-contiguous"), "{}", err);
    }

    #[test]
    fn test_count_not_dividable_by_batch_size() {
        let dir = TempDir::new().unwrap();
        let content = generated_header("ns", "m", 2, &[7], &[4]);
        let path = write_header(&dir, "m_bs2.h", &content);

        let err = parse_header(&path).unwrap_err();
        assert!(err.to_string().contains("not dividable"), "{}", err);
    }

    #[test]
    fn test_file_name_must_match_batch_size() {
        let dir = TempDir::new().unwrap();
        let content = generated_header("ns", "m", 2, &[8], &[4]);
        let path = write_header(&dir, "m_bs4.h", &content);

        let err = parse_header(&path).unwrap_err();
        assert!(err.to_string().contains("postfix"), "{}", err);
    }

    #[test]
    fn test_missing_class_line() {
        let dir = TempDir::new().unwrap();
        let path = write_header(&dir, "m_bs1.h", "namespace ns {\n}\n");

        let err = parse_header(&path).unwrap_err();
        assert!(err.to_string().contains("XlaCompiledCpuFunction"), "{}", err);
    }
}
