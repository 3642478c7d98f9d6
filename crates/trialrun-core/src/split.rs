//! Reproducible train/dev/test split of a JSONL dataset.

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{Result, TrialError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of all documents held out for testing.
    pub test_frac: f64,
    /// Fraction of all documents held out for development.
    pub dev_frac: f64,
    pub random_state: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_frac: 0.1,
            dev_frac: 0.1,
            random_state: 1234,
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<()> {
        let in_unit = |f: f64| f > 0.0 && f < 1.0;
        if !in_unit(self.test_frac) || !in_unit(self.dev_frac) {
            return Err(TrialError::InvalidConfig(
                "split fractions must lie strictly between 0 and 1".to_string(),
            ));
        }
        if self.test_frac + self.dev_frac >= 1.0 {
            return Err(TrialError::InvalidConfig(format!(
                "test ({}) and dev ({}) fractions leave no training data",
                self.test_frac, self.dev_frac
            )));
        }
        Ok(())
    }
}

/// Output files and their document counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitReport {
    pub train_path: PathBuf,
    pub dev_path: PathBuf,
    pub test_path: PathBuf,
    pub train: usize,
    pub dev: usize,
    pub test: usize,
}

/// Number of documents held out from `n` at fraction `frac`, rounded up.
fn held_out(n: usize, frac: f64) -> usize {
    ((n as f64 * frac).ceil() as usize).min(n)
}

fn write_jsonl(path: &Path, docs: &[Value]) -> Result<()> {
    let mut out = String::new();
    for doc in docs {
        out.push_str(&serde_json::to_string(doc)?);
        out.push('\n');
    }
    fs::write(path, out)?;
    Ok(())
}

/// Split `dataset` into `{prefix}_TRAIN/DEV/TEST.jsonl` under `out_dir`.
pub fn split_dataset(
    dataset: &Path,
    out_dir: &Path,
    prefix: &str,
    config: &SplitConfig,
) -> Result<SplitReport> {
    config.validate()?;

    let content = fs::read_to_string(dataset)?;
    let mut docs = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let doc: Value = serde_json::from_str(line).map_err(|e| TrialError::MalformedInput {
            line: idx + 1,
            reason: e.to_string(),
        })?;
        docs.push(doc);
    }

    let mut rng = StdRng::seed_from_u64(config.random_state);
    docs.shuffle(&mut rng);

    let n_test = held_out(docs.len(), config.test_frac);
    let test = docs.split_off(docs.len() - n_test);
    let dev_frac_of_rest = config.dev_frac / (1.0 - config.test_frac);
    let n_dev = held_out(docs.len(), dev_frac_of_rest);
    let dev = docs.split_off(docs.len() - n_dev);
    let train = docs;

    fs::create_dir_all(out_dir)?;
    let report = SplitReport {
        train_path: out_dir.join(format!("{prefix}_TRAIN.jsonl")),
        dev_path: out_dir.join(format!("{prefix}_DEV.jsonl")),
        test_path: out_dir.join(format!("{prefix}_TEST.jsonl")),
        train: train.len(),
        dev: dev.len(),
        test: test.len(),
    };
    write_jsonl(&report.train_path, &train)?;
    write_jsonl(&report.dev_path, &dev)?;
    write_jsonl(&report.test_path, &test)?;

    info!(
        train = report.train,
        dev = report.dev,
        test = report.test,
        "Dataset split written"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_docs(dir: &Path, n: usize) -> PathBuf {
        let path = dir.join("all.jsonl");
        let body: String = (0..n)
            .map(|i| format!("{{\"doc_key\":\"doc{i}\"}}\n"))
            .collect();
        fs::write(&path, body).unwrap();
        path
    }

    fn keys(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap()["doc_key"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn sizes_follow_rounded_up_fractions() {
        let tmp = tempfile::tempdir().unwrap();
        let data = write_docs(tmp.path(), 25);
        let out = tmp.path().join("out");

        let report = split_dataset(&data, &out, "chem", &SplitConfig::default()).unwrap();

        // ceil(2.5) = 3 test; ceil(0.1 / 0.9 * 22) = 3 dev
        assert_eq!(report.test, 3);
        assert_eq!(report.dev, 3);
        assert_eq!(report.train, 19);
        assert!(report.train_path.ends_with("chem_TRAIN.jsonl"));
        assert_eq!(keys(&report.test_path).len(), 3);
    }

    #[test]
    fn split_is_a_partition_and_reproducible() {
        let tmp = tempfile::tempdir().unwrap();
        let data = write_docs(tmp.path(), 40);

        let a = split_dataset(&data, &tmp.path().join("a"), "p", &SplitConfig::default()).unwrap();
        let b = split_dataset(&data, &tmp.path().join("b"), "p", &SplitConfig::default()).unwrap();

        assert_eq!(keys(&a.test_path), keys(&b.test_path));
        assert_eq!(keys(&a.dev_path), keys(&b.dev_path));

        let mut all: Vec<String> = [&a.train_path, &a.dev_path, &a.test_path]
            .iter()
            .flat_map(|p| keys(p))
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 40);
    }

    #[test]
    fn invalid_fractions_are_rejected() {
        let bad = SplitConfig {
            test_frac: 0.5,
            dev_frac: 0.5,
            random_state: 1,
        };
        assert!(bad.validate().is_err());
        let zero = SplitConfig {
            test_frac: 0.0,
            ..SplitConfig::default()
        };
        assert!(zero.validate().is_err());
    }
}
