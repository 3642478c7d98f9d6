//! Per-trial random seeds and seed-template patching.
//!
//! The template is treated as opaque text: each marker's value runs from the
//! end of the marker to the next `,` and is replaced wholesale.

use std::collections::HashSet;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TrialError};

pub const RANDOM_SEED_MARKER: &str = "random_seed:";
pub const NUMPY_SEED_MARKER: &str = "numpy_seed:";
pub const PYTORCH_SEED_MARKER: &str = "pytorch_seed:";

const VALUE_DELIMITER: char = ',';
const BASE_SEED_RANGE: std::ops::RangeInclusive<u32> = 10_000..=99_999;

/// Three correlated seeds derived from one 5-digit base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedTriple {
    pub random_seed: u32,
    pub numpy_seed: u32,
    pub pytorch_seed: u32,
}

impl SeedTriple {
    pub fn from_base(base: u32) -> Self {
        Self {
            random_seed: base,
            numpy_seed: base / 10,
            pytorch_seed: base / 100,
        }
    }

    /// Draw a uniformly random 5-digit base seed.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_base(rng.gen_range(BASE_SEED_RANGE))
    }

    /// Draw `n` triples with pairwise distinct base seeds.
    pub fn generate_distinct<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Result<Vec<Self>> {
        let available = (BASE_SEED_RANGE.end() - BASE_SEED_RANGE.start() + 1) as usize;
        if n > available {
            return Err(TrialError::InvalidConfig(format!(
                "cannot draw {n} distinct 5-digit seeds"
            )));
        }
        let mut seen = HashSet::with_capacity(n);
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            let triple = Self::generate(rng);
            if seen.insert(triple.random_seed) {
                out.push(triple);
            }
        }
        Ok(out)
    }

    fn markers(&self) -> [(&'static str, u32); 3] {
        [
            (RANDOM_SEED_MARKER, self.random_seed),
            (NUMPY_SEED_MARKER, self.numpy_seed),
            (PYTORCH_SEED_MARKER, self.pytorch_seed),
        ]
    }
}

/// Substitute the three seed values into template text.
pub fn patch_template(text: &str, seeds: &SeedTriple) -> Result<String> {
    let mut patched = text.to_string();
    for (marker, value) in seeds.markers() {
        let malformed = |reason: String| TrialError::MalformedTemplate {
            marker: marker.to_string(),
            reason,
        };

        let occurrences = patched.matches(marker).count();
        if occurrences != 1 {
            return Err(malformed(format!(
                "expected exactly one occurrence, found {occurrences}"
            )));
        }
        let start = patched
            .find(marker)
            .map(|idx| idx + marker.len())
            .ok_or_else(|| malformed("marker not found".to_string()))?;
        let len = patched[start..]
            .find(VALUE_DELIMITER)
            .ok_or_else(|| malformed(format!("no terminating '{VALUE_DELIMITER}'")))?;

        patched.replace_range(start..start + len, &format!(" {value}"));
    }
    Ok(patched)
}

/// A shared template checked out for one trial.
///
/// The original bytes are written back by [`TemplateCheckout::check_in`], or
/// on drop if the checkout is abandoned (error, panic, cancelled future).
pub struct TemplateCheckout {
    path: PathBuf,
    original: Vec<u8>,
    restored: bool,
}

impl TemplateCheckout {
    /// Patch the template in place. On a malformed template nothing is written.
    pub async fn check_out(path: impl Into<PathBuf>, seeds: &SeedTriple) -> Result<Self> {
        let path = path.into();
        let original = tokio::fs::read(&path).await?;
        let text = String::from_utf8_lossy(&original);
        let patched = patch_template(&text, seeds)?;

        let checkout = Self {
            path,
            original,
            restored: false,
        };
        tokio::fs::write(&checkout.path, patched).await?;
        debug!(
            template = %checkout.path.display(),
            random_seed = seeds.random_seed,
            "Seed template checked out"
        );
        Ok(checkout)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restore the original template content.
    pub async fn check_in(mut self) -> Result<()> {
        tokio::fs::write(&self.path, &self.original).await?;
        self.restored = true;
        debug!(template = %self.path.display(), "Seed template checked in");
        Ok(())
    }
}

impl Drop for TemplateCheckout {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(e) = fs::write(&self.path, &self.original) {
            warn!(
                template = %self.path.display(),
                error = %e,
                "Failed to restore seed template"
            );
        }
    }
}

/// Run `body` against the shared template patched with `seeds`, restoring
/// the original content on every exit path.
///
/// `body` receives the template path. If both `body` and the restore fail,
/// the body's error is returned and the restore failure is logged.
pub async fn with_seeds<F, Fut, T>(template: &Path, seeds: &SeedTriple, body: F) -> Result<T>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let checkout = TemplateCheckout::check_out(template, seeds).await?;
    let outcome = body(checkout.path().to_path_buf()).await;
    let restored = checkout.check_in().await;

    match (outcome, restored) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(restore_err)) => {
            warn!(error = %restore_err, "Seed template restore failed after trial error");
            Err(e)
        }
    }
}

/// Write a patched private copy of `template` into `dir` for one trial.
///
/// The shared template is only read.
pub fn materialize(template: &Path, seeds: &SeedTriple, dir: &Path) -> Result<PathBuf> {
    let text = fs::read_to_string(template)?;
    let patched = patch_template(&text, seeds)?;
    let file_name = template.file_name().ok_or_else(|| {
        TrialError::InvalidConfig(format!(
            "seed template path {} has no file name",
            template.display()
        ))
    })?;
    let target = dir.join(file_name);
    fs::write(&target, patched)?;
    Ok(target)
}
